//! Orders
//!
//! One checkout attempt and its lifecycle. An order is created `pending`
//! before the payment intent exists and settles exactly once, to either
//! `completed` or `failed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{OrderId, PlanId, UserRef};

/// Order lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Only `pending` may move, and only forward
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed)
        )
    }

    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating an order
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: UserRef,
    pub amount: Decimal,
    pub base_amount: Decimal,
    pub discount: u8,
    pub coupon_code: Option<String>,
    pub plan: PlanId,
    pub plan_name: String,
    pub currency: String,
    pub idempotency_key: Option<String>,
}

/// An order record as stored in the `orders` collection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,

    pub user_id: UserRef,

    /// Amount charged, in dollars
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// Catalog price before discount
    #[serde(with = "rust_decimal::serde::float")]
    pub base_amount: Decimal,

    /// Discount percent (0-100)
    pub discount: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,

    pub plan: PlanId,

    pub plan_name: String,

    pub currency: String,

    pub status: OrderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Order {
    /// Create a pending order with a fresh id
    pub fn new(input: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            user_id: input.user_id,
            amount: input.amount,
            base_amount: input.base_amount,
            discount: input.discount,
            coupon_code: input.coupon_code,
            plan: input.plan,
            plan_name: input.plan_name,
            currency: input.currency,
            status: OrderStatus::Pending,
            payment_intent_id: None,
            idempotency_key: input.idempotency_key,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::Pending)
    }

    fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// `pending -> completed`
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(OrderStatus::Completed, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// `pending -> failed`
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(OrderStatus::Failed, now)?;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Record the gateway's payment-intent id.
    ///
    /// Re-attaching the same id is a no-op; a different id is a conflict.
    pub fn attach_payment_intent(&mut self, intent_id: &str, now: DateTime<Utc>) -> Result<()> {
        match self.payment_intent_id.as_deref() {
            Some(existing) if existing == intent_id => return Ok(()),
            Some(existing) => {
                return Err(CoreError::Conflict(format!(
                    "order {} already has payment intent {existing}",
                    self.id
                )));
            }
            None => {}
        }
        if !self.is_pending() {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: "pending".into(),
            });
        }
        self.payment_intent_id = Some(intent_id.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Denormalized copy kept on the user document
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_id: self.id.clone(),
            plan: self.plan.clone(),
            plan_name: self.plan_name.clone(),
            amount: self.amount,
            discount: self.discount,
            coupon_code: self.coupon_code.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Order entry mirrored onto `User::orders` for display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub plan: PlanId,
    pub plan_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub discount: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
