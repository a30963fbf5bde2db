//! Users and Subscriptions
//!
//! The per-user document: profile fields, granted subscriptions, the
//! denormalized order history and the saved account data.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{Address, PaymentMethodSummary};
use crate::ids::{OrderId, PlanId, UserId};
use crate::order::OrderSummary;

/// Default subscription term for one-time purchase plans
pub const DEFAULT_TERM_MONTHS: u32 = 12;

/// A grant of a plan's access to a user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub plan: PlanId,
    pub plan_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Back-reference to the order that paid for it
    pub order_id: OrderId,
    /// Cancellation flag; validity comes from `end_date`
    pub active: bool,
}

impl Subscription {
    /// Start a subscription now, running for `term_months`
    pub fn starting_at(
        plan: PlanId,
        plan_name: impl Into<String>,
        order_id: OrderId,
        start: DateTime<Utc>,
        term_months: u32,
    ) -> Self {
        let end_date = start
            .checked_add_months(Months::new(term_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            plan,
            plan_name: plan_name.into(),
            start_date: start,
            end_date,
            order_id,
            active: true,
        }
    }

    /// Grants access at `now`: not cancelled and not past its end date
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_date > now
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }
}

/// Input for creating a user document after sign-up
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A user document as stored in the `users` collection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,

    /// Legacy flag from before subscriptions were recorded
    #[serde(default)]
    pub payment_verified: bool,

    #[serde(default)]
    pub subscriptions: Vec<Subscription>,

    #[serde(default)]
    pub orders: Vec<OrderSummary>,

    #[serde(default)]
    pub addresses: Vec<Address>,

    #[serde(default)]
    pub payment_methods: Vec<PaymentMethodSummary>,
}

impl User {
    pub fn new(input: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: input.id,
            email: input.email.trim().to_lowercase(),
            first_name: input.first_name,
            last_name: input.last_name,
            created_at: now,
            payment_verified: false,
            subscriptions: Vec::new(),
            orders: Vec::new(),
            addresses: Vec::new(),
            payment_methods: Vec::new(),
        }
    }

    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }

    /// Whether a subscription for `order_id` was already granted
    pub fn has_subscription_for(&self, order_id: &OrderId) -> bool {
        self.subscriptions.iter().any(|s| &s.order_id == order_id)
    }

    /// Subscriptions granting access at `now`
    pub fn current_subscriptions(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().filter(move |s| s.is_current(now))
    }

    /// Append a fulfilled order. Returns `false` when the order was already granted.
    pub fn grant(&mut self, subscription: Subscription, summary: OrderSummary) -> bool {
        if self.has_subscription_for(&subscription.order_id) {
            return false;
        }
        self.subscriptions.push(subscription);
        if !self.orders.iter().any(|o| o.order_id == summary.order_id) {
            self.orders.push(summary);
        }
        self.payment_verified = true;
        true
    }

    pub fn default_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.is_default)
    }

    pub fn default_payment_method(&self) -> Option<&PaymentMethodSummary> {
        self.payment_methods.iter().find(|p| p.is_default)
    }
}
