//! Checkout Orchestrator
//!
//! Validates a purchase request, prices it, records a pending order and
//! asks the gateway for a payment intent. The client finishes the payment
//! with the gateway directly; the webhook settles the order later.
//!
//! ```text
//! request ─▶ validate ─▶ resolve price ─▶ pending Order ─┬─▶ free? settle now
//!                                                        └─▶ gateway intent ─▶ attach id
//! ```

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use admitdb_core::{CoreError, NewOrder, Order, OrderId, OrderStatus, OrderStore, PlanId, UserRef};
use admitdb_pricing::{round2, to_minor_units, PriceQuote, PriceResolver};

use crate::error::{PaymentError, Result};
use crate::fulfillment::FulfillmentHandler;
use crate::gateway::{IntentMetadata, IntentRequest, PaymentGateway};

/// Default upper bound on a gateway call
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

pub const MISSING_FIELDS: &str = "Missing required fields: amount and plan";

/// Body of `POST /api/create-payment-intent`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Amount the client displayed, in dollars
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub plan: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Discount percent the client displayed; the server recomputes it
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,

    #[serde(default)]
    pub coupon_code: Option<String>,

    /// Client-generated key making retried submissions safe
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Response of a successful checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    /// `None` when nothing needs to be charged
    pub client_secret: Option<String>,

    pub order_id: OrderId,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Creates orders and payment intents
pub struct CheckoutOrchestrator {
    resolver: Arc<PriceResolver>,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    fulfillment: Arc<FulfillmentHandler>,
    timeout: Duration,
}

impl CheckoutOrchestrator {
    pub fn new(
        resolver: Arc<PriceResolver>,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        fulfillment: Arc<FulfillmentHandler>,
    ) -> Self {
        Self {
            resolver,
            orders,
            gateway,
            fulfillment,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a checkout.
    ///
    /// Nothing is written until the request validates and prices. A
    /// gateway rejection leaves the order pending; a gateway timeout fails it.
    pub async fn create_payment_intent(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let (amount, plan) = match (request.amount, request.plan.as_deref().map(str::trim)) {
            (Some(amount), Some(plan)) if !plan.is_empty() => (amount, PlanId::new(plan)),
            _ => return Err(PaymentError::Validation(MISSING_FIELDS.into())),
        };
        if amount.is_sign_negative() {
            return Err(PaymentError::Validation("Amount cannot be negative".into()));
        }

        let currency = request
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("usd")
            .to_ascii_lowercase();
        if currency != self.resolver.catalog().currency {
            return Err(PaymentError::Validation(format!("Unsupported currency: {currency}")));
        }

        let quote = self.resolver.resolve(&plan, request.coupon_code.as_deref())?;

        if round2(amount) != quote.amount {
            tracing::warn!(
                plan = %quote.plan,
                requested = %amount,
                resolved = %quote.amount,
                "Checkout amount does not match resolved price"
            );
            return Err(PaymentError::Validation(format!(
                "Amount {amount} does not match the price {} for plan {}",
                quote.amount, quote.plan
            )));
        }
        if let Some(shown) = request.discount {
            if shown != Decimal::from(quote.discount) {
                tracing::debug!(shown = %shown, applied = quote.discount, "Client discount differs, using resolved discount");
            }
        }

        let user = UserRef::from_optional(request.user_id.as_deref());
        let idempotency_key = request
            .idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.orders.find_by_idempotency_key(key).await? {
                return self.resume(existing, &quote, &user).await;
            }
        }

        let created = self
            .orders
            .create(NewOrder {
                user_id: user.clone(),
                amount: quote.amount,
                base_amount: quote.base_amount,
                discount: quote.discount,
                coupon_code: quote.coupon_code.clone(),
                plan: quote.plan.clone(),
                plan_name: quote.plan_name.clone(),
                currency,
                idempotency_key: idempotency_key.clone(),
            })
            .await;

        let order = match (created, idempotency_key.as_deref()) {
            (Ok(order), _) => order,
            // a concurrent submission with the same key won the insert
            (Err(CoreError::Conflict(reason)), Some(key)) => {
                let Some(existing) = self.orders.find_by_idempotency_key(key).await? else {
                    return Err(CoreError::Conflict(reason).into());
                };
                tracing::debug!(order_id = %existing.id, "Idempotency key taken concurrently");
                return self.resume(existing, &quote, &user).await;
            }
            (Err(e), _) => return Err(e.into()),
        };

        tracing::info!(
            order_id = %order.id,
            plan = %order.plan,
            amount = %order.amount,
            discount = order.discount,
            user_id = %order.user_id,
            "Created pending order"
        );

        self.charge(order).await
    }

    /// Answer a retried submission from the order it already created
    async fn resume(&self, existing: Order, quote: &PriceQuote, user: &UserRef) -> Result<CheckoutReceipt> {
        if existing.plan != quote.plan || existing.amount != quote.amount || &existing.user_id != user {
            return Err(PaymentError::Validation(
                "Idempotency key was already used for a different checkout".into(),
            ));
        }

        tracing::info!(order_id = %existing.id, status = %existing.status, "Replaying checkout for idempotency key");

        match (existing.status, existing.payment_intent_id.as_deref()) {
            (OrderStatus::Failed, _) => Err(PaymentError::Validation(format!(
                "Order {} for this idempotency key has failed; start a new checkout",
                existing.id
            ))),
            (_, Some(intent_id)) => {
                let client_secret = self.bounded(self.gateway.client_secret(intent_id)).await?;
                Ok(CheckoutReceipt {
                    client_secret: Some(client_secret),
                    order_id: existing.id,
                    amount: existing.amount,
                })
            }
            (OrderStatus::Completed, None) => Ok(CheckoutReceipt {
                client_secret: None,
                order_id: existing.id,
                amount: existing.amount,
            }),
            (OrderStatus::Pending, None) => self.charge(existing).await,
        }
    }

    /// Settle a free order or obtain a payment intent for it
    async fn charge(&self, order: Order) -> Result<CheckoutReceipt> {
        if order.amount.is_zero() {
            let settled = self.fulfillment.settle_free(&order).await?;
            tracing::info!(order_id = %settled.id, "Zero-amount order settled without payment");
            return Ok(CheckoutReceipt {
                client_secret: None,
                order_id: settled.id,
                amount: settled.amount,
            });
        }

        let request = IntentRequest {
            amount_minor: to_minor_units(order.amount),
            currency: order.currency.clone(),
            metadata: IntentMetadata {
                order_id: Some(order.id.to_string()),
                plan: Some(order.plan.to_string()),
                user_id: Some(order.user_id.to_string()),
                coupon_code: order.coupon_code.clone(),
                discount: Some(order.discount),
            },
            description: Some(format!("{} ({})", order.plan_name, order.plan)),
            idempotency_key: Some(format!("order-{}", order.id)),
        };

        let intent = match self.bounded(self.gateway.create_payment_intent(&request)).await {
            Ok(intent) => intent,
            Err(PaymentError::GatewayTimeout(secs)) => {
                tracing::error!(order_id = %order.id, timeout_secs = secs, "Payment gateway timed out");
                if let Err(e) = self.orders.mark_failed(&order.id, "payment gateway timed out").await {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to mark timed-out order as failed");
                }
                return Err(PaymentError::GatewayTimeout(secs));
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Payment intent creation failed");
                return Err(e);
            }
        };

        self.orders.attach_payment_intent(&order.id, &intent.id).await?;

        tracing::info!(
            order_id = %order.id,
            intent_id = %intent.id,
            gateway = self.gateway.name(),
            "Attached payment intent"
        );

        Ok(CheckoutReceipt {
            client_secret: Some(intent.client_secret),
            order_id: order.id,
            amount: order.amount,
        })
    }

    async fn bounded<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PaymentError::GatewayTimeout(self.timeout.as_secs()))?
    }
}
