//! Payment Gateway Adapter
//!
//! Abstraction over the card processor: create a payment intent for an
//! amount and metadata bundle, and turn signed webhook deliveries into
//! [`GatewayEvent`]s.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          PaymentGateway (trait)              │
//! │  ├── create_payment_intent()                 │
//! │  ├── client_secret()                         │
//! │  └── verify_event()                          │
//! └──────────────────────────────────────────────┘
//!                      ▲
//!          ┌───────────┴───────────┐
//!  ┌───────┴───────┐       ┌───────┴───────┐
//!  │ StripeGateway │       │  MockGateway  │
//!  └───────────────┘       └───────────────┘
//! ```

mod mock;
mod stripe;

pub use self::mock::MockGateway;
pub use self::stripe::StripeGateway;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Metadata keys carried on every payment intent
pub mod keys {
    pub const ORDER_ID: &str = "orderId";
    pub const PLAN: &str = "plan";
    pub const USER_ID: &str = "userId";
    pub const COUPON_CODE: &str = "couponCode";
    pub const DISCOUNT: &str = "discount";
}

/// The link between a gateway event and our records
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntentMetadata {
    pub order_id: Option<String>,
    pub plan: Option<String>,
    pub user_id: Option<String>,
    pub coupon_code: Option<String>,
    pub discount: Option<u8>,
}

impl IntentMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };
        put(keys::ORDER_ID, self.order_id.clone());
        put(keys::PLAN, self.plan.clone());
        put(keys::USER_ID, self.user_id.clone());
        put(keys::COUPON_CODE, self.coupon_code.clone());
        put(keys::DISCOUNT, self.discount.map(|d| d.to_string()));
        map
    }

    /// Read metadata back; empty values count as absent
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            map.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            order_id: get(keys::ORDER_ID),
            plan: get(keys::PLAN),
            user_id: get(keys::USER_ID),
            coupon_code: get(keys::COUPON_CODE),
            discount: get(keys::DISCOUNT).and_then(|d| d.parse().ok()),
        }
    }
}

/// Request to create a payment intent
#[derive(Clone, Debug)]
pub struct IntentRequest {
    /// Amount in the currency's minor unit (cents)
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
    pub description: Option<String>,
    /// Forwarded to the gateway so a retried request does not charge twice
    pub idempotency_key: Option<String>,
}

/// A created payment intent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

/// A verified webhook delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// `payment_intent.succeeded`
    PaymentSucceeded {
        event_id: String,
        intent_id: String,
        amount_minor: i64,
        currency: String,
        metadata: IntentMetadata,
    },

    /// `payment_intent.payment_failed`
    PaymentFailed {
        event_id: String,
        intent_id: String,
        /// The processor's failure message
        message: String,
        metadata: IntentMetadata,
    },

    /// Any other event type
    Other { event_id: String, event_type: String },
}

impl GatewayEvent {
    pub fn event_id(&self) -> &str {
        match self {
            Self::PaymentSucceeded { event_id, .. }
            | Self::PaymentFailed { event_id, .. }
            | Self::Other { event_id, .. } => event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::PaymentSucceeded { .. } => crate::webhook::EVENT_PAYMENT_SUCCEEDED,
            Self::PaymentFailed { .. } => crate::webhook::EVENT_PAYMENT_FAILED,
            Self::Other { event_type, .. } => event_type,
        }
    }
}

/// Payment processor (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent and return its client secret
    async fn create_payment_intent(&self, request: &IntentRequest) -> Result<CreatedIntent>;

    /// Re-fetch the client secret of an existing intent
    async fn client_secret(&self, intent_id: &str) -> Result<String>;

    /// Verify a webhook signature and parse the event
    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent>;

    /// Gateway name (for logging and `/health`)
    fn name(&self) -> &'static str;
}
