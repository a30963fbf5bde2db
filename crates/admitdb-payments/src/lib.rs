//! # admitdb-payments
//!
//! Payment processing for admitdb: the gateway adapter, checkout and
//! webhook-driven fulfillment.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐ create-payment-intent ┌────────────┐  PaymentIntent  ┌─────────┐
//! │  Client  │──────────────────────▶│  Checkout  │────────────────▶│ Gateway │
//! │          │◀── clientSecret ──────│Orchestrator│                 │ (Stripe)│
//! └────┬─────┘                       └────────────┘                 └────┬────┘
//!      │ confirms card with the gateway directly                         │
//!      └────────────────────────────────────────────────────────────────▶│
//!                                                                        │ webhook
//!                                    ┌─────────────┐                     │
//!                                    │ Fulfillment │◀────────────────────┘
//!                                    │   Handler   │── settle ──▶ orders + users
//!                                    └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use admitdb_payments::{CheckoutOrchestrator, CheckoutRequest, StripeGateway};
//!
//! let gateway = Arc::new(StripeGateway::new("sk_test_xxx", "whsec_xxx"));
//! let checkout = CheckoutOrchestrator::new(resolver, store.clone(), gateway, fulfillment);
//!
//! let receipt = checkout.create_payment_intent(CheckoutRequest {
//!     amount: Some(dec!(11.99)),
//!     plan: Some("cheatsheet".into()),
//!     coupon_code: Some("STUDENT2025".into()),
//!     ..Default::default()
//! }).await?;
//!
//! // Hand receipt.client_secret to Stripe.js
//! ```

mod checkout;
mod error;
mod fulfillment;
pub mod gateway;
pub mod webhook;

pub use checkout::{
    CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest, DEFAULT_GATEWAY_TIMEOUT,
    MISSING_FIELDS,
};
pub use error::{PaymentError, Result};
pub use fulfillment::{FulfillmentHandler, FulfillmentOutcome, FREE_EVENT_PREFIX};
pub use gateway::{
    CreatedIntent, GatewayEvent, IntentMetadata, IntentRequest, MockGateway, PaymentGateway,
    StripeGateway,
};
pub use webhook::WebhookVerifier;
