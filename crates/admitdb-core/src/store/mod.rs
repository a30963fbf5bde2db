//! Document Stores
//!
//! Persistence contracts for the `orders`, `users` and `products`
//! collections, plus the settlement write that completes or fails an order
//! and grants the subscription as one unit.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::account::{Address, AddressInput, PaymentMethodInput, PaymentMethodSummary};
use crate::error::Result;
use crate::ids::{OrderId, UserId};
use crate::order::{NewOrder, Order};
use crate::product::{Product, ProductInput};
use crate::user::{NewUser, Subscription, User};

/// Order persistence (`orders` collection)
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new pending order
    async fn create(&self, order: NewOrder) -> Result<Order>;

    /// Get order by id
    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;

    /// All orders, newest first
    async fn list(&self) -> Result<Vec<Order>>;

    /// Find the order created for a client idempotency key
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>>;

    /// Record the gateway's payment-intent id on a pending order
    async fn attach_payment_intent(&self, id: &OrderId, intent_id: &str) -> Result<Order>;

    /// Fail a pending order outside the webhook path (e.g. gateway timeout)
    async fn mark_failed(&self, id: &OrderId, reason: &str) -> Result<Order>;
}

/// User persistence (`users` collection).
///
/// Each mutation is a single write of the user document, so the
/// one-default-per-list rule never observes an intermediate state.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User>;

    async fn get(&self, id: &UserId) -> Result<Option<User>>;

    async fn add_address(&self, user_id: &UserId, input: AddressInput) -> Result<Address>;

    async fn update_address(
        &self,
        user_id: &UserId,
        address_id: &str,
        input: AddressInput,
    ) -> Result<Address>;

    async fn remove_address(&self, user_id: &UserId, address_id: &str) -> Result<()>;

    async fn set_default_address(&self, user_id: &UserId, address_id: &str) -> Result<()>;

    async fn add_payment_method(
        &self,
        user_id: &UserId,
        input: PaymentMethodInput,
    ) -> Result<PaymentMethodSummary>;

    async fn update_payment_method(
        &self,
        user_id: &UserId,
        method_id: &str,
        input: PaymentMethodInput,
    ) -> Result<PaymentMethodSummary>;

    async fn remove_payment_method(&self, user_id: &UserId, method_id: &str) -> Result<()>;

    async fn set_default_payment_method(&self, user_id: &UserId, method_id: &str) -> Result<()>;
}

/// Admin catalog persistence (`products` collection)
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, input: ProductInput, actor: &str) -> Result<Product>;

    async fn get(&self, id: &str) -> Result<Option<Product>>;

    /// Products ordered by `sort_order`, then name
    async fn list(&self, include_inactive: bool) -> Result<Vec<Product>>;

    async fn update(&self, id: &str, input: ProductInput, actor: &str) -> Result<Product>;

    /// Remove a product, returning it so its file can be cleaned up
    async fn delete(&self, id: &str) -> Result<Product>;
}

/// How a settlement resolves the order
#[derive(Clone, Debug)]
pub enum Resolution {
    /// Payment captured. `grant` is set for authenticated orders.
    Complete { grant: Option<Subscription> },
    /// Payment failed
    Fail { reason: String },
}

/// The final transition of an order, keyed by the gateway event that caused it
#[derive(Clone, Debug)]
pub struct Settlement {
    pub event_id: String,
    pub order_id: OrderId,
    pub resolution: Resolution,
    pub at: DateTime<Utc>,
}

/// Result of applying a settlement
#[derive(Clone, Debug)]
pub enum SettlementOutcome {
    /// The order moved and any grant was written
    Applied(Order),
    /// This event id was already applied
    DuplicateEvent,
    /// The order had already settled through another event
    AlreadySettled(Order),
}

/// Atomic settlement of orders
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// In one write: skip processed events, guard the order status,
    /// transition the order, append the grant to the user and record the
    /// event id. A missing order or user aborts with `NotFound` and
    /// leaves every document untouched.
    async fn settle(&self, settlement: Settlement) -> Result<SettlementOutcome>;

    /// Whether a gateway event id has been applied
    async fn is_processed(&self, event_id: &str) -> Result<bool>;
}
