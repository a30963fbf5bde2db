//! # admitdb-core
//!
//! Domain model for the admitdb checkout backend: orders, users and their
//! subscriptions, saved account data, the admin product catalog, the
//! document-store contracts and the access gate.
//!
//! ## Order lifecycle
//!
//! ```text
//!                 payment_intent.succeeded
//!            ┌──────────────────────────────▶ completed ──▶ Subscription on User
//!  pending ──┤
//!            └──────────────────────────────▶ failed
//!                 payment_intent.payment_failed
//! ```
//!
//! Settled orders never move again. The settlement write (order status,
//! user grant, processed event id) goes through `SettlementStore::settle`
//! as one unit.

pub mod access;
pub mod account;
pub mod error;
pub mod ids;
pub mod order;
pub mod product;
pub mod store;
pub mod user;

pub use access::{AccessPolicy, Capability, GuestGrant, GuestGrantStore, MemoryGuestGrantStore};
pub use account::{Address, AddressInput, CardType, PaymentMethodInput, PaymentMethodSummary};
pub use error::{CoreError, Result};
pub use ids::{OrderId, PlanId, UserId, UserRef, GUEST_SENTINEL};
pub use order::{NewOrder, Order, OrderStatus, OrderSummary};
pub use product::{FileRef, Product, ProductInput, ProductType};
pub use store::{
    MemoryStore, OrderStore, ProductStore, Resolution, Settlement, SettlementOutcome,
    SettlementStore, UserStore,
};
pub use user::{NewUser, Subscription, User, DEFAULT_TERM_MONTHS};
