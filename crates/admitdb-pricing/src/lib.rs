//! # admitdb-pricing
//!
//! Plan catalog, coupon table and the price resolver.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  cheatsheet  $14.99  + STUDENT2025 (20%) → $11.99    │
//! │  profiles    $29.99  + WELCOME10   (10%) → $26.99    │
//! │  complete    $59.99  + PARTNER    (100%) → floor     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts are dollars with two decimal places. Cents only appear at the
//! payment gateway boundary via [`PriceQuote::final_amount_minor`].

pub mod catalog;
pub mod error;
pub mod resolver;

pub use catalog::{Catalog, Coupon, Plan};
pub use error::{PricingError, Result};
pub use resolver::{round2, to_minor_units, PriceQuote, PriceResolver, PricingPolicy};
