//! Error Types for Pricing

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PricingError>;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Invalid coupon code: {0}")]
    InvalidCoupon(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Catalog file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog parse error: {0}")]
    Serialization(#[from] serde_json::Error),
}
