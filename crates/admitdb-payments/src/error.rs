//! Payment Error Types

use thiserror::Error;

use admitdb_core::CoreError;
use admitdb_pricing::PricingError;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Checkout, gateway and webhook errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Request rejected before any side effect
    #[error("{0}")]
    Validation(String),

    /// Coupon code not in the catalog
    #[error("Invalid coupon code: {0}")]
    InvalidCoupon(String),

    /// Plan not in the catalog (or not purchasable)
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    /// A dependency (gateway, store) is not configured
    #[error("{0} unavailable")]
    ServiceUnavailable(&'static str),

    /// The gateway refused the request; carries the gateway's message
    #[error("{0}")]
    GatewayRejected(String),

    /// The gateway did not answer in time
    #[error("Payment gateway timed out after {0}s")]
    GatewayTimeout(u64),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Store failure
    #[error(transparent)]
    Store(#[from] CoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PricingError> for PaymentError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidCoupon(code) => Self::InvalidCoupon(code),
            PricingError::UnknownPlan(plan) => Self::UnknownPlan(plan),
            other => Self::Config(other.to_string()),
        }
    }
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) | Self::GatewayTimeout(_) => true,
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Rejected input, safe to echo to the caller
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidCoupon(_) | Self::UnknownPlan(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::GatewayRejected(msg) => msg.clone(),
            Self::InvalidCoupon(_) => "Invalid coupon code".into(),
            Self::UnknownPlan(_) => "Unknown plan".into(),
            Self::ServiceUnavailable(_) | Self::GatewayTimeout(_) => {
                "Payment service is temporarily unavailable. Please try again.".into()
            }
            Self::Store(err) => err.user_message(),
            Self::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_errors_map_to_client_errors() {
        let err = PaymentError::from(PricingError::InvalidCoupon("FAKE123".into()));
        assert!(err.is_client_error());
        assert_eq!(err.user_message(), "Invalid coupon code");

        let err = PaymentError::from(PricingError::UnknownPlan("gold".into()));
        assert!(matches!(err, PaymentError::UnknownPlan(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(PaymentError::GatewayTimeout(10).is_retryable());
        assert!(PaymentError::Store(CoreError::Storage("down".into())).is_retryable());
        assert!(!PaymentError::Validation("x".into()).is_retryable());
        assert!(!PaymentError::GatewayRejected("card declined".into()).is_retryable());
    }
}
