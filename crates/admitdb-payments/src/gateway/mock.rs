//! Mock Payment Gateway
//!
//! For local development and tests. Issues deterministic intent ids,
//! records every request, and can be told to reject or stall.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{CreatedIntent, GatewayEvent, IntentMetadata, IntentRequest, PaymentGateway};
use crate::error::{PaymentError, Result};
use crate::webhook::{WebhookVerifier, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SUCCEEDED};

/// Webhook secret used when none is given
pub const MOCK_WEBHOOK_SECRET: &str = "whsec_mock";

#[derive(Default)]
struct Behavior {
    reject_with: Option<String>,
    delay: Option<Duration>,
}

/// In-process gateway
pub struct MockGateway {
    verifier: WebhookVerifier,
    counter: AtomicU64,
    requests: Mutex<Vec<IntentRequest>>,
    behavior: Mutex<Behavior>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_secret(MOCK_WEBHOOK_SECRET)
    }

    pub fn with_secret(secret: &str) -> Self {
        Self {
            verifier: WebhookVerifier::new(secret),
            counter: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
            behavior: Mutex::new(Behavior::default()),
        }
    }

    /// Reject every following intent request with `message`
    pub fn reject_with(&self, message: impl Into<String>) {
        self.lock_behavior().reject_with = Some(message.into());
    }

    /// Sleep before answering (for timeout tests)
    pub fn stall_for(&self, delay: Duration) {
        self.lock_behavior().delay = Some(delay);
    }

    /// Back to answering immediately and successfully
    pub fn reset(&self) {
        *self.lock_behavior() = Behavior::default();
    }

    /// Intent requests received so far
    pub fn requests(&self) -> Vec<IntentRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sign `payload` the way the gateway would deliver it
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        self.verifier.sign(payload, chrono::Utc::now().timestamp())
    }

    /// Body of a `payment_intent.succeeded` delivery
    pub fn succeeded_payload(
        event_id: &str,
        intent_id: &str,
        amount_minor: i64,
        metadata: &IntentMetadata,
    ) -> Vec<u8> {
        json!({
            "id": event_id,
            "object": "event",
            "type": EVENT_PAYMENT_SUCCEEDED,
            "data": {"object": {
                "id": intent_id,
                "object": "payment_intent",
                "amount": amount_minor,
                "amount_received": amount_minor,
                "currency": "usd",
                "metadata": metadata.to_map(),
            }}
        })
        .to_string()
        .into_bytes()
    }

    /// Body of a `payment_intent.payment_failed` delivery
    pub fn failed_payload(
        event_id: &str,
        intent_id: &str,
        message: &str,
        metadata: &IntentMetadata,
    ) -> Vec<u8> {
        json!({
            "id": event_id,
            "object": "event",
            "type": EVENT_PAYMENT_FAILED,
            "data": {"object": {
                "id": intent_id,
                "object": "payment_intent",
                "amount": 0,
                "currency": "usd",
                "metadata": metadata.to_map(),
                "last_payment_error": {"message": message},
            }}
        })
        .to_string()
        .into_bytes()
    }

    fn lock_behavior(&self) -> std::sync::MutexGuard<'_, Behavior> {
        self.behavior.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn secret_for(id: &str) -> String {
        format!("{id}_secret_mock")
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment_intent(&self, request: &IntentRequest) -> Result<CreatedIntent> {
        let (reject_with, delay) = {
            let behavior = self.lock_behavior();
            (behavior.reject_with.clone(), behavior.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(message) = reject_with {
            return Err(PaymentError::GatewayRejected(message));
        }
        if request.amount_minor <= 0 {
            return Err(PaymentError::GatewayRejected(
                "This value must be greater than or equal to 1.".into(),
            ));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_mock_{n:06}");
        Ok(CreatedIntent {
            client_secret: Self::secret_for(&id),
            id,
        })
    }

    async fn client_secret(&self, intent_id: &str) -> Result<String> {
        if intent_id.starts_with("pi_mock_") {
            Ok(Self::secret_for(intent_id))
        } else {
            Err(PaymentError::GatewayRejected(format!(
                "No such payment_intent: '{intent_id}'"
            )))
        }
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent> {
        self.verifier.verify(payload, signature)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount_minor: i64) -> IntentRequest {
        IntentRequest {
            amount_minor,
            currency: "usd".into(),
            metadata: IntentMetadata::default(),
            description: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_mock_intents_are_deterministic() {
        let gateway = MockGateway::new();

        let first = gateway.create_payment_intent(&request(1199)).await.unwrap();
        let second = gateway.create_payment_intent(&request(1199)).await.unwrap();

        assert_eq!(first.id, "pi_mock_000001");
        assert_eq!(second.id, "pi_mock_000002");
        assert_eq!(gateway.client_secret(&first.id).await.unwrap(), first.client_secret);
        assert_eq!(gateway.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_rejection() {
        let gateway = MockGateway::new();
        gateway.reject_with("Your card was declined.");

        let err = gateway.create_payment_intent(&request(1199)).await.unwrap_err();
        assert!(matches!(err, PaymentError::GatewayRejected(msg) if msg == "Your card was declined."));

        gateway.reset();
        assert!(gateway.create_payment_intent(&request(1199)).await.is_ok());
    }

    #[test]
    fn test_signed_payloads_verify() {
        let gateway = MockGateway::new();
        let metadata = IntentMetadata {
            order_id: Some("ord_1".into()),
            ..IntentMetadata::default()
        };
        let payload = MockGateway::failed_payload("evt_9", "pi_mock_000001", "declined", &metadata);
        let header = gateway.sign(&payload).unwrap();

        let event = gateway.verify_event(&payload, &header).unwrap();
        assert_eq!(event.event_id(), "evt_9");
        assert_eq!(event.event_type(), EVENT_PAYMENT_FAILED);
    }
}
