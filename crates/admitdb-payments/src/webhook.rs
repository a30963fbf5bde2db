//! Stripe Webhook Verification
//!
//! Checks the `stripe-signature` header (`t=<unix>,v1=<hex hmac>`) against
//! the shared signing secret and parses the verified body into a
//! [`GatewayEvent`]. Nothing is parsed before the signature checks out.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayEvent, IntentMetadata};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed timestamp (Stripe's default)
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

/// Verifies and signs webhook payloads with one secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[redacted]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify `signature` for `payload` and parse the event
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent> {
        self.verify_at(payload, signature, Utc::now())
    }

    /// [`verify`](Self::verify) against an explicit clock
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<GatewayEvent> {
        let header = SignatureHeader::parse(signature)?;

        let age = now.timestamp() - header.timestamp;
        if age > self.tolerance_secs || age < -self.tolerance_secs {
            return Err(PaymentError::WebhookSignature(format!(
                "timestamp outside the tolerance zone ({age}s)"
            )));
        }

        let mac = self.mac_for(header.timestamp, payload)?;
        let matched = header.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
        });
        if !matched {
            return Err(PaymentError::WebhookSignature(
                "no signatures found matching the expected signature for payload".into(),
            ));
        }

        parse_event(payload)
    }

    /// Produce a `stripe-signature` header value for `payload`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let mac = self.mac_for(timestamp, payload)?;
        Ok(format!(
            "t={timestamp},v1={}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PaymentError::Config(format!("invalid webhook secret: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    fn parse(header: &'a str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = Some(t),
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| PaymentError::WebhookSignature("unable to extract timestamp from header".into()))?
            .parse()
            .map_err(|_| PaymentError::WebhookSignature("invalid timestamp in header".into()))?;

        if signatures.is_empty() {
            return Err(PaymentError::WebhookSignature(
                "no v1 signatures found in header".into(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawPaymentIntent {
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    amount_received: Option<i64>,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
    #[serde(default)]
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Deserialize)]
struct RawPaymentError {
    #[serde(default)]
    message: Option<String>,
}

/// Parse an already-verified event body
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

    let intent = || -> Result<RawPaymentIntent> {
        serde_json::from_value(raw.data.object.clone())
            .map_err(|e| PaymentError::WebhookParse(format!("invalid payment intent: {e}")))
    };

    match raw.event_type.as_str() {
        EVENT_PAYMENT_SUCCEEDED => {
            let pi = intent()?;
            Ok(GatewayEvent::PaymentSucceeded {
                event_id: raw.id,
                intent_id: pi.id,
                amount_minor: pi.amount_received.unwrap_or(pi.amount),
                currency: pi.currency,
                metadata: IntentMetadata::from_map(&pi.metadata),
            })
        }
        EVENT_PAYMENT_FAILED => {
            let pi = intent()?;
            let message = pi
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "payment failed".into());
            Ok(GatewayEvent::PaymentFailed {
                event_id: raw.id,
                intent_id: pi.id,
                message,
                metadata: IntentMetadata::from_map(&pi.metadata),
            })
        }
        _ => Ok(GatewayEvent::Other {
            event_id: raw.id,
            event_type: raw.event_type.clone(),
        }),
    }
}
