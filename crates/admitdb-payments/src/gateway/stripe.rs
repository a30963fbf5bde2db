//! Stripe Payment Intents
//!
//! Creates intents with `async-stripe` and verifies webhooks locally with
//! the endpoint's signing secret.

use async_trait::async_trait;
use ::stripe::{
    Client, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods, Currency,
    PaymentIntent, PaymentIntentId, RequestStrategy, StripeError,
};

use super::{CreatedIntent, GatewayEvent, IntentRequest, PaymentGateway};
use crate::error::{PaymentError, Result};
use crate::webhook::WebhookVerifier;

/// Stripe client wrapper
pub struct StripeGateway {
    client: Client,
    verifier: WebhookVerifier,
}

impl StripeGateway {
    /// Create a new Stripe gateway
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            verifier: WebhookVerifier::new(webhook_secret),
        }
    }

    fn currency(code: &str) -> Result<Currency> {
        match code.to_ascii_lowercase().as_str() {
            "usd" => Ok(Currency::USD),
            other => Err(PaymentError::Validation(format!("Unsupported currency: {other}"))),
        }
    }
}

/// Stripe's own message for rejected requests; everything else is an outage
fn map_stripe_error(err: StripeError) -> PaymentError {
    match err {
        StripeError::Stripe(req) => {
            tracing::warn!(status = req.http_status, code = ?req.code, "Stripe rejected request");
            PaymentError::GatewayRejected(
                req.message
                    .unwrap_or_else(|| format!("Stripe request failed ({})", req.http_status)),
            )
        }
        other => {
            tracing::error!(error = %other, "Stripe request failed");
            PaymentError::ServiceUnavailable("Payment gateway")
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, request: &IntentRequest) -> Result<CreatedIntent> {
        let mut params = CreatePaymentIntent::new(request.amount_minor, Self::currency(&request.currency)?);
        params.metadata = Some(request.metadata.to_map());
        params.description = request.description.as_deref();
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            allow_redirects: None,
        });

        let client = match &request.idempotency_key {
            Some(key) => self
                .client
                .clone()
                .with_strategy(RequestStrategy::Idempotent(key.clone())),
            None => self.client.clone(),
        };

        let intent = PaymentIntent::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::GatewayRejected("No client secret returned".into()))?;

        tracing::info!(
            intent_id = %intent.id,
            amount = request.amount_minor,
            "Created Stripe payment intent"
        );

        Ok(CreatedIntent {
            id: intent.id.to_string(),
            client_secret,
        })
    }

    async fn client_secret(&self, intent_id: &str) -> Result<String> {
        let id: PaymentIntentId = intent_id
            .parse()
            .map_err(|_| PaymentError::Validation(format!("Invalid payment intent id: {intent_id}")))?;

        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(map_stripe_error)?;

        intent
            .client_secret
            .ok_or_else(|| PaymentError::GatewayRejected("No client secret returned".into()))
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent> {
        self.verifier.verify(payload, signature)
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}
