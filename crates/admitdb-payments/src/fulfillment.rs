//! Webhook Fulfillment
//!
//! Turns verified gateway events into order settlements. A succeeded
//! payment completes the order and grants the plan to an authenticated
//! buyer; a failed payment fails the order. Settled orders and replayed
//! events are explicit no-ops.
//!
//! | Order     | Event                          | Result            |
//! |-----------|--------------------------------|-------------------|
//! | pending   | `payment_intent.succeeded`     | completed + grant |
//! | pending   | `payment_intent.payment_failed`| failed            |
//! | failed    | `payment_intent.succeeded`     | `PaidAfterFailure`|
//! | settled   | any other                      | `AlreadySettled`  |
//! | any       | processed event id             | `DuplicateEvent`  |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use admitdb_core::{
    CoreError, Order, OrderId, OrderStatus, OrderStore, Resolution, Settlement, SettlementOutcome,
    SettlementStore, Subscription, DEFAULT_TERM_MONTHS,
};
use admitdb_pricing::{to_minor_units, Catalog};

use crate::error::Result;
use crate::gateway::{GatewayEvent, IntentMetadata, PaymentGateway};

/// Prefix of the synthetic event id used for zero-amount orders
pub const FREE_EVENT_PREFIX: &str = "free:";

/// What handling an event did
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum FulfillmentOutcome {
    /// Order completed; `granted` is false for guest orders
    #[serde(rename_all = "camelCase")]
    Completed { order_id: OrderId, granted: bool },

    /// Order failed
    #[serde(rename_all = "camelCase")]
    Failed { order_id: OrderId },

    /// Order had already settled; nothing changed
    #[serde(rename_all = "camelCase")]
    AlreadySettled { order_id: OrderId, status: OrderStatus },

    /// Payment captured for an order that had already failed (e.g. after a
    /// gateway timeout); needs manual reconciliation
    #[serde(rename_all = "camelCase")]
    PaidAfterFailure { order_id: OrderId, intent_id: String },

    /// Event id already applied
    DuplicateEvent,

    /// Payment intent carries no `orderId`
    MissingOrderReference,

    /// `orderId` does not name a stored order
    #[serde(rename_all = "camelCase")]
    OrderNotFound { order_id: String },

    /// Event type we do not act on
    #[serde(rename_all = "camelCase")]
    Ignored { event_type: String },
}

/// Applies gateway events to the order and user stores
pub struct FulfillmentHandler {
    orders: Arc<dyn OrderStore>,
    settlements: Arc<dyn SettlementStore>,
    catalog: Arc<Catalog>,
}

impl FulfillmentHandler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        settlements: Arc<dyn SettlementStore>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            orders,
            settlements,
            catalog,
        }
    }

    /// Verify a raw delivery with `gateway`, then handle it
    pub async fn receive(
        &self,
        gateway: &dyn PaymentGateway,
        payload: &[u8],
        signature: &str,
    ) -> Result<FulfillmentOutcome> {
        let event = gateway.verify_event(payload, signature).map_err(|e| {
            tracing::warn!(gateway = gateway.name(), error = %e, "Rejected webhook delivery");
            e
        })?;
        self.handle(event).await
    }

    /// Apply a verified event
    pub async fn handle(&self, event: GatewayEvent) -> Result<FulfillmentOutcome> {
        tracing::info!(
            event_id = event.event_id(),
            event_type = event.event_type(),
            "Processing webhook event"
        );

        match event {
            GatewayEvent::PaymentSucceeded {
                event_id,
                intent_id,
                amount_minor,
                metadata,
                ..
            } => {
                let Some(order) = self.locate(&event_id, &metadata).await? else {
                    return self.unresolved(&event_id, &metadata).await;
                };
                check_consistency(&order, &intent_id, &metadata);
                let expected = to_minor_units(order.amount);
                if expected != amount_minor {
                    tracing::warn!(
                        order_id = %order.id,
                        expected,
                        charged = amount_minor,
                        "Charged amount differs from order amount"
                    );
                }
                match self.complete(&order, event_id, Utc::now()).await? {
                    FulfillmentOutcome::AlreadySettled {
                        order_id,
                        status: OrderStatus::Failed,
                    } => {
                        tracing::error!(
                            order_id = %order_id,
                            intent_id = %intent_id,
                            amount_minor,
                            "Payment captured for a failed order, reconcile manually"
                        );
                        Ok(FulfillmentOutcome::PaidAfterFailure { order_id, intent_id })
                    }
                    other => Ok(other),
                }
            }

            GatewayEvent::PaymentFailed {
                event_id,
                intent_id,
                message,
                metadata,
            } => {
                let Some(order) = self.locate(&event_id, &metadata).await? else {
                    return self.unresolved(&event_id, &metadata).await;
                };
                check_consistency(&order, &intent_id, &metadata);
                self.fail(&order, event_id, message, Utc::now()).await
            }

            GatewayEvent::Other { event_type, .. } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(FulfillmentOutcome::Ignored { event_type })
            }
        }
    }

    /// Settle a zero-amount order without a gateway round trip
    pub async fn settle_free(&self, order: &Order) -> Result<Order> {
        let event_id = format!("{FREE_EVENT_PREFIX}{}", order.id);
        let outcome = self.complete(order, event_id, Utc::now()).await?;
        tracing::debug!(order_id = %order.id, ?outcome, "Settled zero-amount order");

        self.orders
            .get(&order.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order.id.as_str()).into())
    }

    async fn locate(&self, event_id: &str, metadata: &IntentMetadata) -> Result<Option<Order>> {
        if self.settlements.is_processed(event_id).await? {
            return Ok(None);
        }
        match &metadata.order_id {
            Some(id) => Ok(self.orders.get(&OrderId::from_string(id.as_str())).await?),
            None => Ok(None),
        }
    }

    /// Classify why [`locate`](Self::locate) found nothing
    async fn unresolved(&self, event_id: &str, metadata: &IntentMetadata) -> Result<FulfillmentOutcome> {
        if self.settlements.is_processed(event_id).await? {
            tracing::info!(event_id, "Webhook event already processed");
            return Ok(FulfillmentOutcome::DuplicateEvent);
        }
        match &metadata.order_id {
            None => {
                tracing::error!(event_id, "Payment intent has no orderId metadata");
                Ok(FulfillmentOutcome::MissingOrderReference)
            }
            Some(id) => {
                tracing::error!(event_id, order_id = %id, "Webhook references unknown order");
                Ok(FulfillmentOutcome::OrderNotFound {
                    order_id: id.clone(),
                })
            }
        }
    }

    async fn complete(
        &self,
        order: &Order,
        event_id: String,
        at: DateTime<Utc>,
    ) -> Result<FulfillmentOutcome> {
        let grant = order.user_id.user_id().map(|_| {
            let term = self
                .catalog
                .plan(&order.plan)
                .map_or(DEFAULT_TERM_MONTHS, |p| p.term_months);
            Subscription::starting_at(
                order.plan.clone(),
                order.plan_name.clone(),
                order.id.clone(),
                at,
                term,
            )
        });
        let granted = grant.is_some();

        let outcome = self
            .settlements
            .settle(Settlement {
                event_id,
                order_id: order.id.clone(),
                resolution: Resolution::Complete { grant },
                at,
            })
            .await
            .map_err(|e| {
                tracing::error!(order_id = %order.id, error = %e, "Failed to settle completed payment");
                e
            })?;

        Ok(match outcome {
            SettlementOutcome::Applied(order) => {
                tracing::info!(
                    order_id = %order.id,
                    plan = %order.plan,
                    user_id = %order.user_id,
                    granted,
                    "Order completed"
                );
                if !granted {
                    tracing::info!(order_id = %order.id, "Guest order completed without a subscription");
                }
                FulfillmentOutcome::Completed {
                    order_id: order.id,
                    granted,
                }
            }
            other => settled_outcome(other),
        })
    }

    async fn fail(
        &self,
        order: &Order,
        event_id: String,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<FulfillmentOutcome> {
        let outcome = self
            .settlements
            .settle(Settlement {
                event_id,
                order_id: order.id.clone(),
                resolution: Resolution::Fail { reason },
                at,
            })
            .await?;

        Ok(match outcome {
            SettlementOutcome::Applied(order) => {
                tracing::info!(
                    order_id = %order.id,
                    reason = order.failure_reason.as_deref().unwrap_or_default(),
                    "Order failed"
                );
                FulfillmentOutcome::Failed { order_id: order.id }
            }
            other => settled_outcome(other),
        })
    }
}

fn settled_outcome(outcome: SettlementOutcome) -> FulfillmentOutcome {
    match outcome {
        SettlementOutcome::AlreadySettled(order) => {
            tracing::info!(order_id = %order.id, status = %order.status, "Order already settled, ignoring event");
            FulfillmentOutcome::AlreadySettled {
                order_id: order.id,
                status: order.status,
            }
        }
        SettlementOutcome::DuplicateEvent | SettlementOutcome::Applied(_) => {
            FulfillmentOutcome::DuplicateEvent
        }
    }
}

/// The order is authoritative; mismatching metadata is only logged
fn check_consistency(order: &Order, intent_id: &str, metadata: &IntentMetadata) {
    if let Some(attached) = order.payment_intent_id.as_deref() {
        if attached != intent_id {
            tracing::warn!(order_id = %order.id, attached, intent_id, "Event intent differs from order intent");
        }
    }
    if metadata.plan.as_deref().is_some_and(|p| p != order.plan.as_str()) {
        tracing::warn!(order_id = %order.id, metadata_plan = ?metadata.plan, plan = %order.plan, "Plan metadata mismatch");
    }
    if metadata.user_id.as_deref().is_some_and(|u| u != order.user_id.as_str()) {
        tracing::warn!(order_id = %order.id, metadata_user = ?metadata.user_id, user_id = %order.user_id, "User metadata mismatch");
    }
}
