//! In-memory document store
//!
//! Holds every collection behind one lock so a settlement (order status,
//! user grant, processed event id) is applied as a single write.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    OrderStore, ProductStore, Resolution, Settlement, SettlementOutcome, SettlementStore,
    UserStore,
};
use crate::account::{
    make_sole_default, Address, AddressInput, DefaultFlag, PaymentMethodInput,
    PaymentMethodSummary,
};
use crate::error::{CoreError, Result};
use crate::ids::{OrderId, UserId};
use crate::order::{NewOrder, Order};
use crate::product::{Product, ProductInput};
use crate::user::{NewUser, User};

#[derive(Default)]
struct Collections {
    orders: HashMap<OrderId, Order>,
    idempotency_keys: HashMap<String, OrderId>,
    users: HashMap<UserId, User>,
    products: HashMap<String, Product>,
    processed_events: HashSet<String>,
}

impl Collections {
    fn user_mut(&mut self, id: &UserId) -> Result<&mut User> {
        self.users
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("User", id.as_str()))
    }
}

/// In-memory store (for development and tests)
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert `entry`, clearing the other defaults when it is flagged default
fn insert_entry<T: DefaultFlag>(items: &mut Vec<T>, entry: T) -> Result<()> {
    if items.iter().any(|item| item.id() == entry.id()) {
        return Err(CoreError::Conflict(format!("entry {} already exists", entry.id())));
    }
    let id = entry.id().to_string();
    let is_default = entry.is_default();
    items.push(entry);
    if is_default {
        make_sole_default(items, &id);
    }
    Ok(())
}

fn remove_entry<T: DefaultFlag>(items: &mut Vec<T>, kind: &'static str, id: &str) -> Result<()> {
    let before = items.len();
    items.retain(|item| item.id() != id);
    if items.len() == before {
        return Err(CoreError::not_found(kind, id));
    }
    Ok(())
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, input: NewOrder) -> Result<Order> {
        let mut docs = self.docs.write().await;

        if let Some(key) = input.idempotency_key.as_deref() {
            if docs.idempotency_keys.contains_key(key) {
                return Err(CoreError::Conflict(format!(
                    "an order already exists for idempotency key {key}"
                )));
            }
        }

        let order = Order::new(input, Utc::now());
        if let Some(key) = &order.idempotency_key {
            docs.idempotency_keys.insert(key.clone(), order.id.clone());
        }
        docs.orders.insert(order.id.clone(), order.clone());

        tracing::debug!(order_id = %order.id, plan = %order.plan, "Stored pending order");
        Ok(order)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let docs = self.docs.read().await;
        Ok(docs.orders.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let docs = self.docs.read().await;
        let mut orders: Vec<Order> = docs.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        let docs = self.docs.read().await;
        Ok(docs
            .idempotency_keys
            .get(key)
            .and_then(|id| docs.orders.get(id))
            .cloned())
    }

    async fn attach_payment_intent(&self, id: &OrderId, intent_id: &str) -> Result<Order> {
        let mut docs = self.docs.write().await;
        let order = docs
            .orders
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Order", id.as_str()))?;

        order.attach_payment_intent(intent_id, Utc::now())?;
        Ok(order.clone())
    }

    async fn mark_failed(&self, id: &OrderId, reason: &str) -> Result<Order> {
        let mut docs = self.docs.write().await;
        let order = docs
            .orders
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Order", id.as_str()))?;

        order.fail(reason, Utc::now())?;
        Ok(order.clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, input: NewUser) -> Result<User> {
        let mut docs = self.docs.write().await;
        if docs.users.contains_key(&input.id) {
            return Err(CoreError::Conflict(format!("user {} already exists", input.id)));
        }
        let user = User::new(input, Utc::now());
        docs.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get(&self, id: &UserId) -> Result<Option<User>> {
        let docs = self.docs.read().await;
        Ok(docs.users.get(id).cloned())
    }

    async fn add_address(&self, user_id: &UserId, input: AddressInput) -> Result<Address> {
        let address = Address::from_input(input)?;
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;

        insert_entry(&mut user.addresses, address.clone())?;
        Ok(address)
    }

    async fn update_address(
        &self,
        user_id: &UserId,
        address_id: &str,
        input: AddressInput,
    ) -> Result<Address> {
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;

        let address = user
            .addresses
            .iter_mut()
            .find(|a| a.id == address_id)
            .ok_or_else(|| CoreError::not_found("Address", address_id))?;
        address.apply(input)?;
        let updated = address.clone();

        if updated.is_default {
            make_sole_default(&mut user.addresses, address_id);
        }
        Ok(updated)
    }

    async fn remove_address(&self, user_id: &UserId, address_id: &str) -> Result<()> {
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;
        remove_entry(&mut user.addresses, "Address", address_id)
    }

    async fn set_default_address(&self, user_id: &UserId, address_id: &str) -> Result<()> {
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;
        if !make_sole_default(&mut user.addresses, address_id) {
            return Err(CoreError::not_found("Address", address_id));
        }
        Ok(())
    }

    async fn add_payment_method(
        &self,
        user_id: &UserId,
        input: PaymentMethodInput,
    ) -> Result<PaymentMethodSummary> {
        let summary = PaymentMethodSummary::from_input(input)?;
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;

        insert_entry(&mut user.payment_methods, summary.clone())?;
        Ok(summary)
    }

    async fn update_payment_method(
        &self,
        user_id: &UserId,
        method_id: &str,
        input: PaymentMethodInput,
    ) -> Result<PaymentMethodSummary> {
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;

        let method = user
            .payment_methods
            .iter_mut()
            .find(|p| p.id == method_id)
            .ok_or_else(|| CoreError::not_found("Payment method", method_id))?;
        method.apply(input)?;
        let updated = method.clone();

        if updated.is_default {
            make_sole_default(&mut user.payment_methods, method_id);
        }
        Ok(updated)
    }

    async fn remove_payment_method(&self, user_id: &UserId, method_id: &str) -> Result<()> {
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;
        remove_entry(&mut user.payment_methods, "Payment method", method_id)
    }

    async fn set_default_payment_method(&self, user_id: &UserId, method_id: &str) -> Result<()> {
        let mut docs = self.docs.write().await;
        let user = docs.user_mut(user_id)?;
        if !make_sole_default(&mut user.payment_methods, method_id) {
            return Err(CoreError::not_found("Payment method", method_id));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn create(&self, input: ProductInput, actor: &str) -> Result<Product> {
        let product = Product::create(input, actor, Utc::now())?;
        let mut docs = self.docs.write().await;
        docs.products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        let docs = self.docs.read().await;
        Ok(docs.products.get(id).cloned())
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Product>> {
        let docs = self.docs.read().await;
        let mut products: Vec<Product> = docs
            .products
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect();

        products.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(products)
    }

    async fn update(&self, id: &str, input: ProductInput, actor: &str) -> Result<Product> {
        let mut docs = self.docs.write().await;
        let product = docs
            .products
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Product", id))?;

        product.update(input, actor, Utc::now())?;
        Ok(product.clone())
    }

    async fn delete(&self, id: &str) -> Result<Product> {
        let mut docs = self.docs.write().await;
        docs.products
            .remove(id)
            .ok_or_else(|| CoreError::not_found("Product", id))
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn settle(&self, settlement: Settlement) -> Result<SettlementOutcome> {
        let mut guard = self.docs.write().await;
        let docs = &mut *guard;

        if docs.processed_events.contains(&settlement.event_id) {
            return Ok(SettlementOutcome::DuplicateEvent);
        }

        let mut order = docs
            .orders
            .get(&settlement.order_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Order", settlement.order_id.as_str()))?;

        if order.status.is_settled() {
            docs.processed_events.insert(settlement.event_id);
            return Ok(SettlementOutcome::AlreadySettled(order));
        }

        match settlement.resolution {
            Resolution::Complete { grant } => {
                order.complete(settlement.at)?;

                if let Some(subscription) = grant {
                    let user_id = order.user_id.user_id().cloned().ok_or_else(|| {
                        CoreError::Validation("guest orders cannot carry a subscription".into())
                    })?;
                    let summary = order.summary();
                    let user = docs.user_mut(&user_id)?;
                    if !user.grant(subscription, summary) {
                        tracing::warn!(
                            order_id = %order.id,
                            user_id = %user_id,
                            "Subscription for order already present, not appending"
                        );
                    }
                }
            }
            Resolution::Fail { reason } => {
                order.fail(reason, settlement.at)?;
            }
        }

        docs.orders.insert(order.id.clone(), order.clone());
        docs.processed_events.insert(settlement.event_id);

        Ok(SettlementOutcome::Applied(order))
    }

    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let docs = self.docs.read().await;
        Ok(docs.processed_events.contains(event_id))
    }
}
