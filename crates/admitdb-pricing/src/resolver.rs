//! Pricing/Discount Resolver
//!
//! Turns `(plan, coupon?)` into a price quote. Pure and deterministic: the
//! same catalog, policy and inputs always produce the same quote, rounded
//! to cents.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use admitdb_core::PlanId;

use crate::catalog::{Catalog, Plan};
use crate::error::{PricingError, Result};

/// Round to the currency's minor unit
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Dollars to cents
pub fn to_minor_units(amount: Decimal) -> i64 {
    (round2(amount) * dec!(100)).trunc().to_i64().unwrap_or(i64::MAX)
}

/// Charging policy shared by every call site
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Minimum chargeable amount in dollars
    pub floor_amount: Decimal,
}

impl PricingPolicy {
    pub fn with_floor(floor_amount: Decimal) -> Self {
        Self {
            floor_amount: round2(floor_amount),
        }
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            floor_amount: Decimal::ZERO,
        }
    }
}

/// Resolved price for one plan and optional coupon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub plan: PlanId,

    pub plan_name: String,

    /// Catalog price
    #[serde(with = "rust_decimal::serde::float")]
    pub base_amount: Decimal,

    /// Percent off applied (0-100)
    pub discount: u8,

    /// Amount to charge
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// Canonical (catalog) spelling of the applied coupon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,

    pub currency: String,

    /// Subscription length granted on fulfillment
    pub term_months: u32,
}

impl PriceQuote {
    /// Amount in cents, as the payment gateway expects it
    pub fn final_amount_minor(&self) -> i64 {
        to_minor_units(self.amount)
    }

    pub fn is_free(&self) -> bool {
        self.amount.is_zero()
    }
}

/// Resolves prices against a catalog
#[derive(Clone, Debug)]
pub struct PriceResolver {
    catalog: Arc<Catalog>,
    policy: PricingPolicy,
}

impl PriceResolver {
    /// Build a resolver, rejecting a floor above the cheapest plan
    pub fn new(catalog: Arc<Catalog>, policy: PricingPolicy) -> Result<Self> {
        catalog.validate()?;

        if policy.floor_amount.is_sign_negative() {
            return Err(PricingError::InvalidCatalog("minimum charge cannot be negative".into()));
        }
        if let Some(cheapest) = catalog.plans.iter().min_by_key(|p| p.price) {
            if cheapest.price < policy.floor_amount {
                return Err(PricingError::InvalidCatalog(format!(
                    "plan {} costs {} which is below the minimum charge {}",
                    cheapest.id, cheapest.price, policy.floor_amount
                )));
            }
        }

        Ok(Self { catalog, policy })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub const fn policy(&self) -> PricingPolicy {
        self.policy
    }

    /// Resolve the price of `plan` with an optional coupon.
    ///
    /// An empty or whitespace coupon means no coupon. Inactive plans are
    /// not purchasable.
    pub fn resolve(&self, plan: &PlanId, coupon_code: Option<&str>) -> Result<PriceQuote> {
        let entry = self
            .catalog
            .plan(plan)
            .filter(|p| p.active)
            .ok_or_else(|| PricingError::UnknownPlan(plan.to_string()))?;

        let coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(
                self.catalog
                    .coupon(code)
                    .ok_or_else(|| PricingError::InvalidCoupon(code.to_string()))?,
            ),
            None => None,
        };

        let discount = coupon.map_or(0, |c| c.percent_off);
        let amount = self.apply_discount(entry, discount);

        tracing::debug!(
            plan = %entry.id,
            coupon = coupon.map(|c| c.code.as_str()),
            base = %entry.price,
            amount = %amount,
            "Resolved price"
        );

        Ok(PriceQuote {
            plan: entry.id.clone(),
            plan_name: entry.name.clone(),
            base_amount: entry.price,
            discount,
            amount,
            coupon_code: coupon.map(|c| c.code.clone()),
            currency: self.catalog.currency.clone(),
            term_months: entry.term_months,
        })
    }

    fn apply_discount(&self, plan: &Plan, percent_off: u8) -> Decimal {
        let base = plan.price;
        let off = base * Decimal::from(percent_off) / dec!(100);
        round2(base - off).max(self.policy.floor_amount).min(base)
    }
}
