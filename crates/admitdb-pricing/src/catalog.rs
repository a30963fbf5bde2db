//! Plan Catalog
//!
//! Purchasable plans, their prices and the capabilities they unlock, plus
//! the coupon table. Ships with a four-plan sample catalog; deployments can
//! load their own from JSON.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use admitdb_core::{AccessPolicy, Capability, PlanId, DEFAULT_TERM_MONTHS};

use crate::error::{PricingError, Result};

/// A purchasable SKU
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,

    /// Display name (e.g. "Admissions Cheatsheet")
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Price in dollars
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,

    /// Length of the subscription a purchase grants
    #[serde(default = "default_term_months")]
    pub term_months: u32,

    /// Content areas unlocked while the subscription is current
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_term_months() -> u32 {
    DEFAULT_TERM_MONTHS
}

const fn default_active() -> bool {
    true
}

/// A discount code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,

    /// Percent off the base price (0-100)
    pub percent_off: u8,
}

impl Coupon {
    pub fn new(code: impl Into<String>, percent_off: u8) -> Self {
        Self {
            code: code.into(),
            percent_off,
        }
    }

    /// Case-insensitive exact match, ignoring surrounding whitespace
    pub fn matches(&self, code: &str) -> bool {
        self.code.eq_ignore_ascii_case(code.trim())
    }
}

/// Plans and coupons for one storefront
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default = "default_currency")]
    pub currency: String,

    pub plans: Vec<Plan>,

    #[serde(default)]
    pub coupons: Vec<Coupon>,
}

fn default_currency() -> String {
    "usd".into()
}

impl Catalog {
    /// The built-in sample catalog
    pub fn sample() -> Self {
        use Capability::{Application, Basic, Profiles};

        let plan = |id: &str, name: &str, description: &str, price: Decimal, caps: Vec<Capability>| Plan {
            id: PlanId::new(id),
            name: name.into(),
            description: description.into(),
            price,
            term_months: DEFAULT_TERM_MONTHS,
            capabilities: caps,
            active: true,
        };

        Self {
            currency: default_currency(),
            plans: vec![
                plan(
                    "cheatsheet",
                    "Admissions Cheatsheet",
                    "School-by-school stats and deadlines at a glance",
                    dec!(14.99),
                    vec![Basic],
                ),
                plan(
                    "profiles",
                    "Applicant Profiles",
                    "Full database of accepted applicant profiles",
                    dec!(29.99),
                    vec![Basic, Profiles],
                ),
                plan(
                    "application",
                    "Application Toolkit",
                    "Personal statement and secondary essay material",
                    dec!(39.99),
                    vec![Basic, Application],
                ),
                plan(
                    "complete",
                    "Complete Bundle",
                    "Profiles, application toolkit and cheatsheet",
                    dec!(59.99),
                    vec![Basic, Profiles, Application],
                ),
            ],
            coupons: vec![
                Coupon::new("STUDENT2025", 20),
                Coupon::new("WELCOME10", 10),
                Coupon::new("PARTNER", 100),
            ],
        }
    }

    /// Parse and validate a JSON catalog
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a JSON catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            plans = catalog.plans.len(),
            coupons = catalog.coupons.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    /// Check ids are unique, prices non-negative and percentages in range
    pub fn validate(&self) -> Result<()> {
        if self.plans.is_empty() {
            return Err(PricingError::InvalidCatalog("catalog has no plans".into()));
        }

        let mut ids = HashSet::new();
        for plan in &self.plans {
            if plan.id.as_str().is_empty() {
                return Err(PricingError::InvalidCatalog("plan with empty id".into()));
            }
            if !ids.insert(plan.id.clone()) {
                return Err(PricingError::InvalidCatalog(format!("duplicate plan id {}", plan.id)));
            }
            if plan.price.is_sign_negative() {
                return Err(PricingError::InvalidCatalog(format!("plan {} has a negative price", plan.id)));
            }
            if plan.term_months == 0 {
                return Err(PricingError::InvalidCatalog(format!("plan {} has a zero term", plan.id)));
            }
        }

        let mut codes = HashSet::new();
        for coupon in &self.coupons {
            if coupon.percent_off > 100 {
                return Err(PricingError::InvalidCatalog(format!(
                    "coupon {} exceeds 100% off",
                    coupon.code
                )));
            }
            if !codes.insert(coupon.code.to_ascii_uppercase()) {
                return Err(PricingError::InvalidCatalog(format!(
                    "duplicate coupon code {}",
                    coupon.code
                )));
            }
        }
        Ok(())
    }

    /// Look up a plan by id, active or not
    pub fn plan(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| &p.id == id)
    }

    pub fn active_plans(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter().filter(|p| p.active)
    }

    pub fn coupon(&self, code: &str) -> Option<&Coupon> {
        self.coupons.iter().find(|c| c.matches(code))
    }

    /// Display name for a plan id, falling back to the id itself
    pub fn plan_name(&self, id: &PlanId) -> String {
        self.plan(id)
            .map_or_else(|| id.to_string(), |p| p.name.clone())
    }

    /// The plan -> capability table used by the access gate
    pub fn access_policy(&self) -> AccessPolicy {
        self.plans.iter().fold(AccessPolicy::new(), |policy, plan| {
            policy.with_plan(plan.id.clone(), plan.capabilities.iter().copied())
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_catalog_is_valid() {
        let catalog = Catalog::sample();
        catalog.validate().unwrap();
        assert_eq!(catalog.plans.len(), 4);
        assert_eq!(
            catalog.plan(&PlanId::new("cheatsheet")).map(|p| p.price),
            Some(dec!(14.99))
        );
    }

    #[test]
    fn test_coupon_lookup_ignores_case() {
        let catalog = Catalog::sample();
        assert_eq!(catalog.coupon("student2025").map(|c| c.percent_off), Some(20));
        assert_eq!(catalog.coupon(" Partner ").map(|c| c.percent_off), Some(100));
        assert!(catalog.coupon("STUDENT").is_none());
    }

    #[test]
    fn test_from_json_defaults() {
        let catalog = Catalog::from_json(
            r#"{
                "plans": [
                    {"id": "mcat", "name": "MCAT Pack", "price": 9.5, "capabilities": ["basic"]}
                ],
                "coupons": [{"code": "HALF", "percentOff": 50}]
            }"#,
        )
        .unwrap();

        let plan = catalog.plan(&PlanId::new("mcat")).unwrap();
        assert_eq!(plan.price, dec!(9.5));
        assert_eq!(plan.term_months, DEFAULT_TERM_MONTHS);
        assert!(plan.active);
        assert_eq!(catalog.currency, "usd");
    }

    #[test]
    fn test_validation_rejects_bad_catalogs() {
        let duplicate = r#"{"plans": [
            {"id": "a", "name": "A", "price": 1},
            {"id": "a", "name": "A again", "price": 2}
        ]}"#;
        assert!(matches!(
            Catalog::from_json(duplicate),
            Err(PricingError::InvalidCatalog(_))
        ));

        let too_generous = r#"{"plans": [{"id": "a", "name": "A", "price": 1}],
            "coupons": [{"code": "X", "percentOff": 150}]}"#;
        assert!(Catalog::from_json(too_generous).is_err());

        assert!(matches!(
            Catalog::from_json("{not json"),
            Err(PricingError::Serialization(_))
        ));
    }

    #[test]
    fn test_access_policy_from_catalog() {
        let policy = Catalog::sample().access_policy();
        let caps = policy.plan_capabilities(&PlanId::new("complete")).unwrap();
        assert!(caps.contains(&Capability::Application));
        assert!(caps.contains(&Capability::Profiles));
    }
}
