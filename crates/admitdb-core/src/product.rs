//! Product Catalog Entries
//!
//! Admin-managed catalog records shown on the storefront.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    Digital,
    Physical,
}

/// Uploaded file attached to a product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub url: String,
    /// Path in blob storage, used to delete the blob with the product
    pub path: String,
    pub size: u64,
    pub content_type: String,
}

/// Fields an admin submits when creating or editing a product
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default, rename = "type")]
    pub product_type: ProductType,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub file: Option<FileRef>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

const fn default_active() -> bool {
    true
}

impl ProductInput {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("Product name is required".into()));
        }
        if self.price.is_sign_negative() {
            return Err(CoreError::Validation("Product price cannot be negative".into()));
        }
        Ok(())
    }
}

/// A catalog entry as stored in the `products` collection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub category: String,
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Product {
    pub fn create(input: ProductInput, actor: &str, now: DateTime<Utc>) -> Result<Self> {
        input.validate()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            description: input.description,
            price: input.price.round_dp(2),
            product_type: input.product_type,
            category: input.category,
            features: input.features,
            file: input.file,
            is_active: input.is_active,
            sort_order: input.sort_order,
            created_at: now,
            created_by: actor.to_string(),
            updated_at: now,
            updated_by: actor.to_string(),
        })
    }

    /// Apply an edit, keeping id and creation audit fields
    pub fn update(&mut self, input: ProductInput, actor: &str, now: DateTime<Utc>) -> Result<()> {
        input.validate()?;
        self.name = input.name.trim().to_string();
        self.description = input.description;
        self.price = input.price.round_dp(2);
        self.product_type = input.product_type;
        self.category = input.category;
        self.features = input.features;
        self.file = input.file;
        self.is_active = input.is_active;
        self.sort_order = input.sort_order;
        self.updated_at = now;
        self.updated_by = actor.to_string();
        Ok(())
    }
}
