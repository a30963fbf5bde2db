//! Admin API
//!
//! Order listing and lookup plus product catalog management. Every route
//! sits behind a static bearer token.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use admitdb_core::{CoreError, Order, OrderId, Product, ProductInput};

use crate::handlers::{api_error, bad_json, store_error, ApiError};
use crate::state::AppState;

/// Recorded as `createdBy` / `updatedBy` on product writes
const ADMIN_ACTOR: &str = "admin";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Reject requests without the configured bearer token
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "Admin API not configured").into_response();
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented != Some(expected) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return api_error(StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    next.run(request).await
}

fn not_found(kind: &'static str, id: String) -> ApiError {
    store_error(&CoreError::not_found(kind, id))
}

/// Every order, newest first
pub async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, ApiError> {
    state
        .orders
        .list()
        .await
        .map(Json)
        .map_err(|e| store_error(&e))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    state
        .orders
        .get(&OrderId::from_string(id.clone()))
        .await
        .map_err(|e| store_error(&e))?
        .map(Json)
        .ok_or_else(|| not_found("Order", id))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    state
        .products
        .list(query.include_inactive)
        .await
        .map(Json)
        .map_err(|e| store_error(&e))
}

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    let product = state
        .products
        .create(input, ADMIN_ACTOR)
        .await
        .map_err(|e| store_error(&e))?;

    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    let product = state
        .products
        .update(&id, input, ADMIN_ACTOR)
        .await
        .map_err(|e| store_error(&e))?;

    tracing::info!(product_id = %product.id, "Product updated");
    Ok(Json(product))
}

/// Delete a product; the response carries its file reference for blob cleanup
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .products
        .delete(&id)
        .await
        .map_err(|e| store_error(&e))?;

    match &product.file {
        Some(file) => tracing::info!(product_id = %product.id, path = %file.path, "Product deleted; file pending cleanup"),
        None => tracing::info!(product_id = %product.id, "Product deleted"),
    }
    Ok(Json(product))
}
