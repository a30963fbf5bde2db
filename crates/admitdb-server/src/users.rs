//! User Account API
//!
//! Sign-up creates the user document that signed-in checkouts settle onto.
//! Saved addresses and cards hang off the same document. Identity comes from
//! the external auth provider; the id in the path is trusted as given.

use std::collections::BTreeSet;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;

use admitdb_core::{
    Address, AddressInput, Capability, CoreError, NewUser, PaymentMethodInput,
    PaymentMethodSummary, User, UserId,
};

use crate::handlers::{api_error, bad_json, store_error, ApiError};
use crate::state::AppState;

/// A user document with the capabilities it currently holds
#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub capabilities: BTreeSet<Capability>,
}

impl UserView {
    fn of(state: &AppState, user: User) -> Self {
        let capabilities = state.access.capabilities(&user, Utc::now());
        Self { user, capabilities }
    }
}

/// Create the user document after the auth provider signs someone up
pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    if input.id.as_str().trim().is_empty() || input.email.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing required fields: id and email"));
    }

    let user = state.users.create(input).await.map_err(|e| store_error(&e))?;
    tracing::info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(UserView::of(&state, user))))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let user = state
        .users
        .get(&UserId::from_string(id.clone()))
        .await
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| store_error(&CoreError::not_found("User", id)))?;

    Ok(Json(UserView::of(&state, user)))
}

// ============================================================================
// Addresses
// ============================================================================

pub async fn add_address(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AddressInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    let address = state
        .users
        .add_address(&UserId::from_string(id), input)
        .await
        .map_err(|e| store_error(&e))?;
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn update_address(
    State(state): State<AppState>,
    Path((id, address_id)): Path<(String, String)>,
    payload: Result<Json<AddressInput>, JsonRejection>,
) -> Result<Json<Address>, ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    state
        .users
        .update_address(&UserId::from_string(id), &address_id, input)
        .await
        .map(Json)
        .map_err(|e| store_error(&e))
}

pub async fn remove_address(
    State(state): State<AppState>,
    Path((id, address_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .remove_address(&UserId::from_string(id), &address_id)
        .await
        .map_err(|e| store_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_default_address(
    State(state): State<AppState>,
    Path((id, address_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .set_default_address(&UserId::from_string(id), &address_id)
        .await
        .map_err(|e| store_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Payment Methods
// ============================================================================

/// Save a card; only its summary is kept
pub async fn add_payment_method(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PaymentMethodInput>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentMethodSummary>), ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    let summary = state
        .users
        .add_payment_method(&UserId::from_string(id), input)
        .await
        .map_err(|e| store_error(&e))?;

    tracing::debug!(method_id = %summary.id, last_four = %summary.last_four_digits, "Payment method saved");
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Replace a saved card's details; the id stays the same
pub async fn update_payment_method(
    State(state): State<AppState>,
    Path((id, method_id)): Path<(String, String)>,
    payload: Result<Json<PaymentMethodInput>, JsonRejection>,
) -> Result<Json<PaymentMethodSummary>, ApiError> {
    let Json(input) = payload.map_err(|e| bad_json(&e))?;
    state
        .users
        .update_payment_method(&UserId::from_string(id), &method_id, input)
        .await
        .map(Json)
        .map_err(|e| store_error(&e))
}

pub async fn remove_payment_method(
    State(state): State<AppState>,
    Path((id, method_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .remove_payment_method(&UserId::from_string(id), &method_id)
        .await
        .map_err(|e| store_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_default_payment_method(
    State(state): State<AppState>,
    Path((id, method_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .set_default_payment_method(&UserId::from_string(id), &method_id)
        .await
        .map_err(|e| store_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}
