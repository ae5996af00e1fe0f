//! Token handlers: list, select, return, invalidate, health, usage.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::api::dto::{
    HealthUpdateRequest, SelectTokenRequest, SelectTokenResponse, TokenListResponse, TokenView,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GridError};
use crate::service::AttributeUsage;

/// `GET /tokens` — List all registered tokens.
#[utoipa::path(
    get,
    path = "/api/v1/tokens",
    tag = "Tokens",
    summary = "List registered tokens",
    description = "Returns every registered token with its reservation flag, health marker, and current owner reference.",
    responses(
        (status = 200, description = "Token list", body = TokenListResponse),
    )
)]
pub async fn list_tokens(State(state): State<AppState>) -> impl IntoResponse {
    let statuses = state.grid.tokens().await;
    let tokens: Vec<TokenView> = statuses.iter().map(TokenView::from).collect();
    let total = tokens.len();
    Json(TokenListResponse { tokens, total })
}

/// `POST /tokens/select` — Select and reserve the best matching token.
///
/// Blocks until a matching token becomes free or a timeout elapses. The
/// longer match timeout applies while a matching token exists but is
/// reserved; the shorter no-match timeout fast-fails requests nothing in
/// the pool could ever satisfy.
///
/// # Errors
///
/// Returns [`GridError`] on bad patterns, timeouts, or grid shutdown.
#[utoipa::path(
    post,
    path = "/api/v1/tokens/select",
    tag = "Tokens",
    summary = "Select and reserve a token",
    description = "Reserves the free token with the highest mutual affinity to the caller. Exact interests on either side are hard constraints; soft interests rank otherwise-eligible candidates.",
    request_body = SelectTokenRequest,
    responses(
        (status = 200, description = "Token reserved", body = SelectTokenResponse),
        (status = 400, description = "Invalid selection pattern", body = ErrorResponse),
        (status = 408, description = "All matching tokens stayed reserved", body = ErrorResponse),
        (status = 422, description = "No registered token can match", body = ErrorResponse),
        (status = 503, description = "Grid is shutting down", body = ErrorResponse),
    )
)]
pub async fn select_token(
    State(state): State<AppState>,
    Json(req): Json<SelectTokenRequest>,
) -> Result<impl IntoResponse, GridError> {
    let match_timeout = req.match_timeout_ms.map(Duration::from_millis);
    let no_match_timeout = req.no_match_timeout_ms.map(Duration::from_millis);
    let pretender = req.into_pretender()?;

    let wrapper = state
        .grid
        .select_token(&pretender, match_timeout, no_match_timeout)
        .await?;

    Ok(Json(SelectTokenResponse::from(&wrapper)))
}

/// `POST /tokens/{id}/return` — Return a reserved token to the pool.
#[utoipa::path(
    post,
    path = "/api/v1/tokens/{id}/return",
    tag = "Tokens",
    summary = "Return a reserved token",
    description = "Transitions a reserved token back to free. Returning an unknown or already-free token is a no-op.",
    params(("id" = String, Path, description = "Token ID")),
    responses(
        (status = 204, description = "Token returned (or no-op)"),
    )
)]
pub async fn return_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.grid.return_token(&id).await;
    StatusCode::NO_CONTENT
}

/// `POST /tokens/{id}/invalidate` — Permanently remove a token.
#[utoipa::path(
    post,
    path = "/api/v1/tokens/{id}/invalidate",
    tag = "Tokens",
    summary = "Invalidate a token",
    description = "Removes the token from the pool regardless of reservation state; a reserved token disappears when its holder returns it. Invalidating an unknown token is a no-op.",
    params(("id" = String, Path, description = "Token ID")),
    responses(
        (status = 204, description = "Token invalidated (or no-op)"),
    )
)]
pub async fn invalidate_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.grid.invalidate_token(&id).await;
    StatusCode::NO_CONTENT
}

/// `PUT /tokens/{id}/health` — Update a token's health marker.
///
/// # Errors
///
/// Returns [`GridError::UnknownToken`] if the token is not registered.
#[utoipa::path(
    put,
    path = "/api/v1/tokens/{id}/health",
    tag = "Tokens",
    summary = "Update token health",
    description = "Marks a token failing, in maintenance, or healthy again. Unhealthy tokens stay registered but are never selected.",
    params(("id" = String, Path, description = "Token ID")),
    request_body = HealthUpdateRequest,
    responses(
        (status = 204, description = "Health updated"),
        (status = 404, description = "Unknown token", body = ErrorResponse),
    )
)]
pub async fn update_token_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<HealthUpdateRequest>,
) -> Result<impl IntoResponse, GridError> {
    state.grid.set_token_health(&id, req.health).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Usage report for one attribute key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UsageResponse {
    /// The grouping attribute key.
    pub attribute: String,
    /// Counts per attribute value; tokens missing the attribute group
    /// under the empty string.
    pub groups: BTreeMap<String, AttributeUsage>,
}

/// `GET /tokens/usage/{attribute}` — Token counts grouped by attribute.
#[utoipa::path(
    get,
    path = "/api/v1/tokens/usage/{attribute}",
    tag = "Tokens",
    summary = "Token usage grouped by attribute",
    description = "Counts registered and reserved tokens per value of the given attribute key, for capacity dashboards.",
    params(("attribute" = String, Path, description = "Attribute key to group by")),
    responses(
        (status = 200, description = "Grouped usage counts", body = UsageResponse),
    )
)]
pub async fn token_usage(
    State(state): State<AppState>,
    Path(attribute): Path<String>,
) -> impl IntoResponse {
    let groups = state.grid.usage_by_attribute(&attribute).await;
    Json(UsageResponse { attribute, groups })
}

/// Token routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(list_tokens))
        .route("/tokens/select", post(select_token))
        .route("/tokens/{id}/return", post(return_token))
        .route("/tokens/{id}/invalidate", post(invalidate_token))
        .route("/tokens/{id}/health", put(update_token_health))
        .route("/tokens/usage/{attribute}", get(token_usage))
}
