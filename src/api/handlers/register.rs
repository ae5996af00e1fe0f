//! Agent registration heartbeat handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{RegisterRequest, RegisterResponse};
use crate::app_state::AppState;
use crate::domain::Token;
use crate::error::{ErrorResponse, GridError};

/// `POST /grid/register` — Agent heartbeat.
///
/// Agents call this periodically; the first call registers the agent and
/// its tokens, subsequent calls refresh their liveness. An agent that
/// stops calling eventually expires and loses its tokens.
///
/// # Errors
///
/// Returns [`GridError`] on invalid selection patterns or token/agent
/// mismatches.
#[utoipa::path(
    post,
    path = "/api/v1/grid/register",
    tag = "Grid",
    summary = "Register or refresh an agent and its tokens",
    description = "Periodic heartbeat carrying the agent reference and every token the agent offers. Unknown tokens are registered as free; known tokens only get their keepalive refreshed.",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Heartbeat accepted", body = RegisterResponse),
        (status = 400, description = "Invalid selection pattern or token ownership", body = ErrorResponse),
    )
)]
pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, GridError> {
    let agent = req.agent_ref;
    let tokens = req
        .tokens
        .into_iter()
        .map(Token::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = state.grid.register(agent.clone(), tokens).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RegisterResponse {
            agent_id: agent.agent_id,
            accepted: outcome.accepted,
            new_tokens: outcome.new_tokens,
        }),
    ))
}

/// Registration routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/grid/register", post(register_agent))
}
