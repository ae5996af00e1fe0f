//! Agent introspection handlers.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::AgentRef;

/// Response body for the agent list endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AgentListResponse {
    /// Agents with a live keepalive.
    pub agents: Vec<AgentRef>,
    /// Number of live agents.
    pub total: usize,
}

/// `GET /agents` — List agents with a live keepalive.
#[utoipa::path(
    get,
    path = "/api/v1/agents",
    tag = "Agents",
    summary = "List live agents",
    description = "Returns every agent whose heartbeat has not expired yet.",
    responses(
        (status = 200, description = "Agent list", body = AgentListResponse),
    )
)]
pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    let mut agents = state.grid.agents().await;
    agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    let total = agents.len();
    Json(AgentListResponse { agents, total })
}

/// Agent routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/agents", get(list_agents))
}
