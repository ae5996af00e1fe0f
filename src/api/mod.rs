//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All endpoints are mounted under `/api/v1`, except the system routes
//! at the root level.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document covering the whole REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "token-grid",
        description = "Registration service and affinity-based token pool for distributed execution agents"
    ),
    paths(
        handlers::register::register_agent,
        handlers::tokens::list_tokens,
        handlers::tokens::select_token,
        handlers::tokens::return_token,
        handlers::tokens::invalidate_token,
        handlers::tokens::update_token_health,
        handlers::tokens::token_usage,
        handlers::agents::list_agents,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::RegisterRequest,
        dto::RegisterResponse,
        dto::SelectTokenRequest,
        dto::SelectTokenResponse,
        dto::HealthUpdateRequest,
        dto::InterestDto,
        dto::TokenDto,
        dto::TokenListResponse,
        dto::TokenView,
        handlers::agents::AgentListResponse,
        handlers::tokens::UsageResponse,
        handlers::system::HealthResponse,
        crate::domain::AgentRef,
        crate::domain::TokenHealth,
        crate::service::AttributeUsage,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Grid", description = "Agent registration heartbeats"),
        (name = "Tokens", description = "Token selection, release, and introspection"),
        (name = "Agents", description = "Agent liveness introspection"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", <ApiDoc as OpenApi>::openapi()),
    );

    router
}
