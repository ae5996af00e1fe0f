//! REST endpoint handlers organized by resource.

pub mod agents;
pub mod register;
pub mod system;
pub mod tokens;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(register::routes())
        .merge(tokens::routes())
        .merge(agents::routes())
}
