//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::GridService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Grid service for all business logic.
    pub grid: Arc<GridService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}
