//! Service layer: business logic orchestration.
//!
//! [`GridService`] coordinates registration heartbeats, token selection
//! and introspection, and emits events through the
//! [`super::domain::EventBus`].

pub mod grid_service;

pub use grid_service::{AttributeUsage, GridService, RegistrationOutcome};
