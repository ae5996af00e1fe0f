//! WebSocket layer: the live grid event feed.
//!
//! The WebSocket endpoint at `/ws` streams [`crate::domain::GridEvent`]s
//! to dashboard clients, filtered by per-connection subscriptions.

pub mod handler;
pub mod messages;
