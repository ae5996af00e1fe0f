//! Domain layer: matching model, token pool, and event system.
//!
//! This module contains the server-side domain model: the [`Identity`]
//! capability shared by tokens and pretenders, the affinity scoring
//! machinery, the concurrent [`TokenPool`] with its dual-timeout waiting
//! protocol, the generic [`ExpiringMap`] backing agent liveness, and the
//! event bus broadcasting state changes.

pub mod affinity;
pub mod event_bus;
pub mod expiring_map;
pub mod grid_event;
pub mod identity;
pub mod interest;
pub mod token;
pub mod token_pool;

pub use affinity::{AffinityEvaluator, HealthAwareEvaluator, InterestAffinityEvaluator};
pub use event_bus::EventBus;
pub use expiring_map::ExpiringMap;
pub use grid_event::GridEvent;
pub use identity::{Identity, Pretender};
pub use interest::Interest;
pub use token::{AgentRef, Token, TokenHealth, TokenStatus, TokenWrapper};
pub use token_pool::TokenPool;
