//! Domain events reflecting grid state mutations.
//!
//! Every registration, reservation and lifecycle change emits a
//! [`GridEvent`] through the [`super::EventBus`]. Events feed the
//! WebSocket dashboard stream; they are observability data, never part
//! of the pool's correctness protocol.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::token::TokenHealth;

/// Domain event emitted after a grid state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GridEvent {
    /// An agent was seen for the first time (or re-appeared after
    /// expiring).
    AgentRegistered {
        /// Agent identifier.
        agent_id: String,
        /// Agent endpoint URL.
        agent_url: String,
        /// Registration timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An agent stopped heartbeating and was evicted from the liveness
    /// map; its tokens have been invalidated.
    AgentExpired {
        /// Agent identifier.
        agent_id: String,
        /// Eviction timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A token was registered in the pool for the first time.
    TokenRegistered {
        /// Token identifier.
        token_id: String,
        /// Owning agent identifier.
        agent_id: String,
        /// Registration timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A token was reserved by a caller.
    TokenReserved {
        /// Token identifier.
        token_id: String,
        /// Opaque reference to the reservation holder.
        owner: String,
        /// Reservation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A reserved token was returned to the pool.
    TokenReturned {
        /// Token identifier.
        token_id: String,
        /// Return timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A token was permanently removed from the pool.
    TokenInvalidated {
        /// Token identifier.
        token_id: String,
        /// Invalidation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A token's health marker changed.
    TokenHealthChanged {
        /// Token identifier.
        token_id: String,
        /// The new health marker.
        health: TokenHealth,
        /// Change timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl GridEvent {
    /// Stable discriminator string, used by WebSocket subscription
    /// filters. Matches the serialized `event_type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent_registered",
            Self::AgentExpired { .. } => "agent_expired",
            Self::TokenRegistered { .. } => "token_registered",
            Self::TokenReserved { .. } => "token_reserved",
            Self::TokenReturned { .. } => "token_returned",
            Self::TokenInvalidated { .. } => "token_invalidated",
            Self::TokenHealthChanged { .. } => "token_health_changed",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serialized_tag() {
        let event = GridEvent::TokenReturned {
            token_id: "tok-1".to_string(),
            timestamp: Utc::now(),
        };
        let Ok(json) = serde_json::to_value(&event) else {
            panic!("event must serialize");
        };
        assert_eq!(
            json.get("event_type").and_then(|v| v.as_str()),
            Some(event.kind())
        );
    }

    #[test]
    fn health_change_carries_marker() {
        let event = GridEvent::TokenHealthChanged {
            token_id: "tok-1".to_string(),
            health: TokenHealth::Maintenance,
            timestamp: Utc::now(),
        };
        let Ok(json) = serde_json::to_value(&event) else {
            panic!("event must serialize");
        };
        assert_eq!(
            json.get("health").and_then(|v| v.as_str()),
            Some("maintenance")
        );
    }
}
