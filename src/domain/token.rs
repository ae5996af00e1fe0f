//! Token value types: the execution slot offered by an agent and the
//! pool's live view of it.
//!
//! A [`Token`] is what an agent advertises in its heartbeat. The pool
//! wraps it into a [`TokenWrapper`] together with the owning agent's
//! [`AgentRef`], a [`TokenHealth`] marker and an opaque owner reference.
//! Reservation state (free/reserved) is *not* part of the wrapper: it is
//! owned exclusively by the pool and only surfaces in read-only
//! [`TokenStatus`] snapshots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Identity, Interest};

/// One execution slot offered by an agent.
#[derive(Debug, Clone)]
pub struct Token {
    id: String,
    agent_id: String,
    attributes: HashMap<String, String>,
    interests: HashMap<String, Interest>,
}

impl Token {
    /// Creates a token with the given ID, owned by `agent_id`.
    #[must_use]
    pub fn new(id: &str, agent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            agent_id: agent_id.to_string(),
            attributes: HashMap::new(),
            interests: HashMap::new(),
        }
    }

    /// Adds an attribute, replacing any previous value for the key.
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds an interest, replacing any previous interest for the key.
    #[must_use]
    pub fn with_interest(mut self, key: &str, interest: Interest) -> Self {
        self.interests.insert(key.to_string(), interest);
        self
    }

    /// Sets the full attribute map.
    #[must_use]
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets the full interest map.
    #[must_use]
    pub fn with_interests(mut self, interests: HashMap<String, Interest>) -> Self {
        self.interests = interests;
        self
    }

    /// ID of the agent that offered this token (back-reference, not
    /// ownership).
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

impl Identity for Token {
    fn id(&self) -> &str {
        &self.id
    }

    fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    fn interests(&self) -> &HashMap<String, Interest> {
        &self.interests
    }
}

/// Reference to a registered agent: its ID and the URL the execution
/// layer uses to reach it.
///
/// Created or refreshed on every heartbeat; evicted from the liveness
/// map when the agent stops heartbeating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentRef {
    /// Unique agent identifier.
    pub agent_id: String,
    /// Base URL of the agent's HTTP endpoint.
    pub agent_url: String,
}

impl AgentRef {
    /// Creates a new agent reference.
    #[must_use]
    pub fn new(agent_id: &str, agent_url: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_url: agent_url.to_string(),
        }
    }
}

/// Health marker attached to a registered token.
///
/// Anything other than [`TokenHealth::Healthy`] disqualifies the token
/// from selection without removing it from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenHealth {
    /// The token may be selected.
    #[default]
    Healthy,
    /// A call through this token reported an error; withheld from
    /// selection until its health is reset.
    Failing,
    /// Administratively withheld from selection.
    Maintenance,
}

/// The pool's live view of a registered [`Token`].
///
/// Adds the owning agent, a health marker and the current owner. The
/// owner reference is opaque observability data; the pool never
/// dereferences it.
#[derive(Debug, Clone)]
pub struct TokenWrapper {
    token: Token,
    agent: AgentRef,
    health: TokenHealth,
    current_owner: Option<String>,
}

impl TokenWrapper {
    /// Wraps a freshly offered token.
    #[must_use]
    pub fn new(token: Token, agent: AgentRef) -> Self {
        Self {
            token,
            agent,
            health: TokenHealth::default(),
            current_owner: None,
        }
    }

    /// The wrapped token.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The agent that offered the token.
    #[must_use]
    pub fn agent(&self) -> &AgentRef {
        &self.agent
    }

    /// Current health marker.
    #[must_use]
    pub const fn health(&self) -> TokenHealth {
        self.health
    }

    /// Opaque reference to the current reservation holder, if reserved.
    #[must_use]
    pub fn current_owner(&self) -> Option<&str> {
        self.current_owner.as_deref()
    }

    pub(crate) fn set_health(&mut self, health: TokenHealth) {
        self.health = health;
    }

    pub(crate) fn set_current_owner(&mut self, owner: Option<String>) {
        self.current_owner = owner;
    }
}

impl Identity for TokenWrapper {
    fn id(&self) -> &str {
        self.token.id()
    }

    fn attributes(&self) -> &HashMap<String, String> {
        self.token.attributes()
    }

    fn interests(&self) -> &HashMap<String, Interest> {
        self.token.interests()
    }
}

/// Read-only snapshot of one pool entry, for introspection.
#[derive(Debug, Clone)]
pub struct TokenStatus {
    /// The pool's view of the token at snapshot time.
    pub wrapper: TokenWrapper,
    /// `true` if the token was free (not reserved) at snapshot time.
    pub free: bool,
}
