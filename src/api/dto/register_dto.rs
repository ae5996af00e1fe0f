//! Registration heartbeat wire types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::token_dto::TokenDto;
use crate::domain::AgentRef;

/// One agent heartbeat: who the agent is and every token it currently
/// offers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// The heartbeating agent.
    pub agent_ref: AgentRef,
    /// Tokens offered by the agent. Tokens already registered only get
    /// their liveness refreshed.
    #[serde(default)]
    pub tokens: Vec<TokenDto>,
}

/// Acknowledgement counters for a heartbeat.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegisterResponse {
    /// Agent that heartbeated.
    pub agent_id: String,
    /// Tokens carried by the heartbeat.
    pub accepted: usize,
    /// Tokens registered for the first time.
    pub new_tokens: usize,
}
