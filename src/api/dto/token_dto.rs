//! Token wire representations shared by registration and introspection
//! endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Identity, Interest, Token, TokenHealth, TokenStatus};
use crate::error::GridError;

/// Wire form of a selection interest.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InterestDto {
    /// Regular expression matched against the whole attribute value.
    pub pattern: String,
    /// Hard constraint flag; unmet exact interests disqualify instead of
    /// lowering the score.
    #[serde(default)]
    pub exact: bool,
}

impl InterestDto {
    /// Compiles the wire form into a domain [`Interest`].
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidPattern`] on an invalid regular
    /// expression.
    pub fn compile(&self) -> Result<Interest, GridError> {
        Interest::new(&self.pattern, self.exact)
    }
}

/// One token as carried by a registration heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenDto {
    /// Token identifier, unique within the grid.
    pub id: String,
    /// ID of the offering agent.
    pub agent_id: String,
    /// Attribute map describing the execution slot.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Named interests the token imposes on callers.
    #[serde(default)]
    pub selection_patterns: HashMap<String, InterestDto>,
}

impl TryFrom<TokenDto> for Token {
    type Error = GridError;

    fn try_from(dto: TokenDto) -> Result<Self, Self::Error> {
        let mut interests = HashMap::with_capacity(dto.selection_patterns.len());
        for (key, interest) in &dto.selection_patterns {
            interests.insert(key.clone(), interest.compile()?);
        }
        Ok(Token::new(&dto.id, &dto.agent_id)
            .with_attributes(dto.attributes)
            .with_interests(interests))
    }
}

/// Introspection view of one registered token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenView {
    /// Token identifier.
    pub id: String,
    /// Owning agent identifier.
    pub agent_id: String,
    /// Owning agent endpoint URL.
    pub agent_url: String,
    /// Attribute map.
    pub attributes: HashMap<String, String>,
    /// Current health marker.
    pub health: TokenHealth,
    /// `false` while reserved.
    pub free: bool,
    /// Opaque reference to the reservation holder, if reserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_owner: Option<String>,
}

impl From<&TokenStatus> for TokenView {
    fn from(status: &TokenStatus) -> Self {
        Self {
            id: status.wrapper.id().to_string(),
            agent_id: status.wrapper.agent().agent_id.clone(),
            agent_url: status.wrapper.agent().agent_url.clone(),
            attributes: status.wrapper.attributes().clone(),
            health: status.wrapper.health(),
            free: status.free,
            current_owner: status.wrapper.current_owner().map(str::to_string),
        }
    }
}

/// Response body for the token list endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenListResponse {
    /// All registered tokens.
    pub tokens: Vec<TokenView>,
    /// Total count (reserved tokens included).
    pub total: usize,
}

/// Request body for health updates.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HealthUpdateRequest {
    /// The new health marker.
    pub health: TokenHealth,
}
