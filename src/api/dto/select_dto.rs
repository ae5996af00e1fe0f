//! Token selection wire types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::token_dto::InterestDto;
use crate::domain::{Identity, Pretender, TokenWrapper};
use crate::error::GridError;

/// Selection request: the caller's identity plus optional per-call
/// timeout overrides.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SelectTokenRequest {
    /// The caller's attributes (matched against token interests).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// The caller's interests (matched against token attributes).
    #[serde(default)]
    pub interests: HashMap<String, InterestDto>,
    /// Overrides the configured wait while a matching token exists but
    /// is reserved (milliseconds).
    #[serde(default)]
    pub match_timeout_ms: Option<u64>,
    /// Overrides the configured wait while no registered token matches
    /// at all (milliseconds).
    #[serde(default)]
    pub no_match_timeout_ms: Option<u64>,
}

impl SelectTokenRequest {
    /// Compiles the request into a domain [`Pretender`].
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidPattern`] on an invalid interest
    /// pattern.
    pub fn into_pretender(self) -> Result<Pretender, GridError> {
        let mut pretender = Pretender::new();
        for (key, value) in &self.attributes {
            pretender = pretender.with_attribute(key, value);
        }
        for (key, interest) in &self.interests {
            pretender = pretender.with_interest(key, interest.compile()?);
        }
        Ok(pretender)
    }
}

/// A successfully reserved token, with everything the execution layer
/// needs to call the agent.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectTokenResponse {
    /// Reserved token identifier; pass it back to the return and
    /// invalidate endpoints when done.
    pub token_id: String,
    /// Owning agent identifier.
    pub agent_id: String,
    /// Owning agent endpoint URL.
    pub agent_url: String,
    /// The token's attributes.
    pub attributes: HashMap<String, String>,
}

impl From<&TokenWrapper> for SelectTokenResponse {
    fn from(wrapper: &TokenWrapper) -> Self {
        Self {
            token_id: wrapper.id().to_string(),
            agent_id: wrapper.agent().agent_id.clone(),
            agent_url: wrapper.agent().agent_url.clone(),
            attributes: wrapper.attributes().clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn request_compiles_into_pretender() {
        let request = SelectTokenRequest {
            attributes: HashMap::from([("project".to_string(), "orion".to_string())]),
            interests: HashMap::from([(
                "os".to_string(),
                InterestDto {
                    pattern: "linux".to_string(),
                    exact: true,
                },
            )]),
            match_timeout_ms: None,
            no_match_timeout_ms: None,
        };
        let Ok(pretender) = request.into_pretender() else {
            panic!("conversion must succeed");
        };
        assert_eq!(pretender.attributes().len(), 1);
        assert_eq!(pretender.interests().len(), 1);
    }

    #[test]
    fn empty_request_deserializes() {
        let Ok(request) = serde_json::from_str::<SelectTokenRequest>("{}") else {
            panic!("deserialization must succeed");
        };
        assert!(request.attributes.is_empty());
        assert!(request.match_timeout_ms.is_none());
    }
}
