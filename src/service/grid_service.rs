//! Grid service: registration façade over the token pool and the agent
//! liveness map.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::GridConfig;
use crate::domain::{
    AgentRef, EventBus, ExpiringMap, GridEvent, Identity, Pretender, Token, TokenHealth,
    TokenPool, TokenStatus, TokenWrapper,
};
use crate::error::GridError;

/// Counters returned by a registration heartbeat.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationOutcome {
    /// Tokens carried by the heartbeat (new and refreshed).
    pub accepted: usize,
    /// Tokens registered for the first time.
    pub new_tokens: usize,
}

/// Token counts for one value of a grouping attribute.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct AttributeUsage {
    /// Registered tokens carrying this attribute value.
    pub total: usize,
    /// How many of them are currently reserved.
    pub reserved: usize,
}

/// Orchestration layer for all grid operations.
///
/// Owns the [`TokenPool`], the agent liveness map and the [`EventBus`].
/// Every mutation method follows the pattern: delegate to the pool →
/// emit events → return result. The pool and the liveness map are
/// independent structures with independent locks, coupled only here.
///
/// # Agent expiry policy
///
/// When an agent stops heartbeating and its [`AgentRef`] is evicted from
/// the liveness map, every token that agent offered is invalidated:
/// free ones disappear immediately, reserved ones are removed when their
/// holder returns them. Either way they are never selected again.
#[derive(Debug)]
pub struct GridService {
    pool: Arc<TokenPool>,
    agents: ExpiringMap<String, AgentRef>,
    event_bus: EventBus,
    match_exists_timeout: Duration,
    no_match_exists_timeout: Duration,
}

impl GridService {
    /// Creates the service, spawning the pool and agent keepalive sweeps
    /// according to `config`.
    #[must_use]
    pub fn new(config: &GridConfig, event_bus: EventBus) -> Self {
        let pool = Arc::new(TokenPool::with_keepalive(
            config.token_keepalive(),
            config.sweep_interval(),
        ));

        let listener_pool = Arc::clone(&pool);
        let listener_bus = event_bus.clone();
        let agents = ExpiringMap::with_eviction_listener(
            config.agent_keepalive(),
            config.sweep_interval(),
            move |agent_id: &String, _agent: &AgentRef| {
                let pool = Arc::clone(&listener_pool);
                let bus = listener_bus.clone();
                let agent_id = agent_id.clone();
                tokio::spawn(async move {
                    tracing::warn!(agent_id = %agent_id, "agent keepalive elapsed");
                    let invalidated = pool.invalidate_agent_tokens(&agent_id).await;
                    for token_id in invalidated {
                        bus.publish(GridEvent::TokenInvalidated {
                            token_id,
                            timestamp: Utc::now(),
                        });
                    }
                    bus.publish(GridEvent::AgentExpired {
                        agent_id,
                        timestamp: Utc::now(),
                    });
                });
            },
        );

        Self {
            pool,
            agents,
            event_bus,
            match_exists_timeout: config.match_exists_timeout(),
            no_match_exists_timeout: config.no_match_exists_timeout(),
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`TokenPool`].
    #[must_use]
    pub fn pool(&self) -> &Arc<TokenPool> {
        &self.pool
    }

    /// Processes one agent heartbeat: refreshes the agent's liveness and
    /// offers every carried token into the pool.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidRequest`] if a token claims a
    /// different `agent_id` than the heartbeating agent.
    pub async fn register(
        &self,
        agent: AgentRef,
        tokens: Vec<Token>,
    ) -> Result<RegistrationOutcome, GridError> {
        for token in &tokens {
            if token.agent_id() != agent.agent_id {
                return Err(GridError::InvalidRequest(format!(
                    "token {} claims agent {} but was offered by {}",
                    token.id(),
                    token.agent_id(),
                    agent.agent_id
                )));
            }
        }

        let newly_seen = self
            .agents
            .put_or_touch(agent.agent_id.clone(), agent.clone())
            .await;
        if newly_seen {
            tracing::info!(agent_id = %agent.agent_id, agent_url = %agent.agent_url, "agent registered");
            self.event_bus.publish(GridEvent::AgentRegistered {
                agent_id: agent.agent_id.clone(),
                agent_url: agent.agent_url.clone(),
                timestamp: Utc::now(),
            });
        }

        let mut outcome = RegistrationOutcome {
            accepted: tokens.len(),
            new_tokens: 0,
        };
        for token in tokens {
            let token_id = token.id().to_string();
            if self.pool.offer_token(token, agent.clone()).await {
                outcome.new_tokens += 1;
                self.event_bus.publish(GridEvent::TokenRegistered {
                    token_id,
                    agent_id: agent.agent_id.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(outcome)
    }

    /// Selects and reserves the best matching token for `pretender`,
    /// falling back to the configured default timeouts.
    ///
    /// # Errors
    ///
    /// Same as [`TokenPool::select_token`].
    pub async fn select_token(
        &self,
        pretender: &Pretender,
        match_timeout: Option<Duration>,
        no_match_timeout: Option<Duration>,
    ) -> Result<TokenWrapper, GridError> {
        let wrapper = self
            .pool
            .select_token(
                pretender,
                match_timeout.unwrap_or(self.match_exists_timeout),
                no_match_timeout.unwrap_or(self.no_match_exists_timeout),
            )
            .await?;
        self.event_bus.publish(GridEvent::TokenReserved {
            token_id: wrapper.id().to_string(),
            owner: pretender.id().to_string(),
            timestamp: Utc::now(),
        });
        Ok(wrapper)
    }

    /// Non-blocking probe: would a selection for `pretender` succeed
    /// right now?
    pub async fn exists_available_matching_token(&self, pretender: &Pretender) -> bool {
        self.pool.exists_available_matching_token(pretender).await
    }

    /// Returns a reserved token to the pool. Unknown IDs are a benign
    /// no-op and emit no event.
    pub async fn return_token(&self, token_id: &str) {
        if self.pool.return_token(token_id).await {
            self.event_bus.publish(GridEvent::TokenReturned {
                token_id: token_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Permanently removes a token from the pool. Unknown IDs are a
    /// benign no-op and emit no event.
    pub async fn invalidate_token(&self, token_id: &str) {
        if self.pool.invalidate(token_id).await {
            self.event_bus.publish(GridEvent::TokenInvalidated {
                token_id: token_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Updates a token's health marker.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownToken`] if no live token has this ID.
    pub async fn set_token_health(
        &self,
        token_id: &str,
        health: TokenHealth,
    ) -> Result<(), GridError> {
        self.pool.set_health(token_id, health).await?;
        tracing::info!(token_id = %token_id, ?health, "token health changed");
        self.event_bus.publish(GridEvent::TokenHealthChanged {
            token_id: token_id.to_string(),
            health,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Known (live) agents.
    pub async fn agents(&self) -> Vec<AgentRef> {
        self.agents.values().await
    }

    /// Snapshot of all registered tokens.
    pub async fn tokens(&self) -> Vec<TokenStatus> {
        self.pool.tokens().await
    }

    /// Token counts grouped by the values of an arbitrary attribute key.
    /// Tokens missing the attribute group under the empty string.
    pub async fn usage_by_attribute(&self, key: &str) -> BTreeMap<String, AttributeUsage> {
        let mut groups: BTreeMap<String, AttributeUsage> = BTreeMap::new();
        for status in self.pool.tokens().await {
            let value = status
                .wrapper
                .attributes()
                .get(key)
                .cloned()
                .unwrap_or_default();
            let usage = groups.entry(value).or_default();
            usage.total += 1;
            if !status.free {
                usage.reserved += 1;
            }
        }
        groups
    }

    /// Releases all resources: closes the pool (waking parked selectors)
    /// and stops the agent liveness sweep. Idempotent.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        self.agents.close();
        tracing::info!("grid service stopped");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Interest;

    fn test_config() -> GridConfig {
        GridConfig {
            // Keepalives long enough to never interfere unless a test
            // shortens them explicitly.
            token_keepalive_timeout_ms: 60_000,
            agent_keepalive_timeout_ms: 60_000,
            keepalive_sweep_interval_ms: 25,
            match_exists_timeout_ms: 200,
            no_match_exists_timeout_ms: 40,
            ..GridConfig::default()
        }
    }

    fn service(config: GridConfig) -> GridService {
        GridService::new(&config, EventBus::new(64))
    }

    fn agent(id: &str) -> AgentRef {
        AgentRef::new(id, &format!("http://{id}:8080"))
    }

    fn linux_token(id: &str, agent_id: &str) -> Token {
        Token::new(id, agent_id).with_attribute("os", "linux")
    }

    fn linux_pretender() -> Pretender {
        let Ok(i) = Interest::new("linux", true) else {
            panic!("valid pattern");
        };
        Pretender::new().with_interest("os", i)
    }

    #[tokio::test]
    async fn register_offers_tokens_and_tracks_agent() {
        let grid = service(test_config());
        let Ok(outcome) = grid
            .register(
                agent("agent-1"),
                vec![linux_token("tok-1", "agent-1"), linux_token("tok-2", "agent-1")],
            )
            .await
        else {
            panic!("registration must succeed");
        };
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.new_tokens, 2);
        assert_eq!(grid.tokens().await.len(), 2);
        assert_eq!(grid.agents().await.len(), 1);

        // A second heartbeat only refreshes.
        let Ok(outcome) = grid
            .register(agent("agent-1"), vec![linux_token("tok-1", "agent-1")])
            .await
        else {
            panic!("heartbeat must succeed");
        };
        assert_eq!(outcome.new_tokens, 0);
        assert_eq!(grid.tokens().await.len(), 2);
    }

    #[tokio::test]
    async fn register_rejects_foreign_tokens() {
        let grid = service(test_config());
        let result = grid
            .register(agent("agent-1"), vec![linux_token("tok-1", "agent-2")])
            .await;
        assert!(matches!(result, Err(GridError::InvalidRequest(_))));
        assert!(grid.tokens().await.is_empty());
    }

    #[tokio::test]
    async fn registration_emits_events() {
        let grid = service(test_config());
        let mut rx = grid.event_bus().subscribe();

        let Ok(_) = grid
            .register(agent("agent-1"), vec![linux_token("tok-1", "agent-1")])
            .await
        else {
            panic!("registration must succeed");
        };

        let Ok(first) = rx.recv().await else {
            panic!("expected agent event");
        };
        assert_eq!(first.kind(), "agent_registered");
        let Ok(second) = rx.recv().await else {
            panic!("expected token event");
        };
        assert_eq!(second.kind(), "token_registered");
    }

    #[tokio::test]
    async fn select_and_return_round_trip() {
        let grid = service(test_config());
        let Ok(_) = grid
            .register(agent("agent-1"), vec![linux_token("tok-1", "agent-1")])
            .await
        else {
            panic!("registration must succeed");
        };

        let pretender = linux_pretender();
        let Ok(selected) = grid.select_token(&pretender, None, None).await else {
            panic!("selection must succeed");
        };
        assert_eq!(selected.id(), "tok-1");
        assert_eq!(selected.agent().agent_url, "http://agent-1:8080");
        assert!(!grid.exists_available_matching_token(&pretender).await);

        grid.return_token("tok-1").await;
        assert!(grid.exists_available_matching_token(&pretender).await);
    }

    #[tokio::test]
    async fn usage_groups_by_attribute_value() {
        let grid = service(test_config());
        let Ok(_) = grid
            .register(
                agent("agent-1"),
                vec![
                    linux_token("tok-1", "agent-1"),
                    linux_token("tok-2", "agent-1"),
                    Token::new("tok-3", "agent-1").with_attribute("os", "windows"),
                    Token::new("tok-4", "agent-1"),
                ],
            )
            .await
        else {
            panic!("registration must succeed");
        };

        let Ok(_) = grid.select_token(&linux_pretender(), None, None).await else {
            panic!("selection must succeed");
        };

        let usage = grid.usage_by_attribute("os").await;
        assert_eq!(usage.get("linux").map(|u| (u.total, u.reserved)), Some((2, 1)));
        assert_eq!(usage.get("windows").map(|u| (u.total, u.reserved)), Some((1, 0)));
        assert_eq!(usage.get("").map(|u| u.total), Some(1));
    }

    #[tokio::test]
    async fn agent_expiry_invalidates_tokens() {
        let config = GridConfig {
            agent_keepalive_timeout_ms: 50,
            ..test_config()
        };
        let grid = service(config);
        let Ok(_) = grid
            .register(agent("agent-1"), vec![linux_token("tok-1", "agent-1")])
            .await
        else {
            panic!("registration must succeed");
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(grid.agents().await.is_empty());
        assert!(grid.tokens().await.is_empty());

        let result = grid.select_token(&linux_pretender(), None, None).await;
        assert!(matches!(result, Err(GridError::NoMatchingToken { .. })));
    }

    #[tokio::test]
    async fn heartbeating_agent_survives_eviction() {
        let config = GridConfig {
            agent_keepalive_timeout_ms: 100,
            ..test_config()
        };
        let grid = service(config);
        for _ in 0..8 {
            let Ok(_) = grid
                .register(agent("agent-1"), vec![linux_token("tok-1", "agent-1")])
                .await
            else {
                panic!("heartbeat must succeed");
            };
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        assert_eq!(grid.agents().await.len(), 1);
        assert_eq!(grid.tokens().await.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_fails_selections_fast() {
        let grid = service(test_config());
        grid.shutdown().await;

        let result = grid.select_token(&linux_pretender(), None, None).await;
        assert!(matches!(result, Err(GridError::PoolClosed)));
        // Idempotent.
        grid.shutdown().await;
    }
}
