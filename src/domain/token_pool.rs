//! Concurrent token registry with the affinity-based selection protocol.
//!
//! [`TokenPool`] owns every registered token together with its
//! reservation state. All state transitions (offer, select-reserve,
//! return, invalidate, health change) are serialized under one internal
//! lock; selectors that find no free eligible token park on a
//! [`tokio::sync::Notify`] *without* holding that lock, so every other
//! operation can proceed — and wake them — while they sleep.
//!
//! # Waiting protocol
//!
//! `select_token` re-evaluates two questions after every wake-up:
//!
//! 1. is a free eligible token available right now? (reserve and return)
//! 2. does *any* registered token — free or reserved — remain eligible?
//!
//! The answer to the second question picks which of the two timeouts
//! applies: the longer `match_timeout` while an eligible token merely
//! remains reserved by someone else, the shorter `no_match_timeout` once
//! nothing in the pool could ever match. Both answers are recomputed on
//! every iteration, never decided once at enqueue time, so eligibility
//! appearing or disappearing mid-wait re-classifies the wait instead of
//! hanging it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::affinity::{AffinityEvaluator, HealthAwareEvaluator, InterestAffinityEvaluator};
use super::token::{AgentRef, Token, TokenHealth, TokenStatus, TokenWrapper};
use super::Identity;
use crate::error::GridError;

/// One registered token plus its pool-private bookkeeping.
struct PoolEntry {
    wrapper: TokenWrapper,
    free: bool,
    invalidated: bool,
    last_touch: Instant,
}

impl PoolEntry {
    fn new(wrapper: TokenWrapper) -> Self {
        Self {
            wrapper,
            free: true,
            invalidated: false,
            last_touch: Instant::now(),
        }
    }
}

/// State guarded by the pool lock.
struct PoolState {
    entries: HashMap<String, PoolEntry>,
    waiting: usize,
    closed: bool,
}

impl PoolState {
    /// Marks an entry invalidated; free entries are removed on the spot,
    /// reserved ones linger (still invalidated) until they are returned.
    fn invalidate_entry(&mut self, id: &str) -> bool {
        let free = {
            let Some(entry) = self.entries.get_mut(id) else {
                return false;
            };
            entry.invalidated = true;
            entry.free
        };
        if free {
            self.entries.remove(id);
        }
        true
    }

    fn reserve(&mut self, id: &str, owner: &str) -> Option<TokenWrapper> {
        let entry = self.entries.get_mut(id)?;
        entry.free = false;
        entry.wrapper.set_current_owner(Some(owner.to_string()));
        Some(entry.wrapper.clone())
    }
}

/// Result of one scan over the registered tokens.
struct ScanOutcome {
    /// Free eligible token with the highest score (first found on ties).
    best_free: Option<String>,
    /// Whether any eligible token exists at all, free or reserved.
    match_exists: bool,
}

/// Thread-safe registry of tokens plus the selection protocol.
///
/// All operations are safe to call from any number of tasks
/// concurrently; a token is never handed to two selectors at once
/// because the scan and the reservation happen under the same lock
/// acquisition.
pub struct TokenPool {
    state: Arc<Mutex<PoolState>>,
    notify: Arc<Notify>,
    scorer: HealthAwareEvaluator<Box<dyn AffinityEvaluator>>,
    sweeper: Option<JoinHandle<()>>,
}

impl TokenPool {
    /// Creates a pool with the default [`InterestAffinityEvaluator`] and
    /// no keepalive sweep.
    #[must_use]
    pub fn new() -> Self {
        Self::with_evaluator(Box::new(InterestAffinityEvaluator))
    }

    /// Creates a pool scoring candidates with the given evaluator
    /// (wrapped in the health gate) and no keepalive sweep.
    #[must_use]
    pub fn with_evaluator(evaluator: Box<dyn AffinityEvaluator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                entries: HashMap::new(),
                waiting: 0,
                closed: false,
            })),
            notify: Arc::new(Notify::new()),
            scorer: HealthAwareEvaluator::new(evaluator),
            sweeper: None,
        }
    }

    /// Creates a pool that invalidates tokens not re-offered within
    /// `keepalive`, checked every `sweep_interval`. A zero `keepalive`
    /// disables the sweep.
    #[must_use]
    pub fn with_keepalive(keepalive: Duration, sweep_interval: Duration) -> Self {
        let mut pool = Self::new();
        if !keepalive.is_zero() {
            pool.sweeper = Some(Self::spawn_sweeper(
                Arc::clone(&pool.state),
                Arc::clone(&pool.notify),
                keepalive,
                sweep_interval,
            ));
        }
        pool
    }

    fn spawn_sweeper(
        state: Arc<Mutex<PoolState>>,
        notify: Arc<Notify>,
        keepalive: Duration,
        sweep_interval: Duration,
    ) -> JoinHandle<()> {
        let period = sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let stale: Vec<String> = {
                    let mut st = state.lock().await;
                    if st.closed {
                        break;
                    }
                    let ids: Vec<String> = st
                        .entries
                        .iter()
                        .filter(|(_, e)| !e.invalidated && e.last_touch.elapsed() > keepalive)
                        .map(|(id, _)| id.clone())
                        .collect();
                    for id in &ids {
                        st.invalidate_entry(id);
                    }
                    ids
                };
                if stale.is_empty() {
                    continue;
                }
                notify.notify_waiters();
                tracing::debug!(count = stale.len(), "invalidated tokens past keepalive");
            }
        })
    }

    /// Registers a token as free, or — when a token with the same ID is
    /// already present — refreshes its liveness marker without touching
    /// its reservation state. Wakes parked selectors when the token is
    /// new.
    ///
    /// Returns `true` if the token was newly registered.
    pub async fn offer_token(&self, token: Token, agent: AgentRef) -> bool {
        let id = token.id().to_string();
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }
        if let Some(entry) = state.entries.get_mut(&id) {
            entry.last_touch = Instant::now();
            return false;
        }
        state
            .entries
            .insert(id.clone(), PoolEntry::new(TokenWrapper::new(token, agent)));
        drop(state);
        self.notify.notify_waiters();
        tracing::debug!(token_id = %id, "token registered");
        true
    }

    /// Selects and reserves the best free token matching `pretender`.
    ///
    /// Returns immediately when a free eligible token exists; otherwise
    /// parks until one is freed or offered. The wait is bounded by
    /// `match_timeout` while an eligible token remains registered (just
    /// reserved by someone else) and by `no_match_timeout` when nothing
    /// in the pool could ever match — a fast-fail for misconfigured
    /// requests. The distinction is re-evaluated on every wake-up.
    ///
    /// # Errors
    ///
    /// - [`GridError::MatchTimeout`] — an eligible token existed at the
    ///   final check but none became free in time.
    /// - [`GridError::NoMatchingToken`] — no registered token can
    ///   satisfy the criteria.
    /// - [`GridError::PoolClosed`] — the pool was shut down.
    pub async fn select_token(
        &self,
        pretender: &dyn Identity,
        match_timeout: Duration,
        no_match_timeout: Duration,
    ) -> Result<TokenWrapper, GridError> {
        let started = Instant::now();
        let mut queued = false;

        let outcome = loop {
            // Register interest in the next notification *before*
            // checking the condition; a notify_waiters issued by any
            // mutation after our scan is then guaranteed to wake us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let match_exists = {
                let mut state = self.state.lock().await;
                if state.closed {
                    break Err(GridError::PoolClosed);
                }
                let scan = self.scan(&state, pretender);
                if let Some(id) = scan.best_free {
                    if let Some(wrapper) = state.reserve(&id, pretender.id()) {
                        tracing::debug!(
                            token_id = %id,
                            pretender_id = %pretender.id(),
                            "token reserved"
                        );
                        break Ok(wrapper);
                    }
                }
                if !queued {
                    state.waiting += 1;
                    queued = true;
                }
                scan.match_exists
            };

            let budget = if match_exists {
                match_timeout
            } else {
                no_match_timeout
            };
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                let waited_ms = elapsed_ms(started);
                break Err(if match_exists {
                    GridError::MatchTimeout { waited_ms }
                } else {
                    GridError::NoMatchingToken { waited_ms }
                });
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep(remaining) => {}
            }
        };

        if queued {
            let mut state = self.state.lock().await;
            state.waiting = state.waiting.saturating_sub(1);
        }
        if let Err(err) = &outcome {
            tracing::warn!(pretender_id = %pretender.id(), %err, "token selection failed");
        }
        outcome
    }

    /// [`TokenPool::select_token`] with a single timeout for both the
    /// match-exists and no-match cases.
    ///
    /// # Errors
    ///
    /// Same as [`TokenPool::select_token`].
    pub async fn select(
        &self,
        pretender: &dyn Identity,
        timeout: Duration,
    ) -> Result<TokenWrapper, GridError> {
        self.select_token(pretender, timeout, timeout).await
    }

    /// Non-blocking probe: would `select_token` currently return
    /// immediately for this pretender?
    pub async fn exists_available_matching_token(&self, pretender: &dyn Identity) -> bool {
        let state = self.state.lock().await;
        self.scan(&state, pretender).best_free.is_some()
    }

    /// Transitions a reserved token back to free and wakes parked
    /// selectors. Returning a token that was invalidated while reserved
    /// removes it permanently. Unknown IDs are a logged no-op.
    ///
    /// Returns `true` if the token was registered.
    pub async fn return_token(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let mut known = false;
        let mut remove = false;
        if let Some(entry) = state.entries.get_mut(id) {
            known = true;
            if entry.invalidated {
                remove = true;
            } else {
                entry.free = true;
                entry.wrapper.set_current_owner(None);
            }
        }
        if remove {
            state.entries.remove(id);
        }
        drop(state);
        if known {
            self.notify.notify_waiters();
            tracing::debug!(token_id = %id, "token returned");
        } else {
            tracing::warn!(token_id = %id, "return of unknown token ignored");
        }
        known
    }

    /// [`TokenPool::return_token`] addressed by wrapper.
    pub async fn return_wrapper(&self, wrapper: &TokenWrapper) -> bool {
        self.return_token(wrapper.id()).await
    }

    /// Permanently removes a token regardless of reservation state and
    /// wakes all parked selectors so none keeps waiting on a token that
    /// will never reappear. A reserved token disappears when returned.
    ///
    /// Returns `true` if the token was registered.
    pub async fn invalidate(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let known = state.invalidate_entry(id);
        drop(state);
        self.notify.notify_waiters();
        if known {
            tracing::debug!(token_id = %id, "token invalidated");
        }
        known
    }

    /// [`TokenPool::invalidate`] addressed by wrapper.
    pub async fn invalidate_wrapper(&self, wrapper: &TokenWrapper) -> bool {
        self.invalidate(wrapper.id()).await
    }

    /// Invalidates every token offered by `agent_id`, returning the
    /// affected token IDs.
    pub async fn invalidate_agent_tokens(&self, agent_id: &str) -> Vec<String> {
        let mut state = self.state.lock().await;
        let ids: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| !e.invalidated && e.wrapper.agent().agent_id == agent_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            state.invalidate_entry(id);
        }
        drop(state);
        if !ids.is_empty() {
            self.notify.notify_waiters();
            tracing::info!(agent_id = %agent_id, count = ids.len(), "invalidated agent tokens");
        }
        ids
    }

    /// Updates a token's health marker and wakes parked selectors — a
    /// token leaving maintenance may satisfy one of them.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownToken`] if no live token has this ID.
    pub async fn set_health(&self, id: &str, health: TokenHealth) -> Result<(), GridError> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(id) else {
            return Err(GridError::UnknownToken(id.to_string()));
        };
        if entry.invalidated {
            return Err(GridError::UnknownToken(id.to_string()));
        }
        entry.wrapper.set_health(health);
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Refreshes a token's liveness marker. Returns `false` if the ID is
    /// not registered.
    pub async fn keepalive(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(id) {
            Some(entry) => {
                entry.last_touch = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Consistent snapshot of all registered tokens with their
    /// reservation flag.
    pub async fn tokens(&self) -> Vec<TokenStatus> {
        let state = self.state.lock().await;
        state
            .entries
            .values()
            .map(|entry| TokenStatus {
                wrapper: entry.wrapper.clone(),
                free: entry.free,
            })
            .collect()
    }

    /// Number of registered tokens (reserved ones included).
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Returns `true` if no token is registered.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Number of selectors currently parked in [`TokenPool::select_token`].
    pub async fn waiting_pretenders(&self) -> usize {
        self.state.lock().await.waiting
    }

    /// Shuts the pool down: stops the keepalive sweep and wakes every
    /// parked selector with [`GridError::PoolClosed`]. Subsequent
    /// selections fail fast; other operations become benign no-ops.
    pub async fn close(&self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
        tracing::debug!("token pool closed");
    }

    fn scan(&self, state: &PoolState, pretender: &dyn Identity) -> ScanOutcome {
        let mut best: Option<(String, u32)> = None;
        let mut match_exists = false;
        for (id, entry) in &state.entries {
            if entry.invalidated {
                continue;
            }
            let Some(score) = self.scorer.score(pretender, &entry.wrapper) else {
                continue;
            };
            match_exists = true;
            if !entry.free {
                continue;
            }
            let better = match &best {
                Some((_, best_score)) => score > *best_score,
                None => true,
            };
            if better {
                best = Some((id.clone(), score));
            }
        }
        ScanOutcome {
            best_free: best.map(|(id, _)| id),
            match_exists,
        }
    }
}

impl Default for TokenPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokenPool {
    fn drop(&mut self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TokenPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPool")
            .field("sweeping", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Interest, Pretender};
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    fn interest(pattern: &str, exact: bool) -> Interest {
        let Ok(i) = Interest::new(pattern, exact) else {
            panic!("valid pattern");
        };
        i
    }

    fn agent() -> AgentRef {
        AgentRef::new("agent-1", "http://agent-1:8080")
    }

    fn red_circle(id: &str) -> Token {
        Token::new(id, "agent-1")
            .with_attribute("color", "red")
            .with_attribute("shape", "circle")
    }

    const SHORT: Duration = Duration::from_millis(40);
    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn select_returns_matching_token() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;

        let pretender = Pretender::new().with_interest("color", interest("red", true));
        let Ok(selected) = pool.select(&pretender, SHORT).await else {
            panic!("expected a token");
        };
        assert_eq!(selected.id(), "tok-1");
        assert_eq!(selected.current_owner(), Some(pretender.id()));
    }

    #[tokio::test]
    async fn mutual_exact_interests_must_both_match() {
        let pool = TokenPool::new();
        let token = red_circle("tok-1").with_interest("color", interest("green", true));
        pool.offer_token(token, agent()).await;

        // Both sides satisfied: token wants a green caller, caller wants
        // a red token.
        let insider = Pretender::new()
            .with_attribute("color", "green")
            .with_interest("color", interest("red", true));
        assert!(pool.select(&insider, SHORT).await.is_ok());
        pool.return_token("tok-1").await;

        // Token's exact interest unmet: the caller is yellow.
        let outsider = Pretender::new()
            .with_attribute("color", "yellow")
            .with_interest("color", interest("green", true));
        let result = pool.select(&outsider, SHORT).await;
        assert!(matches!(result, Err(GridError::NoMatchingToken { .. })));
    }

    #[tokio::test]
    async fn soft_interest_breaks_ties() {
        let pool = TokenPool::new();
        let circle = red_circle("tok-circle").with_interest("color", interest("green", true));
        let triangle = Token::new("tok-triangle", "agent-1")
            .with_attribute("color", "red")
            .with_attribute("shape", "triangle")
            .with_interest("color", interest("green", true));
        pool.offer_token(circle, agent()).await;
        pool.offer_token(triangle, agent()).await;

        let pretender = Pretender::new()
            .with_attribute("color", "green")
            .with_interest("color", interest("red", true))
            .with_interest("shape", interest("circle", false));

        let Ok(selected) = pool.select(&pretender, SHORT).await else {
            panic!("expected a token");
        };
        assert_eq!(selected.id(), "tok-circle");
    }

    #[tokio::test]
    async fn token_side_soft_interest_raises_its_own_score() {
        let pool = TokenPool::new();
        for (id, shape, wants_line) in [
            ("tok-1", "circle", false),
            ("tok-2", "circle", true),
            ("tok-3", "triangle", false),
        ] {
            let mut token = Token::new(id, "agent-1")
                .with_attribute("color", "red")
                .with_attribute("shape", shape)
                .with_interest("color", interest("green", true));
            if wants_line {
                token = token.with_interest("shape", interest("line", false));
            }
            pool.offer_token(token, agent()).await;
        }

        let pretender = Pretender::new()
            .with_attribute("color", "green")
            .with_attribute("shape", "line")
            .with_interest("color", interest("red", true))
            .with_interest("shape", interest("circle", false));

        let Ok(selected) = pool.select(&pretender, SHORT).await else {
            panic!("expected a token");
        };
        // tok-2 scores an extra point for its own matched soft interest.
        assert_eq!(selected.id(), "tok-2");
    }

    #[tokio::test]
    async fn parked_selector_wakes_on_offer() {
        let pool = Arc::new(TokenPool::new());

        let offering = Arc::clone(&pool);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            offering.offer_token(red_circle("tok-1"), agent()).await;
        });

        let pretender = Pretender::new().with_interest("color", interest("red", true));
        let started = Instant::now();
        let result = pool.select_token(&pretender, LONG, LONG).await;
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn parked_selector_observes_invalidation() {
        let pool = Arc::new(TokenPool::new());
        pool.offer_token(red_circle("tok-1"), agent()).await;

        let pretender = Pretender::new().with_interest("color", interest("red", true));
        let Ok(held) = pool.select(&pretender, SHORT).await else {
            panic!("first selection must succeed");
        };

        let waiting_pool = Arc::clone(&pool);
        let waiting_pretender = pretender.clone();
        let waiter = tokio::spawn(async move {
            waiting_pool
                .select_token(&waiting_pretender, LONG, Duration::from_millis(100))
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.invalidate_wrapper(&held).await;

        let started = Instant::now();
        let Ok(result) = waiter.await else {
            panic!("waiter must not be cancelled");
        };
        // After the invalidation no candidate remains, so the wait is
        // re-classified to the short no-match budget instead of hanging
        // out the full match timeout.
        assert!(matches!(result, Err(GridError::NoMatchingToken { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn timeout_classification_reflects_pool_content() {
        let pool = TokenPool::new();
        let pretender = Pretender::new().with_interest("color", interest("red", true));

        // Empty pool: nothing can ever match, short budget applies.
        let started = Instant::now();
        let result = pool
            .select_token(&pretender, Duration::from_millis(400), Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(GridError::NoMatchingToken { .. })));
        assert!(started.elapsed() < Duration::from_millis(300));

        // Matching token exists but stays reserved: long budget applies.
        pool.offer_token(red_circle("tok-1"), agent()).await;
        let Ok(_held) = pool.select(&pretender, SHORT).await else {
            panic!("selection must succeed");
        };
        let started = Instant::now();
        let result = pool
            .select_token(&pretender, Duration::from_millis(120), Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(GridError::MatchTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn select_return_select_yields_same_token() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;
        let pretender = Pretender::new().with_interest("color", interest("red", true));

        let Ok(first) = pool.select(&pretender, SHORT).await else {
            panic!("first selection must succeed");
        };
        pool.return_wrapper(&first).await;

        let Ok(second) = pool.select(&pretender, SHORT).await else {
            panic!("second selection must succeed");
        };
        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn invalidated_token_is_never_selected_again() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;
        let pretender = Pretender::new().with_interest("color", interest("red", true));

        assert!(pool.invalidate("tok-1").await);
        assert_eq!(pool.len().await, 0);

        let result = pool.select(&pretender, SHORT).await;
        assert!(matches!(result, Err(GridError::NoMatchingToken { .. })));
    }

    #[tokio::test]
    async fn invalidating_reserved_token_removes_it_on_return() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;
        let pretender = Pretender::new().with_interest("color", interest("red", true));

        let Ok(held) = pool.select(&pretender, SHORT).await else {
            panic!("selection must succeed");
        };
        pool.invalidate_wrapper(&held).await;
        // Still physically present until the holder lets go.
        assert_eq!(pool.len().await, 1);

        pool.return_wrapper(&held).await;
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn stale_return_is_a_noop() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;

        assert!(!pool.return_token("no-such-token").await);
        assert!(!pool.invalidate("no-such-token").await);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn unhealthy_token_is_withheld_until_healthy_again() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;
        let pretender = Pretender::new().with_interest("color", interest("red", true));

        let Ok(()) = pool.set_health("tok-1", TokenHealth::Failing).await else {
            panic!("health update must succeed");
        };
        assert!(!pool.exists_available_matching_token(&pretender).await);
        let result = pool.select(&pretender, SHORT).await;
        assert!(result.is_err());

        let Ok(()) = pool.set_health("tok-1", TokenHealth::Healthy).await else {
            panic!("health update must succeed");
        };
        assert!(pool.exists_available_matching_token(&pretender).await);
        assert!(pool.select(&pretender, SHORT).await.is_ok());
    }

    #[tokio::test]
    async fn set_health_on_unknown_token_fails() {
        let pool = TokenPool::new();
        let result = pool.set_health("ghost", TokenHealth::Failing).await;
        assert!(matches!(result, Err(GridError::UnknownToken(_))));
    }

    #[tokio::test]
    async fn close_wakes_parked_selectors() {
        let pool = Arc::new(TokenPool::new());

        let waiting_pool = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let pretender = Pretender::new().with_interest("color", interest("red", true));
            waiting_pool.select_token(&pretender, LONG, LONG).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.close().await;

        let Ok(result) = waiter.await else {
            panic!("waiter must not be cancelled");
        };
        assert!(matches!(result, Err(GridError::PoolClosed)));

        // Fresh selections fail fast once closed.
        let pretender = Pretender::new();
        let result = pool.select(&pretender, LONG).await;
        assert!(matches!(result, Err(GridError::PoolClosed)));
    }

    #[tokio::test]
    async fn reoffer_refreshes_without_disturbing_reservation() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;
        let pretender = Pretender::new().with_interest("color", interest("red", true));

        let Ok(_held) = pool.select(&pretender, SHORT).await else {
            panic!("selection must succeed");
        };

        // The agent heartbeats again while the token is reserved.
        assert!(!pool.offer_token(red_circle("tok-1"), agent()).await);
        let statuses = pool.tokens().await;
        assert_eq!(statuses.len(), 1);
        assert!(statuses.iter().all(|s| !s.free));
    }

    #[tokio::test]
    async fn keepalive_sweep_invalidates_stale_tokens() {
        let pool =
            TokenPool::with_keepalive(Duration::from_millis(50), Duration::from_millis(25));
        pool.offer_token(red_circle("tok-1"), agent()).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn reoffered_token_survives_keepalive_sweep() {
        let pool =
            TokenPool::with_keepalive(Duration::from_millis(100), Duration::from_millis(25));
        pool.offer_token(red_circle("tok-1"), agent()).await;

        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            pool.offer_token(red_circle("tok-1"), agent()).await;
        }
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn agent_token_invalidation_spares_other_agents() {
        let pool = TokenPool::new();
        pool.offer_token(red_circle("tok-1"), agent()).await;
        pool.offer_token(
            Token::new("tok-2", "agent-2").with_attribute("color", "red"),
            AgentRef::new("agent-2", "http://agent-2:8080"),
        )
        .await;

        let invalidated = pool.invalidate_agent_tokens("agent-1").await;
        assert_eq!(invalidated, vec!["tok-1".to_string()]);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selectors_never_share_a_token() {
        const TOKENS: usize = 5;
        const SELECTORS: usize = 10;
        const ITERATIONS: usize = 20;

        let pool = Arc::new(TokenPool::new());
        for i in 0..TOKENS {
            pool.offer_token(red_circle(&format!("tok-{i}")), agent())
                .await;
        }

        let held: Arc<StdMutex<HashSet<String>>> = Arc::new(StdMutex::new(HashSet::new()));
        let mut tasks = Vec::with_capacity(SELECTORS);
        for _ in 0..SELECTORS {
            let pool = Arc::clone(&pool);
            let held = Arc::clone(&held);
            tasks.push(tokio::spawn(async move {
                let pretender = Pretender::new().with_interest("color", interest("red", true));
                for _ in 0..ITERATIONS {
                    let Ok(token) = pool.select(&pretender, LONG).await else {
                        return false;
                    };
                    {
                        let Ok(mut holders) = held.lock() else {
                            return false;
                        };
                        // A second holder of the same ID would fail here.
                        if !holders.insert(token.id().to_string()) {
                            return false;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    {
                        let Ok(mut holders) = held.lock() else {
                            return false;
                        };
                        holders.remove(token.id());
                    }
                    pool.return_wrapper(&token).await;
                }
                true
            }));
        }

        for task in tasks {
            let Ok(clean) = task.await else {
                panic!("selector task must not be cancelled");
            };
            assert!(clean, "a token was held by two selectors at once");
        }

        assert_eq!(pool.len().await, TOKENS);
        assert!(pool.tokens().await.iter().all(|s| s.free));
        assert_eq!(pool.waiting_pretenders().await, 0);
    }
}
