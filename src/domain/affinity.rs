//! Affinity scoring between a pretender and a candidate token.
//!
//! Scoring is symmetric: the pretender's interests are checked against
//! the candidate's attributes *and* the candidate's interests against the
//! pretender's attributes, accumulating into a single score. Either side
//! can therefore impose hard requirements — a caller can demand
//! `os ~ "linux"` (exact) while a token simultaneously demands the caller
//! belong to `project ~ "orion"` (exact). Soft interests only influence
//! ranking among eligible candidates.

use std::collections::HashMap;

use super::token::{TokenHealth, TokenWrapper};
use super::{Identity, Interest};

/// Pure scoring function over a pair of identities.
///
/// `None` means the candidate is disqualified and must never be
/// selected; `Some(score)` ranks eligible candidates (higher is better).
pub trait AffinityEvaluator: Send + Sync {
    /// Scores `candidate` against `pretender`.
    fn affinity(&self, pretender: &dyn Identity, candidate: &dyn Identity) -> Option<u32>;
}

impl AffinityEvaluator for Box<dyn AffinityEvaluator> {
    fn affinity(&self, pretender: &dyn Identity, candidate: &dyn Identity) -> Option<u32> {
        self.as_ref().affinity(pretender, candidate)
    }
}

/// The base evaluator: symmetric interest/attribute matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterestAffinityEvaluator;

impl AffinityEvaluator for InterestAffinityEvaluator {
    fn affinity(&self, pretender: &dyn Identity, candidate: &dyn Identity) -> Option<u32> {
        let forward = score_one_side(pretender.interests(), candidate.attributes())?;
        let backward = score_one_side(candidate.interests(), pretender.attributes())?;
        Some(forward + backward)
    }
}

/// Scores one direction of the match.
///
/// Each interest whose key resolves to a matching attribute contributes
/// one point. A missing or non-matching attribute disqualifies when the
/// interest is exact and contributes nothing otherwise.
fn score_one_side(
    interests: &HashMap<String, Interest>,
    attributes: &HashMap<String, String>,
) -> Option<u32> {
    let mut score = 0;
    for (key, interest) in interests {
        match attributes.get(key) {
            Some(value) if interest.matches(value) => score += 1,
            _ if interest.is_exact() => return None,
            _ => {}
        }
    }
    Some(score)
}

/// Health gate composed on top of a base evaluator.
///
/// Disqualifies any token whose health is not [`TokenHealth::Healthy`]
/// before the base evaluator ever sees it, so health-based
/// disqualification stays independent of attribute matching.
#[derive(Default, Clone, Copy)]
pub struct HealthAwareEvaluator<E = InterestAffinityEvaluator> {
    base: E,
}

impl<E: AffinityEvaluator> HealthAwareEvaluator<E> {
    /// Wraps `base` with the health gate.
    #[must_use]
    pub fn new(base: E) -> Self {
        Self { base }
    }

    /// Scores a registered token against a pretender.
    #[must_use]
    pub fn score(&self, pretender: &dyn Identity, token: &TokenWrapper) -> Option<u32> {
        match token.health() {
            TokenHealth::Failing | TokenHealth::Maintenance => None,
            TokenHealth::Healthy => self.base.affinity(pretender, token),
        }
    }
}

impl<E> std::fmt::Debug for HealthAwareEvaluator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAwareEvaluator").finish_non_exhaustive()
    }
}
