//! The [`Identity`] capability shared by tokens and pretenders.
//!
//! Both sides of a match expose the same surface: a stable ID, a map of
//! attributes describing what they *are*, and a map of named interests
//! describing what they *require* from the other side. The affinity
//! evaluator only ever sees `&dyn Identity`, so tokens and callers are
//! interchangeable as far as scoring is concerned.

use std::collections::HashMap;

use super::Interest;

/// Capability of exposing attributes and interests for matching.
pub trait Identity: Send + Sync {
    /// Stable identifier, unique within a pool.
    fn id(&self) -> &str;

    /// Attribute map (what this identity *is*).
    fn attributes(&self) -> &HashMap<String, String>;

    /// Named interests (what this identity *requires* from the other side).
    fn interests(&self) -> &HashMap<String, Interest>;
}

/// A caller's identity when requesting a token from the pool.
///
/// Built with the `with_*` methods:
///
/// ```
/// use token_grid::domain::{Interest, Pretender};
///
/// # fn demo() -> Result<(), token_grid::error::GridError> {
/// let pretender = Pretender::new()
///     .with_attribute("project", "orion")
///     .with_interest("os", Interest::new("linux", true)?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pretender {
    id: String,
    attributes: HashMap<String, String>,
    interests: HashMap<String, Interest>,
}

impl Pretender {
    /// Creates an empty pretender with a random ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
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
}

impl Default for Pretender {
    fn default() -> Self {
        Self::new()
    }
}

impl Identity for Pretender {
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

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn pretenders_get_unique_ids() {
        let a = Pretender::new();
        let b = Pretender::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn builder_accumulates_attributes_and_interests() {
        let Ok(interest) = Interest::new("red", true) else {
            panic!("valid pattern");
        };
        let p = Pretender::new()
            .with_attribute("color", "green")
            .with_attribute("shape", "line")
            .with_interest("color", interest);
        assert_eq!(p.attributes().len(), 2);
        assert_eq!(p.attributes().get("shape").map(String::as_str), Some("line"));
        assert_eq!(p.interests().len(), 1);
    }
}
