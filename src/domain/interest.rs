//! Selection interest: a regex constraint with an exactness flag.
//!
//! An [`Interest`] expresses what one side of a match requires from the
//! other side's attributes. An *exact* interest is a hard constraint:
//! a candidate that fails it is disqualified outright. A soft interest
//! only contributes to the affinity score and never disqualifies.

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;

use crate::error::GridError;

/// Immutable regex constraint used by both tokens and pretenders.
///
/// Matching has full-string semantics: the pattern `red` matches the
/// attribute value `"red"` but not `"dark-red"`. Internally the pattern
/// is compiled as `^(?:pattern)$`.
#[derive(Debug, Clone)]
pub struct Interest {
    pattern: Regex,
    source: String,
    exact: bool,
}

impl Interest {
    /// Compiles a new interest from a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidPattern`] if the pattern is not a
    /// valid regular expression.
    pub fn new(pattern: &str, exact: bool) -> Result<Self, GridError> {
        let anchored = format!("^(?:{pattern})$");
        let compiled = Regex::new(&anchored)
            .map_err(|e| GridError::InvalidPattern(format!("{pattern}: {e}")))?;
        Ok(Self {
            pattern: compiled,
            source: pattern.to_string(),
            exact,
        })
    }

    /// Returns `true` if the whole of `value` matches the pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }

    /// Returns the original (unanchored) pattern text.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Returns `true` if this is a hard constraint.
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        self.exact
    }
}

/// Two interests are equal iff their pattern source and exactness agree.
impl PartialEq for Interest {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.exact == other.exact
    }
}

impl Eq for Interest {}

impl Hash for Interest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.exact.hash(state);
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exact {
            write!(f, "{} (exact)", self.source)
        } else {
            write!(f, "{}", self.source)
        }
    }
}
