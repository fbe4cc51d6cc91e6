//! # Subscription Patterns
//!
//! A pattern is a destination name with at most one `*` wildcard.
//!
//! ```text
//!   pattern:  a/b/ * /d         name:  a/b/ zz /d
//!             └─┬┘ │ └┬┘               └─┬┘ └┬┘ └┬┘
//!           prefix │ suffix          prefix  │  suffix
//!               wildcard                  capture
//! ```
//!
//! A wildcard pattern matches when `prefix + capture + suffix == name`. The
//! capture may be empty. Whether it may cross the `/` delimiter depends on
//! the [`MatchMode`].

use super::errors::PatternError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The wildcard marker.
pub const WILDCARD: char = '*';

/// The hierarchy delimiter used by [`MatchMode::Segment`].
pub const DELIMITER: char = '/';

/// How far a wildcard capture may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The capture may contain any characters, delimiters included.
    #[default]
    Glob,
    /// The capture may not contain the `/` delimiter.
    Segment,
}

/// A parsed subscription pattern. The original string is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    raw: String,
    /// Byte offset of the wildcard, if any.
    wildcard: Option<usize>,
}

impl Pattern {
    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// - `PatternError::Empty` - the string is empty
    /// - `PatternError::TooManyWildcards` - more than one `*`
    pub fn parse(raw: impl Into<String>) -> Result<Self, PatternError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let count = raw.matches(WILDCARD).count();
        if count > 1 {
            return Err(PatternError::TooManyWildcards {
                pattern: raw,
                count,
            });
        }

        let wildcard = raw.find(WILDCARD);
        Ok(Self { raw, wildcard })
    }

    /// The pattern exactly as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern has no wildcard.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.wildcard.is_none()
    }

    /// Combined length of the non-wildcard text, in bytes.
    #[must_use]
    pub fn literal_len(&self) -> usize {
        match self.wildcard {
            Some(_) => self.raw.len() - WILDCARD.len_utf8(),
            None => self.raw.len(),
        }
    }

    /// Literal text before the wildcard (the whole pattern when exact).
    #[must_use]
    pub fn prefix(&self) -> &str {
        match self.wildcard {
            Some(at) => &self.raw[..at],
            None => &self.raw,
        }
    }

    /// Literal text after the wildcard (empty when exact).
    #[must_use]
    pub fn suffix(&self) -> &str {
        match self.wildcard {
            Some(at) => &self.raw[at + WILDCARD.len_utf8()..],
            None => "",
        }
    }

    /// Match `name` against this pattern.
    ///
    /// Returns the text the wildcard stands for (empty for exact patterns),
    /// or `None` when the pattern does not match. The empty name never
    /// matches.
    #[must_use]
    pub fn capture<'n>(&self, name: &'n str, mode: MatchMode) -> Option<&'n str> {
        if name.is_empty() {
            return None;
        }

        if self.wildcard.is_none() {
            return (name == self.raw).then_some("");
        }

        let prefix = self.prefix();
        let suffix = self.suffix();
        if name.len() < prefix.len() + suffix.len()
            || !name.starts_with(prefix)
            || !name.ends_with(suffix)
        {
            return None;
        }

        let captured = &name[prefix.len()..name.len() - suffix.len()];
        if mode == MatchMode::Segment && captured.contains(DELIMITER) {
            return None;
        }
        Some(captured)
    }

    /// True when `name` matches this pattern.
    #[must_use]
    pub fn matches(&self, name: &str, mode: MatchMode) -> bool {
        self.capture(name, mode).is_some()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Pattern {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl TryFrom<&str> for Pattern {
    type Error = PatternError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}
