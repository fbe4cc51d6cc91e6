//! # Pattern Matcher
//!
//! Resolves a destination name against registered patterns and orders the
//! matches by specificity, most specific first:
//!
//! | Rank | Rule |
//! |------|------|
//! | 1 | An exact pattern beats every wildcard pattern |
//! | 2 | Among wildcard patterns, the longer literal text wins |
//! | 3 | Remaining ties go to the earliest registered pattern |
//!
//! Matching is a linear scan over the patterns and never fails; an empty
//! result means there is no subscriber for the name.

use super::pattern::{MatchMode, Pattern};
use std::cmp::Ordering;

/// One pattern that matched a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'p, 'n> {
    /// Position of the pattern in registration order.
    pub index: usize,
    /// The matching pattern.
    pub pattern: &'p Pattern,
    /// Text covered by the wildcard (empty for exact patterns).
    pub capture: &'n str,
}

impl Match<'_, '_> {
    /// Total specificity order: `Less` means `self` is more specific.
    #[must_use]
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        other
            .pattern
            .is_exact()
            .cmp(&self.pattern.is_exact())
            .then_with(|| other.pattern.literal_len().cmp(&self.pattern.literal_len()))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Stateless matcher configured with a [`MatchMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher {
    mode: MatchMode,
}

impl PatternMatcher {
    #[must_use]
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// All patterns matching `name`, most specific first.
    ///
    /// `patterns` must be supplied in registration order; the position of
    /// each pattern in the iterator is its tie-break rank.
    pub fn resolve<'p, 'n, I>(&self, name: &'n str, patterns: I) -> Vec<Match<'p, 'n>>
    where
        I: IntoIterator<Item = &'p Pattern>,
    {
        let mut matches: Vec<Match<'p, 'n>> = patterns
            .into_iter()
            .enumerate()
            .filter_map(|(index, pattern)| {
                pattern.capture(name, self.mode).map(|capture| Match {
                    index,
                    pattern,
                    capture,
                })
            })
            .collect();

        matches.sort_by(|a, b| a.cmp_specificity(b));
        matches
    }

    /// The single most specific pattern matching `name`.
    pub fn best<'p, 'n, I>(&self, name: &'n str, patterns: I) -> Option<Match<'p, 'n>>
    where
        I: IntoIterator<Item = &'p Pattern>,
    {
        patterns
            .into_iter()
            .enumerate()
            .filter_map(|(index, pattern)| {
                pattern.capture(name, self.mode).map(|capture| Match {
                    index,
                    pattern,
                    capture,
                })
            })
            .min_by(|a, b| a.cmp_specificity(b))
    }
}
