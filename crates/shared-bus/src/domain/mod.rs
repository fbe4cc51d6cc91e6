//! Domain layer for the relay bus.
//!
//! Pure routing and correlation logic: patterns, specificity, subscriptions
//! and the result store. Nothing here executes a handler.

pub mod correlator;
pub mod errors;
pub mod matcher;
pub mod pattern;
pub mod registry;

pub use correlator::{cleanup_task, deadline_after, Correlator, CorrelatorStats, Received, Wait};
pub use errors::{BusError, PatternError};
pub use matcher::{Match, PatternMatcher};
pub use pattern::{MatchMode, Pattern, DELIMITER, WILDCARD};
pub use registry::{Subscription, SubscriptionRegistry};
