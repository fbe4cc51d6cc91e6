//! Bus error types.
//!
//! Defines every error condition the routing and correlation core reports.

use shared_types::TransId;
use thiserror::Error;

/// Errors from pattern parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string is empty.
    #[error("Pattern is empty")]
    Empty,

    /// The pattern contains more than one wildcard marker.
    #[error("Pattern {pattern:?} has {count} wildcards (at most one allowed)")]
    TooManyWildcards { pattern: String, count: usize },
}

/// Errors surfaced by dispatch, correlation and registration.
///
/// Results of asynchronous dispatches are stored as `Result<Payload, BusError>`,
/// so a failure that happened inside a handler reaches whoever claims the
/// transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No registered pattern matches the destination name.
    #[error("No subscriber for {name:?}")]
    NoSubscriber { name: String },

    /// A bounded wait expired before a result arrived.
    #[error("Timed out waiting for a result")]
    Timeout,

    /// The generated transaction id is already outstanding or stored.
    #[error("Transaction id {trans_id} is already in use")]
    IdCollision { trans_id: TransId },

    /// The handler returned an error or panicked.
    #[error("Handler for {pattern:?} failed on transaction {trans_id}: {reason}")]
    HandlerFailure {
        trans_id: TransId,
        pattern: String,
        reason: String,
    },

    /// The request's timeout budget ran out before a reply was produced.
    #[error("Timeout budget exhausted for transaction {trans_id} at {name:?}")]
    BudgetExhausted { trans_id: TransId, name: String },

    /// The handler declined to reply to a synchronous request.
    #[error("Handler for {name:?} sent no reply to transaction {trans_id}")]
    NoReply { trans_id: TransId, name: String },

    /// Registration was attempted with a malformed pattern.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),
}

impl BusError {
    /// Transaction the error belongs to, when it has one.
    #[must_use]
    pub fn trans_id(&self) -> Option<TransId> {
        match self {
            Self::IdCollision { trans_id }
            | Self::HandlerFailure { trans_id, .. }
            | Self::BudgetExhausted { trans_id, .. }
            | Self::NoReply { trans_id, .. } => Some(*trans_id),
            Self::NoSubscriber { .. } | Self::Timeout | Self::InvalidPattern(_) => None,
        }
    }
}
