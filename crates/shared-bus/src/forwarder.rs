//! # Forwarder
//!
//! Rewrites an in-flight request for its next hop. The transaction id,
//! requester identity and priority carry over unchanged; the body is
//! replaced and the timeout budget is kept or reduced per
//! [`ForwardTimeoutPolicy`].

use crate::domain::BusError;
use serde::{Deserialize, Serialize};
use shared_types::{Payload, RequestContext};
use std::time::Duration;
use tracing::debug;

/// How the timeout budget changes across a hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardTimeoutPolicy {
    /// Every hop gets the budget the request arrived with.
    Preserve,
    /// Time spent in the forwarding handler is subtracted.
    #[default]
    DecrementElapsed,
}

/// Applies the forwarding policy to request contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forwarder {
    policy: ForwardTimeoutPolicy,
}

impl Forwarder {
    #[must_use]
    pub fn new(policy: ForwardTimeoutPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> ForwardTimeoutPolicy {
        self.policy
    }

    /// Build the context for the next hop.
    ///
    /// # Arguments
    ///
    /// * `context` - context of the hop that chose to forward
    /// * `elapsed` - time that hop spent before forwarding
    /// * `name` - next destination (for diagnostics)
    /// * `payload` - body for the next hop
    ///
    /// # Errors
    ///
    /// `BusError::BudgetExhausted` when no time is left for the next hop.
    pub fn rewrite(
        &self,
        context: RequestContext,
        elapsed: Duration,
        name: &str,
        payload: Payload,
    ) -> Result<RequestContext, BusError> {
        let remaining = match self.policy {
            ForwardTimeoutPolicy::Preserve => context.timeout(),
            ForwardTimeoutPolicy::DecrementElapsed => context.timeout().saturating_sub(elapsed),
        };

        if remaining.is_zero() {
            return Err(BusError::BudgetExhausted {
                trans_id: context.trans_id(),
                name: name.to_string(),
            });
        }

        debug!(
            trans_id = %context.trans_id(),
            name,
            remaining_ms = remaining.as_millis() as u64,
            "Forwarding request"
        );

        Ok(context.with_payload(payload).with_timeout(remaining))
    }
}
