//! # Request Context Envelope
//!
//! The unit a request travels in, from the sender through every forwarding
//! hop to the handler that finally replies.
//!
//! ## Properties
//!
//! - **Correlation**: `trans_id` is fixed at construction and has no setter.
//! - **Identity**: `source` names the original requester, not the last hop.
//! - **Budget**: `timeout` is the time left for the whole transaction.

use crate::entities::{Priority, Source, TransId};
use crate::Payload;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything a handler knows about an in-flight request besides its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Transaction this request belongs to.
    trans_id: TransId,

    /// Original requester.
    source: Source,

    /// Scheduling priority, preserved across hops.
    priority: Priority,

    /// Remaining timeout budget.
    #[serde(with = "humantime_serde")]
    timeout: Duration,

    /// Request body.
    payload: Payload,

    /// Request metadata (opaque to the bus).
    info: Payload,
}

impl RequestContext {
    /// Create a context with default priority and empty body and metadata.
    pub fn new(trans_id: TransId, source: Source, timeout: Duration) -> Self {
        Self {
            trans_id,
            source,
            priority: Priority::default(),
            timeout,
            payload: Payload::new(),
            info: Payload::new(),
        }
    }

    /// Replace the request body.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Replace the request metadata.
    #[must_use]
    pub fn with_info(mut self, info: impl Into<Payload>) -> Self {
        self.info = info.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the remaining timeout budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn trans_id(&self) -> TransId {
        self.trans_id
    }

    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn info(&self) -> &Payload {
        &self.info
    }

    /// Consume the context, keeping only the body.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}
