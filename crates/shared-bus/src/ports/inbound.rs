//! Inbound (Driving) ports for the relay bus.
//!
//! The API a service-hosting layer calls to register handlers, send
//! requests and collect results.

use crate::domain::{BusError, Received, Wait};
use crate::ports::outbound::Handler;
use async_trait::async_trait;
use shared_types::{Payload, Priority, RequestContext, Source, TransId};
use std::sync::Arc;
use std::time::Duration;

/// Per-send overrides. Unset fields fall back to the bus configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Request metadata, opaque to the bus.
    pub info: Payload,
    pub priority: Option<Priority>,
    /// Timeout budget for the whole transaction.
    pub timeout: Option<Duration>,
    /// Requester identity; defaults to the bus identity.
    pub source: Option<Source>,
}

impl SendOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_info(mut self, info: impl Into<Payload>) -> Self {
        self.info = info.into();
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Primary API of the message bus.
#[async_trait]
pub trait MessageBusApi: Send + Sync {
    /// Subscribe `handler` under `pattern`.
    ///
    /// # Returns
    /// The number of handlers now registered under `pattern`.
    ///
    /// # Errors
    /// - `InvalidPattern`: empty pattern or more than one wildcard
    fn register(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<usize, BusError>;

    /// Send and wait for the final reply.
    ///
    /// # Errors
    /// - `NoSubscriber`, `HandlerFailure`, `BudgetExhausted`, `NoReply`
    async fn send_sync(&self, name: &str, payload: Payload) -> Result<Payload, BusError>;

    /// Send without waiting; the reply is claimed later by id.
    ///
    /// # Errors
    /// - `NoSubscriber`, `IdCollision`
    fn send_async(&self, name: &str, payload: Payload) -> Result<TransId, BusError>;

    /// Send to every matching handler. Empty when nothing matches.
    ///
    /// # Errors
    /// - `IdCollision`
    fn send_multicast(&self, name: &str, payload: Payload) -> Result<Vec<TransId>, BusError>;

    /// Remove and return the result of `id`.
    ///
    /// # Errors
    /// - `Timeout`, or the failure stored for `id`
    async fn recv(&self, id: TransId, wait: Wait) -> Result<Received, BusError>;

    /// Remove and return the earliest-arrived result.
    ///
    /// Returns [`Received::null`] when nothing arrives in time.
    ///
    /// # Errors
    /// - the failure stored for the oldest transaction
    async fn recv_oldest(&self, wait: Wait) -> Result<Received, BusError>;

    /// Return the result of `id` without removing it.
    ///
    /// # Errors
    /// - `Timeout`, or the failure stored for `id`
    async fn peek(&self, id: TransId, wait: Wait) -> Result<Received, BusError>;

    /// Hand an in-flight transaction to `name`; its final reply is stored
    /// under the same transaction id.
    ///
    /// # Errors
    /// - `NoSubscriber`, `BudgetExhausted`
    fn forward(&self, context: RequestContext, name: &str) -> Result<(), BusError>;
}
