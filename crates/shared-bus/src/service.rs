//! Message bus service - the entry point hosts hold on to.
//!
//! Wires the router, correlator and forwarder from a [`BusConfig`] and
//! implements [`MessageBusApi`]. Cloning is cheap and every clone talks to
//! the same registry and result store, so handlers can capture a clone to
//! send or forward from inside a request.

use crate::config::{BusConfig, ConfigError};
use crate::domain::{
    cleanup_task, BusError, Correlator, CorrelatorStats, PatternMatcher, Received, Wait,
};
use crate::forwarder::Forwarder;
use crate::ports::{Handler, IdGenerator, MessageBusApi, SendOptions, UuidV7Generator};
use crate::router::{DispatchStats, Outgoing, Router};
use async_trait::async_trait;
use shared_types::{Payload, Priority, RequestContext, Source, TransId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A request/response message bus.
#[derive(Clone)]
pub struct MessageBus {
    router: Arc<Router>,
    config: Arc<BusConfig>,
}

impl MessageBus {
    /// Create a bus.
    ///
    /// # Errors
    ///
    /// Returns the validation error when `config` is invalid.
    pub fn new(config: BusConfig) -> Result<Self, ConfigError> {
        Self::with_id_generator(config, Arc::new(UuidV7Generator))
    }

    /// Create a bus drawing transaction ids from `ids`.
    ///
    /// # Errors
    ///
    /// Returns the validation error when `config` is invalid.
    pub fn with_id_generator(
        config: BusConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let correlator = Arc::new(Correlator::new(config.result_retention));
        let router = Router::new(
            PatternMatcher::new(config.match_mode),
            correlator,
            Forwarder::new(config.forward_timeout),
            ids,
            config.max_id_attempts,
        );

        info!(
            identity = %config.identity,
            prefix = %config.prefix,
            match_mode = ?config.match_mode,
            "Message bus created"
        );

        Ok(Self {
            router: Arc::new(router),
            config: Arc::new(config),
        })
    }

    // =========================================================================
    // NAMESPACE
    // =========================================================================

    /// The namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// `prefix + suffix`.
    #[must_use]
    pub fn prefixed(&self, suffix: &str) -> String {
        format!("{}{}", self.config.prefix, suffix)
    }

    /// Register `handler` under `prefix + suffix`.
    ///
    /// # Errors
    ///
    /// `BusError::InvalidPattern` when the combined pattern is invalid.
    pub fn subscribe(&self, suffix: &str, handler: Arc<dyn Handler>) -> Result<usize, BusError> {
        self.router.register(&self.prefixed(suffix), handler)
    }

    // =========================================================================
    // SENDS WITH OPTIONS
    // =========================================================================

    /// [`MessageBusApi::send_sync`] with per-send overrides.
    ///
    /// # Errors
    ///
    /// Same as [`MessageBusApi::send_sync`].
    pub async fn send_sync_with(
        &self,
        name: &str,
        payload: Payload,
        options: SendOptions,
    ) -> Result<Payload, BusError> {
        self.router
            .dispatch_sync(name, self.outgoing(payload, options))
            .await
    }

    /// [`MessageBusApi::send_async`] with per-send overrides.
    ///
    /// # Errors
    ///
    /// Same as [`MessageBusApi::send_async`].
    pub fn send_async_with(
        &self,
        name: &str,
        payload: Payload,
        options: SendOptions,
    ) -> Result<TransId, BusError> {
        self.router
            .dispatch_async(name, self.outgoing(payload, options))
    }

    /// [`MessageBusApi::send_multicast`] with per-send overrides.
    ///
    /// # Errors
    ///
    /// Same as [`MessageBusApi::send_multicast`].
    pub fn send_multicast_with(
        &self,
        name: &str,
        payload: Payload,
        options: SendOptions,
    ) -> Result<Vec<TransId>, BusError> {
        self.router
            .dispatch_multicast(name, self.outgoing(payload, options))
    }

    fn outgoing(&self, payload: Payload, options: SendOptions) -> Outgoing {
        Outgoing {
            source: options
                .source
                .unwrap_or_else(|| Source::new(self.config.identity.clone())),
            priority: options
                .priority
                .unwrap_or(Priority(self.config.default_priority)),
            timeout: options.timeout.unwrap_or(self.config.default_timeout),
            payload,
            info: options.info,
        }
    }

    // =========================================================================
    // HOUSEKEEPING
    // =========================================================================

    /// The configured receive wait.
    #[must_use]
    pub fn default_wait(&self) -> Wait {
        Wait::from(self.config.recv_timeout)
    }

    /// Spawn the periodic sweep of expired transactions and results.
    pub fn start_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        debug!(interval_ms = interval.as_millis() as u64, "Starting result sweep");
        tokio::spawn(cleanup_task(Arc::clone(self.router.correlator()), interval))
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[must_use]
    pub fn correlator(&self) -> &Arc<Correlator> {
        self.router.correlator()
    }

    #[must_use]
    pub fn dispatch_stats(&self) -> &DispatchStats {
        self.router.stats()
    }

    #[must_use]
    pub fn correlator_stats(&self) -> &CorrelatorStats {
        self.router.correlator().stats()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("identity", &self.config.identity)
            .field("prefix", &self.config.prefix)
            .field("patterns", &self.router.registry().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageBusApi for MessageBus {
    fn register(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<usize, BusError> {
        self.router.register(pattern, handler)
    }

    async fn send_sync(&self, name: &str, payload: Payload) -> Result<Payload, BusError> {
        self.send_sync_with(name, payload, SendOptions::default())
            .await
    }

    fn send_async(&self, name: &str, payload: Payload) -> Result<TransId, BusError> {
        self.send_async_with(name, payload, SendOptions::default())
    }

    fn send_multicast(&self, name: &str, payload: Payload) -> Result<Vec<TransId>, BusError> {
        self.send_multicast_with(name, payload, SendOptions::default())
    }

    async fn recv(&self, id: TransId, wait: Wait) -> Result<Received, BusError> {
        self.router.correlator().await_result(id, wait).await
    }

    async fn recv_oldest(&self, wait: Wait) -> Result<Received, BusError> {
        match self.router.correlator().await_oldest(wait).await {
            Err(BusError::Timeout) => Ok(Received::null()),
            other => other,
        }
    }

    async fn peek(&self, id: TransId, wait: Wait) -> Result<Received, BusError> {
        self.router.correlator().peek(id, wait).await
    }

    fn forward(&self, context: RequestContext, name: &str) -> Result<(), BusError> {
        self.router.forward(context, name)
    }
}
