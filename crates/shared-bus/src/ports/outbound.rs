//! Outbound (Driven) ports for the relay bus.
//!
//! These traits are what the bus consumes from the hosting layer: the
//! handler invocation primitive and a transaction id source.

use crate::domain::BusError;
use async_trait::async_trait;
use shared_types::{Payload, RequestContext, TransId};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// A request as delivered to a handler.
#[derive(Debug, Clone)]
pub struct Request {
    /// Destination name the request was sent to.
    pub name: String,
    /// Pattern that matched `name`.
    pub pattern: String,
    /// Text the wildcard stood for (empty for exact patterns).
    pub capture: String,
    /// Transaction, requester, priority, budget and body.
    pub context: RequestContext,
}

impl Request {
    #[must_use]
    pub fn trans_id(&self) -> TransId {
        self.context.trans_id()
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        self.context.payload()
    }
}

/// What a handler decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reply to the requester.
    Reply(Payload),
    /// Hand the same transaction to another name with a new body.
    Forward { name: String, payload: Payload },
    /// Do not reply. The transaction stays outstanding.
    NoReply,
}

impl Outcome {
    pub fn reply(payload: impl Into<Payload>) -> Self {
        Self::Reply(payload.into())
    }

    pub fn forward(name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self::Forward {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// A handler fault. Reported to the requester as `BusError::HandlerFailure`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<BusError> for HandlerError {
    fn from(err: BusError) -> Self {
        Self::new(err.to_string())
    }
}

/// Service code subscribed under a pattern.
///
/// One registered handler is one instance; registering the same handler
/// twice gives it two slots.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one request.
    ///
    /// # Errors
    ///
    /// Any `HandlerError` is recorded against the request's transaction.
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        (self.f)(request).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _future: PhantomData,
    })
}

/// Source of transaction ids.
///
/// Abstracted so collision handling can be exercised deterministically.
pub trait IdGenerator: Send + Sync {
    /// A fresh, non-null transaction id.
    fn generate(&self) -> TransId;
}

/// Default generator: time-ordered UUID v7.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn generate(&self) -> TransId {
        TransId::new()
    }
}

/// Generator replaying a fixed list of ids, then falling back to fresh ones.
#[cfg(test)]
pub struct ScriptedIdGenerator {
    script: parking_lot::Mutex<std::collections::VecDeque<TransId>>,
}

#[cfg(test)]
impl ScriptedIdGenerator {
    pub fn new(ids: impl IntoIterator<Item = TransId>) -> Self {
        Self {
            script: parking_lot::Mutex::new(ids.into_iter().collect()),
        }
    }
}

#[cfg(test)]
impl IdGenerator for ScriptedIdGenerator {
    fn generate(&self) -> TransId {
        self.script.lock().pop_front().unwrap_or_else(TransId::new)
    }
}
