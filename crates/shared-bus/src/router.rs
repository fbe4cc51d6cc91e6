//! # Router
//!
//! Resolves destination names to handlers and runs them.
//!
//! ## Dispatch Modes
//!
//! | Mode | Handlers | Caller gets |
//! |------|----------|-------------|
//! | sync | most specific pattern, round-robin among its handlers | the reply |
//! | async | same as sync | a transaction id; the reply goes to the correlator |
//! | multicast | every handler of every matching pattern | one id per handler |
//!
//! ## Execution
//!
//! Each hop runs the handler in its own task under the request's remaining
//! timeout budget. A handler that forwards is followed to the next hop on the
//! same transaction until some handler replies, declines, fails or the
//! budget runs out.
//!
//! A synchronous caller whose handler forwards out of band keeps waiting:
//! the final reply is routed back to it instead of the correlator.

use crate::domain::{
    self, BusError, Correlator, Pattern, PatternMatcher, Subscription, SubscriptionRegistry,
};
use crate::forwarder::Forwarder;
use crate::ports::{Handler, IdGenerator, Outcome, Request};
use shared_types::{Payload, Priority, RequestContext, Source, TransId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Synchronous sends.
    pub sync_dispatches: AtomicU64,
    /// Asynchronous sends.
    pub async_dispatches: AtomicU64,
    /// Multicast sends.
    pub multicast_dispatches: AtomicU64,
    /// Handler invocations started by multicast.
    pub multicast_deliveries: AtomicU64,
    /// Hops taken by forwarding (in-band and out-of-band).
    pub forwarded: AtomicU64,
    /// Names that matched no pattern.
    pub no_subscriber: AtomicU64,
    /// Handler errors and panics.
    pub handler_failures: AtomicU64,
    /// Requests stopped because their budget ran out.
    pub budget_exhausted: AtomicU64,
}

/// A resolved handler slot.
#[derive(Clone)]
pub struct Target {
    pub pattern: String,
    pub capture: String,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("pattern", &self.pattern)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

/// Everything about a send except its destination and transaction id.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub source: Source,
    pub priority: Priority,
    pub timeout: Duration,
    pub payload: Payload,
    pub info: Payload,
}

impl Outgoing {
    fn into_context(self, trans_id: TransId) -> RequestContext {
        RequestContext::new(trans_id, self.source, self.timeout)
            .with_priority(self.priority)
            .with_payload(self.payload)
            .with_info(self.info)
    }
}

/// Reply channel back to a synchronous caller.
#[derive(Debug)]
struct SyncRoute {
    reply: oneshot::Sender<Result<Payload, BusError>>,
    /// Set once a handler hands the transaction off out of band.
    forwarded: bool,
}

/// Pattern routing over a subscription registry.
pub struct Router {
    registry: SubscriptionRegistry<Arc<dyn Handler>>,
    matcher: PatternMatcher,
    correlator: Arc<Correlator>,
    forwarder: Forwarder,
    ids: Arc<dyn IdGenerator>,
    max_id_attempts: u32,
    sync_routes: Mutex<HashMap<TransId, SyncRoute>>,
    stats: DispatchStats,
}

impl Router {
    pub fn new(
        matcher: PatternMatcher,
        correlator: Arc<Correlator>,
        forwarder: Forwarder,
        ids: Arc<dyn IdGenerator>,
        max_id_attempts: u32,
    ) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            matcher,
            correlator,
            forwarder,
            ids,
            max_id_attempts: max_id_attempts.max(1),
            sync_routes: Mutex::new(HashMap::new()),
            stats: DispatchStats::default(),
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Subscribe `handler` under `pattern`.
    ///
    /// # Returns
    ///
    /// The number of handlers now registered under `pattern`.
    ///
    /// # Errors
    ///
    /// `BusError::InvalidPattern` when `pattern` is empty or has more than
    /// one wildcard.
    pub fn register(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<usize, BusError> {
        let pattern = Pattern::parse(pattern)?;
        Ok(self.registry.register(pattern, handler))
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// The single handler a unicast send to `name` goes to.
    ///
    /// Advances the round-robin cursor of the chosen pattern.
    ///
    /// # Errors
    ///
    /// `BusError::NoSubscriber` when no pattern matches.
    pub fn resolve_unicast(&self, name: &str) -> Result<Target, BusError> {
        let target = self.registry.visit(|subscriptions| {
            let best = self
                .matcher
                .best(name, subscriptions.iter().map(|s| s.pattern()))?;
            let handler = subscriptions[best.index].next_handler()?;
            Some(Target {
                pattern: best.pattern.as_str().to_string(),
                capture: best.capture.to_string(),
                handler: Arc::clone(handler),
            })
        });

        target.ok_or_else(|| {
            self.stats.no_subscriber.fetch_add(1, Ordering::Relaxed);
            debug!(name, "No subscriber");
            BusError::NoSubscriber {
                name: name.to_string(),
            }
        })
    }

    /// Every handler of every pattern matching `name`: the most specific
    /// pattern's handlers first, each list in registration order.
    #[must_use]
    pub fn resolve_multicast(&self, name: &str) -> Vec<Target> {
        self.registry.visit(|subscriptions| {
            self.matcher
                .resolve(name, subscriptions.iter().map(|s| s.pattern()))
                .into_iter()
                .flat_map(|found| {
                    let subscription: &Subscription<Arc<dyn Handler>> =
                        &subscriptions[found.index];
                    subscription.handlers().iter().map(move |handler| Target {
                        pattern: found.pattern.as_str().to_string(),
                        capture: found.capture.to_string(),
                        handler: Arc::clone(handler),
                    })
                })
                .collect()
        })
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Run the request and wait for its final reply.
    ///
    /// When a handler on the way forwards the transaction out of band, the
    /// reply of the last hop is still delivered here.
    ///
    /// # Errors
    ///
    /// `NoSubscriber`, `HandlerFailure`, `BudgetExhausted` or `NoReply`.
    pub async fn dispatch_sync(&self, name: &str, outgoing: Outgoing) -> Result<Payload, BusError> {
        self.stats.sync_dispatches.fetch_add(1, Ordering::Relaxed);
        let target = self.resolve_unicast(name)?;
        let context = outgoing.into_context(self.ids.generate());
        let trans_id = context.trans_id();
        let deadline = deadline_after(context.timeout());
        debug!(trans_id = %trans_id, name, pattern = %target.pattern, "Sync dispatch");

        let (reply, routed) = oneshot::channel();
        self.sync_routes.lock().insert(
            trans_id,
            SyncRoute {
                reply,
                forwarded: false,
            },
        );

        match self.execute(name.to_string(), context, target).await {
            Err(BusError::NoReply { trans_id, name }) => {
                if !self.handed_off(&trans_id) {
                    return Err(BusError::NoReply { trans_id, name });
                }
                debug!(trans_id = %trans_id, name, "Waiting for forwarded reply");
                match tokio::time::timeout_at(deadline, routed).await {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(_)) => Err(BusError::NoReply { trans_id, name }),
                    Err(_) => {
                        self.sync_routes.lock().remove(&trans_id);
                        self.stats.budget_exhausted.fetch_add(1, Ordering::Relaxed);
                        warn!(trans_id = %trans_id, name, "Timeout budget exhausted");
                        Err(BusError::BudgetExhausted { trans_id, name })
                    }
                }
            }
            settled => {
                self.sync_routes.lock().remove(&trans_id);
                settled
            }
        }
    }

    /// Whether a sync transaction that got no direct reply was forwarded
    /// out of band. A route that was never forwarded is dropped.
    fn handed_off(&self, trans_id: &TransId) -> bool {
        let mut routes = self.sync_routes.lock();
        match routes.get(trans_id) {
            Some(route) if !route.forwarded => {
                routes.remove(trans_id);
                false
            }
            // forwarded, or already answered by the last hop
            _ => true,
        }
    }

    /// Start the request and return its transaction id without waiting.
    ///
    /// # Errors
    ///
    /// `NoSubscriber`, or `IdCollision` when every id attempt collided.
    pub fn dispatch_async(
        self: &Arc<Self>,
        name: &str,
        outgoing: Outgoing,
    ) -> Result<TransId, BusError> {
        self.stats.async_dispatches.fetch_add(1, Ordering::Relaxed);
        let target = self.resolve_unicast(name)?;
        let trans_id = self.allocate_id(deadline_after(outgoing.timeout))?;
        debug!(trans_id = %trans_id, name, pattern = %target.pattern, "Async dispatch");

        self.spawn_tracked(name.to_string(), outgoing.into_context(trans_id), target);
        Ok(trans_id)
    }

    /// Start the request on every matching handler.
    ///
    /// # Returns
    ///
    /// One transaction id per handler, in resolution order. Empty when
    /// nothing matches.
    ///
    /// # Errors
    ///
    /// `IdCollision` when every id attempt collided for some handler; no
    /// handler is started in that case.
    pub fn dispatch_multicast(
        self: &Arc<Self>,
        name: &str,
        outgoing: Outgoing,
    ) -> Result<Vec<TransId>, BusError> {
        self.stats.multicast_dispatches.fetch_add(1, Ordering::Relaxed);
        let targets = self.resolve_multicast(name);
        if targets.is_empty() {
            self.stats.no_subscriber.fetch_add(1, Ordering::Relaxed);
            debug!(name, "Multicast matched no subscriber");
            return Ok(Vec::new());
        }

        let deadline = deadline_after(outgoing.timeout);
        let mut ids = Vec::with_capacity(targets.len());
        for _ in &targets {
            match self.allocate_id(deadline) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    for id in &ids {
                        self.correlator.release(id);
                    }
                    return Err(err);
                }
            }
        }

        debug!(name, fan_out = targets.len(), "Multicast dispatch");
        for (trans_id, target) in ids.iter().zip(targets) {
            self.stats
                .multicast_deliveries
                .fetch_add(1, Ordering::Relaxed);
            self.spawn_tracked(name.to_string(), outgoing.clone().into_context(*trans_id), target);
        }
        Ok(ids)
    }

    /// Hand an in-flight transaction to `name` out of band.
    ///
    /// The final reply goes to the synchronous caller still waiting on the
    /// transaction, or else into the correlator under the context's
    /// transaction id. The context's timeout is the budget left for the
    /// remaining hops.
    ///
    /// # Errors
    ///
    /// `NoSubscriber` or `BudgetExhausted`.
    pub fn forward(self: &Arc<Self>, context: RequestContext, name: &str) -> Result<(), BusError> {
        let payload = context.payload().clone();
        let context = self
            .forwarder
            .rewrite(context, Duration::ZERO, name, payload)?;
        let target = self.resolve_unicast(name)?;

        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        let trans_id = context.trans_id();
        let routed = match self.sync_routes.lock().get_mut(&trans_id) {
            Some(route) => {
                route.forwarded = true;
                true
            }
            None => false,
        };
        if !routed {
            self.correlator
                .adopt(trans_id, deadline_after(context.timeout()));
        }
        self.spawn_tracked(name.to_string(), context, target);
        Ok(())
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    fn allocate_id(&self, deadline: Instant) -> Result<TransId, BusError> {
        let mut last_error = None;
        for attempt in 1..=self.max_id_attempts {
            let id = self.ids.generate();
            match self.correlator.track(id, deadline) {
                Ok(()) => return Ok(id),
                Err(err) => {
                    warn!(trans_id = %id, attempt, "Transaction id collision, regenerating");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(BusError::IdCollision {
            trans_id: TransId::NULL,
        }))
    }

    fn spawn_tracked(self: &Arc<Self>, name: String, context: RequestContext, target: Target) {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let trans_id = context.trans_id();
            match router.execute(name, context, target).await {
                Err(BusError::NoReply { name, .. }) => {
                    debug!(trans_id = %trans_id, name, "No reply, transaction left outstanding");
                }
                reply => router.settle(trans_id, reply),
            }
        });
    }

    /// Deliver a final reply to its waiting sync caller or the correlator.
    fn settle(&self, trans_id: TransId, reply: Result<Payload, BusError>) {
        let route = self.sync_routes.lock().remove(&trans_id);
        match route {
            Some(route) => {
                if route.reply.send(reply).is_err() {
                    debug!(trans_id = %trans_id, "Sync caller gone, forwarded reply dropped");
                }
            }
            None => {
                self.correlator.complete(trans_id, reply);
            }
        }
    }

    /// Follow the transaction from `target` until it settles.
    async fn execute(
        &self,
        mut name: String,
        mut context: RequestContext,
        mut target: Target,
    ) -> Result<Payload, BusError> {
        let trans_id = context.trans_id();

        loop {
            let started = Instant::now();
            let budget = context.timeout();
            let request = Request {
                name: name.clone(),
                pattern: target.pattern.clone(),
                capture: target.capture.clone(),
                context: context.clone(),
            };

            let handler = Arc::clone(&target.handler);
            let mut task = tokio::spawn(async move { handler.handle(request).await });

            let joined = match tokio::time::timeout(budget, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    self.stats.budget_exhausted.fetch_add(1, Ordering::Relaxed);
                    warn!(trans_id = %trans_id, name, "Timeout budget exhausted");
                    return Err(BusError::BudgetExhausted { trans_id, name });
                }
            };

            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => return Err(self.failure(trans_id, target.pattern, err.message)),
                Err(join_error) => {
                    return Err(self.failure(trans_id, target.pattern, panic_reason(join_error)))
                }
            };

            match outcome {
                Outcome::Reply(payload) => return Ok(payload),
                Outcome::NoReply => return Err(BusError::NoReply { trans_id, name }),
                Outcome::Forward {
                    name: next,
                    payload,
                } => {
                    context = self
                        .forwarder
                        .rewrite(context, started.elapsed(), &next, payload)?;
                    target = self.resolve_unicast(&next)?;
                    self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                    name = next;
                }
            }
        }
    }

    fn failure(&self, trans_id: TransId, pattern: String, reason: String) -> BusError {
        self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
        warn!(trans_id = %trans_id, pattern, reason, "Handler failed");
        BusError::HandlerFailure {
            trans_id,
            pattern,
            reason,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry<Arc<dyn Handler>> {
        &self.registry
    }

    #[must_use]
    pub fn matcher(&self) -> PatternMatcher {
        self.matcher
    }

    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    domain::deadline_after(Instant::now(), timeout)
}

fn panic_reason(error: JoinError) -> String {
    if !error.is_panic() {
        return "handler task cancelled".to_string();
    }
    let panic: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
