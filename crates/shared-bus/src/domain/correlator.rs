//! # Correlator
//!
//! Tracks outstanding asynchronous transactions and holds their results until
//! a consumer claims them.
//!
//! ## Storage
//!
//! ```text
//!   outstanding: trans_id -> deadline        (sent, no result yet)
//!   arrived:     seq -> PendingResult        (arrival order, seq increasing)
//!   index:       trans_id -> seq             (claim by id)
//! ```
//!
//! All three live behind one mutex, so every insertion and removal is atomic
//! and a stored result is claimed by exactly one consumer. Waiters suspend on
//! a [`Notify`] that is signalled on every arrival.
//!
//! ## Claims
//!
//! - [`Correlator::await_result`] removes the result for one id.
//! - [`Correlator::await_oldest`] removes the earliest arrival.
//! - [`Correlator::peek`] returns a copy and leaves the result in place.
//!
//! A timed-out wait leaves nothing behind: a result that arrives later is
//! still stored and can be claimed by id or by oldest-pull.

use super::errors::BusError;
use parking_lot::Mutex;
use shared_types::{Payload, TransId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

// =============================================================================
// WAIT POLICY
// =============================================================================

/// Stand-in for a deadline too far away to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + duration`, clamped to a far-future instant when the sum
/// overflows.
#[must_use]
pub fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// How long a claim may suspend the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Check once and return immediately.
    Poll,
    /// Wait at most this long.
    Bounded(Duration),
    /// Wait until a result arrives.
    Indefinite,
}

impl Wait {
    /// Convert a millisecond count, treating zero and negative values as
    /// [`Wait::Poll`].
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(0) | Err(_) => Self::Poll,
            Ok(millis) => Self::Bounded(Duration::from_millis(millis)),
        }
    }

    /// The instant a bounded wait gives up, measured from `now`.
    #[must_use]
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        match self {
            Self::Bounded(duration) => Some(deadline_after(now, *duration)),
            Self::Poll | Self::Indefinite => None,
        }
    }
}

impl From<Duration> for Wait {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::Poll
        } else {
            Self::Bounded(duration)
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// A claimed result: the transaction it belongs to and its reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub trans_id: TransId,
    pub payload: Payload,
}

impl Received {
    /// The "nothing arrived" sentinel: null id, empty payload.
    #[must_use]
    pub fn null() -> Self {
        Self {
            trans_id: TransId::NULL,
            payload: Payload::new(),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.trans_id.is_null()
    }
}

/// A completed transaction waiting to be claimed.
#[derive(Debug, Clone)]
struct PendingResult {
    trans_id: TransId,
    reply: Result<Payload, BusError>,
    arrived_at: Instant,
}

impl PendingResult {
    fn into_received(self) -> Result<Received, BusError> {
        let trans_id = self.trans_id;
        self.reply.map(|payload| Received { trans_id, payload })
    }
}

/// Which stored result a waiter is after.
#[derive(Debug, Clone, Copy)]
enum Claim {
    Take(TransId),
    Oldest,
    Peek(TransId),
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Correlator counters.
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    /// Transactions registered as outstanding.
    pub tracked: AtomicU64,
    /// Results stored.
    pub completed: AtomicU64,
    /// Results removed by a consumer.
    pub consumed: AtomicU64,
    /// Outstanding ids and stored results dropped by the retention sweep.
    pub expired: AtomicU64,
    /// Ids rejected because they were already in use.
    pub collisions: AtomicU64,
    /// Second results for an already stored transaction (dropped).
    pub duplicates: AtomicU64,
}

// =============================================================================
// CORRELATOR
// =============================================================================

#[derive(Debug, Default)]
struct State {
    outstanding: HashMap<TransId, Instant>,
    arrived: BTreeMap<u64, PendingResult>,
    index: HashMap<TransId, u64>,
    next_seq: u64,
}

impl State {
    fn in_use(&self, id: &TransId) -> bool {
        self.outstanding.contains_key(id) || self.index.contains_key(id)
    }

    fn take(&mut self, id: &TransId) -> Option<PendingResult> {
        let seq = self.index.remove(id)?;
        self.arrived.remove(&seq)
    }

    fn take_oldest(&mut self) -> Option<PendingResult> {
        let (_, result) = self.arrived.pop_first()?;
        self.index.remove(&result.trans_id);
        Some(result)
    }

    fn get(&self, id: &TransId) -> Option<PendingResult> {
        self.index
            .get(id)
            .and_then(|seq| self.arrived.get(seq))
            .cloned()
    }
}

/// Outstanding-transaction tracker and arrival-ordered result store.
#[derive(Debug)]
pub struct Correlator {
    state: Mutex<State>,
    arrivals: Notify,
    /// Stored results older than this are swept.
    retention: Option<Duration>,
    stats: CorrelatorStats,
}

impl Correlator {
    /// Create a correlator. `retention` bounds how long unclaimed results
    /// survive [`Correlator::remove_expired`]; `None` keeps them forever.
    #[must_use]
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrivals: Notify::new(),
            retention,
            stats: CorrelatorStats::default(),
        }
    }

    /// Register `id` as outstanding until `deadline`.
    ///
    /// # Errors
    ///
    /// `BusError::IdCollision` if `id` is null, already outstanding or has a
    /// stored result.
    pub fn track(&self, id: TransId, deadline: Instant) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if id.is_null() || state.in_use(&id) {
            self.stats.collisions.fetch_add(1, Ordering::Relaxed);
            return Err(BusError::IdCollision { trans_id: id });
        }

        state.outstanding.insert(id, deadline);
        self.stats.tracked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Register an existing transaction as outstanding, extending its
    /// deadline if it is already tracked.
    ///
    /// Used when a request is forwarded out of band: the transaction keeps
    /// its id, and its result lands here when the last hop replies.
    pub fn adopt(&self, id: TransId, deadline: Instant) {
        let mut state = self.state.lock();
        let previous = state.outstanding.insert(id, deadline);
        if previous.is_none() {
            self.stats.tracked.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stop tracking `id` without storing a result.
    ///
    /// # Returns
    ///
    /// `true` if `id` was outstanding.
    pub fn release(&self, id: &TransId) -> bool {
        self.state.lock().outstanding.remove(id).is_some()
    }

    /// Store the result of `id` and wake every waiter.
    ///
    /// # Returns
    ///
    /// `false` when a result for `id` is already stored; the new one is
    /// dropped.
    pub fn complete(&self, id: TransId, reply: Result<Payload, BusError>) -> bool {
        {
            let mut state = self.state.lock();
            if state.index.contains_key(&id) {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                warn!(trans_id = %id, "Duplicate result dropped");
                return false;
            }
            if state.outstanding.remove(&id).is_none() {
                debug!(trans_id = %id, "Result for untracked transaction stored");
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.index.insert(id, seq);
            state.arrived.insert(
                seq,
                PendingResult {
                    trans_id: id,
                    reply,
                    arrived_at: Instant::now(),
                },
            );
        }

        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.arrivals.notify_waiters();
        true
    }

    /// Remove and return the result for `id`, waiting per `wait`.
    ///
    /// # Errors
    ///
    /// - `BusError::Timeout` - nothing arrived for `id` in time
    /// - the stored error, when the transaction failed
    pub async fn await_result(&self, id: TransId, wait: Wait) -> Result<Received, BusError> {
        let result = self.wait_for(Claim::Take(id), wait).await?;
        self.stats.consumed.fetch_add(1, Ordering::Relaxed);
        result.into_received()
    }

    /// Remove and return the earliest-arrived result, waiting per `wait`.
    ///
    /// # Errors
    ///
    /// - `BusError::Timeout` - the store stayed empty
    /// - the stored error, when the oldest transaction failed
    pub async fn await_oldest(&self, wait: Wait) -> Result<Received, BusError> {
        let result = self.wait_for(Claim::Oldest, wait).await?;
        self.stats.consumed.fetch_add(1, Ordering::Relaxed);
        result.into_received()
    }

    /// Like [`Correlator::await_result`] but leaves the result stored.
    ///
    /// # Errors
    ///
    /// Same as [`Correlator::await_result`].
    pub async fn peek(&self, id: TransId, wait: Wait) -> Result<Received, BusError> {
        self.wait_for(Claim::Peek(id), wait).await?.into_received()
    }

    fn try_claim(&self, claim: Claim) -> Option<PendingResult> {
        let mut state = self.state.lock();
        match claim {
            Claim::Take(id) => state.take(&id),
            Claim::Oldest => state.take_oldest(),
            Claim::Peek(id) => state.get(&id),
        }
    }

    async fn wait_for(&self, claim: Claim, wait: Wait) -> Result<PendingResult, BusError> {
        let deadline = wait.deadline(Instant::now());

        loop {
            // Register interest before checking so an arrival between the
            // check and the await is not missed.
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(found) = self.try_claim(claim) {
                return Ok(found);
            }

            match (wait, deadline) {
                (Wait::Indefinite, _) => notified.await,
                (Wait::Bounded(_), Some(deadline)) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.try_claim(claim).ok_or(BusError::Timeout);
                    }
                }
                _ => return Err(BusError::Timeout),
            }
        }
    }

    /// Sweep outstanding ids past their deadline and, when retention is
    /// configured, stored results older than it.
    ///
    /// # Returns
    ///
    /// Number of entries removed.
    pub fn remove_expired(&self, now: Instant) -> usize {
        let mut state = self.state.lock();

        let before = state.outstanding.len();
        state.outstanding.retain(|_, deadline| *deadline > now);
        let mut removed = before - state.outstanding.len();

        if let Some(retention) = self.retention {
            let stale: Vec<u64> = state
                .arrived
                .iter()
                .filter(|(_, result)| now.saturating_duration_since(result.arrived_at) > retention)
                .map(|(seq, _)| *seq)
                .collect();

            for seq in stale {
                if let Some(result) = state.arrived.remove(&seq) {
                    state.index.remove(&result.trans_id);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            self.stats
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// True while `id` has been sent and no result has arrived.
    #[must_use]
    pub fn is_outstanding(&self, id: &TransId) -> bool {
        self.state.lock().outstanding.contains_key(id)
    }

    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Number of results waiting to be claimed.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.state.lock().arrived.len()
    }

    #[must_use]
    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Periodically sweep expired entries from `correlator`.
///
/// Runs forever; spawn it and abort the handle to stop.
pub async fn cleanup_task(correlator: Arc<Correlator>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = correlator.remove_expired(Instant::now());
        if removed > 0 {
            debug!(removed, "Swept expired transactions");
        }
    }
}
