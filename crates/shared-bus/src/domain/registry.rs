//! # Subscription Registry
//!
//! Maps each registered pattern to the ordered list of handlers subscribed
//! under it.
//!
//! - Patterns keep the position of their first registration; that position
//!   is the specificity tie-break.
//! - Registering the same pattern again appends another handler slot, even
//!   when the handler is a duplicate (one slot per service instance).
//! - Entries are never removed.
//!
//! The registry is generic over the handler type so selection can be tested
//! without executing anything.

use super::pattern::Pattern;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// One pattern and every handler registered under it.
#[derive(Debug)]
pub struct Subscription<H> {
    pattern: Pattern,
    handlers: Vec<H>,
    /// Round-robin cursor for unicast selection.
    cursor: AtomicUsize,
}

impl<H> Subscription<H> {
    fn new(pattern: Pattern, handler: H) -> Self {
        Self {
            pattern,
            handlers: vec![handler],
            cursor: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Handlers in registration order.
    #[must_use]
    pub fn handlers(&self) -> &[H] {
        &self.handlers
    }

    /// Next handler in round-robin order.
    ///
    /// Successive calls cycle through the handlers in registration order,
    /// starting with the first one registered.
    pub fn next_handler(&self) -> Option<&H> {
        if self.handlers.is_empty() {
            return None;
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.handlers.len();
        self.handlers.get(slot)
    }
}

#[derive(Debug)]
struct RegistryInner<H> {
    /// Subscriptions in registration order.
    subscriptions: Vec<Subscription<H>>,
    /// Pattern string -> position in `subscriptions`.
    by_pattern: HashMap<String, usize>,
}

/// Append-only pattern -> handlers map.
///
/// Reads and registrations are serialized through a read/write lock.
/// Callers should clone handlers out of [`SubscriptionRegistry::visit`]
/// before running them.
#[derive(Debug)]
pub struct SubscriptionRegistry<H> {
    inner: RwLock<RegistryInner<H>>,
}

impl<H> SubscriptionRegistry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                subscriptions: Vec::new(),
                by_pattern: HashMap::new(),
            }),
        }
    }

    /// Append `handler` to the list for `pattern`.
    ///
    /// # Returns
    ///
    /// The number of handlers now registered under `pattern`.
    pub fn register(&self, pattern: Pattern, handler: H) -> usize {
        let mut inner = self.inner.write();

        if let Some(&position) = inner.by_pattern.get(pattern.as_str()) {
            let subscription = &mut inner.subscriptions[position];
            subscription.handlers.push(handler);
            let instances = subscription.handlers.len();
            debug!(pattern = %pattern, instances, "Handler added to existing subscription");
            return instances;
        }

        let position = inner.subscriptions.len();
        inner.by_pattern.insert(pattern.as_str().to_string(), position);
        debug!(pattern = %pattern, position, "New subscription registered");
        inner.subscriptions.push(Subscription::new(pattern, handler));
        1
    }

    /// Run `f` over all subscriptions, in registration order, under the
    /// read lock.
    pub fn visit<T>(&self, f: impl FnOnce(&[Subscription<H>]) -> T) -> T {
        let inner = self.inner.read();
        f(&inner.subscriptions)
    }

    /// Number of distinct patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of handler slots across all patterns.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner
            .read()
            .subscriptions
            .iter()
            .map(|s| s.handlers.len())
            .sum()
    }

    /// Registered patterns, in registration order.
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        self.inner
            .read()
            .subscriptions
            .iter()
            .map(|s| s.pattern.as_str().to_string())
            .collect()
    }
}

impl<H: Clone> SubscriptionRegistry<H> {
    /// Handlers registered under exactly `pattern`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, pattern: &str) -> Vec<H> {
        let inner = self.inner.read();
        inner
            .by_pattern
            .get(pattern)
            .map(|&position| inner.subscriptions[position].handlers.clone())
            .unwrap_or_default()
    }
}

impl<H> Default for SubscriptionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
