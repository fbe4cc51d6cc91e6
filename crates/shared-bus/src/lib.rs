//! # Shared Bus - Request/Response Message Bus Core
//!
//! Routing and correlation for services that talk through named
//! destinations instead of direct calls.
//!
//! ## Request Flow
//!
//! ```text
//! ┌──────────┐  send_sync / send_async   ┌──────────┐  best match   ┌───────────┐
//! │  Caller  │ ────────────────────────→ │  Router  │ ────────────→ │  Handler  │
//! │          │                           │          │               │           │
//! │          │ ←── reply (sync) ──────── │          │ ←── Reply ─── │           │
//! └──────────┘                           └──────────┘               └───────────┘
//!      │                                      │   ↑                       │
//!      │ recv(id) / recv_oldest               │   └──── Forward ──────────┘
//!      ▼                                      ▼        (same trans_id)
//! ┌──────────────┐     complete(id, reply)
//! │  Correlator  │ ←──────────────────────────┘
//! └──────────────┘
//! ```
//!
//! ## Resolution Rules
//!
//! | Rule | Effect |
//! |------|--------|
//! | Exact beats wildcard | `a/b/c/d` wins over `a/b/c/*` for `a/b/c/d` |
//! | Longer literal wins | `a/b/c/*` wins over `a/*` for `a/b/c/z` |
//! | Earlier registration wins | ties between equal-length wildcards |
//! | Round-robin | unicast rotates among handlers sharing a pattern |
//! | Multicast | every handler of every matching pattern, most specific first |
//!
//! ## Correlation
//!
//! - Asynchronous sends return a transaction id; the reply is stored until
//!   claimed by id or by oldest-pull.
//! - Oldest-pull on an empty store returns the all-zero transaction id.
//! - Forwarding keeps the transaction id, requester and priority.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod domain;
pub mod forwarder;
pub mod ports;
pub mod router;
pub mod service;

// Re-export main types
pub use config::{BusConfig, ConfigError};
pub use domain::{
    cleanup_task, BusError, Correlator, CorrelatorStats, Match, MatchMode, Pattern, PatternError,
    PatternMatcher, Received, Subscription, SubscriptionRegistry, Wait,
};
pub use forwarder::{ForwardTimeoutPolicy, Forwarder};
pub use ports::{
    handler_fn, FnHandler, Handler, HandlerError, IdGenerator, MessageBusApi, Outcome, Request,
    SendOptions, UuidV7Generator,
};
pub use router::{DispatchStats, Outgoing, Router, Target};
pub use service::MessageBus;
pub use shared_types::{Payload, Priority, RequestContext, Source, TransId};

/// Wildcard marker accepted in patterns.
pub const WILDCARD: char = domain::WILDCARD;

/// Default interval for [`MessageBus::start_cleanup`].
pub const DEFAULT_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);
