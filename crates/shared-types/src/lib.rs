//! # Shared Types Crate
//!
//! Identities and the request envelope used across the relay bus.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: transaction ids, requester identity and
//!   priority are defined once here and reused by the core and its hosts.
//! - **Immutable Correlation**: a [`RequestContext`] exposes no way to change
//!   its transaction id, so forwarding can only carry the original identity.
//! - **Null Transaction**: [`TransId::NULL`] (sixteen zero bytes) is the
//!   sentinel for "nothing arrived" and never names a real transaction.

pub mod entities;
pub mod envelope;

pub use entities::*;
pub use envelope::RequestContext;

/// Request and response bodies are opaque byte strings.
pub type Payload = bytes::Bytes;
