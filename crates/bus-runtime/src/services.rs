//! # Harness Services
//!
//! The leaf services the messaging sequences talk to. Every instance
//! registers the same set under the bus prefix:
//!
//! | Pattern(s) | Service | Behavior |
//! |------------|---------|----------|
//! | the eleven resolution patterns | [`PatternEcho`] | checks which pattern matched, echoes the body |
//! | `e` (eight times) | [`Digit`] | replies with its digit |
//! | `f1` | [`StepForward`] | replies `done` at 4, else forwards `n + 2` to `f2` in band |
//! | `f2` | [`StepBack`] | forwards `n - 1` to `f1` out of band |
//! | `g1` | [`AppendSuffix`] | replies with the body plus `suffix` |

use async_trait::async_trait;
use shared_bus::{Handler, HandlerError, MessageBus, MessageBusApi, Outcome, Payload, Request};

/// Patterns in registration order. Order matters for tie-breaks.
pub const RESOLUTION_PATTERNS: [&str; 11] = [
    "a/b/c/d", "a/b/c/*", "a/b/*/d", "a/*/c/d", "*/b/c/d", "a/b/*", "a/*/d", "*/c/d", "a/*", "*/d",
    "*",
];

/// Names sent by sequence 1 and the pattern each must resolve to. The
/// request body for entry `n` is `test{n + 1}`.
pub const RESOLUTION_TABLE: [(&str, &str); 15] = [
    ("a/b/c/d", "a/b/c/d"),
    ("a/b/c/z", "a/b/c/*"),
    ("a/b/c/dd", "a/b/c/*"),
    ("a/b/z/d", "a/b/*/d"),
    ("a/b/cc/d", "a/b/*/d"),
    ("a/z/c/d", "a/*/c/d"),
    ("a/bb/c/d", "a/*/c/d"),
    ("z/b/c/d", "*/b/c/d"),
    ("aa/b/c/d", "*/b/c/d"),
    ("a/b/czd", "a/b/*"),
    ("a/bzc/d", "a/*/d"),
    ("azb/c/d", "*/c/d"),
    ("a/bzczd", "a/*"),
    ("azbzc/d", "*/d"),
    ("azbzczd", "*"),
];

/// Multicast replies, one service per digit.
pub const DIGITS: [&str; 8] = ["1", "2", "3", "4", "5", "6", "7", "8"];

/// Request body sent by sequence 1 for table entry `index`.
#[must_use]
pub fn test_body(index: usize) -> String {
    format!("test{}", index + 1)
}

/// Parse a decimal request body.
pub fn parse_number<T: std::str::FromStr>(payload: &Payload) -> Result<T, HandlerError> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| {
            HandlerError::new(format!(
                "expected a number, got {:?}",
                String::from_utf8_lossy(payload)
            ))
        })
}

/// Fail the request with `message` unless `condition` holds.
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), HandlerError> {
    if condition {
        Ok(())
    } else {
        Err(HandlerError::new(message()))
    }
}

// =============================================================================
// SEQUENCE 1: PATTERN RESOLUTION
// =============================================================================

/// Echo service that verifies it was reached through its own pattern with
/// one of the bodies routed to it.
#[derive(Debug, Clone)]
pub struct PatternEcho {
    pattern: String,
    accepted: Vec<String>,
}

impl PatternEcho {
    /// Service for `pattern` (unprefixed), accepting the bodies of every
    /// table entry that resolves to it.
    #[must_use]
    pub fn new(prefix: &str, pattern: &str) -> Self {
        let accepted = RESOLUTION_TABLE
            .iter()
            .enumerate()
            .filter(|(_, (_, expected))| *expected == pattern)
            .map(|(index, _)| test_body(index))
            .collect();

        Self {
            pattern: format!("{prefix}{pattern}"),
            accepted,
        }
    }

    #[must_use]
    pub fn accepted(&self) -> &[String] {
        &self.accepted
    }
}

#[async_trait]
impl Handler for PatternEcho {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        ensure(request.pattern == self.pattern, || {
            format!("{} reached through {}", self.pattern, request.pattern)
        })?;

        let body = request.payload().clone();
        ensure(
            self.accepted.iter().any(|accepted| accepted.as_bytes() == body.as_ref()),
            || {
                format!(
                    "{} got unexpected body {:?}",
                    self.pattern,
                    String::from_utf8_lossy(&body)
                )
            },
        )?;

        Ok(Outcome::Reply(body))
    }
}

// =============================================================================
// SEQUENCE 2: MULTICAST
// =============================================================================

/// Replies with a fixed digit.
#[derive(Debug, Clone, Copy)]
pub struct Digit(pub &'static str);

#[async_trait]
impl Handler for Digit {
    async fn handle(&self, _request: Request) -> Result<Outcome, HandlerError> {
        Ok(Outcome::reply(self.0))
    }
}

// =============================================================================
// SEQUENCE 3: FORWARDING
// =============================================================================

/// `f1`: two steps forward, in band.
#[derive(Debug, Clone)]
pub struct StepForward {
    next: String,
}

impl StepForward {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            next: format!("{prefix}f2"),
        }
    }
}

#[async_trait]
impl Handler for StepForward {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        let n: i64 = parse_number(request.payload())?;
        if n == 4 {
            return Ok(Outcome::reply("done"));
        }
        Ok(Outcome::forward(self.next.clone(), (n + 2).to_string()))
    }
}

/// `f2`: one step back, handed to `f1` through [`MessageBusApi::forward`].
#[derive(Debug, Clone)]
pub struct StepBack {
    bus: MessageBus,
    next: String,
}

impl StepBack {
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        let next = bus.prefixed("f1");
        Self { bus, next }
    }
}

#[async_trait]
impl Handler for StepBack {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        let n: i64 = parse_number(request.payload())?;
        let context = request.context.with_payload((n - 1).to_string());
        self.bus.forward(context, &self.next)?;
        Ok(Outcome::NoReply)
    }
}

/// `g1`: appends `suffix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendSuffix;

#[async_trait]
impl Handler for AppendSuffix {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        let mut body = request.payload().to_vec();
        body.extend_from_slice(b"suffix");
        Ok(Outcome::reply(body))
    }
}
