//! # Relay Bus Test Suite
//!
//! Cross-crate tests that drive the bus through its public API.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── routing.rs       # Specificity, multicast order, registration
//!     ├── correlation.rs   # recv / peek / oldest-pull, stored failures
//!     ├── forwarding.rs    # In-band and out-of-band forwarding, budgets
//!     └── harness.rs       # The messaging runtime end to end
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bus-tests
//!
//! # By area
//! cargo test -p bus-tests integration::routing::
//!
//! # Benchmarks
//! cargo bench -p bus-tests
//! ```
