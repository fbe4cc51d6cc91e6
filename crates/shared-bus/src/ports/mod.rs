//! Ports layer for the relay bus.
//!
//! - Inbound (Driving) ports: the API the hosting layer calls
//! - Outbound (Driven) ports: what the bus needs from the host (handlers,
//!   transaction id generation)

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
