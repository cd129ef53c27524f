//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit)
//!     → connection.rs (id + live count for logs and metrics)
//!     → Hand off to the lifecycle manager's per-connection task
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection holds a permit and a guard until its task ends, or
//!   until the splice it was upgraded into ends

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionLease, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
