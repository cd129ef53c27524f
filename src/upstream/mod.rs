//! Upstream side of the gateway.
//!
//! # Data Flow
//! ```text
//! Forwarding context + inbound request
//!     → dispatcher.rs (plain or upgrade mode)
//!         plain:   pool.rs (pooled client keyed by authority)
//!         upgrade: connect.rs (dedicated HTTP/1.1 connection)
//!     → http::response (relay) or http::upgrade (splice)
//! ```
//!
//! # Design Decisions
//! - One upstream attempt per inbound request, no retries
//! - Upgraded connections never touch the pool

pub mod connect;
pub mod dispatcher;
pub mod pool;

pub use dispatcher::Dispatcher;
pub use pool::UpstreamPool;
