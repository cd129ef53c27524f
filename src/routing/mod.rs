//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (prefix comparison)
//!     → Return: matched Route or None
//!     → rewrite.rs (outbound path for the matched route)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse upstream URLs
//!     → Sort by prefix length (stable)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Longest prefix wins, declaration order breaks ties

pub mod matcher;
pub mod rewrite;
pub mod router;

pub use rewrite::rewrite;
pub use router::{Route, RouteTable, Upstream};
