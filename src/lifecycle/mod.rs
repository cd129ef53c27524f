//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Route table + pools → Bind listener → Accepting
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown trigger
//!
//! Drain (manager.rs):
//!     Stop accept → wait for in-flight set (inflight.rs) → Stopped
//!     deadline or second signal → force close → Stopped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listener
//! - State lives in a watch channel (state.rs) so health checks and
//!   connection tasks observe it without locking

pub mod inflight;
pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use inflight::{ContextId, InFlightEntry, InFlightGuard, InFlightSet};
pub use manager::LifecycleManager;
pub use shutdown::Shutdown;
pub use startup::StartupError;
pub use state::{Lifecycle, LifecycleState};
