//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding contexts, lifecycle, listener produce:
//!     → logging.rs (structured events, one access event per request)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (HTTP spans carrying the request id)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request id flows from the inbound layer to the upstream request and
//!   into every access event
//! - Metric updates go through the `metrics` facade and cost nothing when no
//!   exporter is installed

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::{init_logging, AccessEvent};
