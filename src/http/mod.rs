//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client connection (lifecycle::manager)
//!     → server.rs (Axum router: request id, health, route match)
//!     → context.rs (forwarding context, in-flight registration)
//!     → request.rs + headers.rs (outbound request)
//!     → [upstream dispatcher]
//!     → response.rs (relay, optional transform.rs)
//!       or upgrade.rs (splice)
//!     → Client
//! ```

pub mod context;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod transform;
pub mod upgrade;

pub use context::{ForwardingContext, Outcome};
pub use server::{AppState, HttpServer};
pub use transform::ResponseTransform;
