//! mini-gateway: a path-prefix reverse proxy for HTTP and upgraded
//! (WebSocket) connections.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;
pub mod upstream;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{FailureCategory, GatewayError};
pub use http::{HttpServer, ResponseTransform};
pub use lifecycle::{Lifecycle, LifecycleState, Shutdown};
