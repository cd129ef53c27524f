//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env + config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (APP_PORT, PROXY_LOG, *_UPSTREAM overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → moved into the subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_startup_config, ConfigError};
pub use schema::{
    ForwardingConfig, GatewayConfig, LifecycleConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, PoolConfig, RouteConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
