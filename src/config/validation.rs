//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect duplicate route prefixes and unusable upstream URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// Smallest and largest accepted splice window.
const SPLICE_BUFFER_RANGE: std::ops::RangeInclusive<usize> = 1024..=1024 * 1024;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no routes configured")]
    NoRoutes,

    #[error("route prefix {0:?} must start with '/'")]
    PrefixNotAbsolute(String),

    #[error("route prefix {0:?} is declared more than once")]
    DuplicatePrefix(String),

    #[error("route {prefix:?}: invalid upstream {upstream:?}: {reason}")]
    InvalidUpstream {
        prefix: String,
        upstream: String,
        reason: String,
    },

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("forwarding.splice_buffer_bytes must be between 1024 and 1048576, got {0}")]
    SpliceBufferOutOfRange(usize),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroValue("listener.max_connections"));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        if !route.prefix.starts_with('/') {
            errors.push(ValidationError::PrefixNotAbsolute(route.prefix.clone()));
        }
        if !seen.insert(route.prefix.as_str()) {
            errors.push(ValidationError::DuplicatePrefix(route.prefix.clone()));
        }
        if let Err(reason) = check_upstream(&route.upstream) {
            errors.push(ValidationError::InvalidUpstream {
                prefix: route.prefix.clone(),
                upstream: route.upstream.clone(),
                reason,
            });
        }
    }

    let timeouts = &config.timeouts;
    for (value, name) in [
        (timeouts.connect_ms, "timeouts.connect_ms"),
        (timeouts.first_byte_ms, "timeouts.first_byte_ms"),
        (timeouts.idle_ms, "timeouts.idle_ms"),
        (config.lifecycle.drain_deadline_ms, "lifecycle.drain_deadline_ms"),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(name));
        }
    }

    if !SPLICE_BUFFER_RANGE.contains(&config.forwarding.splice_buffer_bytes) {
        errors.push(ValidationError::SpliceBufferOutOfRange(
            config.forwarding.splice_buffer_bytes,
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Upstreams are plain-text HTTP (or `ws`, which is HTTP before the upgrade).
fn check_upstream(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "ws" => {}
        other => return Err(format!("unsupported scheme {other:?}")),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
