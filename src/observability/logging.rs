//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Emit the per-request access event
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON format for production, pretty format for development

use std::time::Duration;

use axum::http::{Method, StatusCode};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::error::FailureCategory;
use crate::observability::metrics;

/// Target of access events, so they can be filtered or routed separately.
pub const ACCESS_TARGET: &str = "mini_gateway::access";

/// Build the filter directives used when `RUST_LOG` is not set.
fn default_directives(config: &ObservabilityConfig) -> String {
    let mut directives = format!("{},tower_http=info", config.log_level);
    if config.proxy_debug {
        directives.push_str(",mini_gateway=debug,tower_http=debug");
    }
    directives
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    }
}

/// One completed request or spliced connection.
#[derive(Debug)]
pub struct AccessEvent<'a> {
    pub correlation_id: &'a str,
    pub method: &'a Method,
    pub route: Option<&'a str>,
    pub path: &'a str,
    pub status: Option<StatusCode>,
    pub category: Option<FailureCategory>,
    pub duration: Duration,
    pub bytes_up: Option<u64>,
    pub bytes_down: Option<u64>,
    pub detail: Option<&'a str>,
}

impl<'a> AccessEvent<'a> {
    pub fn new(correlation_id: &'a str, method: &'a Method, path: &'a str) -> Self {
        Self {
            correlation_id,
            method,
            route: None,
            path,
            status: None,
            category: None,
            duration: Duration::ZERO,
            bytes_up: None,
            bytes_down: None,
            detail: None,
        }
    }

    /// Log the event and record its metrics.
    pub fn emit(&self) {
        let route = self.route.unwrap_or("none");
        let status = self.status.map(|s| s.as_u16());
        let category = self.category.map(|c| c.as_str());
        let duration_ms = self.duration.as_millis() as u64;

        match self.category {
            None => tracing::info!(
                target: ACCESS_TARGET,
                correlation_id = %self.correlation_id,
                method = %self.method,
                route,
                path = %self.path,
                status,
                duration_ms,
                bytes_up = self.bytes_up,
                bytes_down = self.bytes_down,
                "Request completed"
            ),
            Some(_) => tracing::warn!(
                target: ACCESS_TARGET,
                correlation_id = %self.correlation_id,
                method = %self.method,
                route,
                path = %self.path,
                status,
                category,
                duration_ms,
                bytes_up = self.bytes_up,
                bytes_down = self.bytes_down,
                detail = self.detail,
                "Request failed"
            ),
        }

        if let Some(status) = status {
            metrics::record_request(route, status, self.duration);
        }
        if let Some(category) = self.category {
            metrics::record_failure(route, category);
        }
    }
}
