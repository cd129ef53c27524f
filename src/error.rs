//! Failure classification.
//!
//! Transport errors from the upstream leg are translated into
//! [`GatewayError`] at the dispatcher/relay boundary. Every error maps onto a
//! small [`FailureCategory`] taxonomy, which decides what (if anything) the
//! client is told.
//!
//! | Category            | Client response          |
//! |---------------------|--------------------------|
//! | NotFound            | 404 `route not found`    |
//! | UpstreamUnavailable | 502 `Bad gateway`        |
//! | UpstreamTimeout     | 504 `Gateway timeout`    |
//! | PartialFailure      | connection terminated    |
//! | ClientAborted       | nothing                  |

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Gateway-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    NotFound,
    UpstreamUnavailable,
    UpstreamTimeout,
    PartialFailure,
    ClientAborted,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::NotFound => "not_found",
            FailureCategory::UpstreamUnavailable => "upstream_unavailable",
            FailureCategory::UpstreamTimeout => "upstream_timeout",
            FailureCategory::PartialFailure => "partial_failure",
            FailureCategory::ClientAborted => "client_aborted",
        }
    }

    /// Status the client sees, or `None` when no response can or should be sent.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FailureCategory::NotFound => Some(StatusCode::NOT_FOUND),
            FailureCategory::UpstreamUnavailable => Some(StatusCode::BAD_GATEWAY),
            FailureCategory::UpstreamTimeout => Some(StatusCode::GATEWAY_TIMEOUT),
            FailureCategory::PartialFailure | FailureCategory::ClientAborted => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            FailureCategory::NotFound => "route not found",
            FailureCategory::UpstreamTimeout => "Gateway timeout",
            _ => "Bad gateway",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while forwarding a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("route not found")]
    RouteNotFound,

    #[error("upstream connect failed: {0}")]
    Connect(#[source] BoxError),

    #[error("upstream connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("upstream sent no response head within {0:?}")]
    FirstByteTimeout(Duration),

    #[error("upstream closed the connection before responding: {0}")]
    UpstreamClosed(#[source] BoxError),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] BoxError),

    #[error("client request body failed: {0}")]
    ClientBody(#[source] BoxError),

    #[error("upstream body failed after the response head was sent: {0}")]
    BodyInterrupted(#[source] BoxError),

    #[error("upstream body idle for {0:?}")]
    BodyIdle(Duration),

    #[error("upgrade failed after switching protocols: {0}")]
    UpgradeFailed(#[source] BoxError),

    #[error("upstream body exceeds the {0} byte transform limit")]
    TransformLimit(usize),

    #[error("could not build upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
}

impl GatewayError {
    pub fn category(&self) -> FailureCategory {
        match self {
            GatewayError::RouteNotFound => FailureCategory::NotFound,
            GatewayError::ConnectTimeout(_) | GatewayError::FirstByteTimeout(_) => {
                FailureCategory::UpstreamTimeout
            }
            GatewayError::Connect(_)
            | GatewayError::UpstreamClosed(_)
            | GatewayError::Upstream(_)
            | GatewayError::TransformLimit(_)
            | GatewayError::InvalidRequest(_) => FailureCategory::UpstreamUnavailable,
            GatewayError::ClientBody(_) => FailureCategory::ClientAborted,
            GatewayError::BodyInterrupted(_)
            | GatewayError::BodyIdle(_)
            | GatewayError::UpgradeFailed(_) => FailureCategory::PartialFailure,
        }
    }

    /// Classify an error from the pooled client.
    pub fn from_client(err: hyper_util::client::legacy::Error, connect_timeout: Duration) -> Self {
        if err.is_connect() {
            if io_kind(&err) == Some(io::ErrorKind::TimedOut) {
                return GatewayError::ConnectTimeout(connect_timeout);
            }
            return GatewayError::Connect(Box::new(err));
        }
        Self::from_exchange(Box::new(err))
    }

    /// Classify an error from a dedicated (upgrade) connection.
    pub fn from_hyper(err: hyper::Error) -> Self {
        Self::from_exchange(Box::new(err))
    }

    /// Classify a failure after the connection was established.
    fn from_exchange(err: BoxError) -> Self {
        if find_source::<axum::Error>(err.as_ref()).is_some() {
            return GatewayError::ClientBody(err);
        }
        match find_source::<hyper::Error>(err.as_ref()) {
            Some(h) if h.is_incomplete_message() || h.is_closed() || h.is_canceled() => {
                GatewayError::UpstreamClosed(err)
            }
            _ => GatewayError::Upstream(err),
        }
    }
}

/// Classify a failed connect on a dedicated connection.
pub fn connect_error(err: io::Error, timeout: Duration) -> GatewayError {
    if err.kind() == io::ErrorKind::TimedOut {
        return GatewayError::ConnectTimeout(timeout);
    }
    GatewayError::Connect(Box::new(err))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let category = self.category();
        // Categories without a client status only reach here when a response
        // must still be produced for a request that is already lost.
        let status = category.status().unwrap_or(StatusCode::BAD_GATEWAY);
        (
            status,
            Json(serde_json::json!({ "message": category.message() })),
        )
            .into_response()
    }
}

/// Walk the `source()` chain looking for an error of type `T`.
fn find_source<'a, T: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<T>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn io_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    find_source::<io::Error>(err).map(io::Error::kind)
}
