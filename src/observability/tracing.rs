//! HTTP spans.
//!
//! Every inbound request gets a span carrying its request id, so the debug
//! events of the forwarding engine can be correlated with the access event.

use axum::http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnResponse, MakeSpan, TraceLayer};
use tracing::{Level, Span};

/// Header the request id travels in.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Span maker that records method, path and request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewaySpan;

impl<B> MakeSpan<B> for GatewaySpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::debug_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    }
}

pub type GatewayTraceLayer = TraceLayer<SharedClassifier<ServerErrorsAsFailures>, GatewaySpan>;

/// `TraceLayer` used by the gateway router.
pub fn trace_layer() -> GatewayTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(GatewaySpan)
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
}
