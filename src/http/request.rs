//! Outbound request construction.
//!
//! # Responsibilities
//! - Point the request at the route's upstream and rewritten path
//! - Rewrite `Host` to the upstream authority
//! - Drop hop-by-hop headers (kept for upgrade handshakes)
//! - Propagate the correlation id as `x-request-id`
//!
//! # Design Decisions
//! - The body is moved, never buffered
//! - Inbound extensions are not carried to the upstream request

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::{HeaderValue, HOST};
use axum::http::{Request, Version};

use crate::error::GatewayError;
use crate::http::context::ForwardingContext;
use crate::http::headers::{append_forwarded, strip_hop_by_hop};
use crate::observability::tracing::REQUEST_ID_HEADER;

/// Build the request sent upstream for `ctx`.
pub fn build_outbound(
    ctx: &ForwardingContext,
    request: Request<Body>,
    peer: SocketAddr,
    xfwd: bool,
) -> Result<Request<Body>, GatewayError> {
    let (parts, body) = request.into_parts();
    let upstream = &ctx.route.upstream;
    let uri = upstream.uri_for(&ctx.rewritten_path, parts.uri.query())?;

    let mut headers = parts.headers;
    let original_host = headers
        .get(HOST)
        .cloned()
        .or_else(|| parts.uri.authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()));

    strip_hop_by_hop(&mut headers, ctx.is_upgrade);
    if xfwd {
        append_forwarded(&mut headers, peer, original_host.as_ref());
    }

    let host = HeaderValue::from_str(upstream.authority().as_str()).map_err(axum::http::Error::from)?;
    headers.insert(HOST, host);
    let request_id = HeaderValue::from_str(&ctx.correlation_id).map_err(axum::http::Error::from)?;
    headers.insert(REQUEST_ID_HEADER, request_id);

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(Version::HTTP_11)
        .body(body)?;
    *outbound.headers_mut() = headers;
    Ok(outbound)
}
