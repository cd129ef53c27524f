//! Optional response transform stage.
//!
//! Installing a transform makes the relay buffer the upstream body (up to
//! `forwarding.transform_max_body_bytes`) and hand it to the transform before
//! anything is sent to the client. Without one, bodies stream untouched.

use axum::http::response::Parts;
use bytes::Bytes;

/// Rewrites a fully buffered upstream response body.
pub trait ResponseTransform: Send + Sync + 'static {
    /// Produce the body sent to the client. `head` is the upstream response
    /// head after hop-by-hop headers were removed.
    fn transform(&self, head: &Parts, body: Bytes) -> Bytes;
}

impl<F> ResponseTransform for F
where
    F: Fn(&Parts, Bytes) -> Bytes + Send + Sync + 'static,
{
    fn transform(&self, head: &Parts, body: Bytes) -> Bytes {
        self(head, body)
    }
}
