//! Response relay.
//!
//! # Responsibilities
//! - Copy upstream status and end-to-end headers to the client
//! - Stream the upstream body, enforcing the between-chunk idle timeout
//! - Report the context's outcome once the body ends, fails, or is abandoned
//! - Optionally buffer the body through a [`ResponseTransform`]
//!
//! # Design Decisions
//! - The streaming body owns the forwarding context, so completion is tied
//!   to the body's lifetime rather than the handler's
//! - Dropping the body before its end drops the upstream stream, which
//!   keeps the connection out of the pool

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_LENGTH};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tokio::time::{Instant, Sleep};

use crate::error::GatewayError;
use crate::http::context::{ForwardingContext, Outcome};
use crate::http::headers::strip_hop_by_hop;
use crate::http::transform::ResponseTransform;

/// Turns upstream responses into client responses.
#[derive(Clone)]
pub struct Relay {
    idle: Duration,
    transform: Option<Arc<dyn ResponseTransform>>,
    transform_limit: usize,
}

impl Relay {
    pub fn new(idle: Duration, transform_limit: usize) -> Self {
        Self {
            idle,
            transform: None,
            transform_limit,
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn ResponseTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Relay `response` for `ctx`.
    pub async fn relay(&self, ctx: ForwardingContext, response: Response<Incoming>) -> Response {
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers, false);

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            status = parts.status.as_u16(),
            "Upstream response head received"
        );

        let Some(transform) = &self.transform else {
            let status = parts.status;
            return Response::from_parts(parts, Body::new(RelayBody::new(body, ctx, status, self.idle)));
        };

        let buffered = match collect_bounded(body, self.transform_limit, self.idle).await {
            Ok(bytes) => bytes,
            Err(e) => {
                ctx.fail(&e, true);
                return e.into_response();
            }
        };
        let body = transform.transform(&parts, buffered);
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        ctx.complete(Outcome::Relayed(parts.status));
        Response::from_parts(parts, Body::from(body))
    }
}

/// Read the whole body, failing past `limit` bytes or after `idle` without data.
async fn collect_bounded(mut body: Incoming, limit: usize, idle: Duration) -> Result<Bytes, GatewayError> {
    let mut buf = BytesMut::new();
    loop {
        let frame = match tokio::time::timeout(idle, body.frame()).await {
            Ok(Some(frame)) => frame.map_err(|e| GatewayError::Upstream(Box::new(e)))?,
            Ok(None) => return Ok(buf.freeze()),
            Err(_) => return Err(GatewayError::BodyIdle(idle)),
        };
        if let Ok(data) = frame.into_data() {
            if buf.len() + data.len() > limit {
                return Err(GatewayError::TransformLimit(limit));
            }
            buf.extend_from_slice(&data);
        }
    }
}

/// Streaming body that owns the forwarding context until the stream ends.
pub struct RelayBody<B: HttpBody = Incoming> {
    inner: B,
    ctx: Option<ForwardingContext>,
    status: StatusCode,
    idle: Duration,
    timer: Pin<Box<Sleep>>,
    /// Set while a poll returned `Pending`; the idle timer only restarts
    /// when a new wait begins.
    waiting: bool,
}

impl<B> RelayBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    pub fn new(inner: B, ctx: ForwardingContext, status: StatusCode, idle: Duration) -> Self {
        Self {
            inner,
            ctx: Some(ctx),
            status,
            idle,
            timer: Box::pin(tokio::time::sleep(idle)),
            waiting: false,
        }
    }

    fn fail(&mut self, err: &GatewayError) {
        if let Some(ctx) = self.ctx.take() {
            ctx.fail(err, false);
        }
    }

    fn finish(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.complete(Outcome::Relayed(self.status));
        }
    }
}

impl<B> HttpBody for RelayBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Data = Bytes;
    type Error = GatewayError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                this.waiting = false;
                if this.inner.is_end_stream() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.waiting = false;
                let err = GatewayError::BodyInterrupted(Box::new(e));
                this.fail(&err);
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.waiting = false;
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => {
                if !this.waiting {
                    this.waiting = true;
                    this.timer.as_mut().reset(Instant::now() + this.idle);
                }
                match this.timer.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        let err = GatewayError::BodyIdle(this.idle);
                        this.fail(&err);
                        Poll::Ready(Some(Err(err)))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: HttpBody> Drop for RelayBody<B> {
    fn drop(&mut self) {
        // Bodies the server never polled to the end (HEAD, 204, 304) still
        // count as relayed when the upstream stream is known to be empty.
        // Anything else still holding its context was abandoned.
        let Some(ctx) = self.ctx.take() else {
            return;
        };
        if self.inner.is_end_stream() {
            ctx.complete(Outcome::Relayed(self.status));
        }
    }
}
