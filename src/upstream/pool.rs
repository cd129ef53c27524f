//! Pooled upstream client.
//!
//! Connections are pooled per upstream authority by hyper's legacy client.
//! A connection returns to the pool only after its response body was read to
//! the end; a dropped or failed body discards it.
//!
//! # Timeout phases
//! - connect: bounded by the connector itself
//! - upload: the request body streams for as long as the client sends it
//! - first byte: starts once the connection is established and the request
//!   body has been written in full, ends at the response head

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use hyper::body::Incoming;
use hyper::Response;
use hyper_util::client::legacy::connect::{capture_connection, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::sync::oneshot;

use crate::config::{PoolConfig, TimeoutConfig};
use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct UpstreamPool {
    client: Client<HttpConnector, UploadBody>,
    connect_timeout: Duration,
    first_byte_timeout: Duration,
}

impl UpstreamPool {
    pub fn new(pool: &PoolConfig, timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeouts.connect()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(pool.max_idle_per_upstream)
            .pool_idle_timeout(pool.idle_timeout())
            .pool_timer(TokioTimer::new())
            .build(connector);

        Self {
            client,
            connect_timeout: timeouts.connect(),
            first_byte_timeout: timeouts.first_byte(),
        }
    }

    /// Send `request` and wait for the response head.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Incoming>, GatewayError> {
        let (parts, body) = request.into_parts();
        let (body, written) = UploadBody::new(body);
        let mut request = Request::from_parts(parts, body);
        let mut connection = capture_connection(&mut request);

        let exchange = self.client.request(request);
        tokio::pin!(exchange);

        let sent = async {
            let _ = connection.wait_for_connection_metadata().await;
            let _ = written.await;
        };

        // Upstreams may answer before the upload is finished.
        tokio::select! {
            result = &mut exchange => return self.classify(result),
            _ = sent => {}
        }

        match tokio::time::timeout(self.first_byte_timeout, exchange).await {
            Ok(result) => self.classify(result),
            Err(_) => Err(GatewayError::FirstByteTimeout(self.first_byte_timeout)),
        }
    }

    fn classify(
        &self,
        result: Result<Response<Incoming>, hyper_util::client::legacy::Error>,
    ) -> Result<Response<Incoming>, GatewayError> {
        result.map_err(|e| GatewayError::from_client(e, self.connect_timeout))
    }
}

/// Outbound request body that reports when it has been written in full.
#[derive(Debug)]
pub struct UploadBody {
    inner: Body,
    written: Option<oneshot::Sender<()>>,
}

impl UploadBody {
    pub fn new(inner: Body) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let mut body = Self {
            inner,
            written: Some(tx),
        };
        // Empty bodies are never polled.
        if body.inner.is_end_stream() {
            body.finish();
        }
        (body, rx)
    }

    fn finish(&mut self) {
        if let Some(tx) = self.written.take() {
            let _ = tx.send(());
        }
    }
}

impl HttpBody for UploadBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => this.finish(),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.finish(),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
