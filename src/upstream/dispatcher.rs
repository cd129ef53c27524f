//! Upstream dispatch.
//!
//! # Responsibilities
//! - Build the outbound request for a forwarding context
//! - Send it over the pool (plain) or a dedicated connection (upgrade)
//! - Translate transport failures into client responses
//! - Hand successful responses to the relay or the splicer

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::config::{ForwardingConfig, GatewayConfig, TimeoutConfig};
use crate::error::GatewayError;
use crate::http::context::ForwardingContext;
use crate::http::headers::strip_hop_by_hop;
use crate::http::request::build_outbound;
use crate::http::response::Relay;
use crate::http::transform::ResponseTransform;
use crate::http::upgrade::spawn_splice;
use crate::net::ConnectionLease;
use crate::upstream::connect;
use crate::upstream::pool::UpstreamPool;

/// Sends forwarding contexts to their upstreams.
#[derive(Clone)]
pub struct Dispatcher {
    pool: UpstreamPool,
    timeouts: TimeoutConfig,
    forwarding: ForwardingConfig,
    relay: Relay,
}

impl Dispatcher {
    pub fn new(config: &GatewayConfig, transform: Option<Arc<dyn ResponseTransform>>) -> Self {
        let mut relay = Relay::new(
            config.timeouts.idle(),
            config.forwarding.transform_max_body_bytes,
        );
        if let Some(transform) = transform {
            relay = relay.with_transform(transform);
        }

        Self {
            pool: UpstreamPool::new(&config.pool, &config.timeouts),
            timeouts: config.timeouts.clone(),
            forwarding: config.forwarding.clone(),
            relay,
        }
    }

    /// Forward `request` for `ctx`. Always produces the client response.
    pub async fn dispatch(&self, ctx: ForwardingContext, request: Request<Body>, peer: SocketAddr) -> Response {
        if ctx.is_upgrade {
            self.dispatch_upgrade(ctx, request, peer).await
        } else {
            self.dispatch_plain(ctx, request, peer).await
        }
    }

    async fn dispatch_plain(&self, ctx: ForwardingContext, request: Request<Body>, peer: SocketAddr) -> Response {
        let outbound = match build_outbound(&ctx, request, peer, self.forwarding.xfwd) {
            Ok(outbound) => outbound,
            Err(e) => return reject(ctx, e),
        };

        match self.pool.send(outbound).await {
            Ok(response) => self.relay.relay(ctx, response).await,
            Err(e) => reject(ctx, e),
        }
    }

    async fn dispatch_upgrade(
        &self,
        ctx: ForwardingContext,
        mut request: Request<Body>,
        peer: SocketAddr,
    ) -> Response {
        let client_upgrade = hyper::upgrade::on(&mut request);
        let lease = request.extensions_mut().remove::<Arc<ConnectionLease>>();

        let mut outbound = match build_outbound(&ctx, request, peer, self.forwarding.xfwd) {
            Ok(outbound) => outbound,
            Err(e) => return reject(ctx, e),
        };
        // Dedicated connections speak origin-form.
        if let Some(path_and_query) = outbound.uri().path_and_query().cloned() {
            *outbound.uri_mut() = Uri::from(path_and_query);
        }

        let mut sender = match connect::open(&ctx.route.upstream, self.timeouts.connect()).await {
            Ok(sender) => sender,
            Err(e) => return reject(ctx, e),
        };

        let first_byte = self.timeouts.first_byte();
        let mut response = match tokio::time::timeout(first_byte, sender.send_request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return reject(ctx, GatewayError::from_hyper(e)),
            Err(_) => return reject(ctx, GatewayError::FirstByteTimeout(first_byte)),
        };

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                status = response.status().as_u16(),
                "Upstream declined upgrade"
            );
            return self.relay.relay(ctx, response).await;
        }

        let upstream_upgrade = hyper::upgrade::on(&mut response);
        let (mut parts, _) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers, true);

        spawn_splice(
            ctx,
            lease,
            client_upgrade,
            upstream_upgrade,
            self.forwarding.splice_buffer_bytes,
            self.timeouts.upgrade_idle(),
        );

        Response::from_parts(parts, Body::empty())
    }
}

/// Answer the client for a failure that happened before any response head.
fn reject(ctx: ForwardingContext, err: GatewayError) -> Response {
    ctx.fail(&err, true);
    err.into_response()
}
