//! Dedicated upstream connections for upgrade handshakes.

use std::time::Duration;

use axum::body::Body;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::error::{connect_error, GatewayError};
use crate::routing::Upstream;

/// Open a fresh HTTP/1.1 connection to `upstream`.
///
/// The connection task runs with upgrades enabled, so a `101` response can
/// hand the socket over through `hyper::upgrade::on`.
pub async fn open(upstream: &Upstream, connect_timeout: Duration) -> Result<SendRequest<Body>, GatewayError> {
    let connecting = TcpStream::connect((upstream.host(), upstream.port()));
    let stream = match tokio::time::timeout(connect_timeout, connecting).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(connect_error(e, connect_timeout)),
        Err(_) => return Err(GatewayError::ConnectTimeout(connect_timeout)),
    };
    let _ = stream.set_nodelay(true);

    let (sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream))
        .await
        .map_err(GatewayError::from_hyper)?;

    let authority = upstream.authority().clone();
    tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            tracing::debug!(upstream = %authority, error = %e, "Dedicated upstream connection ended");
        }
    });

    Ok(sender)
}
