//! Upgraded connection splicing.
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Gateway ←──── raw bytes ────→ Upstream
//! ```
//!
//! After both sides switched protocols the gateway stops parsing and copies
//! bytes in both directions, each through its own fixed-size window. A slow
//! reader on one side stalls the copy feeding it.
//!
//! # Design Decisions
//! - Byte-level forwarding, no frame awareness
//! - The first direction to end (EOF or error) ends the splice; both write
//!   halves are then shut down
//! - Optional idle watchdog across both directions

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::{FailureCategory, GatewayError};
use crate::http::context::{ForwardingContext, Outcome};
use crate::net::ConnectionLease;

/// Time allowed for shutting down both write halves once a splice ends.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Why a splice ended.
#[derive(Debug)]
pub enum SpliceEnd {
    /// Client side reached EOF.
    ClientClosed,
    /// Upstream side reached EOF.
    UpstreamClosed,
    /// No bytes moved in either direction for the idle window.
    Idle(Duration),
    /// The gateway is force-closing in-flight work.
    ForceClosed,
    /// A read or write failed.
    Failed(io::Error),
}

impl SpliceEnd {
    /// Category and detail for non-clean endings.
    pub fn failure(&self) -> Option<(FailureCategory, String)> {
        match self {
            SpliceEnd::ClientClosed | SpliceEnd::UpstreamClosed => None,
            SpliceEnd::Idle(idle) => Some((
                FailureCategory::PartialFailure,
                format!("no traffic for {idle:?}"),
            )),
            SpliceEnd::ForceClosed => Some((
                FailureCategory::PartialFailure,
                "closed at drain deadline".to_string(),
            )),
            SpliceEnd::Failed(e) if is_disconnect(e) => None,
            SpliceEnd::Failed(e) => Some((FailureCategory::PartialFailure, e.to_string())),
        }
    }
}

/// Result of a finished splice.
#[derive(Debug)]
pub struct SpliceReport {
    /// Bytes copied client → upstream.
    pub bytes_up: u64,
    /// Bytes copied upstream → client.
    pub bytes_down: u64,
    pub end: SpliceEnd,
}

/// Peer resets are how many clients close sockets, not failures.
fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

/// Copy bytes between `client` and `upstream` until one side ends.
pub async fn splice<C, U, F>(
    client: C,
    upstream: U,
    window: usize,
    idle: Option<Duration>,
    force_close: F,
) -> SpliceReport
where
    C: AsyncRead + AsyncWrite,
    U: AsyncRead + AsyncWrite,
    F: Future<Output = ()>,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let start = Instant::now();
    let last_activity = AtomicU64::new(0);
    let bytes_up = AtomicU64::new(0);
    let bytes_down = AtomicU64::new(0);

    let end = tokio::select! {
        result = copy_half(&mut client_read, &mut upstream_write, window, &bytes_up, &last_activity, start) => {
            match result {
                Ok(()) => SpliceEnd::ClientClosed,
                Err(e) => SpliceEnd::Failed(e),
            }
        }
        result = copy_half(&mut upstream_read, &mut client_write, window, &bytes_down, &last_activity, start) => {
            match result {
                Ok(()) => SpliceEnd::UpstreamClosed,
                Err(e) => SpliceEnd::Failed(e),
            }
        }
        idle = idle_watchdog(idle, &last_activity, start) => SpliceEnd::Idle(idle),
        _ = force_close => SpliceEnd::ForceClosed,
    };

    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = client_write.shutdown().await;
        let _ = upstream_write.shutdown().await;
    })
    .await;

    SpliceReport {
        bytes_up: bytes_up.load(Ordering::Relaxed),
        bytes_down: bytes_down.load(Ordering::Relaxed),
        end,
    }
}

async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    window: usize,
    copied: &AtomicU64,
    last_activity: &AtomicU64,
    start: Instant,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; window];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        copied.fetch_add(n as u64, Ordering::Relaxed);
        last_activity.store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}

/// Resolve once `idle` passes without activity. `None` never resolves.
async fn idle_watchdog(idle: Option<Duration>, last_activity: &AtomicU64, start: Instant) -> Duration {
    let Some(idle) = idle else {
        return std::future::pending().await;
    };
    loop {
        let last = Duration::from_millis(last_activity.load(Ordering::Relaxed));
        let deadline = start + last + idle;
        if Instant::now() >= deadline {
            return idle;
        }
        tokio::time::sleep_until(deadline).await;
    }
}

/// Wait for both sides to finish switching protocols, then splice them on a
/// task of their own. The context completes when the splice ends; `lease`
/// keeps the client connection counted until then.
pub fn spawn_splice(
    ctx: ForwardingContext,
    lease: Option<Arc<ConnectionLease>>,
    client: OnUpgrade,
    upstream: OnUpgrade,
    window: usize,
    idle: Option<Duration>,
) {
    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(pair) => pair,
            Err(e) => {
                ctx.fail(&GatewayError::UpgradeFailed(Box::new(e)), false);
                return;
            }
        };

        tracing::debug!(correlation_id = %ctx.correlation_id, "Splicing upgraded connection");

        let in_flight = ctx.in_flight().cloned();
        let force_close = async move {
            match in_flight {
                Some(set) => set.force_closed().await,
                None => std::future::pending().await,
            }
        };

        let report = splice(TokioIo::new(client), TokioIo::new(upstream), window, idle, force_close).await;
        ctx.complete(Outcome::Spliced {
            bytes_up: report.bytes_up,
            bytes_down: report.bytes_down,
            failure: report.end.failure(),
        });
        drop(lease);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn bytes_flow_both_ways_until_client_closes() {
        let (mut client, client_gw) = duplex(64);
        let (upstream_gw, mut upstream) = duplex(64);
        let task = tokio::spawn(splice(client_gw, upstream_gw, 16, None, std::future::pending()));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        upstream.write_all(b"world!").await.unwrap();
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world!");

        drop(client);
        let report = task.await.unwrap();
        assert!(matches!(report.end, SpliceEnd::ClientClosed));
        assert_eq!(report.bytes_up, 5);
        assert_eq!(report.bytes_down, 6);
        assert!(report.end.failure().is_none());

        let mut rest = Vec::new();
        upstream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn large_transfer_through_small_window_keeps_order() {
        let (mut client, client_gw) = duplex(1024);
        let (upstream_gw, mut upstream) = duplex(1024);
        let task = tokio::spawn(splice(client_gw, upstream_gw, 256, None, std::future::pending()));

        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client.shutdown().await.unwrap();
            client
        });

        let mut received = Vec::new();
        upstream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);

        let _client = writer.await.unwrap();
        let report = task.await.unwrap();
        assert_eq!(report.bytes_up, expected.len() as u64);
    }

    #[tokio::test]
    async fn idle_splice_is_closed() {
        let (_client, client_gw) = duplex(64);
        let (upstream_gw, _upstream) = duplex(64);
        let report = splice(
            client_gw,
            upstream_gw,
            16,
            Some(Duration::from_millis(30)),
            std::future::pending(),
        )
        .await;
        assert!(matches!(report.end, SpliceEnd::Idle(_)));
        assert_eq!(
            report.end.failure().map(|(c, _)| c),
            Some(FailureCategory::PartialFailure)
        );
    }

    #[tokio::test]
    async fn force_close_ends_splice() {
        let (_client, client_gw) = duplex(64);
        let (upstream_gw, _upstream) = duplex(64);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(splice(client_gw, upstream_gw, 16, None, async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let report = task.await.unwrap();
        assert!(matches!(report.end, SpliceEnd::ForceClosed));
    }
}
