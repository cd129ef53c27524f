//! Accept loop and drain sequence.
//!
//! # Responsibilities
//! - Move the gateway `Starting → Accepting` once the listener is live
//! - Serve each client connection on its own task
//! - On shutdown: close the listener, let in-flight work finish, and force
//!   whatever is left closed at the drain deadline
//!
//! # Design Decisions
//! - Connection tasks live in a `JoinSet` so they can be awaited and aborted
//!   as a group
//! - Idle keep-alive connections are closed through hyper's graceful
//!   shutdown as soon as `Draining` is entered
//! - Spliced (upgraded) connections run outside the `JoinSet` and are only
//!   visible through the in-flight set

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tower::ServiceExt;

use crate::lifecycle::{InFlightSet, Lifecycle, LifecycleState};
use crate::net::{ConnectionLease, ConnectionTracker, Listener, ListenerError};

/// Extra time given to tasks to unwind after a forced close.
const FORCE_CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Delay before retrying after a failed `accept` (e.g. fd exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Owns the accept loop and the drain sequence.
pub struct LifecycleManager {
    lifecycle: Lifecycle,
    in_flight: Arc<InFlightSet>,
    connections: ConnectionTracker,
    drain_deadline: Duration,
}

impl LifecycleManager {
    pub fn new(lifecycle: Lifecycle, in_flight: Arc<InFlightSet>, drain_deadline: Duration) -> Self {
        Self {
            lifecycle,
            in_flight,
            connections: ConnectionTracker::new(),
            drain_deadline,
        }
    }

    /// Accept connections until the first shutdown message, then drain.
    ///
    /// Returns once the lifecycle is `Stopped`.
    pub async fn serve(
        self,
        listener: Listener,
        app: Router,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let mut tasks = JoinSet::new();
        self.lifecycle.advance(LifecycleState::Accepting);

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => break Ok(()),

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let lease = ConnectionLease::new(self.connections.track(peer), permit);
                        let app = app.clone();
                        let lifecycle = self.lifecycle.clone();
                        tasks.spawn(serve_connection(stream, app, lifecycle, lease));
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => break Err(e),
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        };

        // Refuse new connections before anything else.
        drop(listener);
        self.drain(tasks, shutdown).await;
        result
    }

    async fn drain(&self, mut tasks: JoinSet<()>, mut shutdown: broadcast::Receiver<()>) {
        let started = Instant::now();
        self.lifecycle.advance(LifecycleState::Draining);
        tracing::info!(
            connections = self.connections.active_count(),
            in_flight = self.in_flight.len(),
            deadline_ms = self.drain_deadline.as_millis() as u64,
            "Draining"
        );

        let forced = {
            let in_flight = &self.in_flight;
            let graceful = async {
                while tasks.join_next().await.is_some() {}
                in_flight.wait_empty().await;
            };

            tokio::select! {
                finished = tokio::time::timeout(self.drain_deadline, graceful) => {
                    if finished.is_err() {
                        tracing::warn!("Drain deadline reached");
                    }
                    finished.is_err()
                }
                _ = next_signal(&mut shutdown) => {
                    tracing::warn!("Second shutdown signal, forcing close");
                    true
                }
            }
        };

        if forced {
            self.force_close(&mut tasks).await;
        }

        self.lifecycle.advance(LifecycleState::Stopped);
        tracing::info!(
            forced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Drain complete"
        );
    }

    async fn force_close(&self, tasks: &mut JoinSet<()>) {
        let remaining = self.in_flight.snapshot();
        for (id, entry) in &remaining {
            tracing::warn!(
                context_id = %id,
                correlation_id = %entry.correlation_id,
                route = %entry.route,
                upgrade = entry.is_upgrade,
                age_ms = entry.started.elapsed().as_millis() as u64,
                "Force closing in-flight request"
            );
        }

        self.in_flight.force_close();
        tasks.abort_all();

        let in_flight = &self.in_flight;
        let unwound = tokio::time::timeout(FORCE_CLOSE_GRACE, async {
            while tasks.join_next().await.is_some() {}
            in_flight.wait_empty().await;
        })
        .await;
        if unwound.is_err() {
            tracing::error!(
                remaining = self.in_flight.len(),
                "In-flight requests did not unwind after force close"
            );
        }
    }
}

/// Resolve on the next shutdown message. A dropped sender never resolves.
async fn next_signal(shutdown: &mut broadcast::Receiver<()>) {
    loop {
        match shutdown.recv().await {
            Ok(()) => return,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// Serve one client connection until it closes or finishes draining.
///
/// Every request carries a clone of `lease`; an upgraded request hands it to
/// its splice so the slot stays taken after this task returns.
async fn serve_connection(stream: TcpStream, app: Router, lifecycle: Lifecycle, lease: Arc<ConnectionLease>) {
    let peer = lease.peer();
    let id = lease.id();
    let service = service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        req.extensions_mut().insert(Arc::clone(&lease));
        app.clone().oneshot(req)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let draining = lifecycle.reached(LifecycleState::Draining);
    tokio::pin!(draining);

    let mut shutting_down = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Connection error");
                }
                break;
            }
            _ = &mut draining, if !shutting_down => {
                shutting_down = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}
