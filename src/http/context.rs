//! Per-request forwarding context.
//!
//! A context exists only for requests that matched a route. It is registered
//! in the in-flight set on creation and reports exactly one access event,
//! either explicitly through [`ForwardingContext::complete`] /
//! [`ForwardingContext::fail`] or, if it is dropped first, as an aborted
//! request.

use std::sync::Arc;
use std::time::Instant;

use axum::http::{Method, StatusCode};

use crate::error::{FailureCategory, GatewayError};
use crate::lifecycle::{InFlightEntry, InFlightGuard, InFlightSet};
use crate::observability::AccessEvent;
use crate::routing::{rewrite, Route};

/// How a context ended.
#[derive(Debug)]
pub enum Outcome {
    /// Response head and full body relayed.
    Relayed(StatusCode),
    /// Upgraded connection closed.
    Spliced {
        bytes_up: u64,
        bytes_down: u64,
        /// Why the splice ended, if not a clean close.
        failure: Option<(FailureCategory, String)>,
    },
    /// Forwarding failed; `status` is what the client was sent, if anything.
    Failed {
        category: FailureCategory,
        status: Option<StatusCode>,
        detail: String,
    },
}

impl Outcome {
    /// Outcome for `err`. Only categories with a client status record one,
    /// since anything else was sent to a client that is already gone.
    pub fn failed(err: &GatewayError, answered: bool) -> Self {
        let category = err.category();
        Outcome::Failed {
            category,
            status: if answered { category.status() } else { None },
            detail: err.to_string(),
        }
    }
}

/// Everything known about one forwarded request.
#[derive(Debug)]
pub struct ForwardingContext {
    pub correlation_id: String,
    pub route: Arc<Route>,
    pub method: Method,
    pub original_path: String,
    pub rewritten_path: String,
    pub is_upgrade: bool,
    pub started: Instant,
    registration: Option<InFlightGuard>,
}

impl ForwardingContext {
    /// Create the context and register it in `in_flight`.
    pub fn register(
        in_flight: &Arc<InFlightSet>,
        correlation_id: String,
        route: Arc<Route>,
        method: Method,
        original_path: &str,
        is_upgrade: bool,
    ) -> Self {
        let started = Instant::now();
        let rewritten_path = rewrite(original_path, &route);
        let registration = in_flight.register(InFlightEntry {
            correlation_id: correlation_id.clone(),
            route: route.name.clone(),
            is_upgrade,
            started,
        });

        tracing::debug!(
            correlation_id = %correlation_id,
            route = %route.name,
            method = %method,
            original_path,
            rewritten_path = %rewritten_path,
            upstream = %route.upstream,
            upgrade = is_upgrade,
            "Forwarding request"
        );

        Self {
            correlation_id,
            route,
            method,
            original_path: original_path.to_string(),
            rewritten_path,
            is_upgrade,
            started,
            registration: Some(registration),
        }
    }

    /// True once the gateway has started force-closing in-flight work.
    pub fn is_force_closing(&self) -> bool {
        self.registration
            .as_ref()
            .is_some_and(|r| r.set().is_force_closing())
    }

    /// The in-flight set this context belongs to.
    pub fn in_flight(&self) -> Option<&Arc<InFlightSet>> {
        self.registration.as_ref().map(|r| r.set())
    }

    /// Report the outcome and leave the in-flight set.
    pub fn complete(mut self, outcome: Outcome) {
        self.finish(outcome);
    }

    /// Report a forwarding error. `answered` says whether the client got the
    /// error response for it (see `GatewayError::into_response`).
    pub fn fail(self, err: &GatewayError, answered: bool) {
        self.complete(Outcome::failed(err, answered));
    }

    fn finish(&mut self, outcome: Outcome) {
        let Some(registration) = self.registration.take() else {
            return;
        };

        let detail: String;
        let mut event = AccessEvent::new(&self.correlation_id, &self.method, &self.original_path);
        event.route = Some(self.route.name.as_str());
        event.duration = self.started.elapsed();

        match outcome {
            Outcome::Relayed(status) => event.status = Some(status),
            Outcome::Spliced {
                bytes_up,
                bytes_down,
                failure,
            } => {
                event.status = Some(StatusCode::SWITCHING_PROTOCOLS);
                event.bytes_up = Some(bytes_up);
                event.bytes_down = Some(bytes_down);
                if let Some((category, message)) = failure {
                    event.category = Some(category);
                    detail = message;
                    event.detail = Some(&detail);
                }
            }
            Outcome::Failed {
                category,
                status,
                detail: message,
            } => {
                event.status = status;
                event.category = Some(category);
                detail = message;
                event.detail = Some(&detail);
            }
        }
        event.emit();
        drop(registration);
    }
}

impl Drop for ForwardingContext {
    fn drop(&mut self) {
        if self.registration.is_none() {
            return;
        }
        let outcome = if self.is_force_closing() {
            Outcome::Failed {
                category: FailureCategory::PartialFailure,
                status: None,
                detail: "closed at drain deadline".to_string(),
            }
        } else {
            Outcome::Failed {
                category: FailureCategory::ClientAborted,
                status: None,
                detail: "client went away".to_string(),
            }
        };
        self.finish(outcome);
    }
}
