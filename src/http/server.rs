//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: health endpoints first, then the route table
//! - Wire up middleware (request id, tracing)
//! - Match routes, register forwarding contexts, hand them to the dispatcher
//! - Run the lifecycle manager on a listener

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRef, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use uuid::Uuid;

use crate::config::{GatewayConfig, ValidationError};
use crate::error::{FailureCategory, GatewayError};
use crate::health::{health_check, HEALTH_PATHS};
use crate::http::context::ForwardingContext;
use crate::http::headers::is_upgrade_request;
use crate::http::transform::ResponseTransform;
use crate::lifecycle::{InFlightSet, Lifecycle, LifecycleManager};
use crate::net::{Listener, ListenerError};
use crate::observability::tracing::{trace_layer, REQUEST_ID_HEADER};
use crate::observability::AccessEvent;
use crate::routing::RouteTable;
use crate::upstream::Dispatcher;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub dispatcher: Arc<Dispatcher>,
    pub in_flight: Arc<InFlightSet>,
    pub lifecycle: Lifecycle,
}

impl FromRef<AppState> for Lifecycle {
    fn from_ref(state: &AppState) -> Self {
        state.lifecycle.clone()
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    lifecycle: Lifecycle,
    in_flight: Arc<InFlightSet>,
}

impl HttpServer {
    /// Compile the route table and build the router. The lifecycle starts in
    /// `Starting`; nothing is accepted until [`run`](Self::run).
    pub fn new(config: GatewayConfig) -> Result<Self, ValidationError> {
        Self::build(config, None)
    }

    /// Like [`new`](Self::new), with a response transform installed in the relay.
    pub fn with_transform(
        config: GatewayConfig,
        transform: Arc<dyn ResponseTransform>,
    ) -> Result<Self, ValidationError> {
        Self::build(config, Some(transform))
    }

    fn build(
        config: GatewayConfig,
        transform: Option<Arc<dyn ResponseTransform>>,
    ) -> Result<Self, ValidationError> {
        let routes = Arc::new(RouteTable::from_config(&config.routes)?);
        let dispatcher = Arc::new(Dispatcher::new(&config, transform));
        let in_flight = InFlightSet::new();
        let lifecycle = Lifecycle::new();

        let state = AppState {
            routes,
            dispatcher,
            in_flight: Arc::clone(&in_flight),
            lifecycle: lifecycle.clone(),
        };

        Ok(Self {
            router: Self::build_router(state),
            config,
            lifecycle,
            in_flight,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let mut router = Router::new();
        for path in HEALTH_PATHS {
            router = router.route(path, get(health_check).fallback(proxy_handler));
        }

        router
            .fallback(proxy_handler)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(trace_layer())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server on an already bound listener until `shutdown` fires and
    /// the drain completes.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let listener = Listener::from_tcp(listener, self.config.listener.max_connections)?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve(
        self,
        listener: Listener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        tracing::info!(
            address = ?listener.local_addr().ok(),
            "HTTP server starting"
        );

        let manager = LifecycleManager::new(
            self.lifecycle,
            self.in_flight,
            self.config.lifecycle.drain_deadline(),
        );
        manager.serve(listener, self.router, shutdown).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    pub fn in_flight(&self) -> Arc<InFlightSet> {
        Arc::clone(&self.in_flight)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Matches the route, registers the forwarding context and dispatches it.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let correlation_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let path = request.uri().path().to_owned();

    let Some(route) = state.routes.match_path(&path) else {
        let mut event = AccessEvent::new(&correlation_id, request.method(), &path);
        event.status = Some(StatusCode::NOT_FOUND);
        event.category = Some(FailureCategory::NotFound);
        event.emit();
        return GatewayError::RouteNotFound.into_response();
    };

    let is_upgrade = route.allow_upgrade && is_upgrade_request(request.headers());
    let ctx = ForwardingContext::register(
        &state.in_flight,
        correlation_id,
        route,
        request.method().clone(),
        &path,
        is_upgrade,
    );

    state.dispatcher.dispatch(ctx, request, peer).await
}
