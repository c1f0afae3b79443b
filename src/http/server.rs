//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing)
//! - Bind server to listener and serve until shutdown
//! - Forward every request to the upstream and relay its response
//! - Enforce the upstream deadline and report failures as 502/504

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::{ProxyConfig, ValidationError};
use crate::http::completion::Exchange;
use crate::http::request::{ClientGone, InboundBody, RequestId, Upstream};
use crate::http::response::ProxyError;
use crate::net::tls::{upstream_connector, UpstreamConnector};
use crate::observability::{EventSink, LifecycleEvent, TracingSink};
use crate::resilience::timeouts;

/// Pooled HTTP/HTTPS client used for all upstream calls.
pub type UpstreamClient = Client<UpstreamConnector, Body>;

/// Error type for server construction.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream: {0}")]
    Upstream(#[from] ValidationError),

    #[error("failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<Upstream>,
    pub client: UpstreamClient,
    pub events: Arc<dyn EventSink>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    upstream: Arc<Upstream>,
}

impl HttpServer {
    /// Create a server that reports lifecycle events through `tracing`.
    pub fn new(config: &ProxyConfig) -> Result<Self, ServerError> {
        Self::with_events(config, Arc::new(TracingSink))
    }

    /// Create a server with a custom event sink.
    pub fn with_events(config: &ProxyConfig, events: Arc<dyn EventSink>) -> Result<Self, ServerError> {
        let upstream = Arc::new(Upstream::from_config(&config.upstream)?);

        let connector = upstream_connector(upstream.verify_tls())?;
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            upstream: upstream.clone(),
            client,
            events,
        };

        let router = Self::build_router(state);
        Ok(Self { router, upstream })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener until a
    /// shutdown signal arrives. In-flight requests are allowed to finish.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.upstream.base_url(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The router, for driving the proxy without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}

/// Catch-all proxy handler.
///
/// Dropped by hyper if the client disconnects while it is pending; the
/// [`Exchange`] and the in-flight upstream future go with it.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let id = RequestId::new();
    let method = request.method().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    state.events.emit(LifecycleEvent::Received {
        id,
        method: method.clone(),
        uri: request.uri().clone(),
        peer,
        headers: request.headers().clone(),
    });

    let exchange = Exchange::new(id, method.clone(), state.events.clone());

    let client_gone = ClientGone::new();
    let request = request.map(|body| Body::new(InboundBody::new(body, client_gone.clone())));

    let outbound = match state.upstream.outbound_request(request) {
        Ok(outbound) => outbound,
        Err(err) => return exchange.finish(Err(err)),
    };

    state.events.emit(LifecycleEvent::Dispatched {
        id,
        method,
        target: outbound.uri().clone(),
        headers: outbound.headers().clone(),
    });

    let result = match timeouts::within(state.upstream.timeout(), state.client.request(outbound)).await {
        Ok(Ok(response)) => Ok(response),
        // The send failed because the client's body stopped, not the upstream.
        Ok(Err(_)) if client_gone.is_set() => return exchange.abandon(),
        Ok(Err(err)) => Err(ProxyError::upstream(&err)),
        Err(elapsed) => Err(ProxyError::Timeout(elapsed.limit)),
    };

    exchange.finish(result)
}
