//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server from validated configuration
//! - Start the optional metrics exporter
//! - Bind the listener and serve until a termination signal
//!
//! # Design Decisions
//! - Configuration is validated by the caller before this runs, so a missing
//!   upstream never gets as far as binding a socket
//! - The listener is bound last (traffic only when ready)

use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::metrics;

/// Fatal errors while bringing the proxy up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("invalid bind address: {0}")]
    Address(#[from] AddrParseError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Serve with `config` until SIGINT or SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let server = HttpServer::new(&config)?;

    let upstream = server.upstream();
    if upstream.is_secure() && !upstream.verify_tls() {
        tracing::warn!(
            upstream = %upstream.authority(),
            "Upstream certificate validation is disabled"
        );
    }

    if let Some(metrics_address) = &config.observability.metrics_address {
        match metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => {
                tracing::error!(%metrics_address, "Failed to parse metrics address");
            }
        }
    }

    let addr = config.listener.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let base_url = server.upstream().base_url();
    tracing::info!(port = addr.port(), "Proxy server running on port {}", addr.port());
    tracing::info!(upstream = %base_url, "Forwarding all traffic to: {}", base_url);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown);

    server
        .run(listener, server_shutdown)
        .await
        .map_err(StartupError::Serve)
}
