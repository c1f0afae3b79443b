use clap::Parser;
use std::process::ExitCode;

use private_link_proxy::config::{loader, Args};
use private_link_proxy::lifecycle::startup;
use private_link_proxy::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration problems are fatal and reported before anything is bound.
    let config = match loader::load(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "private-link-proxy starting");
    tracing::info!(
        port = config.listener.port,
        scheme = %config.upstream.scheme,
        timeout_ms = config.upstream.timeout_ms,
        verify_tls = config.upstream.verify_tls,
        "Configuration loaded"
    );

    match startup::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy terminated");
            ExitCode::FAILURE
        }
    }
}
