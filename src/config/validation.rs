//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require the upstream host and check it is a bare `host[:port]`
//! - Validate value ranges (timeout > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before any socket is bound

use axum::http::uri::Authority;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("PRIVATE_LINK_DNS_NAME environment variable is required")]
    MissingUpstreamHost,

    #[error("upstream host {0:?} must be a bare host or host:port")]
    InvalidUpstreamHost(String),

    #[error("upstream timeout must be greater than zero")]
    ZeroTimeout,

    #[error("bind host {0:?} is not an IP address")]
    InvalidBindHost(String),

    #[error("metrics address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("log level {0:?} is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Validate a fully layered configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.upstream.host.as_deref() {
        None => errors.push(ValidationError::MissingUpstreamHost),
        Some(host) if host.trim().is_empty() => errors.push(ValidationError::MissingUpstreamHost),
        Some(host) => {
            if let Err(e) = parse_upstream_authority(host) {
                errors.push(e);
            }
        }
    }

    if config.upstream.timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.listener.socket_addr().is_err() {
        errors.push(ValidationError::InvalidBindHost(config.listener.bind_host.clone()));
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(addr.clone()));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse the upstream host into a URI authority, rejecting user-info.
pub fn parse_upstream_authority(host: &str) -> Result<Authority, ValidationError> {
    let invalid = || ValidationError::InvalidUpstreamHost(host.to_string());

    if host.contains('@') {
        return Err(invalid());
    }

    let authority: Authority = host.parse().map_err(|_| invalid())?;
    if authority.host().is_empty() {
        return Err(invalid());
    }
    Ok(authority)
}
