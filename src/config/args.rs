//! Command-line flags and environment variables.
//!
//! Every flag can also be supplied through the environment variable named in
//! its `env` attribute. Values given here override the configuration file.

use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::PathBuf;

use crate::config::schema::{LogFormat, ProxyConfig, UpstreamScheme};

#[derive(Debug, Default, Parser)]
#[command(name = "private-link-proxy")]
#[command(about = "Forward all HTTP traffic to a single upstream over a private link", long_about = None)]
#[command(version)]
pub struct Args {
    /// Optional TOML configuration file
    #[arg(short, long, env = "PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to accept client connections on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// IP address to bind
    #[arg(long, env = "BIND_HOST")]
    pub bind_host: Option<String>,

    /// Upstream host (private-link DNS name), optionally with a port
    #[arg(long = "upstream-host", env = "PRIVATE_LINK_DNS_NAME")]
    pub upstream_host: Option<String>,

    /// Upstream scheme: https or http
    #[arg(long, env = "UPSTREAM_SCHEME")]
    pub upstream_scheme: Option<UpstreamScheme>,

    /// Milliseconds to wait for upstream response headers
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS")]
    pub upstream_timeout_ms: Option<u64>,

    /// Validate the upstream TLS certificate
    #[arg(long, env = "UPSTREAM_TLS_VERIFY", value_parser = BoolishValueParser::new())]
    pub upstream_tls_verify: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format: pretty or json
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Bind address for the Prometheus scrape endpoint
    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<String>,
}

impl Args {
    /// Overlay every value that was supplied onto `config`.
    pub fn apply(self, config: &mut ProxyConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(bind_host) = self.bind_host {
            config.listener.bind_host = bind_host;
        }
        if let Some(host) = self.upstream_host {
            config.upstream.host = Some(host);
        }
        if let Some(scheme) = self.upstream_scheme {
            config.upstream.scheme = scheme;
        }
        if let Some(timeout_ms) = self.upstream_timeout_ms {
            config.upstream.timeout_ms = timeout_ms;
        }
        if let Some(verify) = self.upstream_tls_verify {
            config.upstream.verify_tls = verify;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if let Some(addr) = self.metrics_address {
            config.observability.metrics_address = Some(addr);
        }
    }
}
