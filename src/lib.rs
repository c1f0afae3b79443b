//! Private-link forwarding proxy.
//!
//! Accepts any HTTP request and forwards it to one fixed upstream reachable
//! over a private network link, replacing only the scheme, the authority and
//! the `host` header. The upstream response (status, headers, body) is
//! streamed back unchanged.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ http::server ──▶ http::request           │
//!                           │   (catch-all)      (target, host header)   │
//!                           │                           │                │
//!                           │                           ▼                │
//!                           │                    resilience::timeouts ───┼──▶ Upstream
//!                           │                    (deadline, abort)       │    (private link)
//!                           │                           │                │
//!     Client Response       │                           ▼                │
//!     ◀─────────────────────┼── http::response ◀── http::completion ◀────┼───
//!                           │   (relay body)      (first outcome wins)   │
//!                           │                                            │
//!                           │  config · net::tls · observability ·       │
//!                           │  lifecycle                                 │
//!                           └────────────────────────────────────────────┘
//! ```
//!
//! Every request ends in exactly one of: the upstream response relayed, a 502
//! (upstream unreachable), a 504 (deadline passed), a 500 (local failure),
//! or nothing at all when the client has already gone away.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
