//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing upstream request
//!     → tls.rs (HTTP or HTTPS connector, certificate policy)
//!     → hyper-util pooled client
//! ```
//!
//! # Design Decisions
//! - Client connections are accepted by axum's serve loop directly
//! - Certificate validation is a configuration choice, never hardcoded

pub mod tls;

pub use tls::{upstream_connector, UpstreamConnector};
