//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional TOML file (loader.rs)
//!     → flags / environment variables (args.rs)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!     → resolved into an Upstream and shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults except the upstream host, which is required
//! - Validation failures are fatal and happen before any socket is bound

pub mod args;
pub mod loader;
pub mod schema;
pub mod validation;

pub use args::Args;
pub use loader::ConfigError;
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig, UpstreamConfig, UpstreamScheme,
};
pub use validation::ValidationError;
