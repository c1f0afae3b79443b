//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handler produces:
//!     → events.rs (one lifecycle event per stage, fire-and-forget)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs (tracing subscriber, stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every lifecycle event
//! - Event sinks never influence control flow
//! - Metrics are cheap (atomic increments)

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{ChannelSink, EventSink, LifecycleEvent, TracingSink};
