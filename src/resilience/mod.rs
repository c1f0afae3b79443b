//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (deadline from dispatch to response headers)
//!     → on expiry: outbound request dropped, client gets 504
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Failed calls are reported to the client, never retried

pub mod timeouts;

pub use timeouts::{within, DeadlineExceeded};
