//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap the upstream call with the configured deadline
//! - Cancel the call when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The wrapped future is dropped on expiry, which aborts the request and
//!   closes its connection instead of leaving it to finish in the background
//! - Timeout errors are distinct from other errors (504, not 502)

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The deadline passed before the wrapped future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no response within {}ms", .limit.as_millis())]
pub struct DeadlineExceeded {
    pub limit: Duration,
}

/// Run `fut` to completion or until `limit` elapses, whichever comes first.
pub async fn within<F>(limit: Duration, fut: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DeadlineExceeded { limit })
}
