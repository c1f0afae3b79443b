//! At-most-once completion of the client response.
//!
//! Every request owns one [`Completion`]. Whatever ends the request (the
//! upstream answering, a connect error, the deadline, the client leaving, a
//! relay failure) must claim it first, and only the first claim may produce
//! client-visible output. Later claims are no-ops.
//!
//! # States
//! ```text
//! Pending ──claim(outcome)──▶ Finalized(outcome)
//!                              (every further claim fails)
//! ```

use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::http::request::RequestId;
use crate::http::response::{ProxyError, RelayBody};
use crate::observability::metrics;
use crate::observability::{EventSink, LifecycleEvent};

const PENDING: u8 = 0;

/// How a request was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Outcome {
    /// Upstream status and headers relayed to the client.
    Relayed = 1,
    /// 502: the upstream could not be reached.
    UpstreamFailed = 2,
    /// 504: no upstream response within the deadline.
    TimedOut = 3,
    /// 500: the proxy itself failed before anything was sent.
    LocalFailure = 4,
    /// The client left first; nothing was written.
    Abandoned = 5,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Relayed => "relayed",
            Outcome::UpstreamFailed => "upstream_failed",
            Outcome::TimedOut => "timed_out",
            Outcome::LocalFailure => "local_failure",
            Outcome::Abandoned => "abandoned",
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Outcome::Relayed),
            2 => Some(Outcome::UpstreamFailed),
            3 => Some(Outcome::TimedOut),
            4 => Some(Outcome::LocalFailure),
            5 => Some(Outcome::Abandoned),
            _ => None,
        }
    }
}

/// The "response finalized" flag of one request.
///
/// Claiming is a single compare-and-set, so among any number of concurrent
/// attempts exactly one wins.
#[derive(Debug, Default)]
pub struct Completion {
    state: AtomicU8,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to finalize with `outcome`. Returns `true` only for the first caller.
    pub fn try_finalize(&self, outcome: Outcome) -> bool {
        self.state
            .compare_exchange(PENDING, outcome as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_finalized(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }

    /// The winning outcome, if any.
    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// One client request in flight.
///
/// Owned by the handler future. If that future is dropped before [`finish`]
/// runs, hyper has seen the client connection close; the drop claims the
/// completion as [`Outcome::Abandoned`] so nothing else is written, and the
/// in-flight upstream call, owned by the same future, is dropped with it.
///
/// [`finish`]: Exchange::finish
pub struct Exchange {
    id: RequestId,
    method: Method,
    completion: Arc<Completion>,
    events: Arc<dyn EventSink>,
    started: Instant,
}

impl Exchange {
    pub fn new(id: RequestId, method: Method, events: Arc<dyn EventSink>) -> Self {
        Self {
            id,
            method,
            completion: Arc::new(Completion::new()),
            events,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    /// Finalize the client response from the upstream result.
    pub fn finish(self, result: Result<hyper::Response<Incoming>, ProxyError>) -> Response {
        match result {
            Ok(upstream) => self.relay(upstream),
            Err(err) => self.fail(err),
        }
    }

    fn relay(self, upstream: hyper::Response<Incoming>) -> Response {
        if !self.completion.try_finalize(Outcome::Relayed) {
            return self.superseded();
        }

        let (parts, body) = upstream.into_parts();
        self.events.emit(LifecycleEvent::ResponseReceived {
            id: self.id,
            status: parts.status,
            headers: parts.headers.clone(),
            elapsed: self.started.elapsed(),
        });
        metrics::record_request(&self.method, parts.status.as_u16(), Outcome::Relayed, self.started);

        let body = RelayBody::new(
            body,
            self.id,
            parts.status,
            self.completion.clone(),
            self.events.clone(),
            self.started,
        );
        Response::from_parts(parts, Body::new(body))
    }

    fn fail(self, err: ProxyError) -> Response {
        let outcome = err.outcome();
        if !self.completion.try_finalize(outcome) {
            return self.superseded();
        }

        let status = err.status();
        self.events.emit(LifecycleEvent::Failed {
            id: self.id,
            status,
            error: err.to_string(),
            elapsed: self.started.elapsed(),
        });
        metrics::record_request(&self.method, status.as_u16(), outcome, self.started);

        err.into_response()
    }

    /// The client left while its request body was still being forwarded.
    /// Finalizes as [`Outcome::Abandoned`]; the returned response goes to a
    /// connection that is already closed.
    pub fn abandon(self) -> Response {
        self.claim_abandoned();
        StatusCode::BAD_REQUEST.into_response()
    }

    fn claim_abandoned(&self) {
        if self.completion.try_finalize(Outcome::Abandoned) {
            self.events.emit(LifecycleEvent::ClientDisconnected {
                id: self.id,
                elapsed: self.started.elapsed(),
            });
            metrics::record_request(&self.method, 499, Outcome::Abandoned, self.started);
        }
    }

    /// Another attempt already won, so nothing may be written for this one.
    /// Earlier claims only come from the client connection going away, so
    /// this response is never sent.
    fn superseded(&self) -> Response {
        tracing::debug!(
            request_id = %self.id,
            winner = ?self.completion.outcome(),
            "Late completion attempt ignored"
        );
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.claim_abandoned();
    }
}
