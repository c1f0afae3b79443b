//! Response handling.
//!
//! # Responsibilities
//! - Map proxy failures to client status codes and short plain-text bodies
//! - Relay the upstream body frame by frame, without buffering it
//! - Report the end of the relay, or its failure, exactly once
//!
//! # Design Decisions
//! - Upstream status and headers are passed through untouched
//! - Backend timeouts result in 504 Gateway Timeout, connect failures in 502
//! - Once the response has started nothing else can be written; a failure
//!   mid-body only drops the connection

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::http::completion::{Completion, Outcome};
use crate::http::request::RequestId;
use crate::observability::{EventSink, LifecycleEvent};

/// Failures that end a request with a synthetic response.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Connection refused, DNS failure, reset, TLS handshake failure.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("cannot build upstream target: {0}")]
    InvalidTarget(String),
}

impl ProxyError {
    /// Wrap a client error, keeping the whole cause chain as the diagnostic.
    pub fn upstream(err: &(dyn StdError + 'static)) -> Self {
        ProxyError::Upstream(error_chain(err))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidTarget(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ProxyError::Upstream(_) => Outcome::UpstreamFailed,
            ProxyError::Timeout(_) => Outcome::TimedOut,
            ProxyError::InvalidTarget(_) => Outcome::LocalFailure,
        }
    }

    fn client_message(&self) -> String {
        match self {
            ProxyError::Upstream(cause) => format!("Bad Gateway: {cause}"),
            ProxyError::Timeout(_) => "Gateway Timeout".to_string(),
            ProxyError::InvalidTarget(_) => "Proxy Error".to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.client_message(),
        )
            .into_response()
    }
}

/// `outer: inner: innermost` for an error and its sources.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Upstream response body on its way to the client.
///
/// Frames are passed through as they arrive, so hyper's flow control governs
/// how fast the upstream is read. Dropping the body (client gone, write
/// failure) drops the upstream stream too, which closes that connection.
pub struct RelayBody {
    inner: Incoming,
    id: RequestId,
    status: StatusCode,
    completion: Arc<Completion>,
    events: Arc<dyn EventSink>,
    started: Instant,
    bytes: u64,
    finished: bool,
    error: Option<String>,
}

impl RelayBody {
    pub fn new(
        inner: Incoming,
        id: RequestId,
        status: StatusCode,
        completion: Arc<Completion>,
        events: Arc<dyn EventSink>,
        started: Instant,
    ) -> Self {
        Self {
            inner,
            id,
            status,
            completion,
            events,
            started,
            bytes: 0,
            finished: false,
            error: None,
        }
    }
}

impl HttpBody for RelayBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.error = Some(error_chain(&e));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if self.error.is_none() && (self.finished || self.inner.is_end_stream()) {
            self.events.emit(LifecycleEvent::ResponseSent {
                id: self.id,
                status: self.status,
                bytes: self.bytes,
                elapsed: self.started.elapsed(),
            });
            return;
        }

        // The status line is already out, so this attempt always loses.
        if self.completion.try_finalize(Outcome::LocalFailure) {
            tracing::error!(request_id = %self.id, "Relay failed before the response was finalized");
        }

        let reason = self
            .error
            .take()
            .unwrap_or_else(|| "client stopped reading before the body ended".to_string());
        self.events.emit(LifecycleEvent::RelayAborted {
            id: self.id,
            status: self.status,
            bytes: self.bytes,
            reason,
        });
    }
}
