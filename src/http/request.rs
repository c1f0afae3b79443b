//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a request ID used only to correlate log events
//! - Resolve the configured upstream once at startup
//! - Rewrite scheme and authority of the target, leaving path and query untouched
//! - Propagate headers, overwriting only `host`
//!
//! # Design Decisions
//! - The request ID is never injected into forwarded headers
//! - No header other than `host` is special-cased, hop-by-hop ones included
//! - The inbound body is moved, not copied, into the outbound request
//! - A read error on the inbound body means the client went away; it is
//!   flagged so the failed send is not blamed on the upstream

use axum::body::Body;
use axum::http::header::HOST;
use hyper::body::{Body as HttpBody, Bytes, Frame, SizeHint};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderValue, Request, Uri};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use uuid::Uuid;

use crate::config::validation::{parse_upstream_authority, ValidationError};
use crate::config::{UpstreamConfig, UpstreamScheme};
use crate::http::response::ProxyError;

/// Opaque per-request token for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The single upstream, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
    timeout: Duration,
    verify_tls: bool,
}

impl Upstream {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ValidationError> {
        let host = config
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or(ValidationError::MissingUpstreamHost)?;

        let authority = parse_upstream_authority(host)?;
        let host_header = HeaderValue::from_str(authority.as_str())
            .map_err(|_| ValidationError::InvalidUpstreamHost(host.to_string()))?;

        if config.timeout_ms == 0 {
            return Err(ValidationError::ZeroTimeout);
        }

        let scheme = match config.scheme {
            UpstreamScheme::Https => Scheme::HTTPS,
            UpstreamScheme::Http => Scheme::HTTP,
        };

        Ok(Self {
            scheme,
            authority,
            host_header,
            timeout: config.timeout(),
            verify_tls: config.verify_tls,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::HTTPS
    }

    /// `scheme://authority`, for startup logging.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    /// Build the upstream target for an inbound URI. Path and query are
    /// carried over byte for byte; only scheme and authority change.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = inbound
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))
    }

    /// Turn an inbound request into the outbound one: same method, same
    /// headers (every value, in order) except `host`, same streaming body.
    pub fn outbound_request(&self, inbound: Request<Body>) -> Result<Request<Body>, ProxyError> {
        let (parts, body) = inbound.into_parts();
        let target = self.target_uri(&parts.uri)?;

        let mut headers = parts.headers;
        headers.insert(HOST, self.host_header.clone());

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = target;
        *outbound.headers_mut() = headers;
        Ok(outbound)
    }
}

/// Set once the client's request body fails to read.
#[derive(Debug, Clone, Default)]
pub struct ClientGone(Arc<AtomicBool>);

impl ClientGone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Client request body on its way upstream.
///
/// Frames pass through untouched. An error from the inbound connection
/// (reset, EOF before the declared length) marks [`ClientGone`].
pub struct InboundBody {
    inner: Body,
    gone: ClientGone,
}

impl InboundBody {
    pub fn new(inner: Body, gone: ClientGone) -> Self {
        Self { inner, gone }
    }
}

impl HttpBody for InboundBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Err(_))) = &polled {
            this.gone.set();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
