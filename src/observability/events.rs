//! Per-request lifecycle events.
//!
//! The proxy reports each stage of a request to an [`EventSink`]. Emission is
//! one-way: sinks return nothing, must not block, and swallow their own
//! failures, so a broken sink can never change how a request is handled.

use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::http::request::RequestId;

const REDACTED_HEADERS: [&str; 4] = ["authorization", "proxy-authorization", "cookie", "set-cookie"];

/// One stage in the life of a proxied request.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Client request accepted.
    Received {
        id: RequestId,
        method: Method,
        uri: Uri,
        peer: Option<SocketAddr>,
        headers: HeaderMap,
    },
    /// Outbound request handed to the upstream client.
    Dispatched {
        id: RequestId,
        method: Method,
        target: Uri,
        headers: HeaderMap,
    },
    /// Upstream status line and headers arrived.
    ResponseReceived {
        id: RequestId,
        status: StatusCode,
        headers: HeaderMap,
        elapsed: Duration,
    },
    /// Upstream body fully relayed to the client.
    ResponseSent {
        id: RequestId,
        status: StatusCode,
        bytes: u64,
        elapsed: Duration,
    },
    /// A synthetic error response was sent instead of the upstream's.
    Failed {
        id: RequestId,
        status: StatusCode,
        error: String,
        elapsed: Duration,
    },
    /// The relay stopped after the response had started; the connection is dropped.
    RelayAborted {
        id: RequestId,
        status: StatusCode,
        bytes: u64,
        reason: String,
    },
    /// The client went away before a response was finalized.
    ClientDisconnected { id: RequestId, elapsed: Duration },
}

impl LifecycleEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            LifecycleEvent::Received { id, .. }
            | LifecycleEvent::Dispatched { id, .. }
            | LifecycleEvent::ResponseReceived { id, .. }
            | LifecycleEvent::ResponseSent { id, .. }
            | LifecycleEvent::Failed { id, .. }
            | LifecycleEvent::RelayAborted { id, .. }
            | LifecycleEvent::ClientDisconnected { id, .. } => *id,
        }
    }

    /// Short stage name used in log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            LifecycleEvent::Received { .. } => "incoming",
            LifecycleEvent::Dispatched { .. } => "dispatched",
            LifecycleEvent::ResponseReceived { .. } => "received",
            LifecycleEvent::ResponseSent { .. } => "sent",
            LifecycleEvent::Failed { .. } => "failed",
            LifecycleEvent::RelayAborted { .. } => "aborted",
            LifecycleEvent::ClientDisconnected { .. } => "disconnected",
        }
    }
}

/// Destination for lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Writes every event as a structured `tracing` line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        let stage = event.stage();
        match event {
            LifecycleEvent::Received { id, method, uri, peer, headers } => {
                tracing::info!(
                    request_id = %id,
                    stage,
                    method = %method,
                    uri = %uri,
                    peer = ?peer,
                    headers = %header_summary(&headers),
                    "Incoming request"
                );
            }
            LifecycleEvent::Dispatched { id, method, target, headers } => {
                tracing::info!(
                    request_id = %id,
                    stage,
                    method = %method,
                    target = %target,
                    headers = %header_summary(&headers),
                    "Sent to upstream"
                );
            }
            LifecycleEvent::ResponseReceived { id, status, headers, elapsed } => {
                tracing::info!(
                    request_id = %id,
                    stage,
                    status = status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    headers = %header_summary(&headers),
                    "Received from upstream"
                );
            }
            LifecycleEvent::ResponseSent { id, status, bytes, elapsed } => {
                tracing::info!(
                    request_id = %id,
                    stage,
                    status = status.as_u16(),
                    bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Sent to client"
                );
            }
            LifecycleEvent::Failed { id, status, error, elapsed } => {
                tracing::warn!(
                    request_id = %id,
                    stage,
                    status = status.as_u16(),
                    error = %error,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Proxy error"
                );
            }
            LifecycleEvent::RelayAborted { id, status, bytes, reason } => {
                tracing::warn!(
                    request_id = %id,
                    stage,
                    status = status.as_u16(),
                    bytes,
                    reason = %reason,
                    "Response relay aborted"
                );
            }
            LifecycleEvent::ClientDisconnected { id, elapsed } => {
                tracing::debug!(
                    request_id = %id,
                    stage,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Client disconnected, upstream request cancelled"
                );
            }
        }
    }
}

/// Forwards events into an unbounded channel. Sends to a closed channel are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}

/// Render headers as a JSON object. Repeated headers become arrays and
/// credential-bearing values are masked.
pub fn header_summary(headers: &HeaderMap) -> String {
    let mut map = Map::new();

    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|value| {
                if is_redacted(name) {
                    Value::from("<redacted>")
                } else {
                    Value::from(String::from_utf8_lossy(value.as_bytes()).into_owned())
                }
            })
            .collect();

        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        map.insert(name.as_str().to_string(), value);
    }

    Value::Object(map).to_string()
}

fn is_redacted(name: &HeaderName) -> bool {
    REDACTED_HEADERS.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn summary_groups_repeats_and_masks_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", HeaderValue::from_static("abc"));
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));

        let summary: Value = serde_json::from_str(&header_summary(&headers)).unwrap();

        assert_eq!(summary["x-test"], "abc");
        assert_eq!(summary["accept"], serde_json::json!(["text/html", "application/json"]));
        assert_eq!(summary["authorization"], "<redacted>");
    }

    #[test]
    fn channel_sink_survives_a_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(LifecycleEvent::ClientDisconnected {
            id: RequestId::new(),
            elapsed: Duration::ZERO,
        });
    }

    #[test]
    fn events_expose_their_request_id() {
        let id = RequestId::new();
        let event = LifecycleEvent::ResponseSent {
            id,
            status: StatusCode::OK,
            bytes: 8,
            elapsed: Duration::from_millis(3),
        };
        assert_eq!(event.request_id(), id);
        assert_eq!(event.stage(), "sent");
    }
}
