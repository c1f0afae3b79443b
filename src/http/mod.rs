//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, catch-all handler)
//!     → request.rs (request ID, target rewrite, host header)
//!     → upstream client (deadline from resilience::timeouts)
//!     → completion.rs (first outcome wins: relay, 502, 504, 500, abandoned)
//!     → response.rs (stream upstream body, or short plain-text error)
//!     → Send to client
//! ```

pub mod completion;
pub mod request;
pub mod response;
pub mod server;

pub use completion::{Completion, Exchange, Outcome};
pub use request::{RequestId, Upstream};
pub use response::{ProxyError, RelayBody};
pub use server::{AppState, HttpServer, ServerError, UpstreamClient};
