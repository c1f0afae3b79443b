//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use private_link_proxy::config::{ProxyConfig, UpstreamScheme};
use private_link_proxy::http::HttpServer;
use private_link_proxy::lifecycle::Shutdown;
use private_link_proxy::observability::{ChannelSink, LifecycleEvent};

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<LifecycleEvent>,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for the next lifecycle event, failing the test after a few seconds.
    pub async fn next_event(&mut self) -> LifecycleEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for lifecycle event")
            .expect("event channel closed")
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Proxy configuration pointing at a plain-HTTP mock upstream.
pub fn proxy_config(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.host = Some(upstream.to_string());
    config.upstream.scheme = UpstreamScheme::Http;
    config
}

/// Start the proxy with `config` on 127.0.0.1 and an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let (sink, events) = ChannelSink::new();
    let server = HttpServer::with_events(&config, Arc::new(sink)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        events,
        shutdown,
    }
}

/// HTTP client that talks to the proxy directly and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Read from `socket` until the end of the request head and return the head.
pub async fn read_head(socket: &mut TcpStream) -> String {
    read_head_and_rest(socket).await.0
}

/// Like [`read_head`], also returning any body bytes read past the head.
pub async fn read_head_and_rest(socket: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            return (head, buf[end + 4..].to_vec());
        }
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the request head ended");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Value of the first header called `name` in a raw head.
pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Build a complete `Connection: close` response.
pub fn response(status_line: &str, extra_headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in extra_headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    out
}

/// A request as the mock upstream received it.
#[derive(Debug)]
pub struct Captured {
    pub head: String,
    /// Raw body bytes, still chunk-framed if the request was chunked.
    pub body: Vec<u8>,
}

impl Captured {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.head, name)
    }

    /// Every value of `name`, in the order they were sent.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.head
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .collect()
    }
}

/// Read the rest of a request body, framed by `content-length` or chunked.
pub async fn read_body(socket: &mut TcpStream, head: &str, mut body: Vec<u8>) -> Vec<u8> {
    let mut chunk = [0u8; 16 * 1024];
    if let Some(length) = header(head, "content-length") {
        let length: usize = length.parse().unwrap();
        while body.len() < length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-body");
            body.extend_from_slice(&chunk[..n]);
        }
    } else if header(head, "transfer-encoding").is_some() {
        while !body.ends_with(b"0\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-body");
            body.extend_from_slice(&chunk[..n]);
        }
    }
    body
}

/// Start a mock upstream that answers every request with `reply` and reports
/// each request it saw.
pub async fn start_mock_backend(reply: String) -> (SocketAddr, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = Arc::new(reply);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let reply = reply.clone();
            tokio::spawn(async move {
                let (head, rest) = read_head_and_rest(&mut socket).await;
                let body = read_body(&mut socket, &head, rest).await;
                let _ = tx.send(Captured { head, body });
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Wait for the next request the mock upstream captured.
pub async fn next_request(rx: &mut mpsc::UnboundedReceiver<Captured>) -> Captured {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for upstream request")
        .expect("mock upstream stopped")
}

/// Start a mock upstream that reads the request head and then never answers.
///
/// The sender fires once the head has arrived; the second one fires when the
/// proxy closes the connection (EOF or reset).
pub async fn start_silent_backend() -> (SocketAddr, oneshot::Receiver<String>, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let head = read_head(&mut socket).await;
        let _ = head_tx.send(head);

        let mut chunk = [0u8; 1024];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = closed_tx.send(());
    });

    (addr, head_rx, closed_rx)
}

/// A port with nothing listening on it.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
