//! Upstream failures, deadlines and clients that leave early.

mod common;

use common::*;
use private_link_proxy::observability::LifecycleEvent;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn refused_upstream_is_bad_gateway() {
    let mut proxy = start_proxy(proxy_config(closed_port())).await;

    let response = client().get(proxy.url("/anything")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");
    let body = response.text().await.unwrap();
    assert!(body.starts_with("Bad Gateway: "), "unexpected body: {body}");

    assert_eq!(proxy.next_event().await.stage(), "incoming");
    assert_eq!(proxy.next_event().await.stage(), "dispatched");
    match proxy.next_event().await {
        LifecycleEvent::Failed { status, error, .. } => {
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert!(!error.is_empty());
        }
        other => panic!("expected failed, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_upstream_times_out_and_is_abandoned() {
    let (upstream, head, closed) = start_silent_backend().await;
    let mut config = proxy_config(upstream);
    config.upstream.timeout_ms = 300;
    let mut proxy = start_proxy(config).await;

    let started = Instant::now();
    let response = client().get(proxy.url("/slow")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.text().await.unwrap(), "Gateway Timeout");
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(5));

    let head = head.await.unwrap();
    assert!(head.starts_with("GET /slow HTTP/1.1"));

    // The abandoned upstream request must not stay open.
    tokio::time::timeout(Duration::from_secs(5), closed)
        .await
        .expect("upstream connection was not closed after the timeout")
        .unwrap();

    assert_eq!(proxy.next_event().await.stage(), "incoming");
    assert_eq!(proxy.next_event().await.stage(), "dispatched");
    match proxy.next_event().await {
        LifecycleEvent::Failed { status, .. } => assert_eq!(status, StatusCode::GATEWAY_TIMEOUT),
        other => panic!("expected failed, got {other:?}"),
    }
}

#[tokio::test]
async fn client_disconnect_aborts_upstream_request() {
    let (upstream, head, closed) = start_silent_backend().await;
    let mut proxy = start_proxy(proxy_config(upstream)).await;

    let mut socket = TcpStream::connect(proxy.addr).await.unwrap();
    socket
        .write_all(b"GET /long-poll HTTP/1.1\r\nHost: proxy.local\r\n\r\n")
        .await
        .unwrap();

    // Wait until the request is in flight upstream, then hang up.
    tokio::time::timeout(Duration::from_secs(5), head)
        .await
        .expect("request never reached the upstream")
        .unwrap();
    drop(socket);

    tokio::time::timeout(Duration::from_secs(5), closed)
        .await
        .expect("upstream connection was not closed after the client left")
        .unwrap();

    assert_eq!(proxy.next_event().await.stage(), "incoming");
    assert_eq!(proxy.next_event().await.stage(), "dispatched");
    assert_eq!(proxy.next_event().await.stage(), "disconnected");
}

#[tokio::test]
async fn client_leaving_mid_upload_is_a_disconnect() {
    let (upstream, head, _closed) = start_silent_backend().await;
    let mut proxy = start_proxy(proxy_config(upstream)).await;

    let mut socket = TcpStream::connect(proxy.addr).await.unwrap();
    socket
        .write_all(b"POST /upload HTTP/1.1\r\nHost: proxy.local\r\nContent-Length: 100000\r\n\r\nabc")
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), head)
        .await
        .expect("request never reached the upstream")
        .unwrap();
    drop(socket);

    assert_eq!(proxy.next_event().await.stage(), "incoming");
    assert_eq!(proxy.next_event().await.stage(), "dispatched");
    match proxy.next_event().await {
        LifecycleEvent::ClientDisconnected { .. } => {}
        other => panic!("expected disconnected, got {other:?}"),
    }

    // Nothing else is reported for the abandoned request.
    let extra = tokio::time::timeout(Duration::from_millis(300), proxy.events.recv()).await;
    assert!(extra.is_err(), "unexpected event: {extra:?}");
}

#[tokio::test]
async fn proxy_keeps_serving_after_failures() {
    let (upstream, _requests) = start_mock_backend(response("200 OK", &[], "ok")).await;
    let refused = start_proxy(proxy_config(closed_port())).await;
    let healthy = start_proxy(proxy_config(upstream)).await;

    for _ in 0..3 {
        let response = client().get(refused.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    let response = client().get(healthy.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}
