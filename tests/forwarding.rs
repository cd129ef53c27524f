//! Request/response forwarding through a live gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::response::Parts;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::StreamExt;
use mini_gateway::HttpServer;
use serde_json::Value;

mod common;

use common::{route, test_config};

#[tokio::test]
async fn unmatched_route_is_404_for_any_method() {
    let backend = common::start_mock_backend("unused").await;
    let gateway = common::start_gateway(test_config(vec![route("/account", backend)])).await;
    let client = common::client();

    for method in [reqwest::Method::GET, reqwest::Method::POST, reqwest::Method::PUT, reqwest::Method::DELETE] {
        let res = client
            .request(method.clone(), gateway.url("/unknown/path"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "method {method}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "message": "route not found" }));
    }

    gateway.stop().await;
}

#[tokio::test]
async fn strip_prefix_rewrites_path_and_host() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(test_config(vec![
        route("/account", backend).strip_prefix(true)
    ]))
    .await;

    let res = common::client()
        .get(gateway.url("/account/users//42?expand=true"))
        .header("authorization", "Bearer token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let echo: Value = res.json().await.unwrap();
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["uri"], "/users/42?expand=true");
    assert_eq!(echo["host"], backend.to_string());
    assert_eq!(echo["authorization"], "Bearer token");
    assert!(echo["forwarded_for"].is_null());

    gateway.stop().await;
}

#[tokio::test]
async fn bare_prefix_maps_to_root() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(test_config(vec![
        route("/account", backend).strip_prefix(true)
    ]))
    .await;

    let echo: Value = common::client()
        .get(gateway.url("/account"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo["uri"], "/");

    gateway.stop().await;
}

#[tokio::test]
async fn path_passes_through_without_strip() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(test_config(vec![route("/account", backend)])).await;

    let echo: Value = common::client()
        .get(gateway.url("/account/users"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo["uri"], "/account/users");

    gateway.stop().await;
}

#[tokio::test]
async fn longest_prefix_wins() {
    let short = common::start_mock_backend("short").await;
    let long = common::start_mock_backend("long").await;
    let gateway = common::start_gateway(test_config(vec![
        route("/api", short),
        route("/api/v2", long),
    ]))
    .await;
    let client = common::client();

    let body = client.get(gateway.url("/api/v2/items")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "long");
    let body = client.get(gateway.url("/api/v1/items")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "short");

    gateway.stop().await;
}

#[tokio::test]
async fn request_body_and_id_are_forwarded() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(test_config(vec![
        route("/account", backend).strip_prefix(true)
    ]))
    .await;

    let res = common::client()
        .post(gateway.url("/account/login"))
        .header("x-request-id", "req-123")
        .body(r#"{"user":"ada"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-123");

    let echo: Value = res.json().await.unwrap();
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["body"], r#"{"user":"ada"}"#);
    assert_eq!(echo["request_id"], "req-123");

    gateway.stop().await;
}

#[tokio::test]
async fn generated_request_id_reaches_upstream() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(test_config(vec![route("/", backend)])).await;

    let res = common::client().get(gateway.url("/x")).send().await.unwrap();
    let header = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let echo: Value = res.json().await.unwrap();
    assert_eq!(echo["request_id"], header);

    gateway.stop().await;
}

#[tokio::test]
async fn hop_by_hop_headers_are_dropped() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(test_config(vec![route("/", backend)])).await;

    let res = common::client()
        .get(gateway.url("/x"))
        .header("keep-alive", "timeout=99")
        .send()
        .await
        .unwrap();
    let echo: Value = res.json().await.unwrap();
    assert!(echo["keep_alive"].is_null());

    let plain = common::start_mock_backend("ok").await;
    let gateway2 = common::start_gateway(test_config(vec![route("/", plain)])).await;
    let res = common::client().get(gateway2.url("/")).send().await.unwrap();
    assert!(res.headers().get("keep-alive").is_none());

    gateway.stop().await;
    gateway2.stop().await;
}

#[tokio::test]
async fn xfwd_appends_forwarded_headers() {
    let backend = common::start_echo_backend().await;
    let mut config = test_config(vec![route("/", backend)]);
    config.forwarding.xfwd = true;
    let gateway = common::start_gateway(config).await;

    let echo: Value = common::client()
        .get(gateway.url("/x"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo["forwarded_for"], "127.0.0.1");

    gateway.stop().await;
}

#[tokio::test]
async fn refused_upstream_is_502() {
    let dead = common::unused_addr().await;
    let gateway = common::start_gateway(test_config(vec![route("/account", dead)])).await;

    let started = Instant::now();
    let res = common::client().get(gateway.url("/account/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(1));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Bad gateway");
    assert!(gateway.in_flight.is_empty());

    gateway.stop().await;
}

#[tokio::test]
async fn upstream_closing_before_head_is_502() {
    let backend = common::start_closing_backend().await;
    let gateway = common::start_gateway(test_config(vec![route("/", backend)])).await;

    let res = common::client().get(gateway.url("/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    gateway.stop().await;
}

#[tokio::test]
async fn first_byte_timeout_is_504() {
    let backend = common::start_stalled_backend(Duration::from_secs(5)).await;
    let mut config = test_config(vec![route("/slow", backend)]);
    config.timeouts.connect_ms = 200;
    config.timeouts.first_byte_ms = 300;
    let gateway = common::start_gateway(config).await;

    let started = Instant::now();
    let res = common::client().get(gateway.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Gateway timeout");

    gateway.stop().await;
}

#[tokio::test]
async fn first_byte_clock_starts_after_connect() {
    let backend = common::start_stalled_backend(Duration::from_secs(5)).await;
    let mut config = test_config(vec![route("/slow", backend)]);
    config.timeouts.connect_ms = 3_000;
    config.timeouts.first_byte_ms = 200;
    let gateway = common::start_gateway(config).await;

    let started = Instant::now();
    let res = common::client().get(gateway.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(1_500), "took {elapsed:?}");

    gateway.stop().await;
}

#[tokio::test]
async fn slow_upload_is_not_cut_by_first_byte_timeout() {
    let backend = common::start_echo_backend().await;
    let mut config = test_config(vec![route("/", backend)]);
    config.timeouts.connect_ms = 100;
    config.timeouts.first_byte_ms = 300;
    let gateway = common::start_gateway(config).await;

    let chunks = futures_util::stream::iter(0..10u8).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, std::io::Error>(Bytes::from(vec![b'a' + i; 1024]))
    });
    let res = common::client()
        .post(gateway.url("/upload"))
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let echo: Value = res.json().await.unwrap();
    let body = echo["body"].as_str().unwrap();
    assert_eq!(body.len(), 10 * 1024);
    assert!(body.starts_with('a') && body.ends_with('j'));

    gateway.stop().await;
}

#[tokio::test]
async fn large_upload_is_streamed() {
    const CHUNKS: usize = 256;
    const CHUNK_SIZE: usize = 64 * 1024;

    let backend = common::start_counting_backend().await;
    let gateway = common::start_gateway(test_config(vec![route("/", backend)])).await;

    let chunks = futures_util::stream::iter(0..CHUNKS)
        .map(|i| Ok::<_, std::io::Error>(Bytes::from(vec![(i % 256) as u8; CHUNK_SIZE])));
    let res = common::client()
        .put(gateway.url("/files/big"))
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), (CHUNKS * CHUNK_SIZE).to_string());

    gateway.stop().await;
}

#[tokio::test]
async fn upstream_closing_mid_body_terminates_response() {
    let backend = common::start_truncating_backend(100_000, 1_000).await;
    let gateway = common::start_gateway(test_config(vec![route("/", backend)])).await;

    let res = common::client().get(gateway.url("/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.is_err(), "truncated body was completed");

    tokio::time::timeout(Duration::from_secs(2), gateway.in_flight.wait_empty())
        .await
        .expect("context not released after truncated body");

    gateway.stop().await;
}

#[tokio::test]
async fn client_leaving_before_head_releases_context() {
    let backend = common::start_stalled_backend(Duration::from_secs(5)).await;
    let mut config = test_config(vec![route("/slow", backend)]);
    config.timeouts.first_byte_ms = 10_000;
    let gateway = common::start_gateway(config).await;

    let impatient = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let result = impatient.get(gateway.url("/slow")).send().await;
    assert!(result.is_err());

    tokio::time::timeout(Duration::from_secs(2), gateway.in_flight.wait_empty())
        .await
        .expect("context not released after client left");

    gateway.stop().await;
}

#[tokio::test]
async fn large_body_is_streamed() {
    const CHUNKS: usize = 256;
    const CHUNK_SIZE: usize = 64 * 1024;

    let backend = common::start_streaming_backend(CHUNKS, CHUNK_SIZE).await;
    let gateway = common::start_gateway(test_config(vec![route("/files", backend)])).await;

    let res = common::client().get(gateway.url("/files/big")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let mut stream = res.bytes_stream();
    let mut received = 0usize;
    let mut chunks_seen = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        for byte in chunk.iter() {
            assert_eq!(*byte as usize, (received / CHUNK_SIZE) % 256);
            received += 1;
        }
        chunks_seen += 1;
    }
    assert_eq!(received, CHUNKS * CHUNK_SIZE);
    assert!(chunks_seen > 1);

    // Give the body drop a moment to release the context.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(gateway.in_flight.is_empty());

    gateway.stop().await;
}

#[tokio::test]
async fn health_endpoints_report_ok() {
    let backend = common::start_mock_backend("from upstream").await;
    let gateway = common::start_gateway(test_config(vec![route("/", backend)])).await;
    let client = common::client();

    for path in ["/health", "/live", "/ready"] {
        let res = client.get(gateway.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "ok": true }));
    }

    // Other methods fall through to the route table.
    let res = client.post(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "from upstream");

    gateway.stop().await;
}

#[tokio::test]
async fn response_transform_rewrites_body() {
    let backend = common::start_mock_backend("quiet body").await;
    let config = test_config(vec![route("/", backend)]);
    let transform = Arc::new(|_: &Parts, body: Bytes| Bytes::from(body.to_ascii_uppercase()));
    let server = HttpServer::with_transform(config, transform).unwrap();
    let gateway = common::start_server(server).await;

    let res = common::client().get(gateway.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "QUIET BODY");

    gateway.stop().await;
}
