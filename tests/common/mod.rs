//! Shared utilities for integration tests: mock upstreams and a gateway
//! harness. Everything binds to 127.0.0.1:0.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Uri};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use mini_gateway::config::{GatewayConfig, RouteConfig};
use mini_gateway::lifecycle::{InFlightSet, Lifecycle, LifecycleState};
use mini_gateway::net::ListenerError;
use mini_gateway::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub lifecycle: Lifecycle,
    pub in_flight: Arc<InFlightSet>,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task; returns how long it took.
    pub async fn stop(self) -> Duration {
        let started = Instant::now();
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("gateway did not stop")
            .expect("server task panicked")
            .expect("server failed");
        started.elapsed()
    }
}

/// Config with short timeouts suitable for tests.
pub fn test_config(routes: Vec<RouteConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.routes = routes;
    config.timeouts.connect_ms = 1_000;
    config.timeouts.first_byte_ms = 2_000;
    config.timeouts.idle_ms = 5_000;
    config.lifecycle.drain_deadline_ms = 2_000;
    config
}

pub fn route(prefix: &str, upstream: SocketAddr) -> RouteConfig {
    RouteConfig::new(prefix, format!("http://{upstream}"))
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    start_server(HttpServer::new(config).expect("invalid test config")).await
}

pub async fn start_server(server: HttpServer) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let lifecycle = server.lifecycle();
    let in_flight = server.in_flight();

    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    tokio::time::timeout(Duration::from_secs(5), lifecycle.reached(LifecycleState::Accepting))
        .await
        .expect("gateway never started accepting");

    TestGateway {
        addr,
        shutdown,
        lifecycle,
        in_flight,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable raw-TCP backend. Each connection reads one request
/// head and answers with the status and body returned by `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\nKeep-Alive: timeout=5\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Backend that reads the request head and then waits `delay` before
/// answering `200 late`.
pub async fn start_stalled_backend(delay: Duration) -> SocketAddr {
    start_programmable_backend(move || async move {
        tokio::time::sleep(delay).await;
        (200, "late".to_string())
    })
    .await
}

/// Backend that closes every connection after reading the request head.
pub async fn start_closing_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Backend that announces `declared` body bytes, sends only `sent`, then
/// closes the connection.
pub async fn start_truncating_backend(declared: usize, sent: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n");
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&vec![b'x'; sent]).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// An address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// Axum backend that describes the request it received as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> axum::Json<serde_json::Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        axum::Json(serde_json::json!({
            "method": method.as_str(),
            "uri": uri.to_string(),
            "host": header("host"),
            "request_id": header("x-request-id"),
            "forwarded_for": header("x-forwarded-for"),
            "connection": header("connection"),
            "keep_alive": header("keep-alive"),
            "authorization": header("authorization"),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    serve_axum(Router::new().fallback(echo)).await
}

/// Axum backend streaming `chunks` chunks of `chunk_size` bytes each.
pub async fn start_streaming_backend(chunks: usize, chunk_size: usize) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        let stream = futures_util::stream::iter(0..chunks).map(move |i| {
            Ok::<_, std::io::Error>(Bytes::from(vec![(i % 256) as u8; chunk_size]))
        });
        Body::from_stream(stream)
    });
    serve_axum(app).await
}

/// Axum backend that reads the request body as a stream and answers with
/// the number of bytes it received.
pub async fn start_counting_backend() -> SocketAddr {
    async fn count(body: Body) -> String {
        let mut stream = body.into_data_stream();
        let mut total = 0usize;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => total += chunk.len(),
                Err(_) => break,
            }
        }
        total.to_string()
    }

    serve_axum(Router::new().fallback(count)).await
}

async fn serve_axum(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// WebSocket backend echoing every text and binary message.
pub async fn start_ws_echo_backend() -> SocketAddr {
    use tokio_tungstenite::tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });
    addr
}
