//! Shared utilities for integration testing: mock backends and a proxy harness.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as WsResponse};
use tokio_tungstenite::tungstenite::http::HeaderValue;

use upgrade_proxy::tunnel::SessionTracker;
use upgrade_proxy::{HttpServer, ProxyConfig, Shutdown};

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub sessions: SessionTracker,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait until every tunnel session has closed.
    pub async fn wait_for_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.sessions.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("tunnel sessions did not close");
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a proxy in front of `backend_url`.
pub async fn start_proxy(backend_url: &str) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.backend.url = backend_url.to_string();
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;

    let server = HttpServer::new(config).expect("proxy config should be valid");
    let sessions = server.sessions();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    TestProxy {
        addr,
        sessions,
        shutdown,
    }
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start an HTTP backend describing each request it receives.
///
/// `/missing` answers 404; everything else answers 200 with
/// `method`, `uri`, `host`, `x-forwarded-for` and the body, one per line.
pub async fn start_http_backend() -> SocketAddr {
    async fn describe(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
        if uri.path().ends_with("/missing") {
            return (StatusCode::NOT_FOUND, "not here").into_response();
        }
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        let text = format!(
            "method={method}\nuri={uri}\nhost={}\nx-forwarded-for={}\nbody={}",
            get(header::HOST.as_str()),
            get("x-forwarded-for"),
            String::from_utf8_lossy(&body)
        );
        (StatusCode::OK, [("x-backend", "mock")], text).into_response()
    }

    let app = Router::new()
        .route("/", any(describe))
        .route("/{*path}", any(describe));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Request targets seen by a WebSocket backend.
pub type SeenPaths = Arc<Mutex<Vec<String>>>;

/// Start a WebSocket echo backend.
///
/// When the client offers subprotocols the backend picks the last one.
pub async fn start_ws_echo_backend() -> (SocketAddr, SeenPaths) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenPaths = Arc::default();

    let record = Arc::clone(&seen);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let record = Arc::clone(&record);
            tokio::spawn(async move {
                let callback = |req: &Request, mut resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
                    record.lock().unwrap().push(req.uri().to_string());
                    let chosen = req
                        .headers()
                        .get("sec-websocket-protocol")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|offered| offered.split(',').last())
                        .map(|p| p.trim().to_string());
                    if let Some(protocol) = chosen {
                        resp.headers_mut().insert(
                            "sec-websocket-protocol",
                            HeaderValue::from_str(&protocol).unwrap(),
                        );
                    }
                    Ok(resp)
                };

                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    (addr, seen)
}

/// Start a raw backend that answers every upgrade with `101`, sends
/// `greeting` in the same write, then echoes bytes until the peer closes.
pub async fn start_raw_echo_backend(greeting: &'static [u8]) -> SocketAddr {
    let mut reply = b"HTTP/1.1 101 Switching Protocols\r\n\
                      Upgrade: websocket\r\n\
                      Connection: Upgrade\r\n\
                      Sec-WebSocket-Accept: raw-accept\r\n\r\n"
        .to_vec();
    reply.extend_from_slice(greeting);
    start_upgrade_backend(reply).await
}

/// Start a raw backend that writes `reply` to every upgrade request, then
/// echoes bytes until the peer closes.
pub async fn start_upgrade_backend(reply: Vec<u8>) -> SocketAddr {
    let reply = Arc::new(reply);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = Arc::clone(&reply);
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_none() {
                    return;
                }
                if socket.write_all(&reply).await.is_err() {
                    return;
                }
                let (mut read, mut write) = socket.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });
    addr
}

/// Start a backend that accepts the upgrade, sends `farewell`, then closes.
pub async fn start_closing_backend(farewell: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_none() {
                    return;
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n")
                    .await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = socket.write_all(farewell).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that answers every upgrade with `response` and closes.
pub async fn start_rejecting_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_none() {
                    return;
                }
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that answers the first bytes of any connection with a
/// plaintext HTTP error, whatever protocol the peer speaks.
pub async fn start_plaintext_responder() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut chunk = [0u8; 1024];
                let _ = socket.read(&mut chunk).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Read up to the end of an HTTP head. Returns the head and any bytes after it.
pub async fn read_head(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = buf[pos + 4..].to_vec();
            buf.truncate(pos + 4);
            return Some((String::from_utf8_lossy(&buf).into_owned(), rest));
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Send a hand-written upgrade request and read the response head.
pub async fn raw_upgrade(proxy: SocketAddr, path: &str) -> (TcpStream, String, Vec<u8>) {
    let mut socket = TcpStream::connect(proxy).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {proxy}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    socket.write_all(request.as_bytes()).await.unwrap();
    let (head, rest) = tokio::time::timeout(Duration::from_secs(5), read_head(&mut socket))
        .await
        .expect("proxy did not answer the upgrade")
        .expect("proxy closed before answering");
    (socket, head, rest)
}
