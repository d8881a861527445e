//! In-memory stand-ins for the network seams, used by tests.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::{HttpExchange, HttpTransport, ResolveError, Resolver, TransportError};

/// Resolver answering from a fixed table; unknown names are not found.
pub struct StaticResolver {
    answers: HashMap<String, Result<IpAddr, ResolveError>>,
}

impl StaticResolver {
    pub fn new(entries: &[(&str, Result<IpAddr, ResolveError>)]) -> Self {
        Self {
            answers: entries
                .iter()
                .map(|(host, answer)| (host.to_string(), answer.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, _timeout: Duration) -> Result<IpAddr, ResolveError> {
        self.answers
            .get(host)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::NotFound(host.to_string())))
    }
}

/// Transport returning the same result for every request.
pub struct FixedTransport {
    result: Result<HttpExchange, TransportError>,
    requested: Mutex<Vec<String>>,
}

impl FixedTransport {
    pub fn new(result: Result<HttpExchange, TransportError>) -> Self {
        Self {
            result,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FixedTransport {
    async fn get(&self, url: &Url, _timeout: Duration) -> Result<HttpExchange, TransportError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.result.clone()
    }
}

/// Transport answering per URL, for batches with several targets.
pub struct RoutedTransport {
    routes: HashMap<String, Result<HttpExchange, TransportError>>,
}

impl RoutedTransport {
    pub fn new(routes: Vec<(&str, Result<HttpExchange, TransportError>)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(url, result)| (url.to_string(), result))
                .collect(),
        }
    }
}

#[async_trait]
impl HttpTransport for RoutedTransport {
    async fn get(&self, url: &Url, _timeout: Duration) -> Result<HttpExchange, TransportError> {
        self.routes
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Network(format!("no route for {}", url))))
    }
}

/// Serve a single canned HTTP/1.1 response on a loopback port.
pub async fn serve_once(status_line: &str, body: &str) -> SocketAddr {
    serve_raw(format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    ))
    .await
}

/// Write `response` verbatim to the first connection, then close it.
pub async fn serve_raw(response: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                // Drain any request body before answering
                let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    break;
                }
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    addr
}
