//! HTTP(S) probe implementation.
//!
//! The primary check issues one GET and measures latency up to the response
//! headers and bandwidth over the body. The post-check compares that
//! measurement with the most recent snapshot in the target's history.

use async_trait::async_trait;
use reqwest::Url;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::{FailureReason, ProbeContext, ProbeKind, ProbeParameters, ResolveError, Resolver, Snapshot};

/// Statuses strictly above this are failures.
pub const HTTP_STATUS_ERROR_OFFSET: u16 = 400;

/// HTTP transport errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("name resolution failed: {0}")]
    Resolution(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
}

impl From<ResolveError> for TransportError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound(msg) => TransportError::Resolution(msg),
            ResolveError::Timeout(d) => TransportError::Timeout(d),
            ResolveError::Other(msg) => TransportError::Network(msg),
        }
    }
}

/// The observable result of one GET exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HttpExchange {
    pub status: u16,
    /// Time from dispatching the request to receiving the headers.
    pub latency: Duration,
    pub body_len: u64,
}

/// Performs a single GET.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpExchange, TransportError>;
}

/// Transport built on `reqwest`, resolving names through a [`Resolver`]
/// so that resolution failures can be told apart from connection failures.
pub struct ReqwestTransport {
    resolver: Arc<dyn Resolver>,
}

impl ReqwestTransport {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpExchange, TransportError> {
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::Network(format!("no host in {}", url)))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy();

        // Pin the address ourselves unless the host is already a literal
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if literal.parse::<IpAddr>().is_err() {
            let ip = self.resolver.resolve(host, timeout).await?;
            builder = builder.resolve(host, SocketAddr::new(ip, port));
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Network(e.to_string())
            }
        };

        let start = Instant::now();
        let response = client.get(url.clone()).send().await.map_err(classify)?;
        let latency = start.elapsed();

        let status = response.status().as_u16();

        // Error responses carry no measurement, so their body is never read
        let body_len = if status > HTTP_STATUS_ERROR_OFFSET {
            0
        } else {
            response.bytes().await.map_err(classify)?.len() as u64
        };

        Ok(HttpExchange {
            status,
            latency,
            body_len,
        })
    }
}

/// Plain or secure transport, picked from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Https,
}

impl TransportKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::Http => "HTTP",
            TransportKind::Https => "HTTPS",
        }
    }
}

/// Parse a target into a URL, defaulting the scheme when none is given.
pub fn parse_target(target: &str, default_kind: TransportKind) -> Result<(Url, TransportKind), String> {
    let raw = if has_scheme(target) {
        target.to_string()
    } else {
        match default_kind {
            TransportKind::Http => format!("http://{}", target),
            TransportKind::Https => format!("https://{}", target),
        }
    };

    let url = Url::parse(&raw).map_err(|e| format!("invalid url {}: {}", raw, e))?;
    let kind = match url.scheme() {
        "http" => TransportKind::Http,
        "https" => TransportKind::Https,
        other => return Err(format!("unsupported scheme {}", other)),
    };
    Ok((url, kind))
}

/// Whether the target starts with `scheme://`. A `://` later in the path or
/// query does not count.
fn has_scheme(target: &str) -> bool {
    match target.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Kilobytes per second for `bytes` read over `latency` seconds.
///
/// Zero when no time elapsed.
pub fn compute_bandwidth(bytes: u64, latency: f64) -> f64 {
    if latency > 0.0 {
        (bytes as f64 / latency) / 1000.0
    } else {
        0.0
    }
}

pub fn evaluate_status(status: u16) -> Result<(), FailureReason> {
    if status > HTTP_STATUS_ERROR_OFFSET {
        Err(FailureReason::BadStatus)
    } else {
        Ok(())
    }
}

/// Compare a measurement against the most recent snapshot.
///
/// Without history there is no baseline and nothing can regress. Latency is
/// checked before bandwidth.
pub fn check_regression(
    current: &Snapshot,
    history: &[Snapshot],
    parameters: &ProbeParameters,
) -> Result<(), FailureReason> {
    let Some(prev) = history.last() else {
        return Ok(());
    };

    if let Some(threshold) = parameters.latency_threshold {
        if current.latency > prev.latency * threshold {
            return Err(FailureReason::LatencyOverThreshold);
        }
    }

    if let Some(threshold) = parameters.bandwidth_threshold {
        if current.bandwidth > prev.bandwidth * threshold {
            return Err(FailureReason::BandwidthOverThreshold);
        }
    }

    Ok(())
}

/// GETs the target, checks its status, then checks for regression.
pub struct HttpProbe {
    transport: Arc<dyn HttpTransport>,
    default_kind: TransportKind,
    kind: Option<TransportKind>,
    status: Option<u16>,
    snapshot: Option<Snapshot>,
    post_check_failed: bool,
}

impl HttpProbe {
    /// `default_kind` applies to targets written without a scheme.
    pub fn new(transport: Arc<dyn HttpTransport>, default_kind: TransportKind) -> Self {
        Self {
            transport,
            default_kind,
            kind: None,
            status: None,
            snapshot: None,
            post_check_failed: false,
        }
    }
}

#[async_trait]
impl ProbeKind for HttpProbe {
    fn label(&self) -> &'static str {
        self.kind.unwrap_or(self.default_kind).label()
    }

    fn initialize(&mut self) {
        self.kind = None;
        self.status = None;
        self.snapshot = None;
        self.post_check_failed = false;
    }

    async fn run_primary(&mut self, ctx: &ProbeContext<'_>) -> Result<(), FailureReason> {
        let (url, kind) = parse_target(ctx.target, self.default_kind).map_err(|e| {
            tracing::debug!("Cannot probe {}: {}", ctx.target, e);
            FailureReason::UnexpectedError
        })?;
        self.kind = Some(kind);

        let exchange = match self.transport.get(&url, ctx.timeout).await {
            Ok(exchange) => exchange,
            Err(TransportError::Resolution(e)) => {
                tracing::debug!("Resolution of {} failed: {}", ctx.target, e);
                return Err(FailureReason::ResolutionFailed);
            }
            Err(e) => {
                tracing::debug!("Request to {} failed: {}", ctx.target, e);
                return Err(FailureReason::UnexpectedError);
            }
        };

        self.status = Some(exchange.status);
        evaluate_status(exchange.status)?;

        let latency = exchange.latency.as_secs_f64();
        self.snapshot = Some(Snapshot {
            latency,
            bandwidth: compute_bandwidth(exchange.body_len, latency),
        });
        Ok(())
    }

    fn run_post_check(&mut self, ctx: &ProbeContext<'_>) -> Result<(), FailureReason> {
        let Some(current) = self.snapshot else {
            return Ok(());
        };

        let result = check_regression(&current, ctx.history, ctx.parameters);
        self.post_check_failed = result.is_err();
        result
    }

    fn stats(&self) -> Option<Snapshot> {
        self.snapshot
    }

    fn describe(&self, ctx: &ProbeContext<'_>, failure: Option<FailureReason>) -> String {
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        match failure {
            None => {
                let snap = self.snapshot.unwrap_or(Snapshot { latency: 0.0, bandwidth: 0.0 });
                format!(
                    "Successfully connected to {} over {} - (Response status: {}, bandwidth: {:.3} KB/s, latency: {:.3} s)",
                    ctx.target,
                    self.label(),
                    status,
                    snap.bandwidth,
                    snap.latency
                )
            }
            Some(reason) => {
                let mut msg = format!(
                    "Failed to connect to {} over {} - Failure reason: {} (Response status: {})",
                    ctx.target,
                    self.label(),
                    reason,
                    status
                );
                if let (true, Some(snap)) = (self.post_check_failed, self.snapshot) {
                    msg.push_str(&format!(
                        " - measured bandwidth: {:.3} KB/s, latency: {:.3} s",
                        snap.bandwidth, snap.latency
                    ));
                }
                msg
            }
        }
    }
}
