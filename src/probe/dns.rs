//! DNS probe implementation.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{FailureReason, ProbeContext, ProbeKind, Snapshot};

/// Name resolution errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("resolution failed: {0}")]
    NotFound(String),
    #[error("resolution timed out after {0:?}")]
    Timeout(Duration),
    #[error("resolver error: {0}")]
    Other(String),
}

/// Resolves host names to addresses.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, timeout: Duration) -> Result<IpAddr, ResolveError>;
}

/// Resolver backed by the operating system's `getaddrinfo`.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, timeout: Duration) -> Result<IpAddr, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let lookup = tokio::net::lookup_host((host, 0));
        let addrs = tokio::time::timeout(timeout, lookup)
            .await
            .map_err(|_| ResolveError::Timeout(timeout))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidInput => ResolveError::Other(e.to_string()),
                _ => ResolveError::NotFound(e.to_string()),
            })?;

        addrs
            .map(|sa| sa.ip())
            .next()
            .ok_or_else(|| ResolveError::NotFound(format!("no addresses found for {}", host)))
    }
}

/// Resolves the target name; pass/fail only.
pub struct DnsProbe {
    resolver: Arc<dyn Resolver>,
    address: Option<IpAddr>,
}

impl DnsProbe {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            address: None,
        }
    }
}

#[async_trait]
impl ProbeKind for DnsProbe {
    fn label(&self) -> &'static str {
        "DNS"
    }

    fn initialize(&mut self) {
        self.address = None;
    }

    async fn run_primary(&mut self, ctx: &ProbeContext<'_>) -> Result<(), FailureReason> {
        match self.resolver.resolve(ctx.target, ctx.timeout).await {
            Ok(ip) => {
                self.address = Some(ip);
                Ok(())
            }
            Err(ResolveError::NotFound(e)) => {
                tracing::debug!("DNS lookup of {} failed: {}", ctx.target, e);
                Err(FailureReason::ResolutionFailed)
            }
            Err(e) => {
                tracing::debug!("DNS lookup of {} errored: {}", ctx.target, e);
                Err(FailureReason::UnexpectedError)
            }
        }
    }

    fn stats(&self) -> Option<Snapshot> {
        None
    }

    fn describe(&self, ctx: &ProbeContext<'_>, failure: Option<FailureReason>) -> String {
        match (failure, self.address) {
            (None, Some(ip)) => format!("Successfully performed dns lookup of {} - {}", ctx.target, ip),
            (None, None) => format!("Successfully performed dns lookup of {}", ctx.target),
            (Some(reason), _) => format!(
                "Failed to perform dns lookup of {} - Failure reason: {}",
                ctx.target, reason
            ),
        }
    }
}
