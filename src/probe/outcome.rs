//! Value types shared by all probe kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The probe methods a configuration entry can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Dns,
    Http,
    Https,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Dns => "DNS",
            ProbeMethod::Http => "HTTP",
            ProbeMethod::Https => "HTTPS",
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DNS" => Ok(ProbeMethod::Dns),
            "HTTP" => Ok(ProbeMethod::Http),
            "HTTPS" => Ok(ProbeMethod::Https),
            other => Err(other.to_string()),
        }
    }
}

/// One recorded measurement for a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds between dispatching the request and receiving the headers.
    pub latency: f64,
    /// Kilobytes per second.
    pub bandwidth: f64,
}

/// Why a probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    ResolutionFailed,
    BadStatus,
    LatencyOverThreshold,
    BandwidthOverThreshold,
    UnexpectedError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::ResolutionFailed => "dns resolution failed",
            FailureReason::BadStatus => "bad http status",
            FailureReason::LatencyOverThreshold => "latency over threshold",
            FailureReason::BandwidthOverThreshold => "bandwidth over threshold",
            FailureReason::UnexpectedError => "unexpected error",
        };
        f.write_str(s)
    }
}

/// The final verdict of a probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    pub descriptive_message: String,
    /// Present whenever a measurement was taken, pass or fail.
    pub stats: Option<Snapshot>,
}

impl ProbeOutcome {
    pub fn new(failure: Option<FailureReason>, descriptive_message: String, stats: Option<Snapshot>) -> Self {
        Self {
            success: failure.is_none(),
            failure_reason: failure,
            descriptive_message,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("DNS".parse::<ProbeMethod>(), Ok(ProbeMethod::Dns));
        assert_eq!("HTTPS".parse::<ProbeMethod>(), Ok(ProbeMethod::Https));
        assert_eq!("ICMP".parse::<ProbeMethod>(), Err("ICMP".to_string()));
        // Method names are case sensitive, like the configuration keys
        assert!("http".parse::<ProbeMethod>().is_err());
    }

    #[test]
    fn test_successful_outcome_has_no_reason() {
        let outcome = ProbeOutcome::new(None, "ok".to_string(), None);
        assert!(outcome.success);
        assert!(outcome.failure_reason.is_none());

        let failed = ProbeOutcome::new(
            Some(FailureReason::LatencyOverThreshold),
            "slow".to_string(),
            Some(Snapshot { latency: 0.5, bandwidth: 1.0 }),
        );
        assert!(!failed.success);
        assert!(failed.stats.is_some());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snap = Snapshot { latency: 0.25, bandwidth: 4.0 };
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"{"latency":0.25,"bandwidth":4.0}"#);
    }
}
