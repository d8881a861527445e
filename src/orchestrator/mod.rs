//! Orchestrator module: runs every configured probe once, in order.
//!
//! Probes run strictly one after another. Each one reads its target's
//! history before running; its snapshot, if any, is appended afterwards.

mod registry;

pub use registry::*;

use crate::alert::AlertSink;
use crate::config::{MethodTests, TargetConfig};
use crate::history::HistoryStore;
use crate::probe::{Probe, ProbeError, ProbeMethod, ProbeOutcome, DEFAULT_PROBE_TIMEOUT};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Orchestrator error types.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("unknown probe method: {0}")]
    UnknownMethod(String),
    #[error("probe contract violated: {0}")]
    Contract(#[from] ProbeError),
}

/// The outcome of one configured target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub method: ProbeMethod,
    pub target: String,
    pub outcome: ProbeOutcome,
}

/// Summary of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub passed: usize,
    pub failed: usize,
    /// Targets not probed because their entry was malformed.
    pub skipped: usize,
    /// Snapshots appended to history.
    pub recorded: usize,
    pub outcomes: Vec<TargetOutcome>,
}

/// Runs configured probes and routes their results to history and alerts.
pub struct Orchestrator {
    registry: ProbeRegistry,
    alert_sink: Arc<dyn AlertSink>,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(registry: ProbeRegistry, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            registry,
            alert_sink,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every target of every method group once.
    ///
    /// Individual failures never abort the batch.
    pub async fn run_batch(&self, tests: &[MethodTests], history: &mut dyn HistoryStore) -> BatchReport {
        let mut report = BatchReport::default();

        for group in tests {
            let method = match self.registry.resolve(&group.method) {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!("Skipping {} target(s): {}", group.targets.len(), e);
                    report.skipped += group.targets.len();
                    continue;
                }
            };

            for target in &group.targets {
                match self.run_target(method, target, history).await {
                    Ok((outcome, recorded)) => {
                        if outcome.success {
                            report.passed += 1;
                        } else {
                            report.failed += 1;
                        }
                        if recorded {
                            report.recorded += 1;
                        }
                        report.outcomes.push(TargetOutcome {
                            method,
                            target: target.target_name.clone(),
                            outcome,
                        });
                    }
                    Err(e) => {
                        tracing::error!("Skipping {} target {}: {}", method, target.target_name, e);
                        report.skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            recorded = report.recorded,
            "Batch complete"
        );

        report
    }

    /// Probe one target. Returns its outcome and whether a snapshot was recorded.
    async fn run_target(
        &self,
        method: ProbeMethod,
        target: &TargetConfig,
        history: &mut dyn HistoryStore,
    ) -> Result<(ProbeOutcome, bool), OrchestratorError> {
        let name = target.target_name.as_str();
        let kind = self.registry.construct(method)?;

        tracing::info!(
            "Handling {} probe on target {} with parameters {:?}",
            method,
            name,
            target.parameters
        );

        let prior = match history.history_for(method, name) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!("Failed to load history for {} {}, probing without baseline: {}", method, name, e);
                Vec::new()
            }
        };

        let mut probe = Probe::new(name, target.parameters.clone(), &prior, kind).with_timeout(self.timeout);
        let success = probe.run().await;
        tracing::debug!("Probe result for {} = {} ({})", name, success, probe.state());

        let outcome = probe.outcome()?;

        if outcome.success {
            tracing::info!("{}", outcome.descriptive_message);
        } else {
            tracing::error!("{}", outcome.descriptive_message);
            match self.alert_sink.send_alert(&outcome.descriptive_message).await {
                Ok(()) => tracing::debug!("Sent alert for {}", name),
                Err(e) => tracing::error!("Failed to send alert for {}: {}", name, e),
            }
        }

        // Measured runs are kept even when they failed, so the next run
        // still has a baseline.
        let mut recorded = false;
        if let Some(snapshot) = outcome.stats {
            match history.record(method, name, snapshot) {
                Ok(()) => recorded = true,
                Err(e) => tracing::error!("Failed to record snapshot for {} {}: {}", method, name, e),
            }
        }

        Ok((outcome, recorded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::tests::MemoryAlertSink;
    use crate::config::AppConfig;
    use crate::history::{History, HistoryError};
    use crate::probe::fakes::{RoutedTransport, StaticResolver};
    use crate::probe::{FailureReason, HttpExchange, Snapshot, TransportError};

    fn exchange(status: u16, latency_ms: u64, body_len: u64) -> Result<HttpExchange, TransportError> {
        Ok(HttpExchange {
            status,
            latency: Duration::from_millis(latency_ms),
            body_len,
        })
    }

    fn orchestrator(
        transport: RoutedTransport,
        sink: Arc<MemoryAlertSink>,
    ) -> Orchestrator {
        let resolver = StaticResolver::new(&[("example.com", Ok("93.184.216.34".parse().unwrap()))]);
        let registry = ProbeRegistry::with_defaults(Arc::new(resolver), Arc::new(transport));
        Orchestrator::new(registry, sink)
    }

    fn tests_from(json: &str) -> Vec<MethodTests> {
        AppConfig::from_json(json).unwrap().tests
    }

    #[tokio::test]
    async fn test_bandwidth_regression_is_alerted_and_recorded() {
        let tests = tests_from(
            r#"{"tests": [{"method": "HTTP", "targets": [
                {"target_name": "http://example.com/", "parameters": {"bandwidth_threshold": 2.0}}
            ]}]}"#,
        );
        let mut history = History::default();
        history.push(ProbeMethod::Http, "http://example.com/", Snapshot { latency: 0.1, bandwidth: 10.0 });

        let sink = Arc::new(MemoryAlertSink::default());
        // 2500 bytes in 0.1 s = 25 KB/s
        let transport = RoutedTransport::new(vec![("http://example.com/", exchange(200, 100, 2500))]);
        let report = orchestrator(transport, sink.clone())
            .run_batch(&tests, &mut history)
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.recorded, 1);
        assert_eq!(
            report.outcomes[0].outcome.failure_reason,
            Some(FailureReason::BandwidthOverThreshold)
        );

        let alerts = sink.sent();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("bandwidth over threshold"));

        let snapshots = history.get(ProbeMethod::Http, "http://example.com/");
        assert_eq!(snapshots.len(), 2);
        assert!((snapshots[1].bandwidth - 25.0).abs() < 1e-9);
        assert!((snapshots[1].latency - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_first_run_has_no_baseline() {
        let tests = tests_from(
            r#"{"tests": [{"method": "HTTPS", "targets": [
                {"target_name": "https://example.com/", "parameters": {"latency_threshold": 0.01, "bandwidth_threshold": 0.01}}
            ]}]}"#,
        );
        let mut history = History::default();
        let sink = Arc::new(MemoryAlertSink::default());
        let transport = RoutedTransport::new(vec![("https://example.com/", exchange(200, 300, 900))]);

        let report = orchestrator(transport, sink.clone())
            .run_batch(&tests, &mut history)
            .await;

        assert_eq!(report.passed, 1);
        assert_eq!(report.recorded, 1);
        assert!(sink.sent().is_empty());
        assert_eq!(history.get(ProbeMethod::Https, "https://example.com/").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_method_is_skipped() {
        let tests = tests_from(
            r#"{"tests": [
                {"method": "ICMP", "targets": [{"target_name": "example.com"}, {"target_name": "example.org"}]},
                {"method": "DNS", "targets": [{"target_name": "example.com"}]}
            ]}"#,
        );
        let mut history = History::default();
        let sink = Arc::new(MemoryAlertSink::default());

        let report = orchestrator(RoutedTransport::new(vec![]), sink.clone())
            .run_batch(&tests, &mut history)
            .await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.recorded, 0);
        assert!(history.entries().is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let tests = tests_from(
            r#"{"tests": [
                {"method": "DNS", "targets": [{"target_name": "missing.example"}]},
                {"method": "HTTP", "targets": [
                    {"target_name": "http://example.com/down"},
                    {"target_name": "http://example.com/up"}
                ]}
            ]}"#,
        );
        let mut history = History::default();
        let sink = Arc::new(MemoryAlertSink::failing());
        let transport = RoutedTransport::new(vec![
            ("http://example.com/down", exchange(502, 50, 10)),
            ("http://example.com/up", exchange(200, 50, 500)),
        ]);

        let report = orchestrator(transport, sink.clone())
            .run_batch(&tests, &mut history)
            .await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.passed, 1);
        // Alert delivery failed for both, the batch carried on
        assert_eq!(sink.sent().len(), 2);
        assert!(sink.sent()[0].starts_with("Failed to perform dns lookup of missing.example"));

        // Bad status carries no measurement
        assert!(history.get(ProbeMethod::Http, "http://example.com/down").is_empty());
        assert_eq!(history.get(ProbeMethod::Http, "http://example.com/up").len(), 1);
    }

    /// Store whose reads fail but writes succeed.
    #[derive(Default)]
    struct UnreadableHistory {
        recorded: Vec<Snapshot>,
    }

    impl HistoryStore for UnreadableHistory {
        fn history_for(&self, _method: ProbeMethod, _target: &str) -> Result<Vec<Snapshot>, HistoryError> {
            Err(HistoryError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")))
        }

        fn record(&mut self, _method: ProbeMethod, _target: &str, snapshot: Snapshot) -> Result<(), HistoryError> {
            self.recorded.push(snapshot);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreadable_history_probes_without_baseline() {
        let tests = tests_from(
            r#"{"tests": [{"method": "HTTP", "targets": [
                {"target_name": "http://example.com/", "parameters": {"latency_threshold": 1.0}}
            ]}]}"#,
        );
        let mut history = UnreadableHistory::default();
        let sink = Arc::new(MemoryAlertSink::default());
        let transport = RoutedTransport::new(vec![("http://example.com/", exchange(200, 100, 100))]);

        let report = orchestrator(transport, sink)
            .run_batch(&tests, &mut history)
            .await;

        assert_eq!(report.passed, 1);
        assert_eq!(history.recorded.len(), 1);
    }
}
