//! probewatch - Network probe runner
//!
//! Probes DNS names and HTTP(S) endpoints once per invocation, alerts on
//! failures and on latency or bandwidth regressions against each target's
//! recorded history.

mod alert;
mod config;
mod history;
mod orchestrator;
mod probe;

use alert::{AlertSink, LogAlertSink, WebhookAlertSink};
use config::{AppConfig, HistoryBackend};
use history::{HistoryStore, JsonHistoryStore, SqliteHistoryStore};
use orchestrator::{Orchestrator, ProbeRegistry};
use probe::{ReqwestTransport, SystemResolver};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("probewatch=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 1 {
        tracing::error!("usage: probewatch <config_file.json>");
        std::process::exit(1);
    }

    // Load configuration
    let cfg = AppConfig::load(&args[0])?;
    tracing::debug!("Configuration file {} loaded", args[0]);
    tracing::info!(
        "Using {:?} history at {}",
        cfg.general.history_backend,
        cfg.general.history_file
    );

    let retention = cfg.general.history_retention;
    let mut history: Box<dyn HistoryStore> = match cfg.general.history_backend {
        HistoryBackend::Json => Box::new(JsonHistoryStore::load(&cfg.general.history_file, retention)?),
        HistoryBackend::Sqlite => Box::new(SqliteHistoryStore::open(&cfg.general.history_file, retention)?),
    };

    let alert_sink: Arc<dyn AlertSink> = match &cfg.general.alert_webhook_url {
        Some(url) => {
            tracing::info!("Sending alerts to webhook {}", url);
            Arc::new(WebhookAlertSink::new(
                url,
                cfg.general.alert_recipients.clone(),
                cfg.probe_timeout(),
            )?)
        }
        None => Arc::new(LogAlertSink),
    };

    let resolver = Arc::new(SystemResolver);
    let transport = Arc::new(ReqwestTransport::new(resolver.clone()));
    let registry = ProbeRegistry::with_defaults(resolver, transport);
    let orchestrator = Orchestrator::new(registry, alert_sink).with_timeout(cfg.probe_timeout());

    let report = orchestrator.run_batch(&cfg.tests, history.as_mut()).await;

    history.flush()?;

    if report.failed > 0 {
        tracing::warn!("{} probe(s) failed", report.failed);
    }

    Ok(())
}
