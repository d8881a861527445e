//! Probe module for network monitoring.
//!
//! Every probe kind shares one lifecycle: `initialize`, a primary check that
//! decides reachability, an optional post-check that can only downgrade a
//! passing primary check, then result accessors. Supports DNS and HTTP(S).

mod dns;
#[cfg(test)]
pub(crate) mod fakes;
mod http;
mod outcome;

pub use dns::*;
pub use http::*;
pub use outcome::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bound applied to every network operation of a probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe contract violations.
///
/// These are programming errors, distinct from a probe failing.
#[derive(Error, Debug, PartialEq)]
pub enum ProbeError {
    #[error("probe for {target} has not finished running (state: {state})")]
    NotRun { target: String, state: ProbeState },
}

/// Named parameters attached to a configured target.
///
/// Only the thresholds are interpreted; any other keys are carried along.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeParameters {
    /// Maximum allowed ratio of current latency to the previous snapshot's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_threshold: Option<f64>,
    /// Maximum allowed ratio of current bandwidth to the previous snapshot's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_threshold: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle states of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Initialized,
    PrimaryCheckDone,
    PostCheckDone,
    Finalized,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeState::Initialized => "initialized",
            ProbeState::PrimaryCheckDone => "primary check done",
            ProbeState::PostCheckDone => "post-check done",
            ProbeState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// What a probe kind sees of the probe it runs for.
#[derive(Debug, Clone, Copy)]
pub struct ProbeContext<'a> {
    pub target: &'a str,
    pub parameters: &'a ProbeParameters,
    /// Prior snapshots for this target, oldest first.
    pub history: &'a [Snapshot],
    pub timeout: Duration,
}

/// Behaviour of one probe kind.
#[async_trait]
pub trait ProbeKind: Send {
    /// Transport label used in messages, e.g. "DNS" or "HTTPS".
    fn label(&self) -> &'static str;

    /// Reset all per-run state.
    fn initialize(&mut self);

    /// The check that decides reachability or correctness.
    async fn run_primary(&mut self, ctx: &ProbeContext<'_>) -> Result<(), FailureReason>;

    /// Secondary validation, only run after a passing primary check.
    fn run_post_check(&mut self, _ctx: &ProbeContext<'_>) -> Result<(), FailureReason> {
        Ok(())
    }

    /// The measurement taken during the last run, if any.
    fn stats(&self) -> Option<Snapshot>;

    /// Human-readable summary of the last run.
    fn describe(&self, ctx: &ProbeContext<'_>, failure: Option<FailureReason>) -> String;
}

/// A single probe against one target, driving a [`ProbeKind`] through the
/// lifecycle.
pub struct Probe<'h> {
    target: String,
    parameters: ProbeParameters,
    history: &'h [Snapshot],
    timeout: Duration,
    kind: Box<dyn ProbeKind>,
    state: ProbeState,
    failure: Option<FailureReason>,
}

impl<'h> Probe<'h> {
    /// Create a probe and initialize its kind.
    pub fn new(
        target: &str,
        parameters: ProbeParameters,
        history: &'h [Snapshot],
        mut kind: Box<dyn ProbeKind>,
    ) -> Self {
        kind.initialize();
        Self {
            target: target.to_string(),
            parameters,
            history,
            timeout: DEFAULT_PROBE_TIMEOUT,
            kind,
            state: ProbeState::Initialized,
            failure: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Run the primary check and, if it passed, the post-check.
    ///
    /// Returns the final verdict. Running a finalized probe again starts
    /// over from a fresh `initialize`.
    pub async fn run(&mut self) -> bool {
        if self.state != ProbeState::Initialized {
            self.kind.initialize();
            self.failure = None;
            self.state = ProbeState::Initialized;
        }

        let ctx = ProbeContext {
            target: &self.target,
            parameters: &self.parameters,
            history: self.history,
            timeout: self.timeout,
        };

        self.failure = self.kind.run_primary(&ctx).await.err();
        self.state = ProbeState::PrimaryCheckDone;

        if self.failure.is_none() {
            self.failure = self.kind.run_post_check(&ctx).err();
            self.state = ProbeState::PostCheckDone;
        }

        self.state = ProbeState::Finalized;
        self.failure.is_none()
    }

    fn ensure_finalized(&self) -> Result<(), ProbeError> {
        if self.state == ProbeState::Finalized {
            Ok(())
        } else {
            Err(ProbeError::NotRun {
                target: self.target.clone(),
                state: self.state,
            })
        }
    }

    fn context(&self) -> ProbeContext<'_> {
        ProbeContext {
            target: &self.target,
            parameters: &self.parameters,
            history: self.history,
            timeout: self.timeout,
        }
    }

    pub fn failure_reason(&self) -> Result<Option<FailureReason>, ProbeError> {
        self.ensure_finalized()?;
        Ok(self.failure)
    }

    pub fn stats(&self) -> Result<Option<Snapshot>, ProbeError> {
        self.ensure_finalized()?;
        Ok(self.kind.stats())
    }

    pub fn descriptive_message(&self) -> Result<String, ProbeError> {
        self.ensure_finalized()?;
        Ok(self.kind.describe(&self.context(), self.failure))
    }

    /// Collect the verdict, message and measurement of the last run.
    pub fn outcome(&self) -> Result<ProbeOutcome, ProbeError> {
        Ok(ProbeOutcome::new(
            self.failure_reason()?,
            self.descriptive_message()?,
            self.stats()?,
        ))
    }
}
