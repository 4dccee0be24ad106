//! Poll cycle orchestration and bounded-failure tolerance.
//!
//! One invocation: fresh token → authenticated GET → parse the
//! rate-limit header → publish one gauge observation per rate. Any
//! failure is logged, counted and swallowed until the consecutive
//! failure ceiling is reached; the failure after that escalates as a
//! fatal error and takes the daemon down.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use crate::auth::{TokenError, TokenProvider};
use crate::azure::{ProbeError, RateLimitSnapshot, ResourceProbe};
use crate::metrics::RateMetrics;

/// Consecutive failures tolerated before the next one becomes fatal.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 2;

// ── Errors ──────────────────────────────────────────────────────────

/// Everything that can sink one cycle. The variants keep the causes
/// apart in logs; escalation only ever looks at the count.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("token acquisition failed: {0}")]
    Token(#[from] TokenError),
    #[error("rate-limit retrieval failed: {0}")]
    Probe(#[from] ProbeError),
}

/// Fatal: the failure ceiling was already reached when this cycle
/// failed. Carries the cycle error that tipped it over.
#[derive(Debug, Error)]
#[error("unable to get rates after {failures} consecutive failures")]
pub struct EscalationError {
    pub failures: u32,
    #[source]
    pub source: CycleError,
}

// ── Failure state machine ───────────────────────────────────────────

/// Health of the poller as seen by the failure tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    /// At or under the ceiling, failures are tolerated.
    Healthy,
    /// Past the ceiling, every failing cycle escalates.
    Escalating,
}

/// Outcome of recording one failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Under the ceiling: log a warning and wait for the next cycle.
    Tolerated { consecutive: u32 },
    /// Ceiling already reached: this failure is fatal.
    Escalate { consecutive: u32 },
}

/// Explicit bookkeeping for consecutive failures.
///
/// A successful cycle resets the streak to zero ("consecutive" is meant
/// literally). Escalation does not clear the count: once past the
/// ceiling, every further failing invocation escalates too.
#[derive(Debug)]
pub struct FailureTracker {
    consecutive: u32,
    ceiling: u32,
}

impl FailureTracker {
    pub fn new(ceiling: u32) -> Self {
        Self {
            consecutive: 0,
            ceiling,
        }
    }

    pub fn state(&self) -> FailureState {
        if self.consecutive > self.ceiling {
            FailureState::Escalating
        } else {
            FailureState::Healthy
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// A successful cycle closes any failure streak.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failed cycle. Escalates when the streak had already
    /// reached the ceiling before this failure: with a ceiling of 2,
    /// the first two consecutive failures are tolerated and the third
    /// is fatal.
    pub fn record_failure(&mut self) -> Verdict {
        let escalate = self.consecutive >= self.ceiling;
        self.consecutive += 1;
        if escalate {
            Verdict::Escalate {
                consecutive: self.consecutive,
            }
        } else {
            Verdict::Tolerated {
                consecutive: self.consecutive,
            }
        }
    }
}

// ── Poller ──────────────────────────────────────────────────────────

/// Drives the poll-parse-publish-recover cycle for one subscription.
///
/// Owns the probe (target URL + HTTP client) and the failure streak.
/// `run` takes `&mut self`: one instance cannot be invoked
/// concurrently, the scheduler serializes cycles by construction.
pub struct Poller {
    probe: ResourceProbe,
    tokens: Arc<dyn TokenProvider>,
    metrics: Arc<dyn RateMetrics>,
    failures: FailureTracker,
}

impl Poller {
    pub fn new(
        probe: ResourceProbe,
        tokens: Arc<dyn TokenProvider>,
        metrics: Arc<dyn RateMetrics>,
    ) -> Self {
        Self {
            probe,
            tokens,
            metrics,
            failures: FailureTracker::new(MAX_CONSECUTIVE_FAILURES),
        }
    }

    /// Run one poll cycle. `Ok` covers both success and tolerated
    /// failure; `Err` means the ceiling was passed and the caller
    /// should stop scheduling this poller.
    pub async fn run(&mut self) -> Result<(), EscalationError> {
        debug!(
            url = %self.probe.url(),
            consecutive = self.failures.consecutive(),
            "poll cycle"
        );

        match self.fetch_rate_limits().await {
            Ok(snapshot) => {
                for (rate, remaining) in &snapshot {
                    self.metrics.set_remaining(rate, *remaining);
                }
                self.failures.record_success();
                Ok(())
            }
            Err(err) => {
                self.metrics.inc_failures();
                match self.failures.record_failure() {
                    Verdict::Tolerated { consecutive } => {
                        warn!(
                            consecutive,
                            state = ?self.failures.state(),
                            "unable to get rates, waiting for the next cycle: {err}"
                        );
                        Ok(())
                    }
                    Verdict::Escalate { consecutive } => Err(EscalationError {
                        failures: consecutive,
                        source: err,
                    }),
                }
            }
        }
    }

    async fn fetch_rate_limits(&self) -> Result<RateLimitSnapshot, CycleError> {
        let token = self.tokens.fetch_token().await?;
        let snapshot = self.probe.fetch(&token).await?;
        Ok(snapshot)
    }
}

/// Drive the poller on a fixed cadence. The first cycle runs
/// immediately; an escalation propagates out and ends the loop.
pub async fn run_poller(mut poller: Poller, interval_secs: u64) -> Result<(), EscalationError> {
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        poller.run().await?;
    }
}
