//! Execution of RQNT signals (advanced audio package)
//!
//! [`SignalExecutor::prepare`] validates the `S:` list and leases every media
//! resource the signals need up front, so exhaustion is reported on the RQNT
//! itself. [`PreparedSignals::run`] then plays them in order and reports the
//! outcome as `AU/oc` or `AU/of` observed events. Leases go back to their
//! pools when the run finishes or is cancelled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rvoip_mgcp_core::{EventName, ObservedEvent, SignalRequest};
use tracing::{debug, warn};

use crate::errors::{GatewayError, Result};
use crate::media::{DtmfDetector, Player, Recorder};
use crate::packages::{PackageRegistry, SignalSpec};
use crate::pool::{Lease, MediaPools, ResourcePool};

/// Operation completed successfully
const RC_SUCCESS: u16 = 100;
/// Unspecified failure
const RC_FAILURE: u16 = 300;
/// No digits were entered
const RC_NO_DIGITS: u16 = 326;

fn operation_complete(parameters: String) -> ObservedEvent {
    ObservedEvent::with_parameters(EventName::new("AU", "oc"), parameters)
}

fn operation_failed(code: u16) -> ObservedEvent {
    ObservedEvent::with_parameters(EventName::new("AU", "of"), format!("rc={}", code))
}

/// Validates signals and leases the resources they use
#[derive(Debug, Clone)]
pub struct SignalExecutor {
    packages: PackageRegistry,
    pools: MediaPools,
}

struct PreparedSignal {
    spec: SignalSpec,
    player: Option<Lease<dyn Player>>,
    recorder: Option<Lease<dyn Recorder>>,
    detector: Option<Lease<dyn DtmfDetector>>,
}

/// Signals ready to run, holding their media resources
pub struct PreparedSignals {
    steps: Vec<PreparedSignal>,
}

fn lease<T: ?Sized>(pool: &Arc<ResourcePool<T>>) -> Result<Lease<T>> {
    pool.lease()
        .ok_or_else(|| GatewayError::resource_unavailable(pool.name().to_string()))
}

impl SignalExecutor {
    pub fn new(packages: PackageRegistry, pools: MediaPools) -> Self {
        Self { packages, pools }
    }

    /// Validate `signals` and lease their resources
    ///
    /// Returns `None` when nothing needs to run (empty list or only `AU/es`).
    pub fn prepare(&self, signals: &[SignalRequest]) -> Result<Option<PreparedSignals>> {
        let mut steps = Vec::new();
        for request in signals {
            let spec = self.packages.signal_spec(request)?;
            let (player, recorder, detector) = match &spec {
                SignalSpec::EndSignal => continue,
                SignalSpec::PlayAnnouncement { .. } => (true, false, false),
                SignalSpec::PlayCollect { prompt, .. } => (prompt.is_some(), false, true),
                SignalSpec::PlayRecord { prompt, .. } => (prompt.is_some(), true, false),
            };
            steps.push(PreparedSignal {
                player: player.then(|| lease(&self.pools.players)).transpose()?,
                recorder: recorder.then(|| lease(&self.pools.recorders)).transpose()?,
                detector: detector.then(|| lease(&self.pools.dtmf_detectors)).transpose()?,
                spec,
            });
        }

        if steps.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PreparedSignals { steps }))
        }
    }
}

impl PreparedSignals {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every signal in order, stopping at the first failure
    pub async fn run(self) -> Vec<ObservedEvent> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            let outcome = step.run().await;
            let failed = outcome.event.name.eq_ignore_ascii_case("of");
            outcomes.push(outcome);
            if failed {
                break;
            }
        }
        outcomes
    }
}

impl fmt::Debug for PreparedSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specs: Vec<&SignalSpec> = self.steps.iter().map(|s| &s.spec).collect();
        f.debug_struct("PreparedSignals").field("steps", &specs).finish()
    }
}

impl PreparedSignal {
    async fn run(self) -> ObservedEvent {
        let outcome = match &self.spec {
            SignalSpec::PlayAnnouncement { uri, iterations } => self.play(uri, *iterations).await.map(|_| {
                operation_complete(format!("rc={}", RC_SUCCESS))
            }),
            SignalSpec::PlayCollect {
                prompt,
                max_digits,
                first_digit_timeout,
            } => self.collect(prompt.as_deref(), *max_digits, *first_digit_timeout).await,
            SignalSpec::PlayRecord {
                prompt,
                uri,
                max_duration,
            } => self.record(prompt.as_deref(), uri, *max_duration).await,
            SignalSpec::EndSignal => Ok(operation_complete(format!("rc={}", RC_SUCCESS))),
        };

        self.reset();
        outcome.unwrap_or_else(|e| {
            warn!("Signal {:?} failed: {}", self.spec, e);
            operation_failed(RC_FAILURE)
        })
    }

    async fn play(&self, uri: &str, iterations: u32) -> Result<()> {
        let player = self
            .player
            .as_ref()
            .ok_or_else(|| GatewayError::internal("announcement without player"))?;
        debug!("Playing {} x{}", uri, iterations);
        player.play(uri, iterations).await
    }

    async fn collect(&self, prompt: Option<&str>, max_digits: usize, timeout: Duration) -> Result<ObservedEvent> {
        if let Some(prompt) = prompt {
            self.play(prompt, 1).await?;
        }
        let detector = self
            .detector
            .as_ref()
            .ok_or_else(|| GatewayError::internal("collect without detector"))?;
        let digits = detector.collect(max_digits, timeout).await?;
        if digits.is_empty() {
            return Ok(operation_failed(RC_NO_DIGITS));
        }
        Ok(operation_complete(format!("rc={} dc={}", RC_SUCCESS, digits)))
    }

    async fn record(&self, prompt: Option<&str>, uri: &str, max_duration: Duration) -> Result<ObservedEvent> {
        if let Some(prompt) = prompt {
            self.play(prompt, 1).await?;
        }
        let recorder = self
            .recorder
            .as_ref()
            .ok_or_else(|| GatewayError::internal("record without recorder"))?;
        let length = recorder.record(uri, max_duration).await?;
        Ok(operation_complete(format!(
            "rc={} ri={} rl={}",
            RC_SUCCESS,
            uri,
            length.as_millis() / 100
        )))
    }

    fn reset(&self) {
        if let Some(player) = &self.player {
            player.reset();
        }
        if let Some(recorder) = &self.recorder {
            recorder.reset();
        }
        if let Some(detector) = &self.detector {
            detector.reset();
        }
    }
}
