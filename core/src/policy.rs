//! Duty-Cycle Policy
//!
//! Decides how long a node stays powered off between wake-ups. End devices
//! map their residual energy onto an off-time through two thresholds;
//! coordinators sleep for whatever extension their attached nodes have
//! negotiated since the last decision.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{CapillaryError, Result};
use crate::node::NodeKind;

/// Configuration for a duty-cycle policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Energy fraction below which the off-time is maximal
    pub min_energy_threshold: f64,

    /// Energy fraction above which the off-time is minimal
    pub max_energy_threshold: f64,

    /// Floor of the computed off-time
    pub min_off_time: Duration,

    /// Ceiling of the computed off-time and of negotiated extensions
    pub max_off_time: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_energy_threshold: 0.3,
            max_energy_threshold: 0.7,
            min_off_time: Duration::from_secs(1),
            max_off_time: Duration::from_secs(60),
        }
    }
}

impl PolicyConfig {
    /// Check that the configuration is usable
    ///
    /// Thresholds must lie in [0, 1] with `min < max`, and the off-time
    /// bounds must be ordered. Bad values are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_energy_threshold) {
            return Err(CapillaryError::InvalidConfig(format!(
                "min_energy_threshold {} outside [0, 1]",
                self.min_energy_threshold
            )));
        }

        if !(0.0..=1.0).contains(&self.max_energy_threshold) {
            return Err(CapillaryError::InvalidConfig(format!(
                "max_energy_threshold {} outside [0, 1]",
                self.max_energy_threshold
            )));
        }

        if self.min_energy_threshold >= self.max_energy_threshold {
            return Err(CapillaryError::InvalidConfig(format!(
                "min_energy_threshold {} must be below max_energy_threshold {}",
                self.min_energy_threshold, self.max_energy_threshold
            )));
        }

        if self.min_off_time > self.max_off_time {
            return Err(CapillaryError::InvalidConfig(format!(
                "min_off_time {:?} exceeds max_off_time {:?}",
                self.min_off_time, self.max_off_time
            )));
        }

        Ok(())
    }
}

/// Duty-cycle decision policy for a single node
///
/// One instance per node, driven sequentially by the host's scheduler: zero
/// or more [`negotiate_extension`](Self::negotiate_extension) calls between
/// consecutive [`compute_off_time`](Self::compute_off_time) calls. The
/// computed off-time is advisory; scheduling the actual sleep is the host's
/// job.
pub struct DutyCyclePolicy {
    /// Validated thresholds and bounds
    config: PolicyConfig,

    /// Last computed off-time
    current_off_time: Duration,

    /// Largest extension requested since the last consumption
    negotiated_extension: Duration,

    /// Publishes every computed off-time to subscribers
    off_time_tx: watch::Sender<Duration>,
}

impl DutyCyclePolicy {
    /// Create a policy from the given configuration
    ///
    /// Returns [`CapillaryError::InvalidConfig`] if the configuration fails
    /// [`PolicyConfig::validate`].
    pub fn new(config: PolicyConfig) -> Result<Self> {
        config.validate()?;
        let (off_time_tx, _) = watch::channel(Duration::ZERO);

        Ok(Self {
            config,
            current_off_time: Duration::ZERO,
            negotiated_extension: Duration::ZERO,
            off_time_tx,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Get the last computed off-time
    pub fn current_off_time(&self) -> Duration {
        self.current_off_time
    }

    /// Get the pending negotiated extension
    pub fn negotiated_extension(&self) -> Duration {
        self.negotiated_extension
    }

    /// Subscribe to computed off-times
    ///
    /// The receiver observes every value produced by
    /// [`compute_off_time`](Self::compute_off_time); the initial value is
    /// zero. Nothing in the policy depends on whether anyone subscribes.
    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.off_time_tx.subscribe()
    }

    /// Update the lower energy threshold, rejecting invalid values
    pub fn set_min_threshold(&mut self, threshold: f64) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.min_energy_threshold = threshold;
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Update the upper energy threshold, rejecting invalid values
    pub fn set_max_threshold(&mut self, threshold: f64) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.max_energy_threshold = threshold;
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Update the off-time floor, rejecting invalid values
    pub fn set_min_off_time(&mut self, off_time: Duration) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.min_off_time = off_time;
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Update the off-time ceiling, rejecting invalid values
    pub fn set_max_off_time(&mut self, off_time: Duration) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.max_off_time = off_time;
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Activate the policy before its first decision
    ///
    /// Starts the negotiated extension at `max_off_time`, so a coordinator
    /// sleeps maximally until some attached node asks for less.
    pub fn activate(&mut self) {
        self.negotiated_extension = self.config.max_off_time;
        tracing::debug!(
            negotiated_secs = self.negotiated_extension.as_secs_f64(),
            "Duty-cycle policy activated"
        );
    }

    /// Compute the next off-time
    ///
    /// End devices get the three-region threshold map over `energy_fraction`
    /// (the maximum residual fraction across the node's energy sources, in
    /// [0, 1], 0 when the node has none). Coordinators get
    /// `min_off_time + negotiated_extension`, and the extension is consumed.
    ///
    /// Inside the threshold band the off-time falls linearly from
    /// `max_off_time`; it does not blend into `min_off_time` at the upper
    /// threshold, so crossing `max_energy_threshold` steps down to the floor.
    pub fn compute_off_time(&mut self, kind: NodeKind, energy_fraction: f64) -> Duration {
        let off_time = if kind.is_energy_constrained() {
            if energy_fraction > self.config.max_energy_threshold {
                self.config.min_off_time
            } else if energy_fraction < self.config.min_energy_threshold {
                self.config.max_off_time
            } else {
                let band = self.config.max_energy_threshold - self.config.min_energy_threshold;
                let t = (energy_fraction - self.config.min_energy_threshold) / band;
                let max_secs = self.config.max_off_time.as_secs_f64();
                Duration::from_secs_f64(max_secs - t * max_secs)
            }
        } else {
            let extended = self.config.min_off_time + self.negotiated_extension;
            self.negotiated_extension = Duration::ZERO;
            extended
        };

        self.current_off_time = off_time;
        self.off_time_tx.send_replace(off_time);
        tracing::debug!(
            ?kind,
            energy_fraction,
            off_time_secs = off_time.as_secs_f64(),
            "Computed off-time"
        );

        off_time
    }

    /// Record an off-time extension requested by an attached node
    ///
    /// Max-wins accumulation: a request smaller than the pending extension
    /// is ignored, a larger one replaces it, and the result is capped at
    /// `max_off_time`. Consumed by the next coordinator-side
    /// [`compute_off_time`](Self::compute_off_time).
    pub fn negotiate_extension(&mut self, requested: Duration) {
        if requested > self.negotiated_extension {
            self.negotiated_extension = requested;
        }

        if self.negotiated_extension > self.config.max_off_time {
            self.negotiated_extension = self.config.max_off_time;
        }

        tracing::debug!(
            requested_secs = requested.as_secs_f64(),
            negotiated_secs = self.negotiated_extension.as_secs_f64(),
            "Negotiated off-time extension"
        );
    }
}

impl std::fmt::Debug for DutyCyclePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DutyCyclePolicy")
            .field("config", &self.config)
            .field("current_off_time", &self.current_off_time)
            .field("negotiated_extension", &self.negotiated_extension)
            .finish()
    }
}
