//! Configuration types deserialized from `circa.toml`.

use serde::Deserialize;

/// The top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Fixed-point loop limits and gate timing.
    #[serde(default)]
    pub propagation: PropagationConfig,
    /// Bounds for truth-table and expression extraction.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Retry policy for snapshotting shared dirty sets.
    #[serde(default)]
    pub locking: LockingConfig,
}

/// Settings for the event-driven propagator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropagationConfig {
    /// Steps a single propagation run may take before it is declared oscillating.
    pub iteration_limit: u32,
    /// Percentage of `iteration_limit` after which changed points are recorded
    /// as oscillation points.
    pub oscillation_watch_percent: u8,
    /// Delay, in simulation time units, used by the standard gates.
    pub gate_delay: u32,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            iteration_limit: 1000,
            oscillation_watch_percent: 75,
            gate_delay: 1,
        }
    }
}

impl PropagationConfig {
    /// The step index from which oscillation points are recorded.
    pub fn oscillation_watch_threshold(&self) -> u32 {
        (self.iteration_limit as u64 * self.oscillation_watch_percent as u64 / 100) as u32
    }
}

/// Settings for combinational analysis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Wire/component passes allowed before expression extraction fails as circular.
    pub max_expression_iterations: u32,
    /// Total input bits a truth table may enumerate.
    pub max_table_inputs: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_expression_iterations: 100,
            max_table_inputs: 12,
        }
    }
}

/// Bounded retry policy for dirty-set snapshots.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockingConfig {
    /// Attempts made before falling back to a logged best-effort result.
    pub snapshot_retries: u32,
    /// Milliseconds to wait for the set's lock on each attempt.
    pub snapshot_retry_millis: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            snapshot_retries: 3,
            snapshot_retry_millis: 5,
        }
    }
}
