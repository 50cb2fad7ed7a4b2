use std::time::Duration;

use crate::chart::Chart;

/// Ordered group of charts deployed as a unit. A `Layer` is a value
/// type produced once by the wave planner and then read-only for the rest
/// of the run.
#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub charts: Vec<Chart>,
    pub requires_health_check: bool,
    pub health_check_timeout: Duration,
    pub wait_between_charts: Duration,
    pub layer_completion_timeout: Duration,
    /// Informational in this core — the executor only acts on it when
    /// a parallel deployer has been attached.
    pub allow_parallel_deployment: bool,
    /// If true, a layer failure aborts the run even in degraded/emergency
    /// mode (`SkipStatefulSetRecovery`).
    pub critical_layer: bool,
}

impl Layer {
    /// Checks the invariant `health_check_timeout <= layer_completion_timeout`
    /// and `wait_between_charts >= 0` (trivially true for `Duration`, kept
    /// for symmetry with the other invariant and to give a single place to
    /// extend validation).
    pub fn validate(&self) -> Result<(), String> {
        if self.health_check_timeout > self.layer_completion_timeout {
            return Err(format!(
                "layer '{}': health_check_timeout ({:?}) exceeds layer_completion_timeout ({:?})",
                self.name, self.health_check_timeout, self.layer_completion_timeout
            ));
        }
        Ok(())
    }
}
