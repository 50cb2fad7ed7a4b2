use std::time::Duration;

use crate::environment::Environment;
use crate::layer::Layer;

/// Default per-chart deploy timeout; raised to 10 minutes for charts in
/// the stateful set.
pub const DEFAULT_CHART_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const STATEFUL_CHART_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// An attached strategy produces the ordered layer configuration the wave
/// planner uses in place of the built-in default. It is a plain
/// callback-free value: embedders build the `Vec<Layer>` up front, because
/// computing it generally requires reading a chart catalogue the core
/// doesn't own.
#[derive(Clone, Debug)]
pub struct Strategy {
    pub name: String,
    pub layers: Vec<Layer>,
}

/// Immutable request to `Coordinator::deploy`. Constructed once per
/// run and never mutated afterwards — only `Coordinator` reads from it.
#[derive(Clone, Debug)]
pub struct DeploymentOptions {
    pub environment: Environment,
    pub charts_dir: String,
    pub dry_run: bool,
    pub skip_health_checks: bool,
    pub skip_stateful_set_recovery: bool,
    pub auto_fix_credentials: bool,
    pub force_update: bool,
    pub chart_timeout: Duration,
    pub strategy_name: Option<String>,
    pub strategy: Option<Strategy>,
}

impl DeploymentOptions {
    pub fn new(environment: Environment, charts_dir: impl Into<String>) -> Self {
        DeploymentOptions {
            environment,
            charts_dir: charts_dir.into(),
            dry_run: false,
            skip_health_checks: false,
            skip_stateful_set_recovery: false,
            auto_fix_credentials: false,
            force_update: false,
            chart_timeout: DEFAULT_CHART_TIMEOUT,
            strategy_name: None,
            strategy: None,
        }
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.dry_run = v;
        self
    }

    pub fn skip_health_checks(mut self, v: bool) -> Self {
        self.skip_health_checks = v;
        self
    }

    pub fn skip_stateful_set_recovery(mut self, v: bool) -> Self {
        self.skip_stateful_set_recovery = v;
        self
    }

    pub fn auto_fix_credentials(mut self, v: bool) -> Self {
        self.auto_fix_credentials = v;
        self
    }

    pub fn force_update(mut self, v: bool) -> Self {
        self.force_update = v;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}
