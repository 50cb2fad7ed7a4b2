//! Strategy-to-flags table consumed when building an `InstallOptions`
//! for a chart. The wave executor asks this for the flags appropriate to
//! `DeploymentOptions::strategy_name`; it has no opinion on timeouts past
//! that — a stateful chart's 10-minute floor is layered on top by
//! the executor, not here.

use std::time::Duration;

use deploy_definitions::Environment;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct StrategyFlags {
    pub timeout: Duration,
    pub wait: bool,
    pub atomic: bool,
    pub force: bool,
    pub cleanup_on_fail: bool,
}

pub const DEVELOPMENT: StrategyFlags = StrategyFlags {
    timeout: Duration::from_secs(5 * 60),
    wait: false,
    atomic: false,
    force: false,
    cleanup_on_fail: false,
};

pub const STAGING: StrategyFlags = StrategyFlags {
    timeout: Duration::from_secs(10 * 60),
    wait: true,
    atomic: false,
    force: false,
    cleanup_on_fail: true,
};

pub const PRODUCTION: StrategyFlags = StrategyFlags {
    timeout: Duration::from_secs(20 * 60),
    wait: true,
    atomic: true,
    force: false,
    cleanup_on_fail: true,
};

pub const DISASTER_RECOVERY: StrategyFlags = StrategyFlags {
    timeout: Duration::from_secs(3 * 60),
    wait: false,
    atomic: false,
    force: true,
    cleanup_on_fail: false,
};

/// `DeploymentOptions::strategy_name` resolves to one of these four, falling
/// back to the flags of `environment`'s default strategy name for any other string.
pub fn flags_for(strategy_name: &str, environment: Environment) -> StrategyFlags {
    match strategy_name {
        "development" => DEVELOPMENT,
        "staging" => STAGING,
        "production" => PRODUCTION,
        "disaster-recovery" => DISASTER_RECOVERY,
        _ => flags_for(environment.default_strategy_name(), environment),
    }
}
