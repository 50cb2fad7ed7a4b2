//! Wave Planner.
//!
//! Prefers the attached `Strategy`; otherwise buckets the supplied charts
//! into the built-in default layer order. Multi-namespace charts stay a
//! single node here — the executor is the one that fans them out over
//! `target_namespaces`.

use std::time::Duration;

use deploy_definitions::{Chart, ChartKind, DeploymentOptions, Layer, Result};

/// Name and position of the built-in default layer set, in order.
const DEFAULT_LAYER_NAMES: &[&str] = &[
    "Storage & Persistent Infrastructure",
    "Configuration & Credentials",
    "Core Services",
    "Network & Ingress",
    "Frontend",
    "Data Processing",
    "Operations & Monitoring",
];

const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_LAYER_COMPLETION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_WAIT_BETWEEN_CHARTS: Duration = Duration::from_secs(5);

pub struct WavePlanner;

impl WavePlanner {
    /// `charts` is the full chart set known for this deployment.
    pub fn plan(options: &DeploymentOptions, charts: &[Chart]) -> Result<Vec<Layer>> {
        if let Some(strategy) = &options.strategy {
            for layer in &strategy.layers {
                layer.validate().map_err(|e| format_err!("{}", e))?;
            }
            return Ok(strategy.layers.clone());
        }

        let layers = Self::default_layers(charts);
        for layer in &layers {
            layer.validate().map_err(|e| format_err!("{}", e))?;
        }
        Ok(layers)
    }

    fn default_layers(charts: &[Chart]) -> Vec<Layer> {
        let mut buckets: Vec<Vec<Chart>> = DEFAULT_LAYER_NAMES.iter().map(|_| Vec::new()).collect();
        for chart in charts {
            buckets[default_layer_index(chart)].push(chart.clone());
        }

        DEFAULT_LAYER_NAMES
            .iter()
            .zip(buckets.into_iter())
            .map(|(name, charts)| Layer {
                name: name.to_string(),
                charts,
                requires_health_check: true,
                health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
                wait_between_charts: DEFAULT_WAIT_BETWEEN_CHARTS,
                layer_completion_timeout: DEFAULT_LAYER_COMPLETION_TIMEOUT,
                allow_parallel_deployment: false,
                critical_layer: name == &"Storage & Persistent Infrastructure" || name == &"Core Services",
            })
            .collect()
    }
}

fn default_layer_index(chart: &Chart) -> usize {
    if deploy_definitions::is_stateful_chart(&chart.name) {
        return 0; // Storage & Persistent Infrastructure
    }
    match chart.name.as_str() {
        "common-ssl" | "kratos" | "auth-service" => 1, // Configuration & Credentials
        "nginx" | "nginx-external" => 3,               // Network & Ingress
        "alt-frontend" => 4,                           // Frontend
        _ => match chart.kind {
            ChartKind::Operational => 6, // Operations & Monitoring
            ChartKind::Infrastructure | ChartKind::Application => 2, // Core Services
        },
    }
}
