//! Chart catalogue loader. Walks `ChartsDir` to build the set of charts
//! known on disk and which environments they carry values for, behind the
//! `filesystem` feature (kept optional since not every embedder deploys
//! from a local checkout).

use std::collections::{HashMap, HashSet};

use deploy_definitions::{Environment, Result};
use walkdir::WalkDir;

use crate::executor::ChartKnowledge;

/// What's on disk for one chart directory: whether it exists at all, and
/// whether it has a values file for a given environment.
#[derive(Clone, Debug, Default)]
struct ChartEntry {
    environment_values: HashSet<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ChartCatalogue {
    charts: HashMap<String, ChartEntry>,
}

impl ChartCatalogue {
    /// Falls back to `~/.deploy/charts` when the embedder doesn't have an
    /// explicit charts directory to hand, the way a missing `VAULT_TOKEN`
    /// falls back to a dotfile under the caller's home directory.
    pub fn default_charts_dir() -> Result<String> {
        let home = dirs::home_dir();
        ensure!(home.is_some(), "system must have a home directory to resolve a default charts directory");
        Ok(home.unwrap().join(".deploy").join("charts").to_string_lossy().into_owned())
    }

    /// Walks `charts_dir` one level deep: each immediate subdirectory is a
    /// chart, named after the directory. A chart "has a values file" for
    /// `Environment` when `values-<environment>.yaml` exists inside it.
    pub fn load(charts_dir: &str) -> Result<ChartCatalogue> {
        let mut charts = HashMap::new();

        for entry in WalkDir::new(charts_dir).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let mut environment_values = HashSet::new();
            for env in [Environment::Development, Environment::Staging, Environment::Production] {
                let candidate = entry.path().join(format!("values-{}.yaml", env.as_str()));
                if candidate.is_file() {
                    environment_values.insert(env.as_str().to_string());
                }
            }
            charts.insert(name, ChartEntry { environment_values });
        }

        Ok(ChartCatalogue { charts })
    }

    pub fn knows(&self, chart_name: &str) -> bool {
        self.charts.contains_key(chart_name)
    }

    /// Whether the chart exists and carries a resolvable values file for
    /// `environment`; either absent means the caller should treat this
    /// chart as `Skipped` rather than failing the whole wave.
    pub fn has_resolvable_values(&self, chart_name: &str, environment: Environment) -> bool {
        self.charts.get(chart_name).map(|c| c.environment_values.contains(environment.as_str())).unwrap_or(false)
    }
}

impl ChartKnowledge for ChartCatalogue {
    fn knows(&self, chart_name: &str) -> bool {
        ChartCatalogue::knows(self, chart_name)
    }

    fn has_resolvable_values(&self, chart_name: &str, environment: Environment) -> bool {
        ChartCatalogue::has_resolvable_values(self, chart_name, environment)
    }
}
