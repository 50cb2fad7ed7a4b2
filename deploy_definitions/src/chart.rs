/// What kind of deployable a chart is; drives the default namespace fallback
/// rule and whether a layer failure involving it is treated as critical.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Infrastructure,
    Application,
    Operational,
}

/// Descriptor of a single deployable unit.
///
/// `Chart` is a value type: the wave executor clones/derives per-namespace
/// copies of a multi-namespace chart rather than mutating a shared one.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Chart {
    /// Unique per deployment.
    pub name: String,
    pub kind: ChartKind,
    /// Opaque string consumed by the package-manager adapter (a chart path
    /// or reference; the core never interprets it).
    pub path: String,
    #[serde(default)]
    pub wait_ready: bool,
    #[serde(default)]
    pub multi_namespace: bool,
    /// Non-empty iff `multi_namespace`.
    #[serde(default)]
    pub target_namespaces: Vec<String>,
    /// Names of charts that must be ready before this one is deployed,
    /// consumed by the executor's dependency waiter hook. Empty by default,
    /// so charts built without this field keep their prior behavior.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Chart {
    /// Validates the `multi_namespace ⇒ |target_namespaces| ≥ 1` invariant.
    /// Called by the wave planner when a catalogue is loaded, not
    /// re-checked on every deploy.
    pub fn validate(&self) -> Result<(), String> {
        if self.multi_namespace && self.target_namespaces.is_empty() {
            return Err(format!("chart '{}' is multi_namespace but declares no target_namespaces", self.name));
        }
        if !self.multi_namespace && !self.target_namespaces.is_empty() {
            return Err(format!("chart '{}' declares target_namespaces but is not multi_namespace", self.name));
        }
        Ok(())
    }

    /// The primary namespace: `target_namespaces[0]` when
    /// multi-namespace, otherwise left to the namespace resolution rule
    /// (computed by `deploy_core::namespace::resolve`, since it needs
    /// the chart's `Environment` too).
    pub fn primary_namespace(&self) -> Option<&str> {
        if self.multi_namespace {
            self.target_namespaces.first().map(String::as_str)
        } else {
            None
        }
    }

    /// Returns a copy of this chart pinned to a single namespace, as used
    /// when the executor fans a multi-namespace chart out over its targets:
    /// the downstream copy has `multi_namespace = false` and a
    /// single target.
    pub fn pinned_to(&self, namespace: &str) -> Chart {
        Chart {
            name: self.name.clone(),
            kind: self.kind,
            path: self.path.clone(),
            wait_ready: self.wait_ready,
            multi_namespace: false,
            target_namespaces: vec![namespace.to_string()],
            depends_on: self.depends_on.clone(),
        }
    }
}

/// The fixed set of stateful charts subject to the recovery protocol
/// and to the raised 10 minute chart timeout.
pub const STATEFUL_CHARTS: &[&str] =
    &["postgres", "auth-postgres", "kratos-postgres", "clickhouse", "meilisearch"];

pub fn is_stateful_chart(name: &str) -> bool {
    STATEFUL_CHARTS.contains(&name)
}
