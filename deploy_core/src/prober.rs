//! Readiness Prober.
//!
//! One blocking check per workload class, plus the `wait_ready` dispatcher
//! the wave executor calls by chart name. Every probe loop honours the
//! outer `Ctx`: cancellation or deadline exhaustion ends the loop promptly
//! instead of burning through the remaining attempt budget.

use std::sync::Arc;
use std::time::Duration;

use deploy_definitions::Result;

use crate::adapters::{ClusterAdapter, PodPhase};
use crate::clock::Ctx;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Which typed check applies to a chart, selected by the caller (usually
/// the wave executor, from the chart's name) rather than inferred here.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum WorkloadClass {
    RelationalDb,
    SearchEngine,
    ColumnStore,
    StatefulGeneric,
    DeploymentGeneric,
}

impl WorkloadClass {
    /// Maps a chart name to its probe class for the fixed set of named
    /// workloads; anything else is a generic deployment/service.
    pub fn for_chart_name(name: &str) -> WorkloadClass {
        match name {
            "postgres" | "auth-postgres" | "kratos-postgres" => WorkloadClass::RelationalDb,
            "meilisearch" => WorkloadClass::SearchEngine,
            "clickhouse" => WorkloadClass::ColumnStore,
            _ => WorkloadClass::DeploymentGeneric,
        }
    }
}

pub struct ReadinessProber {
    cluster: Arc<dyn ClusterAdapter>,
    http: reqwest::blocking::Client,
}

impl ReadinessProber {
    pub fn new(cluster: Arc<dyn ClusterAdapter>) -> Self {
        ReadinessProber {
            cluster,
            http: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("building the readiness prober's http client"),
        }
    }

    /// Dispatches to the typed check for `name`'s class. `name` doubles as
    /// both the chart name (to pick the class) and the release/service name
    /// used to build selectors and service DNS names.
    pub fn wait_ready(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        match WorkloadClass::for_chart_name(name) {
            WorkloadClass::RelationalDb => self.wait_relational_db_ready(ctx, name, namespace),
            WorkloadClass::SearchEngine => self.wait_search_engine_ready(ctx, name, namespace),
            WorkloadClass::ColumnStore => self.wait_column_store_ready(ctx, name, namespace),
            WorkloadClass::StatefulGeneric => self.wait_stateful_generic_ready(ctx, name, namespace),
            WorkloadClass::DeploymentGeneric => self.wait_deployment_generic_ready(ctx, name, namespace),
        }
    }

    /// `postgres`/`auth-postgres`/`kratos-postgres`: exec `pg_isready` in a
    /// running pod every 10s, up to 30 attempts, each bounded to 30s;
    /// success when the probe's stdout contains `accepting connections`.
    pub fn wait_relational_db_ready(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        self.poll(ctx, name, namespace, 30, |probe_ctx| {
            let pod = match self.first_pod(probe_ctx, namespace, name)? {
                Some(p) => p,
                None => return Ok(false),
            };
            let probe_ctx = probe_ctx.with_timeout(Duration::from_secs(30));
            let output = self
                .cluster
                .exec(&probe_ctx, namespace, &pod, &["pg_isready".to_string()])
                .unwrap_or_default();
            Ok(output.contains("accepting connections"))
        })
    }

    /// `meilisearch`: HTTP health endpoint must report `available`.
    pub fn wait_search_engine_ready(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        let url = format!("http://{}.{}.svc.cluster.local:7700/health", name, namespace);
        self.poll(ctx, name, namespace, 30, |_| Ok(self.http_body_contains(&url, "available")))
    }

    /// `clickhouse`: HTTP `/ping` must return `Ok`; up to 60 attempts.
    pub fn wait_column_store_ready(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        let url = format!("http://{}.{}.svc.cluster.local:8123/ping", name, namespace);
        self.poll(ctx, name, namespace, 60, |_| Ok(self.http_body_contains(&url, "Ok")))
    }

    /// Generic stateful workload: ready iff `replicas == readyReplicas ==
    /// currentReplicas` and every pod reports phase `Running`; up to 90
    /// attempts.
    pub fn wait_stateful_generic_ready(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        self.poll(ctx, name, namespace, 90, |probe_ctx| {
            let status = match self.cluster.get_workload_status(
                probe_ctx,
                crate::adapters::ResourceKind::StatefulSet,
                name,
                namespace,
            )? {
                Some(s) => s,
                None => return Ok(false),
            };
            if !(status.replicas == status.ready_replicas && status.ready_replicas == status.current_replicas) {
                return Ok(false);
            }
            let pods = self.cluster.get_pods(probe_ctx, namespace, &format!("app={}", name))?;
            Ok(!pods.is_empty() && pods.iter().all(|p| p.phase == PodPhase::Running))
        })
    }

    /// Generic deployment/service: every pod labelled
    /// `app.kubernetes.io/name=<name>` reports `Ready=True`; up to 30
    /// attempts.
    pub fn wait_deployment_generic_ready(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        self.poll(ctx, name, namespace, 30, |probe_ctx| {
            let pods = self.cluster.get_pods(probe_ctx, namespace, &format!("app.kubernetes.io/name={}", name))?;
            Ok(!pods.is_empty() && pods.iter().all(|p| p.ready))
        })
    }

    fn first_pod(&self, ctx: &Ctx, namespace: &str, name: &str) -> Result<Option<String>> {
        for selector in [format!("app={}", name), format!("app.kubernetes.io/name={}", name)] {
            let pods = self.cluster.get_pods(ctx, namespace, &selector)?;
            if let Some(p) = pods.into_iter().next() {
                return Ok(Some(p.name));
            }
        }
        Ok(None)
    }

    fn http_body_contains(&self, url: &str, needle: &str) -> bool {
        match self.http.get(url).send() {
            Ok(resp) => resp.text().map(|b| b.contains(needle)).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Shared poll loop: up to `max_attempts`, sleeping `POLL_INTERVAL`
    /// between tries, stopping early on success or on context
    /// cancellation/deadline.
    fn poll(
        &self, ctx: &Ctx, name: &str, namespace: &str, max_attempts: u32,
        mut attempt: impl FnMut(&Ctx) -> Result<bool>,
    ) -> Result<()> {
        for n in 1..=max_attempts {
            ctx.check().map_err(|e| format_err!("{}", e))?;
            if attempt(ctx)? {
                debug!("{}/{} ready after {} attempt(s)", namespace, name, n);
                return Ok(());
            }
            if n < max_attempts {
                ctx.sleep(POLL_INTERVAL);
                if ctx.is_cancelled() {
                    bail!("readiness probe for {}/{} cancelled", namespace, name);
                }
            }
        }
        bail!("{}/{} did not become ready after {} attempts", namespace, name, max_attempts)
    }
}
