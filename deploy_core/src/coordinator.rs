//! Coordinator.
//!
//! Top-to-bottom sequencing of every phase for a single deployment:
//! pre-flight validation, namespace creation, TLS lifecycle, credential
//! provisioning, stateful-workload recovery preparation, storage setup,
//! wave execution, then post-deploy operations. `CoordinatorConfig` carries
//! the topology knobs (namespaces, TLS services, storage manifests,
//! stateful targets) left to the embedder to supply — the core sequences
//! phases, it doesn't invent a chart/namespace topology of its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use deploy_definitions::{Chart, DeployErrorKind, DeploymentOptions, DeploymentProgress, Result};

use crate::adapters::cluster::{PersistentVolumeSpec, ResourceKind};
use crate::adapters::{ClusterAdapter, PackageManagerAdapter};
use crate::checkpoint::{self, CheckpointManager};
use crate::clock::Ctx;
use crate::credentials::{self, CredentialProvisioner};
use crate::executor::{ChartKnowledge, DependencyWaiter, WaveExecutor};
use crate::lock_registry::LockRegistry;
use crate::namespace;
use crate::planner::WavePlanner;
use crate::recovery::StatefulWorkloadRecovery;
use crate::tls::{ChartTlsClass, TlsManager};

/// One chart that should receive TLS material: a `values-ssl.yaml` of the
/// given class, plus a labelled secret in its namespace.
pub struct TlsServiceTarget {
    pub chart_name: String,
    pub namespace: String,
    pub class: ChartTlsClass,
}

/// One stateful chart the coordinator should run recovery
/// pre-check/recreation against before the wave executor starts.
pub struct StatefulTarget {
    pub chart_name: String,
    pub namespace: String,
    pub delete_wait_timeout: Duration,
}

/// A post-deploy rollout restart target, gated by
/// `DeploymentOptions::force_update`.
pub struct RestartTarget {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
}

/// Topology and policy knobs the coordinator needs that are left as
/// embedder concerns: which namespaces exist, which charts need TLS and
/// stateful recovery, which persistent volumes to provision, and whether
/// retry is requested for this run.
pub struct CoordinatorConfig {
    pub namespaces: Vec<String>,
    pub tls_ca_secret_namespace: String,
    pub tls_ca_secret_name: String,
    pub tls_wildcard_domain: String,
    pub tls_services: Vec<TlsServiceTarget>,
    pub storage: Vec<PersistentVolumeSpec>,
    pub stateful_targets: Vec<StatefulTarget>,
    pub post_deploy_restarts: Vec<RestartTarget>,
    /// `Some(n)` requests the retry classifier wrap every chart deploy with up to `n`
    /// attempts; `None` leaves the
    /// executor's plain single-attempt path in place.
    pub retry_attempts: Option<u32>,
    /// How old a `Failed`/`Pending*` release must be before
    /// `cleanup_stale_releases` removes it.
    pub cleanup_cutoff: Duration,
}

impl CoordinatorConfig {
    /// A config with no topology at all: every phase that depends on one
    /// becomes a no-op. Useful for an embedder exercising only the wave
    /// executor, or for tests of the sequencing itself.
    pub fn empty() -> Self {
        CoordinatorConfig {
            namespaces: Vec::new(),
            tls_ca_secret_namespace: "alt-apps".to_string(),
            tls_ca_secret_name: "deploy-cli-ca".to_string(),
            tls_wildcard_domain: "*.internal.test".to_string(),
            tls_services: Vec::new(),
            storage: Vec::new(),
            stateful_targets: Vec::new(),
            post_deploy_restarts: Vec::new(),
            retry_attempts: None,
            cleanup_cutoff: Duration::from_secs(24 * 3600),
        }
    }
}

pub struct Coordinator {
    package_manager: Arc<dyn PackageManagerAdapter>,
    cluster: Arc<dyn ClusterAdapter>,
    lock_registry: LockRegistry,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(package_manager: Arc<dyn PackageManagerAdapter>, cluster: Arc<dyn ClusterAdapter>, config: CoordinatorConfig) -> Self {
        Coordinator { package_manager, cluster, lock_registry: LockRegistry::new(), config }
    }

    /// top-to-bottom sequence:
    /// `Planning → PreFlight → Namespaces → TLS → Credentials →
    /// StatefulPrep → Storage → waves → Post → Done`.
    pub fn deploy(
        &self, ctx: &Ctx, options: &DeploymentOptions, charts: &[Chart], catalogue: &dyn ChartKnowledge, dependency_waiter: &DependencyWaiter,
    ) -> Result<DeploymentProgress> {
        let options = self.attach_strategy(options);
        let mut progress = DeploymentProgress::new(charts.len());
        progress.current_phase = "Planning".to_string();

        progress.current_phase = "PreFlight".to_string();
        self.preflight(ctx)?;

        progress.current_phase = "Namespaces".to_string();
        self.ensure_namespaces(ctx, &options)?;

        progress.current_phase = "TLS".to_string();
        self.run_tls_lifecycle(ctx, &options);

        progress.current_phase = "Credentials".to_string();
        self.run_credentials(ctx, &options, charts)?;

        progress.current_phase = "StatefulPrep".to_string();
        if !options.skip_stateful_set_recovery {
            self.run_stateful_prep(ctx, &options)?;
        }

        progress.current_phase = "Storage".to_string();
        self.run_storage_setup(ctx, &options)?;

        let layers = WavePlanner::plan(&options, charts)?;
        let mut executor = WaveExecutor::new(self.package_manager.clone(), self.cluster.clone(), self.lock_registry.clone());
        if let Some(attempts) = self.config.retry_attempts {
            executor = executor.with_retry(attempts);
        }
        executor.run(ctx, &options, &layers, catalogue, dependency_waiter, &mut progress)?;

        progress.current_phase = "Post".to_string();
        if options.force_update {
            self.run_post_deploy(ctx, &options);
        }

        progress.current_phase = "Done".to_string();
        Ok(progress)
    }

    /// `Snapshot → Deploy → Rollback`. On success the checkpoint is
    /// simply dropped; on any deploy-phase error the checkpoint's releases
    /// are rolled back and a composite error naming both causes is returned.
    pub fn deploy_with_rollback(
        &self, ctx: &Ctx, options: &DeploymentOptions, charts: &[Chart], catalogue: &dyn ChartKnowledge, dependency_waiter: &DependencyWaiter,
    ) -> Result<DeploymentProgress> {
        let manager = CheckpointManager::new(self.package_manager.clone());
        let id = Self::new_deployment_id();
        checkpoint::deploy_with_rollback(ctx, &manager, options.environment, &self.config.namespaces, id, Utc::now(), || {
            self.deploy(ctx, options, charts, catalogue, dependency_waiter)
        })
    }

    /// Uninstalls any release across the configured namespaces whose
    /// status is `Failed`/`PendingInstall`/`PendingUpgrade` and whose
    /// `updated` timestamp is older than `cleanup_cutoff`.
    pub fn cleanup_stale_releases(&self, ctx: &Ctx) -> Result<usize> {
        use deploy_definitions::ReleaseStatus;

        let now = Utc::now();
        let mut cleaned = 0;
        for namespace in &self.config.namespaces {
            for release in self.package_manager.list_releases(ctx, namespace)? {
                let stale_status = matches!(release.status, ReleaseStatus::Failed | ReleaseStatus::PendingInstall | ReleaseStatus::PendingUpgrade);
                let age = now.signed_duration_since(release.updated).to_std().unwrap_or_default();
                if stale_status && age > self.config.cleanup_cutoff {
                    info!("cleaning up stale release {}/{} (status {:?}, age {:?})", namespace, release.name, release.status, age);
                    self.package_manager.uninstall(ctx, &release.name, namespace)?;
                    cleaned += 1;
                }
            }
        }
        Ok(cleaned)
    }

    /// Attaches the environment's default strategy name when
    /// the caller didn't set one. An attached `Strategy` value (producing
    /// layer configurations) is left untouched — the planner already
    /// prefers it over the name.
    fn attach_strategy(&self, options: &DeploymentOptions) -> DeploymentOptions {
        let mut options = options.clone();
        if options.strategy_name.is_none() {
            options.strategy_name = Some(options.environment.default_strategy_name().to_string());
        }
        options
    }

    /// Checks that required external tools are present and the cluster is
    /// reachable. The core can only observe the cluster side of that through
    /// the adapter; package-manager binary presence is the embedder's
    /// adapter construction concern.
    fn preflight(&self, ctx: &Ctx) -> Result<()> {
        self.cluster
            .get_namespaces(ctx)
            .map_err(|e| DeployErrorKind::MissingPrerequisite(format!("cluster unreachable during pre-flight: {}", e)))?;
        Ok(())
    }

    /// Idempotent namespace creation; skipped entirely under `DryRun`.
    fn ensure_namespaces(&self, ctx: &Ctx, options: &DeploymentOptions) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }
        for namespace in &self.config.namespaces {
            self.cluster
                .ensure_namespace(ctx, namespace)
                .map_err(|e| DeployErrorKind::MissingPrerequisite(format!("ensuring namespace '{}': {}", namespace, e)))?;
        }
        Ok(())
    }

    /// Acquires (load-or-generate), validates, then distributes TLS
    /// material. The degraded-mode failure policy applies throughout —
    /// acquisition and validation failures drop TLS rather than
    /// aborting the run, and distribution failures are per-chart
    /// warnings. Entirely skipped under `DryRun`.
    fn run_tls_lifecycle(&self, ctx: &Ctx, options: &DeploymentOptions) {
        if options.dry_run {
            return;
        }

        let manager = TlsManager::new(self.cluster.clone());
        let services: Vec<String> = self.config.tls_services.iter().map(|t| t.chart_name.clone()).collect();
        let material = match manager.acquire(ctx, &self.config.tls_ca_secret_namespace, &self.config.tls_ca_secret_name, &self.config.tls_wildcard_domain, &services) {
            Some(m) => m,
            None => {
                warn!("continuing without TLS material: both load and generation failed");
                return;
            }
        };

        if let Err(e) = manager.validate(&material) {
            warn!("TLS material failed validation, dropping it for this run: {}", e);
            return;
        }

        for target in &self.config.tls_services {
            if let Err(e) = manager.write_values_ssl_yaml(&options.charts_dir, &target.chart_name, target.class, &material) {
                warn!("writing values-ssl.yaml for '{}' failed: {}", target.chart_name, e);
            }
            if let Err(e) = manager.distribute_secret(ctx, &target.chart_name, &target.namespace, &material) {
                warn!("distributing TLS secret for {}/{} failed: {}", target.namespace, target.chart_name, e);
            }
        }
    }

    /// Validates & provisions credentials for every chart.
    /// Skipped under `DryRun` along with every other mutating phase.
    fn run_credentials(&self, ctx: &Ctx, options: &DeploymentOptions, charts: &[Chart]) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }
        let provisioner = CredentialProvisioner::new(self.cluster.clone());
        let adopt = credentials::no_op_adopt();
        for chart in charts {
            let namespace = chart.primary_namespace().map(str::to_string).unwrap_or_else(|| namespace::resolve(chart, options.environment).to_string());
            provisioner.validate_and_provision(ctx, &chart.name, &namespace, options.auto_fix_credentials, &*adopt)?;
        }
        Ok(())
    }

    /// Stateful-workload recovery preparation. Gated by
    /// `SkipStatefulSetRecovery` at the call site in `deploy`; skipped under
    /// `DryRun` here too since recreation mutates the cluster.
    fn run_stateful_prep(&self, ctx: &Ctx, options: &DeploymentOptions) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }
        let recovery = StatefulWorkloadRecovery::new(self.cluster.clone());
        for target in &self.config.stateful_targets {
            recovery.recover_if_necessary(ctx, &target.chart_name, &target.namespace, target.delete_wait_timeout)?;
        }
        Ok(())
    }

    /// Applies the configured persistent volume objects.
    fn run_storage_setup(&self, ctx: &Ctx, options: &DeploymentOptions) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }
        for pv in &self.config.storage {
            self.cluster
                .create_persistent_volume(ctx, pv)
                .map_err(|e| DeployErrorKind::MissingPrerequisite(format!("provisioning persistent volume '{}': {}", pv.name, e)))?;
        }
        Ok(())
    }

    /// `ForceUpdate`: rollout-restart configured deployments so pods pick
    /// up anything the wave just changed. Post-deploy pod validation
    /// errors are warnings, not failures.
    fn run_post_deploy(&self, ctx: &Ctx, options: &DeploymentOptions) {
        if options.dry_run {
            return;
        }
        for target in &self.config.post_deploy_restarts {
            if let Err(e) = self.cluster.rollout_restart(ctx, target.kind, &target.name, &target.namespace) {
                warn!("post-deploy rollout restart for {}/{} failed: {}", target.namespace, target.name, e);
            }
        }
    }

    /// A time-derived deployment ID. Distinct format from
    /// `Checkpoint::new_id` only by prefix, so logs can tell the two apart.
    fn new_deployment_id() -> String {
        format!("deploy-{}", Utc::now().format("%Y%m%dT%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::executor::PermissiveCatalogue;
    use crate::testing::{FakeClusterAdapter, FakePackageManagerAdapter};
    use deploy_definitions::{ChartKind, Environment};

    fn ctx() -> Ctx {
        Ctx::background(Arc::new(SystemClock))
    }

    fn chart(name: &str) -> Chart {
        Chart {
            name: name.to_string(),
            kind: ChartKind::Application,
            path: format!("/charts/{}", name),
            wait_ready: false,
            multi_namespace: false,
            target_namespaces: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    fn coordinator(pm: Arc<FakePackageManagerAdapter>, cluster: Arc<FakeClusterAdapter>, config: CoordinatorConfig) -> Coordinator {
        Coordinator::new(pm, cluster, config)
    }

    #[test]
    fn dry_run_deploy_issues_no_mutating_calls() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        let cluster = Arc::new(FakeClusterAdapter::new());
        let mut config = CoordinatorConfig::empty();
        config.namespaces = vec!["alt-apps".to_string()];
        let coord = coordinator(pm.clone(), cluster.clone(), config);
        let options = DeploymentOptions::new(Environment::Production, "./charts").dry_run(true);

        let progress = coord.deploy(&ctx(), &options, &[chart("webapp")], &PermissiveCatalogue, &crate::executor::no_op_dependency_waiter).unwrap();

        assert_eq!(progress.success_count(), 1);
        assert!(pm.calls().iter().all(|c| c.starts_with("template(")));
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn live_deploy_ensures_namespaces_and_runs_waves() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        let cluster = Arc::new(FakeClusterAdapter::new());
        let mut config = CoordinatorConfig::empty();
        config.namespaces = vec!["alt-apps".to_string()];
        let coord = coordinator(pm.clone(), cluster.clone(), config);
        let options = DeploymentOptions::new(Environment::Staging, "./charts");

        let progress = coord.deploy(&ctx(), &options, &[chart("webapp")], &PermissiveCatalogue, &crate::executor::no_op_dependency_waiter).unwrap();

        assert_eq!(progress.success_count(), 1);
        assert!(cluster.calls().iter().any(|c| c == "ensure_namespace(alt-apps)"));
    }

    #[test]
    fn deploy_with_rollback_restores_the_checkpoint_on_failure() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        let cluster = Arc::new(FakeClusterAdapter::new());
        let mut config = CoordinatorConfig::empty();
        config.namespaces = vec!["alt-apps".to_string()];
        let coord = coordinator(pm.clone(), cluster.clone(), config);
        let options = DeploymentOptions::new(Environment::Production, "./charts");

        pm.fail_install("webapp");
        let err = coord
            .deploy_with_rollback(&ctx(), &options, &[chart("webapp")], &PermissiveCatalogue, &crate::executor::no_op_dependency_waiter)
            .unwrap_err();

        assert!(err.to_string().contains("rolled back to checkpoint"));
    }

    #[test]
    fn cleanup_stale_releases_removes_old_failed_releases_only() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        let cluster = Arc::new(FakeClusterAdapter::new());
        let mut config = CoordinatorConfig::empty();
        config.namespaces = vec!["alt-apps".to_string()];
        config.cleanup_cutoff = Duration::from_secs(0);
        let coord = coordinator(pm.clone(), cluster, config);

        pm.seed_release("alt-apps", "stuck", 1, deploy_definitions::ReleaseStatus::Failed);
        pm.seed_release("alt-apps", "healthy", 2, deploy_definitions::ReleaseStatus::Deployed);

        let cleaned = coord.cleanup_stale_releases(&ctx()).unwrap();
        assert_eq!(cleaned, 1);
        assert!(pm.calls().iter().any(|c| c == "uninstall(alt-apps/stuck)"));
        assert!(!pm.calls().iter().any(|c| c == "uninstall(alt-apps/healthy)"));
    }
}
