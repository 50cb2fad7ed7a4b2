//! Wave Executor, the engine's largest component: drives
//! each `Layer` to completion in order, deploying its charts (sequentially,
//! or over the bounded worker pool when `AllowParallelDeployment`), then
//! gating advancement on a post-layer readiness check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use deploy_definitions::{
    is_stateful_chart, Chart, DeployErrorKind, DeploymentOptions, DeploymentProgress, DeploymentResult, DeployStatus, Environment, Layer,
    ReleaseKey, Result, STATEFUL_CHART_TIMEOUT,
};

use crate::adapters::{ClusterAdapter, InstallOptions, PackageManagerAdapter};
use crate::clock::{Ctx, CtxError};
use crate::lock_registry::LockRegistry;
use crate::namespace;
use crate::prober::ReadinessProber;
use crate::retry::RetryClassifier;
use crate::strategy;
use crate::workerpool::{WorkerPool, DEFAULT_POOL_SIZE};

/// The coordinator can request that every chart deploy in a wave be
/// wrapped in retry. `None` (the default) keeps the plain single-attempt path
/// every executor test above exercises; `Some(attempts)` wraps each
/// chart's install call in `RetryClassifier::deploy_with_retry`.
const NO_RETRY: Option<u32> = None;

/// What the executor needs to know about the chart set on disk, without
/// depending on `crate::catalogue` directly — that module only exists
/// behind the `filesystem` feature, while the executor must build either
/// way. `ChartCatalogue` implements this behind that feature gate.
pub trait ChartKnowledge {
    fn knows(&self, chart_name: &str) -> bool;
    fn has_resolvable_values(&self, chart_name: &str, environment: Environment) -> bool;
}

/// A catalogue that considers every chart known and every environment's
/// values resolvable — useful for an embedder that doesn't model a
/// chart catalogue at all, or for tests that don't care about catalogue
/// lookups at all.
pub struct PermissiveCatalogue;

impl ChartKnowledge for PermissiveCatalogue {
    fn knows(&self, _chart_name: &str) -> bool {
        true
    }

    fn has_resolvable_values(&self, _chart_name: &str, _environment: Environment) -> bool {
        true
    }
}

/// A dependency-wait hook invoked before each chart. The
/// coordinator supplies a real one when `Chart::depends_on` matters to the
/// embedder; `no_op_dependency_waiter` is the default.
pub type DependencyWaiter = dyn Fn(&Chart, &Ctx) -> Result<()> + Send + Sync;

pub fn no_op_dependency_waiter() -> Box<DependencyWaiter> {
    Box::new(|_chart, _ctx| Ok(()))
}

pub struct WaveExecutor {
    package_manager: Arc<dyn PackageManagerAdapter>,
    lock_registry: LockRegistry,
    prober: ReadinessProber,
    worker_pool: WorkerPool,
    retry_attempts: Option<u32>,
}

impl WaveExecutor {
    pub fn new(package_manager: Arc<dyn PackageManagerAdapter>, cluster: Arc<dyn ClusterAdapter>, lock_registry: LockRegistry) -> Self {
        WaveExecutor {
            package_manager: package_manager.clone(),
            lock_registry,
            prober: ReadinessProber::new(cluster),
            worker_pool: WorkerPool::new(DEFAULT_POOL_SIZE),
            retry_attempts: NO_RETRY,
        }
    }

    /// Requests that every chart deploy in every layer be wrapped in
    /// `RetryClassifier::deploy_with_retry` with the given attempt budget.
    /// The coordinator opts into this; plain `new` leaves retry off.
    pub fn with_retry(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Drives every layer in order. Returns `Err` the moment a layer
    /// aborts; `progress` retains every result recorded up to that point, so
    /// the caller can report accumulated progress alongside the error.
    pub fn run(
        &self, ctx: &Ctx, options: &DeploymentOptions, layers: &[Layer], catalogue: &dyn ChartKnowledge, dependency_waiter: &DependencyWaiter,
        progress: &mut DeploymentProgress,
    ) -> Result<()> {
        for layer in layers {
            progress.current_phase = layer.name.clone();
            if let Err(e) = self.run_layer(ctx, options, layer, catalogue, dependency_waiter, progress) {
                return Err(DeployErrorKind::LayerFailed(layer.name.clone(), e.to_string()).into());
            }
        }
        Ok(())
    }

    fn run_layer(
        &self, ctx: &Ctx, options: &DeploymentOptions, layer: &Layer, catalogue: &dyn ChartKnowledge, dependency_waiter: &DependencyWaiter,
        progress: &mut DeploymentProgress,
    ) -> Result<()> {
        let layer_ctx = ctx.with_timeout(layer.layer_completion_timeout);

        if layer.allow_parallel_deployment {
            self.run_layer_parallel(&layer_ctx, options, layer, catalogue, dependency_waiter, progress)?;
        } else {
            self.run_layer_sequential(&layer_ctx, options, layer, catalogue, dependency_waiter, progress)?;
        }

        self.run_health_gate(&layer_ctx, options, layer)
    }

    fn run_layer_sequential(
        &self, layer_ctx: &Ctx, options: &DeploymentOptions, layer: &Layer, catalogue: &dyn ChartKnowledge, dependency_waiter: &DependencyWaiter,
        progress: &mut DeploymentProgress,
    ) -> Result<()> {
        let deployer = self.chart_deployer();

        for (i, chart) in layer.charts.iter().enumerate() {
            progress.current_chart = Some(chart.name.clone());

            if !catalogue.knows(&chart.name) {
                warn!("chart '{}' is unknown to the loaded chart catalogue; skipping", chart.name);
                progress.record(DeploymentResult::skipped(chart.name.clone(), "", "chart not found in catalogue"));
                continue;
            }

            if let Err(e) = dependency_waiter(chart, layer_ctx) {
                warn!("dependency wait for chart '{}' failed, proceeding anyway: {}", chart.name, e);
            }

            let resolvable = catalogue.has_resolvable_values(&chart.name, options.environment);
            let results = deployer.deploy_chart(layer_ctx, options, chart, resolvable);
            let fatal = !options.dry_run && results.iter().any(|r| r.status == DeployStatus::Failed);
            for result in results {
                progress.record(result);
            }
            if fatal {
                bail!("layer '{}' aborted: chart '{}' failed", layer.name, chart.name);
            }

            if i + 1 < layer.charts.len() && !layer.wait_between_charts.is_zero() {
                layer_ctx.sleep(layer.wait_between_charts);
            }
        }
        Ok(())
    }

    /// Charts deployed by a bounded worker pool that still preserves
    /// the wave boundary. Unlike the sequential path, a chart failure here
    /// can't abort charts already in flight; the layer is judged as a whole
    /// once every job has resolved.
    fn run_layer_parallel(
        &self, layer_ctx: &Ctx, options: &DeploymentOptions, layer: &Layer, catalogue: &dyn ChartKnowledge, dependency_waiter: &DependencyWaiter,
        progress: &mut DeploymentProgress,
    ) -> Result<()> {
        for chart in &layer.charts {
            if let Err(e) = dependency_waiter(chart, layer_ctx) {
                warn!("dependency wait for chart '{}' failed, proceeding anyway: {}", chart.name, e);
            }
        }

        let deployer = self.chart_deployer();
        let mut jobs: Vec<Box<dyn FnOnce() -> Vec<DeploymentResult> + Send>> = Vec::with_capacity(layer.charts.len());

        for chart in &layer.charts {
            if !catalogue.knows(&chart.name) {
                warn!("chart '{}' is unknown to the loaded chart catalogue; skipping", chart.name);
                let name = chart.name.clone();
                jobs.push(Box::new(move || vec![DeploymentResult::skipped(name, "", "chart not found in catalogue")]));
                continue;
            }
            let resolvable = catalogue.has_resolvable_values(&chart.name, options.environment);
            let deployer = deployer.clone();
            let options = options.clone();
            let chart = chart.clone();
            let layer_ctx = layer_ctx.clone();
            jobs.push(Box::new(move || deployer.deploy_chart(&layer_ctx, &options, &chart, resolvable)));
        }

        let outcomes = self.worker_pool.run(layer_ctx, jobs);
        let mut fatal = false;
        for outcome in outcomes {
            match outcome {
                Some(results) => {
                    fatal = fatal || (!options.dry_run && results.iter().any(|r| r.status == DeployStatus::Failed));
                    for result in results {
                        progress.record(result);
                    }
                }
                // A job that never reported back is the cancellation case:
                // results for unstarted charts in an aborted wave are
                // treated as failed.
                None => fatal = fatal || !options.dry_run,
            }
        }

        if fatal {
            bail!("layer '{}' aborted: one or more charts failed during parallel deployment", layer.name);
        }
        Ok(())
    }

    fn run_health_gate(&self, layer_ctx: &Ctx, options: &DeploymentOptions, layer: &Layer) -> Result<()> {
        if !layer.requires_health_check || options.dry_run || options.skip_health_checks {
            return Ok(());
        }

        let health_ctx = layer_ctx.with_timeout(layer.health_check_timeout);
        for chart in layer.charts.iter().filter(|c| c.wait_ready) {
            let namespaces = target_namespaces(chart, options.environment);
            for namespace in namespaces {
                if let Err(e) = self.prober.wait_ready(&health_ctx, &chart.name, &namespace) {
                    if options.skip_stateful_set_recovery && !layer.critical_layer {
                        warn!("health check for {}/{} downgraded to a warning (degraded mode): {}", namespace, chart.name, e);
                    } else {
                        bail!("health check failed for {}/{}: {}", namespace, chart.name, e);
                    }
                }
            }
        }
        Ok(())
    }

    fn chart_deployer(&self) -> ChartDeployer {
        ChartDeployer {
            package_manager: self.package_manager.clone(),
            lock_registry: self.lock_registry.clone(),
            retry: self.retry_attempts.map(|attempts| (Arc::new(RetryClassifier::new(self.package_manager.clone())), attempts)),
        }
    }
}

fn target_namespaces(chart: &Chart, environment: Environment) -> Vec<String> {
    if chart.multi_namespace {
        chart.target_namespaces.clone()
    } else {
        vec![namespace::resolve(chart, environment).to_string()]
    }
}

fn chart_timeout(chart: &Chart, options: &DeploymentOptions) -> Duration {
    if is_stateful_chart(&chart.name) {
        options.chart_timeout.max(STATEFUL_CHART_TIMEOUT)
    } else {
        options.chart_timeout
    }
}

/// Executes a single-chart deployment, factored out so both the sequential
/// and worker-pool paths share one implementation. Only depends on the
/// package-manager adapter and the lock registry — the two things a
/// `'static` parallel job can cheaply own a clone of.
#[derive(Clone)]
struct ChartDeployer {
    package_manager: Arc<dyn PackageManagerAdapter>,
    lock_registry: LockRegistry,
    /// Set when the coordinator requested retry; wraps the
    /// locked install call in `RetryClassifier::deploy_with_retry`.
    retry: Option<(Arc<RetryClassifier>, u32)>,
}

impl ChartDeployer {
    /// Fans a multi-namespace chart out sequentially over its targets.
    /// A non-dry-run failure in one namespace aborts the rest of
    /// the fan-out for this chart only, not the whole layer (the caller
    /// still decides layer-level abort from the returned results).
    fn deploy_chart(&self, layer_ctx: &Ctx, options: &DeploymentOptions, chart: &Chart, resolvable: bool) -> Vec<DeploymentResult> {
        if !chart.multi_namespace {
            return vec![self.deploy_single(layer_ctx, options, chart, resolvable)];
        }

        let mut results = Vec::with_capacity(chart.target_namespaces.len());
        for namespace in &chart.target_namespaces {
            let pinned = chart.pinned_to(namespace);
            let result = self.deploy_single(layer_ctx, options, &pinned, resolvable);
            let failed = result.status == DeployStatus::Failed;
            results.push(result);
            if failed && !options.dry_run {
                break;
            }
        }
        results
    }

    fn deploy_single(&self, layer_ctx: &Ctx, options: &DeploymentOptions, chart: &Chart, resolvable: bool) -> DeploymentResult {
        let namespace = if chart.multi_namespace {
            chart.target_namespaces.first().cloned().unwrap_or_default()
        } else {
            namespace::resolve(chart, options.environment).to_string()
        };

        if !resolvable {
            return DeploymentResult::skipped(
                chart.name.clone(),
                namespace,
                format!("no resolvable values file for environment '{}'", options.environment),
            );
        }

        let start = Instant::now();
        let timeout = chart_timeout(chart, options);
        let chart_ctx = layer_ctx.with_timeout(timeout);

        let strategy_name = options.strategy_name.clone().unwrap_or_else(|| options.environment.default_strategy_name().to_string());
        let flags = strategy::flags_for(&strategy_name, options.environment);

        let mut install_opts = InstallOptions::new(namespace.clone(), timeout);
        install_opts.wait = flags.wait;
        install_opts.atomic = flags.atomic;
        install_opts.force = flags.force;
        install_opts.dry_run = options.dry_run;

        if options.dry_run {
            return match self.package_manager.template(&chart_ctx, &chart.name, &chart.path, &install_opts) {
                Ok(_) => DeploymentResult::success(chart.name.clone(), namespace, "Chart templated successfully", start.elapsed()),
                Err(e) => DeploymentResult::failed(chart.name.clone(), namespace, e.to_string(), start.elapsed()),
            };
        }

        let key = ReleaseKey::new(namespace.clone(), chart.name.clone());
        let pm = self.package_manager.clone();
        let name = chart.name.clone();
        let path = chart.path.clone();
        let lock_registry = self.lock_registry.clone();
        let install = move |ctx: &Ctx| lock_registry.execute(&key, "install_or_upgrade", || pm.install_or_upgrade(ctx, &name, &path, &install_opts));

        let outcome = match &self.retry {
            Some((classifier, attempts)) => classifier.deploy_with_retry(&chart_ctx, &chart.name, &namespace, *attempts, install),
            None => install(&chart_ctx),
        };

        match outcome {
            Ok(()) => DeploymentResult::success(chart.name.clone(), namespace, "Chart deployed successfully", start.elapsed()),
            Err(e) => {
                // Distinguishes a deadline exceeded on our own chart context
                // from any other failure, testable property.
                let message = match chart_ctx.check() {
                    Err(CtxError::DeadlineExceeded) => format!("chart deployment timed out after {:?}", timeout),
                    _ => e.to_string(),
                };
                DeploymentResult::failed(chart.name.clone(), namespace, message, start.elapsed())
            }
        }
    }
}
