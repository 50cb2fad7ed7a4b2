//! In-memory doubles for the package-manager/cluster adapter traits, hand-rolled rather than
//! pulled from a mocking framework.
//!
//! Not compiled into release builds; `#[cfg(test)]`-gated from `lib.rs`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use deploy_definitions::{ReleaseInfo, ReleaseStatus, Result};
use chrono::Utc;

use crate::adapters::cluster::{PersistentVolumeSpec, PodPhase, PodSummary, ResourceKind, SecretSpec, WorkloadStatus};
use crate::adapters::{ClusterAdapter, InstallOptions, PackageManagerAdapter, PendingOperation};
use crate::clock::Ctx;

/// Records every call made through it, so a test can assert "no mutating
/// calls happened" without threading a separate spy through each adapter
/// method.
#[derive(Default)]
pub struct FakeClusterAdapter {
    namespaces: Mutex<BTreeSet<String>>,
    secrets: Mutex<HashMap<(String, String), SecretSpec>>,
    pods: Mutex<HashMap<(String, String), Vec<PodSummary>>>,
    workload_status: Mutex<HashMap<(String, String), WorkloadStatus>>,
    exec_responses: Mutex<HashMap<(String, String), String>>,
    calls: Mutex<Vec<String>>,
    wait_for_delete_fails: Mutex<bool>,
}

impl FakeClusterAdapter {
    pub fn new() -> Self {
        FakeClusterAdapter::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn push_ready_pod(&self, namespace: &str, selector: &str, name: &str) {
        self.push_pod(namespace, selector, name, PodPhase::Running, true, "");
    }

    pub fn push_pod(&self, namespace: &str, selector: &str, name: &str, phase: PodPhase, ready: bool, waiting_reason: &str) {
        self.pods.lock().unwrap().entry((namespace.to_string(), selector.to_string())).or_default().push(PodSummary {
            name: name.to_string(),
            phase,
            ready,
            labels: BTreeMap::new(),
            waiting_reason: waiting_reason.to_string(),
        });
    }

    pub fn set_workload_status(&self, name: &str, namespace: &str, status: WorkloadStatus) {
        self.workload_status.lock().unwrap().insert((name.to_string(), namespace.to_string()), status);
    }

    pub fn clear_workload_status(&self, name: &str, namespace: &str) {
        self.workload_status.lock().unwrap().remove(&(name.to_string(), namespace.to_string()));
    }

    pub fn set_exec_response(&self, namespace: &str, pod: &str, output: &str) {
        self.exec_responses.lock().unwrap().insert((namespace.to_string(), pod.to_string()), output.to_string());
    }

    pub fn set_secret(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.secrets.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            SecretSpec { name: name.to_string(), namespace: namespace.to_string(), data, labels: BTreeMap::new() },
        );
    }

    pub fn fail_next_wait_for_delete(&self) {
        *self.wait_for_delete_fails.lock().unwrap() = true;
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl ClusterAdapter for FakeClusterAdapter {
    fn ensure_namespace(&self, _ctx: &Ctx, name: &str) -> Result<()> {
        self.record(format!("ensure_namespace({})", name));
        self.namespaces.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    fn get_namespaces(&self, _ctx: &Ctx) -> Result<Vec<String>> {
        Ok(self.namespaces.lock().unwrap().iter().cloned().collect())
    }

    fn get_secret(&self, _ctx: &Ctx, namespace: &str, name: &str) -> Result<Option<SecretSpec>> {
        Ok(self.secrets.lock().unwrap().get(&(namespace.to_string(), name.to_string())).cloned())
    }

    fn create_secret(&self, _ctx: &Ctx, secret: &SecretSpec) -> Result<()> {
        self.record(format!("create_secret({}/{})", secret.namespace, secret.name));
        self.secrets.lock().unwrap().insert((secret.namespace.clone(), secret.name.clone()), secret.clone());
        Ok(())
    }

    fn get_pods(&self, _ctx: &Ctx, namespace: &str, selector: &str) -> Result<Vec<PodSummary>> {
        Ok(self.pods.lock().unwrap().get(&(namespace.to_string(), selector.to_string())).cloned().unwrap_or_default())
    }

    fn get_workload_status(&self, _ctx: &Ctx, _kind: ResourceKind, name: &str, namespace: &str) -> Result<Option<WorkloadStatus>> {
        Ok(self.workload_status.lock().unwrap().get(&(name.to_string(), namespace.to_string())).cloned())
    }

    fn exec(&self, _ctx: &Ctx, namespace: &str, pod: &str, _cmd: &[String]) -> Result<String> {
        Ok(self.exec_responses.lock().unwrap().get(&(namespace.to_string(), pod.to_string())).cloned().unwrap_or_default())
    }

    fn scale(&self, _ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str, replicas: u32) -> Result<()> {
        self.record(format!("scale({:?},{}/{},{})", kind, namespace, name, replicas));
        Ok(())
    }

    fn delete_resource(&self, _ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        self.record(format!("delete_resource({:?},{}/{})", kind, namespace, name));
        Ok(())
    }

    fn delete_by_selector(&self, _ctx: &Ctx, kind: ResourceKind, namespace: &str, selector: &str) -> Result<()> {
        self.record(format!("delete_by_selector({:?},{},{})", kind, namespace, selector));
        Ok(())
    }

    fn wait_for_delete(&self, _ctx: &Ctx, kind: ResourceKind, selector: &str, namespace: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("wait_for_delete({:?},{},{})", kind, namespace, selector));
        let mut fails = self.wait_for_delete_fails.lock().unwrap();
        if *fails {
            *fails = false;
            bail!("timed out waiting for delete");
        }
        Ok(())
    }

    fn rollout_restart(&self, _ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        self.record(format!("rollout_restart({:?},{}/{})", kind, namespace, name));
        Ok(())
    }

    fn create_persistent_volume(&self, _ctx: &Ctx, pv: &PersistentVolumeSpec) -> Result<()> {
        self.record(format!("create_persistent_volume({})", pv.name));
        Ok(())
    }
}

/// In-memory package-manager double. Installs/upgrades bump a revision
/// counter so checkpoint/rollback tests can observe the "different
/// revision" case without a real helm binary.
#[derive(Default)]
pub struct FakePackageManagerAdapter {
    releases: Mutex<HashMap<(String, String), ReleaseInfo>>,
    fail_install_for: Mutex<HashSet<String>>,
    pending: Mutex<HashMap<(String, String), PendingOperation>>,
    calls: Mutex<Vec<String>>,
}

impl FakePackageManagerAdapter {
    pub fn new() -> Self {
        FakePackageManagerAdapter::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn seed_release(&self, namespace: &str, name: &str, revision: u32, status: ReleaseStatus) {
        self.releases.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            ReleaseInfo { name: name.to_string(), namespace: namespace.to_string(), revision, status, updated: Utc::now() },
        );
    }

    pub fn fail_install(&self, name: &str) {
        self.fail_install_for.lock().unwrap().insert(name.to_string());
    }

    pub fn stop_failing_install(&self, name: &str) {
        self.fail_install_for.lock().unwrap().remove(name);
    }

    pub fn seed_pending(&self, namespace: &str, name: &str, status: &str) {
        self.pending.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            PendingOperation { release: name.to_string(), namespace: namespace.to_string(), status: status.to_string() },
        );
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl PackageManagerAdapter for FakePackageManagerAdapter {
    fn install_or_upgrade(&self, _ctx: &Ctx, name: &str, _chart_path: &str, opts: &InstallOptions) -> Result<()> {
        self.record(format!("install_or_upgrade({}/{})", opts.namespace, name));
        if self.fail_install_for.lock().unwrap().contains(name) {
            bail!("simulated install failure for {}", name);
        }
        let key = (opts.namespace.clone(), name.to_string());
        let mut releases = self.releases.lock().unwrap();
        let revision = releases.get(&key).map(|r| r.revision + 1).unwrap_or(1);
        releases.insert(
            key,
            ReleaseInfo { name: name.to_string(), namespace: opts.namespace.clone(), revision, status: ReleaseStatus::Deployed, updated: Utc::now() },
        );
        Ok(())
    }

    fn template(&self, _ctx: &Ctx, name: &str, _chart_path: &str, _opts: &InstallOptions) -> Result<String> {
        self.record(format!("template({})", name));
        Ok(format!("# rendered manifest for {}", name))
    }

    fn rollback(&self, _ctx: &Ctx, name: &str, namespace: &str, revision: u32) -> Result<()> {
        self.record(format!("rollback({}/{},{})", namespace, name, revision));
        let key = (namespace.to_string(), name.to_string());
        let mut releases = self.releases.lock().unwrap();
        match releases.get_mut(&key) {
            Some(r) => {
                r.revision = revision;
                r.status = ReleaseStatus::Deployed;
                Ok(())
            }
            None => bail!("no such release {}/{} to roll back", namespace, name),
        }
    }

    fn uninstall(&self, _ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        self.record(format!("uninstall({}/{})", namespace, name));
        self.releases.lock().unwrap().remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    fn list_releases(&self, _ctx: &Ctx, namespace: &str) -> Result<Vec<ReleaseInfo>> {
        Ok(self.releases.lock().unwrap().values().filter(|r| r.namespace == namespace).cloned().collect())
    }

    fn detect_pending_operation(&self, _ctx: &Ctx, name: &str, namespace: &str) -> Result<Option<PendingOperation>> {
        Ok(self.pending.lock().unwrap().get(&(namespace.to_string(), name.to_string())).cloned())
    }

    fn cleanup_stuck_operations(&self, _ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        self.record(format!("cleanup_stuck_operations({}/{})", namespace, name));
        self.pending.lock().unwrap().remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}
