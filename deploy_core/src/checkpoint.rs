//! Checkpoint & Rollback.
//!
//! `snapshot` records the live release set across a fixed namespace list;
//! `rollback` walks the *current* release set across those same namespaces
//! and reconciles each one back towards what the snapshot saw. Any
//! rollback/uninstall error aborts the walk immediately — a partially
//! applied rollback is reported, not silently continued.

use std::collections::BTreeMap;
use std::sync::Arc;

use deploy_definitions::{Checkpoint, DeployErrorKind, Environment, ReleaseKey, Result};

use crate::adapters::PackageManagerAdapter;
use crate::clock::Ctx;

pub struct CheckpointManager {
    package_manager: Arc<dyn PackageManagerAdapter>,
}

impl CheckpointManager {
    pub fn new(package_manager: Arc<dyn PackageManagerAdapter>) -> Self {
        CheckpointManager { package_manager }
    }

    /// Lists releases across `namespaces` and stores them keyed by
    /// `(namespace, name)`. `namespaces` is the caller's concern to
    /// enumerate — the core doesn't know the full namespace set for an
    /// environment on its own.
    pub fn snapshot(&self, ctx: &Ctx, environment: Environment, namespaces: &[String], id: String, timestamp: chrono::DateTime<chrono::Utc>) -> Result<Checkpoint> {
        let mut releases = BTreeMap::new();
        for namespace in namespaces {
            for release in self.package_manager.list_releases(ctx, namespace)? {
                releases.insert(ReleaseKey::new(namespace.clone(), release.name.clone()), release);
            }
        }
        Ok(Checkpoint { id, timestamp, environment, releases, namespaces: namespaces.to_vec() })
    }

    /// Reconciles every currently live release across the checkpoint's
    /// namespaces back towards the snapshot: a different revision is
    /// rolled back to the snapshot's revision, a release absent from the
    /// snapshot is uninstalled, and a release already matching is left
    /// alone. The first rollback/uninstall error aborts the whole pass.
    pub fn rollback(&self, ctx: &Ctx, checkpoint: &Checkpoint) -> Result<()> {
        for namespace in &checkpoint.namespaces {
            let current = self.package_manager.list_releases(ctx, namespace)?;
            for release in &current {
                let key = ReleaseKey::new(namespace.clone(), release.name.clone());
                match checkpoint.releases.get(&key) {
                    Some(snapshot_release) if snapshot_release.revision != release.revision => {
                        info!(
                            "rolling back {}/{} from revision {} to snapshot revision {}",
                            namespace, release.name, release.revision, snapshot_release.revision
                        );
                        self.package_manager.rollback(ctx, &release.name, namespace, snapshot_release.revision)?;
                    }
                    Some(_) => {}
                    None => {
                        info!("uninstalling {}/{} — absent from the checkpoint", namespace, release.name);
                        self.package_manager.uninstall(ctx, &release.name, namespace)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Runs `deploy` under a checkpoint: on success the checkpoint is discarded;
/// on failure, rolls every live release in the checkpoint's namespaces back
/// to the snapshot and returns a composite error naming both causes.
pub fn deploy_with_rollback<T>(
    ctx: &Ctx, manager: &CheckpointManager, environment: Environment, namespaces: &[String], checkpoint_id: String,
    timestamp: chrono::DateTime<chrono::Utc>, deploy: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let checkpoint = manager.snapshot(ctx, environment, namespaces, checkpoint_id.clone(), timestamp)?;

    match deploy() {
        Ok(value) => Ok(value),
        Err(deploy_err) => match manager.rollback(ctx, &checkpoint) {
            Ok(()) => Err(format_err!("deployment failed and was rolled back to checkpoint '{}': {}", checkpoint.id, deploy_err)),
            Err(rollback_err) => Err(DeployErrorKind::RollbackFailed(deploy_err.to_string(), rollback_err.to_string()).into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePackageManagerAdapter;
    use deploy_definitions::ReleaseStatus;

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc)
    }

    fn ctx() -> Ctx {
        Ctx::background(Arc::new(crate::clock::SystemClock))
    }

    #[test]
    fn snapshot_then_noop_rollback_is_a_no_op() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        pm.seed_release("alt-apps", "webapp", 1, ReleaseStatus::Deployed);
        let manager = CheckpointManager::new(pm.clone());
        let namespaces = vec!["alt-apps".to_string()];

        let checkpoint = manager.snapshot(&ctx(), Environment::Production, &namespaces, "chk-1".to_string(), now()).unwrap();
        manager.rollback(&ctx(), &checkpoint).unwrap();

        assert!(pm.calls().iter().all(|c| c.starts_with("list_releases") || c.starts_with("template")));
    }

    #[test]
    fn rollback_reverts_a_changed_revision() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        pm.seed_release("alt-apps", "webapp", 1, ReleaseStatus::Deployed);
        let manager = CheckpointManager::new(pm.clone());
        let namespaces = vec!["alt-apps".to_string()];
        let checkpoint = manager.snapshot(&ctx(), Environment::Production, &namespaces, "chk-1".to_string(), now()).unwrap();

        pm.seed_release("alt-apps", "webapp", 2, ReleaseStatus::Deployed);
        manager.rollback(&ctx(), &checkpoint).unwrap();

        assert!(pm.calls().iter().any(|c| c == "rollback(alt-apps/webapp,1)"));
    }

    #[test]
    fn rollback_uninstalls_a_release_absent_from_the_snapshot() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        let manager = CheckpointManager::new(pm.clone());
        let namespaces = vec!["alt-apps".to_string()];
        let checkpoint = manager.snapshot(&ctx(), Environment::Production, &namespaces, "chk-1".to_string(), now()).unwrap();

        pm.seed_release("alt-apps", "new-chart", 1, ReleaseStatus::Deployed);
        manager.rollback(&ctx(), &checkpoint).unwrap();

        assert!(pm.calls().iter().any(|c| c == "uninstall(alt-apps/new-chart)"));
    }

    #[test]
    fn deploy_with_rollback_names_the_checkpoint_on_failure() {
        let pm = Arc::new(FakePackageManagerAdapter::new());
        pm.seed_release("alt-apps", "webapp", 1, ReleaseStatus::Deployed);
        let manager = CheckpointManager::new(pm.clone());
        let namespaces = vec!["alt-apps".to_string()];

        let err = deploy_with_rollback::<()>(&ctx(), &manager, Environment::Production, &namespaces, "chk-7".to_string(), now(), || {
            bail!("layer 3 failed")
        })
            .unwrap_err();

        assert!(err.to_string().contains("rolled back to checkpoint"));
        assert!(err.to_string().contains("chk-7"));
    }
}
