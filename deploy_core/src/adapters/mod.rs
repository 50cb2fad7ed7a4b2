//! External collaborators: the package-manager and cluster
//! adapters are defined as capability traits, not as wrappers around a
//! specific tool binary. Production code shells out to
//! `helm`/`kubectl`; tests substitute the in-memory doubles in
//! `crate::testing`.

pub mod cluster;
pub mod package_manager;

pub use cluster::{ClusterAdapter, KubectlAdapter, PodPhase, PodSummary, ResourceKind, WorkloadStatus};
pub use package_manager::{
    HelmAdapter, InstallOptions, PackageManagerAdapter, PendingOperation, UpgradeMode,
};
