use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Observable snapshot of a single package-manager release.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: ReleaseStatus,
    pub updated: DateTime<Utc>,
}

/// Key used to index releases within a checkpoint and by the operation
/// lock registry.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct ReleaseKey {
    pub namespace: String,
    pub name: String,
}

impl ReleaseKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ReleaseKey { namespace: namespace.into(), name: name.into() }
    }
}

/// Snapshot of the live release set, taken before a risky operation and
/// consumed by rollback.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub environment: crate::environment::Environment,
    pub releases: BTreeMap<ReleaseKey, ReleaseInfo>,
    pub namespaces: Vec<String>,
}

impl Checkpoint {
    /// The checkpoint ID is time-derived: a UTC timestamp formatted to
    /// second precision, unique enough within a single deployment run.
    pub fn new_id(now: DateTime<Utc>) -> String {
        format!("chk-{}", now.format("%Y%m%dT%H%M%S"))
    }
}
