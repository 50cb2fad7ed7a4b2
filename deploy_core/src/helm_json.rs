//! Parses `helm list -o json` output into `ReleaseInfo`. Kept
//! as a single narrow module so the adapter itself stays readable — the
//! wire format is an external tool's JSON, not something the rest of the
//! engine should know the shape of.

use chrono::{DateTime, Utc};
use deploy_definitions::{ReleaseInfo, ReleaseStatus, Result};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawRelease {
    name: String,
    namespace: String,
    revision: String,
    updated: String,
    status: String,
}

pub fn parse_release_list(json: &str, fallback_namespace: &str) -> Result<Vec<ReleaseInfo>> {
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let raw: Vec<RawRelease> =
        serde_json::from_str(trimmed).map_err(|e| format_err!("failed to parse helm release list: {}", e))?;

    raw.into_iter()
        .map(|r| {
            let revision: u32 = r.revision.parse().unwrap_or(0);
            let updated = parse_helm_timestamp(&r.updated).unwrap_or_else(Utc::now);
            Ok(ReleaseInfo {
                name: r.name,
                namespace: if r.namespace.is_empty() { fallback_namespace.to_string() } else { r.namespace },
                revision,
                status: status_from_str(&r.status),
                updated,
            })
        })
        .collect()
}

/// Helm prints updated timestamps like `2024-05-01 10:03:11.1234 +0000 UTC`;
/// RFC3339 doesn't match, so fall back to `Utc::now` rather than fail the
/// whole listing over a cosmetic field.
fn parse_helm_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

fn status_from_str(s: &str) -> ReleaseStatus {
    match s.to_lowercase().as_str() {
        "deployed" => ReleaseStatus::Deployed,
        "failed" => ReleaseStatus::Failed,
        "pending-install" => ReleaseStatus::PendingInstall,
        "pending-upgrade" => ReleaseStatus::PendingUpgrade,
        "pending-rollback" => ReleaseStatus::PendingRollback,
        _ => ReleaseStatus::Unknown,
    }
}

pub fn is_pending(status: &ReleaseStatus) -> bool {
    matches!(status, ReleaseStatus::PendingInstall | ReleaseStatus::PendingUpgrade | ReleaseStatus::PendingRollback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_typical_helm_list_payload() {
        let json = r#"[
 {"name":"postgres","namespace":"alt-database","revision":"3","updated":"2024-05-01T10:03:11Z","status":"deployed","chart":"postgres-1.2.3","app_version":"14"}
 ]"#;
        let releases = parse_release_list(json, "alt-database").unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].revision, 3);
        assert_eq!(releases[0].status, ReleaseStatus::Deployed);
    }

    #[test]
    fn empty_output_is_empty_list_not_error() {
        assert!(parse_release_list("", "alt-apps").unwrap().is_empty());
        assert!(parse_release_list("null", "alt-apps").unwrap().is_empty());
    }

    #[test]
    fn pending_statuses_are_flagged_pending() {
        assert!(is_pending(&ReleaseStatus::PendingUpgrade));
        assert!(!is_pending(&ReleaseStatus::Deployed));
    }
}
