//! Retry/Recovery Classifier.
//!
//! Substring matching is confined to `classify`: tagged variants over
//! string-matched errors, keeping the substring matching itself confined
//! to a single function. Every other component matches on the tagged
//! `ErrorClass`/`DeployErrorKind` this produces.

use std::sync::Arc;
use std::time::Duration;

use deploy_definitions::{ReleaseStatus, Result};

use crate::adapters::PackageManagerAdapter;
use crate::clock::Ctx;

const RETRIABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "timeout",
    "temporary failure",
    "resource temporarily unavailable",
    "another operation in progress",
    "server error",
    "internal error",
    "network",
];

const OWNERSHIP_CONFLICT_PATTERNS: &[&str] = &[
    "secret ownership",
    "secret already exists",
    "managed by helm",
    "ownership conflict",
    "cannot patch resource",
    "forbidden",
    "access denied",
];

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ErrorClass {
    Retriable,
    OwnershipConflict,
    /// Distinct from the executor's `ChartTimeout`: this is the
    /// classifier's view of a timeout/deadline-exceeded message, which
    /// triggers a post-facto absolution probe rather than a blind retry.
    Timeout,
    ResourceConflict,
    NonRetriable,
}

/// Case-insensitive substring classification on an error's display text.
/// `Timeout` and `OwnershipConflict` are checked before the more generic
/// `ResourceConflict`/`Retriable` buckets, since their substrings
/// (`"timeout"`, `"secret already exists"`) would otherwise also match the
/// generic ones.
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("deadline exceeded") {
        return ErrorClass::Timeout;
    }
    if OWNERSHIP_CONFLICT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::OwnershipConflict;
    }
    if lower.contains("conflict") || lower.contains("already exists") {
        return ErrorClass::ResourceConflict;
    }
    if RETRIABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::Retriable;
    }
    ErrorClass::NonRetriable
}

pub struct RetryClassifier {
    package_manager: Arc<dyn PackageManagerAdapter>,
}

impl RetryClassifier {
    pub fn new(package_manager: Arc<dyn PackageManagerAdapter>) -> Self {
        RetryClassifier { package_manager }
    }

    /// Attempts `deploy` up to `attempts` times, exiting early on success or
    /// a non-retriable error. Between attempts: cleans up a failed
    /// release if one exists, then sleeps `attempt * 10s` under `ctx`.
    pub fn deploy_with_retry(&self, ctx: &Ctx, chart_name: &str, namespace: &str, attempts: u32, mut deploy: impl FnMut(&Ctx) -> Result<()>) -> Result<()> {
        for attempt in 1..=attempts {
            let err = match deploy(ctx) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            let class = classify(&err.to_string());
            match class {
                ErrorClass::NonRetriable => return Err(err),
                ErrorClass::Timeout => {
                    if self.absolve_timeout(ctx, chart_name, namespace) {
                        return Ok(());
                    }
                }
                ErrorClass::ResourceConflict => {
                    if let Err(cleanup_err) = self.package_manager.cleanup_stuck_operations(ctx, chart_name, namespace) {
                        warn!("resource-conflict cleanup for {}/{} failed: {}", namespace, chart_name, cleanup_err);
                    }
                }
                ErrorClass::OwnershipConflict | ErrorClass::Retriable => {
                    if let Err(cleanup_err) = self.cleanup_failed_release(ctx, chart_name, namespace) {
                        warn!("cleanup before retrying {}/{} failed: {}", namespace, chart_name, cleanup_err);
                    }
                }
            }

            if attempt < attempts {
                ctx.sleep(Duration::from_secs(attempt as u64 * 10));
            }
        }
        bail!("chart deployment failed after {} attempts: {}", attempts, chart_name)
    }

    /// Timeout recovery: sleep 30s, then re-list releases; a
    /// `Deployed` status for this chart absolves the timeout.
    fn absolve_timeout(&self, ctx: &Ctx, chart_name: &str, namespace: &str) -> bool {
        ctx.sleep(Duration::from_secs(30));
        self.package_manager
            .list_releases(ctx, namespace)
            .map(|releases| releases.iter().any(|r| r.name == chart_name && r.status == ReleaseStatus::Deployed))
            .unwrap_or(false)
    }

    fn cleanup_failed_release(&self, ctx: &Ctx, chart_name: &str, namespace: &str) -> Result<()> {
        let releases = self.package_manager.list_releases(ctx, namespace)?;
        let should_remove = releases
            .iter()
            .find(|r| r.name == chart_name)
            .map(|r| matches!(r.status, ReleaseStatus::Failed | ReleaseStatus::PendingInstall | ReleaseStatus::PendingUpgrade))
            .unwrap_or(false);
        if should_remove {
            self.package_manager.uninstall(ctx, chart_name, namespace)?;
        }
        Ok(())
    }
}
