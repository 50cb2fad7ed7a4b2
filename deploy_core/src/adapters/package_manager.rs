use std::process::Command;
use std::time::Duration;

use deploy_definitions::{ReleaseInfo, Result};

use crate::clock::Ctx;

/// How an install-or-upgrade call should behave; populated from the
/// selected strategy's flags.
#[derive(Clone, Debug)]
pub struct InstallOptions {
    pub namespace: String,
    pub timeout: Duration,
    pub wait: bool,
    pub atomic: bool,
    pub force: bool,
    pub values_files: Vec<String>,
    pub dry_run: bool,
}

impl InstallOptions {
    pub fn new(namespace: impl Into<String>, timeout: Duration) -> Self {
        InstallOptions {
            namespace: namespace.into(),
            timeout,
            wait: false,
            atomic: false,
            force: false,
            values_files: Vec::new(),
            dry_run: false,
        }
    }
}

/// Distinguishes a plain upgrade from one the strategy additionally wants
/// force-applied.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum UpgradeMode {
    Normal,
    Force,
}

/// A record of another in-flight helm operation on the same release,
/// surfaced by `detect_pending_operation`.
#[derive(Clone, Debug)]
pub struct PendingOperation {
    pub release: String,
    pub namespace: String,
    pub status: String,
}

/// Capability set consumed by the core. The production implementation
/// shells out to the `helm` binary; an adapter is an interface abstraction,
/// not a wrapper tied to one specific tool binary.
pub trait PackageManagerAdapter: Send + Sync {
    fn install_or_upgrade(&self, ctx: &Ctx, name: &str, chart_path: &str, opts: &InstallOptions) -> Result<()>;
    fn template(&self, ctx: &Ctx, name: &str, chart_path: &str, opts: &InstallOptions) -> Result<String>;
    fn rollback(&self, ctx: &Ctx, name: &str, namespace: &str, revision: u32) -> Result<()>;
    fn uninstall(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()>;
    fn list_releases(&self, ctx: &Ctx, namespace: &str) -> Result<Vec<ReleaseInfo>>;
    fn detect_pending_operation(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<Option<PendingOperation>>;
    fn cleanup_stuck_operations(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()>;
}

/// Shells out to the `helm` CLI found on `$PATH`.
#[derive(Clone, Default)]
pub struct HelmAdapter;

impl HelmAdapter {
    pub fn new() -> Self {
        HelmAdapter
    }

    fn run(&self, ctx: &Ctx, args: &[String]) -> Result<String> {
        ctx.check().map_err(|e| format_err!("{}", e))?;
        debug!("helm {}", args.join(" "));
        let output = Command::new("helm")
            .args(args)
            .output()
            .map_err(|e| format_err!("failed to invoke helm: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("helm {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PackageManagerAdapter for HelmAdapter {
    fn install_or_upgrade(&self, ctx: &Ctx, name: &str, chart_path: &str, opts: &InstallOptions) -> Result<()> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            name.to_string(),
            chart_path.to_string(),
            "--namespace".to_string(),
            opts.namespace.clone(),
            "--timeout".to_string(),
            format!("{}s", opts.timeout.as_secs()),
        ];
        if opts.wait {
            args.push("--wait".to_string());
        }
        if opts.atomic {
            args.push("--atomic".to_string());
        }
        if opts.force {
            args.push("--force".to_string());
        }
        for values in &opts.values_files {
            args.push("-f".to_string());
            args.push(values.clone());
        }
        self.run(ctx, &args)?;
        Ok(())
    }

    fn template(&self, ctx: &Ctx, name: &str, chart_path: &str, opts: &InstallOptions) -> Result<String> {
        let mut args = vec![
            "template".to_string(),
            name.to_string(),
            chart_path.to_string(),
            "--namespace".to_string(),
            opts.namespace.clone(),
        ];
        for values in &opts.values_files {
            args.push("-f".to_string());
            args.push(values.clone());
        }
        self.run(ctx, &args)
    }

    fn rollback(&self, ctx: &Ctx, name: &str, namespace: &str, revision: u32) -> Result<()> {
        self.run(
            ctx,
            &[
                "rollback".to_string(),
                name.to_string(),
                revision.to_string(),
                "--namespace".to_string(),
                namespace.to_string(),
            ],
        )?;
        Ok(())
    }

    fn uninstall(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        self.run(ctx, &["uninstall".to_string(), name.to_string(), "--namespace".to_string(), namespace.to_string()])?;
        Ok(())
    }

    fn list_releases(&self, ctx: &Ctx, namespace: &str) -> Result<Vec<ReleaseInfo>> {
        let out = self.run(
            ctx,
            &["list".to_string(), "--namespace".to_string(), namespace.to_string(), "-o".to_string(), "json".to_string()],
        )?;
        crate::helm_json::parse_release_list(&out, namespace)
    }

    fn detect_pending_operation(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<Option<PendingOperation>> {
        let releases = self.list_releases(ctx, namespace)?;
        Ok(releases
            .into_iter()
            .find(|r| r.name == name && crate::helm_json::is_pending(&r.status))
            .map(|r| PendingOperation { release: r.name, namespace: r.namespace, status: format!("{:?}", r.status) }))
    }

    fn cleanup_stuck_operations(&self, ctx: &Ctx, name: &str, namespace: &str) -> Result<()> {
        if self.detect_pending_operation(ctx, name, namespace)?.is_some() {
            self.uninstall(ctx, name, namespace)?;
        }
        Ok(())
    }
}
