use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use deploy_definitions::Result;
use serde_json::Value;

use crate::clock::Ctx;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
    Service,
    ConfigMap,
    Secret,
    Pod,
}

impl ResourceKind {
    fn kubectl_name(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::Service => "service",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
            ResourceKind::Pod => "pod",
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct PodSummary {
    pub name: String,
    pub phase: PodPhase,
    pub ready: bool,
    pub labels: BTreeMap<String, String>,
    /// The reason string kubectl reports for a non-ready waiting container
    /// (`CrashLoopBackOff`, `ImagePullBackOff`, ..), used by the recovery
    /// necessity check. Empty when the pod is healthy.
    pub waiting_reason: String,
}

/// `replicas`/`readyReplicas`/`currentReplicas`/`currentRevision`/
/// `updateRevision` off a StatefulSet or Deployment's status subresource.
#[derive(Clone, Debug, Default)]
pub struct WorkloadStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
    pub current_replicas: i32,
    pub current_revision: String,
    pub update_revision: String,
}

#[derive(Clone, Debug)]
pub struct SecretSpec {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct PersistentVolumeSpec {
    pub name: String,
    /// Opaque manifest body the cluster adapter applies as-is; the per-chart
    /// file layout and the precise PV schema are out of scope.
    pub manifest_yaml: String,
}

/// Capability set consumed by the core. As with the package-manager adapter, production
/// code shells out (here, to `kubectl`); tests substitute
/// `crate::testing::FakeClusterAdapter`.
pub trait ClusterAdapter: Send + Sync {
    fn ensure_namespace(&self, ctx: &Ctx, name: &str) -> Result<()>;
    fn get_namespaces(&self, ctx: &Ctx) -> Result<Vec<String>>;

    fn get_secret(&self, ctx: &Ctx, namespace: &str, name: &str) -> Result<Option<SecretSpec>>;
    fn create_secret(&self, ctx: &Ctx, secret: &SecretSpec) -> Result<()>;

    fn get_pods(&self, ctx: &Ctx, namespace: &str, selector: &str) -> Result<Vec<PodSummary>>;
    fn get_workload_status(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<Option<WorkloadStatus>>;

    fn exec(&self, ctx: &Ctx, namespace: &str, pod: &str, cmd: &[String]) -> Result<String>;
    fn scale(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str, replicas: u32) -> Result<()>;
    fn delete_resource(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<()>;
    fn delete_by_selector(&self, ctx: &Ctx, kind: ResourceKind, namespace: &str, selector: &str) -> Result<()>;
    fn wait_for_delete(&self, ctx: &Ctx, kind: ResourceKind, selector: &str, namespace: &str, timeout: Duration) -> Result<()>;
    fn rollout_restart(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<()>;
    fn create_persistent_volume(&self, ctx: &Ctx, pv: &PersistentVolumeSpec) -> Result<()>;
}

/// Shells out to `kubectl` found on `$PATH`.
#[derive(Clone, Default)]
pub struct KubectlAdapter;

impl KubectlAdapter {
    pub fn new() -> Self {
        KubectlAdapter
    }

    fn run(&self, ctx: &Ctx, args: &[String]) -> Result<String> {
        ctx.check().map_err(|e| format_err!("{}", e))?;
        debug!("kubectl {}", args.join(" "));
        let output = Command::new("kubectl")
            .args(args)
            .output()
            .map_err(|e| format_err!("failed to invoke kubectl: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("kubectl {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_allow_not_found(&self, ctx: &Ctx, args: &[String]) -> Result<Option<String>> {
        match self.run(ctx, args) {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                if e.to_string().to_lowercase().contains("not found") {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }
}

impl ClusterAdapter for KubectlAdapter {
    fn ensure_namespace(&self, ctx: &Ctx, name: &str) -> Result<()> {
        let existing =
            self.run_allow_not_found(ctx, &["get".to_string(), "namespace".to_string(), name.to_string(), "-o".to_string(), "name".to_string()])?;
        if existing.is_none() {
            self.run(ctx, &["create".to_string(), "namespace".to_string(), name.to_string()])?;
        }
        Ok(())
    }

    fn get_namespaces(&self, ctx: &Ctx) -> Result<Vec<String>> {
        let out = self.run(ctx, &["get".to_string(), "namespaces".to_string(), "-o".to_string(), "jsonpath={.items[*].metadata.name}".to_string()])?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    fn get_secret(&self, ctx: &Ctx, namespace: &str, name: &str) -> Result<Option<SecretSpec>> {
        let out = self.run_allow_not_found(
            ctx,
            &["get".to_string(), "secret".to_string(), name.to_string(), "-n".to_string(), namespace.to_string(), "-o".to_string(), "json".to_string()],
        )?;
        match out {
            None => Ok(None),
            Some(json) => {
                let v: Value = serde_json::from_str(&json)?;
                let data = v["data"]
                    .as_object()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string())).collect())
                    .unwrap_or_default();
                Ok(Some(SecretSpec { name: name.to_string(), namespace: namespace.to_string(), data, labels: BTreeMap::new() }))
            }
        }
    }

    fn create_secret(&self, ctx: &Ctx, secret: &SecretSpec) -> Result<()> {
        let mut args = vec![
            "create".to_string(),
            "secret".to_string(),
            "generic".to_string(),
            secret.name.clone(),
            "-n".to_string(),
            secret.namespace.clone(),
        ];
        for (k, v) in &secret.data {
            args.push(format!("--from-literal={}={}", k, v));
        }
        for (k, v) in &secret.labels {
            args.push("-l".to_string());
            args.push(format!("{}={}", k, v));
        }
        self.run(ctx, &args)?;
        Ok(())
    }

    fn get_pods(&self, ctx: &Ctx, namespace: &str, selector: &str) -> Result<Vec<PodSummary>> {
        let out = self.run(
            ctx,
            &["get".to_string(), "pods".to_string(), "-n".to_string(), namespace.to_string(), "-l".to_string(), selector.to_string(), "-o".to_string(), "json".to_string()],
        )?;
        let v: Value = serde_json::from_str(&out)?;
        let items = v["items"].as_array().cloned().unwrap_or_default();
        Ok(items.iter().map(pod_summary_from_json).collect())
    }

    fn get_workload_status(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<Option<WorkloadStatus>> {
        let out = self.run_allow_not_found(
            ctx,
            &["get".to_string(), kind.kubectl_name().to_string(), name.to_string(), "-n".to_string(), namespace.to_string(), "-o".to_string(), "json".to_string()],
        )?;
        match out {
            None => Ok(None),
            Some(json) => {
                let v: Value = serde_json::from_str(&json)?;
                let status = &v["status"];
                Ok(Some(WorkloadStatus {
                    replicas: status["replicas"].as_i64().unwrap_or(0) as i32,
                    ready_replicas: status["readyReplicas"].as_i64().unwrap_or(0) as i32,
                    current_replicas: status["currentReplicas"].as_i64().unwrap_or(0) as i32,
                    current_revision: status["currentRevision"].as_str().unwrap_or_default().to_string(),
                    update_revision: status["updateRevision"].as_str().unwrap_or_default().to_string(),
                }))
            }
        }
    }

    fn exec(&self, ctx: &Ctx, namespace: &str, pod: &str, cmd: &[String]) -> Result<String> {
        let mut args = vec!["exec".to_string(), "-n".to_string(), namespace.to_string(), pod.to_string(), "--".to_string()];
        args.extend(cmd.iter().cloned());
        self.run(ctx, &args)
    }

    fn scale(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str, replicas: u32) -> Result<()> {
        self.run(
            ctx,
            &["scale".to_string(), kind.kubectl_name().to_string(), name.to_string(), "-n".to_string(), namespace.to_string(), format!("--replicas={}", replicas)],
        )?;
        Ok(())
    }

    fn delete_resource(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        self.run(
            ctx,
            &["delete".to_string(), kind.kubectl_name().to_string(), name.to_string(), "-n".to_string(), namespace.to_string(), "--ignore-not-found".to_string()],
        )?;
        Ok(())
    }

    fn delete_by_selector(&self, ctx: &Ctx, kind: ResourceKind, namespace: &str, selector: &str) -> Result<()> {
        self.run(
            ctx,
            &["delete".to_string(), kind.kubectl_name().to_string(), "-n".to_string(), namespace.to_string(), "-l".to_string(), selector.to_string(), "--ignore-not-found".to_string()],
        )?;
        Ok(())
    }

    fn wait_for_delete(&self, ctx: &Ctx, kind: ResourceKind, selector: &str, namespace: &str, timeout: Duration) -> Result<()> {
        self.run(
            ctx,
            &[
                "wait".to_string(),
                kind.kubectl_name().to_string(),
                "-n".to_string(),
                namespace.to_string(),
                "-l".to_string(),
                selector.to_string(),
                "--for=delete".to_string(),
                format!("--timeout={}s", timeout.as_secs()),
            ],
        )?;
        Ok(())
    }

    fn rollout_restart(&self, ctx: &Ctx, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        self.run(ctx, &["rollout".to_string(), "restart".to_string(), kind.kubectl_name().to_string(), name.to_string(), "-n".to_string(), namespace.to_string()])?;
        Ok(())
    }

    fn create_persistent_volume(&self, ctx: &Ctx, pv: &PersistentVolumeSpec) -> Result<()> {
        ctx.check().map_err(|e| format_err!("{}", e))?;
        debug!("kubectl apply -f - (PersistentVolume {})", pv.name);
        use std::io::Write;
        use std::process::Stdio;
        let mut child = Command::new("kubectl")
            .args(["apply", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format_err!("failed to invoke kubectl: {}", e))?;
        child.stdin.take().unwrap().write_all(pv.manifest_yaml.as_bytes())?;
        let output = child.wait_with_output()?;
        if !output.status.success() {
            bail!("kubectl apply -f - failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(())
    }
}

fn pod_summary_from_json(item: &Value) -> PodSummary {
    let phase = match item["status"]["phase"].as_str().unwrap_or_default() {
        "Pending" => PodPhase::Pending,
        "Running" => PodPhase::Running,
        "Succeeded" => PodPhase::Succeeded,
        "Failed" => PodPhase::Failed,
        _ => PodPhase::Unknown,
    };
    let labels = item["metadata"]["labels"]
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string())).collect())
        .unwrap_or_default();

    let mut ready = true;
    let mut waiting_reason = String::new();
    if let Some(conditions) = item["status"]["conditions"].as_array() {
        let ready_condition = conditions.iter().find(|c| c["type"].as_str() == Some("Ready"));
        ready = ready_condition.map(|c| c["status"].as_str() == Some("True")).unwrap_or(false);
    } else {
        ready = false;
    }
    if let Some(statuses) = item["status"]["containerStatuses"].as_array() {
        for cs in statuses {
            if let Some(reason) = cs["state"]["waiting"]["reason"].as_str() {
                waiting_reason = reason.to_string();
            }
        }
    }

    PodSummary {
        name: item["metadata"]["name"].as_str().unwrap_or_default().to_string(),
        phase,
        ready,
        labels,
        waiting_reason,
    }
}
