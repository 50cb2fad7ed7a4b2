use std::time::Duration;

/// Per-chart outcome.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum DeployStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Clone, Debug)]
pub struct DeploymentResult {
    pub chart_name: String,
    pub namespace: String,
    pub status: DeployStatus,
    pub message: String,
    pub error: Option<String>,
    pub duration: Duration,
}

impl DeploymentResult {
    pub fn success(chart_name: impl Into<String>, namespace: impl Into<String>, message: impl Into<String>, duration: Duration) -> Self {
        DeploymentResult {
            chart_name: chart_name.into(),
            namespace: namespace.into(),
            status: DeployStatus::Success,
            message: message.into(),
            error: None,
            duration,
        }
    }

    pub fn failed(chart_name: impl Into<String>, namespace: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        let error = error.into();
        DeploymentResult {
            chart_name: chart_name.into(),
            namespace: namespace.into(),
            status: DeployStatus::Failed,
            message: format!("deployment failed: {}", error),
            error: Some(error),
            duration,
        }
    }

    pub fn skipped(chart_name: impl Into<String>, namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        DeploymentResult {
            chart_name: chart_name.into(),
            namespace: namespace.into(),
            status: DeployStatus::Skipped,
            message: reason.into(),
            error: None,
            duration: Duration::from_secs(0),
        }
    }
}

/// Accumulator for a deployment run. `Results` is append-only; the
/// wave executor is its only writer.
#[derive(Clone, Debug)]
pub struct DeploymentProgress {
    pub total_charts: usize,
    pub current_phase: String,
    pub current_chart: Option<String>,
    pub results: Vec<DeploymentResult>,
}

impl DeploymentProgress {
    pub fn new(total_charts: usize) -> Self {
        DeploymentProgress {
            total_charts,
            current_phase: "Planning".to_string(),
            current_chart: None,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: DeploymentResult) {
        self.results.push(result);
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == DeployStatus::Success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == DeployStatus::Failed).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == DeployStatus::Skipped).count()
    }
}
