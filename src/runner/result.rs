use crate::error::ExecutionError;
use crate::plugins::{BrowserMessage, NetworkInfo, PageMetrics};
use crate::trace::{Filmstrip, PerfMetrics, TraceOutput, TraceResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Succeeded => write!(f, "succeeded"),
            Status::Failed => write!(f, "failed"),
            Status::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagemetrics: Option<PageMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filmstrips: Option<Vec<Filmstrip>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerfMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceOutput>>,
}

impl StepResult {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            url: None,
            error: None,
            pagemetrics: None,
            filmstrips: None,
            metrics: None,
            traces: None,
        }
    }

    pub fn skipped() -> Self {
        Self::new(Status::Skipped)
    }

    pub fn fail(&mut self, error: ExecutionError) {
        self.status = Status::Failed;
        self.error = Some(error);
    }

    pub fn merge_trace(&mut self, trace: TraceResult) {
        self.filmstrips = trace.filmstrips;
        self.metrics = trace.metrics;
        self.traces = trace.traces;
    }
}

impl Default for StepResult {
    fn default() -> Self {
        Self::new(Status::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyResult {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networkinfo: Option<Vec<NetworkInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browserconsole: Option<Vec<BrowserMessage>>,
}

impl JourneyResult {
    pub fn succeeded() -> Self {
        Self {
            status: Status::Succeeded,
            error: None,
            steps: Vec::new(),
            networkinfo: None,
            browserconsole: None,
        }
    }

    pub fn failed(error: ExecutionError) -> Self {
        Self {
            status: Status::Failed,
            error: Some(error),
            ..Self::succeeded()
        }
    }

    pub fn fail(&mut self, error: ExecutionError) {
        self.status = Status::Failed;
        self.error = Some(error);
    }
}
