//! Offline processing of recorded trace events into step-level performance
//! data: navigation metrics, layout shifts, user timings and filmstrips.

pub mod metrics;
pub mod processor;

use serde::{Deserialize, Serialize};

pub use metrics::{CumulativeLayoutShift, ExperienceMetrics, Filmstrips, UserTimings};
pub use processor::{ProcessedNavigation, ProcessedTrace, TraceProcessor};

/// One raw event as delivered by `Tracing.dataCollected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    #[serde(rename = "cat", default)]
    pub category: String,
    #[serde(rename = "ph", default)]
    pub phase: String,
    /// Microseconds on the browser's monotonic clock.
    #[serde(rename = "ts", default)]
    pub timestamp: f64,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub tid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

impl TraceEvent {
    /// Parses the raw payload, skipping entries that are not trace events.
    pub fn parse_all(values: &[serde_json::Value]) -> Vec<TraceEvent> {
        values
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn arg(&self, key: &str) -> Option<&serde_json::Value> {
        self.args.as_ref().and_then(|args| args.get(key))
    }

    pub fn data(&self, key: &str) -> Option<&serde_json::Value> {
        self.arg("data").and_then(|data| data.get(key))
    }

    pub fn frame(&self) -> Option<&str> {
        self.arg("frame")
            .or_else(|| self.data("frame"))
            .and_then(|f| f.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDuration {
    pub us: f64,
}

impl MetricDuration {
    pub fn new(us: f64) -> Self {
        Self { us }
    }
}

/// A named span or mark placed on the step timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start: MetricDuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<MetricDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl TraceOutput {
    pub fn mark(name: impl Into<String>, start_us: f64) -> Self {
        Self {
            name: name.into(),
            kind: "mark".to_string(),
            start: MetricDuration::new(start_us),
            duration: None,
            score: None,
        }
    }

    pub fn measure(name: impl Into<String>, start_us: f64, duration_us: f64) -> Self {
        Self {
            name: name.into(),
            kind: "measure".to_string(),
            start: MetricDuration::new(start_us),
            duration: Some(MetricDuration::new(duration_us)),
            score: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcp: Option<MetricDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcp: Option<MetricDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dcl: Option<MetricDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<MetricDuration>,
    pub cls: f64,
    /// 90th percentile estimated input latency over the main thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eil: Option<MetricDuration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filmstrip {
    pub start: MetricDuration,
    pub blob: String,
    pub mime: String,
}

/// Result of processing one step's trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filmstrips: Option<Vec<Filmstrip>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerfMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceOutput>>,
}
