use super::metrics::{CumulativeLayoutShift, ExperienceMetrics, UserTimings, main_thread_risk};
use super::{PerfMetrics, TraceEvent, TraceResult};
use crate::{Result, SyntheticsError};
use once_cell::sync::Lazy;
use regex::Regex;

static ACCEPTABLE_NAVIGATION_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(file|https?):").ok());

const MAIN_THREAD_NAME: &str = "CrRendererMain";

/// Trace events ordered by timestamp, anchored to the navigation the step
/// cares about.
#[derive(Debug, Clone)]
pub struct ProcessedTrace {
    /// Timestamp (us) of the last navigationStart of interest.
    pub time_origin: f64,
    pub trace_end: f64,
    pub main_frame_id: Option<String>,
    pub main_pid: Option<u32>,
    pub main_tid: Option<u32>,
    pub events: Vec<TraceEvent>,
    pub main_thread_events: Vec<TraceEvent>,
}

impl ProcessedTrace {
    pub fn relative(&self, ts: f64) -> f64 {
        ts - self.time_origin
    }

    pub fn is_main_frame(&self, event: &TraceEvent) -> bool {
        match (&self.main_frame_id, event.frame()) {
            (Some(main), Some(frame)) => main == frame,
            _ => true,
        }
    }
}

/// Navigation milestones in microseconds relative to the time origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedNavigation {
    pub first_contentful_paint: Option<f64>,
    pub largest_contentful_paint: Option<f64>,
    pub dom_content_loaded: Option<f64>,
    pub load: Option<f64>,
}

pub struct TraceProcessor;

impl TraceProcessor {
    /// Navigation metrics and named spans for one recording. Failures are
    /// logged and produce an empty result.
    pub fn compute_trace(values: &[serde_json::Value]) -> TraceResult {
        match Self::try_compute(values) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Failed to process trace events: {}", e);
                TraceResult::default()
            }
        }
    }

    fn try_compute(values: &[serde_json::Value]) -> Result<TraceResult> {
        let processed = Self::process_trace(TraceEvent::parse_all(values))?;
        let navigation = Self::process_navigation(&processed);

        let user_timings = UserTimings::compute(&processed);
        let (experience_traces, experience) = ExperienceMetrics::compute(&navigation);
        let (cls, layout_traces) = CumulativeLayoutShift::compute(&processed);

        let eil = main_thread_risk(&processed, &[0.9])
            .first()
            .map(|(_, ms)| super::MetricDuration::new(ms * 1000.0));

        let mut traces = user_timings;
        traces.extend(experience_traces);
        traces.extend(layout_traces);

        Ok(TraceResult {
            filmstrips: None,
            metrics: Some(PerfMetrics {
                cls,
                eil,
                ..experience
            }),
            traces: Some(traces),
        })
    }

    pub fn is_navigation_start_of_interest(event: &TraceEvent) -> bool {
        if event.name != "navigationStart" {
            return false;
        }
        match event.data("documentLoaderURL").and_then(|u| u.as_str()) {
            None | Some("") => true,
            Some(url) => ACCEPTABLE_NAVIGATION_URL
                .as_ref()
                .map(|re| re.is_match(url))
                .unwrap_or(false),
        }
    }

    pub fn process_trace(mut events: Vec<TraceEvent>) -> Result<ProcessedTrace> {
        if events.is_empty() {
            return Err(SyntheticsError::TracingError("no trace events".into()));
        }
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let (main_frame_id, main_pid) = find_main_frame(&events);

        let time_origin = events
            .iter()
            .filter(|e| Self::is_navigation_start_of_interest(e))
            .filter(|e| match (&main_frame_id, e.frame()) {
                (Some(main), Some(frame)) => main == frame,
                _ => true,
            })
            .next_back()
            .map(|e| e.timestamp)
            .ok_or_else(|| SyntheticsError::TracingError("no navigationStart found".into()))?;

        let main_tid = events
            .iter()
            .filter(|e| e.phase == "M" && e.name == "thread_name")
            .filter(|e| main_pid.is_none_or(|pid| e.pid == pid))
            .find(|e| {
                e.arg("name")
                    .and_then(|n| n.as_str())
                    .is_some_and(|n| n == MAIN_THREAD_NAME)
            })
            .map(|e| e.tid);

        let main_thread_events = match (main_pid, main_tid) {
            (Some(pid), Some(tid)) => events
                .iter()
                .filter(|e| e.pid == pid && e.tid == tid)
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let trace_end = events
            .iter()
            .map(|e| e.timestamp + e.dur.unwrap_or(0.0))
            .fold(time_origin, f64::max);

        Ok(ProcessedTrace {
            time_origin,
            trace_end,
            main_frame_id,
            main_pid,
            main_tid,
            events,
            main_thread_events,
        })
    }

    pub fn process_navigation(trace: &ProcessedTrace) -> ProcessedNavigation {
        let after_origin = move || {
            trace
                .events
                .iter()
                .filter(move |e| e.timestamp >= trace.time_origin && trace.is_main_frame(e))
        };
        let first = |name: &str| {
            after_origin()
                .find(|e| e.name == name)
                .map(|e| trace.relative(e.timestamp))
        };

        let last_candidate =
            after_origin().rfind(|e| e.name == "largestContentfulPaint::Candidate");
        let invalidated =
            after_origin().rfind(|e| e.name == "largestContentfulPaint::Invalidate");
        let largest_contentful_paint = match (last_candidate, invalidated) {
            (Some(candidate), Some(invalidate)) if invalidate.timestamp > candidate.timestamp => {
                None
            }
            (Some(candidate), _) => Some(trace.relative(candidate.timestamp)),
            _ => None,
        };

        ProcessedNavigation {
            first_contentful_paint: first("firstContentfulPaint"),
            largest_contentful_paint,
            dom_content_loaded: first("domContentLoadedEventEnd"),
            load: first("loadEventEnd"),
        }
    }
}

fn find_main_frame(events: &[TraceEvent]) -> (Option<String>, Option<u32>) {
    if let Some(started) = events
        .iter()
        .rfind(|e| e.name == "TracingStartedInBrowser")
        && let Some(frames) = started.data("frames").and_then(|f| f.as_array())
        && let Some(main) = frames.iter().find(|f| {
            f.get("parent").is_none_or(|p| p.is_null()) && f.get("frame").is_some()
        })
    {
        let frame = main.get("frame").and_then(|f| f.as_str()).map(String::from);
        let pid = main
            .get("processId")
            .and_then(|p| p.as_u64())
            .map(|p| p as u32);
        return (frame, pid);
    }

    if let Some(started) = events.iter().rfind(|e| e.name == "TracingStartedInPage") {
        let frame = started
            .data("page")
            .and_then(|p| p.as_str())
            .map(String::from);
        return (frame, Some(started.pid));
    }

    (None, None)
}
