use super::processor::{ProcessedNavigation, ProcessedTrace};
use super::{Filmstrip, MetricDuration, PerfMetrics, TraceEvent, TraceOutput};
use std::collections::HashMap;

const SCREENSHOT_CATEGORY: &str = "disabled-by-default-devtools.screenshot";

/// Gap (us) that closes a layout-shift session window.
const CLS_SESSION_GAP: f64 = 1_000_000.0;
/// Maximum length (us) of a layout-shift session window.
const CLS_SESSION_MAX: f64 = 5_000_000.0;

/// Baseline latency (ms) added to every input-latency estimate.
const BASE_RESPONSE_LATENCY: f64 = 16.0;

const TOP_LEVEL_TASKS: &[&str] = &[
    "RunTask",
    "ThreadControllerImpl::RunTask",
    "ThreadControllerImpl::DoWork",
    "TaskQueueManager::ProcessTaskFromWorkQueue",
];

/// Navigation timing marks the browser emits into the user timing category.
const BROWSER_TIMING_MARKS: &[&str] = &[
    "navigationStart",
    "fetchStart",
    "requestStart",
    "responseEnd",
    "unloadEventStart",
    "unloadEventEnd",
    "domLoading",
    "domInteractive",
    "domContentLoadedEventStart",
    "domContentLoadedEventEnd",
    "domComplete",
    "loadEventStart",
    "loadEventEnd",
    "firstPaint",
    "firstContentfulPaint",
    "firstMeaningfulPaint",
    "firstMeaningfulPaintCandidate",
    "paintNonDefaultBackgroundColor",
];

pub struct Filmstrips;

impl Filmstrips {
    /// Screenshot frames in recording order. Frame start times stay on the
    /// trace clock since filmstrips can be recorded without a navigation.
    pub fn compute(events: &[TraceEvent]) -> Vec<Filmstrip> {
        let mut frames: Vec<&TraceEvent> = events
            .iter()
            .filter(|e| e.name == "Screenshot" && e.category.contains(SCREENSHOT_CATEGORY))
            .collect();
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        frames
            .into_iter()
            .filter_map(|e| {
                let blob = e.arg("snapshot")?.as_str()?;
                Some(Filmstrip {
                    start: MetricDuration::new(e.timestamp),
                    blob: blob.to_string(),
                    mime: "image/jpeg".to_string(),
                })
            })
            .collect()
    }
}

pub struct UserTimings;

impl UserTimings {
    /// Marks and measures recorded through the User Timing API.
    pub fn compute(trace: &ProcessedTrace) -> Vec<TraceOutput> {
        let mut output = Vec::new();
        let mut open_measures: HashMap<(String, String), f64> = HashMap::new();

        for event in trace
            .events
            .iter()
            .filter(|e| e.category.contains("blink.user_timing"))
            .filter(|e| !BROWSER_TIMING_MARKS.contains(&e.name.as_str()))
        {
            match event.phase.as_str() {
                "R" | "I" | "i" | "n" => {
                    output.push(TraceOutput::mark(
                        &event.name,
                        trace.relative(event.timestamp),
                    ));
                }
                "b" => {
                    open_measures.insert(measure_key(event), event.timestamp);
                }
                "e" => {
                    if let Some(start) = open_measures.remove(&measure_key(event)) {
                        output.push(TraceOutput::measure(
                            &event.name,
                            trace.relative(start),
                            event.timestamp - start,
                        ));
                    }
                }
                _ => {}
            }
        }

        output.sort_by(|a, b| a.start.us.total_cmp(&b.start.us));
        output
    }
}

fn measure_key(event: &TraceEvent) -> (String, String) {
    let id = event
        .id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();
    (event.name.clone(), id)
}

pub struct ExperienceMetrics;

impl ExperienceMetrics {
    pub fn compute(navigation: &ProcessedNavigation) -> (Vec<TraceOutput>, PerfMetrics) {
        let mut traces = vec![TraceOutput::mark("navigationStart", 0.0)];
        let milestones = [
            ("firstContentfulPaint", navigation.first_contentful_paint),
            ("largestContentfulPaint", navigation.largest_contentful_paint),
            ("domContentLoaded", navigation.dom_content_loaded),
            ("loadEvent", navigation.load),
        ];
        for (name, value) in milestones {
            if let Some(us) = value {
                traces.push(TraceOutput::mark(name, us));
            }
        }

        let metrics = PerfMetrics {
            fcp: navigation.first_contentful_paint.map(MetricDuration::new),
            lcp: navigation.largest_contentful_paint.map(MetricDuration::new),
            dcl: navigation.dom_content_loaded.map(MetricDuration::new),
            load: navigation.load.map(MetricDuration::new),
            ..PerfMetrics::default()
        };
        (traces, metrics)
    }
}

pub struct CumulativeLayoutShift;

impl CumulativeLayoutShift {
    /// Largest session-window score, plus one mark per counted shift.
    pub fn compute(trace: &ProcessedTrace) -> (f64, Vec<TraceOutput>) {
        let shifts: Vec<(f64, f64)> = trace
            .events
            .iter()
            .filter(|e| e.name == "LayoutShift" && trace.is_main_frame(e))
            .filter(|e| {
                !e.data("had_recent_input")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            })
            .filter_map(|e| {
                let score = e
                    .data("weighted_score_delta")
                    .or_else(|| e.data("score"))
                    .and_then(|v| v.as_f64())?;
                Some((e.timestamp, score))
            })
            .collect();

        let traces = shifts
            .iter()
            .map(|(ts, score)| TraceOutput {
                score: Some(*score),
                ..TraceOutput::mark("LayoutShift", trace.relative(*ts))
            })
            .collect();

        (session_window_score(&shifts), traces)
    }
}

/// `shifts` are `(timestamp us, score)` in timestamp order.
fn session_window_score(shifts: &[(f64, f64)]) -> f64 {
    let mut max_score: f64 = 0.0;
    let mut window_score = 0.0;
    let mut window_start = f64::NEG_INFINITY;
    let mut previous = f64::NEG_INFINITY;

    for &(ts, score) in shifts {
        if ts - previous > CLS_SESSION_GAP || ts - window_start > CLS_SESSION_MAX {
            window_start = ts;
            window_score = 0.0;
        }
        window_score += score;
        previous = ts;
        max_score = max_score.max(window_score);
    }
    max_score
}

/// Estimated input latency (ms) at each percentile, assuming input can
/// arrive uniformly over the window from the time origin to the end of the
/// trace and must wait for the main-thread task it lands on.
pub fn main_thread_risk(trace: &ProcessedTrace, percentiles: &[f64]) -> Vec<(f64, f64)> {
    let start = trace.time_origin;
    let end = trace.trace_end;
    if end <= start || trace.main_thread_events.is_empty() {
        return Vec::new();
    }

    let mut durations = Vec::new();
    let mut clipped_length = 0.0;
    for task in trace
        .main_thread_events
        .iter()
        .filter(|e| e.phase == "X" && TOP_LEVEL_TASKS.contains(&e.name.as_str()))
    {
        let task_start = task.timestamp;
        let task_end = task_start + task.dur.unwrap_or(0.0);
        if task_end <= start || task_start >= end {
            continue;
        }
        if task_start < start {
            clipped_length = (start - task_start) / 1000.0;
        }
        durations.push((task_end.min(end) - task_start) / 1000.0);
    }
    durations.sort_by(f64::total_cmp);

    risk_percentiles(&durations, (end - start) / 1000.0, percentiles, clipped_length)
}

/// `durations` sorted ascending, all in ms. `clipped_length` is the part of
/// the first task that fell before the window.
fn risk_percentiles(
    durations: &[f64],
    total_time: f64,
    percentiles: &[f64],
    mut clipped_length: f64,
) -> Vec<(f64, f64)> {
    let busy_time: f64 = durations.iter().sum::<f64>() - clipped_length;
    let mut completed_time = total_time - busy_time;
    let mut duration = 0.0;
    let mut cdf_time = completed_time;
    let mut duration_index: isize = -1;
    let mut remaining_count = durations.len() as f64 + 1.0;
    if clipped_length > 0.0 {
        remaining_count -= 1.0;
    }

    let mut results = Vec::with_capacity(percentiles.len());
    for &percentile in percentiles {
        let percentile_time = percentile * total_time;
        while cdf_time < percentile_time && duration_index < durations.len() as isize - 1 {
            completed_time += duration;
            remaining_count -= if duration < 0.0 { -1.0 } else { 1.0 };

            let next = durations[(duration_index + 1) as usize];
            if clipped_length > 0.0 && clipped_length < next {
                duration = -clipped_length;
                clipped_length = 0.0;
            } else {
                duration_index += 1;
                duration = durations[duration_index as usize];
            }
            cdf_time = completed_time + duration.abs() * remaining_count;
        }

        let time = ((percentile_time - completed_time) / remaining_count).max(0.0)
            + BASE_RESPONSE_LATENCY;
        results.push((percentile, time));
    }
    results
}
