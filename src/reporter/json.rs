use super::{JourneyEndEvent, JourneyStartEvent, Reporter, StartEvent, StepEndEvent};
use crate::config::ScreenshotPolicy;
use crate::driver::SecurityDetails;
use crate::dsl::{Journey, Step, StepInfo};
use crate::error::ExecutionError;
use crate::plugins::NetworkInfo;
use crate::runner::screenshot::{CachedScreenshot, read_screenshots};
use crate::runner::Status;
use crate::utils::{duration_in_us, get_timestamp};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value, json};
use std::io::Write;

const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");
const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One synthetics document per line.
#[derive(Default)]
struct Document<'a> {
    kind: &'a str,
    timestamp: Option<i64>,
    journey: Option<&'a Journey>,
    journey_status: Option<Status>,
    step: Option<StepInfo>,
    step_status: Option<Status>,
    step_duration_us: Option<i64>,
    root_fields: Option<Value>,
    payload: Option<Value>,
    blob: Option<&'a str>,
    blob_mime: Option<&'a str>,
    error: Option<&'a ExecutionError>,
    url: Option<&'a str>,
}

/// Writes newline-delimited JSON documents for every lifecycle event.
pub struct JsonReporter {
    out: Box<dyn Write + Send>,
}

impl JsonReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write(&mut self, doc: Document<'_>) {
        let mut line = Map::new();
        line.insert("type".into(), json!(doc.kind));
        line.insert(
            "@timestamp".into(),
            json!(doc.timestamp.unwrap_or_else(get_timestamp)),
        );
        if let Some(journey) = doc.journey {
            let mut info = json!({
                "name": journey.name,
                "id": journey.id,
                "tags": journey.tags,
            });
            if let Some(status) = doc.journey_status {
                info["status"] = json!(status);
            }
            line.insert("journey".into(), info);
        }
        if let Some(step) = doc.step {
            let mut info = json!({"name": step.name, "index": step.index});
            if let Some(status) = doc.step_status {
                info["status"] = json!(status);
            }
            if let Some(us) = doc.step_duration_us {
                info["duration"] = json!({"us": us});
            }
            line.insert("step".into(), info);
        }

        let mut root_fields = match doc.root_fields {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        root_fields.insert("os".into(), json!({"platform": std::env::consts::OS}));
        root_fields.insert(
            "package".into(),
            json!({"name": PACKAGE_NAME, "version": PACKAGE_VERSION}),
        );
        line.insert("root_fields".into(), Value::Object(root_fields));

        let optional = [
            ("payload", doc.payload),
            ("blob", doc.blob.map(|b| json!(b))),
            ("blob_mime", doc.blob_mime.map(|m| json!(m))),
            ("error", doc.error.map(|e| json!(e))),
            ("url", doc.url.map(|u| json!(u))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                line.insert(key.into(), value);
            }
        }
        line.insert("package_version".into(), json!(PACKAGE_VERSION));

        let result = serde_json::to_writer(&mut self.out, &Value::Object(line))
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        if let Err(e) = result {
            tracing::warn!("Failed to write report line: {}", e);
        }
    }

    fn write_metrics<T: serde::Serialize>(
        &mut self,
        journey: &Journey,
        step: &Step,
        kind: &str,
        events: &[T],
    ) {
        for event in events {
            self.write(Document {
                kind: "step/metrics",
                journey: Some(journey),
                step: Some(step.info()),
                root_fields: Some(json!({"browser": {kind: event}})),
                ..Document::default()
            });
        }
    }

    fn write_screenshot(&mut self, journey: &Journey, screenshot: &CachedScreenshot) {
        if screenshot.data.is_empty() {
            return;
        }
        self.write(Document {
            kind: "step/screenshot",
            timestamp: Some(screenshot.timestamp),
            journey: Some(journey),
            step: Some(screenshot.step.clone()),
            blob: Some(&screenshot.data),
            blob_mime: Some("image/jpeg"),
            ..Document::default()
        });
    }
}

impl Reporter for JsonReporter {
    fn on_start(&mut self, event: &StartEvent) {
        self.write(Document {
            kind: "synthetics/metadata",
            root_fields: Some(json!({"num_journeys": event.num_journeys})),
            payload: event
                .network_conditions
                .as_ref()
                .map(|conditions| json!({"network_conditions": conditions})),
            ..Document::default()
        });
    }

    fn on_journey_register(&mut self, journey: &Journey) {
        self.write(Document {
            kind: "journey/register",
            journey: Some(journey),
            ..Document::default()
        });
    }

    fn on_journey_start(&mut self, journey: &Journey, event: &JourneyStartEvent) {
        self.write(Document {
            kind: "journey/start",
            timestamp: Some(event.timestamp),
            journey: Some(journey),
            payload: Some(json!({"source": journey.content()})),
            ..Document::default()
        });
    }

    fn on_step_end(&mut self, journey: &Journey, step: &Step, event: &StepEndEvent) {
        let result = &event.result;
        if let Some(traces) = &result.traces {
            self.write_metrics(journey, step, "relative_trace", traces);
        }
        if let Some(metrics) = &result.metrics {
            self.write_metrics(journey, step, "experience", std::slice::from_ref(metrics));
        }
        if let Some(filmstrips) = &result.filmstrips {
            for (index, strip) in filmstrips.iter().enumerate() {
                self.write(Document {
                    kind: "step/filmstrips",
                    journey: Some(journey),
                    step: Some(step.info()),
                    payload: Some(json!({"index": index})),
                    root_fields: Some(json!({
                        "browser": {"relative_trace": {"start": strip.start}}
                    })),
                    blob: Some(&strip.blob),
                    blob_mime: Some(&strip.mime),
                    ..Document::default()
                });
            }
        }

        self.write(Document {
            kind: "step/end",
            journey: Some(journey),
            step: Some(step.info()),
            step_status: Some(result.status),
            step_duration_us: Some(duration_in_us(event.end - event.start)),
            url: result.url.as_deref(),
            error: result.error.as_ref(),
            payload: Some(json!({
                "source": step
                    .location
                    .as_ref()
                    .map(|l| format!("{}:{}:{}", l.file, l.line, l.column)),
                "url": result.url,
                "status": result.status,
                "pagemetrics": result.pagemetrics,
            })),
            ..Document::default()
        });
    }

    fn on_journey_end(&mut self, journey: &Journey, event: &JourneyEndEvent) {
        let write_screenshots = match event.options.screenshots {
            ScreenshotPolicy::On => true,
            ScreenshotPolicy::OnlyOnFailure => event.status == Status::Failed,
            ScreenshotPolicy::Off => false,
        };
        if write_screenshots && let Some(dir) = &event.screenshots {
            for screenshot in read_screenshots(dir) {
                self.write_screenshot(journey, &screenshot);
            }
        }

        for info in event.networkinfo.iter().flatten() {
            let (ecs, payload) = format_network_fields(info);
            self.write(Document {
                kind: "journey/network_info",
                timestamp: Some(info.timestamp),
                journey: Some(journey),
                step: info.step.clone(),
                root_fields: Some(snake_case_keys(ecs)),
                payload: Some(snake_case_keys(payload)),
                ..Document::default()
            });
        }

        for message in event.browserconsole.iter().flatten() {
            self.write(Document {
                kind: "journey/browserconsole",
                timestamp: Some(message.timestamp),
                journey: Some(journey),
                step: Some(message.step.clone()),
                payload: Some(json!({
                    "text": message.text,
                    "type": message.kind,
                    "error": message.error,
                })),
                ..Document::default()
            });
        }

        self.write(Document {
            kind: "journey/end",
            timestamp: Some(event.timestamp),
            journey: Some(journey),
            journey_status: Some(event.status),
            error: event.error.as_ref(),
            payload: Some(json!({
                "start": event.start,
                "end": event.end,
                "status": event.status,
            })),
            ..Document::default()
        });
    }

    fn on_end(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush report output: {}", e);
        }
    }
}

fn format_tls(details: Option<&SecurityDetails>) -> Option<Value> {
    let details = details?;
    let protocol = details.protocol.as_ref()?.to_lowercase();
    let mut parts = protocol.split(' ');
    let name = parts.next().unwrap_or_default();
    let version = parts.next();

    let iso = |secs: Option<f64>| {
        secs.and_then(|s| DateTime::from_timestamp_millis((s * 1000.0) as i64))
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
    };

    Some(json!({
        "server": {
            "x509": {
                "issuer": {"common_name": details.issuer},
                "subject": {"common_name": details.subject_name},
                "not_after": iso(details.valid_to),
                "not_before": iso(details.valid_from),
            }
        },
        "version_protocol": name,
        "version": version,
    }))
}

fn format_network_fields(info: &NetworkInfo) -> (Value, Value) {
    let mut ecs = json!({
        "url": info.url,
        "http": {
            "request": info.request,
            "response": info.response,
        },
    });
    if let Some(browser) = &info.browser {
        ecs["user_agent"] = json!({
            "name": browser.name,
            "version": browser.version,
            "original": info.request.headers.get("User-Agent"),
        });
    }
    if let Some(tls) = format_tls(info.response.security_details.as_ref()) {
        ecs["tls"] = tls;
    }

    let mut payload = json!({
        "type": info.resource_type,
        "isNavigationRequest": info.is_navigation_request,
        "requestSentTime": info.request_sent_time,
        "responseReceivedTime": info.response_received_time,
        "loadEndTime": info.load_end_time,
        "transferSize": info.transfer_size,
        "resourceSize": info.resource_size,
        "timings": info.timings,
    });
    if let Some(browser) = &info.browser {
        payload["browser"] = json!(browser);
    }
    (ecs, payload)
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let chars: Vec<char> = key.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && chars[i - 1].is_lowercase();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if i > 0 && (prev_lower || (next_lower && chars[i - 1].is_uppercase())) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

/// Header maps keep their original keys.
fn snake_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = if k == "headers" { v } else { snake_case_keys(v) };
                    (to_snake_case(&k), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_case_keys).collect()),
        other => other,
    }
}
