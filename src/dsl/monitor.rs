use crate::config::{Params, ScreenshotPolicy};
use crate::{Result, SyntheticsError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Schedules (in minutes) accepted by the monitor management service.
pub const ALLOWED_SCHEDULES: &[u32] = &[1, 3, 5, 10, 15, 20, 30, 60, 120, 240];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl From<&std::panic::Location<'_>> for Location {
    fn from(location: &std::panic::Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    /// Megabits per second.
    pub download: f64,
    pub upload: f64,
    /// Milliseconds.
    pub latency: f64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            download: 5.0,
            upload: 3.0,
            latency: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub monitor_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_locations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttling: Option<ThrottlingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playwright_options: Option<Value>,
}

impl MonitorConfig {
    /// Shallow overlay: every field set on `other` replaces ours.
    pub fn overlay(self, other: MonitorConfig) -> Self {
        Self {
            id: other.id.or(self.id),
            name: other.name.or(self.name),
            monitor_type: other.monitor_type.or(self.monitor_type),
            tags: other.tags.or(self.tags),
            schedule: other.schedule.or(self.schedule),
            enabled: other.enabled.or(self.enabled),
            locations: other.locations.or(self.locations),
            private_locations: other.private_locations.or(self.private_locations),
            throttling: other.throttling.or(self.throttling),
            screenshot: other.screenshot.or(self.screenshot),
            params: other.params.or(self.params),
            alert: other.alert.or(self.alert),
            playwright_options: other.playwright_options.or(self.playwright_options),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorFilter {
    #[serde(rename = "match")]
    pub match_pattern: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Monitor {
    pub config: MonitorConfig,
    pub content: String,
    pub source: Option<Location>,
    pub filter: Option<MonitorFilter>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.config.id.as_deref()
    }

    pub fn monitor_type(&self) -> Option<&str> {
        self.config.monitor_type.as_deref()
    }

    /// Merges `global` underneath the current configuration. Values set at
    /// creation time win, nested objects merge recursively and arrays are
    /// taken from the winning side with duplicates removed.
    pub fn update(&mut self, global: &MonitorConfig) -> Result<()> {
        let target = serde_json::to_value(global)?;
        let source = serde_json::to_value(&self.config)?;
        self.config = serde_json::from_value(deep_merge(target, source))?;
        Ok(())
    }

    pub fn set_source(&mut self, source: Option<Location>) {
        self.source = source;
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn set_filter(&mut self, filter: MonitorFilter) {
        self.filter = Some(filter);
    }

    /// Identifies whether the monitor changed since it was last pushed:
    /// configuration, journey code and file path all contribute.
    pub fn hash(&self) -> Result<String> {
        let config = serde_json::to_string(&self.config)?;
        let mut hasher = Sha256::new();
        hasher.update(config.as_bytes());
        hasher.update(self.content.as_bytes());
        hasher.update(
            self.source
                .as_ref()
                .map(|s| s.file.as_str())
                .unwrap_or("")
                .as_bytes(),
        );
        Ok(base64::engine::general_purpose::STANDARD.encode(hasher.finalize()))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(schedule) = self.config.schedule
            && ALLOWED_SCHEDULES.contains(&schedule)
        {
            return Ok(());
        }

        let allowed = ALLOWED_SCHEDULES
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let location = self
            .source
            .as_ref()
            .map(|s| {
                format!(
                    "\n   * {} - {}:{}:{}",
                    self.id().unwrap_or_default(),
                    s.file,
                    s.line,
                    s.column
                )
            })
            .unwrap_or_default();

        Err(SyntheticsError::InvalidSchedule {
            schedule: self
                .config
                .schedule
                .map(|s| s.to_string())
                .unwrap_or_else(|| "undefined".to_string()),
            allowed,
            location,
        })
    }
}

fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target), Value::Object(source)) => {
            for (key, value) in source {
                let merged = match target.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => dedupe_arrays(value),
                };
                target.insert(key, merged);
            }
            Value::Object(
                target
                    .into_iter()
                    .map(|(k, v)| (k, dedupe_arrays(v)))
                    .collect(),
            )
        }
        (_, source) => dedupe_arrays(source),
    }
}

fn dedupe_arrays(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            Value::Array(unique)
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, dedupe_arrays(v)))
                .collect(),
        ),
        other => other,
    }
}
