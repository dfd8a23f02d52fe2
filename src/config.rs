use crate::dsl::monitor::{ALLOWED_SCHEDULES, MonitorConfig, ThrottlingConfig};
use crate::{Result, SyntheticsError, timeouts::ms};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type Params = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotPolicy {
    On,
    #[default]
    Off,
    OnlyOnFailure,
}

impl ScreenshotPolicy {
    pub fn should_capture(self, step_failed: bool) -> bool {
        match self {
            ScreenshotPolicy::On => true,
            ScreenshotPolicy::OnlyOnFailure => step_failed,
            ScreenshotPolicy::Off => false,
        }
    }
}

impl std::str::FromStr for ScreenshotPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" | "true" => Ok(ScreenshotPolicy::On),
            "off" | "false" => Ok(ScreenshotPolicy::Off),
            "only-on-failure" => Ok(ScreenshotPolicy::OnlyOnFailure),
            _ => Err(format!("Unknown screenshot option: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConditions {
    #[serde(default)]
    pub offline: bool,
    /// Bytes per second, -1 disables throttling.
    pub download_throughput: f64,
    pub upload_throughput: f64,
    /// Milliseconds.
    pub latency: f64,
}

impl NetworkConditions {
    pub fn from_throttling(throttling: &ThrottlingConfig) -> Self {
        Self {
            offline: false,
            download_throughput: megabits_to_bytes(throttling.download),
            upload_throughput: megabits_to_bytes(throttling.upload),
            latency: throttling.latency,
        }
    }
}

fn megabits_to_bytes(megabits: f64) -> f64 {
    (megabits * 1024.0 * 1024.0) / 8.0
}

/// Options applied to every browsing context the runner creates.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContextOptions {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ignore_https_errors: bool,
    #[serde(default = "default_action_timeout")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,
    #[serde(skip)]
    pub network_conditions: Option<NetworkConditions>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            ignore_https_errors: false,
            action_timeout_ms: default_action_timeout(),
            navigation_timeout_ms: default_navigation_timeout(),
            network_conditions: None,
        }
    }
}

fn default_action_timeout() -> u64 {
    ms::DEFAULT_ACTION
}

fn default_navigation_timeout() -> u64 {
    ms::DEFAULT_NAVIGATION
}

/// Run-level monitor defaults, merged under each journey's own settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorDefaults {
    #[serde(default)]
    pub schedule: Option<u32>,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    #[serde(default)]
    pub private_locations: Option<Vec<String>>,
    #[serde(default)]
    pub throttling: Option<ThrottlingConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunOptions {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub screenshots: ScreenshotPolicy,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub pause_on_error: bool,
    #[serde(default)]
    pub metrics: bool,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub trace: bool,
    #[serde(default)]
    pub filmstrips: bool,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub network_conditions: Option<NetworkConditions>,
    #[serde(default)]
    pub context: ContextOptions,
    #[serde(default)]
    pub monitor: MonitorDefaults,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            params: Params::new(),
            screenshots: ScreenshotPolicy::default(),
            dry_run: false,
            match_pattern: None,
            tags: None,
            pause_on_error: false,
            metrics: false,
            network: false,
            trace: false,
            filmstrips: false,
            environment: default_environment(),
            network_conditions: None,
            context: ContextOptions::default(),
            monitor: MonitorDefaults::default(),
        }
    }
}

impl RunOptions {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut options: RunOptions = toml::from_str(content)?;
        options.load_from_env();
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads `synthetics.toml` from the working directory when present,
    /// falling back to defaults.
    pub fn load_default() -> Result<Self> {
        let project_path = PathBuf::from("synthetics.toml");
        if project_path.exists() {
            return Self::load(&project_path);
        }
        let mut options = Self::default();
        options.load_from_env();
        Ok(options)
    }

    fn load_from_env(&mut self) {
        if let Ok(screenshots) = std::env::var("SYNTHETICS_SCREENSHOTS")
            && let Ok(policy) = screenshots.parse()
        {
            self.screenshots = policy;
        }
        if let Ok(env) = std::env::var("SYNTHETICS_ENV")
            && !env.is_empty()
        {
            self.environment = env;
        }
    }

    /// Tracing is needed for either raw traces or filmstrips.
    pub fn trace_enabled(&self) -> bool {
        self.trace || self.filmstrips
    }

    pub fn context_options(&self) -> ContextOptions {
        let mut context = self.context.clone();
        context.network_conditions = self.network_conditions.clone();
        context
    }

    /// Monitor configuration derived from run-level defaults.
    pub fn monitor_defaults(&self) -> MonitorConfig {
        MonitorConfig {
            schedule: self.monitor.schedule,
            locations: self.monitor.locations.clone(),
            private_locations: self.monitor.private_locations.clone(),
            throttling: self.monitor.throttling.clone(),
            params: if self.params.is_empty() {
                None
            } else {
                Some(self.params.clone())
            },
            ..MonitorConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.context.action_timeout_ms == 0 || self.context.navigation_timeout_ms == 0 {
            return Err(SyntheticsError::ConfigError(
                "action and navigation timeouts must be greater than 0".into(),
            ));
        }

        if let Some(schedule) = self.monitor.schedule
            && !ALLOWED_SCHEDULES.contains(&schedule)
        {
            return Err(SyntheticsError::ConfigError(format!(
                "default schedule {} is not one of {:?}",
                schedule, ALLOWED_SCHEDULES
            )));
        }

        if let Some(ref conditions) = self.network_conditions
            && conditions.latency < 0.0
        {
            return Err(SyntheticsError::ConfigError(
                "network latency must not be negative".into(),
            ));
        }

        Ok(())
    }
}
