use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyntheticsError {
    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Tracing error: {0}")]
    TracingError(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid schedule: {schedule}, allowed values are {allowed}{location}")]
    InvalidSchedule {
        schedule: String,
        allowed: String,
        location: String,
    },

    #[error("Duplicate monitor ids: {0}")]
    DuplicateMonitors(String),

    #[error("{0} is called outside of the journey context")]
    HookOutsideJourney(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("General error: {0}")]
    General(String),
}

impl SyntheticsError {
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Driver(_) => vec![
                "Ensure Chrome/Chromium is installed".into(),
                "Check if the browser was closed while journeys were running".into(),
            ],
            Self::InvalidSchedule { .. } => vec![
                "Use one of the allowed schedules (in minutes)".into(),
                "Check the schedule passed to monitor.use or the run defaults".into(),
            ],
            Self::DuplicateMonitors(_) => vec![
                "Give every journey a unique id".into(),
                "Check co-located journeys that share the same name".into(),
            ],
            Self::HookOutsideJourney(_) => {
                vec!["Register before/after hooks inside the journey builder".into()]
            }
            Self::ConfigError(_) | Self::TomlDeError(_) => vec![
                "Check configuration file syntax".into(),
                "Run with --verbose to see detailed error".into(),
            ],
            _ => vec!["Run with --verbose for more details".into()],
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Driver(_) => 3,
            Self::IoError(_) | Self::ScreenshotFailed(_) => 6,
            Self::ConfigError(_) | Self::TomlDeError(_) => 7,
            Self::InvalidSchedule { .. }
            | Self::DuplicateMonitors(_)
            | Self::HookOutsideJourney(_) => 2,
            _ => 1,
        }
    }
}

/// Failure raised by a step, hook or driver call, kept as data so it can be
/// cloned into step results, journey results and reporter payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "step panicked".to_string());
        Self::new(message)
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(error: anyhow::Error) -> Self {
        Self::from(&error)
    }
}

impl From<&anyhow::Error> for ExecutionError {
    fn from(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            causes: error.chain().skip(1).map(|c| c.to_string()).collect(),
        }
    }
}

impl From<SyntheticsError> for ExecutionError {
    fn from(error: SyntheticsError) -> Self {
        Self::new(error.to_string())
    }
}
