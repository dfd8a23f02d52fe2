//! Sinks that receive the runner's lifecycle callbacks.

pub mod json;

use crate::config::{NetworkConditions, Params, RunOptions};
use crate::dsl::{Journey, Step};
use crate::error::ExecutionError;
use crate::plugins::{BrowserMessage, NetworkInfo};
use crate::runner::{Status, StepResult};
use serde::Serialize;
use std::path::PathBuf;

pub use json::JsonReporter;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    pub num_journeys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_conditions: Option<NetworkConditions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JourneyStartEvent {
    /// Epoch microseconds.
    pub timestamp: i64,
    pub params: Params,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepEndEvent {
    /// Monotonic seconds.
    pub start: f64,
    pub end: f64,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct JourneyEndEvent {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Monotonic seconds.
    pub start: f64,
    pub end: f64,
    /// Epoch microseconds.
    pub timestamp: i64,
    #[serde(skip)]
    pub options: RunOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networkinfo: Option<Vec<NetworkInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browserconsole: Option<Vec<BrowserMessage>>,
    /// Directory holding the journey's cached screenshots, if any.
    #[serde(skip)]
    pub screenshots: Option<PathBuf>,
}

/// Receives the runner's lifecycle callbacks.
///
/// Order per run: `on_start`, then either `on_journey_register` for every
/// journey (dry run) or, per journey, `on_journey_start`, `on_step_start` /
/// `on_step_end` for every step and `on_journey_end`; finally `on_end`.
/// Every callback defaults to doing nothing.
pub trait Reporter: Send {
    fn on_start(&mut self, _event: &StartEvent) {}

    fn on_journey_register(&mut self, _journey: &Journey) {}

    fn on_journey_start(&mut self, _journey: &Journey, _event: &JourneyStartEvent) {}

    fn on_step_start(&mut self, _journey: &Journey, _step: &Step) {}

    fn on_step_end(&mut self, _journey: &Journey, _step: &Step, _event: &StepEndEvent) {}

    fn on_journey_end(&mut self, _journey: &Journey, _event: &JourneyEndEvent) {}

    fn on_end(&mut self) {}
}

/// Reporter that drops everything.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}
