use super::monitor::Location;
use crate::config::Params;
use crate::driver::Driver;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a step callback receives when it runs.
#[derive(Clone)]
pub struct StepContext {
    pub driver: Driver,
    pub params: Params,
}

pub type StepCallback =
    Arc<dyn Fn(StepContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Name and position of a step, used to tag captured telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub name: String,
    pub index: usize,
}

#[derive(Clone)]
pub struct Step {
    pub name: String,
    /// 1-based position within the journey.
    pub index: usize,
    pub location: Option<Location>,
    callback: StepCallback,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        index: usize,
        callback: StepCallback,
        location: Option<Location>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            location,
            callback,
        }
    }

    pub fn info(&self) -> StepInfo {
        StepInfo {
            name: self.name.clone(),
            index: self.index,
        }
    }

    pub fn call(&self, context: StepContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.callback)(context)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("location", &self.location)
            .finish()
    }
}
