//! Journey authoring surface: journeys, steps, hooks and monitor settings.

pub mod hooks;
pub mod journey;
pub mod monitor;
pub mod step;

pub use hooks::{HookArgs, HookCallback, HookKind, Hooks, hook};
pub use journey::{Journey, JourneyBuilder, JourneyOptions, JourneyPlan};
pub use monitor::{
    ALLOWED_SCHEDULES, Location, Monitor, MonitorConfig, MonitorFilter, ThrottlingConfig,
};
pub use step::{Step, StepCallback, StepContext, StepInfo};
