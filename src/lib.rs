pub mod config;
pub mod driver;
pub mod dsl;
pub mod error;
pub mod logging;
pub mod plugins;
pub mod reporter;
pub mod runner;
pub mod timeouts;
pub mod trace;
pub mod utils;

pub use config::{ContextOptions, NetworkConditions, Params, RunOptions, ScreenshotPolicy};
pub use dsl::{HookKind, Journey, JourneyBuilder, JourneyOptions, Monitor, MonitorConfig, hook};
pub use error::{ExecutionError, SyntheticsError};
pub use reporter::{JsonReporter, Reporter};
pub use runner::{JourneyResult, ResumeSignal, Runner, Status, StepResult};

pub type Result<T> = std::result::Result<T, SyntheticsError>;
