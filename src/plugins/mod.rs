//! Telemetry capture bound to one browsing session.

pub mod barrier;
pub mod console;
pub mod network;
pub mod performance;
pub mod trace;

use crate::Result;
use crate::driver::Driver;
use crate::dsl::StepInfo;
use crate::trace::TraceResult;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

pub use barrier::BarrierScope;
pub use console::{BrowserConsole, BrowserMessage, DEFAULT_MESSAGE_LIMIT, MessageLog};
pub use network::{BrowserInfo, NetworkInfo, NetworkManager, Timings};
pub use performance::{PageMetrics, PerformanceManager};
pub use trace::{TraceOptions, Tracing};

/// The step currently executing, shared with event listeners. `None`
/// before the first step starts.
pub type StepCursor = Arc<RwLock<Option<StepInfo>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    Network,
    Trace,
    Performance,
    BrowserConsole,
}

impl PluginType {
    pub const ALL: [PluginType; 4] = [
        PluginType::Network,
        PluginType::Trace,
        PluginType::Performance,
        PluginType::BrowserConsole,
    ];
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginType::Network => write!(f, "network"),
            PluginType::Trace => write!(f, "trace"),
            PluginType::Performance => write!(f, "performance"),
            PluginType::BrowserConsole => write!(f, "browserconsole"),
        }
    }
}

/// What a plugin hands back when stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginData {
    Network(Vec<NetworkInfo>),
    BrowserConsole(Vec<BrowserMessage>),
    Trace(TraceResult),
    Performance,
    None,
}

/// Journey-level capture, drained once the journey ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networkinfo: Option<Vec<NetworkInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browserconsole: Option<Vec<BrowserMessage>>,
}

pub struct PluginManager {
    driver: Driver,
    current_step: StepCursor,
    network: Option<NetworkManager>,
    trace: Option<Tracing>,
    performance: Option<PerformanceManager>,
    console: Option<BrowserConsole>,
}

impl PluginManager {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            current_step: Arc::new(RwLock::new(None)),
            network: None,
            trace: None,
            performance: None,
            console: None,
        }
    }

    pub fn register(&mut self, kind: PluginType, options: TraceOptions) {
        let driver = &self.driver;
        match kind {
            PluginType::Network => {
                self.network = Some(NetworkManager::new(
                    driver.context.clone(),
                    driver.client.clone(),
                    self.current_step.clone(),
                ))
            }
            PluginType::Trace => self.trace = Some(Tracing::new(driver.client.clone(), options)),
            PluginType::Performance => {
                self.performance = Some(PerformanceManager::new(driver.client.clone()))
            }
            PluginType::BrowserConsole => {
                self.console = Some(BrowserConsole::new(
                    driver.page.clone(),
                    self.current_step.clone(),
                ))
            }
        }
    }

    pub fn register_all(&mut self, options: TraceOptions) {
        for kind in PluginType::ALL {
            self.register(kind, options);
        }
    }

    pub fn unregister_all(&mut self) {
        self.network = None;
        self.trace = None;
        self.performance = None;
        self.console = None;
    }

    pub fn is_registered(&self, kind: PluginType) -> bool {
        match kind {
            PluginType::Network => self.network.is_some(),
            PluginType::Trace => self.trace.is_some(),
            PluginType::Performance => self.performance.is_some(),
            PluginType::BrowserConsole => self.console.is_some(),
        }
    }

    /// Starts a registered plugin; unregistered plugins are ignored.
    pub async fn start(&mut self, kind: PluginType) -> Result<()> {
        match kind {
            PluginType::Network => {
                if let Some(network) = self.network.as_mut() {
                    network.start().await?;
                }
            }
            PluginType::Trace => {
                if let Some(trace) = self.trace.as_ref() {
                    trace.start().await?;
                }
            }
            PluginType::Performance => {
                if let Some(performance) = self.performance.as_mut() {
                    performance.start().await?;
                }
            }
            PluginType::BrowserConsole => {
                if let Some(console) = self.console.as_mut() {
                    console.start();
                }
            }
        }
        Ok(())
    }

    pub async fn stop(&mut self, kind: PluginType) -> Result<PluginData> {
        Ok(match kind {
            PluginType::Network => match self.network.as_mut() {
                Some(network) => PluginData::Network(network.stop().await),
                None => PluginData::None,
            },
            PluginType::Trace => match self.trace.as_ref() {
                Some(trace) => PluginData::Trace(trace.stop().await?),
                None => PluginData::None,
            },
            PluginType::Performance => match self.performance.as_mut() {
                Some(performance) => {
                    performance.stop();
                    PluginData::Performance
                }
                None => PluginData::None,
            },
            PluginType::BrowserConsole => match self.console.as_mut() {
                Some(console) => PluginData::BrowserConsole(console.stop()),
                None => PluginData::None,
            },
        })
    }

    pub fn performance(&self) -> Option<&PerformanceManager> {
        self.performance.as_ref()
    }

    pub fn trace(&self) -> Option<&Tracing> {
        self.trace.as_ref()
    }

    /// Points step-tagging plugins at the step about to run.
    pub fn on_step(&self, step: StepInfo) {
        *self.current_step.write() = Some(step);
    }

    pub fn current_step(&self) -> Option<StepInfo> {
        self.current_step.read().clone()
    }

    /// Stops network and console capture and returns their buffers.
    pub async fn output(&mut self) -> PluginOutput {
        let mut output = PluginOutput::default();
        if let Some(network) = self.network.as_mut() {
            output.networkinfo = Some(network.stop().await);
        }
        if let Some(console) = self.console.as_mut() {
            output.browserconsole = Some(console.stop());
        }
        output
    }
}
