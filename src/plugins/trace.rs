use crate::Result;
use crate::driver::{CdpSession, TracingEvent};
use crate::timeouts;
use crate::trace::{Filmstrips, TraceEvent, TraceProcessor, TraceResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceOptions {
    pub filmstrips: bool,
    pub trace: bool,
}

impl TraceOptions {
    pub fn enabled(&self) -> bool {
        self.filmstrips || self.trace
    }

    /// Categories to record; every default category is excluded.
    pub fn categories(&self) -> Vec<String> {
        let mut categories = vec!["-*"];
        if self.filmstrips {
            categories.push("disabled-by-default-devtools.screenshot");
        }
        if self.trace {
            categories.extend([
                "disabled-by-default-lighthouse",
                "loading",
                "blink.user_timing",
                "devtools.timeline",
                "disabled-by-default-devtools.timeline",
            ]);
        }
        categories.into_iter().map(String::from).collect()
    }
}

/// Records a trace around a single step.
pub struct Tracing {
    client: Arc<dyn CdpSession>,
    options: TraceOptions,
    drain_timeout: Duration,
}

impl Tracing {
    pub fn new(client: Arc<dyn CdpSession>, options: TraceOptions) -> Self {
        Self {
            client,
            options,
            drain_timeout: Duration::from_secs(timeouts::secs::TRACE_DRAIN),
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn options(&self) -> TraceOptions {
        self.options
    }

    pub async fn start(&self) -> Result<()> {
        tracing::debug!("Plugins: started collecting trace events");
        self.client.start_tracing(&self.options.categories()).await
    }

    /// Ends the recording and processes what was collected. The completion
    /// event and the end command are awaited together, in either order.
    pub async fn stop(&self) -> Result<TraceResult> {
        let events: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
        let (complete_tx, complete_rx) = oneshot::channel::<()>();
        let complete_tx = Mutex::new(Some(complete_tx));

        let collected = events.clone();
        let subscription = self.client.on_tracing(Arc::new(move |event: &TracingEvent| {
            match event {
                TracingEvent::DataCollected(values) => {
                    collected.lock().extend(values.iter().cloned());
                }
                TracingEvent::TracingComplete => {
                    if let Some(tx) = complete_tx.lock().take() {
                        let _ = tx.send(());
                    }
                }
            }
        }));

        let (completed, ended) = tokio::join!(
            tokio::time::timeout(self.drain_timeout, complete_rx),
            self.client.end_tracing()
        );
        subscription.detach();

        ended?;
        if completed.is_err() {
            tracing::warn!(
                "Tracing did not complete within {:?}, processing collected events",
                self.drain_timeout
            );
        }

        let values = std::mem::take(&mut *events.lock());
        tracing::debug!(events = values.len(), "Plugins: stopped collecting trace events");
        Ok(self.process(&values))
    }

    fn process(&self, values: &[serde_json::Value]) -> TraceResult {
        let mut output = TraceResult::default();
        if self.options.filmstrips {
            output.filmstrips = Some(Filmstrips::compute(&TraceEvent::parse_all(values)));
        }
        if self.options.trace {
            let computed = TraceProcessor::compute_trace(values);
            output.metrics = computed.metrics;
            output.traces = computed.traces;
        }
        output
    }
}
