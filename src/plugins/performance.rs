use crate::Result;
use crate::driver::CdpSession;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type PageMetrics = BTreeMap<String, f64>;

/// Page-level runtime counters from the Performance domain.
pub struct PerformanceManager {
    client: Arc<dyn CdpSession>,
    enabled: bool,
}

impl PerformanceManager {
    pub fn new(client: Arc<dyn CdpSession>) -> Self {
        Self {
            client,
            enabled: false,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if !self.enabled {
            self.client.enable_performance().await?;
            self.enabled = true;
            tracing::debug!("Plugins: started collecting performance metrics");
        }
        Ok(())
    }

    pub async fn get_metrics(&self) -> Result<PageMetrics> {
        let metrics = self.client.performance_metrics().await?;
        Ok(metrics.into_iter().collect())
    }

    pub fn stop(&mut self) {
        self.enabled = false;
    }
}
