use super::{Listener, Page, PageEvent, ScreenshotOptions, Subscription};
use crate::config::ContextOptions;
use crate::{Result, SyntheticsError};
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Awaits `fut` for at most `limit`, turning expiry into a driver error that
/// fails the calling step.
pub async fn with_timeout<T>(
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyntheticsError::Driver(format!(
            "{} timed out after {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

/// Page handed to steps. Navigations are bounded by the context's
/// navigation timeout and other page actions by its action timeout.
pub struct TimedPage {
    inner: Arc<dyn Page>,
    action: Duration,
    navigation: Duration,
}

impl TimedPage {
    pub fn wrap(inner: Arc<dyn Page>, options: &ContextOptions) -> Arc<dyn Page> {
        Arc::new(Self {
            inner,
            action: Duration::from_millis(options.action_timeout_ms),
            navigation: Duration::from_millis(options.navigation_timeout_ms),
        })
    }
}

#[async_trait]
impl Page for TimedPage {
    async fn url(&self) -> Option<String> {
        self.inner.url().await
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let what = format!("navigating to \"{}\"", url);
        with_timeout(&what, self.navigation, self.inner.goto(url)).await
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>> {
        with_timeout("screenshot", self.action, self.inner.screenshot(options)).await
    }

    fn on(&self, listener: Listener<PageEvent>) -> Subscription {
        self.inner.on(listener)
    }

    fn lifetime(&self) -> CancellationToken {
        self.inner.lifetime()
    }

    /// Backends and tests downcast to their own page type.
    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}
