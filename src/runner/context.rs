use crate::{Result, SyntheticsError};
use crate::config::{ContextOptions, Params, RunOptions};
use crate::driver::{BrowserDriver, Driver, TimedPage};
use crate::plugins::{PluginManager, PluginType, TraceOptions};
use crate::utils::monotonic_time_in_seconds;

/// Browsing session and capture state owned by one journey run.
pub struct JourneyContext {
    /// Monotonic seconds.
    pub start: f64,
    pub params: Params,
    pub driver: Driver,
    pub plugins: PluginManager,
}

impl JourneyContext {
    pub async fn new(browser: &dyn BrowserDriver, options: &RunOptions) -> Result<Self> {
        let driver = Gatherer::setup_driver(browser, &options.context_options()).await?;
        let start = monotonic_time_in_seconds();
        let plugins = Gatherer::begin_recording(&driver, options).await;
        Ok(Self {
            start,
            params: options.params.clone(),
            driver,
            plugins,
        })
    }
}

/// Sets up and tears down the per-journey browsing session.
pub struct Gatherer;

impl Gatherer {
    /// Opens a fresh context with one timeout-bounded page, its protocol
    /// session and a request context. A failure after the context opened
    /// closes it again.
    pub async fn setup_driver(
        browser: &dyn BrowserDriver,
        options: &ContextOptions,
    ) -> Result<Driver> {
        tracing::debug!("Gatherer: setup driver");
        let context = browser.new_context(options).await?;
        let rest = async {
            let page = TimedPage::wrap(context.new_page().await?, options);
            let client = context.new_cdp_session(&page).await?;
            let request = browser.new_request_context(options).await?;
            Ok::<_, SyntheticsError>((page, client, request))
        }
        .await;

        match rest {
            Ok((page, client, request)) => Ok(Driver {
                context,
                page,
                client,
                request,
            }),
            Err(e) => {
                if let Err(close) = context.close().await {
                    tracing::warn!("Failed to close browser context: {}", close);
                }
                Err(e)
            }
        }
    }

    /// Registers every plugin and starts the ones the run asked for.
    /// Console capture always runs; start failures are logged and the
    /// journey proceeds without that plugin.
    pub async fn begin_recording(driver: &Driver, options: &RunOptions) -> PluginManager {
        tracing::debug!("Gatherer: started recording");
        let mut plugins = PluginManager::new(driver.clone());
        plugins.register_all(TraceOptions {
            filmstrips: options.filmstrips,
            trace: options.trace,
        });

        let mut wanted = vec![PluginType::BrowserConsole];
        if options.network {
            wanted.push(PluginType::Network);
        }
        if options.metrics {
            wanted.push(PluginType::Performance);
        }
        for kind in wanted {
            if let Err(e) = plugins.start(kind).await {
                tracing::warn!(plugin = %kind, "Failed to start plugin: {}", e);
            }
        }
        plugins
    }

    pub async fn dispose(driver: &Driver) {
        tracing::debug!("Gatherer: closing all contexts");
        if let Err(e) = driver.request.dispose().await {
            tracing::warn!("Failed to dispose request context: {}", e);
        }
        if let Err(e) = driver.context.close().await {
            tracing::warn!("Failed to close browser context: {}", e);
        }
    }
}
