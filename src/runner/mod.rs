//! Journey execution engine.

pub mod context;
pub mod result;
pub mod screenshot;

use crate::config::RunOptions;
use crate::driver::{BrowserDriver, ContextEvent};
use crate::dsl::{
    HookArgs, HookCallback, HookKind, Journey, JourneyBuilder, JourneyOptions, Monitor,
    MonitorConfig, Step, StepContext, hooks::run_hooks,
};
use crate::error::ExecutionError;
use crate::plugins::{PluginData, PluginType};
use crate::reporter::{
    JourneyEndEvent, JourneyStartEvent, NoopReporter, Reporter, StartEvent, StepEndEvent,
};
use crate::utils::{default_cache_root, get_timestamp, monotonic_time_in_seconds};
use crate::{Result, SyntheticsError};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncBufReadExt;

pub use context::{Gatherer, JourneyContext};
pub use result::{JourneyResult, Status, StepResult};
pub use screenshot::{CachedScreenshot, ScreenshotCache};

/// Gate used by `pause_on_error`: the runner waits on it after a failed
/// step before moving on.
#[async_trait]
pub trait ResumeSignal: Send + Sync {
    async fn wait(&self);
}

/// Resumes once a line is read from stdin.
#[derive(Debug, Default)]
pub struct StdinResume;

#[async_trait]
impl ResumeSignal for StdinResume {
    async fn wait(&self) {
        tracing::info!("Paused on error, press enter to continue");
        let mut line = String::new();
        let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = reader.read_line(&mut line).await {
            tracing::warn!("Failed to read resume signal: {}", e);
        }
    }
}

#[derive(Default)]
struct GlobalHooks {
    before_all: Vec<HookCallback>,
    after_all: Vec<HookCallback>,
}

/// Runs registered journeys one after another, each in its own browsing
/// context, and reports every lifecycle event.
///
/// One instance is meant to be created at startup and shared with every
/// registration site. Only one [`Runner::run`] may be in flight; a second
/// concurrent call returns no results.
pub struct Runner {
    browser: Arc<dyn BrowserDriver>,
    active: AtomicBool,
    journeys: Mutex<Vec<Arc<Journey>>>,
    current_journey: Mutex<Option<Arc<Journey>>>,
    hooks: Mutex<GlobalHooks>,
    monitor: Mutex<Option<Monitor>>,
    reporter: Mutex<Box<dyn Reporter>>,
    resume: Arc<dyn ResumeSignal>,
    screenshots: ScreenshotCache,
}

impl Runner {
    pub fn new(browser: Arc<dyn BrowserDriver>) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        Self {
            browser,
            active: AtomicBool::new(false),
            journeys: Mutex::new(Vec::new()),
            current_journey: Mutex::new(None),
            hooks: Mutex::new(GlobalHooks::default()),
            monitor: Mutex::new(None),
            reporter: Mutex::new(Box::new(NoopReporter)),
            resume: Arc::new(StdinResume),
            screenshots: ScreenshotCache::new(&default_cache_root(), &run_id),
        }
    }

    pub fn with_reporter(self, reporter: impl Reporter + 'static) -> Self {
        *self.reporter.lock() = Box::new(reporter);
        self
    }

    pub fn with_resume_signal(mut self, resume: Arc<dyn ResumeSignal>) -> Self {
        self.resume = resume;
        self
    }

    /// Screenshots are cached under `<root>/<run id>/screenshots`.
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.screenshots = ScreenshotCache::new(&root.into(), &run_id);
        self
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.screenshots.dir().to_path_buf()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Registers a journey defined at the caller's location.
    #[track_caller]
    pub fn journey<F>(&self, options: impl Into<JourneyOptions>, describe: F) -> Arc<Journey>
    where
        F: Fn(&mut JourneyBuilder<'_>) + Send + Sync + 'static,
    {
        self.add_journey(Journey::new(options, describe))
    }

    pub fn add_journey(&self, journey: Journey) -> Arc<Journey> {
        let journey = Arc::new(journey);
        self.journeys.lock().push(journey.clone());
        *self.current_journey.lock() = Some(journey.clone());
        journey
    }

    pub fn journeys(&self) -> Vec<Arc<Journey>> {
        self.journeys.lock().clone()
    }

    pub fn current_journey(&self) -> Option<Arc<Journey>> {
        self.current_journey.lock().clone()
    }

    /// Registers a run-wide hook. Per-journey hooks belong in the journey
    /// builder.
    pub fn add_hook(&self, kind: HookKind, callback: HookCallback) -> Result<()> {
        let mut hooks = self.hooks.lock();
        match kind {
            HookKind::BeforeAll => hooks.before_all.push(callback),
            HookKind::AfterAll => hooks.after_all.push(callback),
            HookKind::Before | HookKind::After => {
                return Err(SyntheticsError::HookOutsideJourney(kind.to_string()));
            }
        }
        Ok(())
    }

    /// Sets run-level monitor defaults. Settings from earlier calls win
    /// over later ones.
    pub fn update_monitor(&self, config: MonitorConfig) -> Result<()> {
        let mut monitor = self.monitor.lock();
        match monitor.as_mut() {
            Some(existing) => existing.update(&config),
            None => {
                *monitor = Some(Monitor::new(config));
                Ok(())
            }
        }
    }

    /// Replays every matching journey without a browser to collect its
    /// monitor, merged with run-level defaults and validated.
    pub fn build_monitors(&self, options: &RunOptions) -> Result<Vec<Monitor>> {
        self.update_monitor(options.monitor_defaults())?;
        let global = self
            .monitor
            .lock()
            .as_ref()
            .map(|m| m.config.clone())
            .unwrap_or_default();

        let mut monitors = Vec::new();
        for journey in self.journeys() {
            if !journey.is_match(options.match_pattern.as_deref(), options.tags.as_deref()) {
                continue;
            }
            *self.current_journey.lock() = Some(journey.clone());
            let mut monitor = journey.describe(&options.params).monitor;
            monitor.update(&global)?;
            monitor.validate()?;
            monitors.push(monitor);
        }

        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = monitors
            .iter()
            .filter_map(|m| m.id())
            .filter(|id| !seen.insert(*id))
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            duplicates.dedup();
            return Err(SyntheticsError::DuplicateMonitors(duplicates.join(", ")));
        }
        Ok(monitors)
    }

    /// Runs every matching journey and returns results keyed by journey
    /// name. Registered journeys are cleared once the run ends.
    pub async fn run(&self, options: RunOptions) -> HashMap<String, JourneyResult> {
        let mut results = HashMap::new();
        if self.active.swap(true, Ordering::SeqCst) {
            tracing::warn!("Runner: a run is already in progress");
            return results;
        }

        let journeys = self.journeys();
        tracing::debug!("Runner: run {} journeys", journeys.len());
        self.reporter.lock().on_start(&StartEvent {
            num_journeys: journeys.len(),
            network_conditions: options.network_conditions.clone(),
        });

        if options.dry_run {
            for journey in &journeys {
                self.reporter.lock().on_journey_register(journey);
            }
            self.reset().await;
            return results;
        }

        let hook_args = HookArgs {
            env: options.environment.clone(),
            params: options.params.clone(),
        };
        let (before_all, after_all) = {
            let hooks = self.hooks.lock();
            (hooks.before_all.clone(), hooks.after_all.clone())
        };

        tracing::debug!("Runner: beforeAll hooks");
        let hook_error = run_hooks(&before_all, &hook_args).await.err();

        for journey in journeys {
            if !journey.is_match(options.match_pattern.as_deref(), options.tags.as_deref()) {
                continue;
            }
            *self.current_journey.lock() = Some(journey.clone());
            let result = match &hook_error {
                Some(error) => self.run_fake_journey(&journey, &options, error.clone()),
                None => self.run_journey(&journey, &options).await,
            };
            results.insert(journey.name.clone(), result);
        }

        tracing::debug!("Runner: afterAll hooks");
        if let Err(e) = run_hooks(&after_all, &hook_args).await {
            tracing::warn!("afterAll hook failed: {}", e);
        }

        self.reset().await;
        results
    }

    async fn run_journey(&self, journey: &Arc<Journey>, options: &RunOptions) -> JourneyResult {
        tracing::debug!(journey = %journey.name, "Runner: start journey");
        let mut context = match JourneyContext::new(self.browser.as_ref(), options).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(journey = %journey.name, "Failed to create browser context: {}", e);
                return self.run_fake_journey(journey, options, e.into());
            }
        };

        self.reporter.lock().on_journey_start(
            journey,
            &JourneyStartEvent {
                timestamp: get_timestamp(),
                params: context.params.clone(),
            },
        );
        let plan = journey.describe(&context.params);
        let hook_args = HookArgs {
            env: options.environment.clone(),
            params: context.params.clone(),
        };

        let mut result = JourneyResult::succeeded();
        tracing::debug!(journey = %journey.name, "Runner: before hooks");
        match run_hooks(&plan.hooks.before, &hook_args).await {
            Ok(()) => {
                let (steps, error) = self
                    .run_steps(journey, &plan.steps, &mut context, options)
                    .await;
                result.steps = steps;
                if let Some(error) = error {
                    result.fail(error);
                }
                tracing::debug!(journey = %journey.name, "Runner: after hooks");
                if let Err(error) = run_hooks(&plan.hooks.after, &hook_args).await {
                    result.fail(error);
                }
            }
            Err(error) => result.fail(error),
        }

        let result = self.end_journey(journey, &mut context, result, options).await;
        tracing::debug!(journey = %journey.name, status = %result.status, "Runner: end journey");
        result
    }

    /// Reports a journey as failed with `error` without touching the
    /// browser.
    fn run_fake_journey(
        &self,
        journey: &Journey,
        options: &RunOptions,
        error: ExecutionError,
    ) -> JourneyResult {
        let start = monotonic_time_in_seconds();
        let mut reporter = self.reporter.lock();
        reporter.on_journey_start(
            journey,
            &JourneyStartEvent {
                timestamp: get_timestamp(),
                params: options.params.clone(),
            },
        );
        let result = JourneyResult::failed(error);
        reporter.on_journey_end(
            journey,
            &JourneyEndEvent {
                status: result.status,
                error: result.error.clone(),
                start,
                end: monotonic_time_in_seconds(),
                timestamp: get_timestamp(),
                options: options.clone(),
                networkinfo: None,
                browserconsole: None,
                screenshots: None,
            },
        );
        result
    }

    /// Runs steps in order. After the first failure the remaining steps are
    /// reported as skipped without running.
    async fn run_steps(
        &self,
        journey: &Journey,
        steps: &[Step],
        context: &mut JourneyContext,
        options: &RunOptions,
    ) -> (Vec<StepResult>, Option<ExecutionError>) {
        let mut results = Vec::with_capacity(steps.len());
        let mut first_error = None;

        for step in steps {
            let start = monotonic_time_in_seconds();
            self.reporter.lock().on_step_start(journey, step);

            let data = if first_error.is_some() {
                StepResult::skipped()
            } else {
                let data = self.run_step(step, context, options).await;
                if let Some(error) = &data.error {
                    first_error = Some(error.clone());
                }
                data
            };

            self.reporter.lock().on_step_end(
                journey,
                step,
                &StepEndEvent {
                    start,
                    end: monotonic_time_in_seconds(),
                    result: data.clone(),
                },
            );

            if options.pause_on_error && data.error.is_some() {
                self.resume.wait().await;
            }
            results.push(data);
        }
        (results, first_error)
    }

    async fn run_step(
        &self,
        step: &Step,
        context: &mut JourneyContext,
        options: &RunOptions,
    ) -> StepResult {
        tracing::debug!(step = %step.name, "Runner: start step");
        let mut data = StepResult::default();
        let driver = context.driver.clone();

        // First navigation request of the step wins.
        let nav_url: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let capture = {
            let nav_url = nav_url.clone();
            driver.context.on(Arc::new(move |event: &ContextEvent| {
                if let ContextEvent::Request(request) = event
                    && request.is_navigation_request()
                {
                    let mut url = nav_url.lock();
                    if url.is_none() {
                        *url = Some(request.url());
                    }
                }
            }))
        };

        context.plugins.on_step(step.info());
        let trace_started = options.trace_enabled()
            && match context.plugins.start(PluginType::Trace).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(step = %step.name, "Failed to start tracing: {}", e);
                    false
                }
            };

        let step_context = StepContext {
            driver: driver.clone(),
            params: context.params.clone(),
        };
        let outcome = AssertUnwindSafe(async { step.call(step_context).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => data.fail(ExecutionError::from(error)),
            Err(payload) => data.fail(ExecutionError::from_panic(payload.as_ref())),
        }
        capture.detach();

        if options.metrics
            && let Some(performance) = context.plugins.performance()
        {
            match performance.get_metrics().await {
                Ok(metrics) => data.pagemetrics = Some(metrics),
                Err(e) => {
                    tracing::warn!(step = %step.name, "Failed to collect page metrics: {}", e)
                }
            }
        }

        if trace_started {
            match context.plugins.stop(PluginType::Trace).await {
                Ok(PluginData::Trace(trace)) => data.merge_trace(trace),
                Ok(_) => {}
                Err(e) => tracing::warn!(step = %step.name, "Failed to stop tracing: {}", e),
            }
        }

        data.url = nav_url.lock().take();
        if let Some(page) = driver.last_page() {
            if data.url.is_none() {
                data.url = page.url().await;
            }
            if options.screenshots.should_capture(data.status == Status::Failed) {
                match self.screenshots.capture(page, step.info()).await {
                    Ok(_) => tracing::debug!(step = %step.name, "Runner: captured screenshot"),
                    Err(e) => tracing::debug!(step = %step.name, "Screenshot skipped: {}", e),
                }
            }
        }

        tracing::debug!(step = %step.name, status = %data.status, "Runner: end step");
        data
    }

    async fn end_journey(
        &self,
        journey: &Journey,
        context: &mut JourneyContext,
        mut result: JourneyResult,
        options: &RunOptions,
    ) -> JourneyResult {
        let output = context.plugins.output().await;
        let end = monotonic_time_in_seconds();

        result.networkinfo = output.networkinfo.filter(|_| options.network);
        result.browserconsole = output
            .browserconsole
            .filter(|_| result.status == Status::Failed);

        self.reporter.lock().on_journey_end(
            journey,
            &JourneyEndEvent {
                status: result.status,
                error: result.error.clone(),
                start: context.start,
                end,
                timestamp: get_timestamp(),
                options: options.clone(),
                networkinfo: result.networkinfo.clone(),
                browserconsole: result.browserconsole.clone(),
                screenshots: Some(self.screenshots.dir().to_path_buf()),
            },
        );

        if let Err(e) = self.screenshots.clear().await {
            tracing::warn!("Failed to clear screenshot cache: {}", e);
        }
        Gatherer::dispose(&context.driver).await;
        context.plugins.unregister_all();
        result
    }

    /// Clears registration state and the run's cache, then signals the
    /// reporter that the run is over.
    async fn reset(&self) {
        *self.current_journey.lock() = None;
        self.journeys.lock().clear();
        if let Err(e) = self.screenshots.remove().await {
            tracing::warn!("Failed to remove run cache: {}", e);
        }
        self.reporter.lock().on_end();
        self.active.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("active", &self.is_active())
            .field("journeys", &self.journeys.lock().len())
            .field("screenshots", &self.screenshots.dir())
            .finish()
    }
}
