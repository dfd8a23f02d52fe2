//! Scripted in-memory browser used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use synthetics_runner::Result;
use synthetics_runner::SyntheticsError;
use synthetics_runner::config::ContextOptions;
use synthetics_runner::driver::{
    BrowserContext, BrowserDriver, CdpSession, ConsoleEvent, ContextEvent, Driver, EventHub,
    Headers, Listener, Page, PageErrorEvent, PageEvent, Request, RequestContext, RequestId,
    RequestSizes, ResourceTiming, Response, ScreenshotOptions, SecurityDetails, ServerAddr,
    Subscription, TracingEvent,
};
use synthetics_runner::dsl::{Journey, Step};
use synthetics_runner::reporter::{
    JourneyEndEvent, JourneyStartEvent, Reporter, StartEvent, StepEndEvent,
};
use tokio_util::sync::CancellationToken;

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Shared counters so tests can observe what the runner did.
#[derive(Default)]
pub struct Recorder {
    pub contexts_created: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub requests_disposed: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub trace_starts: AtomicUsize,
    pub trace_ends: AtomicUsize,
    pub categories: Mutex<Vec<String>>,
    pub fail_tracing: AtomicBool,
    pub stall_navigation: AtomicBool,
}

pub struct FakeBrowser {
    pub recorder: Arc<Recorder>,
    pub fail_context: AtomicBool,
    pub fail_request_context: AtomicBool,
    pub setup_delay: Mutex<Option<Duration>>,
    pub trace_events: Mutex<Vec<Value>>,
    contexts: Mutex<Vec<Arc<FakeContext>>>,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            recorder: Arc::new(Recorder::default()),
            fail_context: AtomicBool::new(false),
            fail_request_context: AtomicBool::new(false),
            setup_delay: Mutex::new(None),
            trace_events: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_context(&self) -> Option<Arc<FakeContext>> {
        self.contexts.lock().last().cloned()
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn new_context(&self, _options: &ContextOptions) -> Result<Arc<dyn BrowserContext>> {
        if self.fail_context.load(Ordering::SeqCst) {
            return Err(SyntheticsError::Driver("browser has disconnected".into()));
        }
        let delay = *self.setup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.recorder.contexts_created.fetch_add(1, Ordering::SeqCst);
        let context = FakeContext::new(self.recorder.clone(), self.trace_events.lock().clone());
        self.contexts.lock().push(context.clone());
        Ok(context)
    }

    async fn new_request_context(
        &self,
        _options: &ContextOptions,
    ) -> Result<Arc<dyn RequestContext>> {
        if self.fail_request_context.load(Ordering::SeqCst) {
            return Err(SyntheticsError::Driver("request context refused".into()));
        }
        Ok(Arc::new(FakeRequestContext {
            recorder: self.recorder.clone(),
        }))
    }
}

struct FakeRequestContext {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl RequestContext for FakeRequestContext {
    async fn dispose(&self) -> Result<()> {
        self.recorder.requests_disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeContext {
    recorder: Arc<Recorder>,
    trace_events: Vec<Value>,
    pub events: Arc<EventHub<ContextEvent>>,
    pages: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeContext {
    pub fn new(recorder: Arc<Recorder>, trace_events: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            recorder,
            trace_events,
            events: Arc::new(EventHub::new()),
            pages: Mutex::new(Vec::new()),
        })
    }

    pub fn open_page(&self) -> Arc<FakePage> {
        let page = Arc::new(FakePage {
            recorder: self.recorder.clone(),
            context_events: self.events.clone(),
            events: EventHub::new(),
            lifetime: CancellationToken::new(),
            url: Mutex::new(None),
        });
        self.pages.lock().push(page.clone());
        page
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        Ok(self.open_page())
    }

    async fn new_cdp_session(&self, _page: &Arc<dyn Page>) -> Result<Arc<dyn CdpSession>> {
        Ok(Arc::new(FakeSession {
            recorder: self.recorder.clone(),
            trace_events: self.trace_events.clone(),
            tracing: EventHub::new(),
        }))
    }

    fn pages(&self) -> Vec<Arc<dyn Page>> {
        self.pages
            .lock()
            .iter()
            .filter(|p| !p.is_closed())
            .map(|p| p.clone() as Arc<dyn Page>)
            .collect()
    }

    fn on(&self, listener: Listener<ContextEvent>) -> Subscription {
        self.events.subscribe(listener)
    }

    async fn close(&self) -> Result<()> {
        self.recorder.contexts_closed.fetch_add(1, Ordering::SeqCst);
        for page in self.pages.lock().iter() {
            page.lifetime.cancel();
        }
        Ok(())
    }
}

pub struct FakePage {
    recorder: Arc<Recorder>,
    context_events: Arc<EventHub<ContextEvent>>,
    events: EventHub<PageEvent>,
    lifetime: CancellationToken,
    url: Mutex<Option<String>>,
}

impl FakePage {
    pub fn from_driver(driver: &Driver) -> &FakePage {
        driver
            .page
            .as_any()
            .downcast_ref::<FakePage>()
            .expect("fake page")
    }

    pub fn console(&self, kind: &str, text: &str) {
        self.events.emit(&PageEvent::Console(ConsoleEvent {
            kind: kind.into(),
            text: text.into(),
        }));
    }

    pub fn page_error(&self, message: &str) {
        self.events.emit(&PageEvent::PageError(PageErrorEvent {
            message: message.into(),
            stack: None,
        }));
    }

    pub fn close(&self) {
        self.lifetime.cancel();
    }
}

#[async_trait]
impl Page for FakePage {
    async fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    /// Emits a full navigation request lifecycle on the owning context.
    async fn goto(&self, url: &str) -> Result<()> {
        if self.recorder.stall_navigation.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        *self.url.lock() = Some(url.to_string());
        let request = FakeRequest::navigation(url);
        self.context_events
            .emit(&ContextEvent::Request(request.clone()));
        self.context_events
            .emit(&ContextEvent::Response(FakeResponse::ok(request.clone())));
        self.context_events
            .emit(&ContextEvent::RequestFinished(request));
        Ok(())
    }

    async fn screenshot(&self, _options: &ScreenshotOptions) -> Result<Vec<u8>> {
        self.recorder.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xff, 0xd8, 0xff])
    }

    fn on(&self, listener: Listener<PageEvent>) -> Subscription {
        self.events.subscribe(listener)
    }

    fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct FakeSession {
    recorder: Arc<Recorder>,
    trace_events: Vec<Value>,
    tracing: EventHub<TracingEvent>,
}

#[async_trait]
impl CdpSession for FakeSession {
    async fn browser_version(&self) -> Result<String> {
        Ok("HeadlessChrome/120.0.6099.28".into())
    }

    async fn enable_performance(&self) -> Result<()> {
        Ok(())
    }

    async fn performance_metrics(&self) -> Result<Vec<(String, f64)>> {
        Ok(vec![("Nodes".into(), 42.0), ("JSHeapUsedSize".into(), 1024.0)])
    }

    async fn start_tracing(&self, categories: &[String]) -> Result<()> {
        if self.recorder.fail_tracing.load(Ordering::SeqCst) {
            return Err(SyntheticsError::TracingError("tracing already started".into()));
        }
        self.recorder.trace_starts.fetch_add(1, Ordering::SeqCst);
        *self.recorder.categories.lock() = categories.to_vec();
        Ok(())
    }

    async fn end_tracing(&self) -> Result<()> {
        self.recorder.trace_ends.fetch_add(1, Ordering::SeqCst);
        self.tracing
            .emit(&TracingEvent::DataCollected(self.trace_events.clone()));
        self.tracing.emit(&TracingEvent::TracingComplete);
        Ok(())
    }

    fn on_tracing(&self, listener: Listener<TracingEvent>) -> Subscription {
        self.tracing.subscribe(listener)
    }
}

pub struct FakeRequest {
    pub id: RequestId,
    pub url: String,
    pub navigation: bool,
    pub timing: ResourceTiming,
    pub redirected_from: Option<Arc<dyn Request>>,
    pub page: Option<Arc<dyn Page>>,
}

impl FakeRequest {
    pub fn new(url: &str) -> Arc<Self> {
        Self::build(url, false, None, None)
    }

    pub fn navigation(url: &str) -> Arc<Self> {
        Self::build(url, true, None, None)
    }

    pub fn build(
        url: &str,
        navigation: bool,
        redirected_from: Option<Arc<dyn Request>>,
        page: Option<Arc<dyn Page>>,
    ) -> Arc<Self> {
        let id = NEXT_REQUEST.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            id: RequestId(format!("req-{}", id)),
            url: url.to_string(),
            navigation,
            timing: ResourceTiming::default(),
            redirected_from,
            page,
        })
    }
}

#[async_trait]
impl Request for FakeRequest {
    fn id(&self) -> RequestId {
        self.id.clone()
    }
    fn url(&self) -> String {
        self.url.clone()
    }
    fn method(&self) -> String {
        "GET".into()
    }
    fn resource_type(&self) -> String {
        let kind = if self.navigation { "document" } else { "script" };
        kind.to_string()
    }
    fn headers(&self) -> Headers {
        Headers::from([("accept".to_string(), "*/*".to_string())])
    }
    fn post_data_len(&self) -> Option<usize> {
        None
    }
    fn is_navigation_request(&self) -> bool {
        self.navigation
    }
    fn redirected_from(&self) -> Option<Arc<dyn Request>> {
        self.redirected_from.clone()
    }
    fn timing(&self) -> ResourceTiming {
        self.timing
    }
    fn page(&self) -> Option<Arc<dyn Page>> {
        self.page.clone()
    }
    async fn all_headers(&self) -> Result<Headers> {
        let mut headers = self.headers();
        headers.insert("referer".into(), "https://referrer.test/".into());
        Ok(headers)
    }
    async fn sizes(&self) -> Result<RequestSizes> {
        Ok(RequestSizes {
            request_headers_size: 100,
            request_body_size: 0,
            response_headers_size: 200,
            response_body_size: 1000,
        })
    }
}

pub struct FakeResponse {
    pub request: Arc<dyn Request>,
    pub status: i64,
}

impl FakeResponse {
    pub fn ok(request: Arc<dyn Request>) -> Arc<Self> {
        Arc::new(Self {
            request,
            status: 200,
        })
    }

    pub fn with_status(request: Arc<dyn Request>, status: i64) -> Arc<Self> {
        Arc::new(Self { request, status })
    }
}

#[async_trait]
impl Response for FakeResponse {
    fn request(&self) -> Arc<dyn Request> {
        self.request.clone()
    }
    fn url(&self) -> String {
        self.request.url()
    }
    fn status(&self) -> i64 {
        self.status
    }
    fn status_text(&self) -> String {
        "OK".into()
    }
    async fn all_headers(&self) -> Result<Headers> {
        Ok(Headers::from([(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )]))
    }
    async fn server_addr(&self) -> Result<Option<ServerAddr>> {
        Ok(Some(ServerAddr {
            ip_address: "127.0.0.1".into(),
            port: 443,
        }))
    }
    async fn security_details(&self) -> Result<Option<SecurityDetails>> {
        Ok(None)
    }
}

/// Reporter that records one line per callback.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn on_start(&mut self, event: &StartEvent) {
        self.push(format!("start:{}", event.num_journeys));
    }

    fn on_journey_register(&mut self, journey: &Journey) {
        self.push(format!("register:{}", journey.name));
    }

    fn on_journey_start(&mut self, journey: &Journey, _event: &JourneyStartEvent) {
        self.push(format!("journey_start:{}", journey.name));
    }

    fn on_step_start(&mut self, _journey: &Journey, step: &Step) {
        self.push(format!("step_start:{}", step.name));
    }

    fn on_step_end(&mut self, _journey: &Journey, step: &Step, event: &StepEndEvent) {
        self.push(format!("step_end:{}:{}", step.name, event.result.status));
    }

    fn on_journey_end(&mut self, journey: &Journey, event: &JourneyEndEvent) {
        self.push(format!("journey_end:{}:{}", journey.name, event.status));
    }

    fn on_end(&mut self) {
        self.push("end".into());
    }
}

/// `Write` sink whose bytes stay readable after the writer moves into a
/// reporter.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<Value> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json line"))
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
