//! chromiumoxide-backed implementation of the driver capability traits.

use super::{
    BrowserContext, BrowserDriver, CdpSession, ConsoleEvent, ContextEvent, EventHub, Headers,
    ImageFormat, Listener, Page, PageErrorEvent, PageEvent, Request, RequestContext, RequestId,
    RequestSizes, ResourceTiming, Response, ScreenshotOptions, SecurityDetails, ServerAddr,
    Subscription, TracingEvent,
};
use crate::config::ContextOptions;
use crate::timeouts::{ms, secs};
use crate::{Result, SyntheticsError};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EmulateNetworkConditionsParams, EnableParams as NetworkEnableParams, EventLoadingFailed,
    EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    Response as CdpResponse, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::cdp::browser_protocol::performance::{
    EnableParams as PerformanceEnableParams, GetMetricsParams,
};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::cdp::browser_protocol::target::{
    BrowserContextId, CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
    EventTargetCreated, TargetId, TargetInfo,
};
use chromiumoxide::cdp::browser_protocol::tracing::{
    EndParams, EventDataCollected, EventTracingComplete, StartParams, TraceConfig,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EnableParams as RuntimeEnableParams, EventConsoleApiCalled,
    EventExceptionThrown,
};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POPUP_ATTACH_ATTEMPTS: u32 = 10;

fn driver_error(e: impl std::fmt::Display) -> SyntheticsError {
    SyntheticsError::Driver(e.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
}

/// Launches a local Chrome/Chromium and hands out isolated contexts.
pub struct ChromiumDriver {
    browser: Arc<Browser>,
}

impl ChromiumDriver {
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let executable = match options.executable {
            Some(path) => path,
            None => find_chrome_executable()?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .request_timeout(Duration::from_secs(secs::REQUEST));
        if !options.headless {
            builder = builder.with_head();
        }
        for arg in options.args {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(driver_error)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(driver_error)?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser: Arc::new(browser),
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn BrowserContext>> {
        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(driver_error)?;
        if options.ignore_https_errors {
            self.browser
                .execute(SetIgnoreCertificateErrorsParams::new(true))
                .await
                .map_err(driver_error)?;
        }
        let context = Arc::new(ChromiumContext {
            browser: self.browser.clone(),
            id: created.result.browser_context_id.clone(),
            options: options.clone(),
            pages: Mutex::new(Vec::new()),
            events: Arc::new(EventHub::new()),
            lifetime: CancellationToken::new(),
        });
        context.watch_popups().await?;
        Ok(context)
    }

    async fn new_request_context(
        &self,
        _options: &ContextOptions,
    ) -> Result<Arc<dyn RequestContext>> {
        Ok(Arc::new(ChromiumRequestContext))
    }
}

/// API requests go through the page's own network stack, so there is
/// nothing to release.
struct ChromiumRequestContext;

#[async_trait]
impl RequestContext for ChromiumRequestContext {
    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

struct ChromiumContext {
    browser: Arc<Browser>,
    id: BrowserContextId,
    options: ContextOptions,
    pages: Mutex<Vec<Arc<ChromiumPage>>>,
    events: Arc<EventHub<ContextEvent>>,
    lifetime: CancellationToken,
}

impl ChromiumContext {
    async fn prepare(&self, page: &chromiumoxide::Page) -> Result<()> {
        page.execute(NetworkEnableParams::default())
            .await
            .map_err(driver_error)?;
        page.execute(RuntimeEnableParams::default())
            .await
            .map_err(driver_error)?;
        if let Some(user_agent) = &self.options.user_agent {
            page.set_user_agent(user_agent.as_str())
                .await
                .map_err(driver_error)?;
        }
        if let Some(conditions) = &self.options.network_conditions {
            page.execute(EmulateNetworkConditionsParams::new(
                conditions.offline,
                conditions.latency,
                conditions.download_throughput,
                conditions.upload_throughput,
            ))
            .await
            .map_err(driver_error)?;
        }
        Ok(())
    }

    /// Prepares `inner`, starts its event pumps and tracks it as open.
    async fn adopt(&self, inner: chromiumoxide::Page) -> Result<Arc<ChromiumPage>> {
        self.prepare(&inner).await?;
        let page = Arc::new(ChromiumPage {
            inner: Arc::new(inner),
            events: Arc::new(EventHub::new()),
            lifetime: self.lifetime.child_token(),
        });
        NetworkPump::spawn(page.clone(), self.events.clone()).await?;
        page.clone().spawn_page_events().await?;
        self.pages.lock().push(page.clone());
        Ok(page)
    }

    /// Adopts popups and `window.open` targets opened from pages of this
    /// context, so they get emulation, network capture and screenshots.
    async fn watch_popups(self: &Arc<Self>) -> Result<()> {
        let mut created = self
            .browser
            .event_listener::<EventTargetCreated>()
            .await
            .map_err(driver_error)?;
        let context = Arc::downgrade(self);
        let lifetime = self.lifetime.clone();
        tokio::spawn(async move {
            loop {
                let info = tokio::select! {
                    _ = lifetime.cancelled() => break,
                    Some(event) = created.next() => event.target_info.clone(),
                    else => break,
                };
                let Some(context) = context.upgrade() else {
                    break;
                };
                if !is_popup_of(&info, &context.id) {
                    continue;
                }
                match context.attach_popup(info.target_id).await {
                    Ok(_) => tracing::debug!("Tracking popup page"),
                    Err(e) => tracing::warn!("Failed to track popup page: {}", e),
                }
            }
        });
        Ok(())
    }

    /// The target may not be attached yet when its creation is announced.
    async fn attach_popup(&self, target_id: TargetId) -> Result<Arc<ChromiumPage>> {
        let mut attempts = 0;
        let inner = loop {
            match self.browser.get_page(target_id.clone()).await {
                Ok(page) => break page,
                Err(e) if attempts >= POPUP_ATTACH_ATTEMPTS => return Err(driver_error(e)),
                Err(_) => {
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(ms::POPUP_ATTACH_RETRY)).await;
                }
            }
        };
        self.adopt(inner).await
    }
}

/// Pages opened by another page of the same browser context. Pages created
/// through `new_page` have no opener and are tracked there.
fn is_popup_of(info: &TargetInfo, context: &BrowserContextId) -> bool {
    info.r#type == "page"
        && info.opener_id.is_some()
        && info.browser_context_id.as_ref() == Some(context)
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(driver_error)?;
        let inner = self.browser.new_page(params).await.map_err(driver_error)?;
        Ok(self.adopt(inner).await?)
    }

    async fn new_cdp_session(&self, page: &Arc<dyn Page>) -> Result<Arc<dyn CdpSession>> {
        let page = page
            .as_any()
            .downcast_ref::<ChromiumPage>()
            .ok_or_else(|| driver_error("page does not belong to this driver"))?;
        ChromiumSession::attach(self.browser.clone(), page).await
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
        self.lifetime.cancel();
        let pages: Vec<_> = self.pages.lock().drain(..).collect();
        for page in pages {
            let inner: chromiumoxide::Page = (*page.inner).clone();
            if let Err(e) = inner.close().await {
                tracing::debug!("Failed to close page: {}", e);
            }
        }
        self.browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .map_err(driver_error)?;
        Ok(())
    }
}

pub struct ChromiumPage {
    inner: Arc<chromiumoxide::Page>,
    events: Arc<EventHub<PageEvent>>,
    lifetime: CancellationToken,
}

impl ChromiumPage {
    pub fn inner(&self) -> &Arc<chromiumoxide::Page> {
        &self.inner
    }

    async fn spawn_page_events(self: Arc<Self>) -> Result<()> {
        let mut console = self
            .inner
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(driver_error)?;
        let mut exceptions = self
            .inner
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(driver_error)?;

        let events = self.events.clone();
        let lifetime = self.lifetime.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => break,
                    Some(event) = console.next() => {
                        events.emit(&PageEvent::Console(console_event(&event)));
                    }
                    Some(event) = exceptions.next() => {
                        let details = &event.exception_details;
                        let message = details
                            .exception
                            .as_ref()
                            .and_then(|e| e.description.clone())
                            .unwrap_or_else(|| details.text.clone());
                        events.emit(&PageEvent::PageError(PageErrorEvent {
                            message,
                            stack: None,
                        }));
                    }
                    else => break,
                }
            }
        });
        Ok(())
    }
}

fn console_event(event: &EventConsoleApiCalled) -> ConsoleEvent {
    let kind = match event.r#type {
        ConsoleApiCalledType::Warning => "warning".to_string(),
        ConsoleApiCalledType::Error => "error".to_string(),
        ref other => format!("{:?}", other).to_lowercase(),
    };
    let text = event
        .args
        .iter()
        .filter_map(|arg| {
            arg.value
                .as_ref()
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .or_else(|| arg.description.clone())
        })
        .collect::<Vec<_>>()
        .join(" ");
    ConsoleEvent { kind, text }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn url(&self) -> Option<String> {
        self.inner.url().await.ok().flatten()
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.inner.goto(url).await.map_err(driver_error)?;
        Ok(())
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>> {
        let format = match options.format {
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        };
        let mut params = CaptureScreenshotParams::builder().format(format).build();
        if options.format == ImageFormat::Jpeg {
            params.quality = options.quality.map(i64::from);
        }
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| SyntheticsError::ScreenshotFailed(e.to_string()))
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

struct ChromiumSession {
    browser: Arc<Browser>,
    page: Arc<chromiumoxide::Page>,
    tracing: Arc<EventHub<TracingEvent>>,
}

impl ChromiumSession {
    async fn attach(browser: Arc<Browser>, page: &ChromiumPage) -> Result<Arc<dyn CdpSession>> {
        let mut collected = page
            .inner
            .event_listener::<EventDataCollected>()
            .await
            .map_err(driver_error)?;
        let mut complete = page
            .inner
            .event_listener::<EventTracingComplete>()
            .await
            .map_err(driver_error)?;

        let tracing_events = Arc::new(EventHub::new());
        let hub = tracing_events.clone();
        let lifetime = page.lifetime.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => break,
                    Some(event) = collected.next() => {
                        hub.emit(&TracingEvent::DataCollected(event.value.clone()));
                    }
                    Some(_) = complete.next() => hub.emit(&TracingEvent::TracingComplete),
                    else => break,
                }
            }
        });

        Ok(Arc::new(Self {
            browser,
            page: page.inner.clone(),
            tracing: tracing_events,
        }))
    }
}

#[async_trait]
impl CdpSession for ChromiumSession {
    async fn browser_version(&self) -> Result<String> {
        let version = self.browser.version().await.map_err(driver_error)?;
        Ok(version.product)
    }

    async fn enable_performance(&self) -> Result<()> {
        self.page
            .execute(PerformanceEnableParams::default())
            .await
            .map_err(driver_error)?;
        Ok(())
    }

    async fn performance_metrics(&self) -> Result<Vec<(String, f64)>> {
        let response = self
            .page
            .execute(GetMetricsParams::default())
            .await
            .map_err(driver_error)?;
        Ok(response
            .result
            .metrics
            .iter()
            .map(|m| (m.name.clone(), m.value))
            .collect())
    }

    async fn start_tracing(&self, categories: &[String]) -> Result<()> {
        let config = TraceConfig::builder()
            .included_categories(categories.to_vec())
            .build();
        self.page
            .execute(StartParams::builder().trace_config(config).build())
            .await
            .map_err(|e| SyntheticsError::TracingError(e.to_string()))?;
        Ok(())
    }

    async fn end_tracing(&self) -> Result<()> {
        self.page
            .execute(EndParams::default())
            .await
            .map_err(|e| SyntheticsError::TracingError(e.to_string()))?;
        Ok(())
    }

    fn on_tracing(&self, listener: Listener<TracingEvent>) -> Subscription {
        self.tracing.subscribe(listener)
    }
}

/// Turns the page's network domain events into [`ContextEvent`]s carrying
/// shared request handles.
struct NetworkPump {
    page: Arc<ChromiumPage>,
    requests: Mutex<HashMap<String, Arc<ChromiumRequest>>>,
    events: Arc<EventHub<ContextEvent>>,
}

impl NetworkPump {
    async fn spawn(page: Arc<ChromiumPage>, events: Arc<EventHub<ContextEvent>>) -> Result<()> {
        let inner = page.inner.clone();
        let mut sent = inner
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(driver_error)?;
        let mut received = inner
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(driver_error)?;
        let mut finished = inner
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(driver_error)?;
        let mut failed = inner
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(driver_error)?;

        let lifetime = page.lifetime.clone();
        let pump = Self {
            page,
            requests: Mutex::new(HashMap::new()),
            events,
        };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => break,
                    Some(event) = sent.next() => pump.on_request(&event),
                    Some(event) = received.next() => pump.on_response(&event),
                    Some(event) = finished.next() => pump.on_finished(&event),
                    Some(event) = failed.next() => pump.on_failed(&event),
                    else => break,
                }
            }
            lifetime.cancel();
        });
        Ok(())
    }

    fn on_request(&self, event: &EventRequestWillBeSent) {
        let id = event.request_id.inner().clone();

        // Redirects reuse the request id: the previous hop responds with the
        // redirect and completes before the next hop starts.
        let previous = event.redirect_response.as_ref().and_then(|response| {
            let previous = self.requests.lock().remove(&id)?;
            Some((previous, response))
        });
        let hop = previous.as_ref().map_or(0, |(previous, _)| previous.hop + 1);
        let redirected_from = previous.map(|(previous, response)| {
            previous.set_response(response);
            self.events.emit(&ContextEvent::Response(Arc::new(ChromiumResponse {
                request: previous.clone(),
                response: response.clone(),
            })));
            previous.finish(*event.timestamp.inner(), response.encoded_data_length);
            self.events.emit(&ContextEvent::RequestFinished(previous.clone()));
            previous as Arc<dyn Request>
        });

        let request = Arc::new(ChromiumRequest {
            id: id.clone(),
            hop,
            url: event.request.url.clone(),
            method: event.request.method.clone(),
            resource_type: event
                .r#type
                .as_ref()
                .map(|t| format!("{:?}", t).to_lowercase())
                .unwrap_or_else(|| "other".into()),
            headers: to_headers(event.request.headers.inner()),
            // Post bodies are not retained by the network domain events.
            post_data_len: None,
            is_navigation: event.r#type == Some(ResourceType::Document)
                && event.request_id.inner() == event.loader_id.inner(),
            redirected_from,
            start_time: *event.wall_time.inner() * 1000.0,
            page: self.page.clone(),
            state: Mutex::new(RequestState::default()),
        });
        self.requests.lock().insert(id, request.clone());
        self.events.emit(&ContextEvent::Request(request));
    }

    fn on_response(&self, event: &EventResponseReceived) {
        let Some(request) = self.requests.lock().get(event.request_id.inner()).cloned() else {
            return;
        };
        request.set_response(&event.response);
        self.events.emit(&ContextEvent::Response(Arc::new(ChromiumResponse {
            request: request.clone(),
            response: event.response.clone(),
        })));
    }

    fn on_finished(&self, event: &EventLoadingFinished) {
        let Some(request) = self.requests.lock().remove(event.request_id.inner()) else {
            return;
        };
        request.finish(*event.timestamp.inner(), event.encoded_data_length);
        self.events.emit(&ContextEvent::RequestFinished(request));
    }

    fn on_failed(&self, event: &EventLoadingFailed) {
        let Some(request) = self.requests.lock().remove(event.request_id.inner()) else {
            return;
        };
        request.finish(*event.timestamp.inner(), 0.0);
        self.events.emit(&ContextEvent::RequestFailed(request));
    }
}

fn to_headers(value: &serde_json::Value) -> Headers {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let v = v.as_str().map(String::from).unwrap_or_else(|| v.to_string());
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Default)]
struct RequestState {
    timing: Option<ResourceTiming>,
    /// Monotonic seconds the browser issued the request, from the response
    /// timing.
    request_time: Option<f64>,
    response_headers_size: i64,
    encoded_data_length: f64,
}

struct ChromiumRequest {
    id: String,
    /// Redirect hops share the protocol request id.
    hop: u32,
    url: String,
    method: String,
    resource_type: String,
    headers: Headers,
    post_data_len: Option<usize>,
    is_navigation: bool,
    redirected_from: Option<Arc<dyn Request>>,
    start_time: f64,
    page: Arc<ChromiumPage>,
    state: Mutex<RequestState>,
}

impl ChromiumRequest {
    fn set_response(&self, response: &CdpResponse) {
        let mut state = self.state.lock();
        state.response_headers_size = serde_json::to_string(response.headers.inner())
            .map(|s| s.len() as i64)
            .unwrap_or(0);
        if let Some(timing) = &response.timing {
            state.request_time = Some(timing.request_time);
            state.timing = Some(ResourceTiming {
                start_time: self.start_time,
                domain_lookup_start: timing.dns_start,
                domain_lookup_end: timing.dns_end,
                connect_start: timing.connect_start,
                secure_connection_start: timing.ssl_start,
                connect_end: timing.connect_end,
                request_start: timing.send_start,
                response_start: timing.receive_headers_end,
                response_end: -1.0,
            });
        }
    }

    fn finish(&self, timestamp: f64, encoded_data_length: f64) {
        let mut state = self.state.lock();
        state.encoded_data_length = encoded_data_length;
        if let (Some(request_time), Some(timing)) = (state.request_time, state.timing.as_mut()) {
            timing.response_end = (timestamp - request_time) * 1000.0;
        }
    }
}

#[async_trait]
impl Request for ChromiumRequest {
    fn id(&self) -> RequestId {
        match self.hop {
            0 => RequestId(self.id.clone()),
            hop => RequestId(format!("{}#{}", self.id, hop)),
        }
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn method(&self) -> String {
        self.method.clone()
    }

    fn resource_type(&self) -> String {
        self.resource_type.clone()
    }

    fn headers(&self) -> Headers {
        self.headers.clone()
    }

    fn post_data_len(&self) -> Option<usize> {
        self.post_data_len
    }

    fn is_navigation_request(&self) -> bool {
        self.is_navigation
    }

    fn redirected_from(&self) -> Option<Arc<dyn Request>> {
        self.redirected_from.clone()
    }

    fn timing(&self) -> ResourceTiming {
        self.state.lock().timing.unwrap_or(ResourceTiming {
            start_time: self.start_time,
            ..ResourceTiming::default()
        })
    }

    fn page(&self) -> Option<Arc<dyn Page>> {
        Some(self.page.clone())
    }

    async fn all_headers(&self) -> Result<Headers> {
        Ok(self.headers.clone())
    }

    async fn sizes(&self) -> Result<RequestSizes> {
        let state = self.state.lock();
        let request_headers_size = serde_json::to_string(&self.headers)
            .map(|s| s.len() as i64)
            .unwrap_or(0);
        Ok(RequestSizes {
            request_headers_size,
            request_body_size: self.post_data_len.unwrap_or(0) as i64,
            response_headers_size: state.response_headers_size,
            response_body_size: (state.encoded_data_length as i64 - state.response_headers_size)
                .max(0),
        })
    }
}

struct ChromiumResponse {
    request: Arc<ChromiumRequest>,
    response: CdpResponse,
}

#[async_trait]
impl Response for ChromiumResponse {
    fn request(&self) -> Arc<dyn Request> {
        self.request.clone()
    }

    fn url(&self) -> String {
        self.response.url.clone()
    }

    fn status(&self) -> i64 {
        self.response.status
    }

    fn status_text(&self) -> String {
        self.response.status_text.clone()
    }

    async fn all_headers(&self) -> Result<Headers> {
        Ok(to_headers(self.response.headers.inner()))
    }

    async fn server_addr(&self) -> Result<Option<ServerAddr>> {
        Ok(self
            .response
            .remote_ip_address
            .as_ref()
            .map(|ip| ServerAddr {
                ip_address: ip.clone(),
                port: self
                    .response
                    .remote_port
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(0),
            }))
    }

    async fn security_details(&self) -> Result<Option<SecurityDetails>> {
        Ok(self
            .response
            .security_details
            .as_ref()
            .map(|details| SecurityDetails {
                issuer: Some(details.issuer.clone()),
                protocol: Some(details.protocol.clone()),
                subject_name: Some(details.subject_name.clone()),
                valid_from: Some(*details.valid_from.inner()),
                valid_to: Some(*details.valid_to.inner()),
            }))
    }
}

/// Looks for Chrome in the usual install locations, then on `PATH`.
pub fn find_chrome_executable() -> Result<PathBuf> {
    let standard: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };
    if let Some(path) = standard.iter().map(PathBuf::from).find(|p| p.exists()) {
        return Ok(path);
    }

    ["google-chrome", "chromium", "chromium-browser", "chrome"]
        .iter()
        .find_map(|binary| which::which(binary).ok())
        .ok_or_else(|| driver_error("Could not find Chrome/Chromium executable"))
}
