//! Capability surface the runner needs from a browser automation backend.
//!
//! The engine never launches or talks to a browser directly. Everything goes
//! through these traits, implemented by the chromiumoxide adapter (behind the
//! `chromium` feature) or by test doubles.

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod events;
pub mod timed;

use crate::Result;
use crate::config::ContextOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use events::{EventHub, Listener, Subscription};
pub use timed::{TimedPage, with_timeout};

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource timing of a request. `start_time` is epoch milliseconds, every
/// other marker is milliseconds relative to it, -1 when unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceTiming {
    pub start_time: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub secure_connection_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
}

impl Default for ResourceTiming {
    fn default() -> Self {
        Self {
            start_time: -1.0,
            domain_lookup_start: -1.0,
            domain_lookup_end: -1.0,
            connect_start: -1.0,
            secure_connection_start: -1.0,
            connect_end: -1.0,
            request_start: -1.0,
            response_start: -1.0,
            response_end: -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestSizes {
    pub request_headers_size: i64,
    pub request_body_size: i64,
    pub response_headers_size: i64,
    pub response_body_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddr {
    pub ip_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<f64>,
}

/// A request observed by a browsing context. Synchronous accessors return
/// what the driver already knows; async accessors may round-trip to the
/// browser and can fail once the owning page is gone.
#[async_trait]
pub trait Request: Send + Sync {
    fn id(&self) -> RequestId;
    fn url(&self) -> String;
    fn method(&self) -> String;
    fn resource_type(&self) -> String;
    fn headers(&self) -> Headers;
    fn post_data_len(&self) -> Option<usize>;
    fn is_navigation_request(&self) -> bool;
    fn redirected_from(&self) -> Option<Arc<dyn Request>>;
    fn timing(&self) -> ResourceTiming;
    fn page(&self) -> Option<Arc<dyn Page>>;

    async fn all_headers(&self) -> Result<Headers>;
    async fn sizes(&self) -> Result<RequestSizes>;
}

#[async_trait]
pub trait Response: Send + Sync {
    fn request(&self) -> Arc<dyn Request>;
    fn url(&self) -> String;
    fn status(&self) -> i64;
    fn status_text(&self) -> String;

    async fn all_headers(&self) -> Result<Headers>;
    async fn server_addr(&self) -> Result<Option<ServerAddr>>;
    async fn security_details(&self) -> Result<Option<SecurityDetails>>;
}

#[derive(Clone)]
pub enum ContextEvent {
    Request(Arc<dyn Request>),
    Response(Arc<dyn Response>),
    RequestFinished(Arc<dyn Request>),
    RequestFailed(Arc<dyn Request>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEvent {
    /// `log`, `debug`, `info`, `warning`, `error`, ...
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageErrorEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Console(ConsoleEvent),
    PageError(PageErrorEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub format: ImageFormat,
    pub quality: Option<u8>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: Some(80),
        }
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> Option<String>;
    async fn goto(&self, url: &str) -> Result<()>;
    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>>;
    fn on(&self, listener: Listener<PageEvent>) -> Subscription;
    /// Cancelled when the page closes.
    fn lifetime(&self) -> CancellationToken;
    fn as_any(&self) -> &dyn Any;

    fn is_closed(&self) -> bool {
        self.lifetime().is_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TracingEvent {
    DataCollected(Vec<serde_json::Value>),
    TracingComplete,
}

/// Low-level protocol session bound to one page.
#[async_trait]
pub trait CdpSession: Send + Sync {
    /// Product string such as `HeadlessChrome/120.0.6099.28`.
    async fn browser_version(&self) -> Result<String>;
    async fn enable_performance(&self) -> Result<()>;
    async fn performance_metrics(&self) -> Result<Vec<(String, f64)>>;
    async fn start_tracing(&self, categories: &[String]) -> Result<()>;
    async fn end_tracing(&self) -> Result<()>;
    fn on_tracing(&self, listener: Listener<TracingEvent>) -> Subscription;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>>;
    async fn new_cdp_session(&self, page: &Arc<dyn Page>) -> Result<Arc<dyn CdpSession>>;
    /// Open pages in creation order, popups included.
    fn pages(&self) -> Vec<Arc<dyn Page>>;
    fn on(&self, listener: Listener<ContextEvent>) -> Subscription;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait RequestContext: Send + Sync {
    async fn dispose(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn BrowserContext>>;
    async fn new_request_context(&self, options: &ContextOptions)
    -> Result<Arc<dyn RequestContext>>;
}

/// Handles for one journey's browsing session.
#[derive(Clone)]
pub struct Driver {
    pub context: Arc<dyn BrowserContext>,
    pub page: Arc<dyn Page>,
    pub client: Arc<dyn CdpSession>,
    pub request: Arc<dyn RequestContext>,
}

impl Driver {
    /// Last open page, which follows popups and new tabs.
    pub fn last_page(&self) -> Option<Arc<dyn Page>> {
        self.context.pages().pop()
    }
}
