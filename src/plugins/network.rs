use super::StepCursor;
use super::barrier::BarrierScope;
use crate::Result;
use crate::driver::{
    BrowserContext, CdpSession, ContextEvent, Headers, Request, RequestId, ResourceTiming,
    Response, SecurityDetails, Subscription,
};
use crate::dsl::StepInfo;
use crate::timeouts;
use crate::utils::{epoch_time_in_seconds, get_timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub name: String,
    pub version: String,
}

impl BrowserInfo {
    /// Splits a product string such as `HeadlessChrome/120.0.6099.28`.
    pub fn from_product(product: &str) -> Self {
        let mut parts = product.splitn(2, '/');
        Self {
            name: parts.next().unwrap_or_default().to_string(),
            version: parts.next().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyInfo {
    pub bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<i64>,
    pub body: BodyInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    pub headers: Headers,
    pub mime_type: String,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(rename = "remoteIPAddress", skip_serializing_if = "Option::is_none")]
    pub remote_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_details: Option<SecurityDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyInfo>,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            url: None,
            status: -1,
            status_text: None,
            headers: Headers::new(),
            mime_type: "x-unknown".to_string(),
            redirect_url: String::new(),
            remote_ip_address: None,
            remote_port: None,
            security_details: None,
            bytes: None,
            body: None,
        }
    }
}

/// Milliseconds spent in each phase, -1 when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub blocked: f64,
    pub dns: f64,
    pub ssl: f64,
    pub connect: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
    pub total: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            blocked: -1.0,
            dns: -1.0,
            ssl: -1.0,
            connect: -1.0,
            send: -1.0,
            wait: -1.0,
            receive: -1.0,
            total: -1.0,
        }
    }
}

/// One observed request, filled in as its lifecycle events arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepInfo>,
    pub timestamp: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub request: RequestInfo,
    pub response: ResponseInfo,
    pub is_navigation_request: bool,
    /// Epoch seconds.
    pub request_sent_time: f64,
    pub load_end_time: f64,
    pub response_received_time: f64,
    pub resource_size: i64,
    pub transfer_size: i64,
    pub timings: Timings,
}

#[derive(Default)]
struct NetworkState {
    browser: Option<BrowserInfo>,
    entries: Vec<NetworkInfo>,
    index: HashMap<RequestId, usize>,
}

impl NetworkState {
    fn entry_mut(&mut self, id: &RequestId) -> Option<&mut NetworkInfo> {
        let idx = *self.index.get(id)?;
        self.entries.get_mut(idx)
    }
}

type SharedState = Arc<Mutex<NetworkState>>;

/// Captures every request made by a browsing context.
///
/// Entries are keyed by request identity for the lifetime of one capture
/// session. Details that need a round trip to the browser are fetched in
/// barrier tasks so a closing page never surfaces as an error.
pub struct NetworkManager {
    context: Arc<dyn BrowserContext>,
    client: Arc<dyn CdpSession>,
    current_step: StepCursor,
    state: SharedState,
    barriers: Arc<BarrierScope>,
    subscription: Option<Subscription>,
}

impl NetworkManager {
    pub fn new(
        context: Arc<dyn BrowserContext>,
        client: Arc<dyn CdpSession>,
        current_step: StepCursor,
    ) -> Self {
        Self {
            context,
            client,
            current_step,
            state: Arc::new(Mutex::new(NetworkState::default())),
            barriers: Arc::new(BarrierScope::new()),
            subscription: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }
        tracing::debug!("Plugins: started collecting network events");

        let product = self.client.browser_version().await?;
        self.state.lock().browser = Some(BrowserInfo::from_product(&product));

        let state = self.state.clone();
        let cursor = self.current_step.clone();
        let barriers = self.barriers.clone();
        self.subscription = Some(self.context.on(Arc::new(move |event: &ContextEvent| {
            match event {
                ContextEvent::Request(request) => {
                    on_request(&state, cursor.read().clone(), request.as_ref())
                }
                ContextEvent::Response(response) => on_response(&state, &barriers, response),
                ContextEvent::RequestFinished(request) | ContextEvent::RequestFailed(request) => {
                    on_request_completed(&state, &barriers, request)
                }
            }
        })));
        Ok(())
    }

    /// Detaches listeners and returns the captured entries. Extractions
    /// still pending after a short grace period are dropped.
    pub async fn stop(&mut self) -> Vec<NetworkInfo> {
        if let Some(subscription) = self.subscription.take() {
            subscription.detach();
        }

        let dropped = self
            .barriers
            .drain(Duration::from_millis(timeouts::ms::BARRIER_GRACE))
            .await;
        if dropped > 0 {
            tracing::debug!("Plugins: dropping {} network events", dropped);
        }
        tracing::debug!("Plugins: stopped collecting network events");

        let mut state = self.state.lock();
        state.index.clear();
        std::mem::take(&mut state.entries)
    }
}

fn on_request(state: &SharedState, step: Option<StepInfo>, request: &dyn Request) {
    let url = request.url();
    if url.starts_with("data:") {
        return;
    }

    let mut state = state.lock();
    let entry = NetworkInfo {
        browser: state.browser.clone(),
        step,
        timestamp: get_timestamp(),
        url: url.clone(),
        resource_type: request.resource_type(),
        request: RequestInfo {
            url: url.clone(),
            method: request.method(),
            headers: request.headers(),
            bytes: None,
            body: BodyInfo {
                bytes: request.post_data_len().unwrap_or(0) as i64,
            },
            referrer: None,
        },
        response: ResponseInfo::default(),
        is_navigation_request: request.is_navigation_request(),
        request_sent_time: epoch_time_in_seconds(),
        load_end_time: -1.0,
        response_received_time: -1.0,
        resource_size: 0,
        transfer_size: 0,
        timings: Timings::default(),
    };

    if let Some(previous) = request.redirected_from()
        && let Some(from) = state.entry_mut(&previous.id())
    {
        from.response.redirect_url = url;
    }

    let idx = state.entries.len();
    state.entries.push(entry);
    state.index.insert(request.id(), idx);
}

fn on_response(state: &SharedState, barriers: &BarrierScope, response: &Arc<dyn Response>) {
    let request = response.request();
    let id = request.id();
    let timing = request.timing();

    {
        let mut guard = state.lock();
        let Some(entry) = guard.entry_mut(&id) else {
            return;
        };
        entry.response_received_time = epoch_time_in_seconds();
        entry.response = ResponseInfo {
            url: Some(response.url()),
            status: response.status(),
            status_text: Some(response.status_text()),
            redirect_url: std::mem::take(&mut entry.response.redirect_url),
            ..ResponseInfo::default()
        };
        entry.timings = response_timings(&timing);
        calc_total_time(entry, &timing);
    }

    let page = request.page();

    let (state_ref, req, rid) = (state.clone(), request.clone(), id.clone());
    barriers.add(page.clone(), async move {
        if let Ok(headers) = req.all_headers().await {
            with_entry(&state_ref, &rid, |entry| {
                entry.request.referrer = headers.get("referer").cloned();
                entry.request.headers = headers;
            });
        }
    });

    let (state_ref, res, rid) = (state.clone(), response.clone(), id.clone());
    barriers.add(page.clone(), async move {
        if let Ok(headers) = res.all_headers().await {
            with_entry(&state_ref, &rid, |entry| {
                if let Some(content_type) = headers.get("content-type") {
                    entry.response.mime_type = mime_type(content_type);
                }
                entry.response.headers = headers;
            });
        }
    });

    let (state_ref, res, rid) = (state.clone(), response.clone(), id.clone());
    barriers.add(page.clone(), async move {
        if let Ok(server) = res.server_addr().await {
            with_entry(&state_ref, &rid, |entry| {
                entry.response.remote_ip_address = server.as_ref().map(|s| s.ip_address.clone());
                entry.response.remote_port = server.as_ref().map(|s| s.port);
            });
        }
    });

    let (state_ref, res, rid) = (state.clone(), response.clone(), id);
    barriers.add(page, async move {
        if let Ok(Some(details)) = res.security_details().await {
            with_entry(&state_ref, &rid, |entry| {
                entry.response.security_details = Some(details);
            });
        }
    });
}

fn on_request_completed(state: &SharedState, barriers: &BarrierScope, request: &Arc<dyn Request>) {
    let id = request.id();
    let timing = request.timing();

    {
        let mut guard = state.lock();
        let Some(entry) = guard.entry_mut(&id) else {
            return;
        };
        entry.load_end_time = epoch_time_in_seconds();
        entry.timings.receive = if timing.response_end != -1.0 {
            round_milli_secs(timing.response_end - timing.response_start)
        } else {
            -1.0
        };
        calc_total_time(entry, &timing);
    }

    // Aborted and failed requests have no sizes.
    if timing.start_time <= 0.0 {
        return;
    }

    let (state_ref, req) = (state.clone(), request.clone());
    barriers.add(request.page(), async move {
        if let Ok(sizes) = req.sizes().await {
            with_entry(&state_ref, &id, |entry| {
                entry.request.bytes = Some(sizes.request_headers_size + sizes.request_body_size);
                entry.request.body = BodyInfo {
                    bytes: sizes.request_body_size,
                };
                let transfer_size = sizes.response_headers_size + sizes.response_body_size;
                entry.transfer_size = transfer_size;
                entry.response.bytes = Some(transfer_size);
                entry.response.body = Some(BodyInfo {
                    bytes: sizes.response_body_size,
                });
            });
        }
    });
}

fn with_entry(state: &SharedState, id: &RequestId, update: impl FnOnce(&mut NetworkInfo)) {
    if let Some(entry) = state.lock().entry_mut(id) {
        update(entry);
    }
}

fn mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn first_positive(values: &[f64]) -> Option<f64> {
    values.iter().copied().find(|v| *v > 0.0)
}

/// Truncates to microsecond precision.
fn round_milli_secs(value: f64) -> f64 {
    (value * 1000.0).floor() / 1000.0
}

/// Phases known once the first response byte arrived.
fn response_timings(timing: &ResourceTiming) -> Timings {
    let blocked = first_positive(&[
        timing.domain_lookup_start,
        timing.connect_start,
        timing.request_start,
    ])
    .map(round_milli_secs)
    .filter(|v| *v != 0.0)
    .unwrap_or(-1.0);

    let since = |end: f64, start: f64| {
        if end != -1.0 {
            round_milli_secs(end - start)
        } else {
            -1.0
        }
    };

    Timings {
        blocked,
        dns: since(timing.domain_lookup_end, timing.domain_lookup_start),
        ssl: if timing.secure_connection_start != -1.0 {
            round_milli_secs(timing.connect_end - timing.secure_connection_start)
        } else {
            -1.0
        },
        connect: since(timing.connect_end, timing.connect_start),
        send: 0.0,
        wait: since(timing.response_start, timing.request_start),
        receive: -1.0,
        total: -1.0,
    }
}

/// Sum of the positive phases, or the event-clock duration when the browser
/// has no resource timing for the request.
fn calc_total_time(entry: &mut NetworkInfo, timing: &ResourceTiming) {
    let t = entry.timings;
    entry.timings.total = [t.blocked, t.dns, t.connect, t.wait, t.receive]
        .into_iter()
        .filter(|v| *v > 0.0)
        .sum();

    if timing.start_time <= 0.0 {
        let end = entry
            .load_end_time
            .max(entry.response_received_time)
            .max(entry.request_sent_time);
        let total = round_milli_secs((end - entry.request_sent_time) * 1000.0);
        entry.timings.total = if total <= 0.0 { -1.0 } else { total };
    }
}
