use super::StepCursor;
use crate::dsl::StepInfo;
use crate::driver::{Page, PageErrorEvent, PageEvent, Subscription};
use crate::utils::get_timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_MESSAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserMessage {
    pub timestamp: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub step: StepInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageErrorEvent>,
}

/// Bounded FIFO of captured messages; the oldest entry is evicted first.
#[derive(Debug)]
pub struct MessageLog {
    limit: usize,
    messages: VecDeque<BrowserMessage>,
}

impl MessageLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            messages: VecDeque::with_capacity(limit.min(64)),
        }
    }

    pub fn push(&mut self, message: BrowserMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.limit {
            self.messages.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn take(&mut self) -> Vec<BrowserMessage> {
        self.messages.drain(..).collect()
    }
}

/// Collects console errors/warnings and uncaught page errors, tagged with
/// the step active when they fire.
pub struct BrowserConsole {
    page: Arc<dyn Page>,
    current_step: StepCursor,
    messages: Arc<Mutex<MessageLog>>,
    subscription: Option<Subscription>,
}

impl BrowserConsole {
    pub fn new(page: Arc<dyn Page>, current_step: StepCursor) -> Self {
        Self::with_limit(page, current_step, DEFAULT_MESSAGE_LIMIT)
    }

    pub fn with_limit(page: Arc<dyn Page>, current_step: StepCursor, limit: usize) -> Self {
        Self {
            page,
            current_step,
            messages: Arc::new(Mutex::new(MessageLog::new(limit))),
            subscription: None,
        }
    }

    pub fn start(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        tracing::debug!("Plugins: started collecting console events");

        let cursor = self.current_step.clone();
        let messages = self.messages.clone();
        self.subscription = Some(self.page.on(Arc::new(move |event: &PageEvent| {
            if let Some(message) = to_message(event, cursor.read().as_ref()) {
                messages.lock().push(message);
            }
        })));
    }

    pub fn stop(&mut self) -> Vec<BrowserMessage> {
        if let Some(subscription) = self.subscription.take() {
            subscription.detach();
        }
        tracing::debug!("Plugins: stopped collecting console events");
        self.messages.lock().take()
    }
}

fn to_message(event: &PageEvent, step: Option<&StepInfo>) -> Option<BrowserMessage> {
    let step = step?.clone();
    match event {
        PageEvent::Console(console) if console.kind == "error" || console.kind == "warning" => {
            Some(BrowserMessage {
                timestamp: get_timestamp(),
                text: console.text.clone(),
                kind: console.kind.clone(),
                step,
                error: None,
            })
        }
        PageEvent::PageError(error) => Some(BrowserMessage {
            timestamp: get_timestamp(),
            text: error.message.clone(),
            kind: "error".to_string(),
            step,
            error: Some(error.clone()),
        }),
        PageEvent::Console(_) => None,
    }
}
