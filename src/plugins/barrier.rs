use crate::driver::Page;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Tracks async extractions tied to a page's lifetime.
///
/// Each extraction races the page closing: when the page goes away the
/// task is abandoned instead of failing. Finished or abandoned tasks remove
/// themselves; whatever is left at [`BarrierScope::drain`] gets a short
/// grace period and is then aborted.
pub struct BarrierScope {
    runtime: Option<Handle>,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl BarrierScope {
    /// Binds to the ambient tokio runtime, if any. Without one, the runtime
    /// is looked up again when the first extraction is added.
    pub fn new() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
            next_id: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
            next_id: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `extraction` unless the page closes first. Without a page
    /// there is nothing to guard, so the extraction is skipped.
    pub fn add<F>(&self, page: Option<Arc<dyn Page>>, extraction: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(page) = page else {
            return;
        };
        let lifetime = page.lifetime();
        if lifetime.is_cancelled() {
            return;
        }
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            tracing::warn!("No async runtime available, skipping page extraction");
            return;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Held across spawn so the task cannot remove itself before insertion.
        let mut pending = self.tasks.lock();
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = lifetime.cancelled() => {}
                _ = extraction => {}
            }
            tasks.lock().remove(&id);
        });
        pending.insert(id, handle);
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Waits up to `grace` for outstanding extractions, aborts the rest and
    /// returns how many were dropped.
    pub async fn drain(&self, grace: Duration) -> usize {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return 0;
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            return 0;
        }

        let dropped = aborts.iter().filter(|a| !a.is_finished()).count();
        for abort in &aborts {
            abort.abort();
        }
        dropped
    }
}

impl Default for BarrierScope {
    fn default() -> Self {
        Self::new()
    }
}
