use crate::config::Params;
use crate::utils::run_parallel;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    BeforeAll,
    AfterAll,
    Before,
    After,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::BeforeAll => write!(f, "beforeAll"),
            HookKind::AfterAll => write!(f, "afterAll"),
            HookKind::Before => write!(f, "before"),
            HookKind::After => write!(f, "after"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HookArgs {
    pub env: String,
    pub params: Params,
}

pub type HookCallback =
    Arc<dyn Fn(HookArgs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub fn hook<F, Fut>(callback: F) -> HookCallback
where
    F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(callback(args)))
}

#[derive(Clone, Default)]
pub struct Hooks {
    pub before: Vec<HookCallback>,
    pub after: Vec<HookCallback>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// Runs all callbacks of one phase concurrently. A panicking hook counts as
/// a failed one.
pub async fn run_hooks(hooks: &[HookCallback], args: &HookArgs) -> Result<(), ExecutionError> {
    let futures: Vec<BoxFuture<'_, Result<(), ExecutionError>>> = hooks
        .iter()
        .map(|hook| {
            let fut = hook(args.clone());
            async move {
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result.map_err(ExecutionError::from),
                    Err(payload) => Err(ExecutionError::from_panic(payload.as_ref())),
                }
            }
            .boxed()
        })
        .collect();
    run_parallel(futures).await
}
