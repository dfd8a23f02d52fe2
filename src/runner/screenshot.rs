use crate::driver::{Page, ScreenshotOptions};
use crate::dsl::StepInfo;
use crate::timeouts;
use crate::utils::get_timestamp;
use crate::{Result, SyntheticsError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Screenshot written to the cache after a step, picked up by reporters
/// once the journey ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedScreenshot {
    pub step: StepInfo,
    /// Epoch microseconds.
    pub timestamp: i64,
    /// Base64 encoded JPEG.
    pub data: String,
}

/// Per-run screenshot directory under the cache root.
#[derive(Debug, Clone)]
pub struct ScreenshotCache {
    dir: PathBuf,
}

impl ScreenshotCache {
    pub fn new(cache_root: &Path, run_id: &str) -> Self {
        Self {
            dir: cache_root.join(run_id).join("screenshots"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Captures the page and stores it for `step`. Bounded by the
    /// screenshot timeout.
    pub async fn capture(&self, page: Arc<dyn Page>, step: StepInfo) -> Result<PathBuf> {
        let shot = tokio::time::timeout(
            Duration::from_millis(timeouts::ms::SCREENSHOT),
            page.screenshot(&ScreenshotOptions::default()),
        )
        .await
        .map_err(|_| SyntheticsError::ScreenshotFailed("timed out".into()))??;

        let entry = CachedScreenshot {
            step,
            timestamp: get_timestamp(),
            data: STANDARD.encode(shot),
        };
        self.store(&entry).await
    }

    pub async fn store(&self, entry: &CachedScreenshot) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("{}-{}.json", entry.step.index, entry.timestamp));
        tokio::fs::write(&path, serde_json::to_vec(entry)?).await?;
        Ok(path)
    }

    /// Drops the screenshots of the journey that just ended.
    pub async fn clear(&self) -> Result<()> {
        remove_dir(&self.dir).await
    }

    /// Removes the whole run directory.
    pub async fn remove(&self) -> Result<()> {
        match self.dir.parent() {
            Some(run_dir) => remove_dir(run_dir).await,
            None => Ok(()),
        }
    }
}

async fn remove_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Loads every cached screenshot in `dir`, ordered by step then capture
/// time. Unreadable entries are skipped.
pub fn read_screenshots(dir: &Path) -> Vec<CachedScreenshot> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut screenshots: Vec<CachedScreenshot> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| {
            let content = std::fs::read(&path).ok()?;
            match serde_json::from_slice(&content) {
                Ok(shot) => Some(shot),
                Err(e) => {
                    tracing::warn!("Skipping unreadable screenshot {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();
    screenshots.sort_by_key(|shot| (shot.step.index, shot.timestamp));
    screenshots
}
