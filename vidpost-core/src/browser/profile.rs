use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::error::{BrowserError, BrowserResult};

/// Scratch user-data directory for one Chromium launch.
///
/// Login state is carried between launches explicitly, so a profile never
/// outlives the browser that used it.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    id: String,
    path: PathBuf,
    created_at: DateTime<Utc>,
}

impl BrowserProfile {
    fn create(base_dir: &Path, purpose: &str) -> BrowserResult<Self> {
        let id = format!("{purpose}-{}", Uuid::new_v4());
        let path = base_dir.join(&id);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(Self {
            id,
            path,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn remove(&self) {
        if self.path.exists() {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                warn!(profile = %self.id, error = %err, "failed to remove profile dir");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    stale_after: Duration,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self {
            base_dir,
            stale_after: Duration::from_secs(24 * 60 * 60),
        })
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn allocate(&self, purpose: &str) -> BrowserResult<BrowserProfile> {
        BrowserProfile::create(&self.base_dir, purpose)
    }

    /// Removes profile dirs left behind by runs that did not shut down cleanly.
    pub fn cleanup_stale(&self) -> BrowserResult<usize> {
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let modified = match entry.metadata().and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read profile metadata");
                    continue;
                }
            };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) > self.stale_after {
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "failed to remove stale profile")
                    }
                }
            }
        }
        Ok(removed)
    }
}
