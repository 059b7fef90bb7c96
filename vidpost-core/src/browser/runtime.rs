use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ChromiumSection;

use super::error::{BrowserError, BrowserResult};

/// Finds a usable Chromium binary: the configured path first, then fallbacks.
pub fn locate_executable(config: &ChromiumSection) -> BrowserResult<PathBuf> {
    let candidates = std::iter::once(config.executable_path.as_str())
        .chain(config.fallback_paths.iter().map(String::as_str))
        .filter(|candidate| !candidate.trim().is_empty());
    let mut tried = Vec::new();
    for candidate in candidates {
        let path = Path::new(candidate);
        if path.is_file() {
            info!(path = %path.display(), "using chromium executable");
            return Ok(path.to_path_buf());
        }
        debug!(path = %path.display(), "chromium candidate missing");
        tried.push(candidate.to_string());
    }
    Err(BrowserError::Launch(format!(
        "no chromium executable found (tried: {})",
        tried.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn section(primary: &str, fallbacks: Vec<String>) -> ChromiumSection {
        ChromiumSection {
            executable_path: primary.into(),
            fallback_paths: fallbacks,
            headless: true,
            sandbox: false,
            disable_gpu: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: "test".into(),
            request_timeout_seconds: None,
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn falls_back_to_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let chrome = dir.path().join("chrome");
        std::fs::write(&chrome, b"#!/bin/sh\n").unwrap();
        let config = section(
            "/missing/chromium",
            vec![
                "/missing/other".into(),
                chrome.display().to_string(),
            ],
        );
        assert_eq!(locate_executable(&config).unwrap(), chrome);
    }

    #[test]
    fn reports_every_candidate_tried() {
        let config = section("/missing/a", vec!["/missing/b".into()]);
        let err = locate_executable(&config).unwrap_err().to_string();
        assert!(err.contains("/missing/a"));
        assert!(err.contains("/missing/b"));
    }
}
