use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{CookieRecord, PageDriver, SessionDriver};
use crate::config::{SessionSection, SiteSection, TimingSection, VidpostConfig};
use crate::poll::{poll_until, PollOutcome, PollSpec};

use super::error::{PublishError, PublishResult};
use super::navigate::navigate_with_retry;

/// Login material captured once and replayed into the working browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub cookies: Vec<CookieRecord>,
    pub local_storage: BTreeMap<String, String>,
    /// Origin the storage entries belong to, e.g. `https://channels.weixin.qq.com`.
    pub origin: String,
}

impl AuthState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty()
    }

    /// Script that seeds the captured storage entries on pages of the origin.
    pub fn seed_script(&self) -> PublishResult<Option<String>> {
        if self.local_storage.is_empty() {
            return Ok(None);
        }
        let entries = serde_json::to_string(&self.local_storage)
            .map_err(|err| PublishError::Session(format!("failed to encode storage: {err}")))?;
        let origin = serde_json::to_string(&self.origin)
            .map_err(|err| PublishError::Session(format!("failed to encode origin: {err}")))?;
        Ok(Some(format!(
            "(() => {{ if (window.location.origin !== {origin}) {{ return; }} \
             const entries = {entries}; \
             for (const [key, value] of Object.entries(entries)) {{ localStorage.setItem(key, value); }} }})();"
        )))
    }
}

/// Keeps the entries whose lowercase key contains one of `patterns`.
pub fn filter_storage(
    entries: BTreeMap<String, String>,
    patterns: &[String],
) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            patterns
                .iter()
                .any(|pattern| key.contains(&pattern.to_lowercase()))
        })
        .collect()
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    site: SiteSection,
    session: SessionSection,
    timing: TimingSection,
}

impl SessionManager {
    pub fn new(config: &VidpostConfig) -> Self {
        Self {
            site: config.site.clone(),
            session: config.session.clone(),
            timing: config.timing.clone(),
        }
    }

    /// Waits for an interactive login in `driver` and captures the result.
    ///
    /// The login page is closed on every path.
    pub async fn authenticate(&self, driver: &dyn SessionDriver) -> PublishResult<AuthState> {
        let page = driver
            .new_page()
            .await
            .map_err(|err| PublishError::Session(format!("failed to open login page: {err}")))?;
        let result = self.capture(page.as_ref()).await;
        if let Err(err) = page.close().await {
            warn!(error = %err, "failed to close login page");
        }
        result
    }

    async fn capture(&self, page: &dyn PageDriver) -> PublishResult<AuthState> {
        navigate_with_retry(page, &self.site.upload_url, &self.timing)
            .await
            .map_err(|err| PublishError::Session(err.to_string()))?;

        info!(
            deadline_seconds = self.session.login_deadline_seconds,
            "waiting for interactive login"
        );
        let prefix = self.site.post_login_prefix.as_str();
        let spec = PollSpec::new(self.session.login_interval(), self.session.login_deadline())
            .labelled("login");
        let outcome = poll_until(
            &spec,
            || async {
                page.url()
                    .await
                    .map(|url| url.contains(prefix))
                    .unwrap_or(false)
            },
            || async { false },
        )
        .await;
        if outcome != PollOutcome::Success {
            return Err(PublishError::Session(format!(
                "login not completed within {}s",
                self.session.login_deadline_seconds
            )));
        }
        info!("login detected");

        let cookies = page
            .cookies()
            .await
            .map_err(|err| PublishError::Session(format!("failed to capture cookies: {err}")))?;
        let local_storage = match page.local_storage().await {
            Ok(entries) => filter_storage(entries, &self.session.storage_key_patterns),
            Err(err) => {
                warn!(error = %err, "failed to read local storage; continuing with cookies only");
                BTreeMap::new()
            }
        };
        let current = page.url().await.unwrap_or_default();
        let origin = origin_of(&current)
            .or_else(|| origin_of(&self.site.upload_url))
            .unwrap_or_default();

        info!(
            cookies = cookies.len(),
            storage_entries = local_storage.len(),
            origin = %origin,
            "captured login state"
        );
        Ok(AuthState {
            cookies,
            local_storage,
            origin,
        })
    }

    /// Replays `state` into a working browser before it is shared.
    ///
    /// Restoring an empty state does nothing; restoring the same state twice
    /// leaves the browser as after the first call.
    pub async fn restore(
        &self,
        driver: &mut dyn SessionDriver,
        state: &AuthState,
    ) -> PublishResult<()> {
        if state.is_empty() {
            debug!("no login state to restore");
            return Ok(());
        }
        if !state.cookies.is_empty() {
            driver
                .add_cookies(&state.cookies)
                .await
                .map_err(|err| PublishError::Session(format!("failed to restore cookies: {err}")))?;
        }
        if let Some(script) = state.seed_script()? {
            driver.add_init_script(&script).await.map_err(|err| {
                PublishError::Session(format!("failed to restore local storage: {err}"))
            })?;
        }
        info!(
            cookies = state.cookies.len(),
            storage_entries = state.local_storage.len(),
            "restored login state"
        );
        Ok(())
    }
}
