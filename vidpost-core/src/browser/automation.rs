use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChromiumSection;

use super::driver::{
    ClickDispatch, ClickOptions, CookieRecord, Locator, Matcher, PageDriver, SessionDriver,
};
use super::error::{BrowserError, BrowserResult};
use super::metrics::BrowserMetrics;
use super::profile::{BrowserProfile, ProfileManager};
use super::runtime::locate_executable;

const WEBDRIVER_MASK: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => false });";

const TARGET_ATTRIBUTE: &str = "data-vidpost-target";

/// Page-side helpers shared by every element script. `__vpResolve` returns
/// the matches of a serialized [`Matcher`] in document order.
const RESOLVER: &str = r#"
const __vpResolve = (m) => {
    if (m.kind === 'css') {
        return Array.from(document.querySelectorAll(m.selector));
    }
    if (m.kind === 'xpath') {
        const snapshot = document.evaluate(m.path, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const found = [];
        for (let i = 0; i < snapshot.snapshotLength; i++) {
            found.push(snapshot.snapshotItem(i));
        }
        return found;
    }
    const pool = Array.from(document.querySelectorAll(m.scope || 'body *'));
    const hits = pool.filter((el) => (el.textContent || '').includes(m.text));
    if (m.scope) {
        return hits;
    }
    return hits.filter((el) => !hits.some((other) => other !== el && el.contains(other)));
};
const __vpVisible = (el) => {
    if (!el || !el.isConnected) {
        return false;
    }
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') {
        return false;
    }
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
};
"#;

const LOCAL_STORAGE_SCRIPT: &str = r#"(() => {
    const entries = {};
    for (let i = 0; i < localStorage.length; i++) {
        const key = localStorage.key(i);
        entries[key] = localStorage.getItem(key);
    }
    return entries;
})()"#;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MatcherSpec<'a> {
    Css { selector: &'a str },
    Text { scope: Option<&'a str>, text: &'a str },
    Xpath { path: &'a str },
}

impl<'a> From<&'a Matcher> for MatcherSpec<'a> {
    fn from(matcher: &'a Matcher) -> Self {
        match matcher {
            Matcher::Css(selector) => MatcherSpec::Css { selector },
            Matcher::Text { scope, text } => MatcherSpec::Text {
                scope: scope.as_deref(),
                text,
            },
            Matcher::XPath(path) => MatcherSpec::Xpath { path },
        }
    }
}

fn matcher_script(matcher: &Matcher, body: &str) -> BrowserResult<String> {
    let spec = serde_json::to_string(&MatcherSpec::from(matcher))?;
    Ok(format!(
        "(() => {{ {RESOLVER} const matches = __vpResolve({spec}); {body} }})()"
    ))
}

fn element_script(locator: &Locator, body: &str) -> BrowserResult<String> {
    let prelude = format!("const el = matches[{}];", locator.nth);
    matcher_script(&locator.matcher, &format!("{prelude} {body}"))
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<ChromiumSection>,
    executable: PathBuf,
    profiles: ProfileManager,
}

impl BrowserLauncher {
    pub fn new(config: ChromiumSection, profiles: ProfileManager) -> BrowserResult<Self> {
        let executable = locate_executable(&config)?;
        Ok(Self {
            config: Arc::new(config),
            executable,
            profiles,
        })
    }

    pub fn config(&self) -> &ChromiumSection {
        &self.config
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Starts a fresh Chromium with its own scratch profile.
    pub async fn launch(&self, purpose: &str, headless: bool) -> BrowserResult<BrowserAutomation> {
        if let Err(err) = self.profiles.cleanup_stale() {
            warn!(error = %err, "failed to clean stale profiles");
        }
        let profile = self.profiles.allocate(purpose)?;
        let chromium_config = self.build_chromium_config(&profile, headless)?;
        info!(
            profile = %profile.id(),
            executable = %self.executable.display(),
            width = self.config.window_width,
            height = self.config.window_height,
            headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = match Browser::launch(chromium_config).await {
            Ok(launched) => launched,
            Err(err) => {
                profile.remove();
                return Err(BrowserError::Launch(err.to_string()));
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        Ok(BrowserAutomation {
            browser,
            profile,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            metrics: Arc::new(Mutex::new(BrowserMetrics::default())),
            cookies: Vec::new(),
            init_scripts: Vec::new(),
        })
    }

    fn build_chromium_config(
        &self,
        profile: &BrowserProfile,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let width = self.config.window_width;
        let height = self.config.window_height;
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.executable)
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if !headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={}", self.config.user_agent),
            format!("--window-size={width},{height}"),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        args.extend(self.config.extra_args.iter().cloned());

        builder = builder.args(args);
        builder.build().map_err(BrowserError::Configuration)
    }
}

/// One running Chromium plus the login state restored into it.
#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<ChromiumSection>,
    metrics: Arc<Mutex<BrowserMetrics>>,
    cookies: Vec<CookieParam>,
    init_scripts: Vec<String>,
}

impl BrowserAutomation {
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    pub fn metrics(&self) -> BrowserMetrics {
        self.metrics
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.id(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        self.profile.remove();
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        let params = SetUserAgentOverrideParams::builder()
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;

        for source in std::iter::once(WEBDRIVER_MASK).chain(self.init_scripts.iter().map(String::as_str)) {
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(source)
                    .build()
                    .map_err(BrowserError::Configuration)?,
            )
            .await?;
        }

        if !self.cookies.is_empty() {
            page.set_cookies(self.cookies.clone()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionDriver for BrowserAutomation {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageDriver>> {
        let page = self
            .browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_page_open();
        }
        let page = ChromiumPage {
            page,
            metrics: Arc::clone(&self.metrics),
        };
        if let Err(err) = self.configure_page(&page.page).await {
            if let Err(close_err) = page.close().await {
                warn!(error = %close_err, "failed to close misconfigured page");
            }
            return Err(err);
        }
        Ok(Box::new(page))
    }

    async fn add_cookies(&mut self, cookies: &[CookieRecord]) -> BrowserResult<()> {
        for record in cookies {
            let mut builder = CookieParam::builder()
                .name(record.name.clone())
                .value(record.value.clone())
                .domain(record.domain.clone())
                .path(record.path.clone())
                .http_only(record.http_only)
                .secure(record.secure);
            if record.expires > 0.0 {
                builder = builder.expires(TimeSinceEpoch::new(record.expires));
            }
            let param = builder.build().map_err(BrowserError::Configuration)?;
            self.cookies.retain(|existing| {
                !(existing.name == param.name
                    && existing.domain == param.domain
                    && existing.path == param.path)
            });
            self.cookies.push(param);
        }
        Ok(())
    }

    async fn add_init_script(&mut self, script: &str) -> BrowserResult<()> {
        if !self.init_scripts.iter().any(|existing| existing == script) {
            self.init_scripts.push(script.to_string());
        }
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.id(),
                    "BrowserAutomation dropped without explicit shutdown"
                );
            }
        }
    }
}

#[derive(Debug)]
pub struct ChromiumPage {
    page: Page,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl ChromiumPage {
    fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut BrowserMetrics),
    {
        if let Ok(mut guard) = self.metrics.lock() {
            f(&mut guard);
        }
    }

    async fn eval_value(&self, script: String) -> BrowserResult<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn eval_element<T: DeserializeOwned>(
        &self,
        locator: &Locator,
        body: &str,
    ) -> BrowserResult<T> {
        let value = self.eval_value(element_script(locator, body)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn require(&self, locator: &Locator, body: &str) -> BrowserResult<()> {
        let done: bool = self
            .eval_element(locator, &format!("if (!el) {{ return false; }} {body} return true;"))
            .await?;
        if done {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(locator.to_string()))
        }
    }

    /// Marks the element so CDP can address it through a plain CSS query.
    async fn tag(&self, locator: &Locator) -> BrowserResult<String> {
        let body = format!(
            "if (!el) {{ return null; }} \
             const id = 'vp-' + Math.random().toString(36).slice(2); \
             el.setAttribute('{TARGET_ATTRIBUTE}', id); return id;"
        );
        let id: Option<String> = self.eval_element(locator, &body).await?;
        let id = id.ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))?;
        Ok(format!("[{TARGET_ATTRIBUTE}=\"{id}\"]"))
    }

    async fn pointer_click(&self, locator: &Locator, options: ClickOptions) -> BrowserResult<()> {
        if !options.force {
            self.wait_for_visible(locator, options.timeout).await?;
            if !self.is_enabled(locator).await? {
                return Err(BrowserError::NotActionable {
                    locator: locator.to_string(),
                    reason: "disabled".into(),
                });
            }
        }
        let selector = self.tag(locator).await?;
        let element = self.page.find_element(selector).await?;
        element.scroll_into_view().await?;
        element.click().await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()> {
        let outcome = tokio::time::timeout(timeout, self.page.goto(url)).await;
        let result = match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(BrowserError::from(err)),
            Err(_) => Err(BrowserError::Timeout(format!("navigation to {url}"))),
        };
        self.record(|metrics| metrics.record_navigation(result.is_ok()));
        result
    }

    async fn reload(&self) -> BrowserResult<()> {
        self.page.reload().await?;
        self.record(BrowserMetrics::record_reload);
        Ok(())
    }

    async fn url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn body_text(&self) -> BrowserResult<String> {
        let value = self
            .eval_value("document.body ? document.body.innerText : ''".to_string())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn count(&self, matcher: &Matcher) -> BrowserResult<usize> {
        let value = self
            .eval_value(matcher_script(matcher, "return matches.length;")?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn is_visible(&self, locator: &Locator) -> BrowserResult<bool> {
        self.eval_element(locator, "return __vpVisible(el);").await
    }

    async fn is_enabled(&self, locator: &Locator) -> BrowserResult<bool> {
        self.eval_element(
            locator,
            "return !!el && !el.disabled && el.getAttribute('aria-disabled') !== 'true';",
        )
        .await
    }

    async fn is_checked(&self, locator: &Locator) -> BrowserResult<bool> {
        self.eval_element(locator, "return !!el && !!el.checked;")
            .await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>> {
        let name = serde_json::to_string(name)?;
        self.eval_element(locator, &format!("return el ? el.getAttribute({name}) : null;"))
            .await
    }

    async fn text(&self, locator: &Locator) -> BrowserResult<Option<String>> {
        self.eval_element(
            locator,
            "return el ? (el.textContent || '').trim() : null;",
        )
        .await
    }

    async fn input_value(&self, locator: &Locator) -> BrowserResult<Option<String>> {
        self.eval_element(
            locator,
            "if (!el) { return null; } return 'value' in el ? String(el.value) : (el.textContent || '');",
        )
        .await
    }

    async fn click(&self, locator: &Locator, options: ClickOptions) -> BrowserResult<()> {
        match options.dispatch {
            ClickDispatch::Script => {
                self.require(
                    locator,
                    "el.scrollIntoView({ block: 'center' }); el.click();",
                )
                .await
            }
            ClickDispatch::Pointer => {
                match tokio::time::timeout(options.timeout, self.pointer_click(locator, options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(BrowserError::Timeout(format!("click on {locator}"))),
                }
            }
        }
    }

    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let value = serde_json::to_string(value)?;
        let body = format!(
            r#"const value = {value};
            el.focus();
            if (el.isContentEditable) {{
                const range = document.createRange();
                range.selectNodeContents(el);
                const selection = window.getSelection();
                selection.removeAllRanges();
                selection.addRange(range);
                if (value === '') {{
                    document.execCommand('delete');
                }} else if (!document.execCommand('insertText', false, value)) {{
                    el.textContent = value;
                }}
            }} else {{
                const proto = el instanceof HTMLTextAreaElement
                    ? HTMLTextAreaElement.prototype
                    : HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
                setter.call(el, value);
            }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));"#
        );
        self.require(locator, &body).await
    }

    async fn set_input_files(&self, locator: &Locator, path: &Path) -> BrowserResult<()> {
        let selector = self.tag(locator).await?;
        let element = self.page.find_element(selector).await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.display().to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.execute(params).await?;
        self.record(BrowserMetrics::record_file_attached);
        Ok(())
    }

    async fn force_check(&self, locator: &Locator) -> BrowserResult<()> {
        self.require(
            locator,
            "el.checked = true; el.dispatchEvent(new Event('change', { bubbles: true }));",
        )
        .await
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        self.eval_value(script.to_string()).await
    }

    async fn local_storage(&self) -> BrowserResult<BTreeMap<String, String>> {
        let value = self.eval_value(LOCAL_STORAGE_SCRIPT.to_string()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn cookies(&self) -> BrowserResult<Vec<CookieRecord>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|cookie| CookieRecord {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
                path: cookie.path,
                expires: cookie.expires,
                http_only: cookie.http_only,
                secure: cookie.secure,
            })
            .collect())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.page.clone().close().await?;
        self.record(BrowserMetrics::record_page_close);
        Ok(())
    }
}
