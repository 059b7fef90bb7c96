//! Automation capability used by the publishing pipeline.
//!
//! Everything the pipeline knows about the remote page goes through
//! [`SessionDriver`] and [`PageDriver`]. Markup never appears in the pipeline
//! itself; it is described by [`Matcher`] values loaded from configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::poll::{poll_until, PollOutcome, PollSpec};

use super::error::{BrowserError, BrowserResult};

const XPATH_PREFIX: &str = "xpath=";
const TEXT_PREFIX: &str = "text=";
const SCOPE_SEPARATOR: &str = " >> ";

/// How an element is found on the page.
///
/// The textual form accepted by [`Matcher::from_str`]:
///
/// * `xpath=//label[...]` selects by XPath;
/// * `text=发表` selects the innermost elements whose text contains the value;
/// * `.form-btns button >> text=发表` selects elements matching the CSS scope
///   whose text contains the value;
/// * anything else is a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Matcher {
    Css(String),
    Text { scope: Option<String>, text: String },
    XPath(String),
}

impl Matcher {
    pub fn css(selector: impl Into<String>) -> Self {
        Matcher::Css(selector.into())
    }

    pub fn text_within(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Matcher::Text {
            scope: Some(scope.into()),
            text: text.into(),
        }
    }

    pub fn first(&self) -> Locator {
        Locator::first(self.clone())
    }

    pub fn nth(&self, index: usize) -> Locator {
        Locator::nth(self.clone(), index)
    }
}

impl FromStr for Matcher {
    type Err = BrowserError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(BrowserError::Configuration("empty matcher".into()));
        }
        if let Some(path) = value.strip_prefix(XPATH_PREFIX) {
            return Ok(Matcher::XPath(path.trim().to_string()));
        }
        if let Some(text) = value.strip_prefix(TEXT_PREFIX) {
            return Ok(Matcher::Text {
                scope: None,
                text: text.trim().to_string(),
            });
        }
        if let Some((scope, rest)) = value.split_once(SCOPE_SEPARATOR) {
            if let Some(text) = rest.trim().strip_prefix(TEXT_PREFIX) {
                return Ok(Matcher::Text {
                    scope: Some(scope.trim().to_string()),
                    text: text.trim().to_string(),
                });
            }
            return Err(BrowserError::Configuration(format!(
                "unsupported chained matcher: {value}"
            )));
        }
        Ok(Matcher::Css(value.to_string()))
    }
}

impl TryFrom<String> for Matcher {
    type Error = BrowserError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Matcher> for String {
    fn from(matcher: Matcher) -> Self {
        matcher.to_string()
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Css(selector) => f.write_str(selector),
            Matcher::Text { scope: None, text } => write!(f, "{TEXT_PREFIX}{text}"),
            Matcher::Text {
                scope: Some(scope),
                text,
            } => write!(f, "{scope}{SCOPE_SEPARATOR}{TEXT_PREFIX}{text}"),
            Matcher::XPath(path) => write!(f, "{XPATH_PREFIX}{path}"),
        }
    }
}

/// One element among the matches of a [`Matcher`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub matcher: Matcher,
    pub nth: usize,
}

impl Locator {
    pub fn first(matcher: Matcher) -> Self {
        Self { matcher, nth: 0 }
    }

    pub fn nth(matcher: Matcher, nth: usize) -> Self {
        Self { matcher, nth }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.matcher, self.nth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickDispatch {
    /// Real pointer events at the element's position.
    #[default]
    Pointer,
    /// `scrollIntoView` followed by `element.click()` in page script.
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOptions {
    /// Skip the visible/enabled wait before clicking.
    pub force: bool,
    pub timeout: Duration,
    pub dispatch: ClickDispatch,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            force: false,
            timeout: Duration::from_secs(5),
            dispatch: ClickDispatch::Pointer,
        }
    }
}

impl ClickOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn forced(timeout: Duration) -> Self {
        Self {
            force: true,
            timeout,
            ..Self::default()
        }
    }

    pub fn scripted() -> Self {
        Self {
            force: true,
            dispatch: ClickDispatch::Script,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Seconds since the epoch; negative for session cookies.
    pub expires: f64,
    pub http_only: bool,
    pub secure: bool,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()>;
    async fn reload(&self) -> BrowserResult<()>;
    async fn url(&self) -> BrowserResult<String>;
    async fn body_text(&self) -> BrowserResult<String>;

    async fn count(&self, matcher: &Matcher) -> BrowserResult<usize>;
    async fn is_visible(&self, locator: &Locator) -> BrowserResult<bool>;
    async fn is_enabled(&self, locator: &Locator) -> BrowserResult<bool>;
    async fn is_checked(&self, locator: &Locator) -> BrowserResult<bool>;
    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>>;
    async fn text(&self, locator: &Locator) -> BrowserResult<Option<String>>;
    async fn input_value(&self, locator: &Locator) -> BrowserResult<Option<String>>;

    async fn click(&self, locator: &Locator, options: ClickOptions) -> BrowserResult<()>;
    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()>;
    async fn set_input_files(&self, locator: &Locator, path: &Path) -> BrowserResult<()>;
    /// Marks a radio or checkbox as checked in page script and fires `change`.
    async fn force_check(&self, locator: &Locator) -> BrowserResult<()>;

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;
    async fn local_storage(&self) -> BrowserResult<BTreeMap<String, String>>;
    async fn cookies(&self) -> BrowserResult<Vec<CookieRecord>>;
    async fn close(&self) -> BrowserResult<()>;

    async fn wait_for_visible(&self, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
        let spec = PollSpec::new(Duration::from_millis(250), timeout);
        let outcome = poll_until(
            &spec,
            || async { self.is_visible(locator).await.unwrap_or(false) },
            || async { false },
        )
        .await;
        match outcome {
            PollOutcome::Success => Ok(()),
            _ => Err(BrowserError::Timeout(format!("{locator} to become visible"))),
        }
    }
}

#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageDriver>>;
    async fn add_cookies(&mut self, cookies: &[CookieRecord]) -> BrowserResult<()>;
    async fn add_init_script(&mut self, script: &str) -> BrowserResult<()>;
}
