//! Ranked matcher lookups. Driver errors count as "not found".

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::browser::{Matcher, PageDriver};

pub(crate) async fn settle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

/// First matcher with at least one element attached to the page.
pub(crate) async fn first_present<'a>(
    page: &dyn PageDriver,
    ranked: &'a [Matcher],
) -> Option<&'a Matcher> {
    for matcher in ranked {
        if page.count(matcher).await.unwrap_or(0) > 0 {
            debug!(selector = %matcher, "matcher present");
            return Some(matcher);
        }
    }
    None
}

/// First matcher whose first element is visible.
pub(crate) async fn first_visible<'a>(
    page: &dyn PageDriver,
    ranked: &'a [Matcher],
) -> Option<&'a Matcher> {
    for matcher in ranked {
        if page.is_visible(&matcher.first()).await.unwrap_or(false) {
            debug!(selector = %matcher, "matcher visible");
            return Some(matcher);
        }
    }
    None
}

pub(crate) async fn any_visible_and_enabled(page: &dyn PageDriver, ranked: &[Matcher]) -> bool {
    for matcher in ranked {
        let locator = matcher.first();
        if page.is_visible(&locator).await.unwrap_or(false)
            && page.is_enabled(&locator).await.unwrap_or(false)
        {
            debug!(selector = %matcher, "matcher visible and enabled");
            return true;
        }
    }
    false
}

/// First non-empty trimmed text among the ranked matchers.
pub(crate) async fn first_text(page: &dyn PageDriver, ranked: &[Matcher]) -> Option<String> {
    for matcher in ranked {
        if let Ok(Some(text)) = page.text(&matcher.first()).await {
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}
