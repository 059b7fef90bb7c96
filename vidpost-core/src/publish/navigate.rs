use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::config::TimingSection;

use super::error::{PublishError, PublishResult};
use super::probe::settle;

/// Opens `url`, retrying with a growing pause and a reload between attempts.
///
/// Returns the attempt number that succeeded.
pub(crate) async fn navigate_with_retry(
    page: &dyn PageDriver,
    url: &str,
    timing: &TimingSection,
) -> PublishResult<u32> {
    let attempts = timing.navigation_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match page.goto(url, timing.navigation_timeout()).await {
            Ok(()) => {
                info!(url, attempt, "navigation succeeded");
                return Ok(attempt);
            }
            Err(err) => {
                warn!(url, attempt, attempts, error = %err, "navigation failed");
                last_error = err.to_string();
            }
        }
        if attempt < attempts {
            settle(timing.navigation_backoff(attempt)).await;
            if let Err(err) = page.reload().await {
                warn!(url, error = %err, "reload before retry failed");
            }
        }
    }
    Err(PublishError::Navigation {
        attempts,
        message: last_error,
    })
}
