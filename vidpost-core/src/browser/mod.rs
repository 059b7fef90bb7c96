mod automation;
mod driver;
mod error;
mod metrics;
mod profile;
mod runtime;

pub use automation::{BrowserAutomation, BrowserLauncher, ChromiumPage};
pub use driver::{
    ClickDispatch, ClickOptions, CookieRecord, Locator, Matcher, PageDriver, SessionDriver,
};
pub use error::{BrowserError, BrowserResult};
pub use metrics::BrowserMetrics;
pub use profile::{BrowserProfile, ProfileManager};
pub use runtime::locate_executable;
