use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserMetrics {
    pub pages_opened: u64,
    pub pages_closed: u64,
    pub navigations: u64,
    pub navigation_failures: u64,
    pub reloads: u64,
    pub files_attached: u64,
}

impl BrowserMetrics {
    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_page_close(&mut self) {
        self.pages_closed = self.pages_closed.saturating_add(1);
    }

    pub fn record_navigation(&mut self, success: bool) {
        self.navigations = self.navigations.saturating_add(1);
        if !success {
            self.navigation_failures = self.navigation_failures.saturating_add(1);
        }
    }

    pub fn record_reload(&mut self) {
        self.reloads = self.reloads.saturating_add(1);
    }

    pub fn record_file_attached(&mut self) {
        self.files_attached = self.files_attached.saturating_add(1);
    }

    pub fn open_pages(&self) -> u64 {
        self.pages_opened.saturating_sub(self.pages_closed)
    }

    pub fn navigation_success_rate(&self) -> f64 {
        if self.navigations == 0 {
            0.0
        } else {
            let ok = self.navigations - self.navigation_failures;
            (ok as f64 / self.navigations as f64) * 100.0
        }
    }
}
