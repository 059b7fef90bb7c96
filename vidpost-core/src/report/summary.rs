use std::fmt::Write as _;

use serde::Serialize;

use crate::browser::BrowserMetrics;

use super::result::JobResult;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BrowserMetrics>,
}

impl RunSummary {
    pub fn new(results: Vec<JobResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BrowserMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Jobs: {} total, {} succeeded, {} failed",
            self.total, self.succeeded, self.failed
        );
        for result in &self.results {
            match result.error() {
                None => {
                    let _ = writeln!(
                        out,
                        "  row {:<4} ok      {} ({})",
                        result.row,
                        result.asset_name,
                        result.account.as_deref().unwrap_or("-")
                    );
                }
                Some(error) => {
                    let phase = result.failed_phase.map(|p| p.as_str()).unwrap_or("-");
                    let _ = writeln!(
                        out,
                        "  row {:<4} FAILED  {} [{}] {}",
                        result.row, result.asset_name, phase, error
                    );
                }
            }
        }
        if let Some(metrics) = &self.metrics {
            let _ = writeln!(
                out,
                "Browser: {} pages opened, {} navigations ({:.0}% ok), {} files attached",
                metrics.pages_opened,
                metrics.navigations,
                metrics.navigation_success_rate(),
                metrics.files_attached
            );
        }
        out
    }
}
