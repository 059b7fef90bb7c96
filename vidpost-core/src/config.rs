use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::browser::Matcher;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VidpostConfig {
    pub site: SiteSection,
    pub chromium: ChromiumSection,
    pub paths: PathsSection,
    pub session: SessionSection,
    pub timing: TimingSection,
    pub upload: UploadSection,
    pub action: ActionSection,
    pub selectors: SelectorsSection,
    pub picker: PickerSection,
}

impl VidpostConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    fn check(&self, path: &Path) -> Result<()> {
        let ranked: [(&str, &[Matcher]); 7] = [
            ("selectors.ready_markers", &self.selectors.ready_markers),
            ("selectors.file_inputs", &self.selectors.file_inputs),
            ("selectors.delete_markers", &self.selectors.delete_markers),
            ("selectors.short_title", &self.selectors.short_title),
            ("selectors.draft_success", &self.selectors.draft_success),
            ("selectors.publish_success", &self.selectors.publish_success),
            ("selectors.preview_success", &self.selectors.preview_success),
        ];
        for (name, list) in ranked {
            if list.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must list at least one matcher"),
                    path: path.to_path_buf(),
                });
            }
        }
        if self.timing.navigation_attempts == 0 || self.upload.attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "attempt counts must be at least 1".into(),
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSection {
    pub upload_url: String,
    /// URL prefix reached once the interactive login finished.
    pub post_login_prefix: String,
    pub expected_host: String,
    pub expected_path_fragment: String,
    /// Body texts that identify the upload surface when the URL does not.
    pub surface_texts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    #[serde(default)]
    pub fallback_paths: Vec<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub request_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub profiles_dir: String,
    pub log_dir: String,
    pub ledger_db: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Lowercase substrings that select local-storage keys worth carrying over.
    pub storage_key_patterns: Vec<String>,
    pub login_interval_seconds: u64,
    pub login_deadline_seconds: u64,
}

impl SessionSection {
    pub fn login_interval(&self) -> Duration {
        Duration::from_secs(self.login_interval_seconds)
    }

    pub fn login_deadline(&self) -> Duration {
        Duration::from_secs(self.login_deadline_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingSection {
    pub navigation_attempts: u32,
    pub navigation_timeout_seconds: u64,
    pub navigation_backoff_seconds: u64,
    pub page_settle_seconds: u64,
    pub ready_interval_seconds: u64,
    pub ready_attempts: u32,
    pub sequential_settle_seconds: u64,
    pub button_visible_seconds: u64,
    pub field_settle_ms: u64,
    pub schedule_control_visible_seconds: u64,
    pub schedule_click_timeout_seconds: u64,
    pub schedule_mode_settle_seconds: u64,
    pub picker_step_settle_ms: u64,
    pub picker_panel_visible_seconds: u64,
}

impl TimingSection {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_seconds)
    }

    pub fn navigation_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.navigation_backoff_seconds.saturating_mul(attempt as u64))
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_secs(self.page_settle_seconds)
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_secs(self.ready_interval_seconds)
    }

    pub fn sequential_settle(&self) -> Duration {
        Duration::from_secs(self.sequential_settle_seconds)
    }

    pub fn button_visible(&self) -> Duration {
        Duration::from_secs(self.button_visible_seconds)
    }

    pub fn field_settle(&self) -> Duration {
        Duration::from_millis(self.field_settle_ms)
    }

    pub fn schedule_control_visible(&self) -> Duration {
        Duration::from_secs(self.schedule_control_visible_seconds)
    }

    pub fn schedule_click_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule_click_timeout_seconds)
    }

    pub fn schedule_mode_settle(&self) -> Duration {
        Duration::from_secs(self.schedule_mode_settle_seconds)
    }

    pub fn picker_step_settle(&self) -> Duration {
        Duration::from_millis(self.picker_step_settle_ms)
    }

    pub fn picker_panel_visible(&self) -> Duration {
        Duration::from_secs(self.picker_panel_visible_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    pub attempts: u32,
    pub retry_delay_seconds: u64,
    pub settle_seconds: u64,
    pub poll_interval_seconds: u64,
    pub deadline_seconds: u64,
}

impl UploadSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSection {
    pub poll_interval_seconds: u64,
    pub deadline_seconds: u64,
    pub cancel_settle_seconds: u64,
}

impl ActionSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }

    pub fn cancel_settle(&self) -> Duration {
        Duration::from_secs(self.cancel_settle_seconds)
    }
}

/// Ranked matcher lists for the upload surface. Earlier entries win.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorsSection {
    pub ready_markers: Vec<Matcher>,
    pub authenticated_markers: Vec<Matcher>,
    pub login_markers: Vec<Matcher>,
    pub account_name: Vec<Matcher>,
    pub file_inputs: Vec<Matcher>,
    pub delete_markers: Vec<Matcher>,
    pub upload_error_markers: Vec<Matcher>,
    pub description_editor: Matcher,
    pub location: OptionPickerSelectors,
    pub collection: CollectionSelectors,
    pub link: OptionPickerSelectors,
    pub activity: OptionPickerSelectors,
    pub short_title: Vec<Matcher>,
    pub draft_button: Matcher,
    pub preview_button: Matcher,
    pub publish_button: Matcher,
    pub button_disabled_class: String,
    pub draft_success: Vec<Matcher>,
    pub preview_success: Vec<Matcher>,
    pub publish_success: Vec<Matcher>,
    pub action_failure: Vec<Matcher>,
}

/// A dropdown that opens from a display element and offers searchable items.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionPickerSelectors {
    pub display: Matcher,
    /// Value that picks the opt-out entry instead of searching.
    pub opt_out_value: Option<String>,
    pub opt_out_option: Option<Matcher>,
    pub search_input: Option<Matcher>,
    /// CSS scope of result entries; combined with the wanted text.
    pub item_scope: String,
    pub first_result: Option<Matcher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSelectors {
    pub display: Matcher,
    pub create_value: String,
    pub create_link: Matcher,
    pub title_input: Matcher,
    pub default_title: String,
    pub create_button: Matcher,
    pub success_confirm: Matcher,
    pub item_scope: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickerSection {
    pub schedule_labels: Vec<Matcher>,
    pub schedule_radio: Matcher,
    pub unscheduled_radio: Matcher,
    pub datetime_input: Matcher,
    pub year_panel: Matcher,
    pub panel_label: Matcher,
    pub year_cells: Matcher,
    /// Month grid some widget versions show right after a year pick.
    pub month_panel: Matcher,
    pub month_cells: Matcher,
    pub next_month: Matcher,
    pub day_cells: Matcher,
    pub selected_day: Matcher,
    pub today_cell: Matcher,
    pub time_icon: Matcher,
    pub time_panel: Matcher,
    pub hour_options: Matcher,
    pub minute_options: Matcher,
    pub selected_hour: Matcher,
    pub selected_minute: Matcher,
    pub time_input: Matcher,
    pub outside: Matcher,
    /// Substring of the class attribute that marks a grid cell as unavailable.
    pub disabled_class: String,
    pub selected_class: String,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VidpostConfig> {
    let path = path.as_ref();
    let config: VidpostConfig = load_toml(path)?;
    config.check(path)?;
    Ok(config)
}

pub(crate) fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/vidpost.toml")
    }

    #[test]
    fn load_fixture_config() {
        let config = load_config(fixture()).expect("fixture should parse");
        assert_eq!(
            config.site.upload_url,
            "https://channels.weixin.qq.com/platform/post/create"
        );
        assert_eq!(config.timing.navigation_attempts, 3);
        assert_eq!(config.session.login_deadline(), Duration::from_secs(600));
        assert!(config.selectors.file_inputs.len() >= 2);
        assert_eq!(
            config.selectors.publish_button,
            Matcher::text_within(".form-btns button", "发表")
        );
        assert!(matches!(
            config.picker.schedule_labels.first(),
            Some(Matcher::XPath(_))
        ));
    }

    #[test]
    fn rejects_empty_ranked_list() {
        let dir = tempfile::tempdir().unwrap();
        let raw = std::fs::read_to_string(fixture()).unwrap();
        let broken = raw.replacen(
            "file_inputs = [",
            "file_inputs = []\nunused_file_inputs = [",
            1,
        );
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, broken).unwrap();
        match load_config(&path) {
            Err(ConfigError::Invalid { message, .. }) => {
                assert!(message.contains("file_inputs"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config("/nonexistent/vidpost.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vidpost.toml"));
    }

    #[test]
    fn navigation_backoff_grows_with_attempt() {
        let config = load_config(fixture()).unwrap();
        assert_eq!(config.timing.navigation_backoff(1), Duration::from_secs(10));
        assert_eq!(config.timing.navigation_backoff(2), Duration::from_secs(20));
    }
}
