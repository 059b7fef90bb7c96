#![allow(dead_code)]

//! In-memory upload console driven through the automation traits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use vidpost_core::browser::{
    BrowserError, BrowserResult, ClickOptions, CookieRecord, Locator, Matcher, PageDriver,
    SessionDriver,
};
use vidpost_core::publish::YearMonth;
use vidpost_core::{load_config, SaveMode, VidpostConfig};

pub const UPLOAD_URL: &str = "https://channels.weixin.qq.com/platform/post/create";
const LOGIN_URL: &str = "https://channels.weixin.qq.com/login.html";
const HOME_URL: &str = "https://channels.weixin.qq.com/platform/home";

pub fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/vidpost.toml")
}

pub fn config() -> VidpostConfig {
    load_config(fixture_path()).expect("fixture config")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(year, month, day)
        .and_hms_opt(hour, minute, 0)
        .expect("valid time")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    UploadShell,
    UploadArea,
    LoginMarker,
    AccountName,
    FileInput,
    DeleteMarker,
    UploadError,
    Description,
    ShortTitle,
    ScheduleLabel,
    ScheduleRadio,
    UnscheduledRadio,
    DatetimeInput,
    YearPanel,
    PanelLabel,
    YearCells,
    MonthPanel,
    MonthCells,
    NextMonth,
    DayCells,
    SelectedDay,
    TodayCell,
    TimeIcon,
    TimePanel,
    HourOptions,
    MinuteOptions,
    SelectedHour,
    SelectedMinute,
    TimeInput,
    Outside,
    Button(SaveMode),
    Success(SaveMode),
    ActionFailure,
}

fn node_map(config: &VidpostConfig) -> HashMap<Matcher, Node> {
    let s = &config.selectors;
    let p = &config.picker;
    let entries: Vec<(Matcher, Node)> = vec![
        (s.ready_markers[5].clone(), Node::UploadShell),
        (s.ready_markers[1].clone(), Node::UploadArea),
        (s.login_markers[0].clone(), Node::LoginMarker),
        (s.account_name[1].clone(), Node::AccountName),
        (s.file_inputs[1].clone(), Node::FileInput),
        (s.delete_markers[1].clone(), Node::DeleteMarker),
        (s.upload_error_markers[0].clone(), Node::UploadError),
        (s.description_editor.clone(), Node::Description),
        (s.short_title[1].clone(), Node::ShortTitle),
        (s.draft_button.clone(), Node::Button(SaveMode::Draft)),
        (s.preview_button.clone(), Node::Button(SaveMode::Preview)),
        (s.publish_button.clone(), Node::Button(SaveMode::Publish)),
        (s.draft_success[1].clone(), Node::Success(SaveMode::Draft)),
        (s.preview_success[0].clone(), Node::Success(SaveMode::Preview)),
        (s.publish_success[1].clone(), Node::Success(SaveMode::Publish)),
        (s.action_failure[2].clone(), Node::ActionFailure),
        (p.schedule_labels[0].clone(), Node::ScheduleLabel),
        (p.schedule_radio.clone(), Node::ScheduleRadio),
        (p.unscheduled_radio.clone(), Node::UnscheduledRadio),
        (p.datetime_input.clone(), Node::DatetimeInput),
        (p.year_panel.clone(), Node::YearPanel),
        (p.panel_label.clone(), Node::PanelLabel),
        (p.year_cells.clone(), Node::YearCells),
        (p.month_panel.clone(), Node::MonthPanel),
        (p.month_cells.clone(), Node::MonthCells),
        (p.next_month.clone(), Node::NextMonth),
        (p.day_cells.clone(), Node::DayCells),
        (p.selected_day.clone(), Node::SelectedDay),
        (p.today_cell.clone(), Node::TodayCell),
        (p.time_icon.clone(), Node::TimeIcon),
        (p.time_panel.clone(), Node::TimePanel),
        (p.hour_options.clone(), Node::HourOptions),
        (p.minute_options.clone(), Node::MinuteOptions),
        (p.selected_hour.clone(), Node::SelectedHour),
        (p.selected_minute.clone(), Node::SelectedMinute),
        (p.time_input.clone(), Node::TimeInput),
        (p.outside.clone(), Node::Outside),
    ];
    let mut map = HashMap::new();
    for (matcher, node) in entries {
        map.entry(matcher).or_insert(node);
    }
    map
}

/// What a pressed action button saw on the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub asset: String,
    pub mode: SaveMode,
    pub scheduled_for: Option<NaiveDateTime>,
    pub short_title: String,
    pub description: String,
}

/// Knobs and counters shared by every page of the fake console.
#[derive(Debug)]
pub struct SiteState {
    pub today: NaiveDate,
    pub picker_start: YearMonth,
    pub disabled_days: HashSet<NaiveDate>,
    pub missing_days: HashSet<NaiveDate>,
    pub failing_uploads: HashSet<String>,
    /// Attachments that report an upload error before one finally succeeds.
    pub flaky_upload_attempts: u32,
    /// Assets whose attachment crashes the worker.
    pub crashing_uploads: HashSet<String>,
    pub failing_actions: HashSet<String>,
    pub unconfirmed_actions: bool,
    pub buttons_disabled: bool,
    pub buttons_styled_disabled: bool,
    pub schedule_preselected: bool,
    pub schedule_cancel_ignored: bool,
    pub month_panel_after_year: bool,
    pub time_toggle_ignored: bool,
    /// Minute the widget keeps whatever cell is clicked.
    pub minute_snaps_to: Option<u32>,
    pub session_expired: bool,
    pub wrong_surface: bool,
    pub navigation_failures: u32,
    pub schedule_click_ignored: bool,
    pub unreadable_labels: bool,
    pub year_panel_at_open: bool,
    pub labels_missing: bool,
    pub short_title_limit: Option<usize>,
    pub logged_in: bool,
    /// URL checks left before a pending login completes; `None` never completes.
    pub login_after_checks: Option<u32>,
    pub account: String,
    pub site_cookies: Vec<CookieRecord>,
    pub site_storage: BTreeMap<String, String>,

    pub restored_cookies: Vec<CookieRecord>,
    pub init_scripts: Vec<String>,
    pub open_pages: usize,
    pub peak_pages: usize,
    pub pages_opened: usize,
    pub goto_calls: u32,
    pub reloads: u32,
    pub files_attached: u32,
    pub next_month_clicks: u32,
    pub time_icon_clicks: u32,
    pub outside_clicks: u32,
    pub schedule_cancels: u32,
    pub submissions: Vec<Submission>,
}

impl SiteState {
    fn new(today: NaiveDate) -> Self {
        Self {
            today,
            picker_start: YearMonth::of(&today),
            disabled_days: HashSet::new(),
            missing_days: HashSet::new(),
            failing_uploads: HashSet::new(),
            flaky_upload_attempts: 0,
            crashing_uploads: HashSet::new(),
            failing_actions: HashSet::new(),
            unconfirmed_actions: false,
            buttons_disabled: false,
            buttons_styled_disabled: false,
            schedule_preselected: false,
            schedule_cancel_ignored: false,
            month_panel_after_year: false,
            time_toggle_ignored: false,
            minute_snaps_to: None,
            session_expired: false,
            wrong_surface: false,
            navigation_failures: 0,
            schedule_click_ignored: false,
            unreadable_labels: false,
            year_panel_at_open: false,
            labels_missing: false,
            short_title_limit: None,
            logged_in: true,
            login_after_checks: None,
            account: "测试工作室".into(),
            site_cookies: vec![CookieRecord {
                name: "sessionid".into(),
                value: "abc".into(),
                domain: ".weixin.qq.com".into(),
                path: "/".into(),
                expires: -1.0,
                http_only: true,
                secure: true,
            }],
            site_storage: BTreeMap::from([
                ("finder_token".to_string(), "tok".to_string()),
                ("theme".to_string(), "dark".to_string()),
            ]),
            restored_cookies: Vec::new(),
            init_scripts: Vec::new(),
            open_pages: 0,
            peak_pages: 0,
            pages_opened: 0,
            goto_calls: 0,
            reloads: 0,
            files_attached: 0,
            next_month_clicks: 0,
            time_icon_clicks: 0,
            outside_clicks: 0,
            schedule_cancels: 0,
            submissions: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
    nodes: Arc<HashMap<Matcher, Node>>,
}

impl FakeSite {
    pub fn new(config: &VidpostConfig, today: NaiveDate) -> Self {
        Self {
            state: Arc::new(Mutex::new(SiteState::new(today))),
            nodes: Arc::new(node_map(config)),
        }
    }

    /// Adjusts knobs before a run.
    pub fn configure(&self, apply: impl FnOnce(&mut SiteState)) {
        apply(&mut self.state.lock().unwrap());
    }

    pub fn read<T>(&self, read: impl FnOnce(&SiteState) -> T) -> T {
        read(&self.state.lock().unwrap())
    }

    pub fn session(&self) -> FakeSession {
        FakeSession { site: self.clone() }
    }
}

pub struct FakeSession {
    site: FakeSite,
}

#[async_trait]
impl SessionDriver for FakeSession {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageDriver>> {
        let page = {
            let mut site = self.site.state.lock().unwrap();
            site.open_pages += 1;
            site.pages_opened += 1;
            site.peak_pages = site.peak_pages.max(site.open_pages);
            PageState::new(site.picker_start, site.schedule_preselected)
        };
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            state: Mutex::new(page),
        }))
    }

    async fn add_cookies(&mut self, cookies: &[CookieRecord]) -> BrowserResult<()> {
        let mut site = self.site.state.lock().unwrap();
        for cookie in cookies {
            site.restored_cookies.retain(|existing| {
                !(existing.name == cookie.name
                    && existing.domain == cookie.domain
                    && existing.path == cookie.path)
            });
            site.restored_cookies.push(cookie.clone());
        }
        Ok(())
    }

    async fn add_init_script(&mut self, script: &str) -> BrowserResult<()> {
        let mut site = self.site.state.lock().unwrap();
        if !site.init_scripts.iter().any(|existing| existing == script) {
            site.init_scripts.push(script.to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PageState {
    url: String,
    closed: bool,
    uploaded: Option<String>,
    upload_failed: bool,
    description: String,
    short_title: String,
    schedule_checked: bool,
    picker_open: bool,
    year_panel_open: bool,
    month_panel_open: bool,
    shown: YearMonth,
    selected_day: Option<NaiveDate>,
    time_panel_open: bool,
    hour: Option<u32>,
    minute: Option<u32>,
    submitted: Option<SaveMode>,
    action_failed: bool,
}

impl PageState {
    fn new(shown: YearMonth, schedule_checked: bool) -> Self {
        Self {
            url: "about:blank".into(),
            closed: false,
            uploaded: None,
            upload_failed: false,
            description: String::new(),
            short_title: String::new(),
            schedule_checked,
            picker_open: false,
            year_panel_open: false,
            month_panel_open: false,
            shown,
            selected_day: None,
            time_panel_open: false,
            hour: None,
            minute: None,
            submitted: None,
            action_failed: false,
        }
    }

    fn reset_form(&mut self, shown: YearMonth, schedule_checked: bool) {
        let url = std::mem::take(&mut self.url);
        *self = PageState::new(shown, schedule_checked);
        self.url = url;
    }

    fn on_surface(&self) -> bool {
        self.url == UPLOAD_URL
    }
}

pub struct FakePage {
    site: FakeSite,
    state: Mutex<PageState>,
}

fn days_of(month: YearMonth, site: &SiteState) -> Vec<NaiveDate> {
    (1..=31)
        .filter_map(|day| NaiveDate::from_ymd_opt(month.year, month.month, day))
        .filter(|day| !site.missing_days.contains(day))
        .collect()
}

fn year_cells(site: &SiteState) -> Vec<i32> {
    (site.today.year() - 1..=site.today.year() + 2).collect()
}

impl FakePage {
    fn node(&self, matcher: &Matcher) -> Option<Node> {
        self.site.nodes.get(matcher).copied()
    }

    fn count_node(&self, node: Node, page: &PageState, site: &SiteState) -> usize {
        let on_surface = page.on_surface();
        let flag = |value: bool| usize::from(value);
        match node {
            Node::UploadShell | Node::UploadArea | Node::AccountName => flag(on_surface),
            Node::LoginMarker => flag(on_surface && site.session_expired),
            Node::FileInput | Node::Description | Node::ShortTitle => flag(on_surface),
            Node::DeleteMarker => flag(page.uploaded.is_some() && !page.upload_failed),
            Node::UploadError => flag(page.upload_failed),
            Node::ScheduleLabel => flag(on_surface && !site.labels_missing),
            Node::ScheduleRadio | Node::UnscheduledRadio | Node::DatetimeInput => {
                flag(on_surface)
            }
            Node::YearPanel => flag(page.year_panel_open),
            Node::PanelLabel => match (page.picker_open, page.month_panel_open) {
                (false, _) => 0,
                // the month grid only carries a year label
                (true, true) => 1,
                (true, false) => 2,
            },
            Node::YearCells => {
                if page.year_panel_open {
                    year_cells(site).len()
                } else {
                    0
                }
            }
            Node::MonthPanel => flag(page.month_panel_open),
            Node::MonthCells => {
                if page.month_panel_open {
                    12
                } else {
                    0
                }
            }
            Node::NextMonth | Node::TimeIcon => flag(page.picker_open),
            Node::DayCells => {
                if page.picker_open && !page.year_panel_open && !page.month_panel_open {
                    days_of(page.shown, site).len()
                } else {
                    0
                }
            }
            Node::SelectedDay => flag(
                page.picker_open
                    && page
                        .selected_day
                        .map_or(false, |day| YearMonth::of(&day) == page.shown),
            ),
            Node::TodayCell => flag(
                page.picker_open
                    && !page.year_panel_open
                    && !page.month_panel_open
                    && YearMonth::of(&site.today) == page.shown,
            ),
            Node::TimePanel => flag(page.time_panel_open),
            Node::HourOptions => {
                if page.time_panel_open {
                    24
                } else {
                    0
                }
            }
            Node::MinuteOptions => {
                if page.time_panel_open {
                    60
                } else {
                    0
                }
            }
            Node::SelectedHour => flag(page.time_panel_open && page.hour.is_some()),
            Node::SelectedMinute => flag(page.time_panel_open && page.minute.is_some()),
            Node::TimeInput => flag(on_surface),
            Node::Outside => 1,
            Node::Button(_) => flag(on_surface),
            Node::Success(mode) => flag(
                page.submitted == Some(mode) && !page.action_failed && !site.unconfirmed_actions,
            ),
            Node::ActionFailure => flag(page.action_failed),
        }
    }

    /// Resolves a locator to an existing node or fails like a real lookup would.
    fn resolve(&self, locator: &Locator, page: &PageState, site: &SiteState) -> BrowserResult<Node> {
        let node = self
            .node(&locator.matcher)
            .ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))?;
        if locator.nth < self.count_node(node, page, site) {
            Ok(node)
        } else {
            Err(BrowserError::ElementNotFound(locator.to_string()))
        }
    }

    fn button_enabled(page: &PageState) -> bool {
        page.uploaded.is_some() && !page.upload_failed
    }

    fn day_class(day: NaiveDate, page: &PageState, site: &SiteState) -> String {
        let mut class = String::from("weui-desktop-picker__cell");
        if site.disabled_days.contains(&day) {
            class.push_str(" disabled");
        }
        if page.selected_day == Some(day) {
            class.push_str(" weui-desktop-picker__selected");
        }
        class
    }

    fn scheduled_for(page: &PageState) -> Option<NaiveDateTime> {
        if !page.schedule_checked {
            return None;
        }
        page.selected_day?.and_hms_opt(page.hour?, page.minute?, 0)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        let mut site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        site.goto_calls += 1;
        if site.navigation_failures > 0 {
            site.navigation_failures -= 1;
            return Err(BrowserError::Timeout(format!("navigation to {url}")));
        }
        page.url = if !site.logged_in {
            LOGIN_URL.to_string()
        } else if site.wrong_surface {
            HOME_URL.to_string()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn reload(&self) -> BrowserResult<()> {
        let mut site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        site.reloads += 1;
        page.reset_form(site.picker_start, site.schedule_preselected);
        Ok(())
    }

    async fn url(&self) -> BrowserResult<String> {
        let mut site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        if !site.logged_in {
            if let Some(left) = site.login_after_checks {
                if left <= 1 {
                    site.logged_in = true;
                    site.login_after_checks = None;
                    page.url = UPLOAD_URL.to_string();
                } else {
                    site.login_after_checks = Some(left - 1);
                }
            }
        }
        Ok(page.url.clone())
    }

    async fn body_text(&self) -> BrowserResult<String> {
        let page = self.state.lock().unwrap();
        Ok(if page.on_surface() {
            "上传视频 保存草稿 发表".to_string()
        } else {
            "首页 数据中心".to_string()
        })
    }

    async fn count(&self, matcher: &Matcher) -> BrowserResult<usize> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        Ok(self
            .node(matcher)
            .map_or(0, |node| self.count_node(node, &page, &site)))
    }

    async fn is_visible(&self, locator: &Locator) -> BrowserResult<bool> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        Ok(match self.resolve(locator, &page, &site) {
            Ok(Node::UploadArea) => !site.session_expired,
            Ok(_) => true,
            Err(_) => false,
        })
    }

    async fn is_enabled(&self, locator: &Locator) -> BrowserResult<bool> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        Ok(match self.resolve(locator, &page, &site)? {
            Node::Button(_) => Self::button_enabled(&page) && !site.buttons_disabled,
            _ => true,
        })
    }

    async fn is_checked(&self, locator: &Locator) -> BrowserResult<bool> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        Ok(match self.resolve(locator, &page, &site)? {
            Node::ScheduleRadio => page.schedule_checked,
            Node::UnscheduledRadio => !page.schedule_checked,
            _ => false,
        })
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        let node = self.resolve(locator, &page, &site)?;
        if name != "class" {
            return Ok(None);
        }
        Ok(Some(match node {
            Node::DayCells => {
                let day = days_of(page.shown, &site)[locator.nth];
                Self::day_class(day, &page, &site)
            }
            Node::Button(_) if !Self::button_enabled(&page) || site.buttons_styled_disabled => {
                "weui-desktop-btn weui-desktop-btn_disabled".to_string()
            }
            Node::Button(_) => "weui-desktop-btn weui-desktop-btn_primary".to_string(),
            _ => String::new(),
        }))
    }

    async fn text(&self, locator: &Locator) -> BrowserResult<Option<String>> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        let node = self.resolve(locator, &page, &site)?;
        Ok(Some(match node {
            Node::AccountName => site.account.clone(),
            Node::PanelLabel if site.unreadable_labels => "--".to_string(),
            Node::PanelLabel if locator.nth == 0 => format!("{}年", page.shown.year),
            Node::PanelLabel => format!("{}月", page.shown.month),
            Node::YearCells => year_cells(&site)[locator.nth].to_string(),
            Node::MonthCells => format!("{}月", locator.nth + 1),
            Node::DayCells => days_of(page.shown, &site)[locator.nth].day().to_string(),
            Node::SelectedDay => page
                .selected_day
                .map(|day| day.day().to_string())
                .unwrap_or_default(),
            Node::HourOptions | Node::MinuteOptions => format!("{:02}", locator.nth),
            Node::SelectedHour => page.hour.map(|h| format!("{h:02}")).unwrap_or_default(),
            Node::SelectedMinute => page.minute.map(|m| format!("{m:02}")).unwrap_or_default(),
            _ => String::new(),
        }))
    }

    async fn input_value(&self, locator: &Locator) -> BrowserResult<Option<String>> {
        let site = self.site.state.lock().unwrap();
        let page = self.state.lock().unwrap();
        Ok(match self.resolve(locator, &page, &site)? {
            Node::ShortTitle => Some(page.short_title.clone()),
            Node::TimeInput => match (page.hour, page.minute) {
                (Some(h), Some(m)) => Some(format!("{h:02}:{m:02}")),
                _ => Some(String::new()),
            },
            Node::DatetimeInput => Some(String::new()),
            _ => None,
        })
    }

    async fn click(&self, locator: &Locator, _options: ClickOptions) -> BrowserResult<()> {
        let mut site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        let node = self.resolve(locator, &page, &site)?;
        match node {
            Node::ScheduleLabel | Node::ScheduleRadio => {
                if !site.schedule_click_ignored {
                    page.schedule_checked = true;
                }
            }
            Node::UnscheduledRadio => {
                site.schedule_cancels += 1;
                if !site.schedule_cancel_ignored {
                    page.schedule_checked = false;
                }
            }
            Node::DatetimeInput => {
                page.picker_open = true;
                page.shown = site.picker_start;
                page.year_panel_open = site.year_panel_at_open;
                page.month_panel_open = false;
                page.time_panel_open = false;
            }
            Node::PanelLabel if locator.nth == 0 => {
                page.year_panel_open = true;
                page.month_panel_open = false;
            }
            Node::YearCells => {
                page.shown.year = year_cells(&site)[locator.nth];
                page.year_panel_open = false;
                page.month_panel_open = site.month_panel_after_year;
            }
            Node::MonthCells => {
                page.shown.month = locator.nth as u32 + 1;
                page.month_panel_open = false;
            }
            Node::NextMonth => {
                page.shown = page.shown.next();
                site.next_month_clicks += 1;
            }
            Node::DayCells => {
                let day = days_of(page.shown, &site)[locator.nth];
                if !site.disabled_days.contains(&day) {
                    page.selected_day = Some(day);
                }
            }
            Node::TimeIcon => {
                site.time_icon_clicks += 1;
                if !page.time_panel_open {
                    page.time_panel_open = true;
                } else if !site.time_toggle_ignored {
                    page.time_panel_open = false;
                }
            }
            Node::TimeInput => page.time_panel_open = true,
            Node::HourOptions => page.hour = Some(locator.nth as u32),
            Node::MinuteOptions => {
                page.minute = Some(site.minute_snaps_to.unwrap_or(locator.nth as u32));
            }
            Node::Outside => {
                site.outside_clicks += 1;
                page.picker_open = false;
                page.year_panel_open = false;
                page.month_panel_open = false;
                page.time_panel_open = false;
            }
            Node::Button(mode) => {
                if Self::button_enabled(&page) {
                    let asset = page.uploaded.clone().unwrap_or_default();
                    page.submitted = Some(mode);
                    page.action_failed = site.failing_actions.contains(&asset);
                    let submission = Submission {
                        asset,
                        mode,
                        scheduled_for: Self::scheduled_for(&page),
                        short_title: page.short_title.clone(),
                        description: page.description.clone(),
                    };
                    site.submissions.push(submission);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        match self.resolve(locator, &page, &site)? {
            Node::ShortTitle => {
                page.short_title = match site.short_title_limit {
                    Some(limit) => value.chars().take(limit).collect(),
                    None => value.to_string(),
                };
            }
            Node::Description => page.description = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    async fn set_input_files(&self, locator: &Locator, path: &Path) -> BrowserResult<()> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let crashes = self.site.state.lock().unwrap().crashing_uploads.contains(&name);
        if crashes {
            // no lock held, so the shared state stays usable for the other workers
            panic!("renderer crashed while attaching {name}");
        }
        let mut site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        self.resolve(locator, &page, &site)?;
        let flaky = site.flaky_upload_attempts > 0;
        if flaky {
            site.flaky_upload_attempts -= 1;
        }
        page.upload_failed = flaky || site.failing_uploads.contains(&name);
        page.uploaded = Some(name);
        site.files_attached += 1;
        Ok(())
    }

    async fn force_check(&self, locator: &Locator) -> BrowserResult<()> {
        let site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        if self.resolve(locator, &page, &site)? == Node::ScheduleRadio {
            page.schedule_checked = true;
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> BrowserResult<serde_json::Value> {
        Ok(serde_json::Value::Bool(true))
    }

    async fn local_storage(&self) -> BrowserResult<BTreeMap<String, String>> {
        Ok(self.site.state.lock().unwrap().site_storage.clone())
    }

    async fn cookies(&self) -> BrowserResult<Vec<CookieRecord>> {
        Ok(self.site.state.lock().unwrap().site_cookies.clone())
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut site = self.site.state.lock().unwrap();
        let mut page = self.state.lock().unwrap();
        if !page.closed {
            page.closed = true;
            site.open_pages -= 1;
        }
        Ok(())
    }
}
