//! Drives the date/time picker of the scheduled-publish control.
//!
//! The widget only offers a forward month arrow, a year panel and grids of
//! day, hour and minute cells. Every step is read back before the next one so
//! a mis-set picker fails the job instead of publishing at the wrong time.

use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::browser::{ClickOptions, Locator, Matcher, PageDriver};
use crate::config::{PickerSection, TimingSection};

use super::error::{PublishError, PublishResult};
use super::probe::settle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScheduleRequest {
    pub target: NaiveDateTime,
    /// Local date used when the widget only highlights "today".
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: &impl Datelike) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn next(self) -> Self {
        if self.month >= 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// Number of forward steps from `self` to `other`; negative when `other` is earlier.
    pub fn months_until(self, other: YearMonth) -> i64 {
        (other.year as i64 - self.year as i64) * 12 + other.month as i64 - self.month as i64
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{4})\s*年").expect("valid regex"))
}

fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,2})\s*月").expect("valid regex"))
}

/// First year in a label such as "2026年" or the range "2019年-2030年".
pub fn parse_year_label(label: &str) -> Option<i32> {
    year_pattern().captures(label)?.get(1)?.as_str().parse().ok()
}

/// Reads "2026年" / "10月" style labels, alone or combined.
pub fn parse_panel_label(label: &str) -> Option<YearMonth> {
    let year = parse_year_label(label)?;
    let month: u32 = month_pattern()
        .captures(label)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    (1..=12).contains(&month).then(|| YearMonth::new(year, month))
}

pub(crate) struct Scheduler<'a> {
    page: &'a dyn PageDriver,
    picker: &'a PickerSection,
    timing: &'a TimingSection,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        page: &'a dyn PageDriver,
        picker: &'a PickerSection,
        timing: &'a TimingSection,
    ) -> Self {
        Self {
            page,
            picker,
            timing,
        }
    }

    pub(crate) async fn run(&self, request: ScheduleRequest) -> PublishResult<()> {
        let target = request.target;
        info!(target = %target, "configuring scheduled publish");
        self.enable_scheduling().await?;
        self.open_picker().await?;

        let wanted = YearMonth::of(&target.date());
        if self.year_panel_open().await {
            self.select_year(wanted.year).await?;
            self.select_month_if_offered(wanted.month).await?;
        }

        let mut current = self.displayed_month(request.today).await?;
        let steps = current.months_until(wanted);
        if !(0..12).contains(&steps) {
            // pick the year from which the target is a short forward walk
            let year = if current.month <= wanted.month {
                wanted.year
            } else {
                wanted.year - 1
            };
            debug!(displayed = %current, wanted = %wanted, year, "switching year");
            self.select_year(year).await?;
            // keep the month the year choice was planned around
            self.select_month_if_offered(current.month).await?;
            current = self.displayed_month(request.today).await?;
        }
        self.step_to_month(current, wanted, request.today).await?;

        self.select_day(target.day()).await?;
        self.open_time_panel().await?;
        self.select_time_part(
            &self.picker.hour_options,
            &self.picker.selected_hour,
            target.hour(),
            "hour",
        )
        .await?;
        self.select_time_part(
            &self.picker.minute_options,
            &self.picker.selected_minute,
            target.minute(),
            "minute",
        )
        .await?;
        self.close_picker().await;
        info!(target = %target, "schedule configured");
        Ok(())
    }

    async fn enable_scheduling(&self) -> PublishResult<()> {
        let control = self.schedule_control().await.ok_or_else(|| {
            PublishError::form_fill("publish mode", "scheduled", "no schedule control")
        })?;
        self.page
            .wait_for_visible(&control, self.timing.schedule_control_visible())
            .await
            .map_err(|err| PublishError::form_fill("publish mode", "scheduled", err))?;
        self.page
            .click(
                &control,
                ClickOptions::forced(self.timing.schedule_click_timeout()),
            )
            .await
            .map_err(|err| PublishError::form_fill("publish mode", "scheduled", err))?;
        settle(self.timing.schedule_mode_settle()).await;

        let radio = self.picker.schedule_radio.first();
        if self.page.is_checked(&radio).await.unwrap_or(false) {
            return Ok(());
        }
        warn!("schedule option not checked after click; forcing it");
        self.page
            .force_check(&radio)
            .await
            .map_err(|err| PublishError::form_fill("publish mode", "scheduled", err))?;
        settle(self.timing.picker_step_settle()).await;
        if self.page.is_checked(&radio).await.unwrap_or(false) {
            Ok(())
        } else {
            Err(PublishError::form_fill(
                "publish mode",
                "scheduled",
                "immediate",
            ))
        }
    }

    async fn schedule_control(&self) -> Option<Locator> {
        for matcher in &self.picker.schedule_labels {
            if self.page.count(matcher).await.unwrap_or(0) > 0 {
                debug!(selector = %matcher, "schedule control found");
                return Some(matcher.first());
            }
        }
        if self.page.count(&self.picker.schedule_radio).await.unwrap_or(0) > 0 {
            return Some(self.picker.schedule_radio.first());
        }
        None
    }

    async fn open_picker(&self) -> PublishResult<()> {
        self.page
            .click(&self.picker.datetime_input.first(), ClickOptions::default())
            .await
            .map_err(|err| PublishError::form_fill("publish time", "an open picker", err))?;
        settle(self.timing.picker_step_settle()).await;
        Ok(())
    }

    async fn year_panel_open(&self) -> bool {
        let panel = self.picker.year_panel.first();
        self.page.count(&self.picker.year_panel).await.unwrap_or(0) > 0
            && self.page.is_visible(&panel).await.unwrap_or(false)
    }

    async fn displayed_month(&self, today: NaiveDate) -> PublishResult<YearMonth> {
        let mut label = String::new();
        for index in 0..2 {
            let locator = self.picker.panel_label.nth(index);
            if let Ok(Some(text)) = self.page.text(&locator).await {
                label.push_str(text.trim());
            }
        }
        if let Some(displayed) = parse_panel_label(&label) {
            return Ok(displayed);
        }
        if self
            .page
            .is_visible(&self.picker.today_cell.first())
            .await
            .unwrap_or(false)
        {
            debug!(label = %label, "month label unreadable; using today's month");
            return Ok(YearMonth::of(&today));
        }
        Err(PublishError::form_fill(
            "displayed month",
            "a readable month label",
            format!("\"{label}\""),
        ))
    }

    async fn select_year(&self, year: i32) -> PublishResult<()> {
        if !self.year_panel_open().await {
            self.page
                .click(&self.picker.panel_label.nth(0), ClickOptions::default())
                .await
                .map_err(|err| PublishError::form_fill("year", year, err))?;
            settle(self.timing.picker_step_settle()).await;
        }
        let wanted = year.to_string();
        let Some(cell) = self
            .find_cell(&self.picker.year_cells, &wanted)
            .await
            .map_err(|err| PublishError::form_fill("year", year, err))?
        else {
            return Err(PublishError::form_fill(
                "year",
                year,
                "no enabled cell for that year",
            ));
        };
        self.page
            .click(&cell, ClickOptions::default())
            .await
            .map_err(|err| PublishError::form_fill("year", year, err))?;
        settle(self.timing.picker_step_settle()).await;

        let label = self
            .page
            .text(&self.picker.panel_label.first())
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        match parse_year_label(&label) {
            Some(shown) if shown == year => {
                debug!(year, "year selected");
                Ok(())
            }
            Some(shown) => Err(PublishError::form_fill("year", year, shown)),
            None => Err(PublishError::form_fill(
                "year",
                year,
                format!("unreadable label \"{}\"", label.trim()),
            )),
        }
    }

    async fn month_panel_open(&self) -> bool {
        self.page.count(&self.picker.month_panel).await.unwrap_or(0) > 0
            && self
                .page
                .is_visible(&self.picker.month_panel.first())
                .await
                .unwrap_or(false)
    }

    /// Picks `month` when a year pick left the month grid open.
    async fn select_month_if_offered(&self, month: u32) -> PublishResult<()> {
        if !self.month_panel_open().await {
            return Ok(());
        }
        debug!(month, "month panel shown after year pick");
        let mut cell = None;
        for text in [format!("{month}月"), month.to_string()] {
            cell = self
                .find_cell(&self.picker.month_cells, &text)
                .await
                .map_err(|err| PublishError::form_fill("month", month, err))?;
            if cell.is_some() {
                break;
            }
        }
        let cell = cell.ok_or_else(|| {
            PublishError::form_fill("month", month, "no enabled cell for that month")
        })?;
        self.page
            .click(&cell, ClickOptions::default())
            .await
            .map_err(|err| PublishError::form_fill("month", month, err))?;
        settle(self.timing.picker_step_settle()).await;
        if self.month_panel_open().await {
            return Err(PublishError::form_fill(
                "month",
                month,
                "month panel still open",
            ));
        }
        Ok(())
    }

    async fn step_to_month(
        &self,
        mut current: YearMonth,
        wanted: YearMonth,
        today: NaiveDate,
    ) -> PublishResult<()> {
        let steps = current.months_until(wanted);
        if !(0..12).contains(&steps) {
            return Err(PublishError::form_fill("month", wanted, current));
        }
        for _ in 0..steps {
            let expected = current.next();
            self.page
                .click(&self.picker.next_month.first(), ClickOptions::default())
                .await
                .map_err(|err| PublishError::form_fill("month", expected, err))?;
            settle(self.timing.picker_step_settle()).await;
            let shown = self.displayed_month(today).await?;
            if shown != expected {
                return Err(PublishError::form_fill("month", expected, shown));
            }
            current = shown;
        }
        if current != wanted {
            return Err(PublishError::form_fill("month", wanted, current));
        }
        debug!(month = %wanted, steps, "month displayed");
        Ok(())
    }

    /// Enabled cell of `cells` whose trimmed text equals `wanted`.
    async fn find_cell(
        &self,
        cells: &Matcher,
        wanted: &str,
    ) -> crate::browser::BrowserResult<Option<Locator>> {
        let total = self.page.count(cells).await?;
        for index in 0..total {
            let cell = cells.nth(index);
            let Some(text) = self.page.text(&cell).await? else {
                continue;
            };
            if text.trim() != wanted {
                continue;
            }
            let class = self.page.attribute(&cell, "class").await?.unwrap_or_default();
            if class.contains(&self.picker.disabled_class) {
                debug!(cell = %cell, "skipping disabled cell");
                continue;
            }
            return Ok(Some(cell));
        }
        Ok(None)
    }

    async fn select_day(&self, day: u32) -> PublishResult<()> {
        let cells = &self.picker.day_cells;
        let total = self
            .page
            .count(cells)
            .await
            .map_err(|err| PublishError::form_fill("day", day, err))?;
        for index in 0..total {
            let cell = cells.nth(index);
            let text = self.page.text(&cell).await.ok().flatten();
            if text.as_deref().map(str::trim).and_then(|t| t.parse::<u32>().ok()) != Some(day) {
                continue;
            }
            let class = self
                .page
                .attribute(&cell, "class")
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            if class.contains(&self.picker.disabled_class) {
                debug!(day, "skipping disabled day cell");
                continue;
            }
            self.page
                .click(&cell, ClickOptions::default())
                .await
                .map_err(|err| PublishError::form_fill("day", day, err))?;
            settle(self.timing.picker_step_settle()).await;

            let selected = self
                .page
                .text(&self.picker.selected_day.first())
                .await
                .ok()
                .flatten()
                .and_then(|t| t.trim().parse::<u32>().ok());
            if selected == Some(day) {
                debug!(day, "day selected");
                return Ok(());
            }
            let class = self
                .page
                .attribute(&cell, "class")
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            if class.contains(&self.picker.selected_class) {
                debug!(day, "day selected");
                return Ok(());
            }
            return Err(PublishError::form_fill(
                "day",
                day,
                selected.map_or_else(|| "nothing selected".to_string(), |d| d.to_string()),
            ));
        }
        Err(PublishError::form_fill(
            "day",
            day,
            "no enabled cell for that day",
        ))
    }

    async fn open_time_panel(&self) -> PublishResult<()> {
        let icon = self.picker.time_icon.first();
        let trigger = if self.page.is_visible(&icon).await.unwrap_or(false) {
            icon
        } else {
            self.picker.time_input.first()
        };
        self.page
            .click(&trigger, ClickOptions::default())
            .await
            .map_err(|err| PublishError::form_fill("time panel", "open", err))?;
        settle(self.timing.picker_step_settle()).await;
        self.page
            .wait_for_visible(
                &self.picker.time_panel.first(),
                self.timing.picker_panel_visible(),
            )
            .await
            .map_err(|err| PublishError::form_fill("time panel", "open", err))
    }

    async fn select_time_part(
        &self,
        options: &Matcher,
        selected: &Matcher,
        value: u32,
        field: &'static str,
    ) -> PublishResult<()> {
        let wanted = format!("{value:02}");
        let current = self.selected_text(selected).await;
        if current.as_deref() == Some(wanted.as_str()) {
            debug!(field, value = %wanted, "already selected");
            return Ok(());
        }
        let cell = self
            .find_cell(options, &wanted)
            .await
            .map_err(|err| PublishError::form_fill(field, &wanted, err))?
            .ok_or_else(|| PublishError::form_fill(field, &wanted, "no enabled option"))?;
        self.page
            .click(&cell, ClickOptions::default())
            .await
            .map_err(|err| PublishError::form_fill(field, &wanted, err))?;
        settle(self.timing.picker_step_settle()).await;
        match self.selected_text(selected).await {
            Some(shown) if shown == wanted => {
                debug!(field, value = %wanted, "time part selected");
                Ok(())
            }
            Some(shown) => Err(PublishError::form_fill(field, &wanted, shown)),
            None => Err(PublishError::form_fill(field, &wanted, "nothing selected")),
        }
    }

    async fn selected_text(&self, selected: &Matcher) -> Option<String> {
        self.page
            .text(&selected.first())
            .await
            .ok()
            .flatten()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    async fn close_picker(&self) {
        let toggle = self.picker.time_icon.first();
        if self.page.is_visible(&toggle).await.unwrap_or(false) {
            if let Err(err) = self.page.click(&toggle, ClickOptions::default()).await {
                warn!(error = %err, "failed to toggle the time panel closed");
            }
            settle(self.timing.picker_step_settle()).await;
        }
        let panel = self.picker.time_panel.first();
        if self.page.is_visible(&panel).await.unwrap_or(false) {
            debug!("time panel still open; clicking outside");
            self.click_outside("time panel").await;
        }

        match self.page.input_value(&self.picker.time_input.first()).await {
            Ok(Some(value)) if !value.is_empty() => debug!(time = %value, "time input set"),
            Ok(_) => warn!("time input empty after selection"),
            Err(err) => debug!(error = %err, "time input unreadable"),
        }

        self.click_outside("date panel").await;
    }

    async fn click_outside(&self, what: &'static str) {
        if let Err(err) = self
            .page
            .click(
                &self.picker.outside.first(),
                ClickOptions::forced(self.timing.schedule_click_timeout()),
            )
            .await
        {
            warn!(panel = what, error = %err, "failed to dismiss panel");
        }
        settle(self.timing.picker_step_settle()).await;
    }
}
