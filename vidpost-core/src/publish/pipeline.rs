use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::browser::{ClickOptions, Matcher, PageDriver, SessionDriver};
use crate::config::VidpostConfig;
use crate::jobs::{Job, SaveMode};
use crate::poll::{poll_until, PollOutcome, PollSpec};
use crate::report::JobResult;

use super::error::{InPhase, Phase, PhaseFailure, PublishError, PublishResult};
use super::fields::FieldFiller;
use super::navigate::navigate_with_retry;
use super::probe::{any_visible_and_enabled, first_present, first_text, first_visible, settle};
use super::schedule::{ScheduleRequest, Scheduler};

/// Unhides file inputs that the upload widget keeps at zero size.
const REVEAL_FILE_INPUTS: &str = r#"(() => {
  document.querySelectorAll("input[type='file']").forEach((input) => {
    input.style.display = 'block';
    input.style.visibility = 'visible';
    input.style.opacity = '1';
  });
  return true;
})()"#;

/// A page on the upload surface owned by one worker until released.
///
/// Dropping an unreleased lease (a cancelled or panicked worker) schedules the
/// close on the current runtime.
pub struct PageLease {
    page: Arc<dyn PageDriver>,
    account: Option<String>,
    released: bool,
}

impl PageLease {
    fn new(page: Box<dyn PageDriver>) -> Self {
        Self {
            page: Arc::from(page),
            account: None,
            released: false,
        }
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    /// Account label shown on the surface, when one was readable.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub async fn release(mut self) {
        self.released = true;
        if let Err(err) = self.page.close().await {
            warn!(error = %err, "failed to close page");
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                warn!("page lease dropped without release; closing page");
                let page = Arc::clone(&self.page);
                handle.spawn(async move {
                    if let Err(err) = page.close().await {
                        warn!(error = %err, "failed to close abandoned page");
                    }
                });
            }
            Err(_) => warn!("page lease dropped outside a runtime; page may stay open"),
        }
    }
}

/// Runs one job through the phases of the upload surface.
#[derive(Debug, Clone)]
pub struct JobPipeline {
    config: Arc<VidpostConfig>,
    today: Option<NaiveDate>,
}

impl JobPipeline {
    pub fn new(config: Arc<VidpostConfig>) -> Self {
        Self {
            config,
            today: None,
        }
    }

    /// Fixes the date used when the picker only highlights "today".
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &VidpostConfig {
        &self.config
    }

    /// Opens a page on the upload surface and checks it is usable.
    pub async fn acquire(&self, session: &dyn SessionDriver) -> Result<PageLease, PhaseFailure> {
        let page = session.new_page().await.in_phase(Phase::PageAcquired)?;
        let mut lease = PageLease::new(page);
        match self.open_surface(&mut lease).await {
            Ok(()) => Ok(lease),
            Err(failure) => {
                lease.release().await;
                Err(failure)
            }
        }
    }

    async fn open_surface(&self, lease: &mut PageLease) -> Result<(), PhaseFailure> {
        let page = lease.page();
        navigate_with_retry(page, &self.config.site.upload_url, &self.config.timing)
            .await
            .in_phase(Phase::PageAcquired)?;
        settle(self.config.timing.page_settle()).await;
        self.verify_ready(page).await.in_phase(Phase::ReadyVerified)?;
        self.verify_login(page).await.in_phase(Phase::LoginVerified)?;
        let account = first_text(page, &self.config.selectors.account_name).await;
        match &account {
            Some(name) => info!(account = %name, "upload surface ready"),
            None => info!("upload surface ready; account label not found"),
        }
        lease.account = account;
        Ok(())
    }

    /// Reloads a reused page so the next job starts from an empty form.
    pub async fn refresh(&self, lease: &PageLease) -> Result<(), PhaseFailure> {
        let page = lease.page();
        page.reload().await.in_phase(Phase::PageAcquired)?;
        settle(self.config.timing.sequential_settle()).await;
        self.verify_ready(page).await.in_phase(Phase::ReadyVerified)?;
        self.verify_login(page).await.in_phase(Phase::LoginVerified)
    }

    /// Acquires a page, runs `job` on it and releases it.
    pub async fn execute(&self, session: &dyn SessionDriver, job: &Job) -> JobResult {
        let lease = match self.acquire(session).await {
            Ok(lease) => lease,
            Err(failure) => return JobResult::from_outcome(job, None, Err(failure)),
        };
        let outcome = self.run_job(&lease, job).await;
        let account = lease.account().map(str::to_string);
        lease.release().await;
        JobResult::from_outcome(job, account, outcome)
    }

    pub async fn run_job(&self, lease: &PageLease, job: &Job) -> Result<(), PhaseFailure> {
        let page = lease.page();
        info!(row = job.row, asset = %job.asset_name(), mode = %job.mode, "starting job");

        self.upload(page, &job.asset)
            .await
            .in_phase(Phase::MediaUploaded)?;

        FieldFiller::new(
            page,
            &self.config.selectors,
            self.config.timing.field_settle(),
        )
        .fill(&job.fields)
        .await
        .in_phase(Phase::FieldsFilled)?;

        if job.scheduled {
            self.configure_schedule(page, job)
                .await
                .in_phase(Phase::ScheduleConfigured)?;
        }

        self.submit(page, job.mode).await.in_phase(Phase::Submitted)?;
        self.await_outcome(page, job.mode)
            .await
            .in_phase(Phase::PolledOutcome)
    }

    async fn verify_ready(&self, page: &dyn PageDriver) -> PublishResult<()> {
        let timing = &self.config.timing;
        let spec = PollSpec::attempts(timing.ready_attempts, timing.ready_interval())
            .labelled("upload surface");
        let markers = &self.config.selectors.ready_markers;
        let outcome = poll_until(
            &spec,
            || async { first_present(page, markers).await.is_some() },
            || async { !self.on_upload_surface(page).await },
        )
        .await;
        match outcome {
            PollOutcome::Success => Ok(()),
            PollOutcome::Failure => Err(PublishError::Readiness(
                "not on the upload surface".into(),
            )),
            PollOutcome::Timeout => Err(PublishError::Readiness("page load timed out".into())),
        }
    }

    async fn on_upload_surface(&self, page: &dyn PageDriver) -> bool {
        let site = &self.config.site;
        match page.url().await {
            Ok(url) => {
                if url.contains(&site.expected_host) && url.contains(&site.expected_path_fragment)
                {
                    return true;
                }
            }
            Err(err) => {
                debug!(error = %err, "url unavailable; assuming upload surface");
                return true;
            }
        }
        match page.body_text().await {
            Ok(body) => site.surface_texts.iter().any(|text| body.contains(text)),
            Err(_) => false,
        }
    }

    async fn verify_login(&self, page: &dyn PageDriver) -> PublishResult<()> {
        let selectors = &self.config.selectors;
        if first_visible(page, &selectors.authenticated_markers)
            .await
            .is_some()
        {
            return Ok(());
        }
        if let Some(marker) = first_visible(page, &selectors.login_markers).await {
            return Err(PublishError::LoginInvalid(format!(
                "login prompt visible ({marker})"
            )));
        }
        warn!("no authentication markers found; continuing");
        Ok(())
    }

    async fn upload(&self, page: &dyn PageDriver, asset: &Path) -> PublishResult<()> {
        let upload = &self.config.upload;
        let attempts = upload.attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.upload_once(page, asset).await {
                Ok(()) => {
                    info!(asset = %asset.display(), attempt, "upload confirmed");
                    return Ok(());
                }
                Err(message) => {
                    warn!(asset = %asset.display(), attempt, attempts, error = %message, "upload attempt failed");
                    last_error = message;
                }
            }
            if attempt < attempts {
                settle(upload.retry_delay()).await;
            }
        }
        Err(PublishError::Upload {
            attempts,
            message: last_error,
        })
    }

    async fn upload_once(&self, page: &dyn PageDriver, asset: &Path) -> Result<(), String> {
        let upload = &self.config.upload;
        let selectors = &self.config.selectors;
        settle(upload.settle()).await;
        if let Err(err) = page.evaluate(REVEAL_FILE_INPUTS).await {
            debug!(error = %err, "could not reveal file inputs");
        }
        let input = first_present(page, &selectors.file_inputs)
            .await
            .ok_or_else(|| "no file input found".to_string())?;
        page.set_input_files(&input.first(), asset)
            .await
            .map_err(|err| err.to_string())?;
        debug!(selector = %input, "file attached; waiting for the upload to finish");

        let spec = PollSpec::new(upload.poll_interval(), upload.deadline()).labelled("upload");
        let outcome = poll_until(
            &spec,
            || async { any_visible_and_enabled(page, &selectors.delete_markers).await },
            || async {
                first_visible(page, &selectors.upload_error_markers)
                    .await
                    .is_some()
            },
        )
        .await;
        match outcome {
            PollOutcome::Success => Ok(()),
            PollOutcome::Failure => Err("the page reported an upload error".into()),
            PollOutcome::Timeout => Err(format!(
                "upload not confirmed within {}s",
                upload.deadline_seconds
            )),
        }
    }

    async fn configure_schedule(&self, page: &dyn PageDriver, job: &Job) -> PublishResult<()> {
        if job.mode == SaveMode::Draft {
            return Err(PublishError::ScheduledDraft);
        }
        let target = job
            .schedule_at
            .ok_or_else(|| PublishError::form_fill("schedule time", "a time", "nothing"))?;
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        Scheduler::new(page, &self.config.picker, &self.config.timing)
            .run(ScheduleRequest { target, today })
            .await
    }

    fn button(&self, mode: SaveMode) -> &Matcher {
        let selectors = &self.config.selectors;
        match mode {
            SaveMode::Draft => &selectors.draft_button,
            SaveMode::Preview => &selectors.preview_button,
            SaveMode::Publish => &selectors.publish_button,
        }
    }

    fn success_markers(&self, mode: SaveMode) -> &[Matcher] {
        let selectors = &self.config.selectors;
        match mode {
            SaveMode::Draft => &selectors.draft_success,
            SaveMode::Preview => &selectors.preview_success,
            SaveMode::Publish => &selectors.publish_success,
        }
    }

    /// A draft must not carry a schedule chosen earlier on the same form.
    async fn cancel_pending_schedule(&self, page: &dyn PageDriver) -> PublishResult<()> {
        let picker = &self.config.picker;
        let scheduled = picker.schedule_radio.first();
        if page.count(&picker.schedule_radio).await.unwrap_or(0) == 0
            || !page.is_checked(&scheduled).await.unwrap_or(false)
        {
            return Ok(());
        }
        info!("cancelling pending schedule before saving draft");
        let immediate = picker.unscheduled_radio.first();
        page.click(
            &immediate,
            ClickOptions::forced(self.config.timing.schedule_click_timeout()),
        )
        .await?;
        settle(self.config.action.cancel_settle()).await;
        if page.is_checked(&immediate).await.unwrap_or(false) {
            Ok(())
        } else {
            Err(PublishError::action(
                SaveMode::Draft.button_label(),
                "could not cancel the pending schedule",
            ))
        }
    }

    async fn submit(&self, page: &dyn PageDriver, mode: SaveMode) -> PublishResult<()> {
        if mode == SaveMode::Draft {
            self.cancel_pending_schedule(page).await?;
        }
        let label = mode.button_label();
        let button = self.button(mode).first();
        page.wait_for_visible(&button, self.config.timing.button_visible())
            .await
            .map_err(|err| PublishError::action(label, err.to_string()))?;
        let enabled = page
            .is_enabled(&button)
            .await
            .map_err(|err| PublishError::action(label, err.to_string()))?;
        let class = page
            .attribute(&button, "class")
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        if !enabled || class.contains(&self.config.selectors.button_disabled_class) {
            return Err(PublishError::action(label, "button is disabled"));
        }
        page.click(&button, ClickOptions::scripted())
            .await
            .map_err(|err| PublishError::action(label, err.to_string()))?;
        info!(mode = %mode, "submitted");
        Ok(())
    }

    async fn await_outcome(&self, page: &dyn PageDriver, mode: SaveMode) -> PublishResult<()> {
        let action = &self.config.action;
        let markers = self.success_markers(mode);
        let failures = &self.config.selectors.action_failure;
        let spec = PollSpec::new(action.poll_interval(), action.deadline()).labelled("action");
        let outcome = poll_until(
            &spec,
            || async { first_visible(page, markers).await.is_some() },
            || async { first_visible(page, failures).await.is_some() },
        )
        .await;
        match outcome {
            PollOutcome::Success => {
                info!(mode = %mode, "page confirmed the action");
                Ok(())
            }
            PollOutcome::Failure => Err(PublishError::action(
                mode.button_label(),
                "the page reported failure",
            )),
            PollOutcome::Timeout => Err(PublishError::Timeout(format!(
                "{} confirmation",
                mode.button_label()
            ))),
        }
    }
}
