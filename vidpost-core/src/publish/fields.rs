use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{BrowserResult, ClickOptions, Matcher, PageDriver};
use crate::config::{CollectionSelectors, OptionPickerSelectors, SelectorsSection};
use crate::jobs::JobFields;

use super::error::{PublishError, PublishResult};
use super::probe::settle;

const SHORT_TITLE_VISIBLE: Duration = Duration::from_secs(5);
const OPTION_VISIBLE: Duration = Duration::from_secs(5);

/// Fills the descriptive part of the upload form.
pub(crate) struct FieldFiller<'a> {
    page: &'a dyn PageDriver,
    selectors: &'a SelectorsSection,
    settle: Duration,
}

impl<'a> FieldFiller<'a> {
    pub(crate) fn new(
        page: &'a dyn PageDriver,
        selectors: &'a SelectorsSection,
        settle: Duration,
    ) -> Self {
        Self {
            page,
            selectors,
            settle,
        }
    }

    /// Descriptive fields are best-effort; the short title is verified and fatal.
    pub(crate) async fn fill(&self, fields: &JobFields) -> PublishResult<()> {
        if !fields.description.is_empty() {
            if let Err(err) = self.description(&fields.description).await {
                warn!(error = %err, "failed to fill description");
            }
        }
        if !fields.location.is_empty() {
            if let Err(err) = self
                .option(&self.selectors.location, &fields.location)
                .await
            {
                warn!(value = %fields.location, error = %err, "failed to set location");
            }
        }
        if !fields.collection.is_empty() {
            if let Err(err) = self
                .collection(&self.selectors.collection, &fields.collection)
                .await
            {
                warn!(value = %fields.collection, error = %err, "failed to set collection");
            }
        }
        if !fields.link.is_empty() {
            if let Err(err) = self.option(&self.selectors.link, &fields.link).await {
                warn!(value = %fields.link, error = %err, "failed to set link");
            }
        }
        if !fields.activity.is_empty() {
            if let Err(err) = self
                .option(&self.selectors.activity, &fields.activity)
                .await
            {
                warn!(value = %fields.activity, error = %err, "failed to set activity");
            }
        }
        if !fields.short_title.is_empty() {
            self.short_title(&fields.short_title).await?;
        }
        Ok(())
    }

    async fn description(&self, text: &str) -> BrowserResult<()> {
        let editor = self.selectors.description_editor.first();
        self.page.click(&editor, ClickOptions::default()).await?;
        self.page.fill(&editor, text).await?;
        settle(self.settle).await;
        debug!(chars = text.chars().count(), "description filled");
        Ok(())
    }

    async fn option(&self, picker: &OptionPickerSelectors, value: &str) -> BrowserResult<()> {
        self.page
            .click(&picker.display.first(), ClickOptions::default())
            .await?;
        settle(self.settle).await;

        if let (Some(opt_out), Some(option)) = (&picker.opt_out_value, &picker.opt_out_option) {
            if opt_out == value {
                self.page
                    .click(&option.first(), ClickOptions::default())
                    .await?;
                settle(self.settle).await;
                return Ok(());
            }
        }

        if let Some(search) = &picker.search_input {
            let input = search.first();
            self.page.fill(&input, value).await?;
            settle(self.settle).await;
        }

        let wanted = Matcher::text_within(picker.item_scope.clone(), value).first();
        match self.page.wait_for_visible(&wanted, OPTION_VISIBLE).await {
            Ok(()) => {
                self.page.click(&wanted, ClickOptions::default()).await?;
            }
            Err(err) => {
                let Some(first) = &picker.first_result else {
                    return Err(err);
                };
                debug!(value, "no exact option; taking the first result");
                self.page
                    .click(&first.first(), ClickOptions::default())
                    .await?;
            }
        }
        settle(self.settle).await;
        Ok(())
    }

    async fn collection(&self, picker: &CollectionSelectors, value: &str) -> BrowserResult<()> {
        self.page
            .click(&picker.display.first(), ClickOptions::default())
            .await?;
        settle(self.settle).await;

        if value == picker.create_value {
            self.page
                .click(&picker.create_link.first(), ClickOptions::default())
                .await?;
            settle(self.settle).await;
            self.page
                .fill(&picker.title_input.first(), &picker.default_title)
                .await?;
            self.page
                .click(&picker.create_button.first(), ClickOptions::default())
                .await?;
            settle(self.settle).await;
            let confirm = picker.success_confirm.first();
            if self.page.is_visible(&confirm).await.unwrap_or(false) {
                self.page.click(&confirm, ClickOptions::default()).await?;
            }
            info!(title = %picker.default_title, "created collection");
            return Ok(());
        }

        let item = Matcher::text_within(picker.item_scope.clone(), value).first();
        self.page.wait_for_visible(&item, OPTION_VISIBLE).await?;
        self.page.click(&item, ClickOptions::default()).await?;
        settle(self.settle).await;
        Ok(())
    }

    /// Tries each ranked input until one reads back exactly `title`.
    async fn short_title(&self, title: &str) -> PublishResult<()> {
        let mut last_seen = String::from("no short title input");
        for matcher in &self.selectors.short_title {
            if self.page.count(matcher).await.unwrap_or(0) == 0 {
                continue;
            }
            let input = matcher.first();
            if self
                .page
                .wait_for_visible(&input, SHORT_TITLE_VISIBLE)
                .await
                .is_err()
            {
                debug!(selector = %matcher, "short title input not visible");
                continue;
            }
            if let Err(err) = self.page.click(&input, ClickOptions::default()).await {
                warn!(selector = %matcher, error = %err, "short title click failed");
                continue;
            }
            settle(self.settle).await;
            if let Err(err) = self.page.fill(&input, "").await {
                warn!(selector = %matcher, error = %err, "short title clear failed");
                continue;
            }
            if let Err(err) = self.page.fill(&input, title).await {
                warn!(selector = %matcher, error = %err, "short title fill failed");
                continue;
            }
            settle(self.settle).await;
            match self.page.input_value(&input).await {
                Ok(Some(actual)) if actual == title => {
                    info!(selector = %matcher, "short title set");
                    return Ok(());
                }
                Ok(Some(actual)) => last_seen = format!("\"{actual}\""),
                Ok(None) => last_seen = "an element without a value".into(),
                Err(err) => last_seen = err.to_string(),
            }
        }
        Err(PublishError::form_fill(
            "short title",
            format!("\"{title}\""),
            last_seen,
        ))
    }
}
