//! Compose flow: authoring a message and verifying the send.
//!
//! A send has no single success signal. The flow treats it as accepted
//! only when no validation error is showing and either the confirmation
//! toast appeared or the compose window went away. Everything else is
//! reported in a [`SendOutcome`] rather than guessed at.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{EmailPayload, HarnessConfig, Timings};
use crate::driver::PageDriver;
use crate::logging::FlowLog;
use crate::resolver::ElementResolver;
use crate::result::CarteroResult;
use crate::selectors;
use crate::wait::{pacing_pause, pause};

/// What the page showed after the send control was clicked.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// True when the send was positively confirmed
    pub accepted: bool,
    /// The confirmation toast was seen
    pub confirmation_seen: bool,
    /// The compose window disappeared
    pub composer_closed: bool,
    /// Validation or dialog text when the page objected
    pub validation_error: Option<String>,
}

impl SendOutcome {
    fn accepted_via(confirmation_seen: bool, composer_closed: bool) -> Self {
        Self {
            accepted: true,
            confirmation_seen,
            composer_closed,
            validation_error: None,
        }
    }

    fn refused(validation_error: Option<String>) -> Self {
        Self {
            accepted: false,
            confirmation_seen: false,
            composer_closed: false,
            validation_error,
        }
    }
}

/// Drives the compose window against an abstract page driver.
#[derive(Debug)]
pub struct ComposePage {
    timings: Timings,
    resolver: ElementResolver,
    log: Arc<FlowLog>,
}

impl ComposePage {
    /// Create a flow with the default timing profile.
    #[must_use]
    pub fn new(log: Arc<FlowLog>) -> Self {
        Self {
            timings: Timings::default(),
            resolver: ElementResolver::new()
                .with_candidate_timeout_ms(Timings::default().element_wait_ms),
            log,
        }
    }

    /// Apply a harness configuration.
    #[must_use]
    pub fn with_config(self, config: &HarnessConfig) -> Self {
        self.with_timings(config.timings)
    }

    /// Override the timing profile.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.resolver = ElementResolver::new().with_candidate_timeout_ms(timings.element_wait_ms);
        self.timings = timings;
        self
    }

    /// Fill the recipient, subject, and body fields of an open composer.
    ///
    /// Fields are paced like a person tabbing through a form. Empty
    /// values are typed as-is; the send step surfaces whatever the page
    /// thinks of them.
    pub async fn fill<D: PageDriver>(
        &self,
        driver: &D,
        message: &EmailPayload,
    ) -> CarteroResult<()> {
        self.resolver
            .require(driver, &selectors::compose::window())
            .await?;

        let recipient = self
            .resolver
            .require(driver, &selectors::compose::recipient_input())
            .await?;
        driver.fill(&recipient.selector, &message.recipient).await?;
        pacing_pause(self.timings.pacing_min_ms, self.timings.pacing_max_ms).await;

        let subject = self
            .resolver
            .require(driver, &selectors::compose::subject_input())
            .await?;
        driver.fill(&subject.selector, &message.subject).await?;
        pacing_pause(self.timings.pacing_min_ms, self.timings.pacing_max_ms).await;

        let body = self
            .resolver
            .require(driver, &selectors::compose::body_input())
            .await?;
        driver.fill(&body.selector, &message.body).await?;
        pacing_pause(self.timings.pacing_min_ms, self.timings.pacing_max_ms).await;

        self.log.info(
            "compose",
            &format!("message fields filled for {}", message.recipient),
        );
        Ok(())
    }

    /// Click send and watch for an outcome signal.
    ///
    /// Confirms the no-subject warning once if it appears, dismisses a
    /// modal error dialog, and otherwise polls until the page commits to
    /// an answer or the wait budget runs out.
    pub async fn send<D: PageDriver>(&self, driver: &D) -> CarteroResult<SendOutcome> {
        let button = self
            .resolver
            .require(driver, &selectors::compose::send_button())
            .await?;
        driver.click(&button.selector).await?;
        self.log.debug("compose", "send clicked, watching for an outcome");

        let window_ms = self.timings.element_wait_ms;
        let poll_ms = (window_ms / 10).max(1);
        let deadline = Instant::now() + Duration::from_millis(window_ms);
        let mut subject_confirmed = false;
        loop {
            if !subject_confirmed
                && self
                    .resolver
                    .any_visible(driver, &selectors::compose::subject_warning())
                    .await?
            {
                self.confirm_missing_subject(driver).await?;
                subject_confirmed = true;
                pause(poll_ms).await;
                continue;
            }

            if self
                .resolver
                .any_visible(driver, &selectors::compose::validation_error())
                .await?
            {
                let detail = self
                    .resolver
                    .read_text(
                        driver,
                        &selectors::compose::validation_error(),
                        self.timings.short_wait_ms,
                    )
                    .await?
                    .unwrap_or_else(|| "validation error displayed".to_string());
                self.log
                    .warn("compose", &format!("send refused: {detail}"));
                return Ok(SendOutcome::refused(Some(detail)));
            }

            if self
                .resolver
                .any_visible(driver, &selectors::compose::error_dialog())
                .await?
            {
                let detail = self.dismiss_error_dialog(driver).await?;
                return Ok(SendOutcome::refused(Some(detail)));
            }

            if self
                .resolver
                .any_visible(driver, &selectors::compose::send_confirmation())
                .await?
            {
                self.log.info("compose", "send confirmation toast shown");
                return Ok(SendOutcome::accepted_via(true, false));
            }

            if !self
                .resolver
                .any_visible(driver, &selectors::compose::window())
                .await?
            {
                self.log
                    .info("compose", "compose window closed after send");
                return Ok(SendOutcome::accepted_via(false, true));
            }

            if Instant::now() >= deadline {
                self.log.warn(
                    "compose",
                    &format!("no send signal within {window_ms}ms"),
                );
                return Ok(SendOutcome::refused(None));
            }
            pause(poll_ms).await;
        }
    }

    /// Fill an open composer and send in one step.
    pub async fn send_message<D: PageDriver>(
        &self,
        driver: &D,
        message: &EmailPayload,
    ) -> CarteroResult<SendOutcome> {
        self.fill(driver, message).await?;
        self.send(driver).await
    }

    async fn confirm_missing_subject<D: PageDriver>(&self, driver: &D) -> CarteroResult<()> {
        self.log
            .debug("compose", "confirming send without a subject");
        match self
            .resolver
            .first_visible(driver, &selectors::compose::warning_confirm())
            .await?
        {
            Some(confirm) => {
                if driver.click(&confirm).await.is_err() {
                    self.log
                        .warn("compose", "subject warning confirm was not clickable");
                }
            }
            None => {
                self.log
                    .warn("compose", "subject warning shown but no confirm control found");
            }
        }
        Ok(())
    }

    async fn dismiss_error_dialog<D: PageDriver>(&self, driver: &D) -> CarteroResult<String> {
        let detail = self
            .resolver
            .read_text(
                driver,
                &selectors::compose::error_dialog(),
                self.timings.short_wait_ms,
            )
            .await?
            .unwrap_or_else(|| "error dialog displayed".to_string());
        self.log
            .warn("compose", &format!("send raised a dialog: {detail}"));
        if let Some(dismiss) = self
            .resolver
            .first_visible(driver, &selectors::compose::error_dialog_dismiss())
            .await?
        {
            if driver.click(&dismiss).await.is_err() {
                self.log
                    .warn("compose", "error dialog dismiss was not clickable");
            }
        }
        Ok(detail)
    }
}
