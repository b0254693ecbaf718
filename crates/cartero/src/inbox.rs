//! Mailbox flow: list navigation and delivery-failure evidence.

use std::sync::Arc;

use crate::config::{self, HarnessConfig, Timings};
use crate::driver::PageDriver;
use crate::locator::Selector;
use crate::logging::FlowLog;
use crate::resolver::ElementResolver;
use crate::result::CarteroResult;
use crate::selectors;

/// Drives the mailbox against an abstract page driver.
#[derive(Debug)]
pub struct InboxPage {
    timings: Timings,
    resolver: ElementResolver,
    log: Arc<FlowLog>,
}

impl InboxPage {
    /// Create a flow with the default timing profile.
    #[must_use]
    pub fn new(log: Arc<FlowLog>) -> Self {
        Self {
            timings: Timings::default(),
            resolver: ElementResolver::new().with_candidate_timeout_ms(
                Timings::default().element_wait_ms,
            ),
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

    /// Wait until the mailbox container renders.
    pub async fn wait_for_load<D: PageDriver>(&self, driver: &D) -> CarteroResult<()> {
        let container = self
            .resolver
            .require(driver, &selectors::inbox::container())
            .await?;
        self.log.debug(
            "inbox",
            &format!("mailbox rendered, matched {}", container.selector),
        );
        Ok(())
    }

    /// Reload the mailbox and wait for it to render.
    pub async fn refresh<D: PageDriver>(&self, driver: &mut D) -> CarteroResult<()> {
        driver.navigate(config::INBOX_URL).await?;
        self.wait_for_load(driver).await
    }

    /// Open the compose window and wait for it to appear.
    pub async fn open_compose<D: PageDriver>(&self, driver: &D) -> CarteroResult<()> {
        let button = self
            .resolver
            .require(driver, &selectors::inbox::compose_button())
            .await?;
        driver.click(&button.selector).await?;
        self.resolver
            .require(driver, &selectors::compose::window())
            .await?;
        self.log.info("inbox", "compose window opened");
        Ok(())
    }

    /// Open the newest message; `Ok(false)` when the mailbox is empty.
    pub async fn open_first_email<D: PageDriver>(&self, driver: &D) -> CarteroResult<bool> {
        match self
            .resolver
            .resolve(driver, &selectors::inbox::first_email())
            .await?
        {
            Some(row) => {
                driver.click(&row.selector).await?;
                self.log.debug("inbox", "opened the newest message");
                Ok(true)
            }
            None => {
                self.log.debug("inbox", "no messages to open");
                Ok(false)
            }
        }
    }

    /// Return from an open message to the list.
    pub async fn back_to_inbox<D: PageDriver>(&self, driver: &D) -> CarteroResult<()> {
        let back = self
            .resolver
            .require(driver, &selectors::inbox::back_to_inbox())
            .await?;
        driver.click(&back.selector).await?;
        self.wait_for_load(driver).await
    }

    /// Scan the visible page for evidence of a bounced send.
    ///
    /// Checks the bounce-sender probe first, then each known failure
    /// marker. `Ok(None)` means no evidence on screen; it does not prove
    /// delivery, only the absence of a bounce.
    pub async fn find_delivery_failure<D: PageDriver>(
        &self,
        driver: &D,
    ) -> CarteroResult<Option<String>> {
        let failure = selectors::inbox::delivery_failure();
        if let Some(selector) = self.resolver.first_visible(driver, &failure).await? {
            let marker = driver
                .inner_text(&selector)
                .await?
                .unwrap_or_else(|| selector.to_string());
            self.log
                .warn("inbox", &format!("delivery failure evidence: {marker}"));
            return Ok(Some(marker));
        }
        for marker in config::DELIVERY_FAILURE_MARKERS {
            if driver.is_visible(&Selector::text(marker)).await? {
                self.log
                    .warn("inbox", &format!("delivery failure marker on screen: {marker}"));
                return Ok(Some(marker.to_string()));
            }
        }
        Ok(None)
    }

    /// The timing profile in effect.
    #[must_use]
    pub const fn timings(&self) -> &Timings {
        &self.timings
    }
}
