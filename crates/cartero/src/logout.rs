//! Sign-out flow: ending the session and proving it ended.
//!
//! Ending a webmail session is a strategy chain, not a single click: the
//! account menu when it renders, a bare sign-out control when it does
//! not, and the provider's sign-out address as the last resort. Whatever
//! path ran, the session only counts as ended after the storage surfaces
//! are cleared and revisiting the mailbox lands back on the provider.

use std::sync::Arc;

use crate::config::{self, HarnessConfig, Timings};
use crate::driver::PageDriver;
use crate::logging::FlowLog;
use crate::resolver::ElementResolver;
use crate::result::CarteroResult;
use crate::selectors;
use crate::state::{SessionState, StateVerifier};
use crate::wait::WaitOptions;

const CLEAR_SITE_DATA_JS: &str = r#"(async () => {
    if (window.indexedDB && indexedDB.databases) {
        const dbs = await indexedDB.databases();
        await Promise.all(dbs.map((db) => new Promise((resolve) => {
            const request = indexedDB.deleteDatabase(db.name);
            request.onsuccess = request.onerror = request.onblocked = resolve;
        })));
    }
    if (window.caches) {
        const keys = await caches.keys();
        await Promise.all(keys.map((key) => caches.delete(key)));
    }
    return true;
})()"#;

/// Which path ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutStrategy {
    /// Through the account avatar menu
    AccountMenu,
    /// Through a directly visible sign-out control
    SignOutLink,
    /// By visiting the provider's sign-out address
    DirectAddress,
}

impl std::fmt::Display for LogoutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AccountMenu => "account-menu",
            Self::SignOutLink => "sign-out-link",
            Self::DirectAddress => "direct-address",
        };
        write!(f, "{name}")
    }
}

/// How an ended session looked afterwards.
#[derive(Debug, Clone)]
pub struct LogoutReport {
    /// The path that ended the session
    pub strategy: LogoutStrategy,
    /// Revisiting the mailbox landed on the sign-in provider
    pub confirmed: bool,
}

/// Drives sign-out and teardown against an abstract page driver.
#[derive(Debug)]
pub struct LogoutPage {
    base_url: String,
    timings: Timings,
    resolver: ElementResolver,
    verifier: StateVerifier,
    log: Arc<FlowLog>,
}

impl LogoutPage {
    /// Create a flow with the default base URL and timing profile.
    #[must_use]
    pub fn new(log: Arc<FlowLog>) -> Self {
        let page = Self {
            base_url: config::MAIL_BASE_URL.to_string(),
            timings: Timings::default(),
            resolver: ElementResolver::new(),
            verifier: StateVerifier::new(Arc::clone(&log)),
            log,
        };
        page.with_timings(Timings::default())
    }

    /// Apply a harness configuration.
    #[must_use]
    pub fn with_config(self, config: &HarnessConfig) -> Self {
        self.with_base_url(config.base_url.clone())
            .with_timings(config.timings)
    }

    /// Override the mailbox address revisited during confirmation.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the timing profile.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.resolver = ElementResolver::new().with_candidate_timeout_ms(timings.element_wait_ms);
        self.verifier = self
            .verifier
            .with_corroboration_wait(WaitOptions::scaled(timings.element_wait_ms));
        self.timings = timings;
        self
    }

    /// End the session through the first workable path.
    pub async fn sign_out<D: PageDriver>(&self, driver: &mut D) -> CarteroResult<LogoutStrategy> {
        if let Some(avatar) = self
            .resolver
            .first_visible(driver, &selectors::logout::account_button())
            .await?
        {
            driver.click(&avatar).await?;
            match self
                .resolver
                .resolve(driver, &selectors::logout::sign_out())
                .await?
            {
                Some(control) => {
                    driver.click(&control.selector).await?;
                    self.log
                        .info("logout", "signed out through the account menu");
                    return Ok(LogoutStrategy::AccountMenu);
                }
                None => {
                    self.log.warn(
                        "logout",
                        "account menu opened but no sign-out control appeared",
                    );
                }
            }
        } else if let Some(control) = self
            .resolver
            .first_visible(driver, &selectors::logout::sign_out())
            .await?
        {
            driver.click(&control).await?;
            self.log
                .info("logout", "signed out through a visible control");
            return Ok(LogoutStrategy::SignOutLink);
        }

        driver.navigate(config::LOGOUT_URL).await?;
        self.log
            .info("logout", "signed out by visiting the sign-out address");
        Ok(LogoutStrategy::DirectAddress)
    }

    /// Clear cookies, storage, and cached site data, then park on a blank page.
    ///
    /// The site-data script is best-effort; cookie and storage clearing are
    /// not.
    pub async fn teardown<D: PageDriver>(&self, driver: &mut D) -> CarteroResult<()> {
        driver.clear_cookies().await?;
        driver.clear_storage().await?;
        if driver.evaluate(CLEAR_SITE_DATA_JS).await.is_err() {
            self.log.warn("logout", "site data clearing script failed");
        }
        driver.navigate(config::BLANK_URL).await?;
        self.log.info("logout", "session surfaces cleared");
        Ok(())
    }

    /// Revisit the mailbox and verify the session really ended.
    pub async fn confirm_signed_out<D: PageDriver>(&self, driver: &mut D) -> CarteroResult<bool> {
        driver.navigate(&self.base_url).await?;
        let state = self
            .verifier
            .current_state(driver, &selectors::state_probes())
            .await?;
        if state == SessionState::Unauthenticated {
            self.log.debug(
                "logout",
                "revisiting the mailbox lands on the sign-in provider",
            );
            Ok(true)
        } else {
            self.log
                .warn("logout", &format!("session is {state} after sign-out"));
            Ok(false)
        }
    }

    /// Sign out, tear the session surfaces down, and confirm the result.
    pub async fn end_session<D: PageDriver>(&self, driver: &mut D) -> CarteroResult<LogoutReport> {
        let strategy = self.sign_out(driver).await?;
        self.teardown(driver).await?;
        let confirmed = self.confirm_signed_out(driver).await?;
        Ok(LogoutReport {
            strategy,
            confirmed,
        })
    }

    /// The timing profile in effect.
    #[must_use]
    pub const fn timings(&self) -> &Timings {
        &self.timings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockReaction};
    use crate::locator::Selector;

    fn fast_logout(log: &Arc<FlowLog>) -> LogoutPage {
        LogoutPage::new(Arc::clone(log)).with_config(&HarnessConfig::fast())
    }

    fn avatar() -> Selector {
        Selector::css(r#"a[aria-label*="Google Account"]"#)
    }

    fn sign_out_control() -> Selector {
        Selector::text("Sign out")
    }

    /// Clearing cookies drops the session: any later visit to the mailbox
    /// redirects to the provider, as the real deployment does.
    fn expire_session_on_cookie_clear(driver: &MockDriver) {
        driver.on(
            "clear_cookies",
            vec![MockReaction::AddRedirect {
                prefix: "https://mail.google.com".to_string(),
                to: config::SIGNIN_URL.to_string(),
            }],
        );
    }

    #[tokio::test]
    async fn test_end_session_via_account_menu() {
        let mut driver = MockDriver::new();
        driver.set_url("https://mail.google.com/mail/u/0/#inbox");
        driver.show(&avatar());
        driver.on_click(
            &avatar(),
            vec![MockReaction::Show(sign_out_control().to_string())],
        );
        driver.on_click(
            &sign_out_control(),
            vec![MockReaction::SetUrl(config::SIGNIN_URL.to_string())],
        );
        expire_session_on_cookie_clear(&driver);

        let log = Arc::new(FlowLog::new());
        let report = fast_logout(&log).end_session(&mut driver).await.unwrap();

        assert_eq!(report.strategy, LogoutStrategy::AccountMenu);
        assert!(report.confirmed);
        assert!(driver.was_called("click:text=Sign out"));
        assert!(driver.was_called("clear_cookies"));
        assert!(driver.was_called("clear_storage"));
        assert!(driver.was_called("evaluate:"));
        assert!(driver.was_called("navigate:about:blank"));
    }

    #[tokio::test]
    async fn test_sign_out_falls_back_to_direct_address() {
        let mut driver = MockDriver::new();
        driver.set_url("https://mail.google.com/mail/u/0/#inbox");
        expire_session_on_cookie_clear(&driver);

        let log = Arc::new(FlowLog::new());
        let report = fast_logout(&log).end_session(&mut driver).await.unwrap();

        assert_eq!(report.strategy, LogoutStrategy::DirectAddress);
        assert!(report.confirmed);
        assert!(driver.was_called("navigate:https://accounts.google.com/logout"));
    }

    #[tokio::test]
    async fn test_menu_without_sign_out_control_falls_back() {
        let mut driver = MockDriver::new();
        driver.set_url("https://mail.google.com/mail/u/0/#inbox");
        driver.show(&avatar());
        expire_session_on_cookie_clear(&driver);

        let log = Arc::new(FlowLog::new());
        let strategy = fast_logout(&log).sign_out(&mut driver).await.unwrap();

        assert_eq!(strategy, LogoutStrategy::DirectAddress);
        assert!(log.contains_message("no sign-out control appeared"));
    }

    #[tokio::test]
    async fn test_visible_sign_out_control_without_menu() {
        let mut driver = MockDriver::new();
        driver.set_url("https://mail.google.com/mail/u/0/#inbox");
        driver.show(&sign_out_control());

        let log = Arc::new(FlowLog::new());
        let strategy = fast_logout(&log).sign_out(&mut driver).await.unwrap();

        assert_eq!(strategy, LogoutStrategy::SignOutLink);
        assert!(driver.was_called("click:text=Sign out"));
    }

    #[tokio::test]
    async fn test_confirm_detects_lingering_session() {
        let mut driver = MockDriver::new();

        let log = Arc::new(FlowLog::new());
        let confirmed = fast_logout(&log)
            .confirm_signed_out(&mut driver)
            .await
            .unwrap();

        assert!(!confirmed);
        assert!(log.contains_message("session is authenticated after sign-out"));
    }

    #[tokio::test]
    async fn test_confirm_accepts_provider_redirect_echoing_mailbox() {
        // A signed-out visit bounces to the provider with the mailbox
        // address echoed in the continue parameter; that still counts as
        // signed out.
        let mut driver = MockDriver::new();
        driver.redirect(
            config::MAIL_BASE_URL,
            "https://accounts.google.com/signin?continue=https%3A%2F%2Fmail.google.com%2Fmail%2Fu%2F0%2F",
        );

        let log = Arc::new(FlowLog::new());
        let confirmed = fast_logout(&log)
            .confirm_signed_out(&mut driver)
            .await
            .unwrap();

        assert!(confirmed);
        assert!(log.contains_message("lands on the sign-in provider"));
    }

    #[tokio::test]
    async fn test_teardown_clears_every_surface() {
        let mut driver = MockDriver::new();

        let log = Arc::new(FlowLog::new());
        fast_logout(&log).teardown(&mut driver).await.unwrap();

        let history = driver.history();
        assert!(history.iter().any(|c| c == "clear_cookies"));
        assert!(history.iter().any(|c| c == "clear_storage"));
        assert!(history.iter().any(|c| c.starts_with("evaluate:")));
        assert_eq!(history.last().map(String::as_str), Some("navigate:about:blank"));
        assert!(log.contains_message("session surfaces cleared"));
    }
}
