//! Scenario orchestration over the individual page flows.
//!
//! Flows speak in typed errors; suites want pass/fail rows. This layer is
//! the single place where one becomes the other: each scenario runs a
//! flow, flattens its result into a [`ScenarioOutcome`] with a reason,
//! and captures a failure screenshot when a directory is configured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::compose::ComposePage;
use crate::config::{HarnessConfig, TestData};
use crate::driver::PageDriver;
use crate::inbox::InboxPage;
use crate::logging::FlowLog;
use crate::login::LoginPage;
use crate::logout::LogoutPage;
use crate::otp::{CommandOtpProvider, OtpProvider};
use crate::result::{CarteroError, CarteroResult};

/// Pass/fail record for one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    /// Scenario name
    pub name: String,
    /// Whether the scenario passed
    pub passed: bool,
    /// Failure reason when it did not
    pub reason: Option<String>,
    /// Wall-clock duration
    pub duration: Duration,
}

/// Aggregate of the scenarios run in one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Unique run identifier
    pub id: String,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// Scenario outcomes in execution order
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
        }
    }

    /// True when at least one scenario ran and all of them passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|outcome| outcome.passed)
    }

    /// One-line pass count.
    #[must_use]
    pub fn summary(&self) -> String {
        let passed = self.outcomes.iter().filter(|outcome| outcome.passed).count();
        format!("{passed}/{} scenarios passed", self.outcomes.len())
    }
}

/// Runs end-to-end webmail journeys over any page driver.
#[derive(Debug)]
pub struct WebmailHarness<D: PageDriver, P: OtpProvider = CommandOtpProvider> {
    driver: D,
    config: HarnessConfig,
    data: TestData,
    log: Arc<FlowLog>,
    login: LoginPage<P>,
    inbox: InboxPage,
    compose: ComposePage,
    logout: LogoutPage,
}

impl<D: PageDriver> WebmailHarness<D, CommandOtpProvider> {
    /// Create a harness that generates codes with the external command.
    #[must_use]
    pub fn new(driver: D, config: HarnessConfig, data: TestData) -> Self {
        Self::with_provider(driver, config, data, CommandOtpProvider::new())
    }
}

impl<D: PageDriver, P: OtpProvider> WebmailHarness<D, P> {
    /// Create a harness with a specific one-time-code provider.
    #[must_use]
    pub fn with_provider(driver: D, config: HarnessConfig, data: TestData, provider: P) -> Self {
        let log = Arc::new(FlowLog::new());
        Self {
            login: LoginPage::with_provider(Arc::clone(&log), provider).with_config(&config),
            inbox: InboxPage::new(Arc::clone(&log)).with_config(&config),
            compose: ComposePage::new(Arc::clone(&log)).with_config(&config),
            logout: LogoutPage::new(Arc::clone(&log)).with_config(&config),
            driver,
            config,
            data,
            log,
        }
    }

    /// The structured log shared by every flow.
    #[must_use]
    pub fn log(&self) -> &FlowLog {
        &self.log
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The underlying page driver.
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the underlying page driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Close the underlying driver.
    pub async fn close(&mut self) -> CarteroResult<()> {
        self.driver.close().await
    }

    /// Sign in with the account registered under `account_key`.
    pub async fn login_scenario(&mut self, account_key: &str) -> ScenarioOutcome {
        let started = Instant::now();
        let result = self.try_login(account_key).await;
        self.conclude("login", started, result).await
    }

    /// Compose and send the payload registered under `email_key`, then
    /// scan the mailbox for bounce evidence.
    pub async fn compose_scenario(&mut self, email_key: &str) -> ScenarioOutcome {
        let started = Instant::now();
        let result = self.try_compose(email_key).await;
        self.conclude("compose", started, result).await
    }

    /// Sign out, tear the session down, and confirm it ended.
    pub async fn logout_scenario(&mut self) -> ScenarioOutcome {
        let started = Instant::now();
        let result = self.try_logout().await;
        self.conclude("logout", started, result).await
    }

    /// Run sign-in, compose, and sign-out as one session.
    ///
    /// Compose and logout are skipped when sign-in fails; there is no
    /// session to exercise them against.
    pub async fn full_session(&mut self, account_key: &str, email_key: &str) -> SessionReport {
        let mut report = SessionReport::new();
        self.log
            .info("session", &format!("session {} started", report.id));

        let login = self.login_scenario(account_key).await;
        let authenticated = login.passed;
        report.outcomes.push(login);

        if authenticated {
            report.outcomes.push(self.compose_scenario(email_key).await);
            report.outcomes.push(self.logout_scenario().await);
        } else {
            self.log.warn(
                "session",
                "skipping compose and logout after a failed sign-in",
            );
        }

        self.log.info("session", &report.summary());
        report
    }

    async fn try_login(&mut self, account_key: &str) -> CarteroResult<()> {
        let account = self.data.account(account_key)?.clone();
        let attempt = self.login.sign_in(&mut self.driver, &account).await?;
        if attempt.state.is_authenticated() {
            Ok(())
        } else {
            Err(CarteroError::VerificationFailed {
                message: format!("sign-in settled as {}", attempt.state),
            })
        }
    }

    async fn try_compose(&mut self, email_key: &str) -> CarteroResult<()> {
        let message = self.data.email(email_key)?.clone();
        self.inbox.wait_for_load(&self.driver).await?;
        self.inbox.open_compose(&self.driver).await?;
        let outcome = self.compose.send_message(&self.driver, &message).await?;
        if !outcome.accepted {
            return Err(CarteroError::VerificationFailed {
                message: outcome
                    .validation_error
                    .unwrap_or_else(|| "send was never confirmed".to_string()),
            });
        }
        self.inbox.refresh(&mut self.driver).await?;
        if let Some(marker) = self.inbox.find_delivery_failure(&self.driver).await? {
            return Err(CarteroError::VerificationFailed {
                message: format!("message bounced: {marker}"),
            });
        }
        Ok(())
    }

    async fn try_logout(&mut self) -> CarteroResult<()> {
        let report = self.logout.end_session(&mut self.driver).await?;
        if report.confirmed {
            Ok(())
        } else {
            Err(CarteroError::VerificationFailed {
                message: format!("session still active after {} sign-out", report.strategy),
            })
        }
    }

    async fn conclude(
        &self,
        name: &str,
        started: Instant,
        result: CarteroResult<()>,
    ) -> ScenarioOutcome {
        match result {
            Ok(()) => {
                self.log.info(name, "scenario passed");
                ScenarioOutcome {
                    name: name.to_string(),
                    passed: true,
                    reason: None,
                    duration: started.elapsed(),
                }
            }
            Err(error) => {
                self.log.error(name, &error.to_string());
                self.capture_failure(name).await;
                ScenarioOutcome {
                    name: name.to_string(),
                    passed: false,
                    reason: Some(error.to_string()),
                    duration: started.elapsed(),
                }
            }
        }
    }

    /// Best-effort screenshot of a failed scenario. Never fails the run.
    async fn capture_failure(&self, name: &str) {
        let Some(dir) = self.config.screenshot_dir.as_deref() else {
            return;
        };
        match self.driver.screenshot().await {
            Ok(shot) => {
                let path = dir.join(format!("{name}-failure-{}.png", uuid::Uuid::new_v4()));
                let saved = std::fs::create_dir_all(dir)
                    .and_then(|()| std::fs::write(&path, &shot.data));
                match saved {
                    Ok(()) => self.log.info(
                        name,
                        &format!("failure screenshot saved to {}", path.display()),
                    ),
                    Err(error) => self.log.warn(
                        name,
                        &format!("failure screenshot not saved: {error}"),
                    ),
                }
            }
            Err(error) => {
                self.log
                    .warn(name, &format!("failure screenshot unavailable: {error}"));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config;
    use crate::driver::{MockDriver, MockReaction};
    use crate::locator::Selector;
    use crate::otp::MockOtpProvider;

    const FIXTURE: &str = r#"{
        "accounts": {
            "valid": {
                "identity": "tester@example.com",
                "secret": "hunter2",
                "totp_seed": "abcd efgh ijkl mnop"
            },
            "plain": {
                "identity": "plain@example.com",
                "secret": "hunter2"
            }
        },
        "emails": {
            "smoke": {
                "recipient": "peer@example.com",
                "subject": "smoke",
                "body": "hello from the harness"
            }
        }
    }"#;

    fn data() -> TestData {
        TestData::from_json(FIXTURE).unwrap()
    }

    /// Driver scripted up to the secret submission, as the provider
    /// renders it: identity form first, secret form after.
    fn login_funnel() -> MockDriver {
        let driver = MockDriver::new();
        driver.redirect(config::MAIL_BASE_URL, config::SIGNIN_URL);
        driver.show(&Selector::css(r#"input[type="email"]"#));
        driver.show(&Selector::css("#identifierNext"));
        driver.on_click(
            &Selector::css("#identifierNext"),
            vec![
                MockReaction::Show(r#"css=input[type="password"]"#.to_string()),
                MockReaction::Show("css=#passwordNext".to_string()),
            ],
        );
        driver
    }

    /// Reactions revealing the signed-in application: address moves to the
    /// inbox, the mailbox renders, and later flows find their controls.
    fn application_batch() -> Vec<MockReaction> {
        vec![
            MockReaction::SetUrl(config::INBOX_URL.to_string()),
            MockReaction::AddRedirect {
                prefix: config::MAIL_BASE_URL.to_string(),
                to: config::INBOX_URL.to_string(),
            },
            MockReaction::Show(r#"css=[data-test-id="inbox"]"#.to_string()),
            MockReaction::Show("css=.nH".to_string()),
            MockReaction::Show("css=.T-I.T-I-KE.L3".to_string()),
            MockReaction::Show(r#"css=a[aria-label*="Google Account"]"#.to_string()),
        ]
    }

    /// Compose window plumbing: the compose click opens the window, the
    /// send click confirms, and sign-out works through the account menu.
    fn script_compose_and_logout(driver: &MockDriver) {
        driver.on_click(
            &Selector::css(".T-I.T-I-KE.L3"),
            vec![
                MockReaction::Show("css=.nH.if".to_string()),
                MockReaction::Show(r#"css=input[aria-label="To recipients"]"#.to_string()),
                MockReaction::Show(r#"css=input[name="subjectbox"]"#.to_string()),
                MockReaction::Show("css=.Am.Al.editable".to_string()),
                MockReaction::Show("css=.T-I.J-J5-Ji.aoO.v7.T-I-atl.L3".to_string()),
            ],
        );
        driver.on_click(
            &Selector::css(".T-I.J-J5-Ji.aoO.v7.T-I-atl.L3"),
            vec![
                MockReaction::Hide("css=.nH.if".to_string()),
                MockReaction::Show("css=.vh".to_string()),
            ],
        );
        driver.on_click(
            &Selector::css(r#"a[aria-label*="Google Account"]"#),
            vec![MockReaction::Show("text=Sign out".to_string())],
        );
        driver.on_click(
            &Selector::text("Sign out"),
            vec![MockReaction::SetUrl(config::SIGNIN_URL.to_string())],
        );
        driver.on(
            "clear_cookies",
            vec![MockReaction::AddRedirect {
                prefix: config::MAIL_BASE_URL.to_string(),
                to: config::SIGNIN_URL.to_string(),
            }],
        );
    }

    fn full_journey() -> MockDriver {
        let driver = login_funnel();
        driver.on_click(&Selector::css("#passwordNext"), application_batch());
        script_compose_and_logout(&driver);
        driver
    }

    #[tokio::test]
    async fn test_full_session_runs_every_scenario() {
        let mut harness =
            WebmailHarness::new(full_journey(), HarnessConfig::fast(), data());
        let report = harness.full_session("plain", "smoke").await;

        assert!(report.passed());
        assert_eq!(report.outcomes.len(), 3);
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["login", "compose", "logout"]);
        assert_eq!(report.summary(), "3/3 scenarios passed");
        assert!(!report.id.is_empty());
    }

    #[tokio::test]
    async fn test_full_session_with_challenged_account() {
        let driver = login_funnel();
        driver.on_click(
            &Selector::css("#passwordNext"),
            vec![
                MockReaction::SetUrl(
                    "https://accounts.google.com/signin/v2/challenge/totp".to_string(),
                ),
                MockReaction::Show(r#"css=input[name="totpPin"]"#.to_string()),
                MockReaction::Show("css=#totpNext".to_string()),
            ],
        );
        let mut accept = application_batch();
        accept.insert(
            0,
            MockReaction::Hide(r#"css=input[name="totpPin"]"#.to_string()),
        );
        driver.on_click(&Selector::css("#totpNext"), accept);
        script_compose_and_logout(&driver);

        let provider = Arc::new(MockOtpProvider::new());
        provider.push_code("654321");
        let mut harness = WebmailHarness::with_provider(
            driver,
            HarnessConfig::fast(),
            data(),
            Arc::clone(&provider),
        );
        let report = harness.full_session("valid", "smoke").await;

        assert!(report.passed(), "{:?}", report.outcomes);
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.seeds(), vec!["abcd efgh ijkl mnop"]);
        assert!(harness
            .driver()
            .was_called(r#"fill:css=input[name="totpPin"]"#));
    }

    #[tokio::test]
    async fn test_full_session_skips_after_failed_sign_in() {
        let driver = MockDriver::new();
        driver.redirect(config::MAIL_BASE_URL, config::SIGNIN_URL);
        let mut harness = WebmailHarness::new(driver, HarnessConfig::fast(), data());
        let report = harness.full_session("plain", "smoke").await;

        assert!(!report.passed());
        assert_eq!(report.outcomes.len(), 1);
        assert!(harness.log().contains_message("skipping compose and logout"));
    }

    #[tokio::test]
    async fn test_login_scenario_reports_reason() {
        let driver = MockDriver::new();
        driver.redirect(config::MAIL_BASE_URL, config::SIGNIN_URL);
        driver.show(&Selector::css(r#"input[type="email"]"#));
        driver.show(&Selector::css("#identifierNext"));
        let banner = Selector::css(".LXRPh");
        driver.set_text(&banner, "Couldn't find your Google Account");
        driver.on_click(
            &Selector::css("#identifierNext"),
            vec![MockReaction::Show(banner.to_string())],
        );

        let mut harness = WebmailHarness::new(driver, HarnessConfig::fast(), data());
        let outcome = harness.login_scenario("plain").await;

        assert!(!outcome.passed);
        let reason = outcome.reason.unwrap();
        assert!(reason.contains("Sign-in rejected"), "{reason}");
    }

    #[tokio::test]
    async fn test_missing_account_key_fails_the_scenario() {
        let mut harness =
            WebmailHarness::new(MockDriver::new(), HarnessConfig::fast(), data());
        let outcome = harness.login_scenario("ghost").await;

        assert!(!outcome.passed);
        assert!(outcome.reason.unwrap().contains("no account named ghost"));
    }

    #[tokio::test]
    async fn test_compose_scenario_requires_a_loaded_mailbox() {
        let mut harness =
            WebmailHarness::new(MockDriver::new(), HarnessConfig::fast(), data());
        let outcome = harness.compose_scenario("smoke").await;

        assert!(!outcome.passed);
        assert!(outcome.reason.unwrap().contains("inbox container"));
    }

    #[tokio::test]
    async fn test_compose_scenario_reports_a_bounce() {
        let driver = MockDriver::new();
        driver.set_url(config::INBOX_URL);
        driver.show(&Selector::css(".nH"));
        driver.show(&Selector::css(".T-I.T-I-KE.L3"));
        driver.on_click(
            &Selector::css(".T-I.T-I-KE.L3"),
            vec![
                MockReaction::Show("css=.nH.if".to_string()),
                MockReaction::Show(r#"css=input[aria-label="To recipients"]"#.to_string()),
                MockReaction::Show(r#"css=input[name="subjectbox"]"#.to_string()),
                MockReaction::Show("css=.Am.Al.editable".to_string()),
                MockReaction::Show("css=.T-I.J-J5-Ji.aoO.v7.T-I-atl.L3".to_string()),
            ],
        );
        let daemon = Selector::css(r#"span[email="mailer-daemon@googlemail.com"]"#);
        driver.set_text(&daemon, "Address not found");
        driver.on_click(
            &Selector::css(".T-I.J-J5-Ji.aoO.v7.T-I-atl.L3"),
            vec![
                MockReaction::Hide("css=.nH.if".to_string()),
                MockReaction::Show("css=.vh".to_string()),
                MockReaction::Show(daemon.to_string()),
            ],
        );

        let mut harness = WebmailHarness::new(driver, HarnessConfig::fast(), data());
        let outcome = harness.compose_scenario("smoke").await;

        assert!(!outcome.passed);
        let reason = outcome.reason.unwrap();
        assert!(reason.contains("message bounced"), "{reason}");
        assert!(reason.contains("Address not found"), "{reason}");
    }

    #[tokio::test]
    async fn test_logout_scenario_detects_lingering_session() {
        let driver = MockDriver::new();
        driver.set_url(config::INBOX_URL);
        let mut harness = WebmailHarness::new(driver, HarnessConfig::fast(), data());
        let outcome = harness.logout_scenario().await;

        assert!(!outcome.passed);
        assert!(outcome
            .reason
            .unwrap()
            .contains("session still active after direct-address sign-out"));
    }

    #[tokio::test]
    async fn test_failure_screenshot_saved_when_directory_configured() {
        let dir = tempfile::tempdir().unwrap();
        let driver = MockDriver::new();
        driver.set_screenshot(vec![0x89, 0x50, 0x4e, 0x47]);
        let config = HarnessConfig::fast().with_screenshot_dir(dir.path());

        let mut harness = WebmailHarness::new(driver, config, data());
        let outcome = harness.login_scenario("ghost").await;
        assert!(!outcome.passed);

        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
        let name = saved[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.starts_with("login-failure-"), "{name}");
        assert!(name.ends_with(".png"), "{name}");
        assert!(harness.log().contains_message("failure screenshot saved"));
    }

    #[tokio::test]
    async fn test_close_shuts_the_driver_down() {
        let mut harness =
            WebmailHarness::new(MockDriver::new(), HarnessConfig::fast(), data());
        harness.close().await.unwrap();
        assert!(harness.driver().was_called("close"));
    }

    #[test]
    fn test_debug_dump_masks_credentials() {
        let harness = WebmailHarness::new(MockDriver::new(), HarnessConfig::fast(), data());
        let dump = format!("{harness:?}");

        assert!(dump.contains("WebmailHarness"));
        assert!(dump.contains("LoginPage"));
        assert!(!dump.contains("hunter2"));
        assert!(!dump.contains("abcd efgh ijkl mnop"));
    }
}
