//! Sign-in flow with second-factor challenges.
//!
//! The flow is a small outcome machine rather than a fixed script: after
//! each form submission the page is polled for the first decisive signal
//! (refusal, challenge input, application address) and the machine branches
//! on what actually materialized. Refusals are terminal. A submission that
//! produces no signal gets one extended wait and is then resolved under the
//! configured ambiguity policy.
//!
//! Secrets and one-time codes flow only into `fill` calls, never into log
//! messages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{self, AccountRecord, AmbiguityPolicy, HarnessConfig, Timings};
use crate::driver::PageDriver;
use crate::logging::FlowLog;
use crate::otp::{CommandOtpProvider, OtpClient, OtpProvider};
use crate::resolver::ElementResolver;
use crate::result::{CarteroError, CarteroResult};
use crate::selectors;
use crate::state::{SessionState, StateVerifier};
use crate::wait::{pacing_pause, pause, probe_until, WaitOptions};

/// Outcome of a completed sign-in.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    /// State the session settled into
    pub state: SessionState,
    /// Second-factor submissions performed (0 when no challenge appeared)
    pub two_fa_attempts: u32,
    /// Wall-clock duration of the whole flow
    pub elapsed: Duration,
}

/// First decisive signal after submitting credentials
#[derive(Debug)]
enum Submission {
    /// Window closed with no signal
    Pending,
    /// Provider refused the attempt
    Refused(String),
    /// A second-factor challenge input appeared
    Challenge,
    /// The address reached the application
    Application,
}

/// First decisive signal after submitting a challenge code
#[derive(Debug)]
enum ChallengeSignal {
    WrongCode,
    Refused(String),
    Passed,
}

/// Drives the sign-in flow against an abstract page driver.
#[derive(Debug)]
pub struct LoginPage<P = CommandOtpProvider> {
    base_url: String,
    timings: Timings,
    ambiguity: AmbiguityPolicy,
    resolver: ElementResolver,
    verifier: StateVerifier,
    otp: OtpClient<P>,
    log: Arc<FlowLog>,
}

impl LoginPage<CommandOtpProvider> {
    /// Create a flow backed by the external code generator command.
    #[must_use]
    pub fn new(log: Arc<FlowLog>) -> Self {
        Self::with_provider(log, CommandOtpProvider::new())
    }
}

impl<P: OtpProvider> LoginPage<P> {
    /// Create a flow with a specific code provider.
    #[must_use]
    pub fn with_provider(log: Arc<FlowLog>, provider: P) -> Self {
        let page = Self {
            base_url: config::MAIL_BASE_URL.to_string(),
            timings: Timings::default(),
            ambiguity: AmbiguityPolicy::default(),
            resolver: ElementResolver::new(),
            verifier: StateVerifier::new(Arc::clone(&log)),
            otp: OtpClient::new(provider),
            log,
        };
        page.with_timings(Timings::default())
    }

    /// Apply a harness configuration.
    #[must_use]
    pub fn with_config(self, config: &HarnessConfig) -> Self {
        self.with_base_url(config.base_url.clone())
            .with_timings(config.timings)
            .with_ambiguity(config.ambiguity)
    }

    /// Override the entry address the flow navigates to.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the timing profile, resizing every dependent window.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.resolver = ElementResolver::new().with_candidate_timeout_ms(timings.element_wait_ms);
        self.verifier = self
            .verifier
            .with_corroboration_wait(WaitOptions::scaled(timings.element_wait_ms));
        self.otp = self.otp.with_retry_delay_ms(timings.otp_retry_delay_ms);
        self.timings = timings;
        self
    }

    /// Override the ambiguous-outcome policy.
    #[must_use]
    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// Run the full sign-in flow for one account.
    ///
    /// Navigates to the base address, submits identity and secret, passes a
    /// second-factor challenge if one appears, then waits for the session to
    /// settle inside the application. An account challenged without a code
    /// seed is a contract violation reported before any code is generated.
    pub async fn sign_in<D: PageDriver>(
        &self,
        driver: &mut D,
        account: &AccountRecord,
    ) -> CarteroResult<AuthAttempt> {
        let started = Instant::now();
        account.validate()?;
        self.log
            .info("login", &format!("signing in {}", account.identity));

        driver.navigate(&self.base_url).await?;
        self.submit_identity(driver, account).await?;
        self.submit_secret(driver, account).await?;

        let mut two_fa_attempts = 0;
        match self.await_submission(driver).await? {
            Submission::Refused(reason) => {
                self.log.error("login", &format!("sign-in refused: {reason}"));
                return Err(CarteroError::Rejection { reason });
            }
            Submission::Challenge => {
                two_fa_attempts = self.pass_challenge(driver, account).await?;
            }
            Submission::Application | Submission::Pending => {}
        }

        let state = self.settle(driver).await?;
        self.log.info(
            "login",
            &format!(
                "sign-in settled as {state} in {}ms",
                started.elapsed().as_millis()
            ),
        );
        Ok(AuthAttempt {
            state,
            two_fa_attempts,
            elapsed: started.elapsed(),
        })
    }

    async fn submit_identity<D: PageDriver>(
        &self,
        driver: &D,
        account: &AccountRecord,
    ) -> CarteroResult<()> {
        let input = self
            .resolver
            .require(driver, &selectors::login::identity_input())
            .await?;
        driver.fill(&input.selector, &account.identity).await?;
        pacing_pause(self.timings.pacing_min_ms, self.timings.pacing_max_ms).await;

        let next = self
            .resolver
            .require(driver, &selectors::login::identity_next())
            .await?;
        driver.click(&next.selector).await?;
        self.log.debug("login", "identity submitted");
        Ok(())
    }

    async fn submit_secret<D: PageDriver>(
        &self,
        driver: &D,
        account: &AccountRecord,
    ) -> CarteroResult<()> {
        let Some(input) = self
            .resolver
            .resolve(driver, &selectors::login::secret_input())
            .await?
        else {
            // The secret form never rendered; a refusal banner usually
            // explains why.
            if let Some(reason) = self.refusal_reason(driver).await? {
                self.log.error("login", &format!("sign-in refused: {reason}"));
                return Err(CarteroError::Rejection { reason });
            }
            return Err(CarteroError::DriverError {
                message: "secret input never appeared after identity submission".to_string(),
            });
        };
        driver.fill(&input.selector, &account.secret).await?;
        pacing_pause(self.timings.pacing_min_ms, self.timings.pacing_max_ms).await;

        let next = self
            .resolver
            .require(driver, &selectors::login::secret_next())
            .await?;
        driver.click(&next.selector).await?;
        self.log.debug("login", "secret submitted");
        Ok(())
    }

    /// Any terminal refusal signal currently on screen, with its reason.
    ///
    /// Checks the address marker first, then rejection copy, then inline
    /// credential errors. Cheap when nothing is wrong: one address read and
    /// a handful of immediate visibility probes.
    async fn refusal_reason<D: PageDriver>(&self, driver: &D) -> CarteroResult<Option<String>> {
        let url = driver.current_url().await?;
        if self.verifier.patterns().rejected_marker.matches(&url) {
            return Ok(Some(format!("provider flagged the attempt at {url}")));
        }
        let rejection = selectors::login::rejection_indicator();
        if self.resolver.any_visible(driver, &rejection).await? {
            let reason = self
                .resolver
                .read_text(driver, &rejection, self.timings.short_wait_ms)
                .await?
                .unwrap_or_else(|| "rejection banner displayed".to_string());
            return Ok(Some(reason));
        }
        let credential = selectors::login::credential_error();
        if self.resolver.any_visible(driver, &credential).await? {
            let reason = self
                .resolver
                .read_text(driver, &credential, self.timings.short_wait_ms)
                .await?
                .unwrap_or_else(|| "credential error displayed".to_string());
            return Ok(Some(reason));
        }
        Ok(None)
    }

    async fn await_submission<D: PageDriver>(&self, driver: &D) -> CarteroResult<Submission> {
        let window_ms = self.timings.element_wait_ms;
        let poll_ms = (window_ms / 10).max(1);
        let deadline = Instant::now() + Duration::from_millis(window_ms);
        loop {
            if let Some(reason) = self.refusal_reason(driver).await? {
                return Ok(Submission::Refused(reason));
            }
            if self
                .resolver
                .any_visible(driver, &selectors::login::challenge_input())
                .await?
            {
                return Ok(Submission::Challenge);
            }
            let url = driver.current_url().await?;
            if self.verifier.patterns().app_base.matches(&url) {
                return Ok(Submission::Application);
            }
            if Instant::now() >= deadline {
                return Ok(Submission::Pending);
            }
            pause(poll_ms).await;
        }
    }

    /// Submit fresh codes until one is accepted or the retry budget closes.
    ///
    /// Returns the number of submissions spent. Each attempt generates a new
    /// code; a rejected code is never resubmitted, and the inter-attempt
    /// pause lets the current code window lapse first.
    async fn pass_challenge<D: PageDriver>(
        &self,
        driver: &D,
        account: &AccountRecord,
    ) -> CarteroResult<u32> {
        let Some(seed) = account.totp_seed.as_deref() else {
            self.log
                .error("2fa", "challenge shown for an account with no code seed");
            return Err(CarteroError::ContractViolation {
                message: format!(
                    "account {} was challenged for a second factor but no code seed is configured",
                    account.identity
                ),
            });
        };

        let max = self.timings.two_fa_max_attempts;
        for attempt in 1..=max {
            let outcome = self
                .otp
                .generate_with_retry(seed, self.timings.otp_max_attempts)
                .await?;
            self.log.info(
                "2fa",
                &format!("attempt {attempt}/{max}: submitting a freshly generated code"),
            );

            let input = self
                .resolver
                .require(driver, &selectors::login::challenge_input())
                .await?;
            driver.fill(&input.selector, &outcome.code).await?;
            pacing_pause(self.timings.pacing_min_ms, self.timings.pacing_max_ms).await;
            let next = self
                .resolver
                .require(driver, &selectors::login::challenge_next())
                .await?;
            driver.click(&next.selector).await?;

            let signal = match self
                .await_challenge_signal(driver, self.timings.element_wait_ms)
                .await?
            {
                Some(signal) => Some(signal),
                None => {
                    self.log
                        .warn("2fa", "no outcome signal in the standard window, extending once");
                    self.await_challenge_signal(driver, self.timings.ambiguous_extension_ms)
                        .await?
                }
            };

            match signal {
                Some(ChallengeSignal::Passed) => {
                    self.log
                        .info("2fa", &format!("code accepted on attempt {attempt}"));
                    return Ok(attempt);
                }
                Some(ChallengeSignal::Refused(reason)) => {
                    self.log
                        .error("2fa", &format!("refused during the challenge: {reason}"));
                    return Err(CarteroError::Rejection { reason });
                }
                Some(ChallengeSignal::WrongCode) => {
                    let banner = self
                        .resolver
                        .read_text(
                            driver,
                            &selectors::login::wrong_code_error(),
                            self.timings.short_wait_ms,
                        )
                        .await?
                        .unwrap_or_else(|| config::WRONG_CODE_TEXT.to_string());
                    self.log
                        .warn("2fa", &format!("attempt {attempt} rejected: {banner}"));
                }
                None => {
                    if let Some(attempts) = self.resolve_ambiguous(driver, attempt).await? {
                        return Ok(attempts);
                    }
                }
            }

            if attempt < max {
                self.log.debug(
                    "2fa",
                    &format!(
                        "pausing {}ms before requesting another code",
                        self.timings.two_fa_interval_ms
                    ),
                );
                pause(self.timings.two_fa_interval_ms).await;
            }
        }

        self.log
            .error("2fa", &format!("second factor failed after {max} attempts"));
        Err(CarteroError::TwoFactorExhausted { attempts: max })
    }

    /// Tie-break for an attempt that produced no signal at all.
    ///
    /// `Ok(Some(attempt))` means the attempt is treated as passed,
    /// `Ok(None)` means it is treated as failed and the loop continues.
    async fn resolve_ambiguous<D: PageDriver>(
        &self,
        driver: &D,
        attempt: u32,
    ) -> CarteroResult<Option<u32>> {
        let input_gone = self
            .resolver
            .wait_for_absence(
                driver,
                &selectors::login::challenge_input(),
                WaitOptions::scaled(self.timings.short_wait_ms),
            )
            .await?;
        match (self.ambiguity, input_gone) {
            (AmbiguityPolicy::AssumeSuccess, true) => {
                self.log.info(
                    "2fa",
                    "challenge input cleared with no error shown, assuming the code was accepted",
                );
                Ok(Some(attempt))
            }
            (AmbiguityPolicy::AssumeSuccess, false) => {
                self.log.warn(
                    "2fa",
                    &format!("attempt {attempt} produced no signal and the input is still present"),
                );
                Ok(None)
            }
            (AmbiguityPolicy::ReportUnknown, _) => Err(CarteroError::StateUnknown {
                context: "second-factor outcome never settled".to_string(),
            }),
        }
    }

    async fn await_challenge_signal<D: PageDriver>(
        &self,
        driver: &D,
        window_ms: u64,
    ) -> CarteroResult<Option<ChallengeSignal>> {
        let poll_ms = (window_ms / 10).max(1);
        let deadline = Instant::now() + Duration::from_millis(window_ms);
        loop {
            if self
                .resolver
                .any_visible(driver, &selectors::login::wrong_code_error())
                .await?
            {
                return Ok(Some(ChallengeSignal::WrongCode));
            }
            if let Some(reason) = self.refusal_reason(driver).await? {
                return Ok(Some(ChallengeSignal::Refused(reason)));
            }
            let url = driver.current_url().await?;
            if self.verifier.patterns().app_base.matches(&url) {
                return Ok(Some(ChallengeSignal::Passed));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            pause(poll_ms).await;
        }
    }

    /// Poll until the session settles inside the application.
    ///
    /// Each check declines the stay-signed-in prompt if present and fails
    /// fast on a late refusal. When every check passes without reaching the
    /// application address, a final bounded watch for an authenticated-only
    /// element decides between provisional success and an unknown state.
    async fn settle<D: PageDriver>(&self, driver: &D) -> CarteroResult<SessionState> {
        let probes = selectors::state_probes();
        for iteration in 1..=self.timings.settle_iterations {
            if let Some(decline) = self
                .resolver
                .first_visible(driver, &selectors::login::stay_signed_in_decline())
                .await?
            {
                self.log.debug("login", "declining the stay-signed-in prompt");
                if driver.click(&decline).await.is_err() {
                    self.log
                        .debug("login", "stay-signed-in decline was not clickable");
                }
            }
            if let Some(reason) = self.refusal_reason(driver).await? {
                self.log
                    .error("login", &format!("refused after submission: {reason}"));
                return Err(CarteroError::Rejection { reason });
            }
            let url = driver.current_url().await?;
            if self.verifier.patterns().app_base.matches(&url) {
                self.log.debug(
                    "login",
                    &format!("application address reached on settle check {iteration}"),
                );
                return self.verifier.current_state(driver, &probes).await;
            }
            pause(self.timings.settle_sleep_ms).await;
        }

        let resolver = self.resolver;
        let marker = &probes.authenticated_marker;
        let verified = probe_until(
            WaitOptions::scaled(self.timings.login_verification_ms),
            move || async move { resolver.any_visible(driver, marker).await },
        )
        .await?;
        if verified {
            self.log.warn(
                "login",
                "address never reached the application but an authenticated element is present",
            );
            return Ok(SessionState::Authenticated);
        }
        let url = driver.current_url().await?;
        self.log
            .error("login", &format!("session never settled, last address {url}"));
        Err(CarteroError::StateUnknown {
            context: format!(
                "post-authentication settle spent {} checks at {url}",
                self.timings.settle_iterations
            ),
        })
    }
}
