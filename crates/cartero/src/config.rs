//! Harness configuration, timing profiles and test fixture data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::result::{CarteroError, CarteroResult};

/// Webmail application base address
pub const MAIL_BASE_URL: &str = "https://mail.google.com";

/// Direct inbox address
pub const INBOX_URL: &str = "https://mail.google.com/mail/u/0/#inbox";

/// Sign-in provider base address
pub const AUTH_BASE_URL: &str = "https://accounts.google.com";

/// Sign-in entry address
pub const SIGNIN_URL: &str = "https://accounts.google.com/signin";

/// Direct sign-out address, the logout strategy of last resort
pub const LOGOUT_URL: &str = "https://accounts.google.com/logout";

/// Neutral page navigated to after session teardown
pub const BLANK_URL: &str = "about:blank";

/// Host fragment identifying the sign-in provider
pub const AUTH_HOST: &str = "accounts.google.com";

/// Address marker the provider uses for refused attempts
pub const REJECTED_URL_MARKER: &str = "rejected";

/// Wrong-code banner text on the challenge form
pub const WRONG_CODE_TEXT: &str = "Wrong code. Try again.";

/// Disabled-account heading text
pub const ACCOUNT_DISABLED_TEXT: &str = "Account disabled";

/// Validation text shown when sending with no recipient
pub const RECIPIENT_REQUIRED_TEXT: &str = "Please specify at least one recipient.";

/// Subject-line markers of a bounced send, scanned for in the inbox
pub const DELIVERY_FAILURE_MARKERS: [&str; 5] = [
    "Address not found",
    "delivery failed",
    "undelivered",
    "couldn't be delivered",
    "Mail Delivery Subsystem",
];

/// Wait and pacing profile for a session.
///
/// The defaults mirror live-site behavior. [`Timings::fast`] compresses
/// every window for scripted-driver tests; the attempt counts stay the
/// same so retry logic is exercised identically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timings {
    /// Default element wait in milliseconds
    pub element_wait_ms: u64,
    /// Short wait for textual reads such as error banners
    pub short_wait_ms: u64,
    /// Wait before re-requesting a code so a fresh window opens
    pub two_fa_interval_ms: u64,
    /// Post-auth settle poll iterations
    pub settle_iterations: u32,
    /// Sleep between settle polls in milliseconds
    pub settle_sleep_ms: u64,
    /// Final watch for an authenticated element when the address never
    /// settles
    pub login_verification_ms: u64,
    /// Extended wait when a challenge outcome is ambiguous
    pub ambiguous_extension_ms: u64,
    /// Delay between code generation attempts in milliseconds
    pub otp_retry_delay_ms: u64,
    /// Maximum code generation attempts
    pub otp_max_attempts: u32,
    /// Maximum challenge submission attempts
    pub two_fa_max_attempts: u32,
    /// Lower bound of the form-interaction pacing jitter
    pub pacing_min_ms: u64,
    /// Upper bound of the form-interaction pacing jitter
    pub pacing_max_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            element_wait_ms: 5000,
            short_wait_ms: 2000,
            two_fa_interval_ms: 30_000,
            settle_iterations: 10,
            settle_sleep_ms: 1000,
            login_verification_ms: 15_000,
            ambiguous_extension_ms: 5000,
            otp_retry_delay_ms: 1000,
            otp_max_attempts: 3,
            two_fa_max_attempts: 3,
            pacing_min_ms: 200,
            pacing_max_ms: 500,
        }
    }
}

impl Timings {
    /// Compressed profile for mock-driver tests
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            element_wait_ms: 50,
            short_wait_ms: 20,
            two_fa_interval_ms: 5,
            settle_iterations: 3,
            settle_sleep_ms: 5,
            login_verification_ms: 40,
            ambiguous_extension_ms: 20,
            otp_retry_delay_ms: 1,
            otp_max_attempts: 3,
            two_fa_max_attempts: 3,
            pacing_min_ms: 0,
            pacing_max_ms: 0,
        }
    }
}

/// How an unresolvable challenge outcome is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbiguityPolicy {
    /// Assume the challenge passed when no negative signal materializes
    /// after the extended wait and the challenge input is gone.
    #[default]
    AssumeSuccess,
    /// Surface the ambiguity as an unknown-state failure for manual review.
    ReportUnknown,
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Application base address
    pub base_url: String,
    /// Timing profile
    pub timings: Timings,
    /// Ambiguous-outcome policy
    pub ambiguity: AmbiguityPolicy,
    /// Directory for failure screenshots; `None` disables capture
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: MAIL_BASE_URL.to_string(),
            timings: Timings::default(),
            ambiguity: AmbiguityPolicy::default(),
            screenshot_dir: Some(PathBuf::from("test-results/screenshots")),
        }
    }
}

impl HarnessConfig {
    /// Create a configuration with live-site defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compressed profile for scripted-driver tests, screenshots off
    #[must_use]
    pub fn fast() -> Self {
        Self {
            timings: Timings::fast(),
            screenshot_dir: None,
            ..Self::default()
        }
    }

    /// Override the application base address
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the timing profile
    #[must_use]
    pub const fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Override the ambiguous-outcome policy
    #[must_use]
    pub const fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// Set the failure screenshot directory
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    /// Disable failure screenshots
    #[must_use]
    pub fn without_screenshots(mut self) -> Self {
        self.screenshot_dir = None;
        self
    }
}

/// Stored account record for a scenario.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Sign-in identity (an email address)
    pub identity: String,
    /// Account secret
    pub secret: String,
    /// TOTP seed; absent means the account has no second factor
    pub totp_seed: Option<String>,
}

// Secrets never reach debug output.
impl std::fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRecord")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .field("totp_seed", &self.totp_seed.as_deref().map(|_| "***"))
            .finish()
    }
}

impl AccountRecord {
    /// Check the record is usable before a flow starts.
    ///
    /// The identity must look like an email address and the secret must be
    /// non-empty. A missing TOTP seed is valid here; whether one is needed
    /// depends on the account, and the login flow enforces that.
    pub fn validate(&self) -> CarteroResult<()> {
        if self.secret.is_empty() {
            return Err(CarteroError::ConfigError {
                message: format!("account {} has an empty secret", self.identity),
            });
        }
        let email = regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
        if !email.is_match(&self.identity) {
            return Err(CarteroError::ConfigError {
                message: format!("identity {} is not an email address", self.identity),
            });
        }
        Ok(())
    }
}

/// Email payload for a compose scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    /// Recipient address
    pub recipient: String,
    /// Subject line
    pub subject: String,
    /// Body text
    pub body: String,
}

impl EmailPayload {
    /// A unique throwaway payload for send-and-verify scenarios.
    #[must_use]
    pub fn generated() -> Self {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        Self {
            recipient: format!("test-{}@example.com", &tag[..8]),
            subject: format!("Automated test {}", &tag[..8]),
            body: format!(
                "This message was generated at {}.",
                chrono::Utc::now().to_rfc3339()
            ),
        }
    }
}

/// Fixture data loaded from a JSON file.
///
/// Accounts and email payloads are keyed by scenario name, so one file
/// serves every test ("valid", "invalid", "smoke", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    /// Accounts by scenario key
    pub accounts: HashMap<String, AccountRecord>,
    /// Email payloads by scenario key
    #[serde(default)]
    pub emails: HashMap<String, EmailPayload>,
}

impl TestData {
    /// Parse fixture data from a JSON string
    pub fn from_json(json: &str) -> CarteroResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load fixture data from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> CarteroResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Look up an account by scenario key
    pub fn account(&self, key: &str) -> CarteroResult<&AccountRecord> {
        self.accounts.get(key).ok_or_else(|| CarteroError::ConfigError {
            message: format!("no account named {key} in fixture data"),
        })
    }

    /// Look up an email payload by scenario key
    pub fn email(&self, key: &str) -> CarteroResult<&EmailPayload> {
        self.emails.get(key).ok_or_else(|| CarteroError::ConfigError {
            message: format!("no email payload named {key} in fixture data"),
        })
    }
}
