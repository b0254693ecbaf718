//! One-time code generation via an external authenticator.
//!
//! Codes come from shelling out to a TOTP generator with the account seed
//! and parsing its `Token: NNNNNN` output. A code that is not exactly six
//! ASCII digits is a generation failure and is never forwarded to the
//! challenge form; the retry wrapper re-runs generation failures only,
//! never server-side code rejection (that lives a layer up).

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::result::{CarteroError, CarteroResult};
use crate::wait::pause;

/// Digits in a valid one-time code
pub const CODE_DIGITS: usize = 6;

/// Default generator binary
pub const DEFAULT_OTP_PROGRAM: &str = "authenticator";

/// Line prefix the generator prints before the code
pub const TOKEN_LINE_PREFIX: &str = "Token:";

/// Default delay between generation attempts in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default number of generation attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Whether a candidate code is exactly six ASCII digits.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// Extract the code from generator stdout.
///
/// The first `Token:` line decides the outcome; a malformed value on that
/// line is a failure, not a fall-through to later lines. Error messages
/// carry the length of the bad value, never the value itself.
pub fn parse_code_output(stdout: &str) -> CarteroResult<String> {
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix(TOKEN_LINE_PREFIX) {
            let code = rest.trim();
            if is_valid_code(code) {
                return Ok(code.to_string());
            }
            return Err(CarteroError::OtpGeneration {
                attempts: 1,
                message: format!("generator produced a {}-character code", code.len()),
            });
        }
    }
    Err(CarteroError::OtpGeneration {
        attempts: 1,
        message: "no code line in generator output".to_string(),
    })
}

/// A generated code plus the attempts it took.
#[derive(Clone)]
pub struct OtpOutcome {
    /// The six-digit code
    pub code: String,
    /// Generation attempts performed
    pub attempts: u32,
}

// The code never appears in debug output; reports and logs format
// outcomes through this.
impl std::fmt::Debug for OtpOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpOutcome")
            .field("code", &"******")
            .field("attempts", &self.attempts)
            .finish()
    }
}

/// Source of one-time codes.
#[async_trait]
pub trait OtpProvider: Send + Sync {
    /// Produce one code candidate for the account seed.
    async fn generate(&self, seed: &str) -> CarteroResult<String>;
}

// Lets a test keep a handle on a provider after moving it into a flow.
#[async_trait]
impl<P: OtpProvider> OtpProvider for std::sync::Arc<P> {
    async fn generate(&self, seed: &str) -> CarteroResult<String> {
        P::generate(self, seed).await
    }
}

/// Provider that shells out to an external generator command.
#[derive(Debug, Clone)]
pub struct CommandOtpProvider {
    program: String,
}

impl Default for CommandOtpProvider {
    fn default() -> Self {
        Self {
            program: DEFAULT_OTP_PROGRAM.to_string(),
        }
    }
}

impl CommandOtpProvider {
    /// Create a provider using the default generator binary
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different generator binary
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Build generator arguments for a seed.
    ///
    /// The seed is passed as a single argument, no shell involved, so
    /// embedded spaces survive verbatim.
    #[must_use]
    pub fn build_args(seed: &str) -> Vec<String> {
        vec!["--key".to_string(), seed.to_string()]
    }
}

#[async_trait]
impl OtpProvider for CommandOtpProvider {
    async fn generate(&self, seed: &str) -> CarteroResult<String> {
        let output = tokio::process::Command::new(&self.program)
            .args(Self::build_args(seed))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CarteroError::OtpGeneration {
                attempts: 1,
                message: format!("failed to execute {}: {e}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CarteroError::OtpGeneration {
                attempts: 1,
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_code_output(&stdout)
    }
}

/// Validating retry wrapper around a provider.
///
/// Every code passes the six-digit check here regardless of provider, so a
/// misbehaving generator can never push a malformed value toward the UI.
#[derive(Debug)]
pub struct OtpClient<P> {
    provider: P,
    retry_delay_ms: u64,
}

impl<P: OtpProvider> OtpClient<P> {
    /// Wrap a provider with the default inter-attempt delay
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    /// Override the delay between generation attempts
    #[must_use]
    pub const fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// One validated generation attempt.
    pub async fn generate(&self, seed: &str) -> CarteroResult<String> {
        let code = self.provider.generate(seed).await?;
        if is_valid_code(&code) {
            Ok(code)
        } else {
            Err(CarteroError::OtpGeneration {
                attempts: 1,
                message: format!("provider returned a {}-character code", code.len()),
            })
        }
    }

    /// Generate with bounded retries of generation failures only.
    ///
    /// The fixed delay runs between attempts, not after the last one.
    /// Errors other than generation failures propagate immediately.
    pub async fn generate_with_retry(
        &self,
        seed: &str,
        max_attempts: u32,
    ) -> CarteroResult<OtpOutcome> {
        let mut last_message = "no attempts were made".to_string();
        for attempt in 1..=max_attempts {
            match self.generate(seed).await {
                Ok(code) => {
                    return Ok(OtpOutcome {
                        code,
                        attempts: attempt,
                    })
                }
                Err(CarteroError::OtpGeneration { message, .. }) => {
                    last_message = message;
                    if attempt < max_attempts {
                        pause(self.retry_delay_ms).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(CarteroError::OtpGeneration {
            attempts: max_attempts,
            message: last_message,
        })
    }
}

/// Scripted provider for tests: replays queued results in order.
///
/// An exhausted queue is a generation failure, which catches flows that
/// request more codes than the scenario scripted.
#[derive(Debug, Default)]
pub struct MockOtpProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    seeds: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl MockOtpProvider {
    /// Create a provider with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a code to return
    pub fn push_code(&self, code: &str) {
        self.lock_script().push_back(Ok(code.to_string()));
    }

    /// Queue a generation failure
    pub fn push_failure(&self, message: &str) {
        self.lock_script().push_back(Err(message.to_string()));
    }

    /// Number of generation calls made
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Seeds passed to each call, in order
    #[must_use]
    pub fn seeds(&self) -> Vec<String> {
        self.seeds
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl OtpProvider for MockOtpProvider {
    async fn generate(&self, seed: &str) -> CarteroResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seeds
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(seed.to_string());
        match self.lock_script().pop_front() {
            Some(Ok(code)) => Ok(code),
            Some(Err(message)) => Err(CarteroError::OtpGeneration {
                attempts: 1,
                message,
            }),
            None => Err(CarteroError::OtpGeneration {
                attempts: 1,
                message: "no scripted codes remain".to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod format_tests {
        use super::*;

        #[test]
        fn test_six_digits_valid() {
            assert!(is_valid_code("123456"));
            assert!(is_valid_code("000000"));
        }

        #[test]
        fn test_wrong_length_invalid() {
            assert!(!is_valid_code("12345"));
            assert!(!is_valid_code("1234567"));
            assert!(!is_valid_code(""));
        }

        #[test]
        fn test_non_digits_invalid() {
            assert!(!is_valid_code("12345a"));
            assert!(!is_valid_code("12 456"));
        }

        #[test]
        fn test_non_ascii_digits_invalid() {
            assert!(!is_valid_code("١٢٣٤٥٦"));
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parses_token_line() {
            let out = "Some banner\nToken: 123456\n";
            assert_eq!(parse_code_output(out).unwrap(), "123456");
        }

        #[test]
        fn test_token_line_without_space() {
            assert_eq!(parse_code_output("Token:654321").unwrap(), "654321");
        }

        #[test]
        fn test_malformed_code_is_failure() {
            let err = parse_code_output("Token: 1234567").unwrap_err();
            match err {
                CarteroError::OtpGeneration { message, .. } => {
                    assert!(message.contains("7-character"));
                    assert!(!message.contains("1234567"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_first_token_line_decides() {
            // A bad first line is not skipped in favor of a later good one.
            let out = "Token: abc\nToken: 123456\n";
            assert!(parse_code_output(out).is_err());
        }

        #[test]
        fn test_missing_token_line() {
            let err = parse_code_output("nothing useful\n").unwrap_err();
            assert!(err.to_string().contains("no code line"));
        }
    }

    mod command_tests {
        use super::*;

        #[test]
        fn test_build_args_passes_seed_verbatim() {
            let args = CommandOtpProvider::build_args("abcd efgh ijkl");
            assert_eq!(args, vec!["--key".to_string(), "abcd efgh ijkl".to_string()]);
        }

        #[tokio::test]
        async fn test_missing_binary_is_generation_failure() {
            let provider = CommandOtpProvider::with_program("/nonexistent/otp-generator");
            let err = provider.generate("seed").await.unwrap_err();
            match err {
                CarteroError::OtpGeneration { message, .. } => {
                    assert!(message.contains("failed to execute"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    mod client_tests {
        use super::*;

        fn fast_client(provider: MockOtpProvider) -> OtpClient<MockOtpProvider> {
            OtpClient::new(provider).with_retry_delay_ms(1)
        }

        #[tokio::test]
        async fn test_success_first_attempt() {
            let provider = MockOtpProvider::new();
            provider.push_code("123456");
            let client = fast_client(provider);
            let outcome = client.generate_with_retry("seed", 3).await.unwrap();
            assert_eq!(outcome.code, "123456");
            assert_eq!(outcome.attempts, 1);
        }

        #[tokio::test]
        async fn test_retries_generation_failures() {
            let provider = MockOtpProvider::new();
            provider.push_failure("generator busy");
            provider.push_failure("generator busy");
            provider.push_code("222333");
            let client = fast_client(provider);
            let outcome = client.generate_with_retry("seed", 3).await.unwrap();
            assert_eq!(outcome.code, "222333");
            assert_eq!(outcome.attempts, 3);
        }

        #[tokio::test]
        async fn test_exhaustion_carries_last_message() {
            let provider = MockOtpProvider::new();
            provider.push_failure("first");
            provider.push_failure("second");
            provider.push_failure("third");
            let client = fast_client(provider);
            let err = client.generate_with_retry("seed", 3).await.unwrap_err();
            match err {
                CarteroError::OtpGeneration { attempts, message } => {
                    assert_eq!(attempts, 3);
                    assert_eq!(message, "third");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_malformed_code_is_retried_not_forwarded() {
            let provider = MockOtpProvider::new();
            provider.push_code("12345");
            provider.push_code("678901");
            let client = fast_client(provider);
            let outcome = client.generate_with_retry("seed", 3).await.unwrap();
            assert_eq!(outcome.code, "678901");
            assert_eq!(outcome.attempts, 2);
        }

        #[tokio::test]
        async fn test_seed_reaches_provider_once_per_attempt() {
            let provider = MockOtpProvider::new();
            provider.push_failure("busy");
            provider.push_code("445566");
            let client = fast_client(provider);
            client.generate_with_retry("abcd efgh", 3).await.unwrap();
            let seeds = client.provider.seeds();
            assert_eq!(seeds, vec!["abcd efgh".to_string(), "abcd efgh".to_string()]);
        }

        #[tokio::test]
        async fn test_zero_attempts_is_failure() {
            let client = fast_client(MockOtpProvider::new());
            let err = client.generate_with_retry("seed", 0).await.unwrap_err();
            assert!(matches!(
                err,
                CarteroError::OtpGeneration { attempts: 0, .. }
            ));
        }

        #[tokio::test]
        async fn test_non_generation_errors_propagate() {
            struct BrokenProvider;

            #[async_trait]
            impl OtpProvider for BrokenProvider {
                async fn generate(&self, _seed: &str) -> CarteroResult<String> {
                    Err(CarteroError::DriverError {
                        message: "session gone".to_string(),
                    })
                }
            }

            let client = OtpClient::new(BrokenProvider).with_retry_delay_ms(1);
            let err = client.generate_with_retry("seed", 3).await.unwrap_err();
            assert!(matches!(err, CarteroError::DriverError { .. }));
        }

        #[test]
        fn test_outcome_debug_masks_code() {
            let outcome = OtpOutcome {
                code: "123456".to_string(),
                attempts: 2,
            };
            let rendered = format!("{outcome:?}");
            assert!(!rendered.contains("123456"));
            assert!(rendered.contains("attempts: 2"));
        }

        #[tokio::test]
        async fn test_shared_provider_handle_observes_calls() {
            let provider = std::sync::Arc::new(MockOtpProvider::new());
            provider.push_code("123456");
            let client = OtpClient::new(std::sync::Arc::clone(&provider));
            client.generate("seed").await.unwrap();
            assert_eq!(provider.calls(), 1);
        }
    }
}
