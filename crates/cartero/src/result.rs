//! Result and error types for Cartero.

use thiserror::Error;

/// Result type for Cartero operations
pub type CarteroResult<T> = Result<T, CarteroError>;

/// Errors that can occur in Cartero
#[derive(Debug, Error)]
pub enum CarteroError {
    /// The identity provider actively blocked the session
    #[error("Sign-in rejected: {reason}")]
    Rejection {
        /// Provider-visible reason
        reason: String,
    },

    /// Two-factor retries spent without reaching the inbox
    #[error("Two-factor verification failed after {attempts} attempts")]
    TwoFactorExhausted {
        /// Attempts performed
        attempts: u32,
    },

    /// One-time-code generation attempts spent
    #[error("Code generation failed after {attempts} attempts: {message}")]
    OtpGeneration {
        /// Attempts performed
        attempts: u32,
        /// Last generation error
        message: String,
    },

    /// Caller violated a precondition (e.g. 2FA challenge with no seed supplied)
    #[error("Contract violation: {message}")]
    ContractViolation {
        /// What the caller got wrong
        message: String,
    },

    /// Session state could not be classified under the pessimistic policy
    #[error("Session state unknown: {context}")]
    StateUnknown {
        /// Where classification gave up
        context: String,
    },

    /// A scenario check failed (unconfirmed send, bounced delivery, lingering session)
    #[error("Verification failed: {message}")]
    VerificationFailed {
        /// What the check observed
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Browser driver error
    #[error("Driver error: {message}")]
    DriverError {
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    ScreenshotError {
        /// Error message
        message: String,
    },

    /// Configuration or test-data error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CarteroError {
    /// True for conditions that terminate a scenario (no retry layer may absorb them)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejection { .. }
                | Self::TwoFactorExhausted { .. }
                | Self::OtpGeneration { .. }
                | Self::ContractViolation { .. }
        )
    }
}
