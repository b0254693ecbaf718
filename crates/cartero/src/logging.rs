//! Injected logging capability with redaction.
//!
//! Components receive a shared [`FlowLog`] at construction instead of
//! reaching for a global logger. Every recorded message passes through
//! [`Redactor`] first, so identities, one-time codes and secret-bearing
//! key/value pairs never land in a report in plaintext. Callers are still
//! expected to pass non-sensitive descriptors; redaction is the backstop.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Instant;

/// Replacement for standalone 6-digit runs
const CODE_MASK: &str = "***<redacted-code>***";

/// Sanitizes text before it reaches any log sink.
#[derive(Debug, Clone)]
pub struct Redactor {
    email: Regex,
    keyed: Regex,
    code: Regex,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Redactor {
    /// Compile the redaction patterns
    #[must_use]
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"([A-Za-z0-9._%+-])[A-Za-z0-9._%+-]*@([A-Za-z0-9.-]+\.[A-Za-z]{2,})")
                .unwrap(),
            keyed: Regex::new(r#"(?i)\b(password|token|secret|key)("?\s*[:=]\s*)"?([^"'\s,}]+)"#)
                .unwrap(),
            code: Regex::new(r"\b\d{6}\b").unwrap(),
        }
    }

    /// Redact identities, keyed secrets and one-time codes.
    ///
    /// Idempotent: redacting already-redacted text changes nothing.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let text = self.email.replace_all(text, "$1***@$2");
        let text = self.keyed.replace_all(&text, "$1$2***");
        let text = self.code.replace_all(&text, CODE_MASK);
        text.into_owned()
    }
}

/// Pure redaction entry point for one-off call sites and tests.
#[must_use]
pub fn redact(text: &str) -> String {
    Redactor::new().redact(text)
}

/// Severity of a recorded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug detail
    Debug,
    /// Step progress
    Info,
    /// Recoverable oddity (soft failures, missed corroboration)
    Warn,
    /// Terminal condition
    Error,
}

/// One recorded flow event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the log was created
    pub elapsed_ms: u64,
    /// Wall-clock timestamp
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Flow step the entry belongs to (e.g. "login", "2fa", "logout")
    pub step: String,
    /// Redacted message
    pub message: String,
}

/// Injected, bounded event recorder shared by the flow components.
#[derive(Debug)]
pub struct FlowLog {
    redactor: Redactor,
    start: Instant,
    max_entries: usize,
    entries: Mutex<Vec<LogEntry>>,
}

impl Default for FlowLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowLog {
    /// Create a new log with the default entry bound
    #[must_use]
    pub fn new() -> Self {
        Self {
            redactor: Redactor::new(),
            start: Instant::now(),
            max_entries: 10_000,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Bound the number of retained entries
    #[must_use]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Milliseconds since creation
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Record an entry; the message is redacted before storage.
    pub fn record(&self, level: LogLevel, step: &str, message: &str) {
        let message = self.redactor.redact(message);
        match level {
            LogLevel::Debug => tracing::debug!(step, "{message}"),
            LogLevel::Info => tracing::info!(step, "{message}"),
            LogLevel::Warn => tracing::warn!(step, "{message}"),
            LogLevel::Error => tracing::error!(step, "{message}"),
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.len() < self.max_entries {
            entries.push(LogEntry {
                elapsed_ms: self.elapsed_ms(),
                timestamp: Utc::now(),
                level,
                step: step.to_string(),
                message,
            });
        }
    }

    /// Record debug detail
    pub fn debug(&self, step: &str, message: &str) {
        self.record(LogLevel::Debug, step, message);
    }

    /// Record step progress
    pub fn info(&self, step: &str, message: &str) {
        self.record(LogLevel::Info, step, message);
    }

    /// Record a recoverable oddity
    pub fn warn(&self, step: &str, message: &str) {
        self.record(LogLevel::Warn, step, message);
    }

    /// Record a terminal condition
    pub fn error(&self, step: &str, message: &str) {
        self.record(LogLevel::Error, step, message);
    }

    /// Snapshot of recorded entries
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent error-level message, if any
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .rev()
            .find(|e| e.level == LogLevel::Error)
            .map(|e| e.message.clone())
    }

    /// Whether any entry's message contains the needle
    #[must_use]
    pub fn contains_message(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|e| e.message.contains(needle))
    }
}

/// Initialize a tracing subscriber from `RUST_LOG` for binaries and tests.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
