//! Bounded waiting primitives.
//!
//! Every wait in the harness carries an explicit timeout; expiry is an
//! ordinary outcome for probing helpers and an error only for the final
//! bounded check in a sequence.

use crate::result::{CarteroError, CarteroResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Default wait timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Options for wait operations
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Maximum time to wait in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create options with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Options for a window, polling at a tenth of the timeout.
    ///
    /// Keeps short test windows responsive and long live-site windows cheap.
    #[must_use]
    pub const fn scaled(timeout_ms: u64) -> Self {
        let poll = timeout_ms / 10;
        Self {
            timeout_ms,
            poll_interval_ms: if poll == 0 { 1 } else { poll },
        }
    }
}

/// Result of a completed wait
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Whether the condition was met
    pub success: bool,
    /// Time elapsed while waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
}

/// Poll an async probe until it reports true or the timeout expires.
///
/// Returns `Timeout { ms }` on expiry; probe errors propagate immediately.
pub async fn wait_until<F, Fut>(
    description: &str,
    options: WaitOptions,
    mut probe: F,
) -> CarteroResult<WaitResult>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CarteroResult<bool>>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(options.timeout_ms);
    let poll = Duration::from_millis(options.poll_interval_ms);

    loop {
        if probe().await? {
            return Ok(WaitResult {
                success: true,
                elapsed: start.elapsed(),
                waited_for: description.to_string(),
            });
        }
        if start.elapsed() >= timeout {
            return Err(CarteroError::Timeout {
                ms: options.timeout_ms,
            });
        }
        tokio::time::sleep(poll).await;
    }
}

/// Like [`wait_until`], but expiry yields `Ok(false)` instead of an error.
///
/// Used where "not yet" is a normal branching signal rather than a failure.
pub async fn probe_until<F, Fut>(options: WaitOptions, probe: F) -> CarteroResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CarteroResult<bool>>,
{
    match wait_until("probe", options, probe).await {
        Ok(result) => Ok(result.success),
        Err(CarteroError::Timeout { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Fixed sleep for settle intervals and retry back-off.
pub async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Randomized pause within `[min_ms, max_ms]` to pace form interactions.
pub async fn pacing_pause(min_ms: u64, max_ms: u64) {
    let ms = if max_ms > min_ms {
        rand::Rng::gen_range(&mut rand::thread_rng(), min_ms..=max_ms)
    } else {
        min_ms
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_default() {
            let options = WaitOptions::default();
            assert_eq!(options.timeout_ms, DEFAULT_TIMEOUT_MS);
            assert_eq!(options.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_builders() {
            let options = WaitOptions::new()
                .with_timeout_ms(250)
                .with_poll_interval_ms(10);
            assert_eq!(options.timeout_ms, 250);
            assert_eq!(options.poll_interval_ms, 10);
        }

        #[test]
        fn test_scaled_polls_at_a_tenth() {
            let options = WaitOptions::scaled(500);
            assert_eq!(options.timeout_ms, 500);
            assert_eq!(options.poll_interval_ms, 50);
        }

        #[test]
        fn test_scaled_never_polls_at_zero() {
            assert_eq!(WaitOptions::scaled(5).poll_interval_ms, 1);
            assert_eq!(WaitOptions::scaled(0).poll_interval_ms, 1);
        }
    }

    mod wait_until_tests {
        use super::*;

        #[tokio::test]
        async fn test_immediate_success() {
            let result = wait_until("ready", WaitOptions::default(), || async { Ok(true) })
                .await
                .unwrap();
            assert!(result.success);
            assert_eq!(result.waited_for, "ready");
        }

        #[tokio::test]
        async fn test_success_after_polls() {
            let calls = AtomicU32::new(0);
            let calls = &calls;
            let options = WaitOptions::new().with_timeout_ms(500).with_poll_interval_ms(5);
            let result = wait_until("third time", options, move || async move {
                Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
            })
            .await
            .unwrap();
            assert!(result.success);
            assert!(calls.load(Ordering::SeqCst) >= 3);
        }

        #[tokio::test]
        async fn test_timeout() {
            let options = WaitOptions::new().with_timeout_ms(30).with_poll_interval_ms(5);
            let err = wait_until("never", options, || async { Ok(false) })
                .await
                .unwrap_err();
            assert!(matches!(err, CarteroError::Timeout { ms: 30 }));
        }

        #[tokio::test]
        async fn test_probe_error_propagates() {
            let options = WaitOptions::new().with_timeout_ms(100).with_poll_interval_ms(5);
            let err = wait_until("broken", options, || async {
                Err(CarteroError::DriverError {
                    message: "gone".to_string(),
                })
            })
            .await
            .unwrap_err();
            assert!(matches!(err, CarteroError::DriverError { .. }));
        }
    }

    mod probe_until_tests {
        use super::*;

        #[tokio::test]
        async fn test_expiry_is_false_not_error() {
            let options = WaitOptions::new().with_timeout_ms(20).with_poll_interval_ms(5);
            let found = probe_until(options, || async { Ok(false) }).await.unwrap();
            assert!(!found);
        }

        #[tokio::test]
        async fn test_success_is_true() {
            let found = probe_until(WaitOptions::default(), || async { Ok(true) })
                .await
                .unwrap();
            assert!(found);
        }
    }

    mod pause_tests {
        use super::*;

        #[tokio::test]
        async fn test_pause_sleeps() {
            let start = Instant::now();
            pause(20).await;
            assert!(start.elapsed() >= Duration::from_millis(20));
        }

        #[tokio::test]
        async fn test_pacing_pause_bounded() {
            let start = Instant::now();
            pacing_pause(5, 15).await;
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(5));
        }

        #[tokio::test]
        async fn test_pacing_pause_degenerate_range() {
            pacing_pause(5, 5).await;
        }
    }
}
