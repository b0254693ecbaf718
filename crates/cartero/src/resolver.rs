//! Ordered fallback resolution of locator sets.
//!
//! The resolver is the single place that turns a [`LocatorSet`] into a
//! concrete element: candidates are tried strictly in declaration order,
//! each with its own timeout budget, and the first visible match wins.
//! Absence is a normal outcome (`Ok(None)`), never an error; callers
//! branch on it to pick fallback paths or to read it as a state signal.

use crate::driver::{ElementHandle, PageDriver};
use crate::locator::{LocatorSet, Selector, DEFAULT_CANDIDATE_TIMEOUT_MS};
use crate::result::{CarteroError, CarteroResult};
use crate::wait::{probe_until, WaitOptions};
use std::time::Duration;

/// A candidate that resolved to a visible element
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    /// The selector that matched
    pub selector: Selector,
    /// Index of the matching candidate within the set
    pub candidate_index: usize,
    /// Handle returned by the driver
    pub handle: ElementHandle,
}

/// Resolves locator sets against a live driver
#[derive(Debug, Clone, Copy)]
pub struct ElementResolver {
    default_candidate_timeout_ms: u64,
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self {
            default_candidate_timeout_ms: DEFAULT_CANDIDATE_TIMEOUT_MS,
        }
    }
}

impl ElementResolver {
    /// Create a resolver with the default per-candidate budget
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the default per-candidate timeout
    #[must_use]
    pub const fn with_candidate_timeout_ms(mut self, ms: u64) -> Self {
        self.default_candidate_timeout_ms = ms;
        self
    }

    /// Default per-candidate timeout in milliseconds
    #[must_use]
    pub const fn candidate_timeout_ms(&self) -> u64 {
        self.default_candidate_timeout_ms
    }

    /// Resolve a set to its first visible candidate.
    ///
    /// Short-circuits on the first match; remaining candidates are never
    /// probed. Returns `Ok(None)` when no candidate becomes visible within
    /// the sum of the individual budgets.
    pub async fn resolve<D: PageDriver>(
        &self,
        driver: &D,
        set: &LocatorSet,
    ) -> CarteroResult<Option<ResolvedElement>> {
        for (index, locator) in set.candidates().iter().enumerate() {
            let timeout =
                Duration::from_millis(locator.timeout_or(self.default_candidate_timeout_ms));
            match driver.wait_for_selector(locator.selector(), timeout).await {
                Ok(handle) => {
                    return Ok(Some(ResolvedElement {
                        selector: locator.selector().clone(),
                        candidate_index: index,
                        handle,
                    }));
                }
                Err(CarteroError::Timeout { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Resolve a set whose absence is a fault, not a signal.
    ///
    /// Same semantics as [`resolve`](Self::resolve), but `None` becomes a
    /// driver error naming the target and the budget spent looking for it.
    pub async fn require<D: PageDriver>(
        &self,
        driver: &D,
        set: &LocatorSet,
    ) -> CarteroResult<ResolvedElement> {
        match self.resolve(driver, set).await? {
            Some(resolved) => Ok(resolved),
            None => Err(CarteroError::DriverError {
                message: format!(
                    "{} not found within {}ms",
                    set.name(),
                    set.total_budget_ms(self.default_candidate_timeout_ms)
                ),
            }),
        }
    }

    /// Immediate scan: first candidate visible right now, without waiting.
    pub async fn first_visible<D: PageDriver>(
        &self,
        driver: &D,
        set: &LocatorSet,
    ) -> CarteroResult<Option<Selector>> {
        for locator in set.candidates() {
            if driver.is_visible(locator.selector()).await? {
                return Ok(Some(locator.selector().clone()));
            }
        }
        Ok(None)
    }

    /// Whether any candidate is visible right now.
    pub async fn any_visible<D: PageDriver>(
        &self,
        driver: &D,
        set: &LocatorSet,
    ) -> CarteroResult<bool> {
        Ok(self.first_visible(driver, set).await?.is_some())
    }

    /// Wait until every candidate in the set is gone.
    ///
    /// Returns `Ok(true)` once all candidates are invisible, `Ok(false)` if
    /// any is still visible when the window closes. Used by the ambiguous
    /// tie-break ("challenge input no longer present").
    pub async fn wait_for_absence<D: PageDriver>(
        &self,
        driver: &D,
        set: &LocatorSet,
        options: WaitOptions,
    ) -> CarteroResult<bool> {
        probe_until(options, move || async move {
            for locator in set.candidates() {
                if driver.is_visible(locator.selector()).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
        .await
    }

    /// Read the first non-empty text among the set's candidates within a
    /// bounded wait, `None` when nothing materializes.
    pub async fn read_text<D: PageDriver>(
        &self,
        driver: &D,
        set: &LocatorSet,
        timeout_ms: u64,
    ) -> CarteroResult<Option<String>> {
        let per_candidate =
            Duration::from_millis(timeout_ms / set.len() as u64);
        for locator in set.candidates() {
            match driver
                .wait_for_selector(locator.selector(), per_candidate)
                .await
            {
                Ok(_) => {
                    if let Some(text) = driver.inner_text(locator.selector()).await? {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            return Ok(Some(trimmed.to_string()));
                        }
                    }
                }
                Err(CarteroError::Timeout { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
