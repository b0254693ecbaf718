//! Session state inference.
//!
//! The webmail UI exposes no single authoritative "signed in" signal, so
//! state is re-derived on every check from the current address plus element
//! visibility, reconciled through a fixed precedence order. The precedence
//! lives in the pure [`classify`] function over a [`StateSignals`] snapshot;
//! the async [`StateVerifier`] only gathers the snapshot and runs the
//! secondary corroboration wait for address-only evidence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::driver::PageDriver;
use crate::locator::LocatorSet;
use crate::logging::FlowLog;
use crate::resolver::ElementResolver;
use crate::result::CarteroResult;
use crate::wait::{probe_until, WaitOptions};

/// Coarse session state, re-derived on demand and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No evidence of an active session; typically still on the sign-in
    /// provider.
    Unauthenticated,
    /// Credentials were submitted and the outcome is still unresolved.
    ///
    /// Never produced by [`classify`]; the login machine uses it to label
    /// its own progress between submission and a settled classification.
    CredentialsSubmitted,
    /// A second-factor challenge input is on screen.
    ChallengePending,
    /// The session reached the application, possibly provisionally when the
    /// address matched but no corroborating element appeared in time.
    Authenticated,
    /// The provider explicitly refused the sign-in. Terminal.
    Rejected,
    /// Signals were contradictory or absent. Callers log and continue
    /// rather than abort.
    Unknown,
}

impl SessionState {
    /// Terminal refusal no retry can recover from.
    #[must_use]
    pub const fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Whether the session reached the application.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::CredentialsSubmitted => "credentials-submitted",
            Self::ChallengePending => "challenge-pending",
            Self::Authenticated => "authenticated",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Pattern for matching page addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact address match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Match any address
    Any,
}

impl UrlPattern {
    /// Check if an address matches this pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(pattern) => url == pattern,
            Self::Prefix(pattern) => url.starts_with(pattern),
            Self::Contains(pattern) => url.contains(pattern),
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(s) | Self::Prefix(s) | Self::Contains(s) | Self::Regex(s) => {
                write!(f, "{s}")
            }
            Self::Any => write!(f, "*"),
        }
    }
}

/// Address patterns that anchor classification for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePatterns {
    /// Authenticated application base, matched from the start of the
    /// address.
    pub app_base: UrlPattern,
    /// Sign-in provider host shown while signed out.
    pub auth_provider: UrlPattern,
    /// Marker the provider puts in the address of a refused attempt.
    pub rejected_marker: UrlPattern,
}

impl Default for StatePatterns {
    fn default() -> Self {
        Self {
            // Anchored at the scheme: provider addresses echo the mailbox
            // host in their continue parameter.
            app_base: UrlPattern::Prefix(config::MAIL_BASE_URL.to_string()),
            auth_provider: UrlPattern::Contains(config::AUTH_HOST.to_string()),
            rejected_marker: UrlPattern::Contains(config::REJECTED_URL_MARKER.to_string()),
        }
    }
}

/// The locator sets probed when gathering a [`StateSignals`] snapshot.
#[derive(Debug, Clone)]
pub struct StateProbes {
    /// Any rejection indicator (error banner, disabled-account copy).
    pub rejection: LocatorSet,
    /// Second-factor challenge input.
    pub challenge_input: LocatorSet,
    /// Element only rendered inside the authenticated application.
    pub authenticated_marker: LocatorSet,
}

/// One observation of the signals [`classify`] reconciles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSignals {
    /// Address reported by the page at observation time.
    pub current_url: String,
    /// A rejection indicator is on screen.
    pub rejection_visible: bool,
    /// A second-factor challenge input is on screen.
    pub challenge_input_visible: bool,
    /// An authenticated-only element is on screen.
    pub app_marker_visible: bool,
}

/// Reconcile one snapshot of signals into a [`SessionState`].
///
/// Precedence when signals conflict:
/// 1. rejection indicators (address marker or on-screen copy), terminal;
/// 2. a visible challenge input, regardless of address;
/// 3. an address on the application base, corroborated or not;
/// 4. an address still on the sign-in provider;
/// 5. otherwise [`SessionState::Unknown`].
#[must_use]
pub fn classify(patterns: &StatePatterns, signals: &StateSignals) -> SessionState {
    if signals.rejection_visible || patterns.rejected_marker.matches(&signals.current_url) {
        return SessionState::Rejected;
    }
    if signals.challenge_input_visible {
        return SessionState::ChallengePending;
    }
    if patterns.app_base.matches(&signals.current_url) {
        return SessionState::Authenticated;
    }
    if patterns.auth_provider.matches(&signals.current_url) {
        return SessionState::Unauthenticated;
    }
    SessionState::Unknown
}

/// Gathers live signals and applies [`classify`].
///
/// When only the address says authenticated, a bounded secondary wait gives
/// a corroborating element time to render. If none appears the
/// classification stands but is recorded as provisional.
#[derive(Debug, Clone)]
pub struct StateVerifier {
    patterns: StatePatterns,
    resolver: ElementResolver,
    corroboration: WaitOptions,
    log: Arc<FlowLog>,
}

impl StateVerifier {
    /// Create a verifier with the default webmail patterns.
    #[must_use]
    pub fn new(log: Arc<FlowLog>) -> Self {
        Self {
            patterns: StatePatterns::default(),
            resolver: ElementResolver::new(),
            corroboration: WaitOptions::default(),
            log,
        }
    }

    /// Override the address patterns.
    #[must_use]
    pub fn with_patterns(mut self, patterns: StatePatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Override the secondary corroboration wait.
    #[must_use]
    pub const fn with_corroboration_wait(mut self, options: WaitOptions) -> Self {
        self.corroboration = options;
        self
    }

    /// The patterns classification runs against.
    #[must_use]
    pub const fn patterns(&self) -> &StatePatterns {
        &self.patterns
    }

    /// Snapshot the signals classification runs on.
    pub async fn gather_signals<D: PageDriver>(
        &self,
        driver: &D,
        probes: &StateProbes,
    ) -> CarteroResult<StateSignals> {
        Ok(StateSignals {
            current_url: driver.current_url().await?,
            rejection_visible: self.resolver.any_visible(driver, &probes.rejection).await?,
            challenge_input_visible: self
                .resolver
                .any_visible(driver, &probes.challenge_input)
                .await?,
            app_marker_visible: self
                .resolver
                .any_visible(driver, &probes.authenticated_marker)
                .await?,
        })
    }

    /// Classify the live session, corroborating address-only evidence.
    pub async fn current_state<D: PageDriver>(
        &self,
        driver: &D,
        probes: &StateProbes,
    ) -> CarteroResult<SessionState> {
        let signals = self.gather_signals(driver, probes).await?;
        let state = classify(&self.patterns, &signals);

        if state == SessionState::Authenticated && !signals.app_marker_visible {
            let resolver = self.resolver;
            let marker = &probes.authenticated_marker;
            let corroborated = probe_until(self.corroboration, move || async move {
                resolver.any_visible(driver, marker).await
            })
            .await?;
            if corroborated {
                self.log.debug(
                    "verify-state",
                    "authenticated address corroborated by a page element",
                );
            } else {
                self.log.warn(
                    "verify-state",
                    &format!(
                        "treating {} as authenticated without a corroborating element",
                        signals.current_url
                    ),
                );
            }
        } else if state == SessionState::Unknown {
            self.log.warn(
                "verify-state",
                &format!("unclassifiable session signals at {}", signals.current_url),
            );
        }

        Ok(state)
    }
}
