//! Cartero: End-to-End Webmail Test Harness
//!
//! Cartero (Spanish: "mail carrier") drives a webmail deployment through
//! its real user journeys: signing in past a second-factor challenge,
//! composing and sending a message, and signing back out, verifying the
//! session state at every step instead of assuming it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    CARTERO Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌──────────────┐    ┌────────────┐          │
//! │   │ Scenario   │    │ Page Flows   │    │ PageDriver │          │
//! │   │ Harness    │───►│ login/inbox/ │───►│ (CDP or    │          │
//! │   │            │    │ compose/out  │    │  mock)     │          │
//! │   └────────────┘    └──────────────┘    └────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flows never touch a browser API directly; everything goes through the
//! [`PageDriver`] trait, so every journey runs identically against the
//! scripted [`MockDriver`] and the real CDP browser.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Deployment addresses, timing profiles, and fixture data.
pub mod config;

/// Locator catalog for the webmail UI, grouped by page.
pub mod selectors;

mod compose;
mod driver;
mod harness;
mod inbox;
mod locator;
mod logging;
mod login;
mod logout;
mod otp;
mod resolver;
mod result;
mod state;
mod wait;

pub use compose::{ComposePage, SendOutcome};
pub use config::{
    AccountRecord, AmbiguityPolicy, EmailPayload, HarnessConfig, TestData, Timings,
};
pub use driver::{
    DriverConfig, ElementHandle, MockDriver, MockReaction, PageDriver, Screenshot,
};
#[cfg(feature = "browser")]
pub use driver::CdpDriver;
pub use harness::{ScenarioOutcome, SessionReport, WebmailHarness};
pub use inbox::InboxPage;
pub use locator::{Locator, LocatorSet, Selector};
pub use logging::{init_tracing, redact, FlowLog, LogEntry, LogLevel, Redactor};
pub use login::{AuthAttempt, LoginPage};
pub use logout::{LogoutPage, LogoutReport, LogoutStrategy};
pub use otp::{
    is_valid_code, CommandOtpProvider, MockOtpProvider, OtpClient, OtpOutcome, OtpProvider,
};
pub use resolver::{ElementResolver, ResolvedElement};
pub use result::{CarteroError, CarteroResult};
pub use state::{
    classify, SessionState, StatePatterns, StateProbes, StateSignals, StateVerifier, UrlPattern,
};
pub use wait::{pacing_pause, pause, probe_until, wait_until, WaitOptions, WaitResult};
