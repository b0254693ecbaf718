//! Locator abstraction for element selection.
//!
//! A [`Locator`] describes one candidate way of finding an element. A
//! [`LocatorSet`] is the declarative form of a fallback chain: a named,
//! ordered sequence of candidates for a single semantic UI target, where
//! declaration order defines resolution precedence. New fallback selectors
//! are added as data, not as new control-flow branches.

use serde::{Deserialize, Serialize};

/// Default per-candidate timeout for resolution (5 seconds)
pub const DEFAULT_CANDIDATE_TIMEOUT_MS: u64 = 5000;

/// Default polling interval during resolution (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector (e.g., "input[type='email']")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Text content selector
    Text(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// Combined selector with text filter
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a CSS selector filtered by text content
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Convert to a JavaScript query expression returning the element or null
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelector({s:?})"),
            Self::XPath(s) => {
                format!("document.evaluate({s:?}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue")
            }
            Self::Text(t) => {
                format!("Array.from(document.querySelectorAll('*')).find(el => el.textContent.includes({t:?}))")
            }
            Self::TestId(id) => format!("document.querySelector('[data-testid={id:?}]')"),
            Self::CssWithText { css, text } => {
                format!("Array.from(document.querySelectorAll({css:?})).find(el => el.textContent.includes({text:?}))")
            }
        }
    }

    /// Convert to a JavaScript visibility probe returning a boolean
    #[must_use]
    pub fn to_visibility_query(&self) -> String {
        format!(
            "(() => {{ const el = {}; return !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length); }})()",
            self.to_query()
        )
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::Text(t) => write!(f, "text={t}"),
            Self::TestId(id) => write!(f, "testid={id}"),
            Self::CssWithText { css, text } => write!(f, "css={css} :text({text})"),
        }
    }
}

/// One candidate element descriptor with its resolution budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// The selector for finding the element
    selector: Selector,
    /// Per-candidate timeout override in milliseconds
    timeout_ms: Option<u64>,
}

impl Locator {
    /// Create a new locator with a CSS selector
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: Selector::Css(selector.into()),
            timeout_ms: None,
        }
    }

    /// Create a locator from a selector
    #[must_use]
    pub fn from_selector(selector: Selector) -> Self {
        Self {
            selector,
            timeout_ms: None,
        }
    }

    /// Override the per-candidate timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Get the selector
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Per-candidate timeout, falling back to the supplied default
    #[must_use]
    pub fn timeout_or(&self, default_ms: u64) -> u64 {
        self.timeout_ms.unwrap_or(default_ms)
    }
}

/// A named, ordered fallback chain of candidate locators for one semantic
/// UI target.
///
/// Order is preserved and defines resolution precedence; a set is never
/// empty because construction requires a primary candidate. Decoding is
/// fallible for the same reason: data from a file cannot smuggle in an
/// empty chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawLocatorSet")]
pub struct LocatorSet {
    /// Semantic target name (e.g. "email input")
    name: String,
    /// Candidates in fallback order, primary first
    candidates: Vec<Locator>,
}

impl LocatorSet {
    /// Create a set with its primary candidate
    #[must_use]
    pub fn new(name: impl Into<String>, primary: Locator) -> Self {
        Self {
            name: name.into(),
            candidates: vec![primary],
        }
    }

    /// Append a fallback candidate (tried after all earlier candidates)
    #[must_use]
    pub fn with_fallback(mut self, locator: Locator) -> Self {
        self.candidates.push(locator);
        self
    }

    /// Append a CSS fallback candidate
    #[must_use]
    pub fn with_css_fallback(self, selector: impl Into<String>) -> Self {
        self.with_fallback(Locator::new(selector))
    }

    /// Semantic target name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidates in declaration order
    #[must_use]
    pub fn candidates(&self) -> &[Locator] {
        &self.candidates
    }

    /// Number of candidates (always ≥ 1)
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// A set is never empty; provided for completeness
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Total resolution budget: sum of per-candidate timeouts
    #[must_use]
    pub fn total_budget_ms(&self, default_candidate_ms: u64) -> u64 {
        self.candidates
            .iter()
            .map(|c| c.timeout_or(default_candidate_ms))
            .sum()
    }
}

/// Decode-side shape of [`LocatorSet`] before the non-empty check.
#[derive(Deserialize)]
struct RawLocatorSet {
    name: String,
    candidates: Vec<Locator>,
}

impl TryFrom<RawLocatorSet> for LocatorSet {
    type Error = String;

    fn try_from(raw: RawLocatorSet) -> Result<Self, Self::Error> {
        if raw.candidates.is_empty() {
            return Err(format!("locator set {:?} has no candidates", raw.name));
        }
        Ok(Self {
            name: raw.name,
            candidates: raw.candidates,
        })
    }
}
