//! Abstract browser driver boundary.
//!
//! The harness consumes the browser purely as an async query/command
//! surface with timeouts. The trait allows swapping implementations:
//! `CdpDriver` (feature `browser`, chromiumoxide) drives a real Chromium,
//! `MockDriver` scripts page behavior for unit tests.

use crate::locator::Selector;
use crate::result::{CarteroError, CarteroResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Element handle returned by driver queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Identifier (selector key or remote node id)
    pub id: String,
    /// Element tag name when known
    pub tag_name: String,
    /// Element text content
    pub text_content: Option<String>,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into(),
            text_content: None,
        }
    }

    /// Attach text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }
}

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Timestamp when the screenshot was taken
    pub timestamp: std::time::SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check the screenshot carries data
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Browser configuration for the driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Timeout for navigation
    pub navigation_timeout: Duration,
    /// Timeout for element queries
    pub element_timeout: Duration,
    /// Executable path override
    pub executable_path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: None,
            navigation_timeout: Duration::from_secs(30),
            element_timeout: Duration::from_secs(5),
            executable_path: None,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set element query timeout
    #[must_use]
    pub const fn element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }
}

/// Abstract driver trait for browser automation
///
/// All waits carry explicit timeouts; a missed `wait_for_selector` reports
/// `Timeout`, which callers above the resolver treat as an ordinary
/// "absent" signal rather than a fault.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to URL and wait for the load to commit
    async fn navigate(&mut self, url: &str) -> CarteroResult<()>;

    /// Get current URL (after any redirects)
    async fn current_url(&self) -> CarteroResult<String>;

    /// Check whether a selector matches a visible element right now
    async fn is_visible(&self, selector: &Selector) -> CarteroResult<bool>;

    /// Wait for a selector to become visible
    async fn wait_for_selector(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> CarteroResult<ElementHandle>;

    /// Click the first element matching the selector
    async fn click(&self, selector: &Selector) -> CarteroResult<()>;

    /// Clear an input and enter a value
    async fn fill(&self, selector: &Selector, value: &str) -> CarteroResult<()>;

    /// Type text into an element without clearing it first
    async fn type_text(&self, selector: &Selector, text: &str) -> CarteroResult<()>;

    /// Press a keyboard key while an element is focused
    async fn press_key(&self, selector: &Selector, key: &str) -> CarteroResult<()>;

    /// Read an element's text content, `None` when absent
    async fn inner_text(&self, selector: &Selector) -> CarteroResult<Option<String>>;

    /// Execute JavaScript in page context
    async fn evaluate(&self, script: &str) -> CarteroResult<serde_json::Value>;

    /// Clear all browser cookies
    async fn clear_cookies(&mut self) -> CarteroResult<()>;

    /// Clear local and session storage for the current origin
    async fn clear_storage(&mut self) -> CarteroResult<()>;

    /// Take a screenshot of the current page
    async fn screenshot(&self) -> CarteroResult<Screenshot>;

    /// Close the browser
    async fn close(&mut self) -> CarteroResult<()>;
}

/// A scripted state change applied by [`MockDriver`] when a trigger fires
#[derive(Debug, Clone)]
pub enum MockReaction {
    /// Set the current URL
    SetUrl(String),
    /// Make a selector key visible
    Show(String),
    /// Hide a selector key
    Hide(String),
    /// Set the text content behind a selector key
    SetText(String, String),
    /// Install a navigation redirect: requests whose URL starts with the
    /// prefix land on the target instead
    AddRedirect {
        /// Requested-URL prefix
        prefix: String,
        /// Where the navigation actually lands
        to: String,
    },
}

#[derive(Debug, Default)]
struct MockState {
    current_url: String,
    visible: std::collections::HashSet<String>,
    texts: std::collections::HashMap<String, String>,
    redirects: Vec<(String, String)>,
    typed: Vec<(String, String)>,
    call_history: Vec<String>,
    reactions: std::collections::HashMap<String, std::collections::VecDeque<Vec<MockReaction>>>,
    eval_results: std::collections::VecDeque<serde_json::Value>,
    screenshot_data: Option<Vec<u8>>,
}

impl MockState {
    fn apply(&mut self, reactions: Vec<MockReaction>) {
        for reaction in reactions {
            match reaction {
                MockReaction::SetUrl(url) => self.current_url = url,
                MockReaction::Show(key) => {
                    self.visible.insert(key);
                }
                MockReaction::Hide(key) => {
                    self.visible.remove(&key);
                }
                MockReaction::SetText(key, text) => {
                    self.texts.insert(key, text);
                }
                MockReaction::AddRedirect { prefix, to } => {
                    self.redirects.push((prefix, to));
                }
            }
        }
    }

    fn fire(&mut self, trigger: &str) {
        if let Some(queue) = self.reactions.get_mut(trigger) {
            if let Some(batch) = queue.pop_front() {
                self.apply(batch);
            }
        }
    }
}

/// Scripted in-memory driver for unit testing.
///
/// Page behavior is declared up front: initial visibility/texts/URL plus
/// reaction batches keyed by trigger (`click:<selector>`, `navigate:<url>`,
/// `clear_cookies`, ...). Each matching call consumes one batch, letting a
/// test express "first submit shows the wrong-code error, second submit
/// lands on the inbox".
#[derive(Debug, Default)]
pub struct MockDriver {
    state: std::sync::Mutex<MockState>,
}

impl MockDriver {
    /// Create a new mock driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Set the current URL
    pub fn set_url(&self, url: &str) {
        self.lock().current_url = url.to_string();
    }

    /// Make a selector visible (key is the selector display form)
    pub fn show(&self, selector: &Selector) {
        self.lock().visible.insert(selector.to_string());
    }

    /// Hide a selector
    pub fn hide(&self, selector: &Selector) {
        self.lock().visible.remove(&selector.to_string());
    }

    /// Set the text content behind a selector
    pub fn set_text(&self, selector: &Selector, text: &str) {
        self.lock()
            .texts
            .insert(selector.to_string(), text.to_string());
    }

    /// Install a navigation redirect rule
    pub fn redirect(&self, prefix: &str, to: &str) {
        self.lock()
            .redirects
            .push((prefix.to_string(), to.to_string()));
    }

    /// Queue a reaction batch for a trigger; batches are consumed FIFO,
    /// one per matching call
    pub fn on(&self, trigger: &str, reactions: Vec<MockReaction>) {
        self.lock()
            .reactions
            .entry(trigger.to_string())
            .or_default()
            .push_back(reactions);
    }

    /// Shorthand for a click trigger on a selector
    pub fn on_click(&self, selector: &Selector, reactions: Vec<MockReaction>) {
        self.on(&format!("click:{selector}"), reactions);
    }

    /// Queue a result for the next `evaluate` call
    pub fn push_eval_result(&self, value: serde_json::Value) {
        self.lock().eval_results.push_back(value);
    }

    /// Set mock screenshot bytes
    pub fn set_screenshot(&self, data: Vec<u8>) {
        self.lock().screenshot_data = Some(data);
    }

    /// All values typed into a selector, in order
    #[must_use]
    pub fn typed_values(&self, selector: &Selector) -> Vec<String> {
        let key = selector.to_string();
        self.lock()
            .typed
            .iter()
            .filter(|(sel, _)| *sel == key)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Call history for verification
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().call_history.clone()
    }

    /// Check if a call with the given prefix was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.lock()
            .call_history
            .iter()
            .any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> CarteroResult<()> {
        let mut state = self.lock();
        state.call_history.push(format!("navigate:{url}"));
        let landed = state
            .redirects
            .iter()
            .rev()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| url.to_string());
        state.current_url = landed;
        state.fire(&format!("navigate:{url}"));
        Ok(())
    }

    async fn current_url(&self) -> CarteroResult<String> {
        Ok(self.lock().current_url.clone())
    }

    async fn is_visible(&self, selector: &Selector) -> CarteroResult<bool> {
        Ok(self.lock().visible.contains(&selector.to_string()))
    }

    async fn wait_for_selector(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> CarteroResult<ElementHandle> {
        let key = selector.to_string();
        let start = std::time::Instant::now();
        loop {
            {
                let state = self.lock();
                if state.visible.contains(&key) {
                    let mut handle = ElementHandle::new(key.clone(), "div");
                    if let Some(text) = state.texts.get(&key) {
                        handle.text_content = Some(text.clone());
                    }
                    return Ok(handle);
                }
            }
            if start.elapsed() >= timeout {
                return Err(CarteroError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn click(&self, selector: &Selector) -> CarteroResult<()> {
        let key = selector.to_string();
        let mut state = self.lock();
        state.call_history.push(format!("click:{key}"));
        if !state.visible.contains(&key) {
            return Err(CarteroError::DriverError {
                message: format!("click target not visible: {key}"),
            });
        }
        state.fire(&format!("click:{key}"));
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str) -> CarteroResult<()> {
        let key = selector.to_string();
        let mut state = self.lock();
        state.call_history.push(format!("fill:{key}"));
        if !state.visible.contains(&key) {
            return Err(CarteroError::DriverError {
                message: format!("fill target not visible: {key}"),
            });
        }
        state.typed.push((key.clone(), value.to_string()));
        state.fire(&format!("fill:{key}"));
        Ok(())
    }

    async fn type_text(&self, selector: &Selector, text: &str) -> CarteroResult<()> {
        let key = selector.to_string();
        let mut state = self.lock();
        state.call_history.push(format!("type:{key}"));
        state.typed.push((key.clone(), text.to_string()));
        state.fire(&format!("type:{key}"));
        Ok(())
    }

    async fn press_key(&self, selector: &Selector, key_name: &str) -> CarteroResult<()> {
        let key = selector.to_string();
        let mut state = self.lock();
        state.call_history.push(format!("press:{key}:{key_name}"));
        state.fire(&format!("press:{key}:{key_name}"));
        Ok(())
    }

    async fn inner_text(&self, selector: &Selector) -> CarteroResult<Option<String>> {
        let key = selector.to_string();
        let state = self.lock();
        if !state.visible.contains(&key) {
            return Ok(None);
        }
        Ok(state.texts.get(&key).cloned())
    }

    async fn evaluate(&self, script: &str) -> CarteroResult<serde_json::Value> {
        let mut state = self.lock();
        state.call_history.push(format!("evaluate:{script}"));
        Ok(state
            .eval_results
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn clear_cookies(&mut self) -> CarteroResult<()> {
        let mut state = self.lock();
        state.call_history.push("clear_cookies".to_string());
        state.fire("clear_cookies");
        Ok(())
    }

    async fn clear_storage(&mut self) -> CarteroResult<()> {
        let mut state = self.lock();
        state.call_history.push("clear_storage".to_string());
        state.fire("clear_storage");
        Ok(())
    }

    async fn screenshot(&self) -> CarteroResult<Screenshot> {
        self.lock()
            .screenshot_data
            .clone()
            .map(Screenshot::new)
            .ok_or_else(|| CarteroError::ScreenshotError {
                message: "No mock screenshot set".to_string(),
            })
    }

    async fn close(&mut self) -> CarteroResult<()> {
        self.lock().call_history.push("close".to_string());
        Ok(())
    }
}

#[cfg(feature = "browser")]
#[allow(
    clippy::wildcard_imports,
    clippy::significant_drop_tightening,
    clippy::missing_errors_doc
)]
mod cdp {
    use super::*;
    use crate::result::{CarteroError, CarteroResult};
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
    use chromiumoxide::cdp::browser_protocol::page::{
        CaptureScreenshotFormat, CaptureScreenshotParams,
    };
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Driver over a real Chromium via CDP
    #[derive(Debug)]
    pub struct CdpDriver {
        config: DriverConfig,
        browser: Arc<Mutex<CdpBrowser>>,
        page: Arc<Mutex<CdpPage>>,
        #[allow(dead_code)]
        handle: tokio::task::JoinHandle<()>,
    }

    impl CdpDriver {
        /// Launch a browser and open an initial blank page
        pub async fn launch(config: DriverConfig) -> CarteroResult<Self> {
            let mut builder = CdpConfig::builder();

            if !config.headless {
                builder = builder.with_head();
            }
            builder = builder.no_sandbox();
            builder = builder.window_size(config.viewport_width, config.viewport_height);
            if let Some(ref path) = config.executable_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder.build().map_err(|e| CarteroError::DriverError {
                message: e.to_string(),
            })?;

            let (browser, mut handler) =
                CdpBrowser::launch(cdp_config)
                    .await
                    .map_err(|e| CarteroError::DriverError {
                        message: e.to_string(),
                    })?;

            let handle = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;

            Ok(Self {
                config,
                browser: Arc::new(Mutex::new(browser)),
                page: Arc::new(Mutex::new(page)),
                handle,
            })
        }

        /// Driver configuration
        #[must_use]
        pub const fn config(&self) -> &DriverConfig {
            &self.config
        }

        async fn eval_bool(&self, script: &str) -> CarteroResult<bool> {
            let page = self.page.lock().await;
            let result = page
                .evaluate(script)
                .await
                .map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
            Ok(result.into_value::<bool>().unwrap_or(false))
        }

        async fn js_action(&self, selector: &Selector, action: &str) -> CarteroResult<()> {
            let script = format!(
                "(() => {{ const el = {}; if (!el) return false; {action}; return true; }})()",
                selector.to_query()
            );
            if self.eval_bool(&script).await? {
                Ok(())
            } else {
                Err(CarteroError::DriverError {
                    message: format!("element not found: {selector}"),
                })
            }
        }
    }

    #[async_trait]
    impl PageDriver for CdpDriver {
        async fn navigate(&mut self, url: &str) -> CarteroResult<()> {
            let page = self.page.lock().await;
            page.goto(url)
                .await
                .map_err(|e| CarteroError::NavigationError {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            Ok(())
        }

        async fn current_url(&self) -> CarteroResult<String> {
            let page = self.page.lock().await;
            let url = page.url().await.map_err(|e| CarteroError::DriverError {
                message: e.to_string(),
            })?;
            Ok(url.unwrap_or_default())
        }

        async fn is_visible(&self, selector: &Selector) -> CarteroResult<bool> {
            self.eval_bool(&selector.to_visibility_query()).await
        }

        async fn wait_for_selector(
            &self,
            selector: &Selector,
            timeout: Duration,
        ) -> CarteroResult<ElementHandle> {
            let start = std::time::Instant::now();
            loop {
                if self.is_visible(selector).await? {
                    let text = self.inner_text(selector).await?;
                    let mut handle = ElementHandle::new(selector.to_string(), "node");
                    handle.text_content = text;
                    return Ok(handle);
                }
                if start.elapsed() >= timeout {
                    return Err(CarteroError::Timeout {
                        ms: timeout.as_millis() as u64,
                    });
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        async fn click(&self, selector: &Selector) -> CarteroResult<()> {
            if let Selector::Css(css) = selector {
                let page = self.page.lock().await;
                let element =
                    page.find_element(css.as_str())
                        .await
                        .map_err(|e| CarteroError::DriverError {
                            message: e.to_string(),
                        })?;
                element.click().await.map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
                Ok(())
            } else {
                self.js_action(selector, "el.click()").await
            }
        }

        async fn fill(&self, selector: &Selector, value: &str) -> CarteroResult<()> {
            if let Selector::Css(css) = selector {
                let page = self.page.lock().await;
                let element =
                    page.find_element(css.as_str())
                        .await
                        .map_err(|e| CarteroError::DriverError {
                            message: e.to_string(),
                        })?;
                element.focus().await.map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
                element
                    .type_str(value)
                    .await
                    .map_err(|e| CarteroError::DriverError {
                        message: e.to_string(),
                    })?;
                Ok(())
            } else {
                let escaped = serde_json::to_string(value)?;
                self.js_action(
                    selector,
                    &format!(
                        "el.value = {escaped}; el.dispatchEvent(new Event('input', {{ bubbles: true }}))"
                    ),
                )
                .await
            }
        }

        async fn type_text(&self, selector: &Selector, text: &str) -> CarteroResult<()> {
            self.fill(selector, text).await
        }

        async fn press_key(&self, selector: &Selector, key: &str) -> CarteroResult<()> {
            if let Selector::Css(css) = selector {
                let page = self.page.lock().await;
                let element =
                    page.find_element(css.as_str())
                        .await
                        .map_err(|e| CarteroError::DriverError {
                            message: e.to_string(),
                        })?;
                element
                    .press_key(key)
                    .await
                    .map_err(|e| CarteroError::DriverError {
                        message: e.to_string(),
                    })?;
                Ok(())
            } else {
                let escaped = serde_json::to_string(key)?;
                self.js_action(
                    selector,
                    &format!(
                        "el.dispatchEvent(new KeyboardEvent('keydown', {{ key: {escaped}, bubbles: true }}))"
                    ),
                )
                .await
            }
        }

        async fn inner_text(&self, selector: &Selector) -> CarteroResult<Option<String>> {
            let script = format!(
                "(() => {{ const el = {}; return el ? el.textContent : null; }})()",
                selector.to_query()
            );
            let page = self.page.lock().await;
            let result = page
                .evaluate(script)
                .await
                .map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
            Ok(result.into_value::<Option<String>>().unwrap_or(None))
        }

        async fn evaluate(&self, script: &str) -> CarteroResult<serde_json::Value> {
            let page = self.page.lock().await;
            let result = page
                .evaluate(script)
                .await
                .map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
            Ok(result.into_value().unwrap_or(serde_json::Value::Null))
        }

        async fn clear_cookies(&mut self) -> CarteroResult<()> {
            let page = self.page.lock().await;
            page.execute(ClearBrowserCookiesParams::default())
                .await
                .map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
            Ok(())
        }

        async fn clear_storage(&mut self) -> CarteroResult<()> {
            let page = self.page.lock().await;
            page.evaluate("localStorage.clear(); sessionStorage.clear(); true")
                .await
                .map_err(|e| CarteroError::DriverError {
                    message: e.to_string(),
                })?;
            Ok(())
        }

        async fn screenshot(&self) -> CarteroResult<Screenshot> {
            let page = self.page.lock().await;
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            let shot = page
                .execute(params)
                .await
                .map_err(|e| CarteroError::ScreenshotError {
                    message: e.to_string(),
                })?;

            use base64::Engine;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&shot.data)
                .map_err(|e| CarteroError::ScreenshotError {
                    message: e.to_string(),
                })?;
            Ok(Screenshot::new(data))
        }

        async fn close(&mut self) -> CarteroResult<()> {
            let mut browser = self.browser.lock().await;
            browser.close().await.map_err(|e| CarteroError::DriverError {
                message: e.to_string(),
            })?;
            Ok(())
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::CdpDriver;
