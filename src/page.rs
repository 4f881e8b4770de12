//! Page interaction layer
//!
//! Resolves selector descriptors to live elements and performs actions on
//! them: typing, clicking (with navigation settlement), clearing, dropdown
//! selection. Every action re-resolves its target; handles are never cached.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::backend::{ElementHandle, Key, PageBackend};
use crate::error::{Error, Result};
use crate::gen::random_range;
use crate::selector::{Selector, SelectorKind};
use crate::settle::{Provider, Settler};
use crate::DriveConfig;

/// Multi-click bounds for clear-input, inclusive
const CLEAR_CLICKS_MIN: u64 = 3;
const CLEAR_CLICKS_MAX: u64 = 6;

/// Pause between the select-clicks and the delete, in ms
const CLEAR_PAUSE_MS: (u64, u64) = (200, 600);

/// A page under automation, generic over the backend driving it
pub struct Page<B> {
    backend: B,
    config: Arc<DriveConfig>,
}

impl<B: PageBackend> Page<B> {
    /// Wrap a backend with interaction pacing from `config`
    pub fn new(backend: B, config: Arc<DriveConfig>) -> Self {
        Self { backend, config }
    }

    /// The underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // =========================================================================
    // Element Resolution
    // =========================================================================

    /// Resolve a selector to a single live element
    ///
    /// Supports `Css`, `XPath` (first match in document order), `Id` and
    /// `Class`. Bulk kinds fail with [`Error::UnsupportedSelector`]; zero
    /// matches fail with [`Error::ElementNotFound`].
    pub async fn get_element(&self, selector: &Selector) -> Result<ElementHandle> {
        match selector.kind {
            SelectorKind::Css | SelectorKind::Id | SelectorKind::Class => {
                let css = selector
                    .as_css()
                    .ok_or_else(|| Error::unsupported(selector.kind, "get_element"))?;
                self.backend
                    .query(&css)
                    .await?
                    .ok_or_else(|| Error::not_found(selector))
            }
            SelectorKind::XPath => self
                .backend
                .query_xpath(&selector.expr)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found(selector)),
            SelectorKind::CssAll | SelectorKind::XPathAll => {
                Err(Error::unsupported(selector.kind, "get_element"))
            }
        }
    }

    /// Resolve a bulk selector to all matching elements, in document order
    ///
    /// Zero matches is not an error here; the empty list is the not-found
    /// result. Non-bulk kinds fail with [`Error::UnsupportedSelector`].
    pub async fn get_elements(&self, selector: &Selector) -> Result<Vec<ElementHandle>> {
        match selector.kind {
            SelectorKind::CssAll => self.backend.query_all(&selector.expr).await,
            SelectorKind::XPathAll => self.backend.query_xpath(&selector.expr).await,
            _ => Err(Error::unsupported(selector.kind, "get_elements")),
        }
    }

    /// Check if an element exists
    #[must_use = "returns true if element exists"]
    pub async fn exists(&self, selector: &Selector) -> bool {
        self.get_element(selector).await.is_ok()
    }

    /// Wait for an element to appear in the DOM
    pub async fn wait_for(&self, selector: &Selector, timeout_ms: u64) -> Result<ElementHandle> {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            if let Ok(element) = self.get_element(selector).await {
                return Ok(element);
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Element '{}' not found within {}ms",
                    selector, timeout_ms
                )));
            }

            sleep(Duration::from_millis(100)).await;
        }
    }

    // =========================================================================
    // Typing
    // =========================================================================

    /// Type text into an element, character by character
    ///
    /// Line breaks in `text` become a commit-line key action (Enter) issued
    /// after the segment preceding them, never a literal newline character.
    /// Before each character the element is re-checked for focus and
    /// refocused if the page moved focus elsewhere (validation scripts do
    /// this). A small random delay runs between characters so the keystroke
    /// timing is not uniform.
    pub async fn type_text(&self, selector: &Selector, text: &str) -> Result<()> {
        let element = self.get_element(selector).await?;
        self.backend.focus(&element).await?;

        let (delay_min, delay_max) = self.config.type_delay_ms;

        for (index, segment) in text.split('\n').enumerate() {
            if index > 0 {
                self.backend.press_key(Key::Enter).await?;
                sleep(Duration::from_millis(random_range(delay_min, delay_max))).await;
            }

            for ch in segment.chars() {
                if !self.backend.is_focused(&element).await? {
                    tracing::debug!(selector = %selector, "focus drifted mid-type, refocusing");
                    self.backend.focus(&element).await?;
                }
                self.backend.type_char(ch).await?;
                sleep(Duration::from_millis(random_range(delay_min, delay_max))).await;
            }
        }

        Ok(())
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Best-effort clear of an input field
    ///
    /// Multi-clicks the field (3..=6 clicks) so the browser expands the
    /// selection over the existing content, pauses, then deletes the
    /// selection. Whether multi-click selects everything is browser/OS
    /// behavior this layer cannot guarantee.
    pub async fn clear_input(&self, selector: &Selector) -> Result<()> {
        let element = self.get_element(selector).await?;

        let clicks = random_range(CLEAR_CLICKS_MIN, CLEAR_CLICKS_MAX);
        self.backend.click(&element, clicks as u32).await?;

        sleep(Duration::from_millis(random_range(
            CLEAR_PAUSE_MS.0,
            CLEAR_PAUSE_MS.1,
        )))
        .await;

        self.backend.press_key(Key::Delete).await
    }

    // =========================================================================
    // Clicking
    // =========================================================================

    /// Click an element without waiting for navigation
    pub async fn click(&self, selector: &Selector) -> Result<()> {
        let element = self.get_element(selector).await?;
        self.backend.click(&element, 1).await
    }

    /// Click an element and block until the page's navigation activity has
    /// settled under the given provider profile
    ///
    /// The navigation listener is attached before the click is dispatched,
    /// so a navigation completing instantly is still observed. Settlement
    /// timeouts are swallowed; this only fails on resolution or dispatch
    /// errors.
    pub async fn click_settled(&self, selector: &Selector, provider: Provider) -> Result<()> {
        let element = self.get_element(selector).await?;

        let settler = Settler::arm(&self.backend, provider).await?;
        self.backend.click(&element, 1).await?;
        settler.settle().await
    }

    /// Try to click-and-settle, returning Ok(false) if the element is absent
    ///
    /// Useful for optional UI like interstitials and cookie banners.
    #[must_use = "returns true if clicked, false if not found"]
    pub async fn try_click_settled(
        &self,
        selector: &Selector,
        provider: Provider,
    ) -> Result<bool> {
        match self.click_settled(selector, provider).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Dropdowns
    // =========================================================================

    /// Select an option on a dropdown by its value
    ///
    /// CSS-like selectors go straight to the backend's native selection
    /// primitive. XPath selectors resolve the element first and derive a
    /// plain match from its `name`/`id`/`class`, because the native
    /// primitive cannot select by XPath.
    pub async fn select_option(&self, selector: &Selector, value: &str) -> Result<()> {
        match selector.kind {
            SelectorKind::Css | SelectorKind::Id | SelectorKind::Class => {
                let css = selector
                    .as_css()
                    .ok_or_else(|| Error::unsupported(selector.kind, "select_option"))?;
                self.backend.select_value(&css, value).await
            }
            SelectorKind::XPath => {
                let element = self.get_element(selector).await?;
                let info = self.backend.describe(&element).await?;
                let css = info.derive_css().ok_or_else(|| {
                    Error::SelectorUnderivable(format!(
                        "{} has no name/id/class to derive a plain match from",
                        selector
                    ))
                })?;
                tracing::debug!(selector = %selector, derived = %css, "derived plain match for dropdown");
                self.backend.select_value(&css, value).await
            }
            SelectorKind::CssAll | SelectorKind::XPathAll => {
                Err(Error::unsupported(selector.kind, "select_option"))
            }
        }
    }
}
