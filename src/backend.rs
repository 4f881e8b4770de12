//! Page backend capability trait
//!
//! Everything the interaction layer needs from a live page: element queries,
//! input dispatch, navigation-event subscription, a "network substantially
//! idle" wait, and scroll geometry. The CDP implementation lives in
//! `cdp::backend`; tests drive the same surface with a scripted fake.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Opaque handle to a node in the live page
///
/// Scoped to one interaction; never cached across calls. The page may
/// invalidate it at any navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    id: i64,
}

impl ElementHandle {
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn raw(&self) -> i64 {
        self.id
    }
}

/// Identifying attributes of an element, for deriving CSS fallbacks
#[derive(Debug, Clone, Default)]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub class_name: Option<String>,
}

impl ElementInfo {
    /// Derive a plain CSS selector from whichever identifying attribute is
    /// present, preferring `name`, then `id`, then the first class.
    pub fn derive_css(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|s| !s.is_empty()) {
            return Some(format!("[name='{}']", name));
        }
        if let Some(id) = self.id.as_deref().filter(|s| !s.is_empty()) {
            return Some(format!("#{}", id));
        }
        if let Some(class) = self.class_name.as_deref() {
            if let Some(first) = class.split_whitespace().next() {
                return Some(format!(".{}", first));
            }
        }
        None
    }
}

/// Logical key actions the interaction layer dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Commit the current line (what a line break in typed text becomes)
    Enter,
    /// Delete the current selection
    Delete,
    /// Delete backwards one character
    Backspace,
}

impl Key {
    /// DOM `key`/`code` value for the key
    pub fn dom_key(&self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Delete => "Delete",
            Key::Backspace => "Backspace",
        }
    }
}

/// A navigation event observed on the page frame graph
#[derive(Debug, Clone)]
pub struct NavigationEvent {
    pub frame_id: String,
    pub url: String,
}

/// A live subscription to navigation events
///
/// Dropping the subscription detaches the listener.
pub struct NavigationEvents {
    rx: mpsc::Receiver<NavigationEvent>,
}

impl NavigationEvents {
    pub fn new(rx: mpsc::Receiver<NavigationEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next navigation event, or None once the page is gone
    pub async fn recv(&mut self) -> Option<NavigationEvent> {
        self.rx.recv().await
    }
}

/// Vertical scroll geometry of the page
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollState {
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollState {
    /// True once the viewport bottom has reached the document bottom
    pub fn at_bottom(&self) -> bool {
        self.scroll_y + self.viewport_height >= self.document_height - 1.0
    }

    /// How far the viewport bottom still is from the document bottom
    pub fn remaining(&self) -> f64 {
        (self.document_height - self.viewport_height - self.scroll_y).max(0.0)
    }
}

/// Capability surface the interaction layer drives
///
/// Every method re-queries the live page; no implementation should cache
/// element state across calls.
#[async_trait]
pub trait PageBackend: Send + Sync {
    /// First element matching a CSS selector
    async fn query(&self, css: &str) -> Result<Option<ElementHandle>>;

    /// All elements matching a CSS selector, in document order
    async fn query_all(&self, css: &str) -> Result<Vec<ElementHandle>>;

    /// All elements matching an XPath expression, in document order
    async fn query_xpath(&self, xpath: &str) -> Result<Vec<ElementHandle>>;

    /// Identifying attributes of an element
    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo>;

    /// Give an element keyboard focus
    async fn focus(&self, element: &ElementHandle) -> Result<()>;

    /// Whether the element currently holds focus
    async fn is_focused(&self, element: &ElementHandle) -> Result<bool>;

    /// Click an element; `click_count > 1` is a multi-click at one spot
    async fn click(&self, element: &ElementHandle, click_count: u32) -> Result<()>;

    /// Emit one character into the focused element
    async fn type_char(&self, ch: char) -> Result<()>;

    /// Dispatch a logical key action to the focused element
    async fn press_key(&self, key: Key) -> Result<()>;

    /// Native option selection on a `<select>` matched by CSS
    async fn select_value(&self, css: &str, value: &str) -> Result<()>;

    /// Subscribe to navigation events; must be in place before any click
    /// whose navigations the caller wants to observe
    async fn subscribe_navigation(&self) -> Result<NavigationEvents>;

    /// Resolve when the page's network activity is substantially idle.
    /// Callers bound this with their own timeout; implementations may wait
    /// indefinitely.
    async fn wait_network_idle(&self) -> Result<()>;

    /// Current vertical scroll geometry
    async fn scroll_state(&self) -> Result<ScrollState>;

    /// Scroll the page vertically by `dy` CSS pixels (negative is up)
    async fn scroll_by(&self, dy: f64) -> Result<()>;

    /// Document-relative top offset of an element
    async fn element_top(&self, element: &ElementHandle) -> Result<f64>;

    /// Smooth-scroll an element into view
    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()>;
}
