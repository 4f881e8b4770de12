//! CDP implementation of the page backend
//!
//! Owns a target session plus a router task that turns this session's
//! event stream (delivered by the connection's dispatcher) into navigation
//! subscriber broadcasts and network-idle notifications. Element handles
//! are DOM node ids; XPath queries run in-page and tag their matches with a
//! marker attribute so the DOM agent can pick them up by CSS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::session::Session;
use super::transport::CdpEvent;
use super::types::{KeyEventType, MouseButton, MouseEventType, PageFrameNavigatedEvent, PageLifecycleEvent};
use crate::backend::{
    ElementHandle, ElementInfo, Key, NavigationEvent, NavigationEvents, PageBackend, ScrollState,
};
use crate::error::{Error, Result};
use crate::gen::random_range;
use crate::selector::SelectorKind;

use async_trait::async_trait;

/// Attribute used to hand XPath matches over to the DOM agent
const MARKER_ATTR: &str = "data-qsc-match";

/// Capacity of each navigation subscriber channel
const SUBSCRIBER_BUFFER: usize = 64;

static MARKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Escape a string for embedding in a single-quoted JS literal
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

type Subscribers = Arc<Mutex<Vec<mpsc::Sender<NavigationEvent>>>>;

/// Live-page backend over a CDP session
pub struct CdpBackend {
    session: Session,
    subscribers: Subscribers,
    network_idle: Arc<Notify>,
    router: JoinHandle<()>,
}

impl CdpBackend {
    /// Attach to a session: enable page and lifecycle events, then start the
    /// event router over this session's event channel
    ///
    /// `events` comes from [`Connection::subscribe_session`] and carries
    /// only this session's events.
    ///
    /// [`Connection::subscribe_session`]: super::Connection::subscribe_session
    pub async fn attach(session: Session, events: mpsc::Receiver<CdpEvent>) -> Result<Self> {
        session.page_enable().await?;
        session.set_lifecycle_events_enabled(true).await?;

        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let network_idle = Arc::new(Notify::new());

        let router = tokio::spawn(Self::router_loop(
            events,
            Arc::clone(&subscribers),
            Arc::clone(&network_idle),
        ));

        Ok(Self {
            session,
            subscribers,
            network_idle,
            router,
        })
    }

    /// The underlying CDP session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Navigate the page to a URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let result = self.session.navigate(url).await?;
        if let Some(error) = result.error_text.filter(|e| !e.is_empty()) {
            return Err(Error::Navigation(format!("{}: {}", url, error)));
        }
        Ok(())
    }

    /// Route this session's events to their consumers
    async fn router_loop(
        mut events: mpsc::Receiver<CdpEvent>,
        subscribers: Subscribers,
        network_idle: Arc<Notify>,
    ) {
        while let Some(CdpEvent { method, params, .. }) = events.recv().await {
            match method.as_str() {
                "Page.frameNavigated" => {
                    let Ok(event) = serde_json::from_value::<PageFrameNavigatedEvent>(params)
                    else {
                        continue;
                    };
                    let nav = NavigationEvent {
                        frame_id: event.frame.id,
                        url: event.frame.url,
                    };

                    let mut subs = subscribers.lock().await;
                    subs.retain(|tx| match tx.try_send(nav.clone()) {
                        Ok(()) => true,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::trace!("navigation subscriber lagging, event dropped");
                            true
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => false,
                    });
                }
                "Page.lifecycleEvent" => {
                    let Ok(event) = serde_json::from_value::<PageLifecycleEvent>(params) else {
                        continue;
                    };
                    if event.name == "networkIdle" || event.name == "networkAlmostIdle" {
                        network_idle.notify_one();
                    }
                }
                _ => {}
            }
        }

        tracing::debug!("CDP event router ended");
    }

    /// Evaluate an expression and deserialize its by-value result
    async fn evaluate_value<T: serde::de::DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self.session.evaluate(expression).await?;
        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JS exception: {} (line {})",
                exception.text, exception.line_number
            )));
        }
        let value = result.result.value.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(Into::into)
    }

    /// Evaluate for side effects only
    async fn execute(&self, expression: &str) -> Result<()> {
        let result = self.session.evaluate(expression).await?;
        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JS exception: {} (line {})",
                exception.text, exception.line_number
            )));
        }
        Ok(())
    }

    /// Call a function with `this` bound to an element, returning its value
    async fn call_on(&self, element: &ElementHandle, function: &str) -> Result<Value> {
        let object_id = self.session.resolve_node(element.raw() as i32).await?;
        let result = self.session.call_function_on(&object_id, function).await?;
        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JS exception: {} (line {})",
                exception.text, exception.line_number
            )));
        }
        Ok(result.result.value.unwrap_or(Value::Null))
    }
}

impl Drop for CdpBackend {
    fn drop(&mut self) {
        self.router.abort();
    }
}

#[async_trait]
impl PageBackend for CdpBackend {
    async fn query(&self, css: &str) -> Result<Option<ElementHandle>> {
        let root = self.session.get_document().await?;
        let node_id = self.session.query_selector(root, css).await?;
        if node_id == 0 {
            Ok(None)
        } else {
            Ok(Some(ElementHandle::new(node_id as i64)))
        }
    }

    async fn query_all(&self, css: &str) -> Result<Vec<ElementHandle>> {
        let root = self.session.get_document().await?;
        let node_ids = self.session.query_selector_all(root, css).await?;
        Ok(node_ids
            .into_iter()
            .filter(|id| *id != 0)
            .map(|id| ElementHandle::new(id as i64))
            .collect())
    }

    async fn query_xpath(&self, xpath: &str) -> Result<Vec<ElementHandle>> {
        let marker = format!("q{}", MARKER_SEQ.fetch_add(1, Ordering::Relaxed));

        // Tag element matches in-page, then re-query them through the DOM
        // agent by the marker. Snapshot order and document order agree.
        let tag_script = format!(
            "(() => {{ \
               const snap = document.evaluate('{xpath}', document, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
               let n = 0; \
               for (let i = 0; i < snap.snapshotLength; i++) {{ \
                 const node = snap.snapshotItem(i); \
                 if (node.nodeType === 1) {{ node.setAttribute('{attr}', '{marker}'); n++; }} \
               }} \
               return n; \
             }})()",
            xpath = escape_js_string(xpath),
            attr = MARKER_ATTR,
            marker = marker,
        );

        let count: u64 = self.evaluate_value(&tag_script).await?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let handles = self
            .query_all(&format!("[{}='{}']", MARKER_ATTR, marker))
            .await?;

        let cleanup = format!(
            "document.querySelectorAll(\"[{attr}='{marker}']\")\
               .forEach(n => n.removeAttribute('{attr}'))",
            attr = MARKER_ATTR,
            marker = marker,
        );
        self.execute(&cleanup).await?;

        Ok(handles)
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo> {
        let value = self
            .call_on(
                element,
                "function() { return { \
                   tag: this.tagName.toLowerCase(), \
                   id: this.id || null, \
                   name: this.getAttribute('name'), \
                   className: this.getAttribute('class') }; }",
            )
            .await?;

        let string_field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        Ok(ElementInfo {
            tag: string_field("tag").unwrap_or_default(),
            id: string_field("id"),
            name: string_field("name"),
            class_name: string_field("className"),
        })
    }

    async fn focus(&self, element: &ElementHandle) -> Result<()> {
        self.session.focus(element.raw() as i32).await
    }

    async fn is_focused(&self, element: &ElementHandle) -> Result<bool> {
        let value = self
            .call_on(element, "function() { return document.activeElement === this; }")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle, click_count: u32) -> Result<()> {
        let model = self.session.get_box_model(element.raw() as i32).await?;
        let (x, y) = model.center();

        // Consecutive press/release pairs with an ascending count is how the
        // browser itself reports double and triple clicks.
        for count in 1..=click_count.max(1) {
            self.session
                .dispatch_mouse_event(
                    MouseEventType::MousePressed,
                    x,
                    y,
                    Some(MouseButton::Left),
                    Some(count as i32),
                )
                .await?;
            sleep(Duration::from_millis(random_range(30, 90))).await;
            self.session
                .dispatch_mouse_event(
                    MouseEventType::MouseReleased,
                    x,
                    y,
                    Some(MouseButton::Left),
                    Some(count as i32),
                )
                .await?;
            if count < click_count {
                sleep(Duration::from_millis(random_range(40, 120))).await;
            }
        }

        Ok(())
    }

    async fn type_char(&self, ch: char) -> Result<()> {
        let text = ch.to_string();
        self.session
            .dispatch_key_event(KeyEventType::Char, None, Some(&text), None)
            .await
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        let dom_key = key.dom_key();
        // Enter needs the carriage return text to commit inside inputs.
        let text = if key == Key::Enter { Some("\r") } else { None };

        self.session
            .dispatch_key_event(KeyEventType::KeyDown, Some(dom_key), text, Some(dom_key))
            .await?;
        sleep(Duration::from_millis(random_range(20, 60))).await;
        self.session
            .dispatch_key_event(KeyEventType::KeyUp, Some(dom_key), None, Some(dom_key))
            .await
    }

    async fn select_value(&self, css: &str, value: &str) -> Result<()> {
        let element = self.query(css).await?.ok_or(Error::ElementNotFound {
            selector: css.to_string(),
            kind: SelectorKind::Css,
        })?;

        let script = format!(
            "function() {{ \
               this.value = '{value}'; \
               this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
               this.dispatchEvent(new Event('change', {{ bubbles: true }})); }}",
            value = escape_js_string(value),
        );
        self.call_on(&element, &script).await?;
        Ok(())
    }

    async fn subscribe_navigation(&self) -> Result<NavigationEvents> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.lock().await.push(tx);
        Ok(NavigationEvents::new(rx))
    }

    async fn wait_network_idle(&self) -> Result<()> {
        self.network_idle.notified().await;
        Ok(())
    }

    async fn scroll_state(&self) -> Result<ScrollState> {
        let value: Value = self
            .evaluate_value(
                "({ scrollY: window.scrollY, \
                    viewportHeight: window.innerHeight, \
                    documentHeight: document.documentElement.scrollHeight })",
            )
            .await?;

        let field = |key: &str| value.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);

        Ok(ScrollState {
            scroll_y: field("scrollY"),
            viewport_height: field("viewportHeight"),
            document_height: field("documentHeight"),
        })
    }

    async fn scroll_by(&self, dy: f64) -> Result<()> {
        self.execute(&format!("window.scrollBy(0, {})", dy)).await
    }

    async fn element_top(&self, element: &ElementHandle) -> Result<f64> {
        let value = self
            .call_on(
                element,
                "function() { return this.getBoundingClientRect().top + window.scrollY; }",
            )
            .await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.call_on(
            element,
            "function() { this.scrollIntoView({ behavior: 'smooth', block: 'center' }); }",
        )
        .await?;
        Ok(())
    }
}
