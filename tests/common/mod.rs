//! Scripted in-memory backend for driving the interaction layer in tests

// Each test binary uses a different slice of this surface.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use quiesce::{
    ElementHandle, ElementInfo, Error, Key, NavigationEvent, NavigationEvents, PageBackend,
    Result, ScrollState, SelectorKind,
};

/// One recorded backend call, in dispatch order
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Subscribe,
    Focus(i64),
    Click { element: i64, count: u32 },
    TypeChar(char),
    PressKey(Key),
    SelectValue { css: String, value: String },
    ScrollBy(f64),
    ScrollIntoView(i64),
}

/// Decrements the in-flight idle counter even when the wait is cancelled
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeBackend {
    css: Mutex<HashMap<String, Vec<i64>>>,
    xpath: Mutex<HashMap<String, Vec<i64>>>,
    infos: Mutex<HashMap<i64, ElementInfo>>,
    tops: Mutex<HashMap<i64, f64>>,
    focused: Mutex<Option<i64>>,
    /// Clear focus after this many typed characters, once
    drop_focus_after: Mutex<Option<usize>>,
    chars_typed: AtomicUsize,
    actions: Mutex<Vec<Action>>,
    subscribers: Mutex<Vec<mpsc::Sender<NavigationEvent>>>,
    /// Navigation emitted synchronously from inside click()
    emit_on_click: Mutex<Option<NavigationEvent>>,
    /// How long wait_network_idle blocks before resolving
    idle_hold: Mutex<Duration>,
    idle_in_flight: AtomicUsize,
    pub max_idle_in_flight: AtomicUsize,
    scroll: Mutex<ScrollState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&self, css: &str, id: i64) {
        self.css
            .lock()
            .unwrap()
            .entry(css.to_string())
            .or_default()
            .push(id);
    }

    pub fn add_xpath_element(&self, xpath: &str, id: i64) {
        self.xpath
            .lock()
            .unwrap()
            .entry(xpath.to_string())
            .or_default()
            .push(id);
    }

    pub fn set_info(&self, id: i64, info: ElementInfo) {
        self.infos.lock().unwrap().insert(id, info);
    }

    pub fn set_element_top(&self, id: i64, top: f64) {
        self.tops.lock().unwrap().insert(id, top);
    }

    pub fn set_scroll(&self, state: ScrollState) {
        *self.scroll.lock().unwrap() = state;
    }

    pub fn set_idle_hold(&self, hold: Duration) {
        *self.idle_hold.lock().unwrap() = hold;
    }

    pub fn drop_focus_after_chars(&self, count: usize) {
        *self.drop_focus_after.lock().unwrap() = Some(count);
    }

    pub fn emit_navigation_on_click(&self, frame_id: &str, url: &str) {
        *self.emit_on_click.lock().unwrap() = Some(NavigationEvent {
            frame_id: frame_id.to_string(),
            url: url.to_string(),
        });
    }

    /// Push a navigation event to every live subscriber
    pub fn emit_navigation(&self, frame_id: &str, url: &str) {
        let event = NavigationEvent {
            frame_id: frame_id.to_string(),
            url: url.to_string(),
        };
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    /// Drop every subscriber sender, closing open subscriptions
    pub fn close_subscribers(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }
}

#[async_trait]
impl PageBackend for FakeBackend {
    async fn query(&self, css: &str) -> Result<Option<ElementHandle>> {
        Ok(self
            .css
            .lock()
            .unwrap()
            .get(css)
            .and_then(|ids| ids.first())
            .map(|id| ElementHandle::new(*id)))
    }

    async fn query_all(&self, css: &str) -> Result<Vec<ElementHandle>> {
        Ok(self
            .css
            .lock()
            .unwrap()
            .get(css)
            .map(|ids| ids.iter().map(|id| ElementHandle::new(*id)).collect())
            .unwrap_or_default())
    }

    async fn query_xpath(&self, xpath: &str) -> Result<Vec<ElementHandle>> {
        Ok(self
            .xpath
            .lock()
            .unwrap()
            .get(xpath)
            .map(|ids| ids.iter().map(|id| ElementHandle::new(*id)).collect())
            .unwrap_or_default())
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo> {
        Ok(self
            .infos
            .lock()
            .unwrap()
            .get(&element.raw())
            .cloned()
            .unwrap_or_default())
    }

    async fn focus(&self, element: &ElementHandle) -> Result<()> {
        *self.focused.lock().unwrap() = Some(element.raw());
        self.record(Action::Focus(element.raw()));
        Ok(())
    }

    async fn is_focused(&self, element: &ElementHandle) -> Result<bool> {
        Ok(*self.focused.lock().unwrap() == Some(element.raw()))
    }

    async fn click(&self, element: &ElementHandle, click_count: u32) -> Result<()> {
        self.record(Action::Click {
            element: element.raw(),
            count: click_count,
        });
        if let Some(event) = self.emit_on_click.lock().unwrap().clone() {
            let mut subs = self.subscribers.lock().unwrap();
            subs.retain(|tx| tx.try_send(event.clone()).is_ok());
        }
        Ok(())
    }

    async fn type_char(&self, ch: char) -> Result<()> {
        self.record(Action::TypeChar(ch));
        let typed = self.chars_typed.fetch_add(1, Ordering::SeqCst) + 1;
        let mut steal = self.drop_focus_after.lock().unwrap();
        if *steal == Some(typed) {
            *self.focused.lock().unwrap() = None;
            *steal = None;
        }
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        self.record(Action::PressKey(key));
        Ok(())
    }

    async fn select_value(&self, css: &str, value: &str) -> Result<()> {
        if !self.css.lock().unwrap().contains_key(css) {
            return Err(Error::ElementNotFound {
                selector: css.to_string(),
                kind: SelectorKind::Css,
            });
        }
        self.record(Action::SelectValue {
            css: css.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn subscribe_navigation(&self) -> Result<NavigationEvents> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().unwrap().push(tx);
        self.record(Action::Subscribe);
        Ok(NavigationEvents::new(rx))
    }

    async fn wait_network_idle(&self) -> Result<()> {
        let in_flight = self.idle_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_idle_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.idle_in_flight);

        let hold = *self.idle_hold.lock().unwrap();
        tokio::time::sleep(hold).await;
        Ok(())
    }

    async fn scroll_state(&self) -> Result<ScrollState> {
        Ok(*self.scroll.lock().unwrap())
    }

    async fn scroll_by(&self, dy: f64) -> Result<()> {
        self.record(Action::ScrollBy(dy));
        let mut state = self.scroll.lock().unwrap();
        let max_y = (state.document_height - state.viewport_height).max(0.0);
        state.scroll_y = (state.scroll_y + dy).clamp(0.0, max_y);
        Ok(())
    }

    async fn element_top(&self, element: &ElementHandle) -> Result<f64> {
        Ok(self
            .tops
            .lock()
            .unwrap()
            .get(&element.raw())
            .copied()
            .unwrap_or(0.0))
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.record(Action::ScrollIntoView(element.raw()));
        Ok(())
    }
}
