//! CDP connection and session management
//!
//! [`Connection`] speaks to the browser endpoint (targets, version, close)
//! and runs the single event dispatcher: the transport's event stream has
//! one consumer, which fans each event out to the channel registered for
//! its session id. [`Session`] is attached to one target and carries the
//! typed command wrappers the backend is built on.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::transport::{CdpEvent, Transport};
use super::types::*;
use crate::error::{Error, Result};

/// Capacity of each per-session event channel
const SESSION_BUFFER: usize = 256;

type SessionRoutes = Arc<Mutex<HashMap<String, mpsc::Sender<CdpEvent>>>>;

/// Deliver one event to the channel registered for its session.
/// Browser-level events (no session id) have no consumer here.
async fn route_event(routes: &SessionRoutes, event: CdpEvent) {
    let Some(session_id) = event.session_id.clone() else {
        return;
    };

    let mut routes = routes.lock().await;
    if let Some(tx) = routes.get(&session_id) {
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(session = %session_id, "session event channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                routes.remove(&session_id);
            }
        }
    }
}

/// A CDP connection to Chrome
pub struct Connection {
    transport: Arc<Transport>,
    routes: SessionRoutes,
    dispatcher: JoinHandle<()>,
}

impl Connection {
    /// Wrap a transport and start the event dispatcher
    pub fn new(transport: Transport) -> Self {
        let transport = Arc::new(transport);
        let routes: SessionRoutes = Arc::new(Mutex::new(HashMap::new()));

        let dispatcher = tokio::spawn(Self::dispatch_loop(
            Arc::clone(&transport),
            Arc::clone(&routes),
        ));

        Self {
            transport,
            routes,
            dispatcher,
        }
    }

    /// Single consumer of the transport's event stream
    async fn dispatch_loop(transport: Arc<Transport>, routes: SessionRoutes) {
        while let Some(event) = transport.recv_event().await {
            route_event(&routes, event).await;
        }
        tracing::debug!("CDP event dispatcher ended");
    }

    /// Register for a session's events
    ///
    /// Every event carrying this session id is delivered to the returned
    /// receiver and nowhere else; dropping the receiver detaches the route.
    pub async fn subscribe_session(&self, session_id: &str) -> mpsc::Receiver<CdpEvent> {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.routes.lock().await.insert(session_id.to_string(), tx);
        rx
    }

    /// The underlying transport
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Browser version info, also a cheap connectivity check
    pub async fn version(&self) -> Result<BrowserGetVersionResult> {
        self.transport
            .send("Browser.getVersion", &BrowserGetVersion {})
            .await
    }

    /// Create a new target (tab)
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result: TargetCreateTargetResult = self
            .transport
            .send(
                "Target.createTarget",
                &TargetCreateTarget {
                    url: url.to_string(),
                },
            )
            .await?;
        Ok(result.target_id)
    }

    /// Attach to a target with a flat session
    pub async fn attach_to_target(&self, target_id: &str) -> Result<Session> {
        let result: TargetAttachToTargetResult = self
            .transport
            .send(
                "Target.attachToTarget",
                &TargetAttachToTarget {
                    target_id: target_id.to_string(),
                    flatten: Some(true),
                },
            )
            .await?;

        Ok(Session {
            transport: Arc::clone(&self.transport),
            session_id: result.session_id,
            target_id: target_id.to_string(),
        })
    }

    /// Close a target
    pub async fn close_target(&self, target_id: &str) -> Result<bool> {
        let result: TargetCloseTargetResult = self
            .transport
            .send(
                "Target.closeTarget",
                &TargetCloseTarget {
                    target_id: target_id.to_string(),
                },
            )
            .await?;
        Ok(result.success)
    }

    /// Ask the browser to shut down, then drop the WebSocket
    pub async fn close(&self) {
        let _ = self
            .transport
            .send::<_, serde_json::Value>("Browser.close", &BrowserClose {})
            .await;
        self.transport.close().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// A CDP session attached to a specific target
#[derive(Clone)]
pub struct Session {
    transport: Arc<Transport>,
    session_id: String,
    target_id: String,
}

impl Session {
    /// The session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The target id
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Send a command to this session
    pub async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.transport
            .send_to_session(&self.session_id, method, params)
            .await
    }

    // =========================================================================
    // Page
    // =========================================================================

    /// Enable page events for this session
    pub async fn page_enable(&self) -> Result<()> {
        self.send::<_, serde_json::Value>("Page.enable", &PageEnable {})
            .await?;
        Ok(())
    }

    /// Toggle lifecycle events (load, networkIdle, networkAlmostIdle, ...)
    pub async fn set_lifecycle_events_enabled(&self, enabled: bool) -> Result<()> {
        self.send::<_, serde_json::Value>(
            "Page.setLifecycleEventsEnabled",
            &PageSetLifecycleEventsEnabled { enabled },
        )
        .await?;
        Ok(())
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<PageNavigateResult> {
        self.send(
            "Page.navigate",
            &PageNavigate {
                url: url.to_string(),
            },
        )
        .await
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Dispatch a mouse event
    pub async fn dispatch_mouse_event(
        &self,
        event_type: MouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
        click_count: Option<i32>,
    ) -> Result<()> {
        self.send::<_, serde_json::Value>(
            "Input.dispatchMouseEvent",
            &InputDispatchMouseEvent {
                r#type: event_type,
                x,
                y,
                button,
                click_count,
            },
        )
        .await?;
        Ok(())
    }

    /// Dispatch a key event
    pub async fn dispatch_key_event(
        &self,
        event_type: KeyEventType,
        key: Option<&str>,
        text: Option<&str>,
        code: Option<&str>,
    ) -> Result<()> {
        self.send::<_, serde_json::Value>(
            "Input.dispatchKeyEvent",
            &InputDispatchKeyEvent {
                r#type: event_type,
                text: text.map(String::from),
                key: key.map(String::from),
                code: code.map(String::from),
            },
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // DOM
    // =========================================================================

    /// Get the document root node id
    pub async fn get_document(&self) -> Result<i32> {
        let result: DomGetDocumentResult = self
            .send(
                "DOM.getDocument",
                &DomGetDocument {
                    depth: Some(0),
                    pierce: Some(true),
                },
            )
            .await?;
        Ok(result.root.node_id)
    }

    /// Query for a single element; node id 0 means no match
    pub async fn query_selector(&self, node_id: i32, selector: &str) -> Result<i32> {
        let result: DomQuerySelectorResult = self
            .send(
                "DOM.querySelector",
                &DomQuerySelector {
                    node_id,
                    selector: selector.to_string(),
                },
            )
            .await?;
        Ok(result.node_id)
    }

    /// Query for all matching elements, in document order
    pub async fn query_selector_all(&self, node_id: i32, selector: &str) -> Result<Vec<i32>> {
        let result: DomQuerySelectorAllResult = self
            .send(
                "DOM.querySelectorAll",
                &DomQuerySelectorAll {
                    node_id,
                    selector: selector.to_string(),
                },
            )
            .await?;
        Ok(result.node_ids)
    }

    /// Focus an element
    pub async fn focus(&self, node_id: i32) -> Result<()> {
        self.send::<_, serde_json::Value>(
            "DOM.focus",
            &DomFocus {
                node_id: Some(node_id),
            },
        )
        .await?;
        Ok(())
    }

    /// Get the box model for an element
    pub async fn get_box_model(&self, node_id: i32) -> Result<BoxModel> {
        let result: DomGetBoxModelResult = self
            .send(
                "DOM.getBoxModel",
                &DomGetBoxModel {
                    node_id: Some(node_id),
                },
            )
            .await?;
        Ok(result.model)
    }

    /// Resolve a DOM node to a Runtime remote object id
    pub async fn resolve_node(&self, node_id: i32) -> Result<String> {
        let result: DomResolveNodeResult = self
            .send(
                "DOM.resolveNode",
                &DomResolveNode {
                    node_id: Some(node_id),
                    object_group: Some("quiesce".to_string()),
                },
            )
            .await?;
        result
            .object
            .object_id
            .ok_or_else(|| Error::cdp("DOM.resolveNode", -1, "No object_id returned"))
    }

    // =========================================================================
    // Runtime
    // =========================================================================

    /// Evaluate a JavaScript expression, returning the result by value
    pub async fn evaluate(&self, expression: &str) -> Result<RuntimeEvaluateResult> {
        self.send(
            "Runtime.evaluate",
            &RuntimeEvaluate {
                expression: expression.to_string(),
                object_group: None,
                return_by_value: Some(true),
                await_promise: Some(true),
            },
        )
        .await
    }

    /// Call a function with `this` bound to a remote object, by value
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function_declaration: &str,
    ) -> Result<RuntimeCallFunctionOnResult> {
        self.send(
            "Runtime.callFunctionOn",
            &RuntimeCallFunctionOn {
                function_declaration: function_declaration.to_string(),
                object_id: Some(object_id.to_string()),
                return_by_value: Some(true),
                await_promise: Some(true),
            },
        )
        .await
    }
}
