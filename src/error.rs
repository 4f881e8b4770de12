//! Error types for quiesce

use thiserror::Error;

use crate::selector::SelectorKind;

/// Result type for quiesce operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for quiesce
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to launch Chrome
    #[error("Failed to launch Chrome: {0}")]
    Launch(String),

    /// Chrome not found
    #[error("Chrome not found")]
    ChromeNotFound,

    /// Transport error
    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// CDP protocol error
    #[error("CDP error in {method}: {message} (code {code})")]
    Cdp {
        method: String,
        code: i64,
        message: String,
    },

    /// CDP error without method context (for simple cases)
    #[error("CDP error: {0}")]
    CdpSimple(String),

    /// Navigation error
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// No element matched the selector
    #[error("Element not found: {selector} ({kind})")]
    ElementNotFound {
        selector: String,
        kind: SelectorKind,
    },

    /// Selector kind is outside the set an operation accepts
    #[error("Unsupported selector kind {kind} for {operation}")]
    UnsupportedSelector {
        kind: SelectorKind,
        operation: &'static str,
    },

    /// An element resolved by XPath carries no attribute a plain selector
    /// could be derived from
    #[error("Cannot derive a plain selector: {0}")]
    SelectorUnderivable(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transport error with context
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            source: None,
        }
    }

    /// Create a transport error with IO source
    pub fn transport_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a CDP error with full context
    pub fn cdp(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an element-not-found error from a selector descriptor
    pub fn not_found(selector: &crate::selector::Selector) -> Self {
        Self::ElementNotFound {
            selector: selector.expr.clone(),
            kind: selector.kind,
        }
    }

    /// Create an unsupported-selector-kind error
    pub fn unsupported(kind: SelectorKind, operation: &'static str) -> Self {
        Self::UnsupportedSelector { kind, operation }
    }

    /// True for failures that mean "the target was not there", as opposed
    /// to protocol or transport breakage
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ElementNotFound { .. })
    }
}
