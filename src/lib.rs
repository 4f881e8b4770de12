//! # Quiesce
//!
//! Webmail-grade browser automation over a minimal custom CDP client.
//!
//! Quiesce drives Chrome through typed selector descriptors and paces its
//! input like a person. Its core is click settlement: after a click, webmail
//! SPAs fire a variable number of intermediate navigations, so the library
//! watches the frame graph and only returns once it has gone quiet under a
//! provider-specific timing profile.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quiesce::{Browser, Provider, Selector};
//!
//! #[tokio::main]
//! async fn main() -> quiesce::Result<()> {
//!     let browser = Browser::launch().await?;
//!     let page = browser.new_page("https://signup.live.com").await?;
//!
//!     page.type_text(&Selector::id("usernameInput"), "somebody123").await?;
//!     page.click_settled(&Selector::css("#nextButton"), Provider::Hotmail).await?;
//!
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use quiesce::{Browser, DriveConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> quiesce::Result<()> {
//! let config = DriveConfig {
//!     headless: false,
//!     type_delay_ms: (40, 140),
//!     ..Default::default()
//! };
//!
//! let browser = Browser::launch_with_config(config).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod browser;
pub mod cdp;
pub mod error;
pub mod gen;
pub mod page;
pub mod scroll;
pub mod selector;
pub mod settle;

// Re-exports
pub use backend::{
    ElementHandle, ElementInfo, Key, NavigationEvent, NavigationEvents, PageBackend, ScrollState,
};
pub use browser::Browser;
pub use error::{Error, Result};
pub use page::Page;
pub use scroll::{plan_dwell, plan_duration_ms, ScrollPlan, ScrollStep};
pub use selector::{Selector, SelectorKind};
pub use settle::{Provider, SettleState, SettleTiming, Settler, Termination};

/// Configuration for how pages are driven
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Per-character typing delay bounds, ms
    pub type_delay_ms: (u64, u64),
    /// Headless mode
    pub headless: bool,
    /// Path to Chrome/Chromium binary (None = auto-discover)
    pub chrome_path: Option<String>,
    /// Window width
    pub viewport_width: u32,
    /// Window height
    pub viewport_height: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            type_delay_ms: (30, 120),
            headless: true,
            chrome_path: None,
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }
}

impl DriveConfig {
    /// Visible (non-headless) config for watching runs locally
    pub fn visible() -> Self {
        Self {
            headless: false,
            ..Default::default()
        }
    }

    /// Config with no typing delay, for tests and fast non-interactive runs
    pub fn fast() -> Self {
        Self {
            type_delay_ms: (0, 0),
            ..Default::default()
        }
    }
}
