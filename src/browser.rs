//! Browser launcher
//!
//! Chrome discovery, launch with a fresh profile, and page creation over
//! the CDP connection.

use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cdp::transport::launch_chrome;
use crate::cdp::{CdpBackend, Connection, Transport};
use crate::error::{Error, Result};
use crate::page::Page;
use crate::DriveConfig;

/// Global counter for unique user data directories
static BROWSER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Well-known Chrome/Chromium install locations
const CHROME_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Locate a Chrome binary, honoring `CHROME_PATH` first
fn find_chrome() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    CHROME_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or(Error::ChromeNotFound)
}

/// Launch arguments for an automation-friendly Chrome
fn browser_args(config: &DriveConfig) -> Vec<String> {
    let mut args = vec![
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--disable-default-apps".into(),
        "--disable-sync".into(),
        "--disable-translate".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-hang-monitor".into(),
        "--disable-prompt-on-repost".into(),
        "--metrics-recording-only".into(),
        "--password-store=basic".into(),
        "--use-mock-keychain".into(),
        format!(
            "--window-size={},{}",
            config.viewport_width, config.viewport_height
        ),
    ];

    if config.headless {
        args.push("--headless=new".into());
    }

    args
}

/// A running Chrome instance under automation
pub struct Browser {
    connection: Connection,
    config: Arc<DriveConfig>,
    /// The launched Chrome child process; None when attached to an
    /// externally-managed browser
    child: Mutex<Option<Child>>,
    /// User data directory (cleaned up on close), launch-owned only
    user_data_dir: Option<PathBuf>,
}

impl Browser {
    /// Launch with default config
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(DriveConfig::default()).await
    }

    /// Attach to an already-running Chrome via its DevTools WebSocket URL
    ///
    /// The browser's lifetime stays with whoever started it; close() only
    /// drops the connection.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        Self::connect_with_config(ws_url, DriveConfig::default()).await
    }

    /// Attach with custom config
    pub async fn connect_with_config(ws_url: &str, config: DriveConfig) -> Result<Self> {
        let transport = Transport::connect(ws_url)?;
        let connection = Connection::new(transport);

        let version = connection.version().await?;
        tracing::info!("Attached to Chrome: {}", version.product);

        Ok(Self {
            connection,
            config: Arc::new(config),
            child: Mutex::new(None),
            user_data_dir: None,
        })
    }

    /// Launch with custom config
    pub async fn launch_with_config(config: DriveConfig) -> Result<Self> {
        let config = Arc::new(config);

        // Fresh profile per instance so runs never share state
        let instance_id = BROWSER_COUNTER.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "quiesce-browser-{}-{}",
            std::process::id(),
            instance_id
        ));
        let _ = std::fs::remove_dir_all(&user_data_dir);
        std::fs::create_dir_all(&user_data_dir)?;

        let chrome_path = match &config.chrome_path {
            Some(p) => PathBuf::from(p),
            None => find_chrome()?,
        };

        let mut args = browser_args(&config);
        args.push(format!("--user-data-dir={}", user_data_dir.display()));

        tracing::info!("Launching Chrome from {:?}", chrome_path);
        let (child, ws_url) = launch_chrome(&chrome_path, &args)?;

        let transport = Transport::connect(&ws_url)?;
        let connection = Connection::new(transport);

        let version = connection.version().await?;
        tracing::info!("Connected to Chrome: {}", version.product);

        Ok(Self {
            connection,
            config,
            child: Mutex::new(Some(child)),
            user_data_dir: Some(user_data_dir),
        })
    }

    /// Create a new page and navigate it to `url`
    pub async fn new_page(&self, url: &str) -> Result<Page<CdpBackend>> {
        let backend = self.attach_page().await?;
        backend.navigate(url).await?;

        Ok(Page::new(backend, Arc::clone(&self.config)))
    }

    /// Create a new page left at about:blank
    pub async fn new_blank_page(&self) -> Result<Page<CdpBackend>> {
        let backend = self.attach_page().await?;

        Ok(Page::new(backend, Arc::clone(&self.config)))
    }

    /// Create a target, attach a session, and route its events to a new
    /// backend
    async fn attach_page(&self) -> Result<CdpBackend> {
        let target_id = self.connection.create_target("about:blank").await?;
        let session = self.connection.attach_to_target(&target_id).await?;

        let events = self.connection.subscribe_session(session.session_id()).await;
        CdpBackend::attach(session, events).await
    }

    /// Close a tab by target id
    pub async fn close_tab(&self, target_id: &str) -> Result<()> {
        self.connection.close_target(target_id).await?;
        Ok(())
    }

    /// Shut the browser down and clean up its profile
    ///
    /// For attached browsers this only drops the connection.
    pub async fn close(self) -> Result<()> {
        self.connection.close().await;

        if let Ok(mut child) = self.child.lock() {
            if let Some(child) = child.as_mut() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        if let Some(dir) = &self.user_data_dir {
            let _ = std::fs::remove_dir_all(dir);
        }
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        // Best-effort cleanup if close() wasn't called
        if let Ok(mut child) = self.child.lock() {
            if let Some(child) = child.as_mut() {
                let _ = child.kill();
            }
        }
        if let Some(dir) = &self.user_data_dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
