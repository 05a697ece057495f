//! Browser management using `chromiumoxide`.
//!
//! Two ways to get a tab:
//! * attach to a browser the user already runs with `--remote-debugging-port`
//!   (`browser.ws_url` / `CHROME_WS_URL`; an `http://host:port` endpoint is
//!   resolved through `/json/version`);
//! * launch a local Chromium-family browser on a persistent profile directory,
//!   headed by default so the user can log in once and watch the run.
//!
//! When attached, the tab already showing a search listing is reused and the
//! browser is never closed on exit.

use crate::core::config::{BrowserSection, ENV_CHROME_EXECUTABLE};
use crate::core::types::PageKind;
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var(ENV_CHROME_EXECUTABLE) {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Build a `BrowserConfig` on a persistent profile.
///
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`.
pub fn build_profile_config(
    exe: &str,
    profile_dir: Option<&Path>,
    headless: bool,
) -> Result<BrowserConfig> {
    let (width, height) = (1440u32, 960u32);
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-blink-features=AutomationControlled");

    if !headless {
        builder = builder.with_head();
    }
    if let Some(dir) = profile_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("browser: cannot create profile dir {}: {}", dir.display(), e);
        }
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Accept either a `ws://` debugger URL or an `http://host:port` endpoint.
async fn resolve_debugger_url(endpoint: &str) -> Result<String> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }
    let json_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let json: serde_json::Value = reqwest::get(&json_url)
        .await
        .map_err(|e| anyhow!("HTTP request to {} failed: {}", json_url, e))?
        .json()
        .await
        .map_err(|e| anyhow!("JSON parse failed: {}", e))?;
    json["webSocketDebuggerUrl"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("No webSocketDebuggerUrl in response"))
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    })
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A browser plus the single tab the run drives.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    /// Launched by us (closed on shutdown) vs. attached (left running).
    owned: bool,
}

impl BrowserSession {
    pub async fn open(cfg: &BrowserSection, start_url: Option<&str>) -> Result<Self> {
        match cfg.resolve_ws_url() {
            Some(endpoint) => Self::attach(&endpoint, start_url).await,
            None => Self::launch(cfg, start_url).await,
        }
    }

    async fn attach(endpoint: &str, start_url: Option<&str>) -> Result<Self> {
        let ws_url = resolve_debugger_url(endpoint).await?;
        info!("browser: attaching to {}", ws_url);
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| anyhow!("Browser connect failed: {}", e))?;
        let handler = spawn_handler(handler);

        let mut listing_tab = None;
        if let Ok(pages) = browser.pages().await {
            for page in pages {
                let url = page.url().await.ok().flatten().unwrap_or_default();
                if PageKind::from_url(&url) != PageKind::Other {
                    info!("browser: reusing tab {}", url);
                    listing_tab = Some(page);
                    break;
                }
            }
        }

        let page = match (listing_tab, start_url) {
            (Some(page), None) => page,
            (Some(page), Some(url)) => {
                page.goto(url)
                    .await
                    .map_err(|e| anyhow!("goto {} failed: {}", url, e))?;
                page
            }
            (None, url) => browser
                .new_page(url.unwrap_or("about:blank"))
                .await
                .map_err(|e| anyhow!("Failed to open tab: {}", e))?,
        };

        Ok(Self {
            browser,
            page,
            handler,
            owned: false,
        })
    }

    async fn launch(cfg: &BrowserSection, start_url: Option<&str>) -> Result<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!("No browser found. Install Chrome or Chromium, set CHROME_EXECUTABLE, or attach with CHROME_WS_URL.")
        })?;
        let profile = cfg.resolve_profile_dir();
        info!(
            "browser: launching {} (profile: {:?}, headless: {})",
            exe, profile, cfg.headless
        );
        let config = build_profile_config(&exe, profile.as_deref(), cfg.headless)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;
        let handler = spawn_handler(handler);

        let page = browser
            .new_page(start_url.unwrap_or("about:blank"))
            .await
            .map_err(|e| anyhow!("Failed to open tab: {}", e))?;

        Ok(Self {
            browser,
            page,
            handler,
            owned: true,
        })
    }

    pub fn page(&self) -> Page {
        self.page.clone()
    }

    /// Close a launched browser; detach from an attached one.
    pub async fn shutdown(mut self) {
        if self.owned {
            if let Err(e) = self.browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            let _ = self.browser.wait().await;
            info!("browser: closed");
        }
        self.handler.abort();
    }
}

// ── Smart wait ───────────────────────────────────────────────────────────────

/// Wait until `document.readyState` is `complete` and the resource count has
/// not changed for `quiet` (or `timeout` elapses).
pub async fn wait_until_stable(page: &Page, quiet: Duration, timeout: Duration) {
    let poll = Duration::from_millis(250);
    let start = tokio::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = tokio::time::Instant::now();

    loop {
        if start.elapsed() >= timeout {
            info!("wait_until_stable: timeout after {}ms", timeout.as_millis());
            break;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete || count != last_count {
            last_count = count;
            stable_since = tokio::time::Instant::now();
        } else if stable_since.elapsed() >= quiet {
            info!(
                "wait_until_stable: idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            break;
        }

        tokio::time::sleep(poll).await;
    }
}
