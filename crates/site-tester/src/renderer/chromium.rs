//! Chromium-based renderer using chromiumoxide.
//!
//! The document request for the target URL is intercepted with the CDP
//! `Fetch` domain and fulfilled with the (possibly transformed) markup, so
//! the page keeps the target URL as its location while sub-resources load
//! from the network as usual.

use super::{LoadResult, RenderContext, Renderer};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FulfillRequestParams, HeaderEntry,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::ResourceType;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventLoadEventFired,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. SITE_TESTER_CHROMIUM env
    if let Ok(p) = std::env::var("SITE_TESTER_CHROMIUM") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.site-tester/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".site-tester/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".site-tester/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".site-tester/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".site-tester/chromium/chrome-linux64/chrome"),
                home.join(".site-tester/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch options for [`ChromiumRenderer`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Explicit browser binary; falls back to [`find_chromium`] discovery.
    pub executable: Option<PathBuf>,
    /// Window size of the visual viewport.
    pub window: (u32, u32),
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            window: (1280, 800),
        }
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn launch(options: &ChromiumOptions) -> Result<Self> {
        let chrome_path = find_chromium(options.executable.as_deref())
            .context("Chromium not found. Pass --chromium or set SITE_TESTER_CHROMIUM.")?;
        let (width, height) = options.window;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(width, height)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            interceptor: None,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;
        self.handler.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn add_init_script(&mut self, source: &str) -> Result<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .context("failed to install init script")?;
        Ok(())
    }

    async fn load(&mut self, url: &str, markup: &str) -> Result<LoadResult> {
        let start = Instant::now();

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to listen for paused requests")?;
        let mut loaded = self
            .page
            .event_listener::<EventLoadEventFired>()
            .await
            .context("failed to listen for the load event")?;

        self.page
            .execute(
                fetch::EnableParams::builder()
                    .patterns(vec![RequestPattern::builder()
                        .url_pattern("*")
                        .resource_type(ResourceType::Document)
                        .request_stage(RequestStage::Request)
                        .build()])
                    .build(),
            )
            .await
            .context("failed to enable request interception")?;

        let page = self.page.clone();
        let document_url = url.to_string();
        let body = BASE64_STANDARD.encode(markup);
        self.interceptor = Some(tokio::spawn(async move {
            let mut served = false;
            while let Some(event) = paused.next().await {
                if !served && same_document(&event.request.url, &document_url) {
                    served = true;
                    let fulfill = FulfillRequestParams::builder()
                        .request_id(event.request_id.clone())
                        .response_code(200)
                        .response_headers(vec![HeaderEntry::new(
                            "Content-Type",
                            "text/html; charset=utf-8",
                        )])
                        .body(body.clone())
                        .build();
                    match fulfill {
                        Ok(params) => {
                            if let Err(e) = page.execute(params).await {
                                tracing::warn!("failed to fulfill document request: {e}");
                            }
                        }
                        Err(e) => tracing::warn!("invalid fulfill request: {e}"),
                    }
                } else if let Err(e) = page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                {
                    tracing::debug!("failed to continue {}: {e}", event.request.url);
                }
            }
        }));

        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        loaded
            .next()
            .await
            .context("page closed before the load event")?;

        let final_url = self
            .page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        Ok(LoadResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("invalid evaluate params: {e}"))?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.execute_js("document.documentElement.outerHTML")
            .await
            .and_then(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("document has no root element"))
            })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        if let Some(interceptor) = &self.interceptor {
            interceptor.abort();
        }
        let _ = self.page.close().await;
        Ok(())
    }
}

/// Whether a paused request is the navigation to `target`, ignoring the
/// fragment and the trailing-slash normalization Chromium applies.
fn same_document(requested: &str, target: &str) -> bool {
    match (url::Url::parse(requested), url::Url::parse(target)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a == b
        }
        _ => requested == target,
    }
}
