//! Chromium implementation of the browser traits via chromiumoxide

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    BrowserConfig, BrowserError, BrowserHandle, BrowserLauncher, PageDriver, PageOptions,
    RequestFilter, ResourceKind,
};
use crate::constants::selectors::PLAY_BUTTONS;

/// Clicks the first play/load/watch element; evaluates to whether one was found
const PLAY_BUTTON_SCRIPT: &str = r#"(() => {
    const buttons = document.querySelectorAll('__SELECTOR__');
    for (const btn of buttons) {
        const text = (btn.textContent || '').toLowerCase();
        if (text.includes('play') || text.includes('load') || text.includes('watch')) {
            try { btn.click(); } catch (e) { }
            return true;
        }
    }
    return false;
})()"#;

fn play_button_script() -> String {
    PLAY_BUTTON_SCRIPT.replace("__SELECTOR__", PLAY_BUTTONS)
}

/// Command-line flags for a low-footprint, less detectable headless Chromium
fn launch_args(config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--mute-audio".to_string(),
    ];
    if config.no_sandbox {
        args.push("--disable-setuid-sandbox".to_string());
    }
    args
}

fn build_launch_config(config: &BrowserConfig) -> Result<CdpBrowserConfig, BrowserError> {
    let mut builder = CdpBrowserConfig::builder()
        .window_size(config.window_width, config.window_height)
        .launch_timeout(config.launch_timeout);

    if !config.headless {
        builder = builder.with_head();
    }
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(exe) = &config.chrome_executable {
        builder = builder.chrome_executable(exe);
    }
    for arg in launch_args(config) {
        builder = builder.arg(arg);
    }

    builder
        .build()
        .map_err(|e| BrowserError::Launch(format!("Invalid browser config: {}", e)))
}

/// Resolve the websocket URL of a remote DevTools endpoint
async fn discover_ws_url(remote_url: &str) -> Result<String, BrowserError> {
    if remote_url.starts_with("ws://") || remote_url.starts_with("wss://") {
        return Ok(remote_url.to_string());
    }

    let version_url = format!("{}/json/version", remote_url.trim_end_matches('/'));
    let version: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| BrowserError::Launch(format!("Remote browser unreachable: {}", e)))?
        .json()
        .await
        .map_err(|e| BrowserError::Launch(format!("Invalid /json/version response: {}", e)))?;

    version
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Launch("No webSocketDebuggerUrl in response".to_string()))
}

/// Translate a DevTools error into the crate's error kinds
fn map_cdp_error(error: CdpError, op_timeout: Duration) -> BrowserError {
    match error {
        CdpError::Timeout => BrowserError::NavigationTimeout(op_timeout.as_millis() as u64),
        CdpError::Ws(_)
        | CdpError::NoResponse
        | CdpError::ChannelSendError(_)
        | CdpError::FrameNotFound(_) => BrowserError::Disconnected(error.to_string()),
        CdpError::JavascriptException(_) => BrowserError::Evaluation(error.to_string()),
        other => {
            let message = other.to_string();
            if is_target_gone(&message) {
                BrowserError::Disconnected(message)
            } else {
                BrowserError::Protocol(message)
            }
        }
    }
}

/// Chrome reports a closed, crashed or detached tab only through the message
const TARGET_GONE_MARKERS: &[&str] = &[
    "target closed",
    "target crashed",
    "page crashed",
    "session with given id not found",
    "no target with given id",
];

fn is_target_gone(message: &str) -> bool {
    let message = message.to_lowercase();
    TARGET_GONE_MARKERS.iter().any(|marker| message.contains(marker))
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Xhr | ResourceType::Fetch => ResourceKind::Xhr,
        _ => ResourceKind::Other,
    }
}

/// Launches a local Chromium, or connects to a remote one
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        let remote = self.config.remote_url.is_some();
        let (browser, mut handler) = match &self.config.remote_url {
            Some(remote_url) => {
                let ws_url = discover_ws_url(remote_url).await?;
                info!("Connecting to remote browser at {}", ws_url);
                Browser::connect(ws_url)
                    .await
                    .map_err(|e| BrowserError::Launch(format!("Failed to connect: {}", e)))?
            }
            None => {
                let config = build_launch_config(&self.config)?;
                Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?
            }
        };

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = Arc::clone(&alive);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            warn!("Browser connection closed");
        });

        Ok(Arc::new(ChromeBrowser {
            browser: Mutex::new(browser),
            alive,
            remote,
            open_pages: Arc::new(AtomicUsize::new(0)),
            handler_task,
        }))
    }
}

/// A running Chromium shared by all requests
pub struct ChromeBrowser {
    browser: Mutex<Browser>,
    alive: Arc<AtomicBool>,
    remote: bool,
    open_pages: Arc<AtomicUsize>,
    handler_task: JoinHandle<()>,
}

impl ChromeBrowser {
    async fn configure_page(page: &Page, options: &PageOptions) -> Result<(), BrowserError> {
        page.execute(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await
            .map_err(|e| map_cdp_error(e, options.timeout))?;
        install_request_filter(page, Arc::clone(&options.request_filter), options.timeout).await
    }
}

/// Abort filtered requests via the Fetch domain; everything else continues untouched
async fn install_request_filter(
    page: &Page,
    filter: Arc<RequestFilter>,
    op_timeout: Duration,
) -> Result<(), BrowserError> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| map_cdp_error(e, op_timeout))?;

    let pattern = RequestPattern::builder()
        .url_pattern("*")
        .request_stage(RequestStage::Request)
        .build();
    page.execute(FetchEnableParams::builder().pattern(pattern).build())
        .await
        .map_err(|e| map_cdp_error(e, op_timeout))?;

    let page = page.clone();
    tokio::spawn(async move {
        let mut blocked = 0usize;
        while let Some(event) = paused.next().await {
            let kind = resource_kind(&event.resource_type);
            let resolved = if filter.should_block(kind, &event.request.url) {
                blocked += 1;
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = resolved {
                debug!("Failed to resolve intercepted request: {}", e);
            }
        }
        debug!("Request interception ended, {} requests blocked", blocked);
    });

    Ok(())
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn new_page(&self, options: &PageOptions) -> Result<Box<dyn PageDriver>, BrowserError> {
        let page = {
            let browser = self.browser.lock().await;
            timeout(options.timeout, browser.new_page("about:blank"))
                .await
                .map_err(|_| BrowserError::Disconnected("timed out opening a page".to_string()))?
                .map_err(|e| map_cdp_error(e, options.timeout))?
        };
        self.open_pages.fetch_add(1, Ordering::SeqCst);

        let chrome_page = ChromePage {
            page,
            timeout: options.timeout,
            open_pages: Arc::clone(&self.open_pages),
        };
        if let Err(e) = Self::configure_page(&chrome_page.page, options).await {
            let _ = Box::new(chrome_page).close().await;
            return Err(e);
        }
        Ok(Box::new(chrome_page))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.alive.store(false, Ordering::SeqCst);
        if self.remote {
            self.handler_task.abort();
            return Ok(());
        }

        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        if let Err(e) = browser.wait().await {
            warn!("Failed to reap browser process: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }
}

/// One Chromium tab
pub struct ChromePage {
    page: Page,
    timeout: Duration,
    open_pages: Arc<AtomicUsize>,
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| map_cdp_error(e, self.timeout))?;

        let navigate = async {
            let response = self
                .page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| map_cdp_error(e, self.timeout))?;
            if let Some(error_text) = &response.result.error_text {
                return Err(BrowserError::Navigation(error_text.clone()));
            }
            dom_ready
                .next()
                .await
                .ok_or_else(|| BrowserError::Disconnected("page closed while loading".to_string()))?;
            Ok(())
        };

        timeout(self.timeout, navigate)
            .await
            .map_err(|_| BrowserError::NavigationTimeout(self.timeout.as_millis() as u64))?
    }

    async fn content(&self) -> Result<String, BrowserError> {
        timeout(self.timeout, self.page.content())
            .await
            .map_err(|_| BrowserError::NavigationTimeout(self.timeout.as_millis() as u64))?
            .map_err(|e| map_cdp_error(e, self.timeout))
    }

    async fn click_play_button(&self) -> Result<bool, BrowserError> {
        let result = timeout(self.timeout, self.page.evaluate(play_button_script()))
            .await
            .map_err(|_| BrowserError::NavigationTimeout(self.timeout.as_millis() as u64))?
            .map_err(|e| map_cdp_error(e, self.timeout))?;
        result
            .into_value::<bool>()
            .map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        let ChromePage {
            page,
            timeout: op_timeout,
            open_pages,
        } = *self;
        open_pages.fetch_sub(1, Ordering::SeqCst);
        timeout(op_timeout, page.close())
            .await
            .map_err(|_| BrowserError::Disconnected("timed out closing page".to_string()))?
            .map_err(|e| map_cdp_error(e, op_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_button_script_uses_selector() {
        let script = play_button_script();
        assert!(script.contains(PLAY_BUTTONS));
        assert!(!script.contains("__SELECTOR__"));
    }

    #[test]
    fn test_launch_args_are_low_footprint() {
        let args = launch_args(&BrowserConfig::default());
        assert!(args.contains(&"--disable-dev-shm-usage".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(!args.contains(&"--disable-setuid-sandbox".to_string()));
    }

    #[test]
    fn test_launch_args_without_sandbox() {
        let config = BrowserConfig {
            no_sandbox: true,
            ..BrowserConfig::default()
        };
        assert!(launch_args(&config).contains(&"--disable-setuid-sandbox".to_string()));
    }

    #[test]
    fn test_resource_kind_mapping() {
        assert_eq!(resource_kind(&ResourceType::Image), ResourceKind::Image);
        assert_eq!(resource_kind(&ResourceType::Stylesheet), ResourceKind::Stylesheet);
        assert_eq!(resource_kind(&ResourceType::Fetch), ResourceKind::Xhr);
        assert_eq!(resource_kind(&ResourceType::WebSocket), ResourceKind::Other);
    }

    #[test]
    fn test_timeout_is_retryable() {
        let error = map_cdp_error(CdpError::Timeout, Duration::from_secs(6));
        assert_eq!(error, BrowserError::NavigationTimeout(6000));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_closed_or_crashed_target_is_retryable() {
        for message in [
            "Target closed.",
            "Target crashed",
            "Session with given id not found.",
            "No target with given id found",
        ] {
            assert!(is_target_gone(message), "{}", message);
        }
        assert!(!is_target_gone("Invalid parameters"));
        assert!(!is_target_gone("Cannot find context with specified id"));

        let error = map_cdp_error(CdpError::msg("Target closed"), Duration::from_secs(6));
        assert!(matches!(error, BrowserError::Disconnected(_)));
        assert!(error.is_retryable());

        let error = map_cdp_error(CdpError::msg("Invalid parameters"), Duration::from_secs(6));
        assert!(matches!(error, BrowserError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_ws_url_passthrough() {
        let url = discover_ws_url("ws://127.0.0.1:9222/devtools/browser/abc")
            .await
            .unwrap();
        assert_eq!(url, "ws://127.0.0.1:9222/devtools/browser/abc");
    }

    #[tokio::test]
    #[ignore] // Requires Chrome/Chromium
    async fn test_launch_and_open_page() {
        let launcher = ChromeLauncher::new(BrowserConfig::default());
        let browser = launcher.launch().await.unwrap();
        let options = PageOptions {
            user_agent: "Mozilla/5.0".to_string(),
            timeout: Duration::from_secs(10),
            request_filter: Arc::new(RequestFilter::default()),
        };
        let page = browser.new_page(&options).await.unwrap();
        page.goto("https://example.com").await.unwrap();
        assert!(page.content().await.unwrap().contains("Example Domain"));
        page.close().await.unwrap();
        assert_eq!(browser.open_pages(), 0);
        browser.close().await.unwrap();
    }
}
