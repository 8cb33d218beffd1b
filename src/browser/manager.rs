//! Shared browser lifecycle
//!
//! A single browser process is launched lazily and reused by every request.
//! Callers arriving while a launch is in flight await the same future, so a
//! burst of first requests spawns exactly one process. A failed launch is not
//! remembered: the next caller starts a fresh attempt.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, BrowserHandle, BrowserLauncher, PageDriver, PageOptions};

type LaunchFuture = Shared<BoxFuture<'static, Result<Arc<dyn BrowserHandle>, BrowserError>>>;

enum LaunchState {
    Idle,
    Launching { generation: u64, pending: LaunchFuture },
    Ready(Arc<dyn BrowserHandle>),
}

/// Owns the shared browser and hands out pages
pub struct BrowserManager {
    launcher: Arc<dyn BrowserLauncher>,
    state: Mutex<LaunchState>,
    generation: AtomicU64,
    page_slots: Arc<Semaphore>,
}

impl BrowserManager {
    /// Create a manager that allows `max_pages` simultaneously open pages
    pub fn new(launcher: Arc<dyn BrowserLauncher>, max_pages: usize) -> Self {
        Self {
            launcher,
            state: Mutex::new(LaunchState::Idle),
            generation: AtomicU64::new(0),
            page_slots: Arc::new(Semaphore::new(max_pages.max(1))),
        }
    }

    /// Close whatever browser is current when ctrl-c arrives
    pub fn spawn_shutdown_hook(self: &Arc<Self>) -> JoinHandle<()> {
        self.spawn_shutdown_on(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                futures::future::pending::<()>().await;
            }
        })
    }

    /// Shut the browser down once `signal` resolves, if the manager is still alive
    pub fn spawn_shutdown_on<F>(self: &Arc<Self>, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            signal.await;
            if let Some(manager) = manager.upgrade() {
                info!("Shutdown signal received, closing shared browser");
                manager.shutdown().await;
            }
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, LaunchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Get the shared browser, launching it if needed
    pub async fn get_browser(&self) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        let (generation, pending) = {
            let mut state = self.lock_state();
            match &*state {
                LaunchState::Ready(handle) if handle.is_alive() => return Ok(Arc::clone(handle)),
                LaunchState::Launching { generation, pending } => (*generation, pending.clone()),
                current => {
                    if matches!(current, LaunchState::Ready(_)) {
                        warn!("Shared browser is no longer connected, relaunching");
                    } else {
                        info!("Launching shared headless browser");
                    }
                    let launcher = Arc::clone(&self.launcher);
                    let pending = async move { launcher.launch().await }.boxed().shared();
                    let generation = self.next_generation();
                    *state = LaunchState::Launching {
                        generation,
                        pending: pending.clone(),
                    };
                    (generation, pending)
                }
            }
        };

        let outcome = pending.await;

        {
            let mut state = self.lock_state();
            let settles = matches!(
                &*state,
                LaunchState::Launching { generation: current, .. } if *current == generation
            );
            if settles {
                *state = match &outcome {
                    Ok(handle) => {
                        info!("Shared browser ready");
                        LaunchState::Ready(Arc::clone(handle))
                    }
                    Err(e) => {
                        warn!("Browser launch failed: {}", e);
                        LaunchState::Idle
                    }
                };
            }
        }

        outcome
    }

    /// Open a page on `handle`, waiting for a free page slot first
    pub async fn prepare_page(
        &self,
        handle: &Arc<dyn BrowserHandle>,
        options: &PageOptions,
    ) -> Result<PageLease, BrowserError> {
        let permit = Arc::clone(&self.page_slots)
            .acquire_owned()
            .await
            .map_err(|_| BrowserError::Disconnected("page pool closed".to_string()))?;
        let page = handle.new_page(options).await?;
        Ok(PageLease {
            page: Some(page),
            permit: Some(permit),
        })
    }

    /// Whether a live browser is currently held
    pub fn is_running(&self) -> bool {
        matches!(&*self.lock_state(), LaunchState::Ready(handle) if handle.is_alive())
    }

    /// Pages currently open on the shared browser
    pub fn open_pages(&self) -> usize {
        match &*self.lock_state() {
            LaunchState::Ready(handle) => handle.open_pages(),
            _ => 0,
        }
    }

    /// Close the shared browser; the next `get_browser` launches a new one
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), LaunchState::Idle);
        if let LaunchState::Ready(handle) = previous {
            info!("Closing shared browser");
            if let Err(e) = handle.close().await {
                warn!("Failed to close browser: {}", e);
            }
        }
    }
}

/// An open page holding one of the manager's page slots
///
/// A lease dropped without [`PageLease::close`], for example when the request
/// future is cancelled, closes its page on a background task. The slot is
/// held until that close finishes.
pub struct PageLease {
    page: Option<Box<dyn PageDriver>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PageLease {
    pub fn page(&self) -> &dyn PageDriver {
        self.page
            .as_deref()
            .expect("page is only taken by close or drop")
    }

    /// Close the page and give the slot back
    pub async fn close(mut self) -> Result<(), BrowserError> {
        let _permit = self.permit.take();
        match self.page.take() {
            Some(page) => page.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let permit = self.permit.take();
        match Handle::try_current() {
            Ok(runtime) => {
                debug!("Page lease dropped while open, closing page in background");
                runtime.spawn(async move {
                    if let Err(e) = page.close().await {
                        warn!("Failed to close abandoned page: {}", e);
                    }
                    drop(permit);
                });
            }
            Err(_) => warn!("Page lease dropped outside a runtime, page left open"),
        }
    }
}
