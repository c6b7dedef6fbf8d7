use crate::error::{Result, VastError};
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use std::mem;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

/// Timeout applied to each tracking request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Sends tracking pixels.
///
/// Implementations are fire-and-forget: failures stay inside the dispatcher
/// and never reach the tracker.
pub trait Dispatcher {
    fn fire(&self, urls: &[String]);
}

impl<D: Dispatcher + ?Sized> Dispatcher for &D {
    fn fire(&self, urls: &[String]) {
        (**self).fire(urls)
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn fire(&self, urls: &[String]) {
        (**self).fire(urls)
    }
}

/// Dispatcher that only logs the URLs it is given
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn fire(&self, urls: &[String]) {
        for url in urls {
            info!("Tracking (dry run): {}", url);
        }
    }
}

/// Dispatcher sending one GET request per URL on a tokio runtime
pub struct HttpDispatcher {
    client: reqwest::Client,
    runtime: Handle,
    pending: Mutex<JoinSet<()>>,
}

impl HttpDispatcher {
    /// Create a dispatcher bound to the current tokio runtime
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| VastError::Other(format!("No tokio runtime available: {}", e)))?;
        Self::with_runtime(runtime)
    }

    /// Create a dispatcher spawning its requests on `runtime`
    pub fn with_runtime(runtime: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VastError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpDispatcher {
            client,
            runtime,
            pending: Mutex::new(JoinSet::new()),
        })
    }

    /// Number of requests still in flight
    pub fn pending(&self) -> usize {
        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        reap(&mut pending);
        pending.len()
    }

    /// Wait for every request fired so far to finish
    pub async fn drain(&self) {
        let mut pending = match self.pending.lock() {
            Ok(mut pending) => mem::take(&mut *pending),
            Err(poisoned) => mem::take(&mut *poisoned.into_inner()),
        };
        while pending.join_next().await.is_some() {}
    }
}

impl Dispatcher for HttpDispatcher {
    fn fire(&self, urls: &[String]) {
        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        reap(&mut pending);

        for raw in urls {
            let url = match url::Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping invalid tracking URL {}: {}", raw, e);
                    continue;
                }
            };
            pending.spawn_on(send_pixel(self.client.clone(), url), &self.runtime);
        }
    }
}

/// Drop the handles of requests that already finished
fn reap(pending: &mut JoinSet<()>) {
    while pending.try_join_next().is_some() {}
}

/// Send a single tracking request, logging the outcome
async fn send_pixel(client: reqwest::Client, url: url::Url) {
    // Random request ID for correlating log lines
    let req_id: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    debug!("[{}] Tracking: {}", req_id, url);
    let start_time = Instant::now();

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("[{}] Tracked in {:?}", req_id, start_time.elapsed());
        }
        Ok(response) => {
            warn!(
                "[{}] Tracking request returned HTTP status {}",
                req_id,
                response.status()
            );
        }
        Err(e) => {
            warn!(
                "[{}] Tracking request failed after {:?}: {}",
                req_id,
                start_time.elapsed(),
                e
            );
        }
    }
}
