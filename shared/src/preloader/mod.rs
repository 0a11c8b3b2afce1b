use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::PreloadError;
use crate::media::MediaLoader;

mod record;

pub use record::{PreloadRecord, PreloadSummary};

pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_millis(100);

struct PreloaderState {
    pending: VecDeque<String>,

    /// URL currently being loaded by the drain loop.
    in_flight: Option<String>,

    /// Append-only, only successful preloads end up here.
    preloaded: HashMap<String, PreloadRecord>,

    is_preloading: bool,

    summary: PreloadSummary,
}

impl PreloaderState {
    fn is_known(&self, url: &str) -> bool {
        self.preloaded.contains_key(url)
            || self.in_flight.as_deref() == Some(url)
            || self.pending.iter().any(|pending_url| pending_url == url)
    }
}

struct PreloaderInner {
    loader: Arc<dyn MediaLoader>,

    inter_item_delay: Duration,

    state: Mutex<PreloaderState>,

    preloading_tx: watch::Sender<bool>,
}

impl PreloaderInner {
    fn lock_state(&self) -> MutexGuard<'_, PreloaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background warm-up of video URLs, one at a time, each URL at most once.
///
/// Failed preloads are logged and forgotten: they are not recorded as preloaded, so a later
/// submission of the same URL tries again.
#[derive(Clone)]
pub struct VideoPreloader {
    inner: Arc<PreloaderInner>,
}

impl VideoPreloader {
    pub fn new(loader: Arc<dyn MediaLoader>, inter_item_delay: Duration) -> Self {
        let (preloading_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(PreloaderInner {
                loader,
                inter_item_delay,
                state: Mutex::new(PreloaderState {
                    pending: VecDeque::new(),
                    in_flight: None,
                    preloaded: HashMap::new(),
                    is_preloading: false,
                    summary: PreloadSummary::default(),
                }),
                preloading_tx,
            }),
        }
    }

    /// Queue a batch of URLs, skipping ones that are already preloaded, pending or in flight.
    /// Starts draining if the preloader is idle. Returns how many URLs were actually queued.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_to_queue<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut newly_queued: usize = 0;
        let mut skipped: usize = 0;

        let should_start_draining = {
            let mut state = self.inner.lock_state();

            for url in urls {
                let url = url.into();

                if state.is_known(&url) {
                    skipped += 1;
                    continue;
                }

                state.pending.push_back(url);
                newly_queued += 1;
            }

            state.summary.total_queued += newly_queued;
            state.summary.total_skipped += skipped;

            if state.is_preloading || state.pending.is_empty() {
                false
            } else {
                state.is_preloading = true;
                self.inner.preloading_tx.send_replace(true);
                true
            }
        };

        debug!(
            newly_queued = newly_queued,
            skipped = skipped,
            "Added batch to video preload queue."
        );

        if should_start_draining {
            tokio::spawn(Self::drain(self.inner.clone()));
        }

        newly_queued
    }

    /// `true` iff a previous preload of `url` succeeded.
    pub fn is_preloaded(&self, url: &str) -> bool {
        self.inner.lock_state().preloaded.contains_key(url)
    }

    pub fn record(&self, url: &str) -> Option<PreloadRecord> {
        self.inner.lock_state().preloaded.get(url).cloned()
    }

    /// Snapshot of the URLs still waiting, in the order they will be loaded.
    pub fn pending(&self) -> Vec<String> {
        self.inner.lock_state().pending.iter().cloned().collect()
    }

    pub fn in_flight(&self) -> Option<String> {
        self.inner.lock_state().in_flight.clone()
    }

    pub fn is_preloading(&self) -> bool {
        self.inner.lock_state().is_preloading
    }

    pub fn summary(&self) -> PreloadSummary {
        self.inner.lock_state().summary
    }

    /// Resolves once the pending list has drained and the drain loop has stopped.
    pub async fn wait_until_idle(&self) {
        let mut preloading_rx = self.inner.preloading_tx.subscribe();
        let _ = preloading_rx
            .wait_for(|is_preloading| !*is_preloading)
            .await;
    }

    async fn drain(inner: Arc<PreloaderInner>) {
        debug!("Started draining video preload queue.");

        loop {
            let url = {
                let mut state = inner.lock_state();

                match state.pending.pop_front() {
                    Some(url) => {
                        state.in_flight = Some(url.clone());
                        url
                    }
                    None => {
                        state.is_preloading = false;
                        inner.preloading_tx.send_replace(false);
                        break;
                    }
                }
            };

            let preload_result = match AssertUnwindSafe(async { inner.loader.preload(&url).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(PreloadError::LoaderPanicked { url: url.clone() }),
            };

            {
                let mut state = inner.lock_state();
                state.in_flight = None;

                match preload_result {
                    Ok(receipt) => {
                        let record = PreloadRecord::from_receipt(receipt);
                        state.summary.trace_attempt(Some(&record));

                        info!(
                            url = url,
                            buffered_bytes = record.buffered_bytes,
                            "Preloaded video."
                        );
                        state.preloaded.insert(url, record);
                    }
                    Err(error) => {
                        state.summary.trace_attempt(None);

                        warn!(
                            url = url,
                            error = %error,
                            "Failed to preload video, dropping it."
                        );
                    }
                }
            }

            tokio::time::sleep(inner.inter_item_delay).await;
        }

        debug!("Video preload queue drained, going idle.");
    }
}
