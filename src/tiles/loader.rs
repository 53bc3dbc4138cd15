//! Loader boundary.
//!
//! The manager hands every load to a [`TileLoader`] together with a
//! [`CompletionHandle`]. The loader may finish on any thread; the handle only
//! queues the outcome on a channel that the manager drains on its own thread
//! in `process_completions`. A handle whose manager is gone silently drops
//! the outcome.

use crossbeam_channel::Sender;
use std::sync::Weak;
use std::time::Duration;

use crate::core::config::StyleParameters;
use crate::prelude::{Arc, Mutex};
use crate::tiles::content::TileContent;
use crate::tiles::factory::SourceKind;
use crate::tiles::id::OverscaledTileId;
use crate::LoadError;

pub type LoadOutcome = std::result::Result<Arc<dyn TileContent>, LoadError>;

/// What a loader is asked to produce
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub id: OverscaledTileId,
    pub kind: SourceKind,
    pub style: Arc<StyleParameters>,
    /// Attempt number the outcome will be matched against
    pub attempt: u64,
}

/// A finished load waiting to be applied on the owning thread
#[derive(Debug)]
pub(crate) struct Completion {
    pub id: OverscaledTileId,
    pub attempt: u64,
    pub outcome: LoadOutcome,
}

/// Sendable callback a loader uses to report one load attempt.
pub struct CompletionHandle {
    tx: Sender<Completion>,
    alive: Weak<()>,
    id: OverscaledTileId,
    attempt: u64,
}

impl CompletionHandle {
    pub(crate) fn new(
        tx: Sender<Completion>,
        alive: Weak<()>,
        id: OverscaledTileId,
        attempt: u64,
    ) -> Self {
        Self {
            tx,
            alive,
            id,
            attempt,
        }
    }

    pub fn id(&self) -> OverscaledTileId {
        self.id
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// False once the owning manager has been dropped
    pub fn is_live(&self) -> bool {
        self.alive.strong_count() > 0
    }

    /// Reports the outcome. Returns false if it was dropped because the
    /// manager no longer exists.
    pub fn complete(self, outcome: LoadOutcome) -> bool {
        if !self.is_live() {
            log::trace!("dropping completion for {}: manager gone", self.id);
            return false;
        }
        self.tx
            .send(Completion {
                id: self.id,
                attempt: self.attempt,
                outcome,
            })
            .is_ok()
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("live", &self.is_live())
            .finish()
    }
}

/// External tile loader. Must not block; completion is reported through the
/// handle whenever the load finishes.
pub trait TileLoader: Send + Sync {
    fn load(&self, request: LoadRequest, handle: CompletionHandle);
}

/// Loader that only records requests. The caller decides when and how each
/// one completes, which makes load ordering fully deterministic.
#[derive(Default)]
pub struct QueuedLoader {
    pending: Mutex<Vec<(LoadRequest, CompletionHandle)>>,
    history: Mutex<Vec<OverscaledTileId>>,
}

impl QueuedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Vec<(LoadRequest, CompletionHandle)>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every request ever issued, in order
    pub fn requests(&self) -> Vec<OverscaledTileId> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Outstanding requests, oldest first
    pub fn pending_ids(&self) -> Vec<OverscaledTileId> {
        self.pending().iter().map(|(request, _)| request.id).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    /// Completes the oldest outstanding request for `id`.
    pub fn complete(&self, id: &OverscaledTileId, outcome: LoadOutcome) -> bool {
        let key = id.without_wrap();
        let entry = {
            let mut pending = self.pending();
            pending
                .iter()
                .position(|(request, _)| request.id == key)
                .map(|index| pending.remove(index))
        };
        match entry {
            Some((_, handle)) => handle.complete(outcome),
            None => false,
        }
    }

    pub fn fail(&self, id: &OverscaledTileId, error: LoadError) -> bool {
        self.complete(id, Err(error))
    }

    /// Completes every outstanding request with the outcome `make` builds for it.
    pub fn complete_all<F>(&self, mut make: F) -> usize
    where
        F: FnMut(&LoadRequest) -> LoadOutcome,
    {
        let drained: Vec<_> = self.pending().drain(..).collect();
        let count = drained.len();
        for (request, handle) in drained {
            handle.complete(make(&request));
        }
        count
    }
}

impl TileLoader for QueuedLoader {
    fn load(&self, request: LoadRequest, handle: CompletionHandle) {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.id);
        self.pending().push((request, handle));
    }
}

/// Transport settings for [`FetchLoader`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Maximum fetches in flight at once
    pub max_concurrent: usize,
    /// Retries for retryable failures before reporting the error
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 32,
            max_retries: 2,
            retry_delay: Duration::from_millis(25),
        }
    }
}

impl LoaderConfig {
    pub fn low_resource() -> Self {
        Self {
            max_concurrent: 4,
            max_retries: 1,
            retry_delay: Duration::from_millis(50),
        }
    }

    pub fn high_performance() -> Self {
        Self {
            max_concurrent: 128,
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    pub fn for_testing() -> Self {
        Self {
            max_concurrent: 2,
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
        }
    }
}

#[cfg(feature = "tokio-runtime")]
pub use self::fetch::{FetchLoader, TileFetcher};

#[cfg(feature = "tokio-runtime")]
mod fetch {
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;
    use tokio::runtime::Handle;
    use tokio::sync::Semaphore;

    use super::{CompletionHandle, LoadOutcome, LoadRequest, LoaderConfig, TileLoader};
    use crate::prelude::Arc;
    use crate::LoadError;

    /// Produces tile content for a request, e.g. by fetching and parsing bytes.
    #[async_trait]
    pub trait TileFetcher: Send + Sync + 'static {
        async fn fetch(&self, request: &LoadRequest) -> LoadOutcome;
    }

    /// Runs a [`TileFetcher`] on a tokio runtime with bounded concurrency.
    pub struct FetchLoader<F> {
        fetcher: Arc<F>,
        runtime: Handle,
        semaphore: Arc<Semaphore>,
        config: LoaderConfig,
    }

    impl<F: TileFetcher> FetchLoader<F> {
        pub fn new(fetcher: F, config: LoaderConfig, runtime: Handle) -> Self {
            Self {
                fetcher: Arc::new(fetcher),
                runtime,
                semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                config,
            }
        }

        /// Uses the runtime of the calling context, if there is one
        pub fn from_current(fetcher: F, config: LoaderConfig) -> Option<Self> {
            Handle::try_current()
                .ok()
                .map(|runtime| Self::new(fetcher, config, runtime))
        }

        pub fn config(&self) -> &LoaderConfig {
            &self.config
        }

        async fn run(
            fetcher: Arc<F>,
            semaphore: Arc<Semaphore>,
            config: LoaderConfig,
            request: LoadRequest,
            handle: CompletionHandle,
        ) {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    handle.complete(Err(LoadError::Cancelled));
                    return;
                }
            };

            let mut retries = 0;
            loop {
                if !handle.is_live() {
                    log::trace!("skipping fetch for {}: manager gone", request.id);
                    return;
                }
                let fetched = AssertUnwindSafe(fetcher.fetch(&request))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        log::warn!("fetcher panicked while loading {}", request.id);
                        Err(LoadError::Other("fetcher panicked".to_string()))
                    });
                match fetched {
                    Err(error) if error.is_retryable() && retries < config.max_retries => {
                        retries += 1;
                        log::debug!(
                            "retrying tile {} after {} (retry {}/{})",
                            request.id,
                            error,
                            retries,
                            config.max_retries
                        );
                        tokio::time::sleep(config.retry_delay).await;
                    }
                    outcome => {
                        handle.complete(outcome);
                        return;
                    }
                }
            }
        }
    }

    impl<F: TileFetcher> TileLoader for FetchLoader<F> {
        fn load(&self, request: LoadRequest, handle: CompletionHandle) {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let config = self.config.clone();
            self.runtime
                .spawn(Self::run(fetcher, semaphore, config, request, handle));
        }
    }
}
