use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::config::{CacheSizing, StyleParameters, TileManagerOptions};
use crate::core::constants::DEFAULT_CACHE_SIZE;
use crate::prelude::{Arc, HashMap};
use crate::signals::{self, Signal, SignalHub, Subscription};
use crate::source::render::RenderTile;
use crate::tiles::cache::TileCache;
use crate::tiles::factory::TileFactory;
use crate::tiles::id::{OverscaledTileId, UnwrappedTileId};
use crate::tiles::loader::{Completion, CompletionHandle, LoadRequest, TileLoader};
use crate::tiles::observer::{NullObserver, TileObserver};
use crate::tiles::tile::{Tile, TileState, TileTransition};
use crate::{Result, SourceError};

/// Owns every tile of one source and keeps them in step with the camera.
///
/// All methods run on the owning thread. Loads complete elsewhere and are
/// applied by [`process_completions`](Self::process_completions).
pub struct SourceTileManager {
    pub(super) id: String,
    pub(super) factory: Box<dyn TileFactory>,
    pub(super) loader: Arc<dyn TileLoader>,
    pub(super) observer: Arc<dyn TileObserver>,
    pub(super) options: TileManagerOptions,
    /// Live tiles keyed by wrap-less address
    pub(super) tiles: BTreeMap<OverscaledTileId, Tile>,
    pub(super) cache: TileCache,
    /// Ideal placements from the last update, nearest first
    pub(super) ideal: Vec<UnwrappedTileId>,
    pub(super) ideal_ids: BTreeSet<OverscaledTileId>,
    /// Placement to data tile for everything that should render
    pub(super) placements: Vec<(UnwrappedTileId, OverscaledTileId)>,
    /// Former fallbacks (wrap kept) and the updates they may still linger for
    pub(super) lingering: HashMap<OverscaledTileId, u32>,
    pub(super) render_list: Vec<RenderTile>,
    pub(super) style: Arc<StyleParameters>,
    pub(super) enabled: bool,
    pub(super) tick: u64,
    next_attempt: u64,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    alive: Arc<()>,
    signals: Subscription,
}

impl SourceTileManager {
    pub fn new<F>(id: impl Into<String>, factory: F, loader: Arc<dyn TileLoader>) -> Self
    where
        F: TileFactory + 'static,
    {
        Self::with_options(id, factory, loader, TileManagerOptions::default())
    }

    pub fn with_options<F>(
        id: impl Into<String>,
        factory: F,
        loader: Arc<dyn TileLoader>,
        options: TileManagerOptions,
    ) -> Self
    where
        F: TileFactory + 'static,
    {
        let capacity = match options.cache {
            CacheSizing::Fixed(capacity) => capacity,
            CacheSizing::Viewport => DEFAULT_CACHE_SIZE,
        };
        let (completion_tx, completion_rx) = unbounded();
        Self {
            id: id.into(),
            factory: Box::new(factory),
            loader,
            observer: Arc::new(NullObserver),
            options,
            tiles: BTreeMap::new(),
            cache: TileCache::new(capacity),
            ideal: Vec::new(),
            ideal_ids: BTreeSet::new(),
            placements: Vec::new(),
            lingering: HashMap::default(),
            render_list: Vec::new(),
            style: Arc::new(StyleParameters::default()),
            enabled: true,
            tick: 0,
            next_attempt: 0,
            completion_tx,
            completion_rx,
            alive: Arc::new(()),
            signals: signals::global().subscribe(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TileObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Listens to `hub` instead of the process-wide hub
    pub fn with_signal_hub(mut self, hub: &SignalHub) -> Self {
        self.signals = hub.subscribe();
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn TileObserver>) {
        self.observer = observer;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn factory(&self) -> &dyn TileFactory {
        self.factory.as_ref()
    }

    pub fn options(&self) -> &TileManagerOptions {
        &self.options
    }

    /// Live tiles, ordered by address
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Live tile for `id` (any wrap)
    pub fn tile(&self, id: &OverscaledTileId) -> Option<&Tile> {
        self.tiles.get(&id.without_wrap())
    }

    pub fn live_ids(&self) -> BTreeSet<OverscaledTileId> {
        self.tiles.keys().copied().collect()
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Ideal placements of the last update, nearest to the center first
    pub fn ideal_placements(&self) -> &[UnwrappedTileId] {
        &self.ideal
    }

    /// Wrap-less data addresses of the last ideal set
    pub fn ideal_tile_ids(&self) -> &BTreeSet<OverscaledTileId> {
        &self.ideal_ids
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling retires every live tile; updates are ignored until re-enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled && !enabled {
            self.remove_tiles();
        }
        self.enabled = enabled;
    }

    /// True when every ideal tile has finished loading, successfully or not
    pub fn is_loaded(&self) -> bool {
        self.ideal_ids.iter().all(|id| {
            self.tiles
                .get(id)
                .map_or(false, |tile| tile.state() != TileState::Loading)
        })
    }

    /// Retires every live tile into the cache. The ideal set is kept.
    pub fn remove_tiles(&mut self) {
        let tiles = std::mem::take(&mut self.tiles);
        let count = tiles.len();
        for tile in tiles.into_values() {
            self.retire(tile);
        }
        self.placements.clear();
        self.lingering.clear();
        self.render_list.clear();
        log::debug!("{}: retired {} tiles", self.id, count);
        self.debug_check_cache();
    }

    /// Discards every live and cached tile without retiring anything.
    pub fn invalidate_tiles(&mut self) {
        let count = self.tiles.len() + self.cache.len();
        self.tiles.clear();
        self.cache.clear();
        self.ideal.clear();
        self.ideal_ids.clear();
        self.placements.clear();
        self.lingering.clear();
        self.render_list.clear();
        log::debug!("{}: invalidated {} tiles", self.id, count);
    }

    /// Reloads every live tile against the current style parameters.
    ///
    /// Membership is unchanged. Cached tiles were built for the old
    /// parameters and are dropped.
    pub fn reload_tiles(&mut self) {
        self.cache.clear();
        let ids: Vec<OverscaledTileId> = self.tiles.keys().copied().collect();
        for id in &ids {
            let settled = self.tiles.get(id).map_or(false, Tile::is_settled);
            self.request_load(id);
            if settled {
                if let Some(tile) = self.tiles.get(id) {
                    self.observer.on_tile_changed(&self.id, tile);
                }
            }
        }
        log::debug!("{}: reloading {} tiles", self.id, ids.len());
    }

    /// Fixes the cache capacity, discarding the oldest entries beyond it.
    pub fn set_cache_size(&mut self, capacity: usize) {
        self.options.cache = CacheSizing::Fixed(capacity);
        let discarded = self.cache.set_capacity(capacity);
        if !discarded.is_empty() {
            log::debug!(
                "{}: cache resized to {}, discarded {} tiles",
                self.id,
                capacity,
                discarded.len()
            );
        }
        self.debug_check_cache();
    }

    /// One-shot purge of the cache. Capacity stays as configured.
    pub fn on_low_memory(&mut self) {
        let purged = self.cache.purge();
        log::debug!("{}: low memory, purged {} cached tiles", self.id, purged);
    }

    /// Applies every load completion queued since the last call.
    ///
    /// Returns the number of tiles whose state changed.
    pub fn process_completions(&mut self) -> usize {
        self.poll_signals();
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.apply_completion(completion) {
                applied += 1;
            }
        }
        applied
    }

    fn apply_completion(&mut self, completion: Completion) -> bool {
        let Completion {
            id,
            attempt,
            outcome,
        } = completion;

        if let Some(tile) = self.tiles.get_mut(&id) {
            return match tile.complete_load(attempt, outcome) {
                Some(TileTransition::Loaded) => {
                    log::trace!("{}: tile {} loaded", self.id, id);
                    self.observer.on_tile_changed(&self.id, tile);
                    true
                }
                Some(TileTransition::Errored(error)) => {
                    log::warn!("{}: tile {} failed to load: {}", self.id, id, error);
                    self.observer.on_tile_error(&self.id, tile, &error);
                    true
                }
                None => {
                    log::trace!("{}: ignoring stale completion for {} (attempt {})", self.id, id, attempt);
                    false
                }
            };
        }

        if let Some(tile) = self.cache.peek_mut(&id) {
            return match tile.complete_load(attempt, outcome) {
                Some(transition) => {
                    log::trace!("{}: cached tile {} settled, reported on reuse", self.id, id);
                    tile.record_retired_transition(transition);
                    true
                }
                None => false,
            };
        }

        log::trace!("{}: dropping completion for discarded tile {}", self.id, id);
        false
    }

    /// Load failures of live tiles
    pub fn tile_errors(&self) -> Vec<SourceError> {
        self.tiles
            .values()
            .filter_map(|tile| {
                tile.error().map(|cause| SourceError::LoadFailure {
                    id: tile.id(),
                    cause: cause.clone(),
                })
            })
            .collect()
    }

    pub fn dump_debug_logs(&self) {
        log::info!(
            "source {} ({}): {} live, {}/{} cached, {} rendered",
            self.id,
            if self.enabled { "enabled" } else { "disabled" },
            self.tiles.len(),
            self.cache.len(),
            self.cache.capacity(),
            self.render_list.len()
        );
        for tile in self.tiles.values() {
            log::info!(
                "  tile {} state={:?} attempt={} last_used={}",
                tile.id(),
                tile.state(),
                tile.attempt(),
                tile.last_used()
            );
        }
    }

    /// Checks the cache bound and that every render entry has a live tile.
    pub fn check_invariants(&self) -> Result<()> {
        self.cache.check_invariants()?;
        for render in &self.render_list {
            if !self.tiles.contains_key(&render.tile_id) {
                return Err(SourceError::StaleReference(render.id));
            }
        }
        Ok(())
    }

    pub(super) fn poll_signals(&mut self) {
        for signal in self.signals.poll() {
            match signal {
                Signal::LowMemory => self.on_low_memory(),
                Signal::DumpDebugLogs => self.dump_debug_logs(),
            }
        }
    }

    /// Issues a new load attempt for the live tile at `id`.
    pub(super) fn request_load(&mut self, id: &OverscaledTileId) {
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        tile.begin_load(attempt);
        let request = LoadRequest {
            id: *id,
            kind: tile.kind(),
            style: self.style.clone(),
            attempt,
        };
        let handle = CompletionHandle::new(
            self.completion_tx.clone(),
            Arc::downgrade(&self.alive),
            *id,
            attempt,
        );
        log::trace!("{}: requesting {} (attempt {})", self.id, id, attempt);
        self.loader.load(request, handle);
    }

    pub(super) fn retire(&mut self, mut tile: Tile) {
        tile.touch(self.tick);
        for discarded in self.cache.add(tile) {
            log::trace!("{}: discarded tile {}", self.id, discarded.id());
        }
    }

    pub(super) fn debug_check_cache(&self) {
        debug_assert!(
            self.cache.check_invariants().is_ok(),
            "tile cache over capacity: {:?}",
            self.cache
        );
    }
}

impl std::fmt::Debug for SourceTileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceTileManager")
            .field("id", &self.id)
            .field("kind", &self.factory.kind())
            .field("enabled", &self.enabled)
            .field("tiles", &self.tiles.len())
            .field("cache", &self.cache)
            .finish()
    }
}
