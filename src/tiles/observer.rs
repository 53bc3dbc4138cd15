use crate::prelude::Mutex;
use crate::tiles::id::OverscaledTileId;
use crate::tiles::tile::{Tile, TileState};
use crate::LoadError;

/// Receives tile state changes that affect what can be rendered.
///
/// Called on the owning thread from `process_completions` and
/// `update_tiles`, never from loader threads.
pub trait TileObserver: Send + Sync {
    fn on_tile_changed(&self, _source_id: &str, _tile: &Tile) {}

    /// Fired once per failed load attempt
    fn on_tile_error(&self, _source_id: &str, _tile: &Tile, _error: &LoadError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TileObserver for NullObserver {}

/// One observed notification
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    Changed {
        source: String,
        id: OverscaledTileId,
        state: TileState,
    },
    Error {
        source: String,
        id: OverscaledTileId,
        error: LoadError,
    },
}

/// Observer that keeps every notification, for tests and tooling
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TileEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TileEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns and forgets all recorded events
    pub fn take(&self) -> Vec<TileEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn changed_ids(&self) -> Vec<OverscaledTileId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TileEvent::Changed { id, .. } => Some(id),
                TileEvent::Error { .. } => None,
            })
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, TileEvent::Error { .. }))
            .count()
    }

    fn push(&self, event: TileEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl TileObserver for RecordingObserver {
    fn on_tile_changed(&self, source_id: &str, tile: &Tile) {
        self.push(TileEvent::Changed {
            source: source_id.to_string(),
            id: tile.id(),
            state: tile.state(),
        });
    }

    fn on_tile_error(&self, source_id: &str, tile: &Tile, error: &LoadError) {
        self.push(TileEvent::Error {
            source: source_id.to_string(),
            id: tile.id(),
            error: error.clone(),
        });
    }
}
