//! A single unit of map data and its load state machine.

use std::fmt;
use std::sync::Arc;

use crate::tiles::content::TileContent;
use crate::tiles::factory::SourceKind;
use crate::tiles::id::OverscaledTileId;
use crate::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    Loading,
    Loaded,
    Errored,
}

/// What a completed load did to a tile, as seen by observers
#[derive(Debug, Clone, PartialEq)]
pub enum TileTransition {
    Loaded,
    Errored(LoadError),
}

/// A loaded-or-loading tile at one data address.
///
/// Tiles are owned by the manager (live) or by its cache (retired). Every load
/// attempt has a number; a completion carrying an older number is ignored so
/// that `Loading -> Loaded | Errored` happens at most once per attempt.
pub struct Tile {
    id: OverscaledTileId,
    kind: SourceKind,
    state: TileState,
    content: Option<Arc<dyn TileContent>>,
    error: Option<LoadError>,
    attempt: u64,
    last_used: u64,
    /// Completion applied while the tile sat in the cache, not yet reported
    retired_transition: Option<TileTransition>,
}

impl Tile {
    /// Creates a tile in `Loading` state. No load has been requested yet.
    pub fn new(id: OverscaledTileId, kind: SourceKind) -> Self {
        Self {
            id: id.without_wrap(),
            kind,
            state: TileState::Loading,
            content: None,
            error: None,
            attempt: 0,
            last_used: 0,
            retired_transition: None,
        }
    }

    pub fn id(&self) -> OverscaledTileId {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    /// Loaded tiles are the only ones placed in the render list
    pub fn is_renderable(&self) -> bool {
        self.state == TileState::Loaded
    }

    /// Loaded or errored: nothing more will happen without a reload
    pub fn is_settled(&self) -> bool {
        self.state != TileState::Loading
    }

    pub fn content(&self) -> Option<&Arc<dyn TileContent>> {
        self.content.as_ref()
    }

    pub fn error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }

    /// Number of the current load attempt (0 before the first request)
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Manager tick at which the tile was last retained or retired
    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    pub(crate) fn touch(&mut self, tick: u64) {
        self.last_used = tick;
    }

    /// Starts load attempt number `attempt`.
    ///
    /// Attempt numbers come from the owning manager and are never reused, so
    /// a completion from before an invalidation cannot match a new tile at the
    /// same address. Previously loaded content stays available until the new
    /// attempt completes, but the tile reports `Loading` in the meantime. A
    /// failed attempt drops it.
    pub(crate) fn begin_load(&mut self, attempt: u64) {
        self.attempt = attempt;
        self.state = TileState::Loading;
        self.error = None;
    }

    /// Applies a load completion. Returns `None` for stale attempts or when
    /// the tile is not waiting on a load.
    pub(crate) fn complete_load(
        &mut self,
        attempt: u64,
        outcome: Result<Arc<dyn TileContent>, LoadError>,
    ) -> Option<TileTransition> {
        if attempt != self.attempt || self.state != TileState::Loading {
            return None;
        }
        match outcome {
            Ok(content) => {
                self.content = Some(content);
                self.state = TileState::Loaded;
                Some(TileTransition::Loaded)
            }
            Err(error) => {
                self.state = TileState::Errored;
                self.content = None;
                self.error = Some(error.clone());
                Some(TileTransition::Errored(error))
            }
        }
    }

    pub(crate) fn record_retired_transition(&mut self, transition: TileTransition) {
        self.retired_transition = Some(transition);
    }

    /// Returns and forgets the transition recorded while retired
    pub(crate) fn take_retired_transition(&mut self) -> Option<TileTransition> {
        self.retired_transition.take()
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("features", &self.content.as_ref().map(|c| c.feature_count()))
            .finish()
    }
}
