//! # mapsource
//!
//! Tile working-set management for map sources.
//!
//! A [`SourceTileManager`] decides, for every camera change, which tiles of a
//! source should be live. Missing tiles are requested from an asynchronous
//! [`TileLoader`], tiles that leave the view are retired into a bounded
//! [`TileCache`] for reuse, and every frame gets an ordered render list whose
//! clip ids keep overlapping draws apart.

pub mod core;
pub mod prelude;
pub mod signals;
pub mod source;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{CacheSizing, StaleTilePolicy, StyleParameters, TileManagerOptions, TileManagerProfile},
    geo::{LatLng, LatLngBounds, Point, ScreenCoordinate, Size},
    transform::TransformState,
};

pub use source::{
    ClipId, RenderConsumer, RenderTile, RenderTileRef, SourceTileManager, UpdateParameters,
};

pub use tiles::{
    CanonicalTileId, OverscaledTileId, SourceKind, StandardTileFactory, Tile, TileCache,
    TileFactory, TileLoader, TileObserver, TileState, UnwrappedTileId,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, SourceError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("tile {id} failed to load: {cause}")]
    LoadFailure { id: OverscaledTileId, cause: LoadError },

    #[error("tile cache holds {len} tiles, capacity is {capacity}")]
    CapacityViolation { len: usize, capacity: usize },

    #[error("render tile {0} references a tile that is no longer resident")]
    StaleReference(UnwrappedTileId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a loader could not produce tile content
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("network error: {0}")]
    Network(String),

    #[error("tile not found")]
    NotFound,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("load cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl LoadError {
    /// Transient failures worth another attempt at the transport level
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Initializes `env_logger` once; later calls are ignored.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
