pub mod cache;
pub mod content;
pub mod cover;
pub mod factory;
pub mod id;
pub mod loader;
pub mod observer;
pub mod tile;

// Re-exports for convenience
pub use cache::TileCache;
pub use content::{Feature, FeatureMap, FeatureTile, TileContent};
pub use cover::{compute_active_set, covering_zoom_level, ActiveSet, ZoomScale, ZoomTolerance};
pub use factory::{SourceKind, StandardTileFactory, TileFactory, ZoomRange};
pub use id::{CanonicalTileId, OverscaledTileId, UnwrappedTileId};
pub use loader::{CompletionHandle, LoadRequest, LoaderConfig, QueuedLoader, TileLoader};
pub use observer::{NullObserver, RecordingObserver, TileEvent, TileObserver};
pub use tile::{Tile, TileState, TileTransition};

#[cfg(feature = "tokio-runtime")]
pub use loader::{FetchLoader, TileFetcher};
