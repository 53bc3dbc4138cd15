//! Prelude module for common mapsource types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mapsource::prelude::*;`

pub use crate::core::{
    config::{CacheSizing, StaleTilePolicy, StyleParameters, TileManagerOptions, TileManagerProfile},
    geo::{LatLng, LatLngBounds, Point, ScreenCoordinate, Size},
    transform::TransformState,
};

pub use crate::tiles::{
    CanonicalTileId, Feature, FeatureMap, FeatureTile, OverscaledTileId, SourceKind,
    StandardTileFactory, Tile, TileCache, TileContent, TileFactory, TileLoader, TileObserver,
    TileState, UnwrappedTileId, ZoomRange, ZoomTolerance,
};

pub use crate::source::{RenderConsumer, RenderTile, RenderTileRef, SourceTileManager, UpdateParameters};

pub use crate::signals::{Signal, SignalHub};

pub use crate::{LoadError, Result, SourceError};

pub use std::sync::{Arc, Mutex};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
