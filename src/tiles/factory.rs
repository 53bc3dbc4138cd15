use serde::{Deserialize, Serialize};

use crate::core::constants::{MAX_ZOOM, TILE_SIZE};
use crate::core::geo::LatLngBounds;
use crate::source::UpdateParameters;
use crate::tiles::id::OverscaledTileId;
use crate::tiles::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Raster,
    Vector,
    GeoJson,
    Annotations,
}

impl SourceKind {
    /// Raster data is never laid out above its native zoom
    pub fn overscales_data(&self) -> bool {
        !matches!(self, Self::Raster)
    }

    /// Whether the covering zoom rounds (raster) or floors (everything else)
    pub fn rounds_covering_zoom(&self) -> bool {
        matches!(self, Self::Raster)
    }

    /// Raster tiles carry pixels only; feature queries return nothing
    pub fn supports_feature_queries(&self) -> bool {
        !matches!(self, Self::Raster)
    }
}

/// Inclusive zoom range a source provides data for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    pub fn contains(&self, z: u8) -> bool {
        z >= self.min && z <= self.max
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::new(0, 22)
    }
}

/// Capability that creates tiles for one kind of source.
///
/// The manager never knows which concrete kind it is driving; everything
/// kind-specific goes through this trait.
pub trait TileFactory {
    fn kind(&self) -> SourceKind;

    /// Tile size in pixels
    fn tile_size(&self) -> u16 {
        TILE_SIZE
    }

    fn zoom_range(&self) -> ZoomRange;

    /// Creates a fresh tile for `id`, or `None` when the source has no data
    /// there (outside its bounds). Loading is requested separately.
    fn create_tile(&self, id: &OverscaledTileId, parameters: &UpdateParameters) -> Option<Tile>;
}

/// Factory covering the standard source kinds, optionally clipped to bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardTileFactory {
    pub kind: SourceKind,
    pub tile_size: u16,
    pub zoom_range: ZoomRange,
    pub bounds: Option<LatLngBounds>,
}

impl StandardTileFactory {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            tile_size: TILE_SIZE,
            zoom_range: ZoomRange::default(),
            bounds: None,
        }
    }

    pub fn raster() -> Self {
        Self::new(SourceKind::Raster).with_tile_size(256)
    }

    pub fn vector() -> Self {
        Self::new(SourceKind::Vector).with_zoom_range(ZoomRange::new(0, 14))
    }

    pub fn geojson() -> Self {
        Self::new(SourceKind::GeoJson).with_zoom_range(ZoomRange::new(0, 18))
    }

    pub fn annotations() -> Self {
        Self::new(SourceKind::Annotations).with_zoom_range(ZoomRange::new(0, MAX_ZOOM))
    }

    pub fn with_tile_size(mut self, tile_size: u16) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_zoom_range(mut self, zoom_range: ZoomRange) -> Self {
        self.zoom_range = zoom_range;
        self
    }

    pub fn with_bounds(mut self, bounds: LatLngBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    fn in_bounds(&self, id: &OverscaledTileId) -> bool {
        self.bounds.as_ref().map_or(true, |bounds| {
            let (min, max) = id.canonical.footprint();
            bounds.intersects_world(&min, &max)
        })
    }
}

impl TileFactory for StandardTileFactory {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn tile_size(&self) -> u16 {
        self.tile_size
    }

    fn zoom_range(&self) -> ZoomRange {
        self.zoom_range
    }

    fn create_tile(&self, id: &OverscaledTileId, _parameters: &UpdateParameters) -> Option<Tile> {
        self.in_bounds(id).then(|| Tile::new(*id, self.kind))
    }
}
