//! Ideal tile computation.
//!
//! Given the camera and a source's zoom constraints this produces the set of
//! tile placements that cover the visible ground region without gaps. The
//! computation is pure and deterministic: identical inputs give identical,
//! identically ordered output.

use geo::Intersects;
use geo_types::{LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::constants::{MAX_ZOOM, TILE_SIZE};
use crate::core::geo::Point;
use crate::core::transform::TransformState;
use crate::tiles::factory::{SourceKind, ZoomRange};
use crate::tiles::id::{OverscaledTileId, UnwrappedTileId};

/// Shrinks tile rectangles slightly so tiles that merely touch the visible
/// region along an edge are not requested.
const EDGE_EPSILON: f64 = 1e-9;

/// How far data may be stretched beyond the source's native zoom range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomTolerance {
    /// Levels above maxzoom that data may be laid out for (non-raster only)
    pub max_overscale: u8,
    /// Levels below minzoom at which minzoom tiles are still shown
    pub max_underscale: u8,
}

impl Default for ZoomTolerance {
    fn default() -> Self {
        Self {
            max_overscale: MAX_ZOOM,
            max_underscale: 0,
        }
    }
}

/// Relation of the data zoom to the zoom the camera would ideally want
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomScale {
    Native,
    /// Tiles are drawn larger than their data resolution by this many levels
    Overscaled(u8),
    /// Tiles are drawn smaller than their data resolution by this many levels
    Underscaled(u8),
}

/// The ideal tiles for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSet {
    /// Ideal placements, nearest to the view center first
    pub tiles: Vec<UnwrappedTileId>,
    /// Zoom the data is laid out for (`overscaled_z` of every ideal address)
    pub data_zoom: u8,
    pub scale: ZoomScale,
}

impl ActiveSet {
    pub fn empty(scale: ZoomScale) -> Self {
        Self {
            tiles: Vec::new(),
            data_zoom: 0,
            scale,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Data addresses (wrap preserved) for every ideal placement
    pub fn addresses(&self) -> impl Iterator<Item = OverscaledTileId> + '_ {
        self.tiles
            .iter()
            .map(move |tile| tile.overscaled_to(self.data_zoom))
    }
}

/// Zoom at which tiles of `tile_size` pixels cover the view at `zoom`.
pub fn covering_zoom_level(zoom: f64, kind: SourceKind, tile_size: u16) -> i32 {
    let zoom = zoom + (TILE_SIZE as f64 / tile_size as f64).log2();
    if kind.rounds_covering_zoom() {
        zoom.round() as i32
    } else {
        zoom.floor() as i32
    }
}

/// Computes the ideal tile set for `transform`.
pub fn compute_active_set(
    transform: &TransformState,
    kind: SourceKind,
    tile_size: u16,
    range: ZoomRange,
    tolerance: ZoomTolerance,
) -> ActiveSet {
    if transform.size.is_empty() {
        return ActiveSet::empty(ZoomScale::Native);
    }
    let covering = covering_zoom_level(transform.zoom, kind, tile_size).max(0);

    let (ideal_zoom, data_zoom, scale) = if covering < range.min as i32 {
        let deficit = (range.min as i32 - covering) as u8;
        if deficit > tolerance.max_underscale {
            return ActiveSet::empty(ZoomScale::Underscaled(deficit));
        }
        (range.min, range.min, ZoomScale::Underscaled(deficit))
    } else {
        let ideal_zoom = covering.min(range.max as i32) as u8;
        let data_zoom = if kind.overscales_data() {
            let ceiling = (range.max as i32 + tolerance.max_overscale as i32).min(MAX_ZOOM as i32);
            covering.min(ceiling) as u8
        } else {
            ideal_zoom
        };
        let scale = match covering - ideal_zoom as i32 {
            0 => ZoomScale::Native,
            levels => ZoomScale::Overscaled(levels.min(u8::MAX as i32) as u8),
        };
        (ideal_zoom, data_zoom, scale)
    };

    ActiveSet {
        tiles: tile_cover(transform, ideal_zoom),
        data_zoom,
        scale,
    }
}

/// Every placement at zoom `z` intersecting the visible region, nearest first.
pub fn tile_cover(transform: &TransformState, z: u8) -> Vec<UnwrappedTileId> {
    let tiles_per_side = (1u64 << z) as f64;
    let quad = transform.visible_quad().map(|p| p.multiply(tiles_per_side));
    let ring: LineString<f64> = quad
        .iter()
        .chain(std::iter::once(&quad[0]))
        .map(|p| (p.x, p.y))
        .collect();
    let region = Polygon::new(ring, vec![]);

    let min_x = quad.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).floor() as i64;
    let max_x = quad.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max).ceil() as i64;
    let min_y = quad
        .iter()
        .map(|p| p.y)
        .fold(f64::INFINITY, f64::min)
        .floor()
        .max(0.0) as i64;
    let max_y = quad
        .iter()
        .map(|p| p.y)
        .fold(f64::NEG_INFINITY, f64::max)
        .ceil()
        .min(tiles_per_side) as i64;

    let center = transform.center.to_world().multiply(tiles_per_side);
    let mut tiles: Vec<(f64, UnwrappedTileId)> = Vec::new();
    for y in min_y..max_y {
        for x in min_x..max_x {
            let cell = Rect::new(
                (x as f64 + EDGE_EPSILON, y as f64 + EDGE_EPSILON),
                ((x + 1) as f64 - EDGE_EPSILON, (y + 1) as f64 - EDGE_EPSILON),
            );
            if !region.intersects(&cell) {
                continue;
            }
            let tile_center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            tiles.push((
                tile_center.distance_to(&center),
                UnwrappedTileId::from_unbounded(z, x, y as u32),
            ));
        }
    }

    tiles.sort_by(|(da, a), (db, b)| {
        da.total_cmp(db)
            .then_with(|| a.cmp(b))
            .then(Ordering::Equal)
    });
    tiles.into_iter().map(|(_, tile)| tile).collect()
}
