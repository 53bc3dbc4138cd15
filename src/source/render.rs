//! Per-frame render list.
//!
//! A render list is rebuilt on every [`SourceTileManager::start_render`]. Each
//! entry names a placement, the live tile drawn there, its matrix and a clip
//! id. Entries are ordered coarse to fine so that fallback tiles are painted
//! beneath the detail that replaces them.

use nalgebra::Matrix4;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::{BTreeMap, BTreeSet};

use super::SourceTileManager;
use crate::core::geo::Point;
use crate::core::transform::TransformState;
use crate::tiles::id::{OverscaledTileId, UnwrappedTileId};
use crate::tiles::tile::Tile;
use crate::{Result, SourceError};

/// Stencil value separating overlapping tile draws within one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTile {
    pub id: UnwrappedTileId,
    /// Wrap-less address of the live tile drawn here
    pub tile_id: OverscaledTileId,
    /// Tile extent coordinates to clip space
    pub matrix: Matrix4<f64>,
    pub clip_id: ClipId,
}

/// A render entry together with the tile it draws. Borrows the manager, so
/// it cannot be held across updates.
#[derive(Debug, Clone, Copy)]
pub struct RenderTileRef<'a> {
    pub render: &'a RenderTile,
    pub tile: &'a Tile,
}

/// Receives one frame worth of render tiles
pub trait RenderConsumer {
    fn start_render(&mut self, _tile_count: usize) {}

    fn render_tile(&mut self, tile: RenderTileRef<'_>);

    fn finish_render(&mut self) {}
}

/// Footprint already holding a clip id
#[derive(Debug, Clone, PartialEq)]
struct ClipEntry {
    min: Point,
    max: Point,
    clip_id: ClipId,
}

impl ClipEntry {
    fn overlaps(&self, min: &Point, max: &Point) -> bool {
        self.min.x < max.x && min.x < self.max.x && self.min.y < max.y && min.y < self.max.y
    }
}

impl RTreeObject for ClipEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min.x, self.min.y], [self.max.x, self.max.y])
    }
}

/// Hands out the smallest id not used by any overlapping footprint.
///
/// Footprints are canonical (wrap independent), so copies of the same data in
/// different world wraps always get different ids.
#[derive(Debug, Default)]
pub struct ClipIdGenerator {
    entries: RTree<ClipEntry>,
}

impl ClipIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, id: &UnwrappedTileId) -> ClipId {
        let (min, max) = id.canonical.footprint();
        let envelope = AABB::from_corners([min.x, min.y], [max.x, max.y]);
        let used: BTreeSet<ClipId> = self
            .entries
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| entry.overlaps(&min, &max))
            .map(|entry| entry.clip_id)
            .collect();

        let mut clip_id = ClipId(1);
        while used.contains(&clip_id) {
            clip_id.0 += 1;
        }
        self.entries.insert(ClipEntry { min, max, clip_id });
        clip_id
    }

    pub fn len(&self) -> usize {
        self.entries.size()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.size() == 0
    }
}

/// Collects placements and turns them into an ordered render list
#[derive(Debug, Default)]
pub struct RenderListBuilder {
    placements: BTreeMap<UnwrappedTileId, OverscaledTileId>,
}

impl RenderListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a placement. The first tile added for a placement wins.
    pub fn add(&mut self, placement: UnwrappedTileId, tile: OverscaledTileId) -> bool {
        match self.placements.entry(placement) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(tile.without_wrap());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Placements whose tile is live and loaded, in render order
    pub fn renderable<'a>(
        &'a self,
        tiles: &'a BTreeMap<OverscaledTileId, Tile>,
    ) -> impl Iterator<Item = (UnwrappedTileId, OverscaledTileId)> + 'a {
        self.placements
            .iter()
            .filter(move |(_, tile)| tiles.get(*tile).map_or(false, Tile::is_renderable))
            .map(|(placement, tile)| (*placement, *tile))
    }

    pub fn build(
        &self,
        tiles: &BTreeMap<OverscaledTileId, Tile>,
        projection: &Matrix4<f64>,
        transform: &TransformState,
    ) -> Vec<RenderTile> {
        let mut clip_ids = ClipIdGenerator::new();
        self.renderable(tiles)
            .map(|(id, tile_id)| RenderTile {
                id,
                tile_id,
                matrix: projection * transform.matrix_for(&id),
                clip_id: clip_ids.assign(&id),
            })
            .collect()
    }
}

impl SourceTileManager {
    pub(super) fn render_builder(&self) -> RenderListBuilder {
        let mut builder = RenderListBuilder::new();
        for (placement, tile) in &self.placements {
            builder.add(*placement, *tile);
        }
        builder
    }

    /// Rebuilds the render list for this frame.
    pub fn start_render(&mut self, projection: &Matrix4<f64>, transform: &TransformState) {
        self.render_list = self
            .render_builder()
            .build(&self.tiles, projection, transform);
    }

    /// Render tiles of the current frame, coarse to fine
    pub fn render_tiles(&self) -> impl Iterator<Item = RenderTileRef<'_>> {
        self.render_list.iter().filter_map(move |render| {
            self.tiles
                .get(&render.tile_id)
                .map(|tile| RenderTileRef { render, tile })
        })
    }

    pub fn render_tile(&self, id: &UnwrappedTileId) -> Result<Option<RenderTileRef<'_>>> {
        let Some(render) = self.render_list.iter().find(|render| render.id == *id) else {
            return Ok(None);
        };
        self.tiles
            .get(&render.tile_id)
            .map(|tile| Some(RenderTileRef { render, tile }))
            .ok_or(SourceError::StaleReference(*id))
    }

    /// Ends the frame; the render list is not carried into the next one.
    pub fn finish_render(&mut self) {
        self.render_list.clear();
    }

    /// Builds the render list and feeds it to `consumer` inside a
    /// start/finish bracket.
    pub fn render_frame<C>(&mut self, projection: &Matrix4<f64>, transform: &TransformState, consumer: &mut C)
    where
        C: RenderConsumer + ?Sized,
    {
        self.start_render(projection, transform);
        consumer.start_render(self.render_list.len());
        for tile in self.render_tiles() {
            consumer.render_tile(tile);
        }
        consumer.finish_render();
        self.finish_render();
    }
}
