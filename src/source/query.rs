use super::SourceTileManager;
use crate::core::constants::EXTENT;
use crate::core::geo::{Point, ScreenCoordinate};
use crate::core::transform::TransformState;
use crate::tiles::content::{query_geometry, Feature, FeatureMap, RenderedQueryOptions, SourceQueryOptions};
use crate::tiles::id::UnwrappedTileId;

/// Converts normalized world points into the extent coordinates of `placement`.
fn to_tile_local(world: &[Point], placement: &UnwrappedTileId) -> Vec<Point> {
    let scale = placement.canonical.tiles_per_side() as f64;
    let origin = Point::new(placement.unbounded_x() as f64, placement.canonical.y as f64);
    world
        .iter()
        .map(|point| point.multiply(scale).subtract(&origin).multiply(EXTENT))
        .collect()
}

/// True when the bounding box of `points` reaches into the tile square
fn touches_tile(points: &[Point]) -> bool {
    let (mut min, mut max) = (Point::new(f64::INFINITY, f64::INFINITY), Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY));
    for point in points {
        min = Point::new(min.x.min(point.x), min.y.min(point.y));
        max = Point::new(max.x.max(point.x), max.y.max(point.y));
    }
    max.x >= 0.0 && min.x <= EXTENT && max.y >= 0.0 && min.y <= EXTENT
}

impl SourceTileManager {
    /// Features of rendered tiles under a screen-space point, line or ring.
    ///
    /// Results are grouped by source layer, in render order and then in each
    /// tile's own order.
    pub fn query_rendered_features(
        &self,
        geometry: &[ScreenCoordinate],
        transform: &TransformState,
        options: &RenderedQueryOptions,
    ) -> FeatureMap {
        let mut result = FeatureMap::default();
        if !self.factory.kind().supports_feature_queries() {
            return result;
        }
        let world: Option<Vec<Point>> = geometry
            .iter()
            .map(|point| transform.screen_to_world(*point))
            .collect();
        let Some(world) = world.filter(|points| !points.is_empty()) else {
            return result;
        };

        for (placement, tile_id) in self.render_builder().renderable(&self.tiles) {
            let Some(content) = self.tiles.get(&tile_id).and_then(|tile| tile.content()) else {
                continue;
            };
            let local = to_tile_local(&world, &placement);
            if !touches_tile(&local) {
                continue;
            }
            if let Some(shape) = query_geometry(&local) {
                content.query_rendered_features(&shape, options, &mut result);
            }
        }
        result
    }

    /// Features of every live tile, visible or not.
    ///
    /// Features crossing tile boundaries are returned once per tile.
    pub fn query_source_features(&self, options: &SourceQueryOptions) -> Vec<Feature> {
        let mut result = Vec::new();
        if !self.factory.kind().supports_feature_queries() {
            return result;
        }
        for tile in self.tiles.values() {
            if let Some(content) = tile.content() {
                content.query_source_features(options, &mut result);
            }
        }
        result
    }
}
