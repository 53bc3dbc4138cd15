use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::{DEFAULT_FOV, EXTENT, MAX_PITCH, MAX_ZOOM, TILE_SIZE};
use crate::core::geo::{LatLng, Point, ScreenCoordinate, Size};
use crate::tiles::id::UnwrappedTileId;

/// Camera state for one frame: where the map is looking and how.
///
/// Bearing is in degrees clockwise from north, pitch in degrees away from
/// straight down. World coordinates are normalized Web Mercator (`[0, 1]` per
/// world copy) unless a method says it works in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current zoom level
    pub zoom: f64,
    /// Map rotation in degrees
    pub bearing: f64,
    /// Camera tilt in degrees
    pub pitch: f64,
    /// The size of the viewport in pixels
    pub size: Size,
    /// The minimum allowed zoom level
    pub min_zoom: f64,
    /// The maximum allowed zoom level
    pub max_zoom: f64,
}

impl TransformState {
    /// Creates a new transform with no rotation or tilt
    pub fn new(center: LatLng, zoom: f64, size: Size) -> Self {
        Self {
            center,
            zoom: zoom.clamp(0.0, MAX_ZOOM as f64),
            bearing: 0.0,
            pitch: 0.0,
            size,
            min_zoom: 0.0,
            max_zoom: MAX_ZOOM as f64,
        }
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.set_bearing(bearing);
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.set_pitch(pitch);
        self
    }

    pub fn set_center(&mut self, center: LatLng) {
        self.center = center;
    }

    /// Sets the zoom level, clamping to valid range
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn set_bearing(&mut self, bearing: f64) {
        self.bearing = bearing.rem_euclid(360.0);
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = pitch.clamp(0.0, MAX_PITCH);
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    /// Sets the zoom limits
    pub fn set_zoom_limits(&mut self, min_zoom: f64, max_zoom: f64) {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
    }

    /// Gets the scale factor for the current zoom level
    pub fn scale(&self) -> f64 {
        2_f64.powf(self.zoom)
    }

    /// Width of one world copy in pixels at the current zoom
    pub fn world_size(&self) -> f64 {
        TILE_SIZE as f64 * self.scale()
    }

    /// Distance from the camera to the center of the viewport, in pixels
    pub fn camera_to_center_distance(&self) -> f64 {
        0.5 / (DEFAULT_FOV / 2.0).tan() * self.size.height
    }

    /// The map center in world pixels at the current zoom
    pub fn center_point(&self) -> Point {
        self.center.to_world().multiply(self.world_size())
    }

    /// Unprojects a screen coordinate onto the ground plane.
    ///
    /// Returns normalized world coordinates, or `None` when the ray through the
    /// pixel never reaches the ground (above the horizon of a pitched camera).
    pub fn screen_to_world(&self, point: ScreenCoordinate) -> Option<Point> {
        let dx = point.x - self.size.width / 2.0;
        let dy = point.y - self.size.height / 2.0;
        let pitch = self.pitch.to_radians();
        let (sin, cos) = pitch.sin_cos();
        let distance = self.camera_to_center_distance();

        let denominator = distance * cos + dy * sin;
        if denominator <= f64::EPSILON {
            return None;
        }
        let t = distance * cos / denominator;
        let ground = Point::new(t * dx, distance * sin + t * (dy * cos - distance * sin));

        let offset = ground.rotate(self.bearing.to_radians());
        Some(
            self.center_point()
                .add(&offset)
                .multiply(1.0 / self.world_size()),
        )
    }

    /// Screen y of the highest row that still hits the ground.
    fn horizon_clamped_top(&self) -> f64 {
        let pitch = self.pitch.to_radians();
        if pitch <= 0.0 {
            return 0.0;
        }
        let horizon =
            self.size.height / 2.0 - self.camera_to_center_distance() * pitch.cos() / pitch.sin();
        (horizon + 1.0).max(0.0)
    }

    /// The visible ground region as four normalized world points
    /// (top-left, top-right, bottom-right, bottom-left).
    pub fn visible_quad(&self) -> [Point; 4] {
        let top = self.horizon_clamped_top();
        let (w, h) = (self.size.width, self.size.height);
        let center = self.center.to_world();
        [
            Point::new(0.0, top),
            Point::new(w, top),
            Point::new(w, h),
            Point::new(0.0, h),
        ]
        .map(|corner| self.screen_to_world(corner).unwrap_or(center))
    }

    /// Perspective projection from world pixels to clip space.
    pub fn projection_matrix(&self) -> Matrix4<f64> {
        let distance = self.camera_to_center_distance();
        let pitch = self.pitch.to_radians();
        let half_fov = DEFAULT_FOV / 2.0;
        let ground_angle = PI / 2.0 + pitch;
        let top_half_surface_distance =
            half_fov.sin() * distance / (PI - ground_angle - half_fov).sin();
        let furthest = (PI / 2.0 - pitch).cos() * top_half_surface_distance + distance;
        let aspect = if self.size.height > 0.0 {
            self.size.width / self.size.height
        } else {
            1.0
        };

        let center = self.center_point();
        Matrix4::new_perspective(aspect, DEFAULT_FOV, 1.0, furthest * 1.01)
            * Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, -1.0, 1.0))
            * Matrix4::new_translation(&Vector3::new(0.0, 0.0, -distance))
            * Matrix4::from_axis_angle(&Vector3::x_axis(), pitch)
            * Matrix4::from_axis_angle(&Vector3::z_axis(), -self.bearing.to_radians())
            * Matrix4::new_translation(&Vector3::new(-center.x, -center.y, 0.0))
    }

    /// Maps tile-local extent coordinates of `id` into world pixels.
    pub fn matrix_for(&self, id: &UnwrappedTileId) -> Matrix4<f64> {
        let tiles_per_world = id.canonical.tiles_per_side() as f64;
        let tile_scale = self.world_size() / tiles_per_world;
        let x = (id.canonical.x as f64 + id.wrap as f64 * tiles_per_world) * tile_scale;
        let y = id.canonical.y as f64 * tile_scale;

        Matrix4::new_translation(&Vector3::new(x, y, 0.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(
                tile_scale / EXTENT,
                tile_scale / EXTENT,
                1.0,
            ))
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new(LatLng::default(), 0.0, Size::new(512.0, 512.0))
    }
}
