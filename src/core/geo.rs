use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::MAX_LATITUDE;

/// Geographical coordinate in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Projects to normalized Web Mercator world coordinates.
    ///
    /// The world spans `[0, 1]` on both axes with `y` growing southwards.
    /// Longitudes outside `[-180, 180]` land outside `[0, 1]` on the x axis,
    /// which is how wrapped world copies are addressed. Latitude is clamped
    /// to the Mercator limit.
    pub fn to_world(&self) -> Point {
        let lat = self.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        Point::new(
            (self.lng + 180.0) / 360.0,
            (1.0 - lat.tan().asinh() / PI) / 2.0,
        )
    }

    /// Inverse of [`LatLng::to_world`].
    pub fn from_world(point: Point) -> Self {
        Self::new(
            (PI * (1.0 - 2.0 * point.y)).sinh().atan().to_degrees(),
            point.x * 360.0 - 180.0,
        )
    }
}

/// A point in screen, world or tile-local coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Rotates around the origin by `angle` radians (clockwise on a y-down plane)
    pub fn rotate(&self, angle: f64) -> Point {
        let (sin, cos) = angle.sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

/// A point on screen, in pixels from the top-left corner of the viewport
pub type ScreenCoordinate = Point;

/// Viewport dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Geographic extent of a source's data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// The bounds as a normalized world rectangle `(north-west, south-east)`
    pub fn world_rect(&self) -> (Point, Point) {
        let north_west = LatLng::new(self.north_east.lat, self.south_west.lng).to_world();
        let south_east = LatLng::new(self.south_west.lat, self.north_east.lng).to_world();
        (north_west, south_east)
    }

    /// True when the world rectangle `min..max` shares any area or edge with
    /// these bounds.
    pub fn intersects_world(&self, min: &Point, max: &Point) -> bool {
        let (north_west, south_east) = self.world_rect();
        min.x <= south_east.x && north_west.x <= max.x && min.y <= south_east.y && north_west.y <= max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_projection() {
        let origin = LatLng::new(0.0, 0.0).to_world();
        assert!((origin.x - 0.5).abs() < 1e-12);
        assert!((origin.y - 0.5).abs() < 1e-12);

        let nyc = LatLng::new(40.7128, -74.0060);
        let back = LatLng::from_world(nyc.to_world());
        assert!((back.lat - nyc.lat).abs() < 1e-9);
        assert!((back.lng - nyc.lng).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_projects_past_world_edge() {
        assert!(LatLng::new(0.0, 190.0).to_world().x > 1.0);
        assert!(LatLng::new(0.0, -190.0).to_world().x < 0.0);
    }

    #[test]
    fn test_polar_latitudes_are_clamped() {
        let north = LatLng::new(90.0, 0.0).to_world();
        assert!(north.y.abs() < 1e-9);
    }

    #[test]
    fn test_bounds_world_rect() {
        let bounds = LatLngBounds::from_coords(-10.0, -90.0, 10.0, 0.0);
        let (north_west, south_east) = bounds.world_rect();
        assert!((north_west.x - 0.25).abs() < 1e-12);
        assert!((south_east.x - 0.5).abs() < 1e-12);
        assert!(north_west.y < 0.5 && south_east.y > 0.5);

        assert!(bounds.intersects_world(&Point::new(0.4, 0.4), &Point::new(0.6, 0.6)));
        assert!(!bounds.intersects_world(&Point::new(0.6, 0.4), &Point::new(0.7, 0.6)));
    }
}
