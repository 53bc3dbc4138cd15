//! Core constants shared by the tile pyramid, the camera and the render list.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Reference tile size in pixels. Covering zoom levels are computed relative to it.
pub const TILE_SIZE: u16 = 512;

/// Extent of tile-local geometry coordinates.
pub const EXTENT: f64 = 8192.0;

/// Highest zoom level a tile address may carry.
pub const MAX_ZOOM: u8 = 25;

/// Vertical field of view of the camera, in radians.
pub const DEFAULT_FOV: f64 = 0.643_501_108_793_284_4;

/// Steepest pitch the camera accepts, in degrees.
pub const MAX_PITCH: f64 = 60.0;

/// Web Mercator latitude limit.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Cache capacity used when nothing else is configured.
pub const DEFAULT_CACHE_SIZE: usize = 128;
