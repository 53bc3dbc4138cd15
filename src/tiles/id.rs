//! Tile identifiers.
//!
//! Three flavours of address exist:
//!
//! - [`CanonicalTileId`] names one cell of the pyramid inside a single world copy.
//! - [`OverscaledTileId`] is the address of tile *data*: a canonical cell, the
//!   zoom the data is laid out for (which may exceed the canonical zoom) and the
//!   world copy it was requested for.
//! - [`UnwrappedTileId`] is a render placement: a canonical cell at a specific
//!   world copy.
//!
//! Addresses that differ only in `wrap` name the same data; the manager keys
//! its tiles by [`OverscaledTileId::without_wrap`] so they share one instance.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::core::geo::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalTileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CanonicalTileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        debug_assert!(
            (x as u64) < (1u64 << z) && (y as u64) < (1u64 << z),
            "{x}/{y} out of range for z{z}"
        );
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom
    pub fn tiles_per_side(&self) -> u32 {
        1u32 << self.z
    }

    pub fn is_valid(&self) -> bool {
        let max = self.tiles_per_side();
        self.x < max && self.y < max
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<CanonicalTileId> {
        (self.z > 0).then(|| self.scaled_to(self.z - 1))
    }

    /// The ancestor containing this tile at zoom `z` (`z <= self.z`)
    pub fn scaled_to(&self, z: u8) -> CanonicalTileId {
        debug_assert!(z <= self.z);
        let shift = self.z - z;
        CanonicalTileId {
            z,
            x: self.x >> shift,
            y: self.y >> shift,
        }
    }

    /// Gets the four child tiles at the next zoom level
    pub fn children(&self) -> [CanonicalTileId; 4] {
        let (z, x, y) = (self.z + 1, self.x * 2, self.y * 2);
        [
            CanonicalTileId { z, x, y },
            CanonicalTileId { z, x: x + 1, y },
            CanonicalTileId { z, x, y: y + 1 },
            CanonicalTileId { z, x: x + 1, y: y + 1 },
        ]
    }

    /// True if `self` lies inside `ancestor` (or is `ancestor`).
    pub fn is_within(&self, ancestor: &CanonicalTileId) -> bool {
        ancestor.z <= self.z && self.scaled_to(ancestor.z) == *ancestor
    }

    /// Footprint in normalized world coordinates of the first world copy
    pub fn footprint(&self) -> (Point, Point) {
        let n = self.tiles_per_side() as f64;
        (
            Point::new(self.x as f64 / n, self.y as f64 / n),
            Point::new((self.x + 1) as f64 / n, (self.y + 1) as f64 / n),
        )
    }
}

impl fmt::Display for CanonicalTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Address of tile data (the "tile address" of the manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverscaledTileId {
    pub overscaled_z: u8,
    pub wrap: i16,
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    pub fn new(overscaled_z: u8, wrap: i16, canonical: CanonicalTileId) -> Self {
        debug_assert!(overscaled_z >= canonical.z);
        Self {
            overscaled_z,
            wrap,
            canonical,
        }
    }

    /// The data address of a canonical tile rendered at its native zoom
    pub fn from_canonical(canonical: CanonicalTileId) -> Self {
        Self::new(canonical.z, 0, canonical)
    }

    /// The display zoom of this address
    pub fn zoom(&self) -> u8 {
        self.overscaled_z
    }

    pub fn is_overscaled(&self) -> bool {
        self.overscaled_z > self.canonical.z
    }

    pub fn overscale_factor(&self) -> u32 {
        1u32 << (self.overscaled_z - self.canonical.z)
    }

    /// Same data, first world copy. Live tiles and the cache are keyed by this.
    pub fn without_wrap(&self) -> OverscaledTileId {
        OverscaledTileId { wrap: 0, ..*self }
    }

    /// The address of this data laid out for zoom `z`.
    ///
    /// Above the canonical zoom the canonical cell is kept and the tile becomes
    /// (more) overscaled; below it the canonical ancestor is used.
    pub fn scaled_to(&self, z: u8) -> OverscaledTileId {
        if z >= self.canonical.z {
            OverscaledTileId::new(z, self.wrap, self.canonical)
        } else {
            OverscaledTileId::new(z, self.wrap, self.canonical.scaled_to(z))
        }
    }

    /// Addresses one display zoom finer that together cover this one
    pub fn children(&self, max_canonical_z: u8) -> Vec<OverscaledTileId> {
        let z = self.overscaled_z + 1;
        if self.canonical.z >= max_canonical_z || self.is_overscaled() {
            vec![OverscaledTileId::new(z, self.wrap, self.canonical)]
        } else {
            self.canonical
                .children()
                .into_iter()
                .map(|child| OverscaledTileId::new(z, self.wrap, child))
                .collect()
        }
    }

    /// True if `self` is strictly finer than `ancestor` and covered by it.
    pub fn is_descendant_of(&self, ancestor: &OverscaledTileId) -> bool {
        ancestor.overscaled_z < self.overscaled_z && self.canonical.is_within(&ancestor.canonical)
    }

    /// True if the two addresses are related through the pyramid, in either direction.
    pub fn is_related_to(&self, other: &OverscaledTileId) -> bool {
        self.is_descendant_of(other) || other.is_descendant_of(self)
    }

    pub fn to_unwrapped(&self) -> UnwrappedTileId {
        UnwrappedTileId::new(self.wrap, self.canonical)
    }
}

impl fmt::Display for OverscaledTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)?;
        if self.is_overscaled() {
            write!(f, "=>{}", self.overscaled_z)?;
        }
        if self.wrap != 0 {
            write!(f, "~{}", self.wrap)?;
        }
        Ok(())
    }
}

/// A render placement: canonical cell at one world copy.
///
/// Ordered by zoom first, so iterating a sorted collection paints coarser
/// tiles before the finer tiles overlapping them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnwrappedTileId {
    pub wrap: i16,
    pub canonical: CanonicalTileId,
}

impl UnwrappedTileId {
    pub fn new(wrap: i16, canonical: CanonicalTileId) -> Self {
        Self { wrap, canonical }
    }

    /// Builds a placement from an unbounded column index at zoom `z`.
    pub fn from_unbounded(z: u8, x: i64, y: u32) -> Self {
        let n = 1i64 << z;
        Self {
            wrap: x.div_euclid(n) as i16,
            canonical: CanonicalTileId::new(z, x.rem_euclid(n) as u32, y),
        }
    }

    /// Column index including the world offset
    pub fn unbounded_x(&self) -> i64 {
        self.canonical.x as i64 + self.wrap as i64 * self.canonical.tiles_per_side() as i64
    }

    /// The data address for this placement when laid out at `overscaled_z`
    pub fn overscaled_to(&self, overscaled_z: u8) -> OverscaledTileId {
        OverscaledTileId::new(overscaled_z, self.wrap, self.canonical)
    }

    /// Footprint in normalized world coordinates, shifted by `wrap` worlds
    pub fn world_footprint(&self) -> (Point, Point) {
        let (min, max) = self.canonical.footprint();
        let offset = Point::new(self.wrap as f64, 0.0);
        (min.add(&offset), max.add(&offset))
    }
}

impl Ord for UnwrappedTileId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical
            .z
            .cmp(&other.canonical.z)
            .then(self.wrap.cmp(&other.wrap))
            .then(self.canonical.x.cmp(&other.canonical.x))
            .then(self.canonical.y.cmp(&other.canonical.y))
    }
}

impl PartialOrd for UnwrappedTileId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UnwrappedTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)?;
        if self.wrap != 0 {
            write!(f, "~{}", self.wrap)?;
        }
        Ok(())
    }
}
