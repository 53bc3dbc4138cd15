//! Configuration for tile managers
//!
//! Options can be built from presets through [`TileManagerProfile`], tuned
//! field by field, or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_CACHE_SIZE, TILE_SIZE};
use crate::core::geo::Size;
use crate::tiles::cover::ZoomTolerance;
use crate::tiles::factory::ZoomRange;
use crate::{Result, SourceError};

#[derive(Debug, Clone, PartialEq)]
pub enum TileManagerProfile {
    Balanced,
    LowMemory,
    /// Keeps more fallbacks around for smoother transitions
    Smooth,
    Custom(TileManagerOptions),
}

impl TileManagerProfile {
    pub fn resolve(&self) -> TileManagerOptions {
        match self {
            Self::Balanced => TileManagerOptions {
                cache: CacheSizing::Viewport,
                stale: StaleTilePolicy {
                    retain_fallbacks: true,
                    max_parent_levels: 8,
                    linger_updates: 0,
                },
                zoom: ZoomTolerance::default(),
            },
            Self::LowMemory => TileManagerOptions {
                cache: CacheSizing::Fixed(16),
                stale: StaleTilePolicy {
                    retain_fallbacks: true,
                    max_parent_levels: 2,
                    linger_updates: 0,
                },
                zoom: ZoomTolerance::default(),
            },
            Self::Smooth => TileManagerOptions {
                cache: CacheSizing::Fixed(DEFAULT_CACHE_SIZE * 4),
                stale: StaleTilePolicy {
                    retain_fallbacks: true,
                    max_parent_levels: 16,
                    linger_updates: 3,
                },
                zoom: ZoomTolerance {
                    max_underscale: 1,
                    ..ZoomTolerance::default()
                },
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for TileManagerProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// How the reuse cache capacity is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSizing {
    /// Exactly this many retired tiles
    Fixed(usize),
    /// Recomputed on every update from the viewport and the zoom span
    Viewport,
}

impl CacheSizing {
    /// Capacity for the given viewport and source zoom range.
    ///
    /// The viewport estimate assumes roughly half of a screenful of tiles per
    /// zoom level is worth keeping.
    pub fn capacity_for(&self, size: Size, range: ZoomRange) -> usize {
        match self {
            Self::Fixed(capacity) => *capacity,
            Self::Viewport => {
                let tile = TILE_SIZE as f64;
                let levels = (range.max as f64 - range.min as f64 + 1.0).max(1.0);
                let estimate =
                    (size.width / tile).max(1.0) * (size.height / tile).max(1.0) * levels * 0.5;
                estimate as usize
            }
        }
    }
}

/// Retention of fallback tiles shown while ideal tiles load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleTilePolicy {
    /// Substitute loaded parents/children for ideal tiles still loading
    pub retain_fallbacks: bool,
    /// How many ancestor levels to search for a loaded substitute
    pub max_parent_levels: u8,
    /// Updates a no-longer-needed fallback stays rendered for cross-fading
    pub linger_updates: u32,
}

impl Default for StaleTilePolicy {
    fn default() -> Self {
        TileManagerProfile::default().resolve().stale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileManagerOptions {
    pub cache: CacheSizing,
    pub stale: StaleTilePolicy,
    pub zoom: ZoomTolerance,
}

impl Default for TileManagerOptions {
    fn default() -> Self {
        TileManagerProfile::default().resolve()
    }
}

impl TileManagerOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.zoom.max_underscale > crate::core::constants::MAX_ZOOM {
            return Err(SourceError::Config(format!(
                "max_underscale {} exceeds the zoom pyramid",
                self.zoom.max_underscale
            )));
        }
        Ok(())
    }

    pub fn with_cache(mut self, cache: CacheSizing) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_stale_policy(mut self, stale: StaleTilePolicy) -> Self {
        self.stale = stale;
        self
    }

    pub fn with_zoom_tolerance(mut self, zoom: ZoomTolerance) -> Self {
        self.zoom = zoom;
        self
    }
}

/// Style-derived per-source parameters forwarded with every load request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleParameters {
    /// Bumped whenever the style changes in a way that affects tile content
    pub revision: u64,
    pub pixel_ratio: f32,
    /// Source layers the style actually uses; empty means all
    pub source_layers: Vec<String>,
}

impl Default for StyleParameters {
    fn default() -> Self {
        Self {
            revision: 0,
            pixel_ratio: 1.0,
            source_layers: Vec::new(),
        }
    }
}

impl StyleParameters {
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn with_source_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_layers = layers.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_presets() {
        let balanced = TileManagerProfile::Balanced.resolve();
        let low_memory = TileManagerProfile::LowMemory.resolve();
        let smooth = TileManagerProfile::Smooth.resolve();

        assert_eq!(balanced.cache, CacheSizing::Viewport);
        assert_eq!(balanced.stale.linger_updates, 0);
        assert!(low_memory.stale.max_parent_levels < balanced.stale.max_parent_levels);
        assert!(smooth.stale.linger_updates > 0);

        let custom = TileManagerProfile::Custom(low_memory.clone()).resolve();
        assert_eq!(custom, low_memory);
    }

    #[test]
    fn test_viewport_cache_size() {
        let sizing = CacheSizing::Viewport;
        // 2 x 1.5 screens of tiles, 15 levels, halved
        assert_eq!(sizing.capacity_for(Size::new(1024.0, 768.0), ZoomRange::new(0, 14)), 22);
        // tiny viewports still count as one tile per level
        assert_eq!(sizing.capacity_for(Size::new(10.0, 10.0), ZoomRange::new(0, 3)), 2);
        assert_eq!(CacheSizing::Fixed(7).capacity_for(Size::new(1.0, 1.0), ZoomRange::default()), 7);
    }

    #[test]
    fn test_options_from_json() {
        let options = TileManagerOptions::from_json(
            r#"{ "cache": { "fixed": 40 }, "stale": { "retain_fallbacks": false, "max_parent_levels": 0, "linger_updates": 0 } }"#,
        )
        .unwrap();
        assert_eq!(options.cache, CacheSizing::Fixed(40));
        assert!(!options.stale.retain_fallbacks);
        assert_eq!(options.zoom, ZoomTolerance::default());

        let round_trip = TileManagerOptions::from_json(&options.to_json().unwrap()).unwrap();
        assert_eq!(round_trip, options);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(matches!(
            TileManagerOptions::from_json("{ \"cache\": 3 }"),
            Err(SourceError::Serialization(_))
        ));
        assert!(matches!(
            TileManagerOptions::from_json(r#"{ "zoom": { "max_overscale": 0, "max_underscale": 90 } }"#),
            Err(SourceError::Config(_))
        ));
    }
}
