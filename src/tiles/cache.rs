use lru::LruCache;

use crate::core::constants::DEFAULT_CACHE_SIZE;
use crate::tiles::id::OverscaledTileId;
use crate::tiles::tile::Tile;
use crate::{Result, SourceError};

/// Bounded holding area for retired tiles.
///
/// Eviction is strictly oldest-retired-first. Entries are only ever pushed,
/// peeked or popped, never promoted, so the underlying LRU order is the
/// retirement order. A reused tile leaves the cache entirely.
pub struct TileCache {
    entries: LruCache<OverscaledTileId, Tile>,
    capacity: usize,
}

impl TileCache {
    /// Create a new tile cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }

    /// Retires a tile into the cache, discarding the oldest entries beyond
    /// capacity. Returns the discarded tiles.
    pub fn add(&mut self, tile: Tile) -> Vec<Tile> {
        if self.capacity == 0 {
            return vec![tile];
        }
        let mut discarded = Vec::new();
        if let Some((_, replaced)) = self.entries.push(tile.id(), tile) {
            discarded.push(replaced);
        }
        discarded.extend(self.evict_to(self.capacity));
        discarded
    }

    /// Removes and returns the tile at `id` for reuse
    pub fn take(&mut self, id: &OverscaledTileId) -> Option<Tile> {
        self.entries.pop(&id.without_wrap())
    }

    pub fn contains(&self, id: &OverscaledTileId) -> bool {
        self.entries.contains(&id.without_wrap())
    }

    /// Access without touching the eviction order
    pub fn peek(&self, id: &OverscaledTileId) -> Option<&Tile> {
        self.entries.peek(&id.without_wrap())
    }

    pub(crate) fn peek_mut(&mut self, id: &OverscaledTileId) -> Option<&mut Tile> {
        self.entries.peek_mut(&id.without_wrap())
    }

    /// Sets capacity, discarding oldest entries until occupancy fits.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<Tile> {
        self.capacity = capacity;
        self.evict_to(capacity)
    }

    /// Drops every entry while keeping the configured capacity.
    pub fn purge(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached addresses, oldest retirement first
    pub fn ids(&self) -> Vec<OverscaledTileId> {
        self.entries.iter().rev().map(|(id, _)| *id).collect()
    }

    pub fn check_invariants(&self) -> Result<()> {
        if self.entries.len() > self.capacity {
            return Err(SourceError::CapacityViolation {
                len: self.entries.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn evict_to(&mut self, capacity: usize) -> Vec<Tile> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            match self.entries.pop_lru() {
                Some((id, tile)) => {
                    log::trace!("evicting cached tile {}", id);
                    evicted.push(tile);
                }
                None => break,
            }
        }
        evicted
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::factory::SourceKind;
    use crate::tiles::id::CanonicalTileId;

    fn id(x: u32) -> OverscaledTileId {
        OverscaledTileId::from_canonical(CanonicalTileId::new(4, x, 0))
    }

    fn tile(x: u32) -> Tile {
        Tile::new(id(x), SourceKind::Vector)
    }

    #[test]
    fn test_tile_cache_basic_operations() {
        let mut cache = TileCache::new(2);
        assert!(cache.is_empty());

        assert!(cache.add(tile(1)).is_empty());
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&id(1)));
        assert!(cache.peek(&id(1)).is_some());

        let reused = cache.take(&id(1)).unwrap();
        assert_eq!(reused.id(), id(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_is_oldest_retired_first() {
        let mut cache = TileCache::new(2);
        cache.add(tile(1));
        cache.add(tile(2));
        // Peeking must not refresh entry 1.
        assert!(cache.peek(&id(1)).is_some());
        let discarded = cache.add(tile(3));

        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].id(), id(1));
        assert_eq!(cache.ids(), vec![id(2), id(3)]);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut cache = TileCache::new(0);
        let discarded = cache.add(tile(1));
        assert_eq!(discarded.len(), 1);
        assert!(cache.is_empty());
        assert!(cache.check_invariants().is_ok());
    }

    #[test]
    fn test_shrinking_discards_oldest() {
        let mut cache = TileCache::new(4);
        for x in 0..4 {
            cache.add(tile(x));
        }
        let discarded = cache.set_capacity(1);
        assert_eq!(discarded.len(), 3);
        assert_eq!(cache.ids(), vec![id(3)]);
        assert!(cache.check_invariants().is_ok());
    }

    #[test]
    fn test_wrapped_lookup_finds_shared_entry() {
        let mut cache = TileCache::new(2);
        cache.add(tile(5));
        let wrapped = OverscaledTileId { wrap: 3, ..id(5) };
        assert!(cache.contains(&wrapped));
        assert!(cache.take(&wrapped).is_some());
    }

    #[test]
    fn test_purge_keeps_capacity() {
        let mut cache = TileCache::new(3);
        cache.add(tile(1));
        cache.add(tile(2));
        assert_eq!(cache.purge(), 2);
        assert_eq!(cache.capacity(), 3);
        cache.add(tile(3));
        assert_eq!(cache.len(), 1);
    }
}
