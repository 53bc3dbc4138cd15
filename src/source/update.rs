//! Reconciliation of live tiles against the ideal set.

use std::collections::BTreeSet;

use super::{SourceTileManager, UpdateParameters};
use crate::tiles::cover::compute_active_set;
use crate::tiles::factory::ZoomRange;
use crate::tiles::id::{OverscaledTileId, UnwrappedTileId};
use crate::tiles::tile::{TileState, TileTransition};

/// Working state of one reconciliation pass
#[derive(Default)]
struct Reconciliation {
    retain: BTreeSet<OverscaledTileId>,
    placements: Vec<(UnwrappedTileId, OverscaledTileId)>,
    /// Ancestors already visited, wrap kept
    checked: BTreeSet<OverscaledTileId>,
    /// Fallbacks used this pass, wrap kept
    fallbacks: Vec<OverscaledTileId>,
}

impl Reconciliation {
    fn render(&mut self, address: OverscaledTileId) {
        let key = address.without_wrap();
        self.retain.insert(key);
        self.placements.push((address.to_unwrapped(), key));
    }
}

impl SourceTileManager {
    /// Brings the live tiles in line with the camera in `parameters`.
    ///
    /// Ideal tiles are reused from the live set or the cache, or created and
    /// requested. Loaded parents and children stand in for ideal tiles that
    /// are still loading. Everything else is retired into the cache.
    pub fn update_tiles(&mut self, parameters: &UpdateParameters) {
        self.poll_signals();
        if !self.enabled {
            return;
        }
        self.tick += 1;
        self.style = parameters.style.clone();
        self.render_list.clear();

        let range = self.factory.zoom_range();
        let set = compute_active_set(
            &parameters.transform,
            self.factory.kind(),
            self.factory.tile_size(),
            range,
            self.options.zoom,
        );

        let mut pass = Reconciliation::default();
        let mut ideal = Vec::with_capacity(set.tiles.len());
        let mut ideal_ids = BTreeSet::new();
        let mut loading = Vec::new();

        for placement in &set.tiles {
            let address = placement.overscaled_to(set.data_zoom);
            let key = address.without_wrap();
            if !self.ensure_tile(&key, parameters) {
                continue;
            }
            ideal.push(*placement);
            ideal_ids.insert(key);
            pass.retain.insert(key);
            // kept whatever the state; the render list only draws loaded tiles
            pass.placements.push((*placement, key));
            if self.tiles.get(&key).map(|tile| tile.state()) == Some(TileState::Loading) {
                loading.push(address);
            }
        }

        if self.options.stale.retain_fallbacks {
            for address in loading {
                self.add_fallbacks(address, range, &mut pass);
            }
        }
        self.linger(&ideal, set.data_zoom, &mut pass);

        self.ideal = ideal;
        self.ideal_ids = ideal_ids;
        self.placements = pass.placements;

        let capacity = self
            .options
            .cache
            .capacity_for(parameters.transform.size, range);
        for discarded in self.cache.set_capacity(capacity) {
            log::trace!("{}: discarded tile {}", self.id, discarded.id());
        }

        let stale: Vec<OverscaledTileId> = self
            .tiles
            .keys()
            .filter(|id| !pass.retain.contains(id))
            .copied()
            .collect();
        for id in &stale {
            if let Some(tile) = self.tiles.remove(id) {
                self.retire(tile);
            }
        }

        log::debug!(
            "{}: z{} ideal={} live={} retired={} cached={}/{}",
            self.id,
            set.data_zoom,
            self.ideal.len(),
            self.tiles.len(),
            stale.len(),
            self.cache.len(),
            self.cache.capacity()
        );
        self.debug_check_cache();
    }

    /// Makes the tile at `key` live. Returns false when the source has no
    /// tile there.
    fn ensure_tile(&mut self, key: &OverscaledTileId, parameters: &UpdateParameters) -> bool {
        if let Some(tile) = self.tiles.get_mut(key) {
            tile.touch(self.tick);
            return true;
        }
        if self.revive(key) {
            return true;
        }
        match self.factory.create_tile(key, parameters) {
            Some(mut tile) => {
                tile.touch(self.tick);
                self.tiles.insert(*key, tile);
                self.request_load(key);
                true
            }
            None => false,
        }
    }

    /// Moves a cached tile back into the live set without reloading it.
    fn revive(&mut self, key: &OverscaledTileId) -> bool {
        let Some(mut tile) = self.cache.take(key) else {
            return false;
        };
        tile.touch(self.tick);
        log::trace!("{}: reusing cached tile {}", self.id, key);
        match tile.take_retired_transition() {
            Some(TileTransition::Errored(error)) => {
                log::warn!("{}: reused tile {} failed to load while cached: {}", self.id, key, error);
                self.observer.on_tile_error(&self.id, &tile, &error);
            }
            Some(TileTransition::Loaded) => self.observer.on_tile_changed(&self.id, &tile),
            None => {}
        }
        self.tiles.insert(*key, tile);
        true
    }

    fn is_renderable(&self, key: &OverscaledTileId) -> bool {
        self.tiles.get(key).map_or(false, |tile| tile.is_renderable())
    }

    /// Finds loaded stand-ins for an ideal tile that is still loading.
    fn add_fallbacks(&mut self, address: OverscaledTileId, range: ZoomRange, pass: &mut Reconciliation) {
        let children = address.children(range.max);
        let mut covered = true;
        for child in &children {
            if self.is_renderable(&child.without_wrap()) {
                pass.render(*child);
                pass.fallbacks.push(*child);
            } else {
                covered = false;
            }
        }
        if covered {
            return;
        }

        let max_levels = self.options.stale.max_parent_levels as u16;
        let mut overscaled_z = address.overscaled_z;
        let mut levels = 0u16;
        while overscaled_z > range.min && levels < max_levels {
            overscaled_z -= 1;
            levels += 1;
            let parent = address.scaled_to(overscaled_z);
            if !pass.checked.insert(parent) {
                break;
            }
            let key = parent.without_wrap();
            if !self.tiles.contains_key(&key) && !self.revive(&key) {
                continue;
            }
            pass.retain.insert(key);
            if self.is_renderable(&key) {
                pass.render(parent);
                pass.fallbacks.push(parent);
                break;
            }
        }
    }

    /// Keeps recently used fallbacks for `linger_updates` more passes while
    /// they still relate to an ideal tile.
    fn linger(&mut self, ideal: &[UnwrappedTileId], data_zoom: u8, pass: &mut Reconciliation) {
        let window = self.options.stale.linger_updates;
        let fresh: BTreeSet<OverscaledTileId> = pass.fallbacks.iter().copied().collect();

        let mut lingering = std::mem::take(&mut self.lingering);
        lingering.retain(|address, remaining| {
            if fresh.contains(address) || *remaining == 0 {
                return false;
            }
            let related = ideal
                .iter()
                .any(|placement| placement.overscaled_to(data_zoom).is_related_to(address));
            if !related || !self.is_renderable(&address.without_wrap()) {
                return false;
            }
            *remaining -= 1;
            pass.render(*address);
            true
        });

        if window > 0 {
            for address in fresh {
                lingering.insert(address, window);
            }
        }
        self.lingering = lingering;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CacheSizing, StaleTilePolicy, TileManagerOptions};
    use crate::core::geo::{LatLng, Size};
    use crate::core::transform::TransformState;
    use crate::prelude::Arc;
    use crate::signals::SignalHub;
    use crate::tiles::content::FeatureTile;
    use crate::tiles::factory::StandardTileFactory;
    use crate::tiles::loader::QueuedLoader;

    fn manager(loader: &Arc<QueuedLoader>, stale: StaleTilePolicy) -> SourceTileManager {
        let options = TileManagerOptions::default()
            .with_cache(CacheSizing::Fixed(64))
            .with_stale_policy(stale);
        SourceTileManager::with_options("test", StandardTileFactory::vector(), loader.clone(), options)
            .with_signal_hub(&SignalHub::new())
    }

    fn at_zoom(zoom: f64) -> UpdateParameters {
        UpdateParameters::new(TransformState::new(LatLng::new(10.0, 10.0), zoom, Size::new(512.0, 512.0)))
    }

    fn load_all(loader: &QueuedLoader, manager: &mut SourceTileManager) {
        loader.complete_all(|_| Ok(Arc::new(FeatureTile::new())));
        manager.process_completions();
    }

    #[test]
    fn test_parent_stands_in_while_children_load() {
        let loader = Arc::new(QueuedLoader::new());
        let mut manager = manager(&loader, StaleTilePolicy::default());

        manager.update_tiles(&at_zoom(3.0));
        load_all(&loader, &mut manager);
        let coarse = manager.ideal_tile_ids().clone();

        manager.update_tiles(&at_zoom(4.0));
        // z3 tiles are kept as fallbacks for the loading z4 set
        for id in &coarse {
            assert!(manager.tile(id).is_some(), "fallback {} retired", id);
        }
        let rendered: Vec<_> = manager.render_builder().renderable(&manager.tiles).collect();
        assert!(!rendered.is_empty());
        assert!(rendered.iter().all(|(placement, _)| placement.canonical.z == 3));

        load_all(&loader, &mut manager);
        manager.update_tiles(&at_zoom(4.0));
        assert_eq!(manager.live_ids(), *manager.ideal_tile_ids());
    }

    #[test]
    fn test_children_stand_in_when_zooming_out() {
        let loader = Arc::new(QueuedLoader::new());
        let mut manager = manager(&loader, StaleTilePolicy::default());

        manager.update_tiles(&at_zoom(4.0));
        load_all(&loader, &mut manager);
        manager.update_tiles(&at_zoom(3.0));

        assert!(manager
            .render_builder()
            .renderable(&manager.tiles)
            .any(|(placement, _)| placement.canonical.z == 4));
        assert!(manager.live_ids().len() > manager.ideal_tile_ids().len());
    }

    #[test]
    fn test_fallbacks_disabled() {
        let loader = Arc::new(QueuedLoader::new());
        let mut manager = manager(
            &loader,
            StaleTilePolicy {
                retain_fallbacks: false,
                max_parent_levels: 0,
                linger_updates: 0,
            },
        );

        manager.update_tiles(&at_zoom(3.0));
        load_all(&loader, &mut manager);
        manager.update_tiles(&at_zoom(4.0));
        assert_eq!(manager.live_ids(), *manager.ideal_tile_ids());
        assert_eq!(manager.render_builder().renderable(&manager.tiles).count(), 0);
    }

    #[test]
    fn test_linger_window_keeps_fallbacks_rendered() {
        let loader = Arc::new(QueuedLoader::new());
        let mut manager = manager(
            &loader,
            StaleTilePolicy {
                retain_fallbacks: true,
                max_parent_levels: 4,
                linger_updates: 2,
            },
        );

        manager.update_tiles(&at_zoom(3.0));
        load_all(&loader, &mut manager);
        manager.update_tiles(&at_zoom(4.0));
        load_all(&loader, &mut manager);

        // ideal set settled, parents linger for two more passes
        manager.update_tiles(&at_zoom(4.0));
        assert!(manager.live_ids().len() > manager.ideal_tile_ids().len());
        manager.update_tiles(&at_zoom(4.0));
        assert!(manager.live_ids().len() > manager.ideal_tile_ids().len());
        manager.update_tiles(&at_zoom(4.0));
        assert_eq!(manager.live_ids(), *manager.ideal_tile_ids());
    }

    #[test]
    fn test_parent_revived_from_cache() {
        let loader = Arc::new(QueuedLoader::new());
        let mut manager = manager(&loader, StaleTilePolicy::default());

        manager.update_tiles(&at_zoom(3.0));
        load_all(&loader, &mut manager);
        let coarse = manager.ideal_tile_ids().clone();
        manager.update_tiles(&at_zoom(5.0));
        load_all(&loader, &mut manager);
        manager.update_tiles(&at_zoom(5.0));
        assert!(coarse.iter().all(|id| manager.cache().contains(id)));

        let requests = loader.request_count();
        manager.update_tiles(&at_zoom(4.0));
        // z3 parents come back from the cache instead of being reloaded
        let revived = coarse.iter().filter(|id| manager.tile(id).is_some()).count();
        assert!(revived > 0);
        assert_eq!(
            loader.request_count() - requests,
            manager.ideal_tile_ids().len()
        );
    }
}
