use mapsource::prelude::*;
use mapsource::tiles::loader::{LoadOutcome, QueuedLoader};
use mapsource::tiles::observer::{RecordingObserver, TileEvent};

/// Reconciliation, cache and lifecycle tests driven through the public API
#[cfg(test)]
mod tile_manager_tests {
    use super::*;

    fn loaded() -> LoadOutcome {
        Ok(Arc::new(FeatureTile::new()))
    }

    /// Camera looking at exactly one z2 tile
    fn single_tile_view(x: u32, y: u32) -> UpdateParameters {
        let center = LatLng::from_world(Point::new((x as f64 + 0.5) / 4.0, (y as f64 + 0.5) / 4.0));
        UpdateParameters::new(TransformState::new(center, 2.0, Size::new(512.0, 512.0)))
    }

    fn z2(x: u32, y: u32) -> OverscaledTileId {
        OverscaledTileId::from_canonical(CanonicalTileId::new(2, x, y))
    }

    struct Fixture {
        loader: Arc<QueuedLoader>,
        observer: Arc<RecordingObserver>,
        hub: SignalHub,
        manager: SourceTileManager,
    }

    fn fixture(cache_size: usize) -> Fixture {
        let loader = Arc::new(QueuedLoader::new());
        let observer = Arc::new(RecordingObserver::new());
        let hub = SignalHub::new();
        let options = TileManagerOptions::default().with_cache(CacheSizing::Fixed(cache_size));
        let manager = SourceTileManager::with_options(
            "streets",
            StandardTileFactory::vector(),
            loader.clone(),
            options,
        )
        .with_observer(observer.clone())
        .with_signal_hub(&hub);
        Fixture {
            loader,
            observer,
            hub,
            manager,
        }
    }

    #[test]
    fn test_single_tile_view_requests_one_tile() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));

        assert_eq!(f.loader.requests(), vec![z2(1, 1)]);
        assert_eq!(f.manager.live_ids().into_iter().collect::<Vec<_>>(), vec![z2(1, 1)]);
        assert!(!f.manager.is_loaded());

        assert!(f.loader.complete(&z2(1, 1), loaded()));
        assert_eq!(f.manager.process_completions(), 1);
        assert!(f.manager.is_loaded());
        assert_eq!(f.manager.tile(&z2(1, 1)).map(Tile::state), Some(TileState::Loaded));
    }

    #[test]
    fn test_retire_order_and_reuse() {
        let mut f = fixture(2);
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            f.manager.update_tiles(&single_tile_view(x, y));
        }
        // A=(1,1) B=(2,1) C=(1,2) retired in that order; A fell out
        assert_eq!(f.manager.cache().ids(), vec![z2(2, 1), z2(1, 2)]);

        let attempt = f.manager.cache().peek(&z2(2, 1)).map(Tile::attempt);
        let requests = f.loader.request_count();
        f.manager.update_tiles(&single_tile_view(2, 1));

        assert_eq!(f.loader.request_count(), requests, "reuse must not reload");
        assert_eq!(f.manager.tile(&z2(2, 1)).map(Tile::attempt), attempt);
        // D=(2,2) was retired after B left the cache
        assert_eq!(f.manager.cache().ids(), vec![z2(1, 2), z2(2, 2)]);
    }

    #[test]
    fn test_zero_cache_size_discards_everything() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.update_tiles(&single_tile_view(2, 1));
        assert_eq!(f.manager.cache().len(), 1);

        f.manager.set_cache_size(0);
        assert!(f.manager.cache().is_empty());

        f.manager.update_tiles(&single_tile_view(1, 2));
        assert!(f.manager.cache().is_empty());
        assert!(f.manager.check_invariants().is_ok());
    }

    #[test]
    fn test_late_completion_for_cached_tile() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.update_tiles(&single_tile_view(2, 1));

        // finishes after retirement: applied, but nobody is told yet
        assert!(f.loader.complete(&z2(1, 1), loaded()));
        assert_eq!(f.manager.process_completions(), 1);
        assert_eq!(f.manager.cache().peek(&z2(1, 1)).map(Tile::state), Some(TileState::Loaded));
        assert!(f.observer.events().is_empty());

        let requests = f.loader.request_count();
        f.manager.update_tiles(&single_tile_view(1, 1));
        assert_eq!(f.loader.request_count(), requests);
        assert_eq!(f.observer.changed_ids(), vec![z2(1, 1)]);
        assert!(f.manager.is_loaded());
    }

    #[test]
    fn test_late_failure_for_cached_tile_reported_on_reuse() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.update_tiles(&single_tile_view(2, 1));

        assert!(f.loader.fail(&z2(1, 1), LoadError::NotFound));
        assert_eq!(f.manager.process_completions(), 1);
        assert!(f.observer.events().is_empty());

        f.manager.update_tiles(&single_tile_view(1, 1));
        assert_eq!(f.manager.tile(&z2(1, 1)).map(Tile::state), Some(TileState::Errored));
        assert_eq!(
            f.observer.take(),
            vec![TileEvent::Error {
                source: "streets".to_string(),
                id: z2(1, 1),
                error: LoadError::NotFound,
            }]
        );

        // reported once, not again on the next reuse
        f.manager.update_tiles(&single_tile_view(2, 1));
        f.manager.update_tiles(&single_tile_view(1, 1));
        assert_eq!(f.observer.error_count(), 0);
    }

    #[test]
    fn test_late_completion_for_discarded_tile_is_dropped() {
        let mut f = fixture(0);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.update_tiles(&single_tile_view(2, 1));

        assert!(f.loader.complete(&z2(1, 1), loaded()));
        assert_eq!(f.manager.process_completions(), 0);
        assert!(f.observer.events().is_empty());
    }

    #[test]
    fn test_completion_after_manager_dropped() {
        let f = fixture(8);
        let Fixture { loader, mut manager, .. } = f;
        manager.update_tiles(&single_tile_view(1, 1));
        drop(manager);
        assert!(!loader.complete(&z2(1, 1), loaded()));
    }

    #[test]
    fn test_errored_tile_stays_resident_until_reload() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        assert!(f.loader.fail(&z2(1, 1), LoadError::Network("connection reset".into())));
        f.manager.process_completions();

        assert_eq!(f.observer.error_count(), 1);
        assert_eq!(f.manager.tile(&z2(1, 1)).map(Tile::state), Some(TileState::Errored));
        assert!(matches!(
            f.manager.tile_errors().as_slice(),
            [SourceError::LoadFailure { cause: LoadError::Network(_), .. }]
        ));
        // settled, so the view counts as loaded
        assert!(f.manager.is_loaded());

        f.manager.update_tiles(&single_tile_view(1, 1));
        assert_eq!(f.loader.request_count(), 1, "errors are not retried automatically");

        f.observer.take();
        f.manager.reload_tiles();
        assert_eq!(f.loader.request_count(), 2);
        assert_eq!(f.manager.tile(&z2(1, 1)).map(Tile::state), Some(TileState::Loading));
        assert_eq!(
            f.observer.take(),
            vec![TileEvent::Changed {
                source: "streets".to_string(),
                id: z2(1, 1),
                state: TileState::Loading,
            }]
        );
    }

    #[test]
    fn test_reload_of_loading_tile_is_silent() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.reload_tiles();
        assert_eq!(f.loader.request_count(), 2);
        assert!(f.observer.events().is_empty());
    }

    #[test]
    fn test_reload_ignores_superseded_attempt() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.update_tiles(&single_tile_view(2, 1));
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.reload_tiles();
        assert!(f.manager.cache().is_empty(), "reload drops cached tiles");

        // the first attempt is still pending and completes first
        assert_eq!(f.loader.pending_ids(), vec![z2(1, 1), z2(2, 1), z2(1, 1)]);
        assert!(f.loader.complete(&z2(1, 1), loaded()));
        assert_eq!(f.manager.process_completions(), 0);
        assert_eq!(f.manager.tile(&z2(1, 1)).map(Tile::state), Some(TileState::Loading));

        assert!(f.loader.complete(&z2(1, 1), loaded()));
        assert_eq!(f.manager.process_completions(), 1);
        assert_eq!(f.manager.tile(&z2(1, 1)).map(Tile::state), Some(TileState::Loaded));
    }

    #[test]
    fn test_remove_and_invalidate() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.loader.complete_all(|_| loaded());
        f.manager.process_completions();

        f.manager.remove_tiles();
        assert_eq!(f.manager.tiles().count(), 0);
        assert!(f.manager.cache().contains(&z2(1, 1)));
        assert_eq!(f.manager.ideal_tile_ids().len(), 1);

        f.manager.invalidate_tiles();
        assert!(f.manager.cache().is_empty());
        assert!(f.manager.ideal_tile_ids().is_empty());
        assert!(f
            .manager
            .query_source_features(&Default::default())
            .is_empty());

        // next update starts from scratch
        f.manager.update_tiles(&single_tile_view(1, 1));
        assert_eq!(f.loader.request_count(), 2);
    }

    #[test]
    fn test_disabled_source_ignores_updates() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.set_enabled(false);
        assert_eq!(f.manager.tiles().count(), 0);
        assert!(f.manager.cache().contains(&z2(1, 1)));

        f.manager.update_tiles(&single_tile_view(2, 2));
        assert_eq!(f.loader.request_count(), 1);

        f.manager.set_enabled(true);
        f.manager.update_tiles(&single_tile_view(1, 1));
        assert_eq!(f.loader.request_count(), 1, "re-enabled source reuses its cache");
    }

    #[test]
    fn test_low_memory_signal_purges_cache() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.manager.update_tiles(&single_tile_view(2, 1));
        assert_eq!(f.manager.cache().len(), 1);

        assert_eq!(f.hub.broadcast(Signal::LowMemory), 1);
        f.manager.process_completions();
        assert!(f.manager.cache().is_empty());
        assert_eq!(f.manager.cache().capacity(), 8);

        f.manager.update_tiles(&single_tile_view(1, 2));
        assert_eq!(f.manager.cache().len(), 1);
    }

    #[test]
    fn test_manager_unsubscribes_on_drop() {
        let f = fixture(8);
        assert_eq!(f.hub.subscriber_count(), 1);
        let Fixture { hub, manager, .. } = f;
        drop(manager);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_wrapped_addresses_share_one_tile() {
        let mut f = fixture(64);
        // z1 view two worlds wide centered on the antimeridian
        let transform = TransformState::new(LatLng::new(0.0, 180.0), 1.0, Size::new(2048.0, 512.0));
        f.manager.update_tiles(&UpdateParameters::new(transform));

        assert_eq!(f.manager.ideal_placements().len(), 8);
        assert_eq!(f.manager.tiles().count(), 4);
        assert_eq!(f.loader.request_count(), 4);
        assert!(f.manager.tiles().all(|tile| tile.id().wrap == 0));
    }

    #[test]
    fn test_live_set_tracks_ideal_set() {
        let mut f = fixture(32);
        let views = [
            (LatLng::new(48.85, 2.35), 5.0),
            (LatLng::new(48.85, 2.35), 6.0),
            (LatLng::new(48.0, 4.0), 6.3),
            (LatLng::new(48.0, 4.0), 4.7),
            (LatLng::new(40.7, -74.0), 4.7),
            (LatLng::new(40.7, -74.0), 7.1),
        ];
        for (round, (center, zoom)) in views.into_iter().enumerate() {
            let transform = TransformState::new(center, zoom, Size::new(800.0, 600.0));
            f.manager.update_tiles(&UpdateParameters::new(transform));

            let ideal = f.manager.ideal_tile_ids().clone();
            for id in f.manager.live_ids() {
                assert!(
                    ideal.contains(&id) || ideal.iter().any(|ideal| ideal.is_related_to(&id)),
                    "round {}: {} is neither ideal nor a fallback",
                    round,
                    id
                );
            }
            assert!(ideal.iter().all(|id| f.manager.tile(id).is_some()));
            assert!(f.manager.check_invariants().is_ok());

            // let every other round finish loading
            if round % 2 == 0 {
                f.loader.complete_all(|_| loaded());
                f.manager.process_completions();
                f.manager.update_tiles(&UpdateParameters::new(transform_for(center, zoom)));
                assert_eq!(f.manager.live_ids(), ideal);
            }
        }
    }

    fn transform_for(center: LatLng, zoom: f64) -> TransformState {
        TransformState::new(center, zoom, Size::new(800.0, 600.0))
    }

    #[test]
    fn test_observer_sees_each_transition_once() {
        let mut f = fixture(8);
        f.manager.update_tiles(&single_tile_view(1, 1));
        f.loader.complete_all(|_| loaded());
        f.manager.process_completions();
        f.manager.process_completions();

        assert_eq!(
            f.observer.take(),
            vec![TileEvent::Changed {
                source: "streets".to_string(),
                id: z2(1, 1),
                state: TileState::Loaded,
            }]
        );
    }
}
