use mapsource::prelude::*;
use mapsource::tiles::loader::QueuedLoader;

/// Prints every tile of a frame instead of drawing it
struct PrintingConsumer;

impl RenderConsumer for PrintingConsumer {
    fn start_render(&mut self, tile_count: usize) {
        println!("   frame with {} tiles", tile_count);
    }

    fn render_tile(&mut self, tile: RenderTileRef<'_>) {
        println!(
            "     {} -> tile {} clip {}",
            tile.render.id, tile.render.tile_id, tile.render.clip_id.0
        );
    }
}

/// Drives a tile manager through a few camera moves without any GPU
fn main() -> mapsource::Result<()> {
    #[cfg(feature = "debug")]
    mapsource::init_logging();

    println!("Headless tile manager");
    println!("=====================");

    let loader = Arc::new(QueuedLoader::new());
    let options = TileManagerProfile::Balanced.resolve();
    let mut manager =
        SourceTileManager::with_options("streets", StandardTileFactory::vector(), loader.clone(), options);

    let views = [
        ("San Francisco", LatLng::new(37.7749, -122.4194), 12.0),
        ("Tokyo", LatLng::new(35.6762, 139.6503), 11.5),
        ("Antimeridian", LatLng::new(0.0, 180.0), 3.0),
    ];

    for (name, center, zoom) in views {
        let transform = TransformState::new(center, zoom, Size::new(1024.0, 768.0));
        let parameters = UpdateParameters::new(transform.clone());

        manager.update_tiles(&parameters);
        let requested = loader.complete_all(|_| Ok(Arc::new(FeatureTile::new())));
        manager.process_completions();

        println!(
            "\n{} at zoom {}: {} loads, {} live, {} cached",
            name,
            zoom,
            requested,
            manager.tiles().count(),
            manager.cache().len()
        );
        manager.render_frame(&transform.projection_matrix(), &transform, &mut PrintingConsumer);
        manager.check_invariants()?;
    }

    manager.dump_debug_logs();
    Ok(())
}
