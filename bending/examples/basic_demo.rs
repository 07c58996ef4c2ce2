//! Basic demonstration of the bending core.
//!
//! Run with: cargo run --example basic_demo
//! Set RUST_LOG=bending_core=debug to watch elections and flushes.

use bending_core::gpu_bridge::{batch_to_flatbuffer, parse_bender_count};
use bending_core::{
    BendProfile, BenderTransform, BendingSettings, BendingWorld, PermanentVolume, RecordingRaster,
    Viewpoint,
};
use glam::{UVec3, Vec3};

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    println!("=== Bending Core - Demo ===\n");

    let settings = BendingSettings {
        max_active_benders: 8,
        permanent_enabled: true,
        ..Default::default()
    };
    let mut world = match BendingWorld::with_settings(settings) {
        Ok(world) => world,
        Err(err) => {
            eprintln!("bad settings: {err}");
            return;
        }
    };
    let raster = RecordingRaster::new();
    world.set_raster_backend(raster.clone());

    // A player, a ring of wandering characters and one wind gust
    world.spawn_bender(0, BenderTransform::from_translation(Vec3::ZERO), BendProfile::character());
    world.set_permanent(0, true);
    for i in 1..16u32 {
        let angle = i as f32 * 0.4;
        let at = Vec3::new(angle.cos(), 0.0, angle.sin()) * (i as f32 * 3.0);
        world.spawn_bender(i, BenderTransform::from_translation(at), BendProfile::character());
    }
    world.spawn_bender(
        100,
        BenderTransform::from_translation(Vec3::new(0.0, 2.0, 30.0)).with_scale(Vec3::new(20.0, 4.0, 20.0)),
        BendProfile::wind(),
    );

    let volume = world.spawn_permanent_volume(
        PermanentVolume::new(Vec3::new(-16.0, -2.0, -16.0), Vec3::new(32.0, 4.0, 32.0), UVec3::new(64, 8, 64))
            .with_update_frequency(0.5),
    );

    println!("Running 20 frames with the player walking forward...\n");
    for frame in 0..20 {
        let player = Vec3::new(0.0, 0.0, frame as f32 * 0.5);
        world.set_transform(0, BenderTransform::from_translation(player));
        world.set_viewpoint(Viewpoint::look_at(
            player + Vec3::new(0.0, 3.0, -6.0),
            player,
            1.0,
            16.0 / 9.0,
            0.1,
            300.0,
        ));
        world.step();

        if (frame + 1) % 5 == 0 {
            let stats = world.frame_stats();
            println!(
                "  Frame {:>2}: packed={} culled={} coordinator={:?}",
                stats.ticks,
                stats.last_packed,
                stats.culling_engaged,
                world.coordinator_id()
            );
        }
    }

    if let Ok(volume) = volume {
        let scanned = world.permanent_batch(volume).map(|b| b.count()).unwrap_or(0);
        println!("\nPermanent volume holds {} bender(s)", scanned);
    }
    println!("Raster calls recorded: {}", raster.take_events().len());

    if let Some(batch) = world.packed_batch() {
        let buffer = batch_to_flatbuffer(batch);
        println!(
            "Flat buffer: {} floats, {:?} benders",
            buffer.len(),
            parse_bender_count(&buffer)
        );
    }

    println!("\n=== Final State (JSON) ===\n");
    match world.snapshot().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("snapshot failed: {err}"),
    }
}
