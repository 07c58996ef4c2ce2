use bending_core::{BendProfile, BenderTransform, BendingSettings, BendingWorld, Viewpoint};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use glam::{Quat, Vec3};
use std::time::Duration;

fn populated_world(benders: u32) -> BendingWorld {
    let settings = BendingSettings {
        max_active_benders: 32,
        ..Default::default()
    };
    let Ok(mut world) = BendingWorld::with_settings(settings) else {
        return BendingWorld::new();
    };
    world.set_viewpoint(Viewpoint::look_at(
        Vec3::new(0.0, 10.0, -20.0),
        Vec3::ZERO,
        1.0,
        16.0 / 9.0,
        0.1,
        500.0,
    ));
    for i in 0..benders {
        let angle = i as f32 * 2.399_963;
        let radius = 4.0 + (i as f32).sqrt() * 6.0;
        let transform = BenderTransform::from_translation(Vec3::new(
            angle.cos() * radius,
            0.0,
            angle.sin() * radius,
        ))
        .with_rotation(Quat::from_rotation_y(angle))
        .with_scale(Vec3::new(2.0, 1.0, 2.0));
        world.spawn_bender(i, transform, BendProfile::character());
    }
    world
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("bending_frame");
    let steps: usize = std::env::var("BENDING_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(16);
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(5));

    for &benders in &[16_u32, 128, 1024] {
        group.bench_function(format!("steps{}_benders{}", steps, benders), |b| {
            b.iter_batched(
                || populated_world(benders),
                |mut world| {
                    for tick in 0..steps {
                        // Keep one bender moving so dirty tracking does real work
                        let x = tick as f32 * 0.25;
                        world.set_transform(0, BenderTransform::from_translation(Vec3::new(x, 0.0, 0.0)));
                        world.step();
                    }
                    world
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
