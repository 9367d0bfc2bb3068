use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::rc::Rc;

use cullflow::core::camera::{CameraSource, FixedCamera};
use cullflow::core::config::Config;
use cullflow::core::types::Vec3;
use cullflow::scene::dimensions::StaticSceneObject;
use cullflow::sched::queue::PriorityQueue;
use cullflow::sched::Scheduler;

fn populated_scheduler(count_per_axis: i32) -> Scheduler {
    let camera = Rc::new(FixedCamera::look_at(
        Vec3::new(0.0, 0.0, 200.0),
        Vec3::ZERO,
        70.0,
        16.0 / 9.0,
    ));
    let config = Config {
        voxel_size: 20.0,
        render_distance_target: 300.0,
        search_seed: Some(0xC0FFEE),
        ..Default::default()
    };
    let mut scheduler =
        Scheduler::with_config(camera as Rc<dyn CameraSource>, config).unwrap();

    let spacing = 25.0;
    let offset = count_per_axis as f32 * spacing * 0.5;
    for x in 0..count_per_axis {
        for y in 0..count_per_axis {
            for z in 0..count_per_axis {
                let pos = Vec3::new(x as f32, y as f32, z as f32) * spacing
                    - Vec3::splat(offset);
                scheduler
                    .add_object(Rc::new(StaticSceneObject::new(pos, Vec3::splat(4.0))))
                    .unwrap();
            }
        }
    }
    scheduler
}

fn bench_frame_tick_4k(c: &mut Criterion) {
    let mut scheduler = populated_scheduler(16); // 4096 objects

    c.bench_function("frame_tick_4096_objects", |b| {
        b.iter(|| {
            scheduler.begin_frame();
            let mut yielded = 0u32;
            for update in scheduler.iterate_objects_to_update() {
                yielded += 1;
                black_box(update);
            }
            black_box(yielded)
        });
    });
}

fn bench_queue_batch_build(c: &mut Criterion) {
    let items: Vec<u64> = (0..10_000).collect();
    let priorities: Vec<f64> = (0..10_000).map(|i| ((i * 7919) % 10_000) as f64).collect();

    c.bench_function("queue_batch_enqueue_10k", |b| {
        b.iter(|| {
            let mut queue = PriorityQueue::new();
            queue.add_multiple_to_incoming_batch(black_box(&items), black_box(&priorities));
            queue.enqueue_incoming_batch();
            black_box(queue.len())
        });
    });
}

criterion_group!(benches, bench_frame_tick_4k, bench_queue_batch_build);
criterion_main!(benches);
