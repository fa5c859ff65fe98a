use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{Mat4, UVec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sightline_config::{CullingConfig, ParallelConfig};
use sightline_math::BoxSphereBounds;
use sightline_scene::{PrimitiveDesc, PrimitiveProxy, Scene, SceneView, ViewRelevance};
use sightline_visibility::{WorkerPool, cull_view_frustum};

struct Cube(BoxSphereBounds);

impl PrimitiveProxy for Cube {
    fn bounds(&self) -> BoxSphereBounds {
        self.0
    }
    fn view_relevance(&self, _view: &SceneView) -> ViewRelevance {
        ViewRelevance::opaque_static()
    }
}

fn scattered_scene(count: usize) -> Scene {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut scene = Scene::new();
    for _ in 0..count {
        let origin = Vec3::new(
            rng.random_range(-2000.0..2000.0),
            rng.random_range(-50.0..50.0),
            rng.random_range(-2000.0..2000.0),
        );
        let max = rng.random_range(200.0..3000.0);
        scene.add_object(
            Arc::new(Cube(BoxSphereBounds::from_extent(origin, Vec3::splat(2.0)))),
            PrimitiveDesc::default().with_draw_distance(0.0, max),
        );
    }
    scene
}

fn view() -> SceneView {
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 16.0 / 9.0, 5000.0, 0.1);
    let look = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    SceneView::new(Vec3::ZERO, look, proj, UVec2::new(1920, 1080))
}

fn bench_frustum_cull_serial(c: &mut Criterion) {
    let scene = scattered_scene(50_000);
    let view = view();
    let config = CullingConfig::default();
    let workers = WorkerPool::serial();
    c.bench_function("frustum_cull_50k_serial", |bencher| {
        bencher.iter(|| black_box(cull_view_frustum(scene.registry(), &view, &config, 1000.0, &workers)))
    });
}

fn bench_frustum_cull_parallel(c: &mut Criterion) {
    let scene = scattered_scene(50_000);
    let view = view();
    let config = CullingConfig::default();
    let Ok(workers) = WorkerPool::new(&ParallelConfig::default()) else {
        return;
    };
    c.bench_function("frustum_cull_50k_parallel", |bencher| {
        bencher.iter(|| black_box(cull_view_frustum(scene.registry(), &view, &config, 1000.0, &workers)))
    });
}

criterion_group!(benches, bench_frustum_cull_serial, bench_frustum_cull_parallel);
criterion_main!(benches);
