use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{Point3, Unit, Vector3};
use patch_mvs_core::synthetic::{default_texture, render_plane_camera, SensorSpec, ViewSpec};
use patch_mvs_core::{Camera, PinholeCamera, Plane};
use patch_mvs_refine::{
    correlation_table, Hypothesis, Observation, Patch, PatchRefiner, RefineParams,
};
use std::hint::black_box;

const SENSOR: SensorSpec = SensorSpec {
    width: 320,
    height: 240,
    focal: 600.0,
    levels: 3,
};

fn scene() -> Vec<PinholeCamera> {
    let ground = Plane::from_point_normal(&Point3::origin(), &Vector3::z()).expect("plane");
    [(0.0, 0.0), (-2.0, 0.0), (2.0, 0.0), (0.0, 2.0), (0.0, -2.0)]
        .into_iter()
        .map(|(x, y)| {
            let view = ViewSpec::looking_at(Point3::new(x, y, 10.0), Point3::origin());
            render_plane_camera(&SENSOR, &view, &ground, 0, default_texture).expect("render")
        })
        .collect()
}

fn bench_correlation_table(c: &mut Criterion) {
    let cameras = scene();
    let visibility: Vec<usize> = (0..cameras.len()).collect();
    let hypothesis = Hypothesis {
        center: Point3::new(0.05, -0.05, 0.02),
        normal: Unit::new_normalize(Vector3::new(0.05, 0.0, 1.0)),
    };
    for radius in [3usize, 5] {
        let params = RefineParams {
            patch_radius: radius,
            ..RefineParams::default()
        };
        c.bench_function(&format!("correlation_table_r{radius}"), |b| {
            b.iter(|| {
                correlation_table(
                    black_box(&cameras),
                    &visibility,
                    0,
                    black_box(&hypothesis),
                    0,
                    &params,
                )
            })
        });
    }
}

fn bench_refine_patch(c: &mut Criterion) {
    let cameras = scene();
    let center = Point3::new(0.05, -0.05, 0.1);
    let observations: Vec<Observation> = cameras
        .iter()
        .enumerate()
        .filter_map(|(camera, cam)| {
            cam.project_point(&center).map(|p| Observation {
                camera,
                point: [p.x, p.y],
            })
        })
        .collect();
    let mut params = RefineParams::default();
    params.swarm.seed = Some(1);
    let refiner = PatchRefiner::new(&cameras, params).expect("refiner");
    c.bench_function("refine_patch", |b| {
        b.iter(|| {
            let mut patch = Patch::from_observations(0, center, [0; 3], &observations, &cameras)
                .expect("patch");
            refiner.refine(&mut patch)
        })
    });
}

criterion_group!(
    name = correlation;
    config = Criterion::default().sample_size(20);
    targets = bench_correlation_table, bench_refine_patch
);
criterion_main!(correlation);
