#![allow(dead_code)]

use nalgebra::{Point3, Vector3};
use particle_swarm::SwarmParams;
use patch_mvs_core::synthetic::{
    default_texture, flat_camera, render_plane_camera, SensorSpec, ViewSpec,
};
use patch_mvs_core::{Camera, PinholeCamera, Plane};
use patch_mvs_refine::{Observation, Patch, RefineParams};

pub const SENSOR: SensorSpec = SensorSpec {
    width: 160,
    height: 120,
    focal: 400.0,
    levels: 3,
};

pub const HEIGHT: f64 = 10.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ground() -> Plane {
    Plane::from_point_normal(&Point3::origin(), &Vector3::z()).expect("plane")
}

fn view(x: f64, y: f64) -> ViewSpec {
    ViewSpec::looking_at(Point3::new(x, y, HEIGHT), Point3::origin())
}

/// Camera at `(x, y, HEIGHT)` looking at the origin of the textured ground plane.
pub fn textured(x: f64, y: f64) -> PinholeCamera {
    render_plane_camera(&SENSOR, &view(x, y), &ground(), 0, default_texture).expect("render")
}

/// Camera whose view is blocked: every pixel is black.
pub fn occluded(x: f64, y: f64) -> PinholeCamera {
    flat_camera(&SENSOR, &view(x, y), 0).expect("flat")
}

pub fn flat(x: f64, y: f64, value: u8) -> PinholeCamera {
    flat_camera(&SENSOR, &view(x, y), value).expect("flat")
}

/// Nadir camera plus three textured side cameras and one occluded side camera.
pub fn four_plus_occluded() -> Vec<PinholeCamera> {
    vec![
        textured(0.0, 0.0),
        textured(-2.0, 0.0),
        textured(0.0, 2.0),
        occluded(2.0, 0.0),
    ]
}

pub fn params(seed: u64) -> RefineParams {
    RefineParams {
        swarm: SwarmParams {
            max_iterations: 30,
            population: 16,
            stall_iterations: Some(10),
            seed: Some(seed),
            ..SwarmParams::default()
        },
        ..RefineParams::default()
    }
}

pub fn observations<C: Camera>(center: &Point3<f64>, cameras: &[C]) -> Vec<Observation> {
    cameras
        .iter()
        .enumerate()
        .filter_map(|(camera, cam)| {
            cam.project_point(center).map(|p| Observation {
                camera,
                point: [p.x, p.y],
            })
        })
        .collect()
}

/// Seed patch slightly above the ground plane, seen by every camera.
pub fn seed_patch<C: Camera>(id: u32, center: Point3<f64>, cameras: &[C]) -> Patch {
    let obs = observations(&center, cameras);
    Patch::from_observations(id, center, [128, 128, 128], &obs, cameras).expect("seed patch")
}
