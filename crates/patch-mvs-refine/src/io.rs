//! JSON scene configuration and refinement reports.

use crate::{
    CorrelationTable, DiscardReason, Observation, Patch, PatchError, PatchSet, PatchStatus,
    RefineError, RefineParams, RefineSummary, Scene,
};
use nalgebra::{Matrix3, Vector3};
use patch_mvs_core::{CameraError, ImagePyramid, PinholeCamera};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum PatchMvsIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SceneConfigError {
    #[error("scene has {expected} cameras but {got} image pyramids were supplied")]
    PyramidCount { expected: usize, got: usize },
    #[error("camera {index}: {source}")]
    Camera {
        index: usize,
        #[source]
        source: CameraError,
    },
    #[error(transparent)]
    Refine(#[from] RefineError),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Camera geometry `x = K (R X + t)`; images are supplied separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Intrinsic matrix, row-major.
    pub k: [[f64; 3]; 3],
    /// World-to-camera rotation, row-major.
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl CameraConfig {
    pub fn from_camera(camera: &PinholeCamera) -> Self {
        let k = camera.k();
        let r = camera.rotation().matrix();
        let t = camera.translation();
        Self {
            k: std::array::from_fn(|i| std::array::from_fn(|j| k[(i, j)])),
            rotation: std::array::from_fn(|i| std::array::from_fn(|j| r[(i, j)])),
            translation: [t.x, t.y, t.z],
        }
    }

    pub fn build(&self, pyramid: ImagePyramid) -> Result<PinholeCamera, CameraError> {
        let k = Matrix3::from_fn(|i, j| self.k[i][j]);
        let r = Matrix3::from_fn(|i, j| self.rotation[i][j]);
        let [tx, ty, tz] = self.translation;
        PinholeCamera::new(k, r, Vector3::new(tx, ty, tz), pyramid)
    }
}

/// A triangulated seed point and the cameras that observed it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedPoint {
    pub center: [f64; 3],
    #[serde(default)]
    pub color: [u8; 3],
    pub observations: Vec<Observation>,
}

/// Scene description: camera geometry, seed points and refinement parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneConfig {
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub seeds: Vec<SeedPoint>,
    #[serde(default)]
    pub params: RefineParams,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl SceneConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PatchMvsIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PatchMvsIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("patch_mvs_report.json"))
    }

    /// Attach one image pyramid per camera, in camera order.
    pub fn build_cameras(
        &self,
        pyramids: Vec<ImagePyramid>,
    ) -> Result<Vec<PinholeCamera>, SceneConfigError> {
        if pyramids.len() != self.cameras.len() {
            return Err(SceneConfigError::PyramidCount {
                expected: self.cameras.len(),
                got: pyramids.len(),
            });
        }
        self.cameras
            .iter()
            .zip(pyramids)
            .enumerate()
            .map(|(index, (cfg, pyramid))| {
                cfg.build(pyramid)
                    .map_err(|source| SceneConfigError::Camera { index, source })
            })
            .collect()
    }

    /// Build a validated scene and its seed patches.
    pub fn build_scene(
        &self,
        pyramids: Vec<ImagePyramid>,
    ) -> Result<(Scene<PinholeCamera>, PatchSet), SceneConfigError> {
        let cameras = self.build_cameras(pyramids)?;
        let scene = Scene::new(cameras, self.params.clone())?;
        let patches = scene.seed_patches(&self.seeds)?;
        Ok((scene, patches))
    }
}

/// Serializable snapshot of a patch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub id: u32,
    pub center: [f64; 3],
    pub normal: [f64; 3],
    pub depth: f64,
    pub depth_range: [f64; 2],
    pub color: [u8; 3],
    pub cameras: Vec<usize>,
    pub reference_camera: usize,
    pub lod: usize,
    /// `None` when not finite.
    pub fitness: Option<f64>,
    /// `None` until the patch has been refined.
    pub priority: Option<f64>,
    pub status: PatchStatus,
    pub correlation: CorrelationTable,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl From<&Patch> for PatchRecord {
    fn from(p: &Patch) -> Self {
        let c = p.center();
        let n = p.normal();
        let range = p.depth_range();
        Self {
            id: p.id(),
            center: [c.x, c.y, c.z],
            normal: [n.x, n.y, n.z],
            depth: p.depth(),
            depth_range: [range.min, range.max],
            color: p.color(),
            cameras: p.visibility().iter().copied().collect(),
            reference_camera: p.reference_camera(),
            lod: p.lod(),
            fitness: finite(p.fitness()),
            priority: finite(p.priority()),
            status: p.status(),
            correlation: p.correlation().clone(),
        }
    }
}

/// What happened to one patch during a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatchOutcome {
    Refined {
        summary: RefineSummary,
    },
    Discarded {
        reason: DiscardReason,
        message: String,
    },
    /// Configuration error; the patch is left untouched.
    Failed {
        message: String,
    },
    /// Discarded by an earlier batch and not refined again.
    Skipped {
        reason: DiscardReason,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchReport {
    pub id: u32,
    pub outcome: PatchOutcome,
    pub patch: PatchRecord,
}

/// Result of refining a patch set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefineReport {
    pub params: RefineParams,
    pub patches: Vec<PatchReport>,
}

impl RefineReport {
    pub fn refined_count(&self) -> usize {
        self.count(|o| matches!(o, PatchOutcome::Refined { .. }))
    }

    /// Patches discarded in this batch or skipped as already discarded.
    pub fn discarded_count(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                PatchOutcome::Discarded { .. } | PatchOutcome::Skipped { .. }
            )
        })
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, PatchOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&PatchOutcome) -> bool) -> usize {
        self.patches.iter().filter(|p| pred(&p.outcome)).count()
    }

    pub fn get(&self, id: u32) -> Option<&PatchReport> {
        self.patches.iter().find(|p| p.id == id)
    }

    /// Load a JSON report from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PatchMvsIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PatchMvsIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use patch_mvs_core::{Camera, GrayImage};

    fn pyramid() -> ImagePyramid {
        ImagePyramid::build(GrayImage::filled(32, 32, 50), 2).expect("pyramid")
    }

    fn config() -> SceneConfig {
        let cameras = [-1.0, 0.0, 1.0]
            .into_iter()
            .map(|x| {
                let cam = PinholeCamera::look_at(
                    PinholeCamera::intrinsics(40.0, 40.0, 15.5, 15.5),
                    Point3::new(x, 0.0, 4.0),
                    Point3::origin(),
                    Vector3::y(),
                    pyramid(),
                )
                .expect("camera");
                CameraConfig::from_camera(&cam)
            })
            .collect();
        SceneConfig {
            cameras,
            seeds: vec![SeedPoint {
                center: [0.0, 0.0, 0.0],
                color: [10, 20, 30],
                observations: (0..3)
                    .map(|camera| Observation {
                        camera,
                        point: [15.5, 15.5],
                    })
                    .collect(),
            }],
            params: RefineParams::default(),
            output_path: None,
        }
    }

    #[test]
    fn scene_config_json_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.json");
        let cfg = config();
        cfg.write_json(&path).expect("write");
        let loaded = SceneConfig::load_json(&path).expect("load");
        assert_eq!(loaded.cameras, cfg.cameras);
        assert_eq!(loaded.seeds, cfg.seeds);
        assert_eq!(loaded.params, cfg.params);
        assert_eq!(loaded.output_path(), PathBuf::from("patch_mvs_report.json"));
    }

    #[test]
    fn builds_scene_and_seeds() {
        let cfg = config();
        let (scene, patches) = cfg
            .build_scene(vec![pyramid(), pyramid(), pyramid()])
            .expect("scene");
        assert_eq!(scene.cameras().len(), 3);
        assert_eq!(patches.len(), 1);
        let cam = &scene.cameras()[1];
        assert!((cam.center() - Point3::new(0.0, 0.0, 4.0)).norm() < 1e-9);
    }

    #[test]
    fn pyramid_count_must_match() {
        let err = config().build_scene(vec![pyramid()]).unwrap_err();
        assert!(matches!(
            err,
            SceneConfigError::PyramidCount {
                expected: 3,
                got: 1
            }
        ));
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let raw = r#"{
            "cameras": [
                { "k": [[50, 0, 16], [0, 50, 16], [0, 0, 1]],
                  "rotation": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
                  "translation": [0, 0, 3] }
            ]
        }"#;
        let cfg: SceneConfig = serde_json::from_str(raw).expect("json");
        assert!(cfg.seeds.is_empty());
        assert_eq!(cfg.params, RefineParams::default());
        let cams = cfg.build_cameras(vec![pyramid()]).expect("cameras");
        assert!((cams[0].center() - Point3::new(0.0, 0.0, -3.0)).norm() < 1e-12);
    }
}
