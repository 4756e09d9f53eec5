//! Geometric solver capability and the closed-form default.

use checkercal_core::{BoardSpec, CameraModel, ImageSize, Iso3, Pt2, Pt3, Real, SolverFlags};
use checkercal_linear::{
    calibrate_planar, rig_reprojection, stereo_geometry, DistortionFitOptions,
    PlanarCalibrationError, PlanarCalibrationOptions, StereoError, StereoGeometry,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("no accepted images to calibrate from")]
    NoImages,
    #[error("left and right image counts differ: {0} vs {1}")]
    CountMismatch(usize, usize),
    #[error(transparent)]
    Planar(#[from] PlanarCalibrationError),
    #[error(transparent)]
    Stereo(#[from] StereoError),
}

/// Inputs for one single-camera solve.
#[derive(Clone, Copy, Debug)]
pub struct MonoProblem<'a> {
    pub board: &'a BoardSpec,
    /// Board reference points, one copy per accepted image.
    pub object_points: &'a [Vec<Pt3>],
    pub image_points: &'a [Vec<Pt2>],
    pub image_size: ImageSize,
    pub flags: SolverFlags,
    /// Starting point for solvers that refine an initial guess.
    pub initial: CameraModel,
}

#[derive(Clone, Debug)]
pub struct MonoSolution {
    pub camera: CameraModel,
    /// Board-to-camera pose per accepted image.
    pub poses: Vec<Iso3>,
    pub rms: Real,
}

/// Inputs for one joint two-camera solve. Left and right point lists are
/// pairwise synchronized.
#[derive(Clone, Copy, Debug)]
pub struct StereoProblem<'a> {
    pub board: &'a BoardSpec,
    pub object_points: &'a [Vec<Pt3>],
    pub left_points: &'a [Vec<Pt2>],
    pub right_points: &'a [Vec<Pt2>],
    pub left_size: ImageSize,
    pub right_size: ImageSize,
    pub flags: SolverFlags,
    pub initial_left: CameraModel,
    pub initial_right: CameraModel,
}

#[derive(Clone, Debug)]
pub struct StereoSolution {
    pub left: CameraModel,
    pub right: CameraModel,
    pub left_poses: Vec<Iso3>,
    pub right_poses: Vec<Iso3>,
    pub geometry: StereoGeometry,
    /// One RMS over both cameras.
    pub rms: Real,
}

/// Produces camera parameters from accumulated correspondences.
pub trait CalibrationSolver {
    fn calibrate_mono(&self, problem: &MonoProblem<'_>) -> Result<MonoSolution, SolveError>;

    fn calibrate_stereo(&self, problem: &StereoProblem<'_>)
        -> Result<StereoSolution, SolveError>;
}

/// Closed-form planar calibration (homographies, Zhang, linear distortion,
/// averaged stereo extrinsics). Rational terms `k4..k6` are always zero.
#[derive(Clone, Copy, Debug)]
pub struct LinearPlanarSolver {
    pub iterations: usize,
}

impl Default for LinearPlanarSolver {
    fn default() -> Self {
        Self { iterations: 2 }
    }
}

impl LinearPlanarSolver {
    fn options(&self, flags: &SolverFlags) -> PlanarCalibrationOptions {
        PlanarCalibrationOptions {
            fix_principal_point: flags.fix_principal_point,
            fixed_aspect_ratio: flags.fixed_aspect_ratio,
            distortion: DistortionFitOptions {
                fix_k1: flags.fix_k[0],
                fix_k2: flags.fix_k[1],
                fix_k3: flags.fix_k[2],
                fix_tangential: flags.zero_tangent_dist,
            },
            iterations: self.iterations,
        }
    }
}

impl CalibrationSolver for LinearPlanarSolver {
    fn calibrate_mono(&self, problem: &MonoProblem<'_>) -> Result<MonoSolution, SolveError> {
        if problem.image_points.is_empty() {
            return Err(SolveError::NoImages);
        }
        let out = calibrate_planar(
            problem.board,
            problem.image_points,
            problem.image_size,
            &self.options(&problem.flags),
        )?;
        Ok(MonoSolution {
            camera: out.camera,
            poses: out.poses,
            rms: out.stats.rms,
        })
    }

    fn calibrate_stereo(
        &self,
        problem: &StereoProblem<'_>,
    ) -> Result<StereoSolution, SolveError> {
        if problem.left_points.len() != problem.right_points.len() {
            return Err(SolveError::CountMismatch(
                problem.left_points.len(),
                problem.right_points.len(),
            ));
        }
        if problem.left_points.is_empty() {
            return Err(SolveError::NoImages);
        }

        let opts = self.options(&problem.flags);
        let left = calibrate_planar(problem.board, problem.left_points, problem.left_size, &opts)?;
        let right =
            calibrate_planar(problem.board, problem.right_points, problem.right_size, &opts)?;
        let geometry = stereo_geometry(&left.camera, &right.camera, &left.poses, &right.poses)?;

        let object = problem.board.reference_points();
        let rms = rig_reprojection(
            &left.camera,
            &right.camera,
            &geometry.right_se3_left(),
            &left.poses,
            &object,
            problem.left_points,
            problem.right_points,
        )
        .finish()
        .map_or(Real::INFINITY, |stats| stats.rms);

        Ok(StereoSolution {
            left: left.camera,
            right: right.camera,
            left_poses: left.poses,
            right_poses: right.poses,
            geometry,
            rms,
        })
    }
}
