//! Per-camera store of accepted observations and the latest solve result.

use checkercal_core::{
    compute_reprojection_stats, BoardSpec, CameraModel, ImageSize, Iso3, Pt2, Pt3, Real,
    SolverFlags,
};
use checkercal_linear::StereoGeometry;
use image::GrayImage;

use crate::solver::{CalibrationSolver, MonoProblem, SolveError, StereoProblem};

/// Result of one solve attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveOutcome {
    /// Every intrinsic and distortion value came back finite.
    pub finite: bool,
    pub rms: Real,
}

#[derive(Clone, Debug, Default)]
pub struct CalibrationAccumulator {
    corners: Vec<Vec<Pt2>>,
    images: Vec<GrayImage>,
    camera: Option<CameraModel>,
    poses: Vec<Iso3>,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one accepted observation. The caller guarantees the corner
    /// count matches the board.
    pub fn accept(&mut self, image: GrayImage, corners: Vec<Pt2>) {
        self.corners.push(corners);
        self.images.push(image);
    }

    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    pub fn corners(&self) -> &[Vec<Pt2>] {
        &self.corners
    }

    pub fn images(&self) -> &[GrayImage] {
        &self.images
    }

    /// Intrinsics and distortion of the last completed solve.
    pub fn camera(&self) -> Option<&CameraModel> {
        self.camera.as_ref()
    }

    /// Board-to-camera pose per accepted image, from the last solve.
    pub fn poses(&self) -> &[Iso3] {
        &self.poses
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// One copy of the board reference points per accepted image.
    pub fn replicated_reference_points(&self, board: &BoardSpec) -> Vec<Vec<Pt3>> {
        let reference = board.reference_points();
        vec![reference; self.len()]
    }

    pub fn solve<S>(
        &mut self,
        solver: &S,
        board: &BoardSpec,
        image_size: ImageSize,
        flags: SolverFlags,
    ) -> Result<SolveOutcome, SolveError>
    where
        S: CalibrationSolver + ?Sized,
    {
        if self.is_empty() {
            return Err(SolveError::NoImages);
        }
        let object_points = self.replicated_reference_points(board);
        let problem = MonoProblem {
            board,
            object_points: &object_points,
            image_points: &self.corners,
            image_size,
            flags,
            initial: CameraModel::prior(flags.fixed_aspect_ratio),
        };
        let solution = solver.calibrate_mono(&problem)?;

        let finite = solution.camera.is_finite();
        self.camera = Some(solution.camera);
        self.poses = solution.poses;
        Ok(SolveOutcome {
            finite,
            rms: solution.rms,
        })
    }

    /// RMS of reprojecting the board through the stored poses and camera.
    /// `None` before the first solve.
    pub fn reprojection_rms(&self, board: &BoardSpec) -> Option<Real> {
        let camera = self.camera.as_ref()?;
        compute_reprojection_stats(camera, &self.poses, &board.reference_points(), &self.corners)
            .map(|stats| stats.rms)
    }
}

/// Joint solve over two synchronized accumulators. Both cameras start from
/// the same prior; the outcome is finite only if both cameras are.
pub fn solve_stereo<S>(
    left: &mut CalibrationAccumulator,
    right: &mut CalibrationAccumulator,
    solver: &S,
    board: &BoardSpec,
    sizes: (ImageSize, ImageSize),
    flags: SolverFlags,
) -> Result<(SolveOutcome, StereoGeometry), SolveError>
where
    S: CalibrationSolver + ?Sized,
{
    if left.len() != right.len() {
        return Err(SolveError::CountMismatch(left.len(), right.len()));
    }
    if left.is_empty() {
        return Err(SolveError::NoImages);
    }

    let prior = CameraModel::prior(flags.fixed_aspect_ratio);
    let object_points = left.replicated_reference_points(board);
    let problem = StereoProblem {
        board,
        object_points: &object_points,
        left_points: &left.corners,
        right_points: &right.corners,
        left_size: sizes.0,
        right_size: sizes.1,
        flags,
        initial_left: prior,
        initial_right: prior,
    };
    let solution = solver.calibrate_stereo(&problem)?;

    let finite = solution.left.is_finite() && solution.right.is_finite();
    left.camera = Some(solution.left);
    left.poses = solution.left_poses;
    right.camera = Some(solution.right);
    right.poses = solution.right_poses;
    Ok((
        SolveOutcome {
            finite,
            rms: solution.rms,
        },
        solution.geometry,
    ))
}
