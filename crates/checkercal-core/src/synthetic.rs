//! Synthetic checkerboard views for tests and demos.

use nalgebra::{Translation3, UnitQuaternion, Vector3};

use crate::{BoardSpec, CameraModel, Iso3, Pt2, Real};

/// Board-to-camera pose looking at the board center from `distance`, with
/// the board tilted by `tilt_x`/`tilt_y` radians and shifted by `shift`.
pub fn board_pose(
    board: &BoardSpec,
    tilt_x: Real,
    tilt_y: Real,
    shift: (Real, Real),
    distance: Real,
) -> Iso3 {
    let cx = (board.width - 1) as Real * board.square_size * 0.5;
    let cy = (board.height - 1) as Real * board.square_size * 0.5;
    let to_center = Iso3::from_parts(
        Translation3::new(-cx, -cy, 0.0),
        UnitQuaternion::identity(),
    );
    let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(tilt_x, 0.0, 0.0))
        * UnitQuaternion::from_scaled_axis(Vector3::new(0.0, tilt_y, 0.0));
    let place = Iso3::from_parts(Translation3::new(shift.0, shift.1, distance), rotation);
    place * to_center
}

/// A deterministic set of `n` well-conditioned views: alternating tilts about
/// both axes and small lateral shifts.
pub fn varied_board_poses(board: &BoardSpec, n: usize, distance: Real) -> Vec<Iso3> {
    let span = board.width.max(board.height) as Real * board.square_size;
    (0..n)
        .map(|i| {
            let phase = i as Real * 2.399_963;
            let tilt_x = 0.35 * phase.sin();
            let tilt_y = 0.35 * phase.cos();
            let shift = (0.08 * span * phase.cos(), 0.08 * span * phase.sin());
            board_pose(board, tilt_x, tilt_y, shift, distance)
        })
        .collect()
}

/// Project every board corner, row-major. `None` if any corner falls
/// behind the camera.
pub fn project_board(camera: &CameraModel, pose: &Iso3, board: &BoardSpec) -> Option<Vec<Pt2>> {
    board
        .reference_points()
        .iter()
        .map(|p| camera.project(pose, p))
        .collect()
}
