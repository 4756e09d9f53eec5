//! Closed-form building blocks for planar checkerboard calibration.
//!
//! - [`dlt_homography`]: normalized DLT plane-to-image homography.
//! - [`zhang_intrinsics`], [`focal_from_homographies`]: camera matrix.
//! - [`planar_pose_from_homography`]: board pose per view.
//! - [`fit_distortion`]: linear Brown-Conrady fit on homography residuals.
//! - [`calibrate_planar`]: the chain above with undistort-and-repeat rounds.
//! - [`stereo_geometry`]: averaged relative pose plus `E` and `F`.

mod distortion_fit;
mod homography;
mod intrinsics;
mod math;
mod planar;
mod planar_pose;
mod stereo;

pub use distortion_fit::*;
pub use homography::*;
pub use intrinsics::*;
pub use math::normalize_points_2d;
pub use planar::*;
pub use planar_pose::*;
pub use stereo::*;
