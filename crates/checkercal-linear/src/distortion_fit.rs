//! Linear distortion estimate from homography residuals.
//!
//! For every observation the homography predicts the ideal (undistorted)
//! pixel. Both the prediction and the observation are mapped to normalized
//! coordinates with `K^-1` and the difference is regressed onto the
//! Brown-Conrady terms:
//!
//! ```text
//! dx = x (k1 r^2 + k2 r^4 + k3 r^6) + 2 p1 x y + p2 (r^2 + 2 x^2)
//! dy = y (k1 r^2 + k2 r^4 + k3 r^6) + p1 (r^2 + 2 y^2) + 2 p2 x y
//! ```

use checkercal_core::{from_homogeneous, to_homogeneous, DistortionCoeffs, Mat3, Pt2, Real};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistortionFitError {
    #[error("need at least {0} points, got {1}")]
    NotEnoughPoints(usize, usize),
    #[error("camera matrix is not invertible")]
    SingularIntrinsics,
    #[error("all points lie at the principal point")]
    DegenerateConfiguration,
    #[error("svd failed")]
    SvdFailed,
}

/// Which coefficients are held at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistortionFitOptions {
    pub fix_k1: bool,
    pub fix_k2: bool,
    pub fix_k3: bool,
    pub fix_tangential: bool,
}

impl DistortionFitOptions {
    fn free_count(&self) -> usize {
        [!self.fix_k1, !self.fix_k2, !self.fix_k3]
            .iter()
            .filter(|free| **free)
            .count()
            + if self.fix_tangential { 0 } else { 2 }
    }
}

/// One board view: its homography (estimated from undistorted pixels) and
/// the raw observations.
#[derive(Clone, Copy, Debug)]
pub struct DistortionView<'a> {
    pub homography: &'a Mat3,
    pub board_points: &'a [Pt2],
    pub pixel_points: &'a [Pt2],
}

pub fn fit_distortion(
    intrinsics: &Mat3,
    views: &[DistortionView<'_>],
    opts: DistortionFitOptions,
) -> Result<DistortionCoeffs, DistortionFitError> {
    let n_params = opts.free_count();
    if n_params == 0 {
        return Ok(DistortionCoeffs::zero());
    }

    let total_points: usize = views.iter().map(|v| v.board_points.len()).sum();
    let min_points = n_params.div_ceil(2) + 2;
    if total_points < min_points {
        return Err(DistortionFitError::NotEnoughPoints(min_points, total_points));
    }

    let k_inv = intrinsics
        .try_inverse()
        .ok_or(DistortionFitError::SingularIntrinsics)?;
    let normalize = |p: &Pt2| from_homogeneous(&(k_inv * to_homogeneous(p)));

    let mut a = DMatrix::<Real>::zeros(2 * total_points, n_params);
    let mut b = DVector::<Real>::zeros(2 * total_points);
    let mut max_r2: Real = 0.0;

    let mut row = 0;
    for view in views {
        for (board_pt, pixel_obs) in view.board_points.iter().zip(view.pixel_points) {
            let ideal = from_homogeneous(&(view.homography * to_homogeneous(board_pt)));
            let n_ideal = normalize(&ideal);
            let residual = normalize(pixel_obs) - n_ideal;

            let (x, y) = (n_ideal.x, n_ideal.y);
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            max_r2 = max_r2.max(r2);

            let mut col = 0;
            for (fixed, rk) in [(opts.fix_k1, r2), (opts.fix_k2, r4), (opts.fix_k3, r6)] {
                if !fixed {
                    a[(row, col)] = x * rk;
                    a[(row + 1, col)] = y * rk;
                    col += 1;
                }
            }
            if !opts.fix_tangential {
                a[(row, col)] = 2.0 * x * y;
                a[(row + 1, col)] = r2 + 2.0 * y * y;
                a[(row, col + 1)] = r2 + 2.0 * x * x;
                a[(row + 1, col + 1)] = 2.0 * x * y;
            }

            b[row] = residual.x;
            b[row + 1] = residual.y;
            row += 2;
        }
    }

    if max_r2 < 1e-6 {
        return Err(DistortionFitError::DegenerateConfiguration);
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&b, 1e-10)
        .map_err(|_| DistortionFitError::SvdFailed)?;

    let mut coeffs = x.iter().copied();
    let mut next = |fixed: bool| if fixed { 0.0 } else { coeffs.next().unwrap_or(0.0) };
    let k1 = next(opts.fix_k1);
    let k2 = next(opts.fix_k2);
    let k3 = next(opts.fix_k3);
    let p1 = next(opts.fix_tangential);
    let p2 = next(opts.fix_tangential);

    Ok(DistortionCoeffs {
        k1,
        k2,
        p1,
        p2,
        k3,
        ..DistortionCoeffs::zero()
    })
}
