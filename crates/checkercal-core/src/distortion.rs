use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::{Real, Vec2};

/// Number of coefficients exported for a camera.
pub const DISTORTION_LEN: usize = 8;

/// Radial/tangential lens distortion with the rational radial denominator.
///
/// Coefficients are stored and exported in the usual
/// `k1 k2 p1 p2 k3 k4 k5 k6` order. With `k4 = k5 = k6 = 0` the model reduces
/// to five-parameter Brown-Conrady.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistortionCoeffs {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
    pub k4: Real,
    pub k5: Real,
    pub k6: Real,
}

impl DistortionCoeffs {
    /// Fixed-point iterations used by [`DistortionCoeffs::undistort`].
    pub const UNDISTORT_ITERS: usize = 8;

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_array(c: [Real; DISTORTION_LEN]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
            k4: c[5],
            k5: c[6],
            k6: c[7],
        }
    }

    pub fn to_array(&self) -> [Real; DISTORTION_LEN] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }

    fn distort_impl(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let radial = if den.abs() > Real::EPSILON { num / den } else { num };

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        (x * radial + x_tan, y * radial + y_tan)
    }

    /// Apply distortion to an undistorted normalized point.
    pub fn distort(&self, n_undist: &Vec2) -> Vec2 {
        let (xd, yd) = self.distort_impl(n_undist.x, n_undist.y);
        Vector2::new(xd, yd)
    }

    /// Invert [`DistortionCoeffs::distort`] by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut x = n_dist.x;
        let mut y = n_dist.y;
        for _ in 0..Self::UNDISTORT_ITERS {
            let (xd, yd) = self.distort_impl(x, y);
            x -= xd - n_dist.x;
            y -= yd - n_dist.y;
        }
        Vector2::new(x, y)
    }
}
