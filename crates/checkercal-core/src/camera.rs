use serde::{Deserialize, Serialize};

use crate::{
    mat3_row_major, DistortionCoeffs, Iso3, Mat3, Pt2, Pt3, Real, Vec2, Vec3, DISTORTION_LEN,
};

/// Pinhole intrinsics plus lens distortion for one camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Upper-triangular camera matrix `K`.
    pub k: Mat3,
    pub distortion: DistortionCoeffs,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::prior(None)
    }
}

impl CameraModel {
    /// Solver starting point: identity `K`, with `K[0][0]` set to the aspect
    /// ratio when it is held fixed, and zero distortion.
    pub fn prior(fixed_aspect_ratio: Option<Real>) -> Self {
        let mut k = Mat3::identity();
        if let Some(ratio) = fixed_aspect_ratio {
            k[(0, 0)] = ratio;
        }
        Self {
            k,
            distortion: DistortionCoeffs::zero(),
        }
    }

    pub fn from_parts(fx: Real, fy: Real, cx: Real, cy: Real, skew: Real) -> Self {
        Self {
            k: Mat3::new(fx, skew, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            distortion: DistortionCoeffs::zero(),
        }
    }

    pub fn with_distortion(mut self, distortion: DistortionCoeffs) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn fx(&self) -> Real {
        self.k[(0, 0)]
    }

    pub fn fy(&self) -> Real {
        self.k[(1, 1)]
    }

    pub fn cx(&self) -> Real {
        self.k[(0, 2)]
    }

    pub fn cy(&self) -> Real {
        self.k[(1, 2)]
    }

    /// True when every entry of `K` and every distortion coefficient is finite.
    pub fn is_finite(&self) -> bool {
        self.k.iter().all(|v| v.is_finite()) && self.distortion.is_finite()
    }

    pub fn intrinsic_row_major(&self) -> [Real; 9] {
        mat3_row_major(&self.k)
    }

    pub fn distortion_array(&self) -> [Real; DISTORTION_LEN] {
        self.distortion.to_array()
    }

    /// Project a point given in camera coordinates. `None` behind the camera.
    pub fn project_camera_point(&self, p_c: &Vec3) -> Option<Pt2> {
        if p_c.z <= Real::EPSILON {
            return None;
        }
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let d = self.distortion.distort(&n);
        let px = self.k * Vec3::new(d.x, d.y, 1.0);
        Some(Pt2::new(px.x, px.y))
    }

    /// Project a board point through the board-to-camera pose.
    pub fn project(&self, cam_se3_board: &Iso3, p_board: &Pt3) -> Option<Pt2> {
        let p_c = cam_se3_board.transform_point(p_board);
        self.project_camera_point(&p_c.coords)
    }

    /// Map a distorted pixel to an undistorted pixel under the same `K`.
    /// `None` when `K` is singular.
    pub fn undistort_pixel(&self, px: &Pt2) -> Option<Pt2> {
        let k_inv = self.k.try_inverse()?;
        let n = k_inv * Vec3::new(px.x, px.y, 1.0);
        let u = self.distortion.undistort(&Vec2::new(n.x / n.z, n.y / n.z));
        let p = self.k * Vec3::new(u.x, u.y, 1.0);
        Some(Pt2::new(p.x, p.y))
    }
}
