//! Two-camera extrinsics from per-view board poses.

use checkercal_core::{skew, CameraModel, Iso3, Mat3, Pt2, Pt3, Real, ReprojectionAccumulator, Vec3};
use nalgebra::{Quaternion, Translation3, UnitQuaternion, Vector4};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StereoError {
    #[error("no poses to average")]
    Empty,
    #[error("left and right pose counts differ: {0} vs {1}")]
    CountMismatch(usize, usize),
    #[error("camera matrix is not invertible")]
    SingularIntrinsics,
}

/// Relative pose and epipolar geometry of a calibrated pair.
///
/// `rotation`/`translation` map left-camera coordinates into the right
/// camera: `x_r = R x_l + t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoGeometry {
    pub rotation: Mat3,
    pub translation: Vec3,
    pub essential: Mat3,
    pub fundamental: Mat3,
}

impl StereoGeometry {
    pub fn right_se3_left(&self) -> Iso3 {
        let rot = UnitQuaternion::from_matrix(&self.rotation);
        Iso3::from_parts(Translation3::from(self.translation), rot)
    }
}

/// Mean of rigid transforms: arithmetic mean of translations and the
/// normalized, hemisphere-aligned mean of rotation quaternions.
pub fn average_isometries(poses: &[Iso3]) -> Result<Iso3, StereoError> {
    let first = poses.first().ok_or(StereoError::Empty)?;
    let n = poses.len() as Real;

    let t_avg = poses
        .iter()
        .fold(Vec3::zeros(), |acc, iso| acc + iso.translation.vector)
        / n;

    let q0 = first.rotation.coords;
    let acc = poses.iter().fold(Vector4::<Real>::zeros(), |acc, iso| {
        let q = iso.rotation.coords;
        let sign = if q0.dot(&q) < 0.0 { -1.0 } else { 1.0 };
        acc + q * sign
    });
    let rotation = if acc.norm_squared() == 0.0 {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::from_quaternion(Quaternion::from_vector(acc / n))
    };

    Ok(Iso3::from_parts(Translation3::from(t_avg), rotation))
}

/// Right-from-left transform averaged over views where both cameras see the
/// board (`T_R * T_L^-1` per view).
pub fn relative_pose(left_poses: &[Iso3], right_poses: &[Iso3]) -> Result<Iso3, StereoError> {
    if left_poses.len() != right_poses.len() {
        return Err(StereoError::CountMismatch(left_poses.len(), right_poses.len()));
    }
    let per_view: Vec<Iso3> = left_poses
        .iter()
        .zip(right_poses)
        .map(|(l, r)| r * l.inverse())
        .collect();
    average_isometries(&per_view)
}

/// `E = [t]x R`.
pub fn essential_from_pose(rotation: &Mat3, translation: &Vec3) -> Mat3 {
    skew(translation) * rotation
}

/// `F = K_r^-T E K_l^-1`, scaled so `F[2,2] = 1` when that entry is not
/// vanishing.
pub fn fundamental_from_essential(
    essential: &Mat3,
    k_left: &Mat3,
    k_right: &Mat3,
) -> Result<Mat3, StereoError> {
    let kl_inv = k_left
        .try_inverse()
        .ok_or(StereoError::SingularIntrinsics)?;
    let kr_inv = k_right
        .try_inverse()
        .ok_or(StereoError::SingularIntrinsics)?;
    let mut f = kr_inv.transpose() * essential * kl_inv;
    let scale = f[(2, 2)];
    if scale.abs() > 1e-12 {
        f /= scale;
    }
    Ok(f)
}

pub fn stereo_geometry(
    left: &CameraModel,
    right: &CameraModel,
    left_poses: &[Iso3],
    right_poses: &[Iso3],
) -> Result<StereoGeometry, StereoError> {
    let rel = relative_pose(left_poses, right_poses)?;
    let rotation = *rel.rotation.to_rotation_matrix().matrix();
    let translation = rel.translation.vector;
    let essential = essential_from_pose(&rotation, &translation);
    let fundamental = fundamental_from_essential(&essential, &left.k, &right.k)?;
    Ok(StereoGeometry {
        rotation,
        translation,
        essential,
        fundamental,
    })
}

/// Joint reprojection accumulator for the rig: left views through their own
/// poses, right views through `right_se3_left * left_pose`.
pub fn rig_reprojection(
    left: &CameraModel,
    right: &CameraModel,
    right_se3_left: &Iso3,
    left_poses: &[Iso3],
    object: &[Pt3],
    left_views: &[Vec<Pt2>],
    right_views: &[Vec<Pt2>],
) -> ReprojectionAccumulator {
    let mut acc = ReprojectionAccumulator::default();
    for ((pose, l_obs), r_obs) in left_poses.iter().zip(left_views).zip(right_views) {
        acc.push_view(left, pose, object, l_obs);
        acc.push_view(right, &(right_se3_left * pose), object, r_obs);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn iso(axis: Vector3<Real>, t: Vector3<Real>) -> Iso3 {
        Iso3::from_parts(Translation3::from(t), UnitQuaternion::from_scaled_axis(axis))
    }

    #[test]
    fn average_of_identical_poses_is_that_pose() {
        let p = iso(Vector3::new(0.1, -0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        let avg = average_isometries(&[p, p, p]).unwrap();
        assert!((avg.translation.vector - p.translation.vector).norm() < 1e-12);
        assert!(avg.rotation.angle_to(&p.rotation) < 1e-12);
    }

    #[test]
    fn relative_pose_recovers_baseline() {
        let rig = iso(Vector3::new(0.0, 0.05, 0.0), Vector3::new(-120.0, 0.0, 0.0));
        let lefts = [
            iso(Vector3::new(0.2, 0.0, 0.0), Vector3::new(0.0, 0.0, 800.0)),
            iso(Vector3::new(0.0, -0.3, 0.1), Vector3::new(50.0, 10.0, 900.0)),
        ];
        let rights: Vec<Iso3> = lefts.iter().map(|l| rig * l).collect();
        let rel = relative_pose(&lefts, &rights).unwrap();
        assert!((rel.translation.vector - rig.translation.vector).norm() < 1e-9);
        assert!(rel.rotation.angle_to(&rig.rotation) < 1e-9);
    }

    #[test]
    fn epipolar_constraint_holds_for_fundamental_matrix() {
        let k = Mat3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0);
        let cam = CameraModel { k, ..CameraModel::default() };
        let rig = iso(Vector3::new(0.0, 0.1, 0.0), Vector3::new(-100.0, 5.0, 0.0));
        let geom = stereo_geometry(&cam, &cam, &[Iso3::identity()], &[rig]).unwrap();

        let p = Vector3::new(30.0, -20.0, 700.0);
        let xl = cam.project_camera_point(&p).unwrap();
        let xr = cam.project_camera_point(&(rig * nalgebra::Point3::from(p)).coords).unwrap();
        let lhs = Vector3::new(xr.x, xr.y, 1.0).dot(&(geom.fundamental * Vector3::new(xl.x, xl.y, 1.0)));
        assert!(lhs.abs() < 1e-9, "x_r^T F x_l = {lhs}");
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        assert!(matches!(
            relative_pose(&[Iso3::identity()], &[]),
            Err(StereoError::CountMismatch(1, 0))
        ));
    }
}
