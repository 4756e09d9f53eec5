use checkercal_core::{Iso3, Mat3, Real};
use nalgebra::{Rotation3, Translation3, UnitQuaternion, Vector3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanarPoseError {
    #[error("camera matrix is not invertible")]
    SingularIntrinsics,
    #[error("homography columns are degenerate")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Board-to-camera pose from `H = K [r1 r2 t]` (board plane at `Z = 0`).
///
/// The rotation is projected onto SO(3) and the sign of `H` is chosen so the
/// board lies in front of the camera.
pub fn planar_pose_from_homography(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PlanarPoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PlanarPoseError::SingularIntrinsics)?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let k_inv_h3 = k_inv * hmtx.column(2);

    let norm = 0.5 * (k_inv_h1.norm() + k_inv_h2.norm());
    if norm <= Real::EPSILON {
        return Err(PlanarPoseError::Degenerate);
    }
    let mut lambda = 1.0 / norm;
    if k_inv_h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<Real> = k_inv_h1 * lambda;
    let r2: Vector3<Real> = k_inv_h2 * lambda;
    let r3 = r1.cross(&r2);
    let r_mat = Mat3::from_columns(&[r1, r2, r3]);

    // Closest rotation in the Frobenius sense.
    let svd = r_mat.svd(true, true);
    let u = svd.u.ok_or(PlanarPoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PlanarPoseError::SvdFailed)?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<Real> = k_inv_h3 * lambda;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    #[test]
    fn recovers_pose_from_synthetic_homography() {
        let k = Matrix3::new(800.0, 0.0, 320.0, 0.0, 780.0, 240.0, 0.0, 0.0, 1.0);
        let rot = Rotation3::from_euler_angles(0.15, -0.2, 0.05);
        let t = Vector3::new(0.1, -0.05, 1.5);
        let r = rot.matrix();
        let h = Mat3::from_columns(&[k * r.column(0), k * r.column(1), k * t]);

        // The sign of a DLT estimate is arbitrary.
        let pose = planar_pose_from_homography(&k, &(-h * 3.0)).unwrap();
        assert!((pose.translation.vector - t).norm() < 1e-9);
        let dr = pose.rotation.to_rotation_matrix().matrix() - r;
        assert!(dr.norm() < 1e-9);
    }

    #[test]
    fn singular_camera_matrix_is_rejected() {
        let h = Mat3::identity();
        assert!(matches!(
            planar_pose_from_homography(&Mat3::zeros(), &h),
            Err(PlanarPoseError::SingularIntrinsics)
        ));
    }
}
