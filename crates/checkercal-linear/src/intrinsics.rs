//! Closed-form intrinsics from plane homographies.

use checkercal_core::{Mat3, Real};
use nalgebra::{DMatrix, DVector, SVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntrinsicsError {
    #[error("need at least {needed} homographies, got {got}")]
    NotEnoughViews { needed: usize, got: usize },
    #[error("degenerate configuration in intrinsics estimation")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Pinhole parameters recovered by Zhang's method.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZhangIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub skew: Real,
}

fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed form on `B = K^-T K^-1`. Needs three or more views in
/// general position.
pub fn zhang_intrinsics(hmtxs: &[Mat3]) -> Result<ZhangIntrinsics, IntrinsicsError> {
    if hmtxs.len() < 3 {
        return Err(IntrinsicsError::NotEnoughViews {
            needed: 3,
            got: hmtxs.len(),
        });
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);
    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(IntrinsicsError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(IntrinsicsError::SvdFailed)?;
    let b = v_t.row(min_idx);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(IntrinsicsError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(IntrinsicsError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let out = ZhangIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    };
    if [out.fx, out.fy, out.cx, out.cy, out.skew]
        .iter()
        .any(|v| !v.is_finite())
    {
        return Err(IntrinsicsError::Degenerate);
    }
    Ok(out)
}

/// Focal lengths for a known principal point and zero skew.
///
/// With the principal point moved to the origin each homography gives two
/// linear equations in `1/fx^2` and `1/fy^2` (orthogonality and equal norm
/// of the first two rotation columns). With `fixed_aspect_ratio = Some(r)`
/// the constraint `fx = r * fy` leaves a single unknown.
pub fn focal_from_homographies(
    hmtxs: &[Mat3],
    principal_point: (Real, Real),
    fixed_aspect_ratio: Option<Real>,
) -> Result<(Real, Real), IntrinsicsError> {
    if hmtxs.is_empty() {
        return Err(IntrinsicsError::NotEnoughViews { needed: 1, got: 0 });
    }

    let (cx, cy) = principal_point;
    let shift_inv = Mat3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    let n_unknowns = if fixed_aspect_ratio.is_some() { 1 } else { 2 };
    let mut a = DMatrix::<Real>::zeros(2 * hmtxs.len(), n_unknowns);
    let mut rhs = DVector::<Real>::zeros(2 * hmtxs.len());

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let h = shift_inv * hmtx;
        let h = h / h.norm();
        let (h11, h21, h31) = (h[(0, 0)], h[(1, 0)], h[(2, 0)]);
        let (h12, h22, h32) = (h[(0, 1)], h[(1, 1)], h[(2, 1)]);

        let rows = [
            (h11 * h12, h21 * h22, -h31 * h32),
            (
                h11 * h11 - h12 * h12,
                h21 * h21 - h22 * h22,
                -(h31 * h31 - h32 * h32),
            ),
        ];
        for (r, (ca, cb, c)) in rows.into_iter().enumerate() {
            let row = 2 * k + r;
            match fixed_aspect_ratio {
                // a = 1/fx^2 = b / r^2, b = 1/fy^2
                Some(ratio) => a[(row, 0)] = ca / (ratio * ratio) + cb,
                None => {
                    a[(row, 0)] = ca;
                    a[(row, 1)] = cb;
                }
            }
            rhs[row] = c;
        }
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&rhs, 1e-12)
        .map_err(|_| IntrinsicsError::SvdFailed)?;

    let (inv_fx2, inv_fy2) = match fixed_aspect_ratio {
        Some(ratio) => (x[0] / (ratio * ratio), x[0]),
        None => (x[0], x[1]),
    };
    if !(inv_fx2 > 0.0 && inv_fy2 > 0.0) {
        return Err(IntrinsicsError::Degenerate);
    }
    let fx = 1.0 / inv_fx2.sqrt();
    let fy = 1.0 / inv_fy2.sqrt();
    if !fx.is_finite() || !fy.is_finite() {
        return Err(IntrinsicsError::Degenerate);
    }
    Ok((fx, fy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, Vector3};

    fn kmtx() -> Mat3 {
        Matrix3::new(900.0, 0.0, 640.0, 0.0, 880.0, 360.0, 0.0, 0.0, 1.0)
    }

    fn synthetic_homography(kmtx: &Mat3, rot: Rotation3<Real>, t: Vector3<Real>) -> Mat3 {
        let iso = Isometry3::from_parts(Translation3::from(t), rot.into());
        let binding = iso.rotation.to_rotation_matrix();
        let r_mat = binding.matrix();

        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx / hmtx[(2, 2)]
    }

    fn three_views(k: &Mat3) -> Vec<Mat3> {
        vec![
            synthetic_homography(
                k,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.1, 1.0),
            ),
            synthetic_homography(
                k,
                Rotation3::from_euler_angles(-0.05, 0.2, -0.1),
                Vector3::new(-0.1, 0.05, 1.2),
            ),
            synthetic_homography(
                k,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ]
    }

    #[test]
    fn zhang_recovers_kmtx() {
        let k = kmtx();
        let intr = zhang_intrinsics(&three_views(&k)).unwrap();
        assert_abs_diff_eq!(intr.fx, 900.0, epsilon = 1e-3);
        assert_abs_diff_eq!(intr.fy, 880.0, epsilon = 1e-3);
        assert_abs_diff_eq!(intr.cx, 640.0, epsilon = 1e-3);
        assert_abs_diff_eq!(intr.cy, 360.0, epsilon = 1e-3);
        assert!(intr.skew.abs() < 1e-3);
    }

    #[test]
    fn zhang_needs_three_views() {
        let hs = three_views(&kmtx());
        assert!(matches!(
            zhang_intrinsics(&hs[..2]),
            Err(IntrinsicsError::NotEnoughViews { needed: 3, got: 2 })
        ));
    }

    #[test]
    fn focal_with_known_principal_point_from_single_view() {
        let k = kmtx();
        let hs = three_views(&k);
        let (fx, fy) = focal_from_homographies(&hs[..1], (640.0, 360.0), None).unwrap();
        assert!((fx - 900.0).abs() < 1e-3, "fx {fx}");
        assert!((fy - 880.0).abs() < 1e-3, "fy {fy}");
    }

    #[test]
    fn focal_with_fixed_aspect_ratio() {
        let k = Matrix3::new(850.0, 0.0, 640.0, 0.0, 850.0, 360.0, 0.0, 0.0, 1.0);
        let hs = three_views(&k);
        let (fx, fy) = focal_from_homographies(&hs, (640.0, 360.0), Some(1.0)).unwrap();
        assert!((fx - 850.0).abs() < 1e-3, "fx {fx}");
        assert_eq!(fx, fy);
    }

    #[test]
    fn fronto_parallel_view_has_no_focal_information() {
        let k = kmtx();
        let h = synthetic_homography(
            &k,
            Rotation3::identity(),
            Vector3::new(0.0, 0.0, 1.0),
        );
        assert!(focal_from_homographies(&[h], (640.0, 360.0), Some(1.0)).is_err());
    }
}
