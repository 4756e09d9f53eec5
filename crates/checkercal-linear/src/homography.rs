//! Plane-to-image homography by the normalized direct linear transform.

use checkercal_core::{Mat3, Pt2};
use nalgebra::DMatrix;
use thiserror::Error;

use crate::math::normalize_points_2d;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point sets differ in length: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate `H` with `image ~ H * world`, normalized so `H[2,2] = 1` when
/// that entry is not vanishing.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::LengthMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (world_n, t_world) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (image_n, t_image) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pw, pi)) in world_n.iter().zip(&image_n).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // A h = 0: right singular vector of the smallest singular value. Pad to
    // 9 rows so the full V is available for the minimal 4-point case.
    if a.nrows() < 9 {
        a = a.resize_vertically(9, 0.0);
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(HomographyError::SvdFailed)?;
    let h = v_t.row(min_idx);

    let h_norm = Mat3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);
    let t_image_inv = t_image.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = t_image_inv * h_norm * t_world;

    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }
    if h_mat.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::Degenerate);
    }
    Ok(h_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use checkercal_core::{from_homogeneous, to_homogeneous};

    #[test]
    fn recovers_scaling_homography() {
        let w = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ];
        let img = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(2.0, 0.0),
            Pt2::new(2.0, 2.0),
            Pt2::new(0.0, 2.0),
        ];

        let h = dlt_homography(&w, &img).unwrap();
        assert_abs_diff_eq!(h[(0, 0)], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(h[(1, 1)], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn maps_points_under_perspective() {
        let h_gt = Mat3::new(1.2, 0.1, 30.0, -0.05, 0.9, 12.0, 1e-4, 2e-4, 1.0);
        let world: Vec<Pt2> = (0..4)
            .flat_map(|i| (0..3).map(move |j| Pt2::new(j as f64 * 20.0, i as f64 * 20.0)))
            .collect();
        let image: Vec<Pt2> = world
            .iter()
            .map(|p| from_homogeneous(&(h_gt * to_homogeneous(p))))
            .collect();

        let h = dlt_homography(&world, &image).unwrap();
        for (pw, pi) in world.iter().zip(&image) {
            let mapped = from_homogeneous(&(h * to_homogeneous(pw)));
            assert!((mapped - pi).norm() < 1e-6);
        }
    }

    #[test]
    fn rejects_too_few_points() {
        let pts = vec![Pt2::new(0.0, 0.0); 3];
        assert!(matches!(
            dlt_homography(&pts, &pts),
            Err(HomographyError::NotEnoughPoints(3))
        ));
    }
}
