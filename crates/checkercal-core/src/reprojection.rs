use serde::{Deserialize, Serialize};

use crate::{CameraModel, Iso3, Pt2, Pt3, Real};

/// Aggregate reprojection residuals in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    pub mean: Real,
    pub rms: Real,
    pub max: Real,
    pub count: usize,
}

/// Running sums behind [`ReprojectionStats`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReprojectionAccumulator {
    sum: Real,
    sum_sq: Real,
    max: Real,
    count: usize,
}

impl ReprojectionAccumulator {
    pub fn push(&mut self, predicted: &Pt2, observed: &Pt2) {
        let err = (predicted - observed).norm();
        self.sum += err;
        self.sum_sq += err * err;
        self.max = self.max.max(err);
        self.count += 1;
    }

    /// Add one view: project `object` through `pose`, compare to `observed`.
    /// Points that land behind the camera are skipped.
    pub fn push_view(
        &mut self,
        camera: &CameraModel,
        pose: &Iso3,
        object: &[Pt3],
        observed: &[Pt2],
    ) {
        for (pw, uv) in object.iter().zip(observed) {
            if let Some(proj) = camera.project(pose, pw) {
                self.push(&proj, uv);
            }
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.max = self.max.max(other.max);
        self.count += other.count;
    }

    /// `None` when no point was accumulated.
    pub fn finish(&self) -> Option<ReprojectionStats> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as Real;
        Some(ReprojectionStats {
            mean: self.sum / n,
            rms: (self.sum_sq / n).sqrt(),
            max: self.max,
            count: self.count,
        })
    }
}

/// Reprojection statistics of one camera over all views, with the same
/// board points for every view.
pub fn compute_reprojection_stats(
    camera: &CameraModel,
    poses: &[Iso3],
    object: &[Pt3],
    views: &[Vec<Pt2>],
) -> Option<ReprojectionStats> {
    let mut acc = ReprojectionAccumulator::default();
    for (pose, observed) in poses.iter().zip(views) {
        acc.push_view(camera, pose, object, observed);
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn exact_observations_have_zero_error() {
        let cam = CameraModel::from_parts(500.0, 500.0, 320.0, 240.0, 0.0);
        let pose = Iso3::from_parts(Translation3::new(-0.1, 0.0, 1.0), UnitQuaternion::identity());
        let object = vec![Pt3::new(0.0, 0.0, 0.0), Pt3::new(0.1, 0.05, 0.0)];
        let observed: Vec<Pt2> = object
            .iter()
            .map(|p| cam.project(&pose, p).unwrap())
            .collect();

        let stats = compute_reprojection_stats(&cam, &[pose], &object, &[observed]).unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.rms < 1e-12);
    }

    #[test]
    fn rms_is_root_of_mean_squared_residual() {
        let mut acc = ReprojectionAccumulator::default();
        acc.push(&Pt2::new(0.0, 0.0), &Pt2::new(3.0, 4.0));
        acc.push(&Pt2::new(0.0, 0.0), &Pt2::new(0.0, 0.0));
        let stats = acc.finish().unwrap();
        assert_relative_eq!(stats.rms, (25.0_f64 / 2.0).sqrt());
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.max, 5.0);
    }

    #[test]
    fn empty_accumulator_has_no_stats() {
        assert!(ReprojectionAccumulator::default().finish().is_none());
    }
}
