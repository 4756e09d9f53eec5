//! Single-camera planar calibration from closed-form steps.
//!
//! Homographies, intrinsics, distortion and poses are estimated in turn, then
//! the observations are undistorted with the current model and the whole
//! chain is repeated for a fixed number of refinement iterations.

use checkercal_core::{
    compute_reprojection_stats, BoardSpec, CameraModel, DistortionCoeffs, ImageSize, Iso3, Mat3,
    Pt2, Real, ReprojectionStats,
};
use thiserror::Error;

use crate::{
    dlt_homography, fit_distortion, focal_from_homographies, planar_pose_from_homography,
    zhang_intrinsics, DistortionFitOptions, DistortionView, HomographyError, PlanarPoseError,
};

#[derive(Debug, Error)]
pub enum PlanarCalibrationError {
    #[error("no views to calibrate from")]
    NoViews,
    #[error("view {view} has {got} corners, board has {expected}")]
    CornerCountMismatch {
        view: usize,
        got: usize,
        expected: usize,
    },
    #[error("homography of view {view} failed: {source}")]
    Homography {
        view: usize,
        #[source]
        source: HomographyError,
    },
    #[error("pose of view {view} failed: {source}")]
    Pose {
        view: usize,
        #[source]
        source: PlanarPoseError,
    },
    #[error("could not undistort observations with the current camera matrix")]
    Undistort,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanarCalibrationOptions {
    pub fix_principal_point: bool,
    pub fixed_aspect_ratio: Option<Real>,
    pub distortion: DistortionFitOptions,
    /// Undistort-and-reestimate rounds after the first pass.
    pub iterations: usize,
}

impl Default for PlanarCalibrationOptions {
    fn default() -> Self {
        Self {
            fix_principal_point: false,
            fixed_aspect_ratio: None,
            distortion: DistortionFitOptions::default(),
            iterations: 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlanarCalibration {
    pub camera: CameraModel,
    /// Board-to-camera pose per view.
    pub poses: Vec<Iso3>,
    pub stats: ReprojectionStats,
}

/// Calibrate one camera from row-major corner sets of `board`.
pub fn calibrate_planar(
    board: &BoardSpec,
    views: &[Vec<Pt2>],
    image_size: ImageSize,
    opts: &PlanarCalibrationOptions,
) -> Result<PlanarCalibration, PlanarCalibrationError> {
    if views.is_empty() {
        return Err(PlanarCalibrationError::NoViews);
    }
    let expected = board.corner_count();
    if let Some((view, v)) = views.iter().enumerate().find(|(_, v)| v.len() != expected) {
        return Err(PlanarCalibrationError::CornerCountMismatch {
            view,
            got: v.len(),
            expected,
        });
    }

    let board_pts = board.planar_points();
    let mut camera = CameraModel::default();
    let mut homographies = Vec::with_capacity(views.len());

    for round in 0..=opts.iterations {
        let undistorted: Vec<Vec<Pt2>> = if round == 0 {
            views.to_vec()
        } else {
            views
                .iter()
                .map(|v| v.iter().map(|p| camera.undistort_pixel(p)).collect())
                .collect::<Option<_>>()
                .ok_or(PlanarCalibrationError::Undistort)?
        };

        homographies.clear();
        for (view, pixels) in undistorted.iter().enumerate() {
            let h = dlt_homography(&board_pts, pixels)
                .map_err(|source| PlanarCalibrationError::Homography { view, source })?;
            homographies.push(h);
        }

        let k = estimate_camera_matrix(&homographies, image_size, opts);
        let dist_views: Vec<_> = homographies
            .iter()
            .zip(views)
            .map(|(h, px)| DistortionView {
                homography: h,
                board_points: &board_pts,
                pixel_points: px,
            })
            .collect();
        let distortion = match fit_distortion(&k, &dist_views, opts.distortion) {
            Ok(d) => d,
            Err(err) => {
                log::debug!("distortion fit skipped in round {round}: {err}");
                DistortionCoeffs::zero()
            }
        };
        camera = CameraModel { k, distortion };
    }

    let poses = homographies
        .iter()
        .enumerate()
        .map(|(view, h)| {
            planar_pose_from_homography(&camera.k, h)
                .map_err(|source| PlanarCalibrationError::Pose { view, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let stats = compute_reprojection_stats(&camera, &poses, &board.reference_points(), views)
        .unwrap_or(ReprojectionStats {
            mean: Real::INFINITY,
            rms: Real::INFINITY,
            max: Real::INFINITY,
            count: 0,
        });

    Ok(PlanarCalibration {
        camera,
        poses,
        stats,
    })
}

/// Zero-skew camera matrix honoring the principal point and aspect ratio
/// constraints.
///
/// The principal point comes from Zhang's closed form when it is free and at
/// least three views are available, otherwise it is the image center. Focal
/// lengths come from Zhang as well when nothing is fixed, and from the
/// known-principal-point solve otherwise. Views without perspective
/// information fall back to `max(width, height)`.
fn estimate_camera_matrix(
    homographies: &[Mat3],
    image_size: ImageSize,
    opts: &PlanarCalibrationOptions,
) -> Mat3 {
    let w = image_size.width as Real;
    let h = image_size.height as Real;
    let center = ((w - 1.0) * 0.5, (h - 1.0) * 0.5);

    let zhang = if opts.fix_principal_point {
        None
    } else {
        zhang_intrinsics(homographies)
            .map_err(|err| log::debug!("zhang intrinsics unavailable: {err}"))
            .ok()
            .filter(|z| z.fx > 0.0 && z.fy > 0.0)
            .filter(|z| (0.0..w).contains(&z.cx) && (0.0..h).contains(&z.cy))
    };

    let (cx, cy) = zhang.map(|z| (z.cx, z.cy)).unwrap_or(center);
    let (fx, fy) = match (zhang, opts.fixed_aspect_ratio) {
        (Some(z), None) => (z.fx, z.fy),
        (_, ratio) => focal_from_homographies(homographies, (cx, cy), ratio).unwrap_or_else(|err| {
            let f = w.max(h);
            log::debug!("focal length unobservable ({err}), falling back to {f}");
            (ratio.map_or(f, |r| r * f), f)
        }),
    };

    Mat3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}
