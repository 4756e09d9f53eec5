//! Two-camera calibration state machine.

use std::path::Path;
use std::time::Instant;

use checkercal_core::{
    mat3_row_major, CalibratorConfig, CameraModel, ConfigError, ImageSize, RawImage, Real,
    DISTORTION_LEN,
};
use checkercal_linear::StereoGeometry;
use image::{GrayImage, RgbImage};

use crate::accumulator::solve_stereo;
use crate::artifacts::{store_or_warn, Artifact, ArtifactSink, CameraRole, DiscardArtifacts};
use crate::detector::PatternDetector;
use crate::export::{write_json, ExportError, StereoCameraParameters, StereoParametersRecord};
use crate::mono::frame_error_status;
use crate::session::SessionState;
use crate::solver::{CalibrationSolver, LinearPlanarSolver};
use crate::status::CalibrationStatus;
use crate::track::CameraTrack;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StereoSide {
    Left,
    Right,
}

/// Incremental calibration of a synchronized camera pair.
///
/// Left and right frames are submitted together and are only accepted as a
/// pair. Unlike [`crate::MonoCalibrator`], a triggered solve that misses the
/// RMS threshold reports [`CalibrationStatus::CalibrationFailed`]; the
/// session keeps its observations and later batches may still succeed.
pub struct StereoCalibrator<D, S = LinearPlanarSolver> {
    config: CalibratorConfig,
    left: CameraTrack<D>,
    right: CameraTrack<D>,
    solver: S,
    artifacts: Box<dyn ArtifactSink>,
    session: SessionState,
    geometry: Option<StereoGeometry>,
}

impl<D: PatternDetector> StereoCalibrator<D, LinearPlanarSolver> {
    pub fn with_default_solver(
        config: CalibratorConfig,
        left_detector: D,
        right_detector: D,
    ) -> Result<Self, ConfigError> {
        Self::new(config, left_detector, right_detector, LinearPlanarSolver::default())
    }
}

impl<D: PatternDetector, S: CalibrationSolver> StereoCalibrator<D, S> {
    pub fn new(
        config: CalibratorConfig,
        left_detector: D,
        right_detector: D,
        solver: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            left: CameraTrack::new(CameraRole::Left, left_detector),
            right: CameraTrack::new(CameraRole::Right, right_detector),
            solver,
            artifacts: Box::new(DiscardArtifacts),
            session: SessionState::default(),
            geometry: None,
        })
    }

    pub fn with_artifact_sink(mut self, sink: impl ArtifactSink + 'static) -> Self {
        self.artifacts = Box::new(sink);
        self
    }

    /// Validate and apply `config`, then start a fresh session.
    pub fn reconfigure(&mut self, config: CalibratorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.left.reset();
        self.right.reset();
        self.session = SessionState::default();
        self.geometry = None;
        log::debug!("stereo calibrator reconfigured, session reset");
        Ok(())
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Process one synchronized pair.
    pub fn set_image(&mut self, left: &RawImage<'_>, right: &RawImage<'_>) -> CalibrationStatus {
        let (left_size, right_size) = (left.size(), right.size());
        if left_size.pixel_count() == 0 || right_size.pixel_count() == 0 {
            log::debug!("empty frame in pair {left_size}/{right_size} ignored");
            return CalibrationStatus::ImageSizeInvalid;
        }
        if !self.left.size_matches(left_size) || !self.right.size_matches(right_size) {
            log::debug!(
                "pair size {left_size}/{right_size} differs from session sizes {:?}/{:?}",
                self.left.image_size(),
                self.right.image_size()
            );
            return CalibrationStatus::ImageSizeInvalid;
        }
        self.left.lock_size(left_size);
        self.right.lock_size(right_size);

        if self.session.over_capacity(&self.config) {
            log::warn!(
                "{} pairs accepted, more than the maximum of {}",
                self.session.accepted,
                self.config.max_num_images
            );
            return CalibrationStatus::CalibrationFailed;
        }

        let flip = self.config.flip_vertically;
        let (left_gray, right_gray) = match (left.to_gray(flip), right.to_gray(flip)) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(err), _) | (_, Err(err)) => {
                log::debug!("frame pair not usable: {err}");
                return frame_error_status(&err);
            }
        };
        self.session.submitted += 1;

        let board = self.config.board();
        let left_corners = self.left.detect(&left_gray, &board);
        let right_corners = self.right.detect(&right_gray, &board);
        let (left_corners, right_corners) = match (left_corners, right_corners) {
            (Some(l), Some(r)) => (l, r),
            (l, r) => {
                self.left.show_rejected(&left_gray);
                self.right.show_rejected(&right_gray);
                log::debug!(
                    "pair {} rejected: board found left {}, right {}",
                    self.session.submitted,
                    l.is_some(),
                    r.is_some()
                );
                return CalibrationStatus::ImageRejected;
            }
        };

        self.session.accepted += 1;
        let index = self.session.accepted;
        if self.config.draw_accepted_image {
            let prefix = &self.config.accepted_image_file_prefix;
            let left_name = CameraRole::Left.accepted_image_name(prefix, index);
            let right_name = CameraRole::Right.accepted_image_name(prefix, index);
            store_or_warn(self.artifacts.as_mut(), &left_name, Artifact::AcceptedImage(&left_gray));
            store_or_warn(self.artifacts.as_mut(), &right_name, Artifact::AcceptedImage(&right_gray));
        }
        let overlay_each = self.config.draw_chessboard_corners
            && !self.config.save_only_last_chessboard_image;
        self.left.accept(left_gray, left_corners, &board);
        self.right.accept(right_gray, right_corners, &board);
        if overlay_each {
            self.store_overlays(index);
        }
        log::debug!(
            "pair {} accepted ({} total, coverage {:.1}% / {:.1}%)",
            self.session.submitted,
            index,
            100.0 * self.left.coverage(),
            100.0 * self.right.coverage()
        );

        let coverages = [self.left.coverage(), self.right.coverage()];
        if !self.session.batch_ready(&self.config, &coverages) {
            return CalibrationStatus::ImageAccepted;
        }

        self.run_solve();
        if self.session.solved_within(self.config.max_rms_error) {
            if self.config.draw_chessboard_corners && self.config.save_only_last_chessboard_image {
                self.store_overlays(self.session.accepted);
            }
            CalibrationStatus::Calibrated
        } else {
            log::info!(
                "stereo calibration not accepted (rms {:.4}, max {})",
                self.session.last_rms,
                self.config.max_rms_error
            );
            CalibrationStatus::CalibrationFailed
        }
    }

    /// Solve now with the accepted pairs, without coverage or RMS gates.
    pub fn force_solve(&mut self) -> CalibrationStatus {
        if self.session.over_capacity(&self.config) {
            return CalibrationStatus::CalibrationFailed;
        }
        if self.run_solve() {
            CalibrationStatus::Calibrated
        } else {
            CalibrationStatus::CalibrationFailed
        }
    }

    fn run_solve(&mut self) -> bool {
        let board = self.config.board();
        let unset = ImageSize::new(0, 0);
        let sizes = (
            self.left.image_size().unwrap_or(unset),
            self.right.image_size().unwrap_or(unset),
        );
        let flags = self.config.solver_flags();
        let pairs = self.left.accumulator().len();
        let started = Instant::now();
        let result = solve_stereo(
            self.left.accumulator_mut(),
            self.right.accumulator_mut(),
            &self.solver,
            &board,
            sizes,
            flags,
        );

        match result {
            Ok((outcome, geometry)) => {
                self.session.last_rms = outcome.rms;
                self.session.params_valid = outcome.finite;
                self.geometry = Some(geometry);
                log::info!(
                    "stereo calibrated from {pairs} pairs in {:.1?}: rms {:.4}, baseline {:.3}",
                    started.elapsed(),
                    outcome.rms,
                    geometry.translation.norm()
                );
                outcome.finite
            }
            Err(err) => {
                self.session.params_valid = false;
                log::warn!("stereo calibration failed: {err}");
                false
            }
        }
    }

    /// Save both display surfaces of the latest accepted pair.
    fn store_overlays(&mut self, index: usize) {
        let prefix = &self.config.chessboard_corners_image_file_prefix;
        for track in [&self.left, &self.right] {
            let Some(display) = track.display_image() else {
                continue;
            };
            let name = track.role().corners_image_name(prefix, index);
            store_or_warn(self.artifacts.as_mut(), &name, Artifact::CornersOverlay(display));
        }
    }

    pub fn track(&self, side: StereoSide) -> &CameraTrack<D> {
        match side {
            StereoSide::Left => &self.left,
            StereoSide::Right => &self.right,
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.session.accepted
    }

    pub fn submitted_count(&self) -> usize {
        self.session.submitted
    }

    pub fn left_coverage(&self) -> Real {
        self.left.coverage()
    }

    pub fn right_coverage(&self) -> Real {
        self.right.coverage()
    }

    pub fn coverage(&self, side: StereoSide) -> Real {
        self.track(side).coverage()
    }

    /// Shared RMS of the last solve, `+inf` before it.
    pub fn last_rms_error(&self) -> Real {
        self.session.last_rms
    }

    pub fn parameters_valid(&self) -> bool {
        self.session.params_valid
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn camera(&self, side: StereoSide) -> Option<&CameraModel> {
        self.track(side).accumulator().camera()
    }

    pub fn intrinsic_matrix(&self, side: StereoSide) -> Option<[Real; 9]> {
        self.camera(side).map(CameraModel::intrinsic_row_major)
    }

    pub fn distortion_coeffs(&self, side: StereoSide) -> Option<[Real; DISTORTION_LEN]> {
        self.camera(side).map(CameraModel::distortion_array)
    }

    pub fn display_image(&self, side: StereoSide) -> Option<&RgbImage> {
        self.track(side).display_image()
    }

    pub fn accepted_images(&self, side: StereoSide) -> &[GrayImage] {
        self.track(side).accumulator().images()
    }

    pub fn geometry(&self) -> Option<&StereoGeometry> {
        self.geometry.as_ref()
    }

    /// Row-major rotation taking left-camera coordinates to the right camera.
    pub fn rotation_matrix(&self) -> Option<[Real; 9]> {
        self.geometry.map(|g| mat3_row_major(&g.rotation))
    }

    pub fn translation_vector(&self) -> Option<[Real; 3]> {
        self.geometry
            .map(|g| [g.translation.x, g.translation.y, g.translation.z])
    }

    pub fn essential_matrix(&self) -> Option<[Real; 9]> {
        self.geometry.map(|g| mat3_row_major(&g.essential))
    }

    pub fn fundamental_matrix(&self) -> Option<[Real; 9]> {
        self.geometry.map(|g| mat3_row_major(&g.fundamental))
    }

    pub fn export_parameters(&self) -> StereoParametersRecord {
        fn list<const N: usize>(values: Option<[Real; N]>) -> Vec<Real> {
            values.map(Vec::from).unwrap_or_default()
        }
        StereoParametersRecord {
            parameters: StereoCameraParameters {
                left_intrinsic_matrix: list(self.intrinsic_matrix(StereoSide::Left)),
                left_distortion_coeffs: list(self.distortion_coeffs(StereoSide::Left)),
                right_intrinsic_matrix: list(self.intrinsic_matrix(StereoSide::Right)),
                right_distortion_coeffs: list(self.distortion_coeffs(StereoSide::Right)),
                rotation_matrix: list(self.rotation_matrix()),
                translation_matrix: list(self.translation_vector()),
                essential_matrix: list(self.essential_matrix()),
                fundamental_matrix: list(self.fundamental_matrix()),
                rms_error: self.session.last_rms.is_finite().then_some(self.session.last_rms),
                left_coverage: self.left_coverage(),
                right_coverage: self.right_coverage(),
            },
        }
    }

    pub fn save_parameters(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        write_json(&self.export_parameters(), path)
    }
}
