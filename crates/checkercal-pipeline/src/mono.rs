//! Single-camera calibration state machine.

use std::path::Path;
use std::time::Instant;

use checkercal_core::{
    CalibratorConfig, CameraModel, ConfigError, FrameError, ImageSize, RawImage, Real,
    DISTORTION_LEN,
};
use image::RgbImage;

use crate::artifacts::{store_or_warn, Artifact, ArtifactSink, CameraRole, DiscardArtifacts};
use crate::coverage::CoverageModel;
use crate::detector::PatternDetector;
use crate::export::{write_json, ExportError, MonoCameraParameters, MonoParametersRecord};
use crate::session::SessionState;
use crate::solver::{CalibrationSolver, LinearPlanarSolver};
use crate::status::CalibrationStatus;
use crate::track::CameraTrack;

pub(crate) fn frame_error_status(err: &FrameError) -> CalibrationStatus {
    match err {
        FrameError::Empty => CalibrationStatus::ImageSizeInvalid,
        FrameError::UnsupportedBytesPerPixel(_)
        | FrameError::StrideTooShort { .. }
        | FrameError::BufferTooSmall { .. } => CalibrationStatus::InvalidBytesPerPixel,
    }
}

/// Incremental calibration of one camera.
///
/// Feed frames with [`MonoCalibrator::set_image`]; every call returns the
/// status of that frame. A solve runs whenever the batch trigger fires, and
/// a poor or failed solve keeps the session collecting.
pub struct MonoCalibrator<D, S = LinearPlanarSolver> {
    config: CalibratorConfig,
    track: CameraTrack<D>,
    solver: S,
    artifacts: Box<dyn ArtifactSink>,
    session: SessionState,
}

impl<D: PatternDetector> MonoCalibrator<D, LinearPlanarSolver> {
    /// Calibrator with the closed-form default solver.
    pub fn with_default_solver(config: CalibratorConfig, detector: D) -> Result<Self, ConfigError> {
        Self::new(config, detector, LinearPlanarSolver::default())
    }
}

impl<D: PatternDetector, S: CalibrationSolver> MonoCalibrator<D, S> {
    pub fn new(config: CalibratorConfig, detector: D, solver: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            track: CameraTrack::new(CameraRole::Mono, detector),
            solver,
            artifacts: Box::new(DiscardArtifacts),
            session: SessionState::default(),
        })
    }

    pub fn with_artifact_sink(mut self, sink: impl ArtifactSink + 'static) -> Self {
        self.artifacts = Box::new(sink);
        self
    }

    /// Swap the coverage model. Any accumulated progress is dropped.
    pub fn with_coverage_model(self, coverage: Box<dyn CoverageModel>) -> Self {
        let Self {
            config,
            track,
            solver,
            artifacts,
            ..
        } = self;
        let detector = track.into_detector();
        Self {
            config,
            track: CameraTrack::with_coverage(CameraRole::Mono, detector, coverage),
            solver,
            artifacts,
            session: SessionState::default(),
        }
    }

    /// Apply a new configuration. All counters, observations and results are
    /// discarded, even when the configuration is unchanged.
    pub fn reconfigure(&mut self, config: CalibratorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.track.reset();
        self.session = SessionState::default();
        log::debug!("calibrator reconfigured, session reset");
        Ok(())
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Process one frame.
    pub fn set_image(&mut self, image: &RawImage<'_>) -> CalibrationStatus {
        let size = image.size();
        if size.pixel_count() == 0 {
            log::debug!("empty {size} frame ignored");
            return CalibrationStatus::ImageSizeInvalid;
        }
        if !self.track.size_matches(size) {
            log::debug!(
                "image size {size} differs from session size {:?}",
                self.track.image_size()
            );
            return CalibrationStatus::ImageSizeInvalid;
        }
        self.track.lock_size(size);

        if self.session.over_capacity(&self.config) {
            log::warn!(
                "{} images accepted, more than the maximum of {}",
                self.session.accepted,
                self.config.max_num_images
            );
            return CalibrationStatus::CalibrationFailed;
        }

        let gray = match image.to_gray(self.config.flip_vertically) {
            Ok(gray) => gray,
            Err(err) => {
                log::debug!("frame not usable: {err}");
                return frame_error_status(&err);
            }
        };
        self.session.submitted += 1;

        let board = self.config.board();
        let Some(corners) = self.track.detect(&gray, &board) else {
            self.track.show_rejected(&gray);
            log::debug!("image {} rejected: board not found", self.session.submitted);
            return CalibrationStatus::ImageRejected;
        };

        self.session.accepted += 1;
        let index = self.session.accepted;
        if self.config.draw_accepted_image {
            let name = CameraRole::Mono
                .accepted_image_name(&self.config.accepted_image_file_prefix, index);
            store_or_warn(self.artifacts.as_mut(), &name, Artifact::AcceptedImage(&gray));
        }
        let overlay_each = self.config.draw_chessboard_corners
            && !self.config.save_only_last_chessboard_image;
        self.track.accept(gray, corners, &board);
        if overlay_each {
            self.store_overlay(index);
        }
        log::debug!(
            "image {} accepted ({} total, coverage {:.1}%)",
            self.session.submitted,
            index,
            100.0 * self.track.coverage()
        );

        if !self
            .session
            .batch_ready(&self.config, &[self.track.coverage()])
        {
            return CalibrationStatus::ImageAccepted;
        }

        self.run_solve();
        if self.session.solved_within(self.config.max_rms_error) {
            if self.config.draw_chessboard_corners && self.config.save_only_last_chessboard_image {
                self.store_overlay(self.session.accepted);
            }
            CalibrationStatus::Calibrated
        } else {
            log::info!(
                "calibration not accepted (rms {:.4}, max {}), collecting more images",
                self.session.last_rms,
                self.config.max_rms_error
            );
            CalibrationStatus::ImageAccepted
        }
    }

    /// Solve now with whatever has been accepted, skipping the coverage and
    /// RMS gates. The image cap still applies.
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
        let size = self.track.image_size().unwrap_or(ImageSize::new(0, 0));
        let flags = self.config.solver_flags();
        let started = Instant::now();
        let result = self
            .track
            .accumulator_mut()
            .solve(&self.solver, &board, size, flags);

        match result {
            Ok(outcome) => {
                self.session.last_rms = outcome.rms;
                self.session.params_valid = outcome.finite;
                log::info!(
                    "calibrated from {} images in {:.1?}: rms {:.4}, finite {}",
                    self.track.accumulator().len(),
                    started.elapsed(),
                    outcome.rms,
                    outcome.finite
                );
                if let Some(rms) = self.track.accumulator().reprojection_rms(&board) {
                    log::debug!("reprojection rms over stored poses: {rms:.4}");
                }
                outcome.finite
            }
            Err(err) => {
                self.session.params_valid = false;
                log::warn!("calibration failed: {err}");
                false
            }
        }
    }

    /// Save the display surface of the latest accepted frame.
    fn store_overlay(&mut self, index: usize) {
        let Some(display) = self.track.display_image() else {
            return;
        };
        let name = CameraRole::Mono
            .corners_image_name(&self.config.chessboard_corners_image_file_prefix, index);
        store_or_warn(self.artifacts.as_mut(), &name, Artifact::CornersOverlay(display));
    }

    pub fn accepted_count(&self) -> usize {
        self.session.accepted
    }

    pub fn submitted_count(&self) -> usize {
        self.session.submitted
    }

    pub fn coverage(&self) -> Real {
        self.track.coverage()
    }

    /// `+inf` until the first solve.
    pub fn last_rms_error(&self) -> Real {
        self.session.last_rms
    }

    pub fn parameters_valid(&self) -> bool {
        self.session.params_valid
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn camera(&self) -> Option<&CameraModel> {
        self.track.accumulator().camera()
    }

    /// Row-major camera matrix of the last solve.
    pub fn intrinsic_matrix(&self) -> Option<[Real; 9]> {
        self.camera().map(CameraModel::intrinsic_row_major)
    }

    pub fn distortion_coeffs(&self) -> Option<[Real; DISTORTION_LEN]> {
        self.camera().map(CameraModel::distortion_array)
    }

    pub fn display_image(&self) -> Option<&RgbImage> {
        self.track.display_image()
    }

    pub fn track(&self) -> &CameraTrack<D> {
        &self.track
    }

    pub fn export_parameters(&self) -> MonoParametersRecord {
        MonoParametersRecord {
            parameters: MonoCameraParameters {
                intrinsic_matrix: self.intrinsic_matrix().map(Vec::from).unwrap_or_default(),
                distortion_coeffs: self.distortion_coeffs().map(Vec::from).unwrap_or_default(),
                rms_error: self.session.last_rms.is_finite().then_some(self.session.last_rms),
                coverage: self.coverage(),
            },
        }
    }

    pub fn save_parameters(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        write_json(&self.export_parameters(), path)
    }
}
