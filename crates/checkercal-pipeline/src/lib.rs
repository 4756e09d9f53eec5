//! Incremental checkerboard calibration sessions.
//!
//! A session is fed one frame (mono) or one synchronized pair (stereo) at a
//! time and answers each with a [`CalibrationStatus`]. Accepted detections
//! are accumulated per camera together with a coverage mask; once enough
//! images cover enough of the frame, a [`CalibrationSolver`] runs on batch
//! boundaries until the reprojection RMS is acceptable.
//!
//! ```no_run
//! use checkercal_core::{CalibratorConfig, RawImage};
//! use checkercal_pipeline::{CalibrationStatus, MonoCalibrator, ReplayDetector};
//!
//! # fn frames() -> Vec<Vec<u8>> { Vec::new() }
//! let detector = ReplayDetector::default();
//! let mut calib = MonoCalibrator::with_default_solver(CalibratorConfig::default(), detector)?;
//! for frame in frames() {
//!     let status = calib.set_image(&RawImage::packed(&frame, 640, 480, 1));
//!     if status == CalibrationStatus::Calibrated {
//!         calib.save_parameters("CameraParameters.json")?;
//!         break;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod accumulator;
pub mod artifacts;
pub mod coverage;
pub mod detector;
pub mod display;
pub mod export;
mod mono;
mod session;
pub mod solver;
mod status;
mod stereo;
mod track;

pub use accumulator::{solve_stereo, CalibrationAccumulator, SolveOutcome};
pub use artifacts::{
    Artifact, ArtifactError, ArtifactSink, CameraRole, CollectArtifacts, DiscardArtifacts,
    PngArtifactWriter,
};
pub use coverage::{CoverageError, CoverageModel, QuadCoverage};
pub use detector::{DetectionLog, DetectionLogError, PatternDetector, ReplayDetector};
pub use export::{
    ExportError, MonoCameraParameters, MonoParametersRecord, StereoCameraParameters,
    StereoParametersRecord,
};
pub use mono::MonoCalibrator;
pub use session::SessionState;
pub use solver::{
    CalibrationSolver, LinearPlanarSolver, MonoProblem, MonoSolution, SolveError, StereoProblem,
    StereoSolution,
};
pub use status::CalibrationStatus;
pub use stereo::{StereoCalibrator, StereoSide};
pub use track::CameraTrack;
