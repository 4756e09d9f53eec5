//! Core types for incremental checkerboard calibration.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Pt2`, `Mat3`, ...),
//! - the checkerboard geometry ([`BoardSpec`]),
//! - the pinhole camera with rational distortion ([`CameraModel`]),
//! - raw image ingestion ([`RawImage`]),
//! - the session configuration and its JSON format ([`CalibratorConfig`]),
//! - reprojection statistics and synthetic views for tests.

mod board;
mod camera;
pub mod config;
mod distortion;
pub mod frame;
mod math;
mod reprojection;
pub mod synthetic;

pub use board::BoardSpec;
pub use camera::CameraModel;
pub use config::{CalibratorConfig, ConfigError, SolverFlags};
pub use distortion::{DistortionCoeffs, DISTORTION_LEN};
pub use frame::{FrameError, ImageSize, RawImage};
pub use math::*;
pub use reprojection::{compute_reprojection_stats, ReprojectionAccumulator, ReprojectionStats};
