//! Calibrator configuration and its JSON file format.
//!
//! The persisted form wraps every field in a single `"CalibratorConfiguration"`
//! object with PascalCase keys. Missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BoardSpec, Real};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Thresholds and knobs for one calibration session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CalibratorConfig {
    pub flip_vertically: bool,

    pub board_width: usize,
    pub board_height: usize,
    pub square_size: Real,

    pub draw_chessboard_corners: bool,
    pub save_only_last_chessboard_image: bool,
    pub chessboard_corners_image_file_prefix: String,
    pub draw_accepted_image: bool,
    pub accepted_image_file_prefix: String,

    pub min_num_images: usize,
    pub max_num_images: usize,
    pub max_rms_error: Real,
    pub min_coverage: Real,
    pub image_batch_size: usize,

    pub calib_fix_principal_point: bool,
    pub calib_zero_tangent_dist: bool,
    pub calib_fix_aspect_ratio: bool,
    pub calib_aspect_ratio: Real,
    pub calib_fix_k1: bool,
    pub calib_fix_k2: bool,
    pub calib_fix_k3: bool,
    pub calib_fix_k4: bool,
    pub calib_fix_k5: bool,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            flip_vertically: false,
            board_width: 11,
            board_height: 8,
            square_size: 35.0,
            draw_chessboard_corners: true,
            save_only_last_chessboard_image: true,
            chessboard_corners_image_file_prefix: "Corners".to_string(),
            draw_accepted_image: true,
            accepted_image_file_prefix: "Image".to_string(),
            min_num_images: 10,
            max_num_images: 40,
            max_rms_error: 0.95,
            min_coverage: 0.10,
            image_batch_size: 4,
            calib_fix_principal_point: false,
            calib_zero_tangent_dist: false,
            calib_fix_aspect_ratio: true,
            calib_aspect_ratio: 1.0,
            calib_fix_k1: false,
            calib_fix_k2: false,
            calib_fix_k3: false,
            calib_fix_k4: true,
            calib_fix_k5: true,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ConfigFile {
    #[serde(rename = "CalibratorConfiguration")]
    calibrator: CalibratorConfig,
}

/// Parameter-fixing flags handed to the solver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverFlags {
    pub fix_principal_point: bool,
    pub zero_tangent_dist: bool,
    /// `fx / fy` when the aspect ratio is held fixed.
    pub fixed_aspect_ratio: Option<Real>,
    /// `k1..k5`; `k4`/`k5` are rational-model terms.
    pub fix_k: [bool; 5],
}

impl CalibratorConfig {
    pub fn board(&self) -> BoardSpec {
        BoardSpec::new(self.board_width, self.board_height, self.square_size)
    }

    pub fn solver_flags(&self) -> SolverFlags {
        SolverFlags {
            fix_principal_point: self.calib_fix_principal_point,
            zero_tangent_dist: self.calib_zero_tangent_dist,
            fixed_aspect_ratio: self
                .calib_fix_aspect_ratio
                .then_some(self.calib_aspect_ratio),
            fix_k: [
                self.calib_fix_k1,
                self.calib_fix_k2,
                self.calib_fix_k3,
                self.calib_fix_k4,
                self.calib_fix_k5,
            ],
        }
    }

    /// Check the invariants every session relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.board_width < 2 || self.board_height < 2 {
            return invalid(format!(
                "board must have at least 2x2 inner corners, got {}x{}",
                self.board_width, self.board_height
            ));
        }
        if !(self.square_size > 0.0) {
            return invalid(format!("square size must be positive, got {}", self.square_size));
        }
        if self.min_num_images == 0 || self.min_num_images > self.max_num_images {
            return invalid(format!(
                "need 1 <= min images <= max images, got {} and {}",
                self.min_num_images, self.max_num_images
            ));
        }
        if self.image_batch_size == 0 {
            return invalid("image batch size must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return invalid(format!(
                "min coverage must lie in [0, 1], got {}",
                self.min_coverage
            ));
        }
        if !(self.max_rms_error > 0.0) {
            return invalid(format!(
                "max RMS error must be positive, got {}",
                self.max_rms_error
            ));
        }
        if self.calib_fix_aspect_ratio && !(self.calib_aspect_ratio > 0.0) {
            return invalid(format!(
                "fixed aspect ratio must be positive, got {}",
                self.calib_aspect_ratio
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json)?;
        Ok(file.calibrator)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            calibrator: self.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::debug!("loaded calibrator configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
