use serde::{Deserialize, Serialize};

/// Outcome of one `set_image` / `force_solve` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationStatus {
    InvalidBytesPerPixel,
    ImageSizeInvalid,
    ImageRejected,
    ImageAccepted,
    Calibrated,
    CalibrationFailed,
}

impl std::fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CalibrationStatus::InvalidBytesPerPixel => "Invalid bytes per pixel",
            CalibrationStatus::ImageSizeInvalid => "Image size invalid",
            CalibrationStatus::ImageRejected => "Image rejected",
            CalibrationStatus::ImageAccepted => "Image accepted",
            CalibrationStatus::Calibrated => "Calibrated",
            CalibrationStatus::CalibrationFailed => "Calibration failed",
        };
        f.write_str(text)
    }
}
