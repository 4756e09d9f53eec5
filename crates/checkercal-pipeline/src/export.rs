//! Serializable parameter records.

use std::fs;
use std::path::{Path, PathBuf};

use checkercal_core::Real;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize parameters: {0}")]
    Json(#[from] serde_json::Error),
}

/// Single-camera parameters. Matrices are row-major; undefined values are
/// empty and a never-solved RMS is `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonoCameraParameters {
    pub intrinsic_matrix: Vec<Real>,
    pub distortion_coeffs: Vec<Real>,
    pub rms_error: Option<Real>,
    pub coverage: Real,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonoParametersRecord {
    #[serde(rename = "MonoCameraParameters")]
    pub parameters: MonoCameraParameters,
}

/// Parameters of a stereo pair. `RotationMatrix`/`TranslationMatrix` map
/// left-camera coordinates into the right camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StereoCameraParameters {
    pub left_intrinsic_matrix: Vec<Real>,
    pub left_distortion_coeffs: Vec<Real>,
    pub right_intrinsic_matrix: Vec<Real>,
    pub right_distortion_coeffs: Vec<Real>,
    pub rotation_matrix: Vec<Real>,
    pub translation_matrix: Vec<Real>,
    pub essential_matrix: Vec<Real>,
    pub fundamental_matrix: Vec<Real>,
    pub rms_error: Option<Real>,
    pub left_coverage: Real,
    pub right_coverage: Real,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoParametersRecord {
    #[serde(rename = "StereoCameraParameters")]
    pub parameters: StereoCameraParameters,
}

/// Pretty-printed JSON.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_record_uses_pascal_case_keys() {
        let record = MonoParametersRecord {
            parameters: MonoCameraParameters {
                intrinsic_matrix: vec![1.0; 9],
                distortion_coeffs: Vec::new(),
                rms_error: None,
                coverage: 0.5,
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        let inner = &value["MonoCameraParameters"];
        assert_eq!(inner["IntrinsicMatrix"].as_array().unwrap().len(), 9);
        assert!(inner["DistortionCoeffs"].as_array().unwrap().is_empty());
        assert!(inner["RmsError"].is_null());
        assert_eq!(inner["Coverage"], 0.5);
    }

    #[test]
    fn write_json_reports_the_failing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let record = MonoParametersRecord {
            parameters: MonoCameraParameters {
                intrinsic_matrix: Vec::new(),
                distortion_coeffs: Vec::new(),
                rms_error: Some(0.2),
                coverage: 0.0,
            },
        };
        match write_json(&record, &path) {
            Err(ExportError::Io { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
