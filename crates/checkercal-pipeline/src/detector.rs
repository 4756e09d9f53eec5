//! Corner detection capability and a replay implementation.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use checkercal_core::{BoardSpec, Pt2, Real};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Finds the inner corners of a checkerboard.
///
/// Implementations return the corners in row-major board order, or `None`
/// when the board is not found. Sets of the wrong length are treated as
/// "not found" by the calibrators.
pub trait PatternDetector {
    fn detect(&mut self, image: &GrayImage, board: &BoardSpec) -> Option<Vec<Pt2>>;
}

impl<F> PatternDetector for F
where
    F: FnMut(&GrayImage, &BoardSpec) -> Option<Vec<Pt2>>,
{
    fn detect(&mut self, image: &GrayImage, board: &BoardSpec) -> Option<Vec<Pt2>> {
        self(image, board)
    }
}

#[derive(Debug, Error)]
pub enum DetectionLogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed detection log: {0}")]
    Json(#[from] serde_json::Error),
}

/// Detections recorded by an external detector, one entry per frame;
/// `null` marks a frame where the board was not found.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionLog {
    pub frames: Vec<Option<Vec<[Real; 2]>>>,
}

impl DetectionLog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectionLogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DetectionLogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Hands out recorded detections in order, ignoring the image content.
/// Once the log is exhausted every frame is "not found".
#[derive(Clone, Debug, Default)]
pub struct ReplayDetector {
    frames: VecDeque<Option<Vec<Pt2>>>,
}

impl ReplayDetector {
    pub fn new(frames: impl IntoIterator<Item = Option<Vec<Pt2>>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl From<DetectionLog> for ReplayDetector {
    fn from(log: DetectionLog) -> Self {
        Self::new(log.frames.into_iter().map(|frame| {
            frame.map(|pts| pts.into_iter().map(|[x, y]| Pt2::new(x, y)).collect())
        }))
    }
}

impl PatternDetector for ReplayDetector {
    fn detect(&mut self, _image: &GrayImage, _board: &BoardSpec) -> Option<Vec<Pt2>> {
        self.frames.pop_front().flatten()
    }
}
