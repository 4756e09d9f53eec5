//! Side-channel images emitted while calibrating.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Clone, Copy, Debug)]
pub enum Artifact<'a> {
    /// The accepted frame as fed to the detector.
    AcceptedImage(&'a GrayImage),
    /// The accepted frame with its detected corners drawn.
    CornersOverlay(&'a RgbImage),
}

impl Artifact<'_> {
    fn to_dynamic(self) -> DynamicImage {
        match self {
            Artifact::AcceptedImage(img) => DynamicImage::ImageLuma8(img.clone()),
            Artifact::CornersOverlay(img) => DynamicImage::ImageRgb8(img.clone()),
        }
    }
}

/// Receives named artifacts. Failures are reported to the calibrator, which
/// logs them and carries on.
pub trait ArtifactSink: Send {
    fn store(&mut self, name: &str, artifact: Artifact<'_>) -> Result<(), ArtifactError>;
}

/// Shared sink, so the caller can keep a handle while a calibrator owns
/// the other.
impl<T: ArtifactSink> ArtifactSink for Arc<Mutex<T>> {
    fn store(&mut self, name: &str, artifact: Artifact<'_>) -> Result<(), ArtifactError> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store(name, artifact)
    }
}

/// Drops every artifact.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardArtifacts;

impl ArtifactSink for DiscardArtifacts {
    fn store(&mut self, _name: &str, _artifact: Artifact<'_>) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Keeps artifacts in memory, in emission order.
#[derive(Clone, Debug, Default)]
pub struct CollectArtifacts {
    pub stored: Vec<(String, DynamicImage)>,
}

impl CollectArtifacts {
    pub fn names(&self) -> Vec<&str> {
        self.stored.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl ArtifactSink for CollectArtifacts {
    fn store(&mut self, name: &str, artifact: Artifact<'_>) -> Result<(), ArtifactError> {
        self.stored.push((name.to_string(), artifact.to_dynamic()));
        Ok(())
    }
}

/// Writes artifacts as PNG files into a directory.
#[derive(Clone, Debug)]
pub struct PngArtifactWriter {
    dir: PathBuf,
}

impl PngArtifactWriter {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for PngArtifactWriter {
    fn store(&mut self, name: &str, artifact: Artifact<'_>) -> Result<(), ArtifactError> {
        let path = self.dir.join(name);
        let result = match artifact {
            Artifact::AcceptedImage(img) => img.save_with_format(&path, ImageFormat::Png),
            Artifact::CornersOverlay(img) => img.save_with_format(&path, ImageFormat::Png),
        };
        result.map_err(|source| ArtifactError::Encode { path, source })
    }
}

/// Which camera an artifact belongs to; decides the file-name infixes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraRole {
    Mono,
    Left,
    Right,
}

impl CameraRole {
    /// `{prefix}{n:04}.png`, or with an `L_`/`R_` infix for stereo.
    pub fn accepted_image_name(self, prefix: &str, index: usize) -> String {
        let infix = match self {
            CameraRole::Mono => "",
            CameraRole::Left => "L_",
            CameraRole::Right => "R_",
        };
        format!("{prefix}{infix}{index:04}.png")
    }

    /// `{prefix}_{n:04}.png`, or with `Left`/`Right` before the underscore.
    pub fn corners_image_name(self, prefix: &str, index: usize) -> String {
        let camera = match self {
            CameraRole::Mono => "",
            CameraRole::Left => "Left",
            CameraRole::Right => "Right",
        };
        format!("{prefix}{camera}_{index:04}.png")
    }
}

pub(crate) fn store_or_warn(sink: &mut dyn ArtifactSink, name: &str, artifact: Artifact<'_>) {
    if let Err(err) = sink.store(name, artifact) {
        log::warn!("could not store artifact {name}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_carry_role_and_padded_index() {
        assert_eq!(CameraRole::Mono.accepted_image_name("Image", 3), "Image0003.png");
        assert_eq!(CameraRole::Left.accepted_image_name("Image", 12), "ImageL_0012.png");
        assert_eq!(CameraRole::Right.accepted_image_name("Image", 1), "ImageR_0001.png");
        assert_eq!(CameraRole::Mono.corners_image_name("Corners", 7), "Corners_0007.png");
        assert_eq!(
            CameraRole::Right.corners_image_name("Corners", 40),
            "CornersRight_0040.png"
        );
    }

    #[test]
    fn png_writer_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngArtifactWriter::new(dir.path().join("artifacts")).unwrap();
        let img = GrayImage::new(4, 3);
        sink.store("Image0001.png", Artifact::AcceptedImage(&img)).unwrap();

        let back = image::open(sink.dir().join("Image0001.png")).unwrap();
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[test]
    fn collector_keeps_emission_order() {
        let mut sink = CollectArtifacts::default();
        let gray = GrayImage::new(1, 1);
        let rgb = RgbImage::new(1, 1);
        sink.store("a.png", Artifact::AcceptedImage(&gray)).unwrap();
        sink.store("b.png", Artifact::CornersOverlay(&rgb)).unwrap();
        assert_eq!(sink.names(), vec!["a.png", "b.png"]);
    }

    #[test]
    fn shared_sink_is_visible_through_the_handle() {
        let shared = Arc::new(Mutex::new(CollectArtifacts::default()));
        let mut owned: Box<dyn ArtifactSink> = Box::new(Arc::clone(&shared));
        owned
            .store("c.png", Artifact::AcceptedImage(&GrayImage::new(1, 1)))
            .unwrap();
        assert_eq!(shared.lock().unwrap().names(), vec!["c.png"]);
    }
}
