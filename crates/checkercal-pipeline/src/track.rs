//! One camera's share of a calibration session.
//!
//! A [`CameraTrack`] owns the detector, the coverage model, the accumulator,
//! the locked image size and the display surface of a single camera. The
//! mono calibrator drives one track, the stereo calibrator two in lockstep.

use checkercal_core::{BoardSpec, ImageSize, Pt2, Real};
use image::{GrayImage, RgbImage};

use crate::accumulator::CalibrationAccumulator;
use crate::artifacts::CameraRole;
use crate::coverage::{CoverageModel, QuadCoverage};
use crate::detector::PatternDetector;
use crate::display::{coverage_display, draw_corners};

pub struct CameraTrack<D> {
    role: CameraRole,
    detector: D,
    coverage: Box<dyn CoverageModel>,
    accumulator: CalibrationAccumulator,
    image_size: Option<ImageSize>,
    display: Option<RgbImage>,
}

impl<D: PatternDetector> CameraTrack<D> {
    pub fn new(role: CameraRole, detector: D) -> Self {
        Self::with_coverage(role, detector, Box::new(QuadCoverage::new()))
    }

    pub fn with_coverage(role: CameraRole, detector: D, coverage: Box<dyn CoverageModel>) -> Self {
        Self {
            role,
            detector,
            coverage,
            accumulator: CalibrationAccumulator::new(),
            image_size: None,
            display: None,
        }
    }

    pub fn role(&self) -> CameraRole {
        self.role
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// `true` if `size` is acceptable: no size locked yet, or the same size.
    pub fn size_matches(&self, size: ImageSize) -> bool {
        self.image_size.map_or(true, |locked| locked == size)
    }

    /// Lock the size on first use; later calls keep the first size.
    pub fn lock_size(&mut self, size: ImageSize) {
        self.image_size.get_or_insert(size);
    }

    /// Prepare coverage for this frame and run the detector. Corner sets of
    /// the wrong length count as "not found".
    pub fn detect(&mut self, image: &GrayImage, board: &BoardSpec) -> Option<Vec<Pt2>> {
        let size = ImageSize::new(image.width(), image.height());
        if let Err(err) = self.coverage.initialize(size) {
            log::warn!("{:?} camera: {err}", self.role);
        }
        let corners = self.detector.detect(image, board)?;
        if corners.len() != board.corner_count() {
            log::debug!(
                "{:?} camera: detector returned {} corners, board has {}",
                self.role,
                corners.len(),
                board.corner_count()
            );
            return None;
        }
        Some(corners)
    }

    /// Show a rejected frame: gray plus the current coverage tint.
    pub fn show_rejected(&mut self, image: &GrayImage) {
        self.display = Some(coverage_display(image, self.coverage.mask()));
    }

    /// Store an accepted frame, clear its footprint from the coverage mask
    /// and refresh the display with the corners drawn.
    pub fn accept(&mut self, image: GrayImage, corners: Vec<Pt2>, board: &BoardSpec) {
        self.coverage.register_corners(&corners, board);
        let mut display = coverage_display(&image, self.coverage.mask());
        draw_corners(&mut display, &corners, board);
        self.display = Some(display);
        self.accumulator.accept(image, corners);
    }

    pub fn coverage(&self) -> Real {
        self.coverage.fraction()
    }

    pub fn coverage_model(&self) -> &dyn CoverageModel {
        self.coverage.as_ref()
    }

    pub fn display_image(&self) -> Option<&RgbImage> {
        self.display.as_ref()
    }

    pub fn accumulator(&self) -> &CalibrationAccumulator {
        &self.accumulator
    }

    pub fn accumulator_mut(&mut self) -> &mut CalibrationAccumulator {
        &mut self.accumulator
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn into_detector(self) -> D {
        self.detector
    }

    /// Drop all accumulated state; the detector is kept.
    pub fn reset(&mut self) {
        self.coverage.reset();
        self.accumulator.clear();
        self.image_size = None;
        self.display = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(corners: Option<Vec<Pt2>>) -> impl FnMut(&GrayImage, &BoardSpec) -> Option<Vec<Pt2>> {
        move |_: &GrayImage, _: &BoardSpec| corners.clone()
    }

    #[test]
    fn size_lock_keeps_first_size() {
        let mut track = CameraTrack::new(CameraRole::Mono, detector(None));
        assert!(track.size_matches(ImageSize::new(4, 4)));
        track.lock_size(ImageSize::new(4, 4));
        track.lock_size(ImageSize::new(8, 8));
        assert_eq!(track.image_size(), Some(ImageSize::new(4, 4)));
        assert!(!track.size_matches(ImageSize::new(8, 8)));
    }

    #[test]
    fn short_corner_sets_count_as_not_found() {
        let board = BoardSpec::new(3, 3, 1.0);
        let mut track = CameraTrack::new(CameraRole::Mono, detector(Some(vec![Pt2::origin(); 4])));
        assert!(track.detect(&GrayImage::new(10, 10), &board).is_none());
        assert_eq!(track.coverage(), 0.0);
        assert!(track.coverage_model().mask().is_some());
    }

    #[test]
    fn reset_forgets_everything() {
        let board = BoardSpec::new(2, 2, 1.0);
        let corners = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(9.0, 0.0),
            Pt2::new(0.0, 9.0),
            Pt2::new(9.0, 9.0),
        ];
        let mut track = CameraTrack::new(CameraRole::Left, detector(Some(corners)));
        let img = GrayImage::new(10, 10);
        track.lock_size(ImageSize::new(10, 10));
        let found = track.detect(&img, &board).unwrap();
        track.accept(img, found, &board);
        assert_eq!(track.coverage(), 1.0);
        assert_eq!(track.accumulator().len(), 1);

        track.reset();
        assert_eq!(track.coverage(), 0.0);
        assert!(track.accumulator().is_empty());
        assert!(track.image_size().is_none());
        assert!(track.display_image().is_none());
    }
}
