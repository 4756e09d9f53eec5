//! How much of the image plane the accepted boards have covered.

use checkercal_core::{BoardSpec, ImageSize, Pt2, Real};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use thiserror::Error;

/// Mask value of a pixel no accepted board has covered yet.
pub const UNCOVERED_TINT: u8 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoverageError {
    #[error("coverage mask is {existing}, cannot re-initialize it as {requested}")]
    SizeMismatch {
        existing: ImageSize,
        requested: ImageSize,
    },
}

/// Per-camera coverage bookkeeping.
///
/// Coverage must never decrease while corner sets are registered.
pub trait CoverageModel: Send {
    /// Allocate state for `size`. Repeated calls with the same size are no-ops.
    fn initialize(&mut self, size: ImageSize) -> Result<(), CoverageError>;

    /// Account for the footprint of one accepted, row-major corner set.
    fn register_corners(&mut self, corners: &[Pt2], board: &BoardSpec);

    /// Covered fraction of the image in `[0, 1]`.
    fn fraction(&self) -> Real;

    /// Visualization mask: non-zero where the image is still uncovered.
    fn mask(&self) -> Option<&GrayImage>;

    /// Forget everything, including the size.
    fn reset(&mut self);
}

/// Clears the quadrilateral spanned by the four outer board corners in an
/// occupancy mask and reports the cleared share of pixels.
#[derive(Clone, Debug, Default)]
pub struct QuadCoverage {
    mask: Option<GrayImage>,
    fraction: Real,
}

impl QuadCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    fn recompute(&mut self) {
        let Some(mask) = &self.mask else {
            self.fraction = 0.0;
            return;
        };
        let total = mask.as_raw().len();
        if total == 0 {
            self.fraction = 0.0;
            return;
        }
        let uncovered = mask.as_raw().iter().filter(|v| **v != 0).count();
        self.fraction = 1.0 - uncovered as Real / total as Real;
    }
}

/// Fill a quadrilateral, boundary included, clipped to the mask.
fn fill_quad(mask: &mut GrayImage, quad: [Pt2; 4]) {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(4);
    for p in quad {
        let q = Point::new(p.x.round() as i32, p.y.round() as i32);
        if poly.last() != Some(&q) {
            poly.push(q);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }

    let covered = Luma([0u8]);
    match poly.len() {
        0 => {}
        1 => {
            let p = poly[0];
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height() {
                mask.put_pixel(p.x as u32, p.y as u32, covered);
            }
        }
        2 => draw_line_segment_mut(
            mask,
            (poly[0].x as f32, poly[0].y as f32),
            (poly[1].x as f32, poly[1].y as f32),
            covered,
        ),
        _ => draw_polygon_mut(mask, &poly, covered),
    }
}

impl CoverageModel for QuadCoverage {
    fn initialize(&mut self, size: ImageSize) -> Result<(), CoverageError> {
        match &self.mask {
            Some(mask) => {
                let existing = ImageSize::new(mask.width(), mask.height());
                if existing != size {
                    return Err(CoverageError::SizeMismatch {
                        existing,
                        requested: size,
                    });
                }
            }
            None => {
                self.mask = Some(GrayImage::from_pixel(
                    size.width,
                    size.height,
                    Luma([UNCOVERED_TINT]),
                ));
                self.recompute();
            }
        }
        Ok(())
    }

    fn register_corners(&mut self, corners: &[Pt2], board: &BoardSpec) {
        let Some(mask) = self.mask.as_mut() else {
            log::warn!("corners registered before the coverage mask was initialized");
            return;
        };
        let idx = board.outer_corner_indices();
        if idx.iter().any(|&i| i >= corners.len()) {
            log::warn!(
                "corner set of length {} does not match a {}x{} board",
                corners.len(),
                board.width,
                board.height
            );
            return;
        }
        fill_quad(mask, idx.map(|i| corners[i]));
        self.recompute();
    }

    fn fraction(&self) -> Real {
        self.fraction
    }

    fn mask(&self) -> Option<&GrayImage> {
        self.mask.as_ref()
    }

    fn reset(&mut self) {
        self.mask = None;
        self.fraction = 0.0;
    }
}
