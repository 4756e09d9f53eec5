use serde::{Deserialize, Serialize};

use crate::{Pt2, Pt3, Real};

/// Inner-corner grid of a planar checkerboard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    /// Inner corners per row.
    pub width: usize,
    /// Inner corners per column.
    pub height: usize,
    /// Edge length of one square, in the unit of the calibration output.
    pub square_size: Real,
}

impl BoardSpec {
    pub fn new(width: usize, height: usize, square_size: Real) -> Self {
        Self {
            width,
            height,
            square_size,
        }
    }

    pub fn corner_count(&self) -> usize {
        self.width * self.height
    }

    /// Board-plane coordinates `(j * s, i * s, 0)` in row-major corner order.
    pub fn reference_points(&self) -> Vec<Pt3> {
        self.planar_points()
            .into_iter()
            .map(|p| Pt3::new(p.x, p.y, 0.0))
            .collect()
    }

    /// Same as [`BoardSpec::reference_points`] without the zero Z.
    pub fn planar_points(&self) -> Vec<Pt2> {
        let mut pts = Vec::with_capacity(self.corner_count());
        for i in 0..self.height {
            for j in 0..self.width {
                pts.push(Pt2::new(
                    j as Real * self.square_size,
                    i as Real * self.square_size,
                ));
            }
        }
        pts
    }

    /// Indices of the top-left, top-right, bottom-right and bottom-left
    /// corners of a row-major corner set.
    pub fn outer_corner_indices(&self) -> [usize; 4] {
        let w = self.width;
        let h = self.height;
        [0, w - 1, h * w - 1, (h - 1) * w]
    }
}
