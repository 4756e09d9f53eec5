//! Raw pixel buffers handed in by the caller and their 8-bit gray conversion.

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unsupported bytes per pixel: {0} (expected 1 or 2)")]
    UnsupportedBytesPerPixel(usize),
    #[error("row stride {stride} is shorter than a row of {row_bytes} bytes")]
    StrideTooShort { stride: usize, row_bytes: usize },
    #[error("pixel buffer holds {actual} bytes, layout needs {needed}")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("image has zero area")]
    Empty,
}

/// Borrowed gray pixel buffer: 8-bit or 16-bit (little-endian) samples with
/// an arbitrary row stride in bytes.
#[derive(Clone, Copy, Debug)]
pub struct RawImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
    pub row_stride: usize,
}

impl<'a> RawImage<'a> {
    /// Tightly packed buffer (`row_stride = width * bytes_per_pixel`).
    pub fn packed(data: &'a [u8], width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        Self {
            data,
            width,
            height,
            bytes_per_pixel,
            row_stride: width as usize * bytes_per_pixel,
        }
    }

    pub fn from_gray(image: &'a GrayImage) -> Self {
        Self::packed(image.as_raw(), image.width(), image.height(), 1)
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Convert to 8-bit gray. 16-bit samples are scaled by 1/256 with
    /// rounding and saturation. Optionally flips rows.
    pub fn to_gray(&self, flip_vertically: bool) -> Result<GrayImage, FrameError> {
        let bpp = self.bytes_per_pixel;
        if bpp != 1 && bpp != 2 {
            return Err(FrameError::UnsupportedBytesPerPixel(bpp));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty);
        }
        let w = self.width as usize;
        let h = self.height as usize;
        let row_bytes = w.checked_mul(bpp).ok_or(FrameError::BufferTooSmall {
            needed: usize::MAX,
            actual: self.data.len(),
        })?;
        if self.row_stride < row_bytes {
            return Err(FrameError::StrideTooShort {
                stride: self.row_stride,
                row_bytes,
            });
        }
        let needed = self
            .row_stride
            .checked_mul(h - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .unwrap_or(usize::MAX);
        if self.data.len() < needed {
            return Err(FrameError::BufferTooSmall {
                needed,
                actual: self.data.len(),
            });
        }

        let mut pixels = Vec::with_capacity(w * h);
        for row in self.data.chunks(self.row_stride).take(h) {
            let row = &row[..row_bytes];
            if bpp == 1 {
                pixels.extend_from_slice(row);
            } else {
                pixels.extend(row.chunks_exact(2).map(|s| {
                    let v = u16::from_le_bytes([s[0], s[1]]) as u32;
                    ((v + 128) >> 8).min(255) as u8
                }));
            }
        }

        let mut gray = GrayImage::from_raw(self.width, self.height, pixels).ok_or(
            FrameError::BufferTooSmall {
                needed: w * h,
                actual: 0,
            },
        )?;
        if flip_vertically {
            imageops::flip_vertical_in_place(&mut gray);
        }
        Ok(gray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_rows_respect_stride() {
        // 2x2 image with one padding byte per row.
        let data = [10u8, 20, 0, 30, 40, 0];
        let raw = RawImage {
            data: &data,
            width: 2,
            height: 2,
            bytes_per_pixel: 1,
            row_stride: 3,
        };
        let gray = raw.to_gray(false).unwrap();
        assert_eq!(gray.as_raw(), &vec![10, 20, 30, 40]);
    }

    #[test]
    fn sixteen_bit_samples_are_divided_by_256() {
        let samples: [u16; 4] = [0, 256, 25600, 65535];
        let data: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        let gray = RawImage::packed(&data, 4, 1, 2).to_gray(false).unwrap();
        assert_eq!(gray.as_raw(), &vec![0, 1, 100, 255]);
    }

    #[test]
    fn vertical_flip_reverses_rows() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let gray = RawImage::packed(&data, 2, 3, 1).to_gray(true).unwrap();
        assert_eq!(gray.as_raw(), &vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn rejects_unsupported_depth_and_short_buffers() {
        let data = [0u8; 12];
        assert_eq!(
            RawImage::packed(&data, 2, 2, 3).to_gray(false),
            Err(FrameError::UnsupportedBytesPerPixel(3))
        );
        assert_eq!(
            RawImage::packed(&data, 4, 4, 1).to_gray(false),
            Err(FrameError::BufferTooSmall {
                needed: 16,
                actual: 12
            })
        );
    }

    #[test]
    fn oversized_stride_is_a_short_buffer() {
        let data = [0u8; 12];
        let raw = RawImage {
            data: &data,
            width: 4,
            height: 3,
            bytes_per_pixel: 1,
            row_stride: usize::MAX / 2 + 1,
        };
        assert!(matches!(
            raw.to_gray(false),
            Err(FrameError::BufferTooSmall { actual: 12, .. })
        ));
    }
}
