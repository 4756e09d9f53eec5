//! Images for the presentation layer: coverage tint and corner markers.

use checkercal_core::{BoardSpec, Pt2};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};

const ROW_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([255, 0, 255]),
];

/// Gray frame as RGB with the coverage mask added to the red channel.
pub fn coverage_display(gray: &GrayImage, mask: Option<&GrayImage>) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        let tint = mask
            .filter(|m| x < m.width() && y < m.height())
            .map_or(0, |m| m.get_pixel(x, y)[0]);
        Rgb([v.saturating_add(tint), v, v])
    })
}

/// Draw detected corners: a marker per corner, colored by board row, joined
/// in row-major order.
pub fn draw_corners(canvas: &mut RgbImage, corners: &[Pt2], board: &BoardSpec) {
    let width = board.width.max(1);
    for (idx, pair) in corners.windows(2).enumerate() {
        let color = ROW_COLORS[(idx / width) % ROW_COLORS.len()];
        draw_line_segment_mut(
            canvas,
            (pair[0].x as f32, pair[0].y as f32),
            (pair[1].x as f32, pair[1].y as f32),
            color,
        );
    }
    for (idx, p) in corners.iter().enumerate() {
        let color = ROW_COLORS[(idx / width) % ROW_COLORS.len()];
        let (x, y) = (p.x.round() as i32, p.y.round() as i32);
        draw_cross_mut(canvas, color, x, y);
        draw_hollow_circle_mut(canvas, (x, y), 4, color);
    }
}
