//! Shared synthetic-image helpers for unit tests.
//!
//! Consolidated here so the localization, extraction and pipeline tests all
//! draw their chips the same way.

use crate::imageset::Frame;
use image::Luma;

/// Render a single filled disk: pixels within `radius` of the center get
/// `fg`, everything else `bg`.
pub(crate) fn draw_disk_frame(w: u32, h: u32, cx: f64, cy: f64, radius: f64, fg: f32, bg: f32) -> Frame {
    let centers = [[cx, cy]];
    draw_disk_grid(w, h, &centers, radius, fg, bg)
}

/// Render one filled disk per center over a constant background.
pub(crate) fn draw_disk_grid(
    w: u32,
    h: u32,
    centers: &[[f64; 2]],
    radius: f64,
    fg: f32,
    bg: f32,
) -> Frame {
    let r2 = radius * radius;
    Frame::from_fn(w, h, |x, y| {
        let inside = centers.iter().any(|c| {
            let dx = x as f64 - c[0];
            let dy = y as f64 - c[1];
            dx * dx + dy * dy <= r2
        });
        Luma([if inside { fg } else { bg }])
    })
}
