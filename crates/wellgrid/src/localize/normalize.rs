//! Local crop extraction and contrast normalization.
//!
//! Illumination varies across a large chip, so each site is normalized
//! against its own crop statistics rather than a global window.

use crate::imageset::Frame;

/// A rectangular crop with its origin in the source frame.
#[derive(Debug, Clone)]
pub(crate) struct Crop {
    /// Global x of the crop's left column.
    pub x0: i32,
    /// Global y of the crop's top row.
    pub y0: i32,
    pub width: u32,
    pub height: u32,
    /// Row-major pixels.
    pub pixels: Vec<f32>,
}

impl Crop {
    /// Extract the window of half-side `half` centered on `(cx, cy)`,
    /// clamped to the frame bounds.
    pub fn from_frame(frame: &Frame, cx: i32, cy: i32, half: i32) -> Self {
        let (w, h) = frame.dimensions();
        let x0 = (cx - half).clamp(0, w.saturating_sub(1) as i32);
        let y0 = (cy - half).clamp(0, h.saturating_sub(1) as i32);
        let x1 = (cx + half).clamp(0, w.saturating_sub(1) as i32);
        let y1 = (cy + half).clamp(0, h.saturating_sub(1) as i32);
        let width = (x1 - x0 + 1) as u32;
        let height = (y1 - y0 + 1) as u32;

        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in y0..=y1 {
            for x in x0..=x1 {
                pixels.push(frame.get_pixel(x as u32, y as u32)[0]);
            }
        }
        Self {
            x0,
            y0,
            width,
            height,
            pixels,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Local crop coordinates of a global point, if it falls inside.
    pub fn to_local(&self, gx: i32, gy: i32) -> Option<(u32, u32)> {
        let lx = gx - self.x0;
        let ly = gy - self.y0;
        (lx >= 0 && ly >= 0 && (lx as u32) < self.width && (ly as u32) < self.height)
            .then_some((lx as u32, ly as u32))
    }

    /// Global coordinates of a local crop point.
    pub fn to_global(&self, lx: u32, ly: u32) -> (i32, i32) {
        (self.x0 + lx as i32, self.y0 + ly as i32)
    }
}

/// Rescale the crop into the unit working range using the window
/// `[median - 2 sigma, max + 2 sigma]` computed from the crop itself.
///
/// A flat crop (empty window) normalizes to all zeros.
pub(crate) fn normalize_contrast(crop: &mut Crop) {
    let n = crop.pixels.len();
    if n == 0 {
        return;
    }

    let mut sorted = crop.pixels.clone();
    sorted.sort_by(f32::total_cmp);
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    };
    let max = sorted[n - 1];

    let mean: f32 = crop.pixels.iter().sum::<f32>() / n as f32;
    let var: f32 = crop
        .pixels
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f32>()
        / n as f32;
    let sigma = var.sqrt();

    let lo = median - 2.0 * sigma;
    let hi = max + 2.0 * sigma;
    let span = hi - lo;
    if span <= f32::EPSILON {
        crop.pixels.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in crop.pixels.iter_mut() {
        *v = ((*v - lo) / span).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient_frame(w: u32, h: u32) -> Frame {
        Frame::from_fn(w, h, |x, y| Luma([(x + y * w) as f32]))
    }

    #[test]
    fn crop_is_clamped_at_the_frame_edge() {
        let frame = gradient_frame(20, 20);
        let crop = Crop::from_frame(&frame, 1, 1, 5);
        assert_eq!((crop.x0, crop.y0), (0, 0));
        assert_eq!((crop.width, crop.height), (7, 7));
        assert_eq!(crop.get(0, 0), 0.0);
    }

    #[test]
    fn crop_centered_keeps_full_window() {
        let frame = gradient_frame(40, 40);
        let crop = Crop::from_frame(&frame, 20, 20, 6);
        assert_eq!((crop.width, crop.height), (13, 13));
        assert_eq!(crop.to_global(6, 6), (20, 20));
        assert_eq!(crop.to_local(20, 20), Some((6, 6)));
        assert_eq!(crop.to_local(2, 2), None);
    }

    #[test]
    fn normalization_maps_window_to_unit_range() {
        let frame = gradient_frame(16, 16);
        let mut crop = Crop::from_frame(&frame, 8, 8, 4);
        normalize_contrast(&mut crop);
        let max = crop.pixels.iter().cloned().fold(f32::MIN, f32::max);
        let min = crop.pixels.iter().cloned().fold(f32::MAX, f32::min);
        assert!(max <= 1.0 && min >= 0.0);
        // The window deliberately over-covers the data range by 2 sigma on
        // each side, so neither extreme saturates.
        assert!(max < 1.0);
        assert!(min > 0.0);
    }

    #[test]
    fn flat_crop_normalizes_to_zero() {
        let frame = Frame::from_pixel(10, 10, Luma([42.0]));
        let mut crop = Crop::from_frame(&frame, 5, 5, 3);
        normalize_contrast(&mut crop);
        assert!(crop.pixels.iter().all(|&v| v == 0.0));
    }
}
