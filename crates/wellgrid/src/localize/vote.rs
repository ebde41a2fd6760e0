//! Primary circle detection: gradient-voting radial symmetry in a radius
//! band.
//!
//! For each strong-gradient pixel, votes are cast along the gradient
//! direction at distances in `[r_min, r_max]`. A bright disk on a dark
//! background has boundary gradients pointing inward, so votes converge on
//! its center; the strongest accumulator peak is the detected circle center.

use image::{GrayImage, Luma};

use super::normalize::Crop;

/// Tuning for the gradient-voting pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VoteConfig {
    /// Gradient magnitude threshold as a fraction of the crop's max gradient.
    pub grad_threshold: f32,
    /// Gaussian sigma for accumulator smoothing.
    pub accum_sigma: f32,
    /// Minimum smoothed vote mass at the peak for a detection.
    pub min_peak_votes: f32,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            grad_threshold: 0.05,
            accum_sigma: 2.0,
            min_peak_votes: 1.0,
        }
    }
}

/// A detected circle center in crop coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VotePeak {
    pub x: u32,
    pub y: u32,
    pub votes: f32,
}

/// Deposit a weighted vote using bilinear interpolation.
#[inline]
fn bilinear_add(accum: &mut [f32], w: u32, x: f32, y: f32, weight: f32) {
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 + 1 >= w {
        return;
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let stride = w as usize;
    let base = y0 as usize * stride + x0 as usize;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

/// Detect the strongest bright-on-dark circle with radius in
/// `[r_min, r_max]`, or `None` when no peak clears the vote floor.
///
/// The crop must already be contrast-normalized into the unit range.
pub(crate) fn find_circle(
    crop: &Crop,
    r_min: f32,
    r_max: f32,
    config: &VoteConfig,
) -> Option<VotePeak> {
    let (w, h) = (crop.width, crop.height);
    if w < 4 || h < 4 || r_max < r_min {
        return None;
    }

    // Quantize the normalized crop for the Scharr operator.
    let gray = GrayImage::from_fn(w, h, |x, y| {
        Luma([(crop.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8])
    });
    let gx = imageproc::gradients::horizontal_scharr(&gray);
    let gy = imageproc::gradients::vertical_scharr(&gray);

    let mut max_mag_sq: f32 = 0.0;
    for y in 0..h {
        for x in 0..w {
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            max_mag_sq = max_mag_sq.max(gxv * gxv + gyv * gyv);
        }
    }
    let max_mag = max_mag_sq.sqrt();
    if max_mag < 1e-6 {
        return None;
    }
    let threshold = config.grad_threshold * max_mag;

    let mut accum = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag < threshold {
                continue;
            }

            // Bright-on-dark polarity: the gradient on the boundary of a
            // bright disk points toward its interior, so vote along the
            // +gradient direction only.
            let dx = gxv / mag;
            let dy = gyv / mag;
            let mut r = r_min;
            while r <= r_max {
                let vx = x as f32 + dx * r;
                let vy = y as f32 + dy * r;
                if vx >= 0.0 && vx < (w - 1) as f32 && vy >= 0.0 && vy < (h - 1) as f32 {
                    bilinear_add(&mut accum, w, vx, vy, mag / max_mag);
                }
                r += 1.0;
            }
        }
    }

    let accum_img = image::ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, accum)
        .expect("accumulator dimensions match");
    let smoothed = imageproc::filter::gaussian_blur_f32(&accum_img, config.accum_sigma);

    let mut best = VotePeak {
        x: 0,
        y: 0,
        votes: f32::MIN,
    };
    for y in 0..h {
        for x in 0..w {
            let v = smoothed.get_pixel(x, y)[0];
            if v > best.votes {
                best = VotePeak { x, y, votes: v };
            }
        }
    }

    (best.votes >= config.min_peak_votes).then_some(best)
}
