//! Deterministic fallback search: exhaustive masked-sum scoring over a local
//! neighborhood.
//!
//! Runs only when the voting pass finds nothing. Every candidate center in
//! the neighborhood is scored with the factory masks positioned at that
//! candidate; the maximum wins, first found on ties, so the result is fully
//! deterministic. The neighborhood is finite and non-empty: this pass always
//! returns a position.

use crate::mask::{ButtonMasks, Mask};

use super::normalize::Crop;

/// Candidate score arena, sized once per call and indexed by local offset.
struct ScoreArena {
    x_lo: i32,
    y_lo: i32,
    width: i32,
    scores: Vec<f32>,
}

impl ScoreArena {
    fn new(crop: &Crop, center: (u32, u32), search_half: i32) -> Self {
        let x_lo = (center.0 as i32 - search_half).max(0);
        let x_hi = (center.0 as i32 + search_half).min(crop.width as i32 - 1);
        let y_lo = (center.1 as i32 - search_half).max(0);
        let y_hi = (center.1 as i32 + search_half).min(crop.height as i32 - 1);
        let width = x_hi - x_lo + 1;
        let height = y_hi - y_lo + 1;
        Self {
            x_lo,
            y_lo,
            width,
            scores: vec![f32::MIN; (width * height) as usize],
        }
    }

    fn fill(&mut self, mut score: impl FnMut(i32, i32) -> f32) {
        for i in 0..self.scores.len() as i32 {
            let cx = self.x_lo + i % self.width;
            let cy = self.y_lo + i / self.width;
            self.scores[i as usize] = score(cx, cy);
        }
    }

    /// Row-major argmax with strict comparison: the first candidate of any
    /// tied maximum wins.
    fn best(&self) -> (u32, u32) {
        let mut best_i = 0;
        let mut best_s = f32::MIN;
        for (i, &s) in self.scores.iter().enumerate() {
            if s > best_s {
                best_s = s;
                best_i = i as i32;
            }
        }
        (
            (self.x_lo + best_i % self.width) as u32,
            (self.y_lo + best_i / self.width) as u32,
        )
    }
}

/// Sum of crop pixels under `mask` centered at `(cx, cy)`; offsets falling
/// outside the crop contribute nothing.
fn masked_sum(crop: &Crop, mask: &Mask, cx: i32, cy: i32) -> f32 {
    let mut sum = 0.0;
    for (dx, dy) in mask.offsets() {
        let x = cx + dx;
        let y = cy + dy;
        if x >= 0 && y >= 0 && (x as u32) < crop.width && (y as u32) < crop.height {
            sum += crop.get(x as u32, y as u32);
        }
    }
    sum
}

/// Best button candidate in `±search_half` around `center`, scored as
/// foreground sum minus background sum.
pub(crate) fn button_fallback(
    crop: &Crop,
    center: (u32, u32),
    search_half: i32,
    masks: &ButtonMasks,
) -> (u32, u32) {
    let mut arena = ScoreArena::new(crop, center, search_half);
    arena.fill(|cx, cy| {
        masked_sum(crop, &masks.foreground, cx, cy) - masked_sum(crop, &masks.background, cx, cy)
    });
    arena.best()
}

/// Best chamber candidate in `±search_half` around `center`, scored as the
/// plain foreground sum.
pub(crate) fn chamber_fallback(
    crop: &Crop,
    center: (u32, u32),
    search_half: i32,
    mask: &Mask,
) -> (u32, u32) {
    let mut arena = ScoreArena::new(crop, center, search_half);
    arena.fill(|cx, cy| masked_sum(crop, mask, cx, cy));
    arena.best()
}
