//! Mask-based photometric extraction.
//!
//! For each well, foreground and background masks are positioned in a shared
//! local window: the button sits at the window center and the chamber mask is
//! offset by the stored chamber-minus-button delta, so the geometry stays
//! correct even though the two centers rarely coincide. Statistics are
//! computed over strictly-positive pixels only, with background sums
//! area-normalized to the matching foreground mask.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::imageset::{Frame, ImageSet};
use crate::stats::SampleStats;
use crate::store::{FeaturePos, FeatureStore, Well};
use crate::{CancelToken, Cancelled};

/// Foreground/background statistics of one channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub foreground: SampleStats,
    pub background: SampleStats,
}

/// One output row: review state plus per-channel statistics for a single
/// lattice site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellRecord {
    /// 1-based row index.
    pub row: u32,
    /// 1-based column index.
    pub col: u32,
    pub button: FeaturePos,
    pub chamber: FeaturePos,
    pub removed: bool,
    pub flagged: bool,
    /// Contiguous 1-based index over non-removed wells; `None` when removed.
    pub export_index: Option<u32>,
    /// Button statistics on the surface frame.
    pub surface: ChannelStats,
    /// Button statistics per captured frame.
    pub captured: Vec<ChannelStats>,
    /// Chamber statistics per solubilized frame.
    pub solubilized: Vec<ChannelStats>,
}

/// Per-well mask geometry in the shared local window.
///
/// `chamber_no_button` (the chamber disk minus the button disk) serves as
/// both the chamber foreground and the button background: the solution
/// between the button spot and the chamber wall is common background for
/// both measurements, so the pixel set is deliberately shared.
struct WellMasks {
    button_fg: Vec<(i32, i32)>,
    chamber_no_button: Vec<(i32, i32)>,
    chamber_bg: Vec<(i32, i32)>,
}

/// Button foreground radius as a fraction of the button radius.
const BUTTON_FG_FRAC: f64 = 0.9;
/// Chamber background annulus bounds as fractions of the chamber radius.
const CHAMBER_BG_FRAC: [f64; 2] = [1.1, 1.3];

impl WellMasks {
    /// Build the three offset sets for one well. Offsets are relative to the
    /// button center; the chamber tests shift by the stored center delta.
    fn for_well(well: &Well) -> Self {
        let rb = well.button.radius;
        let rc = well.chamber.radius;
        let ox = (well.chamber.x - well.button.x) as f64;
        let oy = (well.chamber.y - well.button.y) as f64;

        let fg2 = (BUTTON_FG_FRAC * rb) * (BUTTON_FG_FRAC * rb);
        let rb2 = rb * rb;
        let rc2 = rc * rc;
        let bg_lo2 = (CHAMBER_BG_FRAC[0] * rc) * (CHAMBER_BG_FRAC[0] * rc);
        let bg_hi2 = (CHAMBER_BG_FRAC[1] * rc) * (CHAMBER_BG_FRAC[1] * rc);

        // Shared window: side 4 x chamber_radius + 1, button centered.
        let half = (2.0 * rc).round() as i32;
        let mut masks = Self {
            button_fg: Vec::new(),
            chamber_no_button: Vec::new(),
            chamber_bg: Vec::new(),
        };
        for dy in -half..=half {
            for dx in -half..=half {
                let db2 = (dx * dx + dy * dy) as f64;
                let cdx = dx as f64 - ox;
                let cdy = dy as f64 - oy;
                let dc2 = cdx * cdx + cdy * cdy;

                if db2 <= fg2 {
                    masks.button_fg.push((dx, dy));
                }
                if dc2 <= rc2 && db2 > rb2 {
                    masks.chamber_no_button.push((dx, dy));
                }
                if dc2 >= bg_lo2 && dc2 <= bg_hi2 {
                    masks.chamber_bg.push((dx, dy));
                }
            }
        }
        masks
    }
}

/// Pixel values under an offset set, anchored at the button center. Offsets
/// falling outside the frame are skipped.
fn sample(frame: &Frame, anchor: (i32, i32), offsets: &[(i32, i32)]) -> Vec<f32> {
    let (w, h) = frame.dimensions();
    offsets
        .iter()
        .filter_map(|&(dx, dy)| {
            let x = anchor.0 + dx;
            let y = anchor.1 + dy;
            (x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h)
                .then(|| frame.get_pixel(x as u32, y as u32)[0])
        })
        .collect()
}

fn channel_stats(
    frame: &Frame,
    anchor: (i32, i32),
    fg: &[(i32, i32)],
    bg: &[(i32, i32)],
    saturation_level: f32,
) -> ChannelStats {
    let foreground = SampleStats::from_samples(&sample(frame, anchor, fg), saturation_level);
    let background = SampleStats::from_samples(&sample(frame, anchor, bg), saturation_level)
        .with_area_normalized_sum(fg.len(), bg.len());
    ChannelStats {
        foreground,
        background,
    }
}

fn empty_channel() -> ChannelStats {
    ChannelStats {
        foreground: SampleStats::empty(),
        background: SampleStats::empty(),
    }
}

fn extract_one(well: &Well, images: &ImageSet, saturation_level: f32) -> WellRecord {
    let mut record = WellRecord {
        row: well.row,
        col: well.col,
        button: well.button,
        chamber: well.chamber,
        removed: well.removed,
        flagged: well.flagged,
        export_index: None,
        surface: empty_channel(),
        captured: vec![empty_channel(); images.captured().n_frames()],
        solubilized: vec![empty_channel(); images.solubilized().n_frames()],
    };
    if well.removed {
        // Removed wells keep their row but are excluded from statistics.
        return record;
    }

    let masks = WellMasks::for_well(well);
    let anchor = (well.button.x, well.button.y);

    record.surface = channel_stats(
        images.surface(),
        anchor,
        &masks.button_fg,
        &masks.chamber_no_button,
        saturation_level,
    );
    for (i, frame) in images.captured().frames().iter().enumerate() {
        record.captured[i] = channel_stats(
            frame,
            anchor,
            &masks.button_fg,
            &masks.chamber_no_button,
            saturation_level,
        );
    }
    for (i, frame) in images.solubilized().frames().iter().enumerate() {
        record.solubilized[i] = channel_stats(
            frame,
            anchor,
            &masks.chamber_no_button,
            &masks.chamber_bg,
            saturation_level,
        );
    }
    record
}

/// Extract the full well table in site order.
///
/// Wells are independent and fan out over the worker pool; the store is
/// read-only here. On cancellation no table is produced.
pub fn extract_wells(
    store: &FeatureStore,
    images: &ImageSet,
    saturation_level: f32,
    cancel: &CancelToken,
) -> Result<Vec<WellRecord>, Cancelled> {
    let mut records: Vec<Option<WellRecord>> = store
        .wells()
        .par_iter()
        .map(|well| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(extract_one(well, images, saturation_level))
        })
        .collect();

    if cancel.is_cancelled() || records.iter().any(Option::is_none) {
        return Err(Cancelled);
    }

    // Compact 1-based export numbering over the non-removed subset.
    let mut next = 0u32;
    for record in records.iter_mut().flatten() {
        if !record.removed {
            next += 1;
            record.export_index = Some(next);
        }
    }

    Ok(records.into_iter().flatten().collect())
}
