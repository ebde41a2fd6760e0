//! Per-site feature localization.
//!
//! Buttons are located on the surface frame, chambers on frame 0 of the
//! solubilized stack, in two full passes over the lattice. Each site is
//! independent: a crop around the lattice node is contrast-normalized, the
//! gradient-voting pass looks for a circle in the expected radius band, and
//! when it finds nothing a deterministic masked-sum search takes over. Every
//! site ends with a best-effort position — correctness judgment is deferred
//! to the review stages.

mod fallback;
mod normalize;
mod vote;

pub use vote::VoteConfig;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::imageset::{Frame, ImageSet};
use crate::mask::{ButtonMasks, Mask};
use crate::store::FeatureStore;
use crate::{CancelToken, Cancelled};

use self::fallback::{button_fallback, chamber_fallback};
use self::normalize::{normalize_contrast, Crop};
use self::vote::find_circle;

/// Localization tuning.
///
/// The band fractions multiply the per-lattice nominal radius from the
/// corner fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizeConfig {
    /// Gradient-voting controls shared by both passes.
    pub vote: VoteConfig,
    /// Button radius search band as fractions of the nominal radius.
    pub button_band: [f32; 2],
    /// Chamber radius search band as fractions of the nominal radius.
    pub chamber_band: [f32; 2],
    /// Chamber fallback neighborhood as a fraction of the nominal radius.
    ///
    /// Restricted below a full-window search to bound runtime and to keep
    /// the search from drifting into a neighboring chamber.
    pub chamber_search_frac: f64,
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            vote: VoteConfig::default(),
            button_band: [0.4, 0.8],
            chamber_band: [0.8, 1.2],
            chamber_search_frac: 7.0 / 8.0,
        }
    }
}

/// One localized feature, ready to be written back to the store.
#[derive(Debug, Clone, Copy)]
struct Located {
    site: usize,
    x: i32,
    y: i32,
    autofind: bool,
}

/// Locate every button on the surface frame.
///
/// Store positions must be seeded at the lattice nodes. On cancellation,
/// wells finished before the token was raised keep their localized
/// positions; the rest keep their seeds.
pub fn locate_buttons(
    frame: &Frame,
    store: &mut FeatureStore,
    radius: f64,
    config: &LocalizeConfig,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    let masks = ButtonMasks::for_radius(radius);
    let window_half = (2.0 * masks.mod_radius).round() as i32;
    let search_half = (2.0 * masks.mod_radius).round() as i32;
    let band = [
        config.button_band[0] * radius as f32,
        config.button_band[1] * radius as f32,
    ];

    let nodes: Vec<(usize, [i32; 2])> = store
        .wells()
        .iter()
        .enumerate()
        .map(|(m, w)| (m, [w.button.x, w.button.y]))
        .collect();

    let located: Vec<Located> = nodes
        .par_iter()
        .filter_map(|&(site, node)| {
            if cancel.is_cancelled() {
                return None;
            }
            let mut crop = Crop::from_frame(frame, node[0], node[1], window_half);
            normalize_contrast(&mut crop);

            let found = match find_circle(&crop, band[0], band[1], &config.vote) {
                Some(peak) => {
                    let (gx, gy) = crop.to_global(peak.x, peak.y);
                    Located {
                        site,
                        x: gx,
                        y: gy,
                        autofind: true,
                    }
                }
                None => {
                    let center = local_center(&crop, node);
                    let (lx, ly) = button_fallback(&crop, center, search_half, &masks);
                    let (gx, gy) = crop.to_global(lx, ly);
                    Located {
                        site,
                        x: gx,
                        y: gy,
                        autofind: false,
                    }
                }
            };
            Some(found)
        })
        .collect();

    apply(store, &located, Feature::Button);
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    Ok(())
}

/// Locate every chamber on frame 0 of the solubilized stack.
pub fn locate_chambers(
    frame: &Frame,
    store: &mut FeatureStore,
    radius: f64,
    config: &LocalizeConfig,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    let fg_mask = Mask::disk(radius);
    let window_half = radius.round() as i32;
    let search_half = (config.chamber_search_frac * radius).round() as i32;
    let band = [
        config.chamber_band[0] * radius as f32,
        config.chamber_band[1] * radius as f32,
    ];

    let nodes: Vec<(usize, [i32; 2])> = store
        .wells()
        .iter()
        .enumerate()
        .map(|(m, w)| (m, [w.chamber.x, w.chamber.y]))
        .collect();

    let located: Vec<Located> = nodes
        .par_iter()
        .filter_map(|&(site, node)| {
            if cancel.is_cancelled() {
                return None;
            }
            let mut crop = Crop::from_frame(frame, node[0], node[1], window_half);
            normalize_contrast(&mut crop);

            let found = match find_circle(&crop, band[0], band[1], &config.vote) {
                Some(peak) => {
                    let (gx, gy) = crop.to_global(peak.x, peak.y);
                    Located {
                        site,
                        x: gx,
                        y: gy,
                        autofind: true,
                    }
                }
                None => {
                    let center = local_center(&crop, node);
                    let (lx, ly) = chamber_fallback(&crop, center, search_half, &fg_mask);
                    let (gx, gy) = crop.to_global(lx, ly);
                    Located {
                        site,
                        x: gx,
                        y: gy,
                        autofind: false,
                    }
                }
            };
            Some(found)
        })
        .collect();

    apply(store, &located, Feature::Chamber);
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    Ok(())
}

/// Run both localization passes over a validated image set.
pub fn locate_features(
    images: &ImageSet,
    store: &mut FeatureStore,
    button_radius: f64,
    chamber_radius: f64,
    config: &LocalizeConfig,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    locate_buttons(images.surface(), store, button_radius, config, cancel)?;
    locate_chambers(
        images.solubilized().frame(0),
        store,
        chamber_radius,
        config,
        cancel,
    )
}

enum Feature {
    Button,
    Chamber,
}

fn apply(store: &mut FeatureStore, located: &[Located], feature: Feature) {
    for l in located {
        let well = store.well_mut(l.site);
        let pos = match feature {
            Feature::Button => &mut well.button,
            Feature::Chamber => &mut well.chamber,
        };
        pos.x = l.x;
        pos.y = l.y;
        pos.autofind = l.autofind;
    }
}

/// Crop coordinates of the lattice node, defaulting to the crop midpoint
/// when edge clamping pushed the node outside.
fn local_center(crop: &Crop, node: [i32; 2]) -> (u32, u32) {
    crop.to_local(node[0], node[1])
        .unwrap_or((crop.width / 2, crop.height / 2))
}
