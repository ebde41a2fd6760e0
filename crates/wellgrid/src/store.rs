//! The mutable per-well record set shared by the pipeline stages.
//!
//! Allocated once the lattices exist, populated by the localizer, edited only
//! through the correction protocol, and read-only during extraction. Site
//! order is column-major and shared with the lattices: index `m` refers to
//! the same physical site everywhere.

use crate::config::GridShape;
use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};

/// A located circular feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeaturePos {
    /// Global image x, integer pixels.
    pub x: i32,
    /// Global image y, integer pixels.
    pub y: i32,
    /// Feature radius in pixels (nominal per lattice unless overridden).
    pub radius: f64,
    /// True when the primary circle-detection pass found this feature;
    /// false for fallback-search or operator-placed positions.
    pub autofind: bool,
}

impl FeaturePos {
    fn at_node(node: [i32; 2], radius: f64) -> Self {
        Self {
            x: node[0],
            y: node[1],
            radius,
            autofind: false,
        }
    }

    fn squared_distance_to(&self, p: [f64; 2]) -> f64 {
        let dx = self.x as f64 - p[0];
        let dy = self.y as f64 - p[1];
        dx * dx + dy * dy
    }
}

/// One well: a button/chamber feature pair plus review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Well {
    /// 1-based row index.
    pub row: u32,
    /// 1-based column index.
    pub col: u32,
    pub button: FeaturePos,
    pub chamber: FeaturePos,
    /// Excluded from export. Independent of `flagged`.
    pub removed: bool,
    /// Marked suspect but retained. Independent of `removed`.
    pub flagged: bool,
}

/// An axis-aligned review rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Rect {
    /// Strict interior test: boundary points do not count.
    pub fn contains_strict(&self, p: [f64; 2]) -> bool {
        p[0] > self.x_min && p[0] < self.x_max && p[1] > self.y_min && p[1] < self.y_max
    }
}

/// The per-well record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStore {
    shape: GridShape,
    wells: Vec<Well>,
}

impl FeatureStore {
    /// Allocate one well per site, seeded at the lattice nodes.
    ///
    /// Both lattices must share the store's shape; the localizer refines the
    /// node positions afterwards.
    pub fn from_lattices(
        buttons: &Lattice,
        chambers: &Lattice,
        button_radius: f64,
        chamber_radius: f64,
    ) -> Self {
        debug_assert_eq!(buttons.shape(), chambers.shape());
        let shape = buttons.shape();
        let wells = (0..shape.n_sites())
            .map(|m| {
                let (row, col) = shape.row_col(m);
                Well {
                    row,
                    col,
                    button: FeaturePos::at_node(buttons.node(m), button_radius),
                    chamber: FeaturePos::at_node(chambers.node(m), chamber_radius),
                    removed: false,
                    flagged: false,
                }
            })
            .collect();
        Self { shape, wells }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.wells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wells.is_empty()
    }

    pub fn well(&self, site: usize) -> &Well {
        &self.wells[site]
    }

    pub fn wells(&self) -> &[Well] {
        &self.wells
    }

    pub(crate) fn well_mut(&mut self, site: usize) -> &mut Well {
        &mut self.wells[site]
    }

    /// Site whose button is nearest to `p` by squared distance; ties go to
    /// the lowest site index.
    pub fn nearest_button(&self, p: [f64; 2]) -> usize {
        self.nearest_by(|w| w.button.squared_distance_to(p))
    }

    /// Site whose chamber is nearest to `p` by squared distance; ties go to
    /// the lowest site index.
    pub fn nearest_chamber(&self, p: [f64; 2]) -> usize {
        self.nearest_by(|w| w.chamber.squared_distance_to(p))
    }

    fn nearest_by(&self, mut dist: impl FnMut(&Well) -> f64) -> usize {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (m, well) in self.wells.iter().enumerate() {
            let d = dist(well);
            if d < best_d {
                best_d = d;
                best = m;
            }
        }
        best
    }

    /// Overwrite a button position from the operator and clear its autofind
    /// flag.
    pub fn place_button(&mut self, site: usize, to: [f64; 2]) {
        let b = &mut self.wells[site].button;
        b.x = to[0].round() as i32;
        b.y = to[1].round() as i32;
        b.autofind = false;
    }

    /// Overwrite a chamber position from the operator and clear its autofind
    /// flag.
    pub fn place_chamber(&mut self, site: usize, to: [f64; 2]) {
        let c = &mut self.wells[site].chamber;
        c.x = to[0].round() as i32;
        c.y = to[1].round() as i32;
        c.autofind = false;
    }

    /// Flag every non-removed well whose button lies strictly inside `rect`.
    /// Returns the sites whose flag actually changed (the undo batch).
    pub fn flag_region(&mut self, rect: Rect) -> Vec<usize> {
        self.mark_region(rect, |w: &mut Well| &mut w.flagged)
    }

    /// Remove every non-removed well whose button lies strictly inside
    /// `rect`. Returns the sites whose removal state changed.
    pub fn remove_region(&mut self, rect: Rect) -> Vec<usize> {
        self.mark_region(rect, |w: &mut Well| &mut w.removed)
    }

    fn mark_region(&mut self, rect: Rect, field: fn(&mut Well) -> &mut bool) -> Vec<usize> {
        let mut batch = Vec::new();
        for (m, well) in self.wells.iter_mut().enumerate() {
            if well.removed {
                continue;
            }
            let p = [well.button.x as f64, well.button.y as f64];
            if !rect.contains_strict(p) {
                continue;
            }
            let slot = field(well);
            if !*slot {
                *slot = true;
                batch.push(m);
            }
        }
        batch
    }

    /// Clear the flag on each site of a previously returned batch.
    pub fn unflag_batch(&mut self, batch: &[usize]) {
        for &m in batch {
            self.wells[m].flagged = false;
        }
    }

    /// Restore each site of a previously returned removal batch.
    pub fn restore_batch(&mut self, batch: &[usize]) {
        for &m in batch {
            self.wells[m].removed = false;
        }
    }
}
