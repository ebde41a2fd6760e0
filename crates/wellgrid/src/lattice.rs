//! Full node lattice interpolated from four fitted corner centers.
//!
//! The printed array may be mildly skewed or rotated relative to the image
//! frame, so nodes are not placed on an axis-aligned grid. Instead the four
//! corners are split into a top and a bottom pair, both edges are sampled at
//! `cols` evenly spaced stations, and each column is filled by linear
//! interpolation between its top and bottom station.

use crate::config::GridShape;
use crate::corner::LatticeSeed;
use serde::{Deserialize, Serialize};

/// Interpolated node lattice in column-major site order (row index varies
/// fastest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lattice {
    shape: GridShape,
    /// Node coordinates, rounded to integer pixels.
    points: Vec<[i32; 2]>,
}

impl Lattice {
    /// Interpolate the full lattice from four fitted corner centers.
    pub fn from_seed(seed: &LatticeSeed, shape: GridShape) -> Result<Self, LatticeError> {
        if shape.n_sites() == 0 {
            return Err(LatticeError::EmptyShape {
                rows: shape.rows,
                cols: shape.cols,
            });
        }

        // Split corners into the top pair (smallest y) and bottom pair.
        let mut by_y = seed.centers;
        by_y.sort_by(|a, b| a[1].total_cmp(&b[1]));
        if by_y[1][1] >= by_y[2][1] {
            return Err(LatticeError::CornersNotSeparable { centers: seed.centers });
        }
        let (top_a, top_b) = order_by_x(by_y[0], by_y[1]);
        let (bot_a, bot_b) = order_by_x(by_y[2], by_y[3]);

        let cols = shape.cols as usize;
        let rows = shape.rows as usize;
        let mut points = Vec::with_capacity(rows * cols);
        for j in 0..cols {
            let t = edge_fraction(j, cols);
            let top = lerp2(top_a, top_b, t);
            let bot = lerp2(bot_a, bot_b, t);
            for i in 0..rows {
                let s = edge_fraction(i, rows);
                let p = lerp2(top, bot, s);
                points.push([p[0].round() as i32, p[1].round() as i32]);
            }
        }

        Ok(Self { shape, points })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn n_sites(&self) -> usize {
        self.points.len()
    }

    /// Node coordinate of a column-major site index.
    pub fn node(&self, site: usize) -> [i32; 2] {
        self.points[site]
    }

    pub fn nodes(&self) -> &[[i32; 2]] {
        &self.points
    }
}

fn order_by_x(a: [f64; 2], b: [f64; 2]) -> ([f64; 2], [f64; 2]) {
    if a[0] <= b[0] {
        (a, b)
    } else {
        (b, a)
    }
}

/// Interpolation fraction of station `i` out of `n` along an edge.
fn edge_fraction(i: usize, n: usize) -> f64 {
    if n > 1 {
        i as f64 / (n - 1) as f64
    } else {
        0.5
    }
}

fn lerp2(a: [f64; 2], b: [f64; 2], t: f64) -> [f64; 2] {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// Lattice construction failures. Abort the run.
#[derive(Debug, Clone, PartialEq)]
pub enum LatticeError {
    /// The requested shape has no sites.
    EmptyShape { rows: u32, cols: u32 },
    /// The four corner centers cannot be split into a top and a bottom pair.
    CornersNotSeparable { centers: [[f64; 2]; 4] },
}

impl std::fmt::Display for LatticeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyShape { rows, cols } => {
                write!(f, "lattice shape {}x{} has no sites", rows, cols)
            }
            Self::CornersNotSeparable { centers } => write!(
                f,
                "corner centers are not separable into top/bottom pairs (y values {:.1}, {:.1}, {:.1}, {:.1})",
                centers[0][1], centers[1][1], centers[2][1], centers[3][1]
            ),
        }
    }
}

impl std::error::Error for LatticeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(centers: [[f64; 2]; 4]) -> LatticeSeed {
        LatticeSeed {
            centers,
            radius: 10.0,
        }
    }

    #[test]
    fn rectangular_corners_give_exact_grid() {
        let s = seed([[0.0, 0.0], [100.0, 0.0], [0.0, 200.0], [100.0, 200.0]]);
        let lattice = Lattice::from_seed(&s, GridShape::new(3, 2)).unwrap();
        assert_eq!(
            lattice.nodes(),
            &[
                [0, 0],
                [0, 100],
                [0, 200],
                [100, 0],
                [100, 100],
                [100, 200],
            ]
        );
    }

    #[test]
    fn cardinality_matches_shape() {
        let s = seed([[3.0, 7.0], [411.0, 12.0], [5.0, 833.0], [405.0, 829.0]]);
        let lattice = Lattice::from_seed(&s, GridShape::new(56, 28)).unwrap();
        assert_eq!(lattice.n_sites(), 1568);
    }

    #[test]
    fn nodes_stay_inside_corner_hull() {
        // A skewed quadrilateral; every node must stay within its bounding
        // box (the hull of an axis-aligned-ish quad, with rounding slack).
        let s = seed([[10.0, 5.0], [300.0, 15.0], [5.0, 500.0], [295.0, 510.0]]);
        let lattice = Lattice::from_seed(&s, GridShape::new(12, 9)).unwrap();
        for p in lattice.nodes() {
            assert!(p[0] >= 4 && p[0] <= 301, "x out of hull: {:?}", p);
            assert!(p[1] >= 4 && p[1] <= 511, "y out of hull: {:?}", p);
        }
    }

    #[test]
    fn order_is_column_major() {
        let s = seed([[0.0, 0.0], [90.0, 0.0], [0.0, 90.0], [90.0, 90.0]]);
        let lattice = Lattice::from_seed(&s, GridShape::new(4, 4)).unwrap();
        // Sites 0..4 walk down the first column.
        assert_eq!(lattice.node(0), [0, 0]);
        assert_eq!(lattice.node(1), [0, 30]);
        assert_eq!(lattice.node(3), [0, 90]);
        assert_eq!(lattice.node(4), [30, 0]);
    }

    #[test]
    fn coincident_pairs_are_rejected() {
        // All four corners on one horizontal line: no top/bottom split.
        let s = seed([[0.0, 10.0], [50.0, 10.0], [100.0, 10.0], [150.0, 10.0]]);
        let err = Lattice::from_seed(&s, GridShape::new(2, 2)).unwrap_err();
        assert!(matches!(err, LatticeError::CornersNotSeparable { .. }));
    }

    #[test]
    fn mild_rotation_keeps_monotonic_columns() {
        let s = seed([[20.0, 10.0], [420.0, 30.0], [10.0, 610.0], [410.0, 630.0]]);
        let lattice = Lattice::from_seed(&s, GridShape::new(8, 6)).unwrap();
        for col in 0..6 {
            for row in 1..8 {
                let prev = lattice.node(col * 8 + row - 1);
                let here = lattice.node(col * 8 + row);
                assert!(here[1] > prev[1], "column {} not monotonic in y", col);
            }
        }
    }
}
