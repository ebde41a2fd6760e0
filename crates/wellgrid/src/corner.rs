//! Circumscribed-circle fitting of the four operator-sampled lattice corners.
//!
//! Each corner feature is sampled by clicking three points on its
//! circumference; the unique circle through them is recovered as the
//! intersection of the perpendicular bisectors (triangle circumcenter).

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Minimum clicks required per corner.
const CLICKS_PER_CORNER: usize = 3;

/// Relative determinant threshold below which a click triple is treated as
/// collinear.
const COLLINEAR_DET_EPS: f64 = 1e-9;

/// A fitted circle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleFit {
    /// Center (x, y) in pixels.
    pub center: [f64; 2],
    /// Radius in pixels.
    pub radius: f64,
}

/// Circumference clicks sampled on one corner feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerSample {
    /// Click coordinates; the first three are used for the fit.
    pub clicks: Vec<[f64; 2]>,
}

impl CornerSample {
    pub fn new(clicks: Vec<[f64; 2]>) -> Self {
        Self { clicks }
    }

    /// Fit the circumscribed circle through the first three clicks.
    pub fn fit(&self) -> Result<CircleFit, CornerFitError> {
        if self.clicks.len() < CLICKS_PER_CORNER {
            return Err(CornerFitError::TooFewClicks {
                needed: CLICKS_PER_CORNER,
                got: self.clicks.len(),
            });
        }
        circle_through(self.clicks[0], self.clicks[1], self.clicks[2])
    }
}

/// The unique circle through three non-collinear points.
///
/// Solves the two perpendicular-bisector equations
/// `2 (p_i - p_0) · c = |p_i|^2 - |p_0|^2` (i = 1, 2) for the center `c`.
pub fn circle_through(
    p0: [f64; 2],
    p1: [f64; 2],
    p2: [f64; 2],
) -> Result<CircleFit, CornerFitError> {
    let a = Matrix2::new(
        2.0 * (p1[0] - p0[0]),
        2.0 * (p1[1] - p0[1]),
        2.0 * (p2[0] - p0[0]),
        2.0 * (p2[1] - p0[1]),
    );
    let b = Vector2::new(
        p1[0] * p1[0] + p1[1] * p1[1] - p0[0] * p0[0] - p0[1] * p0[1],
        p2[0] * p2[0] + p2[1] * p2[1] - p0[0] * p0[0] - p0[1] * p0[1],
    );

    // Scale-aware degeneracy test: the raw determinant grows with the square
    // of the click spread, so normalize by it before comparing.
    let spread = (p1[0] - p0[0]).hypot(p1[1] - p0[1]) * (p2[0] - p0[0]).hypot(p2[1] - p0[1]);
    let det = a.determinant();
    if spread <= 0.0 || (det / (4.0 * spread)).abs() < COLLINEAR_DET_EPS {
        return Err(CornerFitError::CollinearClicks { points: [p0, p1, p2] });
    }

    let center = a
        .lu()
        .solve(&b)
        .ok_or(CornerFitError::CollinearClicks { points: [p0, p1, p2] })?;
    let radius = (p0[0] - center[0]).hypot(p0[1] - center[1]);
    Ok(CircleFit {
        center: [center[0], center[1]],
        radius,
    })
}

/// Fitted corner geometry of one lattice: four corner centers and the nominal
/// feature radius (mean of the four circumscribed radii).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeSeed {
    /// Corner centers in pixels, in the operator's sampling order.
    pub centers: [[f64; 2]; 4],
    /// Nominal feature radius in pixels.
    pub radius: f64,
}

impl LatticeSeed {
    /// Fit all four corners and average their radii.
    pub fn from_corner_samples(samples: &[CornerSample; 4]) -> Result<Self, CornerFitError> {
        let mut centers = [[0.0; 2]; 4];
        let mut radius_sum = 0.0;
        for (i, sample) in samples.iter().enumerate() {
            let fit = sample.fit()?;
            centers[i] = fit.center;
            radius_sum += fit.radius;
        }
        Ok(Self {
            centers,
            radius: radius_sum / 4.0,
        })
    }
}

/// Corner-sampling precondition violations. Abort the run.
#[derive(Debug, Clone, PartialEq)]
pub enum CornerFitError {
    /// Fewer circumference clicks than required for a corner.
    TooFewClicks { needed: usize, got: usize },
    /// The three clicks are collinear; no circle passes through them.
    CollinearClicks { points: [[f64; 2]; 3] },
}

impl std::fmt::Display for CornerFitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewClicks { needed, got } => {
                write!(f, "too few circumference clicks: need {}, got {}", needed, got)
            }
            Self::CollinearClicks { points } => write!(
                f,
                "circumference clicks ({:.1}, {:.1}), ({:.1}, {:.1}), ({:.1}, {:.1}) are collinear",
                points[0][0],
                points[0][1],
                points[1][0],
                points[1][1],
                points[2][0],
                points[2][1]
            ),
        }
    }
}

impl std::error::Error for CornerFitError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_circle(cx: f64, cy: f64, r: f64, angle_deg: f64) -> [f64; 2] {
        let a = angle_deg.to_radians();
        [cx + r * a.cos(), cy + r * a.sin()]
    }

    #[test]
    fn recovers_known_circle() {
        let (cx, cy, r) = (120.5, 88.25, 13.75);
        let fit = circle_through(
            on_circle(cx, cy, r, 10.0),
            on_circle(cx, cy, r, 140.0),
            on_circle(cx, cy, r, 260.0),
        )
        .unwrap();
        assert!((fit.center[0] - cx).abs() < 1e-9);
        assert!((fit.center[1] - cy).abs() < 1e-9);
        assert!((fit.radius - r).abs() < 1e-9);
    }

    #[test]
    fn collinear_clicks_fail() {
        let err = circle_through([0.0, 0.0], [5.0, 5.0], [10.0, 10.0]).unwrap_err();
        assert!(matches!(err, CornerFitError::CollinearClicks { .. }));
    }

    #[test]
    fn too_few_clicks_fail() {
        let sample = CornerSample::new(vec![[0.0, 0.0], [1.0, 1.0]]);
        assert_eq!(
            sample.fit().unwrap_err(),
            CornerFitError::TooFewClicks { needed: 3, got: 2 }
        );
    }

    #[test]
    fn extra_clicks_beyond_three_are_ignored() {
        let (cx, cy, r) = (40.0, 40.0, 10.0);
        let sample = CornerSample::new(vec![
            on_circle(cx, cy, r, 0.0),
            on_circle(cx, cy, r, 120.0),
            on_circle(cx, cy, r, 240.0),
            [999.0, 999.0],
        ]);
        let fit = sample.fit().unwrap();
        assert!((fit.radius - r).abs() < 1e-9);
    }

    #[test]
    fn seed_radius_is_mean_of_corner_radii() {
        let corner = |cx: f64, cy: f64, r: f64| {
            CornerSample::new(vec![
                on_circle(cx, cy, r, 30.0),
                on_circle(cx, cy, r, 150.0),
                on_circle(cx, cy, r, 270.0),
            ])
        };
        let samples = [
            corner(10.0, 10.0, 8.0),
            corner(200.0, 10.0, 10.0),
            corner(10.0, 300.0, 12.0),
            corner(200.0, 300.0, 14.0),
        ];
        let seed = LatticeSeed::from_corner_samples(&samples).unwrap();
        assert!((seed.radius - 11.0).abs() < 1e-9);
        assert!((seed.centers[1][0] - 200.0).abs() < 1e-9);
    }
}
