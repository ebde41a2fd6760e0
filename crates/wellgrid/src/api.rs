//! High-level analysis API.
//!
//! [`ChipAnalyzer`] is the primary entry point: build once from an
//! [`AnalysisConfig`], then run the locate → review → extract pipeline on an
//! image set.

use crate::config::{AnalysisConfig, ConfigError};
use crate::corner::{CornerFitError, CornerSample, LatticeSeed};
use crate::correct::{Aborted, Transcript};
use crate::extract::{extract_wells, WellRecord};
use crate::imageset::ImageSet;
use crate::lattice::{Lattice, LatticeError};
use crate::localize::locate_features;
use crate::store::FeatureStore;
use crate::{CancelToken, Cancelled};

/// Primary analysis interface.
///
/// Encapsulates the validated configuration. Create once, analyze many runs.
#[derive(Debug)]
pub struct ChipAnalyzer {
    config: AnalysisConfig,
}

impl ChipAnalyzer {
    /// Validate the configuration and build an analyzer.
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Access the current configuration.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fit both corner quadruples into lattice seeds.
    pub fn fit_corners(
        &self,
        button_corners: &[CornerSample; 4],
        chamber_corners: &[CornerSample; 4],
    ) -> Result<(LatticeSeed, LatticeSeed), CornerFitError> {
        Ok((
            LatticeSeed::from_corner_samples(button_corners)?,
            LatticeSeed::from_corner_samples(chamber_corners)?,
        ))
    }

    /// Interpolate both lattices and run the localization passes.
    pub fn locate(
        &self,
        images: &ImageSet,
        button_seed: &LatticeSeed,
        chamber_seed: &LatticeSeed,
        cancel: &CancelToken,
    ) -> Result<FeatureStore, PipelineError> {
        let buttons = Lattice::from_seed(button_seed, self.config.shape)?;
        let chambers = Lattice::from_seed(chamber_seed, self.config.shape)?;
        let mut store = FeatureStore::from_lattices(
            &buttons,
            &chambers,
            button_seed.radius,
            chamber_seed.radius,
        );
        locate_features(
            images,
            &mut store,
            button_seed.radius,
            chamber_seed.radius,
            &self.config.localize,
            cancel,
        )?;
        Ok(store)
    }

    /// Full pipeline: corner fit, localization, transcript-driven review,
    /// extraction.
    pub fn run(
        &self,
        images: &ImageSet,
        button_corners: &[CornerSample; 4],
        chamber_corners: &[CornerSample; 4],
        transcript: &Transcript,
        cancel: &CancelToken,
    ) -> Result<Vec<WellRecord>, PipelineError> {
        let (button_seed, chamber_seed) = self.fit_corners(button_corners, chamber_corners)?;
        let mut store = self.locate(images, &button_seed, &chamber_seed, cancel)?;
        transcript.apply(&mut store, self.config.undo_depth)?;
        let records = extract_wells(&store, images, self.config.saturation_level, cancel)?;
        Ok(records)
    }
}

/// Any way a full pipeline run can stop.
///
/// Configuration-class errors abort before pixel work; `Aborted` and
/// `Cancelled` are expected operator-driven termination paths.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Config(ConfigError),
    Corner(CornerFitError),
    Lattice(LatticeError),
    Aborted(Aborted),
    Cancelled,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {}", e),
            Self::Corner(e) => write!(f, "corner fit failed: {}", e),
            Self::Lattice(e) => write!(f, "lattice construction failed: {}", e),
            Self::Aborted(e) => write!(f, "{}", e),
            Self::Cancelled => write!(f, "{}", Cancelled),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Corner(e) => Some(e),
            Self::Lattice(e) => Some(e),
            Self::Aborted(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CornerFitError> for PipelineError {
    fn from(e: CornerFitError) -> Self {
        Self::Corner(e)
    }
}

impl From<LatticeError> for PipelineError {
    fn from(e: LatticeError) -> Self {
        Self::Lattice(e)
    }
}

impl From<Aborted> for PipelineError {
    fn from(e: Aborted) -> Self {
        Self::Aborted(e)
    }
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridShape;
    use crate::imageset::{Frame, ImageStack};
    use crate::test_utils::draw_disk_grid;
    use image::Luma;

    /// Three clicks on the circumference of a circle.
    fn clicks(cx: f64, cy: f64, r: f64) -> CornerSample {
        let at = |deg: f64| {
            let a = deg.to_radians();
            [cx + r * a.cos(), cy + r * a.sin()]
        };
        CornerSample::new(vec![at(15.0), at(135.0), at(255.0)])
    }

    fn corner_quad(x0: f64, y0: f64, x1: f64, y1: f64, r: f64) -> [CornerSample; 4] {
        [
            clicks(x0, y0, r),
            clicks(x1, y0, r),
            clicks(x0, y1, r),
            clicks(x1, y1, r),
        ]
    }

    /// A fully synthetic chip: every button and chamber drawn exactly on a
    /// rectangular lattice.
    fn synthetic_run(shape: GridShape, pitch: f64) -> (ImageSet, [CornerSample; 4], [CornerSample; 4]) {
        let x0 = 30.0;
        let y0 = 30.0;
        let x1 = x0 + pitch * (shape.cols - 1) as f64;
        let y1 = y0 + pitch * (shape.rows - 1) as f64;
        let w = (x1 + 40.0) as u32;
        let h = (y1 + 40.0) as u32;

        let mut centers = Vec::new();
        for col in 0..shape.cols {
            for row in 0..shape.rows {
                centers.push([x0 + pitch * col as f64, y0 + pitch * row as f64]);
            }
        }
        let surface = draw_disk_grid(w, h, &centers, 4.0, 3000.0, 200.0);
        let solub = draw_disk_grid(w, h, &centers, 7.0, 2500.0, 150.0);
        let captured = Frame::from_pixel(w, h, Luma([400.0]));
        let images = ImageSet::new(
            surface,
            ImageStack::new(vec![solub.clone(), solub]).unwrap(),
            ImageStack::new(vec![captured]).unwrap(),
        )
        .unwrap();

        (
            images,
            corner_quad(x0, y0, x1, y1, 6.0),
            corner_quad(x0, y0, x1, y1, 8.0),
        )
    }

    #[test]
    fn full_run_covers_every_site() {
        let shape = GridShape::new(56, 28);
        let (images, button_corners, chamber_corners) = synthetic_run(shape, 20.0);

        let analyzer = ChipAnalyzer::new(AnalysisConfig::for_shape(shape)).unwrap();
        let records = analyzer
            .run(
                &images,
                &button_corners,
                &chamber_corners,
                &Transcript::confirm_all(),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(records.len(), 1568);
        for (i, record) in records.iter().enumerate() {
            assert!(!record.removed);
            assert!(!record.flagged);
            assert_eq!(record.export_index, Some(i as u32 + 1));
            assert_eq!(record.captured.len(), 1);
            assert_eq!(record.solubilized.len(), 2);
        }
    }

    #[test]
    fn abort_in_transcript_stops_the_run() {
        let shape = GridShape::new(4, 4);
        let (images, button_corners, chamber_corners) = synthetic_run(shape, 24.0);

        let transcript = Transcript {
            buttons: vec![crate::correct::PositionCommand::Abort],
            inclusion: Vec::new(),
            chambers: Vec::new(),
        };
        let analyzer = ChipAnalyzer::new(AnalysisConfig::for_shape(shape)).unwrap();
        let err = analyzer
            .run(
                &images,
                &button_corners,
                &chamber_corners,
                &transcript,
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aborted(_)));
    }

    #[test]
    fn collinear_corner_clicks_abort_before_pixels() {
        let shape = GridShape::new(4, 4);
        let (images, _, chamber_corners) = synthetic_run(shape, 24.0);

        let bad = [
            CornerSample::new(vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]),
            clicks(100.0, 30.0, 6.0),
            clicks(30.0, 100.0, 6.0),
            clicks(100.0, 100.0, 6.0),
        ];
        let analyzer = ChipAnalyzer::new(AnalysisConfig::for_shape(shape)).unwrap();
        let err = analyzer
            .run(
                &images,
                &bad,
                &chamber_corners,
                &Transcript::confirm_all(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Corner(_)));
    }

    #[test]
    fn zero_grid_is_rejected_at_construction() {
        let err = ChipAnalyzer::new(AnalysisConfig::for_shape(GridShape::new(0, 8))).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyGrid { .. }));
    }
}
