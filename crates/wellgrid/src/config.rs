//! Run configuration: grid shape and analysis tuning knobs.

use serde::{Deserialize, Serialize};

/// Lattice cardinality: number of well rows and columns on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    /// Number of rows (row index varies fastest in site order).
    pub rows: u32,
    /// Number of columns.
    pub cols: u32,
}

impl GridShape {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of lattice sites.
    pub fn n_sites(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Map a column-major site index to 1-based `(row, col)`.
    pub fn row_col(&self, site: usize) -> (u32, u32) {
        let col = site as u32 / self.rows;
        let row = site as u32 % self.rows;
        (row + 1, col + 1)
    }
}

/// Top-level analysis configuration.
///
/// Feature radii are not configured here; they come from the per-lattice
/// corner fits (see [`crate::corner::LatticeSeed`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Lattice cardinality.
    pub shape: GridShape,
    /// Pixel value treated as the sensor saturation sentinel.
    pub saturation_level: f32,
    /// Depth of the flag/removal undo history in the review stage.
    pub undo_depth: usize,
    /// Circle-vote localization tuning.
    pub localize: crate::localize::LocalizeConfig,
}

impl AnalysisConfig {
    /// Build a configuration for a `rows x cols` chip with 16-bit images.
    pub fn for_shape(shape: GridShape) -> Self {
        Self {
            shape,
            ..Default::default()
        }
    }

    /// Fail fast on precondition violations before any pixel work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.rows == 0 || self.shape.cols == 0 {
            return Err(ConfigError::EmptyGrid {
                rows: self.shape.rows,
                cols: self.shape.cols,
            });
        }
        if !self.saturation_level.is_finite() || self.saturation_level <= 0.0 {
            return Err(ConfigError::BadSaturationLevel(self.saturation_level));
        }
        if self.undo_depth == 0 {
            return Err(ConfigError::ZeroUndoDepth);
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            shape: GridShape::new(56, 28),
            saturation_level: u16::MAX as f32,
            undo_depth: 1,
            localize: crate::localize::LocalizeConfig::default(),
        }
    }
}

/// Configuration precondition violations. Never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// One of the grid dimensions is zero.
    EmptyGrid { rows: u32, cols: u32 },
    /// The saturation sentinel is not a positive finite value.
    BadSaturationLevel(f32),
    /// The review stage needs at least one undo slot.
    ZeroUndoDepth,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGrid { rows, cols } => {
                write!(f, "grid shape {}x{} has no sites", rows, cols)
            }
            Self::BadSaturationLevel(v) => {
                write!(f, "saturation level {} is not a positive finite value", v)
            }
            Self::ZeroUndoDepth => write!(f, "undo depth must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_index_is_column_major() {
        let shape = GridShape::new(56, 28);
        assert_eq!(shape.n_sites(), 1568);
        assert_eq!(shape.row_col(0), (1, 1));
        assert_eq!(shape.row_col(55), (56, 1));
        assert_eq!(shape.row_col(56), (1, 2));
        assert_eq!(shape.row_col(1567), (56, 28));
    }

    #[test]
    fn default_config_validates() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_grid() {
        let cfg = AnalysisConfig::for_shape(GridShape::new(0, 4));
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::EmptyGrid { rows: 0, cols: 4 }
        );
    }

    #[test]
    fn rejects_bad_saturation() {
        let mut cfg = AnalysisConfig::default();
        cfg.saturation_level = f32::NAN;
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::BadSaturationLevel(_)
        ));
    }
}
