//! wellgrid — feature localization and photometric extraction for
//! microfluidic button/chamber arrays.
//!
//! The chip carries thousands of circular features on a near-regular
//! rectangular lattice: "buttons" (surface-immobilized molecule spots) and
//! "chambers" (solution reservoirs). Given fluorescence image stacks and four
//! operator-sampled corners per lattice, the pipeline stages are:
//!
//! 1. **Corner fit** – circumscribed-circle fit of each corner feature from
//!    three circumference clicks.
//! 2. **Lattice** – bilinear interpolation of the full row × column node grid
//!    from the four fitted corners.
//! 3. **Localize** – per-node circle detection via gradient voting, with a
//!    deterministic masked-sum fallback search.
//! 4. **Correct** – staged, transcript-driven review: reposition buttons,
//!    flag/remove wells, reposition chambers.
//! 5. **Extract** – mask-based, saturation-aware intensity statistics per
//!    well per frame, with background normalization.
//!
//! # Public API
//! [`ChipAnalyzer`] is the primary entry point; [`AnalysisConfig`] carries
//! the tuning knobs. Localization and extraction fan out one task per well
//! and honor a cooperative [`CancelToken`].

pub mod config;
pub mod corner;
pub mod correct;
pub mod extract;
pub mod imageset;
pub mod lattice;
pub mod localize;
pub mod mask;
pub mod stats;
pub mod store;

mod api;
#[cfg(test)]
pub(crate) mod test_utils;

pub use api::{ChipAnalyzer, PipelineError};
pub use config::{AnalysisConfig, GridShape};
pub use corner::{CornerSample, LatticeSeed};
pub use correct::{PositionCommand, ReviewCommand, Transcript};
pub use extract::{extract_wells, ChannelStats, WellRecord};
pub use imageset::{Frame, ImageSet, ImageStack};
pub use lattice::Lattice;
pub use localize::LocalizeConfig;
pub use stats::SampleStats;
pub use store::FeatureStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token shared between the caller and the
/// per-well worker pools.
///
/// Cancellation is checked between wells: wells finished before the token
/// was raised keep their results, wells not yet started are never touched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A per-well pass stopped early because its [`CancelToken`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run cancelled between wells")
    }
}

impl std::error::Error for Cancelled {}
