//! Staged, transcript-driven review of the feature store.
//!
//! Three strictly sequential stages: button position review, inclusion/flag
//! review, chamber position review. Each stage is a pure state-transition
//! function over [`FeatureStore`] consuming tagged commands — rendering and
//! input capture live entirely outside the core. A stage terminates only on
//! `Continue`; `Abort` (or a transcript that runs out before confirming the
//! stage) propagates to the caller with the store left in its partially
//! edited state.

use serde::{Deserialize, Serialize};

use crate::store::{FeatureStore, Rect};

/// Commands of the two position-review stages (A: buttons, C: chambers).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PositionCommand {
    /// Confirm the stage and advance.
    Continue,
    /// Overwrite the position of the feature nearest to `near` with `to`.
    Reposition { near: [f64; 2], to: [f64; 2] },
    /// Abandon the run.
    Abort,
}

/// Commands of the inclusion/flag review stage (B).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReviewCommand {
    Continue,
    /// Flag all non-removed wells whose button lies strictly inside.
    FlagRegion { rect: Rect },
    /// Reverse the most recent flag batch.
    UnflagLast,
    /// Remove all non-removed wells whose button lies strictly inside.
    RemoveRegion { rect: Rect },
    /// Reverse the most recent removal batch.
    UndoLastRemoval,
    Abort,
}

/// The operator aborted the review (explicitly, or the transcript ended
/// before confirming a stage). Partial edits are kept; no output is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted {
    /// Stage that was active when the abort happened.
    pub stage: Stage,
}

/// Review stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Buttons,
    Inclusion,
    Chambers,
}

impl std::fmt::Display for Aborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self.stage {
            Stage::Buttons => "button review",
            Stage::Inclusion => "inclusion review",
            Stage::Chambers => "chamber review",
        };
        write!(f, "review aborted during {}", stage)
    }
}

impl std::error::Error for Aborted {}

/// Bounded batch history for single-level (or deeper) undo.
#[derive(Debug, Clone)]
struct History {
    depth: usize,
    batches: Vec<Vec<usize>>,
}

impl History {
    fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            batches: Vec::new(),
        }
    }

    fn push(&mut self, batch: Vec<usize>) {
        if self.batches.len() == self.depth {
            self.batches.remove(0);
        }
        self.batches.push(batch);
    }

    fn pop(&mut self) -> Option<Vec<usize>> {
        self.batches.pop()
    }
}

/// Stage A: review and reposition button centers.
pub fn review_buttons<I>(store: &mut FeatureStore, commands: I) -> Result<(), Aborted>
where
    I: IntoIterator<Item = PositionCommand>,
{
    run_position_stage(store, commands, Stage::Buttons)
}

/// Stage C: review and reposition chamber centers.
pub fn review_chambers<I>(store: &mut FeatureStore, commands: I) -> Result<(), Aborted>
where
    I: IntoIterator<Item = PositionCommand>,
{
    run_position_stage(store, commands, Stage::Chambers)
}

fn run_position_stage<I>(
    store: &mut FeatureStore,
    commands: I,
    stage: Stage,
) -> Result<(), Aborted>
where
    I: IntoIterator<Item = PositionCommand>,
{
    for command in commands {
        match command {
            PositionCommand::Continue => return Ok(()),
            PositionCommand::Abort => return Err(Aborted { stage }),
            PositionCommand::Reposition { near, to } => match stage {
                Stage::Buttons => {
                    let site = store.nearest_button(near);
                    store.place_button(site, to);
                }
                Stage::Chambers => {
                    let site = store.nearest_chamber(near);
                    store.place_chamber(site, to);
                }
                Stage::Inclusion => unreachable!("position stage only"),
            },
        }
    }
    Err(Aborted { stage })
}

/// Stage B: flag and remove wells by region, with independent bounded undo
/// histories for the two kinds of batch.
pub fn review_inclusion<I>(
    store: &mut FeatureStore,
    commands: I,
    undo_depth: usize,
) -> Result<(), Aborted>
where
    I: IntoIterator<Item = ReviewCommand>,
{
    let mut flags = History::new(undo_depth);
    let mut removals = History::new(undo_depth);
    for command in commands {
        match command {
            ReviewCommand::Continue => return Ok(()),
            ReviewCommand::Abort => {
                return Err(Aborted {
                    stage: Stage::Inclusion,
                })
            }
            ReviewCommand::FlagRegion { rect } => {
                let batch = store.flag_region(rect);
                flags.push(batch);
            }
            ReviewCommand::UnflagLast => {
                if let Some(batch) = flags.pop() {
                    store.unflag_batch(&batch);
                }
            }
            ReviewCommand::RemoveRegion { rect } => {
                let batch = store.remove_region(rect);
                removals.push(batch);
            }
            ReviewCommand::UndoLastRemoval => {
                if let Some(batch) = removals.pop() {
                    store.restore_batch(&batch);
                }
            }
        }
    }
    Err(Aborted {
        stage: Stage::Inclusion,
    })
}

/// A recorded (or synthetic) review session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub buttons: Vec<PositionCommand>,
    pub inclusion: Vec<ReviewCommand>,
    pub chambers: Vec<PositionCommand>,
}

impl Transcript {
    /// A transcript that confirms every stage untouched.
    pub fn confirm_all() -> Self {
        Self {
            buttons: vec![PositionCommand::Continue],
            inclusion: vec![ReviewCommand::Continue],
            chambers: vec![PositionCommand::Continue],
        }
    }

    /// Run all three stages in order.
    pub fn apply(&self, store: &mut FeatureStore, undo_depth: usize) -> Result<(), Aborted> {
        review_buttons(store, self.buttons.iter().copied())?;
        review_inclusion(store, self.inclusion.iter().copied(), undo_depth)?;
        review_chambers(store, self.chambers.iter().copied())
    }
}

/// Disjoint display sets for the chamber review renderer. Removed and
/// flagged wells are excluded from the position sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChamberPartition {
    /// Chambers found by the primary detection pass.
    pub autodetected: Vec<usize>,
    /// Chambers placed by the fallback search or the operator.
    pub manual: Vec<usize>,
    /// Flagged, non-removed wells.
    pub flagged: Vec<usize>,
}

/// Partition the non-removed wells for the chamber review display.
pub fn chamber_partition(store: &FeatureStore) -> ChamberPartition {
    let mut partition = ChamberPartition::default();
    for (m, well) in store.wells().iter().enumerate() {
        if well.removed {
            continue;
        }
        if well.flagged {
            partition.flagged.push(m);
        } else if well.chamber.autofind {
            partition.autodetected.push(m);
        } else {
            partition.manual.push(m);
        }
    }
    partition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridShape;
    use crate::corner::LatticeSeed;
    use crate::lattice::Lattice;

    fn store_3x3() -> FeatureStore {
        let seed = LatticeSeed {
            centers: [[0.0, 0.0], [20.0, 0.0], [0.0, 20.0], [20.0, 20.0]],
            radius: 4.0,
        };
        let lattice = Lattice::from_seed(&seed, GridShape::new(3, 3)).unwrap();
        FeatureStore::from_lattices(&lattice, &lattice, 4.0, 8.0)
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect {
            x_min: x0,
            y_min: y0,
            x_max: x1,
            y_max: y1,
        }
    }

    #[test]
    fn reposition_moves_nearest_button() {
        let mut store = store_3x3();
        review_buttons(
            &mut store,
            vec![
                PositionCommand::Reposition {
                    near: [11.0, 9.0],
                    to: [13.0, 7.0],
                },
                PositionCommand::Continue,
            ],
        )
        .unwrap();
        // Site 4 is the center node (10, 10).
        let b = store.well(4).button;
        assert_eq!((b.x, b.y), (13, 7));
        assert!(!b.autofind);
    }

    #[test]
    fn stage_without_continue_aborts() {
        let mut store = store_3x3();
        let err = review_buttons(
            &mut store,
            vec![PositionCommand::Reposition {
                near: [0.0, 0.0],
                to: [1.0, 1.0],
            }],
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::Buttons);
        // The edit before the abort sticks: no rollback.
        assert_eq!(store.well(0).button.x, 1);
    }

    #[test]
    fn remove_then_undo_is_noop() {
        let mut store = store_3x3();
        let before = store.clone();
        review_inclusion(
            &mut store,
            vec![
                ReviewCommand::RemoveRegion {
                    rect: rect(-1.0, -1.0, 21.0, 21.0),
                },
                ReviewCommand::UndoLastRemoval,
                ReviewCommand::Continue,
            ],
            1,
        )
        .unwrap();
        assert_eq!(store, before);
    }

    #[test]
    fn undo_is_single_level_by_default() {
        let mut store = store_3x3();
        review_inclusion(
            &mut store,
            vec![
                ReviewCommand::FlagRegion {
                    rect: rect(-1.0, -1.0, 5.0, 5.0), // site 0
                },
                ReviewCommand::FlagRegion {
                    rect: rect(5.0, 5.0, 15.0, 15.0), // site 4
                },
                // Depth 1: only the second batch is undoable.
                ReviewCommand::UnflagLast,
                ReviewCommand::UnflagLast,
                ReviewCommand::Continue,
            ],
            1,
        )
        .unwrap();
        assert!(store.well(0).flagged);
        assert!(!store.well(4).flagged);
    }

    #[test]
    fn deeper_history_unwinds_both_batches() {
        let mut store = store_3x3();
        review_inclusion(
            &mut store,
            vec![
                ReviewCommand::FlagRegion {
                    rect: rect(-1.0, -1.0, 5.0, 5.0),
                },
                ReviewCommand::FlagRegion {
                    rect: rect(5.0, 5.0, 15.0, 15.0),
                },
                ReviewCommand::UnflagLast,
                ReviewCommand::UnflagLast,
                ReviewCommand::Continue,
            ],
            2,
        )
        .unwrap();
        assert!(!store.well(0).flagged);
        assert!(!store.well(4).flagged);
    }

    #[test]
    fn undo_does_not_resurrect_prior_flags() {
        // A well flagged by batch 1 and again covered by batch 2 changed
        // state only in batch 1, so undoing batch 2 must keep it flagged.
        let mut store = store_3x3();
        review_inclusion(
            &mut store,
            vec![
                ReviewCommand::FlagRegion {
                    rect: rect(-1.0, -1.0, 11.0, 11.0), // sites 0, 1, 3, 4
                },
                ReviewCommand::FlagRegion {
                    rect: rect(-1.0, -1.0, 21.0, 21.0), // everything
                },
                ReviewCommand::UnflagLast,
                ReviewCommand::Continue,
            ],
            1,
        )
        .unwrap();
        assert!(store.well(0).flagged);
        assert!(!store.well(8).flagged);
    }

    #[test]
    fn flags_never_imply_removal() {
        let mut store = store_3x3();
        review_inclusion(
            &mut store,
            vec![
                ReviewCommand::FlagRegion {
                    rect: rect(-1.0, -1.0, 21.0, 21.0),
                },
                ReviewCommand::Continue,
            ],
            1,
        )
        .unwrap();
        assert!(store.wells().iter().all(|w| w.flagged && !w.removed));
    }

    #[test]
    fn chamber_stage_moves_chambers_only() {
        let mut store = store_3x3();
        review_chambers(
            &mut store,
            vec![
                PositionCommand::Reposition {
                    near: [20.0, 20.0],
                    to: [22.0, 19.0],
                },
                PositionCommand::Continue,
            ],
        )
        .unwrap();
        assert_eq!((store.well(8).chamber.x, store.well(8).chamber.y), (22, 19));
        assert_eq!((store.well(8).button.x, store.well(8).button.y), (20, 20));
    }

    #[test]
    fn partition_sets_are_disjoint() {
        let mut store = store_3x3();
        store.well_mut(0).chamber.autofind = true;
        store.well_mut(1).flagged = true;
        store.well_mut(2).removed = true;
        let p = chamber_partition(&store);
        assert!(p.autodetected.contains(&0));
        assert!(p.flagged.contains(&1));
        assert!(!p.manual.contains(&2) && !p.flagged.contains(&2));
        assert!(p.manual.contains(&4));
        for m in &p.autodetected {
            assert!(!p.manual.contains(m) && !p.flagged.contains(m));
        }
    }

    #[test]
    fn transcript_round_trips_through_json() {
        let t = Transcript {
            buttons: vec![
                PositionCommand::Reposition {
                    near: [1.0, 2.0],
                    to: [3.0, 4.0],
                },
                PositionCommand::Continue,
            ],
            inclusion: vec![
                ReviewCommand::FlagRegion {
                    rect: rect(0.0, 0.0, 5.0, 5.0),
                },
                ReviewCommand::Continue,
            ],
            chambers: vec![PositionCommand::Continue],
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
