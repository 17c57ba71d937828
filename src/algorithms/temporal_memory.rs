//! Temporal Memory implementation.
//!
//! The Temporal Memory algorithm learns temporal sequences by forming
//! connections between cells. Each call to [`TemporalMemory::compute`] runs
//! three phases against the state cached from the previous call:
//!
//! 1. **Activation** - predicted cells of each active column become active
//!    and winners; unpredicted columns burst and elect one winner cell, which
//!    learns the previous winners as its context.
//! 2. **Reinforcement** - segments that correctly predicted their cell are
//!    strengthened toward the previous winners.
//! 3. **Prediction** - cells with a segment sufficiently connected to the new
//!    active cells become predictive for the next call.

use crate::algorithms::{Connections, ConnectionsParams, SegmentActivity};
use crate::error::{HtmError, Result};
use crate::types::{permanence_in_bounds, CellIdx, Permanence, Real, Segment, UInt};
use crate::utils::Random;

use ahash::{AHashMap, AHashSet};
use log::{debug, trace};
use smallvec::{smallvec, SmallVec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How [`ComputeOutput::prediction_count`] is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PredictionCount {
    /// Number of predictive cells.
    #[default]
    Cells,
    /// Number of predictive cells divided by cells per column.
    Columns,
}

/// Parameters for creating a Temporal Memory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemoryParams {
    /// Number of columns.
    pub column_count: UInt,

    /// Number of cells per column.
    pub cells_per_column: UInt,

    /// Active connected synapses a segment needs to make its cell predictive.
    pub activation_threshold: UInt,

    /// Active potential synapses a segment needs to be a learning match.
    pub min_threshold: UInt,

    /// Initial permanence for new synapses.
    pub initial_permanence: Permanence,

    /// Permanence threshold for connected synapses.
    pub connected_permanence: Permanence,

    /// Amount to increment permanence for active synapses.
    pub permanence_increment: Permanence,

    /// Amount to decrement permanence for inactive synapses.
    pub permanence_decrement: Permanence,

    /// Amount to decrement permanence on segments that matched but whose
    /// column did not become active. Zero disables punishment.
    pub predicted_segment_decrement: Permanence,

    /// Maximum number of new synapses added per learning step.
    pub max_new_synapse_count: UInt,

    /// Maximum number of segments per cell.
    pub max_segments_per_cell: UInt,

    /// Maximum number of synapses per segment.
    pub max_synapses_per_segment: UInt,

    /// Random seed.
    pub seed: u64,

    /// How the prediction count of each step is reported.
    pub prediction_count: PredictionCount,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            column_count: 2048,
            cells_per_column: 32,
            activation_threshold: 13,
            min_threshold: 10,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_segment_decrement: 0.0,
            max_new_synapse_count: 20,
            max_segments_per_cell: 255,
            max_synapses_per_segment: 255,
            seed: 42,
            prediction_count: PredictionCount::Cells,
        }
    }
}

impl TemporalMemoryParams {
    /// Checks every parameter, reporting the first invalid one.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("column_count", self.column_count),
            ("cells_per_column", self.cells_per_column),
            ("activation_threshold", self.activation_threshold),
            ("min_threshold", self.min_threshold),
            ("max_new_synapse_count", self.max_new_synapse_count),
            ("max_segments_per_cell", self.max_segments_per_cell),
            ("max_synapses_per_segment", self.max_synapses_per_segment),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HtmError::InvalidParameter {
                    name,
                    message: "Must be > 0".to_string(),
                });
            }
        }

        if u64::from(self.column_count) * u64::from(self.cells_per_column) > u64::from(CellIdx::MAX)
        {
            return Err(HtmError::InvalidParameter {
                name: "cells_per_column",
                message: format!(
                    "{} columns x {} cells does not fit a cell index",
                    self.column_count, self.cells_per_column
                ),
            });
        }

        let permanences = [
            ("initial_permanence", self.initial_permanence),
            ("connected_permanence", self.connected_permanence),
            ("permanence_increment", self.permanence_increment),
            ("permanence_decrement", self.permanence_decrement),
            ("predicted_segment_decrement", self.predicted_segment_decrement),
        ];
        for (name, value) in permanences {
            if !permanence_in_bounds(value) {
                return Err(HtmError::InvalidParameter {
                    name,
                    message: format!("{value} is outside [0, 1]"),
                });
            }
        }

        Ok(())
    }
}

/// Result of one [`TemporalMemory::compute`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeOutput {
    /// Fraction of active columns that were not predicted, in `[0, 1]`.
    pub anomaly_score: Real,

    /// Size of the new prediction, per [`PredictionCount`].
    pub prediction_count: Real,
}

/// What Phase 1 decided for one active column before any mutation.
enum ColumnActivation {
    /// The column holds cells predicted at the previous step.
    Predicted(SmallVec<[CellIdx; 4]>),
    /// No cell was predicted; carries the best matching segment, if any.
    Burst(Option<Segment>),
}

/// The Temporal Memory algorithm.
///
/// Temporal Memory learns sequences by forming connections between
/// cells in different columns. It maintains a prediction of which
/// cells will become active in the next time step.
///
/// # Example
///
/// ```rust
/// use sequence_memory::algorithms::{TemporalMemory, TemporalMemoryParams};
///
/// let mut tm = TemporalMemory::new(TemporalMemoryParams {
///     column_count: 100,
///     cells_per_column: 4,
///     ..Default::default()
/// })
/// .unwrap();
///
/// let out = tm.compute(&[1, 5, 10, 20], true).unwrap();
/// assert_eq!(out.anomaly_score, 1.0);
///
/// let active_cells = tm.active_cells();
/// let predictive_cells = tm.predictive_cells();
/// assert_eq!(active_cells.len(), 16);
/// assert!(predictive_cells.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct TemporalMemory {
    // Configuration
    column_count: UInt,
    cells_per_column: UInt,
    activation_threshold: UInt,
    min_threshold: UInt,
    initial_permanence: Permanence,
    connected_permanence: Permanence,
    permanence_increment: Permanence,
    permanence_decrement: Permanence,
    predicted_segment_decrement: Permanence,
    max_new_synapse_count: UInt,
    prediction_count: PredictionCount,

    connections: Connections,
    rng: Random,

    // State of the last compute, read as "previous" by the next one
    active_columns: Vec<UInt>,
    active_cells: Vec<CellIdx>,
    winner_cells: Vec<CellIdx>,
    predictive_cells: Vec<CellIdx>,
    winner_cells_for_column: AHashMap<UInt, SmallVec<[CellIdx; 4]>>,
    segment_active_for_cell: AHashMap<CellIdx, Segment>,
    matching_segments: Vec<Segment>,

    anomaly: Real,
    iteration: u64,
}

impl TemporalMemory {
    /// Creates a new Temporal Memory with the given parameters.
    pub fn new(params: TemporalMemoryParams) -> Result<Self> {
        params.validate()?;

        let num_cells = params.column_count * params.cells_per_column;
        let connections = Connections::new(ConnectionsParams {
            num_cells,
            connected_threshold: params.connected_permanence,
            max_segments_per_cell: params.max_segments_per_cell,
            max_synapses_per_segment: params.max_synapses_per_segment,
        })?;

        debug!(
            "temporal memory: {} columns x {} cells, seed {}",
            params.column_count, params.cells_per_column, params.seed
        );

        Ok(Self {
            column_count: params.column_count,
            cells_per_column: params.cells_per_column,
            activation_threshold: params.activation_threshold,
            min_threshold: params.min_threshold,
            initial_permanence: params.initial_permanence,
            connected_permanence: params.connected_permanence,
            permanence_increment: params.permanence_increment,
            permanence_decrement: params.permanence_decrement,
            predicted_segment_decrement: params.predicted_segment_decrement,
            max_new_synapse_count: params.max_new_synapse_count,
            prediction_count: params.prediction_count,

            connections,
            rng: Random::new(params.seed),

            active_columns: Vec::new(),
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            predictive_cells: Vec::new(),
            winner_cells_for_column: AHashMap::new(),
            segment_active_for_cell: AHashMap::new(),
            matching_segments: Vec::new(),

            anomaly: 0.0,
            iteration: 0,
        })
    }

    /// Main compute method.
    ///
    /// Given the active columns of this timestep, computes the active, winner
    /// and predictive cells, learning when `learn` is set. Columns may be given
    /// in any order but each at most once. Invalid input is rejected before
    /// any state changes.
    pub fn compute(&mut self, active_columns: &[UInt], learn: bool) -> Result<ComputeOutput> {
        let columns = self.validate_columns(active_columns)?;

        let prev_active_cells = std::mem::take(&mut self.active_cells);
        let prev_winner_cells = std::mem::take(&mut self.winner_cells);
        let prev_predictive_cells: AHashSet<CellIdx> =
            std::mem::take(&mut self.predictive_cells).into_iter().collect();
        let prev_segment_active_for_cell = std::mem::take(&mut self.segment_active_for_cell);
        let prev_matching_segments = std::mem::take(&mut self.matching_segments);
        self.winner_cells_for_column.clear();

        let prev_winner_set: AHashSet<CellIdx> = prev_winner_cells.iter().copied().collect();

        // Phase 1: decide every column against the previous step, then apply.
        let prev_activity = self.connections.compute_activity(&prev_active_cells);
        let activations = columns
            .iter()
            .map(|&column| self.plan_column(column, &prev_predictive_cells, &prev_activity))
            .collect::<Result<Vec<_>>>()?;

        let mut num_bursting = 0usize;
        let mut correctly_predicted = Vec::new();

        for (&column, activation) in columns.iter().zip(activations) {
            match activation {
                ColumnActivation::Predicted(cells) => {
                    self.active_cells.extend_from_slice(&cells);
                    self.winner_cells.extend_from_slice(&cells);
                    correctly_predicted.extend_from_slice(&cells);
                    self.winner_cells_for_column.insert(column, cells);
                }
                ColumnActivation::Burst(best_matching) => {
                    num_bursting += 1;
                    self.active_cells.extend(self.column_cells(column));

                    let winner = self.burst_column(
                        column,
                        best_matching,
                        &prev_winner_cells,
                        &prev_winner_set,
                        learn,
                    )?;
                    self.winner_cells.push(winner);
                    self.winner_cells_for_column.insert(column, smallvec![winner]);
                }
            }
        }

        // Phase 2: strengthen the segments that made correct predictions.
        if learn {
            for cell in &correctly_predicted {
                if let Some(&segment) = prev_segment_active_for_cell.get(cell) {
                    self.connections.adapt_segment(
                        segment,
                        &prev_winner_set,
                        self.permanence_increment,
                        self.permanence_decrement,
                    )?;
                }
            }

            if self.predicted_segment_decrement > 0.0 {
                self.punish_predicted_segments(&columns, &prev_matching_segments, &prev_active_cells)?;
            }
        }

        // Phase 3: predict the next step from the new active cells.
        self.predict(learn)?;

        self.anomaly = if columns.is_empty() {
            0.0
        } else {
            num_bursting as Real / columns.len() as Real
        };

        let prediction_count = match self.prediction_count {
            PredictionCount::Cells => self.predictive_cells.len() as Real,
            PredictionCount::Columns => {
                self.predictive_cells.len() as Real / self.cells_per_column as Real
            }
        };

        trace!(
            "step {}: {} columns, {} bursting, {} active cells, {} predictive cells",
            self.iteration,
            columns.len(),
            num_bursting,
            self.active_cells.len(),
            self.predictive_cells.len()
        );

        self.active_columns = columns;
        self.connections.advance_iteration();
        self.iteration += 1;

        Ok(ComputeOutput {
            anomaly_score: self.anomaly,
            prediction_count,
        })
    }

    /// Read-only half of Phase 1 for one column.
    fn plan_column(
        &self,
        column: UInt,
        prev_predictive_cells: &AHashSet<CellIdx>,
        prev_activity: &SegmentActivity,
    ) -> Result<ColumnActivation> {
        let predicted: SmallVec<[CellIdx; 4]> = self
            .column_cells(column)
            .filter(|cell| prev_predictive_cells.contains(cell))
            .collect();
        if !predicted.is_empty() {
            return Ok(ColumnActivation::Predicted(predicted));
        }

        let mut best: Option<(Segment, UInt)> = None;
        for cell in self.column_cells(column) {
            for segment in self.connections.segments_for_cell(cell)? {
                let overlap = prev_activity.potential(segment);
                if overlap >= self.min_threshold && best.map_or(true, |(_, score)| overlap > score)
                {
                    best = Some((segment, overlap));
                }
            }
        }

        Ok(ColumnActivation::Burst(best.map(|(segment, _)| segment)))
    }

    /// Elects the winner of a bursting column and learns on it.
    fn burst_column(
        &mut self,
        column: UInt,
        best_matching: Option<Segment>,
        prev_winner_cells: &[CellIdx],
        prev_winner_set: &AHashSet<CellIdx>,
        learn: bool,
    ) -> Result<CellIdx> {
        if let Some(segment) = best_matching {
            let cell = self.connections.cell_for_segment(segment)?;

            if learn {
                let survived = self.connections.adapt_segment(
                    segment,
                    prev_winner_set,
                    self.permanence_increment,
                    self.permanence_decrement,
                )?;

                // Growth skips cells the segment already reaches, so the full
                // budget goes to previous winners it does not cover yet.
                if survived {
                    self.connections.grow_synapses(
                        segment,
                        prev_winner_cells,
                        self.initial_permanence,
                        self.max_new_synapse_count as usize,
                        &mut self.rng,
                    )?;
                } else if !prev_winner_cells.is_empty() {
                    self.grow_new_segment(cell, prev_winner_cells)?;
                }
            }

            return Ok(cell);
        }

        let cell = self.least_used_cell(column)?;
        if learn && !prev_winner_cells.is_empty() {
            self.grow_new_segment(cell, prev_winner_cells)?;
        }
        Ok(cell)
    }

    fn grow_new_segment(&mut self, cell: CellIdx, prev_winner_cells: &[CellIdx]) -> Result<()> {
        let segment = self.connections.create_segment(cell)?;
        self.connections.grow_synapses(
            segment,
            prev_winner_cells,
            self.initial_permanence,
            self.max_new_synapse_count as usize,
            &mut self.rng,
        )?;
        Ok(())
    }

    /// Weakens segments that matched at the previous step but whose column
    /// did not become active.
    fn punish_predicted_segments(
        &mut self,
        active_columns: &[UInt],
        prev_matching_segments: &[Segment],
        prev_active_cells: &[CellIdx],
    ) -> Result<()> {
        let prev_active_set: AHashSet<CellIdx> = prev_active_cells.iter().copied().collect();

        for &segment in prev_matching_segments {
            let Ok(cell) = self.connections.cell_for_segment(segment) else {
                continue;
            };
            if active_columns.binary_search(&self.cell_column(cell)).is_ok() {
                continue;
            }
            self.connections.punish_segment(
                segment,
                &prev_active_set,
                self.predicted_segment_decrement,
            )?;
        }
        Ok(())
    }

    /// Phase 3: computes predictive cells from the current active cells.
    fn predict(&mut self, learn: bool) -> Result<()> {
        let activity = self.connections.compute_activity(&self.active_cells);

        let mut candidates: Vec<CellIdx> = activity
            .segments_at_connected(self.activation_threshold)
            .filter_map(|segment| self.connections.cell_for_segment(segment).ok())
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        for cell in candidates {
            let driving = self
                .connections
                .segments_for_cell(cell)?
                .into_iter()
                .find(|&segment| activity.connected(segment) >= self.activation_threshold);

            if let Some(segment) = driving {
                self.predictive_cells.push(cell);
                self.segment_active_for_cell.insert(cell, segment);
                if learn {
                    self.connections.touch_segment(segment)?;
                }
            }
        }

        if self.predicted_segment_decrement > 0.0 {
            self.matching_segments = activity
                .segments_at_potential(self.min_threshold)
                .filter(|&segment| self.connections.cell_for_segment(segment).is_ok())
                .collect();
        }

        Ok(())
    }

    /// Returns the cell with the fewest segments in a column.
    ///
    /// Ties are broken by a uniform draw among the tied cells.
    fn least_used_cell(&mut self, column: UInt) -> Result<CellIdx> {
        let mut fewest = usize::MAX;
        let mut tied: SmallVec<[CellIdx; 8]> = SmallVec::new();

        for cell in self.column_cells(column) {
            let num_segments = self.connections.num_segments_on_cell(cell)?;
            if num_segments < fewest {
                fewest = num_segments;
                tied.clear();
            }
            if num_segments == fewest {
                tied.push(cell);
            }
        }

        Ok(self
            .rng
            .choose(&tied)
            .copied()
            .unwrap_or_else(|| self.column_cell(column, 0)))
    }

    fn validate_columns(&self, active_columns: &[UInt]) -> Result<Vec<UInt>> {
        let mut columns = active_columns.to_vec();
        columns.sort_unstable();

        if let Some(&last) = columns.last() {
            if last >= self.column_count {
                return Err(HtmError::IndexOutOfBounds {
                    index: last as usize,
                    size: self.column_count as usize,
                });
            }
        }
        if let Some(pair) = columns.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(HtmError::InvalidInput(format!(
                "column {} appears more than once",
                pair[0]
            )));
        }

        Ok(columns)
    }

    // ========================================================================
    // Cell/Column utilities
    // ========================================================================

    /// Returns the cell index for a column and cell offset.
    #[inline]
    fn column_cell(&self, column: UInt, cell_offset: UInt) -> CellIdx {
        column * self.cells_per_column + cell_offset
    }

    /// Returns the cells of a column.
    #[inline]
    fn column_cells(&self, column: UInt) -> std::ops::Range<CellIdx> {
        let start = self.column_cell(column, 0);
        start..start + self.cells_per_column
    }

    /// Returns the column for a cell index.
    #[inline]
    fn cell_column(&self, cell: CellIdx) -> UInt {
        cell / self.cells_per_column
    }

    /// Resets the sequence state.
    ///
    /// Clears active, winner and predictive cells so the next input is treated
    /// as the start of a new sequence. Learned segments are kept.
    pub fn reset(&mut self) {
        debug!("temporal memory reset at step {}", self.iteration);
        self.active_columns.clear();
        self.active_cells.clear();
        self.winner_cells.clear();
        self.predictive_cells.clear();
        self.winner_cells_for_column.clear();
        self.segment_active_for_cell.clear();
        self.matching_segments.clear();
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.column_count as usize
    }

    /// Returns the number of cells per column.
    pub fn cells_per_column(&self) -> UInt {
        self.cells_per_column
    }

    /// Returns the total number of cells.
    pub fn num_cells(&self) -> usize {
        self.connections.num_cells()
    }

    /// Returns the active columns of the last compute, sorted.
    pub fn active_columns(&self) -> Vec<UInt> {
        self.active_columns.clone()
    }

    /// Returns the currently active cells, sorted.
    pub fn active_cells(&self) -> Vec<CellIdx> {
        self.active_cells.clone()
    }

    /// Returns the winner cells from the last compute, sorted.
    pub fn winner_cells(&self) -> Vec<CellIdx> {
        self.winner_cells.clone()
    }

    /// Returns the cells predicted for the next compute, sorted.
    pub fn predictive_cells(&self) -> Vec<CellIdx> {
        self.predictive_cells.clone()
    }

    /// Returns the columns holding at least one predictive cell, sorted.
    pub fn predicted_columns(&self) -> Vec<UInt> {
        let mut columns: Vec<UInt> = self
            .predictive_cells
            .iter()
            .map(|&cell| self.cell_column(cell))
            .collect();
        columns.dedup();
        columns
    }

    /// Returns the winner cells elected for a column in the last compute.
    pub fn winner_cells_for_column(&self, column: UInt) -> Vec<CellIdx> {
        self.winner_cells_for_column
            .get(&column)
            .map(|cells| cells.to_vec())
            .unwrap_or_default()
    }

    /// Returns the segment that made `cell` predictive, if it is predictive.
    pub fn segment_active_for_cell(&self, cell: CellIdx) -> Option<Segment> {
        self.segment_active_for_cell.get(&cell).copied()
    }

    /// Returns the segments driving the current prediction, sorted.
    pub fn active_segments(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = self.segment_active_for_cell.values().copied().collect();
        segments.sort_unstable();
        segments
    }

    /// Returns the anomaly score of the last compute.
    pub fn anomaly(&self) -> Real {
        self.anomaly
    }

    /// Returns a reference to the connections.
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Returns the activation threshold.
    pub fn activation_threshold(&self) -> UInt {
        self.activation_threshold
    }

    /// Returns the minimum threshold for matching.
    pub fn min_threshold(&self) -> UInt {
        self.min_threshold
    }

    /// Returns the initial permanence.
    pub fn initial_permanence(&self) -> Permanence {
        self.initial_permanence
    }

    /// Returns the connected permanence threshold.
    pub fn connected_permanence(&self) -> Permanence {
        self.connected_permanence
    }

    /// Returns the number of completed compute calls.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}
