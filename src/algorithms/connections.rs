//! Connections - The synaptic connectivity graph.
//!
//! `Connections` owns every segment and synapse of a fixed population of
//! cells. Segments and synapses live in two arenas addressed by integer ids;
//! cells hold lists of segment ids and segments hold lists of synapse ids.
//! Slots of destroyed entities are recycled.
//!
//! The store enforces two capacity limits by eviction:
//!
//! - a cell holds at most `max_segments_per_cell` segments; creating one more
//!   first evicts the least recently used segment (oldest on ties),
//! - a segment holds at most `max_synapses_per_segment` synapses; creating one
//!   more first evicts the weakest synapse (oldest on ties).
//!
//! The store knows nothing about columns or timesteps beyond an iteration
//! clock that the caller advances.

use crate::error::{HtmError, Result};
use crate::types::{
    CellIdx, Permanence, Segment, Synapse, UInt, MAX_PERMANENCE, MIN_PERMANENCE,
};
use crate::utils::Random;

use ahash::{AHashMap, AHashSet};
use log::debug;
use smallvec::SmallVec;

/// Data associated with a synapse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynapseData {
    /// The presynaptic cell this synapse connects to.
    pub presynaptic_cell: CellIdx,

    /// The permanence strength of this synapse.
    pub permanence: Permanence,

    /// The segment this synapse belongs to.
    pub segment: Segment,

    /// Creation order, used to break eviction ties.
    ordinal: u64,
}

/// Data associated with a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentData {
    /// The synapses on this segment, in creation order.
    pub synapses: SmallVec<[Synapse; 32]>,

    /// The cell this segment belongs to.
    pub cell: CellIdx,

    /// Number of synapses with permanence >= the connected threshold.
    pub num_connected: UInt,

    /// Iteration at which the segment was last created, adapted or touched.
    pub last_used: u64,

    /// Creation order, used to break eviction ties.
    ordinal: u64,
}

impl SegmentData {
    fn new(cell: CellIdx, iteration: u64, ordinal: u64) -> Self {
        Self {
            synapses: SmallVec::new(),
            cell,
            num_connected: 0,
            last_used: iteration,
            ordinal,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct CellData {
    segments: SmallVec<[Segment; 8]>,
}

/// Parameters for creating a Connections instance.
#[derive(Debug, Clone)]
pub struct ConnectionsParams {
    /// Number of cells in the connections graph.
    pub num_cells: CellIdx,

    /// Permanence threshold for a synapse to be considered connected.
    pub connected_threshold: Permanence,

    /// Maximum number of segments a cell may hold.
    pub max_segments_per_cell: UInt,

    /// Maximum number of synapses a segment may hold.
    pub max_synapses_per_segment: UInt,
}

impl Default for ConnectionsParams {
    fn default() -> Self {
        Self {
            num_cells: 0,
            connected_threshold: 0.5,
            max_segments_per_cell: 255,
            max_synapses_per_segment: 255,
        }
    }
}

/// Overlap counts for every segment slot, produced by
/// [`Connections::compute_activity`].
///
/// Slots that were empty, or segments created after the computation, read as
/// zero.
#[derive(Debug, Clone, Default)]
pub struct SegmentActivity {
    connected: Vec<UInt>,
    potential: Vec<UInt>,
}

impl SegmentActivity {
    /// Number of active synapses at or above the connected threshold.
    #[inline]
    pub fn connected(&self, segment: Segment) -> UInt {
        self.connected.get(segment as usize).copied().unwrap_or(0)
    }

    /// Number of active synapses regardless of permanence.
    #[inline]
    pub fn potential(&self, segment: Segment) -> UInt {
        self.potential.get(segment as usize).copied().unwrap_or(0)
    }

    /// Segments whose connected count reaches `threshold`.
    pub fn segments_at_connected(&self, threshold: UInt) -> impl Iterator<Item = Segment> + '_ {
        self.connected
            .iter()
            .enumerate()
            .filter(move |&(_, &count)| count >= threshold)
            .map(|(segment, _)| segment as Segment)
    }

    /// Segments whose potential count reaches `threshold`.
    pub fn segments_at_potential(&self, threshold: UInt) -> impl Iterator<Item = Segment> + '_ {
        self.potential
            .iter()
            .enumerate()
            .filter(move |&(_, &count)| count >= threshold)
            .map(|(segment, _)| segment as Segment)
    }
}

/// The synaptic graph of a fixed population of cells.
#[derive(Debug, Clone)]
pub struct Connections {
    cells: Vec<CellData>,

    /// Segment arena; `None` marks a destroyed slot.
    segments: Vec<Option<SegmentData>>,
    destroyed_segments: Vec<Segment>,

    /// Synapse arena; `None` marks a destroyed slot.
    synapses: Vec<Option<SynapseData>>,
    destroyed_synapses: Vec<Synapse>,

    /// Maps presynaptic cell -> synapses from that cell.
    synapses_for_presynaptic_cell: AHashMap<CellIdx, Vec<Synapse>>,

    connected_threshold: Permanence,
    max_segments_per_cell: UInt,
    max_synapses_per_segment: UInt,

    iteration: u64,
    next_ordinal: u64,

    // Statistics
    evicted_segments: usize,
    evicted_synapses: usize,
    pruned_segments: usize,
    pruned_synapses: usize,
}

impl Connections {
    /// Creates a new Connections instance with the given parameters.
    pub fn new(params: ConnectionsParams) -> Result<Self> {
        if !params.connected_threshold.is_finite() {
            return Err(HtmError::InvalidPermanence {
                value: params.connected_threshold,
            });
        }
        if params.max_segments_per_cell == 0 {
            return Err(HtmError::InvalidParameter {
                name: "max_segments_per_cell",
                message: "Must be > 0".to_string(),
            });
        }
        if params.max_synapses_per_segment == 0 {
            return Err(HtmError::InvalidParameter {
                name: "max_synapses_per_segment",
                message: "Must be > 0".to_string(),
            });
        }

        Ok(Self {
            cells: vec![CellData::default(); params.num_cells as usize],
            segments: Vec::new(),
            destroyed_segments: Vec::new(),
            synapses: Vec::new(),
            destroyed_synapses: Vec::new(),
            synapses_for_presynaptic_cell: AHashMap::new(),
            connected_threshold: params.connected_threshold,
            max_segments_per_cell: params.max_segments_per_cell,
            max_synapses_per_segment: params.max_synapses_per_segment,
            iteration: 0,
            next_ordinal: 0,
            evicted_segments: 0,
            evicted_synapses: 0,
            pruned_segments: 0,
            pruned_synapses: 0,
        })
    }

    /// Creates a Connections instance with default parameters.
    pub fn with_cells(num_cells: CellIdx) -> Result<Self> {
        Self::new(ConnectionsParams {
            num_cells,
            ..Default::default()
        })
    }

    /// Returns the number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the connected threshold.
    #[inline]
    pub fn connected_threshold(&self) -> Permanence {
        self.connected_threshold
    }

    /// Returns the segment capacity of a cell.
    #[inline]
    pub fn max_segments_per_cell(&self) -> UInt {
        self.max_segments_per_cell
    }

    /// Returns the synapse capacity of a segment.
    #[inline]
    pub fn max_synapses_per_segment(&self) -> UInt {
        self.max_synapses_per_segment
    }

    /// Returns the current iteration.
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Advances the iteration clock used for segment eviction.
    pub fn advance_iteration(&mut self) {
        self.iteration += 1;
    }

    /// Returns the number of live segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len() - self.destroyed_segments.len()
    }

    /// Returns the number of live synapses.
    pub fn num_synapses(&self) -> usize {
        self.synapses.len() - self.destroyed_synapses.len()
    }

    /// Returns the number of segments on a cell.
    pub fn num_segments_on_cell(&self, cell: CellIdx) -> Result<usize> {
        self.check_cell(cell)?;
        Ok(self.cells[cell as usize].segments.len())
    }

    /// Returns the number of synapses on a segment.
    pub fn num_synapses_on_segment(&self, segment: Segment) -> Result<usize> {
        Ok(self.segment(segment)?.synapses.len())
    }

    /// Returns the length of the segment arena, including destroyed slots.
    pub fn segment_flat_list_length(&self) -> usize {
        self.segments.len()
    }

    /// Segments removed to make room for new ones.
    pub fn num_evicted_segments(&self) -> usize {
        self.evicted_segments
    }

    /// Synapses removed to make room for new ones.
    pub fn num_evicted_synapses(&self) -> usize {
        self.evicted_synapses
    }

    /// Segments destroyed by adaptation after losing their last synapse.
    pub fn num_pruned_segments(&self) -> usize {
        self.pruned_segments
    }

    /// Synapses destroyed by adaptation at zero permanence.
    pub fn num_pruned_synapses(&self) -> usize {
        self.pruned_synapses
    }

    /// Iterates over all live segments in arena order.
    pub fn iter_segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(segment, _)| segment as Segment)
    }

    // ========================================================================
    // Segment operations
    // ========================================================================

    /// Creates a new segment on the specified cell.
    ///
    /// If the cell is at capacity, the segment with the oldest `last_used`
    /// iteration is evicted first (lowest creation order on ties).
    pub fn create_segment(&mut self, cell: CellIdx) -> Result<Segment> {
        self.check_cell(cell)?;

        while self.cells[cell as usize].segments.len() >= self.max_segments_per_cell as usize {
            let Some(victim) = self.least_recently_used_segment(cell) else {
                break;
            };
            debug!("cell {cell} at segment capacity, evicting segment {victim}");
            self.remove_segment(victim);
            self.evicted_segments += 1;
        }

        let ordinal = self.next_ordinal();
        let data = SegmentData::new(cell, self.iteration, ordinal);
        let segment = if let Some(reuse) = self.destroyed_segments.pop() {
            self.segments[reuse as usize] = Some(data);
            reuse
        } else {
            self.segments.push(Some(data));
            (self.segments.len() - 1) as Segment
        };

        self.cells[cell as usize].segments.push(segment);
        Ok(segment)
    }

    /// Destroys a segment and all its synapses.
    pub fn destroy_segment(&mut self, segment: Segment) -> Result<()> {
        self.segment(segment)?;
        self.remove_segment(segment);
        Ok(())
    }

    /// Returns a copy of the segments on a cell, in creation order.
    pub fn segments_for_cell(&self, cell: CellIdx) -> Result<Vec<Segment>> {
        self.check_cell(cell)?;
        Ok(self.cells[cell as usize].segments.to_vec())
    }

    /// Returns the cell that owns a segment.
    pub fn cell_for_segment(&self, segment: Segment) -> Result<CellIdx> {
        Ok(self.segment(segment)?.cell)
    }

    /// Returns the segment data.
    pub fn data_for_segment(&self, segment: Segment) -> Result<&SegmentData> {
        self.segment(segment)
    }

    /// Marks a segment as used at the current iteration.
    pub fn touch_segment(&mut self, segment: Segment) -> Result<()> {
        let iteration = self.iteration;
        self.segment_mut(segment)?.last_used = iteration;
        Ok(())
    }

    fn least_recently_used_segment(&self, cell: CellIdx) -> Option<Segment> {
        self.cells[cell as usize]
            .segments
            .iter()
            .copied()
            .filter_map(|s| self.segment(s).ok().map(|data| (s, data)))
            .min_by_key(|(_, data)| (data.last_used, data.ordinal))
            .map(|(s, _)| s)
    }

    /// Removes a live segment, its synapses and its entry on the owning cell.
    fn remove_segment(&mut self, segment: Segment) {
        let Some(data) = self.segments[segment as usize].take() else {
            return;
        };

        for synapse in data.synapses {
            if let Some(syn) = self.synapses[synapse as usize].take() {
                self.unindex_synapse(synapse, syn.presynaptic_cell);
                self.destroyed_synapses.push(synapse);
            }
        }

        let cell_segments = &mut self.cells[data.cell as usize].segments;
        if let Some(pos) = cell_segments.iter().position(|&s| s == segment) {
            cell_segments.remove(pos);
        }

        self.destroyed_segments.push(segment);
    }

    // ========================================================================
    // Synapse operations
    // ========================================================================

    /// Creates a new synapse on a segment.
    ///
    /// The permanence is stored as given (it must only be finite); adaptation
    /// is what clamps permanences into `[0, 1]`. If the segment already has a
    /// synapse to `presynaptic_cell`, that synapse is returned and its
    /// permanence raised to the new value when higher, so the returned id is
    /// not necessarily a new one. If the segment is at capacity, its weakest
    /// synapse is evicted first (oldest on ties).
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        presynaptic_cell: CellIdx,
        permanence: Permanence,
    ) -> Result<Synapse> {
        if !permanence.is_finite() {
            return Err(HtmError::InvalidPermanence { value: permanence });
        }
        self.check_cell(presynaptic_cell)?;

        let existing = self
            .segment(segment)?
            .synapses
            .iter()
            .copied()
            .find(|&s| {
                self.synapse(s)
                    .is_ok_and(|data| data.presynaptic_cell == presynaptic_cell)
            });

        if let Some(existing) = existing {
            if permanence > self.synapse(existing)?.permanence {
                self.set_permanence(existing, permanence);
            }
            return Ok(existing);
        }

        while self.segment(segment)?.synapses.len() >= self.max_synapses_per_segment as usize {
            let Some(victim) = self.weakest_synapse(segment) else {
                break;
            };
            debug!("segment {segment} at synapse capacity, evicting synapse {victim}");
            self.remove_synapse(victim);
            self.evicted_synapses += 1;
        }

        let ordinal = self.next_ordinal();
        let data = SynapseData {
            presynaptic_cell,
            permanence,
            segment,
            ordinal,
        };
        let synapse = if let Some(reuse) = self.destroyed_synapses.pop() {
            self.synapses[reuse as usize] = Some(data);
            reuse
        } else {
            self.synapses.push(Some(data));
            (self.synapses.len() - 1) as Synapse
        };

        let connected = permanence >= self.connected_threshold;
        let segment_data = self.segment_mut(segment)?;
        segment_data.synapses.push(synapse);
        if connected {
            segment_data.num_connected += 1;
        }

        self.synapses_for_presynaptic_cell
            .entry(presynaptic_cell)
            .or_default()
            .push(synapse);

        Ok(synapse)
    }

    /// Destroys a synapse. The owning segment is kept even when emptied.
    pub fn destroy_synapse(&mut self, synapse: Synapse) -> Result<()> {
        self.synapse(synapse)?;
        self.remove_synapse(synapse);
        Ok(())
    }

    /// Sets a synapse's permanence, clamped to `[0, 1]`.
    pub fn update_synapse_permanence(
        &mut self,
        synapse: Synapse,
        permanence: Permanence,
    ) -> Result<()> {
        if !permanence.is_finite() {
            return Err(HtmError::InvalidPermanence { value: permanence });
        }
        self.synapse(synapse)?;
        self.set_permanence(synapse, permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE));
        Ok(())
    }

    /// Returns a copy of the synapses on a segment, in creation order.
    pub fn synapses_for_segment(&self, segment: Segment) -> Result<Vec<Synapse>> {
        Ok(self.segment(segment)?.synapses.to_vec())
    }

    /// Returns the segment that owns a synapse.
    pub fn segment_for_synapse(&self, synapse: Synapse) -> Result<Segment> {
        Ok(self.synapse(synapse)?.segment)
    }

    /// Returns a copy of the synapse data.
    pub fn synapse_data(&self, synapse: Synapse) -> Result<SynapseData> {
        self.synapse(synapse).copied()
    }

    /// Returns the presynaptic cells of a segment, in synapse order.
    pub fn presynaptic_cells_for_segment(&self, segment: Segment) -> Result<Vec<CellIdx>> {
        Ok(self
            .segment(segment)?
            .synapses
            .iter()
            .filter_map(|&s| self.synapse(s).ok())
            .map(|data| data.presynaptic_cell)
            .collect())
    }

    /// Returns all synapses whose presynaptic cell is `cell`.
    pub fn synapses_for_presynaptic_cell(&self, cell: CellIdx) -> Vec<Synapse> {
        self.synapses_for_presynaptic_cell
            .get(&cell)
            .cloned()
            .unwrap_or_default()
    }

    fn weakest_synapse(&self, segment: Segment) -> Option<Synapse> {
        self.segment(segment)
            .ok()?
            .synapses
            .iter()
            .filter_map(|&s| self.synapse(s).ok().map(|data| (s, data)))
            .min_by(|(_, a), (_, b)| {
                a.permanence
                    .total_cmp(&b.permanence)
                    .then(a.ordinal.cmp(&b.ordinal))
            })
            .map(|(s, _)| s)
    }

    /// Removes a live synapse from its segment, the index and the arena.
    fn remove_synapse(&mut self, synapse: Synapse) {
        let Some(data) = self.synapses[synapse as usize].take() else {
            return;
        };
        let was_connected = data.permanence >= self.connected_threshold;

        if let Some(segment_data) = self.segments[data.segment as usize].as_mut() {
            if let Some(pos) = segment_data.synapses.iter().position(|&s| s == synapse) {
                segment_data.synapses.remove(pos);
            }
            if was_connected {
                segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
            }
        }

        self.unindex_synapse(synapse, data.presynaptic_cell);
        self.destroyed_synapses.push(synapse);
    }

    fn unindex_synapse(&mut self, synapse: Synapse, presynaptic_cell: CellIdx) {
        if let Some(synapses) = self.synapses_for_presynaptic_cell.get_mut(&presynaptic_cell) {
            if let Some(pos) = synapses.iter().position(|&s| s == synapse) {
                synapses.swap_remove(pos);
            }
            if synapses.is_empty() {
                self.synapses_for_presynaptic_cell.remove(&presynaptic_cell);
            }
        }
    }

    /// Stores a permanence on a live synapse and keeps `num_connected` in step.
    fn set_permanence(&mut self, synapse: Synapse, permanence: Permanence) {
        let threshold = self.connected_threshold;
        let Some(data) = self.synapses[synapse as usize].as_mut() else {
            return;
        };
        let was_connected = data.permanence >= threshold;
        let is_connected = permanence >= threshold;
        data.permanence = permanence;
        let segment = data.segment;

        if was_connected != is_connected {
            if let Some(segment_data) = self.segments[segment as usize].as_mut() {
                if is_connected {
                    segment_data.num_connected += 1;
                } else {
                    segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
                }
            }
        }
    }

    // ========================================================================
    // Activity computation
    // ========================================================================

    /// Counts synapses on `segment` from `active_cells` whose permanence is at
    /// least `connected_threshold`.
    pub fn num_active_connected_synapses(
        &self,
        segment: Segment,
        active_cells: &AHashSet<CellIdx>,
        connected_threshold: Permanence,
    ) -> Result<usize> {
        Ok(self
            .segment(segment)?
            .synapses
            .iter()
            .filter_map(|&s| self.synapse(s).ok())
            .filter(|data| {
                data.permanence >= connected_threshold
                    && active_cells.contains(&data.presynaptic_cell)
            })
            .count())
    }

    /// Counts synapses on `segment` from `active_cells`, whatever their
    /// permanence.
    pub fn num_active_potential_synapses(
        &self,
        segment: Segment,
        active_cells: &AHashSet<CellIdx>,
    ) -> Result<usize> {
        Ok(self
            .segment(segment)?
            .synapses
            .iter()
            .filter_map(|&s| self.synapse(s).ok())
            .filter(|data| active_cells.contains(&data.presynaptic_cell))
            .count())
    }

    /// Computes connected and potential overlap for every segment at once.
    ///
    /// Walks the presynaptic index, so the cost is proportional to the number
    /// of synapses leaving `active_cells`. `active_cells` must not contain
    /// duplicates.
    pub fn compute_activity(&self, active_cells: &[CellIdx]) -> SegmentActivity {
        let mut connected = vec![0; self.segments.len()];
        let mut potential = vec![0; self.segments.len()];

        for cell in active_cells {
            let Some(synapses) = self.synapses_for_presynaptic_cell.get(cell) else {
                continue;
            };
            for &synapse in synapses {
                let Ok(data) = self.synapse(synapse) else {
                    continue;
                };
                let segment = data.segment as usize;
                potential[segment] += 1;
                if data.permanence >= self.connected_threshold {
                    connected[segment] += 1;
                }
            }
        }

        SegmentActivity {
            connected,
            potential,
        }
    }

    // ========================================================================
    // Learning operations
    // ========================================================================

    /// Adapts a segment toward an active context.
    ///
    /// Synapses from `active_context` gain `increment`, all others lose
    /// `decrement`; results are clamped to `[0, 1]`. Synapses that end at zero
    /// permanence are destroyed, and the segment is destroyed once it has no
    /// synapses left.
    ///
    /// Returns `true` if the segment still exists afterwards.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        active_context: &AHashSet<CellIdx>,
        increment: Permanence,
        decrement: Permanence,
    ) -> Result<bool> {
        let survived = self.update_permanences(segment, active_context, increment, decrement)?;
        if survived {
            self.touch_segment(segment)?;
        }
        Ok(survived)
    }

    /// Lowers the permanence of synapses from `active_context` by `decrement`.
    ///
    /// Pruning follows [`Connections::adapt_segment`], but the segment's
    /// `last_used` is left alone so a weakened segment stays an eviction
    /// candidate. Returns `true` if the segment still exists afterwards.
    pub fn punish_segment(
        &mut self,
        segment: Segment,
        active_context: &AHashSet<CellIdx>,
        decrement: Permanence,
    ) -> Result<bool> {
        self.update_permanences(segment, active_context, -decrement, 0.0)
    }

    fn update_permanences(
        &mut self,
        segment: Segment,
        active_context: &AHashSet<CellIdx>,
        increment: Permanence,
        decrement: Permanence,
    ) -> Result<bool> {
        for value in [increment, decrement] {
            if !value.is_finite() {
                return Err(HtmError::InvalidPermanence { value });
            }
        }

        let synapses = self.synapses_for_segment(segment)?;
        let mut synapses_to_destroy = Vec::new();

        for synapse in synapses {
            let data = self.synapse(synapse)?;
            let delta = if active_context.contains(&data.presynaptic_cell) {
                increment
            } else {
                -decrement
            };
            let new_perm = (data.permanence + delta).clamp(MIN_PERMANENCE, MAX_PERMANENCE);
            self.set_permanence(synapse, new_perm);

            if new_perm <= MIN_PERMANENCE {
                synapses_to_destroy.push(synapse);
            }
        }

        self.pruned_synapses += synapses_to_destroy.len();
        for synapse in synapses_to_destroy {
            self.remove_synapse(synapse);
        }

        if self.segment(segment)?.synapses.is_empty() {
            self.remove_segment(segment);
            self.pruned_segments += 1;
            return Ok(false);
        }

        Ok(true)
    }

    /// Grows new synapses from `segment` to growth candidates.
    ///
    /// Candidates are deduplicated, sorted and stripped of cells the segment
    /// already connects to; at most `max_new` of them (and never more than the
    /// segment capacity) are then drawn with `rng`. When the segment would
    /// overflow, its weakest existing synapses are evicted before any new one
    /// is created. Returns the number of synapses created.
    pub fn grow_synapses(
        &mut self,
        segment: Segment,
        growth_candidates: &[CellIdx],
        initial_permanence: Permanence,
        max_new: usize,
        rng: &mut Random,
    ) -> Result<usize> {
        if !initial_permanence.is_finite() {
            return Err(HtmError::InvalidPermanence {
                value: initial_permanence,
            });
        }
        for &cell in growth_candidates {
            self.check_cell(cell)?;
        }

        let existing: AHashSet<CellIdx> = self
            .presynaptic_cells_for_segment(segment)?
            .into_iter()
            .collect();

        let mut candidates = growth_candidates.to_vec();
        candidates.sort_unstable();
        candidates.dedup();
        candidates.retain(|c| !existing.contains(c));

        let limit = max_new.min(self.max_synapses_per_segment as usize);
        let mut chosen = rng.sample(candidates, limit);
        if chosen.is_empty() {
            return Ok(0);
        }
        chosen.sort_unstable();

        let current = self.segment(segment)?.synapses.len();
        let overflow = (current + chosen.len()).saturating_sub(self.max_synapses_per_segment as usize);
        for _ in 0..overflow {
            let Some(victim) = self.weakest_synapse(segment) else {
                break;
            };
            self.remove_synapse(victim);
            self.evicted_synapses += 1;
        }
        if overflow > 0 {
            debug!("segment {segment} evicted {overflow} synapses to grow {}", chosen.len());
        }

        for &cell in &chosen {
            self.create_synapse(segment, cell, initial_permanence)?;
        }

        Ok(chosen.len())
    }

    // ========================================================================
    // Lookup helpers
    // ========================================================================

    fn next_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    fn check_cell(&self, cell: CellIdx) -> Result<()> {
        if (cell as usize) < self.cells.len() {
            Ok(())
        } else {
            Err(HtmError::IndexOutOfBounds {
                index: cell as usize,
                size: self.cells.len(),
            })
        }
    }

    fn segment(&self, segment: Segment) -> Result<&SegmentData> {
        self.segments
            .get(segment as usize)
            .and_then(Option::as_ref)
            .ok_or(HtmError::SegmentNotFound(segment))
    }

    fn segment_mut(&mut self, segment: Segment) -> Result<&mut SegmentData> {
        self.segments
            .get_mut(segment as usize)
            .and_then(Option::as_mut)
            .ok_or(HtmError::SegmentNotFound(segment))
    }

    fn synapse(&self, synapse: Synapse) -> Result<&SynapseData> {
        self.synapses
            .get(synapse as usize)
            .and_then(Option::as_ref)
            .ok_or(HtmError::SynapseNotFound(synapse))
    }
}
