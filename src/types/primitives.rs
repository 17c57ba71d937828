//! Primitive type definitions for the sequence memory.
//!
//! Cells, segments and synapses are all addressed by dense integer indices.
//! These aliases keep the intent of each index visible in signatures.

/// Default unsigned integer type, used for columns and counts.
pub type UInt = u32;

/// Default floating point type, used for scores.
pub type Real = f32;

/// Index of a cell: `column * cells_per_column + offset`.
pub type CellIdx = u32;

/// Identifier of a segment in the connections arena.
pub type Segment = u32;

/// Identifier of a synapse in the connections arena.
pub type Synapse = u32;

/// Synapse permanence value.
///
/// Nominally in `[MIN_PERMANENCE, MAX_PERMANENCE]`, but only adaptation clamps it.
pub type Permanence = f32;

/// Minimum permanence value.
pub const MIN_PERMANENCE: Permanence = 0.0;

/// Maximum permanence value.
pub const MAX_PERMANENCE: Permanence = 1.0;

/// Returns true if the permanence lies inside the nominal bounds.
#[inline]
#[must_use]
pub fn permanence_in_bounds(permanence: Permanence) -> bool {
    (MIN_PERMANENCE..=MAX_PERMANENCE).contains(&permanence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sizes() {
        assert_eq!(core::mem::size_of::<CellIdx>(), 4);
        assert_eq!(core::mem::size_of::<Segment>(), 4);
        assert_eq!(core::mem::size_of::<Synapse>(), 4);
        assert_eq!(core::mem::size_of::<Permanence>(), 4);
    }

    #[test]
    fn test_permanence_bounds() {
        assert!(MIN_PERMANENCE < MAX_PERMANENCE);

        assert!(permanence_in_bounds(0.0));
        assert!(permanence_in_bounds(1.0));
        assert!(!permanence_in_bounds(-0.1));
        assert!(!permanence_in_bounds(1.01));
        assert!(!permanence_in_bounds(Permanence::NAN));
    }
}
