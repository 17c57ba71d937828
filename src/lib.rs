//! # Sequence Memory - HTM Temporal Memory in Rust
//!
//! An implementation of the learning and prediction core of Hierarchical
//! Temporal Memory (HTM): the synaptic [`Connections`](algorithms::Connections)
//! graph and the [`TemporalMemory`](algorithms::TemporalMemory) algorithm that
//! learns variable-order sequences of sparse column activations over it.
//!
//! ## Overview
//!
//! Every timestep the caller feeds the set of active columns (from an encoder or
//! a spatial pooler). The temporal memory:
//!
//! - activates the predicted cells of each active column, or bursts the column
//!   when nothing predicted it,
//! - picks one winner cell per bursting column and learns the preceding context
//!   on one of its segments,
//! - predicts which cells will become active next,
//! - reports the fraction of unpredicted columns as an anomaly score.
//!
//! Contexts are stored per segment, so the same column learns different
//! successors depending on what preceded it (`A B C` and `X B Y` coexist).
//!
//! ## Quick Start
//!
//! ```rust
//! use sequence_memory::prelude::*;
//!
//! let mut tm = TemporalMemory::new(TemporalMemoryParams {
//!     column_count: 64,
//!     cells_per_column: 4,
//!     activation_threshold: 3,
//!     min_threshold: 2,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let out = tm.compute(&[1, 5, 10, 20], true).unwrap();
//!
//! // Nothing has been learned yet, so every column bursts.
//! assert_eq!(out.anomaly_score, 1.0);
//! assert_eq!(tm.active_cells().len(), 16);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: derive `Serialize`/`Deserialize` on construction parameters

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod algorithms;
pub mod types;
pub mod utils;

/// Re-export of commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::algorithms::{
        ComputeOutput, Connections, ConnectionsParams, PredictionCount, SegmentActivity,
        SynapseData, TemporalMemory, TemporalMemoryParams,
    };
    pub use crate::error::{HtmError, Result};
    pub use crate::types::{CellIdx, Permanence, Real, Segment, Synapse, UInt};
    pub use crate::utils::Random;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library.
pub mod error {
    use crate::types::{Permanence, Segment, Synapse};
    use thiserror::Error;

    /// Main error type for sequence memory operations.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum HtmError {
        /// Invalid parameter value.
        #[error("Invalid parameter '{name}': {message}")]
        InvalidParameter {
            /// Name of the invalid parameter.
            name: &'static str,
            /// Description of the error.
            message: String,
        },

        /// A cell or column index is out of range.
        #[error("Index {index} out of bounds (size: {size})")]
        IndexOutOfBounds {
            /// The invalid index.
            index: usize,
            /// The valid size.
            size: usize,
        },

        /// The segment id is unknown or was destroyed.
        #[error("Segment {0} not found")]
        SegmentNotFound(Segment),

        /// The synapse id is unknown or was destroyed.
        #[error("Synapse {0} not found")]
        SynapseNotFound(Synapse),

        /// A permanence or permanence delta is not a finite number.
        #[error("Invalid permanence: {value}")]
        InvalidPermanence {
            /// The rejected value.
            value: Permanence,
        },

        /// Malformed compute input.
        #[error("Invalid input: {0}")]
        InvalidInput(String),
    }

    /// Result type alias using `HtmError`.
    pub type Result<T> = std::result::Result<T, HtmError>;
}

pub use error::{HtmError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = HtmError::IndexOutOfBounds { index: 12, size: 10 };
        assert_eq!(err.to_string(), "Index 12 out of bounds (size: 10)");

        let err = HtmError::SegmentNotFound(3);
        assert_eq!(err.to_string(), "Segment 3 not found");
    }
}
