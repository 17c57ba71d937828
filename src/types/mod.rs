//! Core index and value types shared by the algorithms.

mod primitives;

pub use primitives::*;
