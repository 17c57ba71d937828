//! Utility modules for the sequence memory.

mod random;

pub use random::Random;
