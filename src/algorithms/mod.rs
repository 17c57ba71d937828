//! HTM algorithms implementation.
//!
//! - **Connections**: The synaptic connectivity graph
//! - **Temporal Memory**: Learns temporal sequences over the graph

mod connections;
mod temporal_memory;

pub use connections::{
    Connections, ConnectionsParams, SegmentActivity, SegmentData, SynapseData,
};
pub use temporal_memory::{
    ComputeOutput, PredictionCount, TemporalMemory, TemporalMemoryParams,
};
