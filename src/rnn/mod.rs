//! The recurrent-network engine.
//!
//! A network is a directed, time-indexed computation graph: layers joined by
//! weighted connections, some of which read their source one timestep in the
//! past (`time_offset` 1). The pieces, leaves first:
//!
//! - [`topology`]: the static descriptor — layers, widths, activation kinds,
//!   and the network-scope connection list.
//! - [`layer`]: a layer and the weight matrices of its incoming connections.
//! - [`memory`]: the bounded, timestamp-indexed store of per-layer
//!   activations and derivatives (the BPTT window).
//! - [`forward`]: one-timestep evaluation over the layer graph.
//! - [`backward`]: backpropagation through time over a recorded trace.
//! - [`network`]: the [`Rnn`] facade tying the above together behind
//!   `process`/`clear_memory` (inference) and
//!   `compute_gradient`/`update_weights` (training).

pub mod activation;
pub mod backward;
pub mod forward;
pub mod layer;
pub mod memory;
pub mod network;
pub mod topology;

pub use activation::Activation;
pub use backward::{BpttResult, SliceBatch};
pub use memory::{TimeMemory, TimeSlice};
pub use network::{Rnn, RnnWeights};
pub use topology::{Connection, LayerDef, NetworkTopology, TopologyError, INPUT_LAYER_ID};
