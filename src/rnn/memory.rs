//! Time-indexed activation memory.
//!
//! A [`TimeSlice`] records one timestep's complete state: the input batch
//! presented at that timestep and, per layer, the post-activation output and
//! elementwise derivative. [`TimeMemory`] keeps a bounded ring of slices —
//! the BPTT window during training, a two-slice continuity window during
//! inference. A lookup for an evicted or never-created timestamp returns
//! `None`; callers treat that as a zero contribution, not an error.

use std::collections::VecDeque;

use crate::math::Matrix;
use crate::rnn::layer::Layer;

/// Per-layer recorded state within one timestep.
#[derive(Debug, Clone)]
pub struct LayerState {
    pub layer_id: u32,
    /// Post-activation output, node-count × batch-size.
    pub output: Matrix,
    /// Elementwise activation derivative, same shape as `output`.
    pub derivative: Matrix,
    /// Whether the forward pass has filled this entry in yet.
    pub computed: bool,
}

/// The complete recorded state for one timestep.
#[derive(Debug, Clone)]
pub struct TimeSlice {
    pub timestamp: i64,
    /// The input batch presented at this timestep.
    pub input: Matrix,
    states: Vec<LayerState>,
}

impl TimeSlice {
    /// Empty slice with zeroed state entries for every layer.
    pub fn new(timestamp: i64, input: Matrix, layers: &[Layer]) -> Self {
        let batch = input.cols();
        let states = layers
            .iter()
            .map(|layer| LayerState {
                layer_id: layer.id,
                output: Matrix::zeros(layer.num_nodes, batch),
                derivative: Matrix::zeros(layer.num_nodes, batch),
                computed: false,
            })
            .collect();
        Self {
            timestamp,
            input,
            states,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.input.cols()
    }

    pub fn state(&self, layer_id: u32) -> Option<&LayerState> {
        self.states.iter().find(|s| s.layer_id == layer_id)
    }

    pub fn state_mut(&mut self, layer_id: u32) -> Option<&mut LayerState> {
        self.states.iter_mut().find(|s| s.layer_id == layer_id)
    }

    /// The recorded state of `layer_id`, which must already be computed.
    /// Used where the traversal order guarantees availability; a miss is a
    /// traversal bug, not a data condition.
    pub fn computed_state(&self, layer_id: u32) -> &LayerState {
        let state = self.state(layer_id).map_or_else(
            || unreachable!("no state entry for layer {layer_id}"),
            |s| s,
        );
        assert!(
            state.computed,
            "layer {layer_id} read before the forward pass computed it"
        );
        state
    }
}

/// Fixed-capacity ring of time slices with strictly increasing timestamps.
#[derive(Debug, Clone)]
pub struct TimeMemory {
    slices: VecDeque<TimeSlice>,
    capacity: usize,
    last_timestamp: i64,
}

impl TimeMemory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "time memory capacity must be non-zero");
        Self {
            slices: VecDeque::with_capacity(capacity),
            capacity,
            last_timestamp: -1,
        }
    }

    /// Insert the next slice, evicting the oldest once at capacity.
    /// Timestamps must be non-negative and strictly increasing.
    pub fn push(&mut self, slice: TimeSlice) {
        assert!(slice.timestamp >= 0, "negative slice timestamp");
        assert!(
            slice.timestamp > self.last_timestamp,
            "timestamps must be strictly increasing: {} after {}",
            slice.timestamp,
            self.last_timestamp
        );
        self.last_timestamp = slice.timestamp;
        if self.slices.len() == self.capacity {
            self.slices.pop_front();
        }
        self.slices.push_back(slice);
    }

    /// The slice for `timestamp`, or `None` if it was evicted or never
    /// created — the caller treats absence as a zero contribution.
    pub fn get(&self, timestamp: i64) -> Option<&TimeSlice> {
        self.slices.iter().find(|s| s.timestamp == timestamp)
    }

    /// The most recently pushed slice.
    pub fn latest(&self) -> Option<&TimeSlice> {
        self.slices.back()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Drop all retained slices and reset the timestamp watermark.
    pub fn clear(&mut self) {
        self.slices.clear();
        self.last_timestamp = -1;
    }
}
