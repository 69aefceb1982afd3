//! The recurrent network: shared immutable weights plus private recurrent
//! state, with the two-phase training contract (`compute_gradient` /
//! `update_weights`) and the single-step inference entry point.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::math::{GradientTensor, Matrix};
use crate::rnn::backward::{self, BpttResult, SliceBatch};
use crate::rnn::forward::forward_step;
use crate::rnn::layer::Layer;
use crate::rnn::memory::TimeMemory;
use crate::rnn::topology::{NetworkTopology, TopologyError};

/// Inference continuity window: the current slice plus the one the next
/// step's lagged edges read from.
const INFERENCE_WINDOW: usize = 2;

/// The validated topology and every layer's weight matrices.
///
/// This is the immutable half of a network. It sits behind an `Arc` inside
/// [`Rnn`], so snapshotting a network for sampling copies a pointer and the
/// small recurrent state rather than the weight matrices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RnnWeights {
    pub topology: NetworkTopology,
    pub layers: Vec<Layer>,
}

impl RnnWeights {
    /// Validate the topology and randomly initialize every connection.
    pub fn init<R: Rng>(topology: NetworkTopology, rng: &mut R) -> Result<Self, TopologyError> {
        topology.validate()?;
        let layers = topology
            .layers
            .iter()
            .map(|def| Layer::init(&topology, def, rng))
            .collect();
        Ok(Self { topology, layers })
    }

    /// The layer with the given id. Ids come from validated connections, so
    /// a miss is a traversal bug.
    pub fn layer(&self, layer_id: u32) -> &Layer {
        self.layers.iter().find(|l| l.id == layer_id).map_or_else(
            || unreachable!("no layer with id {layer_id}"),
            |l| l,
        )
    }

    /// The single output layer.
    pub fn output_layer(&self) -> &Layer {
        self.layers.iter().find(|l| l.is_output).map_or_else(
            || unreachable!("validated network lost its output layer"),
            |l| l,
        )
    }

    /// Total number of weighted connections.
    pub fn num_connections(&self) -> usize {
        self.layers.iter().map(|l| l.weights.len()).sum()
    }

    /// Total number of trainable parameters.
    pub fn num_params(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.weights.iter())
            .map(|(_, w)| w.rows() * w.cols())
            .sum()
    }
}

/// A recurrent network instance: `Arc`-shared weights and a private
/// inference window. Cloning is cheap and yields an independent recurrent
/// state over the same weights — the snapshot the samplers rely on.
#[derive(Debug, Clone)]
pub struct Rnn {
    weights: Arc<RnnWeights>,
    memory: TimeMemory,
    clock: i64,
}

impl Rnn {
    /// Build a network from a topology with seeded weight initialization.
    pub fn new(topology: NetworkTopology, seed: u64) -> Result<Self, TopologyError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self::from_weights(RnnWeights::init(topology, &mut rng)?))
    }

    pub fn from_weights(weights: RnnWeights) -> Self {
        Self {
            weights: Arc::new(weights),
            memory: TimeMemory::new(INFERENCE_WINDOW),
            clock: 0,
        }
    }

    pub fn weights(&self) -> &RnnWeights {
        &self.weights
    }

    /// Evaluate one timestep, continuing the recurrent sequence.
    ///
    /// `temperature` scales the output softmax (1.0 during training; lower
    /// sharpens, higher flattens a sampling distribution). Calling `process`
    /// repeatedly without [`Self::clear_memory`] continues the sequence.
    pub fn process(&mut self, input: &Matrix, temperature: f64) -> Matrix {
        let prev = self.memory.get(self.clock - 1);
        let slice = forward_step(&self.weights, input, prev, self.clock, temperature);
        let output = slice
            .computed_state(self.weights.output_layer().id)
            .output
            .clone();
        self.memory.push(slice);
        self.clock += 1;
        output
    }

    /// Reset recurrent continuity between independent sequences.
    pub fn clear_memory(&mut self) {
        self.memory.clear();
        self.clock = 0;
    }

    /// Run BPTT over a batched trace and return per-connection gradients in
    /// canonical order plus the summed squared output error.
    ///
    /// Does not touch the inference window: the pass builds its own
    /// Time Memory sized to the trace, so training and a paused inference
    /// sequence never interfere.
    pub fn compute_gradient(&self, trace: &[SliceBatch]) -> BpttResult {
        backward::compute_gradient(&self.weights, trace)
    }

    /// Add an update tensor to the weights in canonical traversal order.
    ///
    /// The tensor must have exactly one entry per connection with matching
    /// shape; any mismatch is a fatal misalignment.
    pub fn update_weights(&mut self, update: &GradientTensor) {
        assert_eq!(
            update.len(),
            self.weights.num_connections(),
            "update tensor has {} entries for {} connections",
            update.len(),
            self.weights.num_connections()
        );

        let weights = Arc::make_mut(&mut self.weights);
        let mut index = 0;
        for layer in &mut weights.layers {
            for (conn, w) in &mut layer.weights {
                let entry = &update[index];
                assert!(
                    w.same_shape(entry),
                    "update entry {index} shaped {}x{} for connection {}->{} expecting {}x{}",
                    entry.rows(),
                    entry.cols(),
                    conn.src,
                    conn.dst,
                    w.rows(),
                    w.cols()
                );
                w.add_assign(entry);
                index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::one_hot_batch;
    use crate::rnn::activation::Activation;
    use crate::rnn::topology::{Connection, LayerDef, INPUT_LAYER_ID};

    fn topology() -> NetworkTopology {
        NetworkTopology {
            num_inputs: 4,
            num_outputs: 4,
            hidden_activation: Activation::Tanh,
            output_activation: Activation::Softmax,
            layers: vec![LayerDef::new(1, 6, false), LayerDef::new(2, 4, true)],
            connections: vec![
                Connection::new(INPUT_LAYER_ID, 1, 0),
                Connection::new(1, 1, 1),
                Connection::new(1, 2, 0),
            ],
        }
    }

    #[test]
    fn test_process_is_reproducible_for_fixed_seed() {
        let input = one_hot_batch(&[2], 4);
        let mut a = Rnn::new(topology(), 42).expect("valid topology");
        let mut b = Rnn::new(topology(), 42).expect("valid topology");
        assert_eq!(a.process(&input, 1.0), b.process(&input, 1.0));
        assert_eq!(a.process(&input, 1.0), b.process(&input, 1.0));
    }

    #[test]
    fn test_clear_memory_restarts_sequence() {
        let input = one_hot_batch(&[1], 4);
        let mut net = Rnn::new(topology(), 7).expect("valid topology");

        let first = net.process(&input, 1.0);
        let continued = net.process(&input, 1.0);
        assert_ne!(first, continued);

        net.clear_memory();
        assert_eq!(net.process(&input, 1.0), first);
    }

    #[test]
    fn test_snapshot_state_is_independent() {
        let input = one_hot_batch(&[3], 4);
        let mut net = Rnn::new(topology(), 7).expect("valid topology");
        net.process(&input, 1.0);

        let mut snapshot = net.clone();
        let from_net = net.process(&input, 1.0);
        let from_snapshot = snapshot.process(&input, 1.0);
        // Same weights, same history: identical continuation...
        assert_eq!(from_net, from_snapshot);
        // ...but advancing one does not advance the other.
        net.process(&input, 1.0);
        assert_eq!(net.clock, 3);
        assert_eq!(snapshot.clock, 2);
    }

    #[test]
    fn test_update_weights_shifts_output() {
        let input = one_hot_batch(&[0], 4);
        let mut net = Rnn::new(topology(), 11).expect("valid topology");
        let before = net.process(&input, 1.0);
        net.clear_memory();

        let trace = vec![SliceBatch::new(
            one_hot_batch(&[0], 4),
            one_hot_batch(&[1], 4),
        ); 3];
        // A trace of identical steps still exercises every connection.
        let result = net.compute_gradient(&trace);
        let mut update = result.gradient.clone();
        update.scale_assign(-0.5);
        net.update_weights(&update);

        assert_ne!(net.process(&input, 1.0), before);
    }

    #[test]
    #[should_panic(expected = "update tensor has")]
    fn test_update_entry_count_mismatch_is_fatal() {
        let mut net = Rnn::new(topology(), 11).expect("valid topology");
        let mut truncated = GradientTensor::new();
        truncated.push(Matrix::zeros(6, 5));
        net.update_weights(&truncated);
    }

    #[test]
    #[should_panic(expected = "update entry")]
    fn test_update_shape_mismatch_is_fatal() {
        let mut net = Rnn::new(topology(), 11).expect("valid topology");
        let mut wrong = GradientTensor::new();
        wrong.push(Matrix::zeros(6, 5));
        wrong.push(Matrix::zeros(6, 7));
        wrong.push(Matrix::zeros(5, 7)); // output connection is 4 x 7
        net.update_weights(&wrong);
    }

    #[test]
    fn test_training_does_not_disturb_inference_window() {
        let input = one_hot_batch(&[2], 4);
        let mut net = Rnn::new(topology(), 3).expect("valid topology");
        net.process(&input, 1.0);

        let mut paused = net.clone();
        let trace = vec![
            SliceBatch::new(one_hot_batch(&[0], 4), one_hot_batch(&[1], 4)),
            SliceBatch::new(one_hot_batch(&[1], 4), one_hot_batch(&[2], 4)),
        ];
        net.compute_gradient(&trace);

        // The gradient pass used its own window; continuation is unchanged.
        assert_eq!(net.process(&input, 1.0), paused.process(&input, 1.0));
    }
}
