//! Backpropagation through time.
//!
//! The backward engine walks a trace newest-to-oldest. At each timestep it
//! seeds the output layer's error delta (prediction − target) and drains an
//! explicit worklist keyed by `(layer id, timestamp)`, propagating deltas
//! through same-timestep connections immediately and leaving lagged
//! contributions for the outer loop's earlier iterations. Delta and weight
//! gradients are merged as running means: multiple paths into the same
//! (layer, timestep) are averaged, not summed, so gradient magnitude stays
//! timestep-invariant under softmax/cross-entropy scaling.

use std::collections::HashMap;

use crate::math::{GradientTensor, Matrix};
use crate::rnn::memory::{TimeMemory, TimeSlice};
use crate::rnn::network::RnnWeights;
use crate::rnn::topology::{Connection, INPUT_LAYER_ID};

/// One timestep of a batched training trace: the input batch and the target
/// output batch (next-symbol prediction).
#[derive(Debug, Clone)]
pub struct SliceBatch {
    pub input: Matrix,
    pub target: Matrix,
}

impl SliceBatch {
    pub fn new(input: Matrix, target: Matrix) -> Self {
        Self { input, target }
    }
}

/// Gradient tensor plus the accumulated sum-of-squared-error loss for the
/// trace it was computed from.
#[derive(Debug, Clone)]
pub struct BpttResult {
    pub gradient: GradientTensor,
    pub loss: f64,
}

/// Running mean of matrix contributions.
#[derive(Debug, Clone)]
struct MeanAccum {
    sum: Matrix,
    samples: usize,
}

impl MeanAccum {
    fn new(first: Matrix) -> Self {
        Self {
            sum: first,
            samples: 1,
        }
    }

    fn record(&mut self, contribution: &Matrix) {
        self.sum.add_assign(contribution);
        self.samples += 1;
    }

    fn mean(&self) -> Matrix {
        self.sum.scaled(1.0 / self.samples as f64)
    }
}

/// Error deltas per (layer id, timestamp).
#[derive(Debug, Default)]
struct DeltaAccum {
    entries: HashMap<(u32, i64), MeanAccum>,
}

impl DeltaAccum {
    fn record(&mut self, layer_id: u32, timestamp: i64, delta: Matrix) {
        match self.entries.get_mut(&(layer_id, timestamp)) {
            Some(accum) => accum.record(&delta),
            None => {
                self.entries.insert((layer_id, timestamp), MeanAccum::new(delta));
            }
        }
    }

    /// Mean delta for a (layer, timestamp) the worklist has queued — absence
    /// here is a traversal bug, not a truncation condition.
    fn mean(&self, layer_id: u32, timestamp: i64) -> Matrix {
        self.entries.get(&(layer_id, timestamp)).map_or_else(
            || unreachable!("no delta recorded for layer {layer_id} at t={timestamp}"),
            MeanAccum::mean,
        )
    }
}

/// Weight gradients per connection.
#[derive(Debug, Default)]
struct GradientAccum {
    entries: HashMap<Connection, MeanAccum>,
}

impl GradientAccum {
    fn record(&mut self, connection: Connection, gradient: Matrix) {
        match self.entries.get_mut(&connection) {
            Some(accum) => accum.record(&gradient),
            None => {
                self.entries.insert(connection, MeanAccum::new(gradient));
            }
        }
    }

    fn mean(&self, connection: &Connection) -> Option<Matrix> {
        self.entries.get(connection).map(MeanAccum::mean)
    }
}

/// Run a full forward + backward pass over `trace` and return per-connection
/// gradients (averaged over timesteps and batch columns) in canonical
/// traversal order, along with the summed squared output error.
pub fn compute_gradient(weights: &RnnWeights, trace: &[SliceBatch]) -> BpttResult {
    assert!(!trace.is_empty(), "cannot compute a gradient over an empty trace");
    let batch_size = trace[0].input.cols();
    assert!(batch_size > 0, "empty batch in trace");
    for slice_batch in trace {
        assert_eq!(slice_batch.input.cols(), batch_size, "ragged trace batches");
        assert_eq!(slice_batch.target.cols(), batch_size, "ragged trace targets");
    }

    // Forward pass over the whole trace; the window retains every slice.
    let mut memory = TimeMemory::new(trace.len());
    for (t, slice_batch) in trace.iter().enumerate() {
        let timestamp = t as i64;
        let prev = memory.get(timestamp - 1);
        let slice = crate::rnn::forward::forward_step(
            weights,
            &slice_batch.input,
            prev,
            timestamp,
            1.0,
        );
        memory.push(slice);
    }

    // Backward pass, newest to oldest.
    let mut delta_accum = DeltaAccum::default();
    let mut gradient_accum = GradientAccum::default();
    let mut loss = 0.0;
    for t in (0..trace.len()).rev() {
        loss += backprop_timestep(
            weights,
            &memory,
            t as i64,
            &trace[t].target,
            &mut delta_accum,
            &mut gradient_accum,
        );
    }

    // Compile the accumulated gradients into a tensor in canonical order.
    // Every connection must have been exercised during a normal step.
    let batch_scale = 1.0 / batch_size as f64;
    let mut gradient = GradientTensor::new();
    for layer in &weights.layers {
        for (conn, _) in &layer.weights {
            let Some(mean) = gradient_accum.mean(conn) else {
                panic!(
                    "connection {}->{} (offset {}) received no gradient contributions",
                    conn.src, conn.dst, conn.time_offset
                );
            };
            gradient.push(mean.scaled(batch_scale));
        }
    }

    BpttResult { gradient, loss }
}

/// Backprop one timestep: seed the output delta, then drain the worklist of
/// (layer, timestamp) entries reachable through same-timestep connections.
/// Returns the squared output error for this timestep.
fn backprop_timestep(
    weights: &RnnWeights,
    memory: &TimeMemory,
    timestamp: i64,
    target: &Matrix,
    delta_accum: &mut DeltaAccum,
    gradient_accum: &mut GradientAccum,
) -> f64 {
    let slice = memory.get(timestamp).map_or_else(
        || unreachable!("no slice recorded for trace timestep {timestamp}"),
        |s| s,
    );

    let output_layer = weights.output_layer();
    let output_delta = slice
        .computed_state(output_layer.id)
        .output
        .sub(target);
    let loss = output_delta.squared_sum();
    delta_accum.record(output_layer.id, timestamp, output_delta);

    let mut worklist: Vec<(u32, i64)> = vec![(output_layer.id, timestamp)];
    while let Some((layer_id, ts)) = worklist.pop() {
        let delta = delta_accum.mean(layer_id, ts);
        let layer = weights.layer(layer_id);

        for (conn, w) in &layer.weights {
            let src_ts = ts - i64::from(conn.time_offset);
            // A missing slice is the truncation boundary of the retained
            // window, treated as zero contribution.
            let Some(src_slice) = memory.get(src_ts) else {
                continue;
            };

            let source_output = source_activation(src_slice, conn.src);
            let weight_gradient = delta.matmul(&source_output.with_bias_row().transpose());
            gradient_accum.record(*conn, weight_gradient);

            if conn.src == INPUT_LAYER_ID {
                continue;
            }

            // Push the delta onto the source layer at its own timestep,
            // scaled by the source's stored activation derivative.
            let src_state = src_slice.computed_state(conn.src);
            let mut src_delta = w.drop_bias_column().transpose().matmul(&delta);
            src_delta.hadamard_assign(&src_state.derivative);
            delta_accum.record(conn.src, src_ts, src_delta);

            // Lagged contributions target an earlier timestep handled by the
            // outer loop in its own turn; only same-timestep edges re-enter
            // the worklist.
            if conn.time_offset == 0 {
                worklist.push((conn.src, src_ts));
            }
        }
    }

    loss
}

fn source_activation(slice: &TimeSlice, src: u32) -> Matrix {
    if src == INPUT_LAYER_ID {
        slice.input.clone()
    } else {
        slice.computed_state(src).output.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::one_hot_batch;
    use crate::rnn::activation::Activation;
    use crate::rnn::topology::{Connection, LayerDef, NetworkTopology};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn recurrent_weights(seed: u64) -> RnnWeights {
        let topology = NetworkTopology {
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
        };
        let mut rng = StdRng::seed_from_u64(seed);
        RnnWeights::init(topology, &mut rng).expect("valid topology")
    }

    fn trace_of(symbols: &[&[usize]], dim: usize) -> Vec<SliceBatch> {
        symbols
            .windows(2)
            .map(|w| SliceBatch::new(one_hot_batch(w[0], dim), one_hot_batch(w[1], dim)))
            .collect()
    }

    #[test]
    fn test_one_entry_per_connection_with_bias_shapes() {
        let weights = recurrent_weights(3);
        let trace = trace_of(&[&[0, 1], &[1, 2], &[2, 3], &[3, 0], &[0, 1]], 4);
        assert_eq!(trace.len(), 4);

        let result = compute_gradient(&weights, &trace);
        assert_eq!(result.gradient.len(), 3);
        // input -> hidden: 6 x (4 + 1)
        assert_eq!(result.gradient[0].rows(), 6);
        assert_eq!(result.gradient[0].cols(), 5);
        // hidden self edge: 6 x (6 + 1)
        assert_eq!(result.gradient[1].rows(), 6);
        assert_eq!(result.gradient[1].cols(), 7);
        // hidden -> output: 4 x (6 + 1)
        assert_eq!(result.gradient[2].rows(), 4);
        assert_eq!(result.gradient[2].cols(), 7);
        assert!(result.loss.is_finite());
        assert!(result.loss > 0.0);
    }

    #[test]
    fn test_gradient_is_deterministic() {
        let trace = trace_of(&[&[0], &[1], &[2], &[3]], 4);
        let a = compute_gradient(&recurrent_weights(9), &trace);
        let b = compute_gradient(&recurrent_weights(9), &trace);
        assert_eq!(a.gradient, b.gradient);
        assert!((a.loss - b.loss).abs() < 1e-15);
    }

    #[test]
    fn test_gradient_entries_finite() {
        let weights = recurrent_weights(5);
        let trace = trace_of(&[&[0, 3], &[1, 2], &[2, 1], &[3, 0]], 4);
        let result = compute_gradient(&weights, &trace);
        for entry in result.gradient.iter() {
            assert!(entry.is_finite());
        }
    }

    #[test]
    fn test_two_step_trace_truncates_at_window_start() {
        // At t=0 the recurrent edge's source timestep is -1, outside the
        // window: a silent zero contribution. The edge is still exercised
        // at t=1, so the gradient tensor is complete.
        let weights = recurrent_weights(5);
        let trace = trace_of(&[&[2], &[1], &[0]], 4);
        assert_eq!(trace.len(), 2);
        let result = compute_gradient(&weights, &trace);
        assert_eq!(result.gradient.len(), 3);
    }

    #[test]
    #[should_panic(expected = "received no gradient contributions")]
    fn test_unexercised_connection_is_fatal() {
        // A single-timestep trace never exercises the lagged self edge;
        // that is an invariant violation, not a recoverable condition.
        let weights = recurrent_weights(5);
        let trace = trace_of(&[&[2], &[1]], 4);
        compute_gradient(&weights, &trace);
    }
}
