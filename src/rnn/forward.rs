//! Forward evaluation of all layers for one timestep.

use crate::math::Matrix;
use crate::rnn::activation::Activation;
use crate::rnn::layer::Layer;
use crate::rnn::memory::TimeSlice;
use crate::rnn::network::RnnWeights;
use crate::rnn::topology::INPUT_LAYER_ID;

/// Evaluate every layer for one timestep and return the populated slice.
///
/// Layers are processed in declaration order, which is a stable topological
/// order: only the reserved input and time-lagged edges can close cycles,
/// and lagged edges never participate in same-timestep ordering. Offset-1
/// terms read from `prev`; when there is no previous slice (the start of a
/// sequence) they contribute zero. The engine does not touch Time Memory —
/// the caller pushes the returned slice.
pub fn forward_step(
    weights: &RnnWeights,
    input: &Matrix,
    prev: Option<&TimeSlice>,
    timestamp: i64,
    temperature: f64,
) -> TimeSlice {
    assert_eq!(
        input.rows(),
        weights.topology.num_inputs,
        "input batch has {} rows, network declares {} inputs",
        input.rows(),
        weights.topology.num_inputs
    );
    assert!(input.cols() > 0, "empty input batch");
    assert!(temperature > 0.0, "softmax temperature must be positive");

    let mut slice = TimeSlice::new(timestamp, input.clone(), &weights.layers);

    for layer in &weights.layers {
        let mut incoming = Matrix::zeros(layer.num_nodes, input.cols());

        for (conn, w) in &layer.weights {
            let source = match (conn.src, conn.time_offset) {
                (INPUT_LAYER_ID, 0) => Some(&slice.input),
                (INPUT_LAYER_ID, _) => prev.map(|p| &p.input),
                (src, 0) => Some(&slice.computed_state(src).output),
                (src, _) => prev.map(|p| &p.computed_state(src).output),
            };
            if let Some(activation) = source {
                incoming.add_assign(&w.matmul(&activation.with_bias_row()));
            }
        }

        let (output, derivative) = activate(layer, &incoming, temperature);
        let state = slice.state_mut(layer.id).map_or_else(
            || unreachable!("slice missing state for layer {}", layer.id),
            |s| s,
        );
        state.output = output;
        state.derivative = derivative;
        state.computed = true;
    }

    slice
}

/// Apply the layer's activation to the summed input, returning the
/// activation and its elementwise derivative.
///
/// The output layer with softmax activation is special-cased: each batch
/// column becomes a temperature-scaled probability distribution, and the
/// stored derivative stays zero (backprop folds the softmax Jacobian into
/// the output delta instead).
fn activate(layer: &Layer, incoming: &Matrix, temperature: f64) -> (Matrix, Matrix) {
    let mut derivative = Matrix::zeros(incoming.rows(), incoming.cols());

    if layer.is_output && layer.activation == Activation::Softmax {
        let mut output = Matrix::zeros(incoming.rows(), incoming.cols());
        for c in 0..incoming.cols() {
            softmax_column(incoming, &mut output, c, temperature);
        }
        return (output, derivative);
    }

    let mut output = Matrix::zeros(incoming.rows(), incoming.cols());
    for r in 0..incoming.rows() {
        for c in 0..incoming.cols() {
            let x = incoming[(r, c)];
            let v = layer.activation.value(x);
            output[(r, c)] = v;
            derivative[(r, c)] = layer.activation.derivative(x, v);
        }
    }
    (output, derivative)
}

/// Numerically stable temperature-scaled softmax of one batch column.
fn softmax_column(incoming: &Matrix, output: &mut Matrix, col: usize, temperature: f64) {
    let mut max = f64::NEG_INFINITY;
    for r in 0..incoming.rows() {
        max = max.max(incoming[(r, col)] / temperature);
    }

    let mut sum = 0.0;
    for r in 0..incoming.rows() {
        let e = (incoming[(r, col)] / temperature - max).exp();
        output[(r, col)] = e;
        sum += e;
    }
    for r in 0..incoming.rows() {
        output[(r, col)] /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rnn::topology::{Connection, LayerDef, NetworkTopology};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_weights(seed: u64) -> RnnWeights {
        let topology = NetworkTopology {
            num_inputs: 3,
            num_outputs: 3,
            hidden_activation: Activation::Tanh,
            output_activation: Activation::Softmax,
            layers: vec![LayerDef::new(1, 5, false), LayerDef::new(2, 3, true)],
            connections: vec![
                Connection::new(INPUT_LAYER_ID, 1, 0),
                Connection::new(1, 1, 1),
                Connection::new(1, 2, 0),
            ],
        };
        let mut rng = StdRng::seed_from_u64(seed);
        RnnWeights::init(topology, &mut rng).expect("valid topology")
    }

    #[test]
    fn test_output_columns_are_distributions() {
        let weights = small_weights(11);
        let input = crate::math::matrix::one_hot_batch(&[0, 2], 3);
        let slice = forward_step(&weights, &input, None, 0, 1.0);

        let output = &slice.computed_state(2).output;
        assert_eq!(output.rows(), 3);
        assert_eq!(output.cols(), 2);
        for c in 0..2 {
            let col_sum: f64 = (0..3).map(|r| output[(r, c)]).sum();
            assert!((col_sum - 1.0).abs() < 1e-9, "column {c} sums to {col_sum}");
            assert!((0..3).all(|r| output[(r, c)] >= 0.0));
        }
    }

    #[test]
    fn test_forward_is_deterministic_per_seed() {
        let input = crate::math::matrix::one_hot_batch(&[1], 3);
        let a = forward_step(&small_weights(42), &input, None, 0, 1.0);
        let b = forward_step(&small_weights(42), &input, None, 0, 1.0);
        assert_eq!(a.computed_state(2).output, b.computed_state(2).output);
    }

    #[test]
    fn test_recurrent_term_changes_second_step() {
        let weights = small_weights(42);
        let input = crate::math::matrix::one_hot_batch(&[1], 3);

        let first = forward_step(&weights, &input, None, 0, 1.0);
        let with_history = forward_step(&weights, &input, Some(&first), 1, 1.0);
        let without_history = forward_step(&weights, &input, None, 1, 1.0);

        // Same input, but the lagged self-edge sees different history.
        assert_eq!(
            without_history.computed_state(2).output,
            first.computed_state(2).output
        );
        assert_ne!(
            with_history.computed_state(2).output,
            first.computed_state(2).output
        );
    }

    #[test]
    fn test_lower_temperature_sharpens_distribution() {
        let weights = small_weights(7);
        let input = crate::math::matrix::one_hot_batch(&[0], 3);

        let warm = forward_step(&weights, &input, None, 0, 1.0);
        let cold = forward_step(&weights, &input, None, 0, 0.2);

        let max_of = |slice: &TimeSlice| {
            let out = &slice.computed_state(2).output;
            (0..3).map(|r| out[(r, 0)]).fold(f64::MIN, f64::max)
        };
        assert!(max_of(&cold) > max_of(&warm));
    }

    #[test]
    fn test_softmax_derivative_left_zero() {
        let weights = small_weights(7);
        let input = crate::math::matrix::one_hot_batch(&[0], 3);
        let slice = forward_step(&weights, &input, None, 0, 1.0);
        assert!(slice
            .computed_state(2)
            .derivative
            .as_slice()
            .iter()
            .all(|&v| v == 0.0));
    }
}
