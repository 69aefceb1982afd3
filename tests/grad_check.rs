//! Numerical validation of the backward engine.
//!
//! The analytic gradient is checked against central finite differences of
//! the cross-entropy loss on a feed-forward chain. With a softmax output and
//! one-hot targets, the seeded output delta (prediction minus target) is the
//! exact loss gradient at the output pre-activation, so the comparison holds
//! to finite-difference precision.

use rand::rngs::StdRng;
use rand::SeedableRng;

use charrnn::math::one_hot_batch;
use charrnn::{
    Activation, Connection, LayerDef, NetworkTopology, Rnn, RnnWeights, SliceBatch,
    INPUT_LAYER_ID,
};

const FD_STEP: f64 = 1e-5;
const REL_TOLERANCE: f64 = 1e-3;

fn chain_topology() -> NetworkTopology {
    NetworkTopology {
        num_inputs: 4,
        num_outputs: 4,
        hidden_activation: Activation::Tanh,
        output_activation: Activation::Softmax,
        layers: vec![LayerDef::new(1, 6, false), LayerDef::new(2, 4, true)],
        connections: vec![
            Connection::new(INPUT_LAYER_ID, 1, 0),
            Connection::new(1, 2, 0),
        ],
    }
}

fn chain_trace() -> Vec<SliceBatch> {
    [(0, 1), (1, 3), (3, 2)]
        .iter()
        .map(|&(input, target)| {
            SliceBatch::new(one_hot_batch(&[input], 4), one_hot_batch(&[target], 4))
        })
        .collect()
}

/// Total cross-entropy of the trace under the given weights.
fn cross_entropy(weights: &RnnWeights, trace: &[SliceBatch]) -> f64 {
    let mut network = Rnn::from_weights(weights.clone());
    let mut loss = 0.0;
    for slice_batch in trace {
        let output = network.process(&slice_batch.input, 1.0);
        for r in 0..output.rows() {
            if slice_batch.target[(r, 0)] > 0.5 {
                loss -= output[(r, 0)].ln();
            }
        }
    }
    loss
}

/// Loss with one weight entry of one connection nudged by `delta`.
fn perturbed_loss(
    weights: &RnnWeights,
    layer_index: usize,
    weight_index: usize,
    row: usize,
    col: usize,
    delta: f64,
    trace: &[SliceBatch],
) -> f64 {
    let mut perturbed = weights.clone();
    perturbed.layers[layer_index].weights[weight_index].1[(row, col)] += delta;
    cross_entropy(&perturbed, trace)
}

#[test]
fn test_gradient_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(1_234);
    let weights = RnnWeights::init(chain_topology(), &mut rng).expect("valid topology");
    let trace = chain_trace();
    let timesteps = trace.len() as f64;

    let network = Rnn::from_weights(weights.clone());
    let result = network.compute_gradient(&trace);
    assert_eq!(result.gradient.len(), 2);

    // On this chain every connection contributes once per timestep, so the
    // running-mean gradient times the timestep count equals the derivative
    // of the summed loss.
    let mut entry = 0;
    for (layer_index, layer) in weights.layers.iter().enumerate() {
        for (weight_index, (_, w)) in layer.weights.iter().enumerate() {
            for row in 0..w.rows() {
                for col in 0..w.cols() {
                    let up = perturbed_loss(
                        &weights,
                        layer_index,
                        weight_index,
                        row,
                        col,
                        FD_STEP,
                        &trace,
                    );
                    let down = perturbed_loss(
                        &weights,
                        layer_index,
                        weight_index,
                        row,
                        col,
                        -FD_STEP,
                        &trace,
                    );
                    let numeric = (up - down) / (2.0 * FD_STEP);
                    let analytic = result.gradient[entry][(row, col)] * timesteps;

                    let scale = numeric.abs().max(analytic.abs()).max(1e-8);
                    assert!(
                        (numeric - analytic).abs() / scale < REL_TOLERANCE,
                        "entry {entry} ({row},{col}): analytic {analytic}, numeric {numeric}"
                    );
                }
            }
            entry += 1;
        }
    }
    assert_eq!(entry, result.gradient.len());
}

#[test]
fn test_recurrent_gradient_covers_every_connection() {
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
    let network = Rnn::new(topology, 77).expect("valid topology");

    let trace: Vec<SliceBatch> = [([0, 2], [1, 0]), ([1, 0], [2, 1]), ([2, 1], [0, 2]), ([0, 2], [1, 0])]
        .iter()
        .map(|&(inputs, targets)| {
            SliceBatch::new(one_hot_batch(&inputs, 3), one_hot_batch(&targets, 3))
        })
        .collect();

    let result = network.compute_gradient(&trace);
    assert_eq!(result.gradient.len(), 3);
    // Every entry is destination-nodes x (source-nodes + 1).
    assert_eq!((result.gradient[0].rows(), result.gradient[0].cols()), (5, 4));
    assert_eq!((result.gradient[1].rows(), result.gradient[1].cols()), (5, 6));
    assert_eq!((result.gradient[2].rows(), result.gradient[2].cols()), (3, 6));
    assert!(result.gradient.iter().all(charrnn::Matrix::is_finite));
    assert!(result.loss.is_finite());
}
