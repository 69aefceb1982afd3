//! Corpus training loop.
//!
//! Each iteration is one synchronous parallel gradient step: every worker
//! clones a cheap network snapshot, samples its own batch of overlapping
//! trace windows from the symbol sequence, and runs BPTT over it; the
//! resulting gradient tensors are appended to a mutex-guarded list, averaged,
//! passed through the optimizer, and applied to the shared weights
//! single-threaded. Weights never change underneath a running worker.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::math::{one_hot_batch, GradientTensor};
use crate::optim::{AdamConfig, AdamOptimizer};
use crate::rnn::{
    Activation, Connection, LayerDef, NetworkTopology, Rnn, SliceBatch, TopologyError,
    INPUT_LAYER_ID,
};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("config field {0} must be non-zero")]
    ZeroConfig(&'static str),

    #[error("corpus yields {got} symbols, need at least {needed} for one trace window")]
    CorpusTooShort { needed: usize, got: usize },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Training-loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Timesteps per trace window (the BPTT depth).
    pub trace_length: usize,
    /// Windows per worker batch (columns of each slice batch).
    pub batch_size: usize,
    /// Gradient tensors computed in parallel per iteration.
    pub workers: usize,
    pub iterations: usize,
    /// Progress log cadence, in iterations; 0 disables progress logs.
    pub log_every: usize,
    /// Seed for weight init and batch sampling.
    pub seed: u64,
    pub optimizer: AdamConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            trace_length: 24,
            batch_size: 32,
            workers: 4,
            iterations: 1000,
            log_every: 100,
            seed: 42,
            optimizer: AdamConfig::default(),
        }
    }
}

/// The stock character-model topology: two self-recurrent tanh layers
/// feeding a softmax output as wide as the alphabet.
pub fn language_topology(num_symbols: usize) -> NetworkTopology {
    NetworkTopology {
        num_inputs: num_symbols,
        num_outputs: num_symbols,
        hidden_activation: Activation::Tanh,
        output_activation: Activation::Softmax,
        layers: vec![
            LayerDef::new(1, 64, false),
            LayerDef::new(2, 32, false),
            LayerDef::new(3, num_symbols, true),
        ],
        connections: vec![
            Connection::new(INPUT_LAYER_ID, 1, 0),
            Connection::new(1, 1, 1),
            Connection::new(1, 2, 0),
            Connection::new(2, 2, 1),
            Connection::new(2, 3, 0),
        ],
    }
}

/// Runs the parallel gradient loop over a symbol sequence.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Train a fresh network on the stock topology over `symbols`, each an
    /// index below `dim`.
    pub fn train(&self, symbols: &[usize], dim: usize) -> Result<Rnn, TrainError> {
        for (field, value) in [
            ("trace_length", self.config.trace_length),
            ("batch_size", self.config.batch_size),
            ("workers", self.config.workers),
        ] {
            if value == 0 {
                return Err(TrainError::ZeroConfig(field));
            }
        }

        let needed = self.config.trace_length + 1;
        if symbols.len() < needed {
            return Err(TrainError::CorpusTooShort {
                needed,
                got: symbols.len(),
            });
        }

        let mut network = Rnn::new(language_topology(dim), self.config.seed)?;
        let mut optimizer = AdamOptimizer::new(self.config.optimizer);
        info!(
            symbols = symbols.len(),
            params = network.weights().num_params(),
            workers = self.config.workers,
            "starting training"
        );

        for iteration in 0..self.config.iterations {
            let loss = self.step(&mut network, &mut optimizer, symbols, dim, iteration);
            if self.config.log_every > 0 && iteration % self.config.log_every == 0 {
                info!(iteration, loss, "training progress");
            }
        }

        Ok(network)
    }

    /// One parallel gradient step. Returns the mean per-symbol squared error
    /// across workers.
    pub fn step(
        &self,
        network: &mut Rnn,
        optimizer: &mut AdamOptimizer,
        symbols: &[usize],
        dim: usize,
        iteration: usize,
    ) -> f64 {
        assert!(self.config.workers > 0, "need at least one gradient worker");
        assert!(
            symbols.len() > self.config.trace_length,
            "symbol sequence shorter than one trace window"
        );

        let results: Mutex<Vec<(usize, GradientTensor, f64)>> =
            Mutex::new(Vec::with_capacity(self.config.workers));

        rayon::scope(|scope| {
            for worker in 0..self.config.workers {
                let snapshot = network.clone();
                let results = &results;
                scope.spawn(move |_| {
                    let mut rng = self.worker_rng(iteration, worker);
                    let trace = self.sample_trace(symbols, dim, &mut rng);
                    let result = snapshot.compute_gradient(&trace);
                    let mut guard = results.lock().unwrap_or_else(|e| e.into_inner());
                    guard.push((worker, result.gradient, result.loss));
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        // Append order is nondeterministic; restore worker order so the
        // floating-point average is reproducible.
        results.sort_by_key(|(worker, _, _)| *worker);

        let gradients: Vec<GradientTensor> =
            results.iter().map(|(_, g, _)| g.clone()).collect();
        let loss_sum: f64 = results.iter().map(|(_, _, l)| l).sum();

        let update = optimizer.update(&GradientTensor::average(&gradients));
        network.update_weights(&update);

        let samples = self.config.workers * self.config.batch_size * self.config.trace_length;
        loss_sum / samples as f64
    }

    /// Sample a batch of windows: slice `t` holds the batch's symbols at
    /// window position `t` one-hot, with the following symbol as target.
    fn sample_trace<R: Rng>(&self, symbols: &[usize], dim: usize, rng: &mut R) -> Vec<SliceBatch> {
        let max_start = symbols.len() - self.config.trace_length - 1;
        let starts: Vec<usize> = (0..self.config.batch_size)
            .map(|_| rng.gen_range(0..=max_start))
            .collect();

        (0..self.config.trace_length)
            .map(|t| {
                let inputs: Vec<usize> = starts.iter().map(|&s| symbols[s + t]).collect();
                let targets: Vec<usize> = starts.iter().map(|&s| symbols[s + t + 1]).collect();
                SliceBatch::new(one_hot_batch(&inputs, dim), one_hot_batch(&targets, dim))
            })
            .collect()
    }

    /// Per-worker sampling stream, decorrelated across iterations and
    /// workers but fully determined by the configured seed.
    fn worker_rng(&self, iteration: usize, worker: usize) -> StdRng {
        let stream = (iteration * self.config.workers + worker + 1) as u64;
        StdRng::seed_from_u64(self.config.seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}
