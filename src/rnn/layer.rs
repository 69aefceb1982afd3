//! A single network layer and the weight matrices it owns.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::Matrix;
use crate::rnn::activation::Activation;
use crate::rnn::topology::{Connection, LayerDef, NetworkTopology};

/// One layer with the weights of all its incoming connections.
///
/// Weights are stored in declaration order of the topology's connection
/// list — the order every gradient-tensor producer and consumer must use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: u32,
    pub num_nodes: usize,
    pub is_output: bool,
    pub activation: Activation,
    /// Incoming connections with their weight matrices, each shaped
    /// `num_nodes × (source width + 1)`; the trailing column is the bias.
    pub weights: Vec<(Connection, Matrix)>,
}

impl Layer {
    /// Build a layer from its declaration, initializing each connection's
    /// weights uniformly in `±1/sqrt(source width + 1)`. The inverse-sqrt
    /// range keeps initial activation variance roughly scale-invariant
    /// across differently sized source layers.
    pub fn init<R: Rng>(topology: &NetworkTopology, def: &LayerDef, rng: &mut R) -> Self {
        let activation = if def.is_output {
            topology.output_activation
        } else {
            topology.hidden_activation
        };

        let weights = topology
            .incoming(def.id)
            .map(|conn| {
                let input_size = topology.source_width(conn.src) + 1;
                let range = 1.0 / (input_size as f64).sqrt();
                let matrix = Matrix::uniform(def.num_nodes, input_size, range, rng);
                (*conn, matrix)
            })
            .collect();

        Self {
            id: def.id,
            num_nodes: def.num_nodes,
            is_output: def.is_output,
            activation,
            weights,
        }
    }
}
