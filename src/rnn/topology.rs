//! Static network topology: layers, activation kinds, and the network-scope
//! connection list (including recurrent, single-step-lagged connections).
//!
//! The topology is built once, validated, and then treated as immutable by
//! every other component. Connections are declared at network scope; each
//! layer later takes ownership of the weights for its incoming connections.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rnn::activation::Activation;

/// Reserved layer id meaning "the external input" — never a real layer.
pub const INPUT_LAYER_ID: u32 = 0;

/// Identity of a weighted connection between two layers.
///
/// `time_offset` is 0 when the source activation is read from the same
/// timestep and 1 when it is read from the previous timestep — the mechanism
/// that creates recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub src: u32,
    pub dst: u32,
    pub time_offset: u32,
}

impl Connection {
    pub fn new(src: u32, dst: u32, time_offset: u32) -> Self {
        Self {
            src,
            dst,
            time_offset,
        }
    }
}

/// Declaration of one layer: id, width, and whether it is the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDef {
    /// Must be >= 1; id 0 is reserved for the external input.
    pub id: u32,
    pub num_nodes: usize,
    pub is_output: bool,
}

impl LayerDef {
    pub fn new(id: u32, num_nodes: usize, is_output: bool) -> Self {
        Self {
            id,
            num_nodes,
            is_output,
        }
    }
}

/// Errors detected when validating a topology at construction time.
///
/// These are the recoverable tier: a malformed descriptor is reported to the
/// caller rather than aborting, because the descriptor is external input to
/// the engine. Traversal bugs found later, during training, are fatal.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("layer id 0 is reserved for the external input")]
    ReservedLayerId,

    #[error("duplicate layer id {0}")]
    DuplicateLayerId(u32),

    #[error("layer {0} has zero nodes")]
    EmptyLayer(u32),

    #[error("expected exactly one output layer, found {0}")]
    OutputLayerCount(usize),

    #[error("output layer has {actual} nodes but the network declares {declared} outputs")]
    OutputWidthMismatch { actual: usize, declared: usize },

    #[error("connection {src}->{dst} has time offset {offset}, expected 0 or 1")]
    BadTimeOffset { src: u32, dst: u32, offset: u32 },

    #[error("connection {src}->{dst} references unknown layer {unknown}")]
    UnknownLayer { src: u32, dst: u32, unknown: u32 },

    #[error("connection {src}->{dst} targets the reserved input id")]
    ConnectionIntoInput { src: u32, dst: u32 },

    #[error("duplicate connection {src}->{dst} (offset {offset})")]
    DuplicateConnection { src: u32, dst: u32, offset: u32 },

    #[error("layer {0} has no incoming connections")]
    DisconnectedLayer(u32),
}

/// Immutable description of a network: widths, activations, layers, and the
/// full connection list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    pub layers: Vec<LayerDef>,
    pub connections: Vec<Connection>,
}

impl NetworkTopology {
    /// Width of a layer as seen by a connection source: the input width for
    /// the reserved id, the declared node count otherwise.
    ///
    /// Panics if the id is unknown; validation guarantees this cannot happen
    /// for a connection accepted by [`Self::validate`].
    pub fn source_width(&self, layer_id: u32) -> usize {
        if layer_id == INPUT_LAYER_ID {
            return self.num_inputs;
        }
        self.layers
            .iter()
            .find(|l| l.id == layer_id)
            .map_or_else(
                || unreachable!("source_width queried for unknown layer {layer_id}"),
                |l| l.num_nodes,
            )
    }

    /// The declaration of the single output layer.
    pub fn output_layer(&self) -> &LayerDef {
        self.layers
            .iter()
            .find(|l| l.is_output)
            .map_or_else(|| unreachable!("validated topology lost its output layer"), |l| l)
    }

    /// Incoming connections of `layer_id`, in declaration order of the
    /// network-scope connection list. This order, nested inside layer
    /// declaration order, is the canonical gradient-tensor traversal order.
    pub fn incoming(&self, layer_id: u32) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.dst == layer_id)
    }

    /// Check every structural invariant of the descriptor.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.layers.iter().any(|l| l.id == INPUT_LAYER_ID) {
            return Err(TopologyError::ReservedLayerId);
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.num_nodes == 0 {
                return Err(TopologyError::EmptyLayer(layer.id));
            }
            if self.layers[..i].iter().any(|l| l.id == layer.id) {
                return Err(TopologyError::DuplicateLayerId(layer.id));
            }
        }

        let output_count = self.layers.iter().filter(|l| l.is_output).count();
        if output_count != 1 {
            return Err(TopologyError::OutputLayerCount(output_count));
        }
        let output = self.output_layer();
        if output.num_nodes != self.num_outputs {
            return Err(TopologyError::OutputWidthMismatch {
                actual: output.num_nodes,
                declared: self.num_outputs,
            });
        }

        let known = |id: u32| id == INPUT_LAYER_ID || self.layers.iter().any(|l| l.id == id);
        for (i, c) in self.connections.iter().enumerate() {
            if c.time_offset > 1 {
                return Err(TopologyError::BadTimeOffset {
                    src: c.src,
                    dst: c.dst,
                    offset: c.time_offset,
                });
            }
            if c.dst == INPUT_LAYER_ID {
                return Err(TopologyError::ConnectionIntoInput {
                    src: c.src,
                    dst: c.dst,
                });
            }
            for &end in &[c.src, c.dst] {
                if !known(end) {
                    return Err(TopologyError::UnknownLayer {
                        src: c.src,
                        dst: c.dst,
                        unknown: end,
                    });
                }
            }
            if self.connections[..i].contains(c) {
                return Err(TopologyError::DuplicateConnection {
                    src: c.src,
                    dst: c.dst,
                    offset: c.time_offset,
                });
            }
        }

        for layer in &self.layers {
            if self.incoming(layer.id).next().is_none() {
                return Err(TopologyError::DisconnectedLayer(layer.id));
            }
        }

        Ok(())
    }
}
