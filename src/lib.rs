//! charrnn: Character-Level Recurrent Network Engine
//!
//! Trains recurrent networks over arbitrary layer topologies on character
//! streams and samples text from them.
//!
//! ## Architecture
//!
//! - **Math**: Dense matrices and the canonically ordered gradient tensor
//! - **Rnn Engine**: Topology, bounded Time Memory, forward evaluation, and
//!   truncated backpropagation through time
//! - **Optimizer**: Adaptive moment estimation over gradient tensors
//! - **Trainer**: Parallel per-iteration gradient steps over corpus windows
//! - **Text / Sample**: Alphabet-restricted character streams and
//!   stochastic / beam text generation

pub mod math;
pub mod optim;
pub mod rnn;
pub mod sample;
pub mod text;
pub mod train;

// Re-export math primitives
pub use math::{GradientTensor, Matrix};

// Re-export the network engine surface
pub use rnn::{
    Activation, BpttResult, Connection, LayerDef, NetworkTopology, Rnn, RnnWeights, SliceBatch,
    TopologyError, INPUT_LAYER_ID,
};

// Re-export optimizer and trainer
pub use optim::{AdamConfig, AdamOptimizer};
pub use train::{language_topology, TrainError, Trainer, TrainerConfig};

// Re-export corpus and sampling helpers
pub use sample::{sample_beam, sample_stochastic};
pub use text::{CharacterStream, TextError};
