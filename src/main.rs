//! charrnn - character-level recurrent network trainer
//!
//! Trains a recurrent character model on a text corpus and prints sampled
//! text.
//!
//! # Usage
//!
//! ```bash
//! # Train on a corpus and sample 1000 characters
//! cargo run --release -- corpus.txt
//!
//! # Longer training with beam-search sampling
//! cargo run --release -- corpus.txt --iterations 50000 --beam
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use charrnn::sample::{sample_beam, sample_stochastic, DEFAULT_TEMPERATURE};
use charrnn::text::{self, CharacterStream};
use charrnn::{AdamConfig, Trainer, TrainerConfig};

/// Cap on symbols ingested from the corpus.
const MAX_TRAINING_SYMBOLS: usize = 10_000_000;

#[derive(Parser, Debug)]
#[command(name = "charrnn")]
#[command(about = "Character-level recurrent network trainer and sampler")]
#[command(version)]
struct CliArgs {
    /// Path to the training corpus (plain text)
    corpus: PathBuf,

    /// Number of training iterations (parallel gradient steps)
    #[arg(long, default_value_t = 1000)]
    iterations: usize,

    /// Timesteps per trace window (the BPTT depth)
    #[arg(long, default_value_t = 24)]
    trace_length: usize,

    /// Trace windows per worker batch
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Gradient workers per iteration
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Optimizer step size
    #[arg(long, default_value_t = 0.001)]
    learning_rate: f64,

    /// Number of characters to sample after training
    #[arg(long, default_value_t = 1000)]
    sample_chars: usize,

    /// Softmax temperature for stochastic sampling
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f64,

    /// Use beam-search sampling instead of a single stochastic trajectory
    #[arg(long)]
    beam: bool,

    /// Seed for weight initialization, batch sampling, and text sampling
    #[arg(long, default_value_t = 1234)]
    seed: u64,

    /// Progress log cadence, in iterations
    #[arg(long, default_value_t = 100)]
    log_every: usize,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut stream = CharacterStream::open(&args.corpus)
        .with_context(|| format!("opening corpus {}", args.corpus.display()))?;
    let symbols = stream
        .read_symbols(MAX_TRAINING_SYMBOLS)
        .context("reading corpus")?;
    info!(
        symbols = symbols.len(),
        alphabet = text::vector_dim(),
        "corpus loaded"
    );

    let trainer = Trainer::new(TrainerConfig {
        trace_length: args.trace_length,
        batch_size: args.batch_size,
        workers: args.workers,
        iterations: args.iterations,
        log_every: args.log_every,
        seed: args.seed,
        optimizer: AdamConfig {
            learning_rate: args.learning_rate,
            ..AdamConfig::default()
        },
    });
    let network = trainer.train(&symbols, text::vector_dim())?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let sampled = if args.beam {
        sample_beam(&network, args.sample_chars, &mut rng)
    } else {
        sample_stochastic(&network, args.sample_chars, args.temperature, &mut rng)
    };

    let rendered: String = sampled.into_iter().map(text::decode).collect();
    println!("{rendered}");

    Ok(())
}
