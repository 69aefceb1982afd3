//! Text generation from a trained network.
//!
//! Both samplers work on a cheap snapshot of the caller's network (shared
//! weights, private recurrent state), so generation never disturbs a paused
//! inference or training sequence. Each step feeds the previously drawn
//! symbol one-hot (all zeros on the first step) and draws from the returned
//! output distribution.

use rand::Rng;
use tracing::debug;

use crate::math::Matrix;
use crate::rnn::Rnn;

/// Default softmax temperature for single-beam sampling; below 1.0 to favor
/// the model's stronger predictions.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

const NUM_BEAMS: usize = 100;
/// Beams are re-ranked every this many symbols.
const RESAMPLE_RATE: usize = 10;
/// Worst beams replaced per re-rank.
const RESAMPLE_DROP: usize = 30;

/// Draw `num_symbols` from a single sampled trajectory at the given softmax
/// temperature.
pub fn sample_stochastic<R: Rng>(
    network: &Rnn,
    num_symbols: usize,
    temperature: f64,
    rng: &mut R,
) -> Vec<usize> {
    let mut snapshot = network.clone();
    snapshot.clear_memory();

    let mut symbols = Vec::with_capacity(num_symbols);
    for _ in 0..num_symbols {
        let input = encode_previous(&snapshot, symbols.last().copied());
        let distribution = snapshot.process(&input, temperature);
        symbols.push(draw(&distribution, rng));
    }
    symbols
}

/// Draw `num_symbols` by running parallel sampled beams, periodically
/// replacing the lowest-likelihood beams with clones of surviving ones, and
/// returning the highest-likelihood trajectory.
pub fn sample_beam<R: Rng>(network: &Rnn, num_symbols: usize, rng: &mut R) -> Vec<usize> {
    beam_search(
        network,
        num_symbols,
        NUM_BEAMS,
        RESAMPLE_RATE,
        RESAMPLE_DROP,
        rng,
    )
}

#[derive(Clone)]
struct Beam {
    network: Rnn,
    /// Summed log probability of the drawn symbols.
    score: f64,
    symbols: Vec<usize>,
}

impl Beam {
    fn advance<R: Rng>(&mut self, rng: &mut R) {
        let input = encode_previous(&self.network, self.symbols.last().copied());
        let distribution = self.network.process(&input, 1.0);
        let symbol = draw(&distribution, rng);
        self.score += distribution[(symbol, 0)].ln();
        self.symbols.push(symbol);
    }
}

fn beam_search<R: Rng>(
    network: &Rnn,
    num_symbols: usize,
    num_beams: usize,
    resample_rate: usize,
    resample_drop: usize,
    rng: &mut R,
) -> Vec<usize> {
    assert!(num_beams > resample_drop, "resampling would drop every beam");

    let mut base = network.clone();
    base.clear_memory();
    let mut beams: Vec<Beam> = (0..num_beams)
        .map(|_| Beam {
            network: base.clone(),
            score: 0.0,
            symbols: Vec::with_capacity(num_symbols),
        })
        .collect();

    for step in 0..num_symbols {
        for beam in &mut beams {
            beam.advance(rng);
        }

        if step % resample_rate == 0 {
            beams.sort_by(|a, b| a.score.total_cmp(&b.score));
            for j in 0..resample_drop {
                let survivor = resample_drop + rng.gen_range(0..num_beams - resample_drop);
                beams[j] = beams[survivor].clone();
            }
        }
    }

    beams.sort_by(|a, b| a.score.total_cmp(&b.score));
    if let (Some(worst), Some(best)) = (beams.first(), beams.last()) {
        debug!(worst = worst.score, best = best.score, "beam score spread");
    }
    beams.pop().map_or_else(Vec::new, |best| best.symbols)
}

/// One-hot of the previous symbol, or all zeros before the first draw.
fn encode_previous(network: &Rnn, previous: Option<usize>) -> Matrix {
    let dim = network.weights().topology.num_inputs;
    let mut input = Matrix::zeros(dim, 1);
    if let Some(symbol) = previous {
        input[(symbol, 0)] = 1.0;
    }
    input
}

/// Cumulative draw from a distribution column; numerical leakage in the tail
/// falls back to a uniform pick.
fn draw<R: Rng>(distribution: &Matrix, rng: &mut R) -> usize {
    let mut r = rng.gen::<f64>();
    for symbol in 0..distribution.rows() {
        r -= distribution[(symbol, 0)];
        if r < 0.0 {
            return symbol;
        }
    }
    rng.gen_range(0..distribution.rows())
}
