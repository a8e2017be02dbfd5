//! NeuQuant neural network color quantization.
//!
//! A one dimensional Kohonen self-organizing map: every sample pulls the winning neuron and its
//! neighbors in the network towards it. Frequency and bias terms make rarely winning neurons
//! more likely to win, so all neurons end up in use. The learning rate and neighborhood radius
//! both shrink over the course of learning.

// Based upon the following paper:
//
// Dekker, A. H. Kohonen neural networks for optimal colour quantization.
// Network: Computation in Neural Systems, vol. 5, no. 3, 351–367, 1994.

use super::Quantizer;
use crate::{Histogram, PaletteSize, components};
use alloc::vec::Vec;
use rand::{SeedableRng as _, distr::weighted::WeightedIndex, prelude::Distribution as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The number of learning cycles.
const CYCLES: u32 = 100;

/// The frequency decay for each sample.
const BETA: f64 = 1.0 / 1024.0;

/// The learning rate and radius decay factor for each cycle.
const DECAY: f64 = 1.0 / 30.0;

/// NeuQuant quantization.
///
/// See the [module](self) documentation for more information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeuQuant {
    /// The number of samples to learn from.
    samples: u32,
}

impl NeuQuant {
    /// Create a new [`NeuQuant`] with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { samples: 1 << 15 }
    }

    /// Sets the number of samples drawn from the histogram.
    ///
    /// More samples give more accurate results at the cost of running time.
    /// The default number of samples is `32768`.
    #[must_use]
    pub const fn samples(self, samples: u32) -> Self {
        Self { samples }
    }

    /// Returns the current number of samples.
    #[must_use]
    pub const fn get_samples(&self) -> u32 {
        self.samples
    }
}

impl Default for NeuQuant {
    fn default() -> Self {
        Self::new()
    }
}

/// The neurons and their learning state.
struct Network {
    /// The neuron colors.
    neurons: Vec<[f64; 3]>,
    /// How often each neuron wins.
    freq: Vec<f64>,
    /// The bias of each neuron against winning.
    bias: Vec<f64>,
}

impl Network {
    /// Create a network with neurons spread along the gray diagonal.
    #[allow(clippy::cast_precision_loss)]
    fn new(k: usize) -> Self {
        let step = if k > 1 { 255.0 / (k - 1) as f64 } else { 0.0 };
        Self {
            neurons: (0..k).map(|i| [i as f64 * step; 3]).collect(),
            freq: alloc::vec![1.0 / k as f64; k],
            bias: alloc::vec![0.0; k],
        }
    }

    /// Find the winning neuron for `x`, updating the frequencies and biases.
    fn contest(&mut self, x: [f64; 3]) -> usize {
        let mut best_dist = f64::INFINITY;
        let mut best_bias_dist = f64::INFINITY;
        let mut best_bias = 0;
        for (i, n) in self.neurons.iter().enumerate() {
            let dist = (0..3).map(|c| (n[c] - x[c]).abs()).sum::<f64>();
            best_dist = best_dist.min(dist);
            let bias_dist = dist - self.bias[i];
            if bias_dist < best_bias_dist {
                best_bias_dist = bias_dist;
                best_bias = i;
            }
            let beta_freq = self.freq[i] * BETA;
            self.freq[i] -= beta_freq;
            self.bias[i] += beta_freq * 1024.0;
        }
        self.freq[best_bias] += BETA;
        self.bias[best_bias] -= 1.0;
        best_bias
    }

    /// Move the neurons within `radius` of `winner` towards `x`.
    #[allow(clippy::cast_precision_loss)]
    fn alter(&mut self, winner: usize, radius: usize, alpha: f64, x: [f64; 3]) {
        let lo = winner.saturating_sub(radius);
        let hi = (winner + radius + 1).min(self.neurons.len());
        let r2 = ((radius + 1) * (radius + 1)) as f64;
        for (j, n) in self.neurons[lo..hi].iter_mut().enumerate() {
            let d = (lo + j).abs_diff(winner) as f64;
            let a = alpha * (r2 - d * d) / r2;
            for c in 0..3 {
                n[c] += a * (x[c] - n[c]);
            }
        }
    }
}

impl Quantizer for NeuQuant {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let k = size.as_usize();
        let mut network = Network::new(k);
        let Ok(distribution) = WeightedIndex::new(histogram.counts()) else {
            return Vec::new();
        };
        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let colors = histogram.colors();

        let per_cycle = (self.samples / CYCLES).max(1);
        let mut alpha = 1.0;
        let mut radius = k as f64 / 8.0;
        for _ in 0..CYCLES {
            for _ in 0..per_cycle {
                let x = components(colors[distribution.sample(rng)]).map(f64::from);
                let winner = network.contest(x);
                network.alter(winner, radius as usize, alpha, x);
            }
            alpha -= alpha * DECAY;
            radius -= radius * DECAY;
        }

        tracing::trace!(samples = per_cycle * CYCLES, k, "neuquant finished");
        network.neurons.iter().map(|n| n.map(|c| c as f32)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn network_starts_on_gray_diagonal() {
        let network = Network::new(4);
        assert_eq!(network.neurons, [[0.0; 3], [85.0; 3], [170.0; 3], [255.0; 3]]);
    }

    #[test]
    fn winner_moves_towards_sample() {
        let mut network = Network::new(2);
        let winner = network.contest([250.0, 0.0, 0.0]);
        network.alter(winner, 0, 0.5, [250.0, 0.0, 0.0]);
        assert_eq!(winner, 0);
        approx::assert_relative_eq!(network.neurons[winner][0], 125.0);
        assert!(network.bias[winner] < 0.0);
    }

    #[test]
    fn learns_rgb() {
        let histogram = rgb_histogram();
        let size = PaletteSize::from_u8_clamped(2);
        let palette = NeuQuant::new().quantize_colors(&histogram, size, 0);
        assert_eq!(palette.len(), 2);
        assert!(palette.iter().flatten().all(|c| c.is_finite()));
    }
}
