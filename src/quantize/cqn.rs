use super::Quantizer;
use crate::{Histogram, PaletteSize, color_map::squared_distance, components};
use alloc::vec::Vec;
use rand::{SeedableRng as _, distr::weighted::WeightedIndex, prelude::Distribution as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The learning rate at the start of learning.
const INITIAL_RATE: f32 = 0.3;

/// The learning rate at the end of learning.
const FINAL_RATE: f32 = 0.01;

/// Frequency-sensitive competitive learning with a shrinking one dimensional neighborhood.
///
/// The winner for each sample is the neuron with the smallest distance scaled by how often it
/// has already won, which keeps all neurons in use. The winner and its neighbors along the
/// network are moved towards the sample. Learning rate and neighborhood shrink linearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorQuantizationNetwork {
    /// The number of samples to learn from.
    samples: u32,
}

impl ColorQuantizationNetwork {
    /// Create a new [`ColorQuantizationNetwork`] with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { samples: 1 << 15 }
    }

    /// Sets the number of samples drawn from the histogram.
    ///
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

impl Default for ColorQuantizationNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the index of the neuron with the smallest win weighted distance.
#[allow(clippy::cast_precision_loss)]
fn winner(neurons: &[[f32; 3]], wins: &[u32], x: [f32; 3]) -> usize {
    neurons
        .iter()
        .zip(wins)
        .map(|(&n, &w)| w as f32 * squared_distance(n, x))
        .enumerate()
        .fold((0, f32::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
        .0
}

impl Quantizer for ColorQuantizationNetwork {
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
        let Ok(distribution) = WeightedIndex::new(histogram.counts()) else {
            return Vec::new();
        };
        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let colors = histogram.colors();

        let step = if k > 1 { 255.0 / (k - 1) as f32 } else { 127.5 };
        let mut neurons = (0..k).map(|i| [i as f32 * step; 3]).collect::<Vec<_>>();
        if k == 1 {
            neurons[0] = [127.5; 3];
        }
        let mut wins = alloc::vec![1u32; k];
        let initial_radius = k as f32 / 4.0;

        let samples = self.samples.max(1);
        for t in 0..samples {
            let progress = t as f32 / samples as f32;
            let rate = INITIAL_RATE + (FINAL_RATE - INITIAL_RATE) * progress;
            let radius = initial_radius * (1.0 - progress);

            let x = components(colors[distribution.sample(rng)]);
            let w = winner(&neurons, &wins, x);
            wins[w] = wins[w].saturating_add(1);

            let reach = radius as usize;
            let lo = w.saturating_sub(reach);
            let hi = (w + reach + 1).min(k);
            for (j, n) in neurons[lo..hi].iter_mut().enumerate() {
                let d = (lo + j).abs_diff(w) as f32;
                let h = if radius > 0.0 { (-(d * d) / (2.0 * radius * radius)).exp() } else { 1.0 };
                for c in 0..3 {
                    n[c] += rate * h * (x[c] - n[c]);
                }
            }
        }

        tracing::trace!(samples, k, "competitive learning finished");
        neurons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequent_winners_are_penalized() {
        let neurons = [[0.0; 3], [100.0; 3]];
        assert_eq!(winner(&neurons, &[1, 1], [40.0; 3]), 0);
        // 3 * 40² > 1 * 60²
        assert_eq!(winner(&neurons, &[3, 1], [40.0; 3]), 1);
    }
}
