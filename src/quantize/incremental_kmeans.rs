//! Online k-means (also known as MacQueen's k-means).
//!
//! Samples are drawn from the histogram with probability proportional to their count and
//! each one moves its nearest centroid towards it. Every centroid has its own learning rate
//! that decreases the influence of each successive sample, so one pass (or less) over the data
//! is usually enough.

// Based upon the following paper:
//
// Thompson, S., Celebi, M.E. & Buck, K.H. Fast color quantization using MacQueen’s k-means algorithm.
// Journal of Real-Time Image Processing, vol. 17, 1609–1624, 2020.
// https://doi.org/10.1007/s11554-019-00914-6

use super::{Quantizer, Wu};
use crate::{
    Histogram, PaletteSize,
    color_map::{simd_argmin_min_distance, to_simd_chunks},
};
use alloc::{vec, vec::Vec};
use rand::{SeedableRng as _, distr::weighted::WeightedIndex, prelude::Distribution as _};
use rand_xoshiro::Xoroshiro128PlusPlus;
use wide::f32x8;

/// Online k-means quantization seeded by [`Wu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IncrementalKmeans {
    /// The maximum number of samples.
    max_samples: u32,
}

impl IncrementalKmeans {
    /// Create a new [`IncrementalKmeans`] with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { max_samples: 512 * 512 }
    }

    /// Sets the maximum number of samples drawn from the histogram.
    ///
    /// The number of samples is the smaller of this and the total pixel count.
    /// The default maximum samples is `262144`.
    #[must_use]
    pub const fn max_samples(self, max_samples: u32) -> Self {
        Self { max_samples }
    }

    /// Returns the current maximum number of samples.
    #[must_use]
    pub const fn get_max_samples(&self) -> u32 {
        self.max_samples
    }
}

impl Default for IncrementalKmeans {
    fn default() -> Self {
        Self::new()
    }
}

/// A struct holding the mutable state for online k-means.
struct State {
    /// The centroids laid out in AoSoA format.
    data: Vec<[f32x8; 3]>,
    /// The number of samples added to each centroid.
    counts: Vec<u32>,
}

impl State {
    /// Create a new [`State`] with the given initial `centroids`.
    fn new(centroids: &[[f32; 3]]) -> Self {
        Self {
            data: to_simd_chunks(centroids),
            counts: vec![0; centroids.len()],
        }
    }

    /// Add a color to the centroid at the given `chunk` and `lane`.
    #[inline]
    fn add_sample_to(&mut self, chunk: u8, lane: u8, color: [f32; 3]) {
        let i = usize::from(chunk) * 8 + usize::from(lane);

        let count = self.counts[i] + 1;
        // We use a learning rate of 0.5 => count^(-0.5)
        #[allow(clippy::cast_possible_truncation)]
        let rate = (1.0 / f64::from(count).sqrt()) as f32;

        for (c, x) in self.data[usize::from(chunk)].iter_mut().zip(color) {
            let c = &mut c.as_mut_array()[usize::from(lane)];
            *c += rate * (x - *c);
        }

        self.counts[i] = count;
    }

    /// Add a color to its nearest centroid.
    #[inline]
    fn add_sample(&mut self, color: [f32; 3]) {
        let (chunk, lane) = simd_argmin_min_distance(&self.data, color).0;
        self.add_sample_to(chunk, lane, color);
    }

    /// Returns the centroids.
    fn into_centroids(self, k: usize) -> Vec<[f32; 3]> {
        self.data
            .iter()
            .flat_map(|chunk| {
                let [r, g, b] = chunk.map(f32x8::to_array);
                (0..8).map(move |i| [r[i], g[i], b[i]])
            })
            .take(k)
            .collect()
    }
}

impl Quantizer for IncrementalKmeans {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let centroids = Wu.quantize(histogram, size, seed).to_components();
        let Ok(distribution) = WeightedIndex::new(histogram.counts()) else {
            return centroids;
        };

        let k = centroids.len();
        let mut state = State::new(&centroids);
        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let samples = histogram.total_count().min(u64::from(self.max_samples));
        let colors = histogram.colors();
        for _ in 0..samples {
            state.add_sample(crate::components(colors[distribution.sample(rng)]));
        }

        tracing::trace!(samples, k, "online k-means finished");
        state.into_centroids(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn learning_rate_decreases() {
        let mut state = State::new(&[[0.0; 3]]);
        state.add_sample([100.0; 3]);
        assert_eq!(state.counts, [1]);
        // the first sample moves the centroid all the way
        approx::assert_relative_eq!(state.data[0][0].to_array()[0], 100.0);
        state.add_sample([0.0; 3]);
        let moved = state.data[0][0].to_array()[0];
        assert!(moved > 0.0 && moved < 50.0);
    }

    #[test]
    fn sample_count_is_bounded() {
        let quantizer = IncrementalKmeans::new().max_samples(100);
        assert_eq!(quantizer.get_max_samples(), 100);
        let palette = quantizer.quantize(&colorful_histogram(), PaletteSize::from_u8_clamped(8), 0);
        assert!(!palette.is_empty());
        assert!(palette.len() <= 8);
    }
}
