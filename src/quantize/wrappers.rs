//! Quantizers that wrap and refine another [`Quantizer`].

use super::{AcoOptimizer, Points, Quantizer, kmeans::lloyd};
use crate::{Histogram, Palette, PaletteSize};
use alloc::vec::Vec;

/// Refine the palette of an inner quantizer with a number of k-means (Lloyd) iterations.
///
/// # Examples
///
/// ```
/// use palettize::quantize::{KmeansRefinement, MedianCut, Quantizer};
/// # use palettize::{Histogram, PaletteSize};
/// # use palette::Srgb;
/// let quantizer = KmeansRefinement::new(MedianCut, 8);
/// # let histogram = Histogram::from_entries((0..100u8).map(|i| (Srgb::new(i, 0, 0), 1)));
/// # let palette = quantizer.quantize(&histogram, PaletteSize::from_u8_clamped(4), 0);
/// # assert_eq!(palette.len(), 4);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KmeansRefinement<Q> {
    /// The inner quantizer.
    inner: Q,
    /// The number of Lloyd iterations.
    iterations: u32,
}

impl<Q> KmeansRefinement<Q> {
    /// Wrap `inner` with the given number of refinement iterations.
    #[must_use]
    pub const fn new(inner: Q, iterations: u32) -> Self {
        Self { inner, iterations }
    }

    /// Returns the inner quantizer.
    pub const fn inner(&self) -> &Q {
        &self.inner
    }

    /// Returns the number of refinement iterations.
    #[must_use]
    pub const fn get_iterations(&self) -> u32 {
        self.iterations
    }
}

impl<Q: Quantizer> Quantizer for KmeansRefinement<Q> {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let centroids = self.inner.quantize(histogram, size, seed).to_components();
        lloyd(&Points::new(histogram), centroids, self.iterations, 0.0)
    }
}

/// Refine the palette of an inner quantizer with ant colony optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AcoRefinement<Q> {
    /// The inner quantizer.
    inner: Q,
    /// The optimizer options.
    optimizer: AcoOptimizer,
}

impl<Q> AcoRefinement<Q> {
    /// Wrap `inner` with the given optimizer.
    #[must_use]
    pub const fn new(inner: Q, optimizer: AcoOptimizer) -> Self {
        Self { inner, optimizer }
    }

    /// Returns the inner quantizer.
    pub const fn inner(&self) -> &Q {
        &self.inner
    }

    /// Returns the optimizer options.
    #[must_use]
    pub const fn get_optimizer(&self) -> AcoOptimizer {
        self.optimizer
    }
}

impl<Q: Quantizer> Quantizer for AcoRefinement<Q> {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let centroids = self.inner.quantize(histogram, size, seed).to_components();
        let optimizer = self.optimizer.seed(self.optimizer.get_seed() ^ seed);
        optimizer.optimize(histogram, centroids)
    }
}

/// Reduce the bits of each color channel before running an inner quantizer.
///
/// Colors that become equal are merged, which shrinks the histogram and speeds up slow
/// quantizers at the cost of precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitReduction<Q> {
    /// The inner quantizer.
    inner: Q,
    /// The number of low bits dropped from each channel.
    bits: u8,
}

impl<Q> BitReduction<Q> {
    /// Wrap `inner`, dropping the low `bits` of each channel.
    ///
    /// `bits` is clamped to the range `0..=7`.
    #[must_use]
    pub fn new(inner: Q, bits: u8) -> Self {
        Self { inner, bits: bits.min(7) }
    }

    /// Returns the inner quantizer.
    pub const fn inner(&self) -> &Q {
        &self.inner
    }

    /// Returns the number of low bits dropped from each channel.
    #[must_use]
    pub const fn get_bits(&self) -> u8 {
        self.bits
    }
}

impl<Q: Quantizer> Quantizer for BitReduction<Q> {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        self.inner.quantize_colors(&histogram.reduce_bits(self.bits), size, seed)
    }

    fn quantize(&self, histogram: &Histogram, size: PaletteSize, seed: u64) -> Palette {
        if histogram.len() <= size.as_usize() {
            return Palette::new_unchecked(histogram.colors().to_vec());
        }
        self.inner.quantize(&histogram.reduce_bits(self.bits), size, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        quantize::{Kmeans, MedianCut, Octree, Wu, kmeans::cost},
        tests::*,
    };
    use palette::Srgb;

    #[test]
    fn kmeans_refinement_improves_inner() {
        let histogram = colorful_histogram();
        let points = Points::new(&histogram);
        let size = PaletteSize::from_u8_clamped(16);
        let inner = MedianCut.quantize(&histogram, size, 0).to_components();
        let refined = KmeansRefinement::new(MedianCut, 4).quantize_colors(&histogram, size, 0);
        assert!(cost(&points, &refined) <= cost(&points, &inner));
    }

    #[test]
    fn wrappers_nest() {
        let quantizer = BitReduction::new(
            AcoRefinement::new(KmeansRefinement::new(Wu, 2), AcoOptimizer::new().iterations(2)),
            2,
        );
        let size = PaletteSize::from_u8_clamped(6);
        let palette = quantizer.quantize(&colorful_histogram(), size, 1);
        assert!(!palette.is_empty());
        assert!(palette.len() <= 6);

        let boxed: Box<dyn Quantizer + Send + Sync> =
            Box::new(KmeansRefinement::new(Kmeans::new(), 1));
        assert!(boxed.quantize(&rgb_histogram(), PaletteSize::from_u8_clamped(2), 0).len() <= 2);
    }

    #[test]
    fn bit_reduction_keeps_few_colors_exact() {
        let histogram = Histogram::from_entries([(Srgb::new(13, 77, 201), 3)]);
        let palette = BitReduction::new(Octree, 4).quantize(&histogram, PaletteSize::MAX, 0);
        assert_eq!(palette.as_slice(), [Srgb::new(13, 77, 201)]);
        assert_eq!(BitReduction::new(Octree, 9).get_bits(), 7);
    }
}
