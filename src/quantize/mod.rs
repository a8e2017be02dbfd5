//! Palette selection from a color [`Histogram`].
//!
//! Every algorithm implements the [`Quantizer`] trait. The provided
//! [`quantize`](Quantizer::quantize) method handles the degenerate inputs shared by all of them:
//! - An empty histogram gives an empty palette.
//! - A histogram with at most the requested number of colors gives exactly its distinct colors.
//!
//! Otherwise, the algorithm specific [`quantize_colors`](Quantizer::quantize_colors) is run and
//! its centroids are rounded, deduplicated, and truncated into a [`Palette`].
//!
//! The wrappers [`KmeansRefinement`], [`AcoRefinement`], and [`BitReduction`] are themselves
//! [`Quantizer`]s over an inner [`Quantizer`], so they can be nested to any depth.

use crate::{Histogram, Palette, PaletteSize, components};
use alloc::{boxed::Box, vec::Vec};
use rand::Rng;

mod aco;
mod adu;
mod binary_splitting;
mod bisecting_kmeans;
mod boxes;
mod cqn;
mod fuzzy_c_means;
mod gaussian_mixture;
mod incremental_kmeans;
mod kmeans;
mod median_cut;
mod neuquant;
mod octree;
pub mod pca;
mod popularity;
mod uniform;
mod variance_cut;
mod wrappers;
mod wu;

pub use aco::{AcoOptimizer, AcoQuantizer};
pub use adu::Adu;
pub use binary_splitting::BinarySplitting;
pub use bisecting_kmeans::BisectingKmeans;
pub use cqn::ColorQuantizationNetwork;
pub use fuzzy_c_means::FuzzyCMeans;
pub use gaussian_mixture::GaussianMixture;
pub use incremental_kmeans::IncrementalKmeans;
pub use kmeans::{Kmeans, KmeansInit, KmeansOptions};
pub use median_cut::MedianCut;
pub use neuquant::NeuQuant;
pub use octree::Octree;
pub use pca::PcaQuantizer;
pub use popularity::Popularity;
pub use uniform::Uniform;
pub use variance_cut::VarianceCut;
pub use wrappers::{AcoRefinement, BitReduction, KmeansRefinement};
pub use wu::Wu;

/// A color quantization algorithm: chooses a palette for a histogram of colors.
///
/// # Examples
///
/// ```
/// use palettize::{Histogram, PaletteSize, quantize::{Quantizer, Wu, KmeansRefinement}};
/// use palette::Srgb;
///
/// let histogram = Histogram::from_entries((0..=255u8).map(|i| (Srgb::new(i, i, 255 - i), 1)));
/// let size = PaletteSize::from_u8_clamped(8);
///
/// let palette = KmeansRefinement::new(Wu, 4).quantize(&histogram, size, 0);
/// assert!(palette.len() <= 8);
/// ```
pub trait Quantizer {
    /// Compute the palette centroids for a histogram with more than `size` colors.
    ///
    /// Centroids are sRGB components in the `0.0..=255.0` range. At most `size` centroids should
    /// be returned. The result must only depend on the inputs, including `seed`.
    fn quantize_colors(&self, histogram: &Histogram, size: PaletteSize, seed: u64)
    -> Vec<[f32; 3]>;

    /// Compute a palette with at most `size` colors for `histogram`.
    ///
    /// This never panics and never invents colors when the histogram has `size` or fewer colors.
    fn quantize(&self, histogram: &Histogram, size: PaletteSize, seed: u64) -> Palette {
        if histogram.len() <= size.as_usize() {
            return Palette::new_unchecked(histogram.colors().to_vec());
        }
        let palette = Palette::from_centroids(self.quantize_colors(histogram, size, seed), size);
        if palette.is_empty() {
            Palette::new_unchecked(histogram.most_common().into_iter().collect())
        } else {
            palette
        }
    }
}

impl<Q: Quantizer + ?Sized> Quantizer for &Q {
    #[inline]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        (**self).quantize_colors(histogram, size, seed)
    }

    #[inline]
    fn quantize(&self, histogram: &Histogram, size: PaletteSize, seed: u64) -> Palette {
        (**self).quantize(histogram, size, seed)
    }
}

impl<Q: Quantizer + ?Sized> Quantizer for Box<Q> {
    #[inline]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        (**self).quantize_colors(histogram, size, seed)
    }

    #[inline]
    fn quantize(&self, histogram: &Histogram, size: PaletteSize, seed: u64) -> Palette {
        (**self).quantize(histogram, size, seed)
    }
}

/// The colors of a histogram as weighted points.
#[derive(Debug, Clone, Default)]
pub(crate) struct Points {
    /// The colors as sRGB components.
    pub colors: Vec<[f32; 3]>,
    /// The weight (count) of each color.
    pub weights: Vec<f32>,
}

impl Points {
    /// Create [`Points`] from the entries of a histogram.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(histogram: &Histogram) -> Self {
        let (colors, weights) = histogram
            .iter()
            .map(|(color, count)| (components(color), count as f32))
            .unzip();
        Self { colors, weights }
    }

    /// Create [`Points`] from a histogram sampled down to at most `max_size` entries.
    pub fn sampled(histogram: &Histogram, max_size: usize, seed: u64) -> Self {
        Self::new(&histogram.sample(max_size, seed))
    }

    /// Returns the points at the given indices.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            colors: indices.iter().map(|&i| self.colors[i]).collect(),
            weights: indices.iter().map(|&i| self.weights[i]).collect(),
        }
    }

    /// Returns the number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns the total weight of the points.
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().map(|&w| f64::from(w)).sum()
    }

    /// Returns the moments of the points at the given indices.
    pub fn moments(&self, indices: impl IntoIterator<Item = usize>) -> Moments {
        let mut moments = Moments::default();
        for i in indices {
            moments.add(self.colors[i], self.weights[i]);
        }
        moments
    }

    /// Returns the moments of all points.
    pub fn total_moments(&self) -> Moments {
        self.moments(0..self.len())
    }
}

/// Weighted first and second order moments of a set of points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Moments {
    /// The total weight.
    pub weight: f64,
    /// The weighted sum of each component.
    pub sum: [f64; 3],
    /// The weighted sum of the squared norm.
    pub sum_squared: f64,
}

impl Moments {
    /// Add a point with the given weight.
    #[inline]
    pub fn add(&mut self, color: [f32; 3], weight: f32) {
        let w = f64::from(weight);
        self.weight += w;
        for (s, &c) in self.sum.iter_mut().zip(&color) {
            *s += w * f64::from(c);
        }
        self.sum_squared += w * color.iter().map(|&c| f64::from(c) * f64::from(c)).sum::<f64>();
    }

    /// Returns the weighted mean, or `None` if the weight is zero.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn mean(&self) -> Option<[f32; 3]> {
        (self.weight > 0.0).then(|| self.sum.map(|s| (s / self.weight) as f32))
    }

    /// Returns the weighted sum of squared distances to the mean.
    #[inline]
    pub fn sse(&self) -> f64 {
        if self.weight > 0.0 {
            let norm = self.sum.iter().map(|s| s * s).sum::<f64>();
            (self.sum_squared - norm / self.weight).max(0.0)
        } else {
            0.0
        }
    }
}

/// Pick an index with probability proportional to its weight.
///
/// Returns `None` if all weights are zero.
pub(crate) fn weighted_choice(rng: &mut impl Rng, weights: &[f64]) -> Option<usize> {
    let total = weights.iter().sum::<f64>();
    if !(total > 0.0) {
        return None;
    }
    let mut target = rng.random::<f64>() * total;
    for (i, &w) in weights.iter().enumerate() {
        if target < w {
            return Some(i);
        }
        target -= w;
    }
    weights.iter().rposition(|&w| w > 0.0)
}

/// Choose `k` initial centroids from `points` using weighted k-means++ seeding.
///
/// Fewer than `k` centroids are returned only if there are fewer than `k` distinct points.
pub(crate) fn kmeans_plus_plus(points: &Points, k: usize, rng: &mut impl Rng) -> Vec<[f32; 3]> {
    let mut centroids = Vec::with_capacity(k);
    let weights = points.weights.iter().map(|&w| f64::from(w)).collect::<Vec<_>>();
    let Some(first) = weighted_choice(rng, &weights) else {
        return centroids;
    };
    centroids.push(points.colors[first]);

    let mut min_dist = points
        .colors
        .iter()
        .map(|&c| f64::from(crate::color_map::squared_distance(c, points.colors[first])))
        .collect::<Vec<_>>();

    while centroids.len() < k {
        let scores = min_dist
            .iter()
            .zip(&weights)
            .map(|(d, w)| d * w)
            .collect::<Vec<_>>();
        let Some(next) = weighted_choice(rng, &scores) else {
            break;
        };
        let centroid = points.colors[next];
        centroids.push(centroid);
        for (d, &c) in min_dist.iter_mut().zip(&points.colors) {
            *d = d.min(f64::from(crate::color_map::squared_distance(c, centroid)));
        }
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use approx::assert_relative_eq;
    use palette::Srgb;
    use rand::SeedableRng as _;
    use rand_xoshiro::Xoroshiro128PlusPlus;

    /// Every quantizer paired with a name.
    fn all_quantizers() -> Vec<(&'static str, Box<dyn Quantizer>)> {
        vec![
            ("uniform", Box::new(Uniform)),
            ("popularity", Box::new(Popularity::new())),
            ("octree", Box::new(Octree)),
            ("median_cut", Box::new(MedianCut)),
            ("variance_cut", Box::new(VarianceCut)),
            ("wu", Box::new(Wu)),
            ("binary_splitting", Box::new(BinarySplitting)),
            ("kmeans", Box::new(Kmeans::new())),
            ("bisecting_kmeans", Box::new(BisectingKmeans::new())),
            ("incremental_kmeans", Box::new(IncrementalKmeans::new())),
            ("fuzzy_c_means", Box::new(FuzzyCMeans::new())),
            ("gaussian_mixture", Box::new(GaussianMixture::new())),
            ("neuquant", Box::new(NeuQuant::new())),
            ("cqn", Box::new(ColorQuantizationNetwork::new())),
            ("adu", Box::new(Adu::new())),
            ("pca", Box::new(PcaQuantizer)),
            ("aco", Box::new(AcoQuantizer::new())),
            ("kmeans_refinement", Box::new(KmeansRefinement::new(Wu, 3))),
            ("aco_refinement", Box::new(AcoRefinement::new(MedianCut, AcoOptimizer::new()))),
            ("bit_reduction", Box::new(BitReduction::new(Octree, 3))),
        ]
    }

    #[test]
    fn palette_size_is_bounded() {
        let histogram = colorful_histogram();
        for (name, quantizer) in all_quantizers() {
            for size in [1, 2, 7, 16, 256] {
                let size = PaletteSize::from_usize_clamped(size);
                let palette = quantizer.quantize(&histogram, size, 1);
                assert!(!palette.is_empty(), "{name}");
                assert!(palette.len() <= size.as_usize(), "{name}");
            }
        }
    }

    #[test]
    fn degenerate_histograms() {
        let red = Histogram::from_entries([(RED, 5)]);
        for (name, quantizer) in all_quantizers() {
            let size = PaletteSize::from_u8_clamped(4);
            assert!(quantizer.quantize(&Histogram::default(), size, 0).is_empty(), "{name}");
            assert_eq!(quantizer.quantize(&red, size, 0).as_slice(), [RED], "{name}");
        }
    }

    #[test]
    fn three_equal_colors_are_kept() {
        let histogram = rgb_histogram();
        for (name, quantizer) in all_quantizers() {
            let palette = quantizer.quantize(&histogram, PaletteSize::from_u8_clamped(3), 0);
            for color in [RED, GREEN, BLUE] {
                assert!(contains_near(&palette, color, 30.0), "{name}");
            }
        }
    }

    #[test]
    fn dominant_color_is_included() {
        let dominant = Srgb::new(200, 40, 90);
        let histogram = dominant_histogram(dominant);
        for (name, quantizer) in all_quantizers() {
            if name == "uniform" {
                continue;
            }
            for size in [2, 4, 16] {
                let palette =
                    quantizer.quantize(&histogram, PaletteSize::from_u8_clamped(size), 3);
                assert!(contains_near(&palette, dominant, 30.0), "{name} {size}");
            }
        }
    }

    #[test]
    fn quantizers_are_reproducible() {
        let histogram = colorful_histogram();
        let size = PaletteSize::from_u8_clamped(12);
        for (name, quantizer) in all_quantizers() {
            let a = quantizer.quantize(&histogram, size, 9);
            let b = quantizer.quantize(&histogram, size, 9);
            assert_eq!(a, b, "{name}");
        }
    }

    #[test]
    fn moments_of_points() {
        let mut moments = Moments::default();
        moments.add([0.0, 0.0, 0.0], 1.0);
        moments.add([2.0, 4.0, 6.0], 1.0);
        assert_eq!(moments.mean(), Some([1.0, 2.0, 3.0]));
        assert_relative_eq!(moments.sse(), 28.0);
        assert_eq!(Moments::default().mean(), None);
    }

    #[test]
    fn kmeans_plus_plus_picks_distinct_points() {
        let points = Points::new(&rgb_histogram());
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        let mut centroids = kmeans_plus_plus(&points, 5, &mut rng);
        assert_eq!(centroids.len(), 3);
        centroids.sort_by(|a, b| a.partial_cmp(b).unwrap());
        centroids.dedup();
        assert_eq!(centroids.len(), 3);
    }
}
