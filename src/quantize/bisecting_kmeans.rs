use super::{
    Moments, Points, Quantizer,
    kmeans::{KmeansOptions, assign, lloyd},
    kmeans_plus_plus,
};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;
use rand::SeedableRng as _;
use rand_xoshiro::Xoroshiro128PlusPlus;

/// Bisecting k-means: the cluster with the largest sum of squared errors is repeatedly split
/// in two by 2-means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BisectingKmeans {
    /// The options for each 2-means split. The initialization method is ignored.
    options: KmeansOptions,
}

impl BisectingKmeans {
    /// Create a new [`BisectingKmeans`] quantizer with the default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { options: KmeansOptions::new() }
    }

    /// Create a new [`BisectingKmeans`] quantizer with the given options for each split.
    #[must_use]
    pub const fn with_options(options: KmeansOptions) -> Self {
        Self { options }
    }

    /// Returns the current options.
    #[must_use]
    pub const fn get_options(&self) -> KmeansOptions {
        self.options
    }
}

/// A cluster of point indices.
struct Cluster {
    /// The indices of the points.
    indices: Vec<usize>,
    /// The moments of the points.
    moments: Moments,
}

impl Cluster {
    fn new(points: &Points, indices: Vec<usize>) -> Self {
        let moments = points.moments(indices.iter().copied());
        Self { indices, moments }
    }
}

impl Quantizer for BisectingKmeans {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let points = Points::new(histogram);
        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let mut clusters = alloc::vec![Cluster::new(&points, (0..points.len()).collect())];
        // clusters that 2-means failed to split
        let mut done = Vec::new();

        while clusters.len() + done.len() < size.as_usize() {
            let Some((i, _)) = clusters
                .iter()
                .enumerate()
                .filter(|(_, c)| c.indices.len() >= 2)
                .map(|(i, c)| (i, c.moments.sse()))
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
            else {
                break;
            };

            let cluster = clusters.swap_remove(i);
            let subset = points.subset(&cluster.indices);
            let seeds = kmeans_plus_plus(&subset, 2, rng);
            let centroids = lloyd(
                &subset,
                seeds,
                self.options.get_max_iterations(),
                self.options.get_tolerance(),
            );

            let (mut left, mut right) = (Vec::new(), Vec::new());
            for (&index, (half, _)) in cluster.indices.iter().zip(assign(&subset, &centroids)) {
                if half == 0 { left.push(index) } else { right.push(index) }
            }

            if left.is_empty() || right.is_empty() {
                done.push(cluster);
            } else {
                clusters.push(Cluster::new(&points, left));
                clusters.push(Cluster::new(&points, right));
            }
        }

        clusters.iter().chain(&done).filter_map(|c| c.moments.mean()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use palette::Srgb;

    #[test]
    fn splits_largest_error_first() {
        let histogram = Histogram::from_entries([
            (Srgb::new(0, 0, 0), 10),
            (Srgb::new(0, 0, 10), 10),
            (Srgb::new(255, 255, 255), 10),
            (Srgb::new(255, 255, 245), 10),
            (Srgb::new(0, 255, 0), 20),
        ]);
        let size = PaletteSize::from_u8_clamped(3);
        let palette = BisectingKmeans::new().quantize(&histogram, size, 1);
        assert_eq!(palette.len(), 3);
        assert!(contains_near(&palette, Srgb::new(0, 0, 5), 1.0));
        assert!(contains_near(&palette, Srgb::new(255, 255, 250), 1.0));
        assert!(contains_near(&palette, GREEN, 1.0));
    }
}
