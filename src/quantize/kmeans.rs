//! Color quantization by batch k-means clustering (Lloyd's algorithm).
//!
//! Each iteration assigns every histogram color to its nearest centroid and then moves each
//! centroid to the weighted mean of its colors. Iteration stops once no centroid moves more than
//! the [`tolerance`](KmeansOptions::tolerance) or after
//! [`max_iterations`](KmeansOptions::max_iterations), whichever comes first.
//!
//! Clusters that end up empty are re-seeded with the color that is currently represented worst,
//! so the number of centroids never shrinks.

use super::{Moments, Points, Quantizer, kmeans_plus_plus, pca};
use crate::{
    Histogram, PaletteSize,
    color_map::{simd_argmin_min_distance, squared_distance, to_simd_chunks},
};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;
use rand::SeedableRng as _;
use rand_xoshiro::Xoroshiro128PlusPlus;

/// How the initial centroids are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KmeansInit {
    /// Seeded, weighted k-means++.
    #[default]
    PlusPlus,
    /// Equal weight quantiles along the principal axis.
    Pca,
}

/// The various options for k-means quantization.
///
/// This struct has a builder API. See the docs for each of the following functions for more details:
/// - [`max_iterations`](`Self::max_iterations`)
/// - [`tolerance`](`Self::tolerance`)
/// - [`init`](`Self::init`)
///
/// # Examples
///
/// ```
/// # use palettize::quantize::{KmeansInit, KmeansOptions};
/// KmeansOptions::new()
///     .max_iterations(16)
///     .tolerance(0.25)
///     .init(KmeansInit::Pca);
/// ```
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KmeansOptions {
    /// The maximum number of Lloyd iterations.
    max_iterations: u32,
    /// The largest centroid movement that still counts as converged.
    tolerance: OrderedFloat<f32>,
    /// The initialization method.
    init: KmeansInit,
}

impl KmeansOptions {
    /// Create a new [`KmeansOptions`] with default options.
    #[inline]
    pub const fn new() -> Self {
        Self {
            max_iterations: 32,
            tolerance: OrderedFloat(0.5),
            init: KmeansInit::PlusPlus,
        }
    }

    /// Sets the maximum number of iterations.
    ///
    /// The default maximum number of iterations is `32`.
    #[inline]
    pub const fn max_iterations(self, max_iterations: u32) -> Self {
        Self { max_iterations, ..self }
    }

    /// Sets the convergence tolerance: iteration stops once no centroid moves farther than this
    /// (in sRGB component units).
    ///
    /// The default tolerance is `0.5`, which means that the rounded palette no longer changes.
    #[inline]
    pub const fn tolerance(self, tolerance: f32) -> Self {
        Self { tolerance: OrderedFloat(tolerance), ..self }
    }

    /// Sets the initialization method.
    ///
    /// The default is [`KmeansInit::PlusPlus`].
    #[inline]
    pub const fn init(self, init: KmeansInit) -> Self {
        Self { init, ..self }
    }

    /// Returns the current maximum number of iterations.
    #[inline]
    pub const fn get_max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the current convergence tolerance.
    #[inline]
    pub const fn get_tolerance(&self) -> f32 {
        self.tolerance.0
    }

    /// Returns the current initialization method.
    #[inline]
    pub const fn get_init(&self) -> KmeansInit {
        self.init
    }
}

impl Default for KmeansOptions {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Batch k-means quantization.
///
/// See the [module](self) documentation and [`KmeansOptions`] for more information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Kmeans {
    /// The k-means options.
    options: KmeansOptions,
}

impl Kmeans {
    /// Create a new [`Kmeans`] quantizer with the default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { options: KmeansOptions::new() }
    }

    /// Create a new [`Kmeans`] quantizer with the given options.
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

impl Quantizer for Kmeans {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let points = Points::new(histogram);
        let k = size.as_usize();
        let mut centroids = match self.options.init {
            KmeansInit::PlusPlus => {
                let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
                kmeans_plus_plus(&points, k, rng)
            }
            KmeansInit::Pca => pca::quantile_means(&points, k),
        };
        fill_farthest(&points, &mut centroids, k);
        lloyd(&points, centroids, self.options.max_iterations, self.options.get_tolerance())
    }
}

/// Add the worst represented points as centroids until there are `k` centroids
/// or every point is a centroid.
pub(crate) fn fill_farthest(points: &Points, centroids: &mut Vec<[f32; 3]>, k: usize) {
    if centroids.len() >= k || points.len() == 0 {
        return;
    }
    let mut cost = points
        .colors
        .iter()
        .zip(&points.weights)
        .map(|(&p, &w)| {
            let d = centroids
                .iter()
                .map(|&c| squared_distance(p, c))
                .fold(f32::INFINITY, f32::min);
            if d.is_finite() { w * d } else { w }
        })
        .collect::<Vec<_>>();

    while centroids.len() < k {
        let Some((i, &c)) = cost.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)) else {
            break;
        };
        if !(c > 0.0) {
            break;
        }
        let centroid = points.colors[i];
        centroids.push(centroid);
        for ((cost, &p), &w) in cost.iter_mut().zip(&points.colors).zip(&points.weights) {
            *cost = cost.min(w * squared_distance(p, centroid));
        }
    }
}

/// Returns the index of the nearest centroid for each point and the weighted squared distance.
pub(crate) fn assign(points: &Points, centroids: &[[f32; 3]]) -> Vec<(usize, f32)> {
    let data = to_simd_chunks(centroids);
    points
        .colors
        .iter()
        .zip(&points.weights)
        .map(|(&p, &w)| {
            let ((chunk, lane), distance) = simd_argmin_min_distance(&data, p);
            (usize::from(chunk) * 8 + usize::from(lane), w * distance)
        })
        .collect()
}

/// Returns the weighted sum of squared distances from each point to its nearest centroid.
pub(crate) fn cost(points: &Points, centroids: &[[f32; 3]]) -> f64 {
    if centroids.is_empty() {
        return f64::INFINITY;
    }
    assign(points, centroids).iter().map(|&(_, d)| f64::from(d)).sum()
}

/// Run weighted Lloyd iterations starting from `centroids`.
///
/// The number of centroids is preserved.
pub(crate) fn lloyd(
    points: &Points,
    mut centroids: Vec<[f32; 3]>,
    max_iterations: u32,
    tolerance: f32,
) -> Vec<[f32; 3]> {
    if centroids.is_empty() || points.len() == 0 {
        return centroids;
    }

    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        let assignments = assign(points, &centroids);

        let mut clusters = alloc::vec![Moments::default(); centroids.len()];
        for (i, &(cluster, _)) in assignments.iter().enumerate() {
            clusters[cluster].add(points.colors[i], points.weights[i]);
        }

        // worst represented points first, for re-seeding empty clusters
        let mut worst = (0..points.len()).collect::<Vec<_>>();
        worst.sort_by(|&a, &b| assignments[b].1.total_cmp(&assignments[a].1).then(a.cmp(&b)));
        let mut worst = worst.into_iter().filter(|&i| assignments[i].1 > 0.0);

        let mut movement = 0.0f32;
        for (centroid, cluster) in centroids.iter_mut().zip(&clusters) {
            let next = match cluster.mean() {
                Some(mean) => mean,
                None => match worst.next() {
                    Some(i) => points.colors[i],
                    None => *centroid,
                },
            };
            movement = movement.max(squared_distance(*centroid, next).sqrt());
            *centroid = next;
        }

        if movement <= tolerance {
            break;
        }
    }

    tracing::trace!(iterations, k = centroids.len(), "k-means finished");
    centroids
}
