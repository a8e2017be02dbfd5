//! Ant colony optimization of palette centroids.
//!
//! Each ant builds a candidate palette by choosing one move per centroid, guided by the
//! pheromone left on each (centroid, move) pair. The moves are: stay, step to the mean of the
//! colors assigned to the centroid, or step along one of the six axis directions. Candidates are
//! scored by their weighted sum of squared errors over a bounded sample of the histogram.
//! Pheromone evaporates every iteration and the best ant reinforces its moves.
//!
//! The best palette seen so far is always kept, so the result never has a higher cost than the
//! input palette.

use super::{Points, Quantizer, kmeans::{assign, cost, fill_farthest}, pca, weighted_choice};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;
use rand::SeedableRng as _;
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The number of moves for each centroid.
const MOVES: usize = 8;

/// The number of histogram entries used to score candidates.
const EVALUATION_SAMPLES: usize = 2048;

/// The initial axis step size in sRGB component units.
const INITIAL_STEP: f32 = 8.0;

/// The various options for ant colony optimization.
///
/// This struct has a builder API. See the docs for each of the following functions for more details:
/// - [`ants`](`Self::ants`)
/// - [`iterations`](`Self::iterations`)
/// - [`evaporation`](`Self::evaporation`)
/// - [`seed`](`Self::seed`)
///
/// # Examples
///
/// ```
/// # use palettize::quantize::AcoOptimizer;
/// let optimizer = AcoOptimizer::new().ants(4).iterations(10).evaporation(0.2).unwrap().seed(7);
/// assert_eq!(optimizer.get_ants(), 4);
/// ```
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcoOptimizer {
    /// The number of ants per iteration.
    ants: u32,
    /// The number of iterations.
    iterations: u32,
    /// The fraction of pheromone that evaporates each iteration.
    evaporation: OrderedFloat<f32>,
    /// The seed for the random number generator.
    seed: u64,
}

impl AcoOptimizer {
    /// Create a new [`AcoOptimizer`] with default options.
    pub const fn new() -> Self {
        Self {
            ants: 8,
            iterations: 16,
            evaporation: OrderedFloat(0.1),
            seed: 0,
        }
    }

    /// Sets the number of ants per iteration.
    ///
    /// The default number of ants is `8`.
    pub const fn ants(self, ants: u32) -> Self {
        Self { ants, ..self }
    }

    /// Sets the number of iterations.
    ///
    /// The default number of iterations is `16`.
    pub const fn iterations(self, iterations: u32) -> Self {
        Self { iterations, ..self }
    }

    /// Sets the fraction of pheromone that evaporates each iteration.
    ///
    /// Returns `None` if `evaporation` is not in the range `0.0..=1.0`.
    /// The default evaporation is `0.1`.
    #[must_use]
    pub const fn evaporation(self, evaporation: f32) -> Option<Self> {
        if 0.0 <= evaporation && evaporation <= 1.0 {
            Some(Self { evaporation: OrderedFloat(evaporation), ..self })
        } else {
            None
        }
    }

    /// Sets the seed, which is combined with the seed passed to a quantizer.
    ///
    /// The default seed is `0`.
    pub const fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    /// Returns the current number of ants.
    #[must_use]
    pub const fn get_ants(&self) -> u32 {
        self.ants
    }

    /// Returns the current number of iterations.
    #[must_use]
    pub const fn get_iterations(&self) -> u32 {
        self.iterations
    }

    /// Returns the current evaporation.
    #[must_use]
    pub const fn get_evaporation(&self) -> f32 {
        self.evaporation.0
    }

    /// Returns the current seed.
    #[must_use]
    pub const fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Optimize `centroids` for the colors of `histogram`.
    ///
    /// The number of centroids is preserved and the returned centroids never have a higher
    /// weighted sum of squared errors over the evaluation sample than the given ones.
    #[must_use]
    pub fn optimize(&self, histogram: &Histogram, centroids: Vec<[f32; 3]>) -> Vec<[f32; 3]> {
        let points = Points::sampled(histogram, EVALUATION_SAMPLES, self.seed);
        self.optimize_points(&points, centroids)
    }

    /// Optimize `centroids` for the given points.
    pub(crate) fn optimize_points(
        &self,
        points: &Points,
        centroids: Vec<[f32; 3]>,
    ) -> Vec<[f32; 3]> {
        let k = centroids.len();
        if k == 0 || points.len() == 0 {
            return centroids;
        }

        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(self.seed);
        let evaporation = f64::from(self.evaporation.0);
        let mut pheromone = alloc::vec![[1.0f64; MOVES]; k];
        let mut best_cost = cost(points, &centroids);
        let mut best = centroids;
        let mut step = INITIAL_STEP;

        for iteration in 0..self.iterations {
            let means = cluster_means(points, &best);
            let mut iteration_best: Option<(f64, Vec<[f32; 3]>, Vec<usize>)> = None;

            for _ in 0..self.ants {
                let mut moves = Vec::with_capacity(k);
                let candidate = best
                    .iter()
                    .zip(&means)
                    .zip(&pheromone)
                    .map(|((&centroid, &mean), pheromone)| {
                        let m = weighted_choice(rng, pheromone).unwrap_or(0);
                        moves.push(m);
                        apply_move(centroid, mean, m, step)
                    })
                    .collect::<Vec<_>>();

                let candidate_cost = cost(points, &candidate);
                if iteration_best.as_ref().is_none_or(|(c, _, _)| candidate_cost < *c) {
                    iteration_best = Some((candidate_cost, candidate, moves));
                }
            }

            for pheromone in &mut pheromone {
                for p in pheromone.iter_mut() {
                    *p = (*p * (1.0 - evaporation)).max(1e-3);
                }
            }

            if let Some((candidate_cost, candidate, moves)) = iteration_best {
                let improved = candidate_cost < best_cost;
                let deposit = if improved { 1.0 } else { 0.1 };
                for (pheromone, m) in pheromone.iter_mut().zip(moves) {
                    pheromone[m] += deposit;
                }
                if improved {
                    best_cost = candidate_cost;
                    best = candidate;
                } else {
                    step = (step / 2.0).max(0.5);
                }
            }

            tracing::trace!(iteration, cost = best_cost, "ant colony iteration");
        }

        best
    }
}

impl Default for AcoOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the mean of the points assigned to each centroid, or the centroid itself if it has
/// no points.
fn cluster_means(points: &Points, centroids: &[[f32; 3]]) -> Vec<[f32; 3]> {
    let mut moments = alloc::vec![super::Moments::default(); centroids.len()];
    for (i, (cluster, _)) in assign(points, centroids).into_iter().enumerate() {
        moments[cluster].add(points.colors[i], points.weights[i]);
    }
    moments
        .iter()
        .zip(centroids)
        .map(|(m, &c)| m.mean().unwrap_or(c))
        .collect()
}

/// Apply a move to a centroid.
fn apply_move(mut centroid: [f32; 3], mean: [f32; 3], m: usize, step: f32) -> [f32; 3] {
    match m {
        0 => centroid,
        1 => mean,
        _ => {
            let axis = (m - 2) / 2;
            let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
            centroid[axis] = (centroid[axis] + sign * step).clamp(0.0, 255.0);
            centroid
        }
    }
}

/// Palette selection by ant colony optimization of principal component seeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AcoQuantizer {
    /// The optimizer options.
    optimizer: AcoOptimizer,
}

impl AcoQuantizer {
    /// Create a new [`AcoQuantizer`] with the default optimizer options.
    #[must_use]
    pub const fn new() -> Self {
        Self { optimizer: AcoOptimizer::new() }
    }

    /// Create a new [`AcoQuantizer`] with the given optimizer options.
    #[must_use]
    pub const fn with_optimizer(optimizer: AcoOptimizer) -> Self {
        Self { optimizer }
    }

    /// Returns the current optimizer options.
    #[must_use]
    pub const fn get_optimizer(&self) -> AcoOptimizer {
        self.optimizer
    }
}

impl Quantizer for AcoQuantizer {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let optimizer = self.optimizer.seed(self.optimizer.seed ^ seed);
        let points = Points::sampled(histogram, EVALUATION_SAMPLES, optimizer.seed);
        let mut seeds = pca::quantile_means(&points, size.as_usize());
        fill_farthest(&points, &mut seeds, size.as_usize());
        optimizer.optimize_points(&points, seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn never_worse_than_input() {
        let histogram = colorful_histogram();
        let points = Points::sampled(&histogram, EVALUATION_SAMPLES, 0);
        let start = alloc::vec![[10.0, 10.0, 10.0], [200.0, 30.0, 30.0], [40.0, 40.0, 230.0]];
        let before = cost(&points, &start);
        let result = AcoOptimizer::new().optimize(&histogram, start);
        assert_eq!(result.len(), 3);
        assert!(cost(&points, &result) <= before);
    }

    #[test]
    fn moves() {
        let c = [100.0, 100.0, 100.0];
        let mean = [90.0, 80.0, 70.0];
        assert_eq!(apply_move(c, mean, 0, 8.0), c);
        assert_eq!(apply_move(c, mean, 1, 8.0), mean);
        assert_eq!(apply_move(c, mean, 2, 8.0), [108.0, 100.0, 100.0]);
        assert_eq!(apply_move(c, mean, 7, 8.0), [100.0, 100.0, 92.0]);
        assert_eq!(apply_move([250.0; 3], mean, 4, 8.0), [250.0, 255.0, 250.0]);
    }

    #[test]
    fn invalid_evaporation() {
        assert!(AcoOptimizer::new().evaporation(-0.1).is_none());
        assert!(AcoOptimizer::new().evaporation(1.1).is_none());
    }
}
