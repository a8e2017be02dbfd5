//! Blue noise threshold masks.

use super::{Ditherer, ThresholdMatrix, perturb};
use crate::color_map::ColorMap;
use alloc::{vec, vec::Vec};
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The width and height of a best-candidate mask.
const BEST_CANDIDATE_SIZE: usize = 64;

/// The number of random candidates considered for each point of a best-candidate mask.
const CANDIDATES: usize = 16;

/// The width and height of a void-and-cluster mask.
const VOID_AND_CLUSTER_SIZE: usize = 32;

/// The standard deviation of the void-and-cluster energy filter.
const SIGMA: f32 = 1.5;

/// Ordered dithering with a 64x64 blue noise mask built by Mitchell's best-candidate sampling.
///
/// Points are added one at a time. Each point is the candidate farthest from all previous points
/// among a few random free cells, and its rank is the order in which it was added.
#[derive(Debug, Clone, PartialEq)]
pub struct BlueNoise {
    /// The seed.
    seed: u64,
    /// The mask.
    matrix: ThresholdMatrix,
}

impl BlueNoise {
    /// Create a new [`BlueNoise`] ditherer with a mask generated from `seed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(seed: u64) -> Self {
        let size = BEST_CANDIDATE_SIZE as u32;
        let matrix = ThresholdMatrix::from_field(size, size, &best_candidate(seed));
        Self { seed, matrix }
    }

    /// Returns the seed.
    #[inline]
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Returns the mask.
    #[inline]
    pub fn matrix(&self) -> &ThresholdMatrix {
        &self.matrix
    }
}

impl Ditherer for BlueNoise {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        perturb(color, self.matrix.threshold(x, y), color_map)
    }
}

/// Ordered dithering with a 32x32 mask built by Ulichney's void-and-cluster method.
///
/// A sparse random pattern is relaxed by moving its tightest cluster into its largest void.
/// Ranks are then assigned by removing the tightest clusters of the relaxed pattern one by one
/// and by filling the largest voids until the pattern is full.
#[derive(Debug, Clone, PartialEq)]
pub struct VoidAndCluster {
    /// The seed.
    seed: u64,
    /// The mask.
    matrix: ThresholdMatrix,
}

impl VoidAndCluster {
    /// Create a new [`VoidAndCluster`] ditherer with a mask generated from `seed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(seed: u64) -> Self {
        let size = VOID_AND_CLUSTER_SIZE as u32;
        let matrix = ThresholdMatrix::from_field(size, size, &void_and_cluster(seed));
        Self { seed, matrix }
    }

    /// Returns the seed.
    #[inline]
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Returns the mask.
    #[inline]
    pub fn matrix(&self) -> &ThresholdMatrix {
        &self.matrix
    }
}

impl Ditherer for VoidAndCluster {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        perturb(color, self.matrix.threshold(x, y), color_map)
    }
}

/// Returns the squared distance between two cells of a `size` by `size` torus.
#[inline]
fn torus_distance(size: usize, a: usize, b: usize) -> usize {
    let wrap = |d: usize| d.min(size - d);
    let dx = wrap((a % size).abs_diff(b % size));
    let dy = wrap((a / size).abs_diff(b / size));
    dx * dx + dy * dy
}

/// Returns the order in which each cell was chosen by best-candidate sampling.
#[allow(clippy::cast_precision_loss)]
fn best_candidate(seed: u64) -> Vec<f32> {
    let size = BEST_CANDIDATE_SIZE;
    let n = size * size;
    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
    let mut distance = vec![usize::MAX; n];
    let mut order = vec![0.0; n];
    let mut free = (0..n).collect::<Vec<_>>();

    for rank in 0..n {
        let mut best = rng.random_range(0..free.len());
        for _ in 1..CANDIDATES.min(free.len()) {
            let j = rng.random_range(0..free.len());
            if distance[free[j]] > distance[free[best]] {
                best = j;
            }
        }
        let cell = free.swap_remove(best);
        order[cell] = rank as f32;
        for (i, d) in distance.iter_mut().enumerate() {
            *d = (*d).min(torus_distance(size, cell, i));
        }
    }

    order
}

/// The energy of a binary pattern: the sum of a Gaussian centered on each set cell.
#[derive(Clone)]
struct Energy {
    /// The width and height of the torus.
    size: usize,
    /// The Gaussian weight for each squared torus distance.
    filter: Vec<f32>,
    /// The energy at each cell.
    values: Vec<f32>,
}

impl Energy {
    /// Create the energy of an empty pattern.
    #[allow(clippy::cast_precision_loss)]
    fn new(size: usize) -> Self {
        let max = 2 * (size / 2) * (size / 2);
        let filter = (0..=max)
            .map(|d2| (-(d2 as f32) / (2.0 * SIGMA * SIGMA)).exp())
            .collect();
        Self { size, filter, values: vec![0.0; size * size] }
    }

    /// Add (`sign = 1.0`) or remove (`sign = -1.0`) the Gaussian centered on `cell`.
    fn update(&mut self, cell: usize, sign: f32) {
        for (i, value) in self.values.iter_mut().enumerate() {
            *value += sign * self.filter[torus_distance(self.size, cell, i)];
        }
    }

    /// The set cell with the highest energy, the first one on ties.
    fn tightest_cluster(&self, pattern: &[bool]) -> Option<usize> {
        self.extreme(pattern, true, |a, b| a > b)
    }

    /// The unset cell with the lowest energy, the first one on ties.
    fn largest_void(&self, pattern: &[bool]) -> Option<usize> {
        self.extreme(pattern, false, |a, b| a < b)
    }

    fn extreme(
        &self,
        pattern: &[bool],
        set: bool,
        better: impl Fn(f32, f32) -> bool,
    ) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &p) in pattern.iter().enumerate() {
            if p == set && best.is_none_or(|b| better(self.values[i], self.values[b])) {
                best = Some(i);
            }
        }
        best
    }
}

/// Returns the void-and-cluster rank of each cell.
#[allow(clippy::cast_precision_loss)]
fn void_and_cluster(seed: u64) -> Vec<f32> {
    let size = VOID_AND_CLUSTER_SIZE;
    let n = size * size;
    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);

    let mut pattern = vec![false; n];
    let mut energy = Energy::new(size);
    let initial = n / 10;
    let mut placed = 0;
    while placed < initial {
        let cell = rng.random_range(0..n);
        if !pattern[cell] {
            pattern[cell] = true;
            energy.update(cell, 1.0);
            placed += 1;
        }
    }

    // move the tightest cluster into the largest void until they coincide
    for _ in 0..n {
        let Some(cluster) = energy.tightest_cluster(&pattern) else {
            break;
        };
        pattern[cluster] = false;
        energy.update(cluster, -1.0);
        let Some(void) = energy.largest_void(&pattern) else {
            break;
        };
        pattern[void] = true;
        energy.update(void, 1.0);
        if void == cluster {
            break;
        }
    }

    let mut ranks = vec![0.0; n];

    // ranks below the initial pattern: remove clusters
    let mut removing = pattern.clone();
    let mut removing_energy = energy.clone();
    for rank in (0..initial).rev() {
        let Some(cluster) = removing_energy.tightest_cluster(&removing) else {
            break;
        };
        removing[cluster] = false;
        removing_energy.update(cluster, -1.0);
        ranks[cluster] = rank as f32;
    }

    // ranks from the initial pattern up: fill voids
    for rank in initial..n {
        let Some(void) = energy.largest_void(&pattern) else {
            break;
        };
        pattern[void] = true;
        energy.update(void, 1.0);
        ranks[void] = rank as f32;
    }

    ranks
}
