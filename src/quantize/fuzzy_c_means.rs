use super::{Points, Quantizer, kmeans::fill_farthest, kmeans_plus_plus};
use crate::{Histogram, PaletteSize, color_map::squared_distance};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;
use rand::SeedableRng as _;
use rand_xoshiro::Xoroshiro128PlusPlus;

/// Fuzzy c-means clustering.
///
/// Every color belongs to every cluster with a membership in `0.0..=1.0` that decreases with
/// distance. Centroids are updated as membership weighted means, where memberships are raised to
/// the power of the fuzziness `m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuzzyCMeans {
    /// The fuzziness exponent, greater than 1.
    fuzziness: OrderedFloat<f32>,
    /// The maximum number of iterations.
    max_iterations: u32,
    /// The maximum number of histogram entries considered.
    max_samples: u32,
}

impl FuzzyCMeans {
    /// Create a new [`FuzzyCMeans`] with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fuzziness: OrderedFloat(2.0),
            max_iterations: 30,
            max_samples: 4096,
        }
    }

    /// Sets the fuzziness exponent `m`.
    ///
    /// Returns `None` if `fuzziness` is not a finite number greater than `1.0`.
    /// The default fuzziness is `2.0`.
    #[must_use]
    pub const fn fuzziness(self, fuzziness: f32) -> Option<Self> {
        if fuzziness.is_finite() && fuzziness > 1.0 {
            Some(Self { fuzziness: OrderedFloat(fuzziness), ..self })
        } else {
            None
        }
    }

    /// Sets the maximum number of iterations.
    ///
    /// The default maximum number of iterations is `30`.
    #[must_use]
    pub const fn max_iterations(self, max_iterations: u32) -> Self {
        Self { max_iterations, ..self }
    }

    /// Sets the maximum number of histogram entries to cluster.
    ///
    /// Larger histograms are sampled down first. The default is `4096`.
    #[must_use]
    pub const fn max_samples(self, max_samples: u32) -> Self {
        Self { max_samples, ..self }
    }

    /// Returns the current fuzziness exponent.
    #[must_use]
    pub const fn get_fuzziness(&self) -> f32 {
        self.fuzziness.0
    }

    /// Returns the current maximum number of iterations.
    #[must_use]
    pub const fn get_max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the current maximum number of histogram entries.
    #[must_use]
    pub const fn get_max_samples(&self) -> u32 {
        self.max_samples
    }
}

impl Default for FuzzyCMeans {
    fn default() -> Self {
        Self::new()
    }
}

/// Iteration stops once no centroid moves farther than this.
const TOLERANCE: f64 = 0.25;

/// Compute the memberships of `point` in each cluster.
fn memberships(point: [f32; 3], centroids: &[[f32; 3]], exponent: f64, out: &mut [f64]) {
    // a point on top of a centroid fully belongs to it
    if let Some(i) = centroids.iter().position(|&c| squared_distance(point, c) <= f32::EPSILON) {
        out.fill(0.0);
        out[i] = 1.0;
        return;
    }
    for (u, &c) in out.iter_mut().zip(centroids) {
        *u = f64::from(squared_distance(point, c)).powf(-exponent);
    }
    let total = out.iter().sum::<f64>();
    for u in out.iter_mut() {
        *u /= total;
    }
}

impl Quantizer for FuzzyCMeans {
    #[allow(clippy::cast_possible_truncation)]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let points = Points::sampled(histogram, self.max_samples as usize, seed);
        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let mut centroids = kmeans_plus_plus(&points, size.as_usize(), rng);
        fill_farthest(&points, &mut centroids, size.as_usize());

        let m = f64::from(self.fuzziness.0);
        // memberships are proportional to d^(-2 / (m - 1)), and d² is what we have
        let exponent = 1.0 / (m - 1.0);
        let mut u = alloc::vec![0.0; centroids.len()];

        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let mut sums = alloc::vec![([0.0f64; 3], 0.0f64); centroids.len()];
            for (&point, &weight) in points.colors.iter().zip(&points.weights) {
                memberships(point, &centroids, exponent, &mut u);
                for (sum, &u) in sums.iter_mut().zip(&u) {
                    let w = f64::from(weight) * u.powf(m);
                    for c in 0..3 {
                        sum.0[c] += w * f64::from(point[c]);
                    }
                    sum.1 += w;
                }
            }

            let mut movement = 0.0f64;
            for (centroid, (sum, weight)) in centroids.iter_mut().zip(sums) {
                if weight > 0.0 {
                    let next = sum.map(|s| (s / weight) as f32);
                    movement = movement.max(f64::from(squared_distance(*centroid, next)).sqrt());
                    *centroid = next;
                }
            }
            if movement <= TOLERANCE {
                break;
            }
        }

        tracing::trace!(iterations, k = centroids.len(), "fuzzy c-means finished");
        centroids
    }
}
