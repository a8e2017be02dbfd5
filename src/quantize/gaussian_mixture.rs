use super::{Points, Quantizer, kmeans::fill_farthest, kmeans_plus_plus};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;
use core::f64::consts::TAU;
use ordered_float::OrderedFloat;
use rand::SeedableRng as _;
use rand_xoshiro::Xoroshiro128PlusPlus;

/// Gaussian mixture model fitted by expectation maximization.
///
/// Each component has a diagonal covariance with a lower bound on each variance.
/// Responsibilities are computed with the log-sum-exp trick so that far away colors cannot
/// underflow to zero total probability. The palette is the component means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GaussianMixture {
    /// The maximum number of EM iterations.
    max_iterations: u32,
    /// The minimum variance of each channel.
    variance_floor: OrderedFloat<f32>,
    /// The maximum number of histogram entries considered.
    max_samples: u32,
}

impl GaussianMixture {
    /// Create a new [`GaussianMixture`] with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_iterations: 50,
            variance_floor: OrderedFloat(4.0),
            max_samples: 4096,
        }
    }

    /// Sets the maximum number of iterations.
    ///
    /// The default maximum number of iterations is `50`.
    #[must_use]
    pub const fn max_iterations(self, max_iterations: u32) -> Self {
        Self { max_iterations, ..self }
    }

    /// Sets the minimum variance for each channel (in squared sRGB component units).
    ///
    /// Returns `None` if `variance_floor` is not a finite positive number.
    /// The default variance floor is `4.0`.
    #[must_use]
    pub const fn variance_floor(self, variance_floor: f32) -> Option<Self> {
        if variance_floor.is_finite() && variance_floor > 0.0 {
            Some(Self { variance_floor: OrderedFloat(variance_floor), ..self })
        } else {
            None
        }
    }

    /// Sets the maximum number of histogram entries to fit.
    ///
    /// Larger histograms are sampled down first. The default is `4096`.
    #[must_use]
    pub const fn max_samples(self, max_samples: u32) -> Self {
        Self { max_samples, ..self }
    }

    /// Returns the current maximum number of iterations.
    #[must_use]
    pub const fn get_max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the current variance floor.
    #[must_use]
    pub const fn get_variance_floor(&self) -> f32 {
        self.variance_floor.0
    }

    /// Returns the current maximum number of histogram entries.
    #[must_use]
    pub const fn get_max_samples(&self) -> u32 {
        self.max_samples
    }
}

impl Default for GaussianMixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Iteration stops once the mean log-likelihood improves by less than this.
const TOLERANCE: f64 = 1e-4;

/// A mixture component with a diagonal covariance.
#[derive(Debug, Clone, Copy)]
struct Component {
    /// The mixing weight.
    weight: f64,
    /// The mean.
    mean: [f64; 3],
    /// The variance of each channel.
    variance: [f64; 3],
}

impl Component {
    /// The log of the weighted probability density at `x`.
    fn log_density(&self, x: [f32; 3]) -> f64 {
        let mut log = self.weight.ln();
        for c in 0..3 {
            let d = f64::from(x[c]) - self.mean[c];
            log -= 0.5 * ((TAU * self.variance[c]).ln() + d * d / self.variance[c]);
        }
        log
    }
}

/// Returns `ln(sum(exp(values)))` without overflow or underflow.
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() {
        max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
    } else {
        max
    }
}

impl Quantizer for GaussianMixture {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let points = Points::sampled(histogram, self.max_samples as usize, seed);
        let total = points.total_weight();
        let Some(global) = points.total_moments().mean() else {
            return Vec::new();
        };
        let floor = f64::from(self.variance_floor.0);

        let mut global_variance = [0.0f64; 3];
        for (&p, &w) in points.colors.iter().zip(&points.weights) {
            for c in 0..3 {
                let d = f64::from(p[c] - global[c]);
                global_variance[c] += f64::from(w) * d * d / total;
            }
        }
        let global_variance = global_variance.map(|v| v.max(floor));

        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let mut means = kmeans_plus_plus(&points, size.as_usize(), rng);
        fill_farthest(&points, &mut means, size.as_usize());
        let k = means.len();
        let mut components = means
            .iter()
            .map(|&m| Component {
                weight: 1.0 / k as f64,
                mean: m.map(f64::from),
                variance: global_variance.map(|v| v / k as f64).map(|v| v.max(floor)),
            })
            .collect::<Vec<_>>();

        let mut log = alloc::vec![0.0; k];
        let mut previous = f64::NEG_INFINITY;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let mut stats = alloc::vec![(0.0f64, [0.0f64; 3], [0.0f64; 3]); k];
            let mut likelihood = 0.0;

            for (&p, &w) in points.colors.iter().zip(&points.weights) {
                for (log, component) in log.iter_mut().zip(&components) {
                    *log = component.log_density(p);
                }
                let norm = log_sum_exp(&log);
                likelihood += f64::from(w) * norm;
                for ((n, sum, sum_squared), &log) in stats.iter_mut().zip(&log) {
                    let r = f64::from(w) * (log - norm).exp();
                    *n += r;
                    for c in 0..3 {
                        let x = f64::from(p[c]);
                        sum[c] += r * x;
                        sum_squared[c] += r * x * x;
                    }
                }
            }

            for (component, (n, sum, sum_squared)) in components.iter_mut().zip(stats) {
                if n <= f64::EPSILON {
                    // keep the mean of a collapsed component but widen it again
                    component.weight = f64::EPSILON;
                    component.variance = global_variance;
                    continue;
                }
                component.weight = n / total;
                component.mean = sum.map(|s| s / n);
                for c in 0..3 {
                    let mean = component.mean[c];
                    component.variance[c] = (sum_squared[c] / n - mean * mean).max(floor);
                }
            }

            let likelihood = likelihood / total;
            if (likelihood - previous).abs() < TOLERANCE {
                break;
            }
            previous = likelihood;
        }

        tracing::trace!(iterations, k, "gaussian mixture finished");
        components.iter().map(|c| c.mean.map(|m| m as f32)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use approx::assert_relative_eq;
    use palette::Srgb;

    #[test]
    fn log_sum_exp_is_stable() {
        assert_relative_eq!(log_sum_exp(&[-1000.0, -1000.0]), -1000.0 + 2.0f64.ln());
        assert_relative_eq!(log_sum_exp(&[0.0]), 0.0);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn fits_two_blobs() {
        let mut entries = Vec::new();
        for d in 0..4u8 {
            entries.push((Srgb::new(20 + d, 30, 40), 10));
            entries.push((Srgb::new(200, 180 + d, 40), 10));
        }
        let histogram = Histogram::from_entries(entries);
        let size = PaletteSize::from_u8_clamped(2);
        let palette = GaussianMixture::new().quantize(&histogram, size, 4);
        assert_eq!(palette.len(), 2);
        assert!(contains_near(&palette, Srgb::new(22, 30, 40), 2.0));
        assert!(contains_near(&palette, Srgb::new(200, 182, 40), 2.0));
    }

    #[test]
    fn invalid_variance_floor() {
        assert!(GaussianMixture::new().variance_floor(0.0).is_none());
        assert!(GaussianMixture::new().variance_floor(f32::INFINITY).is_none());
    }
}
