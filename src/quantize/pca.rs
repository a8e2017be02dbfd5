//! Principal component analysis of weighted colors.

use super::{Points, Quantizer};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;

/// The number of power iterations used to find the principal eigenvector.
const POWER_ITERATIONS: usize = 32;

/// Variances below this are treated as zero.
const MIN_VARIANCE: f64 = 1e-9;

/// The weighted mean and covariance of a set of points.
pub(crate) struct Covariance {
    /// The weighted mean.
    pub mean: [f64; 3],
    /// The weighted covariance matrix.
    pub matrix: [[f64; 3]; 3],
}

impl Covariance {
    /// Compute the covariance of the points at the given indices.
    ///
    /// Returns `None` if the total weight is zero.
    pub fn new(points: &Points, indices: impl IntoIterator<Item = usize> + Clone) -> Option<Self> {
        let mut weight = 0.0;
        let mut mean = [0.0f64; 3];
        for i in indices.clone() {
            let w = f64::from(points.weights[i]);
            weight += w;
            for c in 0..3 {
                mean[c] += w * f64::from(points.colors[i][c]);
            }
        }
        if !(weight > 0.0) {
            return None;
        }
        let mean = mean.map(|m| m / weight);

        let mut matrix = [[0.0f64; 3]; 3];
        for i in indices {
            let w = f64::from(points.weights[i]);
            let d: [f64; 3] = core::array::from_fn(|c| f64::from(points.colors[i][c]) - mean[c]);
            for a in 0..3 {
                for b in 0..3 {
                    matrix[a][b] += w * d[a] * d[b];
                }
            }
        }
        let matrix = matrix.map(|row| row.map(|v| v / weight));
        Some(Self { mean, matrix })
    }

    /// Returns the principal eigenvector (unit length) and its eigenvalue.
    ///
    /// Returns `None` if the variance is zero.
    pub fn principal(&self) -> Option<([f64; 3], f64)> {
        let m = &self.matrix;
        if m[0][0] + m[1][1] + m[2][2] <= MIN_VARIANCE {
            return None;
        }

        // start from the column with the largest norm, which cannot be orthogonal to the result
        let norm = |v: [f64; 3]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
        let mut v = (0..3)
            .map(|c| [m[0][c], m[1][c], m[2][c]])
            .max_by(|a, b| norm(*a).total_cmp(&norm(*b)))?;

        let mut eigenvalue = 0.0;
        for _ in 0..POWER_ITERATIONS {
            let n = norm(v);
            if !(n > MIN_VARIANCE) {
                return None;
            }
            v = v.map(|x| x / n);
            let next: [f64; 3] =
                core::array::from_fn(|a| (0..3).map(|b| m[a][b] * v[b]).sum::<f64>());
            eigenvalue = (0..3).map(|c| next[c] * v[c]).sum();
            v = next;
        }

        let n = norm(v);
        (n > MIN_VARIANCE && eigenvalue.is_finite()).then(|| (v.map(|x| x / n), eigenvalue))
    }
}

/// Returns the principal axis of the colors in `histogram` as a unit vector.
///
/// Returns `None` if the histogram is empty or all of its colors are the same.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn principal_axis(histogram: &Histogram) -> Option<[f32; 3]> {
    let points = Points::new(histogram);
    let (axis, _) = Covariance::new(&points, 0..points.len())?.principal()?;
    Some(axis.map(|x| x as f32))
}

/// Place up to `k` seeds along the principal axis of the colors in `histogram`.
///
/// The colors are ordered by their projection onto the principal axis and split into `k`
/// quantiles of equal weight. Each seed is the weighted mean of a quantile.
/// If all colors are the same, a single seed is returned.
#[must_use]
pub fn seeds(histogram: &Histogram, k: usize) -> Vec<[f32; 3]> {
    quantile_means(&Points::new(histogram), k)
}

/// Returns the weighted means of `k` equal weight quantiles along the principal axis.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn quantile_means(points: &Points, k: usize) -> Vec<[f32; 3]> {
    let Some(covariance) = Covariance::new(points, 0..points.len()) else {
        return Vec::new();
    };
    let Some((axis, _)) = covariance.principal() else {
        return alloc::vec![covariance.mean.map(|m| m as f32)];
    };

    let project = |i: usize| -> f64 {
        (0..3).map(|c| f64::from(points.colors[i][c]) * axis[c]).sum()
    };
    let mut order = (0..points.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| project(a).total_cmp(&project(b)).then(a.cmp(&b)));

    let total = points.weights.iter().map(|&w| f64::from(w)).sum::<f64>();
    let mut bins = alloc::vec![super::Moments::default(); k];
    let mut cumulative = 0.0;
    for i in order {
        let w = f64::from(points.weights[i]);
        let midpoint = (cumulative + w / 2.0) / total;
        let bin = ((midpoint * k as f64) as usize).min(k - 1);
        bins[bin].add(points.colors[i], points.weights[i]);
        cumulative += w;
    }

    bins.iter().filter_map(super::Moments::mean).collect()
}

/// Principal component quantization: equal weight quantiles along the principal axis.
///
/// This works best for images whose colors lie roughly along a line, like gradients or
/// duotones, and serves as a fast seed for iterative quantizers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcaQuantizer;

impl Quantizer for PcaQuantizer {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        seeds(histogram, size.as_usize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use approx::assert_relative_eq;
    use palette::Srgb;

    #[test]
    fn gray_axis() {
        let histogram = Histogram::from_image(gradient_image(64, 1).as_ref());
        let axis = principal_axis(&histogram).unwrap();
        let expected = 1.0 / 3.0f32.sqrt();
        for c in axis {
            assert_relative_eq!(c.abs(), expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn zero_variance_gives_single_seed() {
        let histogram = Histogram::from_entries([(RED, 10)]);
        assert_eq!(principal_axis(&histogram), None);
        assert_eq!(seeds(&histogram, 4), [[255.0, 0.0, 0.0]]);
        assert_eq!(principal_axis(&Histogram::default()), None);
        assert!(seeds(&Histogram::default(), 4).is_empty());
    }

    #[test]
    fn seeds_are_finite_and_ordered() {
        let histogram = Histogram::from_image(gradient_image(256, 1).as_ref());
        let seeds = seeds(&histogram, 4);
        assert_eq!(seeds.len(), 4);
        assert!(seeds.iter().flatten().all(|c| c.is_finite()));
        let mut reds = seeds.iter().map(|s| s[0]).collect::<Vec<_>>();
        reds.sort_by(f32::total_cmp);
        assert_relative_eq!(reds[0], 31.5, epsilon = 1.0);
        assert_relative_eq!(reds[3], 223.5, epsilon = 1.0);
    }

    #[test]
    fn dominant_color_gets_its_own_quantile() {
        let dominant = Srgb::new(200, 40, 90);
        let palette = PcaQuantizer.quantize(
            &dominant_histogram(dominant),
            PaletteSize::from_u8_clamped(8),
            0,
        );
        assert!(palette.contains(&dominant));
    }
}
