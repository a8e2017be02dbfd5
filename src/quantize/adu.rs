//! Adaptive distributing units.
//!
//! Learning starts with a single unit. Every sample moves its nearest unit towards it, and a
//! unit that has won `θ = 400·√k` samples splits in two. Splitting stops once there are `k`
//! units, after which the remaining samples only refine the units.

// Based upon the following paper:
//
// Uchiyama, T. & Arbib, M.A. Color image segmentation using competitive learning.
// IEEE Transactions on Pattern Analysis and Machine Intelligence, vol. 16, no. 12, 1197–1206, 1994.

use super::Quantizer;
use crate::{Histogram, PaletteSize, color_map::squared_distance, components};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;
use rand::{SeedableRng as _, distr::weighted::WeightedIndex, prelude::Distribution as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// Adaptive distributing units quantization.
///
/// See the [module](self) documentation for more information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Adu {
    /// The learning rate.
    rate: OrderedFloat<f32>,
    /// The maximum number of samples.
    max_samples: u32,
}

impl Adu {
    /// Create a new [`Adu`] with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { rate: OrderedFloat(0.015), max_samples: 512 * 512 }
    }

    /// Sets the learning rate.
    ///
    /// Returns `None` if `rate` is not in the range `(0.0, 1.0]`.
    /// The default learning rate is `0.015`.
    #[must_use]
    pub const fn rate(self, rate: f32) -> Option<Self> {
        if rate > 0.0 && rate <= 1.0 {
            Some(Self { rate: OrderedFloat(rate), ..self })
        } else {
            None
        }
    }

    /// Sets the maximum number of samples.
    ///
    /// If the samples run out before `k` units exist, fewer colors are returned.
    /// The default maximum samples is `262144`.
    #[must_use]
    pub const fn max_samples(self, max_samples: u32) -> Self {
        Self { max_samples, ..self }
    }

    /// Returns the current learning rate.
    #[must_use]
    pub const fn get_rate(&self) -> f32 {
        self.rate.0
    }

    /// Returns the current maximum number of samples.
    #[must_use]
    pub const fn get_max_samples(&self) -> u32 {
        self.max_samples
    }
}

impl Default for Adu {
    fn default() -> Self {
        Self::new()
    }
}

/// A competitive learning unit.
#[derive(Debug, Clone, Copy)]
struct Unit {
    /// The position of the unit.
    color: [f32; 3],
    /// The number of samples won since the last split.
    wins: u32,
    /// The running mean absolute deviation of the won samples along each channel.
    deviation: [f32; 3],
}

impl Unit {
    fn new(color: [f32; 3], deviation: [f32; 3]) -> Self {
        Self { color, wins: 0, deviation }
    }

    /// Split the unit in two along its channel of largest deviation.
    fn split(&mut self) -> Self {
        let channel = (0..3).fold(0, |best, c| {
            if self.deviation[c] > self.deviation[best] { c } else { best }
        });
        let offset = self.deviation[channel].max(0.5) / 2.0;
        let deviation = self.deviation.map(|d| d / 2.0);
        let mut other = Self::new(self.color, deviation);
        self.color[channel] -= offset;
        other.color[channel] += offset;
        *self = Self::new(self.color, deviation);
        other
    }
}

impl Quantizer for Adu {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        seed: u64,
    ) -> Vec<[f32; 3]> {
        let Ok(distribution) = WeightedIndex::new(histogram.counts()) else {
            return Vec::new();
        };
        let Some(mean) = super::Points::new(histogram).total_moments().mean() else {
            return Vec::new();
        };

        let k = size.as_usize();
        let theta = (400.0 * f64::from(size.as_u16()).sqrt()) as u32;
        let rate = self.rate.0;
        let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
        let colors = histogram.colors();

        let mut units = Vec::with_capacity(k);
        units.push(Unit::new(mean, [0.0; 3]));
        let mut samples = 0;
        let mut refinement = 0;
        while samples < self.max_samples {
            samples += 1;
            let x = components(colors[distribution.sample(rng)]);
            let (i, _) = units
                .iter()
                .enumerate()
                .map(|(i, u)| (i, squared_distance(u.color, x)))
                .fold((0, f32::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best });

            let unit = &mut units[i];
            for c in 0..3 {
                unit.deviation[c] += rate * ((x[c] - unit.color[c]).abs() - unit.deviation[c]);
                unit.color[c] += rate * (x[c] - unit.color[c]);
            }
            unit.wins += 1;
            let wins = unit.wins;

            if units.len() < k {
                if wins >= theta {
                    let other = units[i].split();
                    units.push(other);
                }
            } else {
                refinement += 1;
                if refinement >= theta {
                    break;
                }
            }
        }

        tracing::trace!(samples, units = units.len(), "adaptive distributing units finished");
        units.iter().map(|u| u.color).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn split_moves_units_apart() {
        let mut unit = Unit::new([100.0; 3], [2.0, 10.0, 4.0]);
        let other = unit.split();
        assert_eq!(unit.color, [100.0, 95.0, 100.0]);
        assert_eq!(other.color, [100.0, 105.0, 100.0]);
        assert_eq!(unit.wins, 0);
    }

    #[test]
    fn grows_to_palette_size() {
        let centroids =
            Adu::new().quantize_colors(&colorful_histogram(), PaletteSize::from_u8_clamped(8), 0);
        assert_eq!(centroids.len(), 8);
    }

    #[test]
    fn invalid_rate() {
        assert!(Adu::new().rate(0.0).is_none());
        assert!(Adu::new().rate(1.5).is_none());
        assert!(Adu::new().rate(f32::NAN).is_none());
    }
}
