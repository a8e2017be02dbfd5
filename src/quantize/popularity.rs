use super::{Moments, Quantizer};
use crate::{Histogram, PaletteSize, components};
use alloc::vec::Vec;

/// Picks the most common colors after reducing each channel to a number of bits.
///
/// Each palette color is the weighted mean of the colors in one of the most populated bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Popularity {
    /// The number of bits kept per channel.
    bits: u8,
}

impl Popularity {
    /// Create a new [`Popularity`] quantizer keeping 5 bits per channel.
    #[must_use]
    pub const fn new() -> Self {
        Self { bits: 5 }
    }

    /// Returns the number of bits kept per channel.
    #[must_use]
    pub const fn get_bits(&self) -> u8 {
        self.bits
    }

    /// Sets the number of bits kept per channel.
    ///
    /// Returns `None` if `bits` is not in the range `1..=8`.
    #[must_use]
    pub const fn bits(self, bits: u8) -> Option<Self> {
        if 1 <= bits && bits <= 8 { Some(Self { bits }) } else { None }
    }
}

impl Default for Popularity {
    fn default() -> Self {
        Self::new()
    }
}

impl Quantizer for Popularity {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        let shift = 8 - self.bits;
        let bin = |i: usize| {
            let color = histogram.colors()[i];
            [color.red, color.green, color.blue].map(|c| c >> shift)
        };

        let mut order = (0..histogram.len()).collect::<Vec<_>>();
        order.sort_by_key(|&i| bin(i));

        #[allow(clippy::cast_precision_loss)]
        let mut bins = order
            .chunk_by(|&a, &b| bin(a) == bin(b))
            .map(|chunk| {
                let mut moments = Moments::default();
                for &i in chunk {
                    moments.add(components(histogram.colors()[i]), histogram.counts()[i] as f32);
                }
                moments
            })
            .collect::<Vec<_>>();

        // stable sort keeps ties in bin order
        bins.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        bins.iter()
            .take(size.as_usize())
            .filter_map(Moments::mean)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use palette::Srgb;

    #[test]
    fn most_common_bins_win() {
        let histogram = Histogram::from_entries([
            (Srgb::new(0, 0, 0), 10),
            (Srgb::new(2, 2, 2), 10),
            (Srgb::new(255, 255, 255), 15),
            (Srgb::new(128, 0, 0), 1),
        ]);
        let palette = Popularity::new().quantize(&histogram, PaletteSize::from_u8_clamped(2), 0);
        assert_eq!(palette.as_slice(), [Srgb::new(1, 1, 1), WHITE]);
    }

    #[test]
    fn invalid_bits() {
        assert!(Popularity::new().bits(0).is_none());
        assert!(Popularity::new().bits(9).is_none());
        assert_eq!(Popularity::new().bits(8).map(|p| p.get_bits()), Some(8));
    }
}
