use super::Quantizer;
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;

/// A fixed grid over the RGB cube, independent of the image content.
///
/// The number of levels for each channel is grown greedily in the order green, red, blue
/// while the product of the levels stays within the palette size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Uniform;

impl Uniform {
    /// Returns the number of levels for the red, green, and blue channels.
    #[must_use]
    pub fn levels(size: PaletteSize) -> [u16; 3] {
        let size = size.as_u16();
        let mut levels = [1u16; 3];
        loop {
            let mut grew = false;
            for channel in [1, 0, 2] {
                let mut next = levels;
                next[channel] += 1;
                if next.iter().product::<u16>() <= size {
                    levels = next;
                    grew = true;
                }
            }
            if !grew {
                break levels;
            }
        }
    }
}

/// Returns the evenly spaced values for `n` levels of a channel.
fn level_values(n: u16) -> Vec<f32> {
    if n <= 1 {
        return alloc::vec![127.5];
    }
    let step = 255.0 / f32::from(n - 1);
    (0..n).map(|i| f32::from(i) * step).collect()
}

impl Quantizer for Uniform {
    fn quantize_colors(
        &self,
        _histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        let [r, g, b] = Self::levels(size).map(level_values);
        let mut colors = Vec::with_capacity(r.len() * g.len() * b.len());
        for &r in &r {
            for &g in &g {
                for &b in &b {
                    colors.push([r, g, b]);
                }
            }
        }
        colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn levels_favor_green() {
        let levels = |n| Uniform::levels(PaletteSize::from_u8_clamped(n));
        assert_eq!(levels(1), [1, 1, 1]);
        assert_eq!(levels(2), [1, 2, 1]);
        assert_eq!(levels(8), [2, 2, 2]);
        assert_eq!(levels(12), [2, 3, 2]);
        assert_eq!(Uniform::levels(PaletteSize::MAX), [6, 7, 6]);
    }

    #[test]
    fn grid_contains_corners() {
        let palette = Uniform.quantize(&colorful_histogram(), PaletteSize::from_u8_clamped(8), 0);
        assert_eq!(palette.len(), 8);
        assert!(palette.contains(&BLACK));
        assert!(palette.contains(&WHITE));
        assert!(palette.contains(&RED));
    }
}
