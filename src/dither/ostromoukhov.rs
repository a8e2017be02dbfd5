//! Ostromoukhov's variable-coefficient error diffusion.
//!
//! Victor Ostromoukhov, A Simple and Efficient Error-Diffusion Algorithm,
//! SIGGRAPH 2001. <https://doi.org/10.1145/383259.383326>

use super::{
    Ditherer,
    error_diffusion::{Tap, diffuse},
};
use crate::{ImageRef, color_map::ColorMap};

/// Error diffusion with three taps whose weights depend on the intensity of the source pixel.
///
/// Each channel uses its own coefficients, looked up from the channel's source value.
/// Rows are traversed in serpentine order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ostromoukhov;

impl Ostromoukhov {
    /// Create a new [`Ostromoukhov`] ditherer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Ditherer for Ostromoukhov {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        diffuse(image, color_map, indices, true, 1, |_, _, _, source, out| {
            let coefficients = source.map(coefficients);
            out.extend(taps(coefficients));
        });
    }
}

/// Returns the taps for the per channel `[next, diagonal behind, below]` coefficients.
fn taps(coefficients: [[f32; 3]; 3]) -> [Tap; 3] {
    let weight = |i: usize| coefficients.map(|c| c[i]);
    [(1, 0, weight(0)), (-1, 1, weight(1)), (0, 1, weight(2))]
}

/// Returns the normalized `[next, diagonal behind, below]` coefficients for a channel value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn coefficients(value: f32) -> [f32; 3] {
    let level = (value + 0.5).clamp(0.0, 255.0) as usize;
    let level = if level > 127 { 255 - level } else { level };
    let [a, b, c] = COEFFICIENTS[level];
    let sum = (a + b + c) as f32;
    [a as f32 / sum, b as f32 / sum, c as f32 / sum]
}

/// Coefficients for the intensity levels `0..=127`, mirrored for `128..=255`.
#[rustfmt::skip]
const COEFFICIENTS: [[u32; 3]; 128] = [
    [13, 0, 5], [13, 0, 5], [21, 0, 10], [7, 0, 4],
    [8, 0, 5], [47, 3, 28], [23, 3, 13], [15, 3, 8],
    [22, 6, 11], [43, 15, 20], [7, 3, 3], [501, 224, 211],
    [249, 116, 103], [165, 80, 67], [123, 62, 49], [489, 256, 191],
    [81, 44, 31], [483, 272, 181], [60, 35, 22], [53, 32, 19],
    [237, 148, 83], [471, 304, 161], [3, 2, 1], [481, 314, 185],
    [354, 226, 155], [1389, 866, 685], [227, 138, 125], [267, 158, 163],
    [327, 188, 220], [61, 34, 45], [627, 338, 505], [1227, 638, 1075],
    [20, 10, 19], [1937, 1000, 1767], [977, 520, 855], [657, 360, 551],
    [71, 40, 57], [2005, 1160, 1539], [337, 200, 247], [2039, 1240, 1425],
    [257, 160, 171], [691, 440, 437], [1045, 680, 627], [301, 200, 171],
    [177, 120, 95], [2141, 1480, 1083], [1079, 760, 513], [725, 520, 323],
    [137, 100, 57], [2209, 1640, 855], [53, 40, 19], [2243, 1720, 741],
    [565, 440, 171], [759, 600, 209], [1147, 920, 285], [2311, 1880, 513],
    [97, 80, 19], [335, 280, 57], [1181, 1000, 171], [793, 680, 95],
    [599, 520, 57], [2413, 2120, 171], [405, 360, 19], [2447, 2200, 57],
    [11, 10, 0], [158, 151, 3], [178, 179, 7], [1030, 1091, 63],
    [248, 277, 21], [318, 375, 35], [458, 571, 63], [878, 1159, 147],
    [5, 7, 1], [172, 181, 37], [97, 76, 22], [72, 41, 17],
    [119, 47, 29], [4, 1, 1], [4, 1, 1], [4, 1, 1],
    [4, 1, 1], [4, 1, 1], [4, 1, 1], [4, 1, 1],
    [4, 1, 1], [4, 1, 1], [65, 18, 17], [95, 29, 26],
    [185, 62, 53], [30, 11, 9], [35, 14, 11], [85, 37, 28],
    [55, 26, 19], [80, 41, 29], [155, 86, 59], [5, 3, 2],
    [5, 3, 2], [5, 3, 2], [5, 3, 2], [5, 3, 2],
    [5, 3, 2], [5, 3, 2], [5, 3, 2], [5, 3, 2],
    [5, 3, 2], [5, 3, 2], [5, 3, 2], [5, 3, 2],
    [305, 176, 119], [155, 86, 59], [105, 56, 39], [80, 41, 29],
    [65, 32, 23], [55, 26, 19], [335, 152, 113], [85, 37, 28],
    [115, 48, 37], [35, 14, 11], [355, 136, 109], [30, 11, 9],
    [365, 128, 107], [185, 62, 53], [25, 8, 7], [95, 29, 26],
    [385, 112, 103], [65, 18, 17], [395, 104, 101], [4, 1, 1],
];

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn coefficients_are_normalized_and_mirrored() {
        for value in 0..=255u8 {
            let c = coefficients(f32::from(value));
            assert_relative_eq!(c.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
            assert_eq!(c, coefficients(f32::from(255 - value)));
        }
        // out of range values are clamped
        assert_eq!(coefficients(-40.0), coefficients(0.0));
        assert_eq!(coefficients(400.0), coefficients(255.0));
    }

    #[test]
    fn midtones_favor_the_next_pixel() {
        let [next, diagonal, below] = coefficients(20.0);
        assert!(next > diagonal && next > below);
    }
}
