//! Thomas Knoll's pattern dithering.

use super::{Ditherer, bayer8};
use crate::color_map::{ColorMap, luma};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;

/// Pattern dithering with error-compensated candidate lists.
///
/// For each pixel a list of candidates is built by repeatedly taking the nearest palette color to
/// the pixel color plus the accumulated error of the previous candidates (scaled by the
/// [`error_multiplier`](Self::error_multiplier)). The list is sorted by luma and the 8x8 Bayer
/// threshold of the pixel picks one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Knoll {
    /// The number of candidates per pixel.
    candidates: u8,
    /// How much of the accumulated error is added for the next candidate.
    error_multiplier: OrderedFloat<f32>,
}

impl Knoll {
    /// Create a new [`Knoll`] ditherer with 16 candidates and an error multiplier of `0.5`.
    #[must_use]
    pub const fn new() -> Self {
        Self { candidates: 16, error_multiplier: OrderedFloat(0.5) }
    }

    /// Sets the number of candidates per pixel.
    ///
    /// Returns `None` if `candidates` is zero.
    #[must_use]
    pub const fn candidates(self, candidates: u8) -> Option<Self> {
        if candidates == 0 { None } else { Some(Self { candidates, ..self }) }
    }

    /// Sets the error multiplier.
    ///
    /// Returns `None` if `error_multiplier` is not in the range `[0.0, 1.0]`.
    #[must_use]
    pub fn error_multiplier(self, error_multiplier: f32) -> Option<Self> {
        if (0.0..=1.0).contains(&error_multiplier) {
            Some(Self { error_multiplier: OrderedFloat(error_multiplier), ..self })
        } else {
            None
        }
    }

    /// Returns the number of candidates per pixel.
    #[inline]
    pub const fn get_candidates(&self) -> u8 {
        self.candidates
    }

    /// Returns the error multiplier.
    #[inline]
    pub const fn get_error_multiplier(&self) -> f32 {
        self.error_multiplier.0
    }
}

impl Default for Knoll {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for Knoll {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let multiplier = self.get_error_multiplier();
        let mut error = [0.0f32; 3];
        let mut candidates = Vec::with_capacity(usize::from(self.candidates));
        for _ in 0..self.candidates {
            let attempt = core::array::from_fn(|c| color[c] + error[c] * multiplier);
            let index = color_map.nearest(attempt);
            let chosen = color_map.color(index);
            for c in 0..3 {
                error[c] += color[c] - chosen[c];
            }
            candidates.push(index);
        }

        candidates.sort_by_key(|&i| (OrderedFloat(luma(color_map.color(i))), i));
        let n = candidates.len();
        let i = ((bayer8(x, y) * n as f32) as usize).min(n - 1);
        candidates[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{color_map::DistanceMetric, tests::*};

    #[test]
    fn candidates_follow_the_gray_level() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let knoll = Knoll::new();
        let white = |gray: f32| {
            (0..8)
                .flat_map(|y| (0..8).map(move |x| (x, y)))
                .filter(|&(x, y)| knoll.dither_pixel([gray; 3], x, y, &color_map) == 1)
                .count()
        };
        assert_eq!(white(0.0), 0);
        assert_eq!(white(255.0), 64);
        let quarter = white(64.0);
        assert!((12..=20).contains(&quarter), "{quarter}");
        assert!(white(192.0) > white(64.0));
    }

    #[test]
    fn options() {
        assert!(Knoll::new().candidates(0).is_none());
        assert!(Knoll::new().error_multiplier(1.5).is_none());
        let knoll = Knoll::new().error_multiplier(0.25);
        assert_eq!(knoll.map(|k| k.get_error_multiplier()), Some(0.25));
    }
}
