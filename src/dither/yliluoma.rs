//! Joel Yliluoma's arbitrary-palette positional dithering algorithms.
//!
//! Each pixel gets a mixing plan: a small multiset of palette colors whose average approximates
//! the pixel color. The 8x8 Bayer threshold of the pixel then picks one color of the plan, so that
//! the colors of a plan appear in proportion across each tile.
//!
//! <https://bisqwit.iki.fi/story/howto/dither/jy/>

use super::{Ditherer, bayer8};
use crate::color_map::{ColorMap, luma, squared_distance};
use alloc::vec::Vec;

/// The number of colors in a mixing plan of [`Yliluoma2`] and [`Yliluoma3`].
const PLAN_SIZE: usize = 16;

/// The default number of nearest palette colors considered for a plan.
const DEFAULT_CANDIDATES: u8 = 8;

/// Returns up to `n` palette colors nearest to `color` with their components.
fn candidates(color: [f32; 3], color_map: &ColorMap, n: u8) -> Vec<(u8, [f32; 3])> {
    color_map
        .n_nearest(color, usize::from(n))
        .into_iter()
        .map(|(i, _)| (i, color_map.color(i)))
        .collect()
}

/// Sort a plan by luma and return the entry chosen by `threshold`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn pick(mut plan: Vec<u8>, threshold: f32, color_map: &ColorMap) -> u8 {
    if plan.is_empty() {
        return 0;
    }
    plan.sort_by(|&a, &b| {
        luma(color_map.color(a))
            .total_cmp(&luma(color_map.color(b)))
            .then(a.cmp(&b))
    });
    let i = ((threshold * plan.len() as f32) as usize).min(plan.len() - 1);
    plan[i]
}

/// Yliluoma's algorithm 1: the best mix of two colors.
///
/// Every pair of nearby palette colors is tried with ratios in steps of `1/64`. The penalty of a
/// mix is its distance to the pixel color plus a term for the distance between the two colors, so
/// that mixes of similar colors are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Yliluoma1 {
    /// The number of nearest palette colors considered.
    candidates: u8,
}

impl Yliluoma1 {
    /// Create a new [`Yliluoma1`] ditherer considering the 8 nearest palette colors.
    #[must_use]
    pub const fn new() -> Self {
        Self { candidates: DEFAULT_CANDIDATES }
    }

    /// Sets the number of nearest palette colors considered for each pixel.
    ///
    /// Returns `None` if `candidates` is zero.
    #[must_use]
    pub const fn candidates(self, candidates: u8) -> Option<Self> {
        if candidates == 0 { None } else { Some(Self { candidates }) }
    }

    /// Returns the number of nearest palette colors considered.
    #[inline]
    pub const fn get_candidates(&self) -> u8 {
        self.candidates
    }
}

impl Default for Yliluoma1 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for Yliluoma1 {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[allow(clippy::cast_precision_loss)]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = candidates(color, color_map, self.candidates);
        let mut best = (color_map.nearest(color), color_map.nearest(color), 0.0, f32::INFINITY);

        for (a, &(i, ci)) in near.iter().enumerate() {
            for &(j, cj) in &near[a..] {
                let spread = squared_distance(ci, cj);
                for step in 0..=64 {
                    let ratio = step as f32 / 64.0;
                    let mix = core::array::from_fn(|c| ci[c] + (cj[c] - ci[c]) * ratio);
                    let penalty = squared_distance(color, mix)
                        + spread * 0.1 * ((ratio - 0.5).abs() + 0.5);
                    if penalty < best.3 {
                        best = (i, j, ratio, penalty);
                    }
                }
            }
        }

        let (i, j, ratio, _) = best;
        if bayer8(x, y) < ratio { j } else { i }
    }
}

/// Yliluoma's algorithm 2: a greedy plan of 16 colors.
///
/// Each step adds the palette color that brings the running average of the plan closest to the
/// pixel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Yliluoma2 {
    /// The number of nearest palette colors considered.
    candidates: u8,
}

impl Yliluoma2 {
    /// Create a new [`Yliluoma2`] ditherer considering the 8 nearest palette colors.
    #[must_use]
    pub const fn new() -> Self {
        Self { candidates: DEFAULT_CANDIDATES }
    }

    /// Sets the number of nearest palette colors considered for each pixel.
    ///
    /// Returns `None` if `candidates` is zero.
    #[must_use]
    pub const fn candidates(self, candidates: u8) -> Option<Self> {
        if candidates == 0 { None } else { Some(Self { candidates }) }
    }

    /// Returns the number of nearest palette colors considered.
    #[inline]
    pub const fn get_candidates(&self) -> u8 {
        self.candidates
    }
}

impl Default for Yliluoma2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for Yliluoma2 {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = candidates(color, color_map, self.candidates);
        let plan = build_plan(color, &near, |_| 1);
        pick(plan, bayer8(x, y), color_map)
    }
}

/// Yliluoma's algorithm 3: a greedy plan of 16 colors that may add several copies at once.
///
/// Like [`Yliluoma2`], but each step may add 1, 2, 4, .. copies of a color, up to the current
/// size of the plan, which avoids getting stuck on mixes that need more than one step to improve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Yliluoma3 {
    /// The number of nearest palette colors considered.
    candidates: u8,
}

impl Yliluoma3 {
    /// Create a new [`Yliluoma3`] ditherer considering the 8 nearest palette colors.
    #[must_use]
    pub const fn new() -> Self {
        Self { candidates: DEFAULT_CANDIDATES }
    }

    /// Sets the number of nearest palette colors considered for each pixel.
    ///
    /// Returns `None` if `candidates` is zero.
    #[must_use]
    pub const fn candidates(self, candidates: u8) -> Option<Self> {
        if candidates == 0 { None } else { Some(Self { candidates }) }
    }

    /// Returns the number of nearest palette colors considered.
    #[inline]
    pub const fn get_candidates(&self) -> u8 {
        self.candidates
    }
}

impl Default for Yliluoma3 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for Yliluoma3 {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = candidates(color, color_map, self.candidates);
        let plan = build_plan(color, &near, |len| len.max(1));
        pick(plan, bayer8(x, y), color_map)
    }
}

/// Greedily build a plan of [`PLAN_SIZE`] colors. `max_copies(len)` bounds the number of copies
/// added in one step; the copy counts tried are the powers of two up to that bound.
#[allow(clippy::cast_precision_loss)]
fn build_plan(
    color: [f32; 3],
    candidates: &[(u8, [f32; 3])],
    max_copies: impl Fn(usize) -> usize,
) -> Vec<u8> {
    let mut plan = Vec::with_capacity(PLAN_SIZE);
    let mut sum = [0.0f32; 3];

    while plan.len() < PLAN_SIZE {
        let len = plan.len();
        let max = max_copies(len).min(PLAN_SIZE - len);
        let mut best: Option<(u8, [f32; 3], usize, f32)> = None;
        for &(i, c) in candidates {
            let mut copies = 1;
            while copies <= max {
                let total = (len + copies) as f32;
                let mix = core::array::from_fn(|k| (sum[k] + c[k] * copies as f32) / total);
                let penalty = squared_distance(color, mix);
                if best.is_none_or(|b| penalty < b.3) {
                    best = Some((i, c, copies, penalty));
                }
                copies *= 2;
            }
        }
        let Some((i, c, copies, _)) = best else {
            break;
        };
        for k in 0..3 {
            sum[k] += c[k] * copies as f32;
        }
        plan.extend(core::iter::repeat_n(i, copies));
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Palette, color_map::DistanceMetric, dither::dither_image, tests::*};
    use palette::Srgb;

    fn count_white(ditherer: &(dyn Ditherer + Sync), gray: u8) -> usize {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(8, 8, Srgb::new(gray, gray, gray));
        let indices = dither_image(ditherer, image.as_ref(), &color_map, false);
        indices.iter().filter(|&&i| i == 1).count()
    }

    #[test]
    fn gray_levels_mix_black_and_white() {
        for ditherer in [
            &Yliluoma1::new() as &(dyn Ditherer + Sync),
            &Yliluoma2::new(),
            &Yliluoma3::new(),
        ] {
            assert_eq!(count_white(ditherer, 0), 0);
            assert_eq!(count_white(ditherer, 255), 64);
            let mid = count_white(ditherer, 128);
            assert!((24..=40).contains(&mid), "{mid}");
        }
    }

    #[test]
    fn plans_approximate_the_color() {
        let near = [(0, [0.0; 3]), (1, [255.0; 3])];
        let plan = build_plan([64.0; 3], &near, |_| 1);
        assert_eq!(plan.len(), PLAN_SIZE);
        assert_eq!(plan.iter().filter(|&&i| i == 1).count(), 4);

        let plan = build_plan([64.0; 3], &near, |len| len.max(1));
        assert_eq!(plan.len(), PLAN_SIZE);
        assert_eq!(plan.iter().filter(|&&i| i == 1).count(), 4);
    }

    #[test]
    fn single_color_palette() {
        let palette = Palette::new(vec![RED]).unwrap();
        let color_map = ColorMap::new(palette, DistanceMetric::Oklab).unwrap();
        assert_eq!(Yliluoma1::new().dither_pixel([10.0, 200.0, 30.0], 3, 5, &color_map), 0);
        assert_eq!(Yliluoma3::new().dither_pixel([10.0, 200.0, 30.0], 3, 5, &color_map), 0);
    }

    #[test]
    fn zero_candidates_are_rejected() {
        assert!(Yliluoma1::new().candidates(0).is_none());
        assert_eq!(Yliluoma2::new().candidates(3).map(|y| y.get_candidates()), Some(3));
    }
}
