//! Ditherers that express a color as a weighted mix of nearby palette colors.
//!
//! Each ditherer computes weights for a few palette colors near the pixel color. The colors are
//! sorted by luma and the 8x8 Bayer threshold of the pixel picks one of them through the
//! cumulative weights. Across a tile, each color then appears in proportion to its weight, so the
//! local average approximates the pixel color.

use super::{Ditherer, bayer8};
use crate::color_map::{ColorMap, luma, squared_distance};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;

/// Squared distances below this count as an exact match.
const EXACT: f32 = 1e-6;

/// Pick a palette index from weighted colors with the given threshold in `0.0..1.0`.
fn pick(mut mix: Vec<(u8, f32)>, threshold: f32, color_map: &ColorMap) -> u8 {
    mix.retain(|&(_, w)| w > 0.0);
    mix.sort_by_key(|&(i, _)| (OrderedFloat(luma(color_map.color(i))), i));
    let total = mix.iter().map(|&(_, w)| w).sum::<f32>();
    let target = threshold * total;
    let mut sum = 0.0;
    for &(i, w) in &mix {
        sum += w;
        if target < sum {
            return i;
        }
    }
    mix.last().map_or(0, |&(i, _)| i)
}

/// Inverse distance weights for `near`, which holds palette indices and squared distances.
///
/// Returns the exact match alone if there is one.
fn inverse_distance(near: &[(u8, f32)]) -> Vec<(u8, f32)> {
    match near.first() {
        Some(&(i, d)) if d < EXACT => Vec::from([(i, 1.0)]),
        _ => near.iter().map(|&(i, d)| (i, 1.0 / d.sqrt())).collect(),
    }
}

/// Returns the barycentric weights of the projection of `p` onto the plane of the triangle `t`,
/// or `None` if the triangle is degenerate.
fn barycentric(p: [f32; 3], t: [[f32; 3]; 3]) -> Option<[f32; 3]> {
    let sub = |a: [f32; 3], b: [f32; 3]| core::array::from_fn::<f32, 3, _>(|k| a[k] - b[k]);
    let dot = |a: [f32; 3], b: [f32; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];

    let (v0, v1, v2) = (sub(t[0], t[2]), sub(t[1], t[2]), sub(p, t[2]));
    let (d00, d01, d11) = (dot(v0, v0), dot(v0, v1), dot(v1, v1));
    let det = d00 * d11 - d01 * d01;
    if det <= 1e-6 * d00 * d11 || det <= 0.0 {
        return None;
    }
    let (d20, d21) = (dot(v2, v0), dot(v2, v1));
    let u = (d11 * d20 - d01 * d21) / det;
    let v = (d00 * d21 - d01 * d20) / det;
    Some([u, v, 1.0 - u - v])
}

/// Clamp negative weights to zero and renormalize, or `None` if nothing remains.
fn clamp_weights(weights: [f32; 3]) -> Option<[f32; 3]> {
    let weights = weights.map(|w| w.max(0.0));
    let total = weights.iter().sum::<f32>();
    (total > 0.0).then(|| weights.map(|w| w / total))
}

/// Returns the squared distance between `color` and the mix of `colors` with `weights`.
fn mix_error(color: [f32; 3], colors: [[f32; 3]; 3], weights: [f32; 3]) -> f32 {
    let mix = core::array::from_fn(|k| (0..3).map(|v| colors[v][k] * weights[v]).sum::<f32>());
    squared_distance(color, mix)
}

/// Mix the `n` nearest palette colors with inverse distance weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NClosest {
    /// The number of palette colors mixed.
    n: u8,
}

impl NClosest {
    /// Create a new [`NClosest`] ditherer mixing the 4 nearest palette colors.
    #[must_use]
    pub const fn new() -> Self {
        Self { n: 4 }
    }

    /// Sets the number of palette colors mixed.
    ///
    /// Returns `None` if `n` is zero.
    #[must_use]
    pub const fn n(self, n: u8) -> Option<Self> {
        if n == 0 { None } else { Some(Self { n }) }
    }

    /// Returns the number of palette colors mixed.
    #[inline]
    pub const fn get_n(&self) -> u8 {
        self.n
    }
}

impl Default for NClosest {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for NClosest {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = color_map.n_nearest(color, usize::from(self.n));
        pick(inverse_distance(&near), bayer8(x, y), color_map)
    }
}

/// Mix the 3 nearest palette colors with the barycentric coordinates of the pixel color.
///
/// The pixel color is projected onto the plane of the triangle formed by the three colors.
/// Negative coordinates are clamped to zero. For degenerate triangles and palettes with fewer
/// than three colors, inverse distance weights are used instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Barycentric;

impl Ditherer for Barycentric {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = color_map.n_nearest(color, 3);
        let weights = match near.as_slice() {
            &[(_, d), ..] if d < EXACT => None,
            &[(a, _), (b, _), (c, _)] => {
                let triangle = [a, b, c].map(|i| color_map.color(i));
                barycentric(color, triangle)
                    .and_then(clamp_weights)
                    .map(|[u, v, w]| Vec::from([(a, u), (b, v), (c, w)]))
            }
            _ => None,
        };
        let mix = weights.unwrap_or_else(|| inverse_distance(&near));
        pick(mix, bayer8(x, y), color_map)
    }
}

/// Mix the best triangle among the 6 nearest palette colors.
///
/// Every triangle of nearby colors is tried, and the one whose clamped barycentric mix comes
/// closest to the pixel color is used. This finds an enclosing triangle more often than
/// [`Barycentric`], which is limited to the 3 nearest colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tin;

/// The number of nearest palette colors [`Tin`] builds triangles from.
const TIN_CANDIDATES: usize = 6;

impl Ditherer for Tin {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = color_map.n_nearest(color, TIN_CANDIDATES);
        if near.first().is_some_and(|&(_, d)| d < EXACT) {
            return pick(inverse_distance(&near), bayer8(x, y), color_map);
        }

        let mut best: Option<([u8; 3], [f32; 3], f32)> = None;
        for a in 0..near.len() {
            for b in a + 1..near.len() {
                for c in b + 1..near.len() {
                    let indices = [near[a].0, near[b].0, near[c].0];
                    let triangle = indices.map(|i| color_map.color(i));
                    let Some(weights) = barycentric(color, triangle).and_then(clamp_weights) else {
                        continue;
                    };
                    let error = mix_error(color, triangle, weights);
                    if best.is_none_or(|(_, _, e)| error < e) {
                        best = Some((indices, weights, error));
                    }
                }
            }
        }

        let mix = match best {
            Some((indices, weights, _)) => indices.into_iter().zip(weights).collect(),
            None => inverse_distance(&near),
        };
        pick(mix, bayer8(x, y), color_map)
    }
}

/// The number of Frank-Wolfe iterations of [`NConvex`].
const ITERATIONS: usize = 32;

/// Mix the `n` nearest palette colors with the convex combination closest to the pixel color.
///
/// The weights are found with the Frank-Wolfe algorithm, starting from the nearest color and
/// moving toward one color at a time with an exact line search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NConvex {
    /// The number of palette colors mixed.
    n: u8,
}

impl NConvex {
    /// Create a new [`NConvex`] ditherer mixing the 4 nearest palette colors.
    #[must_use]
    pub const fn new() -> Self {
        Self { n: 4 }
    }

    /// Sets the number of palette colors mixed.
    ///
    /// Returns `None` if `n` is zero.
    #[must_use]
    pub const fn n(self, n: u8) -> Option<Self> {
        if n == 0 { None } else { Some(Self { n }) }
    }

    /// Returns the number of palette colors mixed.
    #[inline]
    pub const fn get_n(&self) -> u8 {
        self.n
    }
}

impl Default for NConvex {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for NConvex {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let near = color_map.n_nearest(color, usize::from(self.n));
        let colors = near.iter().map(|&(i, _)| color_map.color(i)).collect::<Vec<_>>();
        let weights = convex_weights(color, &colors);
        let mix = near.iter().zip(weights).map(|(&(i, _), w)| (i, w)).collect();
        pick(mix, bayer8(x, y), color_map)
    }
}

/// Returns the weights of the convex combination of `colors` closest to `color`.
fn convex_weights(color: [f32; 3], colors: &[[f32; 3]]) -> Vec<f32> {
    let mut weights = alloc::vec![0.0; colors.len()];
    let Some(&first) = colors.first() else {
        return weights;
    };
    weights[0] = 1.0;
    let mut mix = first;

    for _ in 0..ITERATIONS {
        let residual: [f32; 3] = core::array::from_fn(|k| mix[k] - color[k]);
        let gradient = |c: &[f32; 3]| residual[0] * c[0] + residual[1] * c[1] + residual[2] * c[2];
        let Some((s, _)) = colors
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| gradient(a).total_cmp(&gradient(b)))
        else {
            break;
        };

        let direction: [f32; 3] = core::array::from_fn(|k| colors[s][k] - mix[k]);
        let length = direction.iter().map(|d| d * d).sum::<f32>();
        if length < EXACT {
            break;
        }
        let descent = -(0..3).map(|k| residual[k] * direction[k]).sum::<f32>();
        let step = (descent / length).clamp(0.0, 1.0);
        if step <= 0.0 {
            break;
        }
        for (i, w) in weights.iter_mut().enumerate() {
            *w *= 1.0 - step;
            if i == s {
                *w += step;
            }
        }
        mix = core::array::from_fn(|k| mix[k] + step * direction[k]);
    }

    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Palette, color_map::DistanceMetric, tests::*};
    use approx::assert_relative_eq;

    fn count_white(ditherer: &dyn Ditherer, gray: f32) -> usize {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .filter(|&(x, y)| ditherer.dither_pixel([gray; 3], x, y, &color_map) == 1)
            .count()
    }

    #[test]
    fn two_colors_mix_linearly() {
        for ditherer in [&NClosest::new() as &dyn Ditherer, &Barycentric, &Tin, &NConvex::new()] {
            assert_eq!(count_white(ditherer, 0.0), 0);
            assert_eq!(count_white(ditherer, 255.0), 64);
            assert_eq!(count_white(ditherer, 63.75), 16);
            assert_eq!(count_white(ditherer, 127.5), 32);
        }
    }

    #[test]
    fn exact_matches_are_kept() {
        let palette = Palette::new(vec![BLACK, WHITE, RED, GREEN, BLUE]).unwrap();
        let color_map = ColorMap::new(palette, DistanceMetric::EuclideanRgb).unwrap();
        for ditherer in [&NClosest::new() as &dyn Ditherer, &Barycentric, &Tin, &NConvex::new()] {
            for (i, &color) in color_map.colors().iter().enumerate() {
                for (x, y) in [(0, 0), (3, 5), (7, 7)] {
                    assert_eq!(usize::from(ditherer.dither_pixel(color, x, y, &color_map)), i);
                }
            }
        }
    }

    #[test]
    fn barycentric_weights() {
        let triangle = [[0.0, 0.0, 0.0], [255.0, 0.0, 0.0], [0.0, 255.0, 0.0]];
        let weights = barycentric([51.0, 102.0, 40.0], triangle).unwrap();
        assert_relative_eq!(weights[0], 0.4, epsilon = 1e-5);
        assert_relative_eq!(weights[1], 0.2, epsilon = 1e-5);
        assert_relative_eq!(weights[2], 0.4, epsilon = 1e-5);

        let line = [[0.0; 3], [10.0; 3], [20.0; 3]];
        assert!(barycentric([5.0; 3], line).is_none());
        assert_eq!(clamp_weights([-1.0, 1.0, 1.0]), Some([0.0, 0.5, 0.5]));
    }

    #[test]
    fn convex_weights_reach_interior_colors() {
        let colors = [[0.0, 0.0, 0.0], [255.0, 0.0, 0.0], [0.0, 255.0, 0.0], [0.0, 0.0, 255.0]];
        let weights = convex_weights([51.0, 51.0, 51.0], &colors);
        assert_relative_eq!(weights.iter().sum::<f32>(), 1.0, epsilon = 1e-4);
        for (w, expected) in weights.iter().zip([0.4, 0.2, 0.2, 0.2]) {
            assert_relative_eq!(*w, expected, epsilon = 0.02);
        }
    }

    #[test]
    fn options() {
        assert!(NClosest::new().n(0).is_none());
        assert_eq!(NConvex::new().n(2).map(|n| n.get_n()), Some(2));
    }
}
