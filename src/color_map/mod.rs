//! Map colors to the nearest color of a palette.

use crate::Palette;
use alloc::vec::Vec;
use palette::{FromColor as _, Oklab, Srgb};
use wide::f32x8;

mod nearest_neighbor;

pub(crate) use nearest_neighbor::{
    n_nearest, simd_argmin_min_distance, squared_distance, to_simd_chunks,
};

/// The color space in which the distance between two colors is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    /// Euclidean distance between gamma encoded sRGB components.
    #[default]
    EuclideanRgb,
    /// Euclidean distance in the perceptually uniform [`Oklab`] color space.
    Oklab,
}

impl DistanceMetric {
    /// Project an sRGB color with components in `0.0..=255.0` into the space of this metric.
    ///
    /// Components outside the valid range are clamped first.
    #[inline]
    pub fn project(self, color: [f32; 3]) -> [f32; 3] {
        match self {
            Self::EuclideanRgb => color,
            Self::Oklab => {
                let [r, g, b] = color.map(|c| c.clamp(0.0, 255.0) / 255.0);
                let Oklab { l, a, b } = Oklab::from_color(Srgb::new(r, g, b).into_linear());
                // scale to roughly the same magnitude as sRGB components
                [l, a, b].map(|c| c * 255.0)
            }
        }
    }
}

/// A lookup structure mapping colors to their nearest palette color.
///
/// Colors are passed as `[f32; 3]` sRGB components in the `0.0..=255.0` range.
/// Ditherers may pass colors outside of this range after adding error terms.
///
/// # Examples
///
/// ```
/// # use palettize::{Palette, color_map::{ColorMap, DistanceMetric}};
/// # use palette::Srgb;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let palette = Palette::new(vec![Srgb::new(0, 0, 0), Srgb::new(255, 255, 255)])?;
/// let color_map = ColorMap::new(palette, DistanceMetric::EuclideanRgb).unwrap();
/// assert_eq!(color_map.nearest([200.0, 180.0, 220.0]), 1);
/// assert_eq!(color_map.nearest([-20.0, 10.0, 0.0]), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ColorMap {
    /// The palette of colors.
    palette: Palette,
    /// The palette colors as sRGB components.
    colors: Vec<[f32; 3]>,
    /// The palette colors projected into the metric space.
    projected: Vec<[f32; 3]>,
    /// The projected palette colors laid out in AoSoA format.
    data: Vec<[f32x8; 3]>,
    /// The distance metric.
    metric: DistanceMetric,
    /// The mean distance from each palette color to its nearest neighbor, per channel.
    spread: f32,
}

impl ColorMap {
    /// Create a new [`ColorMap`] from a palette and a distance metric.
    ///
    /// Returns `None` if the palette is empty.
    #[must_use]
    pub fn new(palette: Palette, metric: DistanceMetric) -> Option<Self> {
        if palette.is_empty() {
            return None;
        }
        let colors = palette.to_components();
        let projected = colors.iter().map(|&c| metric.project(c)).collect::<Vec<_>>();
        let data = to_simd_chunks(&projected);
        let spread = spread(&colors);
        Some(Self { palette, colors, projected, data, metric, spread })
    }

    /// Returns the palette of this [`ColorMap`].
    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Consume this [`ColorMap`] and return its palette.
    #[must_use]
    #[inline]
    pub fn into_palette(self) -> Palette {
        self.palette
    }

    /// Returns the number of palette colors.
    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`, since a [`ColorMap`] cannot be created from an empty palette.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns the distance metric used for lookups.
    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Returns the palette colors as sRGB components.
    #[inline]
    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    /// Returns the sRGB components of the palette color at `index`.
    #[inline]
    pub fn color(&self, index: u8) -> [f32; 3] {
        self.colors[usize::from(index)]
    }

    /// Returns the mean distance between each palette color and its nearest other palette color,
    /// divided by `sqrt(3)` to give a per channel amount.
    ///
    /// Threshold based ditherers scale their perturbation by this amount. It is `0.0` for a palette
    /// with a single color.
    #[inline]
    pub fn spread(&self) -> f32 {
        self.spread
    }

    /// Returns the index of the palette color nearest to `color`.
    #[inline]
    pub fn nearest(&self, color: [f32; 3]) -> u8 {
        self.nearest_with_distance(color).0
    }

    /// Returns the index of the palette color nearest to `color` and the squared distance to it
    /// in the metric space.
    #[inline]
    pub fn nearest_with_distance(&self, color: [f32; 3]) -> (u8, f32) {
        let ((chunk, lane), distance) =
            simd_argmin_min_distance(&self.data, self.metric.project(color));
        (chunk * 8 + lane, distance)
    }

    /// Returns up to `n` palette indices nearest to `color` and their squared distances in the
    /// metric space, sorted from nearest to farthest.
    #[must_use]
    pub fn n_nearest(&self, color: [f32; 3], n: usize) -> Vec<(u8, f32)> {
        n_nearest(&self.projected, self.metric.project(color), n)
    }
}

/// Compute the mean nearest neighbor distance of the palette colors per channel.
fn spread(colors: &[[f32; 3]]) -> f32 {
    if colors.len() < 2 {
        return 0.0;
    }
    let total = colors
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            colors
                .iter()
                .enumerate()
                .filter(|&(j, _)| i != j)
                .map(|(_, &b)| squared_distance(a, b))
                .fold(f32::INFINITY, f32::min)
                .sqrt()
        })
        .sum::<f32>();

    #[allow(clippy::cast_precision_loss)]
    let mean = total / colors.len() as f32;
    mean / 3.0f32.sqrt()
}

/// Returns the luma of an sRGB color with components in `0.0..=255.0`.
#[inline]
pub(crate) fn luma(color: [f32; 3]) -> f32 {
    0.299 * color[0] + 0.587 * color[1] + 0.114 * color[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_palette_has_no_color_map() {
        assert!(ColorMap::new(Palette::default(), DistanceMetric::EuclideanRgb).is_none());
    }

    #[test]
    fn single_color_spread_is_zero() {
        let palette = Palette::new(vec![RED]).unwrap();
        let color_map = ColorMap::new(palette, DistanceMetric::Oklab).unwrap();
        assert_relative_eq!(color_map.spread(), 0.0);
        assert_eq!(color_map.nearest([0.0, 0.0, 255.0]), 0);
    }

    #[test]
    fn black_white_spread_is_full_range() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        assert_relative_eq!(color_map.spread(), 255.0, epsilon = 1e-3);
    }

    #[test]
    fn metrics_agree_on_obvious_colors() {
        let palette = Palette::new(vec![BLACK, WHITE, RED, GREEN, BLUE]).unwrap();
        for metric in [DistanceMetric::EuclideanRgb, DistanceMetric::Oklab] {
            let color_map = ColorMap::new(palette.clone(), metric).unwrap();
            assert_eq!(color_map.nearest([10.0, 5.0, 0.0]), 0);
            assert_eq!(color_map.nearest([250.0, 240.0, 245.0]), 1);
            assert_eq!(color_map.nearest([230.0, 20.0, 10.0]), 2);
            assert_eq!(color_map.nearest([0.0, 0.0, 200.0]), 4);
            let nearest = color_map.n_nearest([230.0, 20.0, 10.0], 3);
            assert_eq!(nearest.len(), 3);
            assert_eq!(nearest[0].0, 2);
        }
    }
}
