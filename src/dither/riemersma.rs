//! Riemersma dithering along a space-filling curve.

use super::{Ditherer, clamp_color};
use crate::{ImageRef, color_map::ColorMap, components};
use alloc::{collections::VecDeque, vec, vec::Vec};
use ordered_float::OrderedFloat;

/// The largest Hilbert curve order, a 128x128 tile.
const MAX_HILBERT_ORDER: u32 = 7;

/// The largest Peano curve order, a 243x243 tile.
const MAX_PEANO_ORDER: u32 = 5;

/// The path along which [`Riemersma`] visits the pixels of an image.
///
/// The Hilbert and Peano curves are sized to cover the image, up to a maximum tile size.
/// Larger images are covered by tiles of the curve, visited in serpentine order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Curve {
    /// The Hilbert curve, with tiles of up to 128x128 pixels.
    #[default]
    Hilbert,
    /// The Peano curve, with tiles of up to 243x243 pixels.
    Peano,
    /// Rows from left to right.
    Linear,
    /// Rows alternating between left to right and right to left.
    Serpentine,
}

/// Riemersma dithering.
///
/// Pixels are visited along a [`Curve`]. The error of the last
/// [`history_length`](Self::history_length) pixels is kept, and each pixel is corrected by the
/// weighted sum of that history. Weights rise exponentially from `1 / ratio` for the oldest
/// entry to `1` for the newest one.
///
/// Thiadmer Riemersma, A Balanced Dithering Technique, C/C++ Users Journal, December 1998.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Riemersma {
    /// The traversal curve.
    curve: Curve,
    /// The number of error entries kept.
    history_length: u8,
    /// The ratio between the newest and the oldest weight.
    ratio: OrderedFloat<f32>,
}

impl Riemersma {
    /// Create a new [`Riemersma`] ditherer along `curve` with a history of 16 entries and a
    /// weight ratio of 16.
    #[must_use]
    pub const fn new(curve: Curve) -> Self {
        Self { curve, history_length: 16, ratio: OrderedFloat(16.0) }
    }

    /// Sets the number of error entries kept.
    ///
    /// Returns `None` if `history_length` is zero.
    #[must_use]
    pub const fn history_length(self, history_length: u8) -> Option<Self> {
        if history_length == 0 { None } else { Some(Self { history_length, ..self }) }
    }

    /// Sets the ratio between the weight of the newest and the oldest error entry.
    ///
    /// Returns `None` if `ratio` is not finite or less than `1.0`.
    #[must_use]
    pub fn ratio(self, ratio: f32) -> Option<Self> {
        (ratio.is_finite() && ratio >= 1.0).then_some(Self { ratio: OrderedFloat(ratio), ..self })
    }

    /// Returns the traversal curve.
    #[inline]
    pub const fn get_curve(&self) -> Curve {
        self.curve
    }

    /// Returns the number of error entries kept.
    #[inline]
    pub const fn get_history_length(&self) -> u8 {
        self.history_length
    }

    /// Returns the ratio between the newest and the oldest weight.
    #[inline]
    pub const fn get_ratio(&self) -> f32 {
        self.ratio.0
    }

    /// The weights from the oldest to the newest history entry.
    #[allow(clippy::cast_precision_loss)]
    fn weights(&self) -> Vec<f32> {
        let n = usize::from(self.history_length);
        let last = (n - 1).max(1) as f32;
        (0..n)
            .map(|i| self.get_ratio().powf(-((n - 1 - i) as f32) / last))
            .collect()
    }
}

impl Default for Riemersma {
    fn default() -> Self {
        Self::new(Curve::Hilbert)
    }
}

impl Ditherer for Riemersma {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        let (width, height) = image.dimensions();
        let pixels = image.as_slice();
        let weights = self.weights();
        let mut history = VecDeque::from(vec![[0.0f32; 3]; weights.len()]);

        for (x, y) in traversal(self.curve, width, height) {
            let i = y as usize * width as usize + x as usize;
            let source = components(pixels[i]);

            let mut correction = [0.0; 3];
            for (w, error) in weights.iter().zip(&history) {
                for c in 0..3 {
                    correction[c] += w * error[c];
                }
            }
            let adjusted = clamp_color(core::array::from_fn(|c| source[c] + correction[c]));
            let index = color_map.nearest(adjusted);
            let chosen = color_map.color(index);
            indices[i] = index;

            history.pop_front();
            history.push_back(core::array::from_fn(|c| source[c] - chosen[c]));
        }
    }
}

/// Returns every pixel of a `width` by `height` image once, in the visiting order of `curve`.
fn traversal(curve: Curve, width: u32, height: u32) -> Vec<(u32, u32)> {
    match curve {
        Curve::Linear => (0..height).flat_map(|y| (0..width).map(move |x| (x, y))).collect(),
        Curve::Serpentine => (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| if y % 2 == 0 { (x, y) } else { (width - 1 - x, y) })
            })
            .collect(),
        Curve::Hilbert => {
            let order = order_for(2, width.max(height), MAX_HILBERT_ORDER);
            tiled(&hilbert(order), 1 << order, width, height)
        }
        Curve::Peano => {
            let order = order_for(3, width.max(height), MAX_PEANO_ORDER);
            tiled(&peano(order), 3u32.pow(order), width, height)
        }
    }
}

/// The smallest order in `1..=max` whose tile of side `base^order` covers `size`.
fn order_for(base: u32, size: u32, max: u32) -> u32 {
    let mut order = 1;
    while order < max && base.pow(order) < size {
        order += 1;
    }
    order
}

/// Cover the image with tiles of `curve`, skipping points outside of the image.
fn tiled(curve: &[(u32, u32)], side: u32, width: u32, height: u32) -> Vec<(u32, u32)> {
    let (tiles_x, tiles_y) = (width.div_ceil(side), height.div_ceil(side));
    let mut points = Vec::with_capacity(width as usize * height as usize);
    for ty in 0..tiles_y {
        for i in 0..tiles_x {
            let tx = if ty % 2 == 0 { i } else { tiles_x - 1 - i };
            points.extend(
                curve
                    .iter()
                    .map(|&(x, y)| (tx * side + x, ty * side + y))
                    .filter(|&(x, y)| x < width && y < height),
            );
        }
    }
    points
}

/// The points of a Hilbert curve on a `2^order` by `2^order` grid.
fn hilbert(order: u32) -> Vec<(u32, u32)> {
    let n = 1u32 << order;
    (0..n * n)
        .map(|d| {
            let (mut x, mut y, mut t) = (0, 0, d);
            let mut s = 1;
            while s < n {
                let rx = 1 & (t / 2);
                let ry = 1 & (t ^ rx);
                if ry == 0 {
                    if rx == 1 {
                        x = s - 1 - x;
                        y = s - 1 - y;
                    }
                    core::mem::swap(&mut x, &mut y);
                }
                x += s * rx;
                y += s * ry;
                t /= 4;
                s *= 2;
            }
            (x, y)
        })
        .collect()
}

/// The points of a Peano curve on a `3^order` by `3^order` grid.
///
/// The grid is split into 3x3 blocks visited column by column in serpentine order. A block in an
/// odd row is mirrored horizontally and a block in an odd column is mirrored vertically, so that
/// consecutive blocks connect.
fn peano(order: u32) -> Vec<(u32, u32)> {
    if order == 0 {
        return vec![(0, 0)];
    }
    let sub = peano(order - 1);
    let s = 3u32.pow(order - 1);
    let mut points = Vec::with_capacity(sub.len() * 9);
    for block in 0..9 {
        let col = block / 3;
        let row = if col % 2 == 0 { block % 3 } else { 2 - block % 3 };
        points.extend(sub.iter().map(|&(x, y)| {
            let x = if row % 2 == 1 { s - 1 - x } else { x };
            let y = if col % 2 == 1 { s - 1 - y } else { y };
            (col * s + x, row * s + y)
        }));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{color_map::DistanceMetric, dither::dither_image, tests::*};
    use palette::Srgb;

    const CURVES: [Curve; 4] = [Curve::Hilbert, Curve::Peano, Curve::Linear, Curve::Serpentine];

    fn is_continuous(points: &[(u32, u32)]) -> bool {
        points
            .windows(2)
            .all(|w| w[0].0.abs_diff(w[1].0) + w[0].1.abs_diff(w[1].1) == 1)
    }

    #[test]
    fn curves_are_continuous() {
        for order in 1..=4 {
            let points = hilbert(order);
            assert_eq!(points.len(), 1 << (2 * order));
            assert!(is_continuous(&points));
        }
        for order in 1..=3 {
            let points = peano(order);
            assert_eq!(points.len(), 9usize.pow(order));
            assert!(is_continuous(&points));
        }
        assert!(is_continuous(&traversal(Curve::Serpentine, 5, 4)));
    }

    #[test]
    fn traversals_visit_every_pixel_once() {
        for curve in CURVES {
            for (width, height) in [(1, 1), (5, 3), (130, 2), (250, 1), (3, 300)] {
                let mut points = traversal(curve, width, height);
                assert_eq!(points.len(), (width * height) as usize, "{curve:?}");
                points.sort_unstable_by_key(|&(x, y)| (y, x));
                points.dedup();
                assert_eq!(points.len(), (width * height) as usize, "{curve:?}");
            }
        }
    }

    #[test]
    fn orders_are_clamped() {
        assert_eq!(order_for(2, 1, MAX_HILBERT_ORDER), 1);
        assert_eq!(order_for(2, 100, MAX_HILBERT_ORDER), 7);
        assert_eq!(order_for(2, 1000, MAX_HILBERT_ORDER), 7);
        assert_eq!(order_for(3, 10, MAX_PEANO_ORDER), 3);
        assert_eq!(order_for(3, 1000, MAX_PEANO_ORDER), 5);
    }

    #[test]
    fn weights_rise_to_the_newest_entry() {
        let weights = Riemersma::new(Curve::Hilbert).weights();
        assert_eq!(weights.len(), 16);
        approx::assert_relative_eq!(weights[15], 1.0);
        approx::assert_relative_eq!(weights[0], 1.0 / 16.0, epsilon = 1e-6);
        assert!(weights.windows(2).all(|w| w[0] < w[1]));

        let single = Riemersma::new(Curve::Linear).history_length(1).unwrap().weights();
        assert_eq!(single, vec![1.0]);
    }

    #[test]
    fn gray_mixes_in_proportion() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(16, 16, Srgb::new(64, 64, 64));
        for curve in CURVES {
            let indices = dither_image(&Riemersma::new(curve), image.as_ref(), &color_map, false);
            let white = indices.iter().filter(|&&i| i == 1).count();
            assert!((48..=80).contains(&white), "{curve:?}: {white}");
        }
    }

    #[test]
    fn options() {
        assert!(Riemersma::new(Curve::Peano).history_length(0).is_none());
        assert!(Riemersma::new(Curve::Peano).ratio(0.5).is_none());
        assert!(Riemersma::new(Curve::Peano).ratio(f32::INFINITY).is_none());
        assert_eq!(Riemersma::new(Curve::Peano).ratio(4.0).map(|r| r.get_ratio()), Some(4.0));
        assert_eq!(Riemersma::default().get_curve(), Curve::Hilbert);
    }
}
