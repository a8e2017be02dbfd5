//! Direct binary search.

use super::Ditherer;
use crate::{ImageRef, color_map::ColorMap, components};
use alloc::{vec, vec::Vec};

/// The standard deviation of the Gaussian model of the human visual system, in pixels.
const SIGMA: f32 = 1.2;

/// The radius of the Gaussian filter.
const RADIUS: isize = 3;

/// The radius of the autocorrelation of the Gaussian filter.
const REACH: isize = 2 * RADIUS;

/// The width of the autocorrelation table.
const SPAN: usize = (2 * REACH + 1) as usize;

/// Direct binary search (DBS) halftoning, generalized to palettes.
///
/// The error between the chosen and the source colors is perceived through a Gaussian low-pass
/// filter. Starting from the nearest palette colors, each pass visits every pixel and swaps its
/// color for the candidate that lowers the filtered squared error the most. Passes stop early
/// once no pixel changes.
///
/// The change in filtered error of swapping pixel `p` by `Δ` is `2 Δ · c_pe(p) + |Δ|² c_pp(0)`,
/// where `c_pp` is the autocorrelation of the filter and `c_pe` the cross-correlation of the
/// filter with the current error, which is updated after each swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dbs {
    /// The maximum number of passes.
    passes: u8,
    /// The number of nearest palette colors tried for each pixel.
    candidates: u8,
}

impl Dbs {
    /// Create a new [`Dbs`] ditherer with at most 4 passes trying the 4 nearest palette colors.
    #[must_use]
    pub const fn new() -> Self {
        Self { passes: 4, candidates: 4 }
    }

    /// Sets the maximum number of passes.
    ///
    /// Returns `None` if `passes` is zero.
    #[must_use]
    pub const fn passes(self, passes: u8) -> Option<Self> {
        if passes == 0 { None } else { Some(Self { passes, ..self }) }
    }

    /// Sets the number of nearest palette colors tried for each pixel.
    ///
    /// Returns `None` if `candidates` is zero.
    #[must_use]
    pub const fn candidates(self, candidates: u8) -> Option<Self> {
        if candidates == 0 { None } else { Some(Self { candidates, ..self }) }
    }

    /// Returns the maximum number of passes.
    #[inline]
    pub const fn get_passes(&self) -> u8 {
        self.passes
    }

    /// Returns the number of nearest palette colors tried for each pixel.
    #[inline]
    pub const fn get_candidates(&self) -> u8 {
        self.candidates
    }
}

impl Default for Dbs {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the autocorrelation of the normalized Gaussian filter for offsets within [`REACH`].
#[allow(clippy::cast_precision_loss)]
fn autocorrelation() -> Vec<f32> {
    let side = (2 * RADIUS + 1) as usize;
    let mut filter = (-RADIUS..=RADIUS)
        .flat_map(|y| (-RADIUS..=RADIUS).map(move |x| (x, y)))
        .map(|(x, y)| (-((x * x + y * y) as f32) / (2.0 * SIGMA * SIGMA)).exp())
        .collect::<Vec<_>>();
    let total = filter.iter().sum::<f32>();
    for f in &mut filter {
        *f /= total;
    }

    let at = |x: isize, y: isize| {
        if x.abs() > RADIUS || y.abs() > RADIUS {
            0.0
        } else {
            #[allow(clippy::cast_sign_loss)]
            let i = (y + RADIUS) as usize * side + (x + RADIUS) as usize;
            filter[i]
        }
    };

    (-REACH..=REACH)
        .flat_map(|dy| (-REACH..=REACH).map(move |dx| (dx, dy)))
        .map(|(dx, dy)| {
            let mut sum = 0.0;
            for y in -RADIUS..=RADIUS {
                for x in -RADIUS..=RADIUS {
                    sum += at(x, y) * at(x + dx, y + dy);
                }
            }
            sum
        })
        .collect()
}

/// The filtered squared error state of an image.
struct Correlation<'a> {
    /// The autocorrelation of the filter.
    cpp: &'a [f32],
    width: isize,
    height: isize,
    /// The cross-correlation of the filter with the error at each pixel.
    cpe: Vec<[f32; 3]>,
}

impl Correlation<'_> {
    /// Add the contribution of `error` at pixel (`x`, `y`).
    #[allow(clippy::cast_sign_loss)]
    fn add(&mut self, x: isize, y: isize, error: [f32; 3]) {
        for dy in -REACH..=REACH {
            let ty = y + dy;
            if !(0..self.height).contains(&ty) {
                continue;
            }
            for dx in -REACH..=REACH {
                let tx = x + dx;
                if !(0..self.width).contains(&tx) {
                    continue;
                }
                let c = self.cpp[(dy + REACH) as usize * SPAN + (dx + REACH) as usize];
                let target = &mut self.cpe[(ty * self.width + tx) as usize];
                for k in 0..3 {
                    target[k] += c * error[k];
                }
            }
        }
    }
}

impl Ditherer for Dbs {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        let (width, height) = (image.width() as isize, image.height() as isize);
        let pixels = image.as_slice();
        let cpp = autocorrelation();
        let center = cpp[REACH as usize * SPAN + REACH as usize];

        let mut correlation = Correlation {
            cpp: &cpp,
            width,
            height,
            cpe: vec![[0.0; 3]; pixels.len()],
        };
        for (i, (index, &pixel)) in indices.iter_mut().zip(pixels).enumerate() {
            let source = components(pixel);
            *index = color_map.nearest(source);
            let chosen = color_map.color(*index);
            let (x, y) = (i as isize % width, i as isize / width);
            correlation.add(x, y, core::array::from_fn(|k| chosen[k] - source[k]));
        }

        for pass in 0..self.passes {
            let mut changes = 0usize;
            for (i, &pixel) in pixels.iter().enumerate() {
                let current = color_map.color(indices[i]);
                let cpe = correlation.cpe[i];
                let mut best = (indices[i], 0.0f32);
                let candidates = color_map.n_nearest(components(pixel), self.candidates.into());
                for (candidate, _) in candidates {
                    if candidate == indices[i] {
                        continue;
                    }
                    let color = color_map.color(candidate);
                    let mut delta_error = 0.0;
                    for k in 0..3 {
                        let delta = color[k] - current[k];
                        delta_error += 2.0 * delta * cpe[k] + delta * delta * center;
                    }
                    if delta_error < best.1 {
                        best = (candidate, delta_error);
                    }
                }

                if best.0 != indices[i] {
                    let color = color_map.color(best.0);
                    let (x, y) = (i as isize % width, i as isize / width);
                    correlation.add(x, y, core::array::from_fn(|k| color[k] - current[k]));
                    indices[i] = best.0;
                    changes += 1;
                }
            }

            tracing::trace!(pass, changes, "direct binary search pass");
            if changes == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{color_map::DistanceMetric, dither::dither_image, tests::*};
    use approx::assert_relative_eq;
    use palette::Srgb;

    #[test]
    fn autocorrelation_is_symmetric_and_peaks_at_zero() {
        let cpp = autocorrelation();
        assert_eq!(cpp.len(), SPAN * SPAN);
        let center = cpp[SPAN * SPAN / 2];
        assert!(cpp.iter().all(|&c| c <= center));
        for i in 0..cpp.len() {
            assert_relative_eq!(cpp[i], cpp[cpp.len() - 1 - i], epsilon = 1e-7);
        }
        // the filter sums to one, so its autocorrelation does too
        assert_relative_eq!(cpp.iter().sum::<f32>(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn gray_is_halftoned() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(16, 16, Srgb::new(64, 64, 64));
        let indices = dither_image(&Dbs::new(), image.as_ref(), &color_map, false);
        let white = indices.iter().filter(|&&i| i == 1).count();
        assert!((40..=90).contains(&white), "{white}");
    }

    #[test]
    fn options() {
        assert!(Dbs::new().passes(0).is_none());
        assert!(Dbs::new().candidates(0).is_none());
        assert_eq!(Dbs::new().passes(2).map(|d| d.get_passes()), Some(2));
    }
}
