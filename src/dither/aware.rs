//! Ditherers that adapt to the local structure of the image.

use super::{
    Ditherer, Kernel, NamedKernel, bayer8,
    error_diffusion::{Tap, diffuse},
};
use crate::{
    ImageRef,
    color_map::{ColorMap, luma},
    components,
};
use alloc::vec::Vec;
use core::ops::Range;
use ordered_float::OrderedFloat;

/// Returns the luma of every pixel of `image`.
fn luma_plane(image: ImageRef<'_>) -> Vec<f32> {
    luma_rows(image, 0..image.height() as usize)
}

/// Returns the luma of every pixel in the given `rows` of `image`.
fn luma_rows(image: ImageRef<'_>, rows: Range<usize>) -> Vec<f32> {
    let width = image.width() as usize;
    image.as_slice()[rows.start * width..rows.end * width]
        .iter()
        .map(|&p| luma(components(p)))
        .collect()
}

/// Returns the luma at (`x`, `y`), clamping coordinates to the image.
#[inline]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn luma_at(plane: &[f32], width: usize, height: usize, x: isize, y: isize) -> f32 {
    let x = x.clamp(0, width as isize - 1) as usize;
    let y = y.clamp(0, height as isize - 1) as usize;
    plane[y * width + x]
}

/// The taps of a named kernel scaled by `strength`, with the same weight for each channel.
fn kernel_taps(kernel: NamedKernel, strength: f32) -> Vec<Tap> {
    Kernel::from(kernel)
        .taps()
        .iter()
        .map(|&(dx, dy, w)| (dx, dy, [w * strength; 3]))
        .collect()
}

/// Structure-aware error diffusion.
///
/// A serpentine Floyd-Steinberg diffusion where the weight of each tap is damped by
/// `exp(-|Δluma| / sigma)`, the luma difference between the source pixel and the tap's pixel.
/// Error does not leak across strong edges, which keeps them sharp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureAware {
    /// The luma difference over which the weight drops by a factor of `e`.
    sigma: OrderedFloat<f32>,
}

impl StructureAware {
    /// Create a new [`StructureAware`] ditherer with `sigma = 24.0`.
    #[must_use]
    pub const fn new() -> Self {
        Self { sigma: OrderedFloat(24.0) }
    }

    /// Sets the edge sensitivity.
    ///
    /// Returns `None` if `sigma` is not positive and finite.
    #[must_use]
    pub fn sigma(self, sigma: f32) -> Option<Self> {
        (sigma.is_finite() && sigma > 0.0).then_some(Self { sigma: OrderedFloat(sigma) })
    }

    /// Returns the edge sensitivity.
    #[inline]
    pub const fn get_sigma(&self) -> f32 {
        self.sigma.0
    }
}

impl Default for StructureAware {
    fn default() -> Self {
        Self::new()
    }
}

impl Ditherer for StructureAware {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    #[allow(clippy::cast_possible_wrap)]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = luma_plane(image);
        let base = kernel_taps(NamedKernel::FloydSteinberg, 1.0);
        let sigma = self.get_sigma();

        diffuse(image, color_map, indices, true, 1, |x, y, dir, _, out| {
            let here = plane[y * width + x];
            out.extend(base.iter().map(|&(dx, dy, w)| {
                let tx = x as isize + isize::from(dx) * dir;
                let ty = (y + usize::from(dy)) as isize;
                let there = luma_at(&plane, width, height, tx, ty);
                let damping = (-(here - there).abs() / sigma).exp();
                (dx, dy, w.map(|w| w * damping))
            }));
        });
    }
}

/// Error diffusion that adapts its kernel and strength to the local contrast.
///
/// In flat areas the wide Jarvis-Judice-Ninke kernel spreads the error smoothly. Where the luma
/// range of the 3x3 neighborhood exceeds a quarter of the full range, the short Sierra Lite kernel
/// is used instead, and the strength drops linearly with the contrast down to one half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Adaptive;

impl Adaptive {
    /// Create a new [`Adaptive`] ditherer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Ditherer for Adaptive {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    #[allow(clippy::cast_possible_wrap)]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = luma_plane(image);
        let smooth = kernel_taps(NamedKernel::JarvisJudiceNinke, 1.0);
        let sharp = kernel_taps(NamedKernel::SierraLite, 1.0);

        diffuse(image, color_map, indices, true, 2, |x, y, _, _, out| {
            let (x, y) = (x as isize, y as isize);
            let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let l = luma_at(&plane, width, height, x + dx, y + dy);
                    min = min.min(l);
                    max = max.max(l);
                }
            }
            let contrast = (max - min) / 255.0;
            let strength = 1.0 - 0.5 * contrast;
            let taps = if contrast > 0.25 { &sharp } else { &smooth };
            out.extend(taps.iter().map(|&(dx, dy, w)| (dx, dy, w.map(|w| w * strength))));
        });
    }
}

/// Ordered dithering whose amplitude shrinks on strong gradients.
///
/// The 8x8 Bayer threshold is pulled toward `0.5` by the factor `1 / (1 + g / 64)`, where `g` is
/// the Sobel gradient magnitude of the luma at the pixel. Flat areas get the full pattern and
/// edges stay crisp. When a pixel is dithered on its own, without the image around it, the full
/// pattern is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GradientAware;

impl GradientAware {
    /// Create a new [`GradientAware`] ditherer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the Bayer threshold at (`x`, `y`) scaled by `amplitude`.
    #[inline]
    fn threshold(x: u32, y: u32, amplitude: f32) -> f32 {
        0.5 + (bayer8(x, y) - 0.5) * amplitude
    }
}

impl Ditherer for GradientAware {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        super::perturb(color, Self::threshold(x, y, 1.0), color_map)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn dither_rows(
        &self,
        image: ImageRef<'_>,
        color_map: &ColorMap,
        rows: Range<u32>,
        indices: &mut [u8],
    ) {
        let (width, height) = (image.width() as usize, image.height() as usize);
        // the Sobel filter reaches one row above and below the chunk
        let first = (rows.start as usize).saturating_sub(1);
        let last = (rows.end as usize + 1).min(height);
        let plane = luma_rows(image, first..last);
        let pixels = image.as_slice();
        let at = |x: isize, y: isize| {
            let y = y.clamp(0, height as isize - 1) - first as isize;
            luma_at(&plane, width, last - first, x, y)
        };

        let start = rows.start as usize * width;
        for (i, index) in indices.iter_mut().enumerate() {
            let p = start + i;
            let (x, y) = ((p % width) as isize, (p / width) as isize);
            let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x - 1, y)
                - at(x - 1, y + 1);
            let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x, y - 1)
                - at(x + 1, y - 1);
            let amplitude = 1.0 / (1.0 + gx.hypot(gy) / 64.0);
            let threshold = Self::threshold(x as u32, y as u32, amplitude);
            *index = super::perturb(components(pixels[p]), threshold, color_map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageBuf, color_map::DistanceMetric, dither::dither_image, tests::*};
    use palette::Srgb;

    /// Left half dark gray, right half light gray.
    fn step_image() -> ImageBuf {
        let pixels = (0..16 * 16)
            .map(|i| if i % 16 < 8 { Srgb::new(60, 60, 60) } else { Srgb::new(200, 200, 200) })
            .collect();
        ImageBuf::new(16, 16, pixels).unwrap()
    }

    #[test]
    fn structure_aware_keeps_edges_apart() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = step_image();
        let indices = dither_image(&StructureAware::new(), image.as_ref(), &color_map, false);
        // the dark side stays mostly black and the light side mostly white
        let white = |left: bool| {
            indices
                .iter()
                .enumerate()
                .filter(|&(i, &v)| (i % 16 < 8) == left && v == 1)
                .count()
        };
        let (white_left, white_right) = (white(true), white(false));
        assert!(white_left < 64, "{white_left}");
        assert!(white_right > 64, "{white_right}");
    }

    #[test]
    fn gradient_aware_flattens_edges() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = step_image();
        let ditherer = GradientAware::new();
        let rows = dither_image(&ditherer, image.as_ref(), &color_map, false);

        // per pixel dithering ignores the gradient
        let mut pixels = vec![0; 256];
        for y in 0..16u32 {
            for x in 0..16u32 {
                let color = components(*image.pixel(x, y).unwrap());
                pixels[(y * 16 + x) as usize] = ditherer.dither_pixel(color, x, y, &color_map);
            }
        }

        // next to the edge the threshold is pulled to the middle, so no pixel flips
        for y in 0..16 {
            assert_eq!(rows[y * 16 + 7], 0);
            assert_eq!(rows[y * 16 + 8], 1);
        }
        // away from the edge both agree
        for y in 0..16 {
            assert_eq!(rows[y * 16], pixels[y * 16]);
            assert_eq!(rows[y * 16 + 15], pixels[y * 16 + 15]);
        }
    }

    #[test]
    fn gradient_aware_row_chunks_match_the_whole_image() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        // top half dark, bottom half light, so the chunk borders see the edge
        let pixels = (0..16 * 16)
            .map(|i| if i / 16 < 8 { Srgb::new(60, 60, 60) } else { Srgb::new(200, 200, 200) })
            .collect();
        let image = ImageBuf::new(16, 16, pixels).unwrap();
        let ditherer = GradientAware::new();
        let whole = dither_image(&ditherer, image.as_ref(), &color_map, false);

        for rows in [0..1, 0..8, 7..9, 8..16, 15..16] {
            let mut chunk = vec![0; rows.len() * 16];
            ditherer.dither_rows(image.as_ref(), &color_map, rows.clone(), &mut chunk);
            let start = rows.start as usize * 16;
            assert_eq!(chunk, whole[start..start + chunk.len()], "{rows:?}");
        }
    }

    #[test]
    fn adaptive_mixes_flat_gray() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(16, 16, Srgb::new(128, 128, 128));
        let indices = dither_image(&Adaptive::new(), image.as_ref(), &color_map, false);
        let white = indices.iter().filter(|&&i| i == 1).count();
        assert!((96..=160).contains(&white), "{white}");
    }

    #[test]
    fn sigma_must_be_positive() {
        assert!(StructureAware::new().sigma(0.0).is_none());
        assert!(StructureAware::new().sigma(f32::NAN).is_none());
        assert_eq!(StructureAware::new().sigma(8.0).map(|s| s.get_sigma()), Some(8.0));
    }
}
