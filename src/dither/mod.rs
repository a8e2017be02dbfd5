//! Ditherers map every pixel of an image to an index into a palette.
//!
//! All ditherers implement the [`Ditherer`] trait. They fall into two groups, reported by
//! [`Ditherer::requires_sequential_processing`]:
//! - Sequential ditherers carry error from visited pixels to pixels that have not been visited
//!   yet, so they must run as one ordered traversal of the whole image. These are the error
//!   diffusion ditherers ([`ErrorDiffusion`], [`Ostromoukhov`], [`StructureAware`], [`Adaptive`],
//!   [`Dizzy`]), the space-filling curve ditherer [`Riemersma`] and the iterative [`Dbs`].
//! - Order-independent ditherers decide every pixel from its color and position alone.
//!   These are [`NoDithering`], the threshold matrix and noise ditherers, and the palette mixing
//!   ditherers. [`dither_image`] evaluates them over row chunks in parallel when the `threads`
//!   feature is enabled.
//!
//! Colors are passed to ditherers as `[f32; 3]` sRGB components in the `0.0..=255.0` range and
//! are looked up in a [`ColorMap`].

use crate::{ImageRef, color_map::ColorMap, components};
use alloc::{boxed::Box, vec, vec::Vec};
use core::ops::Range;

mod aware;
mod dbs;
mod dizzy;
mod error_diffusion;
mod knoll;
mod masks;
mod mixing;
mod noise;
mod ordered;
mod ostromoukhov;
mod riemersma;
mod yliluoma;

pub use aware::{Adaptive, GradientAware, StructureAware};
pub use dbs::Dbs;
pub use dizzy::Dizzy;
pub use error_diffusion::{ErrorDiffusion, Kernel, KernelError, NamedKernel};
pub use knoll::Knoll;
pub use masks::{BlueNoise, VoidAndCluster};
pub use mixing::{Barycentric, NClosest, NConvex, Tin};
pub use noise::{InterleavedGradientNoise, Noise, NoiseKind};
pub use ordered::{MatrixError, Ordered, ThresholdMatrix};
pub use ostromoukhov::Ostromoukhov;
pub use riemersma::{Curve, Riemersma};
pub use yliluoma::{Yliluoma1, Yliluoma2, Yliluoma3};

/// A strategy that chooses a palette index for every pixel of an image.
///
/// Implementors provide [`requires_sequential_processing`](Self::requires_sequential_processing)
/// and either [`dither_pixel`](Self::dither_pixel) (order-independent ditherers) or
/// [`dither`](Self::dither) (sequential ditherers). Every index written must be valid for the
/// given [`ColorMap`], for any image size including `1x1` and any palette with at least one color.
pub trait Ditherer {
    /// Whether each decision depends on previously visited pixels.
    ///
    /// If this returns `false`, then [`dither_pixel`](Self::dither_pixel) and
    /// [`dither_rows`](Self::dither_rows) may be evaluated in any order and in parallel.
    fn requires_sequential_processing(&self) -> bool;

    /// Returns the palette index for the pixel at (`x`, `y`) with the given `color`.
    ///
    /// The default returns the nearest palette color.
    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        let _ = (x, y);
        color_map.nearest(color)
    }

    /// Dither the given range of `rows` of `image` into `indices`,
    /// which holds exactly the indices of those rows.
    ///
    /// The default calls [`dither_pixel`](Self::dither_pixel) for every pixel in raster order.
    #[allow(clippy::cast_possible_truncation)]
    fn dither_rows(
        &self,
        image: ImageRef<'_>,
        color_map: &ColorMap,
        rows: Range<u32>,
        indices: &mut [u8],
    ) {
        let width = image.width() as usize;
        let start = rows.start as usize * width;
        let pixels = &image.as_slice()[start..];
        for (i, (index, &pixel)) in indices.iter_mut().zip(pixels).enumerate() {
            let x = (i % width) as u32;
            let y = rows.start + (i / width) as u32;
            *index = self.dither_pixel(components(pixel), x, y, color_map);
        }
    }

    /// Dither the whole `image` into `indices`, which has one entry per pixel.
    ///
    /// Sequential ditherers override this to run their ordered traversal.
    #[inline]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        self.dither_rows(image, color_map, 0..image.height(), indices);
    }
}

impl<D: Ditherer + ?Sized> Ditherer for &D {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        (**self).requires_sequential_processing()
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        (**self).dither_pixel(color, x, y, color_map)
    }

    #[inline]
    fn dither_rows(
        &self,
        image: ImageRef<'_>,
        color_map: &ColorMap,
        rows: Range<u32>,
        indices: &mut [u8],
    ) {
        (**self).dither_rows(image, color_map, rows, indices);
    }

    #[inline]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        (**self).dither(image, color_map, indices);
    }
}

impl<D: Ditherer + ?Sized> Ditherer for Box<D> {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        (**self).requires_sequential_processing()
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        (**self).dither_pixel(color, x, y, color_map)
    }

    #[inline]
    fn dither_rows(
        &self,
        image: ImageRef<'_>,
        color_map: &ColorMap,
        rows: Range<u32>,
        indices: &mut [u8],
    ) {
        (**self).dither_rows(image, color_map, rows, indices);
    }

    #[inline]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        (**self).dither(image, color_map, indices);
    }
}

/// Map every pixel to its nearest palette color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NoDithering;

impl Ditherer for NoDithering {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }
}

/// Dither `image` against `color_map` and return one palette index per pixel in row-major order.
///
/// If `parallel` is `true`, the `threads` feature is enabled, and the ditherer does not
/// [require sequential processing](Ditherer::requires_sequential_processing), then the image is
/// split into chunks of rows that are dithered in parallel. The result is identical either way.
#[must_use]
pub fn dither_image<D: Ditherer + Sync + ?Sized>(
    ditherer: &D,
    image: ImageRef<'_>,
    color_map: &ColorMap,
    parallel: bool,
) -> Vec<u8> {
    let mut indices = vec![0; image.num_pixels() as usize];
    if image.is_empty() {
        return indices;
    }

    #[cfg(feature = "threads")]
    if parallel && !ditherer.requires_sequential_processing() {
        parallel::dither_rows_par(ditherer, image, color_map, &mut indices);
        return indices;
    }
    #[cfg(not(feature = "threads"))]
    let _ = parallel;

    ditherer.dither(image, color_map, &mut indices);
    indices
}

#[cfg(feature = "threads")]
mod parallel {
    use super::Ditherer;
    use crate::{ImageRef, color_map::ColorMap};
    use rayon::prelude::*;

    /// Dither chunks of rows in parallel.
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn dither_rows_par<D: Ditherer + Sync + ?Sized>(
        ditherer: &D,
        image: ImageRef<'_>,
        color_map: &ColorMap,
        indices: &mut [u8],
    ) {
        let (width, height) = image.dimensions();
        let rows_per_chunk = rows_per_chunk(height as usize);
        let chunk_size = width as usize * rows_per_chunk;

        tracing::trace!(chunk_size, "parallel dithering");

        indices
            .par_chunks_mut(chunk_size)
            .enumerate()
            .for_each(|(chunk_i, indices)| {
                let start = (chunk_i * rows_per_chunk) as u32;
                let end = u32::min(start + rows_per_chunk as u32, height);
                ditherer.dither_rows(image, color_map, start..end, indices);
            });
    }

    /// Returns the number of rows for each thread based on the image height.
    fn rows_per_chunk(height: usize) -> usize {
        let num_chunks = usize::min(rayon::current_num_threads(), height.div_ceil(64)).max(1);
        height.div_ceil(num_chunks)
    }
}

/// Perturb `color` by the palette spread scaled by `threshold - 0.5` and return the nearest palette
/// index. `threshold` must lie strictly between `0.0` and `1.0`, or a palette color could be
/// moved exactly halfway to its neighbor.
#[inline]
pub(crate) fn perturb(color: [f32; 3], threshold: f32, color_map: &ColorMap) -> u8 {
    let offset = color_map.spread() * (threshold - 0.5);
    color_map.nearest(color.map(|c| c + offset))
}

/// Returns the rank of (`x`, `y`) in a `2^bits` by `2^bits` Bayer matrix.
///
/// The lowest coordinate bits select the highest rank bits, so neighboring pixels get ranks that
/// are far apart.
#[inline]
pub(crate) fn bayer_rank(x: u32, y: u32, bits: u32) -> u32 {
    let mut rank = 0;
    for bit in 0..bits {
        let (xb, yb) = ((x >> bit) & 1, (y >> bit) & 1);
        rank = (rank << 2) | ((xb ^ yb) << 1) | yb;
    }
    rank
}

/// Returns the 8x8 Bayer threshold in `0.0..1.0` for (`x`, `y`).
#[inline]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn bayer8(x: u32, y: u32) -> f32 {
    (bayer_rank(x & 7, y & 7, 3) as f32 + 0.5) / 64.0
}

/// Clamp each component into the valid sRGB range.
#[inline]
pub(crate) fn clamp_color(color: [f32; 3]) -> [f32; 3] {
    color.map(|c| c.clamp(0.0, 255.0))
}
