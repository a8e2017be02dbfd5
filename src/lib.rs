//! Color reduction for raster images.
//!
//! `palettize` turns a full color image into an indexed image with a palette of at most 256
//! colors. The work is split into two interchangeable stages:
//! - A [`Quantizer`](quantize::Quantizer) chooses the palette from the image's [`Histogram`].
//! - A [`Ditherer`](dither::Ditherer) maps every pixel to a palette index, optionally spreading
//!   the quantization error over neighboring pixels.
//!
//! The [`reduce_colors`] function and the [`Pipeline`] builder wire both stages together and pack
//! the result into an [`IndexedImage`] with the smallest bit depth that fits the palette.
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use palettize::{ImageBuf, reduce_colors, dither::ErrorDiffusion, quantize::Wu};
//! use palette::Srgb;
//!
//! let pixels = (0..64u8).map(|i| Srgb::new(i * 4, i * 2, 255 - i * 4)).collect();
//! let image = ImageBuf::new(8, 8, pixels)?;
//! let indexed = reduce_colors(image.as_ref(), &Wu, &ErrorDiffusion::floyd_steinberg(), 4, false)?;
//! assert_eq!(indexed.dimensions(), (8, 8));
//! assert!(indexed.palette().len() <= 4);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `threads` (default): parallel histogram construction and parallel dithering of
//!   order-independent ditherers through [`rayon`](https://docs.rs/rayon).
//! - `image`: conversions between [`image::RgbImage`] and the image types of this crate.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_slice,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports,
    clippy::similar_names
)]

extern crate alloc;

mod api;
mod histogram;
mod types;

pub mod color_map;
pub mod deps;
pub mod dither;
pub mod quantize;

pub use api::*;
pub use histogram::Histogram;
pub use types::*;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

/// The maximum supported number of palette colors is 256.
pub const MAX_COLORS: u16 = u8::MAX as u16 + 1;

#[cfg(test)]
pub(crate) mod tests {
    use crate::{Histogram, ImageBuf, Palette};
    use palette::Srgb;

    pub const BLACK: Srgb<u8> = Srgb::new(0, 0, 0);
    pub const WHITE: Srgb<u8> = Srgb::new(255, 255, 255);
    pub const RED: Srgb<u8> = Srgb::new(255, 0, 0);
    pub const GREEN: Srgb<u8> = Srgb::new(0, 255, 0);
    pub const BLUE: Srgb<u8> = Srgb::new(0, 0, 255);

    /// A `width` x `height` image filled with `color`.
    pub fn solid_image(width: u32, height: u32, color: Srgb<u8>) -> ImageBuf {
        ImageBuf::from_pixel(width, height, color).unwrap()
    }

    /// A horizontal black to white gradient.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn gradient_image(width: u32, height: u32) -> ImageBuf {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for _ in 0..height {
            for x in 0..width {
                let v = (f64::from(x) * 255.0 / f64::from((width - 1).max(1))).round() as u8;
                pixels.push(Srgb::new(v, v, v));
            }
        }
        ImageBuf::new(width, height, pixels).unwrap()
    }

    /// A deterministic image with a broad spread of colors.
    #[allow(clippy::cast_possible_truncation)]
    pub fn colorful_image(width: u32, height: u32) -> ImageBuf {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width.max(1)) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                let b = ((x * 7 + y * 13) % 256) as u8;
                pixels.push(Srgb::new(r, g, b));
            }
        }
        ImageBuf::new(width, height, pixels).unwrap()
    }

    /// A histogram with a broad spread of colors.
    pub fn colorful_histogram() -> Histogram {
        Histogram::from_image(colorful_image(64, 64).as_ref())
    }

    /// Red, green, and blue with equal counts.
    pub fn rgb_histogram() -> Histogram {
        Histogram::from_entries([(RED, 100), (GREEN, 100), (BLUE, 100)])
    }

    /// A histogram where `dominant` covers 90% of the weight and the rest is spread thin.
    #[allow(clippy::cast_possible_truncation)]
    pub fn dominant_histogram(dominant: Srgb<u8>) -> Histogram {
        let rest = (0..50u32).map(|i| {
            let v = (i * 5) as u8;
            (Srgb::new(v, 255 - v, v / 2), 2)
        });
        Histogram::from_entries(core::iter::once((dominant, 900)).chain(rest))
    }

    /// Black and white.
    pub fn black_white() -> Palette {
        Palette::new(vec![BLACK, WHITE]).unwrap()
    }

    /// The euclidean distance between two colors.
    pub fn rgb_distance(a: Srgb<u8>, b: Srgb<u8>) -> f64 {
        let d = |x: u8, y: u8| f64::from(x) - f64::from(y);
        (d(a.red, b.red).powi(2) + d(a.green, b.green).powi(2) + d(a.blue, b.blue).powi(2)).sqrt()
    }

    /// Whether `palette` has a color within `tolerance` of `color`.
    pub fn contains_near(palette: &Palette, color: Srgb<u8>, tolerance: f64) -> bool {
        palette.iter().any(|&c| rgb_distance(c, color) < tolerance)
    }
}
