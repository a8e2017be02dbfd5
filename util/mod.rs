#![allow(dead_code)]

use palette::Srgb;
use palettize::{Histogram, ImageBuf};
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoroshiro128PlusPlus;
use std::sync::OnceLock;

/// A smooth two dimensional gradient with seeded noise, so that the color count grows with size.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn synthetic_image(width: u32, height: u32, seed: u64) -> ImageBuf<Srgb<u8>> {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let u = x as f32 / width as f32;
            let v = y as f32 / height as f32;
            let mut channel = |base: f32| {
                let noise = rng.random_range(-12.0..12.0);
                (base * 255.0 + noise).clamp(0.0, 255.0) as u8
            };
            Srgb::new(channel(u), channel(v), channel(1.0 - (u + v) / 2.0))
        })
        .collect::<Vec<_>>();

    ImageBuf::new(width, height, pixels).unwrap()
}

static BENCHMARK_IMAGES: OnceLock<Vec<(String, ImageBuf<Srgb<u8>>)>> = OnceLock::new();

/// Benchmark images from largest to smallest, named by their resolution.
pub fn benchmark_images() -> &'static [(String, ImageBuf<Srgb<u8>>)] {
    BENCHMARK_IMAGES.get_or_init(|| {
        [(1920, 1080), (640, 480), (256, 256)]
            .into_iter()
            .map(|(width, height)| {
                (format!("{width}x{height}"), synthetic_image(width, height, 0))
            })
            .collect()
    })
}

static BENCHMARK_HISTOGRAMS: OnceLock<Vec<(String, Histogram)>> = OnceLock::new();

/// The histograms of [`benchmark_images`].
pub fn benchmark_histograms() -> &'static [(String, Histogram)] {
    BENCHMARK_HISTOGRAMS.get_or_init(|| {
        benchmark_images()
            .iter()
            .map(|(name, image)| (name.clone(), Histogram::from_image(image.as_ref())))
            .collect()
    })
}
