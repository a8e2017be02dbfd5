//! Dithering with noise thresholds.

use super::{Ditherer, ThresholdMatrix, perturb};
use crate::color_map::ColorMap;
use alloc::vec::Vec;
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The width and height of a noise tile.
const TILE: usize = 64;

/// The spectral character of a noise field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseKind {
    /// Equal power at all frequencies.
    White,
    /// Power concentrated in high frequencies.
    Blue,
    /// Power falling off with `1/f`.
    Pink,
    /// Power falling off with `1/f²`.
    Brown,
    /// Power rising with `f²`.
    Violet,
    /// An even blend of pink and violet noise.
    Grey,
}

impl NoiseKind {
    /// All noise kinds.
    pub const ALL: [Self; 6] =
        [Self::White, Self::Blue, Self::Pink, Self::Brown, Self::Violet, Self::Grey];

    /// Returns the kebab-case name of the noise ditherer.
    pub const fn name(self) -> &'static str {
        match self {
            Self::White => "white-noise",
            Self::Blue => "blue-noise-filtered",
            Self::Pink => "pink-noise",
            Self::Brown => "brown-noise",
            Self::Violet => "violet-noise",
            Self::Grey => "grey-noise",
        }
    }
}

/// Noise dithering: a seeded 64x64 noise tile is rank-normalized into uniform thresholds and
/// tiled over the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Noise {
    /// The kind of noise.
    kind: NoiseKind,
    /// The seed the tile was generated from.
    seed: u64,
    /// The rank-normalized tile.
    matrix: ThresholdMatrix,
}

impl Noise {
    /// Create a new [`Noise`] ditherer, generating its tile from `seed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(kind: NoiseKind, seed: u64) -> Self {
        let field = field(kind, seed);
        let matrix = ThresholdMatrix::from_field(TILE as u32, TILE as u32, &field);
        Self { kind, seed, matrix }
    }

    /// Returns the kind of noise.
    #[inline]
    pub fn get_kind(&self) -> NoiseKind {
        self.kind
    }

    /// Returns the seed.
    #[inline]
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Returns the threshold tile.
    #[inline]
    pub fn matrix(&self) -> &ThresholdMatrix {
        &self.matrix
    }
}

impl Ditherer for Noise {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        perturb(color, self.matrix.threshold(x, y), color_map)
    }
}

/// Generate a noise field of the given kind on a torus.
fn field(kind: NoiseKind, seed: u64) -> Vec<f32> {
    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
    match kind {
        NoiseKind::White => white(rng),
        NoiseKind::Blue => {
            let white = white(rng);
            let blurred = box_blur(&white);
            white.iter().zip(blurred).map(|(w, b)| w - b).collect()
        }
        NoiseKind::Violet => laplacian(&white(rng)),
        NoiseKind::Pink => octaves(rng, |_| 1.0),
        NoiseKind::Brown => octaves(rng, |cell| cell),
        NoiseKind::Grey => {
            let pink = ranks(&octaves(rng, |_| 1.0));
            let violet = ranks(&laplacian(&white(rng)));
            pink.iter().zip(violet).map(|(p, v)| p + v).collect()
        }
    }
}

/// Uniform random values.
fn white(rng: &mut Xoroshiro128PlusPlus) -> Vec<f32> {
    (0..TILE * TILE).map(|_| rng.random::<f32>()).collect()
}

/// Returns the value at (`x`, `y`) wrapping around the tile edges.
#[inline]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn wrapped(field: &[f32], x: isize, y: isize) -> f32 {
    let n = TILE as isize;
    field[(y.rem_euclid(n) * n + x.rem_euclid(n)) as usize]
}

/// A 3x3 box blur.
#[allow(clippy::cast_possible_wrap)]
fn box_blur(field: &[f32]) -> Vec<f32> {
    let n = TILE as isize;
    (0..n)
        .flat_map(|y| (0..n).map(move |x| (x, y)))
        .map(|(x, y)| {
            let mut sum = 0.0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    sum += wrapped(field, x + dx, y + dy);
                }
            }
            sum / 9.0
        })
        .collect()
}

/// The negated discrete Laplacian, which weights frequency `f` by `f²`.
#[allow(clippy::cast_possible_wrap)]
fn laplacian(field: &[f32]) -> Vec<f32> {
    let n = TILE as isize;
    (0..n)
        .flat_map(|y| (0..n).map(move |x| (x, y)))
        .map(|(x, y)| {
            4.0 * wrapped(field, x, y)
                - wrapped(field, x - 1, y)
                - wrapped(field, x + 1, y)
                - wrapped(field, x, y - 1)
                - wrapped(field, x, y + 1)
        })
        .collect()
}

/// The sum of bilinearly interpolated value noise octaves with cell sizes `1, 2, 4, .., 32`,
/// each scaled by `amplitude(cell size)`.
#[allow(clippy::cast_precision_loss)]
fn octaves(rng: &mut Xoroshiro128PlusPlus, amplitude: impl Fn(f32) -> f32) -> Vec<f32> {
    let mut sum = alloc::vec![0.0; TILE * TILE];
    let mut cell = 1;
    while cell < TILE {
        let cells = TILE / cell;
        let lattice = (0..cells * cells).map(|_| rng.random::<f32>()).collect::<Vec<_>>();
        let at = |x: usize, y: usize| lattice[(y % cells) * cells + x % cells];
        let scale = amplitude(cell as f32);
        for y in 0..TILE {
            let (cy, fy) = (y / cell, (y % cell) as f32 / cell as f32);
            for x in 0..TILE {
                let (cx, fx) = (x / cell, (x % cell) as f32 / cell as f32);
                let top = at(cx, cy) * (1.0 - fx) + at(cx + 1, cy) * fx;
                let bottom = at(cx, cy + 1) * (1.0 - fx) + at(cx + 1, cy + 1) * fx;
                sum[y * TILE + x] += scale * (top * (1.0 - fy) + bottom * fy);
            }
        }
        cell *= 2;
    }
    sum
}

/// Replace each value by its rank divided by the number of values.
#[allow(clippy::cast_precision_loss)]
fn ranks(field: &[f32]) -> Vec<f32> {
    let mut order = (0..field.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| field[a].total_cmp(&field[b]).then(a.cmp(&b)));
    let mut ranks = alloc::vec![0.0; field.len()];
    let n = field.len() as f32;
    for (rank, i) in order.into_iter().enumerate() {
        ranks[i] = rank as f32 / n;
    }
    ranks
}

/// Interleaved gradient noise: a cheap analytic threshold that looks like blue noise.
///
/// Jorge Jimenez, Next Generation Post Processing in Call of Duty: Advanced Warfare,
/// SIGGRAPH 2014.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InterleavedGradientNoise;

impl InterleavedGradientNoise {
    /// Returns the noise threshold at (`x`, `y`), strictly between `0.0` and `1.0`.
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn threshold(x: u32, y: u32) -> f32 {
        let t = 52.982_918 * (0.067_110_56 * x as f32 + 0.005_837_15 * y as f32).fract();
        (t.fract() * 255.0 + 0.5) / 256.0
    }
}

impl Ditherer for InterleavedGradientNoise {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        perturb(color, Self::threshold(x, y), color_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The mean absolute difference between horizontally adjacent thresholds.
    fn roughness(noise: &Noise) -> f32 {
        let matrix = noise.matrix();
        let mut sum = 0.0;
        for y in 0..64 {
            for x in 0..64 {
                sum += (matrix.threshold(x, y) - matrix.threshold(x + 1, y)).abs();
            }
        }
        sum / 4096.0
    }

    #[test]
    fn reproducible_tiles() {
        for kind in NoiseKind::ALL {
            assert_eq!(Noise::new(kind, 3), Noise::new(kind, 3));
            assert_ne!(Noise::new(kind, 3).matrix(), Noise::new(kind, 4).matrix());
        }
    }

    #[test]
    fn thresholds_are_uniform() {
        for kind in NoiseKind::ALL {
            let matrix = Noise::new(kind, 1).matrix().clone();
            let below_half = (0..64)
                .flat_map(|y| (0..64).map(move |x| (x, y)))
                .filter(|&(x, y)| matrix.threshold(x, y) < 0.5)
                .count();
            assert_eq!(below_half, 2048);
        }
    }

    #[test]
    fn spectral_ordering() {
        use NoiseKind::{Blue, Brown, Pink, Violet, White};
        let [white, blue, pink, brown, violet] =
            [White, Blue, Pink, Brown, Violet].map(|kind| roughness(&Noise::new(kind, 11)));
        assert!(brown < pink);
        assert!(pink < white);
        assert!(white < blue);
        assert!(white < violet);
    }

    #[test]
    fn interleaved_gradient_noise_range() {
        assert!(InterleavedGradientNoise::threshold(0, 0) > 0.0);
        for y in 0..100 {
            for x in 0..100 {
                let t = InterleavedGradientNoise::threshold(x, y);
                assert!(t > 0.0 && t < 1.0, "({x}, {y}): {t}");
            }
        }
    }

    #[test]
    fn interleaved_gradient_noise_keeps_solid_white() {
        use crate::{
            color_map::DistanceMetric,
            dither::dither_image,
            tests::{WHITE, black_white, solid_image},
        };

        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(16, 16, WHITE);
        let indices = dither_image(&InterleavedGradientNoise, image.as_ref(), &color_map, false);
        assert!(indices.iter().all(|&i| i == 1));
    }
}
