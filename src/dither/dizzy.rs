//! Error diffusion along a random traversal.

use super::{Ditherer, clamp_color};
use crate::{ImageRef, color_map::ColorMap, components};
use alloc::{vec, vec::Vec};
use rand::{SeedableRng as _, seq::SliceRandom as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The neighbors of a pixel and their weights.
const NEIGHBORS: [(isize, isize, f32); 8] = [
    (-1, -1, 1.0),
    (0, -1, 2.0),
    (1, -1, 1.0),
    (-1, 0, 2.0),
    (1, 0, 2.0),
    (-1, 1, 1.0),
    (0, 1, 2.0),
    (1, 1, 1.0),
];

/// Dizzy dithering.
///
/// Pixels are visited in a seeded random order. The error of each pixel is spread over its
/// neighbors that have not been visited yet, with orthogonal neighbors weighted twice as much as
/// diagonal ones. Error with no unvisited neighbor to go to is dropped.
///
/// The random order avoids the directional artifacts of row by row error diffusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dizzy {
    /// The seed of the traversal order.
    seed: u64,
}

impl Dizzy {
    /// Create a new [`Dizzy`] ditherer with a traversal order generated from `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Returns the seed.
    #[inline]
    pub const fn get_seed(&self) -> u64 {
        self.seed
    }
}

impl Default for Dizzy {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Ditherer for Dizzy {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        let (width, height) = (image.width() as isize, image.height() as isize);
        let pixels = image.as_slice();
        let mut errors = vec![[0.0f32; 3]; pixels.len()];
        let mut visited = vec![false; pixels.len()];

        let mut order = (0..pixels.len()).collect::<Vec<_>>();
        order.shuffle(&mut Xoroshiro128PlusPlus::seed_from_u64(self.seed));

        let mut targets = Vec::with_capacity(NEIGHBORS.len());
        for i in order {
            visited[i] = true;
            let source = components(pixels[i]);
            let adjusted = clamp_color(core::array::from_fn(|c| source[c] + errors[i][c]));
            let index = color_map.nearest(adjusted);
            let chosen = color_map.color(index);
            indices[i] = index;

            let (x, y) = (i as isize % width, i as isize / width);
            targets.clear();
            targets.extend(NEIGHBORS.iter().filter_map(|&(dx, dy, w)| {
                let (tx, ty) = (x + dx, y + dy);
                let inside = (0..width).contains(&tx) && (0..height).contains(&ty);
                let j = (ty * width + tx) as usize;
                (inside && !visited[j]).then_some((j, w))
            }));

            if targets.is_empty() {
                continue;
            }
            let total = targets.iter().map(|&(_, w)| w).sum::<f32>();
            for &(j, w) in &targets {
                for c in 0..3 {
                    errors[j][c] += (adjusted[c] - chosen[c]) * w / total;
                }
            }
        }
    }
}
