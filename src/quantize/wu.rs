// Referenced code: https://www.ece.mcmaster.ca/~xwu/cq.c
// and relevant paper (free access):
// Xiaolin Wu, Color quantization by dynamic programming and principal analysis,
// ACM Transactions on Graphics, vol. 11, no. 4, 348–372, 1992.
// https://doi.org/10.1145/146443.146475

use super::Quantizer;
use crate::{Histogram, PaletteSize};
use alloc::{boxed::Box, collections::BinaryHeap, vec::Vec};
use bytemuck::Zeroable;
use core::{
    array,
    cmp::Ordering,
    ops::{Add, AddAssign, Index, IndexMut, Sub},
};
use ordered_float::OrderedFloat;

/// The number of bins along each color channel.
const BINS: usize = 32;

/// The number of low bits dropped from each channel to get its bin.
const SHIFT: u32 = 3;

/// Wu's greedy orthogonal bipartitioning color quantizer.
///
/// Colors are accumulated into a 32×32×32 histogram of moments. The box with the largest
/// variance is repeatedly cut at the position along one axis that minimizes the summed variance
/// of both halves. Each palette color is the mean of the actual colors inside its box.
///
/// This is fast and gives good results for most images, which makes it a good default
/// and a good seed for [`KmeansRefinement`](super::KmeansRefinement).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wu;

impl Quantizer for Wu {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        let mut bins = Bins::new();
        for (color, count) in histogram.iter() {
            let index = [color.red, color.green, color.blue].map(|c| c >> SHIFT);
            bins[index] += Stats::new([color.red, color.green, color.blue], count);
        }
        bins.calc_cumulative_moments();

        let cubes = bins.cubes_heap(size);
        tracing::trace!(cubes = cubes.len(), "wu cut");
        cubes
            .iter()
            .filter_map(|&CubeVar(cube, _)| bins.volume(cube).mean())
            .collect()
    }
}

/// A box over a range of histogram bins.
#[derive(Debug, Clone, Copy)]
struct Cube {
    /// The lower bin indices (inclusive).
    min: [u8; 3],
    /// The upper bin indices (exclusive).
    max: [u8; 3],
}

/// A cube and it's variance.
struct CubeVar(Cube, f64);

impl PartialOrd for CubeVar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CubeVar {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.1).cmp(&OrderedFloat(other.1))
    }
}

impl Eq for CubeVar {}

impl PartialEq for CubeVar {
    fn eq(&self, other: &Self) -> bool {
        self.1 == other.1
    }
}

/// Statistics for a histogram bin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Zeroable)]
struct Stats {
    /// The number of pixels assigned to the bin.
    count: f64,
    /// The component-wise sum of the colors assigned to the bin.
    components: [f64; 3],
    /// The sum of the squared components of the colors assigned to the bin.
    sum_squared: f64,
}

impl Stats {
    /// The statistics of a single color with the given count.
    fn new(color: [u8; 3], count: u32) -> Self {
        let n = f64::from(count);
        let components = color.map(|c| n * f64::from(c));
        let sum_squared = n * color.map(|c| f64::from(c) * f64::from(c)).iter().sum::<f64>();
        Self { count: n, components, sum_squared }
    }

    /// Returns the mean color, or `None` if the count is zero.
    #[allow(clippy::cast_possible_truncation)]
    fn mean(&self) -> Option<[f32; 3]> {
        (self.count > 0.0).then(|| self.components.map(|c| (c / self.count) as f32))
    }
}

impl Add for Stats {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            count: self.count + rhs.count,
            components: array::from_fn(|i| self.components[i] + rhs.components[i]),
            sum_squared: self.sum_squared + rhs.sum_squared,
        }
    }
}

impl Sub for Stats {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            count: self.count - rhs.count,
            components: array::from_fn(|i| self.components[i] - rhs.components[i]),
            sum_squared: self.sum_squared - rhs.sum_squared,
        }
    }
}

impl AddAssign for Stats {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// A 3-dimensional histogram of bin statistics.
struct Bins(Box<[[[Stats; BINS]; BINS]; BINS]>);

impl Index<[u8; 3]> for Bins {
    type Output = Stats;

    #[inline]
    fn index(&self, [r, g, b]: [u8; 3]) -> &Self::Output {
        &self.0[usize::from(r)][usize::from(g)][usize::from(b)]
    }
}

impl IndexMut<[u8; 3]> for Bins {
    #[inline]
    fn index_mut(&mut self, [r, g, b]: [u8; 3]) -> &mut Self::Output {
        &mut self.0[usize::from(r)][usize::from(g)][usize::from(b)]
    }
}

/// This macro generates code for a fixed number of recursive calls to a volume function.
macro_rules! ndvolume {
    ($self: ident, $min: ident, $max: ident, $index: ident; $n: literal $(, $ns: literal)* $(,)?) => {{
        $index[$n] = $max[$n] - 1;
        let upper = ndvolume!($self, $min, $max, $index; $($ns,)*);

        let lower = if $min[$n] == 0 {
            Stats::default()
        } else {
            $index[$n] = $min[$n] - 1;
            ndvolume!($self, $min, $max, $index; $($ns,)*)
        };

        upper - lower
    }};
    ($self: ident, $min: ident, $max: ident, $index: ident;) => {
        $self[$index]
    };
}

impl Bins {
    /// Create a new [`Bins`] from zeroed memory.
    fn new() -> Self {
        Self(bytemuck::zeroed_box())
    }

    /// Turn the bins into cumulative moments to allow inclusion-exclusion lookups.
    #[allow(clippy::cast_possible_truncation)]
    fn calc_cumulative_moments(&mut self) {
        for r in 0..(BINS as u8) {
            let area = &mut [Stats::default(); BINS];

            for g in 0..(BINS as u8) {
                let mut line = Stats::default();

                for b in 0..(BINS as u8) {
                    let area = &mut area[usize::from(b)];
                    line += self[[r, g, b]];
                    *area += line;

                    if r == 0 {
                        self[[r, g, b]] = *area;
                    } else {
                        self[[r, g, b]] = self[[r - 1, g, b]] + *area;
                    }
                }
            }
        }
    }

    /// Returns the sum of the bins inside the given cube.
    fn volume(&self, Cube { min, max }: Cube) -> Stats {
        let mut index = [0u8; 3];
        ndvolume!(self, min, max, index; 0, 1, 2)
    }

    /// Returns the sum of the bins inside the given cube
    /// with dimension `dim` restricted to the bins below `bin`.
    fn volume_below(&self, Cube { min, max }: Cube, dim: usize, bin: u8) -> Stats {
        if bin == 0 {
            return Stats::default();
        }
        let mut index = [0u8; 3];
        index[dim] = bin - 1;
        match dim {
            0 => ndvolume!(self, min, max, index; 1, 2),
            1 => ndvolume!(self, min, max, index; 0, 2),
            _ => ndvolume!(self, min, max, index; 0, 1),
        }
    }

    /// Compute the variance of the given cube.
    fn variance(&self, cube: Cube) -> f64 {
        if (0..3).all(|c| cube.max[c] - cube.min[c] == 1) {
            0.0
        } else {
            let Stats { count, components, sum_squared } = self.volume(cube);
            if count > 0.0 {
                sum_squared - sum_of_squares(components) / count
            } else {
                0.0
            }
        }
    }

    /// Attempts to cut the given cube to give a lower variance.
    fn cut(&self, cube: Cube) -> Option<(Cube, Cube)> {
        let sum = self.volume(cube);

        (0..3)
            .filter_map(|d| {
                let bottom = cube.min[d];
                let top = cube.max[d];
                let base = self.volume_below(cube, d, bottom);

                ((bottom + 1)..top)
                    .filter_map(|bin| {
                        let upper = self.volume_below(cube, d, bin) - base;
                        let lower = sum - upper;
                        if upper.count <= 0.0 || lower.count <= 0.0 {
                            None
                        } else {
                            let upper2 = sum_of_squares(upper.components) / upper.count;
                            let lower2 = sum_of_squares(lower.components) / lower.count;
                            Some(((d, bin), -(upper2 + lower2)))
                        }
                    })
                    .min_by_key(|&(_, v)| OrderedFloat(v))
            })
            .min_by_key(|&(_, v)| OrderedFloat(v))
            .map(|((d, cut), _)| {
                let mut cube1 = cube;
                let mut cube2 = cube;
                cube1.max[d] = cut;
                cube2.min[d] = cut;
                (cube1, cube2)
            })
    }

    /// Returns the disjoint cubes resulting from Wu's color quantization method.
    #[allow(clippy::cast_possible_truncation)]
    fn cubes_heap(&self, k: PaletteSize) -> BinaryHeap<CubeVar> {
        let whole_cube = Cube { min: [0; 3], max: [BINS as u8; 3] };
        if self.volume(whole_cube).count <= 0.0 {
            return BinaryHeap::new();
        }

        let k = k.as_usize();

        let mut queue = BinaryHeap::with_capacity(k);
        queue.push(CubeVar(whole_cube, f64::INFINITY));

        while queue.len() < k {
            let Some(CubeVar(cube, variance)) = queue.pop() else {
                break;
            };

            if variance.partial_cmp(&0.0).is_none_or(Ordering::is_le) {
                // all cubes cannot be cut further
                queue.push(CubeVar(cube, variance));
                break;
            }

            if let Some((cube1, cube2)) = self.cut(cube) {
                queue.push(CubeVar(cube1, self.variance(cube1)));
                queue.push(CubeVar(cube2, self.variance(cube2)));
            } else {
                queue.push(CubeVar(cube, 0.0));
            }
        }

        queue
    }
}

/// Returns the sum of the squares of the given components.
#[inline]
fn sum_of_squares(components: [f64; 3]) -> f64 {
    components.iter().map(|c| c * c).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use palette::Srgb;

    #[test]
    fn separates_distant_clusters() {
        let histogram = Histogram::from_entries([
            (Srgb::new(10, 10, 10), 50),
            (Srgb::new(12, 9, 11), 50),
            (Srgb::new(240, 240, 240), 50),
            (Srgb::new(243, 238, 250), 50),
        ]);
        let palette = Wu.quantize(&histogram, PaletteSize::from_u8_clamped(2), 0);
        assert_eq!(palette.len(), 2);
        assert!(contains_near(&palette, Srgb::new(11, 10, 11), 3.0));
        assert!(contains_near(&palette, Srgb::new(242, 239, 245), 3.0));
    }

    #[test]
    fn cumulative_volume_matches_total() {
        let histogram = colorful_histogram();
        let mut bins = Bins::new();
        for (color, count) in histogram.iter() {
            let index = [color.red, color.green, color.blue].map(|c| c >> SHIFT);
            bins[index] += Stats::new([color.red, color.green, color.blue], count);
        }
        bins.calc_cumulative_moments();
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let whole = bins.volume(Cube { min: [0; 3], max: [BINS as u8; 3] });
        approx::assert_relative_eq!(whole.count, histogram.total_count() as f64);
    }
}
