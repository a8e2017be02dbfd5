//! Error diffusion with fixed kernels.

use super::{Ditherer, clamp_color};
use crate::{ImageRef, color_map::ColorMap, components};
use alloc::{vec, vec::Vec};
use core::{error::Error, fmt};
use ordered_float::OrderedFloat;

/// The largest horizontal or vertical offset of a kernel tap.
const MAX_REACH: u8 = 8;

/// The error returned when a custom [`Kernel`] is malformed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelError {
    /// The kernel has no taps.
    Empty,
    /// A tap points at a pixel that has already been visited.
    Backward {
        /// The horizontal offset of the tap.
        dx: i8,
        /// The vertical offset of the tap.
        dy: u8,
    },
    /// A tap is farther away than the supported reach of 8 pixels.
    OutOfReach {
        /// The horizontal offset of the tap.
        dx: i8,
        /// The vertical offset of the tap.
        dy: u8,
    },
    /// A weight is negative, infinite or NaN.
    InvalidWeight(f32),
    /// The weights sum to zero.
    ZeroSum,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("the kernel has no taps"),
            Self::Backward { dx, dy } => {
                write!(f, "the kernel tap ({dx}, {dy}) points at an already visited pixel")
            }
            Self::OutOfReach { dx, dy } => {
                write!(f, "the kernel tap ({dx}, {dy}) is more than {MAX_REACH} pixels away")
            }
            Self::InvalidWeight(weight) => write!(f, "invalid kernel weight {weight}"),
            Self::ZeroSum => f.write_str("the kernel weights sum to zero"),
        }
    }
}

impl Error for KernelError {}

/// An error diffusion kernel: a list of `(dx, dy, weight)` taps relative to the current pixel.
///
/// Taps only point at pixels that have not been visited yet in a left to right, top to bottom
/// traversal: either to the right on the current row (`dy == 0 && dx > 0`) or on a following row
/// (`dy > 0`). Weights are normalized to sum to `1`.
///
/// # Examples
///
/// ```
/// # use palettize::dither::{Kernel, KernelError};
/// let kernel = Kernel::new(&[(1, 0, 2.0), (0, 1, 2.0)]).unwrap();
/// assert_eq!(kernel.taps(), &[(1, 0, 0.5), (0, 1, 0.5)]);
/// assert_eq!(Kernel::new(&[(-1, 0, 1.0)]), Err(KernelError::Backward { dx: -1, dy: 0 }));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    /// The normalized taps.
    taps: Vec<(i8, u8, f32)>,
}

impl Kernel {
    /// Create a new [`Kernel`] from a list of `(dx, dy, weight)` taps, normalizing the weights.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] if the kernel is empty, a tap points backward or farther than
    /// 8 pixels, a weight is negative or not finite, or the weights sum to zero.
    pub fn new(taps: &[(i8, u8, f32)]) -> Result<Self, KernelError> {
        if taps.is_empty() {
            return Err(KernelError::Empty);
        }
        for &(dx, dy, weight) in taps {
            if dy == 0 && dx <= 0 {
                return Err(KernelError::Backward { dx, dy });
            }
            if dx.unsigned_abs() > MAX_REACH || dy > MAX_REACH {
                return Err(KernelError::OutOfReach { dx, dy });
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(KernelError::InvalidWeight(weight));
            }
        }
        let sum = taps.iter().map(|&(_, _, w)| w).sum::<f32>();
        if !(sum > 0.0) {
            return Err(KernelError::ZeroSum);
        }
        let taps = taps.iter().map(|&(dx, dy, w)| (dx, dy, w / sum)).collect();
        Ok(Self { taps })
    }

    /// Create a [`Kernel`] from taps with integer weights and a known valid layout.
    #[allow(clippy::cast_precision_loss)]
    fn from_table(taps: &[(i8, u8, u16)]) -> Self {
        let sum = taps.iter().map(|&(_, _, w)| u32::from(w)).sum::<u32>() as f32;
        let taps = taps
            .iter()
            .map(|&(dx, dy, w)| (dx, dy, f32::from(w) / sum))
            .collect();
        Self { taps }
    }

    /// Returns the normalized taps of the kernel.
    #[inline]
    pub fn taps(&self) -> &[(i8, u8, f32)] {
        &self.taps
    }

    /// Returns the number of rows below the current row that the kernel reaches.
    #[inline]
    pub fn depth(&self) -> u8 {
        self.taps.iter().map(|&(_, dy, _)| dy).max().unwrap_or(0)
    }
}

/// The well known error diffusion kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKernel {
    /// Floyd-Steinberg, the classic four tap kernel.
    FloydSteinberg,
    /// The three tap "false" Floyd-Steinberg kernel.
    FalseFloydSteinberg,
    /// The Floyd-Steinberg taps with equal weights.
    EqualFloydSteinberg,
    /// Jarvis, Judice and Ninke, spreading over two following rows.
    JarvisJudiceNinke,
    /// Stucki.
    Stucki,
    /// Burkes.
    Burkes,
    /// Sierra (three rows).
    Sierra,
    /// Two-row Sierra.
    TwoRowSierra,
    /// Sierra Lite.
    SierraLite,
    /// Atkinson, which only propagates three quarters of the error by default.
    Atkinson,
    /// Steven Pigeon's kernel, which propagates six sevenths of the error by default.
    Pigeon,
    /// Stevenson-Arce, designed for hexagonal grids.
    StevensonArce,
    /// Fan.
    Fan,
    /// Shiau-Fan.
    ShiauFan,
    /// The second Shiau-Fan kernel.
    ShiauFan2,
    /// All error to the next pixel on the row.
    Simple,
    /// Half the error to the right, half below.
    Simple2D,
    /// All error to the pixel below.
    SimpleDown,
    /// All error to the pixel below and to the right.
    SimpleDiagonal,
}

impl NamedKernel {
    /// All named kernels.
    pub const ALL: [Self; 19] = [
        Self::FloydSteinberg,
        Self::FalseFloydSteinberg,
        Self::EqualFloydSteinberg,
        Self::JarvisJudiceNinke,
        Self::Stucki,
        Self::Burkes,
        Self::Sierra,
        Self::TwoRowSierra,
        Self::SierraLite,
        Self::Atkinson,
        Self::Pigeon,
        Self::StevensonArce,
        Self::Fan,
        Self::ShiauFan,
        Self::ShiauFan2,
        Self::Simple,
        Self::Simple2D,
        Self::SimpleDown,
        Self::SimpleDiagonal,
    ];

    /// Returns the kebab-case name of the kernel.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FloydSteinberg => "floyd-steinberg",
            Self::FalseFloydSteinberg => "false-floyd-steinberg",
            Self::EqualFloydSteinberg => "equal-floyd-steinberg",
            Self::JarvisJudiceNinke => "jarvis-judice-ninke",
            Self::Stucki => "stucki",
            Self::Burkes => "burkes",
            Self::Sierra => "sierra",
            Self::TwoRowSierra => "two-row-sierra",
            Self::SierraLite => "sierra-lite",
            Self::Atkinson => "atkinson",
            Self::Pigeon => "pigeon",
            Self::StevensonArce => "stevenson-arce",
            Self::Fan => "fan",
            Self::ShiauFan => "shiau-fan",
            Self::ShiauFan2 => "shiau-fan-2",
            Self::Simple => "simple",
            Self::Simple2D => "simple-2d",
            Self::SimpleDown => "simple-down",
            Self::SimpleDiagonal => "simple-diagonal",
        }
    }

    /// Returns the integer weights of the kernel.
    #[rustfmt::skip]
    const fn table(self) -> &'static [(i8, u8, u16)] {
        match self {
            Self::FloydSteinberg => &[(1, 0, 7), (-1, 1, 3), (0, 1, 5), (1, 1, 1)],
            Self::FalseFloydSteinberg => &[(1, 0, 3), (0, 1, 3), (1, 1, 2)],
            Self::EqualFloydSteinberg => &[(1, 0, 1), (-1, 1, 1), (0, 1, 1), (1, 1, 1)],
            Self::JarvisJudiceNinke => &[
                (1, 0, 7), (2, 0, 5),
                (-2, 1, 3), (-1, 1, 5), (0, 1, 7), (1, 1, 5), (2, 1, 3),
                (-2, 2, 1), (-1, 2, 3), (0, 2, 5), (1, 2, 3), (2, 2, 1),
            ],
            Self::Stucki => &[
                (1, 0, 8), (2, 0, 4),
                (-2, 1, 2), (-1, 1, 4), (0, 1, 8), (1, 1, 4), (2, 1, 2),
                (-2, 2, 1), (-1, 2, 2), (0, 2, 4), (1, 2, 2), (2, 2, 1),
            ],
            Self::Burkes => &[
                (1, 0, 8), (2, 0, 4),
                (-2, 1, 2), (-1, 1, 4), (0, 1, 8), (1, 1, 4), (2, 1, 2),
            ],
            Self::Sierra => &[
                (1, 0, 5), (2, 0, 3),
                (-2, 1, 2), (-1, 1, 4), (0, 1, 5), (1, 1, 4), (2, 1, 2),
                (-1, 2, 2), (0, 2, 3), (1, 2, 2),
            ],
            Self::TwoRowSierra => &[
                (1, 0, 4), (2, 0, 3),
                (-2, 1, 1), (-1, 1, 2), (0, 1, 3), (1, 1, 2), (2, 1, 1),
            ],
            Self::SierraLite => &[(1, 0, 2), (-1, 1, 1), (0, 1, 1)],
            Self::Atkinson => &[
                (1, 0, 1), (2, 0, 1),
                (-1, 1, 1), (0, 1, 1), (1, 1, 1),
                (0, 2, 1),
            ],
            Self::Pigeon => &[
                (1, 0, 2), (2, 0, 1),
                (-1, 1, 2), (0, 1, 2), (1, 1, 2),
                (-2, 2, 1), (0, 2, 1), (2, 2, 1),
            ],
            Self::StevensonArce => &[
                (2, 0, 32),
                (-3, 1, 12), (-1, 1, 26), (1, 1, 30), (3, 1, 16),
                (-2, 2, 12), (0, 2, 26), (2, 2, 12),
                (-3, 3, 5), (-1, 3, 12), (1, 3, 12), (3, 3, 5),
            ],
            Self::Fan => &[(1, 0, 7), (-2, 1, 1), (-1, 1, 3), (0, 1, 5)],
            Self::ShiauFan => &[(1, 0, 4), (-2, 1, 1), (-1, 1, 1), (0, 1, 2)],
            Self::ShiauFan2 => &[(1, 0, 8), (-3, 1, 1), (-2, 1, 1), (-1, 1, 2), (0, 1, 4)],
            Self::Simple => &[(1, 0, 1)],
            Self::Simple2D => &[(1, 0, 1), (0, 1, 1)],
            Self::SimpleDown => &[(0, 1, 1)],
            Self::SimpleDiagonal => &[(1, 1, 1)],
        }
    }

    /// Returns the default strength of the kernel.
    const fn default_strength(self) -> f32 {
        match self {
            Self::Atkinson => 0.75,
            Self::Pigeon => 6.0 / 7.0,
            _ => 1.0,
        }
    }
}

impl From<NamedKernel> for Kernel {
    fn from(kernel: NamedKernel) -> Self {
        Self::from_table(kernel.table())
    }
}

/// Error diffusion dithering with a [`Kernel`].
///
/// Pixels are visited row by row. The difference between the (error adjusted) source color and
/// the chosen palette color, scaled by the [`strength`](Self::strength), is spread over the
/// kernel taps. With [`serpentine`](Self::serpentine) traversal, odd rows are visited right to left
/// and the kernel is mirrored.
///
/// # Examples
///
/// ```
/// # use palettize::dither::{ErrorDiffusion, NamedKernel};
/// let stucki = ErrorDiffusion::named(NamedKernel::Stucki).serpentine(true);
/// let weak = ErrorDiffusion::floyd_steinberg().strength(0.5).unwrap();
/// assert_eq!(weak.get_strength(), 0.5);
/// assert!(ErrorDiffusion::floyd_steinberg().strength(1.5).is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDiffusion {
    /// The kernel.
    kernel: Kernel,
    /// Whether odd rows are visited right to left.
    serpentine: bool,
    /// The fraction of the error that is propagated.
    strength: OrderedFloat<f32>,
}

impl ErrorDiffusion {
    /// Create a new [`ErrorDiffusion`] ditherer with the given kernel, full strength and
    /// left to right traversal.
    #[must_use]
    pub fn new(kernel: Kernel) -> Self {
        Self { kernel, serpentine: false, strength: OrderedFloat(1.0) }
    }

    /// Create a new [`ErrorDiffusion`] ditherer with a named kernel and its default strength.
    #[must_use]
    pub fn named(kernel: NamedKernel) -> Self {
        Self {
            kernel: kernel.into(),
            serpentine: false,
            strength: OrderedFloat(kernel.default_strength()),
        }
    }

    /// Floyd-Steinberg error diffusion.
    #[must_use]
    pub fn floyd_steinberg() -> Self {
        Self::named(NamedKernel::FloydSteinberg)
    }

    /// Sets whether odd rows are visited right to left.
    #[must_use]
    pub fn serpentine(self, serpentine: bool) -> Self {
        Self { serpentine, ..self }
    }

    /// Sets the fraction of the error that is propagated.
    ///
    /// Returns `None` if `strength` is not in the range `[0.0, 1.0]`.
    #[must_use]
    pub fn strength(self, strength: f32) -> Option<Self> {
        if (0.0..=1.0).contains(&strength) {
            Some(Self { strength: OrderedFloat(strength), ..self })
        } else {
            None
        }
    }

    /// Returns the kernel.
    #[inline]
    pub fn get_kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Returns whether the traversal is serpentine.
    #[inline]
    pub fn get_serpentine(&self) -> bool {
        self.serpentine
    }

    /// Returns the strength.
    #[inline]
    pub fn get_strength(&self) -> f32 {
        self.strength.0
    }
}

impl Default for ErrorDiffusion {
    fn default() -> Self {
        Self::floyd_steinberg()
    }
}

impl Ditherer for ErrorDiffusion {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        true
    }

    fn dither(&self, image: ImageRef<'_>, color_map: &ColorMap, indices: &mut [u8]) {
        let strength = self.get_strength();
        let taps = self
            .kernel
            .taps()
            .iter()
            .map(|&(dx, dy, w)| (dx, dy, [w * strength; 3]))
            .collect::<Vec<_>>();

        diffuse(
            image,
            color_map,
            indices,
            self.serpentine,
            self.kernel.depth(),
            |_, _, _, _, out| out.extend_from_slice(&taps),
        );
    }
}

/// Accumulated error for the current row and the rows below it.
pub(crate) struct ErrorRows {
    /// The width of a row.
    width: usize,
    /// The current row followed by the following rows.
    rows: Vec<Vec<[f32; 3]>>,
}

impl ErrorRows {
    /// Create error rows for an image of the given width, reaching `depth` rows below.
    pub(crate) fn new(width: usize, depth: u8) -> Self {
        Self {
            width,
            rows: vec![vec![[0.0; 3]; width]; usize::from(depth) + 1],
        }
    }

    /// Returns the error accumulated for pixel `x` of the current row.
    #[inline]
    pub(crate) fn get(&self, x: usize) -> [f32; 3] {
        self.rows[0][x]
    }

    /// Add `error` scaled per channel by `weight` to the pixel `dy` rows below at column `x`.
    ///
    /// Pixels outside of the image are ignored.
    #[inline]
    pub(crate) fn add(&mut self, x: isize, dy: u8, error: [f32; 3], weight: [f32; 3]) {
        let Ok(x) = usize::try_from(x) else {
            return;
        };
        if x >= self.width {
            return;
        }
        if let Some(row) = self.rows.get_mut(usize::from(dy)) {
            let target = &mut row[x];
            for c in 0..3 {
                target[c] += error[c] * weight[c];
            }
        }
    }

    /// Move to the next row.
    pub(crate) fn next_row(&mut self) {
        self.rows.rotate_left(1);
        if let Some(last) = self.rows.last_mut() {
            last.fill([0.0; 3]);
        }
    }
}

/// A kernel tap with per channel weights: `(dx, dy, weight)`.
pub(crate) type Tap = (i8, u8, [f32; 3]);

/// Run row-by-row error diffusion over `image`.
///
/// For each pixel, `taps(x, y, dir, source, out)` pushes the taps to spread its error over,
/// relative to a left to right traversal, with per channel weights that already include any
/// strength factor. Taps are mirrored on right to left rows of a serpentine traversal, where
/// `dir` is `-1` instead of `1`.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn diffuse(
    image: ImageRef<'_>,
    color_map: &ColorMap,
    indices: &mut [u8],
    serpentine: bool,
    depth: u8,
    mut taps: impl FnMut(usize, usize, isize, [f32; 3], &mut Vec<Tap>),
) {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let pixels = image.as_slice();
    let mut errors = ErrorRows::new(width, depth);
    let mut out = Vec::new();

    for y in 0..height {
        let reverse = serpentine && y % 2 == 1;
        let dir = if reverse { -1 } else { 1 };
        for step in 0..width {
            let x = if reverse { width - 1 - step } else { step };
            let i = y * width + x;
            let source = components(pixels[i]);
            let error = errors.get(x);
            let color = clamp_color(core::array::from_fn(|c| source[c] + error[c]));

            let index = color_map.nearest(color);
            indices[i] = index;

            let chosen = color_map.color(index);
            let error = core::array::from_fn(|c| color[c] - chosen[c]);

            out.clear();
            taps(x, y, dir, source, &mut out);
            for &(dx, dy, weight) in &out {
                errors.add(x as isize + isize::from(dx) * dir, dy, error, weight);
            }
        }
        errors.next_row();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageBuf, Palette, color_map::DistanceMetric, dither::dither_image, tests::*};
    use approx::assert_relative_eq;
    use palette::Srgb;

    #[test]
    fn named_kernels_are_valid_and_normalized() {
        for kernel in NamedKernel::ALL {
            let taps = kernel
                .table()
                .iter()
                .map(|&(dx, dy, w)| (dx, dy, f32::from(w)))
                .collect::<Vec<_>>();
            let checked = Kernel::new(&taps).unwrap();
            assert_eq!(checked, Kernel::from(kernel), "{}", kernel.name());
            let sum = checked.taps().iter().map(|&(_, _, w)| w).sum::<f32>();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn partial_strength_kernels() {
        assert_eq!(NamedKernel::ALL.len(), 19);
        assert_relative_eq!(ErrorDiffusion::named(NamedKernel::Atkinson).get_strength(), 0.75);
        assert_relative_eq!(ErrorDiffusion::named(NamedKernel::Pigeon).get_strength(), 6.0 / 7.0);
        assert_relative_eq!(ErrorDiffusion::named(NamedKernel::SimpleDown).get_strength(), 1.0);
        assert_eq!(Kernel::from(NamedKernel::Pigeon).depth(), 2);
        assert_eq!(Kernel::from(NamedKernel::SimpleDiagonal).taps(), [(1, 1, 1.0)]);
    }

    #[test]
    fn vertical_kernels_mix_constant_columns() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(4, 16, Srgb::new(128, 128, 128));
        let ditherer = ErrorDiffusion::named(NamedKernel::SimpleDown);
        let indices = dither_image(&ditherer, image.as_ref(), &color_map, false);
        for x in 0..4 {
            let column = (0..16).map(|y| indices[y * 4 + x]).collect::<Vec<_>>();
            assert_eq!(column, [1, 0].repeat(8), "column {x}");
        }
    }

    #[test]
    fn malformed_kernels() {
        assert_eq!(Kernel::new(&[]), Err(KernelError::Empty));
        assert_eq!(Kernel::new(&[(0, 0, 1.0)]), Err(KernelError::Backward { dx: 0, dy: 0 }));
        assert_eq!(Kernel::new(&[(9, 1, 1.0)]), Err(KernelError::OutOfReach { dx: 9, dy: 1 }));
        assert_eq!(Kernel::new(&[(1, 0, -1.0)]), Err(KernelError::InvalidWeight(-1.0)));
        assert!(matches!(Kernel::new(&[(1, 0, f32::NAN)]), Err(KernelError::InvalidWeight(_))));
        assert_eq!(Kernel::new(&[(1, 0, 0.0), (0, 1, 0.0)]), Err(KernelError::ZeroSum));
    }

    #[test]
    fn propagated_error_is_scaled_by_strength() {
        // a single row: the first pixel's error lands entirely on the second pixel
        let image = ImageBuf::new(2, 1, vec![Srgb::new(100, 100, 100), BLACK]).unwrap();
        let palette = Palette::new(vec![BLACK, Srgb::new(120, 120, 120)]).unwrap();
        let color_map = ColorMap::new(palette, DistanceMetric::EuclideanRgb).unwrap();
        let simple = ErrorDiffusion::named(NamedKernel::Simple);

        // 100 -> 120, error -20 pushes the black pixel further toward black
        let indices = dither_image(&simple, image.as_ref(), &color_map, false);
        assert_eq!(indices, [1, 0]);

        // with a brighter second pixel the error decides: 70 - 20 = 50 < 60
        let image = ImageBuf::new(2, 1, vec![Srgb::new(100, 100, 100), Srgb::new(70, 70, 70)])
            .unwrap();
        let indices = dither_image(&simple, image.as_ref(), &color_map, false);
        assert_eq!(indices, [1, 0]);
        let weak = simple.strength(0.0).unwrap();
        let indices = dither_image(&weak, image.as_ref(), &color_map, false);
        assert_eq!(indices, [1, 1]);
    }

    #[test]
    fn error_rows_ignore_outside_pixels() {
        let mut rows = ErrorRows::new(3, 1);
        rows.add(-1, 0, [1.0; 3], [1.0; 3]);
        rows.add(3, 0, [1.0; 3], [1.0; 3]);
        rows.add(1, 2, [1.0; 3], [1.0; 3]);
        rows.add(2, 1, [4.0; 3], [0.5, 0.25, 0.0]);
        assert_eq!(rows.get(0), [0.0; 3]);
        rows.next_row();
        assert_eq!(rows.get(2), [2.0, 1.0, 0.0]);
        rows.next_row();
        assert_eq!(rows.get(2), [0.0; 3]);
    }

    #[test]
    fn serpentine_mirrors_the_kernel() {
        let image = gradient_image(16, 8);
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let ltr = ErrorDiffusion::floyd_steinberg();
        let serpentine = ltr.clone().serpentine(true);
        let a = dither_image(&ltr, image.as_ref(), &color_map, false);
        let b = dither_image(&serpentine, image.as_ref(), &color_map, false);
        // the first row is identical, later rows differ
        assert_eq!(a[..16], b[..16]);
        assert_ne!(a, b);
    }
}
