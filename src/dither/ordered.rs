//! Ordered dithering with tiled threshold matrices.

use super::{Ditherer, bayer_rank, perturb};
use crate::color_map::ColorMap;
use alloc::vec::Vec;
use core::{error::Error, fmt};

/// The largest supported matrix width or height.
const MAX_SIZE: u32 = 256;

/// The error returned when a [`ThresholdMatrix`] cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixError {
    /// The width or height is zero or larger than 256.
    InvalidDimensions {
        /// The requested width.
        width: u32,
        /// The requested height.
        height: u32,
    },
    /// The number of ranks does not equal `width * height`.
    LengthMismatch {
        /// The expected number of ranks.
        expected: usize,
        /// The provided number of ranks.
        actual: usize,
    },
    /// A rank is not less than `width * height`.
    RankOutOfRange(u32),
    /// A Bayer matrix was requested with a size other than 2, 4, 8 or 16.
    UnsupportedBayerSize(u32),
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => write!(
                f,
                "invalid matrix dimensions {width}x{height}, each must be in 1..={MAX_SIZE}"
            ),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "expected {expected} matrix ranks but got {actual}")
            }
            Self::RankOutOfRange(rank) => write!(f, "the matrix rank {rank} is out of range"),
            Self::UnsupportedBayerSize(size) => {
                write!(f, "unsupported Bayer matrix size {size}, expected 2, 4, 8 or 16")
            }
        }
    }
}

impl Error for MatrixError {}

/// A threshold matrix tiled over the image with `matrix[x mod width, y mod height]`.
///
/// Thresholds are in `0.0..1.0`. A matrix created from ranks `0..n` has thresholds
/// `(rank + 0.5) / n`.
///
/// # Examples
///
/// ```
/// # use palettize::dither::{MatrixError, ThresholdMatrix};
/// let matrix = ThresholdMatrix::new(2, 2, vec![0, 2, 3, 1]).unwrap();
/// assert_eq!(matrix, ThresholdMatrix::bayer(2).unwrap());
/// assert_eq!(matrix.threshold(3, 2), matrix.threshold(1, 0));
/// assert_eq!(ThresholdMatrix::bayer(3), Err(MatrixError::UnsupportedBayerSize(3)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMatrix {
    /// The width of the matrix.
    width: u32,
    /// The height of the matrix.
    height: u32,
    /// The thresholds in row-major order.
    thresholds: Vec<f32>,
}

impl ThresholdMatrix {
    /// Create a new [`ThresholdMatrix`] from ranks in row-major order.
    ///
    /// Ranks must be less than `width * height`. Equal ranks give equal thresholds.
    ///
    /// # Errors
    ///
    /// Returns a [`MatrixError`] if a dimension is zero or larger than 256, the number of ranks
    /// does not equal `width * height`, or a rank is out of range.
    pub fn new(width: u32, height: u32, ranks: Vec<u32>) -> Result<Self, MatrixError> {
        if !(1..=MAX_SIZE).contains(&width) || !(1..=MAX_SIZE).contains(&height) {
            return Err(MatrixError::InvalidDimensions { width, height });
        }
        let levels = width * height;
        if ranks.len() != levels as usize {
            return Err(MatrixError::LengthMismatch {
                expected: levels as usize,
                actual: ranks.len(),
            });
        }
        if let Some(&rank) = ranks.iter().find(|&&r| r >= levels) {
            return Err(MatrixError::RankOutOfRange(rank));
        }
        Ok(Self::from_ranks(width, height, &ranks))
    }

    /// Create a [`ThresholdMatrix`] from ranks that are known to be valid.
    #[allow(clippy::cast_precision_loss)]
    fn from_ranks(width: u32, height: u32, ranks: &[u32]) -> Self {
        let levels = (width * height) as f32;
        let thresholds = ranks.iter().map(|&r| (r as f32 + 0.5) / levels).collect();
        Self { width, height, thresholds }
    }

    /// Create a [`ThresholdMatrix`] by ranking the values of a `width` by `height` field,
    /// breaking ties by position.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn from_field(width: u32, height: u32, field: &[f32]) -> Self {
        debug_assert_eq!(field.len(), (width * height) as usize);
        let mut order = (0..field.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| field[a].total_cmp(&field[b]).then(a.cmp(&b)));
        let mut ranks = alloc::vec![0; field.len()];
        for (rank, i) in order.into_iter().enumerate() {
            ranks[i] = rank as u32;
        }
        Self::from_ranks(width, height, &ranks)
    }

    /// A `size` by `size` Bayer matrix, for `size` in 2, 4, 8 or 16.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::UnsupportedBayerSize`] for any other size.
    pub fn bayer(size: u32) -> Result<Self, MatrixError> {
        let bits = match size {
            2 => 1,
            4 => 2,
            8 => 3,
            16 => 4,
            _ => return Err(MatrixError::UnsupportedBayerSize(size)),
        };
        let ranks = (0..size)
            .flat_map(|y| (0..size).map(move |x| bayer_rank(x, y, bits)))
            .collect::<Vec<_>>();
        Ok(Self::from_ranks(size, size, &ranks))
    }

    /// An 8x8 halftone matrix with two clustered dots per tile, growing from their centers.
    #[must_use]
    #[rustfmt::skip]
    pub fn halftone() -> Self {
        Self::from_ranks(8, 8, &[
            24, 10, 12, 26, 35, 47, 49, 37,
             8,  0,  2, 14, 45, 59, 61, 51,
            22,  6,  4, 16, 43, 57, 63, 53,
            30, 20, 18, 28, 33, 41, 55, 39,
            34, 46, 48, 36, 25, 11, 13, 27,
            44, 58, 60, 50,  9,  1,  3, 15,
            42, 56, 62, 52, 23,  7,  5, 17,
            32, 40, 54, 38, 31, 21, 19, 29,
        ])
    }

    /// A 4x4 clustered-dot matrix growing in a spiral from the center.
    #[must_use]
    #[rustfmt::skip]
    pub fn cluster_dot() -> Self {
        Self::from_ranks(4, 4, &[
            12,  5,  6, 13,
             4,  0,  1,  7,
            11,  3,  2,  8,
            15, 10,  9, 14,
        ])
    }

    /// An 8x8 matrix of diagonal lines.
    #[must_use]
    pub fn diagonal() -> Self {
        let ranks = (0..8)
            .flat_map(|y| (0..8).map(move |x| ((x + y) % 8) * 8 + x))
            .collect::<Vec<_>>();
        Self::from_ranks(8, 8, &ranks)
    }

    /// Returns the width of the matrix.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the matrix.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the threshold for the pixel at (`x`, `y`).
    #[inline]
    pub fn threshold(&self, x: u32, y: u32) -> f32 {
        let i = (y % self.height) * self.width + x % self.width;
        self.thresholds[i as usize]
    }
}

/// Ordered dithering: each pixel is perturbed by its threshold from a tiled [`ThresholdMatrix`]
/// before taking the nearest palette color.
///
/// The output for a constant color is exactly periodic with the matrix dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered {
    /// The threshold matrix.
    matrix: ThresholdMatrix,
}

impl Ordered {
    /// Create a new [`Ordered`] ditherer using the given matrix.
    #[must_use]
    pub fn new(matrix: ThresholdMatrix) -> Self {
        Self { matrix }
    }

    /// Create a new [`Ordered`] ditherer with a `size` by `size` Bayer matrix.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::UnsupportedBayerSize`] if `size` is not 2, 4, 8 or 16.
    pub fn bayer(size: u32) -> Result<Self, MatrixError> {
        ThresholdMatrix::bayer(size).map(Self::new)
    }

    /// Returns the threshold matrix.
    #[inline]
    pub fn matrix(&self) -> &ThresholdMatrix {
        &self.matrix
    }
}

impl Ditherer for Ordered {
    #[inline]
    fn requires_sequential_processing(&self) -> bool {
        false
    }

    #[inline]
    fn dither_pixel(&self, color: [f32; 3], x: u32, y: u32, color_map: &ColorMap) -> u8 {
        perturb(color, self.matrix.threshold(x, y), color_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Palette, color_map::DistanceMetric, dither::dither_image, tests::*};
    use palette::Srgb;

    fn is_permutation(matrix: &ThresholdMatrix) -> bool {
        let n = matrix.width() * matrix.height();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let mut ranks = matrix
            .thresholds
            .iter()
            .map(|&t| (t * n as f32 - 0.5).round() as u32)
            .collect::<Vec<_>>();
        ranks.sort_unstable();
        ranks.into_iter().eq(0..n)
    }

    #[test]
    fn builtin_matrices_are_permutations() {
        for size in [2, 4, 8, 16] {
            assert!(is_permutation(&ThresholdMatrix::bayer(size).unwrap()));
        }
        assert!(is_permutation(&ThresholdMatrix::halftone()));
        assert!(is_permutation(&ThresholdMatrix::cluster_dot()));
        assert!(is_permutation(&ThresholdMatrix::diagonal()));
    }

    #[test]
    fn invalid_matrices() {
        assert_eq!(
            ThresholdMatrix::new(0, 2, vec![]),
            Err(MatrixError::InvalidDimensions { width: 0, height: 2 })
        );
        assert_eq!(
            ThresholdMatrix::new(2, 2, vec![0, 1, 2]),
            Err(MatrixError::LengthMismatch { expected: 4, actual: 3 })
        );
        assert_eq!(
            ThresholdMatrix::new(2, 2, vec![0, 1, 2, 4]),
            Err(MatrixError::RankOutOfRange(4))
        );
        assert_eq!(Ordered::bayer(32), Err(MatrixError::UnsupportedBayerSize(32)));
    }

    #[test]
    fn field_ranking() {
        let matrix = ThresholdMatrix::from_field(2, 2, &[0.9, -1.0, 0.9, 0.1]);
        assert_eq!(matrix, ThresholdMatrix::new(2, 2, vec![2, 0, 3, 1]).unwrap());
    }

    #[test]
    fn pattern_is_periodic() {
        let palette = Palette::new(vec![BLACK, WHITE, Srgb::new(128, 0, 128)]).unwrap();
        let color_map = ColorMap::new(palette, DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(40, 40, Srgb::new(90, 40, 90));
        for matrix in [
            ThresholdMatrix::bayer(8).unwrap(),
            ThresholdMatrix::halftone(),
            ThresholdMatrix::cluster_dot(),
            ThresholdMatrix::diagonal(),
            ThresholdMatrix::new(3, 2, vec![0, 4, 2, 5, 1, 3]).unwrap(),
        ] {
            let (w, h) = (matrix.width() as usize, matrix.height() as usize);
            let indices = dither_image(&Ordered::new(matrix), image.as_ref(), &color_map, false);
            for y in 0..40 - h {
                for x in 0..40 - w {
                    assert_eq!(indices[y * 40 + x], indices[(y + h) * 40 + x + w]);
                }
            }
        }
    }

    #[test]
    fn gray_matches_threshold_fraction() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = solid_image(8, 8, Srgb::new(64, 64, 64));
        let indices = dither_image(&Ordered::bayer(8).unwrap(), image.as_ref(), &color_map, false);
        let white = indices.iter().filter(|&&i| i == 1).count();
        // roughly a quarter of the pixels are white
        assert!((14..=18).contains(&white), "{white}");
    }
}
