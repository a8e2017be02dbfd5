use crate::{ImageBuf, MAX_PIXELS, Palette};
use alloc::vec::Vec;
use core::{
    error::Error,
    fmt::{self, Debug},
};

/// The number of bits used to store each palette index of an [`IndexedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BitDepth {
    /// 1 bit per pixel, up to 2 colors.
    One = 1,
    /// 2 bits per pixel, up to 4 colors.
    Two = 2,
    /// 4 bits per pixel, up to 16 colors.
    Four = 4,
    /// 8 bits per pixel, up to 256 colors.
    Eight = 8,
}

impl BitDepth {
    /// Returns the smallest [`BitDepth`] able to index a palette of the given length.
    #[must_use]
    #[inline]
    pub const fn for_palette_len(len: usize) -> Self {
        if len <= 2 {
            Self::One
        } else if len <= 4 {
            Self::Two
        } else if len <= 16 {
            Self::Four
        } else {
            Self::Eight
        }
    }

    /// Returns the number of bits per pixel.
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Returns the maximum number of palette colors addressable with this bit depth.
    #[inline]
    pub const fn max_colors(self) -> u16 {
        1 << self.bits()
    }

    /// Returns the number of bytes needed to store a row of `width` pixels.
    #[inline]
    pub const fn stride(self, width: u32) -> usize {
        (width as usize * self.bits() as usize).div_ceil(8)
    }
}

/// The error returned when an [`IndexedImage`] failed to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndexedImageError {
    /// The number of indices does not match `width * height`, or `width * height` overflows.
    Dimensions {
        /// The provided image width.
        width: u32,
        /// The provided image height.
        height: u32,
        /// The number of provided indices.
        length: usize,
    },
    /// An index does not reference a palette color.
    IndexOutOfRange {
        /// The position of the offending index.
        position: usize,
        /// The offending index.
        index: u8,
        /// The length of the palette.
        palette_len: usize,
    },
}

impl fmt::Display for CreateIndexedImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Dimensions { width, height, length } => {
                if width.checked_mul(height).is_some() {
                    write!(
                        f,
                        "image dimensions of ({width}, {height}) do not match the indices length of {length}",
                    )
                } else {
                    write!(
                        f,
                        "image dimensions of ({width}, {height}) are above the maximum number of pixels of {MAX_PIXELS}",
                    )
                }
            }
            Self::IndexOutOfRange { position, index, palette_len } => write!(
                f,
                "index {index} at position {position} is out of range for a palette of length {palette_len}",
            ),
        }
    }
}

impl Error for CreateIndexedImageError {}

/// An image represented as a palette and packed palette indices.
///
/// Indices are stored in row-major order using the smallest [`BitDepth`] able to index the
/// palette. Within a byte, pixels are packed from the most significant bit down, and every row
/// starts on a new byte.
///
/// # Examples
///
/// ```
/// # use palettize::{BitDepth, IndexedImage, Palette};
/// # use palette::Srgb;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let palette = Palette::new(vec![Srgb::new(0, 0, 0), Srgb::new(255, 255, 255)])?;
/// let image = IndexedImage::new(3, 2, palette, vec![1, 0, 1, 0, 1, 0])?;
/// assert_eq!(image.bit_depth(), BitDepth::One);
/// assert_eq!(image.data(), [0b1010_0000, 0b0100_0000]);
/// assert_eq!(image.index(2, 0), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexedImage {
    /// The width of the image.
    width: u32,
    /// The height of the image.
    height: u32,
    /// The number of bits per index.
    bit_depth: BitDepth,
    /// The palette colors of the image.
    palette: Palette,
    /// The packed indices, `stride` bytes per row.
    data: Vec<u8>,
}

impl IndexedImage {
    /// Create a new [`IndexedImage`] by packing one palette index per pixel.
    ///
    /// # Errors
    ///
    /// Returns an error if the length of `indices` does not equal `width * height`
    /// or if any index is not less than the length of `palette`.
    pub fn new(
        width: u32,
        height: u32,
        palette: Palette,
        indices: Vec<u8>,
    ) -> Result<Self, CreateIndexedImageError> {
        let length = indices.len();
        if width.checked_mul(height).map(|len| len as usize) != Some(length) {
            return Err(CreateIndexedImageError::Dimensions { width, height, length });
        }

        let palette_len = palette.len();
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| usize::from(i) >= palette_len)
        {
            return Err(CreateIndexedImageError::IndexOutOfRange { position, index, palette_len });
        }

        Ok(Self::new_unchecked(width, height, palette, &indices))
    }

    /// Create a new [`IndexedImage`] without validating invariants.
    pub(crate) fn new_unchecked(width: u32, height: u32, palette: Palette, indices: &[u8]) -> Self {
        debug_assert!(indices.iter().all(|&i| usize::from(i) < palette.len()));
        let bit_depth = BitDepth::for_palette_len(palette.len());
        let data = pack_rows(indices, width, bit_depth);
        Self { width, height, bit_depth, palette, data }
    }

    /// Returns the width and height of the [`IndexedImage`].
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the width of the [`IndexedImage`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the [`IndexedImage`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns whether the [`IndexedImage`] has zero pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the number of bits used per index.
    #[inline]
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Returns the palette of the [`IndexedImage`].
    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Returns the packed index buffer.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bytes per row in [`data`](Self::data).
    #[inline]
    pub fn stride(&self) -> usize {
        self.bit_depth.stride(self.width)
    }

    /// Returns the palette index of the pixel at `(x, y)`,
    /// or `None` if the coordinates are out of bounds.
    #[must_use]
    pub fn index(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bits = usize::from(self.bit_depth.bits());
        let bit = x as usize * bits;
        let byte = self.data[y as usize * self.stride() + bit / 8];
        let shift = 8 - bits - bit % 8;
        #[allow(clippy::cast_possible_truncation)]
        let mask = ((1u16 << bits) - 1) as u8;
        Some((byte >> shift) & mask)
    }

    /// Returns the unpacked palette indices in row-major order.
    #[must_use]
    pub fn indices(&self) -> Vec<u8> {
        let mut indices = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                indices.extend(self.index(x, y));
            }
        }
        indices
    }

    /// Decode the [`IndexedImage`] into an [`ImageBuf`] of palette colors.
    #[must_use]
    pub fn to_image(&self) -> ImageBuf {
        let pixels = self
            .indices()
            .into_iter()
            .map(|i| self.palette[i])
            .collect();
        ImageBuf::new_unchecked(self.width, self.height, pixels)
    }

    /// Consume the [`IndexedImage`] and return its palette and packed index buffer.
    #[must_use]
    #[inline]
    pub fn into_parts(self) -> (Palette, Vec<u8>) {
        (self.palette, self.data)
    }
}

/// Pack `indices` into rows of `bit_depth` bits per pixel, most significant bits first.
fn pack_rows(indices: &[u8], width: u32, bit_depth: BitDepth) -> Vec<u8> {
    if width == 0 {
        return Vec::new();
    }
    if bit_depth == BitDepth::Eight {
        return indices.to_vec();
    }

    let bits = bit_depth.bits();
    let stride = bit_depth.stride(width);
    let mut out = Vec::with_capacity(stride * indices.len() / width as usize);
    for row in indices.chunks_exact(width as usize) {
        let mut acc = 0u8;
        let mut acc_bits = 0;
        for &index in row {
            acc = (acc << bits) | index;
            acc_bits += bits;
            if acc_bits == 8 {
                out.push(acc);
                acc = 0;
                acc_bits = 0;
            }
        }
        if acc_bits > 0 {
            out.push(acc << (8 - acc_bits));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use palette::Srgb;

    fn gray_palette(n: u8) -> Palette {
        Palette::new((0..n).map(|i| Srgb::new(i, i, i)).collect()).unwrap()
    }

    #[test]
    fn bit_depth_selection() {
        assert_eq!(BitDepth::for_palette_len(1), BitDepth::One);
        assert_eq!(BitDepth::for_palette_len(2), BitDepth::One);
        assert_eq!(BitDepth::for_palette_len(3), BitDepth::Two);
        assert_eq!(BitDepth::for_palette_len(4), BitDepth::Two);
        assert_eq!(BitDepth::for_palette_len(5), BitDepth::Four);
        assert_eq!(BitDepth::for_palette_len(16), BitDepth::Four);
        assert_eq!(BitDepth::for_palette_len(17), BitDepth::Eight);
        assert_eq!(BitDepth::for_palette_len(256), BitDepth::Eight);
        assert_eq!(BitDepth::Four.max_colors(), 16);
    }

    #[test]
    fn rows_are_packed_and_padded() {
        let image = IndexedImage::new(3, 2, gray_palette(4), vec![0, 1, 2, 3, 2, 1]).unwrap();
        assert_eq!(image.bit_depth(), BitDepth::Two);
        assert_eq!(image.stride(), 1);
        assert_eq!(image.data(), [0b0001_1000, 0b1110_0100]);
        assert_eq!(image.indices(), [0, 1, 2, 3, 2, 1]);
    }

    #[test]
    fn four_bit_round_trip() {
        let indices = (0..15u8).collect::<Vec<_>>();
        let image = IndexedImage::new(5, 3, gray_palette(16), indices.clone()).unwrap();
        assert_eq!(image.stride(), 3);
        assert_eq!(image.data().len(), 9);
        assert_eq!(image.indices(), indices);
        assert_eq!(image.to_image().pixel(4, 2), Some(&Srgb::new(14, 14, 14)));
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(
            IndexedImage::new(2, 2, gray_palette(2), vec![0; 3]),
            Err(CreateIndexedImageError::Dimensions { .. })
        ));
        assert_eq!(
            IndexedImage::new(2, 1, gray_palette(2), vec![0, 2]),
            Err(CreateIndexedImageError::IndexOutOfRange { position: 1, index: 2, palette_len: 2 })
        );
    }

    #[test]
    fn identical_images_deduplicate_in_a_set() {
        use std::collections::HashSet;

        let a = IndexedImage::new(2, 2, gray_palette(3), vec![0, 1, 2, 1]).unwrap();
        let b = IndexedImage::new(2, 2, gray_palette(3), vec![0, 1, 2, 2]).unwrap();
        let set = [a.clone(), b, a].into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 2);
    }
}
