use crate::{LengthOutOfRange, MAX_COLORS};
use alloc::vec::Vec;
use core::{
    error::Error,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    num::{NonZeroU8, NonZeroU16},
    ops::{Deref, Index},
};
use palette::Srgb;

/// The error returned when attempting to convert an out of range integer into a [`PaletteSize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaletteSizeFromIntError(());

impl fmt::Display for PaletteSizeFromIntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("out of range conversion from integer to palette size")
    }
}

impl Error for PaletteSizeFromIntError {}

/// The requested number of colors in a palette.
///
/// This is a new type wrapper around [`NonZeroU16`] with the invariant that it must be in the
/// range `1..=256` specified by [`PaletteSize::MIN`] and [`PaletteSize::MAX`].
///
/// # Examples
///
/// ```
/// # use palettize::{PaletteSize, PaletteSizeFromIntError};
/// # fn main() -> Result<(), PaletteSizeFromIntError> {
/// let size: PaletteSize = 64u16.try_into()?;
/// assert_eq!(size.as_usize(), 64);
/// assert_eq!(PaletteSize::try_from_u16(256), Some(PaletteSize::MAX));
/// assert_eq!(PaletteSize::try_from_u16(0), None);
/// assert_eq!(PaletteSize::from_usize_clamped(1024), PaletteSize::MAX);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PaletteSize(NonZeroU16);

impl PaletteSize {
    /// The smallest possible palette size, which is `1`.
    pub const MIN: Self = Self(NonZeroU16::MIN);

    /// The largest possible palette size, which is `256`.
    #[allow(clippy::unwrap_used)]
    pub const MAX: Self = Self(NonZeroU16::new(MAX_COLORS).unwrap());

    /// Returns a [`PaletteSize`] as a `u16`.
    #[inline]
    pub const fn as_u16(&self) -> u16 {
        self.0.get()
    }

    /// Returns a [`PaletteSize`] as a `usize`.
    #[inline]
    pub const fn as_usize(&self) -> usize {
        self.as_u16() as usize
    }

    /// Create a [`PaletteSize`] from a `u16`, returning `None` if the provided `value`
    /// is not in the range `1..=256`.
    #[must_use]
    #[inline]
    pub const fn try_from_u16(value: u16) -> Option<Self> {
        match NonZeroU16::new(value) {
            Some(value) if value.get() <= MAX_COLORS => Some(Self(value)),
            _ => None,
        }
    }

    /// Create a [`PaletteSize`] from a `usize`, returning `None` if the provided `value`
    /// is not in the range `1..=256`.
    #[must_use]
    #[inline]
    pub const fn try_from_usize(value: usize) -> Option<Self> {
        if value <= MAX_COLORS as usize {
            #[allow(clippy::cast_possible_truncation)]
            Self::try_from_u16(value as u16)
        } else {
            None
        }
    }

    /// Create a [`PaletteSize`] from a `usize`, clamping the provided `value` to
    /// the range specified by [`PaletteSize::MIN`] and [`PaletteSize::MAX`].
    #[must_use]
    #[inline]
    pub const fn from_usize_clamped(value: usize) -> Self {
        if value > MAX_COLORS as usize {
            Self::MAX
        } else if let Some(size) = Self::try_from_usize(value) {
            size
        } else {
            Self::MIN
        }
    }

    /// Create a [`PaletteSize`] from a [`NonZeroU8`].
    #[must_use]
    #[inline]
    pub const fn from_nz_u8(value: NonZeroU8) -> Self {
        match NonZeroU16::new(value.get() as u16) {
            Some(value) => Self(value),
            None => Self::MIN,
        }
    }

    /// Create a [`PaletteSize`] from a `u8`, clamping the provided `value` to
    /// a minimum of [`PaletteSize::MIN`].
    #[must_use]
    #[inline]
    pub const fn from_u8_clamped(value: u8) -> Self {
        match NonZeroU8::new(value) {
            Some(value) => Self::from_nz_u8(value),
            None => Self::MIN,
        }
    }
}

impl From<PaletteSize> for u16 {
    #[inline]
    fn from(size: PaletteSize) -> Self {
        size.as_u16()
    }
}

impl From<PaletteSize> for usize {
    #[inline]
    fn from(size: PaletteSize) -> Self {
        size.as_usize()
    }
}

impl From<NonZeroU8> for PaletteSize {
    #[inline]
    fn from(value: NonZeroU8) -> Self {
        Self::from_nz_u8(value)
    }
}

impl TryFrom<u8> for PaletteSize {
    type Error = PaletteSizeFromIntError;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u16(value.into()).ok_or(PaletteSizeFromIntError(()))
    }
}

impl TryFrom<u16> for PaletteSize {
    type Error = PaletteSizeFromIntError;

    #[inline]
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::try_from_u16(value).ok_or(PaletteSizeFromIntError(()))
    }
}

impl TryFrom<usize> for PaletteSize {
    type Error = PaletteSizeFromIntError;

    #[inline]
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::try_from_usize(value).ok_or(PaletteSizeFromIntError(()))
    }
}

impl fmt::Display for PaletteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// The error returned when a [`Palette`] failed to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePaletteError {
    /// More than [`MAX_COLORS`] colors were provided.
    TooLong(LengthOutOfRange),
    /// The same color appeared more than once at the given index.
    Duplicate(usize),
}

impl fmt::Display for CreatePaletteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(err) => write!(f, "invalid palette length: {err}"),
            Self::Duplicate(i) => write!(f, "palette color at index {i} is a duplicate"),
        }
    }
}

impl Error for CreatePaletteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TooLong(err) => Some(err),
            Self::Duplicate(_) => None,
        }
    }
}

/// An ordered sequence of at most 256 distinct colors.
///
/// A [`Palette`] is produced by a [`Quantizer`](crate::quantize::Quantizer) and is read-only
/// afterwards. It may be empty, which is only the case when quantizing an empty histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette(Vec<Srgb<u8>>);

impl Palette {
    /// Create a new [`Palette`] from a [`Vec`] of distinct colors.
    ///
    /// # Errors
    ///
    /// Returns an error if `colors` has more than [`MAX_COLORS`] colors or contains a duplicate.
    pub fn new(colors: Vec<Srgb<u8>>) -> Result<Self, CreatePaletteError> {
        LengthOutOfRange::check_len(colors.len(), 0, MAX_COLORS.into())
            .map_err(CreatePaletteError::TooLong)?;

        let mut keys = colors
            .iter()
            .enumerate()
            .map(|(i, &c)| (color_key(c), i))
            .collect::<Vec<_>>();
        keys.sort_unstable();
        if let Some(w) = keys.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(CreatePaletteError::Duplicate(w[1].1));
        }

        Ok(Self(colors))
    }

    /// Create a [`Palette`] from floating point centroids in the `0.0..=255.0` range.
    ///
    /// Each centroid is rounded and clamped, non-finite centroids are skipped, duplicates after
    /// rounding are removed (keeping the first occurrence), and the result is truncated to `size`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_centroids(
        centroids: impl IntoIterator<Item = [f32; 3]>,
        size: crate::PaletteSize,
    ) -> Self {
        let mut seen = Vec::with_capacity(size.as_usize());
        let mut colors = Vec::with_capacity(size.as_usize());
        for centroid in centroids {
            if colors.len() >= size.as_usize() {
                break;
            }
            if !centroid.iter().all(|c| c.is_finite()) {
                continue;
            }
            let [r, g, b] = centroid.map(|c| c.round().clamp(0.0, 255.0) as u8);
            let color = Srgb::new(r, g, b);
            let key = color_key(color);
            if !seen.contains(&key) {
                seen.push(key);
                colors.push(color);
            }
        }
        Self(colors)
    }

    /// Create a [`Palette`] without validating that the colors are distinct.
    #[inline]
    pub(crate) fn new_unchecked(colors: Vec<Srgb<u8>>) -> Self {
        debug_assert!(colors.len() <= MAX_COLORS.into());
        Self(colors)
    }

    /// Returns the colors of the palette as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[Srgb<u8>] {
        &self.0
    }

    /// Returns the colors of the palette as `[f32; 3]` components.
    #[inline]
    pub fn to_components(&self) -> Vec<[f32; 3]> {
        self.0.iter().map(|&c| components(c)).collect()
    }

    /// Consume the [`Palette`] and return the underlying [`Vec`] of colors.
    #[must_use]
    #[inline]
    pub fn into_vec(self) -> Vec<Srgb<u8>> {
        self.0
    }
}

/// Packs a color into a `u32` sort key.
#[inline]
pub(crate) fn color_key(color: Srgb<u8>) -> u32 {
    u32::from_be_bytes([0, color.red, color.green, color.blue])
}

/// Returns the components of a color as `f32`s in the `0.0..=255.0` range.
#[inline]
pub(crate) fn components(color: Srgb<u8>) -> [f32; 3] {
    [color.red, color.green, color.blue].map(f32::from)
}

impl Hash for Palette {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for &color in &self.0 {
            color_key(color).hash(state);
        }
    }
}

impl Deref for Palette {
    type Target = [Srgb<u8>];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[Srgb<u8>]> for Palette {
    #[inline]
    fn as_ref(&self) -> &[Srgb<u8>] {
        &self.0
    }
}

impl Index<u8> for Palette {
    type Output = Srgb<u8>;

    #[inline]
    fn index(&self, index: u8) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}

impl TryFrom<Vec<Srgb<u8>>> for Palette {
    type Error = CreatePaletteError;

    #[inline]
    fn try_from(colors: Vec<Srgb<u8>>) -> Result<Self, Self::Error> {
        Self::new(colors)
    }
}

impl<'a> IntoIterator for &'a Palette {
    type Item = &'a Srgb<u8>;
    type IntoIter = core::slice::Iter<'a, Srgb<u8>>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Palette> for Vec<Srgb<u8>> {
    #[inline]
    fn from(palette: Palette) -> Self {
        palette.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaletteSize;

    #[test]
    fn palette_size_conversions() {
        assert_eq!(PaletteSize::try_from(0u8), Err(PaletteSizeFromIntError(())));
        assert_eq!(PaletteSize::try_from(257u16), Err(PaletteSizeFromIntError(())));
        assert_eq!(PaletteSize::try_from(256usize), Ok(PaletteSize::MAX));
        assert_eq!(PaletteSize::from_u8_clamped(0), PaletteSize::MIN);
        assert_eq!(PaletteSize::from_usize_clamped(0), PaletteSize::MIN);
        assert_eq!(PaletteSize::from_usize_clamped(100).as_usize(), 100);
        assert_eq!(PaletteSize::MAX.to_string(), "256");
    }

    #[test]
    fn palette_rejects_duplicates_and_overflow() {
        let black = Srgb::new(0, 0, 0);
        let white = Srgb::new(255, 255, 255);
        assert_eq!(
            Palette::new(vec![black, white, black]),
            Err(CreatePaletteError::Duplicate(2))
        );
        assert!(matches!(
            Palette::new(vec![black; 257]),
            Err(CreatePaletteError::TooLong(_))
        ));
        assert!(Palette::new(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn equal_palettes_hash_equal() {
        use std::hash::{BuildHasher as _, RandomState};

        let state = RandomState::new();
        let colors = vec![Srgb::new(1, 2, 3), Srgb::new(200, 100, 50)];
        let a = Palette::new(colors.clone()).unwrap();
        let b = Palette::new(colors).unwrap();
        let c = Palette::new(vec![Srgb::new(200, 100, 50), Srgb::new(1, 2, 3)]).unwrap();
        assert_eq!(state.hash_one(&a), state.hash_one(&b));
        assert_ne!(state.hash_one(&a), state.hash_one(&c));
    }

    #[test]
    fn centroids_are_rounded_deduped_and_truncated() {
        let centroids = [
            [0.2, 0.4, -3.0],
            [0.0, 0.0, 0.0],
            [f32::NAN, 0.0, 0.0],
            [254.6, 300.0, 10.5],
            [1.0, 1.0, 1.0],
        ];
        let palette = Palette::from_centroids(centroids, PaletteSize::from_u8_clamped(2));
        assert_eq!(
            palette.as_slice(),
            [Srgb::new(0, 0, 0), Srgb::new(255, 255, 11)]
        );
    }
}
