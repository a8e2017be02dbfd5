use core::{
    error::Error,
    fmt::{self, Debug},
};

/// The error returned when the length of a value or input is not in the supported range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthOutOfRange {
    /// The length of the provided value.
    len: usize,
    /// The minimum supported length.
    min: u32,
    /// The maximum supported length.
    max: u32,
}

impl LengthOutOfRange {
    /// Checks that `len` is within `min..=max`, returning it as a `u32`.
    #[inline]
    pub(crate) const fn check_len(len: usize, min: u32, max: u32) -> Result<u32, Self> {
        #[allow(clippy::cast_possible_truncation)]
        if min as usize <= len && len <= max as usize {
            Ok(len as u32)
        } else {
            Err(Self { len, min, max })
        }
    }

    /// Checks that `width * height` does not overflow the maximum number of pixels.
    #[cfg_attr(not(feature = "image"), allow(dead_code))]
    #[inline]
    pub(crate) const fn check_dimensions(width: u32, height: u32) -> Result<u32, Self> {
        if let Some(len) = width.checked_mul(height) {
            Ok(len)
        } else {
            Err(Self {
                len: (width as usize).saturating_mul(height as usize),
                min: 0,
                max: crate::MAX_PIXELS,
            })
        }
    }

    /// Returns the length of the provided value.
    #[inline]
    pub const fn input_len(&self) -> usize {
        self.len
    }

    /// Returns the supported range of lengths.
    #[inline]
    pub const fn range(&self) -> (u32, u32) {
        (self.min, self.max)
    }
}

impl fmt::Display for LengthOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { len, min, max } = *self;
        if min == 0 {
            write!(
                f,
                "got an input with length {len} which is above the maximum {max}",
            )
        } else {
            write!(
                f,
                "got an input with length {len} which is not in the supported range of {min}..={max}",
            )
        }
    }
}

impl Error for LengthOutOfRange {}
