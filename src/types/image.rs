use crate::MAX_PIXELS;
use alloc::{vec, vec::Vec};
use core::{
    error::Error,
    fmt::{self, Debug},
    marker::PhantomData,
};
use palette::Srgb;

/// The error returned when an [`Image`] failed to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateImageError {
    /// The provided image width.
    width: u32,
    /// The provided image height.
    height: u32,
    /// The length of the pixel buffer.
    length: usize,
}

impl CreateImageError {
    /// Returns the width, height, and buffer length that failed validation.
    #[inline]
    pub const fn parts(&self) -> (u32, u32, usize) {
        (self.width, self.height, self.length)
    }
}

impl fmt::Display for CreateImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { width, height, length } = *self;
        if width.checked_mul(height).is_some() {
            write!(
                f,
                "image dimensions of ({width}, {height}) do not match the buffer length of {length}"
            )
        } else {
            write!(
                f,
                "image dimensions of ({width}, {height}) are above the maximum number of pixels of {MAX_PIXELS}",
            )
        }
    }
}

impl Error for CreateImageError {}

/// The base image type parameterized by the color type and the type of the container.
///
/// Typically you want to use one of the aliases with a defined container:
/// - [`ImageBuf`]: an owned image backed by a [`Vec`].
/// - [`ImageRef`]: a borrowed image backed by an immutable slice reference.
///
/// Pixels are stored in row-major order and the length of the container always equals
/// `width * height`, which is at most [`MAX_PIXELS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Image<Color, Container> {
    /// The color type stored in `pixels`.
    color: PhantomData<Color>,
    /// The width of the image.
    width: u32,
    /// The height of the image.
    height: u32,
    /// The pixel buffer or slice.
    pixels: Container,
}

/// An owned image buffer backed by a [`Vec`].
///
/// # Examples
///
/// ```
/// # use palettize::{ImageBuf, CreateImageError};
/// # use palette::Srgb;
/// # fn main() -> Result<(), CreateImageError> {
/// let (width, height) = (16, 16);
/// let pixels = vec![Srgb::new(0, 0, 0); (width * height) as usize];
/// let image = ImageBuf::new(width, height, pixels)?;
/// assert_eq!(image.num_pixels(), 256);
/// # Ok(())
/// # }
/// ```
pub type ImageBuf<Color = Srgb<u8>> = Image<Color, Vec<Color>>;

/// A borrowed image backed by a reference to a slice.
///
/// Use [`ImageBuf::as_ref`] or [`ImageRef::new`] to create one.
pub type ImageRef<'a, Color = Srgb<u8>> = Image<Color, &'a [Color]>;

impl<Color, Container> Image<Color, Container> {
    /// Returns the width and height of the [`Image`].
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the width of the [`Image`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the [`Image`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns whether the [`Image`] has zero pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the underlying pixel container.
    #[must_use]
    #[inline]
    pub fn into_inner(self) -> Container {
        self.pixels
    }
}

impl<Color, Container: AsRef<[Color]>> Image<Color, Container> {
    /// Create a new [`Image`] without validating invariants.
    #[inline]
    pub(crate) fn new_unchecked(width: u32, height: u32, pixels: Container) -> Self {
        debug_assert_eq!(
            width.checked_mul(height).map(|len| len as usize),
            Some(pixels.as_ref().len())
        );
        Self { color: PhantomData, width, height, pixels }
    }

    /// Create a new [`Image`] from a width, a height, and a `Container` of pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if `width * height` overflows a `u32` or if it does not match the length
    /// of `pixels`.
    #[inline]
    pub fn new(width: u32, height: u32, pixels: Container) -> Result<Self, CreateImageError> {
        let length = pixels.as_ref().len();
        if width.checked_mul(height).map(|len| len as usize) == Some(length) {
            Ok(Self::new_unchecked(width, height, pixels))
        } else {
            Err(CreateImageError { width, height, length })
        }
    }

    /// Returns the number of pixels in the [`Image`] specified by `width * height`.
    #[allow(clippy::cast_possible_truncation)]
    #[inline]
    pub fn num_pixels(&self) -> u32 {
        self.pixels.as_ref().len() as u32
    }

    /// Returns a reference to the underlying pixels as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[Color] {
        self.pixels.as_ref()
    }

    /// Convert an [`Image`] to an [`ImageRef`].
    #[inline]
    pub fn as_ref(&self) -> ImageRef<'_, Color> {
        Image::new_unchecked(self.width, self.height, self.as_slice())
    }

    /// Returns the row of pixels at `y`, or `None` if `y` is out of bounds.
    #[inline]
    pub fn row(&self, y: u32) -> Option<&[Color]> {
        let width = self.width as usize;
        let start = y as usize * width;
        (y < self.height).then(|| &self.as_slice()[start..start + width])
    }

    /// Returns the pixel at `(x, y)`, or `None` if the coordinates are out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Option<&Color> {
        if x < self.width && y < self.height {
            self.as_slice()
                .get(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }
}

impl<Color: Clone> ImageBuf<Color> {
    /// Create a new [`ImageBuf`] with every pixel set to `pixel`.
    ///
    /// Returns `None` if `width * height` overflows a `u32`.
    #[must_use]
    #[inline]
    pub fn from_pixel(width: u32, height: u32, pixel: Color) -> Option<Self> {
        let len = width.checked_mul(height)?;
        Some(Self::new_unchecked(width, height, vec![pixel; len as usize]))
    }
}

impl<Color> Default for ImageBuf<Color> {
    #[inline]
    fn default() -> Self {
        Self { color: PhantomData, width: 0, height: 0, pixels: Vec::new() }
    }
}

impl<Color> Default for ImageRef<'_, Color> {
    #[inline]
    fn default() -> Self {
        Self { color: PhantomData, width: 0, height: 0, pixels: &[] }
    }
}

#[cfg(feature = "image")]
mod image_integration {
    use super::{CreateImageError, Image, ImageBuf, ImageRef};
    use crate::LengthOutOfRange;
    use image::RgbImage;
    use palette::{
        Srgb,
        cast::{ComponentsAs as _, ComponentsInto as _, IntoComponents as _},
    };

    impl From<ImageBuf<Srgb<u8>>> for RgbImage {
        #[allow(clippy::expect_used)]
        fn from(image: ImageBuf<Srgb<u8>>) -> Self {
            let Image { width, height, pixels, .. } = image;
            RgbImage::from_raw(width, height, pixels.into_components())
                .expect("buffer is large enough")
        }
    }

    impl TryFrom<RgbImage> for ImageBuf<Srgb<u8>> {
        type Error = CreateImageError;

        fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
            let (width, height) = image.dimensions();
            let length = image.len() / 3;
            match LengthOutOfRange::check_dimensions(width, height) {
                Ok(len) if len as usize <= length => {
                    let mut buf = image.into_raw();
                    buf.truncate(len as usize * 3);
                    Ok(Self::new_unchecked(width, height, buf.components_into()))
                }
                _ => Err(CreateImageError { width, height, length }),
            }
        }
    }

    impl<'a> TryFrom<&'a RgbImage> for ImageRef<'a, Srgb<u8>> {
        type Error = LengthOutOfRange;

        fn try_from(image: &'a RgbImage) -> Result<Self, Self::Error> {
            let (width, height) = image.dimensions();
            let len = LengthOutOfRange::check_dimensions(width, height)?;
            let slice = &image.as_raw()[..len as usize * 3];
            Ok(Self::new_unchecked(width, height, slice.components_as()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_dimensions() {
        let pixels = vec![Srgb::new(0u8, 0, 0); 10];
        assert!(ImageBuf::new(3, 3, pixels.clone()).is_err());
        assert!(ImageBuf::new(5, 2, pixels).is_ok());
        assert!(ImageBuf::<Srgb<u8>>::new(u32::MAX, 2, Vec::new()).is_err());
    }

    #[test]
    fn pixel_access() {
        let pixels = (0..6u8).map(|i| Srgb::new(i, i, i)).collect();
        let image = ImageBuf::new(3, 2, pixels).unwrap();
        assert_eq!(image.pixel(2, 1), Some(&Srgb::new(5, 5, 5)));
        assert_eq!(image.pixel(3, 0), None);
        assert_eq!(image.row(1).map(<[_]>::len), Some(3));
        assert_eq!(image.row(2), None);
    }

    #[test]
    fn empty_default() {
        assert!(ImageBuf::<Srgb<u8>>::default().is_empty());
        assert!(ImageRef::<Srgb<u8>>::default().is_empty());
    }
}
