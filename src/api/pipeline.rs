use crate::{
    BitDepth, CreateIndexedImageError, Histogram, ImageRef, IndexedImage, Palette, PaletteSize,
    PaletteSizeFromIntError,
    color_map::{ColorMap, DistanceMetric},
    dither::{Ditherer, ErrorDiffusion, dither_image},
    quantize::{Quantizer, Wu},
};
use alloc::{borrow::Cow, vec};
use core::{error::Error, fmt};
use palette::Srgb;

/// The default maximum number of histogram entries handed to the quantizer.
pub const DEFAULT_MAX_HISTOGRAM_SIZE: usize = 65536;

/// The error returned when [`reduce_colors`] or [`Pipeline::reduce`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceColorsError {
    /// The requested number of colors is not in the range `1..=256`.
    ColorCount(PaletteSizeFromIntError),
    /// The ditherer produced an index that does not reference a palette color.
    Output(CreateIndexedImageError),
}

impl fmt::Display for ReduceColorsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColorCount(_) => write!(f, "invalid number of palette colors"),
            Self::Output(_) => write!(f, "the ditherer produced an invalid indexed image"),
        }
    }
}

impl Error for ReduceColorsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ColorCount(err) => Some(err),
            Self::Output(err) => Some(err),
        }
    }
}

impl From<PaletteSizeFromIntError> for ReduceColorsError {
    fn from(err: PaletteSizeFromIntError) -> Self {
        Self::ColorCount(err)
    }
}

impl From<CreateIndexedImageError> for ReduceColorsError {
    fn from(err: CreateIndexedImageError) -> Self {
        Self::Output(err)
    }
}

/// Reduce `image` to an [`IndexedImage`] with at most `color_count` colors.
///
/// The palette is chosen by `quantizer` from the histogram of `image`, and every pixel is mapped
/// to a palette index by `ditherer`. If `high_quality` is `true`, the full histogram is quantized
/// and palette lookups measure distances in the [`Oklab`](palette::Oklab) color space. Otherwise,
/// large histograms are sampled down to [`DEFAULT_MAX_HISTOGRAM_SIZE`] entries and lookups use
/// Euclidean distance in sRGB.
///
/// See [`Pipeline`] for more options.
///
/// # Errors
///
/// Returns [`ReduceColorsError::ColorCount`] if `color_count` is not in the range `1..=256`.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use palettize::{ImageBuf, reduce_colors, dither::NoDithering, quantize::MedianCut};
/// use palette::Srgb;
///
/// let image = ImageBuf::new(4, 4, vec![Srgb::new(10, 200, 30); 16])?;
/// let indexed = reduce_colors(image.as_ref(), &MedianCut, &NoDithering, 16, false)?;
/// assert_eq!(indexed.palette().as_slice(), [Srgb::new(10, 200, 30)]);
///
/// assert!(reduce_colors(image.as_ref(), &MedianCut, &NoDithering, 0, false).is_err());
/// # Ok(())
/// # }
/// ```
pub fn reduce_colors<Q, D>(
    image: ImageRef<'_>,
    quantizer: &Q,
    ditherer: &D,
    color_count: u16,
    high_quality: bool,
) -> Result<IndexedImage, ReduceColorsError>
where
    Q: Quantizer + ?Sized,
    D: Ditherer + Sync + ?Sized,
{
    let size = PaletteSize::try_from(color_count)?;
    Pipeline::new()
        .palette_size(size)
        .quantizer(quantizer)
        .ditherer(ditherer)
        .high_quality(high_quality)
        .reduce(image)
}

/// A builder struct to specify color reduction options.
///
/// The stages run in order:
/// 1. The histogram of the image is built and, unless [`high_quality`](Self::high_quality) is
///    set, sampled down to [`max_histogram_size`](Self::max_histogram_size) entries.
/// 2. The [`quantizer`](Self::quantizer) chooses a palette of at most
///    [`palette_size`](Self::palette_size) colors. An empty image gets a single black color.
/// 3. The [`ditherer`](Self::ditherer) maps every pixel to a palette index.
/// 4. The indices are packed with the smallest [`BitDepth`] that fits the palette.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use palettize::{
///     ImageBuf, PaletteSize, Pipeline,
///     dither::{Riemersma, Curve},
///     quantize::{KmeansRefinement, Wu},
/// };
/// use palette::Srgb;
///
/// let pixels = (0..256u16).map(|i| Srgb::new(i as u8, 128, 255 - i as u8)).collect();
/// let image = ImageBuf::new(16, 16, pixels)?;
///
/// let indexed = Pipeline::new()
///     .palette_size(PaletteSize::try_from(8u16)?)
///     .quantizer(KmeansRefinement::new(Wu, 4))
///     .ditherer(Riemersma::new(Curve::Hilbert))
///     .high_quality(true)
///     .seed(42)
///     .reduce(image.as_ref())?;
///
/// assert_eq!(indexed.dimensions(), (16, 16));
/// assert!(indexed.palette().len() <= 8);
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline<Q = Wu, D = ErrorDiffusion> {
    /// The maximum number of colors in the palette.
    size: PaletteSize,
    /// The palette selection algorithm.
    quantizer: Q,
    /// The pixel mapping algorithm.
    ditherer: D,
    /// Whether to skip histogram sampling and use the Oklab metric.
    high_quality: bool,
    /// The seed for all stochastic stages.
    seed: u64,
    /// The histogram size above which the histogram is sampled.
    max_histogram_size: usize,
    /// Whether to build the histogram and dither in parallel.
    parallel: bool,
}

impl Pipeline {
    /// Create a new [`Pipeline`] with default options.
    ///
    /// The defaults are a palette of 256 colors, the [`Wu`] quantizer, Floyd-Steinberg
    /// [`ErrorDiffusion`], a seed of `0`, and no parallelism.
    pub fn new() -> Self {
        Self {
            size: PaletteSize::MAX,
            quantizer: Wu,
            ditherer: ErrorDiffusion::floyd_steinberg(),
            high_quality: false,
            seed: 0,
            max_histogram_size: DEFAULT_MAX_HISTOGRAM_SIZE,
            parallel: false,
        }
    }
}

impl Default for Pipeline {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, D> Pipeline<Q, D> {
    /// Sets the maximum number of colors in the palette.
    ///
    /// The default palette size is [`PaletteSize::MAX`].
    #[inline]
    pub fn palette_size(mut self, size: PaletteSize) -> Self {
        self.size = size;
        self
    }

    /// Sets the quantizer that chooses the palette.
    ///
    /// The default quantizer is [`Wu`].
    #[inline]
    pub fn quantizer<Q2>(self, quantizer: Q2) -> Pipeline<Q2, D> {
        let Self { size, ditherer, high_quality, seed, max_histogram_size, parallel, .. } = self;
        Pipeline { size, quantizer, ditherer, high_quality, seed, max_histogram_size, parallel }
    }

    /// Sets the ditherer that maps pixels to palette indices.
    ///
    /// The default ditherer is Floyd-Steinberg [`ErrorDiffusion`].
    /// Use [`NoDithering`](crate::dither::NoDithering) to map every pixel to its nearest color.
    #[inline]
    pub fn ditherer<D2>(self, ditherer: D2) -> Pipeline<Q, D2> {
        let Self { size, quantizer, high_quality, seed, max_histogram_size, parallel, .. } = self;
        Pipeline { size, quantizer, ditherer, high_quality, seed, max_histogram_size, parallel }
    }

    /// Sets whether to favor quality over speed.
    ///
    /// If `true`, the full histogram is always quantized and nearest colors are found with
    /// [`DistanceMetric::Oklab`] instead of [`DistanceMetric::EuclideanRgb`].
    ///
    /// The default value is `false`.
    #[inline]
    pub fn high_quality(mut self, high_quality: bool) -> Self {
        self.high_quality = high_quality;
        self
    }

    /// Sets the seed for histogram sampling and the stochastic quantizers.
    ///
    /// The default seed is `0`.
    #[inline]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the number of histogram entries above which the histogram is sampled.
    ///
    /// This has no effect if [`high_quality`](Self::high_quality) is set.
    /// The value is clamped to at least `1`.
    ///
    /// The default value is [`DEFAULT_MAX_HISTOGRAM_SIZE`].
    #[inline]
    pub fn max_histogram_size(mut self, max_histogram_size: usize) -> Self {
        self.max_histogram_size = max_histogram_size.max(1);
        self
    }

    /// Sets whether to build the histogram and dither in parallel across multiple threads.
    ///
    /// Only ditherers that do not
    /// [require sequential processing](Ditherer::requires_sequential_processing) are run in
    /// parallel. The output is the same either way. Without the `threads` feature this has no
    /// effect.
    ///
    /// The default value is `false`.
    #[inline]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Returns the maximum number of colors in the palette.
    #[inline]
    pub fn get_palette_size(&self) -> PaletteSize {
        self.size
    }

    /// Returns the quantizer.
    #[inline]
    pub fn get_quantizer(&self) -> &Q {
        &self.quantizer
    }

    /// Returns the ditherer.
    #[inline]
    pub fn get_ditherer(&self) -> &D {
        &self.ditherer
    }

    /// Returns whether quality is favored over speed.
    #[inline]
    pub fn get_high_quality(&self) -> bool {
        self.high_quality
    }

    /// Returns the seed.
    #[inline]
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of histogram entries above which the histogram is sampled.
    #[inline]
    pub fn get_max_histogram_size(&self) -> usize {
        self.max_histogram_size
    }

    /// Returns whether the pipeline runs in parallel.
    #[inline]
    pub fn get_parallel(&self) -> bool {
        self.parallel
    }

    /// Returns the distance metric used for palette lookups.
    #[inline]
    fn metric(&self) -> DistanceMetric {
        if self.high_quality {
            DistanceMetric::Oklab
        } else {
            DistanceMetric::EuclideanRgb
        }
    }

    /// Build the histogram of `image`.
    fn histogram(&self, image: ImageRef<'_>) -> Histogram {
        #[cfg(feature = "threads")]
        if self.parallel {
            return Histogram::from_image_par(image);
        }
        Histogram::from_image(image)
    }
}

impl<Q: Quantizer, D: Ditherer + Sync> Pipeline<Q, D> {
    /// Compute the palette for `image`.
    ///
    /// The palette has at least one color, even for an empty image.
    #[must_use]
    pub fn palette(&self, image: ImageRef<'_>) -> Palette {
        let histogram = self.histogram(image);
        let histogram = if self.high_quality {
            Cow::Borrowed(&histogram)
        } else {
            histogram.sample(self.max_histogram_size, self.seed)
        };
        tracing::debug!(
            colors = histogram.len(),
            sampled = matches!(histogram, Cow::Owned(_)),
            "histogram"
        );

        let palette = self.quantizer.quantize(&histogram, self.size, self.seed);
        if palette.is_empty() {
            Palette::new_unchecked(vec![Srgb::new(0, 0, 0)])
        } else {
            palette
        }
    }

    /// Run the pipeline on `image`.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceColorsError::Output`] if the ditherer produced an index that does not
    /// reference a palette color. The ditherers of this crate never do.
    pub fn reduce(&self, image: ImageRef<'_>) -> Result<IndexedImage, ReduceColorsError> {
        let (width, height) = image.dimensions();
        let _span = tracing::debug_span!("reduce", width, height, size = self.size.as_u16())
            .entered();

        let palette = self.palette(image);
        let bit_depth = BitDepth::for_palette_len(palette.len());
        tracing::debug!(palette = palette.len(), bits = bit_depth.bits(), "palette");

        #[allow(clippy::expect_used)]
        let color_map = ColorMap::new(palette, self.metric())
            .expect("palette to not be empty after the black fallback");

        tracing::debug!(
            parallel = self.parallel && !self.ditherer.requires_sequential_processing(),
            "dithering"
        );
        let indices = dither_image(&self.ditherer, image, &color_map, self.parallel);

        Ok(IndexedImage::new(width, height, color_map.into_palette(), indices)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ImageBuf,
        dither::{NoDithering, Noise, NoiseKind, Ordered},
        quantize::{Kmeans, MedianCut, Octree, Uniform},
        tests::*,
    };
    use alloc::{boxed::Box, vec::Vec};

    /// A ditherer that always returns an out of range index.
    struct Broken;

    impl Ditherer for Broken {
        fn requires_sequential_processing(&self) -> bool {
            false
        }

        fn dither_pixel(&self, _: [f32; 3], _: u32, _: u32, _: &ColorMap) -> u8 {
            u8::MAX
        }
    }

    fn decoded(indexed: &IndexedImage) -> Vec<Srgb<u8>> {
        indexed.to_image().as_slice().to_vec()
    }

    fn dark_fraction(indexed: &IndexedImage) -> f64 {
        let pixels = decoded(indexed);
        let dark = pixels.iter().filter(|p| p.red < 128).count();
        #[allow(clippy::cast_precision_loss)]
        let fraction = dark as f64 / pixels.len() as f64;
        fraction
    }

    fn transitions(indexed: &IndexedImage) -> usize {
        let width = indexed.width() as usize;
        let dark = decoded(indexed).iter().map(|p| p.red < 128).collect::<Vec<_>>();
        dark.chunks_exact(width)
            .map(|row| row.windows(2).filter(|w| w[0] != w[1]).count())
            .sum()
    }

    fn ditherers() -> Vec<Box<dyn Ditherer + Send + Sync>> {
        let registry = crate::Registry::new();
        registry
            .ditherer_names()
            .filter_map(|name| registry.ditherer(name))
            .collect()
    }

    #[test]
    fn color_count_is_validated() {
        let image = solid_image(2, 2, RED);
        for count in [0, 257, 1000] {
            let err = reduce_colors(image.as_ref(), &Wu, &NoDithering, count, false).unwrap_err();
            assert!(matches!(err, ReduceColorsError::ColorCount(_)));
            assert!(err.source().is_some());
        }
        assert!(reduce_colors(image.as_ref(), &Wu, &NoDithering, 256, false).is_ok());
        assert!(reduce_colors(image.as_ref(), &Wu, &NoDithering, 1, false).is_ok());
    }

    #[test]
    fn solid_black_stays_dark() {
        let image = solid_image(16, 16, BLACK);
        for ditherer in ditherers() {
            let indexed = reduce_colors(image.as_ref(), &Wu, &ditherer, 2, false).unwrap();
            assert!(decoded(&indexed).iter().all(|p| p.red < 50 && p.green < 50 && p.blue < 50));
        }
    }

    #[test]
    fn solid_white_stays_light() {
        let image = solid_image(16, 16, WHITE);
        for ditherer in ditherers() {
            let indexed = reduce_colors(image.as_ref(), &Wu, &ditherer, 2, true).unwrap();
            assert!(
                decoded(&indexed).iter().all(|p| p.red > 200 && p.green > 200 && p.blue > 200)
            );
        }
    }

    #[test]
    fn solid_colors_are_kept_by_every_ditherer() {
        let color = Srgb::new(90, 160, 30);
        let image = solid_image(7, 5, color);
        for ditherer in ditherers() {
            for count in [1, 2, 16] {
                let indexed =
                    reduce_colors(image.as_ref(), &Octree, &ditherer, count, false).unwrap();
                assert!(decoded(&indexed).iter().all(|&p| rgb_distance(p, color) < 30.0));
            }
        }
    }

    #[test]
    fn gradient_floyd_steinberg_is_mixed() {
        let image = gradient_image(32, 32);
        let indexed = reduce_colors(
            image.as_ref(),
            &MedianCut,
            &ErrorDiffusion::floyd_steinberg(),
            2,
            false,
        )
        .unwrap();
        assert_eq!(indexed.bit_depth(), BitDepth::One);
        let dark = dark_fraction(&indexed);
        assert!((0.2..=0.8).contains(&dark), "{dark}");
    }

    #[test]
    fn error_diffusion_adds_transitions() {
        let image = gradient_image(32, 32);
        let none = reduce_colors(image.as_ref(), &MedianCut, &NoDithering, 2, false).unwrap();
        let diffused = reduce_colors(
            image.as_ref(),
            &MedianCut,
            &ErrorDiffusion::floyd_steinberg(),
            2,
            false,
        )
        .unwrap();
        assert!(transitions(&diffused) > transitions(&none));
    }

    #[test]
    fn indices_decode_to_palette_colors() {
        let image = colorful_image(23, 17);
        let ordered = Ordered::bayer(8).unwrap();
        for count in [2, 3, 4, 5, 16, 17, 256] {
            for high_quality in [false, true] {
                let indexed =
                    reduce_colors(image.as_ref(), &Wu, &ordered, count, high_quality).unwrap();
                let len = indexed.palette().len();
                assert!(len <= usize::from(count));
                assert_eq!(indexed.bit_depth(), BitDepth::for_palette_len(len));
                assert!(indexed.indices().iter().all(|&i| usize::from(i) < len));
                assert_eq!(indexed.dimensions(), image.dimensions());
            }
        }
    }

    #[test]
    fn empty_image_gets_a_black_palette() {
        let image = ImageBuf::new(0, 0, Vec::new()).unwrap();
        let indexed =
            reduce_colors(image.as_ref(), &Kmeans::new(), &NoDithering, 8, false).unwrap();
        assert_eq!(indexed.palette().as_slice(), [BLACK]);
        assert!(indexed.is_empty());
        assert!(indexed.data().is_empty());
    }

    #[test]
    fn sampling_is_reproducible() {
        let image = colorful_image(64, 64);
        let pipeline = Pipeline::new()
            .palette_size(PaletteSize::from_u8_clamped(16))
            .quantizer(Kmeans::new())
            .ditherer(Noise::new(NoiseKind::Blue, 3))
            .max_histogram_size(100)
            .seed(7);
        let a = pipeline.reduce(image.as_ref()).unwrap();
        let b = pipeline.clone().parallel(true).reduce(image.as_ref()).unwrap();
        assert_eq!(a, b);
        assert!(a.palette().len() <= 16);
    }

    #[test]
    fn uniform_palette_is_content_independent() {
        let image = solid_image(4, 4, RED);
        let pipeline =
            Pipeline::new().quantizer(Uniform).palette_size(PaletteSize::from_u8_clamped(8));
        let indexed = pipeline.reduce(image.as_ref()).unwrap();
        // a single color histogram is returned as is
        assert_eq!(indexed.palette().as_slice(), [RED]);
    }

    #[test]
    fn invalid_ditherer_output_is_an_error() {
        let image = solid_image(3, 3, GREEN);
        let err = reduce_colors(image.as_ref(), &Wu, &Broken, 4, false).unwrap_err();
        assert!(matches!(err, ReduceColorsError::Output(_)));
    }
}
