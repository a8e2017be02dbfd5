//! Color histograms and seeded histogram sampling.

use crate::{ImageRef, color_key};
use alloc::{borrow::Cow, vec::Vec};
use core::cmp::Reverse;
use ordered_float::OrderedFloat;
use palette::Srgb;
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// The distinct colors of an image and the number of times each one occurs.
///
/// Entries are sorted by color and every count is non-zero. For a histogram built from an image,
/// the sum of the counts equals the number of pixels in the image.
///
/// # Examples
///
/// ```
/// # use palettize::{Histogram, ImageBuf};
/// # use palette::Srgb;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let black = Srgb::new(0, 0, 0);
/// let white = Srgb::new(255, 255, 255);
/// let image = ImageBuf::new(3, 1, vec![white, black, white])?;
/// let histogram = Histogram::from_image(image.as_ref());
/// assert_eq!(histogram.colors(), [black, white]);
/// assert_eq!(histogram.counts(), [1, 2]);
/// assert_eq!(histogram.total_count(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    /// The distinct colors, sorted.
    colors: Vec<Srgb<u8>>,
    /// The count of each color.
    counts: Vec<u32>,
    /// The sum of `counts`.
    total_count: u64,
}

impl Histogram {
    /// Build a [`Histogram`] from the pixels of an image.
    #[must_use]
    pub fn from_image(image: ImageRef<'_>) -> Self {
        Self::from_colors(image.as_slice())
    }

    /// Build a [`Histogram`] from a slice of colors.
    #[must_use]
    pub fn from_colors(colors: &[Srgb<u8>]) -> Self {
        let mut keys = colors.iter().map(|&c| color_key(c)).collect::<Vec<_>>();
        keys.sort_unstable();
        Self::from_sorted_keys(&keys)
    }

    /// Build a [`Histogram`] from `(color, count)` entries.
    ///
    /// Entries with the same color are merged and entries with a count of zero are dropped.
    /// Merged counts saturate at `u32::MAX`.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (Srgb<u8>, u32)>) -> Self {
        let mut entries = entries
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .map(|(color, count)| (color_key(color), count))
            .collect::<Vec<_>>();

        entries.sort_unstable_by_key(|&(key, _)| key);

        let mut colors = Vec::with_capacity(entries.len());
        let mut counts: Vec<u32> = Vec::with_capacity(entries.len());
        let mut prev = None;
        for (key, count) in entries {
            if prev == Some(key) {
                if let Some(last) = counts.last_mut() {
                    *last = last.saturating_add(count);
                }
            } else {
                colors.push(key_color(key));
                counts.push(count);
                prev = Some(key);
            }
        }

        Self::new_unchecked(colors, counts)
    }

    /// Run length encode sorted color keys.
    fn from_sorted_keys(keys: &[u32]) -> Self {
        let mut colors = Vec::new();
        let mut counts = Vec::new();
        for run in keys.chunk_by(|a, b| a == b) {
            colors.push(key_color(run[0]));
            #[allow(clippy::cast_possible_truncation)]
            counts.push(run.len() as u32);
        }
        Self::new_unchecked(colors, counts)
    }

    /// Create a [`Histogram`] from sorted, distinct colors and non-zero counts.
    fn new_unchecked(colors: Vec<Srgb<u8>>, counts: Vec<u32>) -> Self {
        debug_assert_eq!(colors.len(), counts.len());
        debug_assert!(colors.windows(2).all(|w| color_key(w[0]) < color_key(w[1])));
        let total_count = counts.iter().copied().map(u64::from).sum();
        Self { colors, counts, total_count }
    }

    /// Returns the number of distinct colors.
    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns whether the histogram has no colors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns the distinct colors in sorted order.
    #[inline]
    pub fn colors(&self) -> &[Srgb<u8>] {
        &self.colors
    }

    /// Returns the count of each color in [`colors`](Self::colors).
    #[inline]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Returns the sum of all counts.
    #[inline]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Returns an iterator over the `(color, count)` entries.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Srgb<u8>, u32)> + '_ {
        self.colors.iter().copied().zip(self.counts.iter().copied())
    }

    /// Returns the color with the highest count, preferring the smaller color on ties.
    #[must_use]
    pub fn most_common(&self) -> Option<Srgb<u8>> {
        self.iter()
            .max_by_key(|&(color, count)| (count, Reverse(color_key(color))))
            .map(|(color, _)| color)
    }

    /// Down-sample the histogram to at most `max_size` entries.
    ///
    /// If the histogram already has at most `max_size` entries, it is returned unchanged.
    /// Otherwise, every entry whose count is at least `total_count / max_size` is kept with its
    /// exact count. The remaining slots are filled by weighted sampling without replacement,
    /// proportional to count, among the other entries. The counts of the sampled entries are
    /// rescaled so that they sum to roughly the total count of the entries they represent.
    ///
    /// The result depends only on the histogram, `max_size`, and `seed`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&self, max_size: usize, seed: u64) -> Cow<'_, Self> {
        if self.len() <= max_size {
            return Cow::Borrowed(self);
        }
        if max_size == 0 {
            return Cow::Owned(Self::default());
        }

        let threshold = self.total_count.div_ceil(max_size as u64);
        let (dominant, rest): (Vec<_>, Vec<_>) =
            (0..self.len()).partition(|&i| u64::from(self.counts[i]) >= threshold);

        let slots = max_size - dominant.len();
        tracing::trace!(
            len = self.len(),
            max_size,
            dominant = dominant.len(),
            "sampling histogram"
        );

        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
        let mut keyed = rest
            .iter()
            .map(|&i| {
                // Efraimidis-Spirakis: the largest `ln(u) / w` keys form a weighted sample.
                let u = 1.0 - rng.random::<f64>();
                (OrderedFloat(u.ln() / f64::from(self.counts[i])), i)
            })
            .collect::<Vec<_>>();

        if slots < keyed.len() {
            keyed.select_nth_unstable_by_key(slots, |&(key, i)| (Reverse(key), i));
            keyed.truncate(slots);
        }

        let rest_total = rest.iter().map(|&i| u64::from(self.counts[i])).sum::<u64>();
        let sampled_total = keyed
            .iter()
            .map(|&(_, i)| u64::from(self.counts[i]))
            .sum::<u64>();
        let scale = if sampled_total == 0 {
            1.0
        } else {
            rest_total as f64 / sampled_total as f64
        };

        let mut indices = dominant
            .into_iter()
            .map(|i| (i, self.counts[i]))
            .chain(keyed.into_iter().map(|(_, i)| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let count = (f64::from(self.counts[i]) * scale)
                    .round()
                    .clamp(1.0, f64::from(u32::MAX)) as u32;
                (i, count)
            }))
            .collect::<Vec<_>>();

        indices.sort_unstable_by_key(|&(i, _)| i);

        let (colors, counts) = indices
            .into_iter()
            .map(|(i, count)| (self.colors[i], count))
            .unzip();

        Cow::Owned(Self::new_unchecked(colors, counts))
    }

    /// Drop the lowest `bits` bits of each color channel.
    ///
    /// The remaining high bits are repeated into the low bits so that `0` and `255` map to
    /// themselves. Colors that become equal are merged. `bits` is clamped to `7`.
    #[must_use]
    pub fn reduce_bits(&self, bits: u8) -> Self {
        if bits == 0 {
            return self.clone();
        }
        let bits = bits.min(7);
        Self::from_entries(
            self.iter()
                .map(|(color, count)| (reduce_color_bits(color, bits), count)),
        )
    }
}

/// Reduce the precision of each channel of `color` to `8 - bits` bits.
#[inline]
pub(crate) fn reduce_color_bits(color: Srgb<u8>, bits: u8) -> Srgb<u8> {
    let keep = 8 - bits;
    let reduce = |v: u8| {
        let top = v & (u8::MAX << bits);
        let mut out = top;
        let mut shift = keep;
        while shift < 8 {
            out |= top >> shift;
            shift += keep;
        }
        out
    };
    Srgb::new(reduce(color.red), reduce(color.green), reduce(color.blue))
}

/// Unpack a key created by [`color_key`].
#[inline]
fn key_color(key: u32) -> Srgb<u8> {
    let [_, r, g, b] = key.to_be_bytes();
    Srgb::new(r, g, b)
}

#[cfg(feature = "threads")]
mod parallel {
    use super::Histogram;
    use crate::{ImageRef, color_key};
    use alloc::vec::Vec;
    use rayon::prelude::*;

    impl Histogram {
        /// Build a [`Histogram`] from the pixels of an image in parallel.
        #[must_use]
        pub fn from_image_par(image: ImageRef<'_>) -> Self {
            let mut keys = image
                .as_slice()
                .par_iter()
                .map(|&c| color_key(c))
                .collect::<Vec<_>>();
            keys.par_sort_unstable();
            Self::from_sorted_keys(&keys)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn counts_sum_to_pixel_count() {
        let image = colorful_image(33, 17);
        let histogram = Histogram::from_image(image.as_ref());
        assert_eq!(histogram.total_count(), u64::from(image.num_pixels()));
        assert!(histogram.colors().windows(2).all(|w| color_key(w[0]) < color_key(w[1])));

        #[cfg(feature = "threads")]
        assert_eq!(Histogram::from_image_par(image.as_ref()), histogram);
    }

    #[test]
    fn entries_are_merged() {
        let histogram = Histogram::from_entries([(RED, 2), (BLUE, 0), (RED, 3), (GREEN, 1)]);
        assert_eq!(histogram.colors(), [GREEN, RED]);
        assert_eq!(histogram.counts(), [1, 5]);
        assert_eq!(histogram.most_common(), Some(RED));
        assert_eq!(Histogram::default().most_common(), None);
    }

    #[test]
    fn small_histogram_is_not_sampled() {
        let histogram = rgb_histogram();
        assert!(matches!(histogram.sample(3, 0), Cow::Borrowed(_)));
    }

    #[test]
    fn sampling_keeps_dominant_colors() {
        let histogram = dominant_histogram(Srgb::new(10, 20, 30));
        let sampled = histogram.sample(8, 7);
        assert_eq!(sampled.len(), 8);
        let i = sampled
            .colors()
            .iter()
            .position(|&c| c == Srgb::new(10, 20, 30))
            .unwrap();
        assert_eq!(sampled.counts()[i], 900);
    }

    #[test]
    fn sampling_is_reproducible() {
        let histogram = colorful_histogram();
        let a = histogram.sample(100, 42).into_owned();
        let b = histogram.sample(100, 42).into_owned();
        let c = histogram.sample(100, 43).into_owned();
        assert_eq!(a, b);
        assert_eq!(a.len(), 100);
        assert_ne!(a, c);
    }

    #[test]
    fn bit_reduction_fixes_extremes() {
        let pink = Srgb::new(250, 3, 130);
        let histogram = Histogram::from_entries([(BLACK, 1), (WHITE, 1), (pink, 1)]);
        let reduced = histogram.reduce_bits(4);
        assert_eq!(reduced.colors(), [BLACK, Srgb::new(255, 0, 136), WHITE]);
        assert_eq!(histogram.reduce_bits(7).len(), 3);
        assert_eq!(reduce_color_bits(Srgb::new(200, 100, 50), 7), Srgb::new(255, 0, 0));
    }
}
