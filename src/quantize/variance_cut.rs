use super::{
    Moments, Points, Quantizer,
    boxes::{ColorBox, SplitRule, sort_along, split_boxes},
};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;

/// Variance based box splitting.
///
/// The box with the largest weighted sum of squared errors is repeatedly split along its
/// highest variance axis at the position that minimizes the summed error of the two halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarianceCut;

/// Returns the channel with the largest weighted variance among the given points.
fn highest_variance_channel(points: &Points, indices: &[usize], moments: &Moments) -> usize {
    let Some(mean) = moments.mean() else {
        return 0;
    };
    let mut variance = [0.0f64; 3];
    for &i in indices {
        let w = f64::from(points.weights[i]);
        for c in 0..3 {
            let d = f64::from(points.colors[i][c] - mean[c]);
            variance[c] += w * d * d;
        }
    }
    (0..3).fold(0, |best, c| if variance[c] > variance[best] { c } else { best })
}

impl SplitRule for VarianceCut {
    fn priority(&self, color_box: &ColorBox) -> f64 {
        color_box.moments.sse()
    }

    #[allow(clippy::float_cmp)]
    fn split(&self, points: &Points, indices: &mut [usize], color_box: &ColorBox) -> usize {
        let channel = highest_variance_channel(points, indices, &color_box.moments);
        sort_along(points, indices, channel);

        let mut lower = Moments::default();
        let mut best = (indices.len() / 2, f64::INFINITY);
        for (pos, &i) in indices[..indices.len() - 1].iter().enumerate() {
            lower.add(points.colors[i], points.weights[i]);
            let next = indices[pos + 1];
            if points.colors[next][channel] == points.colors[i][channel] {
                // never separate colors with the same value along the axis
                continue;
            }
            let upper = Moments {
                weight: color_box.moments.weight - lower.weight,
                sum: core::array::from_fn(|c| color_box.moments.sum[c] - lower.sum[c]),
                sum_squared: color_box.moments.sum_squared - lower.sum_squared,
            };
            let error = lower.sse() + upper.sse();
            if error < best.1 {
                best = (pos + 1, error);
            }
        }
        best.0
    }
}

impl Quantizer for VarianceCut {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        split_boxes(&Points::new(histogram), size.as_usize(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palette::Srgb;

    #[test]
    fn splits_at_largest_gap() {
        let histogram = Histogram::from_entries([
            (Srgb::new(0, 0, 0), 5),
            (Srgb::new(0, 20, 0), 5),
            (Srgb::new(0, 40, 0), 5),
            (Srgb::new(0, 200, 0), 5),
            (Srgb::new(0, 220, 0), 5),
        ]);
        let palette = VarianceCut.quantize(&histogram, PaletteSize::from_u8_clamped(2), 0);
        assert_eq!(palette.as_slice(), [Srgb::new(0, 20, 0), Srgb::new(0, 210, 0)]);
    }
}
