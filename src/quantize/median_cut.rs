use super::{
    Points, Quantizer,
    boxes::{ColorBox, SplitRule, sort_along, split_boxes},
};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;

/// Median cut color quantization.
///
/// The box with the largest channel range is repeatedly split along that channel
/// at the weighted median of its colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MedianCut;

impl SplitRule for MedianCut {
    fn priority(&self, color_box: &ColorBox) -> f64 {
        f64::from(color_box.widest_channel().1)
    }

    fn split(&self, points: &Points, indices: &mut [usize], color_box: &ColorBox) -> usize {
        let (channel, _) = color_box.widest_channel();
        sort_along(points, indices, channel);

        let half = color_box.moments.weight / 2.0;
        let mut cumulative = 0.0;
        for (pos, &i) in indices.iter().enumerate() {
            cumulative += f64::from(points.weights[i]);
            if cumulative >= half {
                return pos + 1;
            }
        }
        indices.len() / 2
    }
}

impl Quantizer for MedianCut {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        split_boxes(&Points::new(histogram), size.as_usize(), self)
    }
}
