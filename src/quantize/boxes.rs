//! Shared driver for the box splitting quantizers.

use super::{Moments, Points};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;

/// A box containing a contiguous range of (permuted) point indices.
#[derive(Debug, Clone)]
pub(crate) struct ColorBox {
    /// The start of the range of indices.
    pub start: usize,
    /// The end of the range of indices (exclusive).
    pub end: usize,
    /// The moments of the points inside the box.
    pub moments: Moments,
    /// The component-wise minimum of the points.
    pub min: [f32; 3],
    /// The component-wise maximum of the points.
    pub max: [f32; 3],
}

impl ColorBox {
    /// Create a box over the points at `indices[start..end]`.
    fn new(points: &Points, indices: &[usize], start: usize, end: usize) -> Self {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for &i in &indices[start..end] {
            for c in 0..3 {
                min[c] = min[c].min(points.colors[i][c]);
                max[c] = max[c].max(points.colors[i][c]);
            }
        }
        let moments = points.moments(indices[start..end].iter().copied());
        Self { start, end, moments, min, max }
    }

    /// Returns the number of points inside the box.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns the channel with the largest range and that range.
    pub fn widest_channel(&self) -> (usize, f32) {
        (0..3)
            .map(|c| (c, self.max[c] - self.min[c]))
            .fold((0, f32::NEG_INFINITY), |a, b| if b.1 > a.1 { b } else { a })
    }
}

/// How to choose and split boxes.
pub(crate) trait SplitRule {
    /// The priority of splitting the box. Boxes with a priority of zero are never split.
    fn priority(&self, color_box: &ColorBox) -> f64;

    /// Reorder `indices` (the points of `color_box`) and return the position to split them at.
    ///
    /// The returned position must be in `1..indices.len()`.
    fn split(&self, points: &Points, indices: &mut [usize], color_box: &ColorBox) -> usize;
}

/// Sort indices along a channel, breaking ties by the other channels.
pub(crate) fn sort_along(points: &Points, indices: &mut [usize], channel: usize) {
    let key = |i: usize| {
        let c = points.colors[i];
        [c[channel], c[(channel + 1) % 3], c[(channel + 2) % 3]].map(OrderedFloat)
    };
    indices.sort_unstable_by_key(|&i| key(i));
}

/// Repeatedly split the highest priority box until there are `k` boxes.
///
/// Returns the mean of each box.
pub(crate) fn split_boxes(points: &Points, k: usize, rule: &impl SplitRule) -> Vec<[f32; 3]> {
    let mut indices = (0..points.len()).collect::<Vec<_>>();
    let mut boxes = Vec::with_capacity(k);
    if !indices.is_empty() {
        boxes.push(ColorBox::new(points, &indices, 0, points.len()));
    }

    while boxes.len() < k {
        let Some((i, _)) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() >= 2)
            .map(|(i, b)| (i, rule.priority(b)))
            .filter(|&(_, p)| p > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
        else {
            break;
        };

        let color_box = boxes.swap_remove(i);
        let slice = &mut indices[color_box.start..color_box.end];
        let split = rule.split(points, slice, &color_box).clamp(1, slice.len() - 1);
        let mid = color_box.start + split;
        boxes.push(ColorBox::new(points, &indices, color_box.start, mid));
        boxes.push(ColorBox::new(points, &indices, mid, color_box.end));
    }

    boxes.iter().filter_map(|b| b.moments.mean()).collect()
}
