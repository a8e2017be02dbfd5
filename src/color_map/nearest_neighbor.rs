use alloc::vec::Vec;
use core::array;
use wide::{CmpLe as _, f32x8, u32x8};

/// Lay out points in AoSoA format: chunks of 8 points with one SIMD lane per point.
///
/// Lanes past the end of `points` are filled with infinity so they are never the nearest.
pub(crate) fn to_simd_chunks<const N: usize>(points: &[[f32; N]]) -> Vec<[f32x8; N]> {
    let mut data = Vec::with_capacity(points.len().div_ceil(8));

    let (chunks, remainder) = points.as_chunks::<8>();
    data.extend(
        chunks
            .iter()
            .map(|chunk| array::from_fn(|i| f32x8::new(chunk.map(|x| x[i])))),
    );

    if !remainder.is_empty() {
        let mut arr = [[f32::INFINITY; 8]; N];
        for (i, point) in remainder.iter().enumerate() {
            for (arr, &c) in arr.iter_mut().zip(point) {
                arr[i] = c;
            }
        }
        data.push(arr.map(f32x8::new));
    }

    data
}

/// Compute the chunk index and lane index of the nearest point to `color` according to
/// squared euclidean distance, along with that distance.
#[inline]
pub(crate) fn simd_argmin_min_distance<const N: usize>(
    data: &[[f32x8; N]],
    color: [f32; N],
) -> ((u8, u8), f32) {
    let incr = u32x8::ONE;
    let mut cur_chunk = u32x8::ZERO;
    let mut min_chunk = cur_chunk;
    let mut min_distance = f32x8::splat(f32::INFINITY);

    let color = color.map(f32x8::splat);

    for chunk in data {
        let mut distance = f32x8::ZERO;
        for i in 0..N {
            let diff = color[i] - chunk[i];
            distance += diff * diff;
        }

        let mask: u32x8 = bytemuck::cast(distance.simd_le(min_distance));
        min_chunk = mask.blend(cur_chunk, min_chunk);
        min_distance = min_distance.fast_min(distance);
        cur_chunk += incr;
    }

    let mut min_lane = 0;
    let mut min_dist = f32::INFINITY;
    for (i, v) in min_distance.to_array().into_iter().enumerate() {
        if v < min_dist {
            min_dist = v;
            min_lane = i;
        }
    }

    let min_chunk = min_chunk.as_array()[min_lane];

    #[allow(clippy::cast_possible_truncation)]
    {
        ((min_chunk as u8, min_lane as u8), min_dist)
    }
}

/// Returns the squared euclidean distance between two points.
#[inline]
pub(crate) fn squared_distance<const N: usize>(x: [f32; N], y: [f32; N]) -> f32 {
    let mut dist = 0.0;
    for c in 0..N {
        let d = x[c] - y[c];
        dist += d * d;
    }
    dist
}

/// Returns the indices of the `n` points nearest to `color` and their squared distances,
/// sorted from nearest to farthest with ties broken by index.
pub(crate) fn n_nearest<const N: usize>(
    points: &[[f32; N]],
    color: [f32; N],
    n: usize,
) -> Vec<(u8, f32)> {
    #[allow(clippy::cast_possible_truncation)]
    let mut distances = points
        .iter()
        .enumerate()
        .map(|(i, &p)| (i as u8, squared_distance(p, color)))
        .collect::<Vec<_>>();

    let n = n.min(distances.len());
    let cmp = |a: &(u8, f32), b: &(u8, f32)| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0));
    if n < distances.len() && n > 0 {
        distances.select_nth_unstable_by(n - 1, cmp);
    }
    distances.truncate(n);
    distances.sort_unstable_by(cmp);
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use ordered_float::OrderedFloat;

    fn points() -> Vec<[f32; 3]> {
        // use a non-multiple of 8 to test remainder handling
        colorful_image(7, 7)
            .as_slice()
            .iter()
            .map(|&c| crate::components(c))
            .collect()
    }

    #[test]
    fn naive_nearest_neighbor_oracle() {
        let centroids = points();
        let data = to_simd_chunks(&centroids);
        for color in gradient_image(40, 1).as_slice().iter().map(|&c| crate::components(c)) {
            let expected = centroids
                .iter()
                .map(|&centroid| OrderedFloat(squared_distance(centroid, color)))
                .min()
                .unwrap()
                .0;

            let ((chunk, lane), actual2) = simd_argmin_min_distance(&data, color);
            let index = usize::from(chunk) * 8 + usize::from(lane);
            let actual1 = squared_distance(color, centroids[index]);

            #[allow(clippy::float_cmp)]
            {
                assert_eq!(expected, actual1);
                assert_eq!(expected, actual2);
            }
        }
    }

    #[test]
    fn n_nearest_is_sorted() {
        let centroids = points();
        let nearest = n_nearest(&centroids, [100.0, 50.0, 25.0], 5);
        assert_eq!(nearest.len(), 5);
        assert!(nearest.windows(2).all(|w| w[0].1 <= w[1].1));
        let ((chunk, lane), _) =
            simd_argmin_min_distance(&to_simd_chunks(&centroids), [100.0, 50.0, 25.0]);
        let index = usize::from(chunk * 8 + lane);
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(nearest[0].1, squared_distance(centroids[index], [100.0, 50.0, 25.0]));
        }
        assert_eq!(n_nearest(&centroids[..2], [0.0; 3], 5).len(), 2);
    }
}
