use super::{Points, Quantizer, pca::Covariance};
use crate::{Histogram, PaletteSize};
use alloc::vec::Vec;

/// Orchard and Bouman's binary splitting.
///
/// The cluster with the largest weighted principal eigenvalue is repeatedly split by the plane
/// through its mean that is orthogonal to its principal eigenvector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinarySplitting;

/// A cluster of point indices and its split information.
struct Cluster {
    /// The indices of the points.
    indices: Vec<usize>,
    /// The weighted mean of the points.
    mean: [f64; 3],
    /// The principal eigenvector, or `None` if the cluster cannot be split.
    axis: Option<[f64; 3]>,
    /// The priority of splitting this cluster.
    priority: f64,
}

impl Cluster {
    fn new(points: &Points, indices: Vec<usize>) -> Option<Self> {
        let covariance = Covariance::new(points, indices.iter().copied())?;
        let weight = indices.iter().map(|&i| f64::from(points.weights[i])).sum::<f64>();
        let principal = if indices.len() >= 2 { covariance.principal() } else { None };
        let (axis, priority) = match principal {
            Some((axis, eigenvalue)) => (Some(axis), eigenvalue * weight),
            None => (None, 0.0),
        };
        Some(Self { indices, mean: covariance.mean, axis, priority })
    }

    /// Split the cluster by the plane through its mean orthogonal to its axis.
    fn split(self, points: &Points) -> Result<(Vec<usize>, Vec<usize>), Self> {
        let Some(axis) = self.axis else {
            return Err(self);
        };
        let threshold = (0..3).map(|c| self.mean[c] * axis[c]).sum::<f64>();
        let (lower, upper): (Vec<_>, Vec<_>) = self.indices.iter().copied().partition(|&i| {
            (0..3).map(|c| f64::from(points.colors[i][c]) * axis[c]).sum::<f64>() <= threshold
        });
        if lower.is_empty() || upper.is_empty() {
            Err(Self { axis: None, priority: 0.0, ..self })
        } else {
            Ok((lower, upper))
        }
    }
}

impl Quantizer for BinarySplitting {
    #[allow(clippy::cast_possible_truncation)]
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        let points = Points::new(histogram);
        let k = size.as_usize();
        let mut clusters = Cluster::new(&points, (0..points.len()).collect())
            .into_iter()
            .collect::<Vec<_>>();

        while clusters.len() < k {
            let Some((i, _)) = clusters
                .iter()
                .enumerate()
                .filter(|(_, c)| c.priority > 0.0)
                .max_by(|a, b| a.1.priority.total_cmp(&b.1.priority).then(b.0.cmp(&a.0)))
            else {
                break;
            };

            let cluster = clusters.swap_remove(i);
            match cluster.split(&points) {
                Ok((lower, upper)) => {
                    clusters.extend(Cluster::new(&points, lower));
                    clusters.extend(Cluster::new(&points, upper));
                }
                Err(cluster) => clusters.push(cluster),
            }
        }

        clusters.iter().map(|c| c.mean.map(|m| m as f32)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use palette::Srgb;

    #[test]
    fn splits_two_clusters() {
        let histogram = Histogram::from_entries([
            (Srgb::new(10, 20, 30), 4),
            (Srgb::new(12, 22, 32), 4),
            (Srgb::new(200, 100, 30), 4),
            (Srgb::new(202, 102, 32), 4),
        ]);
        let palette = BinarySplitting.quantize(&histogram, PaletteSize::from_u8_clamped(2), 0);
        assert_eq!(palette.len(), 2);
        assert!(palette.contains(&Srgb::new(11, 21, 31)));
        assert!(palette.contains(&Srgb::new(201, 101, 31)));
    }

    #[test]
    fn stops_when_nothing_can_split() {
        let histogram = colorful_histogram();
        let palette = BinarySplitting.quantize(&histogram, PaletteSize::MAX, 0);
        assert!(!palette.is_empty());
        assert!(palette.len() <= 256);
    }
}
