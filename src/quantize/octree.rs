use super::{Moments, Quantizer};
use crate::{Histogram, PaletteSize, components};
use alloc::vec::Vec;

/// The depth of the tree. Nodes at this depth hold a single color.
const DEPTH: usize = 8;

/// Octree color quantization.
///
/// Every color is inserted into an 8-level tree indexed by the bits of its channels.
/// Internal nodes are then merged into leaves, deepest level first and smallest pixel count
/// first, until the number of leaves fits the palette size.
/// Each palette color is the weighted centroid of a leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Octree;

/// A node of the arena backed tree.
#[derive(Debug, Clone, Default)]
struct Node {
    /// The arena indices of the children, with 0 meaning no child.
    children: [u32; 8],
    /// The moments of every color below this node.
    moments: Moments,
    /// Whether this node has been merged into a leaf.
    merged: bool,
}

impl Node {
    /// Returns the arena indices of the existing children.
    fn children(&self) -> impl Iterator<Item = usize> + '_ {
        self.children.iter().filter(|&&c| c != 0).map(|&c| c as usize)
    }

    /// Whether this node is a leaf of the current tree.
    fn is_leaf(&self) -> bool {
        self.merged || self.children.iter().all(|&c| c == 0)
    }
}

/// Returns the child slot of a color at the given level.
fn child_slot([r, g, b]: [u8; 3], level: usize) -> usize {
    let shift = 7 - level;
    let bit = |c: u8| usize::from((c >> shift) & 1);
    (bit(r) << 2) | (bit(g) << 1) | bit(b)
}

/// An octree over the colors of a histogram.
struct Tree {
    /// The node arena. The root is at index 0.
    nodes: Vec<Node>,
    /// The internal nodes of each level.
    levels: [Vec<usize>; DEPTH],
    /// The current number of leaves.
    leaves: usize,
}

impl Tree {
    /// Build a tree from the colors of a histogram.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn new(histogram: &Histogram) -> Self {
        let mut tree = Self {
            nodes: alloc::vec![Node::default()],
            levels: Default::default(),
            leaves: 0,
        };

        for (color, count) in histogram.iter() {
            let point = components(color);
            let weight = count as f32;
            let channels = [color.red, color.green, color.blue];
            let mut node = 0;
            tree.nodes[node].moments.add(point, weight);
            for level in 0..DEPTH {
                let slot = child_slot(channels, level);
                let mut child = tree.nodes[node].children[slot] as usize;
                if child == 0 {
                    if tree.nodes[node].children.iter().all(|&c| c == 0) {
                        tree.levels[level].push(node);
                    }
                    child = tree.nodes.len();
                    tree.nodes.push(Node::default());
                    tree.nodes[node].children[slot] = child as u32;
                    if level + 1 == DEPTH {
                        tree.leaves += 1;
                    }
                }
                tree.nodes[child].moments.add(point, weight);
                node = child;
            }
        }

        tree
    }

    /// Merge nodes until there are at most `max_leaves` leaves.
    fn reduce(&mut self, max_leaves: usize) {
        for level in (0..DEPTH).rev() {
            if self.leaves <= max_leaves {
                break;
            }
            let mut reducible = core::mem::take(&mut self.levels[level]);
            reducible.sort_by(|&a, &b| {
                let weight = |i: usize| self.nodes[i].moments.weight;
                weight(a).total_cmp(&weight(b)).then(a.cmp(&b))
            });
            for node in reducible {
                if self.leaves <= max_leaves {
                    break;
                }
                let children = self.nodes[node].children().count();
                self.nodes[node].merged = true;
                self.leaves -= children - 1;
            }
        }
    }

    /// Returns the centroids of the leaves.
    fn centroids(&self) -> Vec<[f32; 3]> {
        let mut centroids = Vec::with_capacity(self.leaves);
        let mut stack = alloc::vec![0];
        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            if node.is_leaf() {
                centroids.extend(node.moments.mean());
            } else {
                stack.extend(node.children());
            }
        }
        centroids
    }
}

impl Quantizer for Octree {
    fn quantize_colors(
        &self,
        histogram: &Histogram,
        size: PaletteSize,
        _seed: u64,
    ) -> Vec<[f32; 3]> {
        let mut tree = Tree::new(histogram);
        tree.reduce(size.as_usize());
        tracing::trace!(nodes = tree.nodes.len(), leaves = tree.leaves, "octree reduced");
        tree.centroids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use palette::Srgb;

    #[test]
    fn leaves_count_distinct_colors() {
        let tree = Tree::new(&colorful_histogram());
        assert_eq!(tree.leaves, colorful_histogram().len());
        assert_eq!(tree.centroids().len(), tree.leaves);
    }

    #[test]
    fn merges_small_nodes_first() {
        let histogram = Histogram::from_entries([
            (Srgb::new(0, 0, 0), 100),
            (Srgb::new(0, 0, 1), 1),
            (Srgb::new(255, 255, 255), 100),
            (Srgb::new(255, 255, 254), 100),
        ]);
        let palette = Octree.quantize(&histogram, PaletteSize::from_u8_clamped(3), 0);
        assert_eq!(palette.len(), 3);
        assert!(palette.contains(&WHITE));
        assert!(palette.contains(&Srgb::new(255, 255, 254)));
        assert!(palette.contains(&BLACK));
    }
}
