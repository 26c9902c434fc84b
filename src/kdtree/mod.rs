//! Array-backed k-d tree over 3D points
//!
//! Nodes live in one implicit binary layout: the root is node 1 and node `i`
//! has children `2i` and `2i + 1`. Each node covers a contiguous range of the
//! entry buffer, which is reordered in place during the build. The tree is
//! read-only once built and has no dependency on the traffic types.
//!
//! The top `parallel_depth` levels are partitioned on the calling thread; every
//! subtree below that is then built on its own rayon task over a disjoint slice
//! of the entry buffer.

pub mod query;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::util::vec3::Vec3;

pub use query::KdHit;

/// Hard cap on tree depth; bounds the node array at 2^(MAX_DEPTH + 1) slots
pub const MAX_DEPTH: usize = 20;

/// Index of the root node
const ROOT: usize = 1;

/// Build tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdTreeSettings {
    /// Nodes with at most this many points become leaves
    pub max_leaf_size: usize,
    /// Extra levels allowed beyond the balanced depth estimate
    pub depth_margin: usize,
    /// Levels partitioned before handing subtrees to worker tasks
    pub parallel_depth: usize,
}

impl Default for KdTreeSettings {
    fn default() -> Self {
        Self {
            max_leaf_size: 8,
            depth_margin: 2,
            parallel_depth: 3,
        }
    }
}

/// A point with the index it had in the caller's input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdEntry {
    pub position: Vec3,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum NodeKind {
    #[default]
    Empty,
    Leaf,
    Branch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct KdNode {
    kind: NodeKind,
    min: Vec3,
    max: Vec3,
    start: u32,
    end: u32,
    axis: u8,
    split: f32,
}

impl KdNode {
    /// Squared distance from `point` to this node's bounding box
    #[inline]
    fn box_distance_sq(&self, point: Vec3) -> f32 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let p = point.axis(axis);
            let d = (self.min.axis(axis) - p).max(p - self.max.axis(axis)).max(0.0);
            sum += d * d;
        }
        sum
    }
}

#[derive(Debug, Clone, Copy)]
struct BuildParams {
    max_depth: usize,
    max_leaf_size: usize,
    parallel_depth: usize,
}

/// Subtree handed to a worker after preprocessing
struct SubtreeTask<'a> {
    entries: &'a mut [KdEntry],
    offset: usize,
    node: usize,
    depth: usize,
}

/// Balanced k-d tree
#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    entries: Vec<KdEntry>,
    depth: usize,
}

impl Default for KdTree {
    fn default() -> Self {
        Self::build(&[], KdTreeSettings::default(), false)
    }
}

impl KdTree {
    /// Build over `points`; hits report indices into this slice
    pub fn build(points: &[Vec3], settings: KdTreeSettings, parallel: bool) -> Self {
        let mut entries: Vec<KdEntry> = points
            .iter()
            .enumerate()
            .map(|(i, &position)| KdEntry { position, index: i as u32 })
            .collect();

        let max_leaf_size = settings.max_leaf_size.max(1);
        let depth = depth_budget(entries.len(), max_leaf_size, settings.depth_margin);
        let params = BuildParams {
            max_depth: depth,
            max_leaf_size,
            parallel_depth: settings.parallel_depth.min(depth),
        };

        let mut nodes = vec![KdNode::default(); 1 << (depth + 1)];
        if !entries.is_empty() {
            let mut written = Vec::new();
            let mut tasks = Vec::new();
            preprocess(&mut entries, 0, ROOT, 0, &params, &mut written, &mut tasks);

            let built: Vec<Vec<(usize, KdNode)>> = if parallel {
                tasks.into_par_iter().map(|task| build_task(task, &params)).collect()
            } else {
                tasks.into_iter().map(|task| build_task(task, &params)).collect()
            };

            for (index, node) in written.into_iter().chain(built.into_iter().flatten()) {
                nodes[index] = node;
            }
        }

        tracing::trace!(points = points.len(), depth, parallel, "Built k-d tree");

        Self { nodes, entries, depth }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth budget the tree was built with
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of leaf nodes actually created
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Leaf).count()
    }
}

/// `ceil(log2(n / leaf)) + margin`, capped
fn depth_budget(count: usize, max_leaf_size: usize, margin: usize) -> usize {
    if count <= max_leaf_size {
        return 0;
    }
    let ratio = count as f64 / max_leaf_size as f64;
    (ratio.log2().ceil() as usize + margin).min(MAX_DEPTH)
}

/// Bounds and centroid of a point range
fn bounds(entries: &[KdEntry]) -> (Vec3, Vec3, Vec3) {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    let mut sum = Vec3::ZERO;
    for e in entries {
        min = min.min(e.position);
        max = max.max(e.position);
        sum += e.position;
    }
    (min, max, sum / entries.len().max(1) as f32)
}

/// Two-pointer partition: entries below `split` on `axis` move to the front.
/// Returns the count of the lower side.
fn partition(entries: &mut [KdEntry], axis: usize, split: f32) -> usize {
    let (mut i, mut j) = (0, entries.len());
    loop {
        while i < j && entries[i].position.axis(axis) < split {
            i += 1;
        }
        while i < j && entries[j - 1].position.axis(axis) >= split {
            j -= 1;
        }
        if i >= j {
            return i;
        }
        entries.swap(i, j - 1);
        i += 1;
        j -= 1;
    }
}

/// Describe one node and, for branches, partition its range.
/// Returns the node and the split point within `entries`.
fn split_node(entries: &mut [KdEntry], offset: usize, depth: usize, params: &BuildParams) -> (KdNode, Option<usize>) {
    let (min, max, centroid) = bounds(entries);
    let mut node = KdNode {
        kind: NodeKind::Leaf,
        min,
        max,
        start: offset as u32,
        end: (offset + entries.len()) as u32,
        axis: 0,
        split: 0.0,
    };
    if entries.len() <= params.max_leaf_size || depth >= params.max_depth {
        return (node, None);
    }

    let axis = (max - min).max_axis();
    let mut split = centroid.axis(axis);
    let mut mid = partition(entries, axis, split);
    if mid == 0 || mid == entries.len() {
        // Centroid split put everything on one side: fall back to a median split
        mid = entries.len() / 2;
        entries.select_nth_unstable_by(mid, |a, b| {
            a.position.axis(axis).total_cmp(&b.position.axis(axis))
        });
        split = entries[mid].position.axis(axis);
    }

    node.kind = NodeKind::Branch;
    node.axis = axis as u8;
    node.split = split;
    (node, Some(mid))
}

/// Partition the top levels sequentially, collecting subtrees as tasks
fn preprocess<'a>(
    entries: &'a mut [KdEntry],
    offset: usize,
    node: usize,
    depth: usize,
    params: &BuildParams,
    written: &mut Vec<(usize, KdNode)>,
    tasks: &mut Vec<SubtreeTask<'a>>,
) {
    if depth >= params.parallel_depth {
        tasks.push(SubtreeTask { entries, offset, node, depth });
        return;
    }
    let (kd_node, mid) = split_node(entries, offset, depth, params);
    written.push((node, kd_node));
    if let Some(mid) = mid {
        let (left, right) = entries.split_at_mut(mid);
        preprocess(left, offset, node * 2, depth + 1, params, written, tasks);
        preprocess(right, offset + mid, node * 2 + 1, depth + 1, params, written, tasks);
    }
}

fn build_task(task: SubtreeTask<'_>, params: &BuildParams) -> Vec<(usize, KdNode)> {
    let mut out = Vec::new();
    build_recursive(task.entries, task.offset, task.node, task.depth, params, &mut out);
    out
}

fn build_recursive(
    entries: &mut [KdEntry],
    offset: usize,
    node: usize,
    depth: usize,
    params: &BuildParams,
    out: &mut Vec<(usize, KdNode)>,
) {
    let (kd_node, mid) = split_node(entries, offset, depth, params);
    out.push((node, kd_node));
    if let Some(mid) = mid {
        let (left, right) = entries.split_at_mut(mid);
        build_recursive(left, offset, node * 2, depth + 1, params, out);
        build_recursive(right, offset + mid, node * 2 + 1, depth + 1, params, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<Vec3> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Vec3::new(
                    rng.gen_range(-500.0..500.0),
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-500.0..500.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_depth_budget() {
        assert_eq!(depth_budget(0, 8, 2), 0);
        assert_eq!(depth_budget(8, 8, 2), 0);
        assert_eq!(depth_budget(9, 8, 2), 3);
        assert_eq!(depth_budget(1024, 8, 2), 9);
        assert_eq!(depth_budget(usize::MAX / 2, 1, 2), MAX_DEPTH);
    }

    #[test]
    fn test_partition_splits_on_value() {
        let mut entries: Vec<KdEntry> = [5.0, 1.0, 4.0, 2.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| KdEntry { position: Vec3::new(x, 0.0, 0.0), index: i as u32 })
            .collect();
        let mid = partition(&mut entries, 0, 3.0);
        assert_eq!(mid, 2);
        assert!(entries[..mid].iter().all(|e| e.position.x < 3.0));
        assert!(entries[mid..].iter().all(|e| e.position.x >= 3.0));
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[], KdTreeSettings::default(), true);
        assert!(tree.is_empty());
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_every_point_in_exactly_one_leaf() {
        let points = random_points(1000, 1);
        let tree = KdTree::build(&points, KdTreeSettings::default(), true);
        let mut seen = vec![0u32; points.len()];
        for node in tree.nodes.iter().filter(|n| n.kind == NodeKind::Leaf) {
            for e in &tree.entries[node.start as usize..node.end as usize] {
                seen[e.index as usize] += 1;
                assert_eq!(points[e.index as usize], e.position);
                // Leaf bounds contain their points
                assert!(node.box_distance_sq(e.position) == 0.0);
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_leaves_respect_size_or_depth() {
        let points = random_points(5000, 2);
        let settings = KdTreeSettings::default();
        let tree = KdTree::build(&points, settings, false);
        for (i, node) in tree.nodes.iter().enumerate() {
            if node.kind == NodeKind::Leaf {
                let depth = (usize::BITS - 1 - i.leading_zeros()) as usize;
                let count = (node.end - node.start) as usize;
                assert!(count <= settings.max_leaf_size || depth >= tree.depth());
            }
        }
    }

    #[test]
    fn test_identical_points_do_not_recurse_forever() {
        let points = vec![Vec3::new(1.0, 2.0, 3.0); 500];
        let tree = KdTree::build(&points, KdTreeSettings::default(), true);
        assert_eq!(tree.len(), 500);
        assert!(tree.leaf_count() > 1);
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let points = random_points(3000, 3);
        let a = KdTree::build(&points, KdTreeSettings::default(), true);
        let b = KdTree::build(&points, KdTreeSettings::default(), false);
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.entries, b.entries);
    }
}
