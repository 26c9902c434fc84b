//! Range and k-nearest queries
//!
//! Both run the same descent: visit the nearer child first, skip any child
//! whose bounding box is further than the current bound, and keep results in a
//! bounded max-heap so the worst kept hit is always on top.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{KdTree, NodeKind, ROOT};
use crate::util::vec3::Vec3;

/// One query result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdHit {
    /// Index into the point slice the tree was built from
    pub index: u32,
    pub distance_sq: f32,
}

impl Eq for KdHit {}

impl Ord for KdHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for KdHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap holding at most `capacity` hits within `radius_sq`
struct BoundedHeap {
    heap: BinaryHeap<KdHit>,
    capacity: usize,
    radius_sq: f32,
}

impl BoundedHeap {
    fn new(capacity: usize, radius_sq: f32) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            capacity,
            radius_sq,
        }
    }

    /// Current pruning distance
    #[inline]
    fn bound(&self) -> f32 {
        if self.heap.len() < self.capacity {
            self.radius_sq
        } else {
            self.heap.peek().map_or(self.radius_sq, |worst| worst.distance_sq)
        }
    }

    #[inline]
    fn offer(&mut self, hit: KdHit) {
        if self.capacity == 0 || hit.distance_sq > self.radius_sq {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(hit);
        } else if let Some(worst) = self.heap.peek() {
            if hit < *worst {
                self.heap.pop();
                self.heap.push(hit);
            }
        }
    }

    /// Hits nearest first
    fn into_sorted(self) -> Vec<KdHit> {
        self.heap.into_sorted_vec()
    }
}

impl KdTree {
    /// Every point within `radius` of `point` (inclusive), nearest first
    pub fn within_radius(&self, point: Vec3, radius: f32) -> Vec<KdHit> {
        self.search(point, usize::MAX, radius * radius)
    }

    /// The `k` points nearest to `point`, nearest first
    pub fn nearest_k(&self, point: Vec3, k: usize) -> Vec<KdHit> {
        self.search(point, k, f32::INFINITY)
    }

    /// Up to `k` nearest points within `radius`
    pub fn nearest_k_within(&self, point: Vec3, k: usize, radius: f32) -> Vec<KdHit> {
        self.search(point, k, radius * radius)
    }

    pub fn nearest(&self, point: Vec3) -> Option<KdHit> {
        self.nearest_k(point, 1).into_iter().next()
    }

    fn search(&self, point: Vec3, k: usize, radius_sq: f32) -> Vec<KdHit> {
        if self.is_empty() || k == 0 || radius_sq.is_nan() {
            return Vec::new();
        }
        let mut heap = BoundedHeap::new(k, radius_sq);
        if self.nodes[ROOT].box_distance_sq(point) <= heap.bound() {
            self.descend(ROOT, point, &mut heap);
        }
        heap.into_sorted()
    }

    fn descend(&self, index: usize, point: Vec3, heap: &mut BoundedHeap) {
        let node = &self.nodes[index];
        match node.kind {
            NodeKind::Empty => {}
            NodeKind::Leaf => {
                for entry in &self.entries[node.start as usize..node.end as usize] {
                    heap.offer(KdHit {
                        index: entry.index,
                        distance_sq: entry.position.distance_sq_to(point),
                    });
                }
            }
            NodeKind::Branch => {
                let (left, right) = (index * 2, index * 2 + 1);
                let dl = self.nodes[left].box_distance_sq(point);
                let dr = self.nodes[right].box_distance_sq(point);
                let order = if dl <= dr { [(left, dl), (right, dr)] } else { [(right, dr), (left, dl)] };
                for (child, distance) in order {
                    if distance <= heap.bound() {
                        self.descend(child, point, heap);
                    }
                }
            }
        }
    }
}
