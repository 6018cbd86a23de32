//! Binned SAH bounding volume hierarchy over triangles.
//!
//! Nodes are stored flat with the root at index 0. The same node array is
//! uploaded unchanged to the GPU kernel, so the layout is fixed.

use crate::geometry::{Ray, Triangle};
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec3A};
use rtobj_common::Bounds;

/// Number of SAH bins per axis.
const NUM_BINS: usize = 12;
/// Relative cost of visiting an inner node versus testing one triangle.
const TRAVERSAL_COST: f32 = 1.0;
/// Ranges this small always become leaves.
const MAX_LEAF_SIZE: usize = 4;
/// Deepest level a node may sit at. Traversal stacks (host and kernel) hold
/// at most `MAX_DEPTH + 1` entries.
pub const MAX_DEPTH: usize = 48;

/// Flat BVH node, 32 bytes.
///
/// Inner node: `left_or_first` is the left child, the right child follows it,
/// and `count == 0`. Leaf: `left_or_first` is the first triangle in leaf order
/// and `count > 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb_min: [f32; 3],
    pub left_or_first: u32,
    pub aabb_max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    fn leaf(bounds: &Bounds, first: usize, count: usize) -> Self {
        Self {
            aabb_min: bounds.min.to_array(),
            left_or_first: first as u32,
            aabb_max: bounds.max.to_array(),
            count: count as u32,
        }
    }

    fn inner(bounds: &Bounds, left: usize) -> Self {
        Self {
            aabb_min: bounds.min.to_array(),
            left_or_first: left as u32,
            aabb_max: bounds.max.to_array(),
            count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: Vec3::from_array(self.aabb_min),
            max: Vec3::from_array(self.aabb_max),
        }
    }
}

#[derive(Clone, Copy)]
struct Bin {
    bounds: Bounds,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            bounds: Bounds::EMPTY,
            count: 0,
        }
    }
}

struct Split {
    axis: usize,
    pos: f32,
    cost: f32,
}

struct Task {
    node: usize,
    start: usize,
    end: usize,
    depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    /// Leaf order: `order[i]` is the input index of the i-th triangle
    /// referenced by the leaves.
    pub order: Vec<u32>,
}

impl Bvh {
    /// Build over `triangles`. An empty input yields an empty hierarchy.
    pub fn build(triangles: &[Triangle]) -> Self {
        let n = triangles.len();
        if n == 0 {
            return Self::default();
        }

        let bounds: Vec<Bounds> = triangles.iter().map(Triangle::bounds).collect();
        let centroids: Vec<Vec3> = triangles.iter().map(Triangle::centroid).collect();
        let mut order: Vec<u32> = (0..n as u32).collect();

        let mut nodes = Vec::with_capacity(2 * n);
        nodes.push(BvhNode::zeroed());

        let mut stack = vec![Task {
            node: 0,
            start: 0,
            end: n,
            depth: 0,
        }];

        while let Some(task) = stack.pop() {
            let range = &mut order[task.start..task.end];
            let count = range.len();

            let mut node_bounds = Bounds::EMPTY;
            let mut centroid_bounds = Bounds::EMPTY;
            for &i in range.iter() {
                node_bounds.union(&bounds[i as usize]);
                centroid_bounds.grow(centroids[i as usize]);
            }

            if count <= MAX_LEAF_SIZE || task.depth >= MAX_DEPTH {
                nodes[task.node] = BvhNode::leaf(&node_bounds, task.start, count);
                continue;
            }

            let parent_area = node_bounds.area();
            let leaf_cost = count as f32;
            let split = find_best_split(range, &bounds, &centroids, &centroid_bounds)
                .filter(|s| parent_area > 0.0 && s.cost / parent_area < leaf_cost);

            let mid = match split {
                Some(s) => {
                    task.start
                        + partition(range, |&i| centroids[i as usize][s.axis] < s.pos)
                }
                // Identical centroids or a flat box: fall back to a median cut.
                None if count > MAX_LEAF_SIZE * 4 => task.start + count / 2,
                None => {
                    nodes[task.node] = BvhNode::leaf(&node_bounds, task.start, count);
                    continue;
                }
            };
            let mid = if mid == task.start || mid == task.end {
                task.start + count / 2
            } else {
                mid
            };

            let left = nodes.len();
            nodes.push(BvhNode::zeroed());
            nodes.push(BvhNode::zeroed());
            nodes[task.node] = BvhNode::inner(&node_bounds, left);

            stack.push(Task {
                node: left + 1,
                start: mid,
                end: task.end,
                depth: task.depth + 1,
            });
            stack.push(Task {
                node: left,
                start: task.start,
                end: mid,
                depth: task.depth + 1,
            });
        }

        tracing::debug!(triangles = n, nodes = nodes.len(), "bvh built");

        Self { nodes, order }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn bounds(&self) -> Bounds {
        self.nodes.first().map(BvhNode::bounds).unwrap_or_default()
    }

    /// Closest hit along `ray` against `triangles`, which must already be in
    /// leaf order. Returns the distance and the leaf-order triangle index.
    pub fn traverse(&self, ray: &Ray, triangles: &[Triangle]) -> Option<(f32, usize)> {
        let root = self.nodes.first()?;
        let mut closest = ray.tmax;
        let mut hit = None;
        let mut ray = *ray;

        if ray.intersect_aabb(root.aabb_min.into(), root.aabb_max.into()) == f32::INFINITY {
            return None;
        }

        let mut stack = Vec::with_capacity(MAX_DEPTH + 1);
        stack.push(0usize);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                let first = node.left_or_first as usize;
                for (i, tri) in triangles[first..first + node.count as usize]
                    .iter()
                    .enumerate()
                {
                    let t = tri.intersect(&ray);
                    if t < closest {
                        closest = t;
                        ray.tmax = t;
                        hit = Some((t, first + i));
                    }
                }
                continue;
            }

            let left = node.left_or_first as usize;
            let right = left + 1;
            let t_left = self.node_entry(&ray, left);
            let t_right = self.node_entry(&ray, right);

            // Visit the nearer child first.
            let (near, t_near, far, t_far) = if t_left <= t_right {
                (left, t_left, right, t_right)
            } else {
                (right, t_right, left, t_left)
            };
            if t_far < closest {
                stack.push(far);
            }
            if t_near < closest {
                stack.push(near);
            }
        }

        hit
    }

    fn node_entry(&self, ray: &Ray, index: usize) -> f32 {
        let node = &self.nodes[index];
        ray.intersect_aabb(Vec3A::from(node.aabb_min), Vec3A::from(node.aabb_max))
    }
}

fn find_best_split(
    indices: &[u32],
    bounds: &[Bounds],
    centroids: &[Vec3],
    centroid_bounds: &Bounds,
) -> Option<Split> {
    let mut best: Option<Split> = None;

    for axis in 0..3 {
        let min = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - min;
        if !(extent > 1e-8) {
            continue;
        }

        let mut bins = [Bin::default(); NUM_BINS];
        let scale = NUM_BINS as f32 / extent;
        for &i in indices {
            let bin = (((centroids[i as usize][axis] - min) * scale) as usize).min(NUM_BINS - 1);
            bins[bin].bounds.union(&bounds[i as usize]);
            bins[bin].count += 1;
        }

        let mut left_area = [0.0f32; NUM_BINS - 1];
        let mut left_count = [0usize; NUM_BINS - 1];
        let mut sweep = Bounds::EMPTY;
        let mut sweep_count = 0;
        for i in 0..NUM_BINS - 1 {
            sweep.union(&bins[i].bounds);
            sweep_count += bins[i].count;
            left_area[i] = sweep.area();
            left_count[i] = sweep_count;
        }

        sweep = Bounds::EMPTY;
        sweep_count = 0;
        for i in (1..NUM_BINS).rev() {
            sweep.union(&bins[i].bounds);
            sweep_count += bins[i].count;
            if left_count[i - 1] == 0 || sweep_count == 0 {
                continue;
            }
            let cost = TRAVERSAL_COST
                + left_count[i - 1] as f32 * left_area[i - 1]
                + sweep_count as f32 * sweep.area();
            if best.as_ref().is_none_or(|b| cost < b.cost) {
                best = Some(Split {
                    axis,
                    pos: min + (i as f32 / NUM_BINS as f32) * extent,
                    cost,
                });
            }
        }
    }

    best
}

/// Reorder `items` so every element matching `pred` comes first. Returns the
/// number of matching elements.
fn partition<T>(items: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut first = 0;
    for i in 0..items.len() {
        if pred(&items[i]) {
            items.swap(first, i);
            first += 1;
        }
    }
    first
}
