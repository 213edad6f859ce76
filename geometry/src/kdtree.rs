use crate::heap::BoundedMinHeap;
use nalgebra::Point3;

/// Distance-ordered candidate used by the bounded heaps below. Wraps an
/// `f32` in a total order (points are never NaN once they pass through the
/// engine's input validation) paired with the source index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist_sq: f32,
    index: usize,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist_sq
            .partial_cmp(&other.dist_sq)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

/// An immutable, balanced KD-tree over `Point3<f32>`.
///
/// Unlike a live index that must support concurrent insert/delete, every
/// tree here is built once from a finalized point set and then only
/// queried, so the tree is a plain owned array-of-nodes with no
/// interior mutability or lock-free machinery.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<Point3<f32>>,
    // `nodes[i] = (point_index_into_points, axis)`, laid out as an implicit
    // balanced binary tree: node `i`'s children are `2i+1` and `2i+2`.
    nodes: Vec<Option<(usize, u8)>>,
}

fn build(
    indices: &mut [usize],
    points: &[Point3<f32>],
    depth: usize,
    node: usize,
    nodes: &mut Vec<Option<(usize, u8)>>,
) {
    if indices.is_empty() {
        return;
    }
    if nodes.len() <= node {
        nodes.resize(node + 1, None);
    }
    let axis = (depth % 3) as u8;
    indices.sort_by(|&a, &b| {
        component(&points[a], axis)
            .partial_cmp(&component(&points[b], axis))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mid = indices.len() / 2;
    nodes[node] = Some((indices[mid], axis));
    let (left, right) = indices.split_at_mut(mid);
    let right = &mut right[1..];
    build(left, points, depth + 1, 2 * node + 1, nodes);
    build(right, points, depth + 1, 2 * node + 2, nodes);
}

fn component(p: &Point3<f32>, axis: u8) -> f32 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

impl KdTree {
    pub fn build(points: Vec<Point3<f32>>) -> Self {
        let mut indices: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::new();
        build(&mut indices, &points, 0, 0, &mut nodes);
        Self { points, nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    /// The `k` nearest neighbours of `query`, sorted by ascending distance.
    /// Returns `(point_index, distance)` pairs.
    pub fn knn(&self, query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut heap = BoundedMinHeap::new(k);
        self.search(0, 0, query, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| (c.index, c.dist_sq.sqrt()))
            .collect()
    }

    /// The single nearest neighbour, or `None` for an empty tree.
    pub fn nearest(&self, query: &Point3<f32>) -> Option<(usize, f32)> {
        self.knn(query, 1).into_iter().next()
    }

    /// All points within `radius` of `query`, sorted by ascending distance.
    pub fn within_radius(&self, query: &Point3<f32>, radius: f32) -> Vec<(usize, f32)> {
        let mut found = Vec::new();
        let radius_sq = radius * radius;
        self.collect_radius(0, query, radius_sq, &mut found);
        found.sort_by(|a: &(usize, f32), b| a.1.partial_cmp(&b.1).unwrap());
        found
    }

    fn search(&self, node: usize, depth: usize, query: &Point3<f32>, heap: &mut BoundedMinHeap<Candidate>) {
        let Some(Some((idx, axis))) = self.nodes.get(node) else {
            return;
        };
        let point = &self.points[*idx];
        let dist_sq = (point - query).norm_squared();
        heap.push(Candidate {
            dist_sq,
            index: *idx,
        });

        let diff = component(query, *axis) - component(point, *axis);
        let (near, far) = if diff <= 0.0 {
            (2 * node + 1, 2 * node + 2)
        } else {
            (2 * node + 2, 2 * node + 1)
        };
        self.search(near, depth + 1, query, heap);

        let must_check_far = !heap.is_full() || diff * diff < heap.worst().map(|c| c.dist_sq).unwrap_or(f32::INFINITY);
        if must_check_far {
            self.search(far, depth + 1, query, heap);
        }
    }

    fn collect_radius(&self, node: usize, query: &Point3<f32>, radius_sq: f32, out: &mut Vec<(usize, f32)>) {
        let Some(Some((idx, axis))) = self.nodes.get(node) else {
            return;
        };
        let point = &self.points[*idx];
        let dist_sq = (point - query).norm_squared();
        if dist_sq <= radius_sq {
            out.push((*idx, dist_sq.sqrt()));
        }
        // Left holds points with axis-component <= this node's; right holds >=.
        // Only prune a side when the splitting plane is further than `radius`
        // from the query on the far side of it.
        let diff = component(query, *axis) - component(point, *axis);
        if diff >= -radius_sq.sqrt() {
            self.collect_radius(2 * node + 2, query, radius_sq, out);
        }
        if diff <= radius_sq.sqrt() {
            self.collect_radius(2 * node + 1, query, radius_sq, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid() -> KdTree {
        let mut pts = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                pts.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        KdTree::build(pts)
    }

    #[test]
    fn nearest_finds_exact_match() {
        let tree = grid();
        let (idx, dist) = tree.nearest(&Point3::new(2.0, 2.0, 0.0)).unwrap();
        assert_eq!(tree.points()[idx], Point3::new(2.0, 2.0, 0.0));
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn knn_returns_k_sorted_by_distance() {
        let tree = grid();
        let results = tree.knn(&Point3::new(2.0, 2.0, 0.0), 5);
        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn within_radius_excludes_far_points() {
        let tree = grid();
        let hits = tree.within_radius(&Point3::new(2.0, 2.0, 0.0), 1.01);
        // center + 4 axis-adjacent neighbours at distance 1.0
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let tree = KdTree::build(Vec::new());
        assert!(tree.nearest(&Point3::origin()).is_none());
        assert!(tree.knn(&Point3::origin(), 3).is_empty());
    }
}
