use nalgebra::Point3;
use std::collections::HashMap;

/// Averages points that fall into the same `voxel_size`-sided grid cell
/// (§4.4 step 1). Order of the output is unspecified but deterministic for a
/// fixed input order, since cells are visited in first-seen order.
pub fn voxel_downsample(points: &[Point3<f32>], voxel_size: f32) -> Vec<Point3<f32>> {
    if points.is_empty() || voxel_size <= 0.0 {
        return points.to_vec();
    }
    let mut cells: HashMap<(i64, i64, i64), (Point3<f32>, usize)> = HashMap::new();
    let mut order: Vec<(i64, i64, i64)> = Vec::new();
    for p in points {
        let key = (
            (p.x / voxel_size).floor() as i64,
            (p.y / voxel_size).floor() as i64,
            (p.z / voxel_size).floor() as i64,
        );
        let entry = cells.entry(key).or_insert_with(|| {
            order.push(key);
            (Point3::origin(), 0)
        });
        entry.0 = Point3::from(entry.0.coords + p.coords);
        entry.1 += 1;
    }
    order
        .into_iter()
        .map(|key| {
            let (sum, count) = cells[&key];
            Point3::from(sum.coords / count as f32)
        })
        .collect()
}

/// `voxel = clamp(roi_extent * factor, lo, hi)` (§4.4 "Voxel choice").
pub fn voxel_size_for(roi_extent: f32, factor: f32, lo: f32, hi: f32) -> f32 {
    (roi_extent * factor).clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn points_in_same_cell_are_averaged() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.1, 0.1),
            Point3::new(5.0, 5.0, 5.0),
        ];
        let down = voxel_downsample(&points, 1.0);
        assert_eq!(down.len(), 2);
    }

    #[test]
    fn empty_input_is_noop() {
        assert!(voxel_downsample(&[], 1.0).is_empty());
    }

    #[test]
    fn voxel_size_for_clamps_range() {
        assert_eq!(voxel_size_for(1000.0, 0.01, 0.4, 0.6), 0.6);
        assert_eq!(voxel_size_for(1.0, 0.01, 0.4, 0.6), 0.4);
    }
}
