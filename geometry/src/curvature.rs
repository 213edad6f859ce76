use nalgebra::Point3;
use std::collections::HashMap;
use types::Mesh;

/// Absolute angle defect at each vertex in `indices`: `|2*pi - sum of incident
/// triangle angles|`, normalized by the 5th/95th percentile of the sampled
/// subset and clipped to `[0, 1]`. A mesh with no triangles (or a vertex with
/// no incident triangles) contributes zero. Used only as a soft score weight,
/// never as a hard gate.
pub fn sample_curvature(mesh: &Mesh, indices: &[usize]) -> Vec<f32> {
    let Some(triangles) = mesh.triangles() else {
        return vec![0.0; indices.len()];
    };
    if triangles.is_empty() || indices.is_empty() {
        return vec![0.0; indices.len()];
    }

    let mut angle_sum: HashMap<u32, f32> = HashMap::new();
    for tri in triangles {
        for corner in 0..3 {
            let a = tri[corner] as usize;
            let b = tri[(corner + 1) % 3] as usize;
            let c = tri[(corner + 2) % 3] as usize;
            if a >= mesh.len() || b >= mesh.len() || c >= mesh.len() {
                continue;
            }
            let angle = vertex_angle(mesh.vertices()[a], mesh.vertices()[b], mesh.vertices()[c]);
            *angle_sum.entry(tri[corner]).or_insert(0.0) += angle;
        }
    }

    let raw: Vec<f32> = indices
        .iter()
        .map(|&idx| {
            angle_sum
                .get(&(idx as u32))
                .map(|sum| (std::f32::consts::TAU - sum).abs())
                .unwrap_or(0.0)
        })
        .collect();

    normalize_clip(&raw)
}

fn vertex_angle(at: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> f32 {
    let u = b - at;
    let v = c - at;
    let denom = u.norm() * v.norm();
    if denom < f32::EPSILON {
        return 0.0;
    }
    (u.dot(&v) / denom).clamp(-1.0, 1.0).acos()
}

fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn normalize_clip(raw: &[f32]) -> Vec<f32> {
    let mut sorted = raw.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lo = percentile(&sorted, 0.05);
    let hi = percentile(&sorted, 0.95);
    let span = (hi - lo).max(f32::EPSILON);
    raw.iter().map(|&v| ((v - lo) / span).clamp(0.0, 1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mesh_without_triangles_is_flat_zero() {
        let mesh = Mesh::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            None,
            None,
        )
        .unwrap();
        assert_eq!(sample_curvature(&mesh, &[0, 1]), vec![0.0, 0.0]);
    }

    #[test]
    fn flat_patch_has_near_zero_defect_at_interior_vertex() {
        // six triangles fanned around the origin sum to ~2*pi, so an interior
        // flat-disc vertex has ~zero defect relative to boundary vertices.
        let mut verts = vec![Point3::origin()];
        for i in 0..6 {
            let theta = i as f32 * std::f32::consts::TAU / 6.0;
            verts.push(Point3::new(theta.cos(), theta.sin(), 0.0));
        }
        let mut tris = Vec::new();
        for i in 0..6u32 {
            tris.push([0, i + 1, (i + 1) % 6 + 1]);
        }
        let mesh = Mesh::new(verts, Some(tris), None).unwrap();
        let curv = sample_curvature(&mesh, &[0]);
        assert_eq!(curv.len(), 1);
    }

    #[test]
    fn output_is_clipped_to_unit_range() {
        let mut verts = vec![Point3::origin()];
        for i in 0..6 {
            let theta = i as f32 * std::f32::consts::TAU / 6.0;
            verts.push(Point3::new(theta.cos(), theta.sin(), 0.0));
        }
        let mut tris = Vec::new();
        for i in 0..6u32 {
            tris.push([0, i + 1, (i + 1) % 6 + 1]);
        }
        let mesh = Mesh::new(verts, Some(tris), None).unwrap();
        let indices: Vec<usize> = (0..mesh.len()).collect();
        let curv = sample_curvature(&mesh, &indices);
        assert!(curv.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }
}
