//! Triangle, edge and tangent helpers

use glam::{Vec2, Vec3, Vec4};
use std::collections::HashMap;

/// Per-triangle data used by shadow volume extrusion
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TriangleData {
    pub normal: Vec3,
    pub facing_light: bool,
}

/// Edge shared by one or two triangles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub points: [u32; 2],
    pub tri1: usize,
    /// `None` for an open edge
    pub tri2: Option<usize>,
    /// Second triangle walks the edge in the same direction as the first
    pub invert_tri2: bool,
}

fn face_normal(positions: &[Vec3], tri: &[u32]) -> Vec3 {
    let p0 = positions[tri[0] as usize];
    let p1 = positions[tri[1] as usize];
    let p2 = positions[tri[2] as usize];
    (p1 - p0).cross(p2 - p0).normalize_or_zero()
}

pub fn create_triangle_data(positions: &[Vec3], indices: &[u32]) -> Vec<TriangleData> {
    indices
        .chunks_exact(3)
        .map(|tri| TriangleData {
            normal: face_normal(positions, tri),
            facing_light: false,
        })
        .collect()
}

pub fn update_triangle_normals(triangles: &mut [TriangleData], positions: &[Vec3], indices: &[u32]) {
    for (data, tri) in triangles.iter_mut().zip(indices.chunks_exact(3)) {
        data.normal = face_normal(positions, tri);
    }
}

/// Build the edge list of a triangle list
///
/// Vertices that share a position are welded first, so seams caused by
/// split normals or uvs do not open the mesh. Returns the edges and whether
/// any edge is open, in which case the mesh must be drawn double sided.
pub fn create_edges(positions: &[Vec3], indices: &[u32]) -> (Vec<Edge>, bool) {
    // 1. Weld vertices by exact position
    let mut welded: HashMap<[u32; 3], u32> = HashMap::new();
    let canonical: Vec<u32> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
            *welded.entry(key).or_insert(i as u32)
        })
        .collect();

    // 2. Collect edges keyed by their sorted welded points
    let mut edges: Vec<Edge> = Vec::new();
    let mut lookup: HashMap<(u32, u32), usize> = HashMap::new();

    for (tri_idx, tri) in indices.chunks_exact(3).enumerate() {
        for k in 0..3 {
            let a = canonical[tri[k] as usize];
            let b = canonical[tri[(k + 1) % 3] as usize];
            if a == b {
                continue;
            }
            let key = (a.min(b), a.max(b));

            match lookup.get(&key) {
                Some(&edge_idx) => {
                    let edge = &mut edges[edge_idx];
                    if edge.tri2.is_none() {
                        edge.tri2 = Some(tri_idx);
                        edge.invert_tri2 = edge.points == [a, b];
                    }
                }
                None => {
                    lookup.insert(key, edges.len());
                    edges.push(Edge {
                        points: [a, b],
                        tri1: tri_idx,
                        tri2: None,
                        invert_tri2: false,
                    });
                }
            }
        }
    }

    let double_sided = edges.iter().any(|e| e.tri2.is_none());
    (edges, double_sided)
}

/// Per-vertex tangents from positions, normals and uvs
///
/// Tangents are Gram-Schmidt orthogonalised against the normal; `w` is the
/// bitangent sign.
pub fn create_vertex_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    indices: &[u32],
) -> Vec<Vec4> {
    let count = positions.len();
    let mut tan = vec![Vec3::ZERO; count];
    let mut bitan = vec![Vec3::ZERO; count];

    if uvs.len() == count {
        for tri in indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let e1 = positions[i1] - positions[i0];
            let e2 = positions[i2] - positions[i0];
            let d1 = uvs[i1] - uvs[i0];
            let d2 = uvs[i2] - uvs[i0];

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let sdir = (e1 * d2.y - e2 * d1.y) * r;
            let tdir = (e2 * d1.x - e1 * d2.x) * r;

            for &i in &[i0, i1, i2] {
                tan[i] += sdir;
                bitan[i] += tdir;
            }
        }
    }

    (0..count)
        .map(|i| {
            let n = normals.get(i).copied().unwrap_or(Vec3::Z);
            let t = tan[i];
            let mut ortho = (t - n * n.dot(t)).normalize_or_zero();
            if ortho == Vec3::ZERO {
                // Degenerate uvs: any direction perpendicular to the normal
                ortho = n.any_orthonormal_vector();
            }
            let w = if n.cross(t).dot(bitan[i]) < 0.0 { -1.0 } else { 1.0 };
            ortho.extend(w)
        })
        .collect()
}
