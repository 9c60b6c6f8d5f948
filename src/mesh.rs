//! Struct-of-arrays mesh storage.

use nalgebra::Vector3;

/// A struct-of-arrays indexed triangle mesh.
///
/// The core only ever borrows a [`Mesh`] through a [`DrawCall`](crate::draw_queue::DrawCall);
/// it never mutates one. Loading meshes from disk, generating them
/// procedurally, or otherwise populating these arrays is the caller's
/// responsibility.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Per-vertex object-space positions.
    pub positions: Vec<Vector3<f32>>,
    /// Per-vertex object-space normals.
    pub normals: Vec<Vector3<f32>>,
    /// Per-vertex texture coordinates.
    pub uvs: Vec<(f32, f32)>,
    /// Per-vertex packed colors, see [`crate::color`].
    pub colors: Vec<u32>,
    /// Triangle index array: each entry names three vertex indices.
    pub indices: Vec<[u32; 3]>,
}

impl Mesh {
    /// Number of vertices in the struct-of-arrays.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of indices across all triangles (`3 * triangle_count`).
    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len() * 3
    }

    /// Number of triangles this mesh indexes.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts_match_arrays() {
        let mesh = Mesh {
            positions: vec![Vector3::zeros(); 4],
            normals: vec![Vector3::zeros(); 4],
            uvs: vec![(0.0, 0.0); 4],
            colors: vec![0; 4],
            indices: vec![[0, 1, 2], [0, 2, 3]],
        };

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.index_count(), 6);
    }
}
