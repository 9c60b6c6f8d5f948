//! Post-transform vertex representation and face-winding/cull configuration.

use nalgebra::{Vector3, Vector4};

/// A vertex after the geometry stage has run.
///
/// `position` starts out holding clip-space `(x, y, z, w)` as written by the
/// vertex shader. Once the geometry stage processes it, `x`/`y` are window
/// pixel coordinates, `z` is depth in `[0, 1]`, and `w` holds `1/w_clip` (or
/// `-1.0` if the vertex was near-rejected). `world_position` and
/// `world_normal` are divided by the original `w_clip` in place, so that
/// barycentric interpolation multiplied by the interpolated `1/w` recovers
/// perspective-correct values — see [`crate::pipeline::geometry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Clip-space, then window-space, position. See struct docs.
    pub position: Vector4<f32>,
    /// World-space position, perspective-divided after the geometry stage.
    pub world_position: Vector3<f32>,
    /// World-space normal, perspective-divided after the geometry stage.
    pub world_normal: Vector3<f32>,
    /// Texture coordinates.
    pub uv: (f32, f32),
    /// Packed vertex color, see [`crate::color`].
    pub color: u32,
}

impl Vertex {
    /// A zeroed vertex, suitable as scratch storage before a vertex shader
    /// writes into it.
    pub fn zeroed() -> Vertex {
        Vertex {
            position: Vector4::zeros(),
            world_position: Vector3::zeros(),
            world_normal: Vector3::zeros(),
            uv: (0.0, 0.0),
            color: 0,
        }
    }

    /// Whether the geometry stage marked this vertex near-rejected.
    ///
    /// A vertex is near-rejected when its original clip-space `w` fell below
    /// the renderer's near plane; the geometry stage flags this by storing
    /// `-1.0` in `position.w` in place of `1/w_clip`.
    #[inline]
    pub fn is_near_rejected(&self) -> bool {
        self.position.w < 0.0
    }
}

impl Default for Vertex {
    fn default() -> Vertex {
        Vertex::zeroed()
    }
}

/// Triangle face culling mode, evaluated against the signed screen-space
/// area of its three window-space vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// Keep both winding orders.
    #[default]
    None,
    /// Reject counter-clockwise-facing (i.e. back) triangles.
    BackCcw,
    /// Reject clockwise-facing (i.e. back) triangles.
    BackCw,
}
