//! Shader function-pointer contracts.
//!
//! Shaders are plain function pointers rather than trait objects: the
//! rasterizer needs to call a stable per-draw-call routine with no
//! allocation or dynamic dispatch overhead, and a tagged capability (two
//! callables with a fixed signature) is exactly what §9's design notes ask
//! for.

use crate::mesh::Mesh;
use crate::triangle::Triangle;
use crate::vertex::Vertex;

/// Vertex shader contract.
///
/// Invoked once per vertex of a draw call's mesh with `(vertex_index, mesh,
/// out_vertex, uniforms)`. Must write clip-space `x, y, z, w` and any
/// per-vertex attributes (world position, normal, uv, color) into
/// `out_vertex`. May read freely from `mesh` and `uniforms`. Must not
/// allocate.
pub type VertexShaderFn = fn(usize, &Mesh, &mut Vertex, &[u8]);

/// Fragment shader contract.
///
/// A pure function of its inputs, returning a packed 32-bit color (see
/// [`crate::color`]). Perspective-correct interpolation is the shader's
/// responsibility: the triangle carries `1/w` per vertex (`Vertex::position.w`)
/// and attributes pre-divided by `w`, so the shader computes
/// `w_true = 1 / (λ0·v0.w + λ1·v1.w + λ2·v2.w)` and multiplies interpolated
/// attributes by `w_true`.
pub type FragmentShaderFn = fn(&Triangle, f32, f32, f32, &[u8]) -> u32;
