//! Draw call recording.

use std::sync::Arc;

use log::trace;

use crate::arena::UniformArena;
use crate::mesh::Mesh;
use crate::shader::{FragmentShaderFn, VertexShaderFn};
use crate::vertex::CullMode;

/// One recorded instruction to transform-and-rasterize a mesh with a
/// specific vertex/fragment shader pair, cull mode, and uniform snapshot.
#[derive(Clone)]
pub struct DrawCall {
    /// The mesh this draw call reads from. Shared so the caller can keep
    /// its own handle without the renderer cloning mesh data.
    pub mesh: Arc<Mesh>,
    /// Per-vertex transform routine.
    pub vertex_shader: VertexShaderFn,
    /// Per-fragment color routine.
    pub fragment_shader: FragmentShaderFn,
    /// Backface culling policy for this draw call.
    pub cull_mode: CullMode,
    /// Offset into the frame's vertex scratch array where this call's
    /// transformed vertices begin.
    pub vertex_offset: usize,
    /// Byte range of this call's uniform snapshot in the frame's
    /// [`UniformArena`], if any uniforms were set when it was recorded.
    pub uniforms: Option<(usize, usize)>,
}

/// Records draw calls for a single frame: owns the vertex scratch array, the
/// uniform arena, and the "currently set" shader/cull-mode/uniform state
/// that each `draw_mesh` call captures a snapshot of.
///
/// All per-frame arrays are reset (length to zero) at the start of a frame
/// and grow with amortized doubling as the frame records more draw calls —
/// never shrinking, so steady-state frames do not reallocate.
#[derive(Default)]
pub struct DrawQueue {
    draw_calls: Vec<DrawCall>,
    vertex_scratch: Vec<crate::vertex::Vertex>,
    uniform_arena: UniformArena,
    total_max_triangles: usize,

    current_shaders: Option<(VertexShaderFn, FragmentShaderFn)>,
    current_cull_mode: CullMode,
    /// Snapshot taken at `set_uniforms` time rather than at `draw_mesh`
    /// time: storing the caller's raw pointer across an unbounded,
    /// caller-controlled lifetime would be unsound in a safe Rust API, so
    /// the copy is pulled one step earlier. Callers that call
    /// `set_uniforms` before every `draw_mesh` (the common pattern) see
    /// exactly the reference semantics §4.1 describes.
    current_uniforms: Option<Vec<u8>>,
}

impl DrawQueue {
    /// A fresh, empty draw queue.
    pub fn new() -> DrawQueue {
        DrawQueue::default()
    }

    /// Zeros all per-frame counters, retaining backing-array capacities.
    pub fn reset(&mut self) {
        self.draw_calls.clear();
        self.vertex_scratch.clear();
        self.uniform_arena.reset();
        self.total_max_triangles = 0;
        self.current_shaders = None;
        self.current_cull_mode = CullMode::default();
        self.current_uniforms = None;
    }

    /// Sets the uniform bytes that subsequent `draw_mesh` calls will
    /// snapshot, until overwritten by another `set_uniforms` call.
    pub fn set_uniforms(&mut self, bytes: &[u8]) {
        self.current_uniforms = Some(bytes.to_vec());
    }

    /// Sets the vertex/fragment shader pair subsequent `draw_mesh` calls
    /// will record.
    pub fn set_shaders(&mut self, vertex_shader: VertexShaderFn, fragment_shader: FragmentShaderFn) {
        self.current_shaders = Some((vertex_shader, fragment_shader));
    }

    /// Sets the cull mode subsequent `draw_mesh` calls will record.
    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.current_cull_mode = mode;
    }

    /// Records a draw call for `mesh` using the currently set shaders, cull
    /// mode, and uniform snapshot.
    ///
    /// Returns `false` and records nothing if no shader pair has been set,
    /// matching the reference implementation's silent no-op.
    pub fn draw_mesh(&mut self, mesh: Arc<Mesh>) -> bool {
        let Some((vertex_shader, fragment_shader)) = self.current_shaders else {
            return false;
        };

        let vertex_offset = self.vertex_scratch.len();
        let vertex_count = mesh.vertex_count();
        let old_cap = self.vertex_scratch.capacity();
        self.vertex_scratch.resize(vertex_offset + vertex_count, crate::vertex::Vertex::zeroed());
        if self.vertex_scratch.capacity() != old_cap {
            trace!("vertex_scratch grew to {} vertices", self.vertex_scratch.capacity());
        }

        self.total_max_triangles += mesh.triangle_count();

        let uniforms = self.current_uniforms.as_deref().map(|bytes| {
            let offset = self.uniform_arena.snapshot(bytes);
            (offset, bytes.len())
        });

        self.draw_calls.push(DrawCall {
            mesh,
            vertex_shader,
            fragment_shader,
            cull_mode: self.current_cull_mode,
            vertex_offset,
            uniforms,
        });

        debug_assert!(vertex_offset + vertex_count <= self.vertex_scratch.len());

        true
    }

    /// Number of draw calls recorded so far this frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.draw_calls.len()
    }

    /// Whether no draw calls have been recorded this frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.draw_calls.is_empty()
    }

    /// Sum of `index_count / 3` across all recorded draw calls — the
    /// worst-case number of triangles assembly could produce, used to
    /// preallocate the triangle array before parallel assembly begins.
    #[inline]
    pub fn total_max_triangles(&self) -> usize {
        self.total_max_triangles
    }

    #[inline]
    pub(crate) fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    #[inline]
    pub(crate) fn vertex_scratch(&self) -> &[crate::vertex::Vertex] {
        &self.vertex_scratch
    }

    #[inline]
    pub(crate) fn vertex_scratch_mut(&mut self) -> &mut Vec<crate::vertex::Vertex> {
        &mut self.vertex_scratch
    }

    pub(crate) fn uniforms_for(&self, dc: &DrawCall) -> &[u8] {
        match dc.uniforms {
            Some((offset, len)) => self.uniform_arena.read(offset, len),
            None => &[],
        }
    }

    #[inline]
    pub(crate) fn uniform_arena(&self) -> &UniformArena {
        &self.uniform_arena
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vs(_: usize, _: &Mesh, _: &mut crate::vertex::Vertex, _: &[u8]) {}
    fn fs(_: &crate::triangle::Triangle, _: f32, _: f32, _: f32, _: &[u8]) -> u32 {
        0
    }

    fn unit_triangle_mesh() -> Arc<Mesh> {
        use nalgebra::Vector3;
        Arc::new(Mesh {
            positions: vec![Vector3::zeros(); 3],
            normals: vec![Vector3::zeros(); 3],
            uvs: vec![(0.0, 0.0); 3],
            colors: vec![0; 3],
            indices: vec![[0, 1, 2]],
        })
    }

    #[test]
    fn draw_mesh_fails_without_shaders() {
        let mut queue = DrawQueue::new();
        assert!(!queue.draw_mesh(unit_triangle_mesh()));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn draw_mesh_succeeds_once_shaders_set() {
        let mut queue = DrawQueue::new();
        queue.set_shaders(vs, fs);
        assert!(queue.draw_mesh(unit_triangle_mesh()));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_max_triangles(), 1);
    }

    #[test]
    fn uniform_snapshots_are_isolated_per_draw_call() {
        let mut queue = DrawQueue::new();
        queue.set_shaders(vs, fs);

        queue.set_uniforms(&[1u8]);
        queue.draw_mesh(unit_triangle_mesh());

        queue.set_uniforms(&[2u8]);
        queue.draw_mesh(unit_triangle_mesh());

        let calls = queue.draw_calls().to_vec();
        assert_eq!(queue.uniforms_for(&calls[0]), &[1u8]);
        assert_eq!(queue.uniforms_for(&calls[1]), &[2u8]);
    }

    #[test]
    fn reset_clears_but_retains_capacity() {
        let mut queue = DrawQueue::new();
        queue.set_shaders(vs, fs);
        queue.draw_mesh(unit_triangle_mesh());
        let cap_before = queue.vertex_scratch.capacity();

        queue.reset();

        assert_eq!(queue.len(), 0);
        assert_eq!(queue.total_max_triangles(), 0);
        assert!(queue.vertex_scratch.capacity() >= cap_before);
    }
}
