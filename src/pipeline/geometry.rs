//! Geometry stage: runs the vertex program per vertex of a draw call, then
//! does perspective division and viewport mapping.

use crate::draw_queue::DrawCall;
use crate::vertex::Vertex;

/// Processes every vertex of draw call `dc`, writing transformed vertices
/// into `out`, which must be exactly `mesh.vertex_count()` long and already
/// positioned at the call's vertex scratch offset.
///
/// Per §4.2: the vertex shader writes clip-space xyzw and world-space
/// attributes; if `w >= near_plane` the vertex is perspective-divided and
/// mapped into window space, otherwise it is flagged near-rejected by
/// setting `position.w = -1.0`.
pub(crate) fn process_draw_call(dc: &DrawCall, uniforms: &[u8], out: &mut [Vertex], screen_width: u32, screen_height: u32, near_plane: f32) {
    let mesh = &dc.mesh;

    for i in 0..mesh.vertex_count() {
        let slot = &mut out[i];
        *slot = Vertex::zeroed();
        (dc.vertex_shader)(i, mesh, slot, uniforms);

        let w = slot.position.w;
        if w >= near_plane {
            let inv_w = 1.0 / w;

            slot.position.x = (slot.position.x * inv_w + 1.0) * 0.5 * screen_width as f32;
            slot.position.y = (1.0 - slot.position.y * inv_w) * 0.5 * screen_height as f32;
            slot.position.z = slot.position.z * inv_w * 0.5 + 0.5;

            slot.world_position *= inv_w;
            slot.world_normal *= inv_w;

            slot.position.w = inv_w;
        } else {
            slot.position.w = -1.0;
        }

        // Invariant (spec.md §3): a vertex with w < 0 denotes near-rejected,
        // and only near-rejected vertices carry a negative w.
        debug_assert!(slot.position.w == -1.0 || slot.position.w > 0.0);
        debug_assert_eq!(slot.is_near_rejected(), w < near_plane);
    }
}
