//! Assembly stage: groups transformed vertices into triangles, applies
//! backface culling, and atomically appends surviving triangles to the
//! shared triangle array.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::draw_queue::DrawCall;
use crate::triangle::{edge_function, Triangle};
use crate::vertex::{CullMode, Vertex};

const DEGENERATE_AREA_EPSILON: f32 = 1e-4;

/// Walks draw call `dc`'s index array three at a time, skipping
/// near-rejected, culled, or degenerate triangles, and atomically reserves
/// a slot in `triangles` for each survivor via `triangle_count`.
///
/// `triangles` is a raw pointer rather than `&mut [Triangle]`: every draw
/// call running concurrently shares the same backing allocation, and only
/// the single element each one reserves via `triangle_count.fetch_add` is
/// ever written, so no `&mut` reference spanning the whole buffer may
/// legally exist while other threads write their own slots. `triangles_len`
/// is the pre-grown capacity, used only to bounds-check `slot`.
pub(crate) fn process_draw_call(
    dc: &DrawCall,
    draw_id: u32,
    vertex_scratch: &[Vertex],
    triangles: *mut Triangle,
    triangles_len: usize,
    triangle_count: &AtomicUsize,
) {
    let v_cache = &vertex_scratch[dc.vertex_offset..dc.vertex_offset + dc.mesh.vertex_count()];

    for idx in &dc.mesh.indices {
        let v0 = &v_cache[idx[0] as usize];
        let v1 = &v_cache[idx[1] as usize];
        let v2 = &v_cache[idx[2] as usize];

        if v0.is_near_rejected() || v1.is_near_rejected() || v2.is_near_rejected() {
            continue;
        }

        let area = edge_function(v0.position.x, v0.position.y, v1.position.x, v1.position.y, v2.position.x, v2.position.y);

        if !area.is_finite() {
            continue;
        }
        match dc.cull_mode {
            CullMode::BackCcw if area <= 0.0 => continue,
            CullMode::BackCw if area >= 0.0 => continue,
            _ => {}
        }
        if area.abs() < DEGENERATE_AREA_EPSILON {
            continue;
        }

        let slot = triangle_count.fetch_add(1, Ordering::Relaxed);
        // Invariant (spec.md §3): triangle_count after assembly is <= the sum
        // of all draw calls' index_count/3, which `triangles` was pre-grown
        // to hold, so every reserved slot is in bounds.
        debug_assert!(slot < triangles_len);
        // SAFETY: `slot` was just reserved exclusively for this call by the
        // fetch_add above, so no other concurrently running draw call ever
        // writes (or holds a reference to) this element.
        unsafe {
            ptr::write(
                triangles.add(slot),
                Triangle {
                    vertices: [*v0, *v1, *v2],
                    draw_id,
                },
            );
        }
    }
}
