//! Rasterizer: per-tile edge-function walk with incremental barycentric and
//! depth steps, depth test, and fragment shader dispatch.
//!
//! This is the floating-point edge-walk reference strategy of §4.5: direct
//! per-pixel `f32` barycentric weights with constant per-pixel/per-row step
//! values, sampled at half-pixel centers, with no top-left tie-break.

use std::ptr;

use crate::pipeline::binning::Tile;
use crate::shader::FragmentShaderFn;
use crate::triangle::{edge_function, Triangle};

/// Rasterizes every triangle bound to `tile`.
///
/// `shader_for(draw_id)` resolves a triangle's originating draw call to its
/// fragment shader and uniform snapshot; kept as a closure so this module
/// doesn't need to know about [`crate::draw_queue::DrawQueue`].
///
/// `color`/`depth` are raw pointers rather than `&mut [T]`: every tile
/// running concurrently shares the same backing planes, and tiles only
/// guarantee disjoint *pixels*, not a disjoint sub-slice of the full plane,
/// so no `&mut` reference spanning the whole plane may legally exist while
/// other tiles write their own pixels. `pixel_count` bounds-checks the
/// per-pixel index computed below.
pub(crate) fn process_tile<'u, F>(tile: &Tile, tile_tri_indices: &[u32], triangles: &[Triangle], shader_for: F, color: *mut u32, depth: *mut f32, pixel_count: usize, screen_width: u32) where
    F: Fn(u32) -> (FragmentShaderFn, &'u [u8]),
{
    for k in 0..tile.triangle_count {
        let tri_index = tile_tri_indices[tile.tri_offset + k] as usize;
        let tri = &triangles[tri_index];
        let (fragment_shader, uniforms) = shader_for(tri.draw_id);
        rasterize_triangle_in_tile(tile, tri, fragment_shader, uniforms, color, depth, pixel_count, screen_width);
    }
}

#[allow(clippy::too_many_arguments)]
fn rasterize_triangle_in_tile(
    tile: &Tile,
    tri: &Triangle,
    fragment_shader: FragmentShaderFn,
    uniforms: &[u8],
    color: *mut u32,
    depth: *mut f32,
    pixel_count: usize,
    screen_width: u32,
) {
    let [v0, v1, v2] = &tri.vertices;

    let bbox_min_x = v0.position.x.min(v1.position.x).min(v2.position.x).floor() as i64;
    let bbox_max_x = v0.position.x.max(v1.position.x).max(v2.position.x).ceil() as i64;
    let bbox_min_y = v0.position.y.min(v1.position.y).min(v2.position.y).floor() as i64;
    let bbox_max_y = v0.position.y.max(v1.position.y).max(v2.position.y).ceil() as i64;

    let min_x = bbox_min_x.max(tile.x0 as i64);
    let max_x = (bbox_max_x).min(tile.x1 as i64 - 1);
    let min_y = bbox_min_y.max(tile.y0 as i64);
    let max_y = (bbox_max_y).min(tile.y1 as i64 - 1);

    if min_x > max_x || min_y > max_y {
        return;
    }

    let area = edge_function(v0.position.x, v0.position.y, v1.position.x, v1.position.y, v2.position.x, v2.position.y);
    // Assembly enforces the draw call's cull mode; under `CullMode::None` a
    // triangle reaching here may have either winding, so only degenerate
    // (near-zero) or NaN-tainted area is rejected here, not sign. The
    // barycentric weights below stay correct for either sign of `area`
    // because `inv_area` carries the same sign, so `edge * inv_area` has a
    // consistent sign for interior points regardless of winding.
    if !area.is_finite() || area.abs() < 1e-6 {
        return;
    }
    let inv_area = 1.0 / area;

    let dw0_dx = (v2.position.y - v1.position.y) * inv_area;
    let dw1_dx = (v0.position.y - v2.position.y) * inv_area;
    let dw2_dx = (v1.position.y - v0.position.y) * inv_area;

    let dw0_dy = (v1.position.x - v2.position.x) * inv_area;
    let dw1_dy = (v2.position.x - v0.position.x) * inv_area;
    let dw2_dy = (v0.position.x - v1.position.x) * inv_area;

    let sample_x = min_x as f32 + 0.5;
    let sample_y = min_y as f32 + 0.5;

    let mut w0_row = edge_function(v1.position.x, v1.position.y, v2.position.x, v2.position.y, sample_x, sample_y) * inv_area;
    let mut w1_row = edge_function(v2.position.x, v2.position.y, v0.position.x, v0.position.y, sample_x, sample_y) * inv_area;
    let mut w2_row = edge_function(v0.position.x, v0.position.y, v1.position.x, v1.position.y, sample_x, sample_y) * inv_area;

    for y in min_y..=max_y {
        let mut l0 = w0_row;
        let mut l1 = w1_row;
        let mut l2 = w2_row;
        let row_base = y as usize * screen_width as usize;

        for x in min_x..=max_x {
            if l0 >= 0.0 && l1 >= 0.0 && l2 >= 0.0 {
                let z = l0 * v0.position.z + l1 * v1.position.z + l2 * v2.position.z;
                let idx = row_base + x as usize;
                debug_assert!(idx < pixel_count);

                // SAFETY: tiles partition the framebuffer into disjoint
                // pixel rectangles (see the raster job's safety comment in
                // pool.rs), so `idx` is never touched by another
                // concurrently running tile. The read-then-write here stays
                // scoped to this single pixel, never materializing a
                // reference to the rest of the plane.
                unsafe {
                    if z < *depth.add(idx) {
                        ptr::write(depth.add(idx), z);
                        ptr::write(color.add(idx), fragment_shader(tri, l0, l1, l2, uniforms));
                    }
                }
            }

            l0 += dw0_dx;
            l1 += dw1_dx;
            l2 += dw2_dx;
        }

        w0_row += dw0_dy;
        w1_row += dw1_dy;
        w2_row += dw2_dy;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vertex::Vertex;
    use nalgebra::Vector4;

    fn red_fs(_: &Triangle, _: f32, _: f32, _: f32, _: &[u8]) -> u32 {
        0xFF0000FF
    }

    fn vert(x: f32, y: f32, z: f32) -> Vertex {
        Vertex {
            position: Vector4::new(x, y, z, 1.0),
            ..Vertex::zeroed()
        }
    }

    #[test]
    fn single_triangle_paints_its_interior() {
        let tri = Triangle {
            vertices: [vert(1.0, 1.0, 0.5), vert(7.0, 1.0, 0.5), vert(4.0, 6.0, 0.5)],
            draw_id: 0,
        };
        let tiles = [Tile { x0: 0, y0: 0, x1: 8, y1: 8, tri_offset: 0, triangle_count: 1 }];
        let tile_tri_indices = [0u32];
        let mut color = vec![0u32; 64];
        let mut depth = vec![1.0f32; 64];

        process_tile(
            &tiles[0],
            &tile_tri_indices,
            std::slice::from_ref(&tri),
            |_| (red_fs as FragmentShaderFn, &[][..]),
            color.as_mut_ptr(),
            depth.as_mut_ptr(),
            color.len(),
            8,
        );

        assert!(color.iter().any(|&c| c == 0xFF0000FF));
        // outside the bounding box stays black
        assert_eq!(color[0], 0);
    }

    #[test]
    fn closer_triangle_wins_depth_test_regardless_of_submission_order() {
        let near = Triangle {
            vertices: [vert(0.0, 0.0, 0.3), vert(8.0, 0.0, 0.3), vert(0.0, 8.0, 0.3)],
            draw_id: 0,
        };
        let far = Triangle {
            vertices: [vert(0.0, 0.0, 0.7), vert(8.0, 0.0, 0.7), vert(0.0, 8.0, 0.7)],
            draw_id: 1,
        };
        fn blue_fs(_: &Triangle, _: f32, _: f32, _: f32, _: &[u8]) -> u32 {
            0x0000FFFF
        }

        let tile = Tile { x0: 0, y0: 0, x1: 8, y1: 8, tri_offset: 0, triangle_count: 2 };
        // far submitted (and thus depth-tested) before near, as S2 specifies.
        let triangles = [far, near];
        let tile_tri_indices = [0u32, 1u32];
        let mut color = vec![0u32; 64];
        let mut depth = vec![1.0f32; 64];

        process_tile(
            &tile,
            &tile_tri_indices,
            &triangles,
            |draw_id| {
                if draw_id == 0 { (blue_fs as FragmentShaderFn, &[][..]) } else { (red_fs as FragmentShaderFn, &[][..]) }
            },
            color.as_mut_ptr(),
            depth.as_mut_ptr(),
            color.len(),
            8,
        );

        assert_eq!(color[2 * 8 + 2], 0xFF0000FF);
    }
}
