//! Tile binning: assigns each triangle to every screen tile its bounding box
//! overlaps, without any lock on the hot path.
//!
//! Single-threaded, in two passes over the assembled triangle array: the
//! first pass counts how many triangles land in each tile and prefix-sums
//! those counts into offsets, the second scatters triangle indices into
//! their tiles' slots. `Tile::triangle_count` is reused across the two
//! passes — first as a counter, then (after being zeroed by the prefix sum)
//! as the fill cursor — mirroring the original's single `triangle_count`
//! field doing double duty.

use log::trace;

use crate::triangle::Triangle;

/// A fixed screen-pixel rectangle and the slice of `tile_tri_indices` it
/// owns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tile {
    /// Left edge, inclusive.
    pub x0: u32,
    /// Top edge, inclusive.
    pub y0: u32,
    /// Right edge, exclusive.
    pub x1: u32,
    /// Bottom edge, exclusive.
    pub y1: u32,
    /// Offset into the shared `tile_tri_indices` array where this tile's
    /// bin begins.
    pub tri_offset: usize,
    /// Counter during pass 1 of binning, fill cursor during pass 2, final
    /// bin population once binning completes.
    pub triangle_count: usize,
}

/// Immutable tile-grid geometry, fixed for the renderer's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    pub tile_width: u32,
    pub tile_height: u32,
    pub count_x: u32,
    pub count_y: u32,
}

impl TileGrid {
    pub fn new(screen_width: u32, screen_height: u32, tile_width: u32, tile_height: u32) -> TileGrid {
        let count_x = screen_width.div_ceil(tile_width);
        let count_y = screen_height.div_ceil(tile_height);
        TileGrid { tile_width, tile_height, count_x, count_y }
    }

    pub fn tile_count(&self) -> usize {
        self.count_x as usize * self.count_y as usize
    }

    /// Builds the fixed array of tile rectangles, clipped to the screen.
    pub fn build_tiles(&self, screen_width: u32, screen_height: u32) -> Vec<Tile> {
        (0..self.tile_count())
            .map(|i| {
                let tx = (i as u32) % self.count_x;
                let ty = (i as u32) / self.count_x;
                Tile {
                    x0: tx * self.tile_width,
                    y0: ty * self.tile_height,
                    x1: ((tx + 1) * self.tile_width).min(screen_width),
                    y1: ((ty + 1) * self.tile_height).min(screen_height),
                    tri_offset: 0,
                    triangle_count: 0,
                }
            })
            .collect()
    }
}

/// Integer screen-space bounding box, inclusive on both ends.
#[derive(Debug, Clone, Copy)]
struct ScreenBounds {
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
}

fn triangle_bounds(tri: &Triangle) -> ScreenBounds {
    let [a, b, c] = &tri.vertices;
    let min_x = a.position.x.min(b.position.x).min(c.position.x);
    let max_x = a.position.x.max(b.position.x).max(c.position.x);
    let min_y = a.position.y.min(b.position.y).min(c.position.y);
    let max_y = a.position.y.max(b.position.y).max(c.position.y);

    ScreenBounds {
        min_x: min_x.floor() as i64,
        min_y: min_y.floor() as i64,
        max_x: max_x.ceil() as i64,
        max_y: max_y.ceil() as i64,
    }
}

fn tile_range(bounds: &ScreenBounds, grid: &TileGrid) -> (u32, u32, u32, u32) {
    let clamp_x = |v: i64| v.clamp(0, grid.count_x as i64 - 1) as u32;
    let clamp_y = |v: i64| v.clamp(0, grid.count_y as i64 - 1) as u32;

    let x0 = clamp_x(bounds.min_x / grid.tile_width as i64);
    let x1 = clamp_x(bounds.max_x / grid.tile_width as i64);
    let y0 = clamp_y(bounds.min_y / grid.tile_height as i64);
    let y1 = clamp_y(bounds.max_y / grid.tile_height as i64);

    (x0, x1, y0, y1)
}

/// Runs both binning passes against `tiles`, a grid built by
/// [`TileGrid::build_tiles`] (or a previous call to this function — the
/// first pass zeroes every tile's `triangle_count` before counting, so
/// calling this repeatedly on the same tile array across frames is safe).
pub(crate) fn bin_triangles(triangles: &[Triangle], tiles: &mut [Tile], tile_tri_indices: &mut Vec<u32>, grid: &TileGrid) {
    for tile in tiles.iter_mut() {
        tile.triangle_count = 0;
    }

    let mut total_bins = 0usize;

    for tri in triangles {
        let bounds = triangle_bounds(tri);
        let (x0, x1, y0, y1) = tile_range(&bounds, grid);

        for ty in y0..=y1 {
            for tx in x0..=x1 {
                tiles[(ty * grid.count_x + tx) as usize].triangle_count += 1;
                total_bins += 1;
            }
        }
    }

    tile_tri_indices.clear();
    let old_cap = tile_tri_indices.capacity();
    tile_tri_indices.resize(total_bins, 0);
    if tile_tri_indices.capacity() != old_cap {
        trace!("tile_tri_indices grew to {} slots", tile_tri_indices.capacity());
    }

    let mut offset = 0usize;
    for tile in tiles.iter_mut() {
        tile.tri_offset = offset;
        offset += tile.triangle_count;
        tile.triangle_count = 0;
    }

    // Invariant (spec.md §3): the prefix sum over every tile's bin
    // population accounts for exactly the bins counted in pass 1.
    debug_assert_eq!(offset, total_bins);

    for (tri_index, tri) in triangles.iter().enumerate() {
        let bounds = triangle_bounds(tri);
        let (x0, x1, y0, y1) = tile_range(&bounds, grid);

        for ty in y0..=y1 {
            for tx in x0..=x1 {
                let tile = &mut tiles[(ty * grid.count_x + tx) as usize];
                tile_tri_indices[tile.tri_offset + tile.triangle_count] = tri_index as u32;
                tile.triangle_count += 1;
            }
        }
    }
}
