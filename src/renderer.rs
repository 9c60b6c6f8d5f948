//! The top-level renderer: owns persistent buffers and the worker pool,
//! and drives per-frame recording and the pipeline stages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::draw_queue::DrawQueue;
use crate::error::{RenderError, RenderResult};
use crate::framebuffer::Framebuffer;
use crate::mesh::Mesh;
use crate::pipeline::binning::{self, Tile, TileGrid};
use crate::pool::WorkerPool;
use crate::shader::{FragmentShaderFn, VertexShaderFn};
use crate::triangle::Triangle;
use crate::vertex::{CullMode, Vertex};

/// Construction parameters for a [`Renderer`].
///
/// `Default` gives a modest 640x480 framebuffer, 64x64 tiles, one worker
/// per logical CPU, and the reference near plane of `0.1`.
#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub thread_count: usize,
    pub near_plane: f32,
}

impl RendererConfig {
    /// A config for the given dimensions with every other field defaulted,
    /// mirroring the reference implementation's flat
    /// `renderer_create(width, height, thread_count, tile_width, tile_height)`
    /// signature for drop-in familiarity.
    pub fn new(width: u32, height: u32) -> RendererConfig {
        RendererConfig { width, height, ..RendererConfig::default() }
    }
}

impl Default for RendererConfig {
    fn default() -> RendererConfig {
        RendererConfig {
            width: 640,
            height: 480,
            tile_width: 64,
            tile_height: 64,
            thread_count: num_cpus::get(),
            near_plane: 0.1,
        }
    }
}

/// A tile-binned, multithreaded software rasterizer.
///
/// Allocates its framebuffer, tile grid, and worker pool once at
/// construction and reuses them for the renderer's entire lifetime;
/// per-frame state (draw calls, vertex scratch, triangle array, uniform
/// arena, tile bins) resets at the start of each frame and grows with
/// amortized doubling as needed.
pub struct Renderer {
    framebuffer: Framebuffer,
    draw_queue: DrawQueue,
    tile_grid: TileGrid,
    tiles: Vec<Tile>,
    tile_tri_indices: Vec<u32>,
    triangles: Vec<Triangle>,
    triangle_count: AtomicUsize,
    pool: WorkerPool,
    near_plane: f32,
}

impl Renderer {
    /// Creates a renderer with [`RendererConfig::default`] dimensions
    /// overridden by `width`/`height`.
    pub fn create(width: u32, height: u32) -> RenderResult<Renderer> {
        Renderer::with_config(RendererConfig::new(width, height))
    }

    /// Creates a renderer from a fully specified configuration, validating
    /// dimensions and spawning the worker pool.
    pub fn with_config(config: RendererConfig) -> RenderResult<Renderer> {
        if config.width == 0 || config.height == 0 {
            return Err(RenderError::InvalidDimensions { width: config.width, height: config.height });
        }
        if config.tile_width == 0 || config.tile_height == 0 {
            return Err(RenderError::ZeroTileSize);
        }

        let tile_grid = TileGrid::new(config.width, config.height, config.tile_width, config.tile_height);
        let tiles = tile_grid.build_tiles(config.width, config.height);

        debug!(
            "creating renderer: {}x{}, {} tiles, {} workers",
            config.width,
            config.height,
            tiles.len(),
            config.thread_count
        );

        let pool = WorkerPool::new(config.thread_count).inspect_err(|err| {
            log::error!("worker pool failed to start: {err}");
        })?;

        Ok(Renderer {
            framebuffer: Framebuffer::new(config.width, config.height),
            draw_queue: DrawQueue::new(),
            tile_grid,
            tiles,
            tile_tri_indices: Vec::new(),
            triangles: Vec::new(),
            triangle_count: AtomicUsize::new(0),
            pool,
            near_plane: config.near_plane,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.framebuffer.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.framebuffer.height()
    }

    /// Number of worker-pool participants (background threads plus the
    /// calling thread) this renderer was spawned with.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Fills color and depth planes.
    pub fn clear(&mut self, color: u32, depth: f32) {
        self.framebuffer.clear(color, depth);
    }

    /// Zeros per-frame counters (draw calls, vertex scratch, uniform arena,
    /// triangle count); backing allocations retain their capacity.
    pub fn reset(&mut self) {
        self.draw_queue.reset();
        self.triangle_count.store(0, Ordering::Relaxed);
    }

    /// Sets the uniform bytes that subsequent `draw_mesh` calls will
    /// snapshot.
    pub fn set_uniforms(&mut self, bytes: &[u8]) {
        self.draw_queue.set_uniforms(bytes);
    }

    /// Sets the vertex/fragment shader pair subsequent `draw_mesh` calls
    /// will record.
    pub fn set_shaders(&mut self, vertex_shader: VertexShaderFn, fragment_shader: FragmentShaderFn) {
        self.draw_queue.set_shaders(vertex_shader, fragment_shader);
    }

    /// Sets the cull mode subsequent `draw_mesh` calls will record.
    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.draw_queue.set_cull_mode(mode);
    }

    /// Records a draw call for `mesh` using the currently set shaders, cull
    /// mode, and uniform snapshot. Returns `false` (and records nothing) if
    /// no shader pair has been set yet.
    pub fn draw_mesh(&mut self, mesh: Arc<Mesh>) -> bool {
        self.draw_queue.draw_mesh(mesh)
    }

    /// Runs the geometry, assembly, and binning stages over every draw call
    /// recorded since the last [`Renderer::reset`], returning the number of
    /// triangles assembly produced.
    pub fn bin_triangles(&mut self) -> usize {
        let draw_calls = self.draw_queue.draw_calls();
        if draw_calls.is_empty() {
            self.tile_tri_indices.clear();
            for tile in &mut self.tiles {
                tile.triangle_count = 0;
            }
            return 0;
        }

        let width = self.framebuffer.width();
        let height = self.framebuffer.height();
        let near_plane = self.near_plane;

        self.pool.run_vertex_stage(
            draw_calls,
            self.draw_queue.uniform_arena(),
            self.draw_queue.vertex_scratch_mut(),
            width,
            height,
            near_plane,
        );

        let worst_case = self.draw_queue.total_max_triangles();
        if self.triangles.len() < worst_case {
            self.triangles.resize(worst_case, Triangle { vertices: [Vertex::zeroed(); 3], draw_id: 0 });
            trace!("triangle array grew to {worst_case} triangles");
        }
        self.triangle_count.store(0, Ordering::Relaxed);

        self.pool.run_assemble_stage(draw_calls, self.draw_queue.vertex_scratch(), &mut self.triangles, &self.triangle_count);

        let triangle_count = self.triangle_count.load(Ordering::Relaxed);
        trace!("assembled {triangle_count} triangles from {} draw calls", draw_calls.len());

        binning::bin_triangles(&self.triangles[..triangle_count], &mut self.tiles, &mut self.tile_tri_indices, &self.tile_grid);

        triangle_count
    }

    /// Runs the raster stage over every tile, using the bins produced by the
    /// most recent [`Renderer::bin_triangles`] call.
    pub fn rasterize(&mut self) {
        let triangle_count = self.triangle_count.load(Ordering::Relaxed);
        let draw_calls = self.draw_queue.draw_calls();
        let screen_width = self.framebuffer.width();
        let (color, depth) = self.framebuffer.planes_mut();

        self.pool.run_raster_stage(
            &self.tiles,
            &self.tile_tri_indices,
            &self.triangles[..triangle_count],
            draw_calls,
            self.draw_queue.uniform_arena(),
            color,
            depth,
            screen_width,
        );
    }

    /// Read-only view of the color plane, row-major, `width() * height()` long.
    pub fn color_buffer(&self) -> &[u32] {
        self.framebuffer.color()
    }

    /// Read-only view of the depth plane, row-major, `width() * height()` long.
    pub fn depth_buffer(&self) -> &[f32] {
        self.framebuffer.depth()
    }
}
