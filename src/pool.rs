//! The fixed-size worker pool that drives the geometry, assembly, and
//! rasterization stages across threads, with the calling thread itself
//! participating as the last worker.
//!
//! Mirrors the reference implementation's single-barrier design: a shared
//! stage word, an `active_workers` countdown, and two condition variables
//! (`can_work`, `done_working`). Each run advances a `generation` counter so
//! a worker woken by a spurious wakeup (or one still finishing the previous
//! stage's countdown) can tell a fresh stage apart from the one it already
//! ran. Work items within a stage are drained through a single atomic
//! cursor (`next_item`), so a worker that finishes its share early steals
//! from slower peers rather than sitting idle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::arena::UniformArena;
use crate::draw_queue::DrawCall;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::binning::Tile;
use crate::pipeline::{assembly, geometry, raster};
use crate::triangle::Triangle;
use crate::vertex::Vertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Vertex,
    Assemble,
    Raster,
}

#[derive(Clone, Copy)]
struct VertexJob {
    draw_calls: *const DrawCall,
    draw_call_count: usize,
    uniform_arena: *const UniformArena,
    vertex_scratch: *mut Vertex,
    screen_width: u32,
    screen_height: u32,
    near_plane: f32,
}

#[derive(Clone, Copy)]
struct AssembleJob {
    draw_calls: *const DrawCall,
    draw_call_count: usize,
    vertex_scratch: *const Vertex,
    vertex_scratch_len: usize,
    triangles: *mut Triangle,
    triangles_capacity: usize,
    triangle_count: *const AtomicUsize,
}

#[derive(Clone, Copy)]
struct RasterJob {
    tiles: *const Tile,
    tile_count: usize,
    tile_tri_indices: *const u32,
    tile_tri_indices_len: usize,
    triangles: *const Triangle,
    triangle_count: usize,
    draw_calls: *const DrawCall,
    draw_call_count: usize,
    uniform_arena: *const UniformArena,
    color: *mut u32,
    depth: *mut f32,
    pixel_count: usize,
    screen_width: u32,
}

#[derive(Clone, Copy)]
enum StageJob {
    Vertex(VertexJob),
    Assemble(AssembleJob),
    Raster(RasterJob),
}

// SAFETY: a job's raw pointers are only ever dereferenced by workers that
// the pool's barrier guarantees run strictly between the job being
// installed and `run_stage` returning, over the exact ranges the job
// describes; see the per-stage `run_*_job` functions.
unsafe impl Send for StageJob {}

fn uniforms_for<'a>(arena: &'a UniformArena, dc: &DrawCall) -> &'a [u8] {
    match dc.uniforms {
        Some((offset, len)) => arena.read(offset, len),
        None => &[],
    }
}

fn run_vertex_job(job: &VertexJob, cursor: &AtomicUsize) {
    // SAFETY: valid for the duration of the Vertex stage; see StageJob's safety comment.
    let draw_calls = unsafe { std::slice::from_raw_parts(job.draw_calls, job.draw_call_count) };
    let arena = unsafe { &*job.uniform_arena };

    loop {
        let i = cursor.fetch_add(1, Ordering::Relaxed);
        if i >= draw_calls.len() {
            break;
        }
        let dc = &draw_calls[i];
        let uniforms = uniforms_for(arena, dc);

        // SAFETY: draw calls' vertex_offset..+vertex_count ranges are
        // disjoint by construction (DrawQueue::draw_mesh only ever grows
        // vertex_scratch), so no two workers ever touch the same vertex.
        let out = unsafe { std::slice::from_raw_parts_mut(job.vertex_scratch.add(dc.vertex_offset), dc.mesh.vertex_count()) };

        geometry::process_draw_call(dc, uniforms, out, job.screen_width, job.screen_height, job.near_plane);
    }
}

fn run_assemble_job(job: &AssembleJob, cursor: &AtomicUsize) {
    let draw_calls = unsafe { std::slice::from_raw_parts(job.draw_calls, job.draw_call_count) };
    let vertex_scratch = unsafe { std::slice::from_raw_parts(job.vertex_scratch, job.vertex_scratch_len) };
    let triangle_count = unsafe { &*job.triangle_count };

    loop {
        let i = cursor.fetch_add(1, Ordering::Relaxed);
        if i >= draw_calls.len() {
            break;
        }
        let dc = &draw_calls[i];

        // `job.triangles` stays a raw pointer all the way into
        // `assembly::process_draw_call`: every write goes through a slot
        // `triangle_count.fetch_add` handed out exclusively to this call, so
        // concurrent assembly jobs never write the same element, but a
        // `&mut [Triangle]` spanning the whole buffer would still alias
        // every other job's identical, concurrently-held slice.
        assembly::process_draw_call(dc, i as u32, vertex_scratch, job.triangles, job.triangles_capacity, triangle_count);
    }
}

fn run_raster_job(job: &RasterJob, cursor: &AtomicUsize) {
    let tiles = unsafe { std::slice::from_raw_parts(job.tiles, job.tile_count) };
    let tile_tri_indices = unsafe { std::slice::from_raw_parts(job.tile_tri_indices, job.tile_tri_indices_len) };
    let triangles = unsafe { std::slice::from_raw_parts(job.triangles, job.triangle_count) };
    let draw_calls = unsafe { std::slice::from_raw_parts(job.draw_calls, job.draw_call_count) };
    let arena = unsafe { &*job.uniform_arena };

    loop {
        let i = cursor.fetch_add(1, Ordering::Relaxed);
        if i >= tiles.len() {
            break;
        }
        let tile = &tiles[i];

        // `job.color`/`job.depth` stay raw pointers all the way into
        // `raster::process_tile`: tiles partition the framebuffer into
        // disjoint pixel rectangles, so concurrent raster jobs never touch
        // the same pixel, but a `&mut [T]` spanning the whole plane would
        // still alias every other job's identical, concurrently-held slice.
        raster::process_tile(
            tile,
            tile_tri_indices,
            triangles,
            |draw_id| {
                let dc = &draw_calls[draw_id as usize];
                (dc.fragment_shader, uniforms_for(arena, dc))
            },
            job.color,
            job.depth,
            job.pixel_count,
            job.screen_width,
        );
    }
}

fn run_job(stage: Stage, job: Option<StageJob>, cursor: &AtomicUsize) {
    match (stage, job) {
        (Stage::Vertex, Some(StageJob::Vertex(j))) => run_vertex_job(&j, cursor),
        (Stage::Assemble, Some(StageJob::Assemble(j))) => run_assemble_job(&j, cursor),
        (Stage::Raster, Some(StageJob::Raster(j))) => run_raster_job(&j, cursor),
        _ => {}
    }
}

struct PoolState {
    stage: Stage,
    job: Option<StageJob>,
    generation: u64,
    active_workers: usize,
    shutdown: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    can_work: Condvar,
    done_working: Condvar,
    next_item: AtomicUsize,
}

/// A fixed pool of OS threads that cooperatively execute one pipeline stage
/// at a time, plus the calling thread, which always runs the final share of
/// work itself rather than sitting idle waiting on its helpers.
pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
    threads: Vec<thread::JoinHandle<()>>,
    /// Total participants in a stage, including the calling thread.
    worker_count: usize,
}

impl WorkerPool {
    /// Spawns `worker_count.saturating_sub(1)` background threads; the
    /// calling thread always counts as the final participant.
    pub fn new(worker_count: usize) -> RenderResult<WorkerPool> {
        let worker_count = worker_count.max(1);

        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                stage: Stage::Idle,
                job: None,
                generation: 0,
                active_workers: 0,
                shutdown: false,
            }),
            can_work: Condvar::new(),
            done_working: Condvar::new(),
            next_item: AtomicUsize::new(0),
        });

        let mut threads = Vec::with_capacity(worker_count - 1);
        for _ in 0..worker_count - 1 {
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name("tilecaster-worker".into())
                .spawn(move || worker_loop(inner))
                .map_err(RenderError::PoolStartup)?;
            threads.push(handle);
        }

        debug!("worker pool started with {worker_count} participants ({} spawned)", threads.len());

        Ok(WorkerPool { inner, threads, worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn run_stage(&self, stage: Stage, job: StageJob, item_count: usize) {
        if item_count == 0 {
            return;
        }

        trace!("worker pool entering {stage:?} with {item_count} items");

        {
            let mut state = self.inner.state.lock();
            state.stage = stage;
            state.job = Some(job);
            state.generation += 1;
            state.active_workers = self.worker_count;
            self.inner.next_item.store(0, Ordering::Relaxed);
        }
        self.inner.can_work.notify_all();

        run_job(stage, Some(job), &self.inner.next_item);

        let mut state = self.inner.state.lock();
        state.active_workers -= 1;
        while state.active_workers != 0 {
            self.inner.done_working.wait(&mut state);
        }
        state.stage = Stage::Idle;
        state.job = None;

        trace!("worker pool left {stage:?}");
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_vertex_stage(&self, draw_calls: &[DrawCall], uniform_arena: &UniformArena, vertex_scratch: &mut [Vertex], screen_width: u32, screen_height: u32, near_plane: f32) {
        let job = VertexJob {
            draw_calls: draw_calls.as_ptr(),
            draw_call_count: draw_calls.len(),
            uniform_arena,
            vertex_scratch: vertex_scratch.as_mut_ptr(),
            screen_width,
            screen_height,
            near_plane,
        };
        self.run_stage(Stage::Vertex, StageJob::Vertex(job), draw_calls.len());
    }

    pub(crate) fn run_assemble_stage(&self, draw_calls: &[DrawCall], vertex_scratch: &[Vertex], triangles: &mut [Triangle], triangle_count: &AtomicUsize) {
        let job = AssembleJob {
            draw_calls: draw_calls.as_ptr(),
            draw_call_count: draw_calls.len(),
            vertex_scratch: vertex_scratch.as_ptr(),
            vertex_scratch_len: vertex_scratch.len(),
            triangles: triangles.as_mut_ptr(),
            triangles_capacity: triangles.len(),
            triangle_count,
        };
        self.run_stage(Stage::Assemble, StageJob::Assemble(job), draw_calls.len());
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_raster_stage(&self, tiles: &[Tile], tile_tri_indices: &[u32], triangles: &[Triangle], draw_calls: &[DrawCall], uniform_arena: &UniformArena, color: &mut [u32], depth: &mut [f32], screen_width: u32) {
        let job = RasterJob {
            tiles: tiles.as_ptr(),
            tile_count: tiles.len(),
            tile_tri_indices: tile_tri_indices.as_ptr(),
            tile_tri_indices_len: tile_tri_indices.len(),
            triangles: triangles.as_ptr(),
            triangle_count: triangles.len(),
            draw_calls: draw_calls.as_ptr(),
            draw_call_count: draw_calls.len(),
            uniform_arena,
            color: color.as_mut_ptr(),
            depth: depth.as_mut_ptr(),
            pixel_count: color.len(),
            screen_width,
        };
        self.run_stage(Stage::Raster, StageJob::Raster(job), tiles.len());
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        debug!("worker pool shutting down ({} threads)", self.threads.len());

        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.generation += 1;
        }
        self.inner.can_work.notify_all();

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    let mut last_seen_generation = 0u64;

    loop {
        let (stage, job) = {
            let mut state = inner.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if state.generation != last_seen_generation && state.stage != Stage::Idle {
                    break;
                }
                inner.can_work.wait(&mut state);
            }
            last_seen_generation = state.generation;
            (state.stage, state.job)
        };

        run_job(stage, job, &inner.next_item);

        let mut state = inner.state.lock();
        state.active_workers -= 1;
        if state.active_workers == 0 {
            inner.done_working.notify_one();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::Mesh;
    use crate::vertex::CullMode;
    use nalgebra::{Vector3, Vector4};
    use std::sync::Arc as StdArc;

    fn write_index_vs(index: usize, _mesh: &Mesh, out: &mut Vertex, _uniforms: &[u8]) {
        out.position = Vector4::new(0.0, 0.0, 0.5, 1.0);
        out.world_position = Vector3::new(index as f32, 0.0, 0.0);
    }

    fn fs_stub(_: &Triangle, _: f32, _: f32, _: f32, _: &[u8]) -> u32 {
        0
    }

    fn one_vertex_mesh() -> StdArc<Mesh> {
        StdArc::new(Mesh {
            positions: vec![Vector3::zeros()],
            normals: vec![Vector3::zeros()],
            uvs: vec![(0.0, 0.0)],
            colors: vec![0],
            indices: vec![],
        })
    }

    #[test]
    fn vertex_stage_distributes_draw_calls_across_workers() {
        let pool = WorkerPool::new(4).unwrap();
        let mesh = one_vertex_mesh();
        let arena = UniformArena::new();

        let draw_calls: Vec<DrawCall> = (0..17)
            .map(|i| DrawCall {
                mesh: StdArc::clone(&mesh),
                vertex_shader: write_index_vs,
                fragment_shader: fs_stub,
                cull_mode: CullMode::None,
                vertex_offset: i,
                uniforms: None,
            })
            .collect();

        let mut vertex_scratch = vec![Vertex::zeroed(); draw_calls.len()];

        pool.run_vertex_stage(&draw_calls, &arena, &mut vertex_scratch, 64, 64, 0.1);

        for (i, v) in vertex_scratch.iter().enumerate() {
            assert_eq!(v.world_position.x, i as f32);
            assert!(!v.is_near_rejected());
        }
    }

    #[test]
    fn single_worker_pool_still_completes_the_stage() {
        let pool = WorkerPool::new(1).unwrap();
        assert_eq!(pool.worker_count(), 1);

        let mesh = one_vertex_mesh();
        let arena = UniformArena::new();
        let draw_calls = vec![DrawCall {
            mesh,
            vertex_shader: write_index_vs,
            fragment_shader: fs_stub,
            cull_mode: CullMode::None,
            vertex_offset: 0,
            uniforms: None,
        }];
        let mut vertex_scratch = vec![Vertex::zeroed(); 1];

        pool.run_vertex_stage(&draw_calls, &arena, &mut vertex_scratch, 8, 8, 0.1);

        assert!(!vertex_scratch[0].is_near_rejected());
    }

    #[test]
    fn empty_stage_is_a_no_op() {
        let pool = WorkerPool::new(2).unwrap();
        let arena = UniformArena::new();
        let mut empty: Vec<Vertex> = Vec::new();
        pool.run_vertex_stage(&[], &arena, &mut empty, 8, 8, 0.1);
    }
}
