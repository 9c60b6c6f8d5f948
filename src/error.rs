//! Error types returned by the renderer's fallible setup paths.

use thiserror::Error;

/// Errors the renderer can report.
///
/// Per-frame recording and rendering never fail once a [`Renderer`](crate::renderer::Renderer)
/// is constructed; a draw call with no shader set is silently dropped rather
/// than reported here, matching the reference implementation's contract.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Width or height was zero.
    #[error("invalid framebuffer dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },

    /// Tile width or height was zero.
    #[error("tile dimensions must be non-zero")]
    ZeroTileSize,

    /// The worker pool failed to spawn one of its threads.
    #[error("worker pool failed to start: {0}")]
    PoolStartup(#[from] std::io::Error),
}

/// Convenience alias for fallible renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
