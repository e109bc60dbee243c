//! Tiled column-sum reduction over strided 2-D buffers.
//!
//! `colsum-core` sums an `M x N` matrix along its leading (strided) dimension
//! into an `f32` vector of length `N`. The work is split into column tiles,
//! one independent parallel unit per tile, and each unit walks the rows in
//! fixed-height row tiles. The tile shape is picked per problem signature by
//! benchmarking a fixed candidate table and caching the winner.
//!
//! # Layers
//!
//! - [`mask`]: zero-filling masked tile loads and skip-on-invalid stores
//! - [`kernel`]: the per-unit row-tile loop
//! - [`launch`]: column-tile dispatch onto a rayon pool
//! - [`autotune`]: candidate benchmarking and the per-signature cache
//! - [`context`]: the caller-owned session tying the above together
//!
//! Accumulation is always `f32`, regardless of whether the input is `f16`,
//! `bf16` or `f32`.

pub mod autotune;
pub mod config;
pub mod context;
pub mod kernel;
pub mod launch;
pub mod mask;
pub mod reference;
pub mod types;
pub mod view;

pub use autotune::{Autotuner, CandidateTiming, FailurePolicy, TuneMode, TuneReport, TuneSettings};
pub use config::{CANDIDATES, Signature, TileConfig};
pub use context::{ReduceContext, reduce_rows};
pub use types::{DType, Element, InputData};
pub use view::StridedMatrix;

pub type Result<T> = std::result::Result<T, ColsumError>;

#[derive(thiserror::Error, Debug)]
pub enum ColsumError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Row stride {stride} is smaller than column count {cols}")]
    InvalidStride { stride: usize, cols: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Launch failed for {config}: {reason}")]
    Launch { config: TileConfig, reason: String },

    #[error("No viable tile configuration for {signature}")]
    NoViableCandidate { signature: Signature },
}
