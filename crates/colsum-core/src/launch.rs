//! Column-tile dispatch.
//!
//! A launch splits the output into `block_n`-wide chunks and runs one
//! [`reduce_unit`] per chunk on a rayon pool. Chunks are disjoint, so units
//! never contend on output and need no synchronization.

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::config::TileConfig;
use crate::kernel::{UnitScratch, reduce_unit};
use crate::types::Element;
use crate::view::StridedMatrix;
use crate::{ColsumError, Result};

/// Run the kernel over every column tile of `x` with a fixed tile shape.
///
/// `out` must have exactly `x.cols()` elements. Uses `pool` when given,
/// otherwise the global rayon pool.
pub fn launch<T: Element>(
    x: &StridedMatrix<'_, T>,
    out: &mut [f32],
    config: &TileConfig,
    pool: Option<&ThreadPool>,
) -> Result<()> {
    config.validate().map_err(|e| ColsumError::Launch {
        config: *config,
        reason: e.to_string(),
    })?;
    if out.len() != x.cols() {
        return Err(ColsumError::ShapeMismatch {
            expected: vec![x.cols()],
            got: vec![out.len()],
        });
    }
    if out.is_empty() {
        return Ok(());
    }

    let mut run = || {
        out.par_chunks_mut(config.block_n)
            .enumerate()
            .for_each_init(
                || UnitScratch::new(config),
                |scratch, (unit_id, chunk)| reduce_unit(x, unit_id, config, chunk, scratch),
            );
    };
    match pool {
        Some(pool) => pool.install(run),
        None => run(),
    }
    Ok(())
}
