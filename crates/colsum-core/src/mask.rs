//! Masked tile loads and stores.
//!
//! A tile is `block_m x block_n` elements anchored at `(m0, col0)`. Positions
//! past the matrix edge read as `0.0` and are never written back, which is
//! what lets every tile shape handle every matrix shape without a separate
//! boundary path.

use crate::config::TileConfig;
use crate::types::Element;
use crate::view::StridedMatrix;

/// In-bounds region of a tile.
///
/// Row and column validity are each a prefix (`m0 + r < M`, `col0 + c < N`),
/// so the combined mask is the leading `rows x cols` corner of the tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileMask {
    pub rows: usize,
    pub cols: usize,
}

impl TileMask {
    pub fn new(m0: usize, col0: usize, config: &TileConfig, rows: usize, cols: usize) -> Self {
        Self {
            rows: rows.saturating_sub(m0).min(config.block_m),
            cols: cols.saturating_sub(col0).min(config.block_n),
        }
    }

    /// Column-only mask, used for the final store.
    pub fn columns(col0: usize, config: &TileConfig, cols: usize) -> usize {
        cols.saturating_sub(col0).min(config.block_n)
    }
}

/// Load the tile at `(m0, col0)` into `tile` (row-major, `block_n` wide),
/// widening to `f32` and zero-filling every masked-out position.
pub fn masked_load<T: Element>(
    x: &StridedMatrix<'_, T>,
    m0: usize,
    col0: usize,
    mask: TileMask,
    block_n: usize,
    tile: &mut [f32],
) {
    for (r, dst) in tile.chunks_exact_mut(block_n).enumerate() {
        if r >= mask.rows {
            dst.fill(0.0);
            continue;
        }
        let src = &x.row(m0 + r)[col0..col0 + mask.cols];
        let (valid, padding) = dst.split_at_mut(mask.cols);
        for (d, &s) in valid.iter_mut().zip(src) {
            *d = s.to_f32();
        }
        padding.fill(0.0);
    }
}

/// Write the first `valid` lanes of `values` into `dst`; later lanes are
/// dropped.
pub fn masked_store(dst: &mut [f32], values: &[f32], valid: usize) {
    dst[..valid].copy_from_slice(&values[..valid]);
}
