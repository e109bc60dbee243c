//! Per-unit column-sum kernel.
//!
//! One parallel unit owns `block_n` consecutive output columns. It walks the
//! rows in `block_m`-high tiles, loading each tile through the masked loader
//! and folding its row sum into a compensated `f32` accumulator, then stores
//! the valid lanes once at the end.

use smallvec::SmallVec;

use crate::config::TileConfig;
use crate::mask::{TileMask, masked_load, masked_store};
use crate::types::Element;
use crate::view::StridedMatrix;

/// Compensated running sums, one `(sum, comp)` pair per slot.
///
/// The compensation term carries the low-order bits the `f32` sum could not
/// hold.
#[derive(Debug, Default)]
struct RunningSums {
    sums: SmallVec<[f32; 32]>,
    comps: SmallVec<[f32; 32]>,
}

impl RunningSums {
    fn reset(&mut self, len: usize) {
        self.sums.clear();
        self.sums.resize(len, 0.0);
        self.comps.clear();
        self.comps.resize(len, 0.0);
    }

    #[inline]
    fn add(&mut self, slot: usize, value: f32) {
        neumaier_add(&mut self.sums[slot], &mut self.comps[slot], value);
    }

    /// Fold every compensation into its sum and return the sums.
    fn finish(&mut self) -> &[f32] {
        for (sum, &comp) in self.sums.iter_mut().zip(&self.comps) {
            *sum = fold_compensation(*sum, comp);
        }
        &self.sums
    }
}

/// Working buffers for one unit, reused across units run by the same worker.
#[derive(Debug, Default)]
pub struct UnitScratch {
    tile: Vec<f32>,
    partials: RunningSums,
    acc: RunningSums,
}

impl UnitScratch {
    pub fn new(config: &TileConfig) -> Self {
        let mut scratch = Self::default();
        scratch.reset(config);
        scratch
    }

    fn reset(&mut self, config: &TileConfig) {
        self.tile.resize(config.tile_elems(), 0.0);
        self.partials.reset(config.lanes * config.block_n);
        self.acc.reset(config.block_n);
    }
}

/// Sum rows of `x` for the columns owned by `unit_id`, writing into `out`.
///
/// `out` is the unit's slice of the output vector, starting at column
/// `unit_id * block_n`; only the in-bounds columns are written.
pub fn reduce_unit<T: Element>(
    x: &StridedMatrix<'_, T>,
    unit_id: usize,
    config: &TileConfig,
    out: &mut [f32],
    scratch: &mut UnitScratch,
) {
    let col0 = unit_id * config.block_n;
    let valid = TileMask::columns(col0, config, x.cols());
    debug_assert!(out.len() >= valid, "output slice shorter than unit width");

    scratch.reset(config);
    for step in 0..config.row_tiles(x.rows()) {
        let m0 = step * config.block_m;
        let mask = TileMask::new(m0, col0, config, x.rows(), x.cols());
        masked_load(x, m0, col0, mask, config.block_n, &mut scratch.tile);
        accumulate_tile(
            &scratch.tile,
            mask.rows,
            config,
            &mut scratch.partials,
            &mut scratch.acc,
        );
    }

    masked_store(out, scratch.acc.finish(), valid);
}

/// Add the column sums of the first `rows` rows of a loaded tile into `acc`.
///
/// Row `r` goes to lane `r % lanes`; lanes are combined in order once the
/// whole tile is consumed. Rows past `rows` are masked zeros and skipped.
fn accumulate_tile(
    tile: &[f32],
    rows: usize,
    config: &TileConfig,
    partials: &mut RunningSums,
    acc: &mut RunningSums,
) {
    let block_n = config.block_n;
    partials.reset(config.lanes * block_n);

    for (r, row) in tile.chunks_exact(block_n).take(rows).enumerate() {
        let base = (r % config.lanes) * block_n;
        for (c, &v) in row.iter().enumerate() {
            partials.add(base + c, v);
        }
    }

    for (slot, (&sum, &comp)) in partials.sums.iter().zip(&partials.comps).enumerate() {
        acc.add(slot % block_n, sum);
        if comp.is_finite() {
            acc.add(slot % block_n, comp);
        }
    }
}

/// Compensated add: `sum + comp` tracks the running total to roughly twice
/// `f32` precision, independent of the number of addends.
#[inline]
fn neumaier_add(sum: &mut f32, comp: &mut f32, value: f32) {
    let t = *sum + value;
    if sum.abs() >= value.abs() {
        *comp += (*sum - t) + value;
    } else {
        *comp += (value - t) + *sum;
    }
    *sum = t;
}

/// Fold the compensation back in. An infinite sum leaves a NaN
/// compensation behind; the sum is returned as is then.
#[inline]
fn fold_compensation(sum: f32, comp: f32) -> f32 {
    if comp.is_finite() { sum + comp } else { sum }
}
