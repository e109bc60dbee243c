//! Reduction context: the caller-owned session for column sums.
//!
//! A `ReduceContext` binds an [`Autotuner`] (and therefore its selection
//! cache) to an optional dedicated rayon pool. Its lifetime is the lifetime
//! of the cache; share it by reference or `Arc` across threads.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::autotune::{Autotuner, TuneReport, TuneSettings};
use crate::config::{Signature, TileConfig};
use crate::launch::launch;
use crate::types::{Element, InputData};
use crate::view::StridedMatrix;
use crate::{ColsumError, Result};

pub struct ReduceContext {
    tuner: Autotuner,
    pool: Option<Arc<ThreadPool>>,
}

impl ReduceContext {
    /// Context with default tune settings on the global rayon pool.
    pub fn new() -> Self {
        Self::with_tuner(Autotuner::default())
    }

    pub fn with_settings(settings: TuneSettings) -> Self {
        Self::with_tuner(Autotuner::new(settings))
    }

    pub fn with_tuner(tuner: Autotuner) -> Self {
        Self { tuner, pool: None }
    }

    /// Context configured from `COLSUM_*` environment variables.
    ///
    /// `COLSUM_THREADS` sizes a dedicated pool; the tuning variables are read
    /// by [`TuneSettings::from_env`].
    pub fn from_env() -> Result<Self> {
        let ctx = Self::with_settings(TuneSettings::from_env());
        match std::env::var("COLSUM_THREADS") {
            Ok(val) => match val.trim().parse::<usize>() {
                Ok(threads) => ctx.threads(threads),
                Err(e) => {
                    warn!(value = %val, error = %e, "ignoring non-numeric COLSUM_THREADS");
                    Ok(ctx)
                }
            },
            Err(_) => Ok(ctx),
        }
    }

    /// Run launches on a dedicated pool of `threads` workers.
    pub fn threads(self, threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("colsum-{i}"))
            .build()
            .map_err(|e| ColsumError::InvalidArgument(format!("failed to build thread pool: {e}")))?;
        info!(threads = pool.current_num_threads(), "Initialized colsum thread pool");
        Ok(self.pool(Arc::new(pool)))
    }

    /// Run launches on an existing pool.
    pub fn pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn autotuner(&self) -> &Autotuner {
        &self.tuner
    }

    pub fn thread_pool(&self) -> Option<&ThreadPool> {
        self.pool.as_deref()
    }

    /// Sum `x` over its rows into `out`, autotuning on first use of the
    /// signature. Returns the tile shape that produced `out`.
    pub fn reduce_rows<T: Element>(
        &self,
        out: &mut [f32],
        x: &StridedMatrix<'_, T>,
    ) -> Result<TileConfig> {
        check_output(out, x)?;
        let signature = Signature::new(x.rows(), x.cols(), T::DTYPE);
        let pool = self.thread_pool();
        let config = self
            .tuner
            .select(signature, |config| launch(x, out, config, pool))?;
        launch(x, out, &config, pool)?;
        Ok(config)
    }

    /// [`ReduceContext::reduce_rows`] for a runtime-tagged buffer.
    pub fn reduce_rows_dyn(
        &self,
        out: &mut [f32],
        input: InputData<'_>,
        rows: usize,
        cols: usize,
        row_stride: usize,
    ) -> Result<TileConfig> {
        match input {
            InputData::F32(data) => self.reduce_rows(out, &StridedMatrix::new(data, rows, cols, row_stride)?),
            InputData::F16(data) => self.reduce_rows(out, &StridedMatrix::new(data, rows, cols, row_stride)?),
            InputData::BF16(data) => self.reduce_rows(out, &StridedMatrix::new(data, rows, cols, row_stride)?),
        }
    }

    /// Benchmark every candidate for `x`'s signature, replace its cache
    /// entry, and leave the winner's result in `out`.
    pub fn tune<T: Element>(&self, out: &mut [f32], x: &StridedMatrix<'_, T>) -> Result<TuneReport> {
        check_output(out, x)?;
        let signature = Signature::new(x.rows(), x.cols(), T::DTYPE);
        let pool = self.thread_pool();
        let report = self
            .tuner
            .tune(signature, |config| launch(x, out, config, pool))?;
        launch(x, out, &report.best, pool)?;
        Ok(report)
    }

    /// Sum with an explicit tile shape, bypassing the autotuner.
    pub fn reduce_rows_with<T: Element>(
        &self,
        out: &mut [f32],
        x: &StridedMatrix<'_, T>,
        config: &TileConfig,
    ) -> Result<()> {
        launch(x, out, config, self.thread_pool())
    }
}

impl Default for ReduceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReduceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReduceContext")
            .field("tuner", &self.tuner)
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

fn check_output<T: Element>(out: &[f32], x: &StridedMatrix<'_, T>) -> Result<()> {
    if out.len() != x.cols() {
        return Err(ColsumError::ShapeMismatch {
            expected: vec![x.cols()],
            got: vec![out.len()],
        });
    }
    Ok(())
}

/// Sum an `m x n` matrix stored in `input` with row stride `row_stride`
/// into `output[..n]`.
///
/// The element type sets the reduced-precision half of the autotuning
/// signature.
pub fn reduce_rows<T: Element>(
    ctx: &ReduceContext,
    output: &mut [f32],
    input: &[T],
    row_stride: usize,
    m: usize,
    n: usize,
) -> Result<TileConfig> {
    let x = StridedMatrix::new(input, m, n, row_stride)?;
    ctx.reduce_rows(output, &x)
}
