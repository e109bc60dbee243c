//! Tile-shape autotuning and the per-signature selection cache.
//!
//! The first time a [`Signature`] is seen, every candidate tile shape is run
//! end to end on the caller's data and timed; the fastest one is cached and
//! reused for every later call with the same signature. Entries are never
//! evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

use crate::config::{CANDIDATES, Signature, TileConfig};
use crate::{ColsumError, Result};

/// What to do when a candidate fails to launch while benchmarking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort selection for the signature and return the failure.
    #[default]
    Abort,
    /// Log the failure and drop the candidate from consideration.
    Skip,
}

/// How a configuration is chosen for an unseen signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TuneMode {
    /// Benchmark every candidate and keep the fastest.
    #[default]
    Benchmark,
    /// Always use the given configuration, no benchmarking.
    Fixed(TileConfig),
}

/// Benchmarking knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TuneSettings {
    /// Untimed launches per candidate before measuring.
    pub warmup: u32,
    /// Timed launches per candidate; the median is the candidate's cost.
    pub iterations: u32,
    pub on_failure: FailurePolicy,
    pub mode: TuneMode,
}

impl Default for TuneSettings {
    fn default() -> Self {
        Self {
            warmup: 1,
            iterations: 3,
            on_failure: FailurePolicy::Abort,
            mode: TuneMode::Benchmark,
        }
    }
}

impl TuneSettings {
    /// Defaults overridden by `COLSUM_*` environment variables.
    ///
    /// - `COLSUM_TUNE`: `off|0|false|fixed` pins the first candidate,
    ///   `on|1|true|bench` benchmarks
    /// - `COLSUM_TILE`: `<block_m>x<block_n>[x<lanes>]` pins that shape
    /// - `COLSUM_TUNE_WARMUP`, `COLSUM_TUNE_ITERS`: repetition counts
    /// - `COLSUM_TUNE_ON_FAILURE`: `abort` or `skip`
    ///
    /// Unrecognized values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TuneSettings::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(val) = lookup("COLSUM_TUNE") {
            match val.trim().to_ascii_lowercase().as_str() {
                "off" | "0" | "false" | "fixed" => settings.mode = TuneMode::Fixed(CANDIDATES[0]),
                "on" | "1" | "true" | "bench" => settings.mode = TuneMode::Benchmark,
                other => warn!(value = other, "ignoring unrecognized COLSUM_TUNE"),
            }
        }

        if let Some(val) = lookup("COLSUM_TILE") {
            match val.parse::<TileConfig>() {
                Ok(config) => settings.mode = TuneMode::Fixed(config),
                Err(e) => warn!(error = %e, "ignoring COLSUM_TILE"),
            }
        }

        if let Some(n) = parse_count(&lookup, "COLSUM_TUNE_WARMUP") {
            settings.warmup = n;
        }
        if let Some(n) = parse_count(&lookup, "COLSUM_TUNE_ITERS") {
            settings.iterations = n.max(1);
        }

        if let Some(val) = lookup("COLSUM_TUNE_ON_FAILURE") {
            match val.trim().to_ascii_lowercase().as_str() {
                "abort" => settings.on_failure = FailurePolicy::Abort,
                "skip" => settings.on_failure = FailurePolicy::Skip,
                other => warn!(value = other, "ignoring unrecognized COLSUM_TUNE_ON_FAILURE"),
            }
        }

        settings
    }
}

fn parse_count(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u32> {
    let val = lookup(key)?;
    match val.trim().parse::<u32>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(key, value = %val, error = %e, "ignoring non-numeric override");
            None
        }
    }
}

/// Timing of one candidate.
#[derive(Clone, Debug, Serialize)]
pub struct CandidateTiming {
    pub config: TileConfig,
    pub median: Duration,
    pub min: Duration,
    pub max: Duration,
    pub iterations: u32,
}

/// Outcome of benchmarking every candidate for one signature.
#[derive(Clone, Debug, Serialize)]
pub struct TuneReport {
    pub signature: Signature,
    pub timings: Vec<CandidateTiming>,
    pub best: TileConfig,
}

impl TuneReport {
    pub fn best_timing(&self) -> Option<&CandidateTiming> {
        self.timings.iter().find(|t| t.config == self.best)
    }
}

/// Candidate search plus the signature → configuration cache.
///
/// Owned by the caller (usually through a
/// [`ReduceContext`](crate::context::ReduceContext)); safe to share across
/// threads.
pub struct Autotuner {
    settings: TuneSettings,
    candidates: SmallVec<[TileConfig; 8]>,
    cache: Mutex<HashMap<Signature, TileConfig>>,
    searches: AtomicU64,
}

impl Autotuner {
    /// Autotuner over the standard [`CANDIDATES`] table.
    pub fn new(settings: TuneSettings) -> Self {
        Self {
            settings,
            candidates: SmallVec::from_slice(&CANDIDATES),
            cache: Mutex::new(HashMap::new()),
            searches: AtomicU64::new(0),
        }
    }

    /// Replace the search space. Every candidate must be valid and the set
    /// must not be empty.
    pub fn with_candidates(mut self, candidates: impl IntoIterator<Item = TileConfig>) -> Result<Self> {
        let candidates: SmallVec<[TileConfig; 8]> = candidates.into_iter().collect();
        if candidates.is_empty() {
            return Err(ColsumError::InvalidArgument(
                "candidate set must not be empty".into(),
            ));
        }
        for c in &candidates {
            c.validate()?;
        }
        self.candidates = candidates;
        Ok(self)
    }

    pub fn settings(&self) -> &TuneSettings {
        &self.settings
    }

    pub fn candidates(&self) -> &[TileConfig] {
        &self.candidates
    }

    /// Cached configuration for `signature`, if one has been selected.
    pub fn cached(&self, signature: &Signature) -> Option<TileConfig> {
        self.cache.lock().get(signature).copied()
    }

    /// Number of cached signatures.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// All cached selections.
    pub fn snapshot(&self) -> Vec<(Signature, TileConfig)> {
        self.cache
            .lock()
            .iter()
            .map(|(&sig, &config)| (sig, config))
            .collect()
    }

    /// Forget every cached selection.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Number of full candidate searches run so far.
    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    /// Resolve the configuration for `signature`.
    ///
    /// A cached entry is returned as is. Otherwise the configuration comes
    /// from [`TuneMode`]; a `Fixed` shape is validated before it is cached,
    /// and under `Benchmark`, `launch` is invoked for every
    /// candidate and timed. The search runs without holding the cache lock.
    /// If another thread stores an entry for the same signature first, that
    /// entry wins and is returned here too.
    pub fn select<F>(&self, signature: Signature, launch: F) -> Result<TileConfig>
    where
        F: FnMut(&TileConfig) -> Result<()>,
    {
        if let Some(config) = self.cached(&signature) {
            trace!(%signature, %config, "autotune cache hit");
            return Ok(config);
        }

        let chosen = match self.settings.mode {
            TuneMode::Fixed(config) => {
                config.validate()?;
                config
            }
            TuneMode::Benchmark => self.search(signature, launch)?.best,
        };

        let stored = *self.cache.lock().entry(signature).or_insert(chosen);
        if stored != chosen {
            debug!(%signature, %stored, discarded = %chosen, "concurrent selection already cached");
        }
        Ok(stored)
    }

    /// Benchmark every candidate for `signature` and overwrite its cache
    /// entry with the winner, whatever the mode.
    pub fn tune<F>(&self, signature: Signature, launch: F) -> Result<TuneReport>
    where
        F: FnMut(&TileConfig) -> Result<()>,
    {
        let report = self.search(signature, launch)?;
        self.cache.lock().insert(signature, report.best);
        Ok(report)
    }

    fn search<F>(&self, signature: Signature, mut launch: F) -> Result<TuneReport>
    where
        F: FnMut(&TileConfig) -> Result<()>,
    {
        self.searches.fetch_add(1, Ordering::Relaxed);
        debug!(
            %signature,
            candidates = self.candidates.len(),
            warmup = self.settings.warmup,
            iterations = self.settings.iterations,
            "autotuning"
        );

        let mut timings = Vec::with_capacity(self.candidates.len());
        for config in &self.candidates {
            match self.measure(config, &mut launch) {
                Ok(timing) => {
                    debug!(%config, median = ?timing.median, "candidate timed");
                    timings.push(timing);
                }
                Err(e) => match self.settings.on_failure {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!(%signature, %config, error = %e, "skipping failed candidate")
                    }
                },
            }
        }

        let best = timings
            .iter()
            .min_by_key(|t| t.median)
            .map(|t| t.config)
            .ok_or(ColsumError::NoViableCandidate { signature })?;

        if let Some(timing) = timings.iter().find(|t| t.config == best) {
            info!(%signature, config = %best, median = ?timing.median, "autotune selected");
        }

        Ok(TuneReport {
            signature,
            timings,
            best,
        })
    }

    fn measure<F>(&self, config: &TileConfig, launch: &mut F) -> Result<CandidateTiming>
    where
        F: FnMut(&TileConfig) -> Result<()>,
    {
        for _ in 0..self.settings.warmup {
            launch(config)?;
        }

        let iterations = self.settings.iterations.max(1);
        let mut times = Vec::with_capacity(iterations as usize);
        for _ in 0..iterations {
            let start = Instant::now();
            launch(config)?;
            times.push(start.elapsed());
        }
        times.sort();

        Ok(CandidateTiming {
            config: *config,
            median: times[times.len() / 2],
            min: times[0],
            max: times[times.len() - 1],
            iterations,
        })
    }
}

impl Default for Autotuner {
    fn default() -> Self {
        Self::new(TuneSettings::default())
    }
}

impl std::fmt::Debug for Autotuner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autotuner")
            .field("settings", &self.settings)
            .field("candidates", &self.candidates.len())
            .field("cached", &self.len())
            .finish()
    }
}
