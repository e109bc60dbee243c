//! Tile shapes, the candidate table, and autotuning signatures.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::DType;
use crate::{ColsumError, Result};

/// Tile shape used for one kernel launch.
///
/// - `block_m`: rows consumed per row-tile step
/// - `block_n`: columns owned by one parallel unit
/// - `lanes`: interleaved partial accumulators used for each tile's row sum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TileConfig {
    pub block_m: usize,
    pub block_n: usize,
    pub lanes: usize,
}

impl TileConfig {
    /// Validated constructor; every field must be non-zero and `lanes` may
    /// not exceed `block_m`.
    pub fn new(block_m: usize, block_n: usize, lanes: usize) -> Result<Self> {
        let config = Self {
            block_m,
            block_n,
            lanes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants `new` enforces, for values built field by field.
    pub fn validate(&self) -> Result<()> {
        let Self {
            block_m,
            block_n,
            lanes,
        } = *self;
        if block_m == 0 || block_n == 0 || lanes == 0 {
            return Err(ColsumError::InvalidArgument(format!(
                "tile dimensions must be non-zero, got {block_m}x{block_n}x{lanes}"
            )));
        }
        if lanes > block_m {
            return Err(ColsumError::InvalidArgument(format!(
                "lanes ({lanes}) cannot exceed block_m ({block_m})"
            )));
        }
        if block_m.checked_mul(block_n).is_none() {
            return Err(ColsumError::InvalidArgument(format!(
                "tile {block_m}x{block_n} overflows usize"
            )));
        }
        Ok(())
    }

    const fn candidate(block_m: usize, block_n: usize, lanes: usize) -> Self {
        Self {
            block_m,
            block_n,
            lanes,
        }
    }

    /// Number of parallel units (column tiles) needed to cover `cols`.
    #[inline]
    pub fn units(&self, cols: usize) -> usize {
        cols.div_ceil(self.block_n)
    }

    /// Number of row-tile steps each unit performs over `rows`.
    #[inline]
    pub fn row_tiles(&self, rows: usize) -> usize {
        rows.div_ceil(self.block_m)
    }

    /// Scalar elements in one loaded tile.
    #[inline]
    pub fn tile_elems(&self) -> usize {
        self.block_m * self.block_n
    }
}

impl fmt::Display for TileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.block_m, self.block_n, self.lanes)
    }
}

impl FromStr for TileConfig {
    type Err = ColsumError;

    /// Parses `<block_m>x<block_n>` or `<block_m>x<block_n>x<lanes>`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(['x', 'X']).collect();
        let parse = |p: &str| {
            p.trim().parse::<usize>().map_err(|e| {
                ColsumError::InvalidArgument(format!("bad tile dimension {p:?} in {s:?}: {e}"))
            })
        };
        match parts.as_slice() {
            [m, n] => Self::new(parse(m)?, parse(n)?, 1),
            [m, n, lanes] => Self::new(parse(m)?, parse(n)?, parse(lanes)?),
            _ => Err(ColsumError::InvalidArgument(format!(
                "expected <block_m>x<block_n>[x<lanes>], got {s:?}"
            ))),
        }
    }
}

/// Fixed autotuning search space, from wide/shallow to narrow/deep tiles.
pub const CANDIDATES: [TileConfig; 8] = [
    TileConfig::candidate(32, 32, 1),
    TileConfig::candidate(64, 32, 1),
    TileConfig::candidate(128, 16, 1),
    TileConfig::candidate(256, 8, 2),
    TileConfig::candidate(512, 8, 2),
    TileConfig::candidate(1024, 8, 2),
    TileConfig::candidate(2048, 8, 2),
    TileConfig::candidate(4096, 8, 2),
];

/// Autotuning cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Signature {
    pub m: usize,
    pub n: usize,
    pub reduced_precision: bool,
}

impl Signature {
    pub fn new(m: usize, n: usize, dtype: DType) -> Self {
        Self {
            m,
            n,
            reduced_precision: dtype.is_reduced_precision(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = if self.reduced_precision { "16-bit" } else { "f32" };
        write!(f, "M={} N={} ({precision})", self.m, self.n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_ordered() {
        for pair in CANDIDATES.windows(2) {
            assert!(pair[0].block_m < pair[1].block_m);
            assert!(pair[0].block_n >= pair[1].block_n);
        }
        assert_eq!(CANDIDATES[0], TileConfig::new(32, 32, 1).unwrap());
        assert_eq!(CANDIDATES[7], TileConfig::new(4096, 8, 2).unwrap());
    }

    #[test]
    fn test_candidates_valid() {
        for c in CANDIDATES {
            assert!(TileConfig::new(c.block_m, c.block_n, c.lanes).is_ok());
            assert!(c.lanes == 1 || c.lanes == 2);
        }
    }

    #[test]
    fn test_units_and_row_tiles() {
        let cfg = TileConfig::new(32, 32, 1).unwrap();
        assert_eq!(cfg.units(13), 1);
        assert_eq!(cfg.units(0), 0);
        assert_eq!(cfg.units(65), 3);
        assert_eq!(cfg.row_tiles(37), 2);
        assert_eq!(cfg.row_tiles(0), 0);
    }

    #[test]
    fn test_rejects_zero_dims() {
        assert!(TileConfig::new(0, 8, 1).is_err());
        assert!(TileConfig::new(8, 0, 1).is_err());
        assert!(TileConfig::new(8, 8, 0).is_err());
        assert!(TileConfig::new(2, 8, 4).is_err());
    }

    #[test]
    fn test_rejects_overflowing_tile() {
        assert!(TileConfig::new(usize::MAX / 2, 4, 1).is_err());
        let built = TileConfig {
            block_m: 1 << 40,
            block_n: 1 << 40,
            lanes: 1,
        };
        assert!(built.validate().is_err());
    }

    #[test]
    fn test_parse_tile() {
        assert_eq!(
            "1024x8x2".parse::<TileConfig>().unwrap(),
            TileConfig::new(1024, 8, 2).unwrap()
        );
        assert_eq!("64X32".parse::<TileConfig>().unwrap().lanes, 1);
        assert!("64".parse::<TileConfig>().is_err());
        assert!("64xq".parse::<TileConfig>().is_err());
    }

    #[test]
    fn test_signature_key() {
        let a = Signature::new(10, 20, DType::F16);
        let b = Signature::new(10, 20, DType::BF16);
        let c = Signature::new(10, 20, DType::F32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.to_string(), "M=10 N=20 (f32)");
    }
}
