//! Sequential `f64` column sum, used as the correctness oracle.
//!
//! Deliberately simple: no tiling, no masking, no parallelism. Tests, benches
//! and the CLI compare the tiled kernel against this.

use crate::types::Element;
use crate::view::StridedMatrix;

/// Sum every column of `x` in `f64`.
pub fn sum_rows_f64<T: Element>(x: &StridedMatrix<'_, T>) -> Vec<f64> {
    let mut out = vec![0.0f64; x.cols()];
    for r in 0..x.rows() {
        for (acc, &v) in out.iter_mut().zip(x.row(r)) {
            *acc += v.to_f32() as f64;
        }
    }
    out
}

/// Largest relative error of `got` against `expected`, with `abs_floor`
/// guarding against division by values near zero.
pub fn max_rel_error(got: &[f32], expected: &[f64], abs_floor: f64) -> f64 {
    got.iter()
        .zip(expected)
        .map(|(&g, &e)| (g as f64 - e).abs() / e.abs().max(abs_floor))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_sum() {
        let data: Vec<f32> = (1..=12).map(|i| i as f32).collect();
        let x = StridedMatrix::contiguous(&data, 4, 3).unwrap();
        assert_eq!(sum_rows_f64(&x), vec![22.0, 26.0, 30.0]);
    }

    #[test]
    fn test_reference_respects_stride() {
        let data = [1.0f32, 2.0, 100.0, 3.0, 4.0];
        let x = StridedMatrix::new(&data, 2, 2, 3).unwrap();
        assert_eq!(sum_rows_f64(&x), vec![4.0, 6.0]);
    }

    #[test]
    fn test_max_rel_error() {
        assert_eq!(max_rel_error(&[1.0, 2.0], &[1.0, 2.0], 1.0), 0.0);
        let err = max_rel_error(&[1.0, 2.2], &[1.0, 2.0], 1.0);
        assert!((err - 0.1).abs() < 1e-6);
    }
}
