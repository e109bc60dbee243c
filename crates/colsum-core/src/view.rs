//! Read-only strided views over a caller-owned buffer.

use crate::types::{DType, Element};
use crate::{ColsumError, Result};

/// An `rows x cols` matrix inside `data`, with consecutive rows `row_stride`
/// elements apart.
///
/// Construction checks that every addressed element is in bounds, so the
/// kernel never has to.
#[derive(Clone, Copy, Debug)]
pub struct StridedMatrix<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    row_stride: usize,
}

impl<'a, T: Element> StridedMatrix<'a, T> {
    pub fn new(data: &'a [T], rows: usize, cols: usize, row_stride: usize) -> Result<Self> {
        if rows > 0 && cols > 0 && row_stride < cols {
            return Err(ColsumError::InvalidStride {
                stride: row_stride,
                cols,
            });
        }
        let required = required_len(rows, cols, row_stride).ok_or_else(|| {
            ColsumError::InvalidArgument(format!(
                "{rows}x{cols} view with row stride {row_stride} overflows usize"
            ))
        })?;
        if data.len() < required {
            return Err(ColsumError::ShapeMismatch {
                expected: vec![required],
                got: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            rows,
            cols,
            row_stride,
        })
    }

    /// A densely packed view (`row_stride == cols`).
    pub fn contiguous(data: &'a [T], rows: usize, cols: usize) -> Result<Self> {
        Self::new(data, rows, cols, cols)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// The `cols` valid elements of `row`.
    #[inline]
    pub fn row(&self, row: usize) -> &'a [T] {
        let start = row * self.row_stride;
        &self.data[start..start + self.cols]
    }
}

/// Minimum buffer length for a view of the given shape, or `None` if it
/// does not fit in `usize`.
pub fn required_len(rows: usize, cols: usize, row_stride: usize) -> Option<usize> {
    if rows == 0 || cols == 0 {
        return Some(0);
    }
    (rows - 1).checked_mul(row_stride)?.checked_add(cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_view() {
        let data: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let view = StridedMatrix::contiguous(&data, 2, 3).unwrap();
        assert_eq!(view.row(1), &[3.0, 4.0, 5.0]);
        assert_eq!(view.dtype(), DType::F32);
    }

    #[test]
    fn test_padded_rows() {
        // 3x2 sub-view of a buffer with stride 4; the last row needs no padding.
        let data = [1.0f32, 2.0, -1.0, -1.0, 3.0, 4.0, -1.0, -1.0, 5.0, 6.0];
        let view = StridedMatrix::new(&data, 3, 2, 4).unwrap();
        assert_eq!(view.row(2), &[5.0, 6.0]);
    }

    #[test]
    fn test_stride_smaller_than_cols() {
        let data = [0.0f32; 16];
        let err = StridedMatrix::new(&data, 2, 4, 3).unwrap_err();
        assert!(matches!(err, ColsumError::InvalidStride { stride: 3, cols: 4 }));
    }

    #[test]
    fn test_buffer_too_short() {
        let data = [0.0f32; 7];
        let err = StridedMatrix::new(&data, 2, 4, 4).unwrap_err();
        assert!(matches!(err, ColsumError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_huge_stride_is_rejected() {
        let data = [1.0f32; 4];
        let stride = usize::MAX / 2 + 1;
        let err = StridedMatrix::new(&data, 3, 1, stride).unwrap_err();
        assert!(matches!(err, ColsumError::InvalidArgument(_)), "{err}");
        // One stride still fits in usize, so this is a plain short buffer.
        let err = StridedMatrix::new(&data, 2, 1, stride).unwrap_err();
        assert!(matches!(err, ColsumError::ShapeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_required_len() {
        assert_eq!(required_len(0, 7, 7), Some(0));
        assert_eq!(required_len(3, 2, 4), Some(10));
        assert_eq!(required_len(usize::MAX, 2, 2), None);
    }

    #[test]
    fn test_empty_shapes_accept_empty_buffers() {
        let data: [f32; 0] = [];
        assert!(StridedMatrix::new(&data, 0, 5, 5).is_ok());
        assert!(StridedMatrix::new(&data, 5, 0, 0).is_ok());
    }
}
