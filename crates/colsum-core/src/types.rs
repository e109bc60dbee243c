//! Core type definitions: DType, Element, InputData.

use half::{bf16, f16};
use serde::Serialize;

/// Supported input element types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F16,
    BF16,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }

    /// Whether this is a 16-bit type that must be widened before accumulation.
    pub fn is_reduced_precision(self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::BF16 => write!(f, "bf16"),
        }
    }
}

impl std::str::FromStr for DType {
    type Err = crate::ColsumError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float32" => Ok(DType::F32),
            "f16" | "float16" | "half" => Ok(DType::F16),
            "bf16" | "bfloat16" => Ok(DType::BF16),
            other => Err(crate::ColsumError::InvalidArgument(format!(
                "unknown dtype {other:?}"
            ))),
        }
    }
}

/// An input element the kernel can read.
///
/// Every element is widened to `f32` on load; the kernel never accumulates in
/// the input's own precision.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f32(self) -> f32;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
}

/// A borrowed input buffer tagged with its element type at runtime.
#[derive(Clone, Copy, Debug)]
pub enum InputData<'a> {
    F32(&'a [f32]),
    F16(&'a [f16]),
    BF16(&'a [bf16]),
}

impl InputData<'_> {
    pub fn dtype(&self) -> DType {
        match self {
            InputData::F32(_) => DType::F32,
            InputData::F16(_) => DType::F16,
            InputData::BF16(_) => DType::BF16,
        }
    }
}

impl<'a> From<&'a [f32]> for InputData<'a> {
    fn from(data: &'a [f32]) -> Self {
        InputData::F32(data)
    }
}

impl<'a> From<&'a [f16]> for InputData<'a> {
    fn from(data: &'a [f16]) -> Self {
        InputData::F16(data)
    }
}

impl<'a> From<&'a [bf16]> for InputData<'a> {
    fn from(data: &'a [bf16]) -> Self {
        InputData::BF16(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F32.size_bytes(), 4);
        assert_eq!(DType::F16.size_bytes(), 2);
        assert_eq!(DType::BF16.size_bytes(), 2);
    }

    #[test]
    fn test_reduced_precision_flag() {
        assert!(!DType::F32.is_reduced_precision());
        assert!(DType::F16.is_reduced_precision());
        assert!(DType::BF16.is_reduced_precision());
    }

    #[test]
    fn test_dtype_parse() {
        assert_eq!("F16".parse::<DType>().unwrap(), DType::F16);
        assert_eq!("bfloat16".parse::<DType>().unwrap(), DType::BF16);
        assert!("i8".parse::<DType>().is_err());
    }

    #[test]
    fn test_element_widening() {
        assert_eq!(f16::from_f32(1.5).to_f32(), 1.5);
        assert_eq!(<bf16 as Element>::to_f32(bf16::from_f32(-2.0)), -2.0);
        assert_eq!(<f16 as Element>::DTYPE, DType::F16);
    }

    #[test]
    fn test_input_data_tag() {
        let data = [f16::ONE; 3];
        let input = InputData::from(&data[..]);
        assert_eq!(input.dtype(), DType::F16);
    }
}
