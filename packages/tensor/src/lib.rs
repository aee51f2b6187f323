#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-block feature tensors and their wire encoding.
//!
//! A tensor holds one normalized severity rate per (month, day-of-week,
//! hour) slot over a lookback window. On the wire each value is a
//! little-endian IEEE 754 `f64`; the whole tensor is the concatenation of
//! its slots in row-major order, carried as lowercase hex text. Decoding a
//! blob and re-encoding it is bit-exact, NaN payloads included.

/// Days in the day-of-week axis. Monday is day `0`.
pub const DAYS_PER_WEEK: usize = 7;

/// Hours in the hour axis.
pub const HOURS_PER_DAY: usize = 24;

/// Slots per month: the full day-of-week x hour grid.
pub const SLOTS_PER_MONTH: usize = DAYS_PER_WEEK * HOURS_PER_DAY;

/// Errors raised while encoding, decoding, or addressing tensors.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Hex text failed to decode.
    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A binary blob's length is not a whole number of `f64` values.
    #[error("Blob length {len} is not a multiple of 8")]
    Length {
        /// Byte length received.
        len: usize,
    },

    /// A decoded blob holds the wrong number of slots for the shape.
    #[error("Expected {expected} slots, blob holds {actual}")]
    ShapeMismatch {
        /// Slots the shape requires.
        expected: usize,
        /// Slots decoded from the blob.
        actual: usize,
    },

    /// A slot coordinate is outside the tensor's shape.
    #[error("Slot (month {month_offset}, dow {dow}, hour {hour}) outside shape of {months} months")]
    SlotOutOfRange {
        /// Months the shape covers.
        months: usize,
        /// Offending month offset.
        month_offset: usize,
        /// Offending day-of-week.
        dow: usize,
        /// Offending hour.
        hour: usize,
    },
}

/// The shape of a feature tensor: how many months its window covers.
///
/// The other two axes are fixed at [`DAYS_PER_WEEK`] and [`HOURS_PER_DAY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    months: usize,
}

impl TensorShape {
    /// A shape covering `months` whole months.
    #[must_use]
    pub const fn new(months: usize) -> Self {
        Self { months }
    }

    /// Months the shape covers.
    #[must_use]
    pub const fn months(self) -> usize {
        self.months
    }

    /// Total slot count.
    #[must_use]
    pub const fn slots(self) -> usize {
        self.months * SLOTS_PER_MONTH
    }

    /// Encoded byte length.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        self.slots() * 8
    }

    /// Row-major flat index of a slot, or `None` when out of range.
    #[must_use]
    pub const fn index(self, month_offset: usize, dow: usize, hour: usize) -> Option<usize> {
        if month_offset >= self.months || dow >= DAYS_PER_WEEK || hour >= HOURS_PER_DAY {
            return None;
        }
        Some((month_offset * DAYS_PER_WEEK + dow) * HOURS_PER_DAY + hour)
    }
}

/// A dense feature tensor for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    shape: TensorShape,
    values: Vec<f64>,
}

impl FeatureTensor {
    /// An all-zero tensor of the given shape.
    #[must_use]
    pub fn zeros(shape: TensorShape) -> Self {
        Self {
            shape,
            values: vec![0.0; shape.slots()],
        }
    }

    /// The tensor's shape.
    #[must_use]
    pub const fn shape(&self) -> TensorShape {
        self.shape
    }

    /// All slot values in row-major order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Reads one slot.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::SlotOutOfRange`] for coordinates outside the
    /// shape.
    pub fn get(&self, month_offset: usize, dow: usize, hour: usize) -> Result<f64, FormatError> {
        let index = self.slot_index(month_offset, dow, hour)?;
        Ok(self.values[index])
    }

    /// Writes one slot.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::SlotOutOfRange`] for coordinates outside the
    /// shape.
    pub fn set(
        &mut self,
        month_offset: usize,
        dow: usize,
        hour: usize,
        value: f64,
    ) -> Result<(), FormatError> {
        let index = self.slot_index(month_offset, dow, hour)?;
        self.values[index] = value;
        Ok(())
    }

    /// Largest slot value, ignoring NaNs. Zero for an all-NaN tensor.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(0.0, f64::max)
    }

    /// Divides every slot by `divisor` in place.
    pub fn scale_down(&mut self, divisor: f64) {
        for value in &mut self.values {
            *value /= divisor;
        }
    }

    /// Encodes the tensor as little-endian `f64` bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.shape.byte_len());
        for value in &self.values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decodes a tensor from little-endian `f64` bytes.
    ///
    /// Bit-exact: every payload `to_bytes` produces decodes back to equal
    /// bit patterns.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] if the length is not a multiple of 8 or the
    /// slot count does not match `shape`.
    pub fn from_bytes(shape: TensorShape, bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() % 8 != 0 {
            return Err(FormatError::Length { len: bytes.len() });
        }
        let actual = bytes.len() / 8;
        if actual != shape.slots() {
            return Err(FormatError::ShapeMismatch {
                expected: shape.slots(),
                actual,
            });
        }
        let values = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0_u8; 8];
                word.copy_from_slice(chunk);
                f64::from_le_bytes(word)
            })
            .collect();
        Ok(Self { shape, values })
    }

    /// Encodes the tensor as lowercase hex text.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decodes a tensor from hex text. Uppercase digits are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] on malformed hex or a shape mismatch.
    pub fn from_hex(shape: TensorShape, text: &str) -> Result<Self, FormatError> {
        let bytes = hex::decode(text.trim())?;
        Self::from_bytes(shape, &bytes)
    }

    fn slot_index(
        &self,
        month_offset: usize,
        dow: usize,
        hour: usize,
    ) -> Result<usize, FormatError> {
        self.shape
            .index(month_offset, dow, hour)
            .ok_or(FormatError::SlotOutOfRange {
                months: self.shape.months,
                month_offset,
                dow,
                hour,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_counts() {
        let shape = TensorShape::new(24);
        assert_eq!(shape.slots(), 24 * 168);
        assert_eq!(shape.byte_len(), 24 * 168 * 8);
    }

    #[test]
    fn index_is_row_major() {
        let shape = TensorShape::new(2);
        assert_eq!(shape.index(0, 0, 0), Some(0));
        assert_eq!(shape.index(0, 0, 23), Some(23));
        assert_eq!(shape.index(0, 1, 0), Some(24));
        assert_eq!(shape.index(1, 0, 0), Some(168));
        assert_eq!(shape.index(1, 6, 23), Some(2 * 168 - 1));
    }

    #[test]
    fn index_rejects_out_of_range_slots() {
        let shape = TensorShape::new(2);
        assert_eq!(shape.index(2, 0, 0), None);
        assert_eq!(shape.index(0, 7, 0), None);
        assert_eq!(shape.index(0, 0, 24), None);
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut tensor = FeatureTensor::zeros(TensorShape::new(2));
        tensor.set(1, 3, 15, 0.25).unwrap();
        assert!((tensor.get(1, 3, 15).unwrap() - 0.25).abs() < f64::EPSILON);
        assert!((tensor.get(0, 0, 0).unwrap()).abs() < f64::EPSILON);
        assert!(tensor.set(2, 0, 0, 1.0).is_err());
    }

    #[test]
    fn bytes_are_little_endian() {
        let mut tensor = FeatureTensor::zeros(TensorShape::new(1));
        tensor.set(0, 0, 0, 1.0).unwrap();
        let bytes = tensor.to_bytes();
        assert_eq!(&bytes[..8], &1.0_f64.to_le_bytes());
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn hex_roundtrip_is_bit_exact() {
        let shape = TensorShape::new(1);
        let mut tensor = FeatureTensor::zeros(shape);
        tensor.set(0, 0, 0, 0.1).unwrap();
        tensor.set(0, 3, 7, -0.0).unwrap();
        tensor.set(0, 6, 23, f64::NAN).unwrap();

        let text = tensor.to_hex();
        let decoded = FeatureTensor::from_hex(shape, &text).unwrap();

        for (a, b) in tensor.values().iter().zip(decoded.values()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(decoded.to_hex(), text);
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let shape = TensorShape::new(1);
        let mut tensor = FeatureTensor::zeros(shape);
        tensor.set(0, 2, 2, 3.5).unwrap();
        let upper = tensor.to_hex().to_uppercase();
        let decoded = FeatureTensor::from_hex(shape, &upper).unwrap();
        assert_eq!(decoded, tensor);
    }

    #[test]
    fn rejects_truncated_blobs() {
        let shape = TensorShape::new(1);
        assert!(matches!(
            FeatureTensor::from_bytes(shape, &[0_u8; 9]),
            Err(FormatError::Length { len: 9 })
        ));
        assert!(matches!(
            FeatureTensor::from_bytes(shape, &[0_u8; 16]),
            Err(FormatError::ShapeMismatch {
                expected: 168,
                actual: 2,
            })
        ));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(matches!(
            FeatureTensor::from_hex(TensorShape::new(1), "zz"),
            Err(FormatError::Hex(_))
        ));
    }

    #[test]
    fn max_value_ignores_nans() {
        let mut tensor = FeatureTensor::zeros(TensorShape::new(1));
        tensor.set(0, 0, 0, 0.7).unwrap();
        tensor.set(0, 0, 1, f64::NAN).unwrap();
        assert!((tensor.max_value() - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn scale_down_divides_every_slot() {
        let mut tensor = FeatureTensor::zeros(TensorShape::new(1));
        tensor.set(0, 0, 0, 0.5).unwrap();
        tensor.set(0, 1, 0, 0.25).unwrap();
        tensor.scale_down(0.5);
        assert!((tensor.get(0, 0, 0).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((tensor.get(0, 1, 0).unwrap() - 0.5).abs() < f64::EPSILON);
    }
}
