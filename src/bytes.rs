//! Byte-order helpers shared by the bucketizers and the crypters.
//!
//! All persisted integers in cryptcell are fixed-width big-endian; index 0 is
//! always the most significant byte.

use crate::error::{CryptcellError, Result};

/// Interpret a byte slice as a signed 64-bit big-endian integer.
///
/// Inputs shorter than 8 bytes are zero-extended on the left:
/// `[b0, b1, b2, b3]` reads as `[0, 0, 0, 0, b0, b1, b2, b3]`.
/// Inputs longer than 8 bytes are truncated to their first 8 bytes.
pub fn to_i64(input: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = input.len().min(8);
    buf[8 - n..].copy_from_slice(&input[..n]);
    i64::from_be_bytes(buf)
}

/// Read a big-endian `u32` at `offset`, failing when the slice is too short.
///
/// Used when parsing the length header of a decrypted qualifier blob, where a
/// short read means the ciphertext was not produced by `wrap_qualifier`.
pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let end = offset.checked_add(4).ok_or(CryptcellError::InsufficientData)?;
    let slice = data.get(offset..end).ok_or(CryptcellError::InsufficientData)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    Ok(u32::from_be_bytes(buf))
}

/// Read a big-endian `i64` at `offset`, failing when the slice is too short.
pub fn read_i64(data: &[u8], offset: usize) -> Result<i64> {
    let end = offset.checked_add(8).ok_or(CryptcellError::InsufficientData)?;
    let slice = data.get(offset..end).ok_or(CryptcellError::InsufficientData)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(i64::from_be_bytes(buf))
}

/// Borrow a sub-slice, failing with `InsufficientData` instead of panicking.
pub fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len).ok_or(CryptcellError::InsufficientData)?;
    data.get(offset..end).ok_or(CryptcellError::InsufficientData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i64_short_input_zero_extends() {
        assert_eq!(to_i64(&[0x01]), 1);
        assert_eq!(to_i64(&[0x01, 0x00]), 256);
        assert_eq!(to_i64(&[0x12, 0x34, 0x56, 0x78]), 0x12345678);
    }

    #[test]
    fn test_to_i64_exact_and_long_input() {
        let exact = [0, 0, 0, 0, 0, 0, 0x03, 0xe9];
        assert_eq!(to_i64(&exact), 1001);

        // Anything past the first 8 bytes is ignored.
        let long = [0, 0, 0, 0, 0, 0, 0x03, 0xe9, 0xff, 0xff];
        assert_eq!(to_i64(&long), 1001);
    }

    #[test]
    fn test_to_i64_sign_bit() {
        let all_ones = [0xff; 8];
        assert_eq!(to_i64(&all_ones), -1);
    }

    #[test]
    fn test_read_helpers_reject_short_slices() {
        assert!(read_u32(&[1, 2, 3], 0).is_err());
        assert!(read_i64(&[1, 2, 3, 4, 5, 6, 7], 0).is_err());
        assert!(slice(&[1, 2, 3], 1, 3).is_err());
        assert_eq!(read_u32(&[0, 0, 0, 7], 0).unwrap(), 7);
    }
}
