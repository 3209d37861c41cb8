// Licensed under the Apache-2.0 license.

//! Bounds-checked byte access.
//!
//! Offsets and sizes handled by the validators come from the image being
//! validated, so every slice and every offset sum goes through here.

use flashy_error::{FlashyError, FlashyResult};

/// Returns `data[start..end]`, failing if `start > end` or `end > data.len()`.
pub fn slice_range(data: &[u8], start: usize, end: usize) -> FlashyResult<&[u8]> {
    if start > end || end > data.len() {
        return Err(FlashyError::SliceOutOfRange {
            start,
            end,
            len: data.len(),
        });
    }
    Ok(&data[start..end])
}

/// Adds two offsets, failing instead of wrapping.
pub fn checked_add_u32(x: u32, y: u32) -> FlashyResult<u32> {
    x.checked_add(y)
        .ok_or(FlashyError::Overflow { lhs: x, rhs: y })
}

/// Reads the big-endian 32-bit word at `offset`.
pub fn get_word(data: &[u8], offset: usize) -> FlashyResult<u32> {
    let end = offset.checked_add(4).ok_or(FlashyError::SliceOutOfRange {
        start: offset,
        end: usize::MAX,
        len: data.len(),
    })?;
    let bytes = slice_range(data, offset, end)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
