//! First-order delta codec for signed integers.
//!
//! Stores the first value verbatim and bit-packs the adjusted first-order
//! differences `d[i] = v[i] - v[i-1] - min_delta`, where `min_delta` is the
//! smallest difference in the block. Subtracting `min_delta` is a
//! frame-of-reference over the deltas: it lets negative deltas coexist with
//! small positive ones at a narrow width without a per-value sign bit, and
//! it makes every packed residual non-negative.
//!
//! ## Block layout (little-endian)
//!
//! ```text
//! offset  size  field
//! 0       8     min_val          (i64)
//! 8       2     num_values       (u16)
//! 10      1     bit_width        (u8, 0 means all residuals are zero)
//! 11      S     first_value      (S = 4 for i32, 8 for i64)
//! 11+S    P     packed residuals (P = byte_count((num_values-1) * bit_width))
//! 11+S+P  32    SIMD tail padding
//! ```
//!
//! A single-value block is the 11-byte header alone, with the value in
//! `min_val`. The i32 variant computes its deltas in i64 width so the
//! difference of extreme values cannot wrap, packs 64-bit lanes, and emits
//! only the first value at 32 bits; its decoder reconstructs in i64 and
//! truncates on store.

use crate::bitpack;
use crate::error::CodecError;
use crate::Result;

/// Maximum number of values a single delta or delta-of-deltas block can
/// carry.
pub const MAX_BLOCK_LEN: usize = 4096;

/// Size in bytes of the fixed block header.
pub const HEADER_LEN: usize = 11;

/// Fixed header at the front of every delta and delta-of-deltas block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Frame-of-reference baseline subtracted from every residual. Holds
    /// the value itself for single-value blocks.
    pub min_val: i64,
    /// Count of values in the block.
    pub num_values: u16,
    /// Uniform width of the packed residuals, `0..=64`.
    pub bit_width: u8,
}

impl BlockHeader {
    /// Writes the 11-byte header at the front of `dst`.
    pub fn write(&self, dst: &mut [u8]) {
        dst[..8].copy_from_slice(&self.min_val.to_le_bytes());
        dst[8..10].copy_from_slice(&self.num_values.to_le_bytes());
        dst[10] = self.bit_width;
    }

    /// Reads the 11-byte header from the front of `src`.
    pub fn read(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(CodecError::InputTooShort {
                len: src.len(),
                need: HEADER_LEN,
            });
        }
        Ok(BlockHeader {
            min_val: i64::from_le_bytes(src[..8].try_into().unwrap()),
            num_values: u16::from_le_bytes(src[8..10].try_into().unwrap()),
            bit_width: src[10],
        })
    }
}

/// Validates an integer block against its header before decoding: the
/// destination must hold `num_values`, the width must be in range, and the
/// input must cover the first value plus the packed residuals.
pub(crate) fn check_block(
    header: &BlockHeader,
    src: &[u8],
    dst_len: usize,
    first_len: usize,
) -> Result<usize> {
    let n = header.num_values as usize;
    if n > dst_len {
        return Err(CodecError::OutputTooSmall {
            len: dst_len,
            need: n,
        });
    }
    if header.bit_width > 64 {
        return Err(CodecError::InvalidBlock(format!(
            "bit width {} exceeds 64",
            header.bit_width
        )));
    }
    if n > 1 {
        let need = HEADER_LEN
            + first_len
            + bitpack::byte_count((n - 1) * header.bit_width as usize);
        if src.len() < need {
            return Err(CodecError::InvalidBlock(format!(
                "{} bytes cannot hold {} values at width {}",
                src.len(),
                n,
                header.bit_width
            )));
        }
    }
    Ok(n)
}

/// Appends one encoded block holding `src` to `dst`.
///
/// # Errors
/// Returns [`CodecError::BlockTooLarge`] if `src` exceeds
/// [`MAX_BLOCK_LEN`].
pub fn encode_i64(dst: &mut Vec<u8>, src: &[i64]) -> Result<()> {
    match src.len() {
        0 => return Ok(()),
        1 => {
            let offset = dst.len();
            dst.resize(offset + HEADER_LEN, 0);
            BlockHeader {
                min_val: src[0],
                num_values: 1,
                bit_width: 0,
            }
            .write(&mut dst[offset..]);
            return Ok(());
        }
        n if n > MAX_BLOCK_LEN => {
            return Err(CodecError::BlockTooLarge {
                len: n,
                max: MAX_BLOCK_LEN,
            });
        }
        _ => {}
    }

    let mut deltas = Vec::with_capacity(src.len() - 1);
    let mut min_delta = i64::MAX;
    for pair in src.windows(2) {
        let delta = pair[1].wrapping_sub(pair[0]);
        min_delta = min_delta.min(delta);
        deltas.push(delta);
    }

    let mut width = 0u32;
    for delta in deltas.iter_mut() {
        *delta = delta.wrapping_sub(min_delta);
        width = width.max(bitpack::bit_width(*delta as u64));
    }

    let packed = bitpack::byte_count(deltas.len() * width as usize);
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN + 8 + packed + bitpack::SIMD_PAD, 0);
    let out = &mut dst[offset..];

    BlockHeader {
        min_val: min_delta,
        num_values: src.len() as u16,
        bit_width: width as u8,
    }
    .write(out);

    // First value verbatim, residuals packed after it.
    out[HEADER_LEN..HEADER_LEN + 8].copy_from_slice(&src[0].to_le_bytes());
    bitpack::pack64(&mut out[HEADER_LEN + 8..], &deltas, width);
    Ok(())
}

/// Decodes one block from the front of `src` into `dst` and returns the
/// number of values written.
///
/// # Errors
/// Returns an error when the header is truncated, the destination is too
/// small, or the payload cannot cover the header's value count.
pub fn decode_i64(dst: &mut [i64], src: &[u8]) -> Result<usize> {
    if src.is_empty() {
        return Ok(0);
    }
    let header = BlockHeader::read(src)?;
    let n = check_block(&header, src, dst.len(), 8)?;
    match n {
        0 => return Ok(0),
        1 => {
            dst[0] = header.min_val;
            return Ok(1);
        }
        _ => {}
    }

    dst[0] = i64::from_le_bytes(src[HEADER_LEN..HEADER_LEN + 8].try_into().unwrap());
    bitpack::unpack64(
        &mut dst[1..n],
        &src[HEADER_LEN + 8..],
        header.bit_width as u32,
    );

    // Prefix sum over the adjusted deltas, unrolled 4x to shorten the
    // serial dependency chain.
    let min_val = header.min_val;
    let mut prev = dst[0];
    let mut i = 1;
    while i + 3 < n {
        prev = prev.wrapping_add(dst[i].wrapping_add(min_val));
        dst[i] = prev;
        prev = prev.wrapping_add(dst[i + 1].wrapping_add(min_val));
        dst[i + 1] = prev;
        prev = prev.wrapping_add(dst[i + 2].wrapping_add(min_val));
        dst[i + 2] = prev;
        prev = prev.wrapping_add(dst[i + 3].wrapping_add(min_val));
        dst[i + 3] = prev;
        i += 4;
    }
    while i < n {
        prev = prev.wrapping_add(dst[i].wrapping_add(min_val));
        dst[i] = prev;
        i += 1;
    }
    Ok(n)
}

/// Appends one encoded block holding `src` to `dst`.
///
/// Deltas are computed in i64 width, so differences of extreme i32 values
/// cannot wrap; the packed stream therefore uses 64-bit lanes while the
/// first value alone is emitted at 32 bits.
///
/// # Errors
/// Returns [`CodecError::BlockTooLarge`] if `src` exceeds
/// [`MAX_BLOCK_LEN`].
pub fn encode_i32(dst: &mut Vec<u8>, src: &[i32]) -> Result<()> {
    match src.len() {
        0 => return Ok(()),
        1 => {
            let offset = dst.len();
            dst.resize(offset + HEADER_LEN, 0);
            BlockHeader {
                min_val: src[0] as i64,
                num_values: 1,
                bit_width: 0,
            }
            .write(&mut dst[offset..]);
            return Ok(());
        }
        n if n > MAX_BLOCK_LEN => {
            return Err(CodecError::BlockTooLarge {
                len: n,
                max: MAX_BLOCK_LEN,
            });
        }
        _ => {}
    }

    let mut deltas = Vec::with_capacity(src.len() - 1);
    let mut min_delta = i64::MAX;
    for pair in src.windows(2) {
        let delta = pair[1] as i64 - pair[0] as i64;
        min_delta = min_delta.min(delta);
        deltas.push(delta);
    }

    let mut width = 0u32;
    for delta in deltas.iter_mut() {
        *delta -= min_delta;
        width = width.max(bitpack::bit_width(*delta as u64));
    }

    let packed = bitpack::byte_count(deltas.len() * width as usize);
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN + 4 + packed + bitpack::SIMD_PAD, 0);
    let out = &mut dst[offset..];

    BlockHeader {
        min_val: min_delta,
        num_values: src.len() as u16,
        bit_width: width as u8,
    }
    .write(out);

    out[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&src[0].to_le_bytes());
    bitpack::pack64(&mut out[HEADER_LEN + 4..], &deltas, width);
    Ok(())
}

/// Decodes one block from the front of `src` into `dst` and returns the
/// number of values written.
///
/// # Errors
/// Returns an error when the header is truncated, the destination is too
/// small, or the payload cannot cover the header's value count.
pub fn decode_i32(dst: &mut [i32], src: &[u8]) -> Result<usize> {
    if src.is_empty() {
        return Ok(0);
    }
    let header = BlockHeader::read(src)?;
    let n = check_block(&header, src, dst.len(), 4)?;
    match n {
        0 => return Ok(0),
        1 => {
            dst[0] = header.min_val as i32;
            return Ok(1);
        }
        _ => {}
    }

    dst[0] = i32::from_le_bytes(src[HEADER_LEN..HEADER_LEN + 4].try_into().unwrap());
    let mut residuals = vec![0i64; n - 1];
    bitpack::unpack64(
        &mut residuals,
        &src[HEADER_LEN + 4..],
        header.bit_width as u32,
    );

    let mut prev = dst[0] as i64;
    for (out, &residual) in dst[1..n].iter_mut().zip(&residuals) {
        prev = prev.wrapping_add(residual.wrapping_add(header.min_val));
        *out = prev as i32;
    }
    Ok(n)
}
