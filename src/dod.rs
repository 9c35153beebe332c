//! Delta-of-deltas codec for integer sequences with near-constant slope.
//!
//! Stores the first value verbatim and bit-packs adjusted second
//! differences: with `d[i] = v[i] - v[i-1]` and `d[0] = 0`, the residual
//! for index `i >= 1` is `dod[i] = d[i] - d[i-1]`, shifted by the block's
//! minimum so every packed value is non-negative. For near-regular
//! timestamp sequences (say 15s spacing with millisecond jitter) the
//! residuals collapse to the jitter alone, giving widths of 3..10 bits.
//!
//! Blocks share the 11-byte header and layout of the [`delta`](crate::delta)
//! codec; only the transform differs. The i32 variant computes in i64
//! width and stores its first value at 32 bits. The u64 variant runs the
//! same transform over bit-cast values: differences live in wrapping i64
//! space and the frame-of-reference stays signed, which handles decreasing
//! sequences whose differences are negative.

use crate::bitpack;
use crate::delta::{check_block, BlockHeader, HEADER_LEN, MAX_BLOCK_LEN};
use crate::error::CodecError;
use crate::Result;

/// Adds `constant` to every element. A separate pass before the prefix sum
/// so the compiler can vectorise it; the reconstruction loop is serial.
#[inline]
fn add_const(values: &mut [i64], constant: i64) {
    for v in values.iter_mut() {
        *v = v.wrapping_add(constant);
    }
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

    let mut dods = Vec::with_capacity(src.len() - 1);
    let mut min_val = i64::MAX;
    let mut d_prev = 0i64;
    for pair in src.windows(2) {
        let d = pair[1].wrapping_sub(pair[0]);
        let dod = d.wrapping_sub(d_prev);
        d_prev = d;
        min_val = min_val.min(dod);
        dods.push(dod);
    }

    let mut width = 0u32;
    for dod in dods.iter_mut() {
        *dod = dod.wrapping_sub(min_val);
        width = width.max(bitpack::bit_width(*dod as u64));
    }

    let packed = bitpack::byte_count(dods.len() * width as usize);
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN + 8 + packed + bitpack::SIMD_PAD, 0);
    let out = &mut dst[offset..];

    BlockHeader {
        min_val,
        num_values: src.len() as u16,
        bit_width: width as u8,
    }
    .write(out);

    out[HEADER_LEN..HEADER_LEN + 8].copy_from_slice(&src[0].to_le_bytes());
    bitpack::pack64(&mut out[HEADER_LEN + 8..], &dods, width);
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
    add_const(&mut dst[1..n], header.min_val);

    // Double prefix sum: rebuild each delta from its delta-of-deltas, then
    // each value from its delta. Unrolled 4x.
    let mut d = 0i64;
    let mut prev = dst[0];
    let mut i = 1;
    while i + 3 < n {
        d = d.wrapping_add(dst[i]);
        prev = prev.wrapping_add(d);
        dst[i] = prev;
        d = d.wrapping_add(dst[i + 1]);
        prev = prev.wrapping_add(d);
        dst[i + 1] = prev;
        d = d.wrapping_add(dst[i + 2]);
        prev = prev.wrapping_add(d);
        dst[i + 2] = prev;
        d = d.wrapping_add(dst[i + 3]);
        prev = prev.wrapping_add(d);
        dst[i + 3] = prev;
        i += 4;
    }
    while i < n {
        d = d.wrapping_add(dst[i]);
        prev = prev.wrapping_add(d);
        dst[i] = prev;
        i += 1;
    }
    Ok(n)
}

/// Appends one encoded block holding `src` to `dst`.
///
/// Residuals are computed in i64 width so extreme i32 differences cannot
/// wrap; the first value alone is emitted at 32 bits.
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

    let mut dods = Vec::with_capacity(src.len() - 1);
    let mut min_val = i64::MAX;
    let mut d_prev = 0i64;
    for pair in src.windows(2) {
        let d = pair[1] as i64 - pair[0] as i64;
        let dod = d - d_prev;
        d_prev = d;
        min_val = min_val.min(dod);
        dods.push(dod);
    }

    let mut width = 0u32;
    for dod in dods.iter_mut() {
        *dod -= min_val;
        width = width.max(bitpack::bit_width(*dod as u64));
    }

    let packed = bitpack::byte_count(dods.len() * width as usize);
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN + 4 + packed + bitpack::SIMD_PAD, 0);
    let out = &mut dst[offset..];

    BlockHeader {
        min_val,
        num_values: src.len() as u16,
        bit_width: width as u8,
    }
    .write(out);

    out[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&src[0].to_le_bytes());
    bitpack::pack64(&mut out[HEADER_LEN + 4..], &dods, width);
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
    add_const(&mut residuals, header.min_val);

    let mut d = 0i64;
    let mut prev = dst[0] as i64;
    for (out, &residual) in dst[1..n].iter_mut().zip(&residuals) {
        d = d.wrapping_add(residual);
        prev = prev.wrapping_add(d);
        *out = prev as i32;
    }
    Ok(n)
}

/// Appends one encoded block holding `src` to `dst`.
///
/// Differences are taken over the bit-cast i64 images of the values, so a
/// decreasing sequence keeps a (signed) negative frame-of-reference while
/// the round trip stays exact through two's-complement wraparound.
///
/// # Errors
/// Returns [`CodecError::BlockTooLarge`] if `src` exceeds
/// [`MAX_BLOCK_LEN`].
pub fn encode_u64(dst: &mut Vec<u8>, src: &[u64]) -> Result<()> {
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

    let mut dods = Vec::with_capacity(src.len() - 1);
    let mut min_val = i64::MAX;
    let mut d_prev = 0i64;
    for pair in src.windows(2) {
        let d = (pair[1] as i64).wrapping_sub(pair[0] as i64);
        let dod = d.wrapping_sub(d_prev);
        d_prev = d;
        min_val = min_val.min(dod);
        dods.push(dod);
    }

    let mut width = 0u32;
    for dod in dods.iter_mut() {
        *dod = dod.wrapping_sub(min_val);
        width = width.max(bitpack::bit_width(*dod as u64));
    }

    let packed = bitpack::byte_count(dods.len() * width as usize);
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN + 8 + packed + bitpack::SIMD_PAD, 0);
    let out = &mut dst[offset..];

    BlockHeader {
        min_val,
        num_values: src.len() as u16,
        bit_width: width as u8,
    }
    .write(out);

    out[HEADER_LEN..HEADER_LEN + 8].copy_from_slice(&src[0].to_le_bytes());
    bitpack::pack64(&mut out[HEADER_LEN + 8..], &dods, width);
    Ok(())
}

/// Decodes one block from the front of `src` into `dst` and returns the
/// number of values written.
///
/// # Errors
/// Returns an error when the header is truncated, the destination is too
/// small, or the payload cannot cover the header's value count.
pub fn decode_u64(dst: &mut [u64], src: &[u8]) -> Result<usize> {
    if src.is_empty() {
        return Ok(0);
    }
    let header = BlockHeader::read(src)?;
    let n = check_block(&header, src, dst.len(), 8)?;
    match n {
        0 => return Ok(0),
        1 => {
            dst[0] = header.min_val as u64;
            return Ok(1);
        }
        _ => {}
    }

    dst[0] = u64::from_le_bytes(src[HEADER_LEN..HEADER_LEN + 8].try_into().unwrap());
    {
        // Unpack straight into the destination through its i64 image.
        let lanes: &mut [i64] = bytemuck::cast_slice_mut(&mut dst[1..n]);
        bitpack::unpack64(lanes, &src[HEADER_LEN + 8..], header.bit_width as u32);
        add_const(lanes, header.min_val);
    }

    let mut d = 0u64;
    let mut prev = dst[0];
    for v in dst[1..n].iter_mut() {
        d = d.wrapping_add(*v);
        prev = prev.wrapping_add(d);
        *v = prev;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn roundtrip_i64(src: &[i64]) -> Vec<i64> {
        let mut block = Vec::new();
        encode_i64(&mut block, src).unwrap();
        let mut decoded = vec![0i64; MAX_BLOCK_LEN];
        let n = decode_i64(&mut decoded, &block).unwrap();
        decoded.truncate(n);
        decoded
    }

    fn roundtrip_i32(src: &[i32]) -> Vec<i32> {
        let mut block = Vec::new();
        encode_i32(&mut block, src).unwrap();
        let mut decoded = vec![0i32; MAX_BLOCK_LEN];
        let n = decode_i32(&mut decoded, &block).unwrap();
        decoded.truncate(n);
        decoded
    }

    fn roundtrip_u64(src: &[u64]) -> Vec<u64> {
        let mut block = Vec::new();
        encode_u64(&mut block, src).unwrap();
        let mut decoded = vec![0u64; MAX_BLOCK_LEN];
        let n = decode_u64(&mut decoded, &block).unwrap();
        decoded.truncate(n);
        decoded
    }

    #[test]
    fn test_roundtrip_corpus() {
        let cases: &[&[i64]] = &[
            &[],
            &[3],
            &[10, 15, 22, 31, 55],
            &[100000, 100001, 100002, 100003, 100004, 100005],
            &[99968, 100001, 100002, 100003, 100004],
            &[100, 90, 80, 70, 60],
            &[50, 100, 75, 125, 80],
            &[7, 7, 7, 7, 7, 7],
        ];
        for src in cases {
            assert_eq!(roundtrip_i64(src), *src);
            let narrowed: Vec<i32> = src.iter().map(|&v| v as i32).collect();
            assert_eq!(roundtrip_i32(&narrowed), narrowed);
            let widened: Vec<u64> = src.iter().map(|&v| v as u64).collect();
            assert_eq!(roundtrip_u64(&widened), widened);
        }
    }

    #[test]
    fn test_jittered_timestamps_stay_narrow() {
        // 15s cadence with small millisecond jitter. The first residual is
        // the full first delta (15000ms, 14 bits); every later residual is
        // jitter alone and would fit in 8.
        let base = 1_700_000_000_000i64;
        let jitter = [0i64, 13, -21, 40, -8, 17, 5, -33];
        let mut ts = Vec::with_capacity(jitter.len() + 1);
        let mut t = base;
        ts.push(t);
        for j in jitter {
            t += 15_000 + j;
            ts.push(t);
        }

        let mut block = Vec::new();
        encode_i64(&mut block, &ts).unwrap();
        let header = BlockHeader::read(&block).unwrap();
        assert!(header.bit_width <= 14, "width {}", header.bit_width);
        assert_eq!(roundtrip_i64(&ts), ts);
    }

    #[test]
    fn test_first_residual_is_first_delta() {
        // With d[0] = 0 the first residual is v[1] - v[0]; min_val holds
        // the smallest residual.
        let mut block = Vec::new();
        encode_i64(&mut block, &[1000, 1015, 1030, 1046]).unwrap();
        let header = BlockHeader::read(&block).unwrap();
        // Residuals: [15, 0, 1]; min is 0.
        assert_eq!(header.min_val, 0);
        assert_eq!(header.num_values, 4);
    }

    #[test]
    fn test_decreasing_u64_sequence() {
        let src = [u64::MAX, u64::MAX - 10, u64::MAX - 25, u64::MAX - 50];
        let mut block = Vec::new();
        encode_u64(&mut block, &src).unwrap();
        assert!(BlockHeader::read(&block).unwrap().min_val < 0);
        assert_eq!(roundtrip_u64(&src), src);
    }

    #[test]
    fn test_single_value_blocks() {
        assert_eq!(roundtrip_i64(&[-5]), [-5]);
        assert_eq!(roundtrip_i32(&[i32::MIN]), [i32::MIN]);
        assert_eq!(roundtrip_u64(&[u64::MAX]), [u64::MAX]);
    }

    #[test]
    fn test_i32_extreme_values_do_not_wrap() {
        let src = [i32::MAX, i32::MIN, i32::MAX, i32::MIN];
        assert_eq!(roundtrip_i32(&src), src);
    }

    #[test]
    fn test_block_too_large() {
        let src = vec![0u64; MAX_BLOCK_LEN + 1];
        assert!(matches!(
            encode_u64(&mut Vec::new(), &src),
            Err(CodecError::BlockTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let mut block = Vec::new();
        encode_i64(&mut block, &[10, 20, 40, 80, 160]).unwrap();
        block.truncate(HEADER_LEN + 2);
        let mut decoded = [0i64; 5];
        assert!(decode_i64(&mut decoded, &block).is_err());
    }

    #[test]
    fn test_roundtrip_random_full_range() {
        let mut rng = StdRng::seed_from_u64(20);
        for len in [2usize, 5, 64, 255, MAX_BLOCK_LEN] {
            let src: Vec<i64> = (0..len).map(|_| rng.random()).collect();
            assert_eq!(roundtrip_i64(&src), src, "len {len}");

            let src32: Vec<i32> = (0..len).map(|_| rng.random()).collect();
            assert_eq!(roundtrip_i32(&src32), src32, "len {len}");

            let srcu: Vec<u64> = (0..len).map(|_| rng.random()).collect();
            assert_eq!(roundtrip_u64(&srcu), srcu, "len {len}");
        }
    }
}
