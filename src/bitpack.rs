//! Fixed-width bit packing and unpacking of integer lanes.
//!
//! Values are stored as a dense little-endian bit stream: the low
//! `bit_width` bits of each lane are written least-significant bit first,
//! with no per-value alignment. Unpacking extracts the same `bit_width`
//! bits and zero-extends them into the destination lane, so packing then
//! unpacking yields `x mod 2^bit_width`; for non-negative `x < 2^bit_width`
//! the round trip is the identity.
//!
//! ## Padded readout
//!
//! Every packed payload is followed by a [`SIMD_PAD`]-byte tail so that a
//! wide unpack may load a full register past the last logical value. The
//! tail is a format contract, not a convenience: consumers that concatenate
//! blocks and strip intermediate padding must decode front-to-back and keep
//! a real 32-byte pad at the end of the combined buffer. The scalar paths
//! in this module fall back to bounds-checked partial loads, so even
//! un-padded input is read safely (if slowly).
//!
//! ## Special widths
//!
//! - `bit_width == 0` is a legal identity: packing writes nothing and
//!   unpacking clears the destination.
//! - `bit_width == 64` (`32` for the 32-bit-lane variant) is a plain
//!   byte-copy fast path.
//! - Widths `1..=32` of the 64-bit-lane unpack take a vectorised fast path
//!   on x86-64 with AVX2 unless the `portable` feature is enabled; the
//!   scalar fallback produces byte-identical output.

/// Number of padding bytes after every packed payload, sized so a 32-byte
/// vector load at the last logical value stays in bounds.
pub const SIMD_PAD: usize = 32;

/// Number of bytes needed to hold `bits` bits.
pub const fn byte_count(bits: usize) -> usize {
    (bits + 7) / 8
}

/// Total payload length for `num_values` packed lanes of `bit_width` bits,
/// including the [`SIMD_PAD`] tail.
pub const fn padded_len(num_values: usize, bit_width: u32) -> usize {
    byte_count(num_values * bit_width as usize) + SIMD_PAD
}

/// Minimum number of bits needed to represent `value` as an unsigned
/// integer. Zero needs zero bits.
#[inline]
pub fn bit_width(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Minimum number of bits needed to represent `value` in two's complement,
/// measured through its zig-zag image so that small negative values stay
/// narrow.
#[inline]
pub fn bit_width_signed(value: i64) -> u32 {
    bit_width((value.wrapping_shl(1) ^ (value >> 63)) as u64)
}

/// Packs the low `bit_width` bits of each lane in `src` into `dst`.
///
/// `dst` must be zero-initialised: the packer ORs bits into place and
/// leaves the trailing pad bytes untouched.
///
/// # Panics
/// Panics if `bit_width > 64` or if `dst` is shorter than
/// `byte_count(src.len() * bit_width)`.
pub fn pack64(dst: &mut [u8], src: &[i64], bit_width: u32) {
    assert!(bit_width <= 64, "bit width {bit_width} exceeds 64");
    if bit_width == 0 || src.is_empty() {
        return;
    }
    assert!(
        dst.len() >= byte_count(src.len() * bit_width as usize),
        "destination too small for {} lanes of {} bits",
        src.len(),
        bit_width,
    );

    if bit_width == 64 {
        for (out, &v) in dst.chunks_exact_mut(8).zip(src) {
            out.copy_from_slice(&v.to_le_bytes());
        }
        return;
    }

    let mask = (1u64 << bit_width) - 1;
    let mut bit_pos = 0usize;
    for &v in src {
        let byte = bit_pos >> 3;
        let shift = bit_pos & 7;
        let window = ((v as u64 & mask) as u128) << shift;
        let bytes = window.to_le_bytes();
        let n = (shift + bit_width as usize).div_ceil(8);
        for (out, b) in dst[byte..byte + n].iter_mut().zip(bytes) {
            *out |= b;
        }
        bit_pos += bit_width as usize;
    }
}

/// Unpacks `dst.len()` lanes of `bit_width` bits each from `src`,
/// zero-extending every lane.
///
/// Reads `byte_count(dst.len() * bit_width)` logical bytes and, on the
/// vectorised path, up to 8 bytes beyond them (covered by the payload's
/// [`SIMD_PAD`] tail).
///
/// # Panics
/// Panics if `bit_width > 64` or if `src` is shorter than
/// `byte_count(dst.len() * bit_width)`.
pub fn unpack64(dst: &mut [i64], src: &[u8], bit_width: u32) {
    assert!(bit_width <= 64, "bit width {bit_width} exceeds 64");
    if dst.is_empty() {
        return;
    }
    if bit_width == 0 {
        dst.fill(0);
        return;
    }
    let logical = byte_count(dst.len() * bit_width as usize);
    assert!(
        src.len() >= logical,
        "source too small for {} lanes of {} bits",
        dst.len(),
        bit_width,
    );

    if bit_width == 64 {
        for (v, chunk) in dst.iter_mut().zip(src.chunks_exact(8)) {
            *v = i64::from_le_bytes(chunk.try_into().unwrap());
        }
        return;
    }

    #[cfg(all(target_arch = "x86_64", not(feature = "portable")))]
    if bit_width <= 32 && src.len() >= logical + 8 && crate::simd::avx2_available() {
        // Safety: AVX2 is present and `src` extends at least 8 bytes past
        // the byte offset of the last lane.
        unsafe { crate::simd::unpack64_avx2(dst, src, bit_width) };
        return;
    }

    unpack64_scalar(dst, src, bit_width);
}

fn unpack64_scalar(dst: &mut [i64], src: &[u8], bit_width: u32) {
    let mask = (1u128 << bit_width) - 1;
    let mut bit_pos = 0usize;
    for v in dst.iter_mut() {
        let window = load_window16(src, bit_pos >> 3);
        *v = ((window >> (bit_pos & 7)) & mask) as i64;
        bit_pos += bit_width as usize;
    }
}

/// Loads 16 little-endian bytes starting at `at`, zero-filling whatever
/// lies past the end of `src`. The fast path hits whenever the payload
/// carries its [`SIMD_PAD`] tail.
#[inline]
fn load_window16(src: &[u8], at: usize) -> u128 {
    match src.get(at..at + 16) {
        Some(window) => u128::from_le_bytes(window.try_into().unwrap()),
        None => {
            let mut buf = [0u8; 16];
            let tail = &src[at.min(src.len())..];
            buf[..tail.len()].copy_from_slice(tail);
            u128::from_le_bytes(buf)
        }
    }
}

/// 32-bit-lane variant of [`pack64`].
///
/// # Panics
/// Panics if `bit_width > 32` or if `dst` is shorter than
/// `byte_count(src.len() * bit_width)`.
pub fn pack32(dst: &mut [u8], src: &[i32], bit_width: u32) {
    assert!(bit_width <= 32, "bit width {bit_width} exceeds 32");
    if bit_width == 0 || src.is_empty() {
        return;
    }
    assert!(
        dst.len() >= byte_count(src.len() * bit_width as usize),
        "destination too small for {} lanes of {} bits",
        src.len(),
        bit_width,
    );

    if bit_width == 32 {
        for (out, &v) in dst.chunks_exact_mut(4).zip(src) {
            out.copy_from_slice(&v.to_le_bytes());
        }
        return;
    }

    let mask = (1u64 << bit_width) - 1;
    let mut bit_pos = 0usize;
    for &v in src {
        let byte = bit_pos >> 3;
        let shift = bit_pos & 7;
        let window = (v as u32 as u64 & mask) << shift;
        let bytes = window.to_le_bytes();
        let n = (shift + bit_width as usize).div_ceil(8);
        for (out, b) in dst[byte..byte + n].iter_mut().zip(bytes) {
            *out |= b;
        }
        bit_pos += bit_width as usize;
    }
}

/// 32-bit-lane variant of [`unpack64`].
///
/// # Panics
/// Panics if `bit_width > 32` or if `src` is shorter than
/// `byte_count(dst.len() * bit_width)`.
pub fn unpack32(dst: &mut [i32], src: &[u8], bit_width: u32) {
    assert!(bit_width <= 32, "bit width {bit_width} exceeds 32");
    if dst.is_empty() {
        return;
    }
    if bit_width == 0 {
        dst.fill(0);
        return;
    }
    assert!(
        src.len() >= byte_count(dst.len() * bit_width as usize),
        "source too small for {} lanes of {} bits",
        dst.len(),
        bit_width,
    );

    if bit_width == 32 {
        for (v, chunk) in dst.iter_mut().zip(src.chunks_exact(4)) {
            *v = i32::from_le_bytes(chunk.try_into().unwrap());
        }
        return;
    }

    let mask = (1u64 << bit_width) - 1;
    let mut bit_pos = 0usize;
    for v in dst.iter_mut() {
        let window = load_window8(src, bit_pos >> 3);
        *v = ((window >> (bit_pos & 7)) & mask) as i32;
        bit_pos += bit_width as usize;
    }
}

#[inline]
fn load_window8(src: &[u8], at: usize) -> u64 {
    match src.get(at..at + 8) {
        Some(window) => u64::from_le_bytes(window.try_into().unwrap()),
        None => {
            let mut buf = [0u8; 8];
            let tail = &src[at.min(src.len())..];
            buf[..tail.len()].copy_from_slice(tail);
            u64::from_le_bytes(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip64(values: &[i64], width: u32) -> Vec<i64> {
        let mut packed = vec![0u8; padded_len(values.len(), width)];
        pack64(&mut packed, values, width);
        let mut unpacked = vec![0i64; values.len()];
        unpack64(&mut unpacked, &packed, width);
        unpacked
    }

    #[test]
    fn test_pack64_roundtrip_small_widths() {
        assert_eq!(roundtrip64(&[0, 1, 1, 0, 1], 1), vec![0, 1, 1, 0, 1]);
        assert_eq!(roundtrip64(&[0, 1, 7, 15], 4), vec![0, 1, 7, 15]);
        assert_eq!(roundtrip64(&[0, 1, 127, 255], 8), vec![0, 1, 127, 255]);
        assert_eq!(
            roundtrip64(&[0, 100, 1000, 65535], 16),
            vec![0, 100, 1000, 65535]
        );
    }

    #[test]
    fn test_pack64_roundtrip_all_widths() {
        for width in 1..=64u32 {
            let max = if width == 64 {
                u64::MAX
            } else {
                (1u64 << width) - 1
            };
            let values: Vec<i64> = (0..67)
                .map(|i| ((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) & max) as i64)
                .collect();
            assert_eq!(roundtrip64(&values, width), values, "width {width}");
        }
    }

    #[test]
    fn test_pack64_truncates_to_width() {
        // 19 fits in 5 bits; 37 = 0b100101 does not, and keeps only its
        // low 5 bits 0b00101.
        assert_eq!(roundtrip64(&[19, 37], 5), vec![19, 5]);
    }

    #[test]
    fn test_pack64_width_zero_is_identity() {
        let mut packed = vec![0xAAu8; padded_len(4, 0)];
        pack64(&mut packed, &[1, 2, 3, 4], 0);
        assert!(packed.iter().all(|&b| b == 0xAA));

        let mut unpacked = vec![7i64; 4];
        unpack64(&mut unpacked, &packed, 0);
        assert_eq!(unpacked, vec![0; 4]);
    }

    #[test]
    fn test_pack64_width_64_is_byte_copy() {
        let values = [i64::MIN, -1, 0, 1, i64::MAX];
        let mut packed = vec![0u8; padded_len(values.len(), 64)];
        pack64(&mut packed, &values, 64);
        assert_eq!(&packed[..8], &i64::MIN.to_le_bytes());
        assert_eq!(roundtrip64(&values, 64), values);
    }

    #[test]
    fn test_unpack64_without_tail_pad() {
        // Exactly the logical bytes, no SIMD tail: the checked window load
        // must still decode correctly.
        let values: Vec<i64> = (0..13).map(|i| i * 3).collect();
        let width = 7;
        let mut packed = vec![0u8; padded_len(values.len(), width)];
        pack64(&mut packed, &values, width);
        packed.truncate(byte_count(values.len() * width as usize));

        let mut unpacked = vec![0i64; values.len()];
        unpack64(&mut unpacked, &packed, width);
        assert_eq!(unpacked, values);
    }

    #[test]
    #[should_panic(expected = "exceeds 64")]
    fn test_pack64_rejects_wide_width() {
        pack64(&mut [0u8; 64], &[1], 65);
    }

    #[test]
    #[should_panic(expected = "source too small")]
    fn test_unpack64_rejects_short_source() {
        let mut dst = [0i64; 16];
        unpack64(&mut dst, &[0u8; 4], 8);
    }

    #[test]
    fn test_pack32_roundtrip() {
        for width in 1..=32u32 {
            let max = if width == 32 {
                u32::MAX
            } else {
                (1u32 << width) - 1
            };
            let values: Vec<i32> = (0..35)
                .map(|i| ((i as u32).wrapping_mul(0x9E37_79B9) & max) as i32)
                .collect();
            let mut packed = vec![0u8; padded_len(values.len(), width)];
            pack32(&mut packed, &values, width);
            let mut unpacked = vec![0i32; values.len()];
            unpack32(&mut unpacked, &packed, width);
            assert_eq!(unpacked, values, "width {width}");
        }
    }

    #[test]
    fn test_bit_width() {
        assert_eq!(bit_width(0), 0);
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(2), 2);
        assert_eq!(bit_width(3), 2);
        assert_eq!(bit_width(4), 3);
        assert_eq!(bit_width(255), 8);
        assert_eq!(bit_width(256), 9);
        assert_eq!(bit_width(65535), 16);
        assert_eq!(bit_width(u64::MAX), 64);
    }

    #[test]
    fn test_bit_width_signed() {
        assert_eq!(bit_width_signed(0), 0);
        assert_eq!(bit_width_signed(-1), 1);
        assert_eq!(bit_width_signed(1), 2);
        assert_eq!(bit_width_signed(-64), 7);
        assert_eq!(bit_width_signed(63), 7);
        assert_eq!(bit_width_signed(i64::MAX), 64);
        assert_eq!(bit_width_signed(i64::MIN), 64);
    }

    #[test]
    fn test_byte_count() {
        assert_eq!(byte_count(0), 0);
        assert_eq!(byte_count(1), 1);
        assert_eq!(byte_count(8), 1);
        assert_eq!(byte_count(9), 2);
        assert_eq!(byte_count(4096 * 13), 6656);
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(0, 5), SIMD_PAD);
        assert_eq!(padded_len(4, 5), 3 + SIMD_PAD);
    }
}
