//! Architecture-specific fast paths for bit unpacking.
//!
//! Only x86-64 with AVX2 is specialised: the hot loop of every decoder is
//! the 64-bit-lane unpack at widths 1..=32, which maps onto a per-lane
//! 8-byte gather, a variable right shift, and a mask. Selection happens at
//! runtime through CPU-feature detection; the result of the first probe is
//! cached process-wide. The scalar implementation in `bitpack` remains the
//! reference: both paths must produce byte-identical output.
//!
//! The whole module is compiled out under the `portable` feature.

use std::arch::x86_64::*;

/// Whether the AVX2 fast paths may be used on this CPU.
#[inline]
pub fn avx2_available() -> bool {
    is_x86_feature_detected!("avx2")
}

/// Unpacks `dst.len()` lanes of `bit_width` bits each (1..=32),
/// zero-extending every lane.
///
/// Each lane is fetched with an unaligned 8-byte load at its starting byte
/// `bit_pos / 8`, shifted right by the in-byte offset `bit_pos % 8`, and
/// masked down to `bit_width` bits; with `bit_width <= 32` the value spans
/// at most 39 bits of the load, so no lane straddles the window.
///
/// # Safety
/// The caller must ensure AVX2 is available and that `src` extends at
/// least 8 bytes past the starting byte of the last lane. Payloads carrying
/// the 32-byte tail pad always satisfy this.
#[target_feature(enable = "avx2")]
pub unsafe fn unpack64_avx2(dst: &mut [i64], src: &[u8], bit_width: u32) {
    debug_assert!((1..=32).contains(&bit_width));

    let width = bit_width as usize;
    let lane_mask = (1u64 << bit_width) - 1;
    let mask = _mm256_set1_epi64x(lane_mask as i64);
    let base = src.as_ptr();
    let n = dst.len();

    let mut i = 0usize;
    while i + 4 <= n {
        let b0 = i * width;
        let b1 = b0 + width;
        let b2 = b1 + width;
        let b3 = b2 + width;
        let offsets = _mm256_set_epi64x(
            (b3 >> 3) as i64,
            (b2 >> 3) as i64,
            (b1 >> 3) as i64,
            (b0 >> 3) as i64,
        );
        let shifts = _mm256_set_epi64x(
            (b3 & 7) as i64,
            (b2 & 7) as i64,
            (b1 & 7) as i64,
            (b0 & 7) as i64,
        );
        let lanes = _mm256_i64gather_epi64::<1>(base as *const i64, offsets);
        let out = _mm256_and_si256(_mm256_srlv_epi64(lanes, shifts), mask);
        _mm256_storeu_si256(dst.as_mut_ptr().add(i) as *mut __m256i, out);
        i += 4;
    }

    let mut bit_pos = i * width;
    for v in dst[i..].iter_mut() {
        let word = std::ptr::read_unaligned(base.add(bit_pos >> 3) as *const u64);
        *v = ((u64::from_le(word) >> (bit_pos & 7)) & lane_mask) as i64;
        bit_pos += width;
    }
}

#[cfg(test)]
mod tests {
    use crate::bitpack::{byte_count, pack64, padded_len};

    // The scalar path is the reference; the AVX2 path must match it
    // bit-for-bit on every width it claims.
    #[test]
    fn test_avx2_matches_scalar() {
        if !super::avx2_available() {
            return;
        }
        for width in 1..=32u32 {
            let max = (1u64 << width) - 1;
            let values: Vec<i64> = (0..261)
                .map(|i| ((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) & max) as i64)
                .collect();
            let mut packed = vec![0u8; padded_len(values.len(), width)];
            pack64(&mut packed, &values, width);

            let mut fast = vec![0i64; values.len()];
            assert!(packed.len() >= byte_count(values.len() * width as usize) + 8);
            unsafe { super::unpack64_avx2(&mut fast, &packed, width) };
            assert_eq!(fast, values, "width {width}");
        }
    }
}
