//! Adaptive lossless floating-point (ALP) compression for f64 arrays.
//!
//! ALP looks for a decimal scale at which every value is integer-valued,
//! lifts the values to i64 at that scale, applies frame-of-reference, and
//! bit-packs the residuals. Typed sensor data with 1..4 decimal places
//! compresses to a few bits per value; data with no common decimal scale
//! (full-precision randoms, NaN, infinities) falls back to a raw
//! passthrough so the round trip stays bit-exact.
//!
//! ## Block layout (little-endian)
//!
//! Every block starts with a 23-byte header:
//!
//! ```text
//! offset  size  field
//! 0       1     encoding          (0 = None, 1 = Alp, 2 = Constant, 3 = Uncompressed)
//! 1       4     count             (i32)
//! 5       1     exponent          (i8, in [-10, 10])
//! 6       1     bit_width         (u8)
//! 7       8     frame_of_ref      (i64)
//! 15      8     constant_value    (f64 bits; meaningful for Constant only)
//! ```
//!
//! The payload depends on the encoding:
//!
//! - `Constant`, or `None` with `count == 0`: nothing.
//! - `None` with `count > 0`: `count` raw little-endian f64 values.
//! - `Alp`: `byte_count(count * bit_width) + 32` bytes of packed residuals.
//!
//! ## Choosing the exponent
//!
//! For each candidate exponent in `[-10, 10]` the encoder samples up to
//! 1024 evenly spaced values, scales each by `10^exp`, rounds to the
//! nearest even, and rejects the candidate if the scaled value is not
//! finite, does not fit an i64, or does not reconstruct within a relative
//! error of 1e-12. Among the surviving candidates the one whose sampled
//! lifts need the fewest bits wins, ties going to the numerically smallest
//! exponent. Sampling keeps the search off the encode hot path for large
//! inputs; a misclassified exponent costs compression ratio, not
//! correctness.

use crate::bitpack;
use crate::error::CodecError;
use crate::Result;

/// Size in bytes of the fixed ALP block header.
pub const HEADER_LEN: usize = 23;

/// Maximum number of values the exponent search samples from the input.
pub const SAMPLE_LEN: usize = 1024;

/// Smallest decimal exponent the search considers.
pub const MIN_EXPONENT: i32 = -10;

/// Largest decimal exponent the search considers.
pub const MAX_EXPONENT: i32 = 10;

/// Maximum relative reconstruction error the search accepts (absolute for
/// zero-valued samples).
const TOLERANCE: f64 = 1e-12;

/// Powers of ten from 1e-10 to 1e10; index `i` holds `10^(i - 10)`.
/// A table instead of `powi` keeps the scale factors identical between
/// encoder and decoder and off the per-value hot path.
const POWERS_OF_10: [f64; 21] = [
    1e-10, 1e-9, 1e-8, 1e-7, 1e-6, 1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1e0, 1e1, 1e2, 1e3, 1e4, 1e5,
    1e6, 1e7, 1e8, 1e9, 1e10,
];

/// Scale factor `10^exponent` for an exponent in `[-10, 10]`.
#[inline]
pub(crate) fn factor(exponent: i32) -> f64 {
    POWERS_OF_10[(exponent + 10) as usize]
}

/// How a block's payload is encoded, stored in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    /// Empty block, or, with a non-zero count, raw little-endian floats.
    None = 0,
    /// Lifted integers: frame-of-reference plus bit-packed residuals.
    Alp = 1,
    /// Every value equals the header's `constant_value`; no payload.
    Constant = 2,
    /// Reserved alias for the raw-floats payload.
    Uncompressed = 3,
}

impl Encoding {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Encoding::None),
            1 => Some(Encoding::Alp),
            2 => Some(Encoding::Constant),
            3 => Some(Encoding::Uncompressed),
            _ => None,
        }
    }
}

/// Self-describing metadata at the front of every ALP block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    /// Payload encoding.
    pub encoding: Encoding,
    /// Number of values in the block.
    pub count: i32,
    /// Decimal exponent of the lift, in `[-10, 10]`.
    pub exponent: i8,
    /// Uniform width of the packed residuals.
    pub bit_width: u8,
    /// Frame-of-reference baseline subtracted from every lifted value.
    pub frame_of_ref: i64,
    /// The repeated value of a `Constant` block.
    pub constant_value: f64,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            encoding: Encoding::None,
            count: 0,
            exponent: 0,
            bit_width: 0,
            frame_of_ref: 0,
            constant_value: 0.0,
        }
    }
}

impl Metadata {
    /// Writes the 23-byte header at the front of `dst`.
    pub fn write(&self, dst: &mut [u8]) {
        dst[0] = self.encoding as u8;
        dst[1..5].copy_from_slice(&self.count.to_le_bytes());
        dst[5] = self.exponent as u8;
        dst[6] = self.bit_width;
        dst[7..15].copy_from_slice(&self.frame_of_ref.to_le_bytes());
        dst[15..23].copy_from_slice(&self.constant_value.to_bits().to_le_bytes());
    }

    /// Reads the 23-byte header from the front of `src`.
    pub fn read(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(CodecError::InputTooShort {
                len: src.len(),
                need: HEADER_LEN,
            });
        }
        let encoding = Encoding::from_byte(src[0]).ok_or_else(|| {
            CodecError::InvalidBlock(format!("unknown encoding tag {}", src[0]))
        })?;
        Ok(Metadata {
            encoding,
            count: i32::from_le_bytes(src[1..5].try_into().unwrap()),
            exponent: src[5] as i8,
            bit_width: src[6],
            frame_of_ref: i64::from_le_bytes(src[7..15].try_into().unwrap()),
            constant_value: f64::from_bits(u64::from_le_bytes(src[15..23].try_into().unwrap())),
        })
    }
}

fn is_constant(data: &[f64]) -> bool {
    let first = data[0].to_bits();
    data[1..].iter().all(|v| v.to_bits() == first)
}

/// Finds the decimal exponent whose sampled lifts are lossless and need
/// the fewest bits, or `None` when no candidate round-trips within
/// tolerance.
pub(crate) fn find_best_exponent(data: &[f64]) -> Option<i32> {
    if data.is_empty() {
        return None;
    }
    let sample_len = data.len().min(SAMPLE_LEN);

    let mut best = None;
    let mut best_width = 64u32;
    for exponent in MIN_EXPONENT..=MAX_EXPONENT {
        let scale = factor(exponent);
        let mut max_width = 0u32;
        let mut valid = true;

        for i in 0..sample_len {
            // Index collisions on short inputs just reconsider a sample.
            let x = data[i * data.len() / sample_len];
            let scaled = x * scale;
            if !scaled.is_finite() {
                valid = false;
                break;
            }
            let rounded = scaled.round_ties_even();
            if rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
                valid = false;
                break;
            }
            let lifted = rounded as i64;

            let mut err = (x - lifted as f64 / scale).abs();
            if x != 0.0 {
                err /= x.abs();
            }
            if err > TOLERANCE {
                valid = false;
                break;
            }

            max_width = max_width.max(bitpack::bit_width_signed(lifted));
            if max_width > 63 {
                valid = false;
                break;
            }
        }

        if valid && max_width > 0 && max_width < best_width {
            best_width = max_width;
            best = Some(exponent);
        }
    }
    best
}

fn append_header(dst: &mut Vec<u8>, meta: Metadata) {
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN, 0);
    meta.write(&mut dst[offset..]);
}

fn encode_uncompressed(dst: &mut Vec<u8>, src: &[f64]) {
    append_header(
        dst,
        Metadata {
            count: src.len() as i32,
            ..Metadata::default()
        },
    );
    for &v in src {
        dst.extend_from_slice(&v.to_le_bytes());
    }
}

/// Appends one encoded block holding `src` to `dst`.
///
/// Picks the cheapest of four encodings: a bare header for empty input, a
/// `Constant` header when every value is bit-identical to the first, a
/// lifted-and-packed `Alp` block when a decimal exponent round-trips the
/// data, and a raw passthrough otherwise.
///
/// # Errors
/// Returns [`CodecError::BlockTooLarge`] if `src` exceeds the header's
/// i32 count range.
pub fn encode(dst: &mut Vec<u8>, src: &[f64]) -> Result<()> {
    if src.len() > i32::MAX as usize {
        return Err(CodecError::BlockTooLarge {
            len: src.len(),
            max: i32::MAX as usize,
        });
    }
    if src.is_empty() {
        append_header(dst, Metadata::default());
        return Ok(());
    }
    if is_constant(src) {
        append_header(
            dst,
            Metadata {
                encoding: Encoding::Constant,
                count: src.len() as i32,
                constant_value: src[0],
                ..Metadata::default()
            },
        );
        return Ok(());
    }

    let Some(exponent) = find_best_exponent(src) else {
        encode_uncompressed(dst, src);
        return Ok(());
    };
    let scale = factor(exponent);

    // Full-array lift. The `as` cast saturates at the i64 range and maps
    // NaN to zero, covering values the sample never saw.
    let mut lifted: Vec<i64> = src
        .iter()
        .map(|&x| (x * scale).round_ties_even() as i64)
        .collect();

    let min_val = lifted.iter().copied().min().unwrap_or(0);
    let mut width = 0u32;
    for v in lifted.iter_mut() {
        *v = v.wrapping_sub(min_val);
        width = width.max(bitpack::bit_width(*v as u64));
    }
    let width = width.max(1);
    if width > 63 {
        // A sample miss hid an overflowing lift; the packed form would not
        // round-trip, so fall back to the raw payload.
        encode_uncompressed(dst, src);
        return Ok(());
    }

    let packed = bitpack::byte_count(src.len() * width as usize);
    let offset = dst.len();
    dst.resize(offset + HEADER_LEN + packed + bitpack::SIMD_PAD, 0);
    let out = &mut dst[offset..];

    Metadata {
        encoding: Encoding::Alp,
        count: src.len() as i32,
        exponent: exponent as i8,
        bit_width: width as u8,
        frame_of_ref: min_val,
        constant_value: 0.0,
    }
    .write(out);
    bitpack::pack64(&mut out[HEADER_LEN..], &lifted, width);
    Ok(())
}

fn decode_raw(dst: &mut [f64], payload: &[u8], count: usize) -> Result<usize> {
    if dst.len() < count {
        return Err(CodecError::OutputTooSmall {
            len: dst.len(),
            need: count,
        });
    }
    if payload.len() < count * 8 {
        return Err(CodecError::InvalidBlock(format!(
            "raw payload of {} bytes cannot hold {count} values",
            payload.len()
        )));
    }
    for (v, chunk) in dst[..count].iter_mut().zip(payload.chunks_exact(8)) {
        *v = f64::from_le_bytes(chunk.try_into().unwrap());
    }
    Ok(count)
}

/// Decodes one block from the front of `src` into `dst` and returns the
/// number of values written.
///
/// # Errors
/// Returns an error when the header is truncated or carries an unknown
/// encoding tag, the destination is too small, or the payload cannot cover
/// the header's value count.
pub fn decode(dst: &mut [f64], src: &[u8]) -> Result<usize> {
    if src.is_empty() {
        return Ok(0);
    }
    let meta = Metadata::read(src)?;
    if meta.count < 0 {
        return Err(CodecError::InvalidBlock(format!(
            "negative count {}",
            meta.count
        )));
    }
    let count = meta.count as usize;

    match meta.encoding {
        Encoding::None | Encoding::Uncompressed if count == 0 => Ok(0),
        Encoding::None | Encoding::Uncompressed => {
            decode_raw(dst, &src[HEADER_LEN..], count)
        }
        Encoding::Constant => {
            if dst.len() < count {
                return Err(CodecError::OutputTooSmall {
                    len: dst.len(),
                    need: count,
                });
            }
            dst[..count].fill(meta.constant_value);
            Ok(count)
        }
        Encoding::Alp => {
            if dst.len() < count {
                return Err(CodecError::OutputTooSmall {
                    len: dst.len(),
                    need: count,
                });
            }
            if meta.bit_width == 0 || meta.bit_width > 63 {
                return Err(CodecError::InvalidBlock(format!(
                    "lifted block with bit width {}",
                    meta.bit_width
                )));
            }
            let payload = &src[HEADER_LEN..];
            if payload.len() < bitpack::byte_count(count * meta.bit_width as usize) {
                return Err(CodecError::InvalidBlock(format!(
                    "payload of {} bytes cannot hold {count} values at width {}",
                    payload.len(),
                    meta.bit_width
                )));
            }

            // Unpack through the destination's i64 image, then rewrite each
            // lane with the bits of its reconstructed float.
            let out = &mut dst[..count];
            let lanes: &mut [i64] = bytemuck::cast_slice_mut(out);
            bitpack::unpack64(lanes, payload, meta.bit_width as u32);

            let min_val = meta.frame_of_ref;
            let scale = factor(meta.exponent as i32);
            for lane in lanes.iter_mut() {
                let value = lane.wrapping_add(min_val) as f64 / scale;
                *lane = value.to_bits() as i64;
            }
            Ok(count)
        }
    }
}

/// Ratio of `compressed_len` to the raw size of `original_count` f64
/// values. Smaller is better; 1.0 means no gain.
pub fn compression_ratio(original_count: usize, compressed_len: usize) -> f64 {
    let original = original_count * 8;
    if original == 0 {
        return 0.0;
    }
    compressed_len as f64 / original as f64
}
