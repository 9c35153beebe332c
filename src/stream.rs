//! Streaming ALP: one global header followed by equal-sized packed
//! sub-blocks.
//!
//! The encoder buffers values across any number of [`StreamEncoder::encode`]
//! calls and flushes them as a single block:
//!
//! ```text
//! [ALP header (23 B)] [sub-block 0] [sub-block 1] ... [sub-block k-1]
//! ```
//!
//! Every sub-block holds `block_size` values (the last may be short) packed
//! at the header's global exponent, frame-of-reference and bit width, and
//! carries its own 32-byte tail pad; sub-blocks have no headers of their
//! own. The header stays byte-compatible with the one-shot ALP codec, which
//! means `block_size` is an out-of-band contract between encoder and
//! decoder.
//!
//! The decoder materialises one sub-block at a time into an internal
//! scratch buffer, so a consumer can drain a block of any size through a
//! fixed-size destination without ever allocating the full decoded array.

use crate::alp::{factor, find_best_exponent, Encoding, Metadata, HEADER_LEN};
use crate::bitpack;
use crate::error::CodecError;
use crate::Result;

/// Accumulates f64 values and flushes them as one streaming ALP block.
///
/// Unlike the one-shot encoder there is no per-type escape hatch in the
/// streamed layout: when no decimal exponent round-trips the buffered data
/// the encoder lifts at exponent 0, which clamps NaN, infinities and
/// values beyond the i64 range. For such inputs the round trip is not
/// bit-exact; feed them to the one-shot codec instead.
#[derive(Debug, Default)]
pub struct StreamEncoder {
    data: Vec<f64>,
    block_size: usize,
}

impl StreamEncoder {
    /// Creates an encoder that packs `block_size` values per sub-block.
    ///
    /// # Panics
    /// Panics if `block_size` is zero.
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        StreamEncoder {
            data: Vec::new(),
            block_size,
        }
    }

    /// Drops all buffered values and switches to a new sub-block size.
    ///
    /// # Panics
    /// Panics if `block_size` is zero.
    pub fn reset(&mut self, block_size: usize) {
        assert!(block_size > 0, "block size must be non-zero");
        self.data.clear();
        self.block_size = block_size;
    }

    /// Appends `src` to the buffer of values flushed by the next
    /// [`flush`](Self::flush).
    pub fn encode(&mut self, src: &[f64]) {
        self.data.extend_from_slice(src);
    }

    /// Encodes everything buffered so far into a single block and returns
    /// it. Returns an empty vector when nothing is buffered; the buffer is
    /// left intact either way (clear it with [`reset`](Self::reset)).
    pub fn flush(&mut self) -> Vec<u8> {
        if self.data.is_empty() {
            return Vec::new();
        }
        assert!(
            self.data.len() <= i32::MAX as usize,
            "buffered value count exceeds the header range"
        );

        let exponent = find_best_exponent(&self.data).unwrap_or(0);
        let scale = factor(exponent);

        let mut lifted: Vec<i64> = self
            .data
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

        let total = lifted.len();
        let sub_blocks = total.div_ceil(self.block_size);
        let mut payload_len = 0;
        for b in 0..sub_blocks {
            let len = self.block_size.min(total - b * self.block_size);
            payload_len += bitpack::padded_len(len, width);
        }

        let mut out = vec![0u8; HEADER_LEN + payload_len];
        Metadata {
            encoding: Encoding::Alp,
            count: total as i32,
            exponent: exponent as i8,
            bit_width: width as u8,
            frame_of_ref: min_val,
            constant_value: 0.0,
        }
        .write(&mut out);

        let mut offset = HEADER_LEN;
        for sub in lifted.chunks(self.block_size) {
            let len = bitpack::padded_len(sub.len(), width);
            bitpack::pack64(&mut out[offset..offset + len], sub, width);
            offset += len;
        }
        out
    }
}

/// One-call streaming encode: buffers `src`, flushes a single block, and
/// appends it to `dst`.
pub fn stream_encode(dst: &mut Vec<u8>, src: &[f64], block_size: usize) {
    let mut encoder = StreamEncoder::new(block_size);
    encoder.encode(src);
    dst.extend_from_slice(&encoder.flush());
}

/// Incrementally decodes a streaming ALP block produced by
/// [`StreamEncoder`].
///
/// `block_size` must match the encoder's; it is not recorded in the block.
#[derive(Debug)]
pub struct StreamDecoder<'a> {
    buf: &'a [u8],
    meta: Metadata,
    block_size: usize,
    decoded: Vec<f64>,
    decoded_offset: usize,
    values_read: usize,
}

impl<'a> StreamDecoder<'a> {
    /// Creates a decoder over an encoded block.
    ///
    /// # Panics
    /// Panics if `block_size` is zero.
    pub fn new(buf: &'a [u8], block_size: usize) -> Self {
        let mut decoder = StreamDecoder {
            buf: &[],
            meta: Metadata::default(),
            block_size: 1,
            decoded: Vec::new(),
            decoded_offset: 0,
            values_read: 0,
        };
        decoder.reset(buf, block_size);
        decoder
    }

    /// Points the decoder at a new block and rewinds all cursors. A buffer
    /// shorter than the header decodes as empty.
    ///
    /// # Panics
    /// Panics if `block_size` is zero.
    pub fn reset(&mut self, buf: &'a [u8], block_size: usize) {
        assert!(block_size > 0, "block size must be non-zero");
        self.buf = &[];
        self.meta = Metadata::default();
        self.block_size = block_size;
        self.decoded.clear();
        self.decoded_offset = 0;
        self.values_read = 0;

        if buf.len() >= HEADER_LEN {
            if let Ok(meta) = Metadata::read(buf) {
                self.meta = meta;
                self.buf = &buf[HEADER_LEN..];
            }
        }
    }

    /// Copies up to `dst.len()` decoded values into the front of `dst`,
    /// returning how many were filled and whether the stream is exhausted.
    /// Once exhausted, further calls return `(0, true)`.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidBlock`] when the remaining payload is
    /// shorter than the next sub-block requires.
    pub fn decode(&mut self, dst: &mut [f64]) -> Result<(usize, bool)> {
        let total = self.meta.count.max(0) as usize;
        if self.values_read >= total {
            return Ok((0, true));
        }
        if self.decoded_offset >= self.decoded.len() {
            self.decode_sub_block(total)?;
        }

        let n = dst.len().min(self.decoded.len() - self.decoded_offset);
        dst[..n].copy_from_slice(&self.decoded[self.decoded_offset..self.decoded_offset + n]);
        self.decoded_offset += n;
        self.values_read += n;
        Ok((n, self.values_read >= total))
    }

    /// Unpacks the next sub-block into the scratch buffer and advances the
    /// payload cursor past it, pad included.
    fn decode_sub_block(&mut self, total: usize) -> Result<()> {
        let len = self.block_size.min(total - self.values_read);
        let width = self.meta.bit_width as u32;

        let logical = bitpack::byte_count(len * width as usize);
        if self.buf.len() < logical {
            return Err(CodecError::InvalidBlock(format!(
                "sub-block needs {logical} bytes, {} remain",
                self.buf.len()
            )));
        }
        let mut packed = logical;
        if width != 0 {
            packed += bitpack::SIMD_PAD;
        }

        self.decoded.clear();
        self.decoded.resize(len, 0.0);
        let lanes: &mut [i64] = bytemuck::cast_slice_mut(&mut self.decoded);
        bitpack::unpack64(lanes, self.buf, width);

        let min_val = self.meta.frame_of_ref;
        let scale = factor(self.meta.exponent as i32);
        for lane in lanes.iter_mut() {
            let value = lane.wrapping_add(min_val) as f64 / scale;
            *lane = value.to_bits() as i64;
        }

        self.buf = &self.buf[packed.min(self.buf.len())..];
        self.decoded_offset = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alp;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn drain(block: &[u8], block_size: usize, buf_size: usize) -> Vec<f64> {
        let mut decoder = StreamDecoder::new(block, block_size);
        let mut out = Vec::new();
        let mut buf = vec![0.0f64; buf_size];
        loop {
            let (n, eof) = decoder.decode(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if eof {
                return out;
            }
        }
    }

    #[test]
    fn test_roundtrip_corpus() {
        let large: Vec<f64> = (0..1000).map(|i| i as f64 / 10.0).collect();
        let cases: &[(&[f64], usize)] = &[
            (&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3),
            (&[1.0, 2.0, 3.0, 4.0, 5.0], 3),
            (&[1.1, 2.2, 3.3, 4.4, 5.5, 6.6, 7.7, 8.8], 120),
            (&[1.0, 2.0, 3.0, 100.0, 101.0, 102.0, 1000.0, 1001.0, 1002.0], 3),
            (&large, 120),
        ];
        for (src, block_size) in cases {
            let mut block = Vec::new();
            stream_encode(&mut block, src, *block_size);
            let decoded = drain(&block, *block_size, *block_size);
            assert_eq!(&decoded, src, "block size {block_size}");
        }
    }

    #[test]
    fn test_read_buffer_smaller_than_block() {
        let src = [1.1, 2.2, 3.2, 4.4, 5.5, 6.6, 7.7, 8.8, 9.9, 10.0];
        let mut block = Vec::new();
        stream_encode(&mut block, &src, 120);
        assert_eq!(drain(&block, 120, 3), src);
        assert_eq!(drain(&block, 120, 4), src);
        assert_eq!(drain(&block, 120, 1), src);
    }

    #[test]
    fn test_streaming_matches_one_shot_bit_exactly() {
        // Same exponent search, same lift, same reconstruction: a streamed
        // block must decode to the identical doubles the one-shot path
        // produces for the same values.
        let src: Vec<f64> = (0..500).map(|i| 20.0 + (i as f64) * 0.015).collect();

        let mut one_shot_block = Vec::new();
        alp::encode(&mut one_shot_block, &src).unwrap();
        let mut one_shot = vec![0.0f64; src.len()];
        alp::decode(&mut one_shot, &one_shot_block).unwrap();

        let mut block = Vec::new();
        stream_encode(&mut block, &src, 64);
        let streamed = drain(&block, 64, 17);

        let want: Vec<u64> = one_shot.iter().map(|v| v.to_bits()).collect();
        let got: Vec<u64> = streamed.iter().map(|v| v.to_bits()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_sub_blocks_share_global_header() {
        let src: Vec<f64> = (0..10).map(|i| i as f64 + 0.5).collect();
        let mut block = Vec::new();
        stream_encode(&mut block, &src, 4);

        let meta = Metadata::read(&block).unwrap();
        assert_eq!(meta.encoding, Encoding::Alp);
        assert_eq!(meta.count, 10);
        // Sub-blocks of 4, 4 and 2 values, each individually padded.
        let expected = HEADER_LEN
            + 2 * bitpack::padded_len(4, meta.bit_width as u32)
            + bitpack::padded_len(2, meta.bit_width as u32);
        assert_eq!(block.len(), expected);
    }

    #[test]
    fn test_flush_empty_returns_nothing() {
        let mut encoder = StreamEncoder::new(8);
        assert!(encoder.flush().is_empty());
    }

    #[test]
    fn test_incremental_encode_calls_accumulate() {
        let mut encoder = StreamEncoder::new(5);
        encoder.encode(&[1.5, 2.5]);
        encoder.encode(&[3.5]);
        encoder.encode(&[4.5, 5.5, 6.5]);
        let block = encoder.flush();
        assert_eq!(drain(&block, 5, 2), [1.5, 2.5, 3.5, 4.5, 5.5, 6.5]);
    }

    #[test]
    fn test_decode_after_eof_stays_empty() {
        let mut block = Vec::new();
        stream_encode(&mut block, &[1.0, 2.0], 2);
        let mut decoder = StreamDecoder::new(&block, 2);
        let mut buf = [0.0f64; 4];
        assert_eq!(decoder.decode(&mut buf).unwrap(), (2, true));
        assert_eq!(decoder.decode(&mut buf).unwrap(), (0, true));
    }

    #[test]
    fn test_reset_rewinds_cursors() {
        let src = [10.0, 20.0, 30.0, 40.0];
        let mut block = Vec::new();
        stream_encode(&mut block, &src, 2);

        let mut decoder = StreamDecoder::new(&block, 2);
        let mut buf = [0.0f64; 4];
        decoder.decode(&mut buf).unwrap();
        decoder.reset(&block, 2);
        assert_eq!(drain(&block, 2, 4), src);
    }

    #[test]
    fn test_short_buffer_decodes_as_empty() {
        let mut decoder = StreamDecoder::new(&[0u8; 10], 4);
        let mut buf = [0.0f64; 4];
        assert_eq!(decoder.decode(&mut buf).unwrap(), (0, true));
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let src: Vec<f64> = (0..64).map(|i| i as f64 * 1.5).collect();
        let mut block = Vec::new();
        stream_encode(&mut block, &src, 16);
        block.truncate(HEADER_LEN + 2);

        let mut decoder = StreamDecoder::new(&block, 16);
        let mut buf = [0.0f64; 16];
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_roundtrip_random_chunkings() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let len = rng.random_range(1..=255usize);
            let block_size = rng.random_range(1..=130usize);
            let buf_size = rng.random_range(1..=130usize);
            // Two decimal places so every candidate survives the lift.
            let src: Vec<f64> = (0..len)
                .map(|_| (rng.random::<f64>() * 10_000.0).round() / 100.0)
                .collect();

            let mut block = Vec::new();
            stream_encode(&mut block, &src, block_size);
            let decoded = drain(&block, block_size, buf_size);
            assert_eq!(decoded.len(), src.len());
            for (got, want) in decoded.iter().zip(&src) {
                let err = (got - want).abs() / want.abs().max(1.0);
                assert!(err <= 1e-12, "got {got}, want {want}");
            }
        }
    }
}
