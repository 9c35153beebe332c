//! # tscodec
//!
//! Lossless numeric column codecs for time-series workloads: dense blocks
//! of `f64` measurements and monotonically growing or slowly varying
//! integers (timestamps, counters, sums) compressed at multi-GB/s per
//! core into self-describing byte blocks that can be concatenated into a
//! larger chunk format.
//!
//! ## Codecs
//!
//! | Codec | Input | Transform |
//! |-------|-------|-----------|
//! | [`alp`] | `f64` | decimal-scale lift to i64, frame-of-reference, bit-pack |
//! | [`stream`] | `f64` | ALP with one global header over equal-sized sub-blocks |
//! | [`delta`] | `i32`, `i64` | first difference, frame-of-reference, bit-pack |
//! | [`dod`] | `i32`, `i64`, `u64` | second difference, frame-of-reference, bit-pack |
//! | [`bitpack`] | lanes | the shared fixed-width packing primitive |
//!
//! Every block is a fixed header followed by a packed payload and a
//! 32-byte tail that lets SIMD unpackers load past the last logical value.
//! All multi-byte fields are little-endian. Blocks are independent: a
//! consumer may decode many of them concurrently, and no codec holds
//! process-wide mutable state.
//!
//! ## Quick Start
//!
//! ```rust
//! use tscodec::{alp, delta};
//!
//! // Integers: delta + frame-of-reference + bit-packing.
//! let mut block = Vec::new();
//! delta::encode_i64(&mut block, &[10, 15, 22, 31, 55]).unwrap();
//!
//! let mut values = [0i64; 8];
//! let n = delta::decode_i64(&mut values, &block).unwrap();
//! assert_eq!(&values[..n], &[10, 15, 22, 31, 55]);
//!
//! // Floats: adaptive lossless floating-point compression.
//! let mut block = Vec::new();
//! alp::encode(&mut block, &[1.1, 2.2, 3.3, 4.4, 5.5]).unwrap();
//!
//! let mut values = [0.0f64; 8];
//! let n = alp::decode(&mut values, &block).unwrap();
//! assert_eq!(&values[..n], &[1.1, 2.2, 3.3, 4.4, 5.5]);
//! ```
//!
//! Decoding incrementally through a fixed-size buffer:
//!
//! ```rust
//! use tscodec::{stream_encode, StreamDecoder};
//!
//! let samples: Vec<f64> = (0..500).map(|i| (215 + i % 7) as f64 / 10.0).collect();
//! let mut block = Vec::new();
//! stream_encode(&mut block, &samples, 128);
//!
//! let mut decoder = StreamDecoder::new(&block, 128);
//! let mut chunk = [0.0f64; 48];
//! let mut decoded = Vec::new();
//! loop {
//!     let (n, eof) = decoder.decode(&mut chunk).unwrap();
//!     decoded.extend_from_slice(&chunk[..n]);
//!     if eof {
//!         break;
//!     }
//! }
//! assert_eq!(decoded, samples);
//! ```
//!
//! ## Concatenating blocks
//!
//! A composite encoder may pack many codec blocks into one buffer and trim
//! the 32-byte pads between them, because each decoder only consumes the
//! bits its own header describes. Such a consumer must decode strictly
//! front-to-back and keep a real pad at the end of the combined buffer;
//! see [`bitpack`] for the contract.
//!
//! ## Errors
//!
//! Encoders fail only on out-of-contract input (a block above the
//! 4,096-value cap). Decoders of untrusted bytes bound-check the header,
//! the destination capacity and the payload length, and return a
//! [`CodecError`] on any mismatch; corrupted payloads inside a well-formed
//! frame decode to garbage values, never out-of-bounds access. ALP signals
//! "could not compress" in-band with a raw passthrough block instead of an
//! error.
//!
//! ## Features
//!
//! - `portable` disables all architecture-specific code. The default
//!   build selects an AVX2 unpack fast path at runtime on x86-64; the
//!   scalar fallback produces byte-identical output.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alp;
pub mod bitpack;
pub mod delta;
pub mod dod;
mod error;
#[cfg(all(target_arch = "x86_64", not(feature = "portable")))]
mod simd;
pub mod stream;

pub use error::CodecError;
pub use stream::{stream_encode, StreamDecoder, StreamEncoder};

/// Convenience type alias for Results with [`CodecError`].
pub type Result<T> = std::result::Result<T, CodecError>;
