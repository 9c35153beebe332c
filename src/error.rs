//! Error types for codec encode/decode operations.

use thiserror::Error;

/// Errors that can occur while encoding or decoding codec blocks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The encoded input is shorter than the block's fixed-size header.
    #[error("encoded input too short: {len} bytes, header needs {need}")]
    InputTooShort {
        /// Length of the input that was provided.
        len: usize,
        /// Minimum number of bytes required.
        need: usize,
    },

    /// The destination slice cannot hold the decoded values.
    #[error("destination holds {len} values, block carries {need}")]
    OutputTooSmall {
        /// Capacity of the destination that was provided.
        len: usize,
        /// Number of values the block decodes to.
        need: usize,
    },

    /// The input has more values than a single block can carry.
    #[error("input of {len} values exceeds the {max}-value block maximum")]
    BlockTooLarge {
        /// Number of values that were passed to the encoder.
        len: usize,
        /// Maximum number of values per block.
        max: usize,
    },

    /// The encoded data is corrupted or inconsistent with its header.
    #[error("invalid encoded block: {0}")]
    InvalidBlock(String),
}
