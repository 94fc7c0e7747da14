// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The protocol's error taxonomy.
//!
//! Each variant corresponds to one row of the error table: the decoder
//! driver matches on these to decide whether a condition is fatal or just
//! advances the stream.

use std::path::PathBuf;

/// Errors raised by the core encode/decode pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A packet index did not fit into 48 bits.
    #[error("index {0} overflows 48 bits")]
    IndexOverflow(u64),

    /// A block was larger than the size class's `block_size`.
    #[error("block of {actual} bytes exceeds block size {limit}")]
    BlockTooLarge {
        /// Length of the offending block.
        actual: usize,
        /// Maximum block size for the active size class.
        limit: usize,
    },

    /// The input source does not support seeking, required for the L4 pre-pass.
    #[error("source is not seekable")]
    NotSeekable,

    /// The file is too large to index: its block count would reach the header sentinel.
    #[error("stream too large: block index would reach the header sentinel")]
    StreamTooLarge,

    /// A packet claiming to be the header failed to parse as one.
    #[error("bad header: {0}")]
    BadHeader(String),

    /// The frame source (or rewind buffer) has no more frames to offer.
    #[error("end of stream")]
    EndOfStream,

    /// The rewind buffer exhausted every decode strategy without success.
    #[error("failed to decode the stream at frame {0}")]
    DecodeFailure(u64),

    /// Assembled payload grew past the file size declared in the header.
    #[error("payload overflow: exceeds expected file size")]
    Overflow,

    /// Phase 1 reached the end of the video without finding a header packet.
    #[error("header not found before end of stream")]
    HeaderNotFound,

    /// Reassembled file digest does not match the header's declared digest.
    #[error("digest mismatch: reconstructed file does not match expected hash")]
    DigestMismatch,

    /// Output path already exists and overwriting was not requested.
    #[error("output path {0:?} already exists (pass -f/-y to overwrite)")]
    OutputExists(PathBuf),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Underlying image encode/decode failure.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Convenience alias for results from the core pipeline.
pub type Result<T> = std::result::Result<T, Error>;
