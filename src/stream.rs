// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Packet stream (L4): a lazy sequence of packets read from a seekable byte
//! source, plus the pre-pass that computes file size and digest once up
//! front.
//!
//! Ported from `original_source/.../core.py::packet_stream`/
//! `packet_stream_info`, which seek to the end to learn the size, hash the
//! whole stream in 64 KiB chunks, then seek back before yielding blocks.

use std::io::{Read, Seek, SeekFrom};

use sha3::{Digest, Sha3_256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::packet::{self, Layers, HEADER_INDEX};

/// Chunk size used while hashing the source during the pre-pass.
const HASH_CHUNK: usize = 64 * 1024;

/// File size and digest, computed once before any packets are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Total size of the source, in bytes.
    pub file_size: u64,
    /// SHA3-256 digest of the entire source.
    pub sha3_256: [u8; 32],
}

/// Run the L4 pre-pass: seek to the end to learn the size, hash the
/// contents, then restore the original read position.
///
/// # Errors
/// Returns [`Error::NotSeekable`] if seeking fails, or [`Error::Io`] for
/// other I/O failures.
pub fn stream_info<S: Read + Seek>(source: &mut S) -> Result<StreamInfo> {
    let old_pos = source.stream_position().map_err(|_| Error::NotSeekable)?;

    let file_size = source.seek(SeekFrom::End(0)).map_err(|_| Error::NotSeekable)?;
    source.seek(SeekFrom::Start(0)).map_err(|_| Error::NotSeekable)?;

    let mut hasher = Sha3_256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    source.seek(SeekFrom::Start(old_pos)).map_err(|_| Error::NotSeekable)?;

    let sha3_256: [u8; 32] = hasher.finalize().into();
    debug!(file_size, "packet stream pre-pass complete");
    Ok(StreamInfo { file_size, sha3_256 })
}

/// How many blocks a file of `file_size` bytes splits into at `block_size`.
pub fn block_count(file_size: u64, block_size: usize) -> u64 {
    file_size.div_ceil(block_size as u64)
}

/// Lazily yields packets `0, 1, 2, ...` from a seekable source, stopping on
/// a short (zero-length) read. Deterministic given the same source and
/// size class.
pub struct PacketStream<S> {
    source: S,
    block_size: usize,
    next_index: u64,
    done: bool,
}

impl<S: Read> PacketStream<S> {
    /// Wrap an already-seeked-to-start source. Call [`stream_info`]
    /// separately before constructing this if you need the header.
    pub fn new(source: S, block_size: usize) -> Self {
        Self { source, block_size, next_index: 0, done: false }
    }
}

impl<S: Read> Iterator for PacketStream<S> {
    type Item = Result<Layers>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.next_index >= HEADER_INDEX {
            self.done = true;
            return Some(Err(Error::StreamTooLarge));
        }

        let mut block = vec![0u8; self.block_size];
        let mut total_read = 0;
        // Short reads are permitted (the underlying reader may hand back
        // fewer bytes than requested without being at EOF); keep reading
        // until the block is full or the source is exhausted.
        while total_read < self.block_size {
            match self.source.read(&mut block[total_read..]) {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }

        if total_read == 0 {
            self.done = true;
            return None;
        }
        block.truncate(total_read);

        let index = self.next_index;
        self.next_index += 1;
        Some(packet::makepacket(index, &block, self.block_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_source_yields_no_packets() {
        let stream = PacketStream::new(Cursor::new(Vec::<u8>::new()), 2064);
        assert_eq!(stream.count(), 0);
    }

    #[test]
    fn exact_block_size_yields_one_packet_no_short_read() {
        let data = vec![7u8; 2064];
        let stream = PacketStream::new(Cursor::new(data), 2064);
        let packets: Vec<_> = stream.map(Result::unwrap).collect();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn block_size_plus_one_yields_two_packets_second_short() {
        let mut data = vec![7u8; 2064];
        data.push(9);
        let stream = PacketStream::new(Cursor::new(data), 2064);
        let packets: Vec<_> = stream.map(Result::unwrap).collect();
        assert_eq!(packets.len(), 2);
    }

    #[test]
    fn stream_info_roundtrips_size_and_restores_position() {
        let data = b"hello world".to_vec();
        let mut cursor = Cursor::new(data.clone());
        cursor.set_position(3);
        let info = stream_info(&mut cursor).unwrap();
        assert_eq!(info.file_size, data.len() as u64);
        assert_eq!(cursor.position(), 3);

        let expected = Sha3_256::digest(&data);
        assert_eq!(&info.sha3_256[..], &expected[..]);
    }

    #[test]
    fn block_count_matches_ceiling_division() {
        assert_eq!(block_count(0, 2064), 0);
        assert_eq!(block_count(2064, 2064), 1);
        assert_eq!(block_count(2065, 2064), 2);
    }
}
