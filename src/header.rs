// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Header codec (L3): builds and parses the single header packet carrying
//! file metadata, always sent at [`crate::packet::HEADER_INDEX`].
//!
//! Wire layout (big-endian, packed, 44 bytes total):
//! ```text
//! offset 0:  u16    protocol_version  (current = 2)
//! offset 2:  u64    file_size
//! offset 10: u16    packet_size
//! offset 12: u8[32] sha3_256_digest
//! ```
//!
//! Ported from `original_source/.../core.py::packet_stream_header`, which
//! used `struct.pack(">HQH32s", ...)` for the same layout.

use crate::error::{Error, Result};
use crate::packet::{self, Layers};

/// Current protocol version. Receivers reject anything else.
pub const PROTOCOL_VERSION: u16 = 2;

/// Wire length of the header block, before packet-codec striping.
pub const HEADER_LEN: usize = 2 + 8 + 2 + 32;

/// Parsed contents of a header packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version the sender used.
    pub protocol_version: u16,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Packet size (3 * eci_bytes) the sender used.
    pub packet_size: u16,
    /// SHA3-256 digest of the original file.
    pub sha3_256: [u8; 32],
}

impl Header {
    /// Serialize to the 44-byte wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.protocol_version.to_be_bytes());
        out[2..10].copy_from_slice(&self.file_size.to_be_bytes());
        out[10..12].copy_from_slice(&self.packet_size.to_be_bytes());
        out[12..44].copy_from_slice(&self.sha3_256);
        out
    }

    /// Parse the 44-byte wire layout, checking protocol version and packet
    /// size against what the receiver is configured to expect.
    ///
    /// # Errors
    /// Returns [`Error::BadHeader`] if the block is too short, the protocol
    /// version doesn't match [`PROTOCOL_VERSION`], or `packet_size` doesn't
    /// match `expected_packet_size`.
    pub fn parse(block: &[u8], expected_packet_size: usize) -> Result<Self> {
        if block.len() < HEADER_LEN {
            return Err(Error::BadHeader(format!(
                "header block is {} bytes, need at least {HEADER_LEN}",
                block.len()
            )));
        }

        let protocol_version = u16::from_be_bytes(block[0..2].try_into().unwrap());
        if protocol_version != PROTOCOL_VERSION {
            return Err(Error::BadHeader(format!(
                "unsupported protocol version {protocol_version}, expected {PROTOCOL_VERSION}"
            )));
        }

        let file_size = u64::from_be_bytes(block[2..10].try_into().unwrap());
        let packet_size = u16::from_be_bytes(block[10..12].try_into().unwrap());
        if packet_size as usize != expected_packet_size {
            return Err(Error::BadHeader(format!(
                "packet size {packet_size} does not match configured size class ({expected_packet_size})"
            )));
        }

        let mut sha3_256 = [0u8; 32];
        sha3_256.copy_from_slice(&block[12..44]);

        Ok(Self { protocol_version, file_size, packet_size, sha3_256 })
    }
}

/// Build the header packet (wraps the 44-byte block with the sentinel
/// index via the L2 packet codec).
///
/// # Errors
/// Propagates [`Error::BlockTooLarge`] if `HEADER_LEN` somehow exceeds the
/// configured `block_size` (can't happen at any supported size class, but
/// the check stays honest rather than unwrapping).
pub fn build(header: &Header, block_size: usize) -> Result<Layers> {
    packet::makepacket(packet::HEADER_INDEX, &header.to_bytes(), block_size)
}
