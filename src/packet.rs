// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Packet codec (L2): a pure function on bytes that splits a
//! `(index, block)` pair into the three byte strings that become the three
//! color layers of a dense datamatrix, and its inverse.
//!
//! Ported from `original_source/send/src/vis_transfer/core.py::makepacket`/
//! `encodeindex`: the 48-bit index is packed big-endian into 6 bytes, then
//! striped two bytes per layer so no layer is ever index-empty.

use crate::error::{Error, Result};

/// The header packet's reserved index value: max uint48 (`2^48 - 1`).
pub const HEADER_INDEX: u64 = 0xFFFF_FFFF_FFFF;

/// Three byte strings, one per color layer (R, G, B in that order).
pub type Layers = (Vec<u8>, Vec<u8>, Vec<u8>);

/// Encode a 48-bit big-endian index into 6 bytes.
///
/// # Errors
/// Returns [`Error::IndexOverflow`] if `index` exceeds [`HEADER_INDEX`].
pub fn encode_index(index: u64) -> Result<[u8; 6]> {
    if index > HEADER_INDEX {
        return Err(Error::IndexOverflow(index));
    }
    let full = index.to_be_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&full[2..8]);
    Ok(out)
}

/// Decode a 6-byte big-endian index back into a `u64`.
pub fn decode_index(bytes: &[u8; 6]) -> u64 {
    let mut full = [0u8; 8];
    full[2..8].copy_from_slice(bytes);
    u64::from_be_bytes(full)
}

/// Split `(index, block)` into three layer byte strings.
///
/// `block` must be no longer than `block_size`. The index is striped two
/// bytes per layer ahead of that layer's third of the block, so a partially
/// captured frame yields an internally inconsistent index instead of silent
/// corruption.
///
/// # Errors
/// Returns [`Error::IndexOverflow`] or [`Error::BlockTooLarge`].
pub fn makepacket(index: u64, block: &[u8], block_size: usize) -> Result<Layers> {
    if block.len() > block_size {
        return Err(Error::BlockTooLarge { actual: block.len(), limit: block_size });
    }
    let packed_index = encode_index(index)?;
    let t = block_size / 3;

    let third = |n: usize| -> &[u8] {
        let start = (n * t).min(block.len());
        let end = ((n + 1) * t).min(block.len());
        &block[start..end]
    };

    let mut l0 = Vec::with_capacity(2 + t);
    l0.extend_from_slice(&packed_index[0..2]);
    l0.extend_from_slice(third(0));

    let mut l1 = Vec::with_capacity(2 + t);
    l1.extend_from_slice(&packed_index[2..4]);
    l1.extend_from_slice(third(1));

    let mut l2 = Vec::with_capacity(2 + t);
    l2.extend_from_slice(&packed_index[4..6]);
    l2.extend_from_slice(third(2));

    Ok((l0, l1, l2))
}

/// Reconstruct `(index, block)` from three decoded layer byte strings.
///
/// # Errors
/// Returns [`Error::BadHeader`] if any layer is shorter than the 2-byte
/// index prefix it must carry (the caller decides whether that's fatal or
/// just a bad frame to skip).
pub fn unpack(l0: &[u8], l1: &[u8], l2: &[u8]) -> Result<(u64, Vec<u8>)> {
    for (i, layer) in [l0, l1, l2].into_iter().enumerate() {
        if layer.len() < 2 {
            return Err(Error::BadHeader(format!("layer {i} shorter than its 2-byte index prefix")));
        }
    }

    let mut packed_index = [0u8; 6];
    packed_index[0..2].copy_from_slice(&l0[0..2]);
    packed_index[2..4].copy_from_slice(&l1[0..2]);
    packed_index[4..6].copy_from_slice(&l2[0..2]);
    let index = decode_index(&packed_index);

    let mut block = Vec::with_capacity((l0.len() - 2) + (l1.len() - 2) + (l2.len() - 2));
    block.extend_from_slice(&l0[2..]);
    block.extend_from_slice(&l1[2..]);
    block.extend_from_slice(&l2[2..]);

    Ok((index, block))
}
