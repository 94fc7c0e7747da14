// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Encoder driver (C2): renders a file's header and payload packets onto a
//! background thread feeding a bounded channel, decoupling rasterization
//! cost from whoever is consuming frames (a display timer, or — in this
//! crate's `generate` mode — the frame-to-disk writer ahead of muxing).
//!
//! Grounded on `original_source/send/send/interface.py::GeneratorThread`
//! (a worker thread pushing onto a bounded `Queue`, checked against an abort
//! flag before every push) and the teacher's `combine_frames`/
//! `deconstruct_file`, which drive the same render-then-stage-to-PNG loop.

use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use crate::constants::ENCODER_QUEUE_SIZE;
use crate::header::{self, Header};
use crate::packet::{self, Layers, HEADER_INDEX};
use crate::rasterize::Rasterizer;
use crate::render;
use crate::sizeclass::SizeClassInfo;
use crate::stream::{self, PacketStream};

/// One rendered frame, tagged with its packet index (`HEADER_INDEX` for the
/// header frame).
pub struct RenderedFrame {
    /// The packet index this frame carries.
    pub index: u64,
    /// The rendered, native-resolution (pre-upscale) dense datamatrix image.
    pub image: RgbImage,
}

/// Cooperative abort signal shared between the renderer thread and its
/// consumer. Checked before every channel push; on abort the consumer
/// should drain the channel and join the thread.
pub fn new_abort_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Spawn the background renderer thread for `input_path`, returning a
/// receiver of rendered frames (header first, then payload packets in
/// order) and a join handle. The renderer stops early if `abort` is set.
///
/// # Errors
/// The join handle's `Result` carries any I/O, digest, or rasterization
/// failure encountered while streaming; read errors surface as soon as the
/// consumer drains the channel and joins.
pub fn spawn_renderer<P, R>(
    input_path: P,
    size: SizeClassInfo,
    rasterizer: R,
    abort: Arc<AtomicBool>,
) -> Result<(Receiver<RenderedFrame>, JoinHandle<Result<()>>)>
where
    P: AsRef<Path>,
    R: Rasterizer + Send + 'static,
{
    let file = File::open(input_path.as_ref())
        .with_context(|| format!("opening input file {:?}", input_path.as_ref()))?;
    let mut reader = BufReader::new(file);

    let info = stream::stream_info(&mut reader)?;
    let block_size = size.block_size();
    let header = Header {
        protocol_version: header::PROTOCOL_VERSION,
        file_size: info.file_size,
        packet_size: size.packet_size() as u16,
        sha3_256: info.sha3_256,
    };
    let block_count = stream::block_count(info.file_size, block_size);
    info!(file_size = info.file_size, block_count, "encoder starting");

    let (tx, rx) = sync_channel(ENCODER_QUEUE_SIZE);

    let handle = thread::spawn(move || -> Result<()> {
        let render_one = |layers: &Layers| -> Result<RgbImage> { render::render_packet(&rasterizer, layers, size) };

        let header_layers = header::build(&header, block_size)?;
        let header_image = render_one(&header_layers)?;
        if abort.load(Ordering::SeqCst) {
            return Ok(());
        }
        if tx.send(RenderedFrame { index: HEADER_INDEX, image: header_image }).is_err() {
            return Ok(());
        }

        let packets = PacketStream::new(reader, block_size);
        for (i, packet) in packets.enumerate() {
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let layers = packet?;
            let image = render_one(&layers)?;
            debug!(index = i, "rendered payload packet");
            if tx.send(RenderedFrame { index: i as u64, image }).is_err() {
                break;
            }
        }
        Ok(())
    });

    Ok((rx, handle))
}

/// Drain `rx` and join `handle`, surfacing whichever side produced the
/// error first. Used by both the abort path and normal completion.
pub fn join_renderer(rx: Receiver<RenderedFrame>, handle: JoinHandle<Result<()>>) -> Result<()> {
    for _ in rx {}
    handle.join().map_err(|_| anyhow::anyhow!("renderer thread panicked"))?
}

/// Number of payload blocks `input_path` will be split into at `size`.
///
/// # Errors
/// Propagates I/O failures opening or seeking the input file.
pub fn block_count<P: AsRef<Path>>(input_path: P, size: SizeClassInfo) -> Result<u64> {
    let mut file = File::open(input_path)?;
    let file_size = file.seek(std::io::SeekFrom::End(0))?;
    Ok(stream::block_count(file_size, size.block_size()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::io::Write;

    #[derive(Clone, Copy)]
    struct NullRasterizer;

    impl Rasterizer for NullRasterizer {
        fn rasterize(&self, _data: &[u8], size: SizeClassInfo) -> anyhow::Result<GrayImage> {
            Ok(GrayImage::new(size.dots, size.dots))
        }
    }

    fn tiny_size_class() -> SizeClassInfo {
        SizeClassInfo { dots: 16, eci_bytes: 20, rasterizer_tag: 0 }
    }

    #[test]
    fn renders_header_then_payload_frames_in_order() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![7u8; 100]).unwrap();

        let abort = new_abort_flag();
        let (rx, handle) = spawn_renderer(tmp.path(), tiny_size_class(), NullRasterizer, abort).unwrap();

        let frames: Vec<RenderedFrame> = rx.into_iter().collect();
        handle.join().unwrap().unwrap();

        assert_eq!(frames[0].index, HEADER_INDEX);
        for (i, frame) in frames[1..].iter().enumerate() {
            assert_eq!(frame.index, i as u64);
        }
    }

    #[test]
    fn abort_flag_stops_the_renderer_early() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![7u8; 100_000]).unwrap();

        let abort = new_abort_flag();
        let (rx, handle) = spawn_renderer(tmp.path(), tiny_size_class(), NullRasterizer, abort.clone()).unwrap();

        // Take just the header frame, then abort before draining the rest.
        let _header = rx.recv().unwrap();
        abort.store(true, Ordering::SeqCst);
        join_renderer(rx, handle).unwrap();
    }
}
