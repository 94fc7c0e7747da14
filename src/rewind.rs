// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Rewindable frame buffer (C4): a bounded backlog of the most recently
//! decoded frames with escalating decoder modes.
//!
//! Ported from `original_source/recv/recv.py::QrStream`, which keeps a
//! `backup` list and a `rewind_index` into it; `rewind()` arms replay from
//! the oldest retained frame, `confirm_ok()` either clears the backup (if
//! caught up) or trims it down to the still-unread tail.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame_source::FrameSource;

/// Decoder mode index: 0 = fast, 1 = precise. See §4.8/§9 ("Two-tier
/// decoder as strategy" — adding decode strategies only requires extending
/// this range and bumping `max_mode`).
pub const MAX_MODE: u8 = 1;

/// Sliding window over recently pulled frames, letting the caller replay
/// them under a stricter decode strategy after a failed attempt.
pub struct RewindBuffer<S> {
    source: S,
    backup: VecDeque<image::RgbImage>,
    /// Frames pulled from the source so far.
    head: u64,
    /// Next frame to hand back to the caller; `pos <= head`.
    pos: u64,
    mode: u8,
    default_mode: u8,
    backlog_cap: usize,
}

impl<S: FrameSource> RewindBuffer<S> {
    /// Wrap a frame source with a rewind backlog capped at `backlog_cap`
    /// frames (§9 recommends 256).
    pub fn new(source: S, backlog_cap: usize) -> Self {
        Self { source, backup: VecDeque::new(), head: 0, pos: 0, mode: 0, default_mode: 0, backlog_cap }
    }

    /// Current decoder mode (0 = fast, 1 = precise).
    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// Total number of frames in the underlying source, if known.
    pub fn total_frames(&self) -> Option<u64> {
        self.source.total_frames()
    }

    /// Sets `default_mode` and raises the current mode to at least that
    /// floor (§4.7: `set_default_mode`). Used by the decoder driver to
    /// switch phases (precise-only header search vs fast-first payload
    /// scanning).
    pub fn set_default_mode(&mut self, m: u8) {
        self.default_mode = m;
        self.mode = self.mode.max(m);
    }

    /// Return the next frame, pulling from the source if the read pointer
    /// has caught up with the write pointer, or replaying from the backup
    /// otherwise.
    ///
    /// # Errors
    /// Returns [`Error::EndOfStream`] if the source is exhausted.
    pub fn next_frame(&mut self) -> Result<image::RgbImage> {
        if self.pos == self.head {
            let frame = self.source.next().ok_or(Error::EndOfStream)?;
            self.backup.push_back(frame.clone());
            self.head += 1;
            self.pos += 1;
            return Ok(frame);
        }

        let offset = self.pos - (self.head - self.backup.len() as u64);
        let frame = self.backup[offset as usize].clone();
        self.pos += 1;
        Ok(frame)
    }

    /// Rewind the read pointer back to the oldest retained frame and
    /// escalate the decode mode by one step.
    ///
    /// # Errors
    /// Returns [`Error::DecodeFailure`] once every decode strategy has
    /// already been tried at this point (`mode == MAX_MODE`), or if the
    /// backlog would have to grow past `backlog_cap` to retain the frame
    /// being rewound to.
    pub fn rewind(&mut self) -> Result<()> {
        if self.mode == MAX_MODE {
            warn!(frame = self.head, "rewind exhausted all decode strategies");
            return Err(Error::DecodeFailure(self.head));
        }
        if self.backup.len() >= self.backlog_cap {
            warn!(cap = self.backlog_cap, "rewind backlog exceeded sanity cap");
            return Err(Error::DecodeFailure(self.head));
        }

        self.mode += 1;
        self.pos = self.head - self.backup.len() as u64;
        debug!(mode = self.mode, pos = self.pos, "rewound");
        Ok(())
    }

    /// Called after a successfully accepted packet. If the read pointer
    /// has caught up with the write pointer, the whole backup is dropped
    /// and the mode resets to `default_mode`; otherwise only the
    /// still-unread tail is kept.
    pub fn confirm_ok(&mut self) {
        if self.pos == self.head {
            self.backup.clear();
            self.mode = self.default_mode;
            return;
        }

        let keep = (self.head - self.pos) as usize;
        let drop = self.backup.len().saturating_sub(keep);
        for _ in 0..drop {
            self.backup.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource {
        frames: Vec<image::RgbImage>,
        cursor: usize,
    }

    impl VecSource {
        fn new(n: usize) -> Self {
            let frames = (0..n)
                .map(|i| {
                    let mut img = image::RgbImage::new(1, 1);
                    img.put_pixel(0, 0, image::Rgb([i as u8, 0, 0]));
                    img
                })
                .collect();
            Self { frames, cursor: 0 }
        }
    }

    impl FrameSource for VecSource {
        fn next(&mut self) -> Option<image::RgbImage> {
            let frame = self.frames.get(self.cursor).cloned();
            self.cursor += 1;
            frame
        }

        fn total_frames(&self) -> Option<u64> {
            Some(self.frames.len() as u64)
        }
    }

    fn tag(img: &image::RgbImage) -> u8 {
        img.get_pixel(0, 0).0[0]
    }

    #[test]
    fn confirm_ok_when_caught_up_is_idempotent_noop() {
        let mut buf = RewindBuffer::new(VecSource::new(3), 256);
        buf.confirm_ok();
        assert_eq!(buf.backup.len(), 0);
        assert_eq!(buf.mode, 0);
    }

    #[test]
    fn sequential_reads_advance_without_rewinding() {
        let mut buf = RewindBuffer::new(VecSource::new(3), 256);
        assert_eq!(tag(&buf.next_frame().unwrap()), 0);
        buf.confirm_ok();
        assert_eq!(tag(&buf.next_frame().unwrap()), 1);
        buf.confirm_ok();
        assert_eq!(tag(&buf.next_frame().unwrap()), 2);
        buf.confirm_ok();
        assert!(buf.next_frame().is_err());
    }

    #[test]
    fn rewind_replays_oldest_retained_frame_under_stricter_mode() {
        let mut buf = RewindBuffer::new(VecSource::new(3), 256);
        assert_eq!(tag(&buf.next_frame().unwrap()), 0);
        assert_eq!(tag(&buf.next_frame().unwrap()), 1);
        // Neither confirmed: backup holds frames 0, 1.
        buf.rewind().unwrap();
        assert_eq!(buf.mode(), 1);
        assert_eq!(tag(&buf.next_frame().unwrap()), 0);
        assert_eq!(tag(&buf.next_frame().unwrap()), 1);
    }

    #[test]
    fn rewind_exhaustion_fails_after_max_mode_reached() {
        let mut buf = RewindBuffer::new(VecSource::new(3), 256);
        buf.next_frame().unwrap();
        buf.rewind().unwrap(); // mode 0 -> 1 (MAX_MODE)
        assert!(buf.rewind().is_err());
    }

    #[test]
    fn confirm_ok_after_partial_replay_keeps_only_unread_tail() {
        let mut buf = RewindBuffer::new(VecSource::new(4), 256);
        buf.next_frame().unwrap(); // 0
        buf.next_frame().unwrap(); // 1
        buf.next_frame().unwrap(); // 2
        buf.rewind().unwrap();
        buf.next_frame().unwrap(); // replay 0
        buf.confirm_ok(); // keep only [1, 2] (head - pos = 2)
        assert_eq!(buf.backup.len(), 2);
    }
}
