// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Frame source (C3): an iterator over decoded RGB frames from a video
//! container, plus a total frame count. No seeking is required here —
//! random access for retry purposes is layered on top by [`crate::rewind`].
//!
//! Grounded on the teacher's `split_video` (ffmpeg subprocess extracting a
//! captured video to numbered PNGs in the framebuffer folder) and
//! `reconstruct_file`'s `glob(...)` iteration over those frames.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use image::RgbImage;

use crate::filesys;

/// Capability the rewind buffer (C4) pulls frames from.
pub trait FrameSource {
    /// Return the next decoded frame, or `None` once exhausted.
    fn next(&mut self) -> Option<RgbImage>;

    /// Total number of frames in the source, if known up front.
    fn total_frames(&self) -> Option<u64>;
}

/// A [`FrameSource`] backed by a pre-extracted, lexicographically sorted
/// set of frame PNGs (produced by ffmpeg splitting a captured video).
pub struct GlobFrameSource {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl GlobFrameSource {
    /// Split `video_path` into frames using ffmpeg, then build a source
    /// over the resulting PNGs in capture order.
    ///
    /// # Errors
    /// Propagates ffmpeg subprocess failures, or glob/I/O errors while
    /// listing the extracted frames.
    pub fn from_video<P: AsRef<Path>>(video_path: P) -> Result<Self> {
        filesys::split_video(video_path)?;
        Self::from_framebuffer()
    }

    /// Build a source directly over whatever is already staged in the
    /// framebuffer folder (used by tests, and by callers that run their
    /// own extraction step).
    pub fn from_framebuffer() -> Result<Self> {
        let wildcard = filesys::frame_path_wildcard_split()?;
        let mut paths: Vec<PathBuf> =
            glob(&wildcard.to_string_lossy()).context("invalid frame glob pattern")?.collect::<std::result::Result<_, _>>()?;
        paths.sort();
        Ok(Self { paths, cursor: 0 })
    }
}

impl FrameSource for GlobFrameSource {
    fn next(&mut self) -> Option<RgbImage> {
        let path = self.paths.get(self.cursor)?;
        let image = image::open(path).ok()?.to_rgb8();
        self.cursor += 1;
        Some(image)
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_frames_in_sorted_order_and_reports_total() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..3u8 {
            let mut img = RgbImage::new(1, 1);
            img.put_pixel(0, 0, image::Rgb([i, 0, 0]));
            let path = dir.path().join(format!("split{i:09}.png"));
            img.save(&path).unwrap();
            paths.push(path);
        }
        paths.sort();

        let mut source = GlobFrameSource { paths, cursor: 0 };
        assert_eq!(source.total_frames(), Some(3));
        for expected in 0..3u8 {
            let frame = source.next().unwrap();
            assert_eq!(frame.get_pixel(0, 0).0[0], expected);
        }
        assert!(source.next().is_none());
    }
}
