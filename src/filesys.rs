// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! File system access and the ffmpeg subprocess glue used to mux rendered
//! frames into a video container and split a captured video back into
//! frames. Ported from the teacher's `filesys.rs` (frame buffer folder
//! management) and `converter.rs`'s `combine_frames`/`split_video`
//! (`Command`-based ffmpeg invocation), retargeted from the teacher's
//! H.264/bt709 YouTube preset to §6's VP9-lossless/GBRP wire format.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};

use crate::constants::{FFMPEG_EXECUTABLE_PATH, FRAME_DIR, PIXEL_FORMAT, VIDEO_CODEC, VIDEO_CONTAINER_FPS};

/// Gets the directory where frames are stored before being combined into a
/// video file or after being extracted from one. Creates the directory if
/// it doesn't exist.
pub fn get_framebuffer_folder() -> Result<PathBuf> {
    let temp_dir = env::temp_dir();
    let frame_dir = temp_dir.join(FRAME_DIR);

    if !frame_dir.exists() {
        fs::create_dir(&frame_dir).context("unable to create frame directory")?;
    }
    Ok(frame_dir)
}

/// Clears the directory returned by [`get_framebuffer_folder`] by deleting
/// and recreating it.
pub fn clear_framebuffer_folder() -> Result<()> {
    let frame_dir = get_framebuffer_folder()?;
    fs::remove_dir_all(&frame_dir).context("unable to delete frame directory")?;
    fs::create_dir(frame_dir).context("unable to recreate frame directory")?;
    Ok(())
}

/// Path inside the framebuffer folder used to save the frame at `index`
/// before muxing.
pub fn frame_path_combine(index: u64) -> Result<PathBuf> {
    Ok(get_framebuffer_folder()?.join(format!("combine{index:0>12}.png")))
}

/// Glob wildcard over all frames split out of a captured video.
pub fn frame_path_wildcard_split() -> Result<PathBuf> {
    Ok(get_framebuffer_folder()?.join(Path::new("split*.png")))
}

/// Glob wildcard over all frames staged for muxing.
pub fn frame_path_wildcard_combine() -> Result<PathBuf> {
    Ok(get_framebuffer_folder()?.join(Path::new("combine*.png")))
}

/// Mux the frames staged by [`frame_path_combine`] into a video file at
/// `data_fps`, using the wire format named in §6: VP9, lossless, GBRP.
///
/// # Errors
/// Fails if `output_file` exists and `overwrite` is false, or if the
/// `ffmpeg` subprocess exits with a nonzero status.
pub fn mux_frames<P: AsRef<Path>>(output_file: P, data_fps: u32, overwrite: bool) -> Result<()> {
    if !overwrite && output_file.as_ref().exists() {
        bail!("output path {:?} already exists (pass -f to overwrite)", output_file.as_ref());
    }

    let status = Command::new(FFMPEG_EXECUTABLE_PATH)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-framerate",
            &format!("{data_fps}"),
            "-pattern_type",
            "glob",
            "-i",
            &frame_path_wildcard_combine()?.to_string_lossy(),
            "-c:v",
            VIDEO_CODEC,
            "-lossless",
            "1",
            "-pix_fmt",
            PIXEL_FORMAT,
            "-r",
            &format!("{VIDEO_CONTAINER_FPS}"),
            "-y",
            &output_file.as_ref().to_string_lossy(),
        ])
        .stdout(Stdio::null())
        .status()?;

    if !status.success() {
        bail!("ffmpeg returned nonzero exit status while muxing");
    }
    Ok(())
}

/// Split a captured video back into individual frame PNGs in the
/// framebuffer folder, named `split%09d.png` in capture order.
///
/// # Errors
/// Fails if the `ffmpeg` subprocess exits with a nonzero status.
pub fn split_video<P: AsRef<Path>>(input_file: P) -> Result<()> {
    clear_framebuffer_folder()?;
    let frame_dir = get_framebuffer_folder()?;
    let frame_wildcard = frame_dir.join(Path::new("split%09d.png"));

    let status = Command::new(FFMPEG_EXECUTABLE_PATH)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            &input_file.as_ref().to_string_lossy(),
            &frame_wildcard.to_string_lossy(),
        ])
        .stdout(Stdio::null())
        .status()?;

    if !status.success() {
        bail!("ffmpeg returned nonzero exit status while splitting video");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_path_combine_zero_pads_index() {
        let path = frame_path_combine(7).unwrap();
        assert!(path.to_string_lossy().ends_with("combine000000000007.png"));
    }
}
