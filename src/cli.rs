// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Command line argument parsing for `vis-send` and `vis-recv`.
//!
//! Structured the way the teacher's own `cli.rs` lays out its `clap` derive
//! types, retargeted from single-flag H.264 encode/decode options to this
//! protocol's size-class and overwrite knobs (§6).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::constants::{DEFAULT_FPS, DEFAULT_REWIND_BACKLOG_CAP};
use crate::sizeclass::DEFAULT_DOTS;

/// Visual air-gap file transfer: encode a file as a dense-datamatrix video.
#[derive(Debug, Parser)]
#[command(name = "vis-send", version, about)]
pub struct SendCli {
    #[command(subcommand)]
    pub command: SendCommand,
}

#[derive(Debug, Subcommand)]
pub enum SendCommand {
    /// Render INPUT to a video file instead of a live display.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// File to encode.
    pub input: PathBuf,

    /// Output video path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Overwrite the output path if it already exists.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Data Matrix symbol size, in dots per side. See §1's size-class table.
    #[arg(long, default_value_t = DEFAULT_DOTS)]
    pub dots: u32,

    /// Packets displayed per second.
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,
}

/// Visual air-gap file transfer: decode a dense-datamatrix video back to a file.
#[derive(Debug, Parser)]
#[command(name = "vis-recv", version, about)]
pub struct RecvCli {
    /// Captured video to decode.
    pub input: PathBuf,

    /// Path to write the reconstructed file to.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Overwrite the output path if it already exists.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Data Matrix symbol size the sender used, in dots per side.
    #[arg(long, default_value_t = DEFAULT_DOTS)]
    pub dots: u32,

    /// Maximum number of recently decoded frames to retain for rewinding.
    #[arg(long, default_value_t = DEFAULT_REWIND_BACKLOG_CAP)]
    pub backlog_cap: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_args_parse_with_defaults() {
        let cli = SendCli::parse_from(["vis-send", "generate", "in.bin", "-o", "out.mkv"]);
        let SendCommand::Generate(args) = cli.command;
        assert_eq!(args.input, PathBuf::from("in.bin"));
        assert_eq!(args.output, PathBuf::from("out.mkv"));
        assert_eq!(args.dots, DEFAULT_DOTS);
        assert_eq!(args.fps, DEFAULT_FPS);
        assert!(!args.force);
    }

    #[test]
    fn recv_args_parse_force_flag() {
        let cli = RecvCli::parse_from(["vis-recv", "in.mkv", "-o", "out.bin", "-f"]);
        assert!(cli.force);
        assert_eq!(cli.backlog_cap, DEFAULT_REWIND_BACKLOG_CAP);
    }
}
