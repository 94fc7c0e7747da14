// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `vis-send` — encode a file as a dense-datamatrix video.

use std::time;

use anyhow::{bail, Context, Result};
use clap::Parser;

use visxfer::cli::{GenerateArgs, SendCli, SendCommand};
use visxfer::encoder;
use visxfer::filesys;
use visxfer::rasterize::RxingBackend;
use visxfer::render::upscale_target;
use visxfer::sizeclass;
use visxfer::utils::format_duration;

/// Times the execution of `code` and prints out the measured time.
macro_rules! timed_block {
    ($name:expr, $code:block) => {
        println!("Starting {}", $name);
        let start = std::time::Instant::now();
        $code
        println!("Finished {} after: {}", $name, format_duration(start.elapsed()));
    };
}

fn generate(args: &GenerateArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("input file {:?} could not be found", args.input);
    }
    if !args.force && args.output.exists() {
        bail!("output path {:?} already exists (pass -f to overwrite)", args.output);
    }

    let size = sizeclass::lookup(args.dots).context("unsupported --dots size class")?;

    timed_block!("frame rendering", {
        let abort = encoder::new_abort_flag();
        let (rx, handle) = encoder::spawn_renderer(&args.input, size, RxingBackend, abort)?;

        filesys::clear_framebuffer_folder()?;
        // The shorter side of a typical display; frames are upscaled to the
        // largest multiple of `size.dots` that fits within it (§4.4).
        let target = upscale_target(size.dots, 1080);

        let mut count: u64 = 0;
        for frame in &rx {
            let upscaled = visxfer::render::upscale(&frame.image, target);
            let path = filesys::frame_path_combine(count)?;
            upscaled.save(path)?;
            count += 1;
        }
        encoder::join_renderer(rx, handle)?;
        println!("Rendered {count} frames");
    });

    timed_block!("video muxing", {
        filesys::mux_frames(&args.output, args.fps, args.force)?;
    });

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let main_start = time::Instant::now();

    let cli = SendCli::parse();
    match &cli.command {
        SendCommand::Generate(args) => generate(args)?,
    }

    println!("Total execution time: {}", format_duration(main_start.elapsed()));
    Ok(())
}
