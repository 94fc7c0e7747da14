// visxfer - Visual air-gap file transfer.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `vis-recv` — decode a dense-datamatrix video back into a file.

use std::time;

use anyhow::{bail, Context, Result};
use clap::Parser;

use visxfer::cli::RecvCli;
use visxfer::decoder;
use visxfer::rasterize::RxingBackend;
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

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let main_start = time::Instant::now();
    let args = RecvCli::parse();

    if !args.input.exists() {
        bail!("input video {:?} could not be found", args.input);
    }

    let size = sizeclass::lookup(args.dots).context("unsupported --dots size class")?;

    timed_block!("decode and reconstruction", {
        let outcome = decoder::decode_video_to_file(
            &args.input,
            &args.output,
            args.force,
            RxingBackend,
            size,
            args.backlog_cap,
        )?;
        println!("Reconstructed {} bytes, digest verified", outcome.header.file_size);
    });

    println!("Total execution time: {}", format_duration(main_start.elapsed()));
    Ok(())
}
