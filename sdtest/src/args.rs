// -*- coding: utf-8 -*-
//
// sdtest - Flash storage endurance tester
//
// Copyright 2024 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT
//

use anyhow as ah;
use clap::builder::ValueParser;
use clap::error::ErrorKind::{DisplayHelp, DisplayVersion};
use clap::Parser;
use sdtest_lib::{SdErrorKind, TestType, parse_buffer_size, sd_err};
use std::ffi::OsString;
use std::path::PathBuf;

const ABOUT: &str = "\
Endurance tester for SD-Cards, eMMC and other flash storage.

This program writes all-ones and all-zeros patterns over the whole device,
reads them back and compares them, pass after pass, until the medium fails.
Progress is kept in a record file, so that an interrupted test resumes
with the previous counters.
";

const EXAMPLE: &str = "\
Example usage:
sdtest -t z -T /dev/sdc";

/// All command line arguments.
#[derive(Debug)]
pub struct Args {
    pub device: String,
    pub info: bool,
    pub verbose: bool,
    pub timestamps: bool,
    pub zero_stats: bool,
    pub stdout: bool,
    pub test_type: Option<TestType>,
    pub buffer_size: Option<u64>,
    pub quit_passes: u64,
    pub log_dir: PathBuf,
}

#[derive(Debug, Parser)]
#[command(
    name = "sdtest",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = ABOUT,
    after_help = EXAMPLE,
    verbatim_doc_comment
)]
struct CliArgs {
    /// Device node of the card or partition to test.
    /// This must be a /dev/sdX device node.
    /// All data on the device will be destroyed.
    #[arg(verbatim_doc_comment, value_name = "DEVICE")]
    device: String,

    /// Dump the device geometry.
    #[arg(verbatim_doc_comment, short = 'i', long)]
    info: bool,

    /// Write a status line for every buffer transfer.
    #[arg(verbatim_doc_comment, short = 'v', long)]
    verbose: bool,

    /// Add a timestamp to every status line.
    #[arg(verbatim_doc_comment, short = 'T', long)]
    timestamps: bool,

    /// Reset the written bytes and pass counters
    /// and start a new record.
    #[arg(verbatim_doc_comment, short = 'Z', long = "zero-stats")]
    zero_stats: bool,

    /// Also print the status lines to stdout.
    #[arg(verbatim_doc_comment, short = 'O', long)]
    stdout: bool,

    /// Select the test.
    /// z: Write and verify ones and zeros patterns.
    /// r: Random data with CRC check (not implemented).
    /// Without a test only the setup runs.
    #[arg(verbatim_doc_comment, short = 't', long = "test", value_name = "TYPE")]
    test: Option<String>,

    /// Size of the I/O buffer.
    /// Must be a multiple of 1 MiB. 0 selects the default of 128 MiB.
    /// Devices smaller than the buffer are tested in one block.
    #[arg(
        verbatim_doc_comment,
        short = 'b',
        long = "buffer-size",
        value_name = "BYTES",
        default_value_t = 0,
        value_parser = ValueParser::new(parse_buffer_size)
    )]
    buffer_size: u64,

    /// Quit after this many completed passes.
    /// This counts all passes in the record, including previous runs.
    /// 0 means: Never quit.
    #[arg(
        verbatim_doc_comment,
        short = 'q',
        long = "quit",
        value_name = "PASSES",
        default_value_t = 0
    )]
    quit: u64,

    /// Directory of the progress record file.
    #[arg(
        verbatim_doc_comment,
        long = "log-dir",
        value_name = "DIR",
        default_value = "."
    )]
    log_dir: PathBuf,
}

impl CliArgs {
    fn into_args(self) -> ah::Result<Args> {
        let test_type = self.test.as_deref().and_then(TestType::from_selector);
        let buffer_size = if self.buffer_size == 0 {
            None
        } else {
            Some(self.buffer_size)
        };
        Ok(Args {
            device: self.device,
            info: self.info,
            verbose: self.verbose,
            timestamps: self.timestamps,
            zero_stats: self.zero_stats,
            stdout: self.stdout,
            test_type,
            buffer_size,
            quit_passes: self.quit,
            log_dir: self.log_dir,
        })
    }
}

pub fn parse_args<I, T>(args: I) -> ah::Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match CliArgs::try_parse_from(args) {
        Ok(cli) => cli.into_args(),
        Err(e) => {
            match e.kind() {
                DisplayHelp | DisplayVersion => {
                    print!("{e}");
                    std::process::exit(0);
                }
                _ => (),
            };
            Err(sd_err(SdErrorKind::Config, e.to_string()))
        }
    }
}


// vim: ts=4 sw=4 expandtab
