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

mod args;

use anyhow as ah;
use args::{Args, parse_args};
use sdtest_lib::{
    ProgressStore, RunConfig, SdErrorKind, SdLog, SdTest, SdTestOptions, dump_info, error_kind,
    open_device, prettybytes, probe_geometry, sd_err,
};
use std::{
    env::args_os,
    path::Path,
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Exit status of every failed run.
const EXIT_FAILURE: u8 = 255;

/// Install abort signal handlers and return
/// the abort-flag that is written to true by these handlers.
fn install_abort_handlers() -> ah::Result<Arc<AtomicBool>> {
    let abort = Arc::new(AtomicBool::new(false));
    for sig in &[
        signal_hook::consts::signal::SIGTERM,
        signal_hook::consts::signal::SIGINT,
    ] {
        if let Err(e) = signal_hook::flag::register(*sig, Arc::clone(&abort)) {
            return Err(ah::format_err!("Failed to register signal {sig}: {e}"));
        }
    }

    Ok(abort)
}

/// Raw device access needs root.
fn check_root() -> ah::Result<()> {
    // SAFETY: geteuid has no preconditions and always succeeds.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(sd_err(
            SdErrorKind::Config,
            "sdtest must be run as root (effective UID 0)",
        ));
    }
    Ok(())
}

/// Set up the device and the record and run the selected test.
fn run(args: &Args, abort: Arc<AtomicBool>) -> ah::Result<()> {
    let store = ProgressStore::new(&args.log_dir, &args.device)?;
    let mut log = SdLog::new(&args.device, args.timestamps, args.stdout);

    let mut dev = open_device(Path::new(&args.device))?;
    let geometry = probe_geometry(&dev)?;
    if args.info {
        dump_info(&mut log, &geometry)?;
    }

    let config = RunConfig::resolve(&geometry, args.buffer_size)?;
    tracing::info!(
        "{}: {} blocks of {}",
        args.device,
        config.block_writes,
        prettybytes(config.block_size)
    );
    let tail = config.untested_tail(geometry.size);
    if tail > 0 {
        tracing::info!("The last {} of {} are not tested.", prettybytes(tail), args.device);
    }

    let progress = store.open_or_init(&mut log, args.zero_stats, &config)?;

    let Some(test_type) = args.test_type else {
        return Ok(());
    };
    let options = SdTestOptions {
        verbose: args.verbose,
        quit_passes: args.quit_passes,
    };
    let mut test = SdTest::new(
        config,
        geometry.buffer_alignment(),
        options,
        progress,
        &mut log,
        abort,
    );
    test.run(test_type, &mut dev)?.into_result()
}

/// Main program entry point.
fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = parse_args(args_os()).and_then(|args| {
        check_root()?;
        let abort = install_abort_handlers()?;
        run(&args, abort)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match error_kind(&e) {
                Some(kind) => tracing::error!("{kind}: {e:#}"),
                None => tracing::error!("{e:#}"),
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

// vim: ts=4 sw=4 expandtab
