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

use crate::{
    bandwidth::BandwidthTimer,
    buffer::AlignedBuffer,
    device::SdDevice,
    error::{SdErrorKind, SdResultExt as _, sd_err},
    geometry::RunConfig,
    log::SdLog,
    progress::ProgressState,
    record::{BufferPhase, BufferStats, RecordLine, StatsLine},
    util::Hhmmss as _,
};
use anyhow as ah;
use movavg::MovAvg;
use std::{
    fmt::{Display, Formatter},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// Bit pattern written to a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    Ones,
    Zeros,
}

impl Pattern {
    /// Patterns in the order they are applied to each block.
    pub const ALL: [Pattern; 2] = [Pattern::Ones, Pattern::Zeros];

    pub fn byte(self) -> u8 {
        match self {
            Self::Ones => 0xFF,
            Self::Zeros => 0x00,
        }
    }

    fn phases(self) -> (BufferPhase, BufferPhase) {
        match self {
            Self::Ones => (BufferPhase::W1, BufferPhase::R1),
            Self::Zeros => (BufferPhase::W2, BufferPhase::R2),
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Ones => 0,
            Self::Zeros => 1,
        }
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Ones => write!(f, "ones"),
            Self::Zeros => write!(f, "zeros"),
        }
    }
}

/// Test algorithm selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestType {
    /// Write and verify all-ones and all-zeros.
    Pattern,
    /// Random data with CRC verification. Not implemented.
    RandomCrc,
}

impl TestType {
    /// Select the test by the first character of the selector.
    /// Unknown selectors select no test at all.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector.chars().next() {
            Some('z') => Some(Self::Pattern),
            Some('r') => Some(Self::RandomCrc),
            _ => None,
        }
    }
}

/// How a test run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdTestOutcome {
    /// The configured number of passes is complete.
    QuitLimitReached,
    /// Data read back differs from the written pattern.
    Mismatch {
        block: u64,
        pattern: Pattern,
        /// Device byte offset of the first differing byte.
        offset: u64,
    },
    /// The abort flag was raised before `block`.
    Aborted { block: u64 },
    /// The selected test does not exist. The device was not touched.
    Unimplemented,
}

impl SdTestOutcome {
    pub fn into_result(self) -> ah::Result<()> {
        match self {
            Self::QuitLimitReached | Self::Unimplemented => Ok(()),
            Self::Mismatch {
                block,
                pattern,
                offset,
            } => Err(sd_err(
                SdErrorKind::DataIntegrity,
                format!(
                    "Data mismatch in block {block} ({pattern} pattern) at byte offset {offset}"
                ),
            )),
            Self::Aborted { block } => Err(sd_err(
                SdErrorKind::Aborted,
                format!("Aborted before block {block}"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SdTestOptions {
    /// Emit a status line for every buffer transfer.
    pub verbose: bool,
    /// Stop when this many passes are complete. 0 means never.
    pub quit_passes: u64,
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter().zip(b).position(|(x, y)| x != y)
}

/// The endurance test run context.
pub struct SdTest<'a> {
    config: RunConfig,
    alignment: usize,
    options: SdTestOptions,
    progress: ProgressState,
    log: &'a mut SdLog,
    abort: Arc<AtomicBool>,
    timer: BandwidthTimer,
    wr_avg: MovAvg<u64, u64, 2>,
    rd_avg: MovAvg<u64, u64, 2>,
    /// Average bandwidths of the previous pass.
    wr_bw: u64,
    rd_bw: u64,
    /// Latest (write, read) bandwidth per pattern.
    last_bw: [(u64, u64); 2],
}

impl<'a> SdTest<'a> {
    pub fn new(
        config: RunConfig,
        alignment: usize,
        options: SdTestOptions,
        progress: ProgressState,
        log: &'a mut SdLog,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            alignment,
            options,
            progress,
            log,
            abort,
            timer: BandwidthTimer::new(),
            wr_avg: MovAvg::new(),
            rd_avg: MovAvg::new(),
            wr_bw: 0,
            rd_bw: 0,
            last_bw: [(0, 0); 2],
        }
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn run(
        &mut self,
        test_type: TestType,
        dev: &mut dyn SdDevice,
    ) -> ah::Result<SdTestOutcome> {
        match test_type {
            TestType::Pattern => self.run_pattern(dev),
            TestType::RandomCrc => {
                tracing::warn!("Random data test with CRC check is not implemented.");
                Ok(SdTestOutcome::Unimplemented)
            }
        }
    }

    fn emit_stats(&mut self, buffer: Option<BufferStats>) -> ah::Result<()> {
        let stats = StatsLine {
            written_total: self.progress.written_total(),
            pass_count: self.progress.pass_count(),
            wr_bw: self.wr_bw,
            rd_bw: self.rd_bw,
            buffer,
        };
        self.log.line(&RecordLine::Stats(stats))
    }

    fn run_pattern(&mut self, dev: &mut dyn SdDevice) -> ah::Result<SdTestOutcome> {
        let block_len = usize::try_from(self.config.block_size).kind(SdErrorKind::Resource)?;
        let mut wr_buf = AlignedBuffer::new(block_len, self.alignment)?;
        let mut rd_buf = AlignedBuffer::new(block_len, self.alignment)?;

        loop {
            dev.seek_to(0)?;
            self.emit_stats(None)?;

            let quit = self.options.quit_passes;
            if quit > 0 && self.progress.pass_count() >= quit {
                return Ok(SdTestOutcome::QuitLimitReached);
            }

            let pass_start = Instant::now();
            for block in 0..self.config.block_writes {
                if self.abort.load(Ordering::Relaxed) {
                    self.log.msg(format!("aborted at block {block}"))?;
                    self.emit_stats(None)?;
                    return Ok(SdTestOutcome::Aborted { block });
                }

                for pattern in Pattern::ALL {
                    let mismatch =
                        self.verify_block(dev, block, pattern, &mut wr_buf, &mut rd_buf)?;
                    if let Some(offset) = mismatch {
                        self.log.msg(format!("error at block {block}, exiting..."))?;
                        self.emit_stats(None)?;
                        return Ok(SdTestOutcome::Mismatch {
                            block,
                            pattern,
                            offset,
                        });
                    }
                }
            }

            let [(w1, r1), (w2, r2)] = self.last_bw;
            self.wr_avg.feed(w1);
            self.wr_bw = self.wr_avg.feed(w2);
            self.rd_avg.feed(r1);
            self.rd_bw = self.rd_avg.feed(r2);

            self.progress.complete_pass();
            tracing::info!(
                "Pass {} of {} finished in {}.",
                self.progress.pass_count(),
                self.log.device(),
                pass_start.elapsed().hhmmss()
            );
        }
    }

    /// Write one pattern to one block and read it back.
    /// Returns the device offset of the first bad byte.
    fn verify_block(
        &mut self,
        dev: &mut dyn SdDevice,
        block: u64,
        pattern: Pattern,
        wr_buf: &mut AlignedBuffer,
        rd_buf: &mut AlignedBuffer,
    ) -> ah::Result<Option<u64>> {
        let offset = block * self.config.block_size;
        let (wr_phase, rd_phase) = pattern.phases();
        wr_buf.fill(pattern.byte());

        dev.seek_to(offset)?;
        self.timer.start(self.progress.written_total());
        dev.write_full(wr_buf.as_slice())?;
        self.progress.add_written(self.config.block_size);
        let wr_bw = self.timer.stop(self.progress.written_total());
        self.buffer_stats(wr_phase, wr_bw)?;

        dev.seek_to(offset)?;
        self.timer.start(0);
        dev.read_full(rd_buf.as_mut_slice())?;
        let rd_bw = self.timer.stop(self.config.block_size);
        self.buffer_stats(rd_phase, rd_bw)?;

        self.last_bw[pattern.index()] = (wr_bw, rd_bw);

        Ok(first_difference(wr_buf.as_slice(), rd_buf.as_slice()).map(|i| offset + i as u64))
    }

    fn buffer_stats(&mut self, phase: BufferPhase, rate: u64) -> ah::Result<()> {
        if !self.options.verbose {
            return Ok(());
        }
        let stats = BufferStats {
            phase,
            bytes: self.timer.result_bytes(),
            usecs: self.timer.result_usecs(),
            rate,
        };
        self.emit_stats(Some(stats))
    }
}


// vim: ts=4 sw=4 expandtab
