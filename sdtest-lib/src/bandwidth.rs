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

use std::time::Instant;

/// Throughput for a byte count transferred in the given time.
/// Zero bytes or zero time is no meaningful rate and yields 0.
pub fn bytes_per_sec(bytes: u64, usecs: u64) -> u64 {
    if bytes == 0 || usecs == 0 {
        return 0;
    }
    let rate = u128::from(bytes) * 1_000_000 / u128::from(usecs);
    u64::try_from(rate).unwrap_or(u64::MAX)
}

/// Start/stop timer for one bandwidth window.
///
/// The timer is reused for each measured operation.
/// It is not meant to be shared between threads.
#[derive(Clone, Debug)]
pub struct BandwidthTimer {
    start_time: Instant,
    start_bytes: u64,
    result_bytes: u64,
    result_usecs: u64,
}

impl BandwidthTimer {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            start_bytes: 0,
            result_bytes: 0,
            result_usecs: 0,
        }
    }

    /// Open a new window at the given byte position.
    pub fn start(&mut self, bytes: u64) {
        self.start_bytes = bytes;
        self.start_time = Instant::now();
    }

    /// Close the window at the given byte position
    /// and return the rate in bytes per second.
    pub fn stop(&mut self, bytes: u64) -> u64 {
        self.stop_at(bytes, Instant::now())
    }

    fn stop_at(&mut self, bytes: u64, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start_time);
        self.result_usecs = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.result_bytes = bytes.saturating_sub(self.start_bytes);
        bytes_per_sec(self.result_bytes, self.result_usecs)
    }

    /// Bytes transferred in the last closed window.
    pub fn result_bytes(&self) -> u64 {
        self.result_bytes
    }

    /// Duration of the last closed window in microseconds.
    pub fn result_usecs(&self) -> u64 {
        self.result_usecs
    }
}

impl Default for BandwidthTimer {
    fn default() -> Self {
        Self::new()
    }
}


// vim: ts=4 sw=4 expandtab
