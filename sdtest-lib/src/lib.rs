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

mod bandwidth;
mod buffer;
mod device;
mod engine;
mod error;
mod geometry;
mod log;
mod progress;
mod record;
mod util;

pub use bandwidth::{BandwidthTimer, bytes_per_sec};
pub use buffer::AlignedBuffer;
pub use device::{SdDevice, open_device};
pub use engine::{Pattern, SdTest, SdTestOptions, SdTestOutcome, TestType};
pub use error::{SdError, SdErrorKind, SdResultExt, error_kind, sd_err};
pub use geometry::{
    BUFFER_MODULO, DEFAULT_BUFFER_SIZE, RunConfig, check_buffer_size, dump_info,
    parse_buffer_size, probe_geometry,
};
pub use log::{SdLog, ctime_now};
pub use progress::{DEVICE_PREFIX, ProgressState, ProgressStore, RECORD_SUFFIX, record_name};
pub use record::{
    BufferPhase, BufferStats, RECORD_VERSION, RecordEntry, RecordLine, RecordSummary, StatsLine,
    frame,
};
pub use sdtest_rawio::{DeviceGeometry, RawIo};
pub use util::{Hhmmss, format_mbps, parsebytes, prettybytes};

// vim: ts=4 sw=4 expandtab
