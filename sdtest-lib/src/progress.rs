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
    error::{SdErrorKind, SdResultExt as _, sd_err},
    geometry::RunConfig,
    log::{SdLog, ctime_now},
    record::{RECORD_VERSION, RecordLine, RecordSummary},
};
use anyhow as ah;
use std::{
    fs::{File, OpenOptions},
    io::BufReader,
    path::{Path, PathBuf},
};

/// Devices that may be tested.
pub const DEVICE_PREFIX: &str = "/dev/sd";

pub const RECORD_SUFFIX: &str = ".log";

/// File name of the progress record of a device.
/// `/dev/sdb1` is recorded in `sdb1.log`.
pub fn record_name(device: &str) -> ah::Result<String> {
    if !device.starts_with(DEVICE_PREFIX) {
        return Err(sd_err(
            SdErrorKind::Config,
            format!("Device name {device:?} does not start with {DEVICE_PREFIX}"),
        ));
    }
    let name = &device["/dev/".len()..];
    Ok(format!("{name}{RECORD_SUFFIX}"))
}

/// Endurance counters that survive restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressState {
    written_total: u64,
    pass_count: u64,
}

impl ProgressState {
    pub fn new(written_total: u64, pass_count: u64) -> Self {
        Self {
            written_total,
            pass_count,
        }
    }

    /// Bytes written to the device over all runs.
    pub fn written_total(&self) -> u64 {
        self.written_total
    }

    /// Completed full device passes over all runs.
    pub fn pass_count(&self) -> u64 {
        self.pass_count
    }

    pub fn add_written(&mut self, bytes: u64) {
        self.written_total = self.written_total.saturating_add(bytes);
    }

    pub fn complete_pass(&mut self) {
        self.pass_count = self.pass_count.saturating_add(1);
    }
}

/// The progress record of one device.
pub struct ProgressStore {
    device: String,
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: &Path, device: &str) -> ah::Result<Self> {
        let path = dir.join(record_name(device)?);
        Ok(Self {
            device: device.to_string(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resume from the existing record or start a new one.
    ///
    /// On return the record is attached to `log`,
    /// so that every further status line is persisted.
    pub fn open_or_init(
        &self,
        log: &mut SdLog,
        reset: bool,
        config: &RunConfig,
    ) -> ah::Result<ProgressState> {
        if !reset && self.path.exists() {
            self.resume(log)
        } else {
            self.init(log, config)
        }
    }

    fn resume(&self, log: &mut SdLog) -> ah::Result<ProgressState> {
        let summary = {
            let file = File::open(&self.path).map_err(|e| {
                sd_err(
                    SdErrorKind::Resource,
                    format!("Failed to open {}: {e}", self.path.display()),
                )
            })?;
            RecordSummary::scan(BufReader::new(file)).kind(SdErrorKind::Resource)?
        };

        let path = self.path.display();
        if summary.device.as_deref() != Some(self.device.as_str()) {
            let owner = summary.device.as_deref().unwrap_or("<unknown>");
            let device = &self.device;
            return Err(sd_err(
                SdErrorKind::Identity,
                format!(
                    "Progress record {path} belongs to device {owner}, not to {device}. \
                     Use a reset to start over."
                ),
            ));
        }
        if summary.version > RECORD_VERSION {
            let version = summary.version;
            return Err(sd_err(
                SdErrorKind::Config,
                format!(
                    "Progress record {path} has version {version}, \
                     but only version {RECORD_VERSION} is supported."
                ),
            ));
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .kind(SdErrorKind::Resource)?;
        log.attach_record(file);

        let Some(stats) = summary.last_stats else {
            tracing::warn!("No status line in {path}. Counting starts at zero.");
            return Ok(ProgressState::default());
        };
        let state = ProgressState::new(stats.written_total, stats.pass_count);
        log.msg(format!(
            "Restarting with Total written: {} Pass count: {}",
            state.written_total(),
            state.pass_count()
        ))?;
        Ok(state)
    }

    fn init(&self, log: &mut SdLog, config: &RunConfig) -> ah::Result<ProgressState> {
        let file = File::create(&self.path).map_err(|e| {
            sd_err(
                SdErrorKind::Resource,
                format!("Failed to create {}: {e}", self.path.display()),
            )
        })?;
        log.attach_record(file);

        log.line(&RecordLine::Version(RECORD_VERSION))?;
        log.line(&RecordLine::DeviceName(self.device.clone()))?;
        log.line(&RecordLine::StartTime(ctime_now()))?;
        log.line(&RecordLine::BlockSize(config.block_size))?;
        log.line(&RecordLine::BlockWrites(config.block_writes))?;
        log.line(&RecordLine::BufferSize(config.buffer_size))?;
        Ok(ProgressState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use std::fs;
    use tracing_test::traced_test;

    const MIB: u64 = 1024 * 1024;

    fn config() -> RunConfig {
        RunConfig {
            buffer_size: MIB,
            block_size: MIB,
            block_writes: 4,
        }
    }

    #[test]
    fn test_record_name() {
        assert_eq!(record_name("/dev/sdb1").unwrap(), "sdb1.log");
        assert_eq!(record_name("/dev/sda").unwrap(), "sda.log");
        for dev in ["/dev/mmcblk0", "sdb", "/tmp/sdb", "", "/dev/s"] {
            let e = record_name(dev).unwrap_err();
            assert_eq!(error_kind(&e), Some(SdErrorKind::Config));
        }
    }

    #[test]
    fn test_state_counters() {
        let mut s = ProgressState::new(10, 2);
        s.add_written(MIB);
        s.add_written(MIB);
        s.complete_pass();
        assert_eq!(s.written_total(), 10 + 2 * MIB);
        assert_eq!(s.pass_count(), 3);

        let mut s = ProgressState::new(u64::MAX - 1, 0);
        s.add_written(MIB);
        assert_eq!(s.written_total(), u64::MAX);
    }

    #[test]
    fn test_fresh_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        assert_eq!(store.path(), dir.path().join("sdz.log"));

        let mut log = SdLog::new("/dev/sdz", false, false);
        let state = store.open_or_init(&mut log, false, &config()).unwrap();
        assert_eq!(state, ProgressState::default());
        assert!(log.has_record());
        drop(log);

        let text = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "[/dev/sdz] record_version=1");
        assert_eq!(lines[1], "[/dev/sdz] devicename=/dev/sdz");
        assert!(lines[2].starts_with("[/dev/sdz] starttime="));
        assert_eq!(lines[3], "[/dev/sdz] block_size=1048576");
        assert_eq!(lines[4], "[/dev/sdz] block_writes=4");
        assert_eq!(lines[5], "[/dev/sdz] buffer_size=1048576");
    }

    #[test]
    fn test_resume() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        fs::write(
            store.path(),
            "[/dev/sdz] record_version=1\n\
             [/dev/sdz] devicename=/dev/sdz\n\
             [/dev/sdz] stats:1048576:0:wrbw=0.00 MB/s:rdbw=0.00 MB/s\n\
             [/dev/sdz] stats:123456789:42:wrbw=3.00 MB/s:rdbw=4.00 MB/s\n\
             [/dev/sdz] error at block 2, exiting...\n",
        )
        .unwrap();

        let mut log = SdLog::new("/dev/sdz", false, false);
        let state = store.open_or_init(&mut log, false, &config()).unwrap();
        assert_eq!(state.written_total(), 123456789);
        assert_eq!(state.pass_count(), 42);
        drop(log);

        // Appended, never rewritten.
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[/dev/sdz] record_version=1\n"));
        assert!(text.ends_with(
            "exiting...\n[/dev/sdz] Restarting with Total written: 123456789 Pass count: 42\n"
        ));
    }

    #[test]
    fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        fs::write(store.path(), "[/dev/sdz] stats:5:5\n").unwrap();

        let mut log = SdLog::new("/dev/sdz", false, false);
        let state = store.open_or_init(&mut log, true, &config()).unwrap();
        assert_eq!(state, ProgressState::default());
        drop(log);

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(!text.contains("stats:5:5"));
        assert!(text.starts_with("[/dev/sdz] record_version=1\n"));
    }

    #[test]
    fn test_identity_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        let orig = "[/dev/sdz1] devicename=/dev/sdz1\n[/dev/sdz1] stats:7:1\n";
        fs::write(store.path(), orig).unwrap();

        let mut log = SdLog::new("/dev/sdz", false, false);
        let e = store.open_or_init(&mut log, false, &config()).unwrap_err();
        assert_eq!(error_kind(&e), Some(SdErrorKind::Identity));
        assert!(!log.has_record());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), orig);
    }

    #[test]
    fn test_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        fs::write(store.path(), "[/dev/sdz] record_version=99\n").unwrap();

        let mut log = SdLog::new("/dev/sdz", false, false);
        let e = store.open_or_init(&mut log, false, &config()).unwrap_err();
        assert_eq!(error_kind(&e), Some(SdErrorKind::Config));
    }

    #[test]
    #[traced_test]
    fn test_resume_without_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        // Version 0 record.
        fs::write(store.path(), "[/dev/sdz] devicename=/dev/sdz\n").unwrap();

        let mut log = SdLog::new("/dev/sdz", false, false);
        let state = store.open_or_init(&mut log, false, &config()).unwrap();
        assert_eq!(state, ProgressState::default());
        assert!(log.has_record());
        assert!(logs_contain("No status line"));
    }

    #[test]
    fn test_resume_undecodable_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "/dev/sdz").unwrap();
        fs::write(
            store.path(),
            b"[/dev/sdz] devicename=/dev/sdz\n\
              [/dev/sdz] stats:100:3:wrbw=0.00 MB/s:rdbw=0.00 MB/s\n\
              [/dev/sdz] \xff\xfe garbage\n",
        )
        .unwrap();

        let mut log = SdLog::new("/dev/sdz", false, false);
        let state = store.open_or_init(&mut log, false, &config()).unwrap();
        assert_eq!(state, ProgressState::new(100, 3));
        assert!(log.has_record());
        drop(log);

        let text = fs::read(store.path()).unwrap();
        assert!(text.ends_with(b"[/dev/sdz] Restarting with Total written: 100 Pass count: 3\n"));
    }

    #[test]
    fn test_create_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(&dir.path().join("missing"), "/dev/sdz").unwrap();
        let mut log = SdLog::new("/dev/sdz", false, false);
        let e = store.open_or_init(&mut log, false, &config()).unwrap_err();
        assert_eq!(error_kind(&e), Some(SdErrorKind::Resource));
    }
}

// vim: ts=4 sw=4 expandtab
