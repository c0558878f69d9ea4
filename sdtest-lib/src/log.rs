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
    error::{SdErrorKind, SdResultExt as _},
    record::{RecordLine, frame},
};
use anyhow as ah;
use chrono::Local;
use std::{
    fmt::Display,
    fs::File,
    io::{LineWriter, Write as _},
};

/// Current local time in the classic `ctime` representation.
pub fn ctime_now() -> String {
    Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Status line writer.
///
/// Every line is prefixed with the device name and optionally a timestamp.
/// Lines go to the progress record, once it is attached, and to stdout.
pub struct SdLog {
    device: String,
    timestamps: bool,
    to_stdout: bool,
    record: Option<LineWriter<File>>,
}

impl SdLog {
    pub fn new(device: &str, timestamps: bool, to_stdout: bool) -> Self {
        Self {
            device: device.to_string(),
            timestamps,
            to_stdout,
            record: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Send all further lines to the record file.
    /// Each line is flushed as soon as it is complete.
    pub fn attach_record(&mut self, file: File) {
        self.record = Some(LineWriter::new(file));
    }

    pub fn has_record(&self) -> bool {
        self.record.is_some()
    }

    /// Log one free text line.
    pub fn msg(&mut self, body: impl Display) -> ah::Result<()> {
        let timestamp = self.timestamps.then(ctime_now);
        let text = frame(&self.device, timestamp.as_deref(), &body);

        // Without record the terminal is the only place the line can go.
        if self.to_stdout || self.record.is_none() {
            println!("{text}");
        }
        if let Some(record) = self.record.as_mut() {
            writeln!(record, "{text}").kind(SdErrorKind::Resource)?;
        }
        Ok(())
    }

    /// Log one structured record line.
    pub fn line(&mut self, line: &RecordLine) -> ah::Result<()> {
        self.msg(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordEntry, StatsLine};
    use std::fs;

    #[test]
    fn test_record_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdq.log");

        let mut log = SdLog::new("/dev/sdq", false, false);
        assert_eq!(log.device(), "/dev/sdq");
        assert!(!log.has_record());
        log.attach_record(File::create(&path).unwrap());
        assert!(log.has_record());

        log.line(&RecordLine::BlockSize(4096)).unwrap();
        log.msg("hello world").unwrap();

        // Lines are visible without dropping the log.
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[/dev/sdq] block_size=4096\n[/dev/sdq] hello world\n");
    }

    #[test]
    fn test_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdq.log");

        let mut log = SdLog::new("/dev/sdq", true, false);
        log.attach_record(File::create(&path).unwrap());
        log.line(&RecordLine::Stats(StatsLine {
            written_total: 3,
            pass_count: 4,
            ..Default::default()
        }))
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let entry = RecordEntry::parse(text.lines().next().unwrap()).unwrap();
        assert_eq!(entry.device, "/dev/sdq");
        let ts = entry.timestamp.unwrap();
        assert_eq!(ts.len(), "Mon Jan  1 12:00:00 2024".len());
        let RecordLine::Stats(stats) = entry.line else {
            panic!("Stats line expected");
        };
        assert_eq!((stats.written_total, stats.pass_count), (3, 4));
    }

    #[test]
    fn test_ctime_format() {
        let t = ctime_now();
        let fields: Vec<&str> = t.split_whitespace().collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[3].len(), "12:00:00".len());
        assert!(fields[4].parse::<u32>().is_ok());
    }
}

// vim: ts=4 sw=4 expandtab
