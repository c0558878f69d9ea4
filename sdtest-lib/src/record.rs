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

//! Line format of the progress record.
//!
//! Every record line is framed as `[<device>][<timestamp>] <body>`,
//! where the timestamp part is optional.

use crate::util::{MB, format_mbps};
use anyhow as ah;
use regex::Regex;
use std::{
    fmt::{Display, Formatter},
    io::BufRead,
    str::FromStr,
    sync::LazyLock,
};

/// Current record schema version.
/// Records without a version line are version 0.
pub const RECORD_VERSION: u32 = 1;

static STATS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^stats:(\d+):(\d+)",
        r"(?::wrbw=([0-9.]+) MB/s:rdbw=([0-9.]+) MB/s)?",
        r"(?::buffer stats:(W1|R1|W2|R2):(\d+):(\d+):([0-9.]+) MB/s)?",
    ))
    .expect("Invalid stats regex")
});

/// The four measured phases of one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPhase {
    /// Write of the ones pattern.
    W1,
    /// Read back of the ones pattern.
    R1,
    /// Write of the zeros pattern.
    W2,
    /// Read back of the zeros pattern.
    R2,
}

impl Display for BufferPhase {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let name = match self {
            Self::W1 => "W1",
            Self::R1 => "R1",
            Self::W2 => "W2",
            Self::R2 => "R2",
        };
        write!(f, "{name}")
    }
}

impl FromStr for BufferPhase {
    type Err = ah::Error;

    fn from_str(s: &str) -> ah::Result<Self> {
        match s {
            "W1" => Ok(Self::W1),
            "R1" => Ok(Self::R1),
            "W2" => Ok(Self::W2),
            "R2" => Ok(Self::R2),
            _ => Err(ah::format_err!("Unknown buffer phase: {s}")),
        }
    }
}

/// Measurement of a single buffer transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferStats {
    pub phase: BufferPhase,
    pub bytes: u64,
    pub usecs: u64,
    /// Bytes per second.
    pub rate: u64,
}

/// A status line. This is the checkpoint that a restarted run resumes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsLine {
    pub written_total: u64,
    pub pass_count: u64,
    /// Average write bandwidth of the previous pass in bytes per second.
    pub wr_bw: u64,
    /// Average read bandwidth of the previous pass in bytes per second.
    pub rd_bw: u64,
    pub buffer: Option<BufferStats>,
}

#[allow(clippy::cast_sign_loss)]
fn parse_mbps(s: &str) -> Option<u64> {
    let v: f64 = s.parse().ok()?;
    (v.is_finite() && v >= 0.0).then(|| (v * MB as f64).round() as u64)
}

impl StatsLine {
    fn parse(body: &str) -> Option<Self> {
        let caps = STATS_RE.captures(body)?;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());

        let written_total = num(1)?;
        let pass_count = num(2)?;
        let (wr_bw, rd_bw) = match (caps.get(3), caps.get(4)) {
            (Some(wr), Some(rd)) => (parse_mbps(wr.as_str())?, parse_mbps(rd.as_str())?),
            _ => (0, 0),
        };
        let buffer = match caps.get(5) {
            Some(phase) => Some(BufferStats {
                phase: phase.as_str().parse().ok()?,
                bytes: num(6)?,
                usecs: num(7)?,
                rate: parse_mbps(caps.get(8)?.as_str())?,
            }),
            None => None,
        };

        Some(Self {
            written_total,
            pass_count,
            wr_bw,
            rd_bw,
            buffer,
        })
    }
}

impl Display for StatsLine {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "stats:{}:{}:wrbw={} MB/s:rdbw={} MB/s",
            self.written_total,
            self.pass_count,
            format_mbps(self.wr_bw),
            format_mbps(self.rd_bw),
        )?;
        if let Some(b) = &self.buffer {
            write!(
                f,
                ":buffer stats:{}:{}:{}:{} MB/s",
                b.phase,
                b.bytes,
                b.usecs,
                format_mbps(b.rate),
            )?;
        }
        Ok(())
    }
}

/// Body of one record line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordLine {
    Version(u32),
    DeviceName(String),
    StartTime(String),
    BlockSize(u64),
    BlockWrites(u64),
    BufferSize(u64),
    Stats(StatsLine),
    /// Free text.
    Message(String),
}

impl RecordLine {
    /// Parse a line body.
    /// Anything that is not a well formed known line is a message.
    pub fn parse(body: &str) -> Self {
        if body.starts_with("stats") {
            if let Some(stats) = StatsLine::parse(body) {
                return Self::Stats(stats);
            }
        } else if let Some((key, value)) = body.split_once('=') {
            let parsed = match key {
                "record_version" => value.parse().ok().map(Self::Version),
                "devicename" => Some(Self::DeviceName(value.to_string())),
                "starttime" => Some(Self::StartTime(value.to_string())),
                "block_size" => value.parse().ok().map(Self::BlockSize),
                "block_writes" => value.parse().ok().map(Self::BlockWrites),
                "buffer_size" => value.parse().ok().map(Self::BufferSize),
                _ => None,
            };
            if let Some(parsed) = parsed {
                return parsed;
            }
        }
        Self::Message(body.to_string())
    }
}

impl Display for RecordLine {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Version(v) => write!(f, "record_version={v}"),
            Self::DeviceName(n) => write!(f, "devicename={n}"),
            Self::StartTime(t) => write!(f, "starttime={t}"),
            Self::BlockSize(s) => write!(f, "block_size={s}"),
            Self::BlockWrites(w) => write!(f, "block_writes={w}"),
            Self::BufferSize(s) => write!(f, "buffer_size={s}"),
            Self::Stats(s) => write!(f, "{s}"),
            Self::Message(m) => write!(f, "{m}"),
        }
    }
}

/// Build one framed record line (without line terminator).
pub fn frame(device: &str, timestamp: Option<&str>, body: &dyn Display) -> String {
    match timestamp {
        Some(ts) => format!("[{device}][{ts}] {body}"),
        None => format!("[{device}] {body}"),
    }
}

/// One complete line of the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordEntry {
    pub device: String,
    pub timestamp: Option<String>,
    pub line: RecordLine,
}

impl RecordEntry {
    /// Split a framed line. Returns None, if the framing is broken.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_end_matches(['\r', '\n']);
        let (device, rest) = text.strip_prefix('[')?.split_once(']')?;
        let (timestamp, rest) = match rest.strip_prefix('[') {
            Some(rest) => {
                let (ts, rest) = rest.split_once(']')?;
                (Some(ts.to_string()), rest)
            }
            None => (None, rest),
        };
        let body = rest.strip_prefix(' ')?;
        Some(Self {
            device: device.to_string(),
            timestamp,
            line: RecordLine::parse(body),
        })
    }
}

impl Display for RecordEntry {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            frame(&self.device, self.timestamp.as_deref(), &self.line)
        )
    }
}

/// What a restarted run needs to know about an existing record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordSummary {
    /// Device of the first line.
    pub device: Option<String>,
    pub version: u32,
    /// Most recent status line.
    pub last_stats: Option<StatsLine>,
}

impl RecordSummary {
    pub fn scan(reader: impl BufRead) -> ah::Result<Self> {
        let mut summary = Self::default();
        let mut first = true;
        for raw in reader.split(b'\n') {
            // Damaged lines must not hide earlier checkpoints.
            let raw = raw?;
            let text = String::from_utf8_lossy(&raw);
            if text.trim().is_empty() {
                continue;
            }
            let entry = RecordEntry::parse(&text);
            if first {
                summary.device = entry.as_ref().map(|e| e.device.clone());
                first = false;
            }
            match entry.map(|e| e.line) {
                Some(RecordLine::Version(v)) => summary.version = v,
                Some(RecordLine::Stats(s)) => summary.last_stats = Some(s),
                _ => (),
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stats_line() {
        let s = StatsLine {
            written_total: 8388608,
            pass_count: 1,
            wr_bw: 12_345_678,
            rd_bw: 20_000_000,
            buffer: None,
        };
        let text = s.to_string();
        assert_eq!(text, "stats:8388608:1:wrbw=12.35 MB/s:rdbw=20.00 MB/s");
        let RecordLine::Stats(p) = RecordLine::parse(&text) else {
            panic!("Not parsed as stats line");
        };
        assert_eq!(p.written_total, 8388608);
        assert_eq!(p.pass_count, 1);
        assert_eq!(p.wr_bw, 12_350_000);
        assert_eq!(p.rd_bw, 20_000_000);
        assert_eq!(p.buffer, None);
    }

    #[test]
    fn test_stats_line_buffer() {
        let text = "stats:100:2:wrbw=1.00 MB/s:rdbw=2.00 MB/s:buffer stats:R2:1048576:52000:20.16 MB/s";
        let RecordLine::Stats(p) = RecordLine::parse(text) else {
            panic!("Not parsed as stats line");
        };
        assert_eq!(
            p.buffer,
            Some(BufferStats {
                phase: BufferPhase::R2,
                bytes: 1048576,
                usecs: 52000,
                rate: 20_160_000,
            })
        );
        assert_eq!(p.to_string(), text);
    }

    #[test]
    fn test_stats_line_legacy() {
        // Counters without bandwidth fields.
        let RecordLine::Stats(p) = RecordLine::parse("stats:42:7") else {
            panic!("Not parsed as stats line");
        };
        assert_eq!((p.written_total, p.pass_count, p.wr_bw, p.rd_bw), (42, 7, 0, 0));

        assert_eq!(
            RecordLine::parse("stats:x:7"),
            RecordLine::Message("stats:x:7".to_string())
        );
    }

    #[test]
    fn test_header_lines() {
        for line in [
            RecordLine::Version(RECORD_VERSION),
            RecordLine::DeviceName("/dev/sdb1".to_string()),
            RecordLine::StartTime("Mon Jan  1 12:00:00 2024".to_string()),
            RecordLine::BlockSize(134217728),
            RecordLine::BlockWrites(118),
            RecordLine::BufferSize(134217728),
            RecordLine::Message("error at block 2, exiting...".to_string()),
        ] {
            assert_eq!(RecordLine::parse(&line.to_string()), line);
        }
        assert_eq!(
            RecordLine::parse("block_size=lots"),
            RecordLine::Message("block_size=lots".to_string())
        );
    }

    #[test]
    fn test_entry_framing() {
        let e = RecordEntry::parse("[/dev/sdb1] block_writes=118\n").unwrap();
        assert_eq!(e.device, "/dev/sdb1");
        assert_eq!(e.timestamp, None);
        assert_eq!(e.line, RecordLine::BlockWrites(118));
        assert_eq!(e.to_string(), "[/dev/sdb1] block_writes=118");

        let e = RecordEntry::parse("[/dev/sdb1][Mon Jan  1 12:00:00 2024] stats:1:2").unwrap();
        assert_eq!(e.timestamp.as_deref(), Some("Mon Jan  1 12:00:00 2024"));
        assert!(matches!(e.line, RecordLine::Stats(_)));

        assert!(RecordEntry::parse("stats:1:2").is_none());
        assert!(RecordEntry::parse("[/dev/sdb1]stats:1:2").is_none());
        assert!(RecordEntry::parse("[/dev/sdb1").is_none());
    }

    #[test]
    fn test_summary() {
        let text = "\
[/dev/sdc] record_version=1
[/dev/sdc] devicename=/dev/sdc
[/dev/sdc] stats:0:0:wrbw=0.00 MB/s:rdbw=0.00 MB/s
[/dev/sdc] stats:2097152:0:wrbw=0.00 MB/s:rdbw=0.00 MB/s:buffer stats:W1:1048576:1000:1048.58 MB/s
garbage

[/dev/sdc] stats:8388608:1:wrbw=5.00 MB/s:rdbw=6.00 MB/s
[/dev/sdc] Restarting with Total written: 8388608 Pass count: 1
";
        let s = RecordSummary::scan(Cursor::new(text)).unwrap();
        assert_eq!(s.device.as_deref(), Some("/dev/sdc"));
        assert_eq!(s.version, 1);
        let stats = s.last_stats.unwrap();
        assert_eq!(stats.written_total, 8388608);
        assert_eq!(stats.pass_count, 1);

        let s = RecordSummary::scan(Cursor::new("[/dev/sdc] devicename=/dev/sdc\n")).unwrap();
        assert_eq!(s.version, 0);
        assert_eq!(s.last_stats, None);

        let s = RecordSummary::scan(Cursor::new("")).unwrap();
        assert_eq!(s, RecordSummary::default());

        let s = RecordSummary::scan(Cursor::new("junk\n[/dev/sdc] stats:1:1\n")).unwrap();
        assert_eq!(s.device, None);
    }

    #[test]
    fn test_summary_invalid_utf8() {
        let text: &[u8] = b"\
[/dev/sdc] devicename=/dev/sdc\n\
[/dev/sdc] stats:4096:2:wrbw=1.00 MB/s:rdbw=1.00 MB/s\r\n\
[/dev/sdc] \xff\xfe\x80 torn write\n\
\xc3\n";
        let s = RecordSummary::scan(Cursor::new(text)).unwrap();
        assert_eq!(s.device.as_deref(), Some("/dev/sdc"));
        let stats = s.last_stats.unwrap();
        assert_eq!(stats.written_total, 4096);
        assert_eq!(stats.pass_count, 2);
    }
}

// vim: ts=4 sw=4 expandtab
