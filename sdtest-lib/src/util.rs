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
use std::time::Duration;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

pub const KB: u64 = 1000;
pub const MB: u64 = 1000 * KB;
pub const GB: u64 = 1000 * MB;
pub const TB: u64 = 1000 * GB;

/// Unit suffixes accepted by `parsebytes`.
/// Longer suffixes must come before their own tails.
const SUFFIXES: [(&str, u64); 12] = [
    ("tib", TIB),
    ("gib", GIB),
    ("mib", MIB),
    ("kib", KIB),
    ("tb", TB),
    ("gb", GB),
    ("mb", MB),
    ("kb", KB),
    ("t", TIB),
    ("g", GIB),
    ("m", MIB),
    ("k", KIB),
];

/// Human readable binary and decimal representation of a byte count.
pub fn prettybytes(count: u64) -> String {
    if count < KIB {
        return format!("{count} bytes");
    }
    let (bin, bin_unit) = match count {
        TIB.. => (count as f64 / TIB as f64, "TiB"),
        GIB.. => (count as f64 / GIB as f64, "GiB"),
        MIB.. => (count as f64 / MIB as f64, "MiB"),
        _ => (count as f64 / KIB as f64, "kiB"),
    };
    let (dec, dec_unit) = match count {
        TB.. => (count as f64 / TB as f64, "TB"),
        GB.. => (count as f64 / GB as f64, "GB"),
        MB.. => (count as f64 / MB as f64, "MB"),
        _ => (count as f64 / KB as f64, "kB"),
    };
    format!("{bin:.1} {bin_unit} ({dec:.1} {dec_unit})")
}

/// Parse a byte count with an optional unit suffix (e.g. "128 MiB" or "64m").
#[allow(clippy::cast_sign_loss)]
pub fn parsebytes(s: &str) -> ah::Result<u64> {
    let s = s.trim().to_lowercase();

    // byte count w/o suffix.
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }

    for (suffix, factor) in SUFFIXES {
        let Some(value) = s.strip_suffix(suffix) else {
            continue;
        };
        let value = value.trim();
        if let Ok(value) = value.parse::<u64>() {
            return value
                .checked_mul(factor)
                .ok_or_else(|| ah::format_err!("Value integer overflow."));
        }
        if let Ok(value) = value.parse::<f64>() {
            let factor = factor as f64;
            if !value.is_finite() || value < 0.0 || value.log2() + factor.log2() >= 61.0 {
                return Err(ah::format_err!("Value float overflow."));
            }
            return Ok((value * factor).round() as u64);
        }
        break;
    }
    Err(ah::format_err!("Cannot parse byte count: {s}"))
}

/// Format a bytes-per-second rate as MB/s with two decimals.
pub fn format_mbps(bytes_per_sec: u64) -> String {
    format!("{:.2}", bytes_per_sec as f64 / MB as f64)
}

pub trait Hhmmss {
    fn hhmmss(&self) -> String;
}

impl Hhmmss for Duration {
    fn hhmmss(&self) -> String {
        let secs = self.as_secs();
        let h = secs / (60 * 60);
        let m = (secs / 60) % 60;
        let s = secs % 60;
        format!("{h:02}h:{m:02}m:{s:02}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prettybytes() {
        assert_eq!(prettybytes(42), "42 bytes");
        assert_eq!(prettybytes(42 * 1024), "42.0 kiB (43.0 kB)");
        assert_eq!(prettybytes(128 * 1024 * 1024), "128.0 MiB (134.2 MB)");
        assert_eq!(prettybytes(42 * 1024 * 1024 * 1024), "42.0 GiB (45.1 GB)");
        assert_eq!(prettybytes(2 * 1024 * 1024 * 1024 * 1024), "2.0 TiB (2.2 TB)");
    }

    #[test]
    fn test_parsebytes() {
        assert_eq!(parsebytes("42").unwrap(), 42);
        assert_eq!(parsebytes(" 134217728 ").unwrap(), 128 * 1024 * 1024);

        assert_eq!(parsebytes("42kib").unwrap(), 42 * 1024);
        assert_eq!(parsebytes("128 MiB").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parsebytes(" 2 gib ").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parsebytes("1Tib").unwrap(), 1024 * 1024 * 1024 * 1024);
        assert_eq!(parsebytes("64m").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parsebytes("1.5 M").unwrap(), 1024 * 1024 + 512 * 1024);

        assert_eq!(parsebytes("42kb").unwrap(), 42 * 1000);
        assert_eq!(parsebytes("3 MB").unwrap(), 3 * 1000 * 1000);
        assert_eq!(parsebytes("2.5gb").unwrap(), 2_500_000_000);

        assert!(parsebytes("").is_err());
        assert!(parsebytes("foo").is_err());
        assert!(parsebytes("12 xb").is_err());
        assert!(parsebytes("-1m").is_err());
        assert!(parsebytes("99999999999 tib").is_err());
    }

    #[test]
    fn test_format_mbps() {
        assert_eq!(format_mbps(0), "0.00");
        assert_eq!(format_mbps(12_345_678), "12.35");
        assert_eq!(format_mbps(1_000_000), "1.00");
    }

    #[test]
    fn test_hhmmss() {
        assert_eq!(Duration::from_secs(0).hhmmss(), "00h:00m:00s");
        assert_eq!(
            Duration::from_secs((2 * 60 * 60) + (3 * 60) + 4).hhmmss(),
            "02h:03m:04s"
        );
        assert_eq!(
            Duration::from_secs((150 * 60 * 60) + 59).hhmmss(),
            "150h:00m:59s"
        );
    }
}

// vim: ts=4 sw=4 expandtab
