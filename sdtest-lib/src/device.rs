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

use crate::error::{SdErrorKind, SdResultExt as _, sd_err};
use anyhow as ah;
use sdtest_rawio::{RawIo, RawIoOsIntf, RawIoResult};
use std::path::Path;

/// Open the device under test.
/// Block devices are accessed without the page cache.
pub fn open_device(path: &Path) -> ah::Result<RawIo> {
    let dev = RawIo::new(path, true).kind(SdErrorKind::Resource)?;
    if !dev.is_blkdev() {
        tracing::warn!(
            "{} is not a block device. Testing it as a plain file.",
            path.display()
        );
    }
    Ok(dev)
}

/// Block level access used by the test engine.
pub trait SdDevice {
    /// Position the device at an absolute byte offset.
    fn seek_to(&mut self, offset: u64) -> ah::Result<()>;

    /// Write the whole buffer at the current position.
    /// The data must be on the medium when this returns.
    fn write_full(&mut self, data: &[u8]) -> ah::Result<()>;

    /// Fill the whole buffer from the current position.
    fn read_full(&mut self, data: &mut [u8]) -> ah::Result<()>;
}

impl SdDevice for RawIo {
    fn seek_to(&mut self, offset: u64) -> ah::Result<()> {
        let pos = RawIoOsIntf::seek(self, offset).kind(SdErrorKind::Resource)?;
        if pos != offset {
            return Err(sd_err(
                SdErrorKind::Resource,
                format!("Seek to {offset} ended at {pos}"),
            ));
        }
        Ok(())
    }

    fn write_full(&mut self, data: &[u8]) -> ah::Result<()> {
        let mut done = 0;
        while done < data.len() {
            match RawIoOsIntf::write(self, &data[done..]).kind(SdErrorKind::Resource)? {
                RawIoResult::Ok(0) => {
                    return Err(sd_err(SdErrorKind::Resource, "Device accepted no data"));
                }
                RawIoResult::Ok(count) => done += count,
                RawIoResult::Enospc => {
                    return Err(sd_err(
                        SdErrorKind::Resource,
                        format!("Out of space after {done} bytes of the block"),
                    ));
                }
            }
        }
        if self.is_direct() {
            self.sync().kind(SdErrorKind::Resource)
        } else {
            // Force the read back to come from the medium.
            self.drop_file_caches(0, 0).kind(SdErrorKind::Resource)
        }
    }

    fn read_full(&mut self, data: &mut [u8]) -> ah::Result<()> {
        let mut done = 0;
        while done < data.len() {
            match RawIoOsIntf::read(self, &mut data[done..]).kind(SdErrorKind::Resource)? {
                RawIoResult::Ok(0) => {
                    return Err(sd_err(
                        SdErrorKind::Resource,
                        format!("Unexpected end of device after {done} bytes of the block"),
                    ));
                }
                RawIoResult::Ok(count) => done += count,
                RawIoResult::Enospc => {
                    return Err(sd_err(SdErrorKind::Resource, "Read returned ENOSPC"));
                }
            }
        }
        Ok(())
    }
}


// vim: ts=4 sw=4 expandtab
