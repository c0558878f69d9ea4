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
    log::SdLog,
    util::{MIB, parsebytes},
};
use anyhow as ah;
use sdtest_rawio::{DeviceGeometry, RawIoOsIntf};

/// Buffer size overrides must be a multiple of this.
pub const BUFFER_MODULO: u64 = MIB;

/// Buffer size used if there is no override.
pub const DEFAULT_BUFFER_SIZE: u64 = BUFFER_MODULO * 128;

/// Check a user supplied buffer size.
/// Zero selects the default size.
pub fn check_buffer_size(size: u64) -> ah::Result<u64> {
    if size % BUFFER_MODULO != 0 {
        return Err(sd_err(
            SdErrorKind::Config,
            format!("'buffer size' must be modulo {BUFFER_MODULO}"),
        ));
    }
    Ok(size)
}

/// Parse and check a buffer size command line value.
pub fn parse_buffer_size(s: &str) -> ah::Result<u64> {
    check_buffer_size(parsebytes(s)?)
}

/// Sizing of the test blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Size of the I/O buffers.
    pub buffer_size: u64,
    /// Size of one tested region of the device.
    pub block_size: u64,
    /// Number of blocks in one pass.
    pub block_writes: u64,
}

impl RunConfig {
    /// Derive the block sizing from the device geometry.
    ///
    /// Devices smaller than the buffer are tested as one single block.
    /// Otherwise the device is tiled with `size / buffer_size` blocks.
    /// A tail shorter than one block is never tested.
    pub fn resolve(geometry: &DeviceGeometry, buffer_override: Option<u64>) -> ah::Result<Self> {
        let mut buffer_size = match buffer_override {
            None | Some(0) => DEFAULT_BUFFER_SIZE,
            Some(size) => check_buffer_size(size)?,
        };

        if geometry.size == 0 {
            return Err(sd_err(
                SdErrorKind::Resource,
                "Device reports a capacity of zero bytes",
            ));
        }

        let (block_size, block_writes) = if geometry.size < buffer_size {
            buffer_size = geometry.size;
            (geometry.size, 1)
        } else {
            (buffer_size, geometry.size / buffer_size)
        };

        Ok(Self {
            buffer_size,
            block_size,
            block_writes,
        })
    }

    /// Number of bytes at the end of the device that no block covers.
    pub fn untested_tail(&self, device_size: u64) -> u64 {
        device_size.saturating_sub(self.block_size * self.block_writes)
    }
}

/// Query the geometry of an opened device.
pub fn probe_geometry<D: RawIoOsIntf>(dev: &D) -> ah::Result<DeviceGeometry> {
    Ok(dev.get_geometry().kind(SdErrorKind::Resource)?.resolved())
}

/// Dump the geometry through the log.
pub fn dump_info(log: &mut SdLog, geometry: &DeviceGeometry) -> ah::Result<()> {
    let g = geometry;
    log.msg(format!("Dumping info for {}...", log.device()))?;
    log.msg(format!("   size:                {}\t(0x{:x})", g.size, g.size))?;
    log.msg(format!("   sectors:             {}\t(0x{:x})", g.sectors, g.sectors))?;
    log.msg(format!("   physical block size: {}", g.sector_size_physical))?;
    log.msg(format!("   logical block size:  {}", g.sector_size_logical))?;
    log.msg(format!("   IO min size:         {}", g.min_io_size))?;
    log.msg(format!("   IO opt size:         {}", g.opt_io_size))?;
    log.msg(format!("   alignment offset:    {}", g.alignment_offset))?;
    Ok(())
}


// vim: ts=4 sw=4 expandtab
