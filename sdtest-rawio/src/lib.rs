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

#[cfg(not(any(target_os = "linux", target_os = "android")))]
std::compile_error!(
    "sdtest needs the Linux block device ioctl interface. \
     Your operating system is not supported."
);

use anyhow as ah;
use std::path::Path;

mod linux;

pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Capacity and I/O granularity of a device, as reported by the kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceGeometry {
    /// Capacity in bytes.
    pub size: u64,
    /// Number of 512 byte sectors.
    pub sectors: u64,
    pub sector_size_physical: u32,
    pub sector_size_logical: u32,
    pub min_io_size: u32,
    /// Optimal I/O size. Never zero once resolved.
    pub opt_io_size: u32,
    pub alignment_offset: u32,
}

impl DeviceGeometry {
    /// Apply the fallbacks for values the device did not report.
    #[must_use]
    pub fn resolved(mut self) -> Self {
        if self.opt_io_size == 0 {
            self.opt_io_size = self.min_io_size;
        }
        if self.opt_io_size == 0 {
            self.opt_io_size = self.sector_size_logical.max(DEFAULT_SECTOR_SIZE);
        }
        self
    }

    /// Alignment requirement for page cache bypassing I/O buffers.
    pub fn buffer_alignment(&self) -> usize {
        if self.sector_size_logical == 0 {
            DEFAULT_SECTOR_SIZE as usize
        } else {
            self.sector_size_logical as usize
        }
    }
}

/// OS interface for raw I/O.
pub trait RawIoOsIntf: Sized {
    /// Open a block device or file for reading and writing.
    ///
    /// If `direct` is set and the path is a block device,
    /// all I/O bypasses the operating system page cache.
    fn new(path: &Path, direct: bool) -> ah::Result<Self>;

    /// Returns true, if the opened path is a block device.
    fn is_blkdev(&self) -> bool;

    /// Returns true, if the I/O bypasses the page cache.
    fn is_direct(&self) -> bool;

    /// Query the device capacity and I/O geometry.
    fn get_geometry(&self) -> ah::Result<DeviceGeometry>;

    /// Flush the given range and drop it from the page cache,
    /// so that it is read back from the medium.
    fn drop_file_caches(&mut self, offset: u64, size: u64) -> ah::Result<()>;

    /// Close the file and flush all buffers.
    fn close(&mut self) -> ah::Result<()>;

    /// Flush all buffers.
    /// (This does not affect the caches).
    fn sync(&mut self) -> ah::Result<()>;

    /// Seek to a file offset.
    fn seek(&mut self, offset: u64) -> ah::Result<u64>;

    /// Read a chunk of data.
    fn read(&mut self, buffer: &mut [u8]) -> ah::Result<RawIoResult>;

    /// Write a chunk of data.
    fn write(&mut self, buffer: &[u8]) -> ah::Result<RawIoResult>;
}

/// Raw I/O operation result code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawIoResult {
    /// Ok, number of processed bytes.
    Ok(usize),
    /// Out of disk space.
    Enospc,
}

pub use crate::linux::RawIoLinux as RawIo;

// vim: ts=4 sw=4 expandtab
