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

use super::{DEFAULT_SECTOR_SIZE, DeviceGeometry, RawIoOsIntf, RawIoResult};
use anyhow as ah;
use libc::{POSIX_FADV_DONTNEED, S_IFBLK, S_IFMT, c_int, c_uint, c_ulong, off_t, posix_fadvise};
use std::{
    fs::{File, OpenOptions, metadata},
    io::{Read as _, Seek as _, SeekFrom, Write as _},
    os::unix::{
        fs::{MetadataExt as _, OpenOptionsExt as _},
        io::AsRawFd as _,
    },
    path::{Path, PathBuf},
};

// Block device ioctl request codes from <linux/fs.h>.
const BLKGETSIZE: u64 = 0x1260;
const BLKSSZGET: u64 = 0x1268;
const BLKIOMIN: u64 = 0x1278;
const BLKIOOPT: u64 = 0x1279;
const BLKALIGNOFF: u64 = 0x127A;
const BLKPBSZGET: u64 = 0x127B;

#[cfg(any(
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "sparc",
    target_arch = "sparc64"
))]
const IOC_READ: u64 = 2 << 29;
#[cfg(not(any(
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "sparc",
    target_arch = "sparc64"
)))]
const IOC_READ: u64 = 2 << 30;

/// `_IOR(0x12, 114, size_t)`
const BLKGETSIZE64: u64 = IOC_READ | ((size_of::<usize>() as u64) << 16) | (0x12 << 8) | 114;

/// Raw device I/O for Linux OS.
pub struct RawIoLinux {
    path: PathBuf,
    file: Option<File>,
    is_blk: bool,
    direct: bool,
}

impl RawIoLinux {
    fn file(&self) -> ah::Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| ah::format_err!("No file object"))
    }

    fn file_mut(&mut self) -> ah::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| ah::format_err!("No file object"))
    }

    /// Run a geometry query ioctl that stores its result in `T`.
    fn ioctl_get<T: Default>(&self, request: u64, name: &str) -> ah::Result<T> {
        let fd = self.file()?.as_raw_fd();
        let mut value = T::default();
        // SAFETY: The fd is open for the lifetime of self and
        // `value` has the type the kernel writes for this request.
        let res = unsafe { libc::ioctl(fd, request as _, &raw mut value) };
        if res < 0 {
            let path = self.path.display();
            let e = std::io::Error::last_os_error();
            return Err(ah::format_err!(
                "Get device geometry: ioctl({name}) on {path} failed: {e}"
            ));
        }
        Ok(value)
    }

    fn read_blk_geometry(&self) -> ah::Result<DeviceGeometry> {
        let size: u64 = self.ioctl_get(BLKGETSIZE64, "BLKGETSIZE64")?;
        let sectors: c_ulong = self.ioctl_get(BLKGETSIZE, "BLKGETSIZE")?;
        let physical: c_uint = self.ioctl_get(BLKPBSZGET, "BLKPBSZGET")?;
        let logical: c_int = self.ioctl_get(BLKSSZGET, "BLKSSZGET")?;
        let min_io: c_uint = self.ioctl_get(BLKIOMIN, "BLKIOMIN")?;
        let opt_io: c_uint = self.ioctl_get(BLKIOOPT, "BLKIOOPT")?;
        let align_off: c_int = self.ioctl_get(BLKALIGNOFF, "BLKALIGNOFF")?;

        Ok(DeviceGeometry {
            size,
            sectors: u64::from(sectors),
            sector_size_physical: physical,
            sector_size_logical: u32::try_from(logical).unwrap_or(0),
            min_io_size: min_io,
            opt_io_size: opt_io,
            alignment_offset: u32::try_from(align_off).unwrap_or(0),
        })
    }

    fn read_file_geometry(&self) -> ah::Result<DeviceGeometry> {
        let size = self.file()?.metadata()?.len();
        Ok(DeviceGeometry {
            size,
            sectors: size / u64::from(DEFAULT_SECTOR_SIZE),
            sector_size_physical: DEFAULT_SECTOR_SIZE,
            sector_size_logical: DEFAULT_SECTOR_SIZE,
            min_io_size: DEFAULT_SECTOR_SIZE,
            opt_io_size: 0,
            alignment_offset: 0,
        })
    }
}

impl RawIoOsIntf for RawIoLinux {
    fn new(path: &Path, direct: bool) -> ah::Result<Self> {
        let is_blk = metadata(path)
            .map(|meta| meta.mode() & S_IFMT == S_IFBLK)
            .unwrap_or(false);

        // O_DIRECT is only requested for real block devices.
        // Many file systems reject it.
        let direct = direct && is_blk;

        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(false);
        if direct {
            opts.custom_flags(libc::O_DIRECT);
        }
        let file = match opts.open(path) {
            Ok(f) => f,
            Err(e) => {
                let path = path.display();
                return Err(ah::format_err!("Failed to open device {path}: {e}"));
            }
        };

        Ok(Self {
            path: path.into(),
            file: Some(file),
            is_blk,
            direct,
        })
    }

    fn is_blkdev(&self) -> bool {
        self.is_blk
    }

    fn is_direct(&self) -> bool {
        self.direct
    }

    fn get_geometry(&self) -> ah::Result<DeviceGeometry> {
        if self.is_blk {
            self.read_blk_geometry()
        } else {
            self.read_file_geometry()
        }
    }

    fn drop_file_caches(&mut self, offset: u64, size: u64) -> ah::Result<()> {
        if self.direct {
            // Nothing is cached.
            return Ok(());
        }
        let file = self.file_mut()?;
        if let Err(e) = file.sync_all() {
            return Err(ah::format_err!("Failed to flush: {e}"));
        }

        // Try FADV_DONTNEED to drop caches.
        let offset = off_t::try_from(offset)?;
        let size = off_t::try_from(size)?;
        // SAFETY: The fd is valid and fadvise does not touch user memory.
        let ret = unsafe { posix_fadvise(file.as_raw_fd(), offset, size, POSIX_FADV_DONTNEED) };

        if ret == 0 {
            // fadvise success.
            Ok(())
        } else {
            // Try global drop_caches.
            let proc_file = "/proc/sys/vm/drop_caches";
            let proc_value = b"3\n";

            match OpenOptions::new().write(true).open(proc_file) {
                Ok(mut file) => match file.write_all(proc_value) {
                    Ok(()) => Ok(()),
                    Err(e) => Err(ah::format_err!("Failed to drop caches: {e}")),
                },
                Err(e) => Err(ah::format_err!("Failed to open {proc_file}: {e}")),
            }
        }
    }

    fn close(&mut self) -> ah::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = file.sync_all() {
            return Err(ah::format_err!("Failed to flush: {e}"));
        }
        Ok(())
    }

    fn sync(&mut self) -> ah::Result<()> {
        self.file_mut()?.sync_all()?;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> ah::Result<u64> {
        Ok(self.file_mut()?.seek(SeekFrom::Start(offset))?)
    }

    fn read(&mut self, buffer: &mut [u8]) -> ah::Result<RawIoResult> {
        match self.file_mut()?.read(buffer) {
            Ok(count) => Ok(RawIoResult::Ok(count)),
            Err(e) => Err(ah::format_err!("Read error: {e}")),
        }
    }

    fn write(&mut self, buffer: &[u8]) -> ah::Result<RawIoResult> {
        if let Err(e) = self.file_mut()?.write_all(buffer) {
            if e.raw_os_error() == Some(libc::ENOSPC) {
                return Ok(RawIoResult::Enospc);
            }
            return Err(ah::format_err!("Write error: {e}"));
        }
        Ok(RawIoResult::Ok(buffer.len()))
    }
}

impl Drop for RawIoLinux {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close device {}: {e}", self.path.display());
        }
    }
}


// vim: ts=4 sw=4 expandtab
