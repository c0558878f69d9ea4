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

use crate::error::{SdErrorKind, sd_err};
use anyhow as ah;
use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    ptr::NonNull,
};

/// Fixed size heap buffer with a guaranteed start address alignment,
/// as required for page cache bypassing I/O.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer.
    pub fn new(len: usize, alignment: usize) -> ah::Result<Self> {
        if len == 0 {
            return Err(sd_err(
                SdErrorKind::Resource,
                "Refusing to allocate an empty I/O buffer",
            ));
        }
        let layout = Layout::from_size_align(len, alignment).map_err(|e| {
            sd_err(
                SdErrorKind::Resource,
                format!("Invalid buffer layout (len={len}, align={alignment}): {e}"),
            )
        })?;
        // SAFETY: The layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(sd_err(
                SdErrorKind::Resource,
                format!("Failed to allocate {len} bytes of I/O buffer"),
            ));
        };
        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr points to len initialized bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr points to len initialized bytes owned by self
        // and the &mut borrow of self makes this the only reference.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }

    pub fn fill(&mut self, value: u8) {
        self.as_mut_slice().fill(value);
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: The buffer exclusively owns its allocation.
unsafe impl Send for AlignedBuffer {}


// vim: ts=4 sw=4 expandtab
