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
use std::fmt::Display;

/// Class of a failure that ends the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdErrorKind {
    /// Invalid command line, device naming or privileges.
    Config,
    /// Device, record file or memory could not be used.
    Resource,
    /// The progress record belongs to another device.
    Identity,
    /// Read back data differs from the written data.
    DataIntegrity,
    /// The run was interrupted by a signal.
    Aborted,
}

impl Display for SdErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Self::Config => "configuration error",
            Self::Resource => "resource error",
            Self::Identity => "device identity error",
            Self::DataIntegrity => "data integrity error",
            Self::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

pub struct SdError {
    kind: SdErrorKind,
    msg: String,
}

impl SdError {
    pub fn new(kind: SdErrorKind, msg: impl Into<String>) -> SdError {
        SdError {
            kind,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> SdErrorKind {
        self.kind
    }
}

impl std::error::Error for SdError {}

impl std::fmt::Debug for SdError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, &self.msg)
    }
}

impl std::fmt::Display for SdError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.msg)
    }
}

/// Create an `anyhow` error carrying the given kind.
pub fn sd_err(kind: SdErrorKind, msg: impl Into<String>) -> ah::Error {
    SdError::new(kind, msg).into()
}

/// Get the kind of an error, if it has one.
pub fn error_kind(err: &ah::Error) -> Option<SdErrorKind> {
    err.downcast_ref::<SdError>().map(SdError::kind)
}

/// Attach an `SdErrorKind` to any failing result.
pub trait SdResultExt<T> {
    fn kind(self, kind: SdErrorKind) -> ah::Result<T>;
}

impl<T, E: Display> SdResultExt<T> for Result<T, E> {
    fn kind(self, kind: SdErrorKind) -> ah::Result<T> {
        self.map_err(|e| sd_err(kind, format!("{e:#}")))
    }
}


// vim: ts=4 sw=4 expandtab
