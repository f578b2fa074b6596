// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Crate-level error type.
//!
//! Transport failures (register window, DMA devices, sockets) are surfaced
//! to the caller rather than absorbed; there is no retry at this layer.

use std::fmt;
use std::io;

/// Engine operation errors
#[derive(Debug)]
pub enum Error {
    /// A 4-byte register window access did not complete.
    Register { addr: u32, source: io::Error },
    /// A DMA transfer to/from a stream device failed or was short.
    Dma {
        device: &'static str,
        source: io::Error,
    },
    /// Initialisation failure: device open, buffer allocation, socket bind.
    Init {
        what: &'static str,
        source: io::Error,
    },
    /// Stream-level transport failure (recv/send with errno other than EAGAIN).
    Transport {
        endpoint: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Register { addr, source } => {
                write!(f, "register access at 0x{:08X} failed: {}", addr, source)
            }
            Error::Dma { device, source } => {
                write!(f, "DMA transfer on {} failed: {}", device, source)
            }
            Error::Init { what, source } => {
                write!(f, "initialisation of {} failed: {}", what, source)
            }
            Error::Transport { endpoint, source } => {
                write!(f, "transport error on {}: {}", endpoint, source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Register { source, .. }
            | Error::Dma { source, .. }
            | Error::Init { source, .. }
            | Error::Transport { source, .. } => Some(source),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
