// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Hardware access: XDMA transport, register bank, FIFO monitor.

pub mod drive;
pub mod fifo;
pub mod ramp;
pub mod regmap;
pub mod registers;
pub mod xdma;

pub use fifo::{DmaStream, FifoStatus};
pub use registers::{AdcSelect, RegisterBank, SampleRateCode, TxModulationSource};
pub use xdma::{DmaChannel, MemWindow, RegisterBus, XdmaWindow};
