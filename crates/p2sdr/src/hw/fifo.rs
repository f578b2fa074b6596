// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! FIFO monitor: per-DMA-channel occupancy and event telemetry.
//!
//! Each of the four DMA streams has a hardware FIFO with a monitor channel
//! reporting occupancy plus overflow / over-threshold / underflow events.
//! The event flags clear on read, so a probe must be the same read that
//! checks space: callers reserve space under the probe, never separately.

use crate::error::Result;
use crate::hw::regmap::{
    ADDR_FIFO_MON_BASE, ADDR_FIFO_RESET, FIFO_RESET_CODEC_MIC, FIFO_RESET_CODEC_SPK,
    FIFO_RESET_DDC, FIFO_RESET_DUC,
};
use crate::hw::registers::RegisterBank;

/// DMA stream / FIFO monitor channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaStream {
    /// DDC samples, FPGA to host.
    RxDdc = 0,
    /// DUC samples, host to FPGA.
    TxDuc = 1,
    /// Mic samples, FPGA to host.
    MicCodec = 2,
    /// Speaker samples, host to FPGA.
    SpkCodec = 3,
}

impl DmaStream {
    fn is_write_channel(self) -> bool {
        matches!(self, DmaStream::TxDuc | DmaStream::SpkCodec)
    }

    fn reset_bit(self) -> u32 {
        match self {
            DmaStream::RxDdc => FIFO_RESET_DDC,
            DmaStream::TxDuc => FIFO_RESET_DUC,
            DmaStream::MicCodec => FIFO_RESET_CODEC_MIC,
            DmaStream::SpkCodec => FIFO_RESET_CODEC_SPK,
        }
    }
}

/// One FIFO probe result.
#[derive(Debug, Clone, Copy)]
pub struct FifoStatus {
    /// Read channels: occupied 8-byte words available to read.
    /// Write channels: free 8-byte words available to write.
    pub available: u32,
    /// Occupied locations regardless of channel direction.
    pub occupied: u16,
    /// Overflow since the last probe (cleared by the read).
    pub overflowed: bool,
    /// Over the configured threshold since the last probe (cleared by read).
    pub over_threshold: bool,
    /// Underflow since the last probe (cleared by the read).
    pub underflowed: bool,
}

impl RegisterBank {
    /// Probe one FIFO monitor channel.
    ///
    /// No lock is taken: each channel is probed by its one owning thread,
    /// and the clear-on-read flags belong to that thread alone.
    pub fn probe_fifo(&self, stream: DmaStream) -> Result<FifoStatus> {
        let addr = ADDR_FIFO_MON_BASE + 4 * (stream as u32);
        let raw = self.bus().read32(addr)?;
        let occupied = (raw & 0xFFFF) as u16;
        let available = if stream.is_write_channel() {
            self.fifo_depths[stream as usize] - u32::from(occupied)
        } else {
            u32::from(occupied)
        };
        Ok(FifoStatus {
            available,
            occupied,
            overflowed: raw & 0x8000_0000 != 0,
            over_threshold: raw & 0x4000_0000 != 0,
            underflowed: raw & 0x2000_0000 != 0,
        })
    }

    /// Write a monitor channel's configuration: FIFO depth, and bit 31 to
    /// enable interrupt generation on overflow. Done once at start-up.
    pub fn configure_fifo(&self, stream: DmaStream, enable_interrupt: bool) -> Result<()> {
        let addr = ADDR_FIFO_MON_BASE + 4 * (stream as u32) + 0x10;
        let mut data = self.fifo_depths[stream as usize];
        if enable_interrupt {
            data |= 0x8000_0000;
        }
        self.bus().write32(addr, data)
    }

    /// Depth of one stream's FIFO in 64-bit words (firmware dependent).
    #[must_use]
    pub fn fifo_depth(&self, stream: DmaStream) -> u32 {
        self.fifo_depths[stream as usize]
    }

    /// Reset one stream FIFO by toggling its bit in the shared reset
    /// register (zero, then one). The register is shared across channels,
    /// so the toggle runs under the default lock.
    pub fn reset_stream_fifo(&self, stream: DmaStream) -> Result<()> {
        let bit = 1u32 << stream.reset_bit();
        let _guard = self.default_guard();
        let current = self.bus().read32(ADDR_FIFO_RESET)?;
        self.bus().write32(ADDR_FIFO_RESET, current & !bit)?;
        self.bus().write32(ADDR_FIFO_RESET, current | bit)
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::registers::tests::bank_with_fw;
    use crate::hw::xdma::MemWindow;
    use std::sync::Arc;

    fn poke_status(win: &Arc<MemWindow>, stream: DmaStream, raw: u32) {
        win.poke(ADDR_FIFO_MON_BASE + 4 * (stream as u32), raw);
    }

    #[test]
    fn read_channel_reports_occupied() {
        let (win, bank) = bank_with_fw(14);
        poke_status(&win, DmaStream::RxDdc, 0x8000_0200);
        let st = bank.probe_fifo(DmaStream::RxDdc).expect("probe");
        assert_eq!(st.available, 0x200);
        assert_eq!(st.occupied, 0x200);
        assert!(st.overflowed);
        assert!(!st.underflowed);
    }

    #[test]
    fn write_channel_reports_free_locations() {
        let (win, bank) = bank_with_fw(14);
        // FW 14 -> TX DUC depth 4096
        poke_status(&win, DmaStream::TxDuc, 0x2000_0000 | 100);
        let st = bank.probe_fifo(DmaStream::TxDuc).expect("probe");
        assert_eq!(st.available, 4096 - 100);
        assert_eq!(st.occupied, 100);
        assert!(st.underflowed);
        assert!(!st.overflowed);

        poke_status(&win, DmaStream::SpkCodec, 1000);
        let st = bank.probe_fifo(DmaStream::SpkCodec).expect("probe");
        assert_eq!(st.available, 1024 - 1000);
    }

    #[test]
    fn configure_writes_depth_and_interrupt_bit() {
        let (win, bank) = bank_with_fw(13);
        bank.configure_fifo(DmaStream::TxDuc, false).expect("cfg");
        assert_eq!(win.peek(ADDR_FIFO_MON_BASE + 4 + 0x10), 4096);
        bank.configure_fifo(DmaStream::SpkCodec, true).expect("cfg");
        assert_eq!(win.peek(ADDR_FIFO_MON_BASE + 12 + 0x10), 0x8000_0000 | 1024);
    }

    #[test]
    fn reset_toggles_only_the_channel_bit() {
        let (win, bank) = bank_with_fw(14);
        win.poke(ADDR_FIFO_RESET, 0b1111);
        win.clear_journal();
        bank.reset_stream_fifo(DmaStream::TxDuc).expect("reset");
        let journal = win.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0], (ADDR_FIFO_RESET, 0b0111)); // bit low
        assert_eq!(journal[1], (ADDR_FIFO_RESET, 0b1111)); // bit high again
    }
}
