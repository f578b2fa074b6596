// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Session lifecycle shared state.
//!
//! At most one client session exists at a time. The state machine:
//!
//! | From    | Event                        | To       |
//! |---------|------------------------------|----------|
//! | Idle    | general packet               | Armed    |
//! | Armed   | high priority with run = 1   | Active   |
//! | Active  | high priority with run = 0   | Draining |
//! | Active  | 1 s without inbound traffic  | Draining |
//! | Draining| (immediate)                  | Idle     |
//!
//! Entering Active requires BOTH the reply address (general packet) and the
//! start bit (high priority run). The pieces may arrive in either order.

use crate::error::Result;
use crate::hw::RegisterBank;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Observable session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Active,
    Draining,
}

/// FIFO trouble flags carried to the client in the next outbound
/// high-priority frame.
pub const FIFO_OVF_DDC: u8 = 0b0001;
pub const FIFO_OVF_MIC: u8 = 0b0010;
pub const FIFO_OVF_DUC: u8 = 0b0100;
pub const FIFO_OVF_SPKR: u8 = 0b1000;

/// Process-wide session flags, shared by every engine thread.
pub struct Session {
    sdr_active: AtomicBool,
    draining: AtomicBool,
    reply_address_set: AtomicBool,
    start_bit_received: AtomicBool,
    new_message: AtomicBool,
    hw_timer_enable: AtomicBool,
    exit_requested: AtomicBool,
    thread_error: AtomicBool,
    is_tx_mode: AtomicBool,
    fifo_overflows: AtomicU8,
    transferred_iq_samples: AtomicU32,
    reply_ip: Mutex<Option<Ipv4Addr>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sdr_active: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            reply_address_set: AtomicBool::new(false),
            start_bit_received: AtomicBool::new(false),
            new_message: AtomicBool::new(false),
            // the general packet normally overrides this; default on so a
            // vanished client cannot leave the TX keyed
            hw_timer_enable: AtomicBool::new(true),
            exit_requested: AtomicBool::new(false),
            thread_error: AtomicBool::new(false),
            is_tx_mode: AtomicBool::new(false),
            fifo_overflows: AtomicU8::new(0),
            transferred_iq_samples: AtomicU32::new(0),
            reply_ip: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.sdr_active.load(Ordering::Acquire) {
            SessionState::Active
        } else if self.draining.load(Ordering::Acquire) {
            SessionState::Draining
        } else if self.reply_address_set.load(Ordering::Acquire) {
            SessionState::Armed
        } else {
            SessionState::Idle
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sdr_active.load(Ordering::Acquire)
    }

    /// Capture the client's address from the general packet: Idle -> Armed.
    pub fn arm(&self, client_ip: Ipv4Addr) {
        *self.reply_ip.lock() = Some(client_ip);
        self.reply_address_set.store(true, Ordering::Release);
        log::debug!("[session] armed, reply address {}", client_ip);
    }

    /// Record the high-priority run bit.
    pub fn set_start_bit(&self, run: bool) {
        self.start_bit_received.store(run, Ordering::Release);
    }

    /// Enter Active when both the reply address and the start bit are held.
    /// Asserts TX enable on the transition. Returns true when Active.
    pub fn try_activate(&self, bank: &RegisterBank) -> Result<bool> {
        if self.reply_address_set.load(Ordering::Acquire)
            && self.start_bit_received.load(Ordering::Acquire)
        {
            if !self.sdr_active.swap(true, Ordering::AcqRel) {
                log::info!("[session] active");
                bank.set_tx_enable(true)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Active -> Draining -> Idle. Clears TX enable, keyer and MOX, then
    /// releases the reply address. Senders observe the dropped active flag
    /// and quiesce.
    pub fn drain(&self, bank: &RegisterBank) -> Result<()> {
        self.draining.store(true, Ordering::Release);
        let was_active = self.sdr_active.swap(false, Ordering::AcqRel);
        bank.set_tx_enable(false)?;
        bank.enable_cw(false, false)?;
        self.is_tx_mode.store(false, Ordering::Release);
        bank.set_mox(false)?;
        self.start_bit_received.store(false, Ordering::Release);
        self.reply_address_set.store(false, Ordering::Release);
        *self.reply_ip.lock() = None;
        self.draining.store(false, Ordering::Release);
        if was_active {
            log::info!("[session] reverted to idle");
        }
        Ok(())
    }

    /// Snapshot the client IP; present from Armed onward.
    #[must_use]
    pub fn reply_ip(&self) -> Option<Ipv4Addr> {
        *self.reply_ip.lock()
    }

    pub fn note_message(&self) {
        self.new_message.store(true, Ordering::Release);
    }

    /// Read and clear the message-seen flag (watchdog interval check).
    #[must_use]
    pub fn take_message_flag(&self) -> bool {
        self.new_message.swap(false, Ordering::AcqRel)
    }

    pub fn set_hw_timer_enable(&self, enabled: bool) {
        self.hw_timer_enable.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn hw_timer_enabled(&self) -> bool {
        self.hw_timer_enable.load(Ordering::Acquire)
    }

    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    /// A stream thread hit a fatal initialisation or transport error.
    pub fn report_thread_error(&self, context: &str) {
        log::error!("[session] thread error in {}", context);
        self.thread_error.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn thread_error(&self) -> bool {
        self.thread_error.load(Ordering::Acquire)
    }

    pub fn set_tx_mode(&self, tx: bool) {
        self.is_tx_mode.store(tx, Ordering::Release);
    }

    #[must_use]
    pub fn is_tx_mode(&self) -> bool {
        self.is_tx_mode.load(Ordering::Acquire)
    }

    /// Latch a FIFO trouble bit for the outbound high-priority reporter.
    pub fn flag_fifo_overflow(&self, bit: u8) {
        self.fifo_overflows.fetch_or(bit, Ordering::AcqRel);
    }

    /// Read and clear the latched FIFO trouble bits.
    #[must_use]
    pub fn take_fifo_overflows(&self) -> u8 {
        self.fifo_overflows.swap(0, Ordering::AcqRel)
    }

    /// DDC I/Q sample pacing counter shared with the mic sender.
    pub fn add_transferred_iq_samples(&self, n: u32) {
        self.transferred_iq_samples.fetch_add(n, Ordering::AcqRel);
    }

    #[must_use]
    pub fn transferred_iq_samples(&self) -> u32 {
        self.transferred_iq_samples.load(Ordering::Acquire)
    }

    pub fn reset_transferred_iq_samples(&self) {
        self.transferred_iq_samples.store(0, Ordering::Release);
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::registers::tests::bank_with_fw;

    #[test]
    fn activation_requires_both_pieces_in_either_order() {
        let (_win, bank) = bank_with_fw(14);
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);

        // start bit first: stays below Active
        session.set_start_bit(true);
        assert!(!session.try_activate(&bank).expect("activate"));
        assert_eq!(session.state(), SessionState::Idle);

        // then the general packet arms and the pair activates
        session.arm(Ipv4Addr::new(192, 168, 1, 2));
        assert!(session.try_activate(&bank).expect("activate"));
        assert_eq!(session.state(), SessionState::Active);

        // reverse order on a fresh session
        let session2 = Session::new();
        session2.arm(Ipv4Addr::new(192, 168, 1, 2));
        assert!(!session2.try_activate(&bank).expect("activate"));
        assert_eq!(session2.state(), SessionState::Armed);
        session2.set_start_bit(true);
        assert!(session2.try_activate(&bank).expect("activate"));
        assert_eq!(session2.state(), SessionState::Active);
    }

    #[test]
    fn drain_clears_tx_state_and_reply_address() {
        use crate::hw::regmap::{ADDR_RF_GPIO, GPIO_MOX, GPIO_TX_ENABLE};
        let (win, bank) = bank_with_fw(14);
        let session = Session::new();
        session.arm(Ipv4Addr::new(10, 0, 0, 1));
        session.set_start_bit(true);
        session.try_activate(&bank).expect("activate");
        bank.set_mox(true).expect("mox");

        session.drain(&bank).expect("drain");
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.reply_ip().is_none());
        let gpio = win.peek(ADDR_RF_GPIO);
        assert_eq!(gpio & (1 << GPIO_TX_ENABLE), 0);
        assert_eq!(gpio & (1 << GPIO_MOX), 0);

        // frequency settings survive a drain
        bank.set_ddc_frequency(0, 0x1234, true).expect("freq");
        session.drain(&bank).expect("drain again");
        assert_eq!(bank.ddc_frequency(0), 0x1234);
    }

    #[test]
    fn fifo_overflow_bits_latch_and_clear() {
        let session = Session::new();
        session.flag_fifo_overflow(FIFO_OVF_DUC);
        session.flag_fifo_overflow(FIFO_OVF_SPKR);
        assert_eq!(session.take_fifo_overflows(), FIFO_OVF_DUC | FIFO_OVF_SPKR);
        assert_eq!(session.take_fifo_overflows(), 0);
    }

    #[test]
    fn message_flag_swaps() {
        let session = Session::new();
        assert!(!session.take_message_flag());
        session.note_message();
        assert!(session.take_message_flag());
        assert!(!session.take_message_flag());
    }
}
