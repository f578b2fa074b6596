// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! "DUC specific" (TX specific) packet decoding.
//!
//! Keyer, CW and microphone-path configuration. Bit 7 of the keyer flag
//! byte is read both as the iambic break-in flag and as CW break-in; the
//! protocol document does not separate them, so both consumers get it.

use crate::protocol::byteio::{rd_be_u16, rd_u8};

/// Decoded DUC-specific packet.
#[derive(Debug, Clone, Copy)]
pub struct DucSpecific {
    pub iambic_speed_wpm: u8,
    pub iambic_weight: u8,
    pub reversed_paddle: bool,
    pub keyer_mode_b: bool,
    pub strict_spacing: bool,
    pub iambic_enabled: bool,
    pub breakin: bool,
    pub cw_enabled: bool,
    pub sidetone_enabled: bool,
    pub sidetone_volume: u8,
    pub sidetone_freq_hz: u16,
    /// Delay before RF asserts after key-down, ms.
    pub cw_ptt_delay_ms: u8,
    /// Hang time after key-up, ms.
    pub cw_hang_time_ms: u16,
    /// Key-shaping ramp duration, ms; 0 when the client predates the field.
    pub cw_ramp_ms: u8,
    pub mic_line_input: bool,
    pub mic_boost: bool,
    pub mic_ring: bool,
    pub mic_bias: bool,
    /// PTT enable for the mic jack (the wire carries a disable bit).
    pub mic_ptt_enabled: bool,
    pub balanced_mic: bool,
    pub line_in_gain: u8,
    pub adc1_tx_atten: u8,
    pub adc2_tx_atten: u8,
}

/// Decode a 60-byte DUC-specific packet.
#[must_use]
pub fn parse(buf: &[u8]) -> DucSpecific {
    let keyer_bits = rd_u8(buf, 5);
    let mic_bits = rd_u8(buf, 50);
    DucSpecific {
        iambic_speed_wpm: rd_u8(buf, 9),
        iambic_weight: rd_u8(buf, 10),
        reversed_paddle: (keyer_bits >> 2) & 1 != 0,
        keyer_mode_b: (keyer_bits >> 5) & 1 != 0,
        strict_spacing: (keyer_bits >> 6) & 1 != 0,
        iambic_enabled: (keyer_bits >> 3) & 1 != 0,
        breakin: (keyer_bits >> 7) & 1 != 0,
        cw_enabled: (keyer_bits >> 1) & 1 != 0,
        sidetone_enabled: (keyer_bits >> 4) & 1 != 0,
        sidetone_volume: rd_u8(buf, 6),
        sidetone_freq_hz: rd_be_u16(buf, 7),
        cw_ptt_delay_ms: rd_u8(buf, 13),
        cw_hang_time_ms: rd_be_u16(buf, 11),
        cw_ramp_ms: rd_u8(buf, 17),
        mic_line_input: mic_bits & 1 != 0,
        mic_boost: (mic_bits >> 1) & 1 != 0,
        mic_ring: (mic_bits >> 3) & 1 != 0,
        mic_bias: (mic_bits >> 4) & 1 != 0,
        mic_ptt_enabled: (mic_bits >> 2) & 1 == 0,
        balanced_mic: (mic_bits >> 5) & 1 != 0,
        line_in_gain: rd_u8(buf, 51),
        adc2_tx_atten: rd_u8(buf, 58),
        adc1_tx_atten: rd_u8(buf, 59),
    }
}

// ===== Tests =====
