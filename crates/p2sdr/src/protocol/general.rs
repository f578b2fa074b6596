// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! "General packet to SDR" decoding.
//!
//! The general packet opens a session: it carries the endpoint port table
//! plus a raft of settings (wideband capture, envelope PWM limits, VITA-49,
//! timestamping, PA/Apollo/Alex enables).

use crate::config::{ENDPOINT_COUNT, EP_WIDEBAND_0, NUM_DDC, NUM_WB_ADC};
use crate::config::{
    EP_DDC_IQ_0, EP_DDC_SPECIFIC, EP_DUC_IQ, EP_DUC_SPECIFIC, EP_HIGH_PRIORITY_IN,
    EP_HIGH_PRIORITY_OUT, EP_MIC_AUDIO, EP_SPKR_AUDIO,
};
use crate::protocol::byteio::{rd_be_u16, rd_u8};

/// Wideband capture parameters from the general packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WidebandParams {
    /// Enable bits: bit 0 ADC1, bit 1 ADC2.
    pub enables: u8,
    pub samples_per_packet: u16,
    pub sample_size_bits: u8,
    pub update_rate_ms: u8,
    pub packets_per_frame: u8,
}

impl WidebandParams {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enables != 0
    }
}

/// Decoded general packet.
#[derive(Debug, Clone)]
pub struct GeneralPacket {
    /// Requested port per endpoint; 0 means "use the documented default".
    /// The command endpoint itself is never rebound.
    pub ports: [u16; ENDPOINT_COUNT],
    pub wideband: WidebandParams,
    pub pwm_min: u16,
    pub pwm_max: u16,
    pub timestamp_enabled: bool,
    pub vita49_enabled: bool,
    pub freq_is_phase_word: bool,
    /// Gates the 1-second inactivity watchdog.
    pub hw_timer_enable: bool,
    pub pa_enabled: bool,
    pub apollo_enabled: bool,
    pub alex_enables: u8,
}

/// Decode a 60-byte general packet.
#[must_use]
pub fn parse(buf: &[u8]) -> GeneralPacket {
    let mut ports = [0u16; ENDPOINT_COUNT];
    ports[EP_DDC_SPECIFIC] = rd_be_u16(buf, 5);
    ports[EP_DUC_SPECIFIC] = rd_be_u16(buf, 7);
    ports[EP_HIGH_PRIORITY_IN] = rd_be_u16(buf, 9);
    ports[EP_HIGH_PRIORITY_OUT] = rd_be_u16(buf, 11);
    ports[EP_SPKR_AUDIO] = rd_be_u16(buf, 13);
    ports[EP_DUC_IQ] = rd_be_u16(buf, 15);
    ports[EP_MIC_AUDIO] = rd_be_u16(buf, 19);

    // DDC I/Q ports start at the transferred value and increment
    let ddc_base = rd_be_u16(buf, 17);
    for i in 0..NUM_DDC {
        ports[EP_DDC_IQ_0 + i] = if ddc_base == 0 {
            0
        } else {
            ddc_base + i as u16
        };
    }
    // wideband ports likewise
    let wb_base = rd_be_u16(buf, 21);
    for i in 0..NUM_WB_ADC {
        ports[EP_WIDEBAND_0 + i] = if wb_base == 0 { 0 } else { wb_base + i as u16 };
    }

    let wideband = WidebandParams {
        enables: rd_u8(buf, 23),
        samples_per_packet: rd_be_u16(buf, 24),
        sample_size_bits: rd_u8(buf, 26),
        update_rate_ms: rd_u8(buf, 27),
        packets_per_frame: rd_u8(buf, 28),
    };

    let flags = rd_u8(buf, 37);
    let pa_flags = rd_u8(buf, 58);
    GeneralPacket {
        ports,
        wideband,
        pwm_min: rd_be_u16(buf, 33),
        pwm_max: rd_be_u16(buf, 35),
        timestamp_enabled: flags & 1 != 0,
        vita49_enabled: flags & 2 != 0,
        freq_is_phase_word: flags & 8 != 0,
        hw_timer_enable: rd_u8(buf, 38) & 1 != 0,
        pa_enabled: pa_flags & 1 != 0,
        apollo_enabled: pa_flags & 2 != 0,
        alex_enables: rd_u8(buf, 59),
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::byteio::wr_be_u16;

    #[test]
    fn ports_and_flags() {
        let mut buf = [0u8; 60];
        wr_be_u16(&mut buf, 5, 2025); // DDC specific
        wr_be_u16(&mut buf, 17, 1080); // DDC I/Q base
        wr_be_u16(&mut buf, 21, 2050); // wideband base
        buf[37] = 0b1001; // timestamp + phase word
        buf[38] = 1; // hardware timer
        buf[58] = 0b01; // PA
        buf[59] = 0xA5;

        let pkt = parse(&buf);
        assert_eq!(pkt.ports[EP_DDC_SPECIFIC], 2025);
        assert_eq!(pkt.ports[EP_DUC_SPECIFIC], 0);
        assert_eq!(pkt.ports[EP_DDC_IQ_0], 1080);
        assert_eq!(pkt.ports[EP_DDC_IQ_0 + 9], 1089);
        assert_eq!(pkt.ports[EP_WIDEBAND_0], 2050);
        assert_eq!(pkt.ports[EP_WIDEBAND_0 + 1], 2051);
        assert!(pkt.timestamp_enabled);
        assert!(!pkt.vita49_enabled);
        assert!(pkt.freq_is_phase_word);
        assert!(pkt.hw_timer_enable);
        assert!(pkt.pa_enabled);
        assert!(!pkt.apollo_enabled);
        assert_eq!(pkt.alex_enables, 0xA5);
    }

    #[test]
    fn zero_ddc_base_leaves_defaults() {
        let buf = [0u8; 60];
        let pkt = parse(&buf);
        assert!(pkt.ports[EP_DDC_IQ_0..EP_DDC_IQ_0 + NUM_DDC]
            .iter()
            .all(|&p| p == 0));
    }

    #[test]
    fn wideband_params() {
        let mut buf = [0u8; 60];
        buf[23] = 0b11;
        wr_be_u16(&mut buf, 24, 512);
        buf[26] = 16;
        buf[27] = 50;
        buf[28] = 4;
        let pkt = parse(&buf);
        assert_eq!(
            pkt.wideband,
            WidebandParams {
                enables: 0b11,
                samples_per_packet: 512,
                sample_size_bits: 16,
                update_rate_ms: 50,
                packets_per_frame: 4,
            }
        );
        assert!(pkt.wideband.enabled());
    }
}
