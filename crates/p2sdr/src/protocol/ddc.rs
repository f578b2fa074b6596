// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! "DDC specific" packet decoding.
//!
//! Carries ADC options and the full configuration of all ten DDCs. The
//! synchronisation map pairs an even DDC with its odd neighbour: the even
//! DDC is rewritten to "interleave with next" and the odd DDC — usually
//! sent disabled — is force-enabled so its slot carries the doubled-rate
//! stream.

use crate::config::NUM_DDC;
use crate::hw::AdcSelect;
use crate::protocol::byteio::{rd_be_u16, rd_le_u16, rd_u8};

/// One DDC's decoded configuration.
#[derive(Debug, Clone, Copy)]
pub struct DdcConfig {
    pub enabled: bool,
    pub adc: AdcSelect,
    pub rate_khz: u32,
    pub sample_size_bits: u8,
    /// True on an even DDC paired with its odd neighbour.
    pub interleaved: bool,
}

/// Decoded DDC-specific packet.
#[derive(Debug, Clone)]
pub struct DdcSpecific {
    pub adc_count: u8,
    /// Dither enable per ADC.
    pub adc_dither: [bool; 2],
    /// Randomiser enable per ADC.
    pub adc_random: [bool; 2],
    pub ddcs: [DdcConfig; NUM_DDC],
}

/// Offset of the synchronisation byte governing the pair starting at the
/// given even DDC.
fn sync_offset(even_ddc: usize) -> usize {
    1363 + even_ddc
}

/// Bit pattern meaning "DDC N+1 synchronises with DDC N".
fn sync_pattern(even_ddc: usize) -> u8 {
    1u8 << (even_ddc + 1)
}

/// Decode a 1444-byte DDC-specific packet.
#[must_use]
pub fn parse(buf: &[u8]) -> DdcSpecific {
    let dither_bits = rd_u8(buf, 5);
    let random_bits = rd_u8(buf, 6);
    let enables = rd_le_u16(buf, 7);

    let mut ddcs = [DdcConfig {
        enabled: false,
        adc: AdcSelect::Adc1,
        rate_khz: 0,
        sample_size_bits: 24,
        interleaved: false,
    }; NUM_DDC];

    for (i, ddc) in ddcs.iter_mut().enumerate() {
        let base = i * 6;
        ddc.enabled = (enables >> i) & 1 != 0;
        ddc.adc = match rd_u8(buf, base + 17) {
            1 => AdcSelect::Adc2,
            2 => AdcSelect::TxSamples,
            _ => AdcSelect::Adc1,
        };
        ddc.rate_khz = u32::from(rd_be_u16(buf, base + 18));
        ddc.sample_size_bits = rd_u8(buf, base + 22);

        // synchronisation map: pairs (0,1), (2,3), (4,5), (6,7)
        if i < 8 {
            let even = i & !1;
            let paired = rd_u8(buf, sync_offset(even)) == sync_pattern(even);
            if paired {
                if i == even {
                    ddc.interleaved = true;
                } else {
                    ddc.enabled = true;
                }
            }
        }
    }

    DdcSpecific {
        adc_count: rd_u8(buf, 4),
        adc_dither: [dither_bits & 1 != 0, (dither_bits >> 1) & 1 != 0],
        adc_random: [random_bits & 1 != 0, (random_bits >> 1) & 1 != 0],
        ddcs,
    }
}

// ===== Tests =====
