// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! CW key-shaping ramp curve.
//!
//! The keyed RF envelope follows an "S"-shaped amplitude ramp held in FPGA
//! RAM. The curve is the integral of a Blackman-Harris style window:
//!
//! `f(x) = x + c1 sin(2 pi x) + c2 sin(4 pi x) + c3 sin(6 pi x)
//!           + c4 sin(8 pi x) + c5 sin(10 pi x)`
//!
//! which is monotonically non-decreasing from 0 to 1. Samples are scaled to
//! 24-bit unsigned full scale.

const C1: f64 = -0.121_828_653_611_716_12;
const C2: f64 = -0.018_557_469_249_199_286;
const C3: f64 = -0.000_937_878_324_542_850_6;
const C4: f64 = 0.000_856_757_151_940_322_8;
const C5: f64 = 0.000_187_069_124_314_724_42;

/// 24-bit full scale, the saturation value used to fill unused ramp RAM.
pub const RAMP_FULL_SCALE: u32 = 8_388_607;

/// Minimum ramp duration, microseconds.
pub const MIN_RAMP_US: u32 = 3_000;
/// Maximum ramp duration before firmware 14.
pub const MAX_RAMP_US: u32 = 10_000;
/// Maximum ramp duration from firmware 14 onward.
pub const MAX_RAMP_US_FW14: u32 = 20_000;

/// Clip a requested duration to the firmware's supported range.
#[must_use]
pub fn clip_duration_us(length_us: u32, fw_version: u16) -> u32 {
    let max = if fw_version >= 14 {
        MAX_RAMP_US_FW14
    } else {
        MAX_RAMP_US
    };
    length_us.clamp(MIN_RAMP_US, max)
}

/// Number of ramp samples for a clipped duration.
///
/// The sidetone datapath runs at 48 kHz on the protocol-1 path and 192 kHz
/// on protocol 2.
#[must_use]
pub fn sample_count(protocol2: bool, length_us: u32) -> u32 {
    let sample_period_us = if protocol2 {
        1000.0 / 192.0
    } else {
        1000.0 / 48.0
    };
    (f64::from(length_us) / sample_period_us).ceil() as u32
}

/// Compute the ramp samples for a clipped duration, scaled to 24 bits.
///
/// The first sample is exactly 0 and the last exactly full scale.
#[must_use]
pub fn compute(protocol2: bool, length_us: u32) -> Vec<u32> {
    let n = sample_count(protocol2, length_us).max(2);
    let mut samples = Vec::with_capacity(n as usize);
    let last = f64::from(n - 1);
    for i in 0..n {
        let x = f64::from(i) / last;
        let value = x
            + C1 * (2.0 * std::f64::consts::PI * x).sin()
            + C2 * (4.0 * std::f64::consts::PI * x).sin()
            + C3 * (6.0 * std::f64::consts::PI * x).sin()
            + C4 * (8.0 * std::f64::consts::PI * x).sin()
            + C5 * (10.0 * std::f64::consts::PI * x).sin();
        samples.push((value * f64::from(RAMP_FULL_SCALE)).round() as u32);
    }
    samples
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_clipping() {
        assert_eq!(clip_duration_us(2_000, 14), MIN_RAMP_US);
        assert_eq!(clip_duration_us(25_000, 14), MAX_RAMP_US_FW14);
        assert_eq!(clip_duration_us(25_000, 13), MAX_RAMP_US);
        assert_eq!(clip_duration_us(5_000, 14), 5_000);
    }

    #[test]
    fn endpoints_and_monotonicity() {
        for &(p2, len) in &[(true, 3_000u32), (true, 5_000), (true, 20_000), (false, 10_000)] {
            let samples = compute(p2, len);
            assert_eq!(samples.len() as u32, sample_count(p2, len));
            assert!(samples[0] <= 1, "first sample within 1 LSB of zero");
            let last = *samples.last().expect("non-empty ramp");
            assert!(
                RAMP_FULL_SCALE - last <= 1,
                "last sample within 1 LSB of full scale, got {}",
                last
            );
            for pair in samples.windows(2) {
                assert!(pair[1] >= pair[0], "ramp must be non-decreasing");
            }
        }
    }

    #[test]
    fn sample_counts_match_rates() {
        // 5 ms at 192 kHz -> 960 samples; at 48 kHz -> 240
        assert_eq!(sample_count(true, 5_000), 960);
        assert_eq!(sample_count(false, 5_000), 240);
    }
}
