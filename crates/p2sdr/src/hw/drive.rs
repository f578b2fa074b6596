// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! TX drive level lookup tables.
//!
//! An 8-bit drive demand maps to a 6-bit step attenuator (0.5 dB steps) and
//! an 8-bit DAC current PWM value. The step attenuator realises the largest
//! multiple of 0.5 dB below the desired attenuation, saturating at 31.5 dB;
//! the residual is made up by the current DAC. Both tables are built once
//! at start-up.

/// Attenuator/current ROMs indexed by 8-bit drive demand.
pub struct DriveRoms {
    /// 6-bit step attenuator value per demand level.
    pub step: [u8; 256],
    /// 8-bit DAC current PWM value per demand level.
    pub current: [u8; 256],
}

impl DriveRoms {
    /// Build both tables. Level 0 is full attenuation (step 63, current 0).
    #[must_use]
    pub fn build() -> Self {
        let mut step = [0u8; 256];
        let mut current = [0u8; 256];
        step[0] = 63;
        current[0] = 0;

        for level in 1..256usize {
            let desired_atten = 20.0 * (255.0 / level as f64).log10();
            let mut step_value = (2.0 * desired_atten) as u32;
            if step_value > 63 {
                step_value = 63;
            }
            let residual = desired_atten - (step_value as f64 * 0.5);
            let dac_drive = (255.0 / 10f64.powf(residual / 20.0)) as u32;
            step[level] = step_value as u8;
            current[level] = dac_drive as u8;
        }
        Self { step, current }
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_levels() {
        let roms = DriveRoms::build();
        assert_eq!(roms.step[0], 63);
        assert_eq!(roms.current[0], 0);
        assert_eq!(roms.step[255], 0);
        assert_eq!(roms.current[255], 255);
    }

    #[test]
    fn realised_attenuation_within_half_db() {
        let roms = DriveRoms::build();
        for demand in 1..256usize {
            let desired = 20.0 * (255.0 / demand as f64).log10();
            let achieved = 0.5 * f64::from(roms.step[demand])
                + 20.0 * (255.0 / f64::from(roms.current[demand])).log10();
            assert!(
                (desired - achieved).abs() < 0.5,
                "demand {}: desired {:.3} dB, achieved {:.3} dB",
                demand,
                desired,
                achieved
            );
        }
    }

    #[test]
    fn step_attenuator_never_exceeds_six_bits() {
        let roms = DriveRoms::build();
        assert!(roms.step.iter().all(|&s| s <= 63));
    }
}
