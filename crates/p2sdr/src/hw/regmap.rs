// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! FPGA register map and bit-field layout.
//!
//! Addresses are byte offsets into the XDMA register window. Bit positions
//! must match the loaded firmware; do not reorder.

use crate::config::NUM_DDC;

// ============================================================================
// Register addresses
// ============================================================================

/// DDC frequency (delta-phase) registers. DDC 8/9 live in a second block.
pub const ADDR_DDC_FREQ: [u32; NUM_DDC] = [
    0x0, 0x4, 0x8, 0xC, 0x10, 0x14, 0x18, 0x1C, 0x1000, 0x1004,
];

pub const ADDR_RX_TEST_DDS: u32 = 0x1008;
pub const ADDR_DDC_RATES: u32 = 0x100C;
pub const ADDR_DDC_IN_SEL: u32 = 0x1010;
pub const ADDR_KEYER_CONFIG: u32 = 0x2000;
pub const ADDR_CODEC_CONFIG: u32 = 0x2004;
pub const ADDR_TX_CONFIG: u32 = 0x2008;
pub const ADDR_TX_DUC_FREQ: u32 = 0x200C;
pub const ADDR_TX_MOD_TEST: u32 = 0x2010;
pub const ADDR_RF_GPIO: u32 = 0x2014;
pub const ADDR_ADC_CTRL: u32 = 0x2018;
pub const ADDR_DAC_CTRL: u32 = 0x201C;
pub const ADDR_STATUS: u32 = 0x4000;
pub const ADDR_ADC_OVERFLOW: u32 = 0x5000;
pub const ADDR_FIFO_RESET: u32 = 0x7000;
pub const ADDR_IAMBIC_CONFIG: u32 = 0x7004;
pub const ADDR_FIFO_MON_BASE: u32 = 0x9000;
pub const ADDR_ALEX_ADC_BASE: u32 = 0xA000;
pub const ADDR_ALEX_SPI: u32 = 0xB000;
pub const ADDR_SW_VERSION: u32 = 0xC000;
pub const ADDR_PRODUCT_VERSION: u32 = 0xC004;
pub const ADDR_WIDEBAND_CONTROL: u32 = 0xD000;
pub const ADDR_WIDEBAND_PERIOD: u32 = 0xD004;
pub const ADDR_WIDEBAND_DEPTH: u32 = 0xD008;
pub const ADDR_WIDEBAND_STATUS: u32 = 0xD00C;
pub const ADDR_CODEC_SPI: u32 = 0x14000;
pub const ADDR_XADC_TEMP: u32 = 0x18000;
pub const ADDR_CW_KEYER_RAM: u32 = 0x1C000;

/// Alex SPI IP core register offsets from `ADDR_ALEX_SPI`.
pub const ALEX_OFFSET_TX_FILTER: u32 = 0; // TX filter + RX antenna (legacy)
pub const ALEX_OFFSET_RX: u32 = 4; // RX1 low 16, RX2 high 16
pub const ALEX_OFFSET_TX_ANT: u32 = 8; // TX filter + TX antenna (FW >= 12)

// ============================================================================
// RF GPIO register bits
// ============================================================================

pub const GPIO_MIC_BIAS_ENABLE: u32 = 0;
pub const GPIO_MIC_PTT_SELECT: u32 = 1;
pub const GPIO_MIC_SIGNAL_SELECT: u32 = 2;
pub const GPIO_MIC_BIAS_SELECT: u32 = 3;
pub const GPIO_SPKR_MUTE: u32 = 4;
pub const GPIO_BALANCED_MIC_SELECT: u32 = 5;
pub const GPIO_ADC1_RAND: u32 = 8;
pub const GPIO_ADC1_PGA: u32 = 9;
pub const GPIO_ADC1_DITHER: u32 = 10;
pub const GPIO_OPEN_COLLECTOR_SHIFT: u32 = 16; // bits 16-22
pub const GPIO_MOX: u32 = 24;
pub const GPIO_TX_ENABLE: u32 = 25;
pub const GPIO_DATA_ENDIAN: u32 = 26;
pub const GPIO_TX_RELAY_DISABLE: u32 = 27;
pub const GPIO_ATU_TUNE: u32 = 29;
pub const GPIO_XVTR_ENABLE: u32 = 30;

// ============================================================================
// Status register bits
// ============================================================================

pub const STATUS_PTT_IN1: u32 = 0;
pub const STATUS_KEY_DOT: u32 = 2;
pub const STATUS_KEY_DASH: u32 = 3;
pub const STATUS_USER_IO4: u32 = 4;
pub const STATUS_USER_IO5: u32 = 5;
pub const STATUS_USER_IO6: u32 = 6;
pub const STATUS_USER_IO8: u32 = 7;
pub const STATUS_ATU_TUNE_COMPLETE: u32 = 9;
pub const STATUS_PLL_LOCKED: u32 = 10;
pub const STATUS_CW_KEY_DOWN: u32 = 11;

// ============================================================================
// Keyer configuration register (0x2000)
// ============================================================================

pub const KEYER_DELAY_SHIFT: u32 = 0; // bits 7:0
pub const KEYER_HANG_SHIFT: u32 = 8; // bits 17:8
pub const KEYER_RAMP_SHIFT: u32 = 18; // ramp length field
pub const KEYER_ENABLE: u32 = 31;
/// Mask preserving enable + non-ramp fields when replacing the ramp length.
pub const KEYER_RAMP_STRIP_MASK: u32 = 0x8003_FFFF;
/// Ramp RAM length, in 32-bit words.
pub const RAMP_RAM_WORDS: usize = 4096;

// ============================================================================
// Iambic configuration register (0x7004)
// ============================================================================

pub const IAMBIC_SPEED_SHIFT: u32 = 0; // bits 7:0
pub const IAMBIC_WEIGHT_SHIFT: u32 = 8; // bits 15:8
pub const IAMBIC_REVERSED: u32 = 16;
pub const IAMBIC_ENABLE: u32 = 17;
pub const IAMBIC_MODE: u32 = 18;
pub const IAMBIC_STRICT: u32 = 19;
pub const IAMBIC_CWX: u32 = 20;
pub const IAMBIC_CWX_DOT: u32 = 21;
pub const IAMBIC_CWX_DASH: u32 = 22;
pub const CW_BREAKIN: u32 = 23;
/// All CWX bits.
pub const IAMBIC_CWX_MASK: u32 = 0x0070_0000;
/// All non-CWX iambic bits.
pub const IAMBIC_MASK: u32 = 0x000F_FFFF;

// ============================================================================
// TX configuration register (0x2008)
// ============================================================================

pub const TXCFG_DATA_SOURCE_SHIFT: u32 = 0; // bits 1:0, modulation source
pub const TXCFG_SAMPLE_GATING: u32 = 2;
pub const TXCFG_PROTOCOL: u32 = 3;
pub const TXCFG_SCALE_SHIFT: u32 = 4; // bits 21:4, amplitude scale
pub const TXCFG_SCALE_STRIP_MASK: u32 = 0xFFC0_000F;
pub const TXCFG_MUX_RESET: u32 = 29;
pub const TXCFG_IQ_DEINTERLEAVE: u32 = 30;
pub const TXCFG_MUX_ENABLE: u32 = 31;

// ============================================================================
// FIFO reset register (0x7000) bit per DMA channel
// ============================================================================

pub const FIFO_RESET_CODEC_MIC: u32 = 0;
pub const FIFO_RESET_CODEC_SPK: u32 = 1;
pub const FIFO_RESET_DDC: u32 = 2;
pub const FIFO_RESET_DUC: u32 = 3;

// ============================================================================
// Wideband capture registers
// ============================================================================

pub const WB_CONTROL_ADC1_ENABLE: u32 = 0;
pub const WB_CONTROL_ADC2_ENABLE: u32 = 1;
pub const WB_CONTROL_TRANSFER_ACK: u32 = 2;
pub const WB_STATUS_ADC1_READY: u32 = 30;
pub const WB_STATUS_ADC2_READY: u32 = 31;

// ============================================================================
// Codec (TLV320AIC23 style) register addresses, reached over the SPI writer
// ============================================================================

pub const CODEC_LEFT_LINE_VOL: u32 = 0;
pub const CODEC_RIGHT_LINE_VOL: u32 = 1;
pub const CODEC_ANALOGUE_PATH: u32 = 4;
pub const CODEC_DIGITAL_PATH: u32 = 5;
pub const CODEC_POWER_DOWN: u32 = 6;
pub const CODEC_DIGITAL_FORMAT: u32 = 7;
pub const CODEC_SAMPLE_RATE: u32 = 8;
pub const CODEC_ACTIVATION: u32 = 9;
pub const CODEC_RESET: u32 = 15;
