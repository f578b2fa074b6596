// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Register bank: typed, intention-named operations over the FPGA register
//! window.
//!
//! Multiple threads mutate hardware state concurrently, so this facade owns
//! the locking discipline for all register mutation. Three fine-grained
//! locks separate the hot paths from each other:
//!
//! - the DDC input select register (touched by the DDC-specific listener
//!   and the supervisor),
//! - the RF GPIO register (a bit-aggregate touched by listeners and the
//!   PTT/MOX/speaker-mute setters),
//! - the codec SPI register (writes are slow; duplicates are suppressed).
//!
//! A default lock covers every remaining mutating operation, and reads of
//! the latched status register, since the read clears side-effect bits.
//!
//! Multi-bit updates are always read-modify-write on a shadow mirror under
//! the owning lock, committed with a single register write; intermediate
//! values never reach the hardware.

use crate::config::{NUM_DDC, SAMPLE_CLOCK_HZ};
use crate::error::Result;
use crate::hw::drive::DriveRoms;
use crate::hw::ramp;
use crate::hw::regmap::*;
use crate::hw::xdma::RegisterBus;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// ADC source selection for a DDC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcSelect {
    Adc1 = 0,
    Adc2 = 1,
    /// Internal test DDS; not for operational use.
    TestSource = 2,
    /// TX feedback samples (PureSignal).
    TxSamples = 3,
}

/// Modulation source for the TX chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxModulationSource {
    IqData = 0,
    Fixed0Hz = 1,
    TxDds = 2,
    CwKeyer = 3,
}

/// 3-bit sample rate code held in the DDC rate register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRateCode {
    Disabled = 0,
    R48 = 1,
    R96 = 2,
    R192 = 3,
    R384 = 4,
    R768 = 5,
    R1536 = 6,
    /// Even DDC paired with the next (odd) DDC at double rate.
    InterleaveWithNext = 7,
}

impl SampleRateCode {
    /// Map a protocol sample rate in kHz to its register code.
    #[must_use]
    pub fn from_khz(rate_khz: u32) -> Self {
        match rate_khz {
            96 => SampleRateCode::R96,
            192 => SampleRateCode::R192,
            384 => SampleRateCode::R384,
            768 => SampleRateCode::R768,
            1536 => SampleRateCode::R1536,
            _ => SampleRateCode::R48,
        }
    }
}

/// Firmware identification from the software version register.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareInfo {
    pub version: u16,
    pub id: u8,
    pub clock_info: u8,
}

/// Product identification.
#[derive(Debug, Clone, Copy)]
pub struct ProductInfo {
    pub id: u16,
    pub version: u16,
}

// ============================================================================
// Lock-partitioned mirrors
// ============================================================================

#[derive(Default)]
struct GpioMirror {
    value: u32,
    /// Opposite sense of the protocol's PTT-disable; kept for readback.
    #[allow(dead_code)]
    ptt_enabled: bool,
}

#[derive(Default)]
struct DdcInSelMirror {
    value: u32,
    adc_override: bool,
}

#[derive(Default)]
struct CodecMirror {
    analogue_path: u32,
    line_gain: u32,
}

// Stored-only settings (no dedicated register in this firmware) are kept so
// a later firmware can pick them up without protocol changes.
#[allow(dead_code)]
struct DefaultMirror {
    ddc_rate_reg: u32,
    p2_sample_rates: [u32; NUM_DDC],
    ddc_phase: [u32; NUM_DDC],
    duc_phase: u32,
    test_dds_phase: u32,
    tx_config: u32,
    keyer_setup: u32,
    iambic: u32,
    adc_ctrl: u32,
    codec_config: u32,
    sidetone_enabled: bool,
    sidetone_volume: u8,
    alex_tx_filt: u32,
    alex_tx_ant: u32,
    alex_rx: u32,
    alex_manual: bool,
    tx_mod_test: u32,
    cw_enabled: bool,
    breakin_enabled: bool,
    ramp_length_us: u32,
    ramp_is_p2: bool,
    // stored-only settings with no dedicated register yet
    adc_count: u32,
    alex_enabled_bits: u8,
    apollo_enabled: bool,
    pa_enabled: bool,
    pwm_min: u16,
    pwm_max: u16,
    user_output_bits: u8,
    ddc_sample_size: [u8; NUM_DDC],
}

impl Default for DefaultMirror {
    fn default() -> Self {
        Self {
            ddc_rate_reg: 0,
            p2_sample_rates: [0; NUM_DDC],
            ddc_phase: [0; NUM_DDC],
            duc_phase: 0,
            test_dds_phase: 0,
            tx_config: 0,
            keyer_setup: 0,
            iambic: 0,
            adc_ctrl: 0,
            codec_config: 0,
            sidetone_enabled: false,
            sidetone_volume: 0,
            alex_tx_filt: 0,
            alex_tx_ant: 0,
            alex_rx: 0,
            alex_manual: false,
            tx_mod_test: 0,
            cw_enabled: false,
            breakin_enabled: false,
            ramp_length_us: 0,
            ramp_is_p2: false,
            adc_count: 0,
            alex_enabled_bits: 0,
            apollo_enabled: false,
            pa_enabled: false,
            pwm_min: 0,
            pwm_max: 0,
            user_output_bits: 0,
            ddc_sample_size: [24; NUM_DDC],
        }
    }
}

// ============================================================================
// Register bank
// ============================================================================

/// Facade over the FPGA register window. One instance per process, shared
/// across every engine thread.
pub struct RegisterBank {
    bus: Arc<dyn RegisterBus>,
    fw: FirmwareInfo,
    pub(crate) fifo_depths: [u32; 4],
    roms: DriveRoms,

    gpio: Mutex<GpioMirror>,
    ddc_in_sel: Mutex<DdcInSelMirror>,
    codec: Mutex<CodecMirror>,
    deflt: Mutex<DefaultMirror>,

    // latched status register, refreshed by read_status_register()
    status: AtomicU32,
    // one enable bit per DDC, updated under the default lock
    ddc_enabled: AtomicU32,
    mox: AtomicBool,
    timestamping: AtomicBool,
    vita49: AtomicBool,
    freq_is_phase: AtomicBool,
}

impl RegisterBank {
    /// Build the facade: read firmware identity, size the FIFO depth table,
    /// build the drive-level ROMs.
    pub fn new(bus: Arc<dyn RegisterBus>) -> Result<Self> {
        let sw = bus.read32(ADDR_SW_VERSION)?;
        let fw = FirmwareInfo {
            version: ((sw >> 4) & 0xFFFF) as u16,
            id: ((sw >> 20) & 0xFF) as u8,
            clock_info: (sw & 0xF) as u8,
        };
        let fifo_depths = Self::fifo_depths_for(fw.version);
        log::info!(
            "[regs] firmware version={} id={} fifo depths={:?}",
            fw.version,
            fw.id,
            fifo_depths
        );
        Ok(Self {
            bus,
            fw,
            fifo_depths,
            roms: DriveRoms::build(),
            gpio: Mutex::new(GpioMirror::default()),
            ddc_in_sel: Mutex::new(DdcInSelMirror::default()),
            codec: Mutex::new(CodecMirror::default()),
            deflt: Mutex::new(DefaultMirror::default()),
            status: AtomicU32::new(0),
            ddc_enabled: AtomicU32::new(0),
            mox: AtomicBool::new(false),
            timestamping: AtomicBool::new(false),
            vita49: AtomicBool::new(false),
            freq_is_phase: AtomicBool::new(false),
        })
    }

    /// DMA FIFO depths in 64-bit words, keyed by firmware version.
    fn fifo_depths_for(version: u16) -> [u32; 4] {
        // index order: RX DDC, TX DUC, mic, speaker
        if version >= 13 {
            [16384, 4096, 256, 1024]
        } else if version >= 10 {
            [16384, 2048, 256, 1024]
        } else {
            [0; 4]
        }
    }

    #[must_use]
    pub fn firmware_version(&self) -> u16 {
        self.fw.version
    }

    #[must_use]
    pub fn firmware_info(&self) -> FirmwareInfo {
        self.fw
    }

    pub fn product_info(&self) -> Result<ProductInfo> {
        let _guard = self.deflt.lock();
        let raw = self.bus.read32(ADDR_PRODUCT_VERSION)?;
        Ok(ProductInfo {
            id: (raw >> 16) as u16,
            version: (raw & 0xFFFF) as u16,
        })
    }

    /// FPGA die temperature from the XADC, degrees Celsius.
    pub fn die_temperature_celsius(&self) -> Result<f32> {
        let raw = {
            let _guard = self.deflt.lock();
            self.bus.read32(ADDR_XADC_TEMP)?
        };
        Ok((raw as f32) * 503.975 / 65536.0 - 273.15)
    }

    pub(crate) fn bus(&self) -> &dyn RegisterBus {
        self.bus.as_ref()
    }

    /// Hold the default register lock for a multi-write sequence performed
    /// outside this module (FIFO reset toggles).
    pub(crate) fn default_guard(&self) -> impl Drop + '_ {
        self.deflt.lock()
    }

    // ========================================================================
    // RF GPIO register
    // ========================================================================

    fn update_gpio(&self, f: impl FnOnce(&mut GpioMirror, u32) -> u32) -> Result<()> {
        let mut gpio = self.gpio.lock();
        let current = gpio.value;
        let next = f(&mut gpio, current);
        gpio.value = next;
        self.bus.write32(ADDR_RF_GPIO, next)
    }

    /// Enable hardware byte swapping so sample data leaves in network order.
    pub fn set_byte_swapping(&self, swapped: bool) -> Result<()> {
        self.update_gpio(|_, v| set_bit(v, GPIO_DATA_ENDIAN, swapped))
    }

    /// Assert or release the transmit state, and track the keyer enable:
    /// during TX the keyer follows CW mode; out of TX it stays active only
    /// for CW break-in.
    pub fn set_mox(&self, mox: bool) -> Result<()> {
        self.mox.store(mox, Ordering::Release);
        self.update_gpio(|_, v| set_bit(v, GPIO_MOX, mox))?;
        let mut m = self.deflt.lock();
        let keyer = if mox {
            m.cw_enabled
        } else {
            m.cw_enabled && m.breakin_enabled
        };
        self.activate_cw_keyer_locked(&mut m, keyer)
    }

    #[must_use]
    pub fn mox_asserted(&self) -> bool {
        self.mox.load(Ordering::Acquire)
    }

    pub fn set_tx_enable(&self, enabled: bool) -> Result<()> {
        self.update_gpio(|_, v| set_bit(v, GPIO_TX_ENABLE, enabled))
    }

    pub fn set_atu_tune(&self, enabled: bool) -> Result<()> {
        self.update_gpio(|_, v| set_bit(v, GPIO_ATU_TUNE, enabled))
    }

    /// Set the 7 open-collector output bits (data in bits 0-6).
    pub fn set_open_collector_outputs(&self, bits: u8) -> Result<()> {
        self.update_gpio(|_, v| {
            let stripped = v & !(0x7F << GPIO_OPEN_COLLECTOR_SHIFT);
            stripped | (u32::from(bits & 0x7F) << GPIO_OPEN_COLLECTOR_SHIFT)
        })
    }

    /// Per-ADC dither/random/PGA control bits. ADC2's bits sit 3 above ADC1's.
    pub fn set_adc_options(&self, adc: AdcSelect, pga: bool, dither: bool, random: bool) -> Result<()> {
        let shift = if adc == AdcSelect::Adc1 { 0 } else { 3 };
        self.update_gpio(|_, v| {
            let mut v = v;
            v = set_bit(v, GPIO_ADC1_RAND + shift, random);
            v = set_bit(v, GPIO_ADC1_PGA + shift, pga);
            v = set_bit(v, GPIO_ADC1_DITHER + shift, dither);
            v
        })
    }

    /// Transverter enable; when set the PA is not keyed.
    pub fn set_xvtr_enable(&self, enabled: bool) -> Result<()> {
        self.update_gpio(|_, v| set_bit(v, GPIO_XVTR_ENABLE, enabled))
    }

    pub fn set_spkr_mute(&self, muted: bool) -> Result<()> {
        self.update_gpio(|_, v| set_bit(v, GPIO_SPKR_MUTE, muted))
    }

    /// PA enable; disabling also disables the TX changeover relay.
    pub fn set_pa_enabled(&self, enabled: bool) -> Result<()> {
        self.deflt.lock().pa_enabled = enabled;
        self.update_gpio(|_, v| set_bit(v, GPIO_TX_RELAY_DISABLE, !enabled))
    }

    /// Microphone jack wiring. The register bits are not the protocol bits:
    /// tip/ring selection moves signal, bias and PTT select together, and
    /// the PTT argument is a disable in the protocol (enabled = 0).
    pub fn set_orion_mic_options(&self, mic_ring: bool, enable_bias: bool, enable_ptt: bool) -> Result<()> {
        self.update_gpio(|g, v| {
            let mut v = v;
            v = set_bit(v, GPIO_MIC_BIAS_ENABLE, enable_bias);
            if mic_ring {
                v = set_bit(v, GPIO_MIC_SIGNAL_SELECT, true); // mic on ring
                v = set_bit(v, GPIO_MIC_BIAS_SELECT, false); // bias on ring
                v = set_bit(v, GPIO_MIC_PTT_SELECT, true); // PTT on tip
            } else {
                v = set_bit(v, GPIO_MIC_SIGNAL_SELECT, false); // mic on tip
                v = set_bit(v, GPIO_MIC_BIAS_SELECT, true); // bias on tip
                v = set_bit(v, GPIO_MIC_PTT_SELECT, false); // PTT on ring
            }
            g.ptt_enabled = !enable_ptt;
            v
        })
    }

    pub fn set_balanced_mic_input(&self, balanced: bool) -> Result<()> {
        self.update_gpio(|_, v| set_bit(v, GPIO_BALANCED_MIC_SELECT, balanced))
    }

    // ========================================================================
    // DDC input select register
    // ========================================================================

    /// Route one DDC to an ADC (or the test DDS when the override is armed).
    pub fn set_ddc_adc(&self, ddc: usize, adc: AdcSelect) -> Result<()> {
        let mut sel = self.ddc_in_sel.lock();
        let adc = if sel.adc_override {
            AdcSelect::TestSource
        } else {
            adc
        };
        let shift = (ddc as u32) * 2;
        let mut value = sel.value;
        value &= !(0x3 << shift);
        value |= (adc as u32) << shift;
        sel.value = value;
        self.bus.write32(ADDR_DDC_IN_SEL, value)
    }

    /// Stage every DDC's ADC routing and commit it in one register write,
    /// so the hardware never sees a partial source map.
    pub fn set_ddc_adcs(&self, adcs: &[AdcSelect; NUM_DDC]) -> Result<()> {
        let mut sel = self.ddc_in_sel.lock();
        let mut value = sel.value & !0x000F_FFFF; // 2 bits per DDC
        for (ddc, adc) in adcs.iter().enumerate() {
            let adc = if sel.adc_override {
                AdcSelect::TestSource
            } else {
                *adc
            };
            value |= (adc as u32) << (ddc as u32 * 2);
        }
        if value != sel.value {
            sel.value = value;
            self.bus.write32(ADDR_DDC_IN_SEL, value)?;
        }
        Ok(())
    }

    /// Master DDC enable (bit 30); the input FIFO resets on assertion.
    pub fn set_rx_ddc_enabled(&self, enabled: bool) -> Result<()> {
        let mut sel = self.ddc_in_sel.lock();
        let value = set_bit(sel.value, 30, enabled);
        sel.value = value;
        self.bus.write32(ADDR_DDC_IN_SEL, value)
    }

    /// Route every DDC to the internal test DDS, overriding later ADC
    /// selections until restart.
    pub fn use_test_dds_source(&self) -> Result<()> {
        let mut sel = self.ddc_in_sel.lock();
        sel.adc_override = true;
        let value = (sel.value & 0x4000_0000) | 0x000A_AAAA;
        sel.value = value;
        self.bus.write32(ADDR_DDC_IN_SEL, value)
    }

    // ========================================================================
    // Frequencies
    // ========================================================================

    fn delta_phase(value: u32, is_delta_phase: bool) -> u32 {
        if is_delta_phase {
            value
        } else {
            // protocol 1 sends Hz; convert with delta = 2^32 * F / Fs
            (4294967296.0 * f64::from(value) / SAMPLE_CLOCK_HZ) as u32
        }
    }

    /// Set one DDC's LO. `value` is a 32-bit delta-phase word, or a
    /// frequency in Hz when `is_delta_phase` is false.
    pub fn set_ddc_frequency(&self, ddc: usize, value: u32, is_delta_phase: bool) -> Result<()> {
        let ddc = ddc.min(NUM_DDC - 1);
        let phase = Self::delta_phase(value, is_delta_phase);
        let mut m = self.deflt.lock();
        if m.ddc_phase[ddc] != phase {
            m.ddc_phase[ddc] = phase;
            self.bus.write32(ADDR_DDC_FREQ[ddc], phase)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn ddc_frequency(&self, ddc: usize) -> u32 {
        self.deflt.lock().ddc_phase[ddc.min(NUM_DDC - 1)]
    }

    pub fn set_test_dds_frequency(&self, value: u32, is_delta_phase: bool) -> Result<()> {
        let phase = Self::delta_phase(value, is_delta_phase);
        let mut m = self.deflt.lock();
        if m.test_dds_phase != phase {
            m.test_dds_phase = phase;
            self.bus.write32(ADDR_RX_TEST_DDS, phase)?;
        }
        Ok(())
    }

    pub fn set_duc_frequency(&self, value: u32, is_delta_phase: bool) -> Result<()> {
        let phase = Self::delta_phase(value, is_delta_phase);
        let mut m = self.deflt.lock();
        m.duc_phase = phase;
        self.bus.write32(ADDR_TX_DUC_FREQ, phase)
    }

    // ========================================================================
    // DDC rate register
    // ========================================================================

    /// Stage one DDC's rate/enable/interleave setting in the local mirror.
    ///
    /// Does NOT touch hardware: call [`Self::write_ddc_rate_register`] once
    /// every DDC has been staged, so the FPGA never sees a partial map.
    pub fn set_p2_sample_rate(&self, ddc: usize, enabled: bool, rate_khz: u32, interleave: bool) {
        let mut m = self.deflt.lock();
        let code = if !enabled {
            m.p2_sample_rates[ddc] = 0;
            self.ddc_enabled
                .fetch_and(!(1u32 << ddc), Ordering::AcqRel);
            SampleRateCode::Disabled
        } else {
            m.p2_sample_rates[ddc] = rate_khz;
            self.ddc_enabled.fetch_or(1u32 << ddc, Ordering::AcqRel);
            if interleave {
                SampleRateCode::InterleaveWithNext
            } else {
                SampleRateCode::from_khz(rate_khz)
            }
        };
        let shift = (ddc as u32) * 3;
        m.ddc_rate_reg = (m.ddc_rate_reg & !(0x7 << shift)) | ((code as u32) << shift);
    }

    /// Commit the staged DDC rate map in a single register write.
    ///
    /// Returns true if the hardware value changed, so DDC-settings-dependent
    /// side effects (packet sizing) can be re-derived.
    pub fn write_ddc_rate_register(&self) -> Result<bool> {
        let m = self.deflt.lock();
        let current = self.bus.read32(ADDR_DDC_RATES)?;
        let changed = current != m.ddc_rate_reg;
        self.bus.write32(ADDR_DDC_RATES, m.ddc_rate_reg)?;
        Ok(changed)
    }

    /// Replicate one rate across the first `count`+1 DDC slots (protocol 1).
    /// Mirror-only; the P1 path commits through the same rate register.
    pub fn set_p1_sample_rate(&self, rate: SampleRateCode, count: usize) {
        const MAX_P1_DDCS: usize = 7;
        let count = count.min(MAX_P1_DDCS);
        let mut value = 0u32;
        let mut bits = rate as u32;
        for _ in 0..=count {
            value |= bits;
            bits <<= 3;
        }
        self.deflt.lock().ddc_rate_reg = value;
    }

    /// Enable bits for each DDC, 1 bit per DDC.
    #[must_use]
    pub fn ddc_enables(&self) -> u32 {
        self.ddc_enabled.load(Ordering::Acquire)
    }

    /// Staged sample rate in kHz for one DDC (0 when disabled).
    #[must_use]
    pub fn ddc_sample_rate(&self, ddc: usize) -> u32 {
        self.deflt.lock().p2_sample_rates[ddc]
    }

    /// Per-DDC sample resolution. Only 24 bits is supported; stored for
    /// completeness.
    pub fn set_ddc_sample_size(&self, ddc: usize, bits: u8) {
        self.deflt.lock().ddc_sample_size[ddc.min(NUM_DDC - 1)] = bits;
    }

    pub fn set_adc_count(&self, count: u32) {
        self.deflt.lock().adc_count = count;
    }

    // ========================================================================
    // Alex filter/antenna registers
    // ========================================================================

    /// Select between remotely commanded filter words and locally computed
    /// ones. All manual filter setters are gated on this.
    pub fn enable_alex_manual_filter_select(&self, manual: bool) {
        self.deflt.lock().alex_manual = manual;
    }

    /// Full 16-bit Alex RX word for one receiver. RX 0/1 selects RX1 (low
    /// half), RX 2 selects RX2 (high half).
    pub fn alex_manual_rx_filters(&self, bits: u16, rx: u8) -> Result<()> {
        let mut m = self.deflt.lock();
        if !m.alex_manual {
            return Ok(());
        }
        let mut value = m.alex_rx;
        if rx != 2 {
            value = (value & 0xFFFF_0000) | u32::from(bits);
        } else {
            value = (value & 0x0000_FFFF) | (u32::from(bits) << 16);
        }
        if value != m.alex_rx {
            m.alex_rx = value;
            self.bus.write32(ADDR_ALEX_SPI + ALEX_OFFSET_RX, value)?;
        }
        Ok(())
    }

    /// Full 16-bit Alex TX word. From firmware 12 there are two registers:
    /// `has_tx_ant` true targets the new TX-filter/TX-antenna register,
    /// false the legacy TX-filter/RX-antenna register.
    pub fn alex_manual_tx_filters(&self, bits: u16, has_tx_ant: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        if !m.alex_manual {
            return Ok(());
        }
        let value = u32::from(bits);
        if has_tx_ant && value != m.alex_tx_ant {
            m.alex_tx_ant = value;
            self.bus.write32(ADDR_ALEX_SPI + ALEX_OFFSET_TX_ANT, value)?;
        } else if !has_tx_ant && value != m.alex_tx_filt {
            m.alex_tx_filt = value;
            self.bus
                .write32(ADDR_ALEX_SPI + ALEX_OFFSET_TX_FILTER, value)?;
        }
        Ok(())
    }

    pub fn set_alex_enabled(&self, bits: u8) {
        self.deflt.lock().alex_enabled_bits = bits;
    }

    pub fn set_apollo_enabled(&self, enabled: bool) {
        self.deflt.lock().apollo_enabled = enabled;
    }

    // ========================================================================
    // TX drive and attenuators
    // ========================================================================

    /// Map an 8-bit drive demand through the attenuator/current ROMs into
    /// the DAC control register (RX and TX contexts carry the same value).
    pub fn set_tx_drive_level(&self, level: u8) -> Result<()> {
        let dac = u32::from(self.roms.current[level as usize]);
        let atten = u32::from(self.roms.step[level as usize]);
        let value = dac | (dac << 8) | (atten << 16) | (atten << 24);
        let _guard = self.deflt.lock();
        self.bus.write32(ADDR_DAC_CTRL, value)
    }

    /// Drive ROM entry for a demand level, (step attenuator, DAC current).
    #[must_use]
    pub fn drive_rom_entry(&self, level: u8) -> (u8, u8) {
        (self.roms.step[level as usize], self.roms.current[level as usize])
    }

    /// 5-bit stepped attenuator on an ADC input, applied in the RX and/or
    /// TX context.
    pub fn set_adc_attenuator(&self, adc: AdcSelect, atten: u8, rx: bool, tx: bool) -> Result<()> {
        let base = if adc == AdcSelect::Adc1 { 0 } else { 10 };
        let atten = u32::from(atten & 0x1F);
        let mut m = self.deflt.lock();
        let mut value = m.adc_ctrl;
        if rx {
            value &= !(0x1F << base);
            value |= atten << base;
        }
        if tx {
            value &= !(0x1F << (base + 5));
            value |= atten << (base + 5);
        }
        m.adc_ctrl = value;
        self.bus.write32(ADDR_ADC_CTRL, value)
    }

    // ========================================================================
    // CW keyer and CWX
    // ========================================================================

    fn activate_cw_keyer_locked(&self, m: &mut DefaultMirror, on: bool) -> Result<()> {
        let value = set_bit(m.keyer_setup, KEYER_ENABLE, on);
        if value != m.keyer_setup {
            m.keyer_setup = value;
            self.bus.write32(ADDR_KEYER_CONFIG, value)?;
        }
        Ok(())
    }

    /// Configure the iambic keyer. `iambic_enabled` false reverts to a
    /// straight key; break-in shares the same register.
    #[allow(clippy::too_many_arguments)]
    pub fn set_cw_iambic_keyer(
        &self,
        speed_wpm: u8,
        weight: u8,
        reversed: bool,
        mode_b: bool,
        strict_spacing: bool,
        iambic_enabled: bool,
        breakin: bool,
    ) -> Result<()> {
        let mut m = self.deflt.lock();
        let mut value = m.iambic & !IAMBIC_MASK;
        value |= u32::from(speed_wpm) << IAMBIC_SPEED_SHIFT;
        value |= u32::from(weight) << IAMBIC_WEIGHT_SHIFT;
        value = set_bit(value, IAMBIC_REVERSED, reversed);
        value = set_bit(value, IAMBIC_MODE, mode_b);
        value = set_bit(value, IAMBIC_STRICT, strict_spacing);
        value = set_bit(value, IAMBIC_ENABLE, iambic_enabled);
        value = set_bit(value, CW_BREAKIN, breakin);
        if value != m.iambic {
            m.iambic = value;
            self.bus.write32(ADDR_IAMBIC_CONFIG, value)?;
        }
        Ok(())
    }

    /// Host-driven dot/dash keying (CWX).
    pub fn set_cwx_bits(&self, enabled: bool, dash: bool, dot: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        let mut value = m.iambic & !IAMBIC_CWX_MASK;
        value = set_bit(value, IAMBIC_CWX, enabled);
        value = set_bit(value, IAMBIC_CWX_DOT, dot);
        value = set_bit(value, IAMBIC_CWX_DASH, dash);
        if value != m.iambic {
            m.iambic = value;
            self.bus.write32(ADDR_IAMBIC_CONFIG, value)?;
        }
        Ok(())
    }

    /// Enable or disable CW mode: selects the keyer as modulation source
    /// and engages the keyer when break-in allows it.
    pub fn enable_cw(&self, enabled: bool, breakin: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        m.cw_enabled = enabled;
        m.breakin_enabled = breakin;
        let source = if enabled {
            TxModulationSource::CwKeyer
        } else {
            TxModulationSource::IqData
        };
        self.set_tx_modulation_source_locked(&mut m, source)?;
        self.activate_cw_keyer_locked(&mut m, enabled && breakin)
    }

    /// Sidetone on/off. Disabling zeroes the volume field in the codec
    /// configuration register; the stored volume survives.
    pub fn set_cw_sidetone_enabled(&self, enabled: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        if m.sidetone_enabled == enabled {
            return Ok(());
        }
        m.sidetone_enabled = enabled;
        let mut value = m.codec_config & 0x0000_FFFF;
        if enabled {
            value |= u32::from(m.sidetone_volume) << 24;
        }
        m.codec_config = value;
        self.bus.write32(ADDR_CODEC_CONFIG, value)
    }

    pub fn set_cw_sidetone_vol(&self, volume: u8) -> Result<()> {
        let mut m = self.deflt.lock();
        if m.sidetone_volume == volume {
            return Ok(());
        }
        m.sidetone_volume = volume;
        let mut value = m.codec_config & 0x0000_FFFF;
        if m.sidetone_enabled {
            value |= u32::from(volume) << 24;
        }
        m.codec_config = value;
        self.bus.write32(ADDR_CODEC_CONFIG, value)
    }

    /// Sidetone frequency in Hz, converted to a 16-bit DDS delta-phase
    /// against the 48 kHz codec clock.
    pub fn set_cw_sidetone_frequency(&self, freq_hz: u16) -> Result<()> {
        const CODEC_SAMPLE_RATE: f64 = 48_000.0;
        let phase = ((65536.0 * f64::from(freq_hz) / CODEC_SAMPLE_RATE) as u32) & 0xFFFF;
        let mut m = self.deflt.lock();
        let value = (m.codec_config & 0xFFFF_0000) | phase;
        if value != m.codec_config {
            m.codec_config = value;
            self.bus.write32(ADDR_CODEC_CONFIG, value)?;
        }
        Ok(())
    }

    /// Delay before TX asserts after key-down, milliseconds (8 bits).
    pub fn set_cw_ptt_delay(&self, delay_ms: u8) -> Result<()> {
        let mut m = self.deflt.lock();
        let value = (m.keyer_setup & 0xFFFF_FF00) | u32::from(delay_ms);
        if value != m.keyer_setup {
            m.keyer_setup = value;
            self.bus.write32(ADDR_KEYER_CONFIG, value)?;
        }
        Ok(())
    }

    /// Hang time after key-up before TX drops, milliseconds (10 bits).
    pub fn set_cw_hang_time(&self, hang_ms: u16) -> Result<()> {
        let mut m = self.deflt.lock();
        let value =
            (m.keyer_setup & 0xFFFC_00FF) | (u32::from(hang_ms & 0x3FF) << KEYER_HANG_SHIFT);
        if value != m.keyer_setup {
            m.keyer_setup = value;
            self.bus.write32(ADDR_KEYER_CONFIG, value)?;
        }
        Ok(())
    }

    /// Generate the key-shaping ramp into keyer RAM and set the length
    /// field. Skipped when both (clipped length, protocol) match the
    /// previous call.
    pub fn initialise_cw_keyer_ramp(&self, protocol2: bool, length_us: u32) -> Result<()> {
        let length_us = ramp::clip_duration_us(length_us, self.fw.version);
        let mut m = self.deflt.lock();
        if m.ramp_length_us == length_us && m.ramp_is_p2 == protocol2 {
            return Ok(());
        }
        m.ramp_length_us = length_us;
        m.ramp_is_p2 = protocol2;
        log::info!("[regs] calculating new CW ramp, length = {} us", length_us);

        let samples = ramp::compute(protocol2, length_us);
        for (i, sample) in samples.iter().enumerate() {
            self.bus
                .write32(ADDR_CW_KEYER_RAM + 4 * (i as u32), *sample)?;
        }
        for i in samples.len()..RAMP_RAM_WORDS {
            self.bus
                .write32(ADDR_CW_KEYER_RAM + 4 * (i as u32), ramp::RAMP_FULL_SCALE)?;
        }

        // the length field is a word address from FW 14, a byte address before
        let ramp_len = samples.len() as u32;
        let field = if self.fw.version >= 14 {
            ramp_len
        } else {
            ramp_len << 2
        };
        let value = (m.keyer_setup & KEYER_RAMP_STRIP_MASK) | (field << KEYER_RAMP_SHIFT);
        m.keyer_setup = value;
        self.bus.write32(ADDR_KEYER_CONFIG, value)
    }

    // ========================================================================
    // Codec
    // ========================================================================

    fn codec_spi_write(&self, reg: u32, data: u32) -> Result<()> {
        self.bus
            .write32(ADDR_CODEC_SPI, (reg << 9) | (data & 0x1FF))
    }

    /// One-time codec bring-up with the register values that don't change.
    pub fn codec_initialise(&self) -> Result<()> {
        let mut codec = self.codec.lock();
        codec.analogue_path = 0x14; // mic input, no boost
        codec.line_gain = 0;
        let ops: [(u32, u32); 9] = [
            (CODEC_RESET, 0x0),
            (CODEC_ACTIVATION, 0x1),
            (CODEC_ANALOGUE_PATH, codec.analogue_path),
            (CODEC_POWER_DOWN, 0x0),
            (CODEC_DIGITAL_FORMAT, 0x2), // slave, 16 bit, I2S
            (CODEC_SAMPLE_RATE, 0x0),    // 256Fs oversample
            (CODEC_DIGITAL_PATH, 0x0),
            (CODEC_LEFT_LINE_VOL, codec.line_gain),
            (CODEC_RIGHT_LINE_VOL, codec.line_gain),
        ];
        for (i, (reg, data)) in ops.iter().enumerate() {
            self.codec_spi_write(*reg, *data)?;
            if i < ops.len() - 1 {
                std::thread::sleep(std::time::Duration::from_micros(100));
            }
        }
        Ok(())
    }

    /// 20 dB mic boost amplifier in the codec. Codec writes are slow, so
    /// unchanged values are not rewritten.
    pub fn set_mic_boost(&self, boost: bool) -> Result<()> {
        let mut codec = self.codec.lock();
        let mut value = codec.analogue_path & 0xFFFE;
        if boost {
            value |= 1;
        }
        if value != codec.analogue_path {
            codec.analogue_path = value;
            self.codec_spi_write(CODEC_ANALOGUE_PATH, value)?;
        }
        Ok(())
    }

    /// Microphone vs line input to the codec.
    pub fn set_mic_line_input(&self, line_in: bool) -> Result<()> {
        let mut codec = self.codec.lock();
        let mut value = codec.analogue_path & 0xFFFB;
        if !line_in {
            value |= 4;
        }
        if value != codec.analogue_path {
            codec.analogue_path = value;
            self.codec_spi_write(CODEC_ANALOGUE_PATH, value)?;
        }
        Ok(())
    }

    /// Codec line input gain (5 bits).
    pub fn set_codec_line_in_gain(&self, gain: u8) -> Result<()> {
        let mut codec = self.codec.lock();
        let value = (codec.line_gain & 0xFFE0) | u32::from(gain & 0x1F);
        if value != codec.line_gain {
            codec.line_gain = value;
            self.codec_spi_write(CODEC_LEFT_LINE_VOL, value)?;
        }
        Ok(())
    }

    // ========================================================================
    // TX configuration register
    // ========================================================================

    fn write_tx_config_locked(&self, m: &mut DefaultMirror, value: u32) -> Result<()> {
        m.tx_config = value;
        self.bus.write32(ADDR_TX_CONFIG, value)
    }

    fn set_tx_modulation_source_locked(
        &self,
        m: &mut DefaultMirror,
        source: TxModulationSource,
    ) -> Result<()> {
        let value = (m.tx_config & 0xFFFF_FFFC) | (source as u32);
        self.write_tx_config_locked(m, value)
    }

    pub fn set_tx_modulation_source(&self, source: TxModulationSource) -> Result<()> {
        let mut m = self.deflt.lock();
        self.set_tx_modulation_source_locked(&mut m, source)
    }

    /// 18-bit amplitude multiplier applied after the DUC.
    pub fn set_tx_amplitude_scaling(&self, amplitude: u32) -> Result<()> {
        let mut m = self.deflt.lock();
        let value =
            (m.tx_config & TXCFG_SCALE_STRIP_MASK) | ((amplitude & 0x3_FFFF) << TXCFG_SCALE_SHIFT);
        self.write_tx_config_locked(&mut m, value)
    }

    /// TX datapath rate: protocol 1 runs at 48 kHz, protocol 2 at 192 kHz.
    pub fn set_tx_protocol_p2(&self, protocol2: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        let value = set_bit(m.tx_config, TXCFG_PROTOCOL, protocol2);
        self.write_tx_config_locked(&mut m, value)
    }

    /// Sample output gating: true keeps samples always enabled, false gates
    /// them with the TX strobe.
    pub fn set_tx_output_gate(&self, always_on: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        let value = set_bit(m.tx_config, TXCFG_SAMPLE_GATING, always_on);
        self.write_tx_config_locked(&mut m, value)
    }

    /// Pulse the 64-to-48 DUC multiplexer reset. Input data is discarded
    /// while the reset bit is held, so the pulse is immediate.
    pub fn reset_duc_mux(&self) -> Result<()> {
        let mut m = self.deflt.lock();
        let value = m.tx_config;
        self.bus
            .write32(ADDR_TX_CONFIG, set_bit(value, TXCFG_MUX_RESET, true))?;
        self.bus
            .write32(ADDR_TX_CONFIG, set_bit(value, TXCFG_MUX_RESET, false))?;
        m.tx_config = set_bit(value, TXCFG_MUX_RESET, false);
        Ok(())
    }

    /// EER mode sample routing: even samples to I/Q modulation, odd to the
    /// envelope path. The caller must empty the TX FIFO and reset the mux
    /// around a change; only the DUC I/Q handler may call this.
    pub fn set_tx_iq_deinterleaved(&self, interleaved: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        let value = set_bit(m.tx_config, TXCFG_IQ_DEINTERLEAVE, interleaved);
        self.write_tx_config_locked(&mut m, value)
    }

    /// Gate the multiplexer feeding FIFO samples to the DUC.
    pub fn enable_duc_mux(&self, enabled: bool) -> Result<()> {
        let mut m = self.deflt.lock();
        let value = set_bit(m.tx_config, TXCFG_MUX_ENABLE, enabled);
        self.write_tx_config_locked(&mut m, value)
    }

    /// Development-only test DDS feeding the TX modulator.
    pub fn set_tx_mod_test_frequency(&self, freq: u32) -> Result<()> {
        let mut m = self.deflt.lock();
        if m.tx_mod_test != freq {
            m.tx_mod_test = freq;
            self.bus.write32(ADDR_TX_MOD_TEST, freq)?;
        }
        Ok(())
    }

    // ========================================================================
    // Wideband capture
    // ========================================================================

    /// Wideband capture control. Always writes the control register, since
    /// the transfer-acknowledge bit must pulse even when enables are
    /// unchanged.
    pub fn set_wideband_enable(&self, adc1: bool, adc2: bool, transfer_ack: bool) -> Result<()> {
        let mut value = 0u32;
        value = set_bit(value, WB_CONTROL_ADC1_ENABLE, adc1);
        value = set_bit(value, WB_CONTROL_ADC2_ENABLE, adc2);
        value = set_bit(value, WB_CONTROL_TRANSFER_ACK, transfer_ack);
        let _guard = self.deflt.lock();
        self.bus.write32(ADDR_WIDEBAND_CONTROL, value)
    }

    /// Capture depth per collection, in 64-bit words.
    pub fn set_wideband_sample_count(&self, words: u32) -> Result<()> {
        let _guard = self.deflt.lock();
        self.bus.write32(ADDR_WIDEBAND_DEPTH, words)
    }

    /// Period between collections, milliseconds.
    pub fn set_wideband_update_rate(&self, period_ms: u8) -> Result<()> {
        let _guard = self.deflt.lock();
        self.bus
            .write32(ADDR_WIDEBAND_PERIOD, u32::from(period_ms))
    }

    /// Wideband FIFO status: (64-bit word count, ADC1 data ready, ADC2 data
    /// ready).
    pub fn wideband_status(&self) -> Result<(u32, bool, bool)> {
        let raw = {
            let _guard = self.deflt.lock();
            self.bus.read32(ADDR_WIDEBAND_STATUS)?
        };
        Ok((
            raw & 0xFFFF,
            (raw >> WB_STATUS_ADC1_READY) & 1 != 0,
            (raw >> WB_STATUS_ADC2_READY) & 1 != 0,
        ))
    }

    // ========================================================================
    // Soft settings carried in the general packet
    // ========================================================================

    pub fn enable_timestamp(&self, enabled: bool) {
        self.timestamping.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn timestamp_enabled(&self) -> bool {
        self.timestamping.load(Ordering::Acquire)
    }

    pub fn enable_vita49(&self, enabled: bool) {
        self.vita49.store(enabled, Ordering::Release);
    }

    pub fn set_freq_phase_word(&self, is_phase: bool) {
        self.freq_is_phase.store(is_phase, Ordering::Release);
    }

    #[must_use]
    pub fn freq_is_phase_word(&self) -> bool {
        self.freq_is_phase.load(Ordering::Acquire)
    }

    pub fn set_min_pwm_width(&self, width: u16) {
        self.deflt.lock().pwm_min = width;
    }

    pub fn set_max_pwm_width(&self, width: u16) {
        self.deflt.lock().pwm_max = width;
    }

    pub fn set_user_output_bits(&self, bits: u8) {
        self.deflt.lock().user_output_bits = bits;
    }

    // ========================================================================
    // Status reads
    // ========================================================================

    /// Latch the status register. Call once per outgoing frame; the read
    /// clears side-effect bits, so it takes the default lock.
    pub fn read_status_register(&self) -> Result<()> {
        let _guard = self.deflt.lock();
        let value = self.bus.read32(ADDR_STATUS)?;
        self.status.store(value, Ordering::Release);
        Ok(())
    }

    #[must_use]
    pub fn ptt_input(&self) -> bool {
        self.status.load(Ordering::Acquire) & 1 != 0
    }

    #[must_use]
    pub fn keyer_dot_input(&self) -> bool {
        (self.status.load(Ordering::Acquire) >> STATUS_KEY_DOT) & 1 != 0
    }

    #[must_use]
    pub fn keyer_dash_input(&self) -> bool {
        (self.status.load(Ordering::Acquire) >> STATUS_KEY_DASH) & 1 != 0
    }

    #[must_use]
    pub fn cw_key_down(&self) -> bool {
        (self.status.load(Ordering::Acquire) >> STATUS_CW_KEY_DOWN) & 1 != 0
    }

    /// Composite PTT/key input byte for the outgoing high-priority frame:
    /// bit 0 PTT or keyer key-down, bit 1 dot, bit 2 dash or IO8,
    /// bit 4 PLL locked. PTT and key inputs are inverted by hardware;
    /// IO8 is not.
    #[must_use]
    pub fn p2_ptt_key_inputs(&self) -> u8 {
        let status = self.status.load(Ordering::Acquire);
        let mut result = 0u8;
        if status & 1 != 0 {
            result |= 1;
        }
        if (status >> STATUS_CW_KEY_DOWN) & 1 != 0 {
            result |= 1;
        }
        if (status >> STATUS_KEY_DOT) & 1 != 0 {
            result |= 2;
        }
        if (status >> STATUS_KEY_DASH) & 1 != 0 {
            result |= 4;
        }
        if (status >> STATUS_USER_IO8) & 1 == 0 {
            result |= 4;
        }
        if (status >> STATUS_PLL_LOCKED) & 1 != 0 {
            result |= 16;
        }
        result
    }

    /// ADC amplitude overflow flags since the last read (bit 0 ADC1, bit 1
    /// ADC2). The stored state clears on read.
    pub fn adc_overflow(&self) -> Result<u8> {
        let _guard = self.deflt.lock();
        Ok((self.bus.read32(ADDR_ADC_OVERFLOW)? & 0x3) as u8)
    }

    /// User input bits: IO4 in bit 0, IO5 in bit 1, the ATU-tune-complete
    /// flag in the IO6 slot, IO8 (inverted, active low) in bit 3.
    #[must_use]
    pub fn user_io_bits(&self) -> u8 {
        let status = self.status.load(Ordering::Acquire);
        let mut result = ((status >> STATUS_USER_IO4) & 0b1011) as u8;
        result ^= 0x8;
        result |= ((status >> 7) & 0b0100) as u8;
        result
    }

    /// One of the six RF-board analogue inputs (forward/reverse power,
    /// exciter power, supply volts, two auxiliary).
    pub fn analogue_in(&self, select: u8) -> Result<u16> {
        let select = u32::from(select & 7);
        let _guard = self.deflt.lock();
        Ok((self.bus.read32(ADDR_ALEX_ADC_BASE + 4 * select)? & 0xFFFF) as u16)
    }
}

/// Set or clear a single bit.
#[inline]
fn set_bit(value: u32, bit: u32, on: bool) -> u32 {
    if on {
        value | (1u32 << bit)
    } else {
        value & !(1u32 << bit)
    }
}

// ===== Tests =====

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hw::xdma::MemWindow;

    pub(crate) fn bank_with_fw(version: u16) -> (Arc<MemWindow>, RegisterBank) {
        let win = Arc::new(MemWindow::new());
        win.poke(ADDR_SW_VERSION, u32::from(version) << 4);
        let bank = RegisterBank::new(win.clone()).expect("bank");
        win.clear_journal();
        (win, bank)
    }

    #[test]
    fn fifo_depth_table_by_firmware() {
        assert_eq!(RegisterBank::fifo_depths_for(12), [16384, 2048, 256, 1024]);
        assert_eq!(RegisterBank::fifo_depths_for(13), [16384, 4096, 256, 1024]);
        assert_eq!(RegisterBank::fifo_depths_for(9), [0; 4]);
    }

    #[test]
    fn mox_toggle_restores_gpio_exactly() {
        let (win, bank) = bank_with_fw(14);
        bank.set_byte_swapping(true).expect("swap");
        bank.set_spkr_mute(false).expect("mute");
        let before = win.peek(ADDR_RF_GPIO);
        bank.set_mox(true).expect("mox on");
        assert_eq!(win.peek(ADDR_RF_GPIO), before | (1 << GPIO_MOX));
        bank.set_mox(false).expect("mox off");
        assert_eq!(win.peek(ADDR_RF_GPIO), before);
    }

    #[test]
    fn ddc_rate_register_encoding_and_commit() {
        let (win, bank) = bank_with_fw(14);
        bank.set_p2_sample_rate(0, true, 192, false);
        bank.set_p2_sample_rate(1, true, 48, false);
        bank.set_p2_sample_rate(2, true, 1536, false);
        bank.set_p2_sample_rate(3, false, 0, false);
        bank.set_p2_sample_rate(4, true, 384, true); // interleave overrides rate
        let changed = bank.write_ddc_rate_register().expect("commit");
        assert!(changed);
        let value = win.peek(ADDR_DDC_RATES);
        assert_eq!(value & 0x7, SampleRateCode::R192 as u32);
        assert_eq!((value >> 3) & 0x7, SampleRateCode::R48 as u32);
        assert_eq!((value >> 6) & 0x7, SampleRateCode::R1536 as u32);
        assert_eq!((value >> 9) & 0x7, 0);
        assert_eq!((value >> 12) & 0x7, SampleRateCode::InterleaveWithNext as u32);
        assert_eq!(bank.ddc_enables() & 0x1F, 0b10111);
        // a single hardware commit for the whole map
        assert_eq!(win.writes_to(ADDR_DDC_RATES), 1);
    }

    #[test]
    fn ddc_rate_commit_idempotent_second_time() {
        let (_win, bank) = bank_with_fw(14);
        bank.set_p2_sample_rate(0, true, 96, false);
        assert!(bank.write_ddc_rate_register().expect("first"));
        bank.set_p2_sample_rate(0, true, 96, false);
        assert!(!bank.write_ddc_rate_register().expect("second"));
    }

    #[test]
    fn p1_rate_replication() {
        let (_win, bank) = bank_with_fw(14);
        bank.set_p1_sample_rate(SampleRateCode::R192, 3);
        // four slots (count+1) carry the rate code
        let value = bank.deflt.lock().ddc_rate_reg;
        for ddc in 0..4 {
            assert_eq!((value >> (ddc * 3)) & 0x7, SampleRateCode::R192 as u32);
        }
        assert_eq!(value >> 12, 0);
    }

    #[test]
    fn ddc_frequency_write_once_per_value() {
        let (win, bank) = bank_with_fw(14);
        bank.set_ddc_frequency(3, 0x1000_0000, true).expect("freq");
        bank.set_ddc_frequency(3, 0x1000_0000, true).expect("freq repeat");
        assert_eq!(win.peek(ADDR_DDC_FREQ[3]), 0x1000_0000);
        assert_eq!(win.writes_to(ADDR_DDC_FREQ[3]), 1);
    }

    #[test]
    fn hz_to_delta_phase_conversion() {
        let (win, bank) = bank_with_fw(14);
        // 12.288 MHz = Fs/10 -> 2^32/10
        bank.set_ddc_frequency(0, 12_288_000, false).expect("freq");
        let phase = win.peek(ADDR_DDC_FREQ[0]);
        assert_eq!(phase, 429_496_729);
    }

    #[test]
    fn alex_tx_registers_firmware12_split() {
        let (win, bank) = bank_with_fw(12);
        bank.enable_alex_manual_filter_select(true);
        bank.alex_manual_tx_filters(0x0105, true).expect("tx ant");
        bank.alex_manual_tx_filters(0x0005, false).expect("legacy");
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_TX_ANT), 0x0105);
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_TX_FILTER), 0x0005);
    }

    #[test]
    fn alex_rx_word_halves() {
        let (win, bank) = bank_with_fw(14);
        bank.enable_alex_manual_filter_select(true);
        bank.alex_manual_rx_filters(0x1234, 0).expect("rx1");
        bank.alex_manual_rx_filters(0xABCD, 2).expect("rx2");
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_RX), 0xABCD_1234);
    }

    #[test]
    fn alex_ignored_without_manual_select() {
        let (win, bank) = bank_with_fw(14);
        bank.alex_manual_rx_filters(0x1234, 0).expect("rx1");
        assert_eq!(win.writes_to(ADDR_ALEX_SPI + ALEX_OFFSET_RX), 0);
    }

    #[test]
    fn drive_level_packs_rom_values() {
        let (win, bank) = bank_with_fw(14);
        bank.set_tx_drive_level(0).expect("drive");
        assert_eq!(win.peek(ADDR_DAC_CTRL), (63 << 16) | (63 << 24));
        bank.set_tx_drive_level(255).expect("drive");
        assert_eq!(win.peek(ADDR_DAC_CTRL), 255 | (255 << 8));
    }

    #[test]
    fn adc_attenuator_fields() {
        let (win, bank) = bank_with_fw(14);
        bank.set_adc_attenuator(AdcSelect::Adc1, 31, true, false).expect("rx1");
        bank.set_adc_attenuator(AdcSelect::Adc2, 5, false, true).expect("tx2");
        let value = win.peek(ADDR_ADC_CTRL);
        assert_eq!(value & 0x1F, 31);
        assert_eq!((value >> 15) & 0x1F, 5);
    }

    #[test]
    fn ramp_regeneration_skipped_when_unchanged() {
        let (win, bank) = bank_with_fw(14);
        bank.initialise_cw_keyer_ramp(true, 5_000).expect("ramp");
        let writes = win.writes_to(ADDR_CW_KEYER_RAM);
        assert_eq!(writes, 1, "first RAM word written once");
        assert_eq!(
            win.journal().len(),
            RAMP_RAM_WORDS + 1,
            "full RAM fill plus keyer config"
        );
        win.clear_journal();
        bank.initialise_cw_keyer_ramp(true, 5_000).expect("ramp again");
        assert!(win.journal().is_empty(), "unchanged ramp not rewritten");
        // a different protocol regenerates
        bank.initialise_cw_keyer_ramp(false, 5_000).expect("ramp p1");
        assert!(!win.journal().is_empty());
    }

    #[test]
    fn ramp_length_field_word_vs_byte_addressing() {
        let (win, bank) = bank_with_fw(14);
        bank.initialise_cw_keyer_ramp(true, 5_000).expect("ramp");
        let n = ramp::sample_count(true, 5_000);
        let keyer = win.peek(ADDR_KEYER_CONFIG);
        assert_eq!((keyer >> KEYER_RAMP_SHIFT) & 0x1FFF, n);

        let (win13, bank13) = bank_with_fw(13);
        bank13.initialise_cw_keyer_ramp(true, 5_000).expect("ramp");
        let keyer13 = win13.peek(ADDR_KEYER_CONFIG);
        assert_eq!((keyer13 >> KEYER_RAMP_SHIFT) & 0x3FFF, n << 2);
    }

    #[test]
    fn cw_enable_switches_modulation_source_and_keyer() {
        let (win, bank) = bank_with_fw(14);
        bank.enable_cw(true, true).expect("cw on");
        assert_eq!(
            win.peek(ADDR_TX_CONFIG) & 0x3,
            TxModulationSource::CwKeyer as u32
        );
        assert_ne!(win.peek(ADDR_KEYER_CONFIG) & (1 << KEYER_ENABLE), 0);
        bank.enable_cw(false, false).expect("cw off");
        assert_eq!(
            win.peek(ADDR_TX_CONFIG) & 0x3,
            TxModulationSource::IqData as u32
        );
        assert_eq!(win.peek(ADDR_KEYER_CONFIG) & (1 << KEYER_ENABLE), 0);
    }

    #[test]
    fn sidetone_volume_gated_by_enable() {
        let (win, bank) = bank_with_fw(14);
        bank.set_cw_sidetone_vol(0x55).expect("vol");
        assert_eq!(win.peek(ADDR_CODEC_CONFIG) >> 24, 0);
        bank.set_cw_sidetone_enabled(true).expect("enable");
        assert_eq!(win.peek(ADDR_CODEC_CONFIG) >> 24, 0x55);
    }

    #[test]
    fn sidetone_frequency_dds_word() {
        let (win, bank) = bank_with_fw(14);
        bank.set_cw_sidetone_frequency(600).expect("freq");
        // 65536 * 600 / 48000 = 819.2 -> 819
        assert_eq!(win.peek(ADDR_CODEC_CONFIG) & 0xFFFF, 819);
    }

    #[test]
    fn p2_ptt_key_inputs_composition() {
        let (win, bank) = bank_with_fw(14);
        // PTT + PLL locked + IO8 high (inactive)
        win.poke(
            ADDR_STATUS,
            1 | (1 << STATUS_PLL_LOCKED) | (1 << STATUS_USER_IO8),
        );
        bank.read_status_register().expect("latch");
        assert_eq!(bank.p2_ptt_key_inputs(), 0b1_0001);
        // CW key down alone also declares PTT; IO8 low sets the dash bit
        win.poke(ADDR_STATUS, 1 << STATUS_CW_KEY_DOWN);
        bank.read_status_register().expect("latch");
        assert_eq!(bank.p2_ptt_key_inputs(), 0b0101);
    }

    #[test]
    fn user_io_bits_inversion_and_atu_slot() {
        let (win, bank) = bank_with_fw(14);
        win.poke(
            ADDR_STATUS,
            (1 << STATUS_USER_IO4) | (1 << STATUS_USER_IO8) | (1 << STATUS_ATU_TUNE_COMPLETE),
        );
        bank.read_status_register().expect("latch");
        // IO4 set, IO8 set -> inverted to 0, ATU complete lands in bit 2
        assert_eq!(bank.user_io_bits(), 0b0101);
    }

    #[test]
    fn test_dds_override_forces_all_ddcs() {
        let (win, bank) = bank_with_fw(14);
        bank.set_rx_ddc_enabled(true).expect("enable");
        bank.use_test_dds_source().expect("override");
        assert_eq!(win.peek(ADDR_DDC_IN_SEL), 0x400A_AAAA);
        // later ADC selections stay pinned to the test source
        bank.set_ddc_adc(0, AdcSelect::Adc1).expect("adc");
        assert_eq!(win.peek(ADDR_DDC_IN_SEL) & 0x3, AdcSelect::TestSource as u32);
    }

    #[test]
    fn codec_writes_deduplicated() {
        let (win, bank) = bank_with_fw(14);
        bank.set_mic_boost(true).expect("boost");
        bank.set_mic_boost(true).expect("boost repeat");
        assert_eq!(win.writes_to(ADDR_CODEC_SPI), 1);
        let value = win.peek(ADDR_CODEC_SPI);
        assert_eq!(value, (CODEC_ANALOGUE_PATH << 9) | 1);
    }
}
