// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Global configuration: protocol constants, port table, device paths.
//!
//! This module centralizes the protocol-2 endpoint numbering and the XDMA
//! device topology. Never hardcode these elsewhere.

// =======================================================================
// Endpoint table indices (openHPSDR Ethernet Protocol V3.8)
//
// Port 1024 carries discovery and the general packet; the remaining
// endpoints each get their own UDP stream. An endpoint's assigned port may
// be rebound at runtime by the general packet.
// =======================================================================

/// Number of endpoint table entries.
pub const ENDPOINT_COUNT: usize = 20;

/// Number of down-converters.
pub const NUM_DDC: usize = 10;

/// Number of wideband-capable ADCs.
pub const NUM_WB_ADC: usize = 2;

// incoming endpoints
pub const EP_COMMAND: usize = 0;
pub const EP_DDC_SPECIFIC: usize = 1;
pub const EP_DUC_SPECIFIC: usize = 2;
pub const EP_HIGH_PRIORITY_IN: usize = 3;
pub const EP_SPKR_AUDIO: usize = 4;
pub const EP_DUC_IQ: usize = 5;
// outgoing endpoints
pub const EP_HIGH_PRIORITY_OUT: usize = 6;
pub const EP_MIC_AUDIO: usize = 7;
pub const EP_DDC_IQ_0: usize = 8;
pub const EP_WIDEBAND_0: usize = 18;

/// Default port for each endpoint, used when the general packet carries 0.
pub const DEFAULT_PORTS: [u16; ENDPOINT_COUNT] = [
    1024, 1025, 1026, 1027, 1028, // command..speaker
    1029, 1025, 1026, 1035, 1036, // DUC I/Q, HP out, mic, DDC I/Q 0-1
    1037, 1038, 1039, 1040, 1041, // DDC I/Q 2-6
    1042, 1043, 1044, 1027, 1028, // DDC I/Q 7-9, wideband 0-1
];

/// Display names for the endpoint table, used in logs.
pub const ENDPOINT_NAMES: [&str; ENDPOINT_COUNT] = [
    "Cmd",
    "DDC Specific",
    "DUC Specific",
    "High Priority In",
    "Spkr Audio",
    "DUC I/Q",
    "High Priority Out",
    "Mic Audio",
    "DDC I/Q 0",
    "DDC I/Q 1",
    "DDC I/Q 2",
    "DDC I/Q 3",
    "DDC I/Q 4",
    "DDC I/Q 5",
    "DDC I/Q 6",
    "DDC I/Q 7",
    "DDC I/Q 8",
    "DDC I/Q 9",
    "Wideband 0",
    "Wideband 1",
];

// =======================================================================
// Fixed packet sizes. Packets of the wrong length are silently dropped.
// =======================================================================

pub const GENERAL_PACKET_SIZE: usize = 60;
pub const DISCOVERY_REPLY_SIZE: usize = 60;
pub const DDC_SPECIFIC_SIZE: usize = 1444;
pub const DUC_SPECIFIC_SIZE: usize = 60;
pub const HIGH_PRIORITY_IN_SIZE: usize = 1444;
pub const HIGH_PRIORITY_OUT_SIZE: usize = 60;
pub const SPEAKER_AUDIO_SIZE: usize = 260;
pub const DUC_IQ_SIZE: usize = 1444;
pub const DDC_IQ_SIZE: usize = 1444;
pub const MIC_PACKET_SIZE: usize = 132;
/// Wideband packet length varies with the commanded samples-per-packet;
/// this is the UDP-safe maximum.
pub const WIDEBAND_MAX_PACKET_SIZE: usize = 1500;

// =======================================================================
// Identification, reported in discovery replies
// =======================================================================

/// Board id byte: Saturn.
pub const BOARD_ID_SATURN: u8 = 10;
/// Board id byte: Orion Mk 2.
pub const BOARD_ID_ORION_MK2: u8 = 5;
/// Protocol version byte (3.8 -> 39).
pub const PROTOCOL_VERSION: u8 = 39;
/// Reported firmware version; >17 enables QSK in clients.
pub const REPORTED_FIRMWARE_VERSION: u8 = 20;
/// DDC count reported in discovery (protocol field, not the datapath count).
pub const REPORTED_DDC_COUNT: u8 = 4;

// =======================================================================
// XDMA device topology
// =======================================================================

/// Register window character device (4-byte pread/pwrite).
pub const REGISTER_DEVICE: &str = "/dev/xdma0_user";
/// DDC I/Q sample stream, FPGA to host.
pub const DDC_DMA_DEVICE: &str = "/dev/xdma0_c2h_0";
/// Mic sample stream, FPGA to host (shared with wideband capture).
pub const MIC_DMA_DEVICE: &str = "/dev/xdma0_c2h_1";
/// DUC I/Q sample stream, host to FPGA.
pub const DUC_DMA_DEVICE: &str = "/dev/xdma0_h2c_0";
/// Speaker sample stream, host to FPGA.
pub const SPKR_DMA_DEVICE: &str = "/dev/xdma0_h2c_1";

/// AXI offsets of the stream reader/writer IPs.
pub const AXI_DDC_STREAM_READ: u64 = 0x0;
pub const AXI_DUC_STREAM_WRITE: u64 = 0x0;
pub const AXI_MIC_STREAM_READ: u64 = 0x40000;
pub const AXI_SPKR_STREAM_WRITE: u64 = 0x40000;
pub const AXI_WIDEBAND_READ: u64 = 0x80000;

// =======================================================================
// Misc engine constants
// =======================================================================

/// TX amplitude scale applied post-DUC: 18-bit value, half of full scale.
pub const TX_AMPL_SCALE_FACTOR: u32 = 0x0001_FFFF;

/// Packets received after session activation before under/overflow
/// reporting is believed (FIFO levels settle during the first ~100 ms).
pub const STARTUP_GRACE_PACKETS: u32 = 100;

/// ADC sample clock, Hz. Used for Hz -> delta-phase conversion.
pub const SAMPLE_CLOCK_HZ: f64 = 122_880_000.0;
