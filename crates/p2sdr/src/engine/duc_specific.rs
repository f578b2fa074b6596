// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Inbound DUC-specific (TX specific) listener: keyer, CW, sidetone and
//! microphone path configuration.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT};
use super::{recv_packet, EngineShared, RecvOutcome};
use crate::config::{DUC_SPECIFIC_SIZE, EP_DUC_SPECIFIC};
use crate::error::Result;
use crate::hw::AdcSelect;
use crate::protocol::duc;
use std::net::UdpSocket;

pub fn run(engine: &EngineShared, socket: UdpSocket) {
    if let Err(err) = serve(engine, socket) {
        log::error!("[duc-specific] {}", err);
        engine.session.report_thread_error("DUC specific");
    }
    engine.endpoints.get(EP_DUC_SPECIFIC).set_active(false);
}

fn serve(engine: &EngineShared, mut socket: UdpSocket) -> Result<()> {
    let ep = engine.endpoints.get(EP_DUC_SPECIFIC);
    ep.set_active(true);
    log::info!("[duc-specific] listening on port {}", ep.port());

    let mut buf = [0u8; DUC_SPECIFIC_SIZE];
    loop {
        if engine.session.exit_requested() {
            return Ok(());
        }
        match recv_packet(&socket, &mut buf, "DUC specific")? {
            RecvOutcome::TimedOut => {
                if ep.take_command(CMD_CHANGE_PORT) {
                    socket = make_udp_socket(ep.port(), "DUC specific")?;
                    log::info!("[duc-specific] rebound to port {}", ep.port());
                }
            }
            RecvOutcome::Packet(n) if n == DUC_SPECIFIC_SIZE => {
                engine.session.note_message();
                handle(engine, &buf)?;
            }
            RecvOutcome::Packet(_) => {}
        }
    }
}

/// Apply one decoded DUC-specific packet.
pub fn handle(engine: &EngineShared, buf: &[u8]) -> Result<()> {
    let pkt = duc::parse(buf);
    let bank = &engine.bank;

    bank.set_cw_iambic_keyer(
        pkt.iambic_speed_wpm,
        pkt.iambic_weight,
        pkt.reversed_paddle,
        pkt.keyer_mode_b,
        pkt.strict_spacing,
        pkt.iambic_enabled,
        pkt.breakin,
    )?;
    bank.set_cw_sidetone_enabled(pkt.sidetone_enabled)?;
    bank.enable_cw(pkt.cw_enabled, pkt.breakin)?;
    bank.set_cw_sidetone_vol(pkt.sidetone_volume)?;
    bank.set_cw_sidetone_frequency(pkt.sidetone_freq_hz)?;
    bank.set_cw_ptt_delay(pkt.cw_ptt_delay_ms)?;
    bank.set_cw_hang_time(pkt.cw_hang_time_ms)?;
    if pkt.cw_ramp_ms != 0 {
        // client supports the ramp field: regenerate at the 192 kHz rate
        bank.initialise_cw_keyer_ramp(true, 1000 * u32::from(pkt.cw_ramp_ms))?;
    }

    bank.set_mic_boost(pkt.mic_boost)?;
    bank.set_mic_line_input(pkt.mic_line_input)?;
    bank.set_orion_mic_options(pkt.mic_ring, pkt.mic_bias, pkt.mic_ptt_enabled)?;
    bank.set_balanced_mic_input(pkt.balanced_mic)?;
    bank.set_codec_line_in_gain(pkt.line_in_gain)?;
    bank.set_adc_attenuator(AdcSelect::Adc2, pkt.adc2_tx_atten, false, true)?;
    bank.set_adc_attenuator(AdcSelect::Adc1, pkt.adc1_tx_atten, false, true)?;
    Ok(())
}

// ===== Tests =====
