// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Inbound high-priority listener.
//!
//! Carries the run bit (session Armed -> Active and Active -> Draining),
//! the MOX bit, every DDC frequency, DUC frequency and drive, the Alex
//! filter/antenna words, RX attenuators, CWX keying, and the CAT bridge
//! port.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT};
use super::{recv_packet, EngineShared, RecvOutcome};
use crate::config::{EP_HIGH_PRIORITY_IN, HIGH_PRIORITY_IN_SIZE, NUM_DDC};
use crate::error::Result;
use crate::hw::AdcSelect;
use crate::protocol::high_priority;
use std::net::UdpSocket;
use std::sync::Arc;

pub fn run(engine: &Arc<EngineShared>, socket: UdpSocket) {
    if let Err(err) = serve(engine, socket) {
        log::error!("[hp-in] {}", err);
        engine.session.report_thread_error("high priority in");
    }
    engine.endpoints.get(EP_HIGH_PRIORITY_IN).set_active(false);
}

fn serve(engine: &Arc<EngineShared>, mut socket: UdpSocket) -> Result<()> {
    let ep = engine.endpoints.get(EP_HIGH_PRIORITY_IN);
    ep.set_active(true);
    log::info!("[hp-in] listening on port {}", ep.port());

    let mut buf = [0u8; HIGH_PRIORITY_IN_SIZE];
    loop {
        if engine.session.exit_requested() {
            return Ok(());
        }
        match recv_packet(&socket, &mut buf, "high priority in")? {
            RecvOutcome::TimedOut => {
                if ep.take_command(CMD_CHANGE_PORT) {
                    socket = make_udp_socket(ep.port(), "high priority in")?;
                    log::info!("[hp-in] rebound to port {}", ep.port());
                }
            }
            RecvOutcome::Packet(n) if n == HIGH_PRIORITY_IN_SIZE => {
                engine.session.note_message();
                handle(engine, &buf)?;
            }
            RecvOutcome::Packet(_) => {}
        }
    }
}

/// Apply one decoded high-priority packet.
pub fn handle(engine: &Arc<EngineShared>, buf: &[u8]) -> Result<()> {
    let pkt = high_priority::parse(buf);
    let bank = &engine.bank;
    let session = &engine.session;

    if pkt.run {
        session.set_start_bit(true);
        session.try_activate(bank)?;
    } else if session.is_active() {
        log::info!("[hp-in] set to inactive by client");
        session.set_start_bit(false);
        session.drain(bank)?;
    } else {
        session.set_start_bit(false);
    }

    session.set_tx_mode(pkt.mox);
    bank.set_mox(pkt.mox)?;

    for (i, phase) in pkt.ddc_phase.iter().enumerate().take(NUM_DDC) {
        bank.set_ddc_frequency(i, *phase, true)?;
    }
    bank.set_duc_frequency(pkt.duc_phase, true)?;
    bank.set_tx_drive_level(pkt.drive_level)?;

    // CAT bridge follows the advertised port; zero tears it down
    if pkt.cat_port != 0 {
        engine.cat.setup_port(engine, pkt.cat_port);
    } else if engine.cat.port_assigned() {
        engine.cat.shutdown();
    }

    bank.set_xvtr_enable(pkt.xvtr_enable)?;
    bank.set_spkr_mute(pkt.spkr_mute)?;
    bank.set_open_collector_outputs(pkt.open_collector)?;
    bank.set_user_output_bits(pkt.user_outputs);

    apply_alex(engine, &pkt)?;

    bank.set_adc_attenuator(AdcSelect::Adc1, pkt.adc1_rx_atten, true, false)?;
    bank.set_adc_attenuator(AdcSelect::Adc2, pkt.adc2_rx_atten, true, false)?;

    bank.set_cwx_bits(pkt.cwx_enabled, pkt.cwx_dash, pkt.cwx_dot)?;
    Ok(())
}

/// Alex word routing is firmware-version specific: from FW 12 a separate
/// TX-antenna register exists. A client that sets TX antenna bits in the
/// word at 1428 targets the new register (and the legacy word still lands
/// in the original register); a legacy client's word at 1432 is written to
/// both. Pre-12 firmware only has the legacy register.
fn apply_alex(engine: &EngineShared, pkt: &high_priority::HighPriorityIn) -> Result<()> {
    let bank = &engine.bank;
    let fw = bank.firmware_version();

    if fw >= 12 && pkt.tx_ant_bits() != 0 {
        bank.alex_manual_tx_filters(pkt.alex_tx_ant_word, true)?;
        bank.alex_manual_tx_filters(pkt.alex_legacy_tx_word, false)?;
    } else if fw >= 12 {
        bank.alex_manual_tx_filters(pkt.alex_legacy_tx_word, true)?;
        bank.alex_manual_tx_filters(pkt.alex_legacy_tx_word, false)?;
    } else {
        bank.alex_manual_tx_filters(pkt.alex_legacy_tx_word, false)?;
    }

    bank.alex_manual_rx_filters(pkt.alex_rx2_word, 2)?;
    bank.alex_manual_rx_filters(pkt.alex_rx1_word, 0)?;
    Ok(())
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::SessionState;
    use crate::hw::regmap::{
        ADDR_ALEX_SPI, ADDR_DDC_FREQ, ALEX_OFFSET_TX_ANT, ALEX_OFFSET_TX_FILTER,
    };
    use crate::hw::registers::tests::bank_with_fw;
    use crate::protocol::byteio::{wr_be_u16, wr_be_u32};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn engine_with_fw(version: u16) -> (Arc<crate::hw::MemWindow>, Arc<EngineShared>) {
        let (win, bank) = bank_with_fw(version);
        (win, EngineShared::new(Arc::new(bank)))
    }

    fn packet(run: bool) -> Vec<u8> {
        let mut buf = vec![0u8; HIGH_PRIORITY_IN_SIZE];
        if run {
            buf[4] = 1;
        }
        buf
    }

    #[test]
    fn run_bit_with_armed_session_activates() {
        let (_win, engine) = engine_with_fw(14);
        engine.session.arm(Ipv4Addr::LOCALHOST);

        let mut buf = packet(true);
        wr_be_u32(&mut buf, 9, 0x1000_0000);
        handle(&engine, &buf).expect("handle");
        assert_eq!(engine.session.state(), SessionState::Active);
        assert_eq!(engine.bank.ddc_frequency(0), 0x1000_0000);

        // run=0 drains to Idle and releases the reply address
        let buf = packet(false);
        handle(&engine, &buf).expect("handle");
        assert_eq!(engine.session.state(), SessionState::Idle);
        assert!(engine.session.reply_ip().is_none());
        // frequency survives deactivation
        assert_eq!(engine.bank.ddc_frequency(0), 0x1000_0000);
    }

    #[test]
    fn run_bit_alone_does_not_activate() {
        let (_win, engine) = engine_with_fw(14);
        let buf = packet(true);
        handle(&engine, &buf).expect("handle");
        assert_eq!(engine.session.state(), SessionState::Idle);
    }

    #[test]
    fn alex_new_layout_with_tx_ant_bits() {
        let (win, engine) = engine_with_fw(12);
        engine.bank.enable_alex_manual_filter_select(true);
        let mut buf = packet(false);
        wr_be_u16(&mut buf, 1428, 0x0105); // TX ant 0b001, filter 0x05
        wr_be_u16(&mut buf, 1432, 0x0005);
        handle(&engine, &buf).expect("handle");
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_TX_ANT), 0x0105);
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_TX_FILTER), 0x0005);
    }

    #[test]
    fn alex_legacy_word_feeds_both_registers_without_tx_ant_bits() {
        let (win, engine) = engine_with_fw(12);
        engine.bank.enable_alex_manual_filter_select(true);
        let mut buf = packet(false);
        wr_be_u16(&mut buf, 1432, 0x0123);
        handle(&engine, &buf).expect("handle");
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_TX_ANT), 0x0123);
        assert_eq!(win.peek(ADDR_ALEX_SPI + ALEX_OFFSET_TX_FILTER), 0x0123);
    }

    #[test]
    fn all_ddc_frequencies_written() {
        let (win, engine) = engine_with_fw(14);
        let mut buf = packet(false);
        for i in 0..NUM_DDC {
            wr_be_u32(&mut buf, 9 + i * 4, 0x0100_0000 + i as u32);
        }
        handle(&engine, &buf).expect("handle");
        for i in 0..NUM_DDC {
            assert_eq!(win.peek(ADDR_DDC_FREQ[i]), 0x0100_0000 + i as u32);
        }
    }
}
