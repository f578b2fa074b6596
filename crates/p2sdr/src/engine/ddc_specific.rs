// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Inbound DDC-specific listener.
//!
//! Applies ADC options and the complete DDC configuration. The local DDC
//! rate map is staged for all ten DDCs and then committed to hardware in a
//! single register write, so the FPGA never observes a partial
//! configuration. When the commit changed hardware state, the per-DDC
//! endpoint flags (enable / interleave / rate) are re-derived for the
//! outbound I/Q router.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT, CMD_DDC_ENABLE, CMD_INTERLEAVE};
use super::{recv_packet, EngineShared, RecvOutcome};
use crate::config::{DDC_SPECIFIC_SIZE, EP_DDC_IQ_0, EP_DDC_SPECIFIC};
use crate::error::Result;
use crate::hw::AdcSelect;
use crate::protocol::ddc;
use std::net::UdpSocket;

pub fn run(engine: &EngineShared, socket: UdpSocket) {
    if let Err(err) = serve(engine, socket) {
        log::error!("[ddc-specific] {}", err);
        engine.session.report_thread_error("DDC specific");
    }
    engine.endpoints.get(EP_DDC_SPECIFIC).set_active(false);
}

fn serve(engine: &EngineShared, mut socket: UdpSocket) -> Result<()> {
    let ep = engine.endpoints.get(EP_DDC_SPECIFIC);
    ep.set_active(true);
    log::info!("[ddc-specific] listening on port {}", ep.port());

    let mut buf = [0u8; DDC_SPECIFIC_SIZE];
    loop {
        if engine.session.exit_requested() {
            return Ok(());
        }
        match recv_packet(&socket, &mut buf, "DDC specific")? {
            RecvOutcome::TimedOut => {
                if ep.take_command(CMD_CHANGE_PORT) {
                    socket = make_udp_socket(ep.port(), "DDC specific")?;
                    log::info!("[ddc-specific] rebound to port {}", ep.port());
                }
            }
            RecvOutcome::Packet(n) if n == DDC_SPECIFIC_SIZE => {
                engine.session.note_message();
                handle(engine, &buf)?;
            }
            RecvOutcome::Packet(_) => {} // wrong length: dropped
        }
    }
}

/// Apply one decoded DDC-specific packet to the hardware and the endpoint
/// table.
pub fn handle(engine: &EngineShared, buf: &[u8]) -> Result<()> {
    let pkt = ddc::parse(buf);
    let bank = &engine.bank;

    bank.set_adc_count(u32::from(pkt.adc_count));
    bank.set_adc_options(AdcSelect::Adc1, false, pkt.adc_dither[0], pkt.adc_random[0])?;
    bank.set_adc_options(AdcSelect::Adc2, false, pkt.adc_dither[1], pkt.adc_random[1])?;

    let mut adcs = [crate::hw::AdcSelect::Adc1; crate::config::NUM_DDC];
    for (i, cfg) in pkt.ddcs.iter().enumerate() {
        bank.set_ddc_sample_size(i, cfg.sample_size_bits);
        adcs[i] = cfg.adc;
        bank.set_p2_sample_rate(i, cfg.enabled, cfg.rate_khz, cfg.interleaved);
    }
    // single-commit writes: the full source map, then the full rate map
    bank.set_ddc_adcs(&adcs)?;
    if bank.write_ddc_rate_register()? {
        refresh_endpoint_flags(engine, &pkt);
    }
    Ok(())
}

/// Re-derive the outbound DDC I/Q endpoint flags after a rate map change.
fn refresh_endpoint_flags(engine: &EngineShared, pkt: &ddc::DdcSpecific) {
    for (i, cfg) in pkt.ddcs.iter().enumerate() {
        let ep = engine.endpoints.get(EP_DDC_IQ_0 + i);
        if cfg.enabled {
            ep.set_command(CMD_DDC_ENABLE);
            log::debug!("[ddc-specific] DDC {} enabled at {} kHz", i, cfg.rate_khz);
        } else {
            ep.clear_command(CMD_DDC_ENABLE);
        }
        if cfg.interleaved {
            ep.set_command(CMD_INTERLEAVE);
        } else {
            ep.clear_command(CMD_INTERLEAVE);
        }
        ep.set_ddc_sample_rate(cfg.rate_khz);
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::regmap::ADDR_DDC_RATES;
    use crate::hw::registers::tests::bank_with_fw;
    use crate::hw::SampleRateCode;
    use crate::protocol::byteio::wr_be_u16;

    fn engine_with_fw(version: u16) -> (std::sync::Arc<crate::hw::MemWindow>, std::sync::Arc<EngineShared>) {
        let (win, bank) = bank_with_fw(version);
        (win, EngineShared::new(std::sync::Arc::new(bank)))
    }

    fn packet() -> Vec<u8> {
        vec![0u8; DDC_SPECIFIC_SIZE]
    }

    #[test]
    fn interleave_pairing_sets_rate_register_and_enables() {
        let (win, engine) = engine_with_fw(14);
        let mut buf = packet();
        buf[7] = 0b01; // DDC0 enabled, DDC1 sent disabled
        wr_be_u16(&mut buf, 18, 192);
        buf[1363] = 0x02; // DDC1 synchronised to DDC0

        handle(&engine, &buf).expect("handle");

        let rates = win.peek(ADDR_DDC_RATES);
        assert_eq!(rates & 0x7, SampleRateCode::InterleaveWithNext as u32);
        assert_eq!(engine.bank.ddc_enables() & 0b11, 0b11);
        assert!(engine.endpoints.get(EP_DDC_IQ_0).has_command(CMD_INTERLEAVE));
        assert!(engine.endpoints.get(EP_DDC_IQ_0).has_command(CMD_DDC_ENABLE));
        assert!(engine
            .endpoints
            .get(EP_DDC_IQ_0 + 1)
            .has_command(CMD_DDC_ENABLE));
    }

    #[test]
    fn repeated_packet_is_idempotent_on_hardware() {
        let (win, engine) = engine_with_fw(14);
        let mut buf = packet();
        buf[7] = 0b101;
        wr_be_u16(&mut buf, 18, 384);
        wr_be_u16(&mut buf, 2 * 6 + 18, 96);

        handle(&engine, &buf).expect("first");
        let value = win.peek(ADDR_DDC_RATES);
        win.clear_journal();

        handle(&engine, &buf).expect("second");
        assert_eq!(win.peek(ADDR_DDC_RATES), value);
        // the rate register is rewritten with the identical value only
        assert_eq!(win.writes_to(ADDR_DDC_RATES), 1);
        assert_eq!(
            win.journal()
                .iter()
                .filter(|(a, _)| *a == ADDR_DDC_RATES)
                .map(|(_, v)| *v)
                .next(),
            Some(value)
        );
    }

    #[test]
    fn adc_source_map_committed_in_one_write() {
        use crate::hw::regmap::ADDR_DDC_IN_SEL;
        let (win, engine) = engine_with_fw(14);
        let mut buf = packet();
        buf[7] = 0b11;
        buf[17] = 1; // DDC0 from ADC2
        buf[6 + 17] = 2; // DDC1 from TX feedback
        wr_be_u16(&mut buf, 18, 48);
        wr_be_u16(&mut buf, 6 + 18, 48);

        handle(&engine, &buf).expect("handle");
        assert_eq!(win.writes_to(ADDR_DDC_IN_SEL), 1);
        let sel = win.peek(ADDR_DDC_IN_SEL);
        assert_eq!(sel & 0x3, 1); // ADC2
        assert_eq!((sel >> 2) & 0x3, 3); // TX samples
    }

    #[test]
    fn endpoint_rates_follow_packet() {
        let (_win, engine) = engine_with_fw(14);
        let mut buf = packet();
        buf[7] = 0b1;
        wr_be_u16(&mut buf, 18, 768);
        handle(&engine, &buf).expect("handle");
        assert_eq!(engine.endpoints.get(EP_DDC_IQ_0).ddc_sample_rate(), 768);
    }
}
