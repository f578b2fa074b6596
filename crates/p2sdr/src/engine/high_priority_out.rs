// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Outbound high-priority sender.
//!
//! While the session is Active, a 60-byte status frame goes to the client
//! every 50 ms: PTT/key/PLL bits and user I/O from one latched
//! status-register read, ADC overflow flags (with any latched FIFO trouble
//! bits), and the six analogue inputs.

use super::endpoints::CMD_CHANGE_PORT;
use super::EngineShared;
use crate::config::{EP_HIGH_PRIORITY_OUT, HIGH_PRIORITY_OUT_SIZE};
use crate::error::{Error, Result};
use crate::protocol::high_priority::{build_outbound, OutboundStatus};
use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

pub fn run(engine: &EngineShared, socket: UdpSocket) {
    if let Err(err) = serve(engine, &socket) {
        log::error!("[hp-out] {}", err);
        engine.session.report_thread_error("high priority out");
    }
    engine.endpoints.get(EP_HIGH_PRIORITY_OUT).set_active(false);
}

fn serve(engine: &EngineShared, socket: &UdpSocket) -> Result<()> {
    let ep = engine.endpoints.get(EP_HIGH_PRIORITY_OUT);
    ep.set_active(true);
    log::info!("[hp-out] sender ready, port {}", ep.port());

    loop {
        // wait for session activation
        while !engine.session.is_active() {
            if engine.session.exit_requested() {
                return Ok(());
            }
            // destination is re-read at activation; just consume the bit
            let _ = ep.take_command(CMD_CHANGE_PORT);
            std::thread::sleep(Duration::from_micros(100));
        }

        let ip = match engine.session.reply_ip() {
            Some(ip) => ip,
            None => continue,
        };
        let dest = SocketAddrV4::new(ip, ep.port());
        let mut sequence = 0u32;
        log::info!("[hp-out] starting, dest {}", dest);

        while engine.session.is_active() && !engine.session.exit_requested() {
            let frame = compose(engine, sequence)?;
            socket
                .send_to(&frame, dest)
                .map_err(|source| Error::Transport {
                    endpoint: "high priority out",
                    source,
                })?;
            sequence = sequence.wrapping_add(1);
            std::thread::sleep(Duration::from_millis(50));
        }
        if engine.session.exit_requested() {
            return Ok(());
        }
    }
}

/// Latch the status register once and compose a frame from it.
fn compose(engine: &EngineShared, sequence: u32) -> Result<[u8; HIGH_PRIORITY_OUT_SIZE]> {
    let bank = &engine.bank;
    bank.read_status_register()?;
    let status = OutboundStatus {
        ptt_key_bits: bank.p2_ptt_key_inputs(),
        adc_overflow: bank.adc_overflow()? | engine.session.take_fifo_overflows(),
        exciter_power: bank.analogue_in(4)?,
        forward_power: bank.analogue_in(0)?,
        reverse_power: bank.analogue_in(1)?,
        supply_voltage: bank.analogue_in(5)?,
        ain3: bank.analogue_in(2)?,
        ain4: bank.analogue_in(3)?,
        user_io: bank.user_io_bits(),
    };
    Ok(build_outbound(sequence, &status))
}
