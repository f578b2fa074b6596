// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Outbound wideband senders (one thread, two ADC endpoints).
//!
//! The wideband capture IP periodically dumps a block of undecimated ADC
//! samples into a FIFO. On every parameter change the capture is stopped,
//! the FIFO drained into a discard buffer after a >= 150 us settle, the IP
//! reconfigured and restarted. When a block is ready it is DMAed out (the
//! device is shared with the mic sender) and fragmented into
//! packets-per-frame UDP messages with a short inter-packet delay so the
//! client is not swamped.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT};
use super::EngineShared;
use crate::config::{
    AXI_WIDEBAND_READ, EP_WIDEBAND_0, NUM_WB_ADC, WIDEBAND_MAX_PACKET_SIZE,
};
use crate::error::{Error, Result};
use crate::hw::xdma::DmaArena;
use crate::hw::DmaChannel;
use crate::protocol::byteio::wr_be_u32;
use crate::protocol::general::WidebandParams;
use parking_lot::Mutex;
use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Capture buffer: twice the wideband FIFO size.
const WB_BUFFER_SIZE: usize = 65536;
/// The capture inserts four 64-bit words of preamble before sample data.
const WB_DATA_OFFSET: usize = 32;

pub fn run(engine: &EngineShared, dma: &Mutex<DmaChannel>) {
    if let Err(err) = serve(engine, dma) {
        log::error!("[wideband] {}", err);
        engine.session.report_thread_error("wideband out");
    }
    for i in 0..NUM_WB_ADC {
        engine.endpoints.get(EP_WIDEBAND_0 + i).set_active(false);
    }
}

/// Read out whatever the wideband FIFO holds. Returns the number of
/// 64-bit words transferred into the arena.
fn read_fifo_content(
    engine: &EngineShared,
    dma: &Mutex<DmaChannel>,
    arena: &mut DmaArena,
) -> Result<u32> {
    let (words, _adc1, _adc2) = engine.bank.wideband_status()?;
    let words = words.min((WB_BUFFER_SIZE / 8) as u32);
    if words != 0 {
        let guard = dma.lock();
        guard.read_from(
            arena.dma_region(words as usize * 8),
            AXI_WIDEBAND_READ,
        )?;
    }
    Ok(words)
}

/// Stop capture, let any in-flight write finish, then discard the FIFO.
fn halt_and_drain(
    engine: &EngineShared,
    dma: &Mutex<DmaChannel>,
    arena: &mut DmaArena,
) -> Result<()> {
    engine.bank.set_wideband_enable(false, false, false)?;
    std::thread::sleep(Duration::from_micros(150));
    read_fifo_content(engine, dma, arena)?;
    Ok(())
}

fn serve(engine: &EngineShared, dma: &Mutex<DmaChannel>) -> Result<()> {
    let mut sockets = Vec::with_capacity(NUM_WB_ADC);
    for i in 0..NUM_WB_ADC {
        let ep = engine.endpoints.get(EP_WIDEBAND_0 + i);
        sockets.push(make_udp_socket(ep.port(), "wideband")?);
        ep.set_active(true);
    }
    log::info!("[wideband] senders ready");

    let mut arena = DmaArena::new(WB_BUFFER_SIZE);
    let mut packet = [0u8; WIDEBAND_MAX_PACKET_SIZE];
    halt_and_drain(engine, dma, &mut arena)?;

    loop {
        while !engine.session.is_active() {
            if engine.session.exit_requested() {
                return Ok(());
            }
            for (i, socket) in sockets.iter_mut().enumerate() {
                let ep = engine.endpoints.get(EP_WIDEBAND_0 + i);
                if ep.take_command(CMD_CHANGE_PORT) {
                    *socket = make_udp_socket(ep.port(), "wideband")?;
                    log::info!("[wideband] {} rebound to port {}", i, ep.port());
                }
            }
            std::thread::sleep(Duration::from_micros(100));
        }

        let ip = match engine.session.reply_ip() {
            Some(ip) => ip,
            None => continue,
        };
        let mut sequence = [0u32; NUM_WB_ADC];
        let mut params = WidebandParams::default();
        engine.wideband.mark_changed();
        log::info!("[wideband] starting outgoing data");

        while engine.session.is_active() && !engine.session.exit_requested() {
            if engine.wideband.take_changed() {
                halt_and_drain(engine, dma, &mut arena)?;
                params = engine.wideband.params();
                if params.enabled() {
                    // over-read by eight words so the last packet is whole
                    let words = (u32::from(params.samples_per_packet)
                        * u32::from(params.packets_per_frame))
                        / 4
                        + 8;
                    engine.bank.set_wideband_sample_count(words)?;
                    engine.bank.set_wideband_update_rate(params.update_rate_ms)?;
                    engine.bank.set_wideband_enable(
                        params.enables & 1 != 0,
                        params.enables & 2 != 0,
                        false,
                    )?;
                    log::info!(
                        "[wideband] configured: {} words, {} ms period",
                        words,
                        params.update_rate_ms
                    );
                }
            }

            if params.enabled() {
                let (_, adc1_ready, adc2_ready) = engine.bank.wideband_status()?;
                if adc1_ready || adc2_ready {
                    read_fifo_content(engine, dma, &mut arena)?;
                    // acknowledge the transfer so the IP records again
                    engine.bank.set_wideband_enable(
                        params.enables & 1 != 0,
                        params.enables & 2 != 0,
                        true,
                    )?;
                    let adc = usize::from(adc2_ready);
                    send_frame(
                        &sockets[adc],
                        SocketAddrV4::new(ip, engine.endpoints.get(EP_WIDEBAND_0 + adc).port()),
                        &params,
                        &mut arena,
                        &mut packet,
                        &mut sequence[adc],
                    )?;
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        // force a reconfigure if the client comes back
        engine.wideband.mark_changed();
        if engine.session.exit_requested() {
            return Ok(());
        }
    }
}

/// Fragment one capture into packets-per-frame UDP messages.
fn send_frame(
    socket: &UdpSocket,
    dest: SocketAddrV4,
    params: &WidebandParams,
    arena: &mut DmaArena,
    packet: &mut [u8; WIDEBAND_MAX_PACKET_SIZE],
    sequence: &mut u32,
) -> Result<()> {
    let payload_len = usize::from(params.samples_per_packet) * 2;
    if payload_len + 4 > WIDEBAND_MAX_PACKET_SIZE {
        log::warn!("[wideband] samples-per-packet {} too large", params.samples_per_packet);
        return Ok(());
    }
    let capture = arena.dma_region(WB_BUFFER_SIZE);
    for n in 0..usize::from(params.packets_per_frame) {
        let start = WB_DATA_OFFSET + n * payload_len;
        if start + payload_len > capture.len() {
            break;
        }
        wr_be_u32(packet, 0, *sequence);
        *sequence = sequence.wrapping_add(1);
        packet[4..4 + payload_len].copy_from_slice(&capture[start..start + payload_len]);
        socket
            .send_to(&packet[..4 + payload_len], dest)
            .map_err(|source| Error::Transport {
                endpoint: "wideband out",
                source,
            })?;
        std::thread::sleep(Duration::from_micros(200));
    }
    Ok(())
}
