// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Inbound DUC I/Q listener.
//!
//! Each 1444-byte packet carries 240 24-bit I/Q pairs. The wire order is
//! Q-then-I per sample; the halves are swapped during the copy into the
//! DMA arena so the DUC sees I-then-Q at the same 6-byte stride.
//!
//! This listener owns the DUC multiplexer lifecycle: the mux is disabled
//! while the EER interleave mode changes, the FIFO is drained and reset,
//! and only then is the mux re-enabled.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT};
use super::session::FIFO_OVF_DUC;
use super::{recv_packet, EngineShared, RecvOutcome};
use crate::config::{
    AXI_DUC_STREAM_WRITE, DUC_DMA_DEVICE, DUC_IQ_SIZE, EP_DUC_IQ, STARTUP_GRACE_PACKETS,
};
use crate::error::Result;
use crate::hw::xdma::DmaArena;
use crate::hw::{DmaChannel, DmaStream, RegisterBank};
use crate::protocol::iqstream::{swap_duc_iq, DUC_BYTES_PER_FRAME};
use std::net::UdpSocket;
use std::time::Duration;

/// 8-byte FIFO words needed per packet.
const WORDS_PER_FRAME: u32 = 180;

pub fn run(engine: &EngineShared, socket: UdpSocket) {
    if let Err(err) = serve(engine, socket) {
        log::error!("[duc-iq] {}", err);
        engine.session.report_thread_error("DUC I/Q");
    }
    engine.endpoints.get(EP_DUC_IQ).set_active(false);
}

/// Bring the DUC datapath into a known state: mux stopped, interleave off,
/// mux and FIFO reset, monitor configured, mux running.
fn setup_duc_path(bank: &RegisterBank, eer: bool) -> Result<()> {
    bank.enable_duc_mux(false)?;
    bank.set_tx_iq_deinterleaved(eer)?;
    bank.reset_duc_mux()?;
    bank.reset_stream_fifo(DmaStream::TxDuc)?;
    bank.configure_fifo(DmaStream::TxDuc, false)?;
    bank.enable_duc_mux(true)
}

/// Change EER (amplitude restoration) mode. The TX FIFO must drain before
/// the interleave bit moves, so the mux is gated for the whole switch.
pub fn set_eer_mode(bank: &RegisterBank, enabled: bool) -> Result<()> {
    bank.enable_duc_mux(false)?;
    // wait for the FIFO to drain before touching the interleave bit
    for _ in 0..200 {
        if bank.probe_fifo(DmaStream::TxDuc)?.occupied == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    setup_duc_path(bank, enabled)
}

fn serve(engine: &EngineShared, mut socket: UdpSocket) -> Result<()> {
    let ep = engine.endpoints.get(EP_DUC_IQ);
    ep.set_active(true);
    log::info!("[duc-iq] listening on port {}", ep.port());

    let dma = DmaChannel::open(DUC_DMA_DEVICE)?;
    let mut arena = DmaArena::new(DUC_BYTES_PER_FRAME);
    setup_duc_path(&engine.bank, false)?;

    let mut buf = [0u8; DUC_IQ_SIZE];
    let mut startup = 0u32;
    let mut prev_active = false;

    loop {
        if engine.session.exit_requested() {
            return Ok(());
        }
        let active = engine.session.is_active();
        if active && !prev_active {
            startup = STARTUP_GRACE_PACKETS;
        }
        prev_active = active;

        match recv_packet(&socket, &mut buf, "DUC I/Q")? {
            RecvOutcome::TimedOut => {
                if ep.take_command(CMD_CHANGE_PORT) {
                    socket = make_udp_socket(ep.port(), "DUC I/Q")?;
                    log::info!("[duc-iq] rebound to port {}", ep.port());
                }
            }
            RecvOutcome::Packet(n) if n == DUC_IQ_SIZE => {
                startup = startup.saturating_sub(1);
                engine.session.note_message();

                loop {
                    let status = engine.bank.probe_fifo(DmaStream::TxDuc)?;
                    if startup == 0 && status.over_threshold {
                        log::debug!("[duc-iq] FIFO over threshold, depth {}", status.occupied);
                    }
                    if startup == 0 && status.underflowed {
                        engine.session.flag_fifo_overflow(FIFO_OVF_DUC);
                        log::debug!("[duc-iq] FIFO underflow, depth {}", status.occupied);
                    }
                    if status.available >= WORDS_PER_FRAME {
                        break;
                    }
                    std::thread::sleep(Duration::from_micros(500));
                }

                arena.carry_residue();
                swap_duc_iq(
                    &buf[4..4 + DUC_BYTES_PER_FRAME],
                    arena.dma_region(DUC_BYTES_PER_FRAME),
                );
                dma.write_to(
                    &arena.dma_region(DUC_BYTES_PER_FRAME)[..],
                    AXI_DUC_STREAM_WRITE,
                )?;
            }
            RecvOutcome::Packet(_) => {}
        }
    }
}
