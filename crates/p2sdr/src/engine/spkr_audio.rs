// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Inbound speaker audio listener.
//!
//! Each 260-byte packet carries 64 stereo 32-bit samples. The payload is
//! DMAed straight to the speaker FIFO; before every transfer the FIFO is
//! probed and the thread spin-sleeps in 1 ms steps until 32 free words are
//! available. Client frames are never dropped while space exists.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT};
use super::session::FIFO_OVF_SPKR;
use super::{recv_packet, EngineShared, RecvOutcome};
use crate::config::{
    AXI_SPKR_STREAM_WRITE, EP_SPKR_AUDIO, SPEAKER_AUDIO_SIZE, SPKR_DMA_DEVICE,
    STARTUP_GRACE_PACKETS,
};
use crate::error::Result;
use crate::hw::xdma::DmaArena;
use crate::hw::{DmaChannel, DmaStream};
use std::net::UdpSocket;
use std::time::Duration;

/// Speaker payload bytes per packet.
const DMA_TRANSFER_SIZE: usize = 256;
/// 8-byte FIFO words needed per packet.
const WORDS_PER_FRAME: u32 = 32;

pub fn run(engine: &EngineShared, socket: UdpSocket) {
    if let Err(err) = serve(engine, socket) {
        log::error!("[spkr] {}", err);
        engine.session.report_thread_error("speaker audio");
    }
    engine.endpoints.get(EP_SPKR_AUDIO).set_active(false);
}

fn serve(engine: &EngineShared, mut socket: UdpSocket) -> Result<()> {
    let ep = engine.endpoints.get(EP_SPKR_AUDIO);
    ep.set_active(true);
    log::info!("[spkr] listening on port {}", ep.port());

    let dma = DmaChannel::open(SPKR_DMA_DEVICE)?;
    let mut arena = DmaArena::new(DMA_TRANSFER_SIZE);
    engine.bank.reset_stream_fifo(DmaStream::SpkCodec)?;
    engine.bank.configure_fifo(DmaStream::SpkCodec, false)?;

    let mut buf = [0u8; SPEAKER_AUDIO_SIZE];
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

        match recv_packet(&socket, &mut buf, "speaker audio")? {
            RecvOutcome::TimedOut => {
                if ep.take_command(CMD_CHANGE_PORT) {
                    socket = make_udp_socket(ep.port(), "speaker audio")?;
                    log::info!("[spkr] rebound to port {}", ep.port());
                }
            }
            RecvOutcome::Packet(n) if n == SPEAKER_AUDIO_SIZE => {
                startup = startup.saturating_sub(1);
                engine.session.note_message();

                // wait for FIFO space, probing under the same read that
                // latches the clear-on-read event flags
                loop {
                    let status = engine.bank.probe_fifo(DmaStream::SpkCodec)?;
                    if startup == 0 && status.over_threshold {
                        log::debug!("[spkr] FIFO over threshold, depth {}", status.occupied);
                    }
                    if startup == 0 && status.underflowed {
                        engine.session.flag_fifo_overflow(FIFO_OVF_SPKR);
                        log::debug!("[spkr] FIFO underflow, depth {}", status.occupied);
                    }
                    if status.available >= WORDS_PER_FRAME {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }

                arena.carry_residue();
                arena
                    .dma_region(DMA_TRANSFER_SIZE)
                    .copy_from_slice(&buf[4..4 + DMA_TRANSFER_SIZE]);
                dma.write_to(
                    &arena.dma_region(DMA_TRANSFER_SIZE)[..],
                    AXI_SPKR_STREAM_WRITE,
                )?;
            }
            RecvOutcome::Packet(_) => {}
        }
    }
}
