// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Outbound microphone sender.
//!
//! Mic frames are paced against the DDC I/Q stream through the shared
//! transferred-sample counter: a frame is emitted only while the mic
//! counter trails the I/Q counter, so mic audio can never run ahead of the
//! receive data. The mic DMA device is shared with the wideband sender and
//! serialised with a mutex.

use super::endpoints::CMD_CHANGE_PORT;
use super::session::FIFO_OVF_MIC;
use super::EngineShared;
use crate::config::{AXI_MIC_STREAM_READ, EP_MIC_AUDIO, MIC_PACKET_SIZE};
use crate::error::{Error, Result};
use crate::hw::xdma::DmaArena;
use crate::hw::{DmaChannel, DmaStream};
use crate::protocol::iqstream::{build_mic_frame, MIC_SAMPLES_PER_FRAME};
use parking_lot::Mutex;
use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Mic payload bytes per packet (64 16-bit samples).
const MIC_PAYLOAD: usize = MIC_PACKET_SIZE - 4;
/// 8-byte FIFO words per packet.
const WORDS_PER_FRAME: u32 = (MIC_PAYLOAD / 8) as u32;

pub fn run(engine: &EngineShared, socket: UdpSocket, dma: &Mutex<DmaChannel>) {
    if let Err(err) = serve(engine, &socket, dma) {
        log::error!("[mic] {}", err);
        engine.session.report_thread_error("mic audio");
    }
    engine.endpoints.get(EP_MIC_AUDIO).set_active(false);
}

fn serve(engine: &EngineShared, socket: &UdpSocket, dma: &Mutex<DmaChannel>) -> Result<()> {
    let ep = engine.endpoints.get(EP_MIC_AUDIO);
    ep.set_active(true);
    log::info!("[mic] sender ready, port {}", ep.port());

    engine.bank.reset_stream_fifo(DmaStream::MicCodec)?;
    engine.bank.configure_fifo(DmaStream::MicCodec, false)?;
    let mut arena = DmaArena::new(MIC_PAYLOAD);

    loop {
        while !engine.session.is_active() {
            if engine.session.exit_requested() {
                return Ok(());
            }
            let _ = ep.take_command(CMD_CHANGE_PORT);
            std::thread::sleep(Duration::from_micros(100));
        }

        let ip = match engine.session.reply_ip() {
            Some(ip) => ip,
            None => continue,
        };
        let dest = SocketAddrV4::new(ip, ep.port());
        let mut sequence = 0u32;
        let mut mic_samples = 0u32;
        log::info!("[mic] starting, dest {}", dest);

        while engine.session.is_active() && !engine.session.exit_requested() {
            if engine.session.transferred_iq_samples() >= mic_samples {
                let mut payload = [0u8; MIC_PAYLOAD];
                fill_from_fifo(engine, dma, &mut arena, &mut payload)?;
                let frame = build_mic_frame(sequence, &payload);
                socket
                    .send_to(&frame, dest)
                    .map_err(|source| Error::Transport {
                        endpoint: "mic audio",
                        source,
                    })?;
                sequence = sequence.wrapping_add(1);
                mic_samples += MIC_SAMPLES_PER_FRAME as u32;
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        if engine.session.exit_requested() {
            return Ok(());
        }
    }
}

/// Pull one frame's worth of mic samples when the codec FIFO has them;
/// otherwise the frame stays silent. Underflow is reported, not stalled on.
fn fill_from_fifo(
    engine: &EngineShared,
    dma: &Mutex<DmaChannel>,
    arena: &mut DmaArena,
    payload: &mut [u8; MIC_PAYLOAD],
) -> Result<()> {
    let status = engine.bank.probe_fifo(DmaStream::MicCodec)?;
    if status.underflowed {
        engine.session.flag_fifo_overflow(FIFO_OVF_MIC);
    }
    if status.available >= WORDS_PER_FRAME {
        {
            let guard = dma.lock();
            guard.read_from(arena.dma_region(MIC_PAYLOAD), AXI_MIC_STREAM_READ)?;
        }
        payload.copy_from_slice(&arena.dma_region(MIC_PAYLOAD)[..]);
    } else {
        payload.fill(0);
    }
    Ok(())
}
