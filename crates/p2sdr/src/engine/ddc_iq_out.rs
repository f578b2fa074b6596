// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Outbound DDC I/Q demux and senders.
//!
//! One thread owns the RX DMA channel and all ten outbound DDC sockets.
//! The channel carries an interleaved multi-DDC stream of records, each a
//! 64-bit framing word followed by the samples the word describes. The
//! thread accumulates 4 KiB of stream, walks the records, routes each
//! DDC's samples to its staging buffer, and emits a 1444-byte frame per
//! 238 accumulated samples. A record split across DMA blocks is carried in
//! the arena's residue region.
//!
//! The FPGA emits sample data in network byte order, so sample bytes go to
//! the wire without swapping.

use super::endpoints::{make_udp_socket, CMD_CHANGE_PORT};
use super::session::FIFO_OVF_DDC;
use super::EngineShared;
use crate::config::{AXI_DDC_STREAM_READ, DDC_DMA_DEVICE, EP_DDC_IQ_0, NUM_DDC};
use crate::error::{Error, Result};
use crate::hw::xdma::DmaArena;
use crate::hw::{DmaChannel, DmaStream};
use crate::protocol::byteio::rd_be_u32;
use crate::protocol::iqstream::{analyse_ddc_header, build_ddc_iq_frame, IQ_BYTES_PER_FRAME,
    IQ_SAMPLES_PER_FRAME};
use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Bytes per DMA transfer from the RX stream.
const DMA_BLOCK: usize = 4096;
/// 8-byte FIFO words required before a transfer is issued.
const BLOCK_WORDS: u32 = (DMA_BLOCK / 8) as u32;
/// Stream record header size (64-bit framing word).
const RECORD_HEADER: usize = 8;

pub fn run(engine: &EngineShared) {
    if let Err(err) = serve(engine) {
        log::error!("[ddc-iq] {}", err);
        engine.session.report_thread_error("DDC I/Q out");
    }
    for i in 0..NUM_DDC {
        engine.endpoints.get(EP_DDC_IQ_0 + i).set_active(false);
    }
}

fn serve(engine: &EngineShared) -> Result<()> {
    let mut sockets = Vec::with_capacity(NUM_DDC);
    for i in 0..NUM_DDC {
        let ep = engine.endpoints.get(EP_DDC_IQ_0 + i);
        sockets.push(make_udp_socket(ep.port(), "DDC I/Q")?);
        ep.set_active(true);
    }
    log::info!(
        "[ddc-iq] senders ready, ports {}..{}",
        engine.endpoints.get(EP_DDC_IQ_0).port(),
        engine.endpoints.get(EP_DDC_IQ_0 + NUM_DDC - 1).port()
    );

    let dma = DmaChannel::open(DDC_DMA_DEVICE)?;
    let mut arena = DmaArena::new(DMA_BLOCK);
    let mut staging: Vec<Vec<u8>> = (0..NUM_DDC).map(|_| Vec::new()).collect();

    loop {
        while !engine.session.is_active() {
            if engine.session.exit_requested() {
                return Ok(());
            }
            for (i, socket) in sockets.iter_mut().enumerate() {
                let ep = engine.endpoints.get(EP_DDC_IQ_0 + i);
                if ep.take_command(CMD_CHANGE_PORT) {
                    *socket = make_udp_socket(ep.port(), "DDC I/Q")?;
                    log::info!("[ddc-iq] DDC {} rebound to port {}", i, ep.port());
                }
            }
            std::thread::sleep(Duration::from_micros(100));
        }

        let ip = match engine.session.reply_ip() {
            Some(ip) => ip,
            None => continue,
        };
        let dests: Vec<SocketAddrV4> = (0..NUM_DDC)
            .map(|i| SocketAddrV4::new(ip, engine.endpoints.get(EP_DDC_IQ_0 + i).port()))
            .collect();

        // sequence counters restart on every quiescent-to-flowing transition
        let mut sequence = [0u32; NUM_DDC];
        let mut sample_total = [0u64; NUM_DDC];
        for buf in &mut staging {
            buf.clear();
        }
        arena.reset();
        engine.session.reset_transferred_iq_samples();
        let mut overflow_events = 0u32;

        engine.bank.reset_stream_fifo(DmaStream::RxDdc)?;
        engine.bank.configure_fifo(DmaStream::RxDdc, false)?;
        engine.bank.set_rx_ddc_enabled(true)?;
        log::info!("[ddc-iq] starting outgoing data");

        while engine.session.is_active() && !engine.session.exit_requested() {
            let status = engine.bank.probe_fifo(DmaStream::RxDdc)?;
            if status.overflowed {
                engine.session.flag_fifo_overflow(FIFO_OVF_DDC);
                if overflow_events % 256 == 0 {
                    log::warn!("[ddc-iq] RX FIFO overflow, depth {}", status.occupied);
                }
                overflow_events = overflow_events.wrapping_add(1);
            }
            if status.available < BLOCK_WORDS {
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }

            arena.carry_residue();
            dma.read_from(arena.dma_region(DMA_BLOCK), AXI_DDC_STREAM_READ)?;
            arena.commit(DMA_BLOCK);

            distribute_records(&mut arena, &mut staging);
            emit_ready_frames(
                engine,
                &sockets,
                &dests,
                &mut staging,
                &mut sequence,
                &mut sample_total,
            )?;
        }
        engine.bank.set_rx_ddc_enabled(false)?;
        if engine.session.exit_requested() {
            return Ok(());
        }
    }
}

/// Walk complete records in the arena and route samples per DDC. A
/// trailing partial record stays pending for the next block.
fn distribute_records(arena: &mut DmaArena, staging: &mut [Vec<u8>]) {
    loop {
        let data = arena.data();
        if data.len() < RECORD_HEADER {
            break;
        }
        let header = rd_be_u32(data, 0);
        let (counts, total) = analyse_ddc_header(header);
        if total == 0 {
            arena.consume(RECORD_HEADER);
            continue;
        }
        let record_len = RECORD_HEADER + total as usize * 6;
        if data.len() < record_len {
            break;
        }
        let mut offset = RECORD_HEADER;
        for (ddc, count) in counts.iter().enumerate() {
            let bytes = *count as usize * 6;
            if bytes != 0 {
                staging[ddc].extend_from_slice(&data[offset..offset + bytes]);
                offset += bytes;
            }
        }
        arena.consume(record_len);
    }
}

/// Emit one frame per 238 staged samples per DDC, in DDC order.
fn emit_ready_frames(
    engine: &EngineShared,
    sockets: &[UdpSocket],
    dests: &[SocketAddrV4],
    staging: &mut [Vec<u8>],
    sequence: &mut [u32; NUM_DDC],
    sample_total: &mut [u64; NUM_DDC],
) -> Result<()> {
    let timestamping = engine.bank.timestamp_enabled();
    let enables = engine.bank.ddc_enables();
    let pace_ddc = if enables != 0 {
        enables.trailing_zeros() as usize
    } else {
        0
    };

    for ddc in 0..NUM_DDC {
        while staging[ddc].len() >= IQ_BYTES_PER_FRAME {
            let timestamp = if timestamping { sample_total[ddc] } else { 0 };
            let frame = build_ddc_iq_frame(
                sequence[ddc],
                timestamp,
                &staging[ddc][..IQ_BYTES_PER_FRAME],
            );
            staging[ddc].drain(..IQ_BYTES_PER_FRAME);
            sequence[ddc] = sequence[ddc].wrapping_add(1);
            sample_total[ddc] += IQ_SAMPLES_PER_FRAME as u64;

            sockets[ddc]
                .send_to(&frame, dests[ddc])
                .map_err(|source| Error::Transport {
                    endpoint: "DDC I/Q out",
                    source,
                })?;
            if ddc == pace_ddc {
                engine
                    .session
                    .add_transferred_iq_samples(IQ_SAMPLES_PER_FRAME as u32);
            }
        }
    }
    Ok(())
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_route_to_staging_with_residue_carry() {
        let mut arena = DmaArena::new(DMA_BLOCK);
        let mut staging: Vec<Vec<u8>> = (0..NUM_DDC).map(|_| Vec::new()).collect();

        // record: DDC0 at code 2 (2 samples), DDC1 at code 1 (1 sample)
        let mut block = Vec::new();
        block.extend_from_slice(&0b001_010u32.to_be_bytes());
        block.extend_from_slice(&[0u8; 4]);
        block.extend_from_slice(&[0xAA; 12]); // DDC0 samples
        block.extend_from_slice(&[0xBB; 6]); // DDC1 sample
        // second record, truncated after the header: must stay pending
        block.extend_from_slice(&0b001_010u32.to_be_bytes());
        block.extend_from_slice(&[0u8; 4]);
        block.extend_from_slice(&[0xCC; 5]);

        arena.carry_residue();
        arena.dma_region(block.len()).copy_from_slice(&block);
        arena.commit(block.len());

        distribute_records(&mut arena, &mut staging);
        assert_eq!(staging[0], vec![0xAA; 12]);
        assert_eq!(staging[1], vec![0xBB; 6]);
        assert_eq!(arena.pending(), 8 + 5, "partial record stays pending");

        // completing the record in the "next block" finishes the route
        arena.carry_residue();
        let rest = [vec![0xCC; 7], vec![0xDD; 6]].concat();
        arena.dma_region(rest.len()).copy_from_slice(&rest);
        arena.commit(rest.len());
        distribute_records(&mut arena, &mut staging);
        assert_eq!(staging[0].len(), 24);
        assert_eq!(&staging[0][12..], &[0xCC; 12][..]);
        assert_eq!(&staging[1][6..], &[0xDD; 6][..]);
        assert_eq!(arena.pending(), 0);
    }

    #[test]
    fn emitted_sequence_numbers_are_dense() {
        use crate::hw::registers::tests::bank_with_fw;
        use crate::protocol::iqstream::IQ_SAMPLES_PER_FRAME;
        use std::net::UdpSocket;
        use std::sync::Arc;
        use std::time::Duration;

        let (_win, bank) = bank_with_fw(14);
        let engine = EngineShared::new(Arc::new(bank));
        engine.bank.set_p2_sample_rate(0, true, 192, false);

        let receiver = UdpSocket::bind("127.0.0.1:0").expect("receiver");
        receiver
            .set_read_timeout(Some(Duration::from_millis(500)))
            .expect("timeout");
        let dest = match receiver.local_addr().expect("addr") {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };

        let sockets: Vec<UdpSocket> = (0..NUM_DDC)
            .map(|_| UdpSocket::bind("127.0.0.1:0").expect("sender"))
            .collect();
        let dests = vec![dest; NUM_DDC];
        let mut staging: Vec<Vec<u8>> = (0..NUM_DDC).map(|_| Vec::new()).collect();
        staging[0] = vec![0x5A; IQ_BYTES_PER_FRAME * 2 + 6];
        let mut sequence = [0u32; NUM_DDC];
        let mut sample_total = [0u64; NUM_DDC];

        emit_ready_frames(
            &engine,
            &sockets,
            &dests,
            &mut staging,
            &mut sequence,
            &mut sample_total,
        )
        .expect("emit");

        let mut frame = [0u8; 2048];
        for want_seq in 0..2u32 {
            let (n, _) = receiver.recv_from(&mut frame).expect("frame");
            assert_eq!(n, crate::config::DDC_IQ_SIZE);
            assert_eq!(rd_be_u32(&frame, 0), want_seq);
            assert_eq!(&frame[12..16], &[0, 24, 0, 238]);
        }
        assert_eq!(sequence[0], 2);
        assert_eq!(staging[0].len(), 6, "partial frame stays staged");
        assert_eq!(
            engine.session.transferred_iq_samples(),
            2 * IQ_SAMPLES_PER_FRAME as u32
        );
    }

    #[test]
    fn zero_total_records_are_skipped() {
        let mut arena = DmaArena::new(DMA_BLOCK);
        let mut staging: Vec<Vec<u8>> = (0..NUM_DDC).map(|_| Vec::new()).collect();
        arena.carry_residue();
        arena.dma_region(8).copy_from_slice(&[0u8; 8]);
        arena.commit(8);
        distribute_records(&mut arena, &mut staging);
        assert_eq!(arena.pending(), 0);
        assert!(staging.iter().all(|s| s.is_empty()));
    }
}
