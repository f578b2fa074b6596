// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! I/Q sample stream framing.
//!
//! The RX DMA channel carries one interleaved multi-DDC stream. Each record
//! starts with a 64-bit framing word whose low 32 bits hold a 3-bit rate
//! code per DDC; the code determines how many samples belong to that DDC in
//! the record. Code 7 marks an interleaved pair: the even DDC uses the next
//! slot's code at double rate and the odd slot carries nothing.
//!
//! The FPGA is configured to emit sample data in network byte order, so
//! sample bytes are copied to the wire without swapping.

use crate::config::{DDC_IQ_SIZE, MIC_PACKET_SIZE, NUM_DDC};
use crate::protocol::byteio::{wr_be_u16, wr_be_u32, wr_be_u64};

/// Samples carried by one outbound DDC I/Q frame.
pub const IQ_SAMPLES_PER_FRAME: usize = 238;
/// Sample bytes carried by one outbound DDC I/Q frame (24-bit I + 24-bit Q).
pub const IQ_BYTES_PER_FRAME: usize = 6 * IQ_SAMPLES_PER_FRAME;
/// Offset of sample data in the outbound frame.
pub const IQ_FRAME_HEADER: usize = 16;

/// Samples in one inbound DUC I/Q packet.
pub const DUC_SAMPLES_PER_FRAME: usize = 240;
/// Sample bytes in one inbound DUC I/Q packet.
pub const DUC_BYTES_PER_FRAME: usize = 6 * DUC_SAMPLES_PER_FRAME;

/// Mic samples per outbound packet (16-bit mono).
pub const MIC_SAMPLES_PER_FRAME: usize = 64;

/// Samples per record for each 3-bit rate code. Code 7 is resolved against
/// the following slot and never indexes this table directly.
pub const DDC_SAMPLE_COUNTS: [u32; 8] = [0, 1, 2, 4, 8, 16, 32, 0];

/// Decode a stream framing word into per-DDC sample counts.
///
/// Returns the counts and their total, which sets the record's sample
/// payload size in the stream.
#[must_use]
pub fn analyse_ddc_header(header: u32) -> ([u32; NUM_DDC], u32) {
    let mut counts = [0u32; NUM_DDC];
    let mut total = 0u32;
    let mut word = header;
    let mut ddc = 0usize;
    while ddc < NUM_DDC {
        let rate = (word & 7) as usize;
        if rate != 7 {
            let count = DDC_SAMPLE_COUNTS[rate];
            counts[ddc] = count;
            total += count;
        } else {
            // interleaved pair: the even DDC takes the odd slot's rate, doubled
            word >>= 3;
            let next = (word & 7) as usize;
            let count = 2 * DDC_SAMPLE_COUNTS[next];
            counts[ddc] = count;
            total += count;
            if ddc + 1 < NUM_DDC {
                counts[ddc + 1] = 0;
            }
            ddc += 1;
        }
        word >>= 3;
        ddc += 1;
    }
    (counts, total)
}

/// Build one outbound DDC I/Q frame: sequence, timestamp (zero unless
/// timestamping is enabled), bits per sample, sample count, then the sample
/// bytes copied verbatim.
#[must_use]
pub fn build_ddc_iq_frame(sequence: u32, timestamp: u64, samples: &[u8]) -> [u8; DDC_IQ_SIZE] {
    debug_assert_eq!(samples.len(), IQ_BYTES_PER_FRAME);
    let mut frame = [0u8; DDC_IQ_SIZE];
    wr_be_u32(&mut frame, 0, sequence);
    wr_be_u64(&mut frame, 4, timestamp);
    wr_be_u16(&mut frame, 12, 24);
    wr_be_u16(&mut frame, 14, IQ_SAMPLES_PER_FRAME as u16);
    frame[IQ_FRAME_HEADER..].copy_from_slice(samples);
    frame
}

/// Swap the I and Q halves of each 6-byte sample in a DUC I/Q payload.
///
/// The wire carries Q-then-I but the DUC expects I-then-Q; the 6-byte
/// stride is preserved.
pub fn swap_duc_iq(payload: &[u8], out: &mut [u8]) {
    debug_assert_eq!(payload.len(), DUC_BYTES_PER_FRAME);
    debug_assert_eq!(out.len(), DUC_BYTES_PER_FRAME);
    for (src, dst) in payload.chunks_exact(6).zip(out.chunks_exact_mut(6)) {
        dst[3..6].copy_from_slice(&src[0..3]);
        dst[0..3].copy_from_slice(&src[3..6]);
    }
}

/// Legacy protocol-1 path: replicate one DDC's samples across four
/// receiver slots, receiver-interleaved per sample time, to mimic a
/// four-receiver board.
#[must_use]
pub fn replicate_iq_four_receivers(samples: &[u8]) -> Vec<u8> {
    debug_assert_eq!(samples.len() % 6, 0);
    let mut out = Vec::with_capacity(samples.len() * 4);
    for sample in samples.chunks_exact(6) {
        for _ in 0..4 {
            out.extend_from_slice(sample);
        }
    }
    out
}

/// Build one outbound mic packet: sequence then 64 16-bit samples.
#[must_use]
pub fn build_mic_frame(sequence: u32, samples: &[u8]) -> [u8; MIC_PACKET_SIZE] {
    debug_assert_eq!(samples.len(), MIC_PACKET_SIZE - 4);
    let mut frame = [0u8; MIC_PACKET_SIZE];
    wr_be_u32(&mut frame, 0, sequence);
    frame[4..].copy_from_slice(samples);
    frame
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_analysis_simple_rates() {
        // DDC0 at code 3 (4 samples), DDC1 at code 1 (1 sample), rest silent
        let header = 0b001_011;
        let (counts, total) = analyse_ddc_header(header);
        assert_eq!(counts[0], 4);
        assert_eq!(counts[1], 1);
        assert!(counts[2..].iter().all(|&c| c == 0));
        assert_eq!(total, 5);
    }

    #[test]
    fn header_analysis_interleaved_pair() {
        // DDC0 interleaved (7), partner slot code 3 -> 8 samples on DDC0
        let header = 0b011_111;
        let (counts, total) = analyse_ddc_header(header);
        assert_eq!(counts[0], 8);
        assert_eq!(counts[1], 0);
        assert_eq!(total, 8);

        // an ordinary DDC after the pair keeps its own slot
        let header = (0b010 << 6) | 0b011_111; // DDC2 at code 2
        let (counts, total) = analyse_ddc_header(header);
        assert_eq!(counts[0], 8);
        assert_eq!(counts[2], 2);
        assert_eq!(total, 10);
    }

    #[test]
    fn ddc_iq_frame_layout() {
        let samples: Vec<u8> = (0..IQ_BYTES_PER_FRAME).map(|i| (i % 251) as u8).collect();
        let frame = build_ddc_iq_frame(3, 0, &samples);
        assert_eq!(frame.len(), DDC_IQ_SIZE);
        assert_eq!(&frame[0..4], &[0, 0, 0, 3]);
        assert_eq!(&frame[4..12], &[0; 8]); // timestamp disabled
        assert_eq!(&frame[12..14], &[0, 24]);
        assert_eq!(&frame[14..16], &[0, 238]);
        assert_eq!(&frame[16..], &samples[..]);
    }

    #[test]
    fn duc_swap_keeps_stride() {
        let mut payload = vec![0u8; DUC_BYTES_PER_FRAME];
        payload[0..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]); // Q then I
        payload[6..12].copy_from_slice(&[7, 8, 9, 10, 11, 12]);
        let mut out = vec![0u8; DUC_BYTES_PER_FRAME];
        swap_duc_iq(&payload, &mut out);
        assert_eq!(&out[0..6], &[4, 5, 6, 1, 2, 3]); // I then Q
        assert_eq!(&out[6..12], &[10, 11, 12, 7, 8, 9]);
    }

    #[test]
    fn four_receiver_replication() {
        let samples = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let out = replicate_iq_four_receivers(&samples);
        assert_eq!(out.len(), 48);
        for rx in 0..4 {
            assert_eq!(&out[rx * 6..rx * 6 + 6], &samples[0..6]);
            assert_eq!(&out[24 + rx * 6..24 + rx * 6 + 6], &samples[6..12]);
        }
    }
}
