// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! The protocol-2 concurrency and dataplane engine.
//!
//! A fixed set of long-lived cooperating threads: the discovery/command
//! listener, one listener per inbound stream endpoint, one sender per
//! outbound endpoint (the ten DDC I/Q streams share one demux thread, the
//! two wideband streams another), the activity watchdog and the exit
//! checker. Threads communicate through the register bank, the session
//! flags and the endpoint table; each blocks on its own socket with a 1 ms
//! receive timeout so cancellation flags are polled at kHz rate.

pub mod command;
pub mod ddc_iq_out;
pub mod ddc_specific;
pub mod duc_iq;
pub mod duc_specific;
pub mod endpoints;
pub mod high_priority_in;
pub mod high_priority_out;
pub mod mic_out;
pub mod session;
pub mod spkr_audio;
pub mod watchdog;
pub mod wideband_out;

use crate::cat::CatBridge;
use crate::config::{
    EP_DDC_SPECIFIC, EP_DUC_IQ, EP_DUC_SPECIFIC, EP_HIGH_PRIORITY_IN, EP_SPKR_AUDIO,
    MIC_DMA_DEVICE,
};
use crate::error::{Error, Result};
use crate::hw::{DmaChannel, RegisterBank};
use crate::protocol::general::WidebandParams;
use self::endpoints::{make_udp_socket, EndpointTable};
use self::session::Session;
use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Wideband capture parameters handed from the general packet to the
/// wideband sender, with a change flag driving its reconfigure cycle.
pub struct WidebandControl {
    params: Mutex<WidebandParams>,
    changed: AtomicBool,
}

impl Default for WidebandControl {
    fn default() -> Self {
        Self {
            params: Mutex::new(WidebandParams::default()),
            changed: AtomicBool::new(false),
        }
    }
}

impl WidebandControl {
    /// Store new parameters; flags a reconfigure when anything moved.
    pub fn set(&self, params: WidebandParams) {
        let mut current = self.params.lock();
        if *current != params {
            log::info!(
                "[wideband] new params: enables={:#04b} samples/pkt={} size={} rate={}ms pkts={}",
                params.enables,
                params.samples_per_packet,
                params.sample_size_bits,
                params.update_rate_ms,
                params.packets_per_frame
            );
            *current = params;
            self.changed.store(true, Ordering::Release);
        }
    }

    #[must_use]
    pub fn params(&self) -> WidebandParams {
        *self.params.lock()
    }

    /// Read and clear the change flag.
    #[must_use]
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Force a reconfigure on the next active interval.
    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }
}

/// State shared by every engine thread.
pub struct EngineShared {
    pub bank: Arc<RegisterBank>,
    pub session: Session,
    pub endpoints: EndpointTable,
    pub wideband: WidebandControl,
    pub cat: CatBridge,
}

impl EngineShared {
    #[must_use]
    pub fn new(bank: Arc<RegisterBank>) -> Arc<Self> {
        Arc::new(Self {
            bank,
            session: Session::new(),
            endpoints: EndpointTable::new(),
            wideband: WidebandControl::default(),
            cat: CatBridge::new(),
        })
    }
}

/// Receive outcome for the short-timeout listener loops.
pub(crate) enum RecvOutcome {
    Packet(usize),
    TimedOut,
}

/// One receive with the socket's 1 ms timeout. Timeouts surface as
/// [`RecvOutcome::TimedOut`]; any other error is fatal for the stream.
pub(crate) fn recv_packet(
    socket: &UdpSocket,
    buf: &mut [u8],
    endpoint: &'static str,
) -> Result<RecvOutcome> {
    match socket.recv_from(buf) {
        Ok((n, _src)) => Ok(RecvOutcome::Packet(n)),
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            Ok(RecvOutcome::TimedOut)
        }
        Err(source) => Err(Error::Transport { endpoint, source }),
    }
}

/// Spawn every stream thread. The sockets shared between an inbound
/// listener and an outbound sender (DDC-specific with high-priority-out,
/// DUC-specific with mic) are cloned here, as the original port map
/// overlaps those pairs.
pub fn spawn_streams(engine: &Arc<EngineShared>) -> Result<Vec<JoinHandle<()>>> {
    let ddc_specific_socket = make_udp_socket(
        engine.endpoints.get(EP_DDC_SPECIFIC).port(),
        "DDC specific",
    )?;
    let duc_specific_socket = make_udp_socket(
        engine.endpoints.get(EP_DUC_SPECIFIC).port(),
        "DUC specific",
    )?;
    let hp_in_socket = make_udp_socket(
        engine.endpoints.get(EP_HIGH_PRIORITY_IN).port(),
        "high priority in",
    )?;
    let spkr_socket = make_udp_socket(engine.endpoints.get(EP_SPKR_AUDIO).port(), "speaker audio")?;
    let duc_iq_socket = make_udp_socket(engine.endpoints.get(EP_DUC_IQ).port(), "DUC I/Q")?;

    let hp_out_socket = ddc_specific_socket
        .try_clone()
        .map_err(|source| Error::Init {
            what: "high priority out socket",
            source,
        })?;
    let mic_socket = duc_specific_socket
        .try_clone()
        .map_err(|source| Error::Init {
            what: "mic socket",
            source,
        })?;

    // the mic and wideband senders share one FPGA-to-host DMA device
    let mic_wb_dma = Arc::new(Mutex::new(DmaChannel::open(MIC_DMA_DEVICE)?));

    let mut handles = Vec::new();
    let mut spawn = |name: &'static str, f: Box<dyn FnOnce() + Send>| {
        handles.push(
            std::thread::Builder::new()
                .name(name.to_string())
                .spawn(f)
                .expect("thread spawn"),
        );
    };

    {
        let engine = Arc::clone(engine);
        spawn(
            "ddc-specific",
            Box::new(move || ddc_specific::run(&engine, ddc_specific_socket)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn(
            "duc-specific",
            Box::new(move || duc_specific::run(&engine, duc_specific_socket)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn(
            "hp-in",
            Box::new(move || high_priority_in::run(&engine, hp_in_socket)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn(
            "spkr-audio",
            Box::new(move || spkr_audio::run(&engine, spkr_socket)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn(
            "duc-iq",
            Box::new(move || duc_iq::run(&engine, duc_iq_socket)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn(
            "hp-out",
            Box::new(move || high_priority_out::run(&engine, hp_out_socket)),
        );
    }
    {
        let engine = Arc::clone(engine);
        let dma = Arc::clone(&mic_wb_dma);
        spawn(
            "mic-out",
            Box::new(move || mic_out::run(&engine, mic_socket, &dma)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn("ddc-iq-out", Box::new(move || ddc_iq_out::run(&engine)));
    }
    {
        let engine = Arc::clone(engine);
        let dma = Arc::clone(&mic_wb_dma);
        spawn(
            "wideband-out",
            Box::new(move || wideband_out::run(&engine, &dma)),
        );
    }
    {
        let engine = Arc::clone(engine);
        spawn("watchdog", Box::new(move || watchdog::run(&engine)));
    }

    Ok(handles)
}
