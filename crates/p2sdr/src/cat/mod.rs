// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! CAT bridge: out-of-band command traffic over TCP.
//!
//! Some commanded settings travel over CAT rather than the UDP protocol,
//! so the high-priority packet can carry a TCP port number; when it does,
//! this bridge opens a client connection back to the SDR application and
//! runs two activities: reassembling semicolon-terminated ASCII command
//! frames from the stream, and draining the outbound command queue to it.
//! A companion keepalive injects a `ZZXV;` query every 15 seconds because
//! the peer drops the connection after 30 seconds of silence.
//!
//! Command grammar and peripheral dispatch are external collaborators: the
//! bridge recognises only a small self-addressed set and passes everything
//! else through as opaque frames.

use crate::engine::EngineShared;
use crate::error::{Error, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::{SocketAddr, SocketAddrV4, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outbound queue depth; sends beyond it are dropped, not blocked on.
const OUTPUT_QUEUE_DEPTH: usize = 64;

/// Keepalive cadence (the peer disconnects after 30 s of silence).
const KEEPALIVE_TICKS: u32 = 1500; // 1500 * 10 ms = 15 s

// ============================================================================
// Command classification
// ============================================================================

/// Pack a 4-character opcode into a `u32` for cheap matching, forcing
/// lower case to upper.
#[must_use]
pub fn pack_opcode(frame: &str) -> u32 {
    let mut packed = 0u32;
    for ch in frame.bytes().take(4) {
        let ch = ch.to_ascii_uppercase();
        packed = (packed << 8) | u32::from(ch);
    }
    packed
}

const OPCODE_ZZXV: u32 = u32::from_be_bytes(*b"ZZXV");
const OPCODE_ZZID: u32 = u32::from_be_bytes(*b"ZZID");

/// A received CAT frame, classified by opcode. The hot set is small; the
/// rest is opaque passthrough.
#[derive(Debug, PartialEq, Eq)]
pub enum CatCommand<'a> {
    /// `ZZXV` status answer to our keepalive query.
    KeepaliveStatus(&'a str),
    /// `ZZID` identification frame addressed to us.
    Identify(&'a str),
    /// Anything else: passed to the peripheral dispatch seam verbatim.
    Passthrough(&'a str),
}

/// Classify one semicolon-stripped frame.
#[must_use]
pub fn classify(frame: &str) -> CatCommand<'_> {
    if frame.len() < 4 {
        return CatCommand::Passthrough(frame);
    }
    match pack_opcode(frame) {
        OPCODE_ZZXV => CatCommand::KeepaliveStatus(&frame[4..]),
        OPCODE_ZZID => CatCommand::Identify(&frame[4..]),
        _ => CatCommand::Passthrough(frame),
    }
}

/// Seam for the CAT command consumers (ATU, PA controller, panels). The
/// engine core treats them as external collaborators.
pub trait CatSink: Send + Sync {
    fn on_command(&self, command: &CatCommand<'_>);
}

/// Default sink: log and drop.
pub struct LoggingSink;

impl CatSink for LoggingSink {
    fn on_command(&self, command: &CatCommand<'_>) {
        log::debug!("[cat] rx {:?}", command);
    }
}

/// Split a receive accumulator into complete `;`-terminated frames,
/// leaving any trailing partial frame in place.
fn drain_frames(accumulator: &mut String, mut each: impl FnMut(&str)) {
    while let Some(pos) = accumulator.find(';') {
        {
            let frame = &accumulator[..pos];
            if !frame.is_empty() {
                each(frame);
            }
        }
        accumulator.drain(..=pos);
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// The bridge itself: owns the port assignment, the output queue and the
/// lifecycle flags of the handler/keepalive thread pair.
pub struct CatBridge {
    port: AtomicU16,
    port_assigned: AtomicBool,
    thread_active: AtomicBool,
    keepalive_active: AtomicBool,
    signal_end: AtomicBool,
    out_tx: Sender<String>,
    out_rx: Receiver<String>,
    sink: Mutex<Arc<dyn CatSink>>,
}

impl Default for CatBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CatBridge {
    #[must_use]
    pub fn new() -> Self {
        let (out_tx, out_rx) = bounded(OUTPUT_QUEUE_DEPTH);
        Self {
            port: AtomicU16::new(0),
            port_assigned: AtomicBool::new(false),
            thread_active: AtomicBool::new(false),
            keepalive_active: AtomicBool::new(false),
            signal_end: AtomicBool::new(false),
            out_tx,
            out_rx,
            sink: Mutex::new(Arc::new(LoggingSink)),
        }
    }

    /// Replace the command consumer seam.
    pub fn set_sink(&self, sink: Arc<dyn CatSink>) {
        *self.sink.lock() = sink;
    }

    #[must_use]
    pub fn port_assigned(&self) -> bool {
        self.port_assigned.load(Ordering::Acquire)
    }

    /// Queue a CAT message for the peer. Only attempted while a session
    /// and a CAT connection are up; a full queue drops the message.
    pub fn send_message(&self, session_active: bool, msg: &str) {
        if session_active && self.port_assigned() {
            if self.out_tx.try_send(msg.to_string()).is_ok() {
                log::debug!("[cat] queued {}", msg.trim_end_matches(';'));
            }
        }
    }

    /// Assign the CAT port and start the handler/keepalive pair. Called on
    /// every high-priority packet; only the first non-zero port acts.
    ///
    /// The bridge may start before the session is fully active (the general
    /// packet and the first high-priority packet race); both threads wait
    /// up to ten seconds for activation.
    pub fn setup_port(&self, engine: &Arc<EngineShared>, port: u16) {
        if self
            .port
            .compare_exchange(0, port, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        log::info!("[cat] port assigned: {}", port);
        self.signal_end.store(false, Ordering::Release);

        let handler_engine = Arc::clone(engine);
        std::thread::Builder::new()
            .name("cat-handler".into())
            .spawn(move || handler_thread(&handler_engine))
            .expect("thread spawn");

        let keepalive_engine = Arc::clone(engine);
        std::thread::Builder::new()
            .name("cat-keepalive".into())
            .spawn(move || keepalive_thread(&keepalive_engine))
            .expect("thread spawn");
    }

    /// Signal both threads to end and wait for them. Returns once the
    /// socket is closed and the port is released.
    pub fn shutdown(&self) {
        self.signal_end.store(true, Ordering::Release);
        while self.thread_active.load(Ordering::Acquire)
            || self.keepalive_active.load(Ordering::Acquire)
        {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.port.store(0, Ordering::Release);
        self.port_assigned.store(false, Ordering::Release);
        self.signal_end.store(false, Ordering::Release);
    }

    fn should_end(&self) -> bool {
        self.signal_end.load(Ordering::Acquire)
    }
}

/// Wait up to ten seconds for session activation (general packet and first
/// high-priority packet may arrive in either order).
fn wait_for_activation(engine: &EngineShared) {
    for _ in 0..10 {
        if engine.session.is_active() || engine.cat.should_end() {
            return;
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}

fn connect(engine: &EngineShared, port: u16) -> Result<TcpStream> {
    let wrap = |source| Error::Init {
        what: "CAT socket",
        source,
    };
    let ip = engine
        .session
        .reply_ip()
        .unwrap_or(std::net::Ipv4Addr::UNSPECIFIED);
    let dest = SocketAddr::V4(SocketAddrV4::new(ip, port));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(wrap)?;
    socket.set_reuse_address(true).map_err(wrap)?;
    socket
        .set_read_timeout(Some(Duration::from_millis(1)))
        .map_err(wrap)?;
    log::info!("[cat] connecting to {}", dest);
    socket.connect(&dest.into()).map_err(wrap)?;
    Ok(socket.into())
}

fn handler_thread(engine: &Arc<EngineShared>) {
    let bridge = &engine.cat;
    wait_for_activation(engine);

    let mut failed = false;
    while !failed
        && engine.session.is_active()
        && !bridge.should_end()
        && !engine.session.exit_requested()
    {
        let port = bridge.port.load(Ordering::Acquire);
        if port == 0 {
            break;
        }
        let mut stream = match connect(engine, port) {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("[cat] connect failed: {}", err);
                break;
            }
        };
        bridge.thread_active.store(true, Ordering::Release);
        bridge.port_assigned.store(true, Ordering::Release);
        log::info!("[cat] connected");

        let mut accumulator = String::new();
        let mut read_buf = [0u8; 1024];

        // inner loop: exit when the port changes so we can reconnect
        while !failed
            && engine.session.is_active()
            && !bridge.should_end()
            && bridge.port.load(Ordering::Acquire) == port
        {
            match stream.read(&mut read_buf) {
                Ok(0) => {
                    log::info!("[cat] server dropped connection");
                    failed = true;
                }
                Ok(n) => {
                    accumulator.push_str(&String::from_utf8_lossy(&read_buf[..n]));
                    let sink = Arc::clone(&bridge.sink.lock());
                    drain_frames(&mut accumulator, |frame| {
                        sink.on_command(&classify(frame));
                    });
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(err) => {
                    log::warn!("[cat] read error: {}", err);
                    failed = true;
                }
            }

            // drain queued outbound messages
            while let Ok(msg) = bridge.out_rx.try_recv() {
                if let Err(err) = stream.write_all(msg.as_bytes()) {
                    log::warn!("[cat] send error: {}", err);
                    failed = true;
                    break;
                }
            }
        }
        log::info!("[cat] closing connection");
        bridge.port_assigned.store(false, Ordering::Release);
    }
    bridge.port.store(0, Ordering::Release);
    bridge.port_assigned.store(false, Ordering::Release);
    bridge.thread_active.store(false, Ordering::Release);
}

fn keepalive_thread(engine: &Arc<EngineShared>) {
    let bridge = &engine.cat;
    wait_for_activation(engine);

    bridge.keepalive_active.store(true, Ordering::Release);
    let mut ticks = 0u32;
    while engine.session.is_active()
        && !bridge.should_end()
        && !engine.session.exit_requested()
    {
        ticks += 1;
        if ticks == KEEPALIVE_TICKS {
            bridge.send_message(true, "ZZXV;");
            ticks = 0;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    log::info!("[cat] keepalive stopped");
    bridge.keepalive_active.store(false, Ordering::Release);
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_packing_forces_upper_case() {
        assert_eq!(pack_opcode("ZZXV"), u32::from_be_bytes(*b"ZZXV"));
        assert_eq!(pack_opcode("zzxv123"), u32::from_be_bytes(*b"ZZXV"));
    }

    #[test]
    fn classification() {
        assert_eq!(classify("ZZXV1"), CatCommand::KeepaliveStatus("1"));
        assert_eq!(classify("ZZID"), CatCommand::Identify(""));
        assert_eq!(classify("ZZFA00007100000"), CatCommand::Passthrough("ZZFA00007100000"));
        assert_eq!(classify("ZZ"), CatCommand::Passthrough("ZZ"));
    }

    #[test]
    fn frame_reassembly_keeps_partial_tail() {
        let mut acc = String::from("ZZXV1;ZZFA123;ZZF");
        let mut frames = Vec::new();
        drain_frames(&mut acc, |f| frames.push(f.to_string()));
        assert_eq!(frames, vec!["ZZXV1", "ZZFA123"]);
        assert_eq!(acc, "ZZF");

        acc.push_str("B77;");
        frames.clear();
        drain_frames(&mut acc, |f| frames.push(f.to_string()));
        assert_eq!(frames, vec!["ZZFB77"]);
        assert!(acc.is_empty());
    }

    #[test]
    fn queue_refuses_without_connection() {
        let bridge = CatBridge::new();
        bridge.send_message(true, "ZZXV;");
        assert!(bridge.out_rx.try_recv().is_err(), "no port assigned");
        bridge.port_assigned.store(true, Ordering::Release);
        bridge.send_message(true, "ZZXV;");
        assert_eq!(bridge.out_rx.try_recv().expect("queued"), "ZZXV;");
        bridge.send_message(false, "ZZXV;");
        assert!(bridge.out_rx.try_recv().is_err(), "inactive session drops");
    }
}
