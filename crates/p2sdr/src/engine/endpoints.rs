// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Endpoint table and socket construction.
//!
//! A fixed, indexed array of endpoint records, one per known UDP stream.
//! Endpoints are created at start-up and live for the process lifetime;
//! only the bound port may change. The supervisor writes port numbers and
//! command bits with release semantics; the owning thread reads them at
//! frame boundaries with acquire semantics.

use crate::config::{DEFAULT_PORTS, ENDPOINT_COUNT, ENDPOINT_NAMES};
use crate::error::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::time::Duration;

/// Asynchronous command bits from the supervisor to an endpoint's owner.
pub const CMD_CHANGE_PORT: u32 = 1;
/// DDC I/Q endpoints: interleave with the next DDC.
pub const CMD_INTERLEAVE: u32 = 2;
/// DDC I/Q endpoints: DDC enabled.
pub const CMD_DDC_ENABLE: u32 = 4;

/// One endpoint record.
pub struct Endpoint {
    index: usize,
    name: &'static str,
    port: AtomicU16,
    active: AtomicBool,
    commands: AtomicU32,
    /// DDC sample rate in kHz, only meaningful for DDC I/Q entries.
    ddc_sample_rate: AtomicU32,
}

impl Endpoint {
    fn new(index: usize) -> Self {
        Self {
            index,
            name: ENDPOINT_NAMES[index],
            port: AtomicU16::new(DEFAULT_PORTS[index]),
            active: AtomicBool::new(false),
            commands: AtomicU32::new(0),
            ddc_sample_rate: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Consume one command bit if it is set.
    #[must_use]
    pub fn take_command(&self, bit: u32) -> bool {
        self.commands.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    #[must_use]
    pub fn has_command(&self, bit: u32) -> bool {
        self.commands.load(Ordering::Acquire) & bit != 0
    }

    pub fn set_command(&self, bit: u32) {
        self.commands.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn clear_command(&self, bit: u32) {
        self.commands.fetch_and(!bit, Ordering::AcqRel);
    }

    pub fn set_ddc_sample_rate(&self, rate_khz: u32) {
        self.ddc_sample_rate.store(rate_khz, Ordering::Release);
    }

    #[must_use]
    pub fn ddc_sample_rate(&self) -> u32 {
        self.ddc_sample_rate.load(Ordering::Acquire)
    }
}

/// The fixed endpoint table.
pub struct EndpointTable {
    entries: Vec<Endpoint>,
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: (0..ENDPOINT_COUNT).map(Endpoint::new).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> &Endpoint {
        &self.entries[index]
    }

    /// Set one endpoint's port. 0 selects the documented default. When the
    /// effective port differs from the current one the change-port command
    /// bit is raised for the owning thread.
    pub fn set_port(&self, index: usize, port: u16) {
        let entry = &self.entries[index];
        let effective = if port == 0 {
            DEFAULT_PORTS[index]
        } else {
            port
        };
        let previous = entry.port.swap(effective, Ordering::AcqRel);
        if previous != effective {
            log::debug!(
                "[endpoints] '{}' port {} -> {}",
                entry.name,
                previous,
                effective
            );
            entry.set_command(CMD_CHANGE_PORT);
        }
    }

    /// Apply the port table from a general packet. The command endpoint
    /// itself stays on 1024.
    pub fn apply_general_ports(&self, ports: &[u16; ENDPOINT_COUNT]) {
        for index in 1..ENDPOINT_COUNT {
            self.set_port(index, ports[index]);
        }
    }
}

/// Make a UDP socket bound to 0.0.0.0 on the given port, with address
/// reuse and a 1 ms receive timeout so owning threads poll their
/// cancellation flags at kHz rate.
pub fn make_udp_socket(port: u16, endpoint: &'static str) -> Result<UdpSocket> {
    let wrap = |source| Error::Init {
        what: endpoint,
        source,
    };
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(wrap)?;
    socket.set_reuse_address(true).map_err(wrap)?;
    socket
        .set_read_timeout(Some(Duration::from_millis(1)))
        .map_err(wrap)?;
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into()).map_err(wrap)?;
    Ok(socket.into())
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EP_DDC_IQ_0, EP_DDC_SPECIFIC};

    #[test]
    fn default_ports_loaded() {
        let table = EndpointTable::new();
        assert_eq!(table.get(0).port(), 1024);
        assert_eq!(table.get(EP_DDC_SPECIFIC).port(), 1025);
        assert_eq!(table.get(EP_DDC_IQ_0 + 9).port(), 1044);
    }

    #[test]
    fn zero_restores_default_and_change_flag_tracks_difference() {
        let table = EndpointTable::new();
        let ep = table.get(EP_DDC_IQ_0);

        table.set_port(EP_DDC_IQ_0, 1080);
        assert_eq!(ep.port(), 1080);
        assert!(ep.take_command(CMD_CHANGE_PORT));
        assert!(!ep.has_command(CMD_CHANGE_PORT));

        // same port again: no new command
        table.set_port(EP_DDC_IQ_0, 1080);
        assert!(!ep.has_command(CMD_CHANGE_PORT));

        // zero returns to the default
        table.set_port(EP_DDC_IQ_0, 0);
        assert_eq!(ep.port(), 1035);
        assert!(ep.take_command(CMD_CHANGE_PORT));
    }

    #[test]
    fn command_bits_independent() {
        let table = EndpointTable::new();
        let ep = table.get(EP_DDC_IQ_0);
        ep.set_command(CMD_DDC_ENABLE | CMD_INTERLEAVE);
        assert!(ep.take_command(CMD_INTERLEAVE));
        assert!(ep.has_command(CMD_DDC_ENABLE));
        ep.clear_command(CMD_DDC_ENABLE);
        assert!(!ep.has_command(CMD_DDC_ENABLE));
    }

    #[test]
    fn socket_binds_with_timeout() {
        let socket = make_udp_socket(0, "test").expect("socket");
        assert!(socket.read_timeout().expect("timeout").is_some());
        let mut buf = [0u8; 4];
        // times out rather than blocking forever
        let err = socket.recv_from(&mut buf).expect_err("no data");
        assert!(
            matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            "unexpected error {:?}",
            err
        );
    }
}
