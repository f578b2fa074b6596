// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Discovery and command listener on the command port.
//!
//! Classifies packets by the command byte at offset 4. Only 60-byte
//! packets are processed, which filters protocol-1 discovery traffic from
//! other hardware generations (and rules out the programming packet, which
//! is unsupported anyway).

use super::EngineShared;
use crate::config::{DISCOVERY_REPLY_SIZE, GENERAL_PACKET_SIZE};
use crate::error::{Error, Result};
use crate::protocol::{command, discovery, general};
use std::net::{SocketAddr, UdpSocket};

/// Read the MAC address of a network interface through the socket's fd.
/// Falls back to all-zeros when the interface is missing (the discovery
/// reply still identifies by board id).
#[must_use]
pub fn host_mac(socket: &UdpSocket, interface: &str) -> [u8; 6] {
    use std::os::unix::io::AsRawFd;

    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in req.ifr_name.iter_mut().zip(interface.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    // SAFETY: SIOCGIFHWADDR fills the ifreq we own; the fd is a live socket.
    let rc = unsafe {
        libc::ioctl(
            socket.as_raw_fd(),
            libc::SIOCGIFHWADDR,
            &mut req as *mut libc::ifreq,
        )
    };
    if rc != 0 {
        log::warn!("[cmd] SIOCGIFHWADDR failed for {}", interface);
        return [0u8; 6];
    }
    let mut mac = [0u8; 6];
    // SAFETY: ifr_ifru is a union; SIOCGIFHWADDR wrote a sockaddr there.
    let sa_data = unsafe { req.ifr_ifru.ifru_hwaddr.sa_data };
    for (dst, src) in mac.iter_mut().zip(sa_data.iter()) {
        *dst = *src as u8;
    }
    mac
}

/// Apply a decoded general packet: endpoint ports, wideband parameters,
/// envelope PWM limits, flag bytes. The caller captures the reply address
/// and performs the Armed/Active transition.
pub fn handle_general(engine: &EngineShared, pkt: &general::GeneralPacket) -> Result<()> {
    engine.endpoints.apply_general_ports(&pkt.ports);
    engine.wideband.set(pkt.wideband);

    let bank = &engine.bank;
    bank.set_min_pwm_width(pkt.pwm_min);
    bank.set_max_pwm_width(pkt.pwm_max);
    bank.enable_timestamp(pkt.timestamp_enabled);
    bank.enable_vita49(pkt.vita49_enabled);
    bank.set_freq_phase_word(pkt.freq_is_phase_word);
    engine.session.set_hw_timer_enable(pkt.hw_timer_enable);
    bank.set_pa_enabled(pkt.pa_enabled)?;
    bank.set_apollo_enabled(pkt.apollo_enabled);
    bank.set_alex_enabled(pkt.alex_enables);
    Ok(())
}

/// Run the command loop until exit is requested or a stream thread
/// reports a fatal error. Blocks the calling thread (normally main).
pub fn run(engine: &EngineShared, socket: &UdpSocket, mac: [u8; 6], board_id: u8) -> Result<()> {
    let identity = discovery::DiscoveryIdentity { mac, board_id };
    let mut buf = [0u8; 2048];

    loop {
        let outcome = recv_packet_with_source(socket, &mut buf)?;
        if engine.session.exit_requested() || engine.session.thread_error() {
            break;
        }
        let (size, src) = match outcome {
            Some(pair) => pair,
            None => continue,
        };
        if size != GENERAL_PACKET_SIZE {
            continue;
        }
        engine.session.note_message();
        match buf[4] {
            command::GENERAL => {
                log::info!("[cmd] general packet from {}", src);
                if let SocketAddr::V4(v4) = src {
                    engine.session.arm(*v4.ip());
                }
                handle_general(engine, &general::parse(&buf[..size]))?;
                engine.session.try_activate(&engine.bank)?;
            }
            command::DISCOVERY => {
                log::info!("[cmd] discovery from {}", src);
                let reply = discovery::build_reply(&identity, engine.session.is_active());
                socket
                    .send_to(&reply, src)
                    .map_err(|source| Error::Transport {
                        endpoint: "command",
                        source,
                    })?;
                debug_assert_eq!(reply.len(), DISCOVERY_REPLY_SIZE);
            }
            command::SET_IP | command::ERASE | command::PROGRAM => {
                log::warn!("[cmd] unsupported command {:#04x} from {}", buf[4], src);
            }
            other => {
                log::debug!("[cmd] unknown command byte {:#04x}", other);
            }
        }
    }
    Ok(())
}

/// recv_from with source address, mapping the 1 ms timeout to `None`.
fn recv_packet_with_source(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> Result<Option<(usize, SocketAddr)>> {
    match socket.recv_from(buf) {
        Ok((n, src)) => Ok(Some((n, src))),
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            Ok(None)
        }
        Err(source) => Err(Error::Transport {
            endpoint: "command",
            source,
        }),
    }
}
