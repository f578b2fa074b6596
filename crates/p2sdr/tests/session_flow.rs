// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! End-to-end session tests against the command loop over real localhost
//! sockets, with the register window backed by memory.

use p2sdr::config::{BOARD_ID_SATURN, EP_DDC_IQ_0, EP_HIGH_PRIORITY_OUT};
use p2sdr::engine::endpoints::make_udp_socket;
use p2sdr::engine::session::SessionState;
use p2sdr::engine::{command, high_priority_in, watchdog, EngineShared};
use p2sdr::hw::regmap::{ADDR_DDC_FREQ, ADDR_RF_GPIO, ADDR_SW_VERSION, GPIO_MOX, GPIO_TX_ENABLE};
use p2sdr::hw::{MemWindow, RegisterBank};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

const MAC: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];

struct Harness {
    win: Arc<MemWindow>,
    engine: Arc<EngineShared>,
    server_port: u16,
    client: UdpSocket,
}

fn start_harness() -> Harness {
    let win = Arc::new(MemWindow::new());
    win.poke(ADDR_SW_VERSION, 14 << 4); // firmware 14
    let bank = Arc::new(RegisterBank::new(win.clone()).expect("bank"));
    let engine = EngineShared::new(bank);

    let server_socket = make_udp_socket(0, "command").expect("server socket");
    let server_port = server_socket.local_addr().expect("addr").port();

    {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            command::run(&engine, &server_socket, MAC, BOARD_ID_SATURN).expect("command loop");
        });
    }

    let client = UdpSocket::bind("127.0.0.1:0").expect("client socket");
    client
        .set_read_timeout(Some(Duration::from_millis(500)))
        .expect("timeout");
    Harness {
        win,
        engine,
        server_port,
        client,
    }
}

impl Harness {
    fn send(&self, packet: &[u8]) {
        self.client
            .send_to(packet, ("127.0.0.1", self.server_port))
            .expect("send");
    }

    fn wait_for_state(&self, want: SessionState) {
        for _ in 0..100 {
            if self.engine.session.state() == want {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!(
            "session never reached {:?}, stuck at {:?}",
            want,
            self.engine.session.state()
        );
    }
}

fn discovery_packet() -> [u8; 60] {
    let mut pkt = [0u8; 60];
    pkt[4] = 0x02;
    pkt
}

fn general_packet() -> [u8; 60] {
    let mut pkt = [0u8; 60];
    pkt[4] = 0x00;
    pkt
}

fn high_priority_packet(run: bool, mox: bool) -> Vec<u8> {
    let mut pkt = vec![0u8; 1444];
    pkt[4] = u8::from(run) | (u8::from(mox) << 1);
    pkt
}

#[test]
fn discovery_reply_shape_and_state_byte() {
    let h = start_harness();
    h.send(&discovery_packet());

    let mut reply = [0u8; 128];
    let (n, _) = h.client.recv_from(&mut reply).expect("reply");
    assert_eq!(n, 60);
    assert_eq!(reply[4], 2, "idle state byte");
    assert_eq!(&reply[5..11], &MAC);
    assert_eq!(reply[11], 10);
    assert_eq!(reply[12], 39);
    assert_eq!(reply[13], 20);
    assert_eq!(reply[20], 4);
    assert_eq!(reply[21], 1);

    h.engine.session.request_exit();
}

#[test]
fn session_entry_ports_and_frequency() {
    let h = start_harness();

    // general packet: defaults except DDC I/Q base port 1080, PA enabled
    let mut general = general_packet();
    general[17..19].copy_from_slice(&1080u16.to_be_bytes());
    general[58] = 1;
    h.send(&general);
    h.wait_for_state(SessionState::Armed);
    assert_eq!(h.engine.endpoints.get(EP_DDC_IQ_0).port(), 1080);
    assert_eq!(h.engine.endpoints.get(EP_DDC_IQ_0 + 9).port(), 1089);
    assert_eq!(h.engine.endpoints.get(EP_HIGH_PRIORITY_OUT).port(), 1025);

    // high priority with the run bit and a DDC0 frequency
    let mut hp = high_priority_packet(true, false);
    hp[9..13].copy_from_slice(&0x1000_0000u32.to_be_bytes());
    high_priority_in::handle(&h.engine, &hp).expect("hp");
    assert_eq!(h.engine.session.state(), SessionState::Active);
    assert_eq!(h.win.peek(ADDR_DDC_FREQ[0]), 0x1000_0000);
    assert_eq!(
        h.engine.session.reply_ip(),
        Some(std::net::Ipv4Addr::new(127, 0, 0, 1))
    );

    // discovery now reports the active state byte
    h.send(&discovery_packet());
    let mut reply = [0u8; 128];
    let (_, _) = h.client.recv_from(&mut reply).expect("reply");
    assert_eq!(reply[4], 3);

    h.engine.session.request_exit();
}

#[test]
fn activity_timeout_reverts_to_idle_but_keeps_frequency() {
    let h = start_harness();
    {
        let engine = Arc::clone(&h.engine);
        std::thread::spawn(move || watchdog::run(&engine));
    }

    let mut general = general_packet();
    general[38] = 1; // hardware timer enable
    h.send(&general);
    h.wait_for_state(SessionState::Armed);

    let mut hp = high_priority_packet(true, true);
    hp[9..13].copy_from_slice(&0x1000_0000u32.to_be_bytes());
    high_priority_in::handle(&h.engine, &hp).expect("hp");
    assert_eq!(h.engine.session.state(), SessionState::Active);
    let gpio = h.win.peek(ADDR_RF_GPIO);
    assert_ne!(gpio & (1 << GPIO_TX_ENABLE), 0);
    assert_ne!(gpio & (1 << GPIO_MOX), 0);

    // cease all traffic; the watchdog drops the session within ~2 s
    for _ in 0..50 {
        if h.engine.session.state() == SessionState::Idle {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    assert_eq!(h.engine.session.state(), SessionState::Idle);
    let gpio = h.win.peek(ADDR_RF_GPIO);
    assert_eq!(gpio & (1 << GPIO_TX_ENABLE), 0, "TX enable cleared");
    assert_eq!(gpio & (1 << GPIO_MOX), 0, "MOX cleared");
    let keyer = h.win.peek(p2sdr::hw::regmap::ADDR_KEYER_CONFIG);
    assert_eq!(keyer >> 31, 0, "keyer enable cleared");
    // frequency is not reset by the timeout
    assert_eq!(h.win.peek(ADDR_DDC_FREQ[0]), 0x1000_0000);

    h.engine.session.request_exit();
}
