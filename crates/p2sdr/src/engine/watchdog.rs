// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Activity watchdog and console exit checker.
//!
//! The watchdog sleeps one second, then checks whether any inbound message
//! arrived in the interval. A silent interval with the hardware-timer
//! enable set (from the general packet) forces the session out of Active:
//! a vanished client must not leave the transmitter keyed.

use super::EngineShared;
use std::io::Read;
use std::time::Duration;

/// One-second activity watchdog; runs until exit is requested.
pub fn run(engine: &EngineShared) {
    log::info!("[watchdog] started");
    loop {
        std::thread::sleep(Duration::from_secs(1));
        if engine.session.exit_requested() {
            return;
        }
        let had_traffic = engine.session.take_message_flag();
        if !had_traffic && engine.session.hw_timer_enabled() {
            use super::session::SessionState;
            if engine.session.state() != SessionState::Idle {
                log::info!("[watchdog] no traffic for 1 s, dropping session");
                if let Err(err) = engine.session.drain(&engine.bank) {
                    log::error!("[watchdog] drain failed: {}", err);
                    engine.session.report_thread_error("watchdog");
                    return;
                }
            }
        }
    }
}

/// Console exit checker: the character 'x' (or 'X') on stdin requests a
/// clean shutdown. Suppressed with `-s` when running as a service.
pub fn run_exit_checker(engine: &EngineShared) {
    log::info!("[exit] press 'x <enter>' to close");
    let mut stdin = std::io::stdin();
    let mut byte = [0u8; 1];
    loop {
        match stdin.read(&mut byte) {
            Ok(1) => {
                if byte[0] == b'x' || byte[0] == b'X' {
                    log::info!("[exit] shutdown requested from console");
                    engine.session.request_exit();
                    return;
                }
            }
            Ok(_) => {
                // EOF (stdin closed): nothing will ever arrive
                std::thread::sleep(Duration::from_millis(10));
                if engine.session.exit_requested() {
                    return;
                }
            }
            Err(_) => {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}
