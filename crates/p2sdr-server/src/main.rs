// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! p2sdr server daemon.
//!
//! Brings up the Saturn-class hardware, spawns the stream threads and runs
//! the discovery/command loop on the main thread.
//!
//! # Usage
//!
//! ```bash
//! # Normal operation; press 'x <enter>' to close
//! p2sdr-server
//!
//! # Identify as an Orion Mk 2, balanced mic input, debug logging
//! p2sdr-server -i orionmk2 -m xlr -d
//!
//! # Route both ADCs to the internal test DDS at 1.9 MHz
//! p2sdr-server -f 1900000
//!
//! # Run as a service (no console exit checker)
//! p2sdr-server -s
//! ```

use clap::{Parser, ValueEnum};
use p2sdr::config::{
    BOARD_ID_ORION_MK2, BOARD_ID_SATURN, EP_COMMAND, REGISTER_DEVICE, TX_AMPL_SCALE_FACTOR,
};
use p2sdr::engine::endpoints::make_udp_socket;
use p2sdr::engine::{command, spawn_streams, watchdog, EngineShared};
use p2sdr::hw::{RegisterBank, TxModulationSource, XdmaWindow};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Board identity reported in discovery replies.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BoardId {
    Saturn,
    Orionmk2,
}

/// Microphone input connector.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum MicInput {
    /// Balanced XLR input.
    Xlr,
    /// Unbalanced 3.5 mm jack.
    Jack,
}

/// HPSDR protocol-2 packet server
#[derive(Parser, Debug)]
#[command(name = "p2sdr-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Board id used in discovery replies
    #[arg(short = 'i', long = "identify", value_enum, default_value = "saturn")]
    identify: BoardId,

    /// Microphone input connector
    #[arg(short = 'm', long = "mic", value_enum, default_value = "jack")]
    mic: MicInput,

    /// Enable the internal test DDS at this frequency (Hz) and route both
    /// ADCs to it
    #[arg(short = 'f', long = "test-frequency")]
    test_frequency: Option<u32>,

    /// Skip the console exit checker, for running as a service
    #[arg(short = 's', long = "service")]
    service: bool,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

static SIGINT_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    SIGINT_SEEN.store(true, Ordering::SeqCst);
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match run(&args) {
        Ok(clean) => {
            if clean {
                info!("exiting");
                ExitCode::SUCCESS
            } else {
                error!("thread error reported - exiting");
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("fatal: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Returns Ok(true) on a clean shutdown, Ok(false) when a stream thread
/// reported a fatal error.
fn run(args: &Args) -> p2sdr::Result<bool> {
    info!("p2sdr server - press 'x <enter>' in console to close");

    // hardware bring-up
    let window = Arc::new(XdmaWindow::open(REGISTER_DEVICE)?);
    let bank = Arc::new(RegisterBank::new(window)?);
    let fw = bank.firmware_info();
    info!(
        "firmware version {} (id {}), product {:?}",
        fw.version,
        fw.id,
        bank.product_info()?
    );
    if let Ok(temp) = bank.die_temperature_celsius() {
        info!("FPGA die temperature {:.1} C", temp);
    }
    if fw.id == 3 {
        warn!("FPGA load is a fallback - re-flash the primary image!");
    }

    bank.codec_initialise()?;
    bank.initialise_cw_keyer_ramp(true, 5_000)?;
    bank.set_cw_sidetone_enabled(true)?;
    bank.set_tx_protocol_p2(true)?;
    bank.set_tx_modulation_source(TxModulationSource::IqData)?;
    bank.set_byte_swapping(true)?;
    bank.set_spkr_mute(false)?;
    bank.set_tx_amplitude_scaling(TX_AMPL_SCALE_FACTOR)?;
    bank.enable_alex_manual_filter_select(true);
    bank.set_balanced_mic_input(matches!(args.mic, MicInput::Xlr))?;

    if let Some(freq) = args.test_frequency {
        info!("test source selected, frequency {} Hz", freq);
        bank.set_test_dds_frequency(freq, false)?;
        bank.use_test_dds_source()?;
    }

    let engine = EngineShared::new(bank);

    // SIGINT requests the same clean shutdown as the console 'x'
    // SAFETY: the handler only stores to an atomic.
    unsafe {
        let handler = on_sigint as extern "C" fn(libc::c_int);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
    {
        let engine = Arc::clone(&engine);
        std::thread::Builder::new()
            .name("sigint".into())
            .spawn(move || loop {
                if SIGINT_SEEN.load(Ordering::SeqCst) {
                    info!("received SIGINT");
                    engine.session.request_exit();
                    return;
                }
                if engine.session.exit_requested() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(50));
            })
            .expect("thread spawn");
    }

    if !args.service {
        let engine = Arc::clone(&engine);
        std::thread::Builder::new()
            .name("exit-checker".into())
            .spawn(move || watchdog::run_exit_checker(&engine))
            .expect("thread spawn");
    } else {
        info!("skipping check for exit keys");
    }

    let _stream_handles = spawn_streams(&engine)?;

    // command/discovery loop on the main thread
    let command_socket = make_udp_socket(engine.endpoints.get(EP_COMMAND).port(), "command")?;
    let mac = command::host_mac(&command_socket, "eth0");
    let board_id = match args.identify {
        BoardId::Saturn => BOARD_ID_SATURN,
        BoardId::Orionmk2 => BOARD_ID_ORION_MK2,
    };
    info!(
        "discovery identity: board id {} mac {:02x?}",
        board_id, mac
    );

    command::run(&engine, &command_socket, mac, board_id)?;

    // orderly shutdown: make sure nothing is left keyed
    engine.session.request_exit();
    if engine.cat.port_assigned() {
        engine.cat.shutdown();
    }
    engine.bank.set_mox(false)?;
    engine.bank.set_tx_enable(false)?;
    engine.bank.enable_cw(false, false)?;

    Ok(!engine.session.thread_error())
}
