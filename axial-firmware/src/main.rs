//! Axial - Stepper Driver Bring-Up Firmware
//!
//! Brings every configured stepper driver into a known state, then either
//! hands over to motion (all drivers ready) or parks the machine.
//!
//! The driver bindings come from machine.toml, validated and serialised by
//! the build script.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Timer;
use {defmt_rtt as _, panic_probe as _};

use axial_core::config::{AxisId, MachineConfig};
use axial_core::state::State;
use axial_core::traits::{DiagnosticSink, DiagnosticValue};
use axial_drivers::{bring_up_all_drivers, BusSet};
use axial_hal::spi::SpiConfig;
use axial_hal_rp2040::{split, HardwareSerial, Spi0};

mod board;

use board::Rp2040Board;

/// Configuration produced by build.rs from machine.toml
static EMBEDDED_CONFIG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/machine_config.bin"));

/// Reports driver register read-back over RTT
struct DefmtSink;

impl DiagnosticSink for DefmtSink {
    fn report(&mut self, axis: AxisId, key: &str, value: DiagnosticValue) {
        match value {
            DiagnosticValue::Flag(flag) => info!("{}: {} = {}", axis.name(), key, flag),
            DiagnosticValue::Register(reg) => info!("{}: {} = {=u32:#x}", axis.name(), key, reg),
        }
    }
}

/// Main entry point
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Axial firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let config: MachineConfig = match postcard::from_bytes(EMBEDDED_CONFIG) {
        Ok(config) => config,
        Err(_) => {
            error!("Embedded configuration is unreadable");
            park().await;
            return;
        }
    };
    if config.version != MachineConfig::VERSION {
        error!(
            "Configuration version {} (expected {})",
            config.version,
            MachineConfig::VERSION
        );
        park().await;
        return;
    }
    info!("Configuration loaded: {} axes", config.bindings.len());

    let (pins, fixed) = split(p);

    // SPI0 is bus 0 in the SPI arena, UART1 is bus 0 in the serial arena
    let mut buses = BusSet::new();
    let spi = Spi0::new(
        fixed.spi0,
        fixed.spi0_sck,
        fixed.spi0_mosi,
        fixed.spi0_miso,
        SpiConfig::default(),
    );
    let uart = HardwareSerial::new(fixed.uart1, fixed.uart1_tx, fixed.uart1_rx);
    if buses.add_spi(spi).is_err() || buses.add_serial(uart).is_err() {
        error!("Bus arena full");
        park().await;
        return;
    }

    let mut board = Rp2040Board::new(pins);
    let mut sink = DefmtSink;

    let report = match bring_up_all_drivers(&config, &mut board, &mut buses, &mut sink) {
        Ok(report) => report,
        Err(e) => {
            error!("Configuration rejected: {}", e);
            park().await;
            return;
        }
    };

    for failure in &report.failures {
        error!(
            "{}: {} phase failed: {}",
            failure.axis.name(),
            failure.phase,
            failure.error
        );
    }

    match report.state {
        State::Ready if report.failures.is_empty() => info!("All drivers ready"),
        State::Ready => warn!("{} axes left unconfigured, motion on them is unsafe", report.failures.len()),
        state => {
            error!("Bring-up ended in {}, parking", state);
            park().await;
            return;
        }
    }

    // Motion control takes over from here
    loop {
        Timer::after_secs(1).await;
    }
}

/// Stop here for good; nothing else may touch the drivers
async fn park() {
    loop {
        Timer::after_secs(60).await;
    }
}
