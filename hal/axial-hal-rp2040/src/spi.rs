//! Blocking SPI0 master

use axial_hal::spi::{self as hal, SpiConfig};
use embassy_rp::peripherals::{PIN_16, PIN_18, PIN_19, SPI0};
use embassy_rp::spi::{self, Blocking, Phase, Polarity, Spi};
use embassy_rp::Peri;

/// SPI0 on SCK 18, MOSI 19, MISO 16
///
/// Chip selects are driven separately, so any number of chips can share it.
pub struct Spi0 {
    spi: Spi<'static, SPI0, Blocking>,
}

impl Spi0 {
    pub fn new(
        spi: Peri<'static, SPI0>,
        sck: Peri<'static, PIN_18>,
        mosi: Peri<'static, PIN_19>,
        miso: Peri<'static, PIN_16>,
        config: SpiConfig,
    ) -> Self {
        Self {
            spi: Spi::new_blocking(spi, sck, mosi, miso, spi_config(config)),
        }
    }
}

fn spi_config(config: SpiConfig) -> spi::Config {
    let (polarity, phase): (hal::Polarity, hal::Phase) = config.mode.into();
    let mut out = spi::Config::default();
    out.frequency = config.frequency;
    out.polarity = match polarity {
        hal::Polarity::IdleLow => Polarity::IdleLow,
        hal::Polarity::IdleHigh => Polarity::IdleHigh,
    };
    out.phase = match phase {
        hal::Phase::CaptureOnFirstTransition => Phase::CaptureOnFirstTransition,
        hal::Phase::CaptureOnSecondTransition => Phase::CaptureOnSecondTransition,
    };
    out
}

impl axial_hal::SpiBus for Spi0 {
    type Error = spi::Error;

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), spi::Error> {
        self.spi.blocking_transfer(read, write)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), spi::Error> {
        self.spi.blocking_write(data)
    }

    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), spi::Error> {
        self.spi.blocking_transfer_in_place(data)
    }
}
