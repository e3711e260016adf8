//! Board resources handed to the slot builder

use axial_core::config::AxisId;
use axial_drivers::BoardResources;
use axial_hal_rp2040::{GpioOutput, PinPool, SoftSerial};
use defmt::warn;

/// RP2040 board: chip selects and emulated serial lines come from the pin pool
pub struct Rp2040Board {
    pins: PinPool,
}

impl Rp2040Board {
    pub fn new(pins: PinPool) -> Self {
        Self { pins }
    }
}

impl BoardResources for Rp2040Board {
    type Pin = GpioOutput;
    type Serial = SoftSerial;

    fn chip_select(&mut self, axis: AxisId, pin: u8) -> Option<GpioOutput> {
        match self.pins.take(pin) {
            Ok(pin) => Some(GpioOutput::new(pin)),
            Err(e) => {
                warn!("{}: chip select gpio{} unavailable: {}", axis.name(), pin, e);
                None
            }
        }
    }

    fn software_serial(
        &mut self,
        axis: AxisId,
        rx_pin: Option<u8>,
        tx_pin: u8,
    ) -> Option<SoftSerial> {
        let tx = self
            .pins
            .take(tx_pin)
            .inspect_err(|e| warn!("{}: serial tx gpio{} unavailable: {}", axis.name(), tx_pin, e))
            .ok()?;
        let rx = match rx_pin {
            Some(pin) => Some(
                self.pins
                    .take(pin)
                    .inspect_err(|e| warn!("{}: serial rx gpio{} unavailable: {}", axis.name(), pin, e))
                    .ok()?,
            ),
            None => None,
        };
        Some(SoftSerial::new(tx, rx))
    }
}
