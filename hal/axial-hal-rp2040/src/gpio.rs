//! GPIO outputs

use embassy_rp::gpio::{AnyPin, Level, Output};
use embassy_rp::Peri;

/// Push-pull output implementing [`axial_hal::OutputPin`]
pub struct GpioOutput {
    pin: Output<'static>,
}

impl GpioOutput {
    /// Configure a pin as output, starting high
    ///
    /// Chip selects are active low, so high keeps the chip deselected.
    pub fn new(pin: Peri<'static, AnyPin>) -> Self {
        Self {
            pin: Output::new(pin, Level::High),
        }
    }
}

impl axial_hal::OutputPin for GpioOutput {
    fn set_high(&mut self) {
        self.pin.set_high();
    }

    fn set_low(&mut self) {
        self.pin.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.pin.is_set_high()
    }
}
