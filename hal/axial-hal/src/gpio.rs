//! GPIO pin abstractions
//!
//! Driver bring-up only drives pins: SPI chip selects and, on some boards,
//! the TX line of an emulated serial port.

/// Digital output pin
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Set the pin to a specific state
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Check if the pin is currently set high
    fn is_set_high(&self) -> bool;
}

/// Active-low chip select built on an [`OutputPin`]
///
/// Every SPI stepper driver here selects on a low level. Wrapping the pin
/// keeps the polarity in one place.
pub struct ChipSelect<P> {
    pin: P,
}

impl<P: OutputPin> ChipSelect<P> {
    /// Wrap a pin and drive it to the deselected (high) level
    pub fn new(mut pin: P) -> Self {
        pin.set_high();
        Self { pin }
    }

    /// Select the chip
    pub fn select(&mut self) {
        self.pin.set_low();
    }

    /// Deselect the chip
    pub fn deselect(&mut self) {
        self.pin.set_high();
    }

    /// Whether the chip is currently selected
    pub fn is_selected(&self) -> bool {
        !self.pin.is_set_high()
    }
}
