//! Bit-banged serial line
//!
//! 8N1 framing timed with cycle-counted delays. Each byte is sent and
//! sampled with interrupts masked so the bit edges stay put. Good for the
//! short register datagrams of UART stepper drivers, not for bulk data.

use axial_hal::{SerialPort, UartRx, UartTx};
use embassy_rp::gpio::{AnyPin, Input, Level, Output, Pull};
use embassy_rp::Peri;
use embassy_time::{Duration, Instant};

/// How long a read waits for the next start bit
pub const BYTE_TIMEOUT: Duration = Duration::from_millis(5);

/// Emulated serial failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SoftSerialError {
    /// Used before `begin`
    NotOpen,
    /// Read on a line wired without an RX pin
    NoReceiver,
    /// Stop bit was not high
    Framing,
}

/// Serial line on two arbitrary GPIO pins
pub struct SoftSerial {
    tx: Output<'static>,
    rx: Option<Input<'static>>,
    /// Core cycles per bit, zero until opened
    bit_cycles: u32,
}

impl SoftSerial {
    /// Claim the pins; TX idles high
    pub fn new(tx: Peri<'static, AnyPin>, rx: Option<Peri<'static, AnyPin>>) -> Self {
        Self {
            tx: Output::new(tx, Level::High),
            rx: rx.map(|pin| Input::new(pin, Pull::Up)),
            bit_cycles: 0,
        }
    }

    fn bit_cycles(&self) -> Result<u32, SoftSerialError> {
        match self.bit_cycles {
            0 => Err(SoftSerialError::NotOpen),
            cycles => Ok(cycles),
        }
    }

    fn send_byte(&mut self, byte: u8, bit: u32) {
        cortex_m::interrupt::free(|_| {
            self.tx.set_low();
            cortex_m::asm::delay(bit);
            for i in 0..8 {
                self.tx.set_level(Level::from(byte & (1 << i) != 0));
                cortex_m::asm::delay(bit);
            }
            self.tx.set_high();
            cortex_m::asm::delay(bit);
        });
    }
}

/// Sample one byte whose start bit has just been seen
fn sample_byte(rx: &Input<'static>, bit: u32) -> Result<u8, SoftSerialError> {
    cortex_m::interrupt::free(|_| {
        // Middle of the start bit, then one bit period per data bit
        cortex_m::asm::delay(bit / 2);
        let mut byte = 0u8;
        for i in 0..8 {
            cortex_m::asm::delay(bit);
            if rx.is_high() {
                byte |= 1 << i;
            }
        }
        cortex_m::asm::delay(bit);
        if rx.is_high() {
            Ok(byte)
        } else {
            Err(SoftSerialError::Framing)
        }
    })
}

impl UartTx for SoftSerial {
    type Error = SoftSerialError;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), SoftSerialError> {
        let bit = self.bit_cycles()?;
        for &byte in data {
            self.send_byte(byte, bit);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SoftSerialError> {
        // Bytes leave the pin as they are written
        Ok(())
    }
}

impl UartRx for SoftSerial {
    type Error = SoftSerialError;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, SoftSerialError> {
        let bit = self.bit_cycles()?;
        let rx = self.rx.as_ref().ok_or(SoftSerialError::NoReceiver)?;

        for (count, slot) in buf.iter_mut().enumerate() {
            let deadline = Instant::now() + BYTE_TIMEOUT;
            while rx.is_high() {
                if Instant::now() >= deadline {
                    return Ok(count);
                }
            }
            *slot = sample_byte(rx, bit)?;
        }
        Ok(buf.len())
    }

    fn clear_rx(&mut self) -> Result<(), SoftSerialError> {
        // Nothing is buffered; the pin is only sampled inside a read
        Ok(())
    }
}

impl SerialPort for SoftSerial {
    fn begin(&mut self, baudrate: u32) -> Result<(), SoftSerialError> {
        self.bit_cycles = embassy_rp::clocks::clk_sys_freq() / baudrate.max(1);
        self.tx.set_high();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.bit_cycles != 0
    }

    fn has_rx(&self) -> bool {
        self.rx.is_some()
    }
}
