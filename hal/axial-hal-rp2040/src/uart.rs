//! Hardware UART1
//!
//! The peripheral is only configured when the bus is begun, since the baud
//! rate is chosen by the bring-up code and not by the board.

use axial_hal::uart::{DataBits, Parity, StopBits, UartConfig};
use axial_hal::{SerialPort, UartRx, UartTx};
use embassy_rp::peripherals::{PIN_8, PIN_9, UART1};
use embassy_rp::uart::{self, Blocking, Uart};
use embassy_rp::Peri;
use embassy_time::{Duration, Instant};

/// How long a read waits for the next byte
pub const BYTE_TIMEOUT: Duration = Duration::from_millis(5);

/// Hardware serial failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialError {
    /// Used before `begin`
    NotOpen,
    /// The peripheral reported a line error
    Line(uart::Error),
}

enum Line {
    Closed {
        uart: Peri<'static, UART1>,
        tx: Peri<'static, PIN_8>,
        rx: Peri<'static, PIN_9>,
    },
    Open(Uart<'static, Blocking>),
    Opening,
}

/// UART1 on TX 8, RX 9
pub struct HardwareSerial {
    line: Line,
}

impl HardwareSerial {
    pub fn new(uart: Peri<'static, UART1>, tx: Peri<'static, PIN_8>, rx: Peri<'static, PIN_9>) -> Self {
        Self {
            line: Line::Closed { uart, tx, rx },
        }
    }

    fn open(&mut self) -> Result<&mut Uart<'static, Blocking>, SerialError> {
        match &mut self.line {
            Line::Open(uart) => Ok(uart),
            _ => Err(SerialError::NotOpen),
        }
    }
}

fn uart_config(config: UartConfig) -> uart::Config {
    let mut out = uart::Config::default();
    out.baudrate = config.baudrate;
    out.data_bits = match config.data_bits {
        DataBits::Seven => uart::DataBits::DataBits7,
        DataBits::Eight => uart::DataBits::DataBits8,
    };
    out.parity = match config.parity {
        Parity::None => uart::Parity::ParityNone,
        Parity::Even => uart::Parity::ParityEven,
        Parity::Odd => uart::Parity::ParityOdd,
    };
    out.stop_bits = match config.stop_bits {
        StopBits::One => uart::StopBits::STOP1,
        StopBits::Two => uart::StopBits::STOP2,
    };
    out
}

impl UartTx for HardwareSerial {
    type Error = SerialError;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.open()?.blocking_write(data).map_err(SerialError::Line)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.open()?.blocking_flush().map_err(SerialError::Line)
    }
}

impl UartRx for HardwareSerial {
    type Error = SerialError;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let uart = self.open()?;
        let mut count = 0;
        let mut deadline = Instant::now() + BYTE_TIMEOUT;

        while count < buf.len() {
            match embedded_hal_nb::serial::Read::read(uart) {
                Ok(byte) => {
                    buf[count] = byte;
                    count += 1;
                    deadline = Instant::now() + BYTE_TIMEOUT;
                }
                Err(nb::Error::WouldBlock) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(nb::Error::Other(e)) => return Err(SerialError::Line(e)),
            }
        }
        Ok(count)
    }

    fn clear_rx(&mut self) -> Result<(), SerialError> {
        let uart = self.open()?;
        loop {
            match embedded_hal_nb::serial::Read::read(uart) {
                // Overruns and framing errors on stale bytes are dropped too
                Ok(_) | Err(nb::Error::Other(_)) => {}
                Err(nb::Error::WouldBlock) => return Ok(()),
            }
        }
    }
}

impl SerialPort for HardwareSerial {
    fn begin(&mut self, baudrate: u32) -> Result<(), SerialError> {
        self.line = match core::mem::replace(&mut self.line, Line::Opening) {
            Line::Closed { uart, tx, rx } => {
                let config = uart_config(UartConfig::eight_n_one(baudrate));
                Line::Open(Uart::new_blocking(uart, tx, rx, config))
            }
            line => line,
        };
        Ok(())
    }

    fn is_open(&self) -> bool {
        matches!(self.line, Line::Open(_))
    }
}
