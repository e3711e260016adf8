//! UART serial communication abstractions
//!
//! Trinamic UART drivers are reached either through a hardware UART
//! peripheral or through a software-emulated serial line bound to two GPIO
//! pins. Both present the same byte-stream interface here.

/// UART transmitter
pub trait UartTx {
    /// Error type for transmit operations
    type Error;

    /// Write data to the UART
    ///
    /// Blocks until all data has been written or an error occurs.
    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// UART receiver
pub trait UartRx {
    /// Error type for receive operations
    type Error;

    /// Read data from the UART
    ///
    /// Blocks until the buffer is filled, the line times out, or an error
    /// occurs. Returns the number of bytes read.
    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Discard everything received so far
    ///
    /// On a single-wire line every byte sent is heard back, so the receive
    /// side must be emptied before waiting for a reply.
    fn clear_rx(&mut self) -> Result<(), Self::Error>;

    /// Read a single byte from the UART
    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.read_blocking(&mut buf)?;
        Ok(buf[0])
    }
}

/// A serial line a driver chip can be configured through
///
/// `begin` is the transport handshake: it must complete before any
/// register traffic is sent. For hardware UARTs it applies the line
/// settings, for emulated lines it also idles the TX pin high.
pub trait SerialPort: UartTx + UartRx {
    /// Open the line at the given baud rate
    fn begin(&mut self, baudrate: u32) -> Result<(), <Self as UartTx>::Error>;

    /// Whether the line has been opened with [`SerialPort::begin`]
    fn is_open(&self) -> bool;

    /// Whether the line can receive
    ///
    /// Emulated lines may be wired TX-only, in which case register
    /// read-back is unavailable.
    fn has_rx(&self) -> bool {
        true
    }
}

/// UART configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl UartConfig {
    /// 8N1 at the given baud rate, the framing Trinamic UART drivers use
    pub const fn eight_n_one(baudrate: u32) -> Self {
        Self {
            baudrate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::eight_n_one(115_200)
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}
