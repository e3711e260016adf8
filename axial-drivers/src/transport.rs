//! Transports driver chips are reached through
//!
//! Shared buses (SPI buses, hardware UARTs) live in a [`BusSet`] arena and
//! are referred to by [`BusId`]. A bus is only handed out once its handshake
//! has run, so no adapter can talk on a bus that is not ready.
//!
//! Emulated serial lines are owned by the slot that uses them ([`SerialLink`]),
//! SPI chips own their chip-select pin ([`SpiLink`]).

use axial_core::config::{AxisId, BusId, SharedBus};
use axial_core::error::TransportError;
use axial_core::traits::TransportSet;
use axial_hal::{ChipSelect, OutputPin, SerialPort, SpiBus, UartTx};
use heapless::Vec;

/// Baud rate hardware UARTs are opened at
pub const HARDWARE_SERIAL_BAUD: u32 = 250_000;

/// Baud rate emulated serial lines are opened at
pub const SOFTWARE_SERIAL_BAUD: u32 = 115_200;

/// Maximum number of buses of each kind
pub const MAX_BUSES: usize = 2;

struct Bus<T> {
    inner: T,
    ready: bool,
}

impl<T> Bus<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            ready: false,
        }
    }
}

/// Arena of shared buses
pub struct BusSet<S, U> {
    spi: Vec<Bus<S>, MAX_BUSES>,
    serial: Vec<Bus<U>, MAX_BUSES>,
}

impl<S, U> Default for BusSet<S, U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, U> BusSet<S, U> {
    pub fn new() -> Self {
        Self {
            spi: Vec::new(),
            serial: Vec::new(),
        }
    }

    /// Register an SPI bus
    ///
    /// Ids are handed out in registration order. Gives the bus back if the
    /// arena is full.
    pub fn add_spi(&mut self, bus: S) -> Result<BusId, S> {
        let id = BusId(self.spi.len() as u8);
        self.spi.push(Bus::new(bus)).map_err(|b| b.inner)?;
        Ok(id)
    }

    /// Register a hardware UART
    pub fn add_serial(&mut self, port: U) -> Result<BusId, U> {
        let id = BusId(self.serial.len() as u8);
        self.serial.push(Bus::new(port)).map_err(|b| b.inner)?;
        Ok(id)
    }

    /// Whether a bus is registered
    pub fn contains(&self, bus: SharedBus) -> bool {
        match bus {
            SharedBus::Spi(id) => self.spi.get(id.0 as usize).is_some(),
            SharedBus::Serial(id) => self.serial.get(id.0 as usize).is_some(),
        }
    }

    /// Access a ready SPI bus
    pub fn spi(&mut self, id: BusId) -> Result<&mut S, TransportError> {
        let bus = self
            .spi
            .get_mut(id.0 as usize)
            .ok_or(TransportError::UnknownBus(id.0))?;
        if !bus.ready {
            return Err(TransportError::NotReady);
        }
        Ok(&mut bus.inner)
    }

    /// Access a ready hardware UART
    pub fn serial(&mut self, id: BusId) -> Result<&mut U, TransportError> {
        let bus = self
            .serial
            .get_mut(id.0 as usize)
            .ok_or(TransportError::UnknownBus(id.0))?;
        if !bus.ready {
            return Err(TransportError::NotReady);
        }
        Ok(&mut bus.inner)
    }
}

impl<S, U: SerialPort> TransportSet for BusSet<S, U> {
    fn begin(&mut self, bus: SharedBus) -> Result<(), TransportError> {
        match bus {
            SharedBus::Spi(id) => {
                // The peripheral is configured when it is constructed
                let bus = self
                    .spi
                    .get_mut(id.0 as usize)
                    .ok_or(TransportError::UnknownBus(id.0))?;
                bus.ready = true;
            }
            SharedBus::Serial(id) => {
                let bus = self
                    .serial
                    .get_mut(id.0 as usize)
                    .ok_or(TransportError::UnknownBus(id.0))?;
                bus.inner
                    .begin(HARDWARE_SERIAL_BAUD)
                    .map_err(|_| TransportError::Handshake)?;
                bus.ready = true;
            }
        }
        Ok(())
    }

    fn is_ready(&self, bus: SharedBus) -> bool {
        match bus {
            SharedBus::Spi(id) => self.spi.get(id.0 as usize).is_some_and(|b| b.ready),
            SharedBus::Serial(id) => self.serial.get(id.0 as usize).is_some_and(|b| b.ready),
        }
    }
}

/// SPI chip: a bus id and the chip's own select line
pub struct SpiLink<P> {
    bus: BusId,
    cs: ChipSelect<P>,
}

impl<P: OutputPin> SpiLink<P> {
    pub fn new(bus: BusId, cs_pin: P) -> Self {
        Self {
            bus,
            cs: ChipSelect::new(cs_pin),
        }
    }

    pub fn shared_bus(&self) -> SharedBus {
        SharedBus::Spi(self.bus)
    }

    /// Exchange one frame with the chip
    ///
    /// The chip is selected for exactly the length of `frame`.
    pub fn transfer<S: SpiBus, U>(
        &mut self,
        buses: &mut BusSet<S, U>,
        frame: &mut [u8],
    ) -> Result<(), TransportError> {
        let spi = buses.spi(self.bus)?;
        self.cs.select();
        let result = spi
            .transfer_in_place(frame)
            .map_err(|_| TransportError::Transfer);
        self.cs.deselect();
        result
    }
}

/// Serial line to a UART driver chip
pub enum SerialLink<W> {
    /// Hardware UART in the bus arena
    Hardware(BusId),
    /// Emulated serial line owned by this slot
    Software(W),
}

impl<W: SerialPort> SerialLink<W> {
    pub fn shared_bus(&self) -> Option<SharedBus> {
        match self {
            SerialLink::Hardware(id) => Some(SharedBus::Serial(*id)),
            SerialLink::Software(_) => None,
        }
    }

    /// Handshake for an emulated line
    ///
    /// Hardware UARTs are begun through the bus arena instead.
    pub fn begin(&mut self) -> Result<(), TransportError> {
        match self {
            SerialLink::Hardware(_) => Ok(()),
            SerialLink::Software(port) => port
                .begin(SOFTWARE_SERIAL_BAUD)
                .map_err(|_| TransportError::Handshake),
        }
    }

    /// Borrow the underlying port, if its handshake has run
    pub fn port<'a, S, U: SerialPort>(
        &'a mut self,
        buses: &'a mut BusSet<S, U>,
    ) -> Result<PortRef<'a, U, W>, TransportError> {
        match self {
            SerialLink::Hardware(id) => Ok(PortRef::Hardware(buses.serial(*id)?)),
            SerialLink::Software(port) => {
                if !port.is_open() {
                    return Err(TransportError::NotReady);
                }
                Ok(PortRef::Software(port))
            }
        }
    }
}

/// A borrowed serial port of either kind
pub enum PortRef<'a, U, W> {
    Hardware(&'a mut U),
    Software(&'a mut W),
}

impl<U: SerialPort, W: SerialPort> PortRef<'_, U, W> {
    /// Write and flush
    pub fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            PortRef::Hardware(port) => write_all(&mut **port, data),
            PortRef::Software(port) => write_all(&mut **port, data),
        }
    }

    /// Read up to `buf.len()` bytes; returns how many arrived
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self {
            PortRef::Hardware(port) => port.read_blocking(buf).map_err(|_| TransportError::Read),
            PortRef::Software(port) => port.read_blocking(buf).map_err(|_| TransportError::Read),
        }
    }

    /// Drop stale bytes, such as echoes of earlier writes
    pub fn clear_rx(&mut self) -> Result<(), TransportError> {
        match self {
            PortRef::Hardware(port) => port.clear_rx().map_err(|_| TransportError::Read),
            PortRef::Software(port) => port.clear_rx().map_err(|_| TransportError::Read),
        }
    }

    pub fn has_rx(&self) -> bool {
        match self {
            PortRef::Hardware(port) => port.has_rx(),
            PortRef::Software(port) => port.has_rx(),
        }
    }
}

fn write_all<T: UartTx>(port: &mut T, data: &[u8]) -> Result<(), TransportError> {
    port.write_blocking(data)
        .and_then(|_| port.flush())
        .map_err(|_| TransportError::Write)
}

/// Board-specific resources slots are built from
///
/// Returning `None` means the board cannot provide the pin(s).
pub trait BoardResources {
    /// Chip-select output
    type Pin: OutputPin;
    /// Emulated serial port
    type Serial: SerialPort;

    /// Claim an output pin for a chip select
    fn chip_select(&mut self, axis: AxisId, pin: u8) -> Option<Self::Pin>;

    /// Claim pins for an emulated serial line
    fn software_serial(
        &mut self,
        axis: AxisId,
        rx_pin: Option<u8>,
        tx_pin: u8,
    ) -> Option<Self::Serial>;
}
