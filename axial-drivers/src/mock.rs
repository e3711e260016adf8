//! In-memory buses, pins and chips for unit tests

extern crate std;

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use axial_core::config::AxisId;
use axial_core::traits::{DiagnosticSink, DiagnosticValue};
use axial_hal::{OutputPin, SerialPort, SpiBus, UartRx, UartTx};

use crate::stepper::tmc2208::{crc8, SYNC_BYTE};
use crate::transport::BoardResources;

#[derive(Debug, Default)]
pub struct MockPin {
    high: bool,
}

impl OutputPin for MockPin {
    fn set_high(&mut self) {
        self.high = true;
    }
    fn set_low(&mut self) {
        self.high = false;
    }
    fn is_set_high(&self) -> bool {
        self.high
    }
}

/// Register file of a chip answering 40-bit SPI datagrams
///
/// Reads are pipelined: the reply to a read arrives with the next frame.
#[derive(Debug)]
pub struct FakeSpiChip {
    pub registers: [u32; 0x80],
    pending: u32,
}

impl FakeSpiChip {
    pub fn new() -> Self {
        Self {
            registers: [0; 0x80],
            pending: 0,
        }
    }

    fn exchange(&mut self, frame: &mut [u8]) {
        let addr = (frame[0] & 0x7F) as usize;
        let reply = self.pending;
        if frame[0] & 0x80 != 0 {
            self.registers[addr] = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
            self.pending = 0;
        } else {
            self.pending = self.registers[addr];
        }
        frame[0] = 0;
        frame[1..5].copy_from_slice(&reply.to_be_bytes());
    }
}

#[derive(Debug, Default)]
pub struct MockSpi {
    /// Every frame written, one entry per chip-select cycle
    pub frames: Vec<Vec<u8>>,
    /// Scripted replies, consumed one per frame
    pub replies: VecDeque<Vec<u8>>,
    /// Byte clocked in when nothing else answers
    pub idle: u8,
    /// Chip answering 5-byte frames
    pub chip: Option<FakeSpiChip>,
    pub fail: bool,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chip(chip: FakeSpiChip) -> Self {
        Self {
            chip: Some(chip),
            ..Self::default()
        }
    }

    pub fn with_idle(idle: u8) -> Self {
        Self {
            idle,
            ..Self::default()
        }
    }
}

impl SpiBus for MockSpi {
    type Error = ();

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), ()> {
        read.copy_from_slice(write);
        self.transfer_in_place(read)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ()> {
        let mut buf = data.to_vec();
        self.transfer_in_place(&mut buf)
    }

    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.frames.push(data.to_vec());

        if let Some(reply) = self.replies.pop_front() {
            for (byte, r) in data.iter_mut().zip(reply) {
                *byte = r;
            }
        } else if let (Some(chip), 5) = (self.chip.as_mut(), data.len()) {
            chip.exchange(data);
        } else {
            data.fill(self.idle);
        }
        Ok(())
    }
}

/// Register file of a chip answering Trinamic UART datagrams
#[derive(Debug)]
pub struct FakeUartChip {
    pub registers: [u32; 0x80],
    /// Single-wire lines hear every datagram they send
    pub echo: bool,
    /// Damage the CRC of every reply
    pub corrupt: bool,
}

impl FakeUartChip {
    /// Chip at its power-on register values
    pub fn tmc2208() -> Self {
        let mut registers = [0; 0x80];
        registers[0x00] = 0x0000_0101;
        registers[0x06] = 0x2000_0040;
        registers[0x07] = 0x0000_000F;
        registers[0x6C] = 0x1000_0053;
        Self {
            registers,
            echo: true,
            corrupt: false,
        }
    }
}

#[derive(Debug)]
pub struct MockSerial {
    pub baud: Option<u32>,
    pub rx: bool,
    pub fail_begin: bool,
    pub fail_write: bool,
    /// Every write call, one entry per datagram
    pub datagrams: Vec<Vec<u8>>,
    pub chip: Option<FakeUartChip>,
    pending: VecDeque<u8>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            baud: None,
            rx: true,
            fail_begin: false,
            fail_write: false,
            datagrams: Vec::new(),
            chip: None,
            pending: VecDeque::new(),
        }
    }

    pub fn with_chip(chip: FakeUartChip) -> Self {
        Self {
            chip: Some(chip),
            ..Self::new()
        }
    }

    /// Register writes in order, as (register, value)
    pub fn writes(&self) -> Vec<(u8, u32)> {
        self.datagrams
            .iter()
            .filter(|d| d.len() == 8 && d[2] & 0x80 != 0)
            .map(|d| (d[2] & 0x7F, u32::from_be_bytes([d[3], d[4], d[5], d[6]])))
            .collect()
    }

    /// Registers read, in order
    pub fn reads(&self) -> Vec<u8> {
        self.datagrams
            .iter()
            .filter(|d| d.len() == 4)
            .map(|d| d[2])
            .collect()
    }

    /// Bytes received but not yet read
    pub fn unread(&self) -> usize {
        self.pending.len()
    }

    pub fn register(&self, reg: u8) -> u32 {
        self.chip.as_ref().map_or(0, |c| c.registers[reg as usize])
    }
}

impl UartTx for MockSerial {
    type Error = ();

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), ()> {
        if self.fail_write {
            return Err(());
        }
        self.datagrams.push(data.to_vec());

        let Some(chip) = self.chip.as_mut() else {
            return Ok(());
        };
        if data[0] != SYNC_BYTE {
            return Ok(());
        }
        if chip.echo && self.rx {
            self.pending.extend(data.iter().copied());
        }
        let reg = data[2] & 0x7F;
        if data.len() == 8 && data[2] & 0x80 != 0 {
            chip.registers[reg as usize] = u32::from_be_bytes([data[3], data[4], data[5], data[6]]);
        } else if data.len() == 4 && self.rx {
            let value = chip.registers[reg as usize].to_be_bytes();
            let mut reply = [SYNC_BYTE, 0xFF, reg, value[0], value[1], value[2], value[3], 0];
            reply[7] = crc8(&reply[..7]);
            if chip.corrupt {
                reply[7] ^= 0xFF;
            }
            self.pending.extend(reply);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

impl UartRx for MockSerial {
    type Error = ();

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.pending.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    fn clear_rx(&mut self) -> Result<(), ()> {
        self.pending.clear();
        Ok(())
    }
}

impl SerialPort for MockSerial {
    fn begin(&mut self, baudrate: u32) -> Result<(), ()> {
        if self.fail_begin {
            return Err(());
        }
        self.baud = Some(baudrate);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.baud.is_some()
    }

    fn has_rx(&self) -> bool {
        self.rx
    }
}

/// Board that hands out any pin not listed as unavailable
#[derive(Default)]
pub struct MockBoard {
    pub claimed: Vec<u8>,
    pub unavailable: Vec<u8>,
}

impl BoardResources for MockBoard {
    type Pin = MockPin;
    type Serial = MockSerial;

    fn chip_select(&mut self, _axis: AxisId, pin: u8) -> Option<MockPin> {
        if self.unavailable.contains(&pin) {
            return None;
        }
        self.claimed.push(pin);
        Some(MockPin::default())
    }

    fn software_serial(
        &mut self,
        _axis: AxisId,
        rx_pin: Option<u8>,
        tx_pin: u8,
    ) -> Option<MockSerial> {
        if self.unavailable.contains(&tx_pin) {
            return None;
        }
        self.claimed.extend(rx_pin);
        self.claimed.push(tx_pin);
        let mut port = MockSerial::with_chip(FakeUartChip::tmc2208());
        port.rx = rx_pin.is_some();
        Some(port)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub entries: Vec<(AxisId, String, DiagnosticValue)>,
}

impl RecordingSink {
    /// Values reported for a key, in order
    pub fn values(&self, axis: AxisId, key: &str) -> Vec<DiagnosticValue> {
        self.entries
            .iter()
            .filter(|(a, k, _)| *a == axis && k == key)
            .map(|(_, _, v)| *v)
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, axis: AxisId, key: &str, value: DiagnosticValue) {
        self.entries.push((axis, key.to_string(), value));
    }
}
