//! TMC2208 stepper driver (UART mode)
//!
//! The TMC2208 is configured over a single-wire UART, either a hardware
//! UART or an emulated serial line. Its slave address is fixed, so each
//! line carries one chip. StealthChop is
//! the power-on chopper, so SpreadCycle has to be requested explicitly.
//!
//! # UART Protocol
//!
//! 8N1, LSB first:
//! - Sync byte: 0x05
//! - Slave address: 0x00
//! - Register address + R/W bit
//! - Data (4 bytes, big-endian)
//! - CRC8
//!
//! Read requests omit the data. On a single-wire line every datagram sent is
//! heard back, so reads drop whatever is already received before sending the
//! request, then accept the echoed request followed by the 8-byte reply.

use axial_core::config::{ChipFamily, SharedBus, Tmc2208Settings};
use axial_core::error::{BringUpError, ConfigurationError, TransportError};
use axial_core::traits::{AxisContext, DiagnosticSink, DiagnosticValue, DriverAdapter};
use axial_hal::SerialPort;

use super::derived::{current_scale, microstep_resolution};
use crate::transport::{BusSet, PortRef, SerialLink};

/// TMC2208 register addresses
pub mod reg {
    /// General configuration
    pub const GCONF: u8 = 0x00;
    /// Global status flags
    pub const GSTAT: u8 = 0x01;
    /// Pin states and version
    pub const IOIN: u8 = 0x06;
    /// Factory oscillator trim
    pub const FACTORY_CONF: u8 = 0x07;
    /// Hold/run current settings
    pub const IHOLD_IRUN: u8 = 0x10;
    /// Chopper configuration
    pub const CHOPCONF: u8 = 0x6C;
}

/// GCONF bits
pub mod gconf {
    pub const I_SCALE_ANALOG: u32 = 1 << 0;
    pub const EN_SPREADCYCLE: u32 = 1 << 2;
    pub const PDN_DISABLE: u32 = 1 << 6;
    pub const MSTEP_REG_SELECT: u32 = 1 << 7;
    pub const MULTISTEP_FILT: u32 = 1 << 8;
}

/// CHOPCONF fields
pub mod chopconf {
    pub const TOFF_MASK: u32 = 0x0F;
    pub const TBL_SHIFT: u32 = 15;
    pub const TBL_MASK: u32 = 0b11 << TBL_SHIFT;
    pub const VSENSE: u32 = 1 << 17;
    pub const MRES_SHIFT: u32 = 24;
    pub const MRES_MASK: u32 = 0x0F << MRES_SHIFT;
    pub const INTPOL: u32 = 1 << 28;
}

/// UART sync byte
pub const SYNC_BYTE: u8 = 0x05;

/// Slave address (fixed on the TMC2208)
const SLAVE_ADDRESS: u8 = 0x00;

/// Address replies are sent to
const MASTER_ADDRESS: u8 = 0xFF;

/// Power-on GCONF
const GCONF_RESET: u32 = gconf::I_SCALE_ANALOG | gconf::MULTISTEP_FILT;

/// Power-on CHOPCONF
const CHOPCONF_RESET: u32 = 0x1000_0053;

/// Blank time code (24 clocks)
const TBL: u32 = 0b10;

/// Off time code
const TOFF: u32 = 0b10;

/// CRC8 of a datagram
///
/// Polynomial 0x07, data bits fed LSB first as the chip sends them.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut current = byte;
        for _ in 0..8 {
            if ((crc >> 7) ^ (current & 0x01)) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            current >>= 1;
        }
    }
    crc
}

/// Build a write datagram
pub fn build_write_datagram(addr: u8, reg: u8, data: u32) -> [u8; 8] {
    let mut datagram = [0u8; 8];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg | 0x80; // Set write bit
    datagram[3..7].copy_from_slice(&data.to_be_bytes());
    datagram[7] = crc8(&datagram[..7]);
    datagram
}

/// Build a read request datagram
pub fn build_read_request(addr: u8, reg: u8) -> [u8; 4] {
    let mut datagram = [0u8; 4];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg; // No write bit
    datagram[3] = crc8(&datagram[..3]);
    datagram
}

/// Datagram errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DatagramError {
    /// Invalid sync byte in response
    InvalidSync,
    /// Reply addressed to someone else, or for another register
    WrongAddress,
    /// CRC mismatch
    CrcMismatch,
}

impl From<DatagramError> for TransportError {
    fn from(_: DatagramError) -> Self {
        TransportError::CorruptReply
    }
}

/// Parse a read reply for `reg`
///
/// The reply is:
/// - Sync (0x05)
/// - Master address (0xFF)
/// - Register address
/// - 4 bytes data (big-endian)
/// - CRC8
pub fn parse_read_response(reg: u8, response: &[u8; 8]) -> Result<u32, DatagramError> {
    if response[0] != SYNC_BYTE {
        return Err(DatagramError::InvalidSync);
    }
    if response[7] != crc8(&response[..7]) {
        return Err(DatagramError::CrcMismatch);
    }
    if response[1] != MASTER_ADDRESS || response[2] != reg {
        return Err(DatagramError::WrongAddress);
    }
    Ok(u32::from_be_bytes([
        response[3],
        response[4],
        response[5],
        response[6],
    ]))
}

/// Shadow copies of the write-only registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shadow {
    gconf: u32,
    ihold_irun: u32,
    chopconf: u32,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            gconf: GCONF_RESET,
            ihold_irun: 0,
            chopconf: CHOPCONF_RESET,
        }
    }
}

/// A port plus the shadow registers, for the duration of one phase
///
/// Setters update the shadow and write the whole register through.
struct Session<'a, U, W> {
    port: PortRef<'a, U, W>,
    shadow: &'a mut Shadow,
}

impl<U: SerialPort, W: SerialPort> Session<'_, U, W> {
    fn write(&mut self, reg: u8, value: u32) -> Result<(), TransportError> {
        self.port
            .write(&build_write_datagram(SLAVE_ADDRESS, reg, value))
    }

    fn read(&mut self, reg: u8) -> Result<u32, TransportError> {
        if !self.port.has_rx() {
            return Err(TransportError::NoResponse);
        }
        // Echoes of earlier writes are still waiting on a single-wire line
        self.port.clear_rx()?;
        self.port.write(&build_read_request(SLAVE_ADDRESS, reg))?;

        // Room for the echoed request followed by the reply
        let mut buf = [0u8; 12];
        let reply = match self.port.read(&mut buf)? {
            0 => return Err(TransportError::NoResponse),
            8 => &buf[..8],
            12 => &buf[4..],
            _ => return Err(TransportError::CorruptReply),
        };
        let mut datagram = [0u8; 8];
        datagram.copy_from_slice(reply);
        Ok(parse_read_response(reg, &datagram)?)
    }

    fn set_gconf(&mut self, bit: u32, on: bool) -> Result<(), TransportError> {
        if on {
            self.shadow.gconf |= bit;
        } else {
            self.shadow.gconf &= !bit;
        }
        self.write(reg::GCONF, self.shadow.gconf)
    }

    fn set_chopconf(&mut self, mask: u32, value: u32) -> Result<(), TransportError> {
        self.shadow.chopconf = (self.shadow.chopconf & !mask) | (value & mask);
        self.write(reg::CHOPCONF, self.shadow.chopconf)
    }

    fn rms_current(&mut self, current_ma: u16, r_sense_mohm: u16, hold_pct: u8) -> Result<(), TransportError> {
        let scale = current_scale(current_ma, r_sense_mohm, hold_pct);
        let vsense = if scale.vsense { chopconf::VSENSE } else { 0 };
        self.set_chopconf(chopconf::VSENSE, vsense)?;

        self.shadow.ihold_irun =
            (self.shadow.ihold_irun & !0x1F1F) | ((scale.irun as u32) << 8) | scale.ihold as u32;
        self.write(reg::IHOLD_IRUN, self.shadow.ihold_irun)
    }

    /// Read a register for the sink only; failures are reported, not returned
    fn report(&mut self, ctx: &AxisContext<'_>, sink: &mut dyn DiagnosticSink, key: &str, reg: u8) {
        match self.read(reg) {
            Ok(value) => {
                sink.report(ctx.axis, "Res", DiagnosticValue::Flag(true));
                sink.report(ctx.axis, key, DiagnosticValue::Register(value));
            }
            Err(e) => {
                warn!("{}: reading {} failed: {}", ctx.axis.name(), key, e);
                sink.report(ctx.axis, "Res", DiagnosticValue::Flag(false));
            }
        }
    }
}

/// TMC2208 adapter
pub struct Tmc2208<W> {
    link: SerialLink<W>,
    settings: Tmc2208Settings,
    shadow: Shadow,
}

impl<W: SerialPort> Tmc2208<W> {
    pub fn new(link: SerialLink<W>, settings: Tmc2208Settings) -> Self {
        Self {
            link,
            settings,
            shadow: Shadow::default(),
        }
    }

    pub fn settings(&self) -> &Tmc2208Settings {
        &self.settings
    }

    /// Last GCONF value written
    pub fn gconf(&self) -> u32 {
        self.shadow.gconf
    }

    /// Last CHOPCONF value written
    pub fn chopconf(&self) -> u32 {
        self.shadow.chopconf
    }

    fn session<'a, S, U: SerialPort>(
        &'a mut self,
        buses: &'a mut BusSet<S, U>,
    ) -> Result<Session<'a, U, W>, TransportError> {
        Ok(Session {
            port: self.link.port(buses)?,
            shadow: &mut self.shadow,
        })
    }
}

impl<W: SerialPort, S, U: SerialPort> DriverAdapter<BusSet<S, U>> for Tmc2208<W> {
    fn family(&self) -> ChipFamily {
        ChipFamily::Tmc2208
    }

    fn shared_bus(&self) -> Option<SharedBus> {
        self.link.shared_bus()
    }

    fn begin_transport(&mut self, _buses: &mut BusSet<S, U>) -> Result<(), TransportError> {
        self.link.begin()
    }

    fn primary_bring_up(
        &mut self,
        buses: &mut BusSet<S, U>,
        ctx: &AxisContext<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), BringUpError> {
        let settings = self.settings;
        let policy = ctx.policy;
        let mres = microstep_resolution(settings.microsteps).ok_or(
            ConfigurationError::InvalidMicrosteps {
                axis: ctx.axis,
                microsteps: settings.microsteps,
            },
        )?;

        let mut chip = self.session(buses)?;

        // UART control does not work until PDN_UART is released
        chip.set_gconf(gconf::PDN_DISABLE, true)?;
        chip.report(ctx, sink, "Initial GCONF", reg::GCONF);
        chip.report(ctx, sink, "IOIN", reg::IOIN);
        chip.report(ctx, sink, "FACTORY_CONF", reg::FACTORY_CONF);

        chip.set_gconf(gconf::MSTEP_REG_SELECT, true)?;
        chip.set_gconf(gconf::I_SCALE_ANALOG, false)?;
        chip.rms_current(
            settings.current_ma,
            policy.r_sense_mohm,
            policy.hold_multiplier_pct,
        )?;
        chip.set_chopconf(chopconf::MRES_MASK, (mres as u32) << chopconf::MRES_SHIFT)?;
        chip.set_chopconf(chopconf::TBL_MASK, TBL << chopconf::TBL_SHIFT)?;
        chip.set_chopconf(chopconf::TOFF_MASK, TOFF)?;
        let intpol = if policy.interpolate { chopconf::INTPOL } else { 0 };
        chip.set_chopconf(chopconf::INTPOL, intpol)?;

        if !policy.stealth() {
            chip.set_gconf(gconf::EN_SPREADCYCLE, true)?;
        }

        chip.report(ctx, sink, "Final GCONF", reg::GCONF);
        info!("{}: TMC2208 configured", ctx.axis.name());
        Ok(())
    }

    fn needs_secondary(&self) -> bool {
        self.settings.advanced
    }

    fn secondary_bring_up(
        &mut self,
        buses: &mut BusSet<S, U>,
        ctx: &AxisContext<'_>,
    ) -> Result<(), BringUpError> {
        debug!("{}: TMC2208 forcing SpreadCycle", ctx.axis.name());
        self.session(buses)?
            .set_gconf(gconf::EN_SPREADCYCLE, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{FakeUartChip, MockSerial, MockSpi, RecordingSink};
    use axial_core::config::{AxisId, BusId, ChopperMode, DriverPolicy};
    use axial_core::traits::TransportSet;

    type Buses = BusSet<MockSpi, MockSerial>;

    fn ctx(policy: &DriverPolicy) -> AxisContext<'_> {
        AxisContext {
            axis: AxisId::E0,
            steps_per_unit: 500,
            policy,
        }
    }

    fn hardware(chip: FakeUartChip) -> (Buses, Tmc2208<MockSerial>) {
        let mut buses = Buses::new();
        let id = buses.add_serial(MockSerial::with_chip(chip)).unwrap();
        buses.begin(SharedBus::Serial(id)).unwrap();
        let driver = Tmc2208::new(SerialLink::Hardware(id), Tmc2208Settings::default());
        (buses, driver)
    }

    fn port(buses: &mut Buses) -> &mut MockSerial {
        buses.serial(BusId(0)).unwrap()
    }

    #[test]
    fn test_crc8_known_datagram() {
        // Read request for GCONF as given in the datasheet examples
        assert_eq!(build_read_request(0, reg::GCONF), [0x05, 0x00, 0x00, 0x48]);
    }

    #[test]
    fn test_write_datagram() {
        let datagram = build_write_datagram(0, reg::GCONF, 0x00000140);

        assert_eq!(datagram[0], SYNC_BYTE);
        assert_eq!(datagram[1], 0); // address
        assert_eq!(datagram[2], reg::GCONF | 0x80); // register + write bit
        assert_eq!(&datagram[3..7], &[0x00, 0x00, 0x01, 0x40]);
        assert_eq!(datagram[7], crc8(&datagram[..7]));
    }

    #[test]
    fn test_parse_read_response() {
        let mut response = [SYNC_BYTE, 0xFF, reg::IOIN, 0x12, 0x34, 0x56, 0x78, 0];
        response[7] = crc8(&response[..7]);

        assert_eq!(parse_read_response(reg::IOIN, &response), Ok(0x12345678));
        assert_eq!(
            parse_read_response(reg::GCONF, &response),
            Err(DatagramError::WrongAddress)
        );

        let mut bad_sync = response;
        bad_sync[0] = 0x00;
        assert_eq!(
            parse_read_response(reg::IOIN, &bad_sync),
            Err(DatagramError::InvalidSync)
        );

        let mut bad_crc = response;
        bad_crc[7] ^= 0x01;
        assert_eq!(
            parse_read_response(reg::IOIN, &bad_crc),
            Err(DatagramError::CrcMismatch)
        );
    }

    #[test]
    fn test_primary_spreadcycle() {
        let (mut buses, mut driver) = hardware(FakeUartChip::tmc2208());
        let policy = DriverPolicy::default();
        let mut sink = RecordingSink::default();

        driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut sink)
            .unwrap();

        let serial = port(&mut buses);
        let gconf = serial.register(reg::GCONF);
        assert_ne!(gconf & gconf::PDN_DISABLE, 0);
        assert_ne!(gconf & gconf::MSTEP_REG_SELECT, 0);
        assert_eq!(gconf & gconf::I_SCALE_ANALOG, 0);
        assert_ne!(gconf & gconf::EN_SPREADCYCLE, 0);

        let chop = serial.register(reg::CHOPCONF);
        assert_eq!(chop & chopconf::TOFF_MASK, 0b10);
        assert_eq!((chop & chopconf::TBL_MASK) >> chopconf::TBL_SHIFT, 0b10);
        assert_eq!((chop & chopconf::MRES_MASK) >> chopconf::MRES_SHIFT, 4);
        assert_ne!(chop & chopconf::INTPOL, 0);
        assert_ne!(chop & chopconf::VSENSE, 0);

        // 800 mA through 0.11 Ω, 50% hold
        assert_eq!(serial.register(reg::IHOLD_IRUN), (25 << 8) | 12);
        assert_eq!(driver.gconf(), gconf);
        assert_eq!(driver.chopconf(), chop);
    }

    #[test]
    fn test_primary_stealth_keeps_default_chopper() {
        let (mut buses, mut driver) = hardware(FakeUartChip::tmc2208());
        let policy = DriverPolicy {
            chopper: ChopperMode::Stealth,
            interpolate: false,
            ..Default::default()
        };

        driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut RecordingSink::default())
            .unwrap();

        let serial = port(&mut buses);
        assert_eq!(serial.register(reg::GCONF) & gconf::EN_SPREADCYCLE, 0);
        assert_eq!(serial.register(reg::CHOPCONF) & chopconf::INTPOL, 0);
    }

    #[test]
    fn test_diagnostic_read_back() {
        let (mut buses, mut driver) = hardware(FakeUartChip::tmc2208());
        let policy = DriverPolicy::default();
        let mut sink = RecordingSink::default();

        driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut sink)
            .unwrap();

        let axis = AxisId::E0;
        assert_eq!(sink.values(axis, "Res"), [DiagnosticValue::Flag(true); 4]);
        // PDN_DISABLE was written before the first read
        assert_eq!(
            sink.values(axis, "Initial GCONF"),
            [DiagnosticValue::Register(0x141)]
        );
        assert_eq!(
            sink.values(axis, "IOIN"),
            [DiagnosticValue::Register(0x2000_0040)]
        );
        assert_eq!(
            sink.values(axis, "FACTORY_CONF"),
            [DiagnosticValue::Register(0x0F)]
        );
        assert_eq!(
            sink.values(axis, "Final GCONF"),
            [DiagnosticValue::Register(port(&mut buses).register(reg::GCONF))]
        );
        assert_eq!(
            port(&mut buses).reads(),
            [reg::GCONF, reg::IOIN, reg::FACTORY_CONF, reg::GCONF]
        );
    }

    #[test]
    fn test_write_echoes_dropped_before_read() {
        let (mut buses, mut driver) = hardware(FakeUartChip::tmc2208());
        let mut chip = driver.session(&mut buses).unwrap();

        chip.write(reg::IHOLD_IRUN, 0x0000_1F10).unwrap();
        chip.write(reg::GCONF, 0x0000_01C1).unwrap();
        if let PortRef::Hardware(port) = &chip.port {
            assert_eq!(port.unread(), 16);
        }

        assert_eq!(chip.read(reg::GCONF), Ok(0x0000_01C1));
        assert_eq!(chip.read(reg::IHOLD_IRUN), Ok(0x0000_1F10));
    }

    #[test]
    fn test_corrupt_read_back_is_not_fatal() {
        let mut chip = FakeUartChip::tmc2208();
        chip.corrupt = true;
        let (mut buses, mut driver) = hardware(chip);
        let policy = DriverPolicy::default();
        let mut sink = RecordingSink::default();

        assert!(driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut sink)
            .is_ok());
        assert_eq!(sink.values(AxisId::E0, "Res"), [DiagnosticValue::Flag(false); 4]);
        assert!(sink.values(AxisId::E0, "IOIN").is_empty());
    }

    #[test]
    fn test_reply_without_echo() {
        let mut chip = FakeUartChip::tmc2208();
        chip.echo = false;
        let (mut buses, mut driver) = hardware(chip);
        let policy = DriverPolicy::default();
        let mut sink = RecordingSink::default();

        driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut sink)
            .unwrap();
        assert_eq!(sink.values(AxisId::E0, "Res"), [DiagnosticValue::Flag(true); 4]);
    }

    #[test]
    fn test_tx_only_line_skips_read_back() {
        let mut buses = Buses::new();
        let mut serial = MockSerial::with_chip(FakeUartChip::tmc2208());
        serial.rx = false;
        let mut driver = Tmc2208::new(SerialLink::Software(serial), Tmc2208Settings::default());
        let policy = DriverPolicy::default();
        let mut sink = RecordingSink::default();

        driver.begin_transport(&mut buses).unwrap();
        driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut sink)
            .unwrap();

        assert_eq!(sink.values(AxisId::E0, "Res"), [DiagnosticValue::Flag(false); 4]);
        match &driver.link {
            SerialLink::Software(port) => assert!(port.reads().is_empty()),
            SerialLink::Hardware(_) => unreachable!(),
        }
    }

    #[test]
    fn test_software_line_not_begun() {
        let mut buses = Buses::new();
        let serial = MockSerial::with_chip(FakeUartChip::tmc2208());
        let mut driver = Tmc2208::new(SerialLink::Software(serial), Tmc2208Settings::default());
        let policy = DriverPolicy::default();

        assert_eq!(
            driver.primary_bring_up(&mut buses, &ctx(&policy), &mut RecordingSink::default()),
            Err(BringUpError::Transport(TransportError::NotReady))
        );
    }

    #[test]
    fn test_shared_uart_not_begun() {
        let mut buses = Buses::new();
        let id = buses.add_serial(MockSerial::new()).unwrap();
        let mut driver =
            Tmc2208::<MockSerial>::new(SerialLink::Hardware(id), Tmc2208Settings::default());
        let policy = DriverPolicy::default();

        assert_eq!(
            driver.primary_bring_up(&mut buses, &ctx(&policy), &mut RecordingSink::default()),
            Err(BringUpError::Transport(TransportError::NotReady))
        );

        buses.begin(SharedBus::Serial(id)).unwrap();
        assert!(port(&mut buses).datagrams.is_empty());
    }

    #[test]
    fn test_write_failure_is_fatal() {
        let mut serial = MockSerial::with_chip(FakeUartChip::tmc2208());
        serial.fail_write = true;
        let mut buses = Buses::new();
        let id = buses.add_serial(serial).unwrap();
        buses.begin(SharedBus::Serial(id)).unwrap();
        let mut driver =
            Tmc2208::<MockSerial>::new(SerialLink::Hardware(id), Tmc2208Settings::default());
        let policy = DriverPolicy::default();

        assert_eq!(
            driver.primary_bring_up(&mut buses, &ctx(&policy), &mut RecordingSink::default()),
            Err(BringUpError::Transport(TransportError::Write))
        );
    }

    #[test]
    fn test_advanced_secondary() {
        let (mut buses, mut driver) = hardware(FakeUartChip::tmc2208());
        driver.settings.advanced = true;
        let policy = DriverPolicy {
            chopper: ChopperMode::Stealth,
            ..Default::default()
        };

        assert!(DriverAdapter::<Buses>::needs_secondary(&driver));
        driver
            .primary_bring_up(&mut buses, &ctx(&policy), &mut RecordingSink::default())
            .unwrap();
        assert_eq!(port(&mut buses).register(reg::GCONF) & gconf::EN_SPREADCYCLE, 0);

        driver.secondary_bring_up(&mut buses, &ctx(&policy)).unwrap();
        assert_ne!(port(&mut buses).register(reg::GCONF) & gconf::EN_SPREADCYCLE, 0);
    }

    #[test]
    fn test_plain_slot_has_no_secondary() {
        let (_, driver) = hardware(FakeUartChip::tmc2208());
        assert!(!DriverAdapter::<Buses>::needs_secondary(&driver));
    }
}
