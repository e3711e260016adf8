//! TMC26X stepper driver (step/dir with SPI current control)
//!
//! 20-bit datagrams, sent MSB first in three bytes. The register is
//! selected by the top bits of the datagram. The chip answers every
//! datagram with a 20-bit status word.
//!
//! Current and sense resistor are fixed when the adapter is built; bring-up
//! only sets the microstep resolution and then starts the chip.

use axial_core::config::{ChipFamily, SharedBus, Tmc26xSettings};
use axial_core::error::{BringUpError, ConfigurationError, TransportError};
use axial_core::traits::{AxisContext, DiagnosticSink, DriverAdapter};
use axial_hal::{OutputPin, SpiBus};

use super::derived::{microstep_resolution, tmc26x_current_scale};
use crate::transport::{BusSet, SpiLink};

/// Register selectors (datagram bits 17-19)
pub mod reg {
    /// Driver control, step/dir mode
    pub const DRVCTRL: u32 = 0x0_0000;
    /// Chopper configuration
    pub const CHOPCONF: u32 = 0x8_0000;
    /// CoolStep control
    pub const SMARTEN: u32 = 0xA_0000;
    /// StallGuard2 and current scale
    pub const SGCSCONF: u32 = 0xC_0000;
    /// Driver configuration
    pub const DRVCONF: u32 = 0xE_0000;
}

/// DRVCTRL microstep resolution field
pub const MRES_MASK: u32 = 0x0F;
/// SGCSCONF current scale field
pub const CS_MASK: u32 = 0x1F;
/// DRVCONF sense voltage range (set: 165 mV)
pub const VSENSE: u32 = 1 << 6;

/// SpreadCycle, TOFF 4, HSTRT 3, HEND 3, TBL 2
const CHOPCONF_DEFAULT: u32 = reg::CHOPCONF | 0x1_01B4;
/// CoolStep disabled
const SMARTEN_DEFAULT: u32 = reg::SMARTEN;
/// StallGuard2 readout selected
const DRVCONF_DEFAULT: u32 = reg::DRVCONF | 0x10;

/// A status word of all ones means nothing drove MISO
const NO_RESPONSE: u32 = 0xF_FFFF;

/// TMC26X adapter
pub struct Tmc26x<P> {
    link: SpiLink<P>,
    settings: Tmc26xSettings,
    drvctrl: u32,
    chopconf: u32,
    smarten: u32,
    sgcsconf: u32,
    drvconf: u32,
}

impl<P: OutputPin> Tmc26x<P> {
    /// Build the adapter; the current scale is fixed here
    pub fn new(link: SpiLink<P>, settings: Tmc26xSettings) -> Self {
        let (cs, vsense) = tmc26x_current_scale(settings.current_ma, settings.sense_resistor_mohm);
        let drvconf = if vsense {
            DRVCONF_DEFAULT | VSENSE
        } else {
            DRVCONF_DEFAULT
        };

        Self {
            link,
            settings,
            drvctrl: reg::DRVCTRL,
            chopconf: CHOPCONF_DEFAULT,
            smarten: SMARTEN_DEFAULT,
            sgcsconf: reg::SGCSCONF | (cs as u32 & CS_MASK),
            drvconf,
        }
    }

    pub fn settings(&self) -> &Tmc26xSettings {
        &self.settings
    }

    /// Datagrams `start` sends, in order
    pub fn registers(&self) -> [u32; 5] {
        [
            self.drvctrl,
            self.chopconf,
            self.smarten,
            self.sgcsconf,
            self.drvconf,
        ]
    }

    fn set_microsteps(&mut self, mres: u8) {
        self.drvctrl = (self.drvctrl & !MRES_MASK) | (mres as u32 & MRES_MASK);
    }

    /// Send one datagram, returning the status word
    fn send<S: SpiBus, U>(
        &mut self,
        buses: &mut BusSet<S, U>,
        datagram: u32,
    ) -> Result<u32, TransportError> {
        let bytes = datagram.to_be_bytes();
        let mut frame = [bytes[1] & 0x0F, bytes[2], bytes[3]];
        self.link.transfer(buses, &mut frame)?;
        Ok(u32::from_be_bytes([0, frame[0], frame[1], frame[2]]) >> 4)
    }

    /// Write every register, starting the driver
    fn start<S: SpiBus, U>(&mut self, buses: &mut BusSet<S, U>) -> Result<(), TransportError> {
        let mut status = 0;
        for datagram in self.registers() {
            status = self.send(buses, datagram)?;
        }
        if status == NO_RESPONSE {
            return Err(TransportError::NoResponse);
        }
        Ok(())
    }
}

impl<P: OutputPin, S: SpiBus, U> DriverAdapter<BusSet<S, U>> for Tmc26x<P> {
    fn family(&self) -> ChipFamily {
        ChipFamily::Tmc26x
    }

    fn shared_bus(&self) -> Option<SharedBus> {
        Some(self.link.shared_bus())
    }

    fn primary_bring_up(
        &mut self,
        buses: &mut BusSet<S, U>,
        ctx: &AxisContext<'_>,
        _sink: &mut dyn DiagnosticSink,
    ) -> Result<(), BringUpError> {
        let microsteps = self.settings.microsteps;
        let mres = microstep_resolution(microsteps).ok_or(ConfigurationError::InvalidMicrosteps {
            axis: ctx.axis,
            microsteps,
        })?;

        self.set_microsteps(mres);
        self.start(buses)?;

        info!("{}: TMC26X started", ctx.axis.name());
        Ok(())
    }
}
