//! L6470 dSPIN driver
//!
//! Every byte is its own SPI frame: chip select must be released between
//! bytes. Commands are one byte, parameters follow MSB first.

use axial_core::config::{ChipFamily, L6470Settings, SharedBus};
use axial_core::error::{BringUpError, ConfigurationError, TransportError};
use axial_core::traits::{AxisContext, DiagnosticSink, DriverAdapter};
use axial_hal::{OutputPin, SpiBus};

use super::derived::{l6470_overcurrent_register, l6470_stall_register, l6470_step_mode};
use crate::transport::{BusSet, SpiLink};

/// Command bytes
pub mod cmd {
    pub const SET_PARAM: u8 = 0x00;
    pub const SOFT_HIZ: u8 = 0xA0;
    pub const RESET_DEVICE: u8 = 0xC0;
    pub const GET_STATUS: u8 = 0xD0;
}

/// Parameter registers
pub mod param {
    pub const KVAL_HOLD: u8 = 0x09;
    pub const KVAL_RUN: u8 = 0x0A;
    pub const KVAL_ACC: u8 = 0x0B;
    pub const KVAL_DEC: u8 = 0x0C;
    pub const OCD_TH: u8 = 0x13;
    pub const STALL_TH: u8 = 0x14;
    pub const STEP_MODE: u8 = 0x16;
    pub const CONFIG: u8 = 0x18;
}

/// Internal oscillator with overcurrent shutdown enabled
const CONFIG: u16 = 0x2E88;

/// L6470 adapter
pub struct L6470<P> {
    link: SpiLink<P>,
    settings: L6470Settings,
}

impl<P: OutputPin> L6470<P> {
    pub fn new(link: SpiLink<P>, settings: L6470Settings) -> Self {
        Self { link, settings }
    }

    pub fn settings(&self) -> &L6470Settings {
        &self.settings
    }

    fn exchange<S: SpiBus, U>(
        &mut self,
        buses: &mut BusSet<S, U>,
        byte: u8,
    ) -> Result<u8, TransportError> {
        let mut frame = [byte];
        self.link.transfer(buses, &mut frame)?;
        Ok(frame[0])
    }

    fn command<S: SpiBus, U>(
        &mut self,
        buses: &mut BusSet<S, U>,
        command: u8,
    ) -> Result<(), TransportError> {
        self.exchange(buses, command).map(|_| ())
    }

    fn set_param<S: SpiBus, U>(
        &mut self,
        buses: &mut BusSet<S, U>,
        param: u8,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.command(buses, cmd::SET_PARAM | param)?;
        for &byte in value {
            self.exchange(buses, byte)?;
        }
        Ok(())
    }

    fn status<S: SpiBus, U>(&mut self, buses: &mut BusSet<S, U>) -> Result<u16, TransportError> {
        self.command(buses, cmd::GET_STATUS)?;
        let high = self.exchange(buses, 0)?;
        let low = self.exchange(buses, 0)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Reset and load the K_VAL current scale
    fn init<S: SpiBus, U>(&mut self, buses: &mut BusSet<S, U>) -> Result<(), TransportError> {
        let k_val = self.settings.k_val;

        self.command(buses, cmd::RESET_DEVICE)?;
        self.set_param(buses, param::KVAL_RUN, &[k_val])?;
        self.set_param(buses, param::KVAL_ACC, &[k_val])?;
        self.set_param(buses, param::KVAL_DEC, &[k_val])?;
        self.set_param(buses, param::KVAL_HOLD, &[k_val])?;
        self.set_param(buses, param::CONFIG, &CONFIG.to_be_bytes())?;

        // Also clears the flags latched by the reset
        let status = self.status(buses)?;
        if status == u16::MAX {
            return Err(TransportError::NoResponse);
        }
        Ok(())
    }
}

impl<P: OutputPin, S: SpiBus, U> DriverAdapter<BusSet<S, U>> for L6470<P> {
    fn family(&self) -> ChipFamily {
        ChipFamily::L6470
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
        let settings = self.settings;
        let step_mode = l6470_step_mode(settings.microsteps).ok_or(
            ConfigurationError::InvalidMicrosteps {
                axis: ctx.axis,
                microsteps: settings.microsteps,
            },
        )?;

        self.init(buses)?;
        // Stop any motion and release the holding torque
        self.command(buses, cmd::SOFT_HIZ)?;
        self.set_param(buses, param::STEP_MODE, &[step_mode])?;
        self.set_param(
            buses,
            param::OCD_TH,
            &[l6470_overcurrent_register(settings.overcurrent_ma)],
        )?;
        self.set_param(
            buses,
            param::STALL_TH,
            &[l6470_stall_register(settings.stall_current_ma)],
        )?;

        info!("{}: L6470 configured", ctx.axis.name());
        Ok(())
    }
}
