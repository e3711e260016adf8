//! TMC2130 stepper driver (SPI mode)
//!
//! 40-bit datagrams: one address byte (bit 7 set for writes) followed by
//! 32 data bits, MSB first. Reads are pipelined, the value of a read
//! arrives with the next datagram.
//!
//! Bring-up follows the vendor's NEMA17 spreadsheet values with the
//! internal reference used for current scaling.

use axial_core::config::{ChipFamily, SharedBus, Tmc2130Settings};
use axial_core::error::{BringUpError, Combination, ConfigurationError, TransportError};
use axial_core::traits::{AxisContext, DiagnosticSink, DriverAdapter};
use axial_hal::{OutputPin, SpiBus};

use super::derived::{current_scale, microstep_resolution, stall_register, threshold_register};
use crate::transport::{BusSet, SpiLink};

/// TMC2130 register addresses
pub mod reg {
    pub const GCONF: u8 = 0x00;
    pub const GSTAT: u8 = 0x01;
    pub const IOIN: u8 = 0x04;
    pub const IHOLD_IRUN: u8 = 0x10;
    pub const TPOWERDOWN: u8 = 0x11;
    /// Upper velocity for StealthChop
    pub const TPWMTHRS: u8 = 0x13;
    /// Lower velocity for CoolStep/StallGuard
    pub const TCOOLTHRS: u8 = 0x14;
    pub const CHOPCONF: u8 = 0x6C;
    pub const COOLCONF: u8 = 0x6D;
    pub const PWMCONF: u8 = 0x70;
}

/// GCONF bits
pub mod gconf {
    pub const EN_PWM_MODE: u32 = 1 << 2;
    pub const DIAG1_PUSHPULL: u32 = 1 << 13;
}

/// CHOPCONF fields
pub mod chopconf {
    pub const TOFF_MASK: u32 = 0x0F;
    pub const HSTRT_SHIFT: u32 = 4;
    pub const HSTRT_MASK: u32 = 0x07 << HSTRT_SHIFT;
    pub const HEND_SHIFT: u32 = 7;
    pub const HEND_MASK: u32 = 0x0F << HEND_SHIFT;
    pub const TBL_SHIFT: u32 = 15;
    pub const TBL_MASK: u32 = 0b11 << TBL_SHIFT;
    pub const VSENSE: u32 = 1 << 17;
    pub const MRES_SHIFT: u32 = 24;
    pub const MRES_MASK: u32 = 0x0F << MRES_SHIFT;
    pub const INTPOL: u32 = 1 << 28;
}

/// PWMCONF fields
pub mod pwmconf {
    pub const AMPL_MASK: u32 = 0xFF;
    pub const GRAD_SHIFT: u32 = 8;
    pub const GRAD_MASK: u32 = 0xFF << GRAD_SHIFT;
    pub const FREQ_SHIFT: u32 = 16;
    pub const FREQ_MASK: u32 = 0b11 << FREQ_SHIFT;
    pub const AUTOSCALE: u32 = 1 << 18;
}

/// COOLCONF StallGuard threshold field
pub const SGT_SHIFT: u32 = 16;
pub const SGT_MASK: u32 = 0x7F << SGT_SHIFT;

/// IOIN version field of a TMC2130
pub const VERSION: u8 = 0x11;

const PWMCONF_RESET: u32 = 0x0005_0480;

/// Blank time code (36 clocks)
const TBL: u32 = 2;
/// Off time; the driver is only enabled while this is non-zero
const TOFF: u32 = 5;
/// Raw HSTRT field (hysteresis start 1)
const HSTRT: u32 = 0;
/// Raw HEND field (hysteresis end -2)
const HEND: u32 = 1;
/// About 2 s until the driver drops to hold current
const POWER_DOWN_DELAY: u32 = 128;
/// PWM frequency code (2/683 f_clk)
const PWM_FREQ: u32 = 1;
const PWM_GRAD: u32 = 5;
const PWM_AMPL: u32 = 255;
/// Keeps CoolStep off at low speed
const COOLSTEP_MIN_SPEED: u32 = 1024 * 1024 - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shadow {
    gconf: u32,
    ihold_irun: u32,
    chopconf: u32,
    coolconf: u32,
    pwmconf: u32,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            gconf: 0,
            ihold_irun: 0,
            chopconf: 0,
            coolconf: 0,
            pwmconf: PWMCONF_RESET,
        }
    }
}

struct Session<'a, P, S, U> {
    link: &'a mut SpiLink<P>,
    buses: &'a mut BusSet<S, U>,
    shadow: &'a mut Shadow,
}

impl<P: OutputPin, S: SpiBus, U> Session<'_, P, S, U> {
    fn write(&mut self, reg: u8, value: u32) -> Result<(), TransportError> {
        let mut frame = [0u8; 5];
        frame[0] = reg | 0x80;
        frame[1..].copy_from_slice(&value.to_be_bytes());
        self.link.transfer(self.buses, &mut frame)
    }

    fn read(&mut self, reg: u8) -> Result<u32, TransportError> {
        let mut frame = [reg, 0, 0, 0, 0];
        self.link.transfer(self.buses, &mut frame)?;
        let mut frame = [reg, 0, 0, 0, 0];
        self.link.transfer(self.buses, &mut frame)?;
        Ok(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]))
    }

    /// Check the chip answers, then load the shadow registers
    fn begin(&mut self) -> Result<(), TransportError> {
        let ioin = self.read(reg::IOIN)?;
        if ioin == 0 || ioin == u32::MAX {
            return Err(TransportError::NoResponse);
        }
        if (ioin >> 24) as u8 != VERSION {
            return Err(TransportError::CorruptReply);
        }

        self.write(reg::GCONF, self.shadow.gconf)?;
        self.write(reg::CHOPCONF, self.shadow.chopconf)?;
        self.write(reg::COOLCONF, self.shadow.coolconf)?;
        self.write(reg::PWMCONF, self.shadow.pwmconf)?;
        self.write(reg::IHOLD_IRUN, self.shadow.ihold_irun)?;
        // Clear reset/error flags
        self.write(reg::GSTAT, 0b111)
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

    fn set_pwmconf(&mut self, mask: u32, value: u32) -> Result<(), TransportError> {
        self.shadow.pwmconf = (self.shadow.pwmconf & !mask) | (value & mask);
        self.write(reg::PWMCONF, self.shadow.pwmconf)
    }

    fn set_coolconf(&mut self, mask: u32, value: u32) -> Result<(), TransportError> {
        self.shadow.coolconf = (self.shadow.coolconf & !mask) | (value & mask);
        self.write(reg::COOLCONF, self.shadow.coolconf)
    }

    fn set_current(&mut self, current_ma: u16, r_sense_mohm: u16, hold_pct: u8) -> Result<(), TransportError> {
        let scale = current_scale(current_ma, r_sense_mohm, hold_pct);
        let vsense = if scale.vsense { chopconf::VSENSE } else { 0 };
        self.set_chopconf(chopconf::VSENSE, vsense)?;

        self.shadow.ihold_irun =
            (self.shadow.ihold_irun & !0x1F1F) | ((scale.irun as u32) << 8) | scale.ihold as u32;
        self.write(reg::IHOLD_IRUN, self.shadow.ihold_irun)
    }
}

/// Register values that depend on the axis, computed before any bus access
struct Plan {
    mres: u8,
    stealth_max_speed: Option<u32>,
    stall_threshold: Option<u32>,
}

/// TMC2130 adapter
pub struct Tmc2130<P> {
    link: SpiLink<P>,
    settings: Tmc2130Settings,
    shadow: Shadow,
}

impl<P: OutputPin> Tmc2130<P> {
    pub fn new(link: SpiLink<P>, settings: Tmc2130Settings) -> Self {
        Self {
            link,
            settings,
            shadow: Shadow::default(),
        }
    }

    pub fn settings(&self) -> &Tmc2130Settings {
        &self.settings
    }

    fn plan(&self, ctx: &AxisContext<'_>) -> Result<Plan, BringUpError> {
        let settings = &self.settings;
        let policy = ctx.policy;
        let axis = ctx.axis;

        // StealthChop and a stall threshold are mutually exclusive here
        if policy.stealth() && settings.homing_sensitivity.is_some() {
            return Err(BringUpError::UnsupportedCombination {
                axis,
                combination: Combination::StealthWithStallThreshold,
            });
        }

        let mres = microstep_resolution(settings.microsteps).ok_or(
            ConfigurationError::InvalidMicrosteps {
                axis,
                microsteps: settings.microsteps,
            },
        )?;

        let stealth_max_speed = if policy.stealth() && policy.hybrid_threshold {
            let value = threshold_register(
                settings.microsteps,
                settings.hybrid_threshold_mm_s,
                ctx.steps_per_unit,
            )
            .ok_or(ConfigurationError::InvalidParameter { axis })?;
            Some(value)
        } else {
            None
        };

        let stall_threshold = if policy.sensorless_homing {
            settings.homing_sensitivity.map(stall_register)
        } else {
            None
        };

        Ok(Plan {
            mres,
            stealth_max_speed,
            stall_threshold,
        })
    }
}

impl<P: OutputPin, S: SpiBus, U> DriverAdapter<BusSet<S, U>> for Tmc2130<P> {
    fn family(&self) -> ChipFamily {
        ChipFamily::Tmc2130
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
        let plan = self.plan(ctx)?;
        let policy = ctx.policy;
        let current_ma = self.settings.current_ma;

        let mut chip = Session {
            link: &mut self.link,
            buses,
            shadow: &mut self.shadow,
        };

        chip.begin()?;
        chip.set_current(current_ma, policy.r_sense_mohm, policy.hold_multiplier_pct)?;
        chip.set_chopconf(chopconf::MRES_MASK, (plan.mres as u32) << chopconf::MRES_SHIFT)?;
        chip.set_chopconf(chopconf::TBL_MASK, TBL << chopconf::TBL_SHIFT)?;
        chip.set_chopconf(chopconf::TOFF_MASK, TOFF)?;
        let intpol = if policy.interpolate { chopconf::INTPOL } else { 0 };
        chip.set_chopconf(chopconf::INTPOL, intpol)?;
        chip.write(reg::TPOWERDOWN, POWER_DOWN_DELAY)?;
        chip.set_chopconf(chopconf::HSTRT_MASK, HSTRT << chopconf::HSTRT_SHIFT)?;
        chip.set_chopconf(chopconf::HEND_MASK, HEND << chopconf::HEND_SHIFT)?;
        // DIAG1 drives the stall signal used by sensorless homing
        chip.set_gconf(gconf::DIAG1_PUSHPULL, true)?;

        if policy.stealth() {
            chip.set_pwmconf(pwmconf::FREQ_MASK, PWM_FREQ << pwmconf::FREQ_SHIFT)?;
            chip.set_pwmconf(pwmconf::AUTOSCALE, pwmconf::AUTOSCALE)?;
            chip.set_pwmconf(pwmconf::GRAD_MASK, PWM_GRAD << pwmconf::GRAD_SHIFT)?;
            chip.set_pwmconf(pwmconf::AMPL_MASK, PWM_AMPL)?;
            chip.set_gconf(gconf::EN_PWM_MODE, true)?;
            if let Some(tpwmthrs) = plan.stealth_max_speed {
                debug!("{}: TPWMTHRS {}", ctx.axis.name(), tpwmthrs);
                chip.write(reg::TPWMTHRS, tpwmthrs)?;
            }
        } else if policy.sensorless_homing {
            chip.write(reg::TCOOLTHRS, COOLSTEP_MIN_SPEED)?;
        }

        if let Some(sgt) = plan.stall_threshold {
            chip.set_coolconf(SGT_MASK, sgt << SGT_SHIFT)?;
        }

        info!("{}: TMC2130 configured", ctx.axis.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{FakeSpiChip, MockPin, MockSerial, MockSpi, RecordingSink};
    use axial_core::config::{AxisId, BusId, ChopperMode, DriverPolicy};
    use axial_core::traits::TransportSet;

    type Buses = BusSet<MockSpi, MockSerial>;

    fn chip() -> FakeSpiChip {
        let mut chip = FakeSpiChip::new();
        chip.registers[reg::IOIN as usize] = 0x1100_0000;
        chip
    }

    fn setup(spi: MockSpi, settings: Tmc2130Settings) -> (Buses, Tmc2130<MockPin>) {
        let mut buses = Buses::new();
        let id = buses.add_spi(spi).unwrap();
        buses.begin(SharedBus::Spi(id)).unwrap();
        let driver = Tmc2130::new(SpiLink::new(id, MockPin::default()), settings);
        (buses, driver)
    }

    fn bring_up(
        buses: &mut Buses,
        driver: &mut Tmc2130<MockPin>,
        policy: &DriverPolicy,
    ) -> Result<(), BringUpError> {
        let ctx = AxisContext {
            axis: AxisId::X,
            steps_per_unit: 80,
            policy,
        };
        driver.primary_bring_up(buses, &ctx, &mut RecordingSink::default())
    }

    fn register(buses: &mut Buses, reg: u8) -> u32 {
        buses.spi(BusId(0)).unwrap().chip.as_ref().unwrap().registers[reg as usize]
    }

    fn stealth() -> DriverPolicy {
        DriverPolicy {
            chopper: ChopperMode::Stealth,
            hybrid_threshold: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_classic_mode() {
        let (mut buses, mut driver) = setup(MockSpi::with_chip(chip()), Tmc2130Settings::default());

        bring_up(&mut buses, &mut driver, &DriverPolicy::default()).unwrap();

        let chop = register(&mut buses, reg::CHOPCONF);
        assert_eq!(chop & chopconf::TOFF_MASK, 5);
        assert_eq!((chop & chopconf::TBL_MASK) >> chopconf::TBL_SHIFT, 2);
        assert_eq!((chop & chopconf::HSTRT_MASK) >> chopconf::HSTRT_SHIFT, 0);
        assert_eq!((chop & chopconf::HEND_MASK) >> chopconf::HEND_SHIFT, 1);
        assert_eq!((chop & chopconf::MRES_MASK) >> chopconf::MRES_SHIFT, 4);
        assert_ne!(chop & chopconf::INTPOL, 0);

        let gconf = register(&mut buses, reg::GCONF);
        assert_ne!(gconf & gconf::DIAG1_PUSHPULL, 0);
        assert_eq!(gconf & gconf::EN_PWM_MODE, 0);

        assert_eq!(register(&mut buses, reg::TPOWERDOWN), 128);
        assert_eq!(register(&mut buses, reg::IHOLD_IRUN), (25 << 8) | 12);
        assert_eq!(register(&mut buses, reg::TPWMTHRS), 0);
        assert_eq!(register(&mut buses, reg::TCOOLTHRS), 0);
        assert_eq!(register(&mut buses, reg::GSTAT), 0b111);
    }

    #[test]
    fn test_stealth_hybrid_threshold() {
        let settings = Tmc2130Settings {
            hybrid_threshold_mm_s: 50,
            ..Default::default()
        };
        let (mut buses, mut driver) = setup(MockSpi::with_chip(chip()), settings);

        bring_up(&mut buses, &mut driver, &stealth()).unwrap();

        assert_eq!(register(&mut buses, reg::TPWMTHRS), 197);
        assert_ne!(register(&mut buses, reg::GCONF) & gconf::EN_PWM_MODE, 0);
        let pwm = register(&mut buses, reg::PWMCONF);
        assert_eq!(pwm & pwmconf::AMPL_MASK, 255);
        assert_eq!((pwm & pwmconf::GRAD_MASK) >> pwmconf::GRAD_SHIFT, 5);
        assert_eq!((pwm & pwmconf::FREQ_MASK) >> pwmconf::FREQ_SHIFT, 1);
        assert_ne!(pwm & pwmconf::AUTOSCALE, 0);
        // Off time still written, otherwise the driver stays disabled
        assert_eq!(register(&mut buses, reg::CHOPCONF) & chopconf::TOFF_MASK, 5);
    }

    #[test]
    fn test_stealth_without_hybrid() {
        let (mut buses, mut driver) = setup(MockSpi::with_chip(chip()), Tmc2130Settings::default());
        let policy = DriverPolicy {
            hybrid_threshold: false,
            ..stealth()
        };

        bring_up(&mut buses, &mut driver, &policy).unwrap();
        assert_eq!(register(&mut buses, reg::TPWMTHRS), 0);
    }

    #[test]
    fn test_sensorless_homing() {
        let settings = Tmc2130Settings {
            homing_sensitivity: Some(-3),
            ..Default::default()
        };
        let (mut buses, mut driver) = setup(MockSpi::with_chip(chip()), settings);
        let policy = DriverPolicy {
            sensorless_homing: true,
            ..Default::default()
        };

        bring_up(&mut buses, &mut driver, &policy).unwrap();

        assert_eq!(register(&mut buses, reg::TCOOLTHRS), 0xFFFFF);
        let cool = register(&mut buses, reg::COOLCONF);
        assert_eq!((cool & SGT_MASK) >> SGT_SHIFT, 0x7D);
    }

    #[test]
    fn test_stealth_with_stall_threshold_rejected() {
        let settings = Tmc2130Settings {
            homing_sensitivity: Some(8),
            ..Default::default()
        };
        let (mut buses, mut driver) = setup(MockSpi::with_chip(chip()), settings);

        assert_eq!(
            bring_up(&mut buses, &mut driver, &stealth()),
            Err(BringUpError::UnsupportedCombination {
                axis: AxisId::X,
                combination: Combination::StealthWithStallThreshold,
            })
        );
        // Rejected before the bus was touched
        assert!(buses.spi(BusId(0)).unwrap().frames.is_empty());
    }

    #[test]
    fn test_zero_hybrid_threshold() {
        let settings = Tmc2130Settings {
            hybrid_threshold_mm_s: 0,
            ..Default::default()
        };
        let (mut buses, mut driver) = setup(MockSpi::with_chip(chip()), settings);

        assert_eq!(
            bring_up(&mut buses, &mut driver, &stealth()),
            Err(ConfigurationError::InvalidParameter { axis: AxisId::X }.into())
        );
    }

    #[test]
    fn test_floating_miso() {
        let (mut buses, mut driver) = setup(MockSpi::with_idle(0xFF), Tmc2130Settings::default());

        assert_eq!(
            bring_up(&mut buses, &mut driver, &DriverPolicy::default()),
            Err(TransportError::NoResponse.into())
        );
    }

    #[test]
    fn test_wrong_chip() {
        let mut other = FakeSpiChip::new();
        other.registers[reg::IOIN as usize] = 0x2000_0000;
        let (mut buses, mut driver) = setup(MockSpi::with_chip(other), Tmc2130Settings::default());

        assert_eq!(
            bring_up(&mut buses, &mut driver, &DriverPolicy::default()),
            Err(TransportError::CorruptReply.into())
        );
    }

    #[test]
    fn test_bus_not_begun() {
        let mut buses = Buses::new();
        let id = buses.add_spi(MockSpi::with_chip(chip())).unwrap();
        let mut driver = Tmc2130::new(SpiLink::new(id, MockPin::default()), Tmc2130Settings::default());

        assert_eq!(
            bring_up(&mut buses, &mut driver, &DriverPolicy::default()),
            Err(TransportError::NotReady.into())
        );
    }
}
