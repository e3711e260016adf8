//! Stepper driver adapters
//!
//! One adapter per chip family, wrapped in [`DriverInstance`] so a slot
//! table can hold any mix of them.

pub mod derived;
pub mod l6470;
pub mod tmc2130;
pub mod tmc2208;
pub mod tmc26x;

pub use l6470::L6470;
pub use tmc2130::Tmc2130;
pub use tmc2208::Tmc2208;
pub use tmc26x::Tmc26x;

use axial_core::bringup::{BringUpReport, Orchestrator, SlotTable};
use axial_core::config::{
    AxisId, BindingTable, ChipFamily, DriverConfig, MachineConfig, SharedBus, TransportConfig,
};
use axial_core::error::{BringUpError, ConfigurationError, TransportError};
use axial_core::traits::{AxisContext, DiagnosticSink, DriverAdapter};
use axial_hal::{OutputPin, SerialPort, SpiBus};

use crate::transport::{BoardResources, BusSet, SerialLink, SpiLink};

/// The driver attached to one slot
pub enum DriverInstance<P, W> {
    Tmc26x(Tmc26x<P>),
    Tmc2130(Tmc2130<P>),
    Tmc2208(Tmc2208<W>),
    L6470(L6470<P>),
}

impl<P: OutputPin, W: SerialPort> DriverInstance<P, W> {
    /// Build the adapter for a binding from board resources
    pub fn from_binding<R>(
        axis: AxisId,
        driver: &DriverConfig,
        transport: &TransportConfig,
        board: &mut R,
    ) -> Result<Self, ConfigurationError>
    where
        R: BoardResources<Pin = P, Serial = W>,
    {
        let family = driver.family();
        let mismatch = ConfigurationError::TransportMismatch { axis, family };

        let instance = match (*driver, *transport) {
            (DriverConfig::Tmc2208(settings), TransportConfig::HardwareSerial { port }) => {
                DriverInstance::Tmc2208(Tmc2208::new(SerialLink::Hardware(port), settings))
            }
            (DriverConfig::Tmc2208(settings), TransportConfig::SoftwareSerial { rx_pin, tx_pin }) => {
                let port = board.software_serial(axis, rx_pin, tx_pin).ok_or(
                    ConfigurationError::ResourceUnavailable {
                        axis,
                        resource: tx_pin,
                    },
                )?;
                DriverInstance::Tmc2208(Tmc2208::new(SerialLink::Software(port), settings))
            }
            (DriverConfig::Tmc2208(_), _) => return Err(mismatch),
            (driver, TransportConfig::Spi { bus, cs_pin }) => {
                let pin = board
                    .chip_select(axis, cs_pin)
                    .ok_or(ConfigurationError::ResourceUnavailable {
                        axis,
                        resource: cs_pin,
                    })?;
                let link = SpiLink::new(bus, pin);
                match driver {
                    DriverConfig::Tmc26x(settings) => DriverInstance::Tmc26x(Tmc26x::new(link, settings)),
                    DriverConfig::Tmc2130(settings) => {
                        DriverInstance::Tmc2130(Tmc2130::new(link, settings))
                    }
                    DriverConfig::L6470(settings) => DriverInstance::L6470(L6470::new(link, settings)),
                    DriverConfig::Tmc2208(_) => return Err(mismatch),
                }
            }
            _ => return Err(mismatch),
        };
        Ok(instance)
    }
}

/// Dispatch a call to whichever adapter the instance holds
macro_rules! dispatch {
    ($self:expr, $driver:ident => $call:expr) => {
        match $self {
            DriverInstance::Tmc26x($driver) => $call,
            DriverInstance::Tmc2130($driver) => $call,
            DriverInstance::Tmc2208($driver) => $call,
            DriverInstance::L6470($driver) => $call,
        }
    };
}

impl<P, W, S, U> DriverAdapter<BusSet<S, U>> for DriverInstance<P, W>
where
    P: OutputPin,
    W: SerialPort,
    S: SpiBus,
    U: SerialPort,
{
    fn family(&self) -> ChipFamily {
        match self {
            DriverInstance::Tmc26x(_) => ChipFamily::Tmc26x,
            DriverInstance::Tmc2130(_) => ChipFamily::Tmc2130,
            DriverInstance::Tmc2208(_) => ChipFamily::Tmc2208,
            DriverInstance::L6470(_) => ChipFamily::L6470,
        }
    }

    fn shared_bus(&self) -> Option<SharedBus> {
        dispatch!(self, d => DriverAdapter::<BusSet<S, U>>::shared_bus(d))
    }

    fn begin_transport(&mut self, buses: &mut BusSet<S, U>) -> Result<(), TransportError> {
        dispatch!(self, d => d.begin_transport(buses))
    }

    fn primary_bring_up(
        &mut self,
        buses: &mut BusSet<S, U>,
        ctx: &AxisContext<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), BringUpError> {
        dispatch!(self, d => d.primary_bring_up(buses, ctx, sink))
    }

    fn needs_secondary(&self) -> bool {
        dispatch!(self, d => DriverAdapter::<BusSet<S, U>>::needs_secondary(d))
    }

    fn secondary_bring_up(
        &mut self,
        buses: &mut BusSet<S, U>,
        ctx: &AxisContext<'_>,
    ) -> Result<(), BringUpError> {
        dispatch!(self, d => d.secondary_bring_up(buses, ctx))
    }
}

/// Build the slot table for a validated binding table
///
/// Claims chip-select pins and emulated serial lines from the board. No
/// bus traffic happens here.
pub fn build_slots<R: BoardResources>(
    table: &BindingTable,
    board: &mut R,
) -> Result<SlotTable<DriverInstance<R::Pin, R::Serial>>, ConfigurationError> {
    let mut slots = SlotTable::new();
    for (axis, binding) in table.iter() {
        let family = binding.driver.family();
        let instance =
            DriverInstance::from_binding(axis, &binding.driver, &binding.transport, board)?;
        slots
            .attach(axis, instance)
            .map_err(|_| ConfigurationError::AmbiguousBinding {
                axis,
                existing: family,
                requested: family,
            })?;
    }
    Ok(slots)
}

/// Bring up every driver the configuration names
///
/// Returns `Err` when the configuration is rejected; that always happens
/// before any bus is touched. Otherwise the report's state is `Ready` or
/// `Faulted`, and only `Ready` allows motion.
pub fn bring_up_all_drivers<R, S, U>(
    config: &MachineConfig,
    board: &mut R,
    buses: &mut BusSet<S, U>,
    sink: &mut dyn DiagnosticSink,
) -> Result<BringUpReport, BringUpError>
where
    R: BoardResources,
    S: SpiBus,
    U: SerialPort,
{
    config.validate()?;

    for (axis, binding) in config.bindings.iter() {
        if let Some(bus) = binding.transport.shared_bus() {
            if !buses.contains(bus) {
                let resource = match bus {
                    SharedBus::Spi(id) | SharedBus::Serial(id) => id.0,
                };
                return Err(ConfigurationError::ResourceUnavailable { axis, resource }.into());
            }
        }
    }

    let mut slots = build_slots(&config.bindings, board)?;
    Ok(Orchestrator::new(&config.kinematics, &config.policy).run(&mut slots, buses, sink))
}
