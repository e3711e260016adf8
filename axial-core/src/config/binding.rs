//! Axis-to-driver bindings
//!
//! A [`BindingTable`] records, for each axis slot, which driver chip is
//! attached, its per-chip settings, and the transport it is reached
//! through. Every consistency rule is checked when a binding is added, so a
//! table that exists is a table that can be brought up.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::axis::{AxisId, AXIS_COUNT};
use super::policy::DriverPolicy;
use crate::error::{BringUpError, Combination, ConfigurationError};

/// Index of a shared bus in the board's bus arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BusId(pub u8);

/// A bus that several slots may share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SharedBus {
    /// SPI clock/data lines
    Spi(BusId),
    /// Hardware UART
    Serial(BusId),
}

/// Stepper driver chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChipFamily {
    /// Step/dir driver with SPI current control
    Tmc26x,
    /// SPI-programmable chopper driver
    Tmc2130,
    /// UART-programmable chopper driver
    Tmc2208,
    /// SPI microstepping driver with onboard motion control
    L6470,
}

impl ChipFamily {
    /// All families
    pub const ALL: [ChipFamily; 4] = [
        ChipFamily::Tmc26x,
        ChipFamily::Tmc2130,
        ChipFamily::Tmc2208,
        ChipFamily::L6470,
    ];

    /// Config-file section name of the family
    pub const fn name(self) -> &'static str {
        match self {
            ChipFamily::Tmc26x => "tmc26x",
            ChipFamily::Tmc2130 => "tmc2130",
            ChipFamily::Tmc2208 => "tmc2208",
            ChipFamily::L6470 => "l6470",
        }
    }

    /// Parse a config-file section name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Whether the family can be reached over the given transport
    pub fn supports(self, transport: &TransportConfig) -> bool {
        match self {
            ChipFamily::Tmc26x | ChipFamily::Tmc2130 | ChipFamily::L6470 => {
                matches!(transport, TransportConfig::Spi { .. })
            }
            ChipFamily::Tmc2208 => matches!(
                transport,
                TransportConfig::HardwareSerial { .. } | TransportConfig::SoftwareSerial { .. }
            ),
        }
    }

    /// Largest microstep count the family can be programmed for
    pub const fn max_microsteps(self) -> u16 {
        match self {
            ChipFamily::L6470 => 128,
            _ => 256,
        }
    }

    /// Whether `microsteps` is a valid setting for the family
    pub fn supports_microsteps(self, microsteps: u16) -> bool {
        microsteps.is_power_of_two() && microsteps <= self.max_microsteps()
    }
}

/// How a driver chip is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransportConfig {
    /// Shared SPI bus with a dedicated chip-select pin
    Spi { bus: BusId, cs_pin: u8 },
    /// Hardware UART in the bus arena
    ///
    /// The UART family answers a fixed slave address, so a port carries one chip.
    HardwareSerial { port: BusId },
    /// Emulated UART owned by this slot
    ///
    /// Without an RX pin the line is write-only.
    SoftwareSerial { rx_pin: Option<u8>, tx_pin: u8 },
}

impl TransportConfig {
    /// The shared bus this transport uses, if any
    pub fn shared_bus(&self) -> Option<SharedBus> {
        match *self {
            TransportConfig::Spi { bus, .. } => Some(SharedBus::Spi(bus)),
            TransportConfig::HardwareSerial { port } => Some(SharedBus::Serial(port)),
            TransportConfig::SoftwareSerial { .. } => None,
        }
    }

    /// Pins exclusively claimed by this transport
    pub fn claimed_pins(&self) -> [Option<u8>; 2] {
        match *self {
            TransportConfig::Spi { cs_pin, .. } => [Some(cs_pin), None],
            TransportConfig::HardwareSerial { .. } => [None, None],
            TransportConfig::SoftwareSerial { rx_pin, tx_pin } => [rx_pin, Some(tx_pin)],
        }
    }
}

/// TMC26X settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Tmc26xSettings {
    /// Microsteps per full step
    pub microsteps: u16,
    /// Peak current in mA
    pub current_ma: u16,
    /// Sense resistor in milliohms
    pub sense_resistor_mohm: u16,
}

impl Default for Tmc26xSettings {
    fn default() -> Self {
        Self {
            microsteps: 16,
            current_ma: 1000,
            sense_resistor_mohm: 150,
        }
    }
}

/// TMC2130 settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Tmc2130Settings {
    /// Microsteps per full step
    pub microsteps: u16,
    /// RMS run current in mA
    pub current_ma: u16,
    /// Speed in mm/s above which the driver leaves stealth mode
    pub hybrid_threshold_mm_s: u32,
    /// Stall sensitivity for sensorless homing (-64..=63, lower is more sensitive)
    pub homing_sensitivity: Option<i8>,
}

impl Default for Tmc2130Settings {
    fn default() -> Self {
        Self {
            microsteps: 16,
            current_ma: 800,
            hybrid_threshold_mm_s: 100,
            homing_sensitivity: None,
        }
    }
}

/// TMC2208 settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Tmc2208Settings {
    /// Microsteps per full step
    pub microsteps: u16,
    /// RMS run current in mA
    pub current_ma: u16,
    /// Force SpreadCycle in a second pass after every primary bring-up
    pub advanced: bool,
}

impl Default for Tmc2208Settings {
    fn default() -> Self {
        Self {
            microsteps: 16,
            current_ma: 800,
            advanced: false,
        }
    }
}

/// L6470 settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct L6470Settings {
    /// Microsteps per full step
    pub microsteps: u16,
    /// Output voltage scale (KVAL) applied to run, acc, dec and hold
    pub k_val: u8,
    /// Overcurrent detection threshold in mA
    pub overcurrent_ma: u16,
    /// Stall detection threshold in mA
    pub stall_current_ma: u16,
}

impl Default for L6470Settings {
    fn default() -> Self {
        Self {
            microsteps: 128,
            k_val: 50,
            overcurrent_ma: 2000,
            stall_current_ma: 1500,
        }
    }
}

/// Chip family plus its settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DriverConfig {
    Tmc26x(Tmc26xSettings),
    Tmc2130(Tmc2130Settings),
    Tmc2208(Tmc2208Settings),
    L6470(L6470Settings),
}

impl DriverConfig {
    /// Family of the configured chip
    pub fn family(&self) -> ChipFamily {
        match self {
            DriverConfig::Tmc26x(_) => ChipFamily::Tmc26x,
            DriverConfig::Tmc2130(_) => ChipFamily::Tmc2130,
            DriverConfig::Tmc2208(_) => ChipFamily::Tmc2208,
            DriverConfig::L6470(_) => ChipFamily::L6470,
        }
    }

    /// Configured microstep count
    pub fn microsteps(&self) -> u16 {
        match self {
            DriverConfig::Tmc26x(s) => s.microsteps,
            DriverConfig::Tmc2130(s) => s.microsteps,
            DriverConfig::Tmc2208(s) => s.microsteps,
            DriverConfig::L6470(s) => s.microsteps,
        }
    }
}

/// A driver bound to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverBinding {
    /// Chip and its settings
    pub driver: DriverConfig,
    /// How the chip is reached
    pub transport: TransportConfig,
}

/// Per-slot driver bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BindingTable {
    slots: [Option<DriverBinding>; AXIS_COUNT],
}

impl BindingTable {
    /// Create an empty table (no drivers attached)
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a driver to an axis slot
    ///
    /// The table is left unchanged when an error is returned.
    pub fn bind(
        &mut self,
        axis: AxisId,
        driver: DriverConfig,
        transport: TransportConfig,
    ) -> Result<(), ConfigurationError> {
        let family = driver.family();

        if let Some(existing) = &self.slots[axis.index()] {
            return Err(ConfigurationError::AmbiguousBinding {
                axis,
                existing: existing.driver.family(),
                requested: family,
            });
        }

        if !family.supports(&transport) {
            return Err(ConfigurationError::TransportMismatch { axis, family });
        }

        if !family.supports_microsteps(driver.microsteps()) {
            return Err(ConfigurationError::InvalidMicrosteps {
                axis,
                microsteps: driver.microsteps(),
            });
        }

        // The UART family has a fixed slave address, one chip per port
        if let TransportConfig::HardwareSerial { port } = transport {
            if let Some(owner) = self.port_owner(port) {
                return Err(ConfigurationError::AddressConflict {
                    port: port.0,
                    first: owner,
                    second: axis,
                });
            }
        }

        let claimed = transport.claimed_pins();
        if let [Some(a), Some(b)] = claimed {
            if a == b {
                return Err(ConfigurationError::PinConflict {
                    pin: a,
                    first: axis,
                    second: axis,
                });
            }
        }
        for pin in claimed.into_iter().flatten() {
            if let Some(owner) = self.pin_owner(pin) {
                return Err(ConfigurationError::PinConflict {
                    pin,
                    first: owner,
                    second: axis,
                });
            }
        }

        self.slots[axis.index()] = Some(DriverBinding { driver, transport });
        Ok(())
    }

    /// Binding of a slot, if a driver is attached
    pub fn get(&self, axis: AxisId) -> Option<&DriverBinding> {
        self.slots[axis.index()].as_ref()
    }

    /// Bound slots in bring-up order
    pub fn iter(&self) -> impl Iterator<Item = (AxisId, &DriverBinding)> {
        AxisId::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(axis, slot)| slot.as_ref().map(|b| (*axis, b)))
    }

    /// Number of bound slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether no slot is bound
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot that already claims `pin`
    fn pin_owner(&self, pin: u8) -> Option<AxisId> {
        self.iter()
            .find(|(_, b)| b.transport.claimed_pins().contains(&Some(pin)))
            .map(|(axis, _)| axis)
    }

    /// Slot already using hardware serial `port`
    fn port_owner(&self, port: BusId) -> Option<AxisId> {
        self.iter()
            .find(|(_, b)| b.transport == TransportConfig::HardwareSerial { port })
            .map(|(axis, _)| axis)
    }

    /// Check the table against the machine-wide policy
    ///
    /// Catches combinations that are individually valid per slot but not
    /// under the selected policy. Run before any bus is touched.
    pub fn validate(&self, policy: &DriverPolicy) -> Result<(), BringUpError> {
        for (axis, binding) in self.iter() {
            if let DriverConfig::Tmc2130(settings) = &binding.driver {
                if policy.stealth() && settings.homing_sensitivity.is_some() {
                    return Err(BringUpError::UnsupportedCombination {
                        axis,
                        combination: Combination::StealthWithStallThreshold,
                    });
                }
                if policy.stealth()
                    && policy.hybrid_threshold
                    && settings.hybrid_threshold_mm_s == 0
                {
                    return Err(ConfigurationError::InvalidParameter { axis }.into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::policy::ChopperMode;

    fn spi(bus: u8, cs_pin: u8) -> TransportConfig {
        TransportConfig::Spi {
            bus: BusId(bus),
            cs_pin,
        }
    }

    fn soft(rx_pin: u8, tx_pin: u8) -> TransportConfig {
        TransportConfig::SoftwareSerial {
            rx_pin: Some(rx_pin),
            tx_pin,
        }
    }

    #[test]
    fn test_empty_table() {
        let table = BindingTable::new();
        assert!(table.is_empty());
        assert!(table.get(AxisId::X).is_none());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn test_bind_and_iterate_in_order() {
        let mut table = BindingTable::new();
        table
            .bind(AxisId::E0, DriverConfig::Tmc2208(Default::default()), soft(2, 3))
            .unwrap();
        table
            .bind(AxisId::X, DriverConfig::Tmc2130(Default::default()), spi(0, 10))
            .unwrap();

        let axes: heapless::Vec<AxisId, AXIS_COUNT> = table.iter().map(|(a, _)| a).collect();
        assert_eq!(axes.as_slice(), &[AxisId::X, AxisId::E0]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ambiguous_binding() {
        let mut table = BindingTable::new();
        table
            .bind(AxisId::Y, DriverConfig::Tmc2130(Default::default()), spi(0, 10))
            .unwrap();

        let result = table.bind(AxisId::Y, DriverConfig::Tmc2208(Default::default()), soft(4, 5));
        assert_eq!(
            result,
            Err(ConfigurationError::AmbiguousBinding {
                axis: AxisId::Y,
                existing: ChipFamily::Tmc2130,
                requested: ChipFamily::Tmc2208,
            })
        );
        // First binding is untouched
        assert_eq!(table.get(AxisId::Y).unwrap().driver.family(), ChipFamily::Tmc2130);
    }

    #[test]
    fn test_emulated_pin_conflict() {
        let mut table = BindingTable::new();
        table
            .bind(AxisId::E0, DriverConfig::Tmc2208(Default::default()), soft(2, 3))
            .unwrap();

        let result = table.bind(AxisId::E1, DriverConfig::Tmc2208(Default::default()), soft(6, 2));
        assert_eq!(
            result,
            Err(ConfigurationError::PinConflict {
                pin: 2,
                first: AxisId::E0,
                second: AxisId::E1,
            })
        );
        assert!(table.get(AxisId::E1).is_none());
    }

    #[test]
    fn test_rx_tx_same_pin() {
        let mut table = BindingTable::new();
        let result = table.bind(AxisId::Z, DriverConfig::Tmc2208(Default::default()), soft(7, 7));
        assert!(matches!(result, Err(ConfigurationError::PinConflict { pin: 7, .. })));
    }

    #[test]
    fn test_chip_select_conflicts_with_emulated_pin() {
        let mut table = BindingTable::new();
        table
            .bind(AxisId::X, DriverConfig::Tmc2130(Default::default()), spi(0, 9))
            .unwrap();
        let result = table.bind(AxisId::E0, DriverConfig::Tmc2208(Default::default()), soft(8, 9));
        assert!(matches!(result, Err(ConfigurationError::PinConflict { pin: 9, .. })));
    }

    #[test]
    fn test_second_chip_on_hardware_serial_rejected() {
        let mut table = BindingTable::new();
        let port = TransportConfig::HardwareSerial { port: BusId(1) };
        table
            .bind(AxisId::X, DriverConfig::Tmc2208(Default::default()), port)
            .unwrap();

        assert_eq!(
            table.bind(AxisId::Y, DriverConfig::Tmc2208(Default::default()), port),
            Err(ConfigurationError::AddressConflict {
                port: 1,
                first: AxisId::X,
                second: AxisId::Y,
            })
        );
        assert!(table.get(AxisId::Y).is_none());

        // Another port is fine
        let other = TransportConfig::HardwareSerial { port: BusId(0) };
        table
            .bind(AxisId::Y, DriverConfig::Tmc2208(Default::default()), other)
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_transport_mismatch() {
        let mut table = BindingTable::new();
        let result = table.bind(AxisId::X, DriverConfig::Tmc2130(Default::default()), soft(1, 2));
        assert_eq!(
            result,
            Err(ConfigurationError::TransportMismatch {
                axis: AxisId::X,
                family: ChipFamily::Tmc2130,
            })
        );

        let port = TransportConfig::HardwareSerial { port: BusId(0) };
        let result = table.bind(AxisId::X, DriverConfig::L6470(Default::default()), port);
        assert!(matches!(result, Err(ConfigurationError::TransportMismatch { .. })));
    }

    #[test]
    fn test_invalid_microsteps() {
        let mut table = BindingTable::new();
        let l6470 = L6470Settings {
            microsteps: 256,
            ..Default::default()
        };
        let result = table.bind(AxisId::Z, DriverConfig::L6470(l6470), spi(0, 11));
        assert_eq!(
            result,
            Err(ConfigurationError::InvalidMicrosteps {
                axis: AxisId::Z,
                microsteps: 256,
            })
        );

        let tmc = Tmc2130Settings {
            microsteps: 12,
            ..Default::default()
        };
        let result = table.bind(AxisId::Z, DriverConfig::Tmc2130(tmc), spi(0, 11));
        assert!(matches!(result, Err(ConfigurationError::InvalidMicrosteps { .. })));
    }

    #[test]
    fn test_stealth_with_stall_threshold_rejected() {
        let mut table = BindingTable::new();
        let settings = Tmc2130Settings {
            homing_sensitivity: Some(8),
            ..Default::default()
        };
        table
            .bind(AxisId::X, DriverConfig::Tmc2130(settings), spi(0, 10))
            .unwrap();

        let stealth = DriverPolicy {
            chopper: ChopperMode::Stealth,
            sensorless_homing: true,
            ..Default::default()
        };
        assert_eq!(
            table.validate(&stealth),
            Err(BringUpError::UnsupportedCombination {
                axis: AxisId::X,
                combination: Combination::StealthWithStallThreshold,
            })
        );

        let classic = DriverPolicy {
            sensorless_homing: true,
            ..Default::default()
        };
        assert_eq!(table.validate(&classic), Ok(()));
    }

    #[test]
    fn test_zero_hybrid_threshold_rejected() {
        let mut table = BindingTable::new();
        let settings = Tmc2130Settings {
            hybrid_threshold_mm_s: 0,
            ..Default::default()
        };
        table
            .bind(AxisId::Y, DriverConfig::Tmc2130(settings), spi(0, 10))
            .unwrap();

        let policy = DriverPolicy {
            chopper: ChopperMode::Stealth,
            hybrid_threshold: true,
            ..Default::default()
        };
        assert_eq!(
            table.validate(&policy),
            Err(BringUpError::Configuration(ConfigurationError::InvalidParameter {
                axis: AxisId::Y
            }))
        );
    }
}
