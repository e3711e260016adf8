//! Machine-wide driver policy
//!
//! A single policy applies to every slot: which chopper algorithm to run,
//! whether the hybrid stealth/classic switch-over is used, whether homing
//! relies on stall detection, and what to do when an axis fails to come up.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Chopper algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChopperMode {
    /// Quiet voltage-PWM chopper (StealthChop)
    Stealth,
    /// Classic constant off-time chopper (SpreadCycle)
    #[default]
    SpreadCycle,
}

/// What the orchestrator does when an axis fails to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailurePolicy {
    /// Stop at the first failure; the machine never becomes ready
    #[default]
    Halt,
    /// Record the failure and bring up the remaining axes
    ///
    /// The failed axis is left unconfigured. Motion on it is unsafe.
    Continue,
}

/// Driver policy shared by all slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverPolicy {
    /// Chopper algorithm
    pub chopper: ChopperMode,
    /// Switch from stealth to classic above each axis's hybrid threshold
    pub hybrid_threshold: bool,
    /// Home with stall detection instead of endstop switches
    pub sensorless_homing: bool,
    /// Interpolate microsteps to 256 inside the driver
    pub interpolate: bool,
    /// Hold current as a percentage of run current
    pub hold_multiplier_pct: u8,
    /// Sense resistor value in milliohms
    pub r_sense_mohm: u16,
    /// Behaviour when an axis fails
    pub on_failure: FailurePolicy,
}

impl Default for DriverPolicy {
    fn default() -> Self {
        Self {
            chopper: ChopperMode::SpreadCycle,
            hybrid_threshold: false,
            sensorless_homing: false,
            interpolate: true,
            hold_multiplier_pct: 50,
            r_sense_mohm: 110,
            on_failure: FailurePolicy::Halt,
        }
    }
}

impl DriverPolicy {
    /// Whether the quiet chopper is selected
    pub fn stealth(&self) -> bool {
        self.chopper == ChopperMode::Stealth
    }
}
