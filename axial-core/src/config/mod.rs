//! Configuration types
//!
//! Board-agnostic configuration for driver bring-up. The firmware build
//! script assembles a [`MachineConfig`] from `machine.toml` and embeds it as
//! postcard binary data.

pub mod axis;
pub mod binding;
pub mod kinematics;
pub mod policy;

pub use axis::*;
pub use binding::*;
pub use kinematics::*;
pub use policy::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BringUpError, ConfigurationError};

/// Complete bring-up configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MachineConfig {
    /// Configuration version for compatibility checks
    pub version: u8,
    /// Machine-wide driver policy
    pub policy: DriverPolicy,
    /// Steps per unit for each kinematic dimension
    pub kinematics: KinematicParams,
    /// Driver attached to each axis slot
    pub bindings: BindingTable,
}

impl MachineConfig {
    /// Current configuration format version
    pub const VERSION: u8 = 1;

    /// Create a configuration with no drivers attached
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            ..Default::default()
        }
    }

    /// Run every check that does not need hardware
    pub fn validate(&self) -> Result<(), BringUpError> {
        self.bindings.validate(&self.policy)?;

        // Hybrid threshold is converted with steps per mm during bring-up
        if self.policy.stealth() && self.policy.hybrid_threshold {
            for (axis, binding) in self.bindings.iter() {
                if matches!(binding.driver, DriverConfig::Tmc2130(_))
                    && self.kinematics.steps_per_unit(axis) == 0
                {
                    return Err(ConfigurationError::InvalidParameter { axis }.into());
                }
            }
        }
        Ok(())
    }
}
