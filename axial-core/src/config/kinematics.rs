//! Kinematic parameters consumed by bring-up
//!
//! Only steps-per-unit is needed here: the SPI chopper family converts its
//! hybrid threshold from mm/s into a step-interval register with it.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::axis::{AxisId, KinematicAxis, MAX_EXTRUDERS};

/// Steps per unit (mm) for each kinematic dimension
///
/// Values are whole steps; fractional factors are truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KinematicParams {
    /// X steps per mm
    pub x: u32,
    /// Y steps per mm
    pub y: u32,
    /// Z steps per mm
    pub z: u32,
    /// E steps per mm
    ///
    /// One entry shares a single factor across all extruders. More entries
    /// give each extruder its own factor (E0 first).
    pub e: Vec<u32, MAX_EXTRUDERS>,
}

impl Default for KinematicParams {
    fn default() -> Self {
        let mut e = Vec::new();
        // Capacity is MAX_EXTRUDERS, one push cannot fail
        let _ = e.push(500);
        Self {
            x: 80,
            y: 80,
            z: 4000,
            e,
        }
    }
}

impl KinematicParams {
    /// Whether each extruder has its own steps-per-mm factor
    pub fn distinct_e_factors(&self) -> bool {
        self.e.len() > 1
    }

    /// Steps per unit for the dimension an axis slot drives
    ///
    /// E1..E4 use their own factor when one is configured and fall back to
    /// the first E factor otherwise. Returns 0 when no E factor exists.
    pub fn steps_per_unit(&self, axis: AxisId) -> u32 {
        match axis.kinematic_axis() {
            KinematicAxis::X => self.x,
            KinematicAxis::Y => self.y,
            KinematicAxis::Z => self.z,
            KinematicAxis::E(n) => self
                .e
                .get(n as usize)
                .or_else(|| self.e.first())
                .copied()
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_axes_share_factor() {
        let params = KinematicParams::default();
        assert_eq!(params.steps_per_unit(AxisId::X2), params.x);
        assert_eq!(params.steps_per_unit(AxisId::Z2), params.z);
    }

    #[test]
    fn test_shared_e_factor() {
        let params = KinematicParams::default();
        assert!(!params.distinct_e_factors());
        assert_eq!(params.steps_per_unit(AxisId::E0), 500);
        assert_eq!(params.steps_per_unit(AxisId::E3), 500);
    }

    #[test]
    fn test_distinct_e_factors() {
        let mut params = KinematicParams::default();
        params.e.clear();
        params.e.extend_from_slice(&[400, 410, 420]).unwrap();

        assert!(params.distinct_e_factors());
        assert_eq!(params.steps_per_unit(AxisId::E1), 410);
        assert_eq!(params.steps_per_unit(AxisId::E2), 420);
        // E4 has no entry of its own
        assert_eq!(params.steps_per_unit(AxisId::E4), 400);
    }

    #[test]
    fn test_missing_e_factor() {
        let mut params = KinematicParams::default();
        params.e.clear();
        assert_eq!(params.steps_per_unit(AxisId::E0), 0);
    }
}
