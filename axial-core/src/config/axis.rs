//! Logical axis slots
//!
//! Every stepper on the machine occupies one of eleven fixed slots. Dual
//! drive axes (X2, Y2, Z2) follow their primary axis, extruders E1..E4
//! share the E dimension of the kinematics.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of axis slots (X, X2, Y, Y2, Z, Z2, E0-E4)
pub const AXIS_COUNT: usize = 11;

/// Maximum number of extruder slots
pub const MAX_EXTRUDERS: usize = 5;

/// Logical axis slot identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisId {
    X,
    X2,
    Y,
    Y2,
    Z,
    Z2,
    E0,
    E1,
    E2,
    E3,
    E4,
}

/// Kinematic dimension an axis slot moves along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KinematicAxis {
    X,
    Y,
    Z,
    /// Extruder, with its index (0-4)
    E(u8),
}

impl AxisId {
    /// All slots in bring-up order
    pub const ALL: [AxisId; AXIS_COUNT] = [
        AxisId::X,
        AxisId::X2,
        AxisId::Y,
        AxisId::Y2,
        AxisId::Z,
        AxisId::Z2,
        AxisId::E0,
        AxisId::E1,
        AxisId::E2,
        AxisId::E3,
        AxisId::E4,
    ];

    /// Position of this slot in the slot table
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look a slot up by its table position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The kinematic dimension this slot drives
    pub const fn kinematic_axis(self) -> KinematicAxis {
        match self {
            AxisId::X | AxisId::X2 => KinematicAxis::X,
            AxisId::Y | AxisId::Y2 => KinematicAxis::Y,
            AxisId::Z | AxisId::Z2 => KinematicAxis::Z,
            AxisId::E0 => KinematicAxis::E(0),
            AxisId::E1 => KinematicAxis::E(1),
            AxisId::E2 => KinematicAxis::E(2),
            AxisId::E3 => KinematicAxis::E(3),
            AxisId::E4 => KinematicAxis::E(4),
        }
    }

    /// Config-file name of the slot ("x", "x2", ..., "e4")
    pub const fn name(self) -> &'static str {
        match self {
            AxisId::X => "x",
            AxisId::X2 => "x2",
            AxisId::Y => "y",
            AxisId::Y2 => "y2",
            AxisId::Z => "z",
            AxisId::Z2 => "z2",
            AxisId::E0 => "e0",
            AxisId::E1 => "e1",
            AxisId::E2 => "e2",
            AxisId::E3 => "e3",
            AxisId::E4 => "e4",
        }
    }

    /// Parse a config-file slot name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|axis| axis.name() == name)
    }
}
