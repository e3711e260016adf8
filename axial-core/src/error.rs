//! Error types for driver bring-up
//!
//! Three kinds of failure exist:
//!
//! - [`ConfigurationError`]: the axis/driver binding is inconsistent. Always
//!   detected before any bus is touched (at build time for the firmware).
//! - [`TransportError`]: a handshake or register transfer failed on a bus.
//! - [`BringUpError::UnsupportedCombination`]: the requested feature set
//!   cannot be expressed on the chip.

use thiserror::Error;

use crate::config::{AxisId, ChipFamily};

/// Inconsistent driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurationError {
    /// More than one chip family requested for the same axis slot
    #[error("axis {axis:?} is bound to both {existing:?} and {requested:?}")]
    AmbiguousBinding {
        axis: AxisId,
        existing: ChipFamily,
        requested: ChipFamily,
    },
    /// Two transports claim the same pin
    #[error("pin {pin} is claimed by both {first:?} and {second:?}")]
    PinConflict {
        pin: u8,
        first: AxisId,
        second: AxisId,
    },
    /// Two fixed-address UART chips on one hardware serial port
    #[error("serial port {port} already serves {first:?}; {second:?} would answer the same address")]
    AddressConflict {
        port: u8,
        first: AxisId,
        second: AxisId,
    },
    /// The family cannot talk over the requested transport
    #[error("{family:?} on axis {axis:?} cannot use the requested transport")]
    TransportMismatch { axis: AxisId, family: ChipFamily },
    /// Microstep count not supported by the family
    #[error("axis {axis:?} requests {microsteps} microsteps, not supported by its driver")]
    InvalidMicrosteps { axis: AxisId, microsteps: u16 },
    /// A derived parameter could not be computed from the given inputs
    #[error("axis {axis:?} has a zero value where a positive one is required")]
    InvalidParameter { axis: AxisId },
    /// A pin or bus the binding refers to does not exist on the board
    #[error("resource {resource} requested by axis {axis:?} is unavailable")]
    ResourceUnavailable { axis: AxisId, resource: u8 },
}

/// Failure on a bus during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The transport was used before its handshake completed
    #[error("transport used before its handshake completed")]
    NotReady,
    /// The handshake itself failed
    #[error("transport handshake failed")]
    Handshake,
    /// A bus id does not name a registered bus
    #[error("bus {0} is not registered")]
    UnknownBus(u8),
    /// The bus reported an error while writing
    #[error("register write failed")]
    Write,
    /// The bus reported an error while reading
    #[error("register read failed")]
    Read,
    /// A full-duplex exchange failed; it carried both directions
    #[error("bus transfer failed")]
    Transfer,
    /// The chip did not answer (floating data line)
    #[error("no response from driver")]
    NoResponse,
    /// A reply arrived but failed its integrity check
    #[error("corrupt reply from driver")]
    CorruptReply,
    /// A peer on the same shared bus failed its primary bring-up
    #[error("a driver sharing this bus failed to come up")]
    PeerFault,
}

/// Feature combinations a chip family cannot honour together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Combination {
    /// Quiet (stealth) chopper together with a stall-sensitivity threshold
    StealthWithStallThreshold,
}

/// Any failure reported by the bring-up subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUpError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("unsupported combination {combination:?} on axis {axis:?}")]
    UnsupportedCombination {
        axis: AxisId,
        combination: Combination,
    },
}
