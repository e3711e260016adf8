//! State machine definition
//!
//! Linear, no retries: `Idle → TransportInit → PrimaryBringUp →
//! SecondaryBringUp → Ready`, with `Faulted` reachable from every
//! non-terminal state.

use super::events::Event;

/// Bring-up states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing has been touched yet
    #[default]
    Idle,
    /// Shared and per-slot transports are running their handshakes
    TransportInit,
    /// Per-slot primary bring-up
    PrimaryBringUp,
    /// Per-slot secondary bring-up (bus-wide settings)
    SecondaryBringUp,
    /// All drivers configured; motion may be commanded
    Ready,
    /// A failure halted bring-up
    Faulted,
}

/// Bring-up phase a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Transport handshake
    Transport,
    /// Primary bring-up
    Primary,
    /// Secondary bring-up
    Secondary,
}

impl State {
    /// Check if the rest of the firmware may command motion
    pub fn motion_allowed(&self) -> bool {
        matches!(self, State::Ready)
    }

    /// Check if bring-up has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Ready | State::Faulted)
    }

    /// Phase the state belongs to, if it is a working state
    pub fn phase(&self) -> Option<Phase> {
        match self {
            State::TransportInit => Some(Phase::Transport),
            State::PrimaryBringUp => Some(Phase::Primary),
            State::SecondaryBringUp => Some(Phase::Secondary),
            _ => None,
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use State::*;

        match (self, event) {
            (Idle, Start) => TransportInit,
            (TransportInit, TransportsReady) => PrimaryBringUp,
            (PrimaryBringUp, PrimariesComplete) => SecondaryBringUp,
            (SecondaryBringUp, SecondariesComplete) => Ready,

            // Failures halt any working state
            (Idle | TransportInit | PrimaryBringUp | SecondaryBringUp, Fault) => Faulted,

            // Default: stay in current state
            _ => self,
        }
    }
}
