//! Events that trigger state transitions

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Bring-up requested
    Start,
    /// Every transport used by a bound slot finished its handshake
    TransportsReady,
    /// Every bound slot finished its primary bring-up
    PrimariesComplete,
    /// Every slot needing a secondary pass finished it
    SecondariesComplete,
    /// A phase failed and the failure policy says halt
    Fault,
}
