//! Driver bring-up contract
//!
//! Every chip family implements [`DriverAdapter`], so the orchestrator can
//! bring up any mix of chips without knowing which one sits on which axis.
//!
//! Adapters are generic over the bus collection `B` they are handed. The
//! orchestrator lends `&mut B` to one adapter at a time, which is what
//! keeps two adapters from ever driving a shared bus at once.

use crate::config::{AxisId, ChipFamily, DriverPolicy, SharedBus};
use crate::error::{BringUpError, TransportError};

use super::diagnostic::DiagnosticSink;

/// Per-axis inputs to a bring-up call
#[derive(Debug, Clone, Copy)]
pub struct AxisContext<'a> {
    /// Slot being brought up
    pub axis: AxisId,
    /// Steps per mm of the kinematic dimension the slot drives
    pub steps_per_unit: u32,
    /// Machine-wide driver policy
    pub policy: &'a DriverPolicy,
}

/// Collection of shared buses (SPI buses, hardware UARTs)
pub trait TransportSet {
    /// Run the handshake for a shared bus
    ///
    /// Called once per bus, before any adapter that uses it.
    fn begin(&mut self, bus: SharedBus) -> Result<(), TransportError>;

    /// Whether the bus handshake has completed
    fn is_ready(&self, bus: SharedBus) -> bool;
}

/// Two-phase bring-up contract shared by all chip families
pub trait DriverAdapter<B: ?Sized> {
    /// Chip family behind this adapter
    fn family(&self) -> ChipFamily;

    /// Shared bus the chip sits on, if any
    fn shared_bus(&self) -> Option<SharedBus>;

    /// Handshake for a transport this adapter owns exclusively
    ///
    /// Runs during the transport phase, after shared buses have begun.
    fn begin_transport(&mut self, buses: &mut B) -> Result<(), TransportError> {
        let _ = buses;
        Ok(())
    }

    /// Bring the chip to a state matching the axis configuration
    fn primary_bring_up(
        &mut self,
        buses: &mut B,
        ctx: &AxisContext<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), BringUpError>;

    /// Whether this adapter has settings for the secondary pass
    fn needs_secondary(&self) -> bool {
        false
    }

    /// Settings that may only be applied once every primary bring-up is done
    fn secondary_bring_up(
        &mut self,
        buses: &mut B,
        ctx: &AxisContext<'_>,
    ) -> Result<(), BringUpError> {
        let _ = (buses, ctx);
        Ok(())
    }
}
