//! Bring-up orchestrator
//!
//! Walks the slot table once, strictly in slot order, one adapter at a
//! time:
//!
//! 1. every shared bus used by a bound slot is begun, then each slot's own
//!    transport
//! 2. primary bring-up of every bound slot
//! 3. secondary bring-up of the slots that ask for it
//!
//! No phase starts before the previous one has finished for every slot.

use heapless::Vec;

use crate::config::{AxisId, DriverPolicy, FailurePolicy, KinematicParams, SharedBus, AXIS_COUNT};
use crate::error::{BringUpError, TransportError};
use crate::state::{Event, Phase, State};
use crate::traits::{AxisContext, DiagnosticSink, DriverAdapter, TransportSet};

/// A slot that failed to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisFailure {
    pub axis: AxisId,
    pub phase: Phase,
    pub error: BringUpError,
}

/// Outcome of a bring-up run
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BringUpReport {
    /// Final state, `Ready` or `Faulted`
    pub state: State,
    /// Failed slots in the order they failed
    ///
    /// Non-empty with a `Ready` state only under [`FailurePolicy::Continue`].
    pub failures: Vec<AxisFailure, AXIS_COUNT>,
}

impl BringUpReport {
    /// Whether motion may be commanded
    pub fn is_ready(&self) -> bool {
        self.state.motion_allowed()
    }

    /// Failure recorded for an axis
    pub fn failure(&self, axis: AxisId) -> Option<&AxisFailure> {
        self.failures.iter().find(|f| f.axis == axis)
    }
}

/// Bring-up was stopped by the failure policy
struct Halted;

/// Drives a [`SlotTable`](super::SlotTable) through bring-up
pub struct Orchestrator<'a> {
    kinematics: &'a KinematicParams,
    policy: &'a DriverPolicy,
    state: State,
    failures: Vec<AxisFailure, AXIS_COUNT>,
    failed: [bool; AXIS_COUNT],
    bus_errors: Vec<(SharedBus, TransportError), AXIS_COUNT>,
    faulted_buses: Vec<SharedBus, AXIS_COUNT>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(kinematics: &'a KinematicParams, policy: &'a DriverPolicy) -> Self {
        Self {
            kinematics,
            policy,
            state: State::Idle,
            failures: Vec::new(),
            failed: [false; AXIS_COUNT],
            bus_errors: Vec::new(),
            faulted_buses: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Bring up every bound slot
    pub fn run<A, B>(
        mut self,
        slots: &mut super::SlotTable<A>,
        buses: &mut B,
        sink: &mut dyn DiagnosticSink,
    ) -> BringUpReport
    where
        A: DriverAdapter<B>,
        B: TransportSet + ?Sized,
    {
        info!("bring-up: {} slot(s) bound", slots.len());
        self.advance(Event::Start);

        if self.run_phases(slots, buses, sink).is_ok() {
            if self.failures.is_empty() {
                info!("bring-up: all drivers ready");
            } else {
                warn!(
                    "bring-up: ready with {} unconfigured axis(es)",
                    self.failures.len()
                );
            }
        } else {
            error!("bring-up: halted, motion disabled");
        }

        BringUpReport {
            state: self.state,
            failures: self.failures,
        }
    }

    fn run_phases<A, B>(
        &mut self,
        slots: &mut super::SlotTable<A>,
        buses: &mut B,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), Halted>
    where
        A: DriverAdapter<B>,
        B: TransportSet + ?Sized,
    {
        self.transport_phase(slots, buses)?;
        self.advance(Event::TransportsReady);

        self.primary_phase(slots, buses, sink)?;
        self.advance(Event::PrimariesComplete);

        self.secondary_phase(slots, buses)?;
        self.advance(Event::SecondariesComplete);
        Ok(())
    }

    fn transport_phase<A, B>(
        &mut self,
        slots: &mut super::SlotTable<A>,
        buses: &mut B,
    ) -> Result<(), Halted>
    where
        A: DriverAdapter<B>,
        B: TransportSet + ?Sized,
    {
        for axis in AxisId::ALL {
            let Some(driver) = slots.get_mut(axis) else {
                continue;
            };

            if let Some(bus) = driver.shared_bus() {
                if let Err(e) = self.begin_shared(buses, bus) {
                    self.mark_bus(bus);
                    self.record(axis, Phase::Transport, e.into())?;
                    continue;
                }
            }

            if let Err(e) = driver.begin_transport(buses) {
                self.record(axis, Phase::Transport, e.into())?;
            }
        }
        Ok(())
    }

    /// Begin a shared bus on first use; later users get the same outcome
    fn begin_shared<B>(&mut self, buses: &mut B, bus: SharedBus) -> Result<(), TransportError>
    where
        B: TransportSet + ?Sized,
    {
        if buses.is_ready(bus) {
            return Ok(());
        }
        if let Some((_, e)) = self.bus_errors.iter().find(|(b, _)| *b == bus) {
            return Err(*e);
        }

        debug!("bring-up: begin {}", bus);
        buses.begin(bus).inspect_err(|e| {
            // At most one entry per slot
            let _ = self.bus_errors.push((bus, *e));
        })
    }

    fn primary_phase<A, B>(
        &mut self,
        slots: &mut super::SlotTable<A>,
        buses: &mut B,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), Halted>
    where
        A: DriverAdapter<B>,
        B: TransportSet + ?Sized,
    {
        for axis in AxisId::ALL {
            if self.failed[axis.index()] {
                continue;
            }
            let Some(driver) = slots.get_mut(axis) else {
                continue;
            };

            let ctx = self.context(axis);
            debug!("bring-up: {} primary ({})", axis.name(), driver.family());
            if let Err(e) = driver.primary_bring_up(buses, &ctx, sink) {
                if let Some(bus) = driver.shared_bus() {
                    self.mark_bus(bus);
                }
                self.record(axis, Phase::Primary, e)?;
            }
        }
        Ok(())
    }

    fn secondary_phase<A, B>(
        &mut self,
        slots: &mut super::SlotTable<A>,
        buses: &mut B,
    ) -> Result<(), Halted>
    where
        A: DriverAdapter<B>,
        B: TransportSet + ?Sized,
    {
        for axis in AxisId::ALL {
            if self.failed[axis.index()] {
                continue;
            }
            let Some(driver) = slots.get_mut(axis) else {
                continue;
            };
            if !driver.needs_secondary() {
                continue;
            }

            // Bus-wide settings need every chip on the bus to have come up
            if let Some(bus) = driver.shared_bus() {
                if self.faulted_buses.contains(&bus) {
                    self.record(axis, Phase::Secondary, TransportError::PeerFault.into())?;
                    continue;
                }
            }

            let ctx = self.context(axis);
            debug!("bring-up: {} secondary", axis.name());
            if let Err(e) = driver.secondary_bring_up(buses, &ctx) {
                self.record(axis, Phase::Secondary, e)?;
            }
        }
        Ok(())
    }

    fn context(&self, axis: AxisId) -> AxisContext<'a> {
        AxisContext {
            axis,
            steps_per_unit: self.kinematics.steps_per_unit(axis),
            policy: self.policy,
        }
    }

    fn mark_bus(&mut self, bus: SharedBus) {
        if !self.faulted_buses.contains(&bus) {
            let _ = self.faulted_buses.push(bus);
        }
    }

    fn record(&mut self, axis: AxisId, phase: Phase, error: BringUpError) -> Result<(), Halted> {
        error!("bring-up: {} failed during {}: {}", axis.name(), phase, error);

        self.failed[axis.index()] = true;
        // A slot fails at most once, so this never overflows
        let _ = self.failures.push(AxisFailure { axis, phase, error });

        match self.policy.on_failure {
            FailurePolicy::Halt => {
                self.advance(Event::Fault);
                Err(Halted)
            }
            FailurePolicy::Continue => Ok(()),
        }
    }

    fn advance(&mut self, event: Event) {
        let next = self.state.transition(event);
        trace!("bring-up: {} -> {}", self.state, next);
        self.state = next;
    }
}
