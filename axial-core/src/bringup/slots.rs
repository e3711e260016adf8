//! Axis slot table
//!
//! One slot per [`AxisId`], each owning at most one driver. Slots are filled
//! once at start-up and never rebound.

use crate::config::{AxisId, AXIS_COUNT};

/// An axis slot and the driver attached to it
#[derive(Debug)]
pub struct AxisSlot<A> {
    /// Slot identity
    pub axis: AxisId,
    /// Attached driver, if any
    pub driver: Option<A>,
}

/// Fixed table of every axis slot
#[derive(Debug)]
pub struct SlotTable<A> {
    slots: [AxisSlot<A>; AXIS_COUNT],
}

impl<A> Default for SlotTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> SlotTable<A> {
    /// Create a table with every slot empty
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| AxisSlot {
                axis: AxisId::ALL[i],
                driver: None,
            }),
        }
    }

    /// Attach a driver to an empty slot
    ///
    /// Hands the driver back if the slot is already occupied.
    pub fn attach(&mut self, axis: AxisId, driver: A) -> Result<(), A> {
        let slot = &mut self.slots[axis.index()];
        if slot.driver.is_some() {
            return Err(driver);
        }
        slot.driver = Some(driver);
        Ok(())
    }

    /// Driver attached to a slot
    pub fn get(&self, axis: AxisId) -> Option<&A> {
        self.slots[axis.index()].driver.as_ref()
    }

    /// Mutable access to the driver attached to a slot
    pub fn get_mut(&mut self, axis: AxisId) -> Option<&mut A> {
        self.slots[axis.index()].driver.as_mut()
    }

    /// Bound slot ids in bring-up order
    pub fn bound(&self) -> impl Iterator<Item = AxisId> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.driver.is_some())
            .map(|slot| slot.axis)
    }

    /// Bound slots in bring-up order
    pub fn iter(&self) -> impl Iterator<Item = (AxisId, &A)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.driver.as_ref().map(|d| (slot.axis, d)))
    }

    /// Number of bound slots
    pub fn len(&self) -> usize {
        self.bound().count()
    }

    /// Whether every slot is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
