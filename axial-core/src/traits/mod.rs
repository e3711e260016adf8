//! Hardware abstraction traits
//!
//! These traits define the interface between the bring-up orchestrator and
//! the chip-specific adapters, plus the diagnostic sink adapters report to.

pub mod diagnostic;
pub mod driver;

pub use diagnostic::{DiagnosticSink, DiagnosticValue, NullSink};
pub use driver::{AxisContext, DriverAdapter, TransportSet};
