//! Diagnostic sink
//!
//! Some adapters read registers back purely so a human can check the
//! wiring. Those values go to a sink as key/value pairs and never influence
//! bring-up.

use crate::config::AxisId;

/// A diagnostic value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagnosticValue {
    /// Whether an operation (usually a register read) succeeded
    Flag(bool),
    /// Raw register contents
    Register(u32),
}

/// Receiver for diagnostic key/value pairs
pub trait DiagnosticSink {
    /// Report one value for an axis
    fn report(&mut self, axis: AxisId, key: &str, value: DiagnosticValue);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _axis: AxisId, _key: &str, _value: DiagnosticValue) {}
}
