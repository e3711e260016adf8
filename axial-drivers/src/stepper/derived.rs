//! Derived register values
//!
//! Pure integer conversions from physical quantities (mm/s, mA, mΩ) into
//! the fields the chips expect. Integer arithmetic only, truncating where
//! the datasheet formulas round down.

/// TMC2130 step-interval constant (internal clock scaled for TSTEP)
pub const TSTEP_CLOCK: u64 = 12_650_000;

/// Largest value of a 20-bit velocity threshold register
pub const THRESHOLD_MAX: u32 = (1 << 20) - 1;

/// Full-scale sense voltage in mV, low and high sensitivity (TMC2130/TMC2208)
const VFS_MV: u64 = 325;
const VFS_SENSITIVE_MV: u64 = 180;

/// Sense-resistor path resistance added to the resistor value, in mΩ
const SENSE_PATH_MOHM: u64 = 20;

/// Current scale below which the high-sensitivity range is used
const CS_SENSITIVE_BELOW: u32 = 16;

/// Step-interval register for a velocity threshold
///
/// `12_650_000 * microsteps / (256 * mm_per_s * steps_per_mm)`. Faster
/// thresholds give smaller values. Clamped to [`THRESHOLD_MAX`].
///
/// Returns `None` when the threshold or steps per mm is zero.
pub fn threshold_register(microsteps: u16, mm_per_s: u32, steps_per_mm: u32) -> Option<u32> {
    let divisor = 256 * mm_per_s as u64 * steps_per_mm as u64;
    if divisor == 0 {
        return None;
    }
    let value = TSTEP_CLOCK * microsteps as u64 / divisor;
    Some(value.min(THRESHOLD_MAX as u64) as u32)
}

/// StallGuard threshold (SGT) field
///
/// Clamps to the chip's -64..=63 range and encodes it as 7-bit two's
/// complement, ready to be placed at bit 16 of COOLCONF.
pub fn stall_register(sensitivity: i8) -> u32 {
    let clamped = sensitivity.clamp(-64, 63);
    (clamped as u8 as u32) & 0x7F
}

/// MRES code for a microstep count (256 → 0, ..., 1 → 8)
pub fn microstep_resolution(microsteps: u16) -> Option<u8> {
    if !microsteps.is_power_of_two() || microsteps > 256 {
        return None;
    }
    Some(8 - microsteps.trailing_zeros() as u8)
}

/// Run/hold current scale of a Trinamic chopper driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentScale {
    /// IRUN (0-31)
    pub irun: u8,
    /// IHOLD (0-31)
    pub ihold: u8,
    /// Use the high-sensitivity (low voltage) sense range
    pub vsense: bool,
}

/// Current scale for an RMS current (TMC2130 / TMC2208)
///
/// `CS = 32 * √2 * I * (R + 0.02) / Vfs - 1`. When the result is below 16
/// the high-sensitivity range is selected and CS recomputed, which keeps
/// resolution at low currents.
pub fn current_scale(current_ma: u16, r_sense_mohm: u16, hold_pct: u8) -> CurrentScale {
    let scale = |vfs_mv: u64| -> u32 {
        // 32 * 1.41421 * mA / 1000 * (mΩ + 20) / 1000 / (mV / 1000)
        let num = 32 * 141_421 * current_ma as u64 * (r_sense_mohm as u64 + SENSE_PATH_MOHM);
        let den = 100_000_000 * vfs_mv;
        ((num / den) as u32).saturating_sub(1)
    };

    let mut cs = scale(VFS_MV);
    let vsense = cs < CS_SENSITIVE_BELOW;
    if vsense {
        cs = scale(VFS_SENSITIVE_MV);
    }
    let irun = cs.min(31) as u8;

    CurrentScale {
        irun,
        ihold: hold_current(irun, hold_pct),
        vsense,
    }
}

/// Hold current scale as a percentage of the run current scale
pub fn hold_current(irun: u8, hold_pct: u8) -> u8 {
    (irun as u32 * hold_pct.min(100) as u32 / 100) as u8
}

/// TMC26X current scale and sense range for a peak current
///
/// `CS = 32 * R * I / Vsense - 0.5` with 310 mV, falling back to the 165 mV
/// range when CS would be below 16. Returns `(cs, vsense)`.
pub fn tmc26x_current_scale(current_ma: u16, r_sense_mohm: u16) -> (u8, bool) {
    // 2 * 32 * R[mΩ] * I[mA], so that subtracting 0.5 stays integral
    let doubled = 64 * r_sense_mohm as u64 * current_ma as u64;
    let scale = |vsense_mv: u64| -> u32 {
        let full = 2 * vsense_mv * 1000;
        (doubled.saturating_sub(vsense_mv * 1000) / full) as u32
    };

    let cs = scale(310);
    if cs < CS_SENSITIVE_BELOW {
        (scale(165).min(31) as u8, true)
    } else {
        (cs.min(31) as u8, false)
    }
}

/// L6470 STEP_MODE step-select field (1 → 0, ..., 128 → 7)
pub fn l6470_step_mode(microsteps: u16) -> Option<u8> {
    if !microsteps.is_power_of_two() || microsteps > 128 {
        return None;
    }
    Some(microsteps.trailing_zeros() as u8)
}

/// L6470 OCD_TH for an overcurrent threshold (375 mA steps, 4 bits)
pub fn l6470_overcurrent_register(current_ma: u16) -> u8 {
    (current_ma / 375).min(0x0F) as u8
}

/// L6470 STALL_TH for a stall current (31.25 mA steps, 7 bits)
pub fn l6470_stall_register(current_ma: u16) -> u8 {
    (current_ma as u32 * 4 / 125).min(0x7F) as u8
}
