//! Blood-oxygen saturation estimation from a [`SampleWindow`].
//!
//! The estimate uses the empirical ratio-of-ratios formula `110 - 25 * R`, where
//! `R = (AC_red / DC_red) / (AC_ir / DC_ir)`. DC is the channel mean over the window and
//! AC is its peak-to-trough amplitude.

use core::fmt;

use crate::window::{SampleWindow, WINDOW_LEN};

/// Channel means below this level mean nothing is covering the sensor.
pub const NO_FINGER_THRESHOLD: u32 = 300;

/// Saturation level below which [`Policy::FIRMWARE`] discards an estimate.
pub const LOW_CONFIDENCE_FLOOR: f32 = 85.0;

const SCALE: u64 = 10_000;

/// Result of one estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Spo2 {
    /// Estimated saturation in percent, within `0.0..=100.0`.
    Saturation(f32),
    /// The signal is too weak for a finger to be on the sensor.
    NoFinger,
    /// The window has no usable amplitude on one of the channels.
    Invalid,
}
impl Spo2 {
    /// Gets the saturation percentage, if this is one.
    pub fn percent(&self) -> Option<f32> {
        match self {
            Spo2::Saturation(x) => Some(*x),
            _ => None,
        }
    }
}
impl fmt::Display for Spo2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spo2::Saturation(x) => {
                // nudge exact hundredths past f32 rounding before truncating
                let hundredths = (x * 100.0 + 0.005) as u32;
                write!(f, "SpO2 = {}.{:02}", hundredths / 100, hundredths % 100)
            }
            Spo2::NoFinger => f.write_str("No finger detected"),
            Spo2::Invalid => f.write_str("Invalid SpO2 Data"),
        }
    }
}

/// Post-processing applied to a computed saturation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Policy {
    /// Report [`Spo2::NoFinger`] for saturations below [`LOW_CONFIDENCE_FLOOR`].
    pub low_confidence_floor: bool,
}
impl Policy {
    /// The standalone firmware behavior, which discards readings under 85%.
    pub const FIRMWARE: Policy = Policy { low_confidence_floor: true };
}

struct Stats {
    sum_ir: u32,
    sum_red: u32,
    ac_ir: u32,
    ac_red: u32,
}

/// Sums and peak-to-trough amplitudes, or the early verdict if the window is unusable.
fn stats(window: &SampleWindow) -> Result<Stats, Spo2> {
    let (mut ir_min, mut ir_max) = (u16::MAX, 0u16);
    let (mut red_min, mut red_max) = (u16::MAX, 0u16);
    let (mut sum_ir, mut sum_red) = (0u32, 0u32);
    for s in window.iter() {
        sum_ir += s.infrared as u32;
        sum_red += s.red as u32;
        ir_min = ir_min.min(s.infrared);
        ir_max = ir_max.max(s.infrared);
        red_min = red_min.min(s.red);
        red_max = red_max.max(s.red);
    }

    let n = WINDOW_LEN as u32;
    if sum_ir / n < NO_FINGER_THRESHOLD || sum_red / n < NO_FINGER_THRESHOLD {
        log::debug!("no finger detected (dc ir {}, dc red {})", sum_ir / n, sum_red / n);
        return Err(Spo2::NoFinger);
    }

    let ac_ir = (ir_max - ir_min) as u32;
    let ac_red = (red_max - red_min) as u32;
    if ac_ir == 0 || ac_red == 0 || sum_ir == 0 || sum_red == 0 {
        log::debug!("flat window (ac ir {}, ac red {})", ac_ir, ac_red);
        return Err(Spo2::Invalid);
    }

    Ok(Stats { sum_ir, sum_red, ac_ir, ac_red })
}

pub(crate) fn clamp_percent(x: f32) -> f32 {
    if x > 100.0 { 100.0 } else if x < 0.0 { 0.0 } else { x }
}

fn apply(policy: Policy, percent: f32) -> Spo2 {
    if policy.low_confidence_floor && percent < LOW_CONFIDENCE_FLOOR {
        log::debug!("discarding low confidence reading");
        return Spo2::NoFinger;
    }
    Spo2::Saturation(percent)
}

/// Estimates SpO2 using floating point arithmetic.
pub fn estimate(window: &SampleWindow, policy: Policy) -> Spo2 {
    let s = match stats(window) {
        Ok(s) => s,
        Err(verdict) => return verdict,
    };

    let dc_ir = s.sum_ir as f32 / WINDOW_LEN as f32;
    let dc_red = s.sum_red as f32 / WINDOW_LEN as f32;
    let r = (s.ac_red as f32 / dc_red) / (s.ac_ir as f32 / dc_ir);

    apply(policy, clamp_percent(110.0 - 25.0 * r))
}

/// Estimates SpO2 using 64-bit integer arithmetic only, for targets without an FPU.
///
/// The ratio is kept scaled by 10 000 and the saturation is resolved to hundredths of a
/// percent, so results stay within a few hundredths of [`estimate`].
/// This is not bit-identical to an integer-percent evaluation over truncated channel means:
/// such a tool can land up to one point away on the same window.
pub fn estimate_fixed(window: &SampleWindow, policy: Policy) -> Spo2 {
    let s = match stats(window) {
        Ok(s) => s,
        Err(verdict) => return verdict,
    };

    // the window length cancels out of the ratio, so sums stand in for means
    let num = s.ac_red as u64 * s.sum_ir as u64 * SCALE;
    let den = s.ac_ir as u64 * s.sum_red as u64;
    let r_scaled = num / den;

    let hundredths = (110 * SCALE as i64 - 25 * r_scaled as i64) / 100;
    let hundredths = hundredths.clamp(0, 10_000);

    apply(policy, hundredths as f32 / 100.0)
}
