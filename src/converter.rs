use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;
use uom::si::{electric_potential::volt, f64::ElectricPotential};

use crate::error::AddaError;
use crate::sampler::RawSampleBatch;

/// Resolution of the DAC output stage
pub const OUTPUT_RESOLUTION_BITS: u32 = 16;
/// Number of distinct DAC steps across the reference voltage
const OUTPUT_CODE_SPAN: f64 = (1u32 << OUTPUT_RESOLUTION_BITS) as f64;
/// Raw ADC codes are microvolt counts, this scales them to volts
pub const MICROVOLTS_TO_VOLTS: f64 = 1.0 / 1_000_000.0;

/// Code written to one DAC output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct OutputCode(pub u16);

impl OutputCode {
    pub const ZERO: OutputCode = OutputCode(0);
    pub const MAX: OutputCode = OutputCode(u16::MAX);
}

impl fmt::Display for OutputCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Scale a raw ADC code to a voltage. Linear over the whole `i32` range, never clamps.
pub fn raw_to_voltage(code: i32, full_scale_reference: f64) -> ElectricPotential {
    ElectricPotential::new::<volt>(f64::from(code) * full_scale_reference)
}

/// Nearest DAC code for `target` given the DAC `reference`.
///
/// Targets outside `[0, reference)` saturate to the first or last code.
pub fn voltage_to_code(reference: ElectricPotential, target: ElectricPotential) -> OutputCode {
    let ideal = target.get::<volt>() / reference.get::<volt>() * OUTPUT_CODE_SPAN;

    if ideal.is_nan() || ideal < 0.0 {
        if ideal.is_nan() || ideal <= -0.5 {
            warn!(
                "Target {:?} below DAC range for reference {:?}, saturating to zero",
                target, reference
            );
        }
        return OutputCode::ZERO;
    }

    let rounded = ideal.round();
    if rounded > f64::from(u16::MAX) {
        if rounded > OUTPUT_CODE_SPAN {
            warn!(
                "Target {:?} above DAC range for reference {:?}, saturating to full scale",
                target, reference
            );
        }
        return OutputCode::MAX;
    }

    OutputCode(rounded as u16)
}

/// Voltage the DAC produces for `code`, the inverse of [`voltage_to_code`]
pub fn code_to_voltage(reference: ElectricPotential, code: OutputCode) -> ElectricPotential {
    reference * (f64::from(code.0) / OUTPUT_CODE_SPAN)
}

/// Voltages of one batch, index aligned with the raw batch it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageBatch {
    acquired_at: DateTime<Utc>,
    voltages: Vec<ElectricPotential>,
}

impl VoltageBatch {
    /// Convert `raw` with a fixed reference scale, consuming it
    pub fn from_raw(raw: RawSampleBatch, full_scale_reference: f64) -> Result<Self, AddaError> {
        let mut voltages = Vec::new();
        voltages.try_reserve_exact(raw.len()).map_err(|err| {
            AddaError::Resource(format!("voltage batch of {} values: {err}", raw.len()))
        })?;
        voltages.extend(
            raw.codes()
                .iter()
                .map(|&code| raw_to_voltage(code, full_scale_reference)),
        );

        Ok(Self {
            acquired_at: Utc::now(),
            voltages,
        })
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn get(&self, index: usize) -> Option<ElectricPotential> {
        self.voltages.get(index).copied()
    }

    pub fn as_slice(&self) -> &[ElectricPotential] {
        &self.voltages
    }

    pub fn len(&self) -> usize {
        self.voltages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltages.is_empty()
    }
}

impl fmt::Display for VoltageBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, voltage) in self.voltages.iter().enumerate() {
            write!(f, "{i}:{:.6} ", voltage.get::<volt>())?;
        }
        write!(f, "V")
    }
}
