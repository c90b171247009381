//! Measurement constants and run configuration shared by firmware and host.
//!
//! Everything here is fixed at build time or handed to the sampler before a
//! run starts; nothing is negotiated over the wire.

use core::fmt;

use crate::timebase::nominal_time_ms;

/// ADC resolution in bits.
pub const ADC_RESOLUTION_BITS: u32 = 12;
/// Largest code the ADC can report.
pub const ADC_MAX: u16 = (1 << ADC_RESOLUTION_BITS) - 1;
/// Number of distinct ADC codes (`ADC_MAX + 1`).
pub const ADC_LEVELS: u32 = 1 << ADC_RESOLUTION_BITS;
/// ADC reference voltage in volts.
pub const V_REF: f32 = 3.3;

/// Sampling frequency used by the bench program.
pub const DEFAULT_FREQUENCY_HZ: u32 = 100;
/// Collection window used by the bench program.
pub const DEFAULT_COLLECTION_TIME_S: u32 = 1;

/// Control byte that soft-resets the device (host → device).
pub const SOFT_RESET: u8 = 0x04;
/// Control byte that interrupts an in-flight run (host → device).
pub const INTERRUPT: u8 = 0x03;
/// Line emitted by the device after a run finishes or is aborted.
pub const END_OF_RUN_MARKER: &str = "program ended";

/// Converts a raw ADC code to volts using `code / (ADC_MAX + 1) * V_REF`.
///
/// No clamping is applied; the converter already bounds its output.
#[must_use]
pub fn code_to_volts(code: u16) -> f32 {
    f32::from(code) / (f32::from(ADC_MAX) + 1.0) * V_REF
}

/// Reasons a measurement configuration is rejected before hardware is touched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// `frequency × collection_time` is zero.
    ZeroSampleCount,
    /// `frequency × collection_time` does not fit the platform's `usize`.
    SampleCountOverflow,
    /// The queue handed to the sampler was sized for a different run.
    QueueMismatch { expected: usize, actual: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroSampleCount => f.write_str("sample count is zero"),
            ConfigError::SampleCountOverflow => f.write_str("sample count overflows"),
            ConfigError::QueueMismatch { expected, actual } => {
                write!(f, "queue capacity {actual} does not match {expected} samples")
            }
        }
    }
}

/// Sampling frequency and collection window for a single run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MeasurementConfig {
    pub frequency_hz: u32,
    pub collection_time_s: u32,
}

impl MeasurementConfig {
    pub const fn new(frequency_hz: u32, collection_time_s: u32) -> Self {
        Self {
            frequency_hz,
            collection_time_s,
        }
    }

    /// Number of samples a run collects (`frequency × collection_time`).
    pub fn sample_count(&self) -> Result<usize, ConfigError> {
        let count = self
            .frequency_hz
            .checked_mul(self.collection_time_s)
            .ok_or(ConfigError::SampleCountOverflow)?;
        if count == 0 {
            return Err(ConfigError::ZeroSampleCount);
        }
        usize::try_from(count).map_err(|_| ConfigError::SampleCountOverflow)
    }

    /// Nominal timestamp of the final sample; the host stops reading here.
    pub fn last_sample_time_ms(&self) -> Result<u32, ConfigError> {
        let count = self.sample_count()?;
        let last = u32::try_from(count - 1).map_err(|_| ConfigError::SampleCountOverflow)?;
        Ok(nominal_time_ms(last, self.frequency_hz))
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY_HZ, DEFAULT_COLLECTION_TIME_S)
    }
}
