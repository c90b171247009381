//! Theoretical RC charging curve and the measured-versus-model comparison.

use serde::{Deserialize, Serialize};
use stepscope_core::protocol::Record;

use crate::acquire::{Acquisition, RunEnd};

/// Series RC circuit driven by a step from 0 V to `v_max`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RcModel {
    pub resistance_ohms: f64,
    pub capacitance_farads: f64,
    pub v_max: f64,
}

impl Default for RcModel {
    fn default() -> Self {
        Self {
            resistance_ohms: 100_000.0,
            capacitance_farads: 3.3e-6,
            v_max: 3.3,
        }
    }
}

impl RcModel {
    /// `R × C` expressed in milliseconds.
    #[must_use]
    pub fn time_constant_ms(&self) -> f64 {
        1_000.0 * self.resistance_ohms * self.capacitance_farads
    }

    /// `V_max × (1 − exp(−t / (1000·R·C)))` for `t` in milliseconds.
    #[must_use]
    pub fn voltage_at(&self, time_ms: f64) -> f64 {
        self.v_max * (1.0 - (-time_ms / self.time_constant_ms()).exp())
    }
}

/// One measured sample with the model value at the same timestamp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayPoint {
    pub time_ms: u32,
    pub measured_v: f64,
    pub model_v: f64,
}

/// Pairs every record with the model voltage at its timestamp.
#[must_use]
pub fn overlay(model: &RcModel, records: &[Record]) -> Vec<OverlayPoint> {
    records
        .iter()
        .map(|record| OverlayPoint {
            time_ms: record.time_ms,
            measured_v: record.voltage,
            model_v: model.voltage_at(f64::from(record.time_ms)),
        })
        .collect()
}

/// Collected series of one run plus the model used to overlay it.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionRun {
    pub model: RcModel,
    pub points: Vec<OverlayPoint>,
    pub end: RunEnd,
    pub discarded: usize,
}

impl AcquisitionRun {
    #[must_use]
    pub fn new(model: RcModel, acquisition: &Acquisition) -> Self {
        Self {
            model,
            points: overlay(&model, &acquisition.records),
            end: acquisition.end,
            discarded: acquisition.discarded,
        }
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_points(&self.points)
    }
}

/// Headline numbers reported after each run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    pub final_voltage: Option<f64>,
    pub rms_deviation: Option<f64>,
}

impl RunSummary {
    #[must_use]
    pub fn from_points(points: &[OverlayPoint]) -> Self {
        let rms_deviation = if points.is_empty() {
            None
        } else {
            let sum: f64 = points
                .iter()
                .map(|point| (point.measured_v - point.model_v).powi(2))
                .sum();
            #[allow(clippy::cast_precision_loss)]
            let count = points.len() as f64;
            Some((sum / count).sqrt())
        };

        Self {
            samples: points.len(),
            final_voltage: points.last().map(|point| point.measured_v),
            rms_deviation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_time_constant_is_330_ms() {
        let model = RcModel::default();
        assert!((model.time_constant_ms() - 330.0).abs() < 1e-9);
    }

    #[test]
    fn summary_of_exact_fit_has_zero_deviation() {
        let model = RcModel::default();
        let records: Vec<Record> = (0..5)
            .map(|i| Record {
                time_ms: i * 10,
                voltage: model.voltage_at(f64::from(i * 10)),
            })
            .collect();
        let points = overlay(&model, &records);
        let summary = RunSummary::from_points(&points);

        assert_eq!(summary.samples, 5);
        assert_eq!(summary.final_voltage, Some(model.voltage_at(40.0)));
        assert!(summary.rms_deviation.is_some_and(|rms| rms < 1e-12));
    }

    #[test]
    fn empty_run_has_no_summary_values() {
        let summary = RunSummary::from_points(&[]);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.final_voltage, None);
        assert_eq!(summary.rms_deviation, None);
    }
}
