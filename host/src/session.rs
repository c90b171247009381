use std::io;
use std::path::PathBuf;

use log::{info, warn};
use stepscope_core::protocol::StopRule;

use crate::acquire::{CancelSource, LineAcquirer, RunEnd};
use crate::config::{AcquisitionConfig, HostConfig};
use crate::link::{DeviceSource, LinkError, soft_reset};
use crate::overlay::{AcquisitionRun, RcModel, RunSummary};
use crate::transcript::save_run;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "run",
        "run            - restart the device and acquire one step response",
    ),
    ("clear", "clear          - discard the current run"),
    (
        "status",
        "status         - show device, model, and current run",
    ),
    ("help", "help [topic]   - show help for a command"),
    ("quit", "quit | exit    - leave the session"),
];

/// Interactive bench session: one device, at most one displayed run.
pub struct Session {
    source: DeviceSource,
    acquisition: AcquisitionConfig,
    model: RcModel,
    transcript: Option<PathBuf>,
    current: Option<AcquisitionRun>,
    run_count: usize,
}

impl Session {
    #[must_use]
    pub fn new(config: &HostConfig, source: DeviceSource, transcript: Option<PathBuf>) -> Self {
        Self {
            source,
            acquisition: config.acquisition.clone(),
            model: config.model,
            transcript,
            current: None,
            run_count: 0,
        }
    }

    /// The run currently on display, if any.
    #[must_use]
    pub fn current_run(&self) -> Option<&AcquisitionRun> {
        self.current.as_ref()
    }

    pub fn handle_command(
        &mut self,
        line: &str,
        cancel: &mut dyn CancelSource,
    ) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if trimmed.eq_ignore_ascii_case("help") {
            return Ok(help_lines(None));
        }
        if let Some(rest) = trimmed.strip_prefix("help ") {
            return Ok(help_lines(Some(rest.trim())));
        }

        let lines = match trimmed.to_ascii_lowercase().as_str() {
            "run" => self.handle_run(cancel),
            "clear" => self.handle_clear(),
            "status" => self.handle_status(),
            other => vec![format!(
                "ERR unknown command `{other}` (try `help`)"
            )],
        };
        Ok(lines)
    }

    fn handle_run(&mut self, cancel: &mut dyn CancelSource) -> Vec<String> {
        // A new run always replaces what is on display.
        self.current = None;

        let stop = match StopRule::for_config(&self.acquisition.measurement()) {
            Ok(stop) => stop,
            Err(err) => return vec![format!("ERR config {err}")],
        };

        let mut device = match self.source.connect() {
            Ok(device) => device,
            Err(err) => {
                warn!("session: {err}");
                return vec![format!("ERR link {err}")];
            }
        };
        if let Err(err) = soft_reset(&mut device) {
            return vec![format!("ERR link {}", LinkError::Reset(err))];
        }

        let mut acquirer = LineAcquirer::new(device, stop, self.acquisition.idle_limit());
        let acquisition = match acquirer.acquire(cancel) {
            Ok(acquisition) => acquisition,
            Err(err) => {
                warn!("session: {err}");
                return vec![format!("ERR acquire {err}")];
            }
        };

        self.run_count += 1;
        let run = AcquisitionRun::new(self.model, &acquisition);
        let summary = run.summary();
        info!("session: run {} {summary:?}", self.run_count);

        let mut lines = vec![describe_run(self.run_count, &run, &summary)];
        match run.end {
            RunEnd::Sentinel => {}
            RunEnd::Marker => lines.push(format!(
                "device ended the run before {} ms",
                stop.sentinel_ms()
            )),
            RunEnd::Cancelled => lines.push("acquisition cancelled; partial run kept".to_string()),
        }
        if run.discarded > 0 {
            lines.push(format!("{} noise lines skipped", run.discarded));
        }

        if run.end != RunEnd::Cancelled
            && let Some(path) = &self.transcript
        {
            match save_run(path, &run) {
                Ok(()) => lines.push(format!("transcript written to {}", path.display())),
                Err(err) => lines.push(format!("ERR transcript {}: {err}", path.display())),
            }
        }

        self.current = Some(run);
        lines
    }

    fn handle_clear(&mut self) -> Vec<String> {
        match self.current.take() {
            Some(run) => vec![format!("OK cleared {} samples", run.points.len())],
            None => vec!["OK nothing to clear".to_string()],
        }
    }

    fn handle_status(&self) -> Vec<String> {
        let measurement = self.acquisition.measurement();
        let mut lines = vec![
            format!("device: {}", self.source.describe()),
            format!(
                "measurement: {} Hz for {} s, idle limit {} ms",
                measurement.frequency_hz, measurement.collection_time_s, self.acquisition.idle_limit_ms
            ),
            format!(
                "model: R={} ohm C={} F V_max={} V (tau={} ms)",
                self.model.resistance_ohms,
                self.model.capacitance_farads,
                self.model.v_max,
                self.model.time_constant_ms()
            ),
        ];
        match &self.current {
            Some(run) => lines.push(describe_run(self.run_count, run, &run.summary())),
            None => lines.push("no run on display".to_string()),
        }
        lines
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) if !target.is_empty() => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        _ => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Press Esc during `run` to cancel the acquisition.".to_string());
        }
    }
    lines
}

fn describe_run(index: usize, run: &AcquisitionRun, summary: &RunSummary) -> String {
    let final_voltage = summary
        .final_voltage
        .map_or_else(|| "-".to_string(), |volts| format!("{volts:.4} V"));
    let rms = summary
        .rms_deviation
        .map_or_else(|| "-".to_string(), |volts| format!("{volts:.4} V"));
    let span = run.points.last().map_or(0, |point| point.time_ms);
    format!(
        "OK run {index}: {} samples over {span} ms, final {final_voltage}, rms deviation {rms}",
        summary.samples
    )
}

fn help_topic_list() -> String {
    let mut buffer = String::new();
    for (index, (name, _)) in HELP_TOPICS.iter().enumerate() {
        if index > 0 {
            buffer.push_str(", ");
        }
        buffer.push_str(name);
    }
    buffer
}
