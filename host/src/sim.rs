//! In-process stand-in for the bench board.
//!
//! The simulator runs the same [`Sampler`] the firmware runs, against an
//! analog input that follows a chosen waveform, and serves the resulting byte
//! stream in small chunks with read timeouts in between, the way a serial port
//! delivers it.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::{self, ErrorKind, Read, Write};

use log::{debug, warn};
use stepscope_core::config::{
    ADC_LEVELS, ADC_MAX, END_OF_RUN_MARKER, INTERRUPT, MeasurementConfig, SOFT_RESET, V_REF,
};
use stepscope_core::queue::SampleQueue;
use stepscope_core::sampler::{
    AnalogInput, ArmError, RunOutcome, RunSignals, SampleTimer, Sampler, StepOutput,
    TickHandler,
};
use stepscope_core::stream::RecordSink;
use stepscope_core::timebase::nominal_time_ms;

use crate::overlay::RcModel;

/// Largest run the simulator can hold.
pub const SIM_STORAGE: usize = 4_096;

const BOOT_BANNER: &[u8] = b"stepscope simulator; soft reboot\r\n";

/// Signal presented to the simulated ADC.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Waveform {
    /// Capacitor voltage of the given circuit after the step.
    RcCharge(RcModel),
    /// Codes rising linearly from 0 to `ADC_MAX` across the run.
    Ramp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimSettings {
    pub measurement: MeasurementConfig,
    pub waveform: Waveform,
    /// Bytes handed out per read.
    pub chunk_len: usize,
}

impl SimSettings {
    #[must_use]
    pub fn new(measurement: MeasurementConfig, waveform: Waveform) -> Self {
        Self {
            measurement,
            waveform,
            chunk_len: 7,
        }
    }
}

/// Simulated device speaking the bench wire protocol.
#[derive(Debug)]
pub struct SimulatedDevice {
    settings: SimSettings,
    output: VecDeque<u8>,
}

impl SimulatedDevice {
    #[must_use]
    pub fn new(settings: SimSettings) -> Self {
        Self {
            settings,
            output: VecDeque::new(),
        }
    }

    /// Bytes not yet read by the host.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.output.len()
    }

    fn reboot(&mut self) {
        self.output.clear();
        self.output.extend(BOOT_BANNER);
        let stream = run_program(&self.settings);
        self.output.extend(stream);
    }

    fn interrupt(&mut self) {
        self.output.clear();
        self.output.extend(END_OF_RUN_MARKER.as_bytes());
        self.output.push_back(b'\n');
    }
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.output.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "simulated read timeout"));
        }
        let len = buf.len().min(self.settings.chunk_len.max(1)).min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            match byte {
                SOFT_RESET => self.reboot(),
                INTERRUPT => self.interrupt(),
                other => debug!("sim: ignoring byte {other:#04x}"),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs one measurement and returns everything the device would print.
fn run_program(settings: &SimSettings) -> Vec<u8> {
    let mut sink = BufferSink::default();
    let config = settings.measurement;

    let queue = match config
        .sample_count()
        .map_err(|err| err.to_string())
        .and_then(|count| SampleQueue::<SIM_STORAGE>::new(count).map_err(|err| err.to_string()))
    {
        Ok(queue) => queue,
        Err(err) => {
            warn!("sim: cannot run: {err}");
            sink.push_marker();
            return sink.bytes;
        }
    };

    let signals = RunSignals::new();
    let input = SimAdc {
        waveform: settings.waveform,
        config,
        index: 0,
    };
    let mut sampler = Sampler::new(
        config,
        SimPin::default(),
        input,
        SimTimer::default(),
        queue,
        &signals,
    );

    match sampler.run(&mut sink) {
        Ok(RunOutcome::Completed { samples }) => debug!("sim: streamed {samples} samples"),
        Ok(outcome) => debug!("sim: run ended early: {outcome:?}"),
        Err(err) => {
            warn!("sim: run failed: {err}");
            sink.push_marker();
        }
    }
    sink.bytes
}

#[derive(Debug, Default)]
struct BufferSink {
    bytes: Vec<u8>,
}

impl BufferSink {
    fn push_marker(&mut self) {
        self.bytes.extend_from_slice(END_OF_RUN_MARKER.as_bytes());
        self.bytes.push(b'\n');
    }
}

impl RecordSink for BufferSink {
    type Error = Infallible;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SimPin {
    high: bool,
}

impl StepOutput for SimPin {
    fn set_high(&mut self) {
        self.high = true;
    }

    fn set_low(&mut self) {
        self.high = false;
    }

    fn is_high(&self) -> bool {
        self.high
    }
}

/// ADC whose input follows the waveform at each nominal sample time.
#[derive(Debug)]
struct SimAdc {
    waveform: Waveform,
    config: MeasurementConfig,
    index: u32,
}

impl SimAdc {
    fn code_at(&self, index: u32) -> u16 {
        match self.waveform {
            Waveform::RcCharge(model) => {
                let time_ms = nominal_time_ms(index, self.config.frequency_hz);
                volts_to_code(model.voltage_at(f64::from(time_ms)))
            }
            Waveform::Ramp => {
                let last = self
                    .config
                    .sample_count()
                    .ok()
                    .and_then(|count| u32::try_from(count).ok())
                    .map_or(1, |count| count.saturating_sub(1).max(1));
                let code = u64::from(index.min(last)) * u64::from(ADC_MAX) / u64::from(last);
                u16::try_from(code).unwrap_or(ADC_MAX)
            }
        }
    }
}

impl AnalogInput for SimAdc {
    fn read(&mut self) -> u16 {
        let code = self.code_at(self.index);
        self.index = self.index.saturating_add(1);
        code
    }
}

/// Quantizes a voltage the way a 12-bit converter referenced to `V_REF` does.
// The value is clamped to the code range before the cast.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn volts_to_code(volts: f64) -> u16 {
    let scaled = (volts / f64::from(V_REF) * f64::from(ADC_LEVELS)).floor();
    scaled.clamp(0.0, f64::from(ADC_MAX)) as u16
}

/// Timer that fires one tick per `wait`.
#[derive(Debug)]
struct SimTimer<H> {
    handler: Option<H>,
}

impl<H> Default for SimTimer<H> {
    fn default() -> Self {
        Self { handler: None }
    }
}

impl<H: TickHandler> SampleTimer<H> for SimTimer<H> {
    type Error = Infallible;

    fn arm(&mut self, _frequency_hz: u32, handler: H) -> Result<(), ArmError<H, Self::Error>> {
        self.handler = Some(handler);
        Ok(())
    }

    fn disarm(&mut self) -> Option<H> {
        self.handler.take()
    }

    fn is_armed(&self) -> bool {
        self.handler.is_some()
    }

    fn wait(&mut self) {
        if let Some(handler) = self.handler.as_mut() {
            handler.on_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantizer_matches_adc_range() {
        assert_eq!(volts_to_code(0.0), 0);
        assert_eq!(volts_to_code(1.65), 2_048);
        assert_eq!(volts_to_code(3.3), ADC_MAX);
        assert_eq!(volts_to_code(-0.2), 0);
    }

    #[test]
    fn ramp_spans_full_scale() {
        let adc = SimAdc {
            waveform: Waveform::Ramp,
            config: MeasurementConfig::new(100, 1),
            index: 0,
        };
        assert_eq!(adc.code_at(0), 0);
        assert_eq!(adc.code_at(99), ADC_MAX);
        assert!(adc.code_at(50) > adc.code_at(49));
    }

    #[test]
    fn reads_are_chunked_and_time_out_when_drained() {
        let mut device = SimulatedDevice::new(SimSettings::new(
            MeasurementConfig::new(2, 1),
            Waveform::Ramp,
        ));
        let mut buf = [0u8; 64];
        assert_eq!(
            device.read(&mut buf).map_err(|err| err.kind()),
            Err(ErrorKind::TimedOut)
        );

        device.write_all(&[SOFT_RESET]).expect("reset");
        let mut stream = Vec::new();
        while let Ok(read) = device.read(&mut buf) {
            assert!(read <= 7);
            stream.extend_from_slice(&buf[..read]);
        }
        let text = String::from_utf8(stream).expect("ascii");
        assert!(text.starts_with("stepscope simulator"));
        assert!(text.contains("\n0, 0\n500, 3.29"));
        assert!(text.ends_with("program ended\n"));
    }

    #[test]
    fn interrupt_replaces_pending_output_with_marker() {
        let mut device = SimulatedDevice::new(SimSettings::new(
            MeasurementConfig::default(),
            Waveform::Ramp,
        ));
        device.write_all(&[SOFT_RESET]).expect("reset");
        assert!(device.pending() > 100);

        device.write_all(&[INTERRUPT]).expect("interrupt");
        assert_eq!(device.pending(), "program ended\n".len());
    }

    #[test]
    fn oversized_run_still_ends_with_marker() {
        let settings = SimSettings::new(MeasurementConfig::new(10_000, 1), Waveform::Ramp);
        let stream = run_program(&settings);
        assert_eq!(stream, b"program ended\n");
    }
}
