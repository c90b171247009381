//! Host-side view of the record stream.
//!
//! Bytes arrive in arbitrary chunks. [`LineAssembler`] rebuilds complete lines
//! in bounded storage, [`classify_line`] turns each line into a record, the
//! end-of-run marker, or recoverable noise, and [`StopRule`] decides when the
//! run's final record has arrived.

use core::fmt;

use heapless::Vec;
use winnow::ascii::float;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::config::{ConfigError, END_OF_RUN_MARKER, MeasurementConfig};

/// Field delimiter on the wire.
pub const FIELD_DELIMITER: char = ',';

/// Longest line the host keeps; anything longer is noise.
pub const MAX_LINE_LEN: usize = 128;

/// One parsed `(time_ms, voltage)` record.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Record {
    pub time_ms: u32,
    pub voltage: f64,
}

/// Reasons a line is discarded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordError {
    /// Fewer than two comma-separated fields.
    MissingField,
    /// Time field is not a non-negative whole number of milliseconds.
    InvalidTime,
    /// Voltage field is not a finite number.
    InvalidVoltage,
    /// Line bytes are not UTF-8.
    InvalidEncoding,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::MissingField => f.write_str("missing field"),
            RecordError::InvalidTime => f.write_str("invalid time field"),
            RecordError::InvalidVoltage => f.write_str("invalid voltage field"),
            RecordError::InvalidEncoding => f.write_str("line is not UTF-8"),
        }
    }
}

fn number(field: &str) -> Option<f64> {
    float::<_, f64, ContextError>.parse(field).ok()
}

fn parse_time(field: &str) -> Result<u32, RecordError> {
    let value = number(field).ok_or(RecordError::InvalidTime)?;
    if !value.is_finite() || value < 0.0 || value % 1.0 != 0.0 || value > f64::from(u32::MAX) {
        return Err(RecordError::InvalidTime);
    }
    // Range and integrality are checked above.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as u32)
}

fn parse_voltage(field: &str) -> Result<f64, RecordError> {
    number(field)
        .filter(|value| value.is_finite())
        .ok_or(RecordError::InvalidVoltage)
}

/// Parses `"<time_ms>,<voltage>"`, ignoring whitespace around each field.
///
/// Fields beyond the second are ignored.
pub fn parse_record(line: &str) -> Result<Record, RecordError> {
    let mut fields = line.split(FIELD_DELIMITER);
    let (Some(time), Some(voltage)) = (fields.next(), fields.next()) else {
        return Err(RecordError::MissingField);
    };

    Ok(Record {
        time_ms: parse_time(time.trim())?,
        voltage: parse_voltage(voltage.trim())?,
    })
}

/// What a complete line turned out to be.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LineEvent {
    Record(Record),
    /// The device finished (or aborted) its run.
    EndOfRun,
    /// Noise; skip and keep reading.
    Malformed(RecordError),
}

/// Classifies one complete line (terminator already stripped).
pub fn classify_line(line: &[u8]) -> LineEvent {
    let Ok(text) = core::str::from_utf8(line) else {
        return LineEvent::Malformed(RecordError::InvalidEncoding);
    };
    if text.trim() == END_OF_RUN_MARKER {
        return LineEvent::EndOfRun;
    }
    match parse_record(text) {
        Ok(record) => LineEvent::Record(record),
        Err(err) => LineEvent::Malformed(err),
    }
}

/// Errors reported while reassembling lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AssemblerError {
    /// A line exceeded the buffer; its bytes were dropped up to the newline.
    LineTooLong,
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblerError::LineTooLong => f.write_str("line exceeds buffer"),
        }
    }
}

/// Rebuilds newline-terminated lines from arbitrarily split byte chunks.
#[derive(Clone, Debug, Default)]
pub struct LineAssembler<const N: usize = MAX_LINE_LEN> {
    buffer: Vec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> LineAssembler<N> {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feeds a chunk, calling `on_line` for every line it completes.
    ///
    /// `\r` is dropped so `\r\n` and `\n` terminators behave the same.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_line: F)
    where
        F: FnMut(Result<&[u8], AssemblerError>),
    {
        for &byte in chunk {
            match byte {
                b'\n' => {
                    if self.overflowed {
                        on_line(Err(AssemblerError::LineTooLong));
                    } else {
                        on_line(Ok(self.buffer.as_slice()));
                    }
                    self.buffer.clear();
                    self.overflowed = false;
                }
                b'\r' => {}
                _ if self.overflowed => {}
                _ => {
                    if self.buffer.push(byte).is_err() {
                        self.overflowed = true;
                        self.buffer.clear();
                    }
                }
            }
        }
    }

    /// Bytes held for a line that has not been terminated yet.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}

/// Decides when the host has seen the last record of a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StopRule {
    sentinel_ms: u32,
}

impl StopRule {
    /// Stops at the nominal timestamp of the run's final sample.
    pub fn for_config(config: &MeasurementConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            sentinel_ms: config.last_sample_time_ms()?,
        })
    }

    pub const fn at(sentinel_ms: u32) -> Self {
        Self { sentinel_ms }
    }

    pub const fn sentinel_ms(&self) -> u32 {
        self.sentinel_ms
    }

    pub const fn is_final(&self, record: &Record) -> bool {
        record.time_ms == self.sentinel_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(assembler: &mut LineAssembler<16>, chunk: &[u8]) -> Vec<Vec<u8, 16>, 8> {
        let mut lines = Vec::new();
        assembler.feed(chunk, |line| {
            let bytes = line.map_or_else(
                |_| Vec::from_slice(b"<overflow>").expect("marker fits"),
                |bytes| Vec::from_slice(bytes).expect("line fits"),
            );
            lines.push(bytes).expect("room for lines");
        });
        lines
    }

    #[test]
    fn parses_padded_fields() {
        assert_eq!(
            parse_record(" 12 , 1.5 "),
            Ok(Record {
                time_ms: 12,
                voltage: 1.5
            })
        );
        assert_eq!(
            parse_record("990, 3.2991943359375, extra"),
            Ok(Record {
                time_ms: 990,
                voltage: 3.299_194_335_937_5
            })
        );
    }

    #[test]
    fn rejects_short_and_non_numeric_lines() {
        assert_eq!(parse_record("abc"), Err(RecordError::MissingField));
        assert_eq!(parse_record(""), Err(RecordError::MissingField));
        assert_eq!(parse_record("12,xyz"), Err(RecordError::InvalidVoltage));
        assert_eq!(parse_record("ten,1.0"), Err(RecordError::InvalidTime));
        assert_eq!(parse_record("-10,1.0"), Err(RecordError::InvalidTime));
        assert_eq!(parse_record("10.5,1.0"), Err(RecordError::InvalidTime));
        assert_eq!(parse_record("990.25,1.0"), Err(RecordError::InvalidTime));
        assert_eq!(parse_record("10,nan"), Err(RecordError::InvalidVoltage));
        assert_eq!(parse_record("1 0,1.0"), Err(RecordError::InvalidTime));
    }

    #[test]
    fn accepts_float_formatted_times() {
        assert_eq!(parse_record("990.0,0.5").map(|r| r.time_ms), Ok(990));
    }

    #[test]
    fn classifies_marker_noise_and_records() {
        assert_eq!(classify_line(b"program ended"), LineEvent::EndOfRun);
        assert_eq!(
            classify_line(b"MicroPython v1.20 on 2023-04-26"),
            LineEvent::Malformed(RecordError::MissingField)
        );
        assert_eq!(
            classify_line(&[0xff, b',', b'1']),
            LineEvent::Malformed(RecordError::InvalidEncoding)
        );
        assert_eq!(
            classify_line(b"10, 0.25"),
            LineEvent::Record(Record {
                time_ms: 10,
                voltage: 0.25
            })
        );
    }

    #[test]
    fn reassembles_split_chunks() {
        let mut assembler = LineAssembler::<16>::new();
        assert!(lines_of(&mut assembler, b"0, 0").is_empty());
        assert_eq!(assembler.pending(), b"0, 0");

        let lines = lines_of(&mut assembler, b".5\r\n10, 0.");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_slice(), b"0, 0.5");

        let lines = lines_of(&mut assembler, b"7\n\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_slice(), b"10, 0.7");
        assert!(lines[1].is_empty());
    }

    #[test]
    fn overlong_lines_are_dropped_to_newline() {
        let mut assembler = LineAssembler::<16>::new();
        let lines = lines_of(&mut assembler, b"0123456789abcdefXYZ\n20, 1\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_slice(), b"<overflow>");
        assert_eq!(lines[1].as_slice(), b"20, 1");
    }

    #[test]
    fn stop_rule_uses_last_nominal_timestamp() {
        let rule = StopRule::for_config(&MeasurementConfig::new(100, 1)).expect("config");
        assert_eq!(rule.sentinel_ms(), 990);
        assert!(rule.is_final(&Record {
            time_ms: 990,
            voltage: 3.0
        }));
        assert!(!rule.is_final(&Record {
            time_ms: 980,
            voltage: 3.0
        }));

        let two_seconds = StopRule::for_config(&MeasurementConfig::new(100, 2)).expect("config");
        assert_eq!(two_seconds.sentinel_ms(), 1_990);
    }
}
