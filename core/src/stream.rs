//! Line-oriented record output.
//!
//! Each sample leaves the device as `"<time_ms>, <voltage>\n"` in ASCII. The
//! emitter formats into a fixed buffer so draining never allocates.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::config::{END_OF_RUN_MARKER, code_to_volts};

/// Longest formatted record, newline included.
pub const MAX_RECORD_LEN: usize = 48;

/// Byte sink that receives formatted lines.
pub trait RecordSink {
    type Error;

    /// Writes every byte of `bytes` or fails.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

impl<S> RecordSink for &mut S
where
    S: RecordSink + ?Sized,
{
    type Error = S::Error;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write_bytes(bytes)
    }
}

/// Sample paired with its derived timestamp and converted voltage.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimestampedSample {
    pub time_ms: u32,
    pub voltage: f32,
}

impl TimestampedSample {
    /// Pairs a raw code with its nominal time.
    #[must_use]
    pub fn from_code(time_ms: u32, code: u16) -> Self {
        Self {
            time_ms,
            voltage: code_to_volts(code),
        }
    }
}

/// Formats a record line (newline included).
pub fn format_record(sample: &TimestampedSample) -> Result<String<MAX_RECORD_LEN>, fmt::Error> {
    let mut line = String::new();
    writeln!(line, "{}, {}", sample.time_ms, sample.voltage)?;
    Ok(line)
}

/// Writes records and the end-of-run marker to a [`RecordSink`].
pub struct StreamEmitter<S> {
    sink: S,
    emitted: usize,
}

impl<S> StreamEmitter<S>
where
    S: RecordSink,
{
    pub const fn new(sink: S) -> Self {
        Self { sink, emitted: 0 }
    }

    /// Emits one record line.
    pub fn emit(&mut self, sample: &TimestampedSample) -> Result<(), S::Error> {
        // The buffer fits any u32 time and f32 voltage, so formatting cannot
        // fail short of a broken `Display` impl; drop the record if it does.
        if let Ok(line) = format_record(sample) {
            self.sink.write_bytes(line.as_bytes())?;
            self.emitted += 1;
        }
        Ok(())
    }

    /// Emits the marker line that follows the last record of a run.
    pub fn finish(&mut self) -> Result<(), S::Error> {
        self.sink.write_bytes(END_OF_RUN_MARKER.as_bytes())?;
        self.sink.write_bytes(b"\n")
    }

    /// Number of records written so far.
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[derive(Default)]
    struct BufferSink {
        bytes: Vec<u8, 512>,
    }

    impl RecordSink for BufferSink {
        type Error = ();

        fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
            self.bytes.extend_from_slice(bytes).map_err(|_| ())
        }
    }

    #[test]
    fn records_are_comma_separated_lines() {
        let mut emitter = StreamEmitter::new(BufferSink::default());
        emitter
            .emit(&TimestampedSample::from_code(0, 0))
            .expect("emit");
        emitter
            .emit(&TimestampedSample::from_code(10, 2048))
            .expect("emit");
        emitter.finish().expect("finish");

        let text = core::str::from_utf8(&emitter.sink().bytes).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("0, 0"));
        assert_eq!(lines.next(), Some("10, 1.65"));
        assert_eq!(lines.next(), Some(END_OF_RUN_MARKER));
        assert_eq!(lines.next(), None);
        assert_eq!(emitter.emitted(), 2);
    }

    #[test]
    fn voltage_text_round_trips() {
        for code in [1, 7, 1_000, 4_095] {
            let sample = TimestampedSample::from_code(990, code);
            let line = format_record(&sample).expect("format");
            let (_, voltage) = line.trim_end().split_once(',').expect("comma");
            let parsed: f32 = voltage.trim().parse().expect("float");
            assert_eq!(parsed.to_bits(), sample.voltage.to_bits());
        }
    }

    #[test]
    fn sink_errors_propagate() {
        struct Broken;
        impl RecordSink for Broken {
            type Error = &'static str;
            fn write_bytes(&mut self, _: &[u8]) -> Result<(), Self::Error> {
                Err("link down")
            }
        }

        let mut emitter = StreamEmitter::new(Broken);
        assert_eq!(
            emitter.emit(&TimestampedSample::from_code(0, 1)),
            Err("link down")
        );
        assert_eq!(emitter.emitted(), 0);
    }
}
