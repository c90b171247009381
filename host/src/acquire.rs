//! Host acquisition loop.
//!
//! Reads the device stream in whatever chunks the transport delivers, turns
//! complete lines into records, and stops at the run's final timestamp, the
//! device's end-of-run marker, or a user cancel. Noise is skipped; a closed
//! stream or a link that stays silent past the idle limit ends the run with an
//! error.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use stepscope_core::config::INTERRUPT;
use stepscope_core::protocol::{
    AssemblerError, LineAssembler, LineEvent, MAX_LINE_LEN, Record, RecordError, StopRule,
    classify_line,
};
use thiserror::Error;

const READ_CHUNK: usize = 256;

/// Why a line was dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Discard {
    Field(RecordError),
    TooLong,
}

/// Outcome of a single read from the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReadEvent {
    /// No complete line yet; read again.
    Incomplete,
    /// A complete line that is not a record; skip it.
    Malformed(Discard),
    Record(Record),
    /// The device printed its end-of-run marker.
    EndOfRun,
    /// The transport reported end of stream.
    Closed,
}

/// How an acquisition finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunEnd {
    /// The record at the final nominal timestamp arrived.
    Sentinel,
    /// The device ended the run before the final timestamp.
    Marker,
    /// The user stopped the read loop.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("device read failed: {0}")]
    Io(#[from] io::Error),
    #[error("device closed the stream after {received} records")]
    Closed { received: usize },
    #[error("no data for {limit:?} after {received} records")]
    Idle { limit: Duration, received: usize },
}

/// Records collected by one acquisition.
#[derive(Clone, Debug, PartialEq)]
pub struct Acquisition {
    pub records: Vec<Record>,
    pub end: RunEnd,
    pub discarded: usize,
}

/// Polled between reads; returning `true` stops the acquisition.
pub trait CancelSource {
    fn cancel_requested(&mut self) -> bool;
}

impl<F> CancelSource for F
where
    F: FnMut() -> bool,
{
    fn cancel_requested(&mut self) -> bool {
        self()
    }
}

/// Cancel source that never fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelSource for NeverCancel {
    fn cancel_requested(&mut self) -> bool {
        false
    }
}

/// Line-oriented reader over a device byte stream.
pub struct LineAcquirer<D> {
    device: D,
    assembler: LineAssembler<MAX_LINE_LEN>,
    pending: VecDeque<ReadEvent>,
    stop: StopRule,
    idle_limit: Duration,
}

impl<D> LineAcquirer<D>
where
    D: Read + Write,
{
    #[must_use]
    pub fn new(device: D, stop: StopRule, idle_limit: Duration) -> Self {
        Self {
            device,
            assembler: LineAssembler::new(),
            pending: VecDeque::new(),
            stop,
            idle_limit,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> D {
        self.device
    }

    /// Returns the next complete line, or [`ReadEvent::Incomplete`] when the
    /// read timed out or delivered only part of a line.
    pub fn next_event(&mut self) -> io::Result<ReadEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let read = match self.device.read(&mut chunk) {
            Ok(0) => return Ok(ReadEvent::Closed),
            Ok(read) => read,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(ReadEvent::Incomplete);
            }
            Err(err) => return Err(err),
        };

        let pending = &mut self.pending;
        self.assembler.feed(&chunk[..read], |line| {
            let event = match line.map(classify_line) {
                Ok(LineEvent::Record(record)) => ReadEvent::Record(record),
                Ok(LineEvent::EndOfRun) => ReadEvent::EndOfRun,
                Ok(LineEvent::Malformed(err)) => ReadEvent::Malformed(Discard::Field(err)),
                Err(AssemblerError::LineTooLong) => ReadEvent::Malformed(Discard::TooLong),
            };
            pending.push_back(event);
        });

        Ok(self.pending.pop_front().unwrap_or(ReadEvent::Incomplete))
    }

    /// Reads until the stop rule, the end-of-run marker, or a cancel.
    ///
    /// A cancel sends the interrupt byte so the device releases its output;
    /// records gathered so far are returned with [`RunEnd::Cancelled`].
    pub fn acquire(&mut self, cancel: &mut dyn CancelSource) -> Result<Acquisition, AcquireError> {
        let mut records = Vec::new();
        let mut discarded = 0;
        let mut last_line = Instant::now();

        let end = loop {
            if cancel.cancel_requested() {
                info!("acquire: cancelled after {} records", records.len());
                self.device.write_all(&[INTERRUPT])?;
                self.device.flush()?;
                break RunEnd::Cancelled;
            }

            match self.next_event()? {
                ReadEvent::Incomplete => {
                    if last_line.elapsed() > self.idle_limit {
                        return Err(AcquireError::Idle {
                            limit: self.idle_limit,
                            received: records.len(),
                        });
                    }
                    trace!("acquire: no complete line yet");
                    continue;
                }
                ReadEvent::Malformed(reason) => {
                    debug!("acquire: discarded line ({reason:?})");
                    discarded += 1;
                }
                ReadEvent::Record(record) => {
                    records.push(record);
                    if self.stop.is_final(&record) {
                        break RunEnd::Sentinel;
                    }
                }
                ReadEvent::EndOfRun => break RunEnd::Marker,
                ReadEvent::Closed => {
                    return Err(AcquireError::Closed {
                        received: records.len(),
                    });
                }
            }
            last_line = Instant::now();
        };

        self.pending.clear();
        self.assembler.reset();
        info!(
            "acquire: {} records, {discarded} discarded, ended by {end:?}",
            records.len()
        );
        Ok(Acquisition {
            records,
            end,
            discarded,
        })
    }
}
