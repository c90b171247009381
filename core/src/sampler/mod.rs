//! Step-response sampler state machine.
//!
//! A run drives the step output high, arms the periodic timer with a
//! [`SampleCapture`], waits for the queue to fill, takes the capture back from
//! the timer, and only then drains the queue through a [`StreamEmitter`].
//! Cancellation from any state leaves the output low and the timer disarmed,
//! and dropping a [`Sampler`] enforces the same release.

mod hardware;

use core::{convert::Infallible, fmt};

pub use hardware::{
    AnalogInput, ArmError, RunSignals, SampleCapture, SampleTimer, StepOutput, TickHandler,
};

use crate::config::{ConfigError, MeasurementConfig};
use crate::queue::{QueueError, SampleQueue};
use crate::stream::{RecordSink, StreamEmitter, TimestampedSample};
use crate::timebase::nominal_time_ms;

/// Lifecycle of a single run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamplerState {
    /// No hardware active.
    Idle,
    /// Configuration accepted; stimulus and timer are being brought up.
    Armed,
    /// Timer running, queue filling.
    Collecting,
    /// Timer stopped, queue being streamed out.
    Draining,
    /// Every sample emitted, output low.
    Done,
    /// Cancelled; output low, timer disarmed.
    Aborted,
    /// Stopped by a hardware or transport error; output low, timer disarmed.
    Faulted,
}

impl SamplerState {
    /// Returns `true` when no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            SamplerState::Done | SamplerState::Aborted | SamplerState::Faulted
        )
    }

    const fn can_transition_to(self, next: SamplerState) -> bool {
        match (self, next) {
            (SamplerState::Idle, SamplerState::Armed)
            | (SamplerState::Armed, SamplerState::Collecting)
            | (SamplerState::Collecting, SamplerState::Draining)
            | (SamplerState::Draining, SamplerState::Done) => true,
            (from, SamplerState::Aborted | SamplerState::Faulted) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Failure reported when attempting an invalid state transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: SamplerState,
    pub to: SamplerState,
}

impl TransitionError {
    pub const fn new(from: SamplerState, to: SamplerState) -> Self {
        Self { from, to }
    }
}

/// Errors that end a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamplerError<TimerError, SinkError = Infallible> {
    /// Rejected before any hardware was touched.
    InvalidConfig(ConfigError),
    /// The timer could not be armed; the output was driven low again.
    HardwareInit(TimerError),
    /// Queue contract violated while draining.
    Queue(QueueError),
    /// The outbound stream failed mid-run.
    Sink(SinkError),
    /// The timer did not hand the capture back on disarm.
    CaptureLost,
    /// Operation called from the wrong state.
    Transition(TransitionError),
}

impl<TimerError> SamplerError<TimerError> {
    fn with_sink<SinkError>(self) -> SamplerError<TimerError, SinkError> {
        match self {
            SamplerError::InvalidConfig(err) => SamplerError::InvalidConfig(err),
            SamplerError::HardwareInit(err) => SamplerError::HardwareInit(err),
            SamplerError::Queue(err) => SamplerError::Queue(err),
            SamplerError::Sink(never) => match never {},
            SamplerError::CaptureLost => SamplerError::CaptureLost,
            SamplerError::Transition(err) => SamplerError::Transition(err),
        }
    }
}

impl<TimerError, SinkError> fmt::Display for SamplerError<TimerError, SinkError>
where
    TimerError: fmt::Debug,
    SinkError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::InvalidConfig(err) => write!(f, "invalid config: {err}"),
            SamplerError::HardwareInit(err) => write!(f, "hardware init failed: {err:?}"),
            SamplerError::Queue(err) => write!(f, "queue: {err}"),
            SamplerError::Sink(err) => write!(f, "stream: {err:?}"),
            SamplerError::CaptureLost => f.write_str("timer lost the sample capture"),
            SamplerError::Transition(err) => {
                write!(f, "invalid transition {:?} -> {:?}", err.from, err.to)
            }
        }
    }
}

impl<TimerError, SinkError> From<TransitionError> for SamplerError<TimerError, SinkError> {
    fn from(value: TransitionError) -> Self {
        SamplerError::Transition(value)
    }
}

/// Result of waiting for the queue to fill.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    Full,
    Cancelled,
}

/// Result of draining the queue.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DrainOutcome {
    Complete { samples: usize },
    Cancelled { samples: usize },
}

/// How a run ended when it did not fail.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// Every sample was streamed.
    Completed { samples: usize },
    /// Cancelled while in `during`; `samples` records were already streamed.
    Cancelled { during: SamplerState, samples: usize },
}

/// Owns the stimulus output, the timer, and (between runs) the capture.
pub struct Sampler<'s, O, A, T, const N: usize>
where
    O: StepOutput,
    A: AnalogInput,
    T: SampleTimer<SampleCapture<'s, A, N>>,
{
    config: MeasurementConfig,
    output: O,
    timer: T,
    signals: &'s RunSignals,
    capture: Option<SampleCapture<'s, A, N>>,
    state: SamplerState,
}

impl<'s, O, A, T, const N: usize> Sampler<'s, O, A, T, N>
where
    O: StepOutput,
    A: AnalogInput,
    T: SampleTimer<SampleCapture<'s, A, N>>,
{
    /// Builds an idle sampler around hardware handles and a fresh queue.
    pub fn new(
        config: MeasurementConfig,
        output: O,
        input: A,
        timer: T,
        queue: SampleQueue<N>,
        signals: &'s RunSignals,
    ) -> Self {
        Self {
            config,
            output,
            timer,
            signals,
            capture: Some(SampleCapture::new(input, queue, signals)),
            state: SamplerState::Idle,
        }
    }

    pub const fn state(&self) -> SamplerState {
        self.state
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Returns the capture while it is not registered with the timer.
    pub fn capture(&self) -> Option<&SampleCapture<'s, A, N>> {
        self.capture.as_ref()
    }

    fn set_state(&mut self, next: SamplerState) -> Result<(), TransitionError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(TransitionError::new(self.state, next))
        }
    }

    fn validate(&self) -> Result<usize, ConfigError> {
        let count = self.config.sample_count()?;
        let actual = self.capture.as_ref().map_or(0, |capture| capture.queue().capacity());
        if actual != count {
            return Err(ConfigError::QueueMismatch {
                expected: count,
                actual,
            });
        }
        Ok(count)
    }

    /// Drives the output high and arms the timer.
    ///
    /// Configuration is validated before any hardware is touched. If the
    /// timer refuses to arm, the output is driven low again and the run
    /// moves to [`SamplerState::Faulted`].
    pub fn start(&mut self) -> Result<(), SamplerError<T::Error>> {
        if self.state != SamplerState::Idle {
            return Err(TransitionError::new(self.state, SamplerState::Armed).into());
        }
        self.validate().map_err(SamplerError::InvalidConfig)?;
        let capture = self.capture.take().ok_or(SamplerError::CaptureLost)?;
        self.set_state(SamplerState::Armed)?;

        // Signals may outlive an earlier run; its latch must not end this one.
        self.signals.clear_full();
        self.output.set_high();
        match self.timer.arm(self.config.frequency_hz, capture) {
            Ok(()) => {
                self.set_state(SamplerState::Collecting)?;
                Ok(())
            }
            Err(ArmError { handler, error }) => {
                self.capture = Some(handler);
                self.output.set_low();
                self.set_state(SamplerState::Faulted)?;
                Err(SamplerError::HardwareInit(error))
            }
        }
    }

    /// Busy-waits (via [`SampleTimer::wait`]) until the capture fills or the
    /// run is cancelled.
    pub fn wait_full(&mut self) -> Result<WaitOutcome, SamplerError<T::Error>> {
        if self.state != SamplerState::Collecting {
            return Err(TransitionError::new(self.state, SamplerState::Draining).into());
        }

        loop {
            if self.signals.is_cancelled() {
                return Ok(WaitOutcome::Cancelled);
            }
            if self.signals.is_full() {
                return Ok(WaitOutcome::Full);
            }
            self.timer.wait();
        }
    }

    /// Stops the timer, then streams every queued sample in FIFO order.
    ///
    /// Timestamps are assigned from collection order. On completion the
    /// output is driven low and the end-of-run marker is written.
    pub fn drain<S>(
        &mut self,
        emitter: &mut StreamEmitter<S>,
    ) -> Result<DrainOutcome, SamplerError<T::Error, S::Error>>
    where
        S: RecordSink,
    {
        if self.state != SamplerState::Collecting {
            return Err(TransitionError::new(self.state, SamplerState::Draining).into());
        }

        // The producer must be gone before the first `get`.
        let mut capture = self.timer.disarm().ok_or(SamplerError::CaptureLost)?;
        self.set_state(SamplerState::Draining)?;

        let frequency = self.config.frequency_hz;
        let mut index: u32 = 0;
        let result = loop {
            if !capture.queue().any() {
                break Ok(DrainOutcome::Complete {
                    samples: emitter.emitted(),
                });
            }
            if self.signals.is_cancelled() {
                break Ok(DrainOutcome::Cancelled {
                    samples: emitter.emitted(),
                });
            }

            let code = match capture.queue_mut().get() {
                Ok(code) => code,
                Err(err) => break Err(SamplerError::Queue(err)),
            };
            let sample = TimestampedSample::from_code(nominal_time_ms(index, frequency), code);
            if let Err(err) = emitter.emit(&sample) {
                break Err(SamplerError::Sink(err));
            }
            index = index.saturating_add(1);
        };
        self.capture = Some(capture);

        if let Ok(DrainOutcome::Complete { .. }) = result {
            self.output.set_low();
            self.set_state(SamplerState::Done)?;
            emitter.finish().map_err(SamplerError::Sink)?;
        }
        result
    }

    /// Disarms the timer and drives the output low from any state.
    pub fn abort(&mut self) {
        self.release();
        if !self.state.is_terminal() {
            self.state = SamplerState::Aborted;
        }
    }

    fn fault(&mut self) {
        self.release();
        if !self.state.is_terminal() {
            self.state = SamplerState::Faulted;
        }
    }

    fn release(&mut self) {
        if let Some(capture) = self.timer.disarm() {
            self.capture = Some(capture);
        }
        self.output.set_low();
    }

    /// Executes a complete run, streaming records into `sink`.
    ///
    /// Cancellation is checked before start, while collecting, and between
    /// records while draining. A cancelled run still writes the end-of-run
    /// marker after releasing the hardware.
    pub fn run<S>(&mut self, sink: S) -> Result<RunOutcome, SamplerError<T::Error, S::Error>>
    where
        S: RecordSink,
    {
        let mut emitter = StreamEmitter::new(sink);

        if self.signals.is_cancelled() {
            return self.cancel_run(&mut emitter);
        }

        if let Err(err) = self.start() {
            if !matches!(err, SamplerError::InvalidConfig(_)) {
                self.fault();
            }
            return Err(err.with_sink());
        }

        match self.wait_full() {
            Ok(WaitOutcome::Full) => {}
            Ok(WaitOutcome::Cancelled) => return self.cancel_run(&mut emitter),
            Err(err) => {
                self.fault();
                return Err(err.with_sink());
            }
        }

        match self.drain(&mut emitter) {
            Ok(DrainOutcome::Complete { samples }) => Ok(RunOutcome::Completed { samples }),
            Ok(DrainOutcome::Cancelled { .. }) => self.cancel_run(&mut emitter),
            Err(err) => {
                self.fault();
                Err(err)
            }
        }
    }

    fn cancel_run<S>(
        &mut self,
        emitter: &mut StreamEmitter<S>,
    ) -> Result<RunOutcome, SamplerError<T::Error, S::Error>>
    where
        S: RecordSink,
    {
        let during = self.state;
        self.abort();
        emitter.finish().map_err(SamplerError::Sink)?;
        Ok(RunOutcome::Cancelled {
            during,
            samples: emitter.emitted(),
        })
    }
}

impl<'s, O, A, T, const N: usize> Drop for Sampler<'s, O, A, T, N>
where
    O: StepOutput,
    A: AnalogInput,
    T: SampleTimer<SampleCapture<'s, A, N>>,
{
    fn drop(&mut self) {
        self.release();
    }
}
