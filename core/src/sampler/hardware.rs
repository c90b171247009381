//! Hardware seams the sampler drives.
//!
//! Firmware implements these against real GPIO, ADC, and timer peripherals;
//! tests and the host simulator implement them in memory.

use portable_atomic::{AtomicBool, Ordering};

use crate::queue::SampleQueue;

/// Digital output that applies the step stimulus.
pub trait StepOutput {
    fn set_high(&mut self);

    fn set_low(&mut self);

    fn is_high(&self) -> bool;
}

/// Analog input sampled once per tick.
pub trait AnalogInput {
    /// Performs one conversion and returns the raw code.
    fn read(&mut self) -> u16;
}

/// Work performed on every timer period, in interrupt context.
///
/// Implementations must not allocate or block.
pub trait TickHandler {
    fn on_tick(&mut self);
}

/// Failed arm attempt; hands the handler back to the caller.
#[derive(Debug)]
pub struct ArmError<H, E> {
    pub handler: H,
    pub error: E,
}

impl<H, E> ArmError<H, E> {
    pub const fn new(handler: H, error: E) -> Self {
        Self { handler, error }
    }
}

/// Periodic timer that owns a [`TickHandler`] while armed.
///
/// The handler moves into the timer on [`arm`](Self::arm) and comes back on
/// [`disarm`](Self::disarm), so nothing outside interrupt context can touch
/// the handler's state until the timer has stopped calling it.
pub trait SampleTimer<H: TickHandler> {
    type Error;

    /// Starts calling `handler` at `frequency_hz`.
    fn arm(&mut self, frequency_hz: u32, handler: H) -> Result<(), ArmError<H, Self::Error>>;

    /// Stops the timer and returns the handler, if one was registered.
    fn disarm(&mut self) -> Option<H>;

    fn is_armed(&self) -> bool;

    /// Parks the main context until the next interrupt (or returns at once).
    fn wait(&mut self);
}

/// Flags shared between interrupt context and the main loop for one run.
#[derive(Debug, Default)]
pub struct RunSignals {
    full: AtomicBool,
    cancel: AtomicBool,
}

impl RunSignals {
    pub const fn new() -> Self {
        Self {
            full: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        }
    }

    /// Requests cancellation of the current run. Safe from any context.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Returns `true` once the capture has filled its queue.
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    fn mark_full(&self) {
        self.full.store(true, Ordering::Release);
    }

    /// Drops a latch left over from an earlier run. A pending cancel stays.
    pub(crate) fn clear_full(&self) {
        self.full.store(false, Ordering::Release);
    }
}

/// Tick handler that reads the analog input into the sample queue.
///
/// Once the queue reports full the capture latches and ignores further ticks
/// until a fresh capture is armed.
#[derive(Debug)]
pub struct SampleCapture<'s, A, const N: usize> {
    input: A,
    queue: SampleQueue<N>,
    signals: &'s RunSignals,
}

impl<'s, A, const N: usize> SampleCapture<'s, A, N>
where
    A: AnalogInput,
{
    pub const fn new(input: A, queue: SampleQueue<N>, signals: &'s RunSignals) -> Self {
        Self {
            input,
            queue,
            signals,
        }
    }

    pub fn queue(&self) -> &SampleQueue<N> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SampleQueue<N> {
        &mut self.queue
    }

    pub fn input(&self) -> &A {
        &self.input
    }
}

impl<A, const N: usize> TickHandler for SampleCapture<'_, A, N>
where
    A: AnalogInput,
{
    fn on_tick(&mut self) {
        if self.signals.is_full() {
            return;
        }

        let code = self.input.read();
        // The latch above keeps `put` from ever seeing a full queue.
        let _ = self.queue.put(code);
        if self.queue.full() {
            self.signals.mark_full();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(u16);

    impl AnalogInput for Ramp {
        fn read(&mut self) -> u16 {
            self.0 += 1;
            self.0
        }
    }

    #[test]
    fn capture_latches_when_queue_fills() {
        let signals = RunSignals::new();
        let queue = SampleQueue::<8>::new(3).expect("queue");
        let mut capture = SampleCapture::new(Ramp(0), queue, &signals);

        capture.on_tick();
        capture.on_tick();
        assert!(!signals.is_full());
        capture.on_tick();
        assert!(signals.is_full());

        capture.on_tick();
        capture.on_tick();
        assert_eq!(capture.queue().len(), 3);
        // Latched ticks do not even touch the ADC.
        assert_eq!(capture.input().0, 3);

        // Draining one sample does not re-open the capture.
        assert_eq!(capture.queue_mut().get(), Ok(1));
        capture.on_tick();
        assert_eq!(capture.queue().len(), 2);
    }

    #[test]
    fn clearing_the_latch_keeps_a_pending_cancel() {
        let signals = RunSignals::new();
        signals.cancel();
        signals.mark_full();
        assert!(signals.is_full());

        signals.clear_full();
        assert!(!signals.is_full());
        assert!(signals.is_cancelled());
    }
}
