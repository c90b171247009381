use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use stepscope_core::config::MeasurementConfig;
use stepscope_core::queue::SampleQueue;
use stepscope_core::sampler::{RunOutcome, RunSignals, Sampler};

use crate::hw::{BenchAdc, BenchOutput, PipeSink, TX_PIPE};

mod link_task;
mod tick_task;

/// Largest run the firmware can hold, in samples.
pub(crate) const STORAGE: usize = 1_024;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static SIGNALS: RunSignals = RunSignals::new();

/// Runs the tick and link tasks above the thread-mode sampler loop.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn UART4() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[embassy_executor::main]
pub async fn main(_spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA2,
        PA3,
        PB0,
        PC0,
        ADC1,
        USART2,
        ..
    } = hal::init(config);

    hal::interrupt::UART4.set_priority(Priority::P6);
    let high = EXECUTOR_HIGH.start(hal::interrupt::UART4);

    high.spawn(link_task::run(&TX_PIPE, &SIGNALS, USART2, PA2, PA3))
        .expect("failed to spawn link task");
    high.spawn(tick_task::run()).expect("failed to spawn tick task");

    let measurement = MeasurementConfig::default();
    let output = BenchOutput::new(Output::new(PC0, Level::Low, Speed::Low));
    let input = BenchAdc::new(Adc::new(ADC1), PB0);
    let mut sink = PipeSink::new(&TX_PIPE);

    match measurement
        .sample_count()
        .map_err(|_| ())
        .and_then(|count| SampleQueue::<STORAGE>::new(count).map_err(|_| ()))
    {
        Ok(queue) => {
            let mut sampler = Sampler::new(
                measurement,
                output,
                input,
                tick_task::TickerTimer::default(),
                queue,
                &SIGNALS,
            );
            match sampler.run(&mut sink) {
                Ok(RunOutcome::Completed { samples }) => {
                    defmt::info!("sampler: streamed {} samples", samples);
                }
                Ok(RunOutcome::Cancelled { during, samples }) => {
                    defmt::info!(
                        "sampler: cancelled while {} after {} records",
                        defmt::Debug2Format(&during),
                        samples
                    );
                }
                Err(err) => {
                    defmt::error!("sampler: {}", defmt::Display2Format(&err));
                    sink.push_marker();
                }
            }
        }
        Err(()) => {
            defmt::error!(
                "sampler: {} Hz for {} s does not fit {} samples",
                measurement.frequency_hz,
                measurement.collection_time_s,
                STORAGE
            );
            sink.push_marker();
        }
    }

    core::future::pending::<()>().await;
}
