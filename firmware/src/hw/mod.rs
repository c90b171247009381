//! Board adapters for the sampler's hardware seams.
//!
//! Step output on PC0, analog input on PB0 (ADC1 channel 15). Records leave
//! through [`TX_PIPE`], which the link task drains into USART2.

use core::convert::Infallible;

use embassy_stm32::Peri;
use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel, Resolution, SampleTime};
use embassy_stm32::gpio::Output;
use embassy_stm32::peripherals::{ADC1, PB0};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::{Pipe, TryWriteError};
use stepscope_core::config::END_OF_RUN_MARKER;
use stepscope_core::sampler::{AnalogInput, StepOutput};
use stepscope_core::stream::RecordSink;

pub const TX_PIPE_SIZE: usize = 256;

pub type TxPipe = Pipe<CriticalSectionRawMutex, TX_PIPE_SIZE>;

pub static TX_PIPE: TxPipe = Pipe::new();

pub struct BenchOutput {
    pin: Output<'static>,
}

impl BenchOutput {
    pub fn new(mut pin: Output<'static>) -> Self {
        pin.set_low();
        Self { pin }
    }
}

impl StepOutput for BenchOutput {
    fn set_high(&mut self) {
        self.pin.set_high();
    }

    fn set_low(&mut self) {
        self.pin.set_low();
    }

    fn is_high(&self) -> bool {
        self.pin.is_set_high()
    }
}

/// 12-bit single-channel conversion, read from the tick interrupt.
pub struct BenchAdc {
    adc: Adc<'static, ADC1>,
    channel: AnyAdcChannel<ADC1>,
}

impl BenchAdc {
    pub fn new(mut adc: Adc<'static, ADC1>, channel: Peri<'static, PB0>) -> Self {
        adc.set_resolution(Resolution::BITS12);
        adc.set_sample_time(SampleTime::CYCLES47_5);
        Self {
            adc,
            channel: channel.degrade_adc(),
        }
    }
}

impl AnalogInput for BenchAdc {
    fn read(&mut self) -> u16 {
        self.adc.blocking_read(&mut self.channel)
    }
}

/// Record sink that feeds the UART transmit pipe.
///
/// When the pipe is full the main context sleeps until the link task, which
/// runs at interrupt priority, has made room.
pub struct PipeSink {
    pipe: &'static TxPipe,
}

impl PipeSink {
    pub const fn new(pipe: &'static TxPipe) -> Self {
        Self { pipe }
    }

    /// Writes the end-of-run line on its own, for runs that never streamed.
    pub fn push_marker(&mut self) {
        let _ = self.write_bytes(END_OF_RUN_MARKER.as_bytes());
        let _ = self.write_bytes(b"\n");
    }
}

impl RecordSink for PipeSink {
    type Error = Infallible;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut rest = bytes;
        while !rest.is_empty() {
            match self.pipe.try_write(rest) {
                Ok(written) => rest = &rest[written..],
                Err(TryWriteError::Full) => cortex_m::asm::wfi(),
            }
        }
        Ok(())
    }
}
