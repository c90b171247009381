//! Periodic sampling tick.
//!
//! The sampler hands its capture to [`TickerTimer`]; the capture sits in
//! [`TICK_SLOT`] while armed and the task below calls it once per period from
//! the high-priority executor.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use stepscope_core::sampler::{ArmError, SampleCapture, SampleTimer, TickHandler};

use super::STORAGE;
use crate::hw::BenchAdc;

/// Fastest rate the ADC read fits inside one tick.
pub const MAX_FREQUENCY_HZ: u32 = 10_000;

pub type Capture = SampleCapture<'static, BenchAdc, STORAGE>;

static TICK_SLOT: Mutex<RefCell<Option<Capture>>> = Mutex::new(RefCell::new(None));
static TICK_ARM: Signal<CriticalSectionRawMutex, u32> = Signal::new();

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum ArmFault {
    UnsupportedFrequency(u32),
}

#[derive(Default)]
pub struct TickerTimer {
    armed: bool,
}

impl SampleTimer<Capture> for TickerTimer {
    type Error = ArmFault;

    fn arm(
        &mut self,
        frequency_hz: u32,
        handler: Capture,
    ) -> Result<(), ArmError<Capture, ArmFault>> {
        if frequency_hz == 0 || frequency_hz > MAX_FREQUENCY_HZ {
            return Err(ArmError::new(
                handler,
                ArmFault::UnsupportedFrequency(frequency_hz),
            ));
        }

        critical_section::with(|cs| TICK_SLOT.borrow_ref_mut(cs).replace(handler));
        self.armed = true;
        TICK_ARM.signal(frequency_hz);
        defmt::debug!("tick: armed at {} Hz", frequency_hz);
        Ok(())
    }

    fn disarm(&mut self) -> Option<Capture> {
        self.armed = false;
        critical_section::with(|cs| TICK_SLOT.borrow_ref_mut(cs).take())
    }

    fn is_armed(&self) -> bool {
        self.armed
    }

    fn wait(&mut self) {
        cortex_m::asm::wfi();
    }
}

#[embassy_executor::task]
pub async fn run() -> ! {
    loop {
        let frequency_hz = TICK_ARM.wait().await;
        let mut ticker = Ticker::every(Duration::from_hz(u64::from(frequency_hz)));

        loop {
            ticker.next().await;
            let live = critical_section::with(|cs| {
                match TICK_SLOT.borrow_ref_mut(cs).as_mut() {
                    Some(capture) => {
                        capture.on_tick();
                        true
                    }
                    None => false,
                }
            });
            if !live {
                defmt::debug!("tick: disarmed");
                break;
            }
        }
    }
}
