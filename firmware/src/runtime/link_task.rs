use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use stepscope_core::sampler::RunSignals;

use crate::control::{self, Control};
use crate::hw::{TX_PIPE_SIZE, TxPipe};

const LINK_BAUD: u32 = 115_200;
const LINK_RX_CHUNK: usize = 16;

static mut UART_TX_BUFFER: [u8; TX_PIPE_SIZE] = [0; TX_PIPE_SIZE];
static mut UART_RX_BUFFER: [u8; LINK_RX_CHUNK * 4] = [0; LINK_RX_CHUNK * 4];

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

/// Streams records to the host and watches for control bytes.
#[embassy_executor::task]
pub async fn run(
    pipe: &'static TxPipe,
    signals: &'static RunSignals,
    usart: Peri<'static, hal::peripherals::USART2>,
    tx_pin: Peri<'static, hal::peripherals::PA2>,
    rx_pin: Peri<'static, hal::peripherals::PA3>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            config,
        )
        .expect("failed to initialize link UART")
    };

    let (mut uart_tx, mut uart_rx) = uart.split();

    let outbound = async move {
        let mut chunk = [0u8; TX_PIPE_SIZE];
        loop {
            let count = pipe.read(&mut chunk).await;
            if uart_tx.write_all(&chunk[..count]).await.is_err() {
                defmt::warn!("link: UART write error, dropped {} bytes", count);
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
            if uart_tx.flush().await.is_err() {
                defmt::warn!("link: UART flush error");
            }
        }
    };

    let inbound = async move {
        let mut ingress = [0u8; LINK_RX_CHUNK];
        loop {
            match uart_rx.read(&mut ingress).await {
                Ok(count) if count > 0 => match control::scan(&ingress[..count]) {
                    Some(Control::SoftReset) => {
                        defmt::info!("link: soft reset requested");
                        cortex_m::peripheral::SCB::sys_reset();
                    }
                    Some(Control::Interrupt) => {
                        defmt::info!("link: interrupt requested");
                        signals.cancel();
                    }
                    None => {}
                },
                Ok(_) => {}
                Err(_) => {
                    defmt::warn!("link: UART read error");
                    Timer::after(Duration::from_millis(5)).await;
                }
            }
        }
    };

    join(outbound, inbound).await;
    loop {
        core::future::pending::<()>().await;
    }
}
