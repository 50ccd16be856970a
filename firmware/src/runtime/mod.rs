use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Output, Pull, Speed};
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_sync::channel::Channel;
use static_cell::StaticCell;

use bell_core::lines::LineId;
use bell_core::timeapi::WORLD_TIME_API;

use crate::console::ConsoleQueue;
use crate::control::ControlQueue;
use crate::coprocessor::{Coprocessor, LinkReady};
use crate::hw::{GpioLine, inactive_level};
use crate::usb;

mod console_task;
mod tick_task;
mod usb_task;

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

const COPROCESSOR_BAUD: u32 = 115_200;
const UART_BUFFER_SIZE: usize = 256;

pub(super) static CONTROL_QUEUE: ControlQueue = Channel::new();
pub(super) static CONSOLE_RX_QUEUE: ConsoleQueue = Channel::new();
pub(super) static CONSOLE_TX_QUEUE: ConsoleQueue = Channel::new();
pub(super) static USB_BUFFERS: StaticCell<usb::UsbBuffers> = StaticCell::new();
static UART_TX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA4,
        PA5,
        PB0,
        PB1,
        USB,
        PA11,
        PA12,
        USART5,
        ..
    } = hal::init(config);

    // Both outputs start inactive before anything else runs.
    let relay = GpioLine::new(
        LineId::Relay,
        Output::new(PA4, inactive_level(LineId::Relay), Speed::Low),
    );
    let led = GpioLine::new(
        LineId::StatusLed,
        Output::new(PA5, inactive_level(LineId::StatusLed), Speed::Low),
    );
    let link = LinkReady::new(Input::new(PA0, Pull::Down));

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = COPROCESSOR_BAUD;
    uart_config.data_bits = DataBits::DataBits8;
    uart_config.stop_bits = StopBits::STOP1;
    uart_config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        USART5,
        PB1,
        PB0,
        UART_TX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UartIrqs,
        uart_config,
    )
    .expect("failed to initialize coprocessor UART");
    let (uart_tx, uart_rx) = uart.split();
    let coprocessor = Coprocessor::new(uart_tx, uart_rx, WORLD_TIME_API);

    spawner
        .spawn(tick_task::run(relay, led, link, coprocessor))
        .expect("failed to spawn tick task");

    spawner
        .spawn(console_task::run())
        .expect("failed to spawn console task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
