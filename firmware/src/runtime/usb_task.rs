use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Receiver, Sender};
use embassy_usb::driver::{Driver, EndpointError};

use super::{CONSOLE_RX_QUEUE, CONSOLE_TX_QUEUE, USB_BUFFERS};
use crate::console::{ConsoleFrame, PROMPT};
use crate::usb::{self, ConsolePort, DeviceIdentity, UsbBuffers};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

/// Why a console connection ended.
enum Hangup {
    EndpointDisabled,
    DtrDropped,
}

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let buffers = USB_BUFFERS.init(UsbBuffers::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);
    let (mut device, port) = usb::console_device(driver, buffers, DeviceIdentity::BELL);

    join(device.run(), serve_console(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn serve_console<D: Driver<'static>>(mut port: ConsolePort<D>) -> ! {
    loop {
        join(port.rx.wait_connection(), port.tx.wait_connection()).await;
        while !port.tx.dtr() {
            port.line_state.control_changed().await;
        }
        defmt::info!("usb: console attached");

        match pump(&mut port.tx, &mut port.rx, &port.line_state).await {
            Hangup::EndpointDisabled => defmt::warn!("usb: console endpoint disabled"),
            Hangup::DtrDropped => defmt::info!("usb: console detached"),
        }
    }
}

/// Moves bytes between the CDC endpoints and the console queues until the
/// host goes away. Each attach starts with a fresh prompt.
async fn pump<D: Driver<'static>>(
    tx: &mut Sender<'static, D>,
    rx: &mut Receiver<'static, D>,
    line_state: &ControlChanged<'static>,
) -> Hangup {
    let inbound = CONSOLE_RX_QUEUE.sender();
    let outbound = CONSOLE_TX_QUEUE.receiver();
    let mut packet = [0u8; usb::MAX_PACKET_SIZE as usize];
    // Frame that failed to send and is retried before anything queued.
    let mut retry = ConsoleFrame::from_slice(PROMPT.as_bytes()).ok();

    loop {
        let send = async {
            let frame = match retry.take() {
                Some(frame) => frame,
                None => outbound.receive().await,
            };
            tx.write_packet(&frame).await.map_err(|err| (err, frame))
        };

        match select3(rx.read_packet(&mut packet), send, line_state.control_changed()).await {
            Either3::First(Ok(0)) | Either3::Second(Ok(())) => {}
            Either3::First(Ok(len)) => {
                if let Ok(frame) = ConsoleFrame::from_slice(&packet[..len]) {
                    inbound.send(frame).await;
                } else {
                    defmt::warn!("usb: console packet of {} bytes dropped", len);
                }
            }
            Either3::First(Err(EndpointError::Disabled))
            | Either3::Second(Err((EndpointError::Disabled, _))) => {
                return Hangup::EndpointDisabled;
            }
            Either3::First(Err(_)) => defmt::warn!("usb: console read failed"),
            Either3::Second(Err((_, frame))) => {
                defmt::warn!("usb: console write failed, retrying");
                retry = Some(frame);
            }
            Either3::Third(()) => {
                if !tx.dtr() {
                    return Hangup::DtrDropped;
                }
            }
        }
    }
}
