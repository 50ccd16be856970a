use bell_core::controller::BellConfig;
use bell_core::schedule::DEFAULT_SCHEDULE;

use super::{CONSOLE_RX_QUEUE, CONSOLE_TX_QUEUE, CONTROL_QUEUE};
use crate::console::{CONSOLE_FRAME_SIZE, ConsoleFrame, ConsoleSession, FirmwareConsole, Reply};
use crate::instant::FirmwareInstant;

#[embassy_executor::task]
pub async fn run() -> ! {
    let config = BellConfig::new();
    let console = FirmwareConsole::new(
        CONTROL_QUEUE.sender(),
        &DEFAULT_SCHEDULE,
        config.zone,
        config.ring_policy,
    );
    let mut session = ConsoleSession::new(console);

    let ingress = CONSOLE_RX_QUEUE.receiver();
    let egress = CONSOLE_TX_QUEUE.sender();
    let mut reply = Reply::new();

    loop {
        let frame = ingress.receive().await;
        reply.clear();
        session.ingest(&frame, FirmwareInstant::now(), &mut reply);

        for chunk in reply.as_bytes().chunks(CONSOLE_FRAME_SIZE) {
            let mut out = ConsoleFrame::new();
            if out.extend_from_slice(chunk).is_ok() {
                egress.send(out).await;
            }
        }
    }
}
