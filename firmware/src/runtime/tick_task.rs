use bell_core::actuator::Activation;
use bell_core::clock::{ConnectivityProbe, SyncFailure, SyncOutcome};
use bell_core::controller::{BellConfig, BellController};
use bell_core::schedule::DEFAULT_SCHEDULE;
use embassy_time::Ticker;

use super::CONTROL_QUEUE;
use crate::control::ControlRequest;
use crate::coprocessor::{Coprocessor, LinkReady};
use crate::hw::GpioLine;
use crate::instant::{FirmwareInstant, to_embassy};
use crate::status;
use crate::telemetry::TelemetryDrain;

#[embassy_executor::task]
pub async fn run(
    relay: GpioLine<'static>,
    led: GpioLine<'static>,
    link: LinkReady<'static>,
    mut coprocessor: Coprocessor<'static>,
) -> ! {
    let config = BellConfig::new();
    let mut controller = match BellController::<FirmwareInstant, _, _>::new(
        config,
        &DEFAULT_SCHEDULE,
        relay,
        led,
        FirmwareInstant::now(),
    ) {
        Ok(controller) => controller,
        Err(err) => {
            // The relay was driven inactive before validation failed.
            defmt::error!("bell: refusing to start: {}", defmt::Display2Format(&err));
            loop {
                core::future::pending::<()>().await;
            }
        }
    };

    defmt::info!(
        "bell: {} schedule entries, tick={}ms policy={}",
        controller.schedule().count(),
        u64::try_from(config.tick_period.as_millis()).unwrap_or(u64::MAX),
        config.ring_policy.label()
    );

    let requests = CONTROL_QUEUE.receiver();
    let mut drain = TelemetryDrain::new();
    let mut ticker = Ticker::every(to_embassy(config.tick_period));

    loop {
        ticker.next().await;

        while let Ok(request) = requests.try_receive() {
            match request {
                ControlRequest::Ring => {
                    if controller.request_ring(FirmwareInstant::now()) == Activation::IgnoredActive {
                        defmt::info!("bell: manual ring ignored, relay already active");
                    }
                }
                ControlRequest::Sync => controller.request_sync(),
            }
        }

        let link_up = link.is_up();
        status::set_link_up(link_up);

        // The fetch suspends this task; the outcome is applied at the instant
        // it completed.
        let sync = if controller.sync_due(FirmwareInstant::now()) {
            let outcome = if link_up {
                SyncOutcome::from(coprocessor.fetch(config.sync.timeout).await)
            } else {
                SyncOutcome::Failure(SyncFailure::NoConnectivity)
            };
            Some(outcome)
        } else {
            None
        };

        let now = FirmwareInstant::now();
        controller.step(now, sync);
        drain.drain(controller.telemetry());
        status::publish(&controller.snapshot(now), now);
    }
}
