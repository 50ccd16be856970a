mod common;

use core::time::Duration;

use bell_core::actuator::{Activation, Actuator, DEFAULT_RING_DURATION, RingSource};
use bell_core::controller::{BellConfig, BellController};
use bell_core::schedule::DEFAULT_SCHEDULE;

use common::{MockInstant, RecordingLine};

#[test]
fn ring_holds_for_exactly_its_duration() {
    let mut actuator = Actuator::new(RecordingLine::starting(false), DEFAULT_RING_DURATION);
    let t0 = 10_000;

    assert_eq!(
        actuator.activate(MockInstant::millis(t0), RingSource::Manual),
        Activation::Started
    );

    for offset in (0..=7_000).step_by(100) {
        let now = MockInstant::millis(t0 + offset);
        if offset == 1_000 {
            assert_eq!(
                actuator.activate(now, RingSource::Manual),
                Activation::IgnoredActive
            );
        }

        actuator.poll(now);
        let high = actuator.line().level;
        if offset < 5_000 {
            assert!(high, "line should be high at +{offset}ms");
        } else {
            assert!(!high, "line should be low at +{offset}ms");
        }
    }
}

#[test]
fn release_reports_hold_time() {
    let mut actuator = Actuator::new(RecordingLine::starting(false), Duration::from_secs(5));
    actuator.activate(MockInstant::secs(0), RingSource::Manual);

    assert_eq!(actuator.poll(MockInstant::millis(4_999)), None);
    let release = actuator.poll(MockInstant::millis(5_050)).expect("released");
    assert_eq!(release.held_for, Duration::from_millis(5_050));
    assert_eq!(release.source, RingSource::Manual);
}

#[test]
fn relay_is_forced_low_before_first_tick() {
    let controller = BellController::<MockInstant, _, _>::new(
        BellConfig::new(),
        &DEFAULT_SCHEDULE,
        RecordingLine::starting(true),
        RecordingLine::starting(true),
        MockInstant::secs(0),
    )
    .expect("valid controller");

    let relay = controller.actuator().line();
    assert!(!relay.level);
    assert_eq!(relay.history.as_slice(), &[false]);
    assert!(!controller.actuator().is_active());
}
