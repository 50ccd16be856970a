mod common;

use core::time::Duration;

use bell_core::actuator::{Activation, NoopLine};
use bell_core::clock::{AlwaysUp, ConfidenceGrade, SyncFailure, SyncOutcome, SyncPolicy};
use bell_core::controller::{BellConfig, BellController};
use bell_core::schedule::{MatchOutcome, MatchWindow, RingPolicy, ScheduleEntry};
use bell_core::telemetry::TelemetryEventKind;
use bell_core::time::Weekday;

use common::{MockInstant, RecordingLine, ScriptedProvider, SUNDAY_NINE};

const NINE: ScheduleEntry = ScheduleEntry::new(Weekday::Sunday, 9, 0, 0);

#[test]
fn occurrence_fires_once_across_its_window() {
    let config = BellConfig {
        tick_period: Duration::from_secs(1),
        window: MatchWindow::new(2),
        ring_duration: Duration::from_secs(1),
        ..BellConfig::new()
    };
    let mut controller = BellController::<MockInstant, _, _>::new(
        config,
        &[NINE],
        RecordingLine::starting(false),
        NoopLine::new(),
        MockInstant::secs(0),
    )
    .expect("valid controller");

    // Sync lands on 08:59:59 so the ticks walk 08:59:59 through 09:00:04.
    let mut provider = ScriptedProvider::new(Ok(SUNDAY_NINE - 1));
    let mut started = 0;
    for tick in 0..=5 {
        let report = controller.tick(MockInstant::secs(tick), &mut provider, &AlwaysUp);
        assert_eq!(report.estimate_secs, SUNDAY_NINE - 1 + tick);
        if report.activation == Some(Activation::Started) {
            started += 1;
        }
    }

    assert_eq!(started, 1);
    let rises = controller
        .actuator()
        .line()
        .history
        .iter()
        .filter(|level| **level)
        .count();
    assert_eq!(rises, 1);
}

#[test]
fn next_week_occurrence_fires_again() {
    let mut controller = BellController::<MockInstant, _, _>::new(
        BellConfig::new(),
        &[NINE],
        NoopLine::new(),
        NoopLine::new(),
        MockInstant::secs(0),
    )
    .expect("valid controller");

    let first = controller.step(
        MockInstant::secs(0),
        Some(SyncOutcome::Success(SUNDAY_NINE)),
    );
    assert_eq!(first.matched, MatchOutcome::Fire(NINE));

    controller.step(MockInstant::secs(6), None);
    assert!(!controller.actuator().is_active());

    let week = 7 * 86_400;
    let second = controller.step(
        MockInstant::secs(10),
        Some(SyncOutcome::Success(SUNDAY_NINE + week)),
    );
    assert_eq!(second.matched, MatchOutcome::Fire(NINE));
}

fn untrusted_controller(
    policy: RingPolicy,
) -> BellController<MockInstant, RecordingLine, NoopLine> {
    let config = BellConfig {
        sync: SyncPolicy::new(Duration::from_secs(3_600), Duration::from_secs(1), 1),
        ring_policy: policy,
        ..BellConfig::new()
    };
    let mut controller = BellController::new(
        config,
        &[NINE],
        RecordingLine::starting(false),
        NoopLine::new(),
        MockInstant::secs(0),
    )
    .expect("valid controller");

    controller.step(
        MockInstant::secs(0),
        Some(SyncOutcome::Success(SUNDAY_NINE - 10)),
    );
    for second in 1..=2 {
        controller.step(
            MockInstant::secs(second),
            Some(SyncOutcome::Failure(SyncFailure::Timeout)),
        );
    }
    assert_eq!(
        controller.tracker().current_grade(),
        ConfidenceGrade::Untrusted
    );
    controller
}

#[test]
fn untrusted_clock_never_rings_on_schedule() {
    for policy in [RingPolicy::RefuseUntrusted, RingPolicy::TrustedOnly] {
        let mut controller = untrusted_controller(policy);

        let mut exact_match_seen = false;
        for second in 3..=20 {
            let report = controller.step(MockInstant::secs(second), None);
            exact_match_seen |= report.estimate_secs == SUNDAY_NINE;
            assert_eq!(report.activation, None);
        }

        assert!(exact_match_seen);
        assert!(controller.actuator().line().history.iter().all(|level| !level));
        let withheld = controller
            .telemetry()
            .oldest_first()
            .filter(|record| record.event == TelemetryEventKind::RingWithheld)
            .count();
        assert_eq!(withheld, 1);
    }
}

#[test]
fn trusted_only_policy_withholds_while_degraded() {
    let config = BellConfig {
        ring_policy: RingPolicy::TrustedOnly,
        ..BellConfig::new()
    };
    let mut controller = BellController::<MockInstant, _, _>::new(
        config,
        &[NINE],
        NoopLine::new(),
        NoopLine::new(),
        MockInstant::secs(0),
    )
    .expect("valid controller");

    controller.step(
        MockInstant::secs(0),
        Some(SyncOutcome::Success(SUNDAY_NINE - 5)),
    );
    let report = controller.step(
        MockInstant::secs(5),
        Some(SyncOutcome::Failure(SyncFailure::MalformedResponse)),
    );
    assert_eq!(report.grade, ConfidenceGrade::Degraded);
    assert_eq!(report.matched, MatchOutcome::Withheld(NINE));
}
