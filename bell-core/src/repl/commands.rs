//! Console command dispatcher.
//!
//! Parsed commands are handed to a [`ConsoleTarget`]. On the host the target
//! is the controller itself; the firmware console forwards requests to the
//! tick task through a channel and reads status from shared cells.

use core::fmt;

use crate::actuator::{Activation, OutputLine};
use crate::controller::BellController;
use crate::schedule::{MAX_SCHEDULE_ENTRIES, ScheduleEntry};
use crate::time::LocalInstant;

use super::catalog::{self, CommandSpec};
use super::grammar::{self, Command, LinkState, SimCommand};
use super::status::{StatusFormatter, StatusSnapshot};

/// Schedule as reported by the `schedule` command.
pub type ScheduleListing = heapless::Vec<ScheduleEntry, MAX_SCHEDULE_ENTRIES>;

/// Acknowledgement for a `ring` request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RingAck {
    Started,
    /// A ring was already in progress; nothing changed.
    AlreadyRinging,
    /// Handed to the tick task; the result is logged there.
    Queued,
}

impl From<Activation> for RingAck {
    fn from(activation: Activation) -> Self {
        match activation {
            Activation::Started => RingAck::Started,
            Activation::IgnoredActive => RingAck::AlreadyRinging,
        }
    }
}

/// Acknowledgement for a `sync` request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncAck {
    /// The next tick will attempt a sync.
    Scheduled,
    Queued,
}

/// Failures reported by a [`ConsoleTarget`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// The command is not available on this platform.
    Unsupported(&'static str),
    /// The request queue to the tick task is full.
    Busy,
    /// No status has been published yet.
    Unavailable,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Unsupported(command) => write!(f, "`{command}` is not available here"),
            ConsoleError::Busy => f.write_str("controller busy, try again"),
            ConsoleError::Unavailable => f.write_str("status not available yet"),
        }
    }
}

/// Operations the console can request from the platform.
pub trait ConsoleTarget {
    type Instant: Copy;

    /// Requests a manual ring.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError`] when the request cannot be delivered.
    fn ring(&mut self, now: Self::Instant) -> Result<RingAck, ConsoleError>;

    /// Requests a sync on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError`] when the request cannot be delivered.
    fn sync(&mut self) -> Result<SyncAck, ConsoleError>;

    /// Captures the current status.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Unavailable`] before any status exists.
    fn status(&mut self, now: Self::Instant) -> Result<StatusSnapshot, ConsoleError>;

    /// Lists the loaded schedule.
    fn schedule(&self) -> ScheduleListing;

    /// Applies an emulator-only command.
    ///
    /// # Errors
    ///
    /// Hardware targets report [`ConsoleError::Unsupported`].
    fn simulate(&mut self, command: SimCommand, now: Self::Instant) -> Result<(), ConsoleError> {
        let _ = (command, now);
        Err(ConsoleError::Unsupported("sim"))
    }

    /// Whether `sim` commands are listed by `help`.
    fn simulated(&self) -> bool {
        false
    }
}

impl<I, R, L, const ENTRIES: usize> ConsoleTarget for BellController<I, R, L, ENTRIES>
where
    I: LocalInstant,
    R: OutputLine,
    L: OutputLine,
{
    type Instant = I;

    fn ring(&mut self, now: I) -> Result<RingAck, ConsoleError> {
        Ok(self.request_ring(now).into())
    }

    fn sync(&mut self) -> Result<SyncAck, ConsoleError> {
        self.request_sync();
        Ok(SyncAck::Scheduled)
    }

    fn status(&mut self, now: I) -> Result<StatusSnapshot, ConsoleError> {
        Ok(self.snapshot(now))
    }

    fn schedule(&self) -> ScheduleListing {
        let mut listing = ScheduleListing::new();
        for entry in BellController::schedule(self) {
            if listing.push(*entry).is_err() {
                break;
            }
        }
        listing
    }
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Ring(RingAck),
    Sync(SyncAck),
    Status(StatusSnapshot),
    Schedule(ScheduleListing),
    Help {
        topic: Option<&'static CommandSpec>,
        include_simulation: bool,
    },
    Sim(SimCommand),
}

impl CommandOutcome {
    /// Renders the console reply, one line per item.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_reply<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match self {
            CommandOutcome::Ring(RingAck::Started) => writer.write_str("ringing\n"),
            CommandOutcome::Ring(RingAck::AlreadyRinging) => writer.write_str("already ringing\n"),
            CommandOutcome::Ring(RingAck::Queued) => writer.write_str("ring queued\n"),
            CommandOutcome::Sync(SyncAck::Scheduled) => writer.write_str("sync scheduled\n"),
            CommandOutcome::Sync(SyncAck::Queued) => writer.write_str("sync queued\n"),
            CommandOutcome::Status(snapshot) => {
                let formatter = StatusFormatter::new(snapshot);
                formatter.write_clock_line(writer)?;
                writer.write_char('\n')?;
                formatter.write_relay_line(writer)?;
                writer.write_char('\n')?;
                formatter.write_led_line(writer)?;
                writer.write_char('\n')
            }
            CommandOutcome::Schedule(entries) => {
                if entries.is_empty() {
                    return writer.write_str("schedule empty\n");
                }
                for (index, entry) in entries.iter().enumerate() {
                    writeln!(writer, "{index}: {entry}")?;
                }
                Ok(())
            }
            CommandOutcome::Help {
                topic,
                include_simulation,
            } => catalog::write_help(writer, *topic, *include_simulation),
            CommandOutcome::Sim(SimCommand::Advance(duration)) => {
                writeln!(writer, "advanced {}ms", duration.as_millis())
            }
            CommandOutcome::Sim(SimCommand::Link(LinkState::Up)) => writer.write_str("link up\n"),
            CommandOutcome::Sim(SimCommand::Link(LinkState::Down)) => {
                writer.write_str("link down\n")
            }
        }
    }
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    UnknownTopic(&'a str),
    Console(ConsoleError),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<ConsoleError> for CommandError<'_> {
    fn from(error: ConsoleError) -> Self {
        Self::Console(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => error.fmt(f),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
            CommandError::Console(error) => error.fmt(f),
        }
    }
}

/// Dispatches console commands into a [`ConsoleTarget`].
pub struct CommandExecutor<T> {
    target: T,
}

impl<T> CommandExecutor<T> {
    pub const fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T> CommandExecutor<T>
where
    T: ConsoleTarget,
{
    /// Parses and executes a console line.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] for malformed lines, unknown help topics and
    /// requests the target refuses.
    pub fn execute<'a>(
        &mut self,
        line: &'a str,
        now: T::Instant,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.dispatch(command, now)
    }

    fn dispatch<'a>(
        &mut self,
        command: Command<'a>,
        now: T::Instant,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let outcome = match command {
            Command::Ring => CommandOutcome::Ring(self.target.ring(now)?),
            Command::Sync => CommandOutcome::Sync(self.target.sync()?),
            Command::Status => CommandOutcome::Status(self.target.status(now)?),
            Command::Schedule => CommandOutcome::Schedule(self.target.schedule()),
            Command::Help(help) => {
                let include_simulation = self.target.simulated();
                let topic = match help.topic {
                    None => None,
                    Some(name) => Some(
                        catalog::find(name)
                            .filter(|spec| include_simulation || !spec.simulation_only)
                            .ok_or(CommandError::UnknownTopic(name))?,
                    ),
                };
                CommandOutcome::Help {
                    topic,
                    include_simulation,
                }
            }
            Command::Sim(sim) => {
                self.target.simulate(sim, now)?;
                CommandOutcome::Sim(sim)
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::NoopLine;
    use crate::clock::ConfidenceGrade;
    use crate::controller::BellConfig;
    use crate::schedule::DEFAULT_SCHEDULE;
    use crate::time::Weekday;
    use core::ops::Add;
    use core::time::Duration;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + u64::try_from(rhs.as_millis()).expect("duration fits"))
        }
    }

    impl LocalInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    type Controller = BellController<MockInstant, NoopLine, NoopLine>;

    fn executor() -> CommandExecutor<Controller> {
        let controller = BellController::new(
            BellConfig::new(),
            &DEFAULT_SCHEDULE,
            NoopLine::new(),
            NoopLine::new(),
            MockInstant(0),
        )
        .expect("valid controller");
        CommandExecutor::new(controller)
    }

    #[test]
    fn ring_reports_busy_relay() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("ring", MockInstant(0)),
            Ok(CommandOutcome::Ring(RingAck::Started))
        );
        assert_eq!(
            executor.execute("ring", MockInstant(10)),
            Ok(CommandOutcome::Ring(RingAck::AlreadyRinging))
        );
    }

    #[test]
    fn sync_marks_tracker_due() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("sync", MockInstant(0)),
            Ok(CommandOutcome::Sync(SyncAck::Scheduled))
        );
        assert!(executor.target().sync_due(MockInstant(0)));
    }

    #[test]
    fn status_reports_untrusted_before_first_sync() {
        let mut executor = executor();
        let outcome = executor
            .execute("status", MockInstant(0))
            .expect("status should succeed");
        match outcome {
            CommandOutcome::Status(snapshot) => {
                assert_eq!(snapshot.clock.grade, ConfidenceGrade::Untrusted);
                assert!(!snapshot.relay.active);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn schedule_lists_entries_in_order() {
        let mut executor = executor();
        let outcome = executor
            .execute("schedule", MockInstant(0))
            .expect("schedule should succeed");

        let mut reply = heapless::String::<256>::new();
        outcome.write_reply(&mut reply).expect("reply fits");
        assert!(reply.starts_with("0: Sun 09:00:00\n"));
        assert!(reply.ends_with("4: Wed 19:30:00\n"));

        match outcome {
            CommandOutcome::Schedule(entries) => {
                assert_eq!(entries.len(), 5);
                assert_eq!(entries[4].day, Weekday::Wednesday);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn sim_is_unsupported_on_controller() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("sim link down", MockInstant(0)),
            Err(CommandError::Console(ConsoleError::Unsupported("sim")))
        );
    }

    #[test]
    fn help_hides_sim_topic_on_hardware() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("help sim", MockInstant(0)),
            Err(CommandError::UnknownTopic("sim"))
        );
        assert_eq!(
            executor.execute("help ring", MockInstant(0)),
            Ok(CommandOutcome::Help {
                topic: catalog::find("ring"),
                include_simulation: false,
            })
        );
    }

    #[test]
    fn parse_error_is_returned() {
        let mut executor = executor();
        let error = executor
            .execute("ring loudly", MockInstant(0))
            .expect_err("parse should fail");
        assert!(matches!(error, CommandError::Parse(_)));
    }
}
