use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::time::Duration;

use bell_core::actuator::OutputLine;
use bell_core::clock::{ConnectivityProbe, SyncFailure, TimeProvider};
use bell_core::controller::{BellConfig, BellController};
use bell_core::repl::commands::{
    CommandExecutor, ConsoleError, ConsoleTarget, RingAck, ScheduleListing, SyncAck,
};
use bell_core::repl::grammar::{LinkState, SimCommand};
use bell_core::repl::status::StatusSnapshot;
use bell_core::schedule::DEFAULT_SCHEDULE;
use bell_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord};
use bell_core::time::LocalInstant;
use bell_core::timeapi::{self, WORLD_TIME_API};

/// Sunday 08:59:05 on the controller's clock, one minute before the first ring.
pub const DEFAULT_START_UNIX: u64 = 1_704_628_740;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Nominal,
    Outage,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Nominal => "evidence/emulator-nominal.log",
            TranscriptProfile::Outage => "evidence/emulator-outage.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Nominal => "Bell Controller Emulator nominal transcript",
            TranscriptProfile::Outage => "Bell Controller Emulator network outage transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("nominal") {
            Ok(Self::Nominal)
        } else if tag.eq_ignore_ascii_case("outage") {
            Ok(Self::Outage)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Simulated monotonic clock in microseconds since emulator start.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    pub const START: Self = Self(0);

    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl LocalInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Line that only remembers its level.
#[derive(Debug, Default)]
pub struct SimLine {
    level: bool,
}

impl SimLine {
    pub fn level(&self) -> bool {
        self.level
    }
}

impl OutputLine for SimLine {
    fn drive(&mut self, level: bool) {
        self.level = level;
    }
}

/// Network link toggled by `sim link`.
#[derive(Debug)]
pub struct SimLink {
    up: bool,
}

impl ConnectivityProbe for SimLink {
    fn is_up(&self) -> bool {
        self.up
    }
}

/// Time server answering with the simulated true time.
///
/// Replies go through the same HTTP rendering and parsing as the firmware's
/// coprocessor path.
#[derive(Debug)]
pub struct SimTimeServer {
    start_unix: u64,
    now: SimInstant,
    requests: usize,
}

impl SimTimeServer {
    pub fn new(start_unix: u64) -> Self {
        Self {
            start_unix,
            now: SimInstant::START,
            requests: 0,
        }
    }

    pub fn unix_at(&self, now: SimInstant) -> u64 {
        self.start_unix + now.as_duration().as_secs()
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    fn reply(&self) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n\
             {{\"timezone\":\"America/Sao_Paulo\",\"unixtime\":{},\"utc_offset\":\"-03:00\"}}",
            self.unix_at(self.now)
        )
    }
}

impl TimeProvider for SimTimeServer {
    fn fetch(&mut self, _timeout: Duration) -> Result<u64, SyncFailure> {
        let mut request = String::new();
        timeapi::write_request(&mut request, &WORLD_TIME_API)
            .map_err(|_| SyncFailure::ConnectFailed)?;
        self.requests += 1;

        timeapi::parse_unix_time(&self.reply()).map_err(SyncFailure::from)
    }
}

type SimController = BellController<SimInstant, SimLine, SimLine>;

/// Controller plus the simulated world around it.
pub struct SimConsole {
    controller: SimController,
    server: SimTimeServer,
    link: SimLink,
    now: SimInstant,
    tick_period: Duration,
    drained: EventId,
    events: Vec<String>,
}

impl SimConsole {
    pub fn new(config: BellConfig, start_unix: u64) -> io::Result<Self> {
        let controller = BellController::new(
            config,
            &DEFAULT_SCHEDULE,
            SimLine::default(),
            SimLine::default(),
            SimInstant::START,
        )
        .map_err(|err| io::Error::other(err.to_string()))?;

        let mut console = Self {
            controller,
            server: SimTimeServer::new(start_unix),
            link: SimLink { up: true },
            now: SimInstant::START,
            tick_period: config.tick_period,
            drained: 0,
            events: Vec::new(),
        };
        console.tick();
        Ok(console)
    }

    pub fn now(&self) -> SimInstant {
        self.now
    }

    pub fn controller(&self) -> &SimController {
        &self.controller
    }

    pub fn server(&self) -> &SimTimeServer {
        &self.server
    }

    /// Returns telemetry lines gathered since the last call.
    pub fn take_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events)
    }

    fn tick(&mut self) {
        self.server.now = self.now;
        self.controller.tick(self.now, &mut self.server, &self.link);
        self.drain_telemetry();
    }

    fn advance(&mut self, duration: Duration) {
        let target = self.now + duration;
        while self.now < target {
            let step = self
                .tick_period
                .min(target.saturating_duration_since(self.now));
            self.now = self.now + step;
            self.tick();
        }
    }

    fn drain_telemetry(&mut self) {
        let telemetry = self.controller.telemetry();
        for record in telemetry.since(self.drained) {
            self.events.push(describe_record(record));
        }
        self.drained = telemetry.next_id();
    }
}

impl ConsoleTarget for SimConsole {
    type Instant = SimInstant;

    fn ring(&mut self, now: SimInstant) -> Result<RingAck, ConsoleError> {
        let ack = RingAck::from(self.controller.request_ring(now));
        self.drain_telemetry();
        Ok(ack)
    }

    fn sync(&mut self) -> Result<SyncAck, ConsoleError> {
        self.controller.request_sync();
        Ok(SyncAck::Scheduled)
    }

    fn status(&mut self, now: SimInstant) -> Result<StatusSnapshot, ConsoleError> {
        let mut snapshot = self.controller.snapshot(now);
        snapshot.link_up = Some(self.link.up);
        Ok(snapshot)
    }

    fn schedule(&self) -> ScheduleListing {
        ConsoleTarget::schedule(&self.controller)
    }

    fn simulate(&mut self, command: SimCommand, _now: SimInstant) -> Result<(), ConsoleError> {
        match command {
            SimCommand::Advance(duration) => self.advance(duration),
            SimCommand::Link(state) => self.link.up = state == LinkState::Up,
        }
        Ok(())
    }

    fn simulated(&self) -> bool {
        true
    }
}

pub struct Session {
    executor: CommandExecutor<SimConsole>,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile, start_unix: u64) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        let console = SimConsole::new(BellConfig::new(), start_unix)?;

        let mut session = Self {
            executor: CommandExecutor::new(console),
            transcript,
        };
        let boot = session.executor.target_mut().take_events();
        session.record_output(&boot)?;
        Ok(session)
    }

    pub fn console(&self) -> &SimConsole {
        self.executor.target()
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let now = self.executor.target().now();
        let reply = match self.executor.execute(trimmed, now) {
            Ok(outcome) => {
                let mut text = String::new();
                outcome
                    .write_reply(&mut text)
                    .map_err(|_| io::Error::other("reply formatting failed"))?;
                text
            }
            Err(err) => format!("ERR {err}"),
        };

        let mut lines = self.executor.target_mut().take_events();
        lines.extend(reply.lines().map(str::to_string));
        self.record_output(&lines)?;
        Ok(lines)
    }

    fn elapsed(&self) -> Duration {
        self.executor.target().now().as_duration()
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let elapsed = self.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn describe_record(record: &TelemetryRecord<SimInstant>) -> String {
    let mut line = String::new();
    // Writing into a String cannot fail.
    let _ = write_record(&mut line, record);
    line
}

fn write_record(line: &mut String, record: &TelemetryRecord<SimInstant>) -> std::fmt::Result {
    write!(line, "#{} {}", record.id, record.event)?;
    match record.details {
        TelemetryPayload::None => {}
        TelemetryPayload::Sync(sync) => {
            write!(
                line,
                " estimate={} failures={}",
                sync.estimate_secs, sync.consecutive_failures
            )?;
            if let Some(correction) = sync.correction_secs {
                write!(line, " correction={correction:+}s")?;
            }
        }
        TelemetryPayload::Grade(grade) => write!(line, " {} -> {}", grade.from, grade.to)?,
        TelemetryPayload::Ring(ring) => {
            write!(line, " grade={}", ring.grade)?;
            if let Some(entry) = ring.entry {
                write!(line, " entry={entry}")?;
            }
            if let Some(held) = ring.held_for {
                write!(line, " held={}ms", held.as_millis())?;
            }
        }
    }
    Ok(())
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since boot"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>9} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bell_core::clock::ConfidenceGrade;

    fn console() -> SimConsole {
        SimConsole::new(BellConfig::new(), DEFAULT_START_UNIX).expect("console starts")
    }

    #[test]
    fn boot_tick_syncs_from_simulated_server() {
        let mut console = console();
        assert_eq!(console.server().requests(), 1);
        assert_eq!(
            console.controller().tracker().current_grade(),
            ConfidenceGrade::Trusted
        );
        let events = console.take_events();
        assert!(events[0].contains("sync-succeeded"));
    }

    #[test]
    fn advancing_past_nine_rings_once() {
        let mut console = console();
        console.take_events();

        console
            .simulate(SimCommand::Advance(Duration::from_secs(70)), console.now())
            .expect("advance");
        let events = console.take_events();
        let started = events
            .iter()
            .filter(|line| line.contains("ring-started schedule"))
            .count();
        let released = events
            .iter()
            .filter(|line| line.contains("ring-released"))
            .count();
        assert_eq!((started, released), (1, 1));
        assert_eq!(console.now().as_duration(), Duration::from_secs(70));
    }

    #[test]
    fn link_down_degrades_on_requested_syncs() {
        let mut console = console();
        console
            .simulate(SimCommand::Link(LinkState::Down), console.now())
            .expect("link down");

        for _ in 0..8 {
            console.sync().expect("sync queued");
            console
                .simulate(SimCommand::Advance(Duration::from_millis(50)), console.now())
                .expect("advance");
        }

        assert_eq!(console.server().requests(), 1);
        let snapshot = console.status(console.now()).expect("status");
        assert_eq!(snapshot.clock.grade, ConfidenceGrade::Untrusted);
        assert_eq!(snapshot.link_up, Some(false));
        assert_eq!(snapshot.clock.consecutive_failures, 8);
    }

    #[test]
    fn server_reply_parses_through_time_api() {
        let mut server = SimTimeServer::new(1_000);
        server.now = SimInstant::START + Duration::from_millis(2_500);
        assert_eq!(server.fetch(Duration::from_secs(1)), Ok(1_002));
    }

    #[test]
    fn profiles_parse_case_insensitively() {
        assert_eq!(
            TranscriptProfile::from_tag("OUTAGE"),
            Ok(TranscriptProfile::Outage)
        );
        assert!(TranscriptProfile::from_tag("reboot").is_err());
    }
}
