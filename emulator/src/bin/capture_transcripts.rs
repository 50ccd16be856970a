use std::io;

use bell_core::clock::ConfidenceGrade;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{DEFAULT_START_UNIX, Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Nominal)?;
    record_profile(TranscriptProfile::Outage)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile, DEFAULT_START_UNIX)?;
    match profile {
        TranscriptProfile::Nominal => record_nominal(&mut session),
        TranscriptProfile::Outage => record_outage(&mut session),
    }
}

fn record_nominal(session: &mut Session) -> io::Result<()> {
    for command in [
        "help",
        "status",
        "schedule",
        "sim advance 1m",
        "status",
        "ring",
        "ring",
        "sim advance 6s",
    ] {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}

fn record_outage(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("sim link down")?;
    for _ in 0..16 {
        let grade = session.console().controller().tracker().current_grade();
        if grade == ConfidenceGrade::Untrusted {
            break;
        }
        let _ = session.handle_command("sync")?;
        let _ = session.handle_command("sim advance 1s")?;
    }

    for command in [
        "status",
        "sim advance 1m",
        "sim link up",
        "sync",
        "sim advance 1s",
        "status",
    ] {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}
