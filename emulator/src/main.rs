mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use crossterm::style::Stylize;
use crossterm::tty::IsTty;

use session::{DEFAULT_START_UNIX, Session, TranscriptProfile};

const USAGE: &str = "Usage: bell-emulator [--profile <nominal|outage>] [--start <unix-seconds>]";

#[derive(Debug, PartialEq, Eq)]
struct Options {
    profile: TranscriptProfile,
    start_unix: u64,
}

fn main() -> io::Result<()> {
    let options = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let styled = stdout.is_tty();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile, options.start_unix)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Bell Controller Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            if styled {
                writeln!(writer, "{}", highlight(&response))?;
            } else {
                writeln!(writer, "{response}")?;
            }
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn highlight(line: &str) -> String {
    if line.starts_with("ERR ") {
        line.red().to_string()
    } else if line.contains("ring-started") || line.contains("ring-released") {
        line.yellow().to_string()
    } else if line.contains("sync-failed") || line.contains("ring-withheld") {
        line.magenta().to_string()
    } else {
        line.to_string()
    }
}

fn parse_args<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options {
        profile: TranscriptProfile::Nominal,
        start_unix: DEFAULT_START_UNIX,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };

        match flag.as_str() {
            "--profile" => {
                let value = inline
                    .or_else(|| args.next())
                    .ok_or("Expected value after --profile")?;
                options.profile = TranscriptProfile::from_tag(&value)?;
            }
            "--start" => {
                let value = inline
                    .or_else(|| args.next())
                    .ok_or("Expected value after --start")?;
                options.start_unix = value
                    .parse()
                    .map_err(|_| format!("Invalid start time `{value}`"))?;
            }
            other => options.profile = TranscriptProfile::from_tag(other)?,
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_string()).collect()
    }

    #[test]
    fn defaults_to_nominal_profile() {
        let options = parse_args(Vec::new()).expect("defaults");
        assert_eq!(options.profile, TranscriptProfile::Nominal);
        assert_eq!(options.start_unix, DEFAULT_START_UNIX);
    }

    #[test]
    fn accepts_flag_and_inline_forms() {
        let options =
            parse_args(args(&["--profile", "outage", "--start=1700000000"])).expect("parses");
        assert_eq!(options.profile, TranscriptProfile::Outage);
        assert_eq!(options.start_unix, 1_700_000_000);

        let options = parse_args(args(&["--profile=nominal"])).expect("parses");
        assert_eq!(options.profile, TranscriptProfile::Nominal);
    }

    #[test]
    fn positional_profile_is_accepted() {
        let options = parse_args(args(&["outage"])).expect("parses");
        assert_eq!(options.profile, TranscriptProfile::Outage);
    }

    #[test]
    fn rejects_missing_or_bad_values() {
        assert!(parse_args(args(&["--start"])).is_err());
        assert!(parse_args(args(&["--start", "soon"])).is_err());
        assert!(parse_args(args(&["--profile", "reboot"])).is_err());
    }

    #[test]
    fn exit_words_are_case_insensitive() {
        assert!(should_terminate("QUIT"));
        assert!(!should_terminate("ring"));
    }
}
