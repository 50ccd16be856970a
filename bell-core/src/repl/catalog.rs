//! Console command catalog.
//!
//! The parser walks these grammar nodes and `help` renders the same entries,
//! so keywords and usage text cannot drift apart.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Ring,
    Sync,
    Status,
    Schedule,
    Help,
    Sim,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubcommandTag {
    SimAdvance,
    SimLink,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceTag {
    LinkUp,
    LinkDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSpec {
    Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub usage: &'static str,
    pub summary: &'static str,
    /// Only meaningful on the host emulator.
    pub simulation_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    /// One keyword out of a fixed set is required.
    Choice(&'static [ChoiceBranch]),
    Subcommands(&'static [SubcommandBranch]),
    Value {
        value: ValueSpec,
        next: &'static Node,
    },
    /// Optional free-form topic word.
    Topic { next: &'static Node },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceBranch {
    pub keyword: &'static str,
    pub tag: ChoiceTag,
    pub next: &'static Node,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubcommandBranch {
    pub name: &'static str,
    pub tag: SubcommandTag,
    pub grammar: &'static Node,
}

const END: Node = Node::End;

const LINK_CHOICES: [ChoiceBranch; 2] = [
    ChoiceBranch {
        keyword: "up",
        tag: ChoiceTag::LinkUp,
        next: &END,
    },
    ChoiceBranch {
        keyword: "down",
        tag: ChoiceTag::LinkDown,
        next: &END,
    },
];

const SIM_ADVANCE_GRAMMAR: Node = Node::Value {
    value: ValueSpec::Duration,
    next: &END,
};

const SIM_LINK_GRAMMAR: Node = Node::Choice(&LINK_CHOICES);

const SIM_SUBCOMMANDS: [SubcommandBranch; 2] = [
    SubcommandBranch {
        name: "advance",
        tag: SubcommandTag::SimAdvance,
        grammar: &SIM_ADVANCE_GRAMMAR,
    },
    SubcommandBranch {
        name: "link",
        tag: SubcommandTag::SimLink,
        grammar: &SIM_LINK_GRAMMAR,
    },
];

const SIM_GRAMMAR: Node = Node::Subcommands(&SIM_SUBCOMMANDS);

const HELP_GRAMMAR: Node = Node::Topic { next: &END };

const COMMANDS: [CommandSpec; 6] = [
    CommandSpec {
        name: "ring",
        tag: CommandTag::Ring,
        grammar: &END,
        usage: "ring",
        summary: "ring the bell now, whatever the clock grade",
        simulation_only: false,
    },
    CommandSpec {
        name: "sync",
        tag: CommandTag::Sync,
        grammar: &END,
        usage: "sync",
        summary: "query the time server on the next tick",
        simulation_only: false,
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        usage: "status",
        summary: "show clock grade, relay and LED state",
        simulation_only: false,
    },
    CommandSpec {
        name: "schedule",
        tag: CommandTag::Schedule,
        grammar: &END,
        usage: "schedule",
        summary: "list the weekly ring times",
        simulation_only: false,
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        usage: "help [command]",
        summary: "describe commands",
        simulation_only: false,
    },
    CommandSpec {
        name: "sim",
        tag: CommandTag::Sim,
        grammar: &SIM_GRAMMAR,
        usage: "sim advance <duration> | sim link <up|down>",
        summary: "drive the simulated clock and network",
        simulation_only: true,
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Ring => &COMMANDS[0],
        CommandTag::Sync => &COMMANDS[1],
        CommandTag::Status => &COMMANDS[2],
        CommandTag::Schedule => &COMMANDS[3],
        CommandTag::Help => &COMMANDS[4],
        CommandTag::Sim => &COMMANDS[5],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Writes `usage - summary` lines for one command or the whole catalog.
///
/// Simulation commands are listed only when `include_simulation` is set.
///
/// # Errors
///
/// Propagates writer failures.
pub fn write_help<W: fmt::Write>(
    writer: &mut W,
    topic: Option<&CommandSpec>,
    include_simulation: bool,
) -> fmt::Result {
    if let Some(spec) = topic {
        return writeln!(writer, "{} - {}", spec.usage, spec.summary);
    }

    for spec in COMMANDS
        .iter()
        .filter(|spec| include_simulation || !spec.simulation_only)
    {
        writeln!(writer, "{} - {}", spec.usage, spec.summary)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_tag_matches_catalog() {
        for spec in commands() {
            assert_eq!(command(spec.tag), spec);
        }
        assert_eq!(find("STATUS").map(|spec| spec.tag), Some(CommandTag::Status));
        assert!(find("reboot").is_none());
    }

    #[test]
    fn help_hides_simulation_commands_on_hardware() {
        let mut text = heapless::String::<512>::new();
        write_help(&mut text, None, false).expect("help fits");
        assert!(text.contains("ring - ring the bell now"));
        assert!(!text.contains("sim advance"));

        text.clear();
        write_help(&mut text, None, true).expect("help fits");
        assert!(text.contains("sim advance <duration>"));
    }
}
