#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the operator console.
//!
//! `regal` turns a line into a bounded token stream and the parser walks the
//! [`catalog`] grammar over those tokens with `winnow` parsers. Nothing here
//! allocates, so the firmware console and the emulator share the pipeline.

use super::catalog::{
    self, ChoiceBranch, ChoiceTag, CommandTag, Node, SubcommandBranch, SubcommandTag, ValueSpec,
};
use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::error::ErrMode;
use winnow::prelude::*;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Duration literal ending in `ms`, `s`, `m` or `h`.
    #[regex(r"[0-9]+(?:ms|s|m|h)", priority = 2)]
    Duration,
    #[regex(r"[0-9]+")]
    Integer,
    /// Identifier or keyword (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    #[regex(r"-{1,2}[A-Za-z][A-Za-z0-9-]*")]
    Flag,
    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything the grammar does not know.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "line too long: {processed} tokens")
            }
            LexError::Engine => f.write_str("lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: &'a str,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found `{found}` at {}", span.start),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "missing {expected}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "duration out of range at {}", span.start)
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported character `{lexeme}` at {}", span.start)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) if tok.kind != TokenKind::Eol => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: tok.lexeme,
                    span: tok.span.clone(),
                },
                _ => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];
type PResult<'src, T> = Result<T, ErrMode<GrammarError<'src>>>;

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Ring,
    Sync,
    Status,
    Schedule,
    Help(HelpCommand<'a>),
    Sim(SimCommand),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

/// Emulator-only commands steering the simulated world.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimCommand {
    /// Move simulated time forward, ticking the controller on the way.
    Advance(Duration),
    Link(LinkState),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

/// Tokenize the provided line.
///
/// Characters the lexer does not recognise come back as [`TokenKind::Error`]
/// tokens rather than failing the whole line.
///
/// # Errors
///
/// Returns [`LexError`] when the line overflows the token buffer.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        push_token(&mut buffer, record.token, &line[span.clone()], span)?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let span = partial.start..partial.start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, span)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: MAX_TOKENS + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
///
/// # Errors
///
/// Returns [`ParseError`] for unknown characters, keywords or arguments.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let mut input = tokens.as_slice();
    let command = match command().parse_next(&mut input) {
        Ok(command) => command,
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => return Err(ParseError::Grammar(err)),
        Err(ErrMode::Incomplete(_)) => {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "token",
                input.first(),
            )));
        }
    };

    match input.iter().find(|token| token.kind != TokenKind::Eol) {
        Some(token) => Err(ParseError::Grammar(GrammarError::unexpected(
            "end of command",
            Some(token),
        ))),
        None => Ok(command),
    }
}

fn command<'src, 'slice>()
-> impl Parser<Input<'src, 'slice>, Command<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let keyword = expect_kind(TokenKind::Ident, "command").parse_next(input)?;
        let Some(spec) = catalog::find(keyword.lexeme) else {
            return Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command",
                Some(&keyword),
            )));
        };

        let mut state = CommandState::new(spec.tag);
        parse_node(spec.grammar, input, &mut state)?;
        state.finish()
    }
}

fn parse_node<'src>(
    node: &'static Node,
    input: &mut Input<'src, '_>,
    state: &mut CommandState<'src>,
) -> PResult<'src, ()> {
    match node {
        Node::End => Ok(()),
        Node::Choice(choices) => {
            let branch = parse_choice(input, choices)?;
            state.apply_choice(branch.tag);
            parse_node(branch.next, input, state)
        }
        Node::Subcommands(branches) => {
            let branch = parse_subcommand(input, branches)?;
            state.set_subcommand(branch.tag);
            parse_node(branch.grammar, input, state)
        }
        Node::Value { value, next } => {
            match value {
                ValueSpec::Duration => {
                    let token = expect_kind(TokenKind::Duration, "duration").parse_next(input)?;
                    let duration = parse_duration(&token).map_err(ErrMode::Cut)?;
                    state.set_duration(duration);
                }
            }
            parse_node(next, input, state)
        }
        Node::Topic { next } => {
            if let Some((token, rest)) = input
                .split_first()
                .filter(|(token, _)| token.kind == TokenKind::Ident)
            {
                state.set_topic(token.lexeme);
                *input = rest;
            }
            parse_node(next, input, state)
        }
    }
}

fn parse_choice<'src>(
    input: &mut Input<'src, '_>,
    choices: &'static [ChoiceBranch],
) -> PResult<'src, &'static ChoiceBranch> {
    let expected = choices.first().map_or("keyword", |choice| choice.keyword);
    let token = expect_kind(TokenKind::Ident, expected).parse_next(input)?;

    choices
        .iter()
        .find(|choice| choice.keyword.eq_ignore_ascii_case(token.lexeme))
        .ok_or_else(|| ErrMode::Cut(GrammarError::unexpected(expected, Some(&token))))
}

fn parse_subcommand<'src>(
    input: &mut Input<'src, '_>,
    branches: &'static [SubcommandBranch],
) -> PResult<'src, &'static SubcommandBranch> {
    let expected = branches.first().map_or("subcommand", |branch| branch.name);
    let token = expect_kind(TokenKind::Ident, expected).parse_next(input)?;

    branches
        .iter()
        .find(|branch| branch.name.eq_ignore_ascii_case(token.lexeme))
        .ok_or_else(|| ErrMode::Cut(GrammarError::unexpected(expected, Some(&token))))
}

enum CommandState<'a> {
    Ring,
    Sync,
    Status,
    Schedule,
    Help {
        topic: Option<&'a str>,
    },
    Sim {
        subcommand: Option<SubcommandTag>,
        duration: Option<Duration>,
        link: Option<LinkState>,
    },
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::Ring => CommandState::Ring,
            CommandTag::Sync => CommandState::Sync,
            CommandTag::Status => CommandState::Status,
            CommandTag::Schedule => CommandState::Schedule,
            CommandTag::Help => CommandState::Help { topic: None },
            CommandTag::Sim => CommandState::Sim {
                subcommand: None,
                duration: None,
                link: None,
            },
        }
    }

    fn apply_choice(&mut self, tag: ChoiceTag) {
        if let CommandState::Sim { link, .. } = self {
            *link = Some(match tag {
                ChoiceTag::LinkUp => LinkState::Up,
                ChoiceTag::LinkDown => LinkState::Down,
            });
        }
    }

    fn set_subcommand(&mut self, tag: SubcommandTag) {
        if let CommandState::Sim { subcommand, .. } = self {
            *subcommand = Some(tag);
        }
    }

    fn set_duration(&mut self, value: Duration) {
        if let CommandState::Sim { duration, .. } = self {
            *duration = Some(value);
        }
    }

    fn set_topic(&mut self, value: &'a str) {
        if let CommandState::Help { topic } = self {
            *topic = Some(value);
        }
    }

    fn finish(self) -> PResult<'a, Command<'a>> {
        match self {
            CommandState::Ring => Ok(Command::Ring),
            CommandState::Sync => Ok(Command::Sync),
            CommandState::Status => Ok(Command::Status),
            CommandState::Schedule => Ok(Command::Schedule),
            CommandState::Help { topic } => Ok(Command::Help(HelpCommand { topic })),
            CommandState::Sim {
                subcommand: Some(SubcommandTag::SimAdvance),
                duration: Some(duration),
                ..
            } => Ok(Command::Sim(SimCommand::Advance(duration))),
            CommandState::Sim {
                subcommand: Some(SubcommandTag::SimLink),
                link: Some(link),
                ..
            } => Ok(Command::Sim(SimCommand::Link(link))),
            CommandState::Sim { .. } => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "sim argument",
                None,
            ))),
        }
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        other => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            other.map(|(token, _)| token),
        ))),
    }
}

fn parse_duration<'a>(token: &Token<'a>) -> Result<Duration, GrammarError<'a>> {
    let text = token.lexeme;
    let (digits, scale_ms) = if let Some(rest) = text.strip_suffix("ms") {
        (rest, 1)
    } else if let Some(rest) = text.strip_suffix('s') {
        (rest, 1_000)
    } else if let Some(rest) = text.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = text.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        return Err(GrammarError::invalid_duration(token));
    };

    digits
        .parse::<u32>()
        .ok()
        .and_then(|value| u64::from(value).checked_mul(scale_ms))
        .map(Duration::from_millis)
        .ok_or_else(|| GrammarError::invalid_duration(token))
}
