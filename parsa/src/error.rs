//! Error types shared by the whole toolchain. Every error detected while
//! reading some input carries a [Diagnostic]: the location, the raw message,
//! and (when available) the text of the offending line so the rendered form
//! can point a caret at the column.

use crate::input::{Input, InputLocation};
use std::fmt;
use std::io;
use thiserror::Error;

/// Location, message and source-line context for an input-anchored error.
///
/// The rendered form follows the classic compiler shape:
/// ```text
/// grammar.txt:3: error: unexpected token "q"
/// let q = ;
/// ----^
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    location: InputLocation,
    message: String,
    source_line: Option<String>,
}

impl Diagnostic {
    pub fn new(location: InputLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            source_line: None,
        }
    }

    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }

    /// Captures the current location and line of `input` together with a
    /// message.
    pub fn from_input(input: &mut dyn Input, message: impl Into<String>) -> Self {
        let location = input.location();
        let source_line = input.current_line().ok();
        Self {
            location,
            message: message.into(),
            source_line,
        }
    }

    pub fn location(&self) -> &InputLocation {
        &self.location
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: error: {}", self.location, self.message)?;
        if let Some(line) = &self.source_line {
            writeln!(f)?;
            writeln!(f, "{line}")?;
            let mut pointer = String::new();
            for c in line.chars().take(self.location.column() as usize - 1) {
                // a tab renders 8 columns wide
                if c == '\t' {
                    pointer.push_str("--------");
                } else {
                    pointer.push('-');
                }
            }
            pointer.push('^');
            f.write_str(&pointer)?;
        }
        Ok(())
    }
}

/// Everything that can go wrong while compiling grammars, building tables,
/// scanning or parsing. Construction errors surface synchronously; scan and
/// parse errors are either raised on first occurrence or collected into an
/// error list when recovery is enabled.
#[derive(Debug, Error)]
pub enum ParserError {
    /// A byte no token type matches.
    #[error("{0}")]
    UnexpectedCharacter(Diagnostic),
    /// The parser's lookahead does not match what the table allows.
    #[error("{0}")]
    UnexpectedToken(Diagnostic),
    /// The parser expected more input but the scanner ran out of tokens.
    #[error("{0}")]
    UnexpectedEndOfInput(Diagnostic),
    /// The LL(1) driver accepted the root but tokens remain.
    #[error("{0}")]
    JunkAfterEnd(Diagnostic),
    /// A grammar file refers to a token or non-terminal that was never
    /// declared.
    #[error("{0}")]
    UndeclaredName(Diagnostic),
    /// A non-terminal id was requested for a name that was never declared
    /// (programmatic grammar construction; the grammar-file loader anchors
    /// the same condition to a location as [ParserError::UndeclaredName]).
    #[error("<{0}> is not defined")]
    UndeclaredNonTerminal(String),
    /// The same non-terminal name was declared twice.
    #[error("<{0}> is already defined")]
    DuplicateNonTerminal(String),
    /// A grammar file declares the same non-terminal name twice where that
    /// is not allowed, or is otherwise malformed.
    #[error("{0}")]
    MalformedGrammar(Diagnostic),
    /// The SLR(1) builder hit an unresolvable conflict (halt/reduce, or
    /// shift/shift on the end column).
    #[error("invalid grammar: {0}")]
    InvalidGrammar(String),
    /// A serialized table buffer failed validation while loading.
    #[error("corrupt table buffer: {0}")]
    CorruptBuffer(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A diagnostic anchored at `location` (usually a token's own location),
/// with the source line attached when the input cursor is still on that
/// line.
fn diagnostic_at(input: &mut dyn Input, location: InputLocation, message: String) -> Diagnostic {
    let mut diagnostic = Diagnostic::new(location, message);
    if diagnostic.location().line() == input.location().line() {
        if let Ok(line) = input.current_line() {
            diagnostic = diagnostic.with_source_line(line);
        }
    }
    diagnostic
}

impl ParserError {
    pub(crate) fn unexpected_character(input: &mut dyn Input, byte: u8) -> Self {
        let printable = (byte as char).escape_default();
        Self::UnexpectedCharacter(Diagnostic::from_input(
            input,
            format!("unexpected character '{printable}'"),
        ))
    }

    pub(crate) fn unexpected_token(
        input: &mut dyn Input,
        location: InputLocation,
        lexeme: &str,
    ) -> Self {
        Self::UnexpectedToken(diagnostic_at(
            input,
            location,
            format!("unexpected token \"{lexeme}\""),
        ))
    }

    pub(crate) fn unexpected_end_of_input(input: &mut dyn Input) -> Self {
        Self::UnexpectedEndOfInput(Diagnostic::from_input(input, "unexpected end of input"))
    }

    pub(crate) fn junk_after_end(
        input: &mut dyn Input,
        location: InputLocation,
        lexeme: &str,
    ) -> Self {
        Self::JunkAfterEnd(diagnostic_at(
            input,
            location,
            format!("junk after the end of the input: \"{lexeme}\""),
        ))
    }

    /// The message without the location prefix and source-line rendering.
    pub fn raw_message(&self) -> String {
        match self {
            Self::UnexpectedCharacter(d)
            | Self::UnexpectedToken(d)
            | Self::UnexpectedEndOfInput(d)
            | Self::JunkAfterEnd(d)
            | Self::UndeclaredName(d)
            | Self::MalformedGrammar(d) => d.message().to_string(),
            other => other.to_string(),
        }
    }

    /// The location the error was detected at, for errors that carry one.
    pub fn location(&self) -> Option<&InputLocation> {
        match self {
            Self::UnexpectedCharacter(d)
            | Self::UnexpectedToken(d)
            | Self::UnexpectedEndOfInput(d)
            | Self::JunkAfterEnd(d)
            | Self::UndeclaredName(d)
            | Self::MalformedGrammar(d) => Some(d.location()),
            Self::UndeclaredNonTerminal(_)
            | Self::DuplicateNonTerminal(_)
            | Self::InvalidGrammar(_)
            | Self::CorruptBuffer(_)
            | Self::Io(_) => None,
        }
    }
}
