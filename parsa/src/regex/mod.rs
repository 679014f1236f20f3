//! # Regular expressions
//! Compiles ASCII patterns to minimized [Dfa]s. The pattern language is the
//! classic core: concatenation, alternation `|`, grouping `(…)`, the
//! factors `*`, `+` and `?`, symbol sets `[…]` and negated sets `[^…]`,
//! plus escapes. `\t \n \f \r` name control bytes; `\d \D \w \W \s \S`
//! are the usual digit/word/whitespace classes and their complements
//! within the 7-bit alphabet; `\h`/`\H` are lowercase/uppercase hex
//! digits; any other escaped byte stands for itself. `.` matches any byte
//! in `1..=127`, and a negated set never matches byte 0 either. Inside a
//! set, `x-y` between two plain symbols denotes the inclusive byte range.
//!
//! The compiler is bootstrapped on the toolchain itself: the pattern
//! grammar is an LL(1) grammar whose scanner automata and prediction table
//! are built with the very machinery this crate provides (see
//! [RegexCompiler]). A process-wide compiler instance is kept per thread
//! and built lazily on the first [Regex::compile] call; the compiled
//! tables it holds are shared through non-atomic [Rc](std::rc::Rc) handles,
//! which is why the instance is thread-local rather than global. Tests may
//! construct their own [RegexCompiler] explicitly.
//!
//! ```
//! use parsa::regex::Regex;
//!
//! let number = Regex::compile("\\d+(\\.\\d+)?").unwrap();
//! assert!(number.matches("32"));
//! assert!(number.matches("1.25"));
//! assert!(!number.matches("1."));
//! ```

mod compiler;
mod grammar;

pub use compiler::RegexCompiler;

use crate::dfa::Dfa;
use crate::error::ParserError;
use std::cell::OnceCell;

thread_local! {
    static COMPILER: OnceCell<RegexCompiler> = OnceCell::new();
}

/// A compiled regular expression: a minimized DFA over the 7-bit alphabet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Regex {
    dfa: Dfa,
}

impl Regex {
    /// Compiles `pattern` with the thread's shared [RegexCompiler],
    /// building the compiler first if this is the thread's first pattern.
    pub fn compile(pattern: &str) -> Result<Regex, ParserError> {
        COMPILER.with(|cell| cell.get_or_init(RegexCompiler::new).compile(pattern))
            .map(|dfa| Regex { dfa })
    }

    /// A regex matching exactly the one-byte string `symbol`. Used when
    /// grammars are built programmatically.
    pub fn from_symbol(symbol: u8) -> Regex {
        let mut dfa = Dfa::new(2);
        dfa.set_transition(0, symbol, 1);
        dfa.set_accepting(1);
        Regex { dfa }
    }

    /// Wraps a hand-built automaton as a regex.
    pub(crate) fn from_dfa(dfa: Dfa) -> Regex {
        Regex { dfa }
    }

    /// Whether the whole of `text` is in this regex's language.
    pub fn matches(&self, text: &str) -> bool {
        self.dfa.accept(text.as_bytes())
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }
}
