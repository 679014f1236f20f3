//! # Scanner
//! [ScannerAutomata] wraps a [Dfa] with per-state token ids and a set of
//! ignored token ids, and drives longest-match tokenization over an [Input].
//! [Scanner] pairs a shared automaton with one input stream; the automaton
//! is behind an [Rc] so any number of scanners can run on the same compiled
//! tables.
//!
//! Tokenization is the classic maximal-munch loop: keep consuming bytes and
//! following transitions, remembering the last accepting state passed, and
//! when the automaton gets stuck rewind the input to just after the longest
//! accepted prefix. Ignored tokens (whitespace, comments) are recognized,
//! discarded and the loop restarts; it always terminates because every
//! recognized token consumes at least one byte.
//!
//! ```
//! use std::rc::Rc;
//! use parsa::grammar::{Grammar, ScannerGrammar, TokenType};
//! use parsa::input::MemoryInput;
//! use parsa::scanner::Scanner;
//!
//! let mut grammar = Grammar::new();
//! let mut tokens = ScannerGrammar::new();
//! tokens.add_token_type(TokenType::new("NUM", "\\d+").unwrap());
//! let mut ws = TokenType::new("WS", "\\s+").unwrap();
//! ws.set_ignored(true);
//! tokens.add_token_type(ws);
//!
//! let automata = Rc::new(tokens.compile(&mut grammar));
//! let mut scanner = Scanner::new(automata, Box::new(MemoryInput::new("12 7", "doc")));
//! assert_eq!(scanner.next_token().unwrap().unwrap().lexeme(), "12");
//! assert_eq!(scanner.next_token().unwrap().unwrap().lexeme(), "7");
//! assert!(scanner.next_token().unwrap().is_none());
//! ```

use crate::dfa::Dfa;
use crate::error::ParserError;
use crate::grammar::TokenId;
use crate::input::Input;
use crate::parser::tree::Token;
use std::collections::BTreeSet;
use std::rc::Rc;

/// A tokenizing automaton: a DFA whose accepting states are annotated with
/// the token type they recognize, plus the ids of token types that are
/// discarded after recognition. Immutable once built; see
/// [ScannerGrammar::compile](crate::grammar::ScannerGrammar::compile).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannerAutomata {
    dfa: Dfa,
    state_tokens: Vec<Option<TokenId>>,
    ignored_tokens: BTreeSet<TokenId>,
}

impl ScannerAutomata {
    pub(crate) fn from_parts(
        dfa: Dfa,
        state_tokens: Vec<Option<TokenId>>,
        ignored_tokens: BTreeSet<TokenId>,
    ) -> Self {
        debug_assert_eq!(dfa.num_states(), state_tokens.len());
        Self {
            dfa,
            state_tokens,
            ignored_tokens,
        }
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    /// The token id recognized in `state`, if it is an accepting state.
    pub fn state_token(&self, state: usize) -> Option<TokenId> {
        self.state_tokens[state]
    }

    pub fn ignored_tokens(&self) -> &BTreeSet<TokenId> {
        &self.ignored_tokens
    }

    /// Produces the next token from `input`, or `None` at a clean end of
    /// stream. Longest match wins; the token id attached to the accepting
    /// state already encodes declaration priority for length ties. A byte
    /// sequence with no accepting prefix is a lexical error pointing at the
    /// position the attempt started from.
    pub fn next_token(&self, input: &mut dyn Input) -> Result<Option<Token>, ParserError> {
        loop {
            let location = input.location();
            input.mark();

            let mut state = 0usize;
            let mut buffer: Vec<u8> = Vec::new();
            let mut recognized: Option<(TokenId, u32)> = None;
            let mut consumed: u32 = 0;
            let mut last_byte;

            loop {
                last_byte = input.read_byte()?;
                consumed += 1;
                buffer.push(last_byte);

                match self.dfa.transition(state, last_byte) {
                    None => break,
                    Some(next) => {
                        state = next;
                        if self.dfa.is_accepting(state) {
                            let token = self.state_tokens[state]
                                .expect("accepting scanner state without a token id");
                            recognized = Some((token, consumed));
                        }
                    }
                }
            }

            if last_byte == 0 && consumed == 1 {
                // end of stream without reading anything
                return Ok(None);
            }

            let Some((token_id, token_len)) = recognized else {
                input.rewind(0)?;
                return Err(ParserError::unexpected_character(input, last_byte));
            };

            input.rewind(token_len)?;

            if self.ignored_tokens.contains(&token_id) {
                continue;
            }

            buffer.truncate(token_len as usize);
            let lexeme = String::from_utf8_lossy(&buffer).into_owned();
            return Ok(Some(Token::new(token_id, lexeme, location)));
        }
    }
}

/// One tokenization run: a shared [ScannerAutomata] plus the input it is
/// consuming. The parser drivers pull tokens from here and reach through to
/// the input for error locations.
pub struct Scanner {
    automata: Rc<ScannerAutomata>,
    input: Box<dyn Input>,
}

impl Scanner {
    pub fn new(automata: Rc<ScannerAutomata>, input: Box<dyn Input>) -> Self {
        Self { automata, input }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, ParserError> {
        self.automata.next_token(&mut *self.input)
    }

    pub fn automata(&self) -> &Rc<ScannerAutomata> {
        &self.automata
    }

    pub fn input(&self) -> &dyn Input {
        &*self.input
    }

    pub fn input_mut(&mut self) -> &mut dyn Input {
        &mut *self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, ScannerGrammar, TokenType};
    use crate::input::MemoryInput;

    fn scanner_for(rules: &[(&str, &str, bool)], input: &str) -> (Grammar, Scanner) {
        let mut grammar = Grammar::new();
        let mut tokens = ScannerGrammar::new();
        for &(name, pattern, ignored) in rules {
            let mut token_type = TokenType::new(name, pattern).unwrap();
            token_type.set_ignored(ignored);
            tokens.add_token_type(token_type);
        }
        let automata = Rc::new(tokens.compile(&mut grammar));
        let scanner = Scanner::new(automata, Box::new(MemoryInput::new(input, "test")));
        (grammar, scanner)
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        let (_, mut scanner) = scanner_for(&[("A", "a", false)], "");
        assert!(scanner.next_token().unwrap().is_none());
    }

    #[test]
    fn priority_breaks_length_ties() {
        let (grammar, mut scanner) =
            scanner_for(&[("IF", "if", false), ("ID", "[a-z]+", false)], "if");
        let token = scanner.next_token().unwrap().unwrap();
        assert_eq!(token.id(), grammar.token_id("IF").unwrap());
    }

    #[test]
    fn longest_match_beats_priority() {
        let (grammar, mut scanner) =
            scanner_for(&[("IF", "if", false), ("ID", "[a-z]+", false)], "ifx");
        let token = scanner.next_token().unwrap().unwrap();
        assert_eq!(token.id(), grammar.token_id("ID").unwrap());
        assert_eq!(token.lexeme(), "ifx");
    }

    #[test]
    fn ignored_tokens_are_skipped() {
        let (grammar, mut scanner) = scanner_for(
            &[("WORD", "\\w+", false), ("WS", "\\s+", true)],
            "  hej  du ",
        );
        let word = grammar.token_id("WORD").unwrap();
        let first = scanner.next_token().unwrap().unwrap();
        assert_eq!((first.id(), first.lexeme()), (word, "hej"));
        let location = first.location().clone();
        assert_eq!((location.line(), location.column()), (1, 3));
        let second = scanner.next_token().unwrap().unwrap();
        assert_eq!(second.lexeme(), "du");
        assert!(scanner.next_token().unwrap().is_none());
    }

    #[test]
    fn lexical_error_points_at_token_start() {
        let (_, mut scanner) = scanner_for(&[("A", "a+", false)], "aa#");
        scanner.next_token().unwrap().unwrap();
        let error = scanner.next_token().unwrap_err();
        let location = error.location().unwrap();
        assert_eq!((location.line(), location.column()), (1, 3));
    }
}
