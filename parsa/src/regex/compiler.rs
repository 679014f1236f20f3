//! Pattern compilation: parse the pattern with the bootstrapped grammar,
//! fold the parse tree into an NFA with the regular operations, then
//! ε-eliminate, determinize and minimize. Since a regex has a single accept
//! meaning, minimization may merge accepting states freely.

use crate::dfa::Dfa;
use crate::error::ParserError;
use crate::input::MemoryInput;
use crate::nfa::Nfa;
use crate::parser::tree::{NonTerminal, Token};
use crate::regex::grammar::RegexGrammar;
use crate::scanner::Scanner;
use crate::ALPHABET_SIZE;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// The factor applied to an expression, from the `<Factor>` alternative.
enum Factor {
    Closure,
    OneClosure,
    Optional,
    Bare,
}

/// The pattern compiler: the bootstrapped grammar tables plus the
/// predefined escape classes. One instance per thread is shared through
/// [Regex::compile](crate::regex::Regex::compile); tests can construct
/// their own.
pub struct RegexCompiler {
    grammar: RegexGrammar,
    predefined: HashMap<u8, Vec<u8>>,
}

impl Default for RegexCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexCompiler {
    pub fn new() -> Self {
        Self {
            grammar: RegexGrammar::new(),
            predefined: predefined_sets(),
        }
    }

    /// Compiles `pattern` into a minimized DFA. Errors are scan/parse
    /// errors of the pattern itself, located within the input named
    /// `regex`.
    pub fn compile(&self, pattern: &str) -> Result<Dfa, ParserError> {
        let input = MemoryInput::new(pattern, "regex");
        let mut scanner = Scanner::new(Rc::clone(&self.grammar.scanner), Box::new(input));
        let tree = self.grammar.table.parse(&mut scanner, None)?;
        let root = tree
            .as_nonterminal()
            .expect("the pattern grammar root is a non-terminal");

        let mut nfa = self.regex_automaton(&epsilon_automaton(), root);
        nfa.remove_epsilon_moves();
        nfa.determinize();
        nfa.minimize(true);
        Ok(nfa.to_dfa())
    }

    /// `<Regex> ::= <Expression> <RegexOr> | ε`. `prefix` is the automaton
    /// built so far; the expression is concatenated onto it.
    fn regex_automaton(&self, prefix: &Nfa, nt: &NonTerminal) -> Nfa {
        debug_assert_eq!(nt.id(), self.grammar.regex_id);
        match nt.local_rule() {
            0 => {
                let expression = self.expression_automaton(nt.nonterminal_at(0));
                let (extended, _, _) = Nfa::concat(prefix, &expression);
                self.regex_or_automaton(&extended, nt.nonterminal_at(1))
            }
            _ => prefix.clone(),
        }
    }

    /// `<RegexOr> ::= OR <Regex> | <Regex>`: either an alternation against
    /// a fresh branch, or more concatenation.
    fn regex_or_automaton(&self, prefix: &Nfa, nt: &NonTerminal) -> Nfa {
        debug_assert_eq!(nt.id(), self.grammar.regex_or_id);
        match nt.local_rule() {
            0 => {
                let branch = self.regex_automaton(&epsilon_automaton(), nt.nonterminal_at(1));
                let (union, _, _) = Nfa::union(prefix, &branch);
                union
            }
            _ => self.regex_automaton(prefix, nt.nonterminal_at(0)),
        }
    }

    /// `<Expression>`: a symbol, a group or a symbol set, with its factor
    /// applied.
    fn expression_automaton(&self, nt: &NonTerminal) -> Nfa {
        debug_assert_eq!(nt.id(), self.grammar.expression_id);
        let (automaton, factor) = match nt.local_rule() {
            0 => (
                self.symbol_automaton(nt.token_at(0)),
                self.factor_type(nt.nonterminal_at(1)),
            ),
            1 => (
                self.regex_automaton(&epsilon_automaton(), nt.nonterminal_at(1)),
                self.factor_type(nt.nonterminal_at(3)),
            ),
            _ => (
                self.symbol_set_automaton(nt.nonterminal_at(1)),
                self.factor_type(nt.nonterminal_at(3)),
            ),
        };

        match factor {
            Factor::Closure => Nfa::closure(&automaton).0,
            Factor::OneClosure => {
                let (star, _) = Nfa::closure(&automaton);
                Nfa::concat(&automaton, &star).0
            }
            Factor::Optional => {
                let mut optional = automaton;
                optional.set_accepting(0, true);
                optional
            }
            Factor::Bare => automaton,
        }
    }

    fn factor_type(&self, nt: &NonTerminal) -> Factor {
        debug_assert_eq!(nt.id(), self.grammar.factor_id);
        match nt.local_rule() {
            0 => Factor::Closure,
            1 => Factor::OneClosure,
            2 => Factor::Optional,
            _ => Factor::Bare,
        }
    }

    /// A single SYMBOL outside a set: a plain byte, `.`, or an escape
    /// (possibly naming a predefined class).
    fn symbol_automaton(&self, token: &Token) -> Nfa {
        let lexeme = token.lexeme().as_bytes();
        debug_assert!(!lexeme.is_empty());
        if lexeme[0] == b'\\' {
            debug_assert_eq!(lexeme.len(), 2);
            let escape = lexeme[1];
            match self.predefined.get(&escape) {
                Some(class) => accept_set_automaton(class),
                None => accept_set_automaton(&[escape]),
            }
        } else {
            debug_assert_eq!(lexeme.len(), 1);
            if lexeme[0] == b'.' {
                accept_set_automaton(&wildcard())
            } else {
                accept_set_automaton(&lexeme[0..1])
            }
        }
    }

    /// `<SymbolSet> ::= <SymbolList> | NOT <SymbolList>`.
    fn symbol_set_automaton(&self, nt: &NonTerminal) -> Nfa {
        debug_assert_eq!(nt.id(), self.grammar.symbol_set_id);
        match nt.local_rule() {
            0 => accept_set_automaton(&self.symbol_list(nt.nonterminal_at(0))),
            _ => reject_set_automaton(&self.symbol_list(nt.nonterminal_at(1))),
        }
    }

    /// Expands a `<SymbolList>` into the bytes it covers: escapes resolve
    /// to their class or byte, `.` to the wildcard, and a plain `-`
    /// between two plain symbols to the inclusive byte range.
    fn symbol_list(&self, nt: &NonTerminal) -> Vec<u8> {
        debug_assert_eq!(nt.id(), self.grammar.symbol_list_id);

        enum Entry {
            Plain(u8),
            Escaped(u8),
            Class(Vec<u8>),
        }

        let mut entries = Vec::new();
        let mut current = nt;
        loop {
            match current.local_rule() {
                0 => {
                    let lexeme = current.token_at(0).lexeme().as_bytes();
                    debug_assert!(!lexeme.is_empty());
                    if lexeme[0] == b'\\' {
                        debug_assert_eq!(lexeme.len(), 2);
                        match self.predefined.get(&lexeme[1]) {
                            Some(class) => entries.push(Entry::Class(class.clone())),
                            None => entries.push(Entry::Escaped(lexeme[1])),
                        }
                    } else if lexeme[0] == b'.' {
                        entries.push(Entry::Class(wildcard()));
                    } else {
                        entries.push(Entry::Plain(lexeme[0]));
                    }
                    current = current.nonterminal_at(1);
                }
                _ => break,
            }
        }

        let endpoint = |entry: &Entry| match entry {
            Entry::Plain(byte) | Entry::Escaped(byte) => Some(*byte),
            Entry::Class(_) => None,
        };

        let mut bytes = Vec::new();
        let mut index = 0;
        while index < entries.len() {
            let range = if index + 2 < entries.len() {
                match (&entries[index], &entries[index + 1], &entries[index + 2]) {
                    (low, Entry::Plain(b'-'), high) => {
                        match (endpoint(low), endpoint(high)) {
                            (Some(low), Some(high)) if low <= high => Some((low, high)),
                            _ => None,
                        }
                    }
                    _ => None,
                }
            } else {
                None
            };
            if let Some((low, high)) = range {
                bytes.extend(low..=high);
                index += 3;
                continue;
            }
            match &entries[index] {
                Entry::Plain(byte) | Entry::Escaped(byte) => bytes.push(*byte),
                Entry::Class(class) => bytes.extend(class.iter().copied()),
            }
            index += 1;
        }
        bytes
    }
}

/// An automaton accepting only the empty string, the seed every
/// concatenation chain grows from.
fn epsilon_automaton() -> Nfa {
    let mut nfa = Nfa::new();
    nfa.set_accepting(0, true);
    nfa
}

/// A two-state automaton accepting exactly the listed bytes.
fn accept_set_automaton(set: &[u8]) -> Nfa {
    let mut nfa = Nfa::new();
    let accept = nfa.add_state();
    nfa.set_accepting(accept, true);
    for byte in set.iter().copied().collect::<BTreeSet<u8>>() {
        nfa.add_transition(0, byte, accept);
    }
    nfa
}

/// A two-state automaton accepting every byte of the alphabet except the
/// listed ones. Byte 0 is never accepted.
fn reject_set_automaton(set: &[u8]) -> Nfa {
    let excluded: BTreeSet<u8> = set.iter().copied().collect();
    let mut nfa = Nfa::new();
    let accept = nfa.add_state();
    nfa.set_accepting(accept, true);
    for byte in 1..ALPHABET_SIZE as u8 {
        if !excluded.contains(&byte) {
            nfa.add_transition(0, byte, accept);
        }
    }
    nfa
}

/// Every byte `.` matches: the full alphabet except byte 0.
fn wildcard() -> Vec<u8> {
    (1..ALPHABET_SIZE as u8).collect()
}

fn complement(set: &[u8]) -> Vec<u8> {
    let excluded: BTreeSet<u8> = set.iter().copied().collect();
    (1..ALPHABET_SIZE as u8)
        .filter(|byte| !excluded.contains(byte))
        .collect()
}

fn predefined_sets() -> HashMap<u8, Vec<u8>> {
    let mut sets = HashMap::new();
    sets.insert(b't', vec![b'\t']);
    sets.insert(b'n', vec![b'\n']);
    sets.insert(b'f', vec![0x0c]);
    sets.insert(b'r', vec![b'\r']);

    let digits: Vec<u8> = (b'0'..=b'9').collect();
    sets.insert(b'D', complement(&digits));
    sets.insert(b'd', digits);

    let word: Vec<u8> = (1..ALPHABET_SIZE as u8)
        .filter(|byte| byte.is_ascii_alphanumeric() || *byte == b'_')
        .collect();
    sets.insert(b'W', complement(&word));
    sets.insert(b'w', word);

    let white = vec![b' ', b'\t', b'\n', 0x0c, b'\r'];
    sets.insert(b'S', complement(&white));
    sets.insert(b's', white);

    let hex_lower: Vec<u8> = (b'0'..=b'9').chain(b'a'..=b'f').collect();
    sets.insert(b'h', hex_lower);
    let hex_upper: Vec<u8> = (b'0'..=b'9').chain(b'A'..=b'F').collect();
    sets.insert(b'H', hex_upper);

    sets
}
