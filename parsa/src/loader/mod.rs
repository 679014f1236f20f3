//! # Table serialization
//! Length- and count-prefixed binary buffers for compiled artifacts, so
//! grammars can be compiled once and shipped: the scanner automaton, the
//! two parse-table kinds (tagged 0 for LL(1), 1 for SLR(1)), and a combined
//! buffer bundling the grammar's name tables with both artifacts. All
//! integers are little-endian 32-bit; strings are NUL-terminated. The
//! formats round-trip byte for byte.
//!
//! Loading validates counts and table entries and reports
//! [ParserError::CorruptBuffer] instead of trusting the input.
//!
//! ```
//! use parsa::grammar::{Grammar, ScannerGrammar, TokenType};
//! use parsa::loader;
//!
//! let mut grammar = Grammar::new();
//! let mut tokens = ScannerGrammar::new();
//! tokens.add_token_type(TokenType::new("NUM", "\\d+").unwrap());
//! let automata = tokens.compile(&mut grammar);
//!
//! let bytes = loader::scanner_to_bytes(&automata);
//! let reloaded = loader::scanner_from_bytes(&bytes).unwrap();
//! assert_eq!(automata, reloaded);
//! ```

pub mod grammar_file;

use crate::dfa::Dfa;
use crate::error::ParserError;
use crate::grammar::{Grammar, Symbol};
use crate::parser::ll1::Ll1Table;
use crate::parser::slr1::{Action, Slr1Table};
use crate::parser::{ParserTable, TableRule};
use crate::scanner::ScannerAutomata;
use crate::ALPHABET_SIZE;
use std::collections::BTreeSet;
use std::rc::Rc;

const TAG_LL1: u32 = 0;
const TAG_SLR1: u32 = 1;

const KIND_NONTERMINAL: u32 = 0;
const KIND_TOKEN: u32 = 1;

const ACTION_SHIFT: u32 = 0;
const ACTION_REDUCE: u32 = 2;
const ACTION_HALT: u32 = 3;
const ACTION_ERROR: u32 = 4;

/// Wire filler for actions that carry no payload.
const NO_PAYLOAD: u32 = 0x7FFF_FFFF;

fn corrupt(message: impl Into<String>) -> ParserError {
    ParserError::CorruptBuffer(message.into())
}

struct Reader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    fn read_u32(&mut self) -> Result<u32, ParserError> {
        let end = self.pos + 4;
        let bytes = self
            .buffer
            .get(self.pos..end)
            .ok_or_else(|| corrupt("unexpected end of buffer"))?;
        self.pos = end;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn read_i32(&mut self) -> Result<i32, ParserError> {
        self.read_u32().map(|value| value as i32)
    }

    fn read_cstr(&mut self) -> Result<String, ParserError> {
        let start = self.pos;
        let nul = self.buffer[start..]
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| corrupt("unterminated string"))?;
        self.pos = start + nul + 1;
        String::from_utf8(self.buffer[start..start + nul].to_vec())
            .map_err(|_| corrupt("string is not valid UTF-8"))
    }

    fn read_section(&mut self, size: usize) -> Result<&'a [u8], ParserError> {
        let end = self.pos + size;
        let section = self
            .buffer
            .get(self.pos..end)
            .ok_or_else(|| corrupt("section exceeds the buffer"))?;
        self.pos = end;
        Ok(section)
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_cstr(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

/// Serializes a scanner automaton:
/// `numStates, transitions[128][numStates], finalStates bitset,
/// stateTokenId[numStates], numIgnored, ignored…`.
pub fn scanner_to_bytes(automata: &ScannerAutomata) -> Vec<u8> {
    let dfa = automata.dfa();
    let num_states = dfa.num_states();
    let mut out = Vec::new();

    put_u32(&mut out, num_states as u32);
    for symbol in 0..ALPHABET_SIZE as u8 {
        for state in 0..num_states {
            put_i32(&mut out, dfa.transition_raw(state, symbol));
        }
    }

    // acceptance flags packed 32 per word
    let mut word = 0u32;
    let mut bit = 0;
    for state in 0..num_states {
        if dfa.is_accepting(state) {
            word |= 1 << bit;
        }
        bit += 1;
        if bit == 32 {
            put_u32(&mut out, word);
            word = 0;
            bit = 0;
        }
    }
    if bit > 0 {
        put_u32(&mut out, word);
    }

    for state in 0..num_states {
        match automata.state_token(state) {
            Some(token) => put_i32(&mut out, token as i32),
            None => put_i32(&mut out, -1),
        }
    }

    put_u32(&mut out, automata.ignored_tokens().len() as u32);
    for &token in automata.ignored_tokens() {
        put_u32(&mut out, token as u32);
    }
    out
}

/// Deserializes a buffer written by [scanner_to_bytes].
pub fn scanner_from_bytes(buffer: &[u8]) -> Result<ScannerAutomata, ParserError> {
    let mut reader = Reader::new(buffer);
    let num_states = reader.read_u32()? as usize;
    if num_states == 0 {
        return Err(corrupt("a scanner automaton has at least one state"));
    }

    let mut dfa = Dfa::new(num_states);
    for symbol in 0..ALPHABET_SIZE as u8 {
        for state in 0..num_states {
            let target = reader.read_i32()?;
            if target < -1 || target >= num_states as i32 {
                return Err(corrupt(format!("transition target {target} out of range")));
            }
            dfa.set_transition(state, symbol, target);
        }
    }

    let words = num_states.div_ceil(32);
    let mut state = 0;
    for _ in 0..words {
        let word = reader.read_u32()?;
        for bit in 0..32 {
            if state >= num_states {
                break;
            }
            if word & (1 << bit) != 0 {
                dfa.set_accepting(state);
            }
            state += 1;
        }
    }

    let mut state_tokens = Vec::with_capacity(num_states);
    for state in 0..num_states {
        let token = reader.read_i32()?;
        match token {
            -1 => {
                if dfa.is_accepting(state) {
                    return Err(corrupt(format!("accepting state {state} lacks a token id")));
                }
                state_tokens.push(None);
            }
            id if id >= 0 => state_tokens.push(Some(id as usize)),
            other => return Err(corrupt(format!("state token id {other} out of range"))),
        }
    }

    let num_ignored = reader.read_u32()? as usize;
    let mut ignored = BTreeSet::new();
    for _ in 0..num_ignored {
        ignored.insert(reader.read_u32()? as usize);
    }

    Ok(ScannerAutomata::from_parts(dfa, state_tokens, ignored))
}

fn put_rules(out: &mut Vec<u8>, rules: &[TableRule]) {
    put_u32(out, rules.len() as u32);
    for rule in rules {
        put_u32(out, rule.left() as u32);
        put_u32(out, rule.local_index() as u32);
        put_u32(out, rule.symbols().len() as u32);
        for symbol in rule.symbols() {
            match symbol {
                Symbol::NonTerminal(id) => {
                    put_u32(out, KIND_NONTERMINAL);
                    put_u32(out, *id as u32);
                }
                Symbol::Token(id) => {
                    put_u32(out, KIND_TOKEN);
                    put_u32(out, *id as u32);
                }
            }
        }
    }
}

fn read_rules(reader: &mut Reader) -> Result<Vec<TableRule>, ParserError> {
    let count = reader.read_u32()? as usize;
    let mut rules = Vec::with_capacity(count);
    for _ in 0..count {
        let left = reader.read_u32()? as usize;
        let local_index = reader.read_u32()? as usize;
        let arity = reader.read_u32()? as usize;
        let mut symbols = Vec::with_capacity(arity);
        for _ in 0..arity {
            let kind = reader.read_u32()?;
            let id = reader.read_u32()? as usize;
            symbols.push(match kind {
                KIND_NONTERMINAL => Symbol::NonTerminal(id),
                KIND_TOKEN => Symbol::Token(id),
                other => return Err(corrupt(format!("unknown rule symbol kind {other}"))),
            });
        }
        rules.push(TableRule::new(left, local_index, symbols));
    }
    Ok(rules)
}

fn ll1_to_bytes(table: &Ll1Table) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, TAG_LL1);
    put_u32(&mut out, table.root_nonterminal_id() as u32);
    put_u32(&mut out, table.rows() as u32);
    put_u32(&mut out, table.cols() as u32);
    for row in 0..table.rows() {
        for col in 0..table.cols() {
            put_i32(&mut out, table.cell_raw(row, col));
        }
    }
    put_rules(&mut out, table.rules());
    out
}

fn slr1_to_bytes(table: &Slr1Table) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, TAG_SLR1);
    put_u32(&mut out, table.root_nonterminal_id() as u32);
    put_u32(&mut out, table.num_states() as u32);
    put_u32(&mut out, table.num_nonterminals() as u32);
    put_u32(&mut out, table.num_tokens() as u32);
    for state in 0..table.num_states() {
        for id in 0..table.num_nonterminals() {
            put_i32(&mut out, table.goto_raw(state, id));
        }
    }
    for state in 0..table.num_states() {
        for col in 0..table.num_tokens() {
            let (kind, payload) = match table.action(state, col) {
                Action::Shift(target) => (ACTION_SHIFT, target as u32),
                Action::Reduce(rule) => (ACTION_REDUCE, rule as u32),
                Action::Halt => (ACTION_HALT, NO_PAYLOAD),
                Action::Error => (ACTION_ERROR, NO_PAYLOAD),
            };
            put_u32(&mut out, kind);
            put_u32(&mut out, payload);
        }
    }
    put_rules(&mut out, table.rules());
    out
}

/// Serializes a parse table of either kind, tagged with its construction.
pub fn table_to_bytes(table: &ParserTable) -> Vec<u8> {
    match table {
        ParserTable::Ll1(table) => ll1_to_bytes(table),
        ParserTable::Slr1(table) => slr1_to_bytes(table),
    }
}

fn ll1_from_reader(reader: &mut Reader) -> Result<Ll1Table, ParserError> {
    let root = reader.read_u32()? as usize;
    let rows = reader.read_u32()? as usize;
    let cols = reader.read_u32()? as usize;
    let mut cells = Vec::with_capacity(rows * cols);
    for _ in 0..rows * cols {
        cells.push(reader.read_i32()?);
    }
    let rules = read_rules(reader)?;
    for &cell in &cells {
        if cell < -1 || cell >= rules.len() as i32 {
            return Err(corrupt(format!("prediction {cell} out of range")));
        }
    }
    Ok(Ll1Table::from_parts(root, rows, cols, cells, rules))
}

fn slr1_from_reader(reader: &mut Reader) -> Result<Slr1Table, ParserError> {
    let root = reader.read_u32()? as usize;
    let num_states = reader.read_u32()? as usize;
    let num_nonterminals = reader.read_u32()? as usize;
    let num_tokens = reader.read_u32()? as usize;

    let mut gotos = Vec::with_capacity(num_states * num_nonterminals);
    for _ in 0..num_states * num_nonterminals {
        let target = reader.read_i32()?;
        if target < -1 || target >= num_states as i32 {
            return Err(corrupt(format!("goto target {target} out of range")));
        }
        gotos.push(target);
    }

    let mut actions = Vec::with_capacity(num_states * num_tokens);
    for _ in 0..num_states * num_tokens {
        let kind = reader.read_u32()?;
        let payload = reader.read_u32()?;
        actions.push(match kind {
            ACTION_SHIFT => {
                if payload as usize >= num_states {
                    return Err(corrupt(format!("shift target {payload} out of range")));
                }
                Action::Shift(payload as usize)
            }
            ACTION_REDUCE => Action::Reduce(payload as usize),
            ACTION_HALT => Action::Halt,
            ACTION_ERROR => Action::Error,
            other => return Err(corrupt(format!("unknown action type {other}"))),
        });
    }

    let rules = read_rules(reader)?;
    for action in &actions {
        if let Action::Reduce(rule) = action {
            if *rule >= rules.len() {
                return Err(corrupt(format!("reduction rule {rule} out of range")));
            }
        }
    }
    Ok(Slr1Table::from_parts(
        root,
        num_states,
        num_nonterminals,
        num_tokens,
        actions,
        gotos,
        rules,
    ))
}

/// Deserializes a buffer written by [table_to_bytes].
pub fn table_from_bytes(buffer: &[u8]) -> Result<ParserTable, ParserError> {
    let mut reader = Reader::new(buffer);
    match reader.read_u32()? {
        TAG_LL1 => Ok(ParserTable::Ll1(Rc::new(ll1_from_reader(&mut reader)?))),
        TAG_SLR1 => Ok(ParserTable::Slr1(Rc::new(slr1_from_reader(&mut reader)?))),
        other => Err(corrupt(format!("unknown table tag {other}"))),
    }
}

/// The contents of a combined buffer: the grammar's name tables, and
/// whichever artifacts were present.
#[derive(Debug)]
pub struct LoadedGrammar {
    pub grammar: Grammar,
    pub scanner: Option<ScannerAutomata>,
    pub table: Option<ParserTable>,
}

/// Serializes the grammar name tables together with an optional scanner
/// automaton and an optional parse table:
/// `numTokens, tokenNames…, numNt, ntNames…, scannerSize, scannerBytes,
/// tableSize, tableBytes`. A zero size omits that section.
pub fn save_buffer(
    grammar: Option<&Grammar>,
    scanner: Option<&ScannerAutomata>,
    table: Option<&ParserTable>,
) -> Vec<u8> {
    let mut out = Vec::new();

    match grammar {
        Some(grammar) => {
            put_u32(&mut out, grammar.token_count() as u32);
            for name in grammar.token_names() {
                put_cstr(&mut out, name);
            }
            put_u32(&mut out, grammar.nonterminal_count() as u32);
            for name in grammar.nonterminal_names() {
                put_cstr(&mut out, name);
            }
        }
        None => {
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
        }
    }

    match scanner {
        Some(scanner) => {
            let bytes = scanner_to_bytes(scanner);
            put_u32(&mut out, bytes.len() as u32);
            out.extend_from_slice(&bytes);
        }
        None => put_u32(&mut out, 0),
    }

    match table {
        Some(table) => {
            let bytes = table_to_bytes(table);
            put_u32(&mut out, bytes.len() as u32);
            out.extend_from_slice(&bytes);
        }
        None => put_u32(&mut out, 0),
    }
    out
}

/// Deserializes a buffer written by [save_buffer].
pub fn load_buffer(buffer: &[u8]) -> Result<LoadedGrammar, ParserError> {
    let mut reader = Reader::new(buffer);
    let mut grammar = Grammar::new();

    let token_count = reader.read_u32()? as usize;
    for _ in 0..token_count {
        let name = reader.read_cstr()?;
        if grammar.has_token(&name) {
            return Err(corrupt(format!("duplicate token name \"{name}\"")));
        }
        grammar.token_id_or_create(&name);
    }

    let nonterminal_count = reader.read_u32()? as usize;
    for _ in 0..nonterminal_count {
        let name = reader.read_cstr()?;
        grammar
            .create_nonterminal_id(&name)
            .map_err(|_| corrupt(format!("duplicate non-terminal name \"{name}\"")))?;
    }

    let scanner_size = reader.read_u32()? as usize;
    let scanner = if scanner_size > 0 {
        Some(scanner_from_bytes(reader.read_section(scanner_size)?)?)
    } else {
        None
    };

    let table_size = reader.read_u32()? as usize;
    let table = if table_size > 0 {
        Some(table_from_bytes(reader.read_section(table_size)?)?)
    } else {
        None
    };

    Ok(LoadedGrammar {
        grammar,
        scanner,
        table,
    })
}
