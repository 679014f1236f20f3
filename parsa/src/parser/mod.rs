//! # Parsing
//! Table-driven parsing on top of the [Scanner]: [ll1] holds the predictive
//! table and driver, [slr1] the shift/reduce table and driver, [tree] the
//! parse-tree nodes and [conflict] the compile-time conflict report.
//!
//! [ParserTable] is the sum of the two table kinds, so code that loads
//! serialized tables can drive either without caring which it got, and
//! [Parser] bundles a table with a scanner for the common case.
//!
//! Both drivers invoke an optional [ParserAction] callback on every
//! recognized non-terminal in strict post-order: a node is reported only
//! after all of its children. The SLR(1) driver fires incrementally as
//! reductions happen; the LL(1) driver walks the finished tree after a
//! successful parse. Either way the callback never sees a node from a
//! failed parse.

pub mod conflict;
pub mod ll1;
pub mod slr1;
pub mod tree;

use crate::error::ParserError;
use crate::grammar::{Grammar, NonTerminalId, ParserGrammar, Symbol};
use crate::scanner::Scanner;
use ll1::Ll1Table;
use slr1::Slr1Table;
use std::rc::Rc;
use tree::{Node, NonTerminal};

/// A rule as stored inside a compiled table: the left non-terminal, the
/// rule's local index among that non-terminal's alternatives, and the
/// right-hand symbols. This is what the drivers need to build tree nodes,
/// independent of the [ParserGrammar] the table came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRule {
    left: NonTerminalId,
    local_index: usize,
    symbols: Vec<Symbol>,
}

impl TableRule {
    pub(crate) fn new(left: NonTerminalId, local_index: usize, symbols: Vec<Symbol>) -> Self {
        Self {
            left,
            local_index,
            symbols,
        }
    }

    pub fn left(&self) -> NonTerminalId {
        self.left
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

/// Converts grammar rules into table rules, assigning each rule its local
/// index in declaration order.
pub(crate) fn table_rules(grammar: &Grammar, rules: &ParserGrammar) -> Vec<TableRule> {
    let mut next_local = vec![0usize; grammar.nonterminal_count()];
    rules
        .rules()
        .iter()
        .map(|rule| {
            let local = next_local[rule.left()];
            next_local[rule.left()] += 1;
            TableRule::new(rule.left(), local, rule.right().to_vec())
        })
        .collect()
}

/// Callback invoked on every recognized non-terminal, in post-order.
/// Tokens are not visited.
pub trait ParserAction {
    fn recognized(&mut self, non_terminal: &NonTerminal);
}

/// Walks `root` bottom-up and fires `action` on every non-terminal, each
/// one after all of its children. Iterative so deep trees are safe.
pub(crate) fn execute_actions(action: &mut dyn ParserAction, root: &Node) {
    enum Walk<'a> {
        Visit(&'a NonTerminal),
        Emit(&'a NonTerminal),
    }

    let Some(root) = root.as_nonterminal() else {
        return;
    };
    let mut stack = vec![Walk::Visit(root)];
    while let Some(step) = stack.pop() {
        match step {
            Walk::Visit(nt) => {
                stack.push(Walk::Emit(nt));
                for child in nt.children().iter().rev() {
                    if let Node::NonTerminal(inner) = child {
                        stack.push(Walk::Visit(inner));
                    }
                }
            }
            Walk::Emit(nt) => action.recognized(nt),
        }
    }
}

/// A compiled parse table of either construction. Tables are shared by
/// reference count so several drivers can run on the same artifact.
#[derive(Clone, Debug)]
pub enum ParserTable {
    Ll1(Rc<Ll1Table>),
    Slr1(Rc<Slr1Table>),
}

impl From<Ll1Table> for ParserTable {
    fn from(table: Ll1Table) -> Self {
        ParserTable::Ll1(Rc::new(table))
    }
}

impl From<Slr1Table> for ParserTable {
    fn from(table: Slr1Table) -> Self {
        ParserTable::Slr1(Rc::new(table))
    }
}

impl ParserTable {
    /// The non-terminal id of the tree root a successful parse produces.
    pub fn root_nonterminal_id(&self) -> NonTerminalId {
        match self {
            ParserTable::Ll1(table) => table.root_nonterminal_id(),
            ParserTable::Slr1(table) => table.root_nonterminal_id(),
        }
    }

    /// Parses the whole token stream, raising the first error.
    pub fn parse(
        &self,
        scanner: &mut Scanner,
        action: Option<&mut dyn ParserAction>,
    ) -> Result<Node, ParserError> {
        match self {
            ParserTable::Ll1(table) => table.parse(scanner, action),
            ParserTable::Slr1(table) => table.parse(scanner, action),
        }
    }

    /// Parses with panic-mode recovery: parse errors are appended to
    /// `errors` and scanning resumes; the tree is withheld if any error
    /// occurred. Lexical and I/O errors still abort.
    pub fn parse_with_recovery(
        &self,
        scanner: &mut Scanner,
        action: Option<&mut dyn ParserAction>,
        errors: &mut Vec<ParserError>,
    ) -> Result<Option<Node>, ParserError> {
        match self {
            ParserTable::Ll1(table) => table.parse_with_recovery(scanner, action, errors),
            ParserTable::Slr1(table) => table.parse_with_recovery(scanner, action, errors),
        }
    }
}

/// A parse table paired with the scanner feeding it, plus an optional
/// [ParserAction].
pub struct Parser {
    table: ParserTable,
    scanner: Scanner,
    action: Option<Box<dyn ParserAction>>,
}

impl Parser {
    pub fn new(table: ParserTable, scanner: Scanner) -> Self {
        Self {
            table,
            scanner,
            action: None,
        }
    }

    pub fn set_action(&mut self, action: Box<dyn ParserAction>) {
        self.action = Some(action);
    }

    pub fn table(&self) -> &ParserTable {
        &self.table
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn parse(&mut self) -> Result<Node, ParserError> {
        let action: Option<&mut dyn ParserAction> = match self.action.as_mut() {
            Some(action) => Some(action.as_mut()),
            None => None,
        };
        self.table.parse(&mut self.scanner, action)
    }

    pub fn parse_with_recovery(
        &mut self,
        errors: &mut Vec<ParserError>,
    ) -> Result<Option<Node>, ParserError> {
        let action: Option<&mut dyn ParserAction> = match self.action.as_mut() {
            Some(action) => Some(action.as_mut()),
            None => None,
        };
        self.table
            .parse_with_recovery(&mut self.scanner, action, errors)
    }
}
