//! # LL(1) table and predictive driver
//! The prediction table maps `(non-terminal, lookahead)` to the global
//! index of the rule to expand, with the last column reserved for the
//! end-of-input marker. Construction follows the textbook rule: a rule `A
//! ::= γ` claims the cell `[A][t]` for every `t ∈ FIRST(γ)`, and for every
//! `t ∈ FOLLOW(A)` when γ is nullable. When two rules claim a cell the
//! smaller global index wins and the conflict is recorded; the table stays
//! usable.
//!
//! The driver keeps an explicit stack of tree slots predicted but not yet
//! matched. Expanding a non-terminal replaces it with the rule's right-hand
//! side (leftmost on top) while wiring the new slots as its children, and a
//! token slot on top must match the lookahead, which fills in its lexeme
//! and location. The parse succeeds when the stack and the input run out
//! together; the tree is then assembled bottom-up from the slot arena.

use crate::error::ParserError;
use crate::grammar::{Grammar, NonTerminalId, ParserGrammar, Symbol, TokenId};
use crate::input::InputLocation;
use crate::parser::conflict::CompileResult;
use crate::parser::tree::{Node, NonTerminal, Token};
use crate::parser::{execute_actions, table_rules, ParserAction, TableRule};
use crate::scanner::Scanner;

/// A compiled LL(1) prediction table. Immutable; drivers may share it
/// through an `Rc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ll1Table {
    root: NonTerminalId,
    rows: usize,
    cols: usize,
    cells: Vec<i32>,
    rules: Vec<TableRule>,
}

const NO_RULE: i32 = -1;

/// Builds the prediction table for `rules`. Conflicting cells keep the
/// smaller rule index and are reported through `result`; construction
/// always succeeds.
pub(crate) fn build(
    grammar: &Grammar,
    rules: &ParserGrammar,
    result: &mut CompileResult,
) -> Ll1Table {
    let rows = grammar.nonterminal_count();
    let cols = grammar.token_count() + 1;
    let mut table = Ll1Table {
        root: rules.start_symbol(),
        rows,
        cols,
        cells: vec![NO_RULE; rows * cols],
        rules: table_rules(grammar, rules),
    };

    let firsts = rules.first_sets(grammar);
    let follows = rules.follow_sets(grammar, &firsts);

    for (index, rule) in rules.rules().iter().enumerate() {
        let rule_first = ParserGrammar::sequence_first(&firsts, rule.right());
        for &token in rule_first.tokens() {
            set_cell(&mut table, result, rule.left(), token, index);
        }
        if rule_first.is_nullable() {
            for lookahead in &follows[rule.left()] {
                let col = match lookahead {
                    crate::grammar::Lookahead::Token(token) => *token,
                    crate::grammar::Lookahead::End => cols - 1,
                };
                set_cell(&mut table, result, rule.left(), col, index);
            }
        }
    }
    table
}

fn set_cell(table: &mut Ll1Table, result: &mut CompileResult, row: usize, col: usize, rule: usize) {
    let slot = row * table.cols + col;
    let old = table.cells[slot];
    if old == NO_RULE || old == rule as i32 {
        table.cells[slot] = rule as i32;
        return;
    }
    let old = old as usize;
    // record the winning (smaller) rule first so it becomes the default
    if rule < old {
        result.add_conflict_rule(row, col, Some(rule));
        result.add_conflict_rule(row, col, Some(old));
        table.cells[slot] = rule as i32;
    } else {
        result.add_conflict_rule(row, col, Some(old));
        result.add_conflict_rule(row, col, Some(rule));
    }
}

/// A tree node under construction. Children always get larger slot indices
/// than their parent, which is what lets the finished arena be folded into
/// an owned tree in a single reverse pass.
struct Slot {
    kind: SlotKind,
    children: Vec<usize>,
}

enum SlotKind {
    Token {
        id: TokenId,
        lexeme: String,
        location: Option<InputLocation>,
    },
    NonTerminal {
        id: NonTerminalId,
        local_rule: usize,
    },
}

impl Ll1Table {
    pub fn root_nonterminal_id(&self) -> NonTerminalId {
        self.root
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The rule predicted for `row` (a non-terminal id) on `col` (a token
    /// id, or the end column `cols() - 1`).
    pub fn cell(&self, row: usize, col: usize) -> Option<usize> {
        match self.cells[row * self.cols + col] {
            NO_RULE => None,
            rule => Some(rule as usize),
        }
    }

    pub(crate) fn cell_raw(&self, row: usize, col: usize) -> i32 {
        self.cells[row * self.cols + col]
    }

    /// The prediction for `row` under an optional lookahead token id. Ids
    /// outside the table (a scanner extended after the table was built)
    /// predict nothing.
    fn predict(&self, row: usize, lookahead: Option<TokenId>) -> Option<usize> {
        let col = match lookahead {
            Some(id) if id + 1 >= self.cols => return None,
            Some(id) => id,
            None => self.cols - 1,
        };
        self.cell(row, col)
    }

    pub fn rules(&self) -> &[TableRule] {
        &self.rules
    }

    pub(crate) fn from_parts(
        root: NonTerminalId,
        rows: usize,
        cols: usize,
        cells: Vec<i32>,
        rules: Vec<TableRule>,
    ) -> Self {
        debug_assert_eq!(cells.len(), rows * cols);
        Self {
            root,
            rows,
            cols,
            cells,
            rules,
        }
    }

    /// Parses the whole token stream, raising the first error and tearing
    /// down the partial tree.
    pub fn parse(
        &self,
        scanner: &mut Scanner,
        action: Option<&mut dyn ParserAction>,
    ) -> Result<Node, ParserError> {
        self.parse_inner(scanner, action, None)
            .map(|node| node.expect("strict mode raises instead of withholding the tree"))
    }

    /// Parses with panic-mode recovery. Parse errors are appended to
    /// `errors` in detection order; on a token mismatch input is skipped
    /// until the expected token appears, and on a missing table cell until
    /// a token with a defined cell for the stack top appears. If anything
    /// went wrong no tree is returned. Lexical and I/O errors still abort.
    pub fn parse_with_recovery(
        &self,
        scanner: &mut Scanner,
        action: Option<&mut dyn ParserAction>,
        errors: &mut Vec<ParserError>,
    ) -> Result<Option<Node>, ParserError> {
        self.parse_inner(scanner, action, Some(errors))
    }

    fn parse_inner(
        &self,
        scanner: &mut Scanner,
        action: Option<&mut dyn ParserAction>,
        mut errors: Option<&mut Vec<ParserError>>,
    ) -> Result<Option<Node>, ParserError> {
        let mut slots = vec![Slot {
            kind: SlotKind::NonTerminal {
                id: self.root,
                local_rule: 0,
            },
            children: Vec::new(),
        }];
        let mut stack = vec![0usize];
        let mut lookahead = scanner.next_token()?;
        let mut has_error = false;

        enum Expect {
            Token(TokenId),
            Rule(NonTerminalId),
        }

        while let Some(&top) = stack.last() {
            let expect = match &slots[top].kind {
                SlotKind::Token { id, .. } => Expect::Token(*id),
                SlotKind::NonTerminal { id, .. } => Expect::Rule(*id),
            };
            match expect {
                Expect::Token(expected) => {
                    match &lookahead {
                        None => {
                            has_error = true;
                            let error = ParserError::unexpected_end_of_input(scanner.input_mut());
                            match errors.as_deref_mut() {
                                Some(list) => {
                                    list.push(error);
                                    break;
                                }
                                None => return Err(error),
                            }
                        }
                        Some(token) if token.id() == expected => {
                            if let SlotKind::Token {
                                lexeme, location, ..
                            } = &mut slots[top].kind
                            {
                                *lexeme = token.lexeme().to_string();
                                *location = Some(token.location().clone());
                            }
                            stack.pop();
                            lookahead = scanner.next_token()?;
                        }
                        Some(token) => {
                            has_error = true;
                            let error = ParserError::unexpected_token(
                                scanner.input_mut(),
                                token.location().clone(),
                                token.lexeme(),
                            );
                            match errors.as_deref_mut() {
                                Some(list) => {
                                    list.push(error);
                                    // skip until the expected token shows up
                                    loop {
                                        lookahead = scanner.next_token()?;
                                        match &lookahead {
                                            None => break,
                                            Some(next) if next.id() == expected => break,
                                            Some(_) => {}
                                        }
                                    }
                                }
                                None => return Err(error),
                            }
                        }
                    }
                }
                Expect::Rule(row) => {
                    match self.predict(row, lookahead.as_ref().map(|token| token.id())) {
                        Some(rule_index) => {
                            let rule = &self.rules[rule_index];
                            if let SlotKind::NonTerminal { local_rule, .. } = &mut slots[top].kind {
                                *local_rule = rule.local_index();
                            }
                            stack.pop();

                            let children: Vec<usize> = rule
                                .symbols()
                                .iter()
                                .map(|symbol| {
                                    slots.push(Slot {
                                        kind: match symbol {
                                            Symbol::Token(id) => SlotKind::Token {
                                                id: *id,
                                                lexeme: String::new(),
                                                location: None,
                                            },
                                            Symbol::NonTerminal(id) => SlotKind::NonTerminal {
                                                id: *id,
                                                local_rule: 0,
                                            },
                                        },
                                        children: Vec::new(),
                                    });
                                    slots.len() - 1
                                })
                                .collect();
                            // leftmost symbol ends up on top of the stack
                            stack.extend(children.iter().rev().copied());
                            slots[top].children = children;
                        }
                        None => match &lookahead {
                            Some(token) => {
                                has_error = true;
                                let error = ParserError::unexpected_token(
                                    scanner.input_mut(),
                                    token.location().clone(),
                                    token.lexeme(),
                                );
                                match errors.as_deref_mut() {
                                    Some(list) => {
                                        list.push(error);
                                        // skip until some prediction exists for the
                                        // non-terminal on top
                                        loop {
                                            lookahead = scanner.next_token()?;
                                            match &lookahead {
                                                None => break,
                                                Some(next)
                                                    if self
                                                        .predict(row, Some(next.id()))
                                                        .is_some() =>
                                                {
                                                    break
                                                }
                                                Some(_) => {}
                                            }
                                        }
                                    }
                                    None => return Err(error),
                                }
                            }
                            None => {
                                has_error = true;
                                let error =
                                    ParserError::unexpected_end_of_input(scanner.input_mut());
                                match errors.as_deref_mut() {
                                    Some(list) => {
                                        list.push(error);
                                        break;
                                    }
                                    None => return Err(error),
                                }
                            }
                        },
                    }
                }
            }
        }

        if let Some(token) = &lookahead {
            has_error = true;
            let error = ParserError::junk_after_end(
                scanner.input_mut(),
                token.location().clone(),
                token.lexeme(),
            );
            match errors.as_deref_mut() {
                Some(list) => list.push(error),
                None => return Err(error),
            }
        }

        if has_error {
            return Ok(None);
        }

        // Fold the slot arena into the owned tree, children before parents.
        let mut built: Vec<Option<Node>> = (0..slots.len()).map(|_| None).collect();
        for index in (0..slots.len()).rev() {
            let slot = slots.pop().expect("arena and index walk stay in sync");
            let node = match slot.kind {
                SlotKind::Token {
                    id,
                    lexeme,
                    location,
                } => Node::Token(Token::new(
                    id,
                    lexeme,
                    location.expect("every token slot is filled on success"),
                )),
                SlotKind::NonTerminal { id, local_rule } => {
                    let children = slot
                        .children
                        .iter()
                        .map(|&child| built[child].take().expect("children built before parents"))
                        .collect();
                    Node::NonTerminal(NonTerminal::new(id, local_rule, children))
                }
            };
            built[index] = Some(node);
        }
        let root = built[0].take().expect("the root slot is index 0");

        if let Some(action) = action {
            execute_actions(action, &root);
        }
        Ok(Some(root))
    }
}
