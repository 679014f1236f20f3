//! # SLR(1) table and shift/reduce driver
//! Construction follows the canonical LR(0) procedure: a fake root rule
//! `S' ::= S $` becomes rule 0 of the internal rule list, kernels of items
//! `(rule, mark)` are discovered breadth-first from the initial kernel (so
//! state numbers follow discovery order, state 0 first), each kernel is
//! closed by expanding marked non-terminals, and the closure's items
//! populate the tables: items marking a token become shifts, items marking
//! a non-terminal become gotos, completed items become reductions on every
//! terminal in FOLLOW of their left side. The fake rule contributes only
//! the halt action in the end-marker column.
//!
//! Conflicts resolve deterministically: shift beats reduce, the smaller
//! global rule index beats the larger, halt beats reduce. Halt/reduce (and
//! the impossible shift/shift) additionally mark the grammar invalid and
//! abort the compilation after all conflicts are recorded.
//!
//! The driver is the standard loop over a state stack and a node stack;
//! reductions pop one entry per right-hand symbol, build the non-terminal
//! node, fire the parser action (bottom-up, so post-order comes for free)
//! and follow the goto table.

use crate::error::ParserError;
use crate::grammar::{Grammar, Lookahead, NonTerminalId, ParserGrammar, Rule, Symbol, TokenId};
use crate::parser::conflict::CompileResult;
use crate::parser::tree::{Node, NonTerminal};
use crate::parser::{table_rules, ParserAction, TableRule};
use crate::scanner::Scanner;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One cell of the action table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Shift(usize),
    Reduce(usize),
    Halt,
    Error,
}

const NO_GOTO: i32 = -1;

/// A compiled SLR(1) table: the action table over `(state, token-or-end)`,
/// the goto table over `(state, non-terminal)`, and the rule list that
/// reductions index. Immutable; drivers may share it through an `Rc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slr1Table {
    root: NonTerminalId,
    num_states: usize,
    num_nonterminals: usize,
    num_tokens: usize,
    actions: Vec<Action>,
    gotos: Vec<i32>,
    rules: Vec<TableRule>,
}

/// An LR(0) item: a rule of the internal (fake-rule-first) list and a mark
/// position within its right side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Item {
    rule: usize,
    mark: usize,
}

type Kernel = BTreeSet<Item>;

struct Builder<'a> {
    rules: Vec<Rule>,
    rules_of: HashMap<NonTerminalId, Vec<usize>>,
    follows: Vec<BTreeSet<Lookahead>>,
    end_token: TokenId,
    result: &'a mut CompileResult,
    valid: bool,
}

/// Builds the SLR(1) tables for `rules`, recording conflicts in `result`.
/// Unresolvable conflicts (halt/reduce, shift/shift) abort with
/// [ParserError::InvalidGrammar] once everything has been recorded.
pub(crate) fn build(
    grammar: &Grammar,
    rules: &ParserGrammar,
    result: &mut CompileResult,
) -> Result<Slr1Table, ParserError> {
    let end_token = grammar.token_count();
    let fake_root = grammar.nonterminal_count();
    let start = rules.start_symbol();

    // the fake root rule is rule 0 of the internal list; emitted reduce
    // indices are shifted down by one to skip it
    let mut internal = Vec::with_capacity(rules.rules().len() + 1);
    internal.push(Rule::new(
        fake_root,
        vec![Symbol::NonTerminal(start), Symbol::Token(end_token)],
    ));
    internal.extend(rules.rules().iter().cloned());

    let mut rules_of: HashMap<NonTerminalId, Vec<usize>> = HashMap::new();
    for (index, rule) in internal.iter().enumerate() {
        rules_of.entry(rule.left()).or_default().push(index);
    }

    let firsts = rules.first_sets(grammar);
    let follows = rules.follow_sets(grammar, &firsts);

    let mut builder = Builder {
        rules: internal,
        rules_of,
        follows,
        end_token,
        result,
        valid: true,
    };

    // canonical collection, breadth-first from the initial kernel
    let initial: Kernel = BTreeSet::from([Item { rule: 0, mark: 0 }]);
    let mut kernels: Vec<Kernel> = vec![initial.clone()];
    let mut kernel_index: HashMap<Kernel, usize> = HashMap::from([(initial, 0)]);
    let mut next = 0;
    while next < kernels.len() {
        let closure = builder.closure(&kernels[next]);
        for successor in builder.successors(&closure).into_values() {
            if !kernel_index.contains_key(&successor) {
                kernel_index.insert(successor.clone(), kernels.len());
                kernels.push(successor);
            }
        }
        next += 1;
    }

    let mut table = Slr1Table {
        root: start,
        num_states: kernels.len(),
        num_nonterminals: grammar.nonterminal_count() + 1,
        num_tokens: grammar.token_count() + 1,
        actions: vec![Action::Error; kernels.len() * (grammar.token_count() + 1)],
        gotos: vec![NO_GOTO; kernels.len() * (grammar.nonterminal_count() + 1)],
        rules: table_rules(grammar, rules),
    };

    for (state, kernel) in kernels.iter().enumerate() {
        let closure = builder.closure(kernel);
        let successors = builder.successors(&closure);
        // item order puts the fake rule first, so halts land before any
        // competing reduction is examined
        for item in &closure {
            let rule = &builder.rules[item.rule];
            if item.mark == rule.right().len() {
                if item.rule == 0 {
                    builder.set_halt(&mut table, state);
                } else {
                    let emitted = item.rule - 1;
                    let lookaheads: Vec<Lookahead> =
                        builder.follows[rule.left()].iter().copied().collect();
                    for lookahead in lookaheads {
                        let col = match lookahead {
                            Lookahead::Token(token) => token,
                            Lookahead::End => table.num_tokens - 1,
                        };
                        builder.set_reduce(&mut table, state, col, emitted);
                    }
                }
            } else {
                let symbol = rule.right()[item.mark];
                let target = kernel_index[&successors[&symbol]];
                match symbol {
                    Symbol::Token(token) if token == builder.end_token => {
                        builder.set_halt(&mut table, state)
                    }
                    Symbol::Token(token) => builder.set_shift(&mut table, state, token, target),
                    Symbol::NonTerminal(id) => builder.set_goto(&mut table, state, id, target),
                }
            }
        }
    }

    if !builder.valid {
        return Err(ParserError::InvalidGrammar(
            "unresolvable parse-table conflict (see the compile result)".into(),
        ));
    }
    Ok(table)
}

impl Builder<'_> {
    /// Expands a kernel to its closure: every item marking a non-terminal
    /// predicts all of that non-terminal's rules at mark 0.
    fn closure(&self, kernel: &Kernel) -> BTreeSet<Item> {
        let mut closure = kernel.clone();
        let mut work: Vec<Item> = kernel.iter().copied().collect();
        while let Some(item) = work.pop() {
            let rule = &self.rules[item.rule];
            if let Some(Symbol::NonTerminal(id)) = rule.right().get(item.mark) {
                if let Some(predicted) = self.rules_of.get(id) {
                    for &rule in predicted {
                        let item = Item { rule, mark: 0 };
                        if closure.insert(item) {
                            work.push(item);
                        }
                    }
                }
            }
        }
        closure
    }

    /// Groups the closure's non-completed items by their marked symbol and
    /// advances the mark, producing the successor kernel per symbol.
    fn successors(&self, closure: &BTreeSet<Item>) -> BTreeMap<Symbol, Kernel> {
        let mut successors: BTreeMap<Symbol, Kernel> = BTreeMap::new();
        for item in closure {
            if let Some(&symbol) = self.rules[item.rule].right().get(item.mark) {
                successors.entry(symbol).or_default().insert(Item {
                    rule: item.rule,
                    mark: item.mark + 1,
                });
            }
        }
        successors
    }

    fn set_shift(&mut self, table: &mut Slr1Table, state: usize, token: TokenId, target: usize) {
        let slot = state * table.num_tokens + token;
        let new = Action::Shift(target);
        let old = table.actions[slot];
        if old == new {
            return;
        }
        match old {
            Action::Error => table.actions[slot] = new,
            Action::Shift(_) => {
                // the successor kernel per symbol is unique, so two shift
                // targets cannot coexist; fatal if it ever shows up
                self.valid = false;
                self.result.add_conflict_rule(state, token, None);
                table.actions[slot] = new;
            }
            Action::Reduce(rule) => {
                // shift/reduce: shift wins, the losing rule is recorded
                self.result.add_conflict_rule(state, token, Some(rule));
                self.result.add_conflict_rule(state, token, None);
                table.actions[slot] = new;
            }
            Action::Halt => {
                debug_assert!(false, "shifts never target the end-marker column");
            }
        }
    }

    fn set_reduce(&mut self, table: &mut Slr1Table, state: usize, col: usize, rule: usize) {
        let slot = state * table.num_tokens + col;
        let new = Action::Reduce(rule);
        let old = table.actions[slot];
        if old == new {
            return;
        }
        match old {
            Action::Error => table.actions[slot] = new,
            Action::Shift(_) => {
                // shift/reduce: shift wins
                self.result.add_conflict_rule(state, col, None);
                self.result.add_conflict_rule(state, col, Some(rule));
            }
            Action::Reduce(old_rule) => {
                // reduce/reduce: the lower global index wins
                self.result.add_conflict_rule(state, col, Some(old_rule));
                self.result.add_conflict_rule(state, col, Some(rule));
                if rule < old_rule {
                    table.actions[slot] = new;
                }
            }
            Action::Halt => {
                // halt/reduce: halt wins, and the grammar is not SLR(1)
                self.valid = false;
                self.result.add_conflict_rule(state, col, Some(rule));
            }
        }
    }

    fn set_goto(&mut self, table: &mut Slr1Table, state: usize, id: NonTerminalId, target: usize) {
        let slot = state * table.num_nonterminals + id;
        debug_assert!(table.gotos[slot] == NO_GOTO || table.gotos[slot] == target as i32);
        table.gotos[slot] = target as i32;
    }

    fn set_halt(&mut self, table: &mut Slr1Table, state: usize) {
        let slot = state * table.num_tokens + (table.num_tokens - 1);
        match table.actions[slot] {
            Action::Error | Action::Halt => table.actions[slot] = Action::Halt,
            Action::Shift(_) => debug_assert!(false, "shifts never target the end-marker column"),
            Action::Reduce(rule) => {
                self.valid = false;
                self.result
                    .add_conflict_rule(state, table.num_tokens - 1, Some(rule));
                table.actions[slot] = Action::Halt;
            }
        }
    }
}

impl Slr1Table {
    pub fn root_nonterminal_id(&self) -> NonTerminalId {
        self.root
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Columns of the goto table; one more than the grammar's non-terminal
    /// count to cover the internal root.
    pub fn num_nonterminals(&self) -> usize {
        self.num_nonterminals
    }

    /// Columns of the action table; the last one is the end-marker column.
    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    pub fn action(&self, state: usize, col: usize) -> Action {
        self.actions[state * self.num_tokens + col]
    }

    /// The action for `state` under an optional lookahead token id. Ids
    /// outside the table act as errors.
    fn action_for(&self, state: usize, lookahead: Option<TokenId>) -> Action {
        match lookahead {
            Some(id) if id + 1 >= self.num_tokens => Action::Error,
            Some(id) => self.action(state, id),
            None => self.action(state, self.num_tokens - 1),
        }
    }

    pub fn goto(&self, state: usize, id: NonTerminalId) -> Option<usize> {
        match self.gotos[state * self.num_nonterminals + id] {
            NO_GOTO => None,
            target => Some(target as usize),
        }
    }

    pub(crate) fn goto_raw(&self, state: usize, id: NonTerminalId) -> i32 {
        self.gotos[state * self.num_nonterminals + id]
    }

    pub fn rules(&self) -> &[TableRule] {
        &self.rules
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        root: NonTerminalId,
        num_states: usize,
        num_nonterminals: usize,
        num_tokens: usize,
        actions: Vec<Action>,
        gotos: Vec<i32>,
        rules: Vec<TableRule>,
    ) -> Self {
        debug_assert_eq!(actions.len(), num_states * num_tokens);
        debug_assert_eq!(gotos.len(), num_states * num_nonterminals);
        Self {
            root,
            num_states,
            num_nonterminals,
            num_tokens,
            actions,
            gotos,
            rules,
        }
    }

    /// Parses the whole token stream, raising the first error and tearing
    /// down the partial node stack.
    pub fn parse(
        &self,
        scanner: &mut Scanner,
        action: Option<&mut dyn ParserAction>,
    ) -> Result<Node, ParserError> {
        self.parse_inner(scanner, action, None)
            .map(|node| node.expect("strict mode raises instead of withholding the tree"))
    }

    /// Parses with recovery: on an error action the offending lookahead is
    /// recorded and input is discarded until a token with a defined action
    /// for the current state appears (or input runs out). No tree is
    /// returned if any error occurred. Lexical and I/O errors still abort.
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
        mut action: Option<&mut dyn ParserAction>,
        mut errors: Option<&mut Vec<ParserError>>,
    ) -> Result<Option<Node>, ParserError> {
        let mut state_stack = vec![0usize];
        let mut node_stack: Vec<Node> = Vec::new();
        let mut lookahead = scanner.next_token()?;
        let mut has_error = false;

        loop {
            let top = *state_stack.last().expect("the state stack never drains");
            match self.action_for(top, lookahead.as_ref().map(|token| token.id())) {
                Action::Shift(target) => {
                    let token = lookahead
                        .take()
                        .expect("shift actions only exist in token columns");
                    node_stack.push(Node::Token(token));
                    lookahead = scanner.next_token()?;
                    state_stack.push(target);
                }
                Action::Reduce(rule_index) => {
                    let rule = &self.rules[rule_index];
                    let arity = rule.symbols().len();
                    debug_assert!(arity < state_stack.len());
                    state_stack.truncate(state_stack.len() - arity);
                    let children = node_stack.split_off(node_stack.len() - arity);
                    let node = NonTerminal::new(rule.left(), rule.local_index(), children);
                    if let Some(action) = action.as_deref_mut() {
                        action.recognized(&node);
                    }
                    node_stack.push(Node::NonTerminal(node));
                    let resume = *state_stack.last().expect("the state stack never drains");
                    let target = self
                        .goto(resume, rule.left())
                        .expect("a goto entry exists after every reduction");
                    state_stack.push(target);
                }
                Action::Halt => break,
                Action::Error => {
                    has_error = true;
                    let error = match &lookahead {
                        Some(token) => ParserError::unexpected_token(
                            scanner.input_mut(),
                            token.location().clone(),
                            token.lexeme(),
                        ),
                        None => ParserError::unexpected_end_of_input(scanner.input_mut()),
                    };
                    match errors.as_deref_mut() {
                        Some(list) => {
                            list.push(error);
                            // discard lookaheads until one has a defined action
                            loop {
                                lookahead = scanner.next_token()?;
                                match &lookahead {
                                    None => break,
                                    Some(token)
                                        if !matches!(
                                            self.action_for(top, Some(token.id())),
                                            Action::Error
                                        ) =>
                                    {
                                        break
                                    }
                                    Some(_) => {}
                                }
                            }
                            if lookahead.is_none() {
                                break;
                            }
                        }
                        None => return Err(error),
                    }
                }
            }
        }

        if has_error {
            return Ok(None);
        }
        debug_assert_eq!(node_stack.len(), 1);
        Ok(Some(
            node_stack
                .pop()
                .expect("a halted parse leaves exactly the root node"),
        ))
    }
}
