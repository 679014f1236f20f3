//! # Grammar model
//! Names and structure of a language definition, shared by the scanner and
//! parser sides of the toolchain:
//!
//! * [Grammar] interns token and non-terminal names to dense integer ids in
//!   insertion order. Both tables sit side by side so a single grammar can
//!   drive both a scanner and a parser.
//! * [ScannerGrammar] is a declaration-ordered list of [TokenType]s (name,
//!   compiled regex, ignored flag); [ScannerGrammar::compile] merges them
//!   into one [ScannerAutomata](crate::scanner::ScannerAutomata) where
//!   earlier declarations win ties.
//! * [ParserGrammar] is a list of production [Rule]s over [Symbol]s and
//!   knows how to compute FIRST and FOLLOW sets; the table builders in
//!   [crate::parser] consume it.
//!
//! A token id equal to [Grammar::token_count] plays the role of the
//! end-of-input marker in parse tables; [Lookahead] makes that explicit at
//! the API surface.
//!
//! ```
//! use parsa::grammar::{Grammar, ParserGrammar, Rule, Symbol};
//!
//! let mut grammar = Grammar::new();
//! let plus = grammar.token_id_or_create("PLUS");
//! let num = grammar.token_id_or_create("NUM");
//! let expr = grammar.create_nonterminal_id("Expr").unwrap();
//!
//! // Expr ::= Expr PLUS NUM | NUM
//! let mut rules = ParserGrammar::new();
//! rules.add_rule(Rule::new(
//!     expr,
//!     vec![Symbol::NonTerminal(expr), Symbol::Token(plus), Symbol::Token(num)],
//! ));
//! rules.add_rule(Rule::new(expr, vec![Symbol::Token(num)]));
//!
//! let firsts = rules.first_sets(&grammar);
//! assert!(firsts[expr].tokens().contains(&num));
//! assert!(!firsts[expr].is_nullable());
//! ```

use crate::error::ParserError;
use crate::nfa::Nfa;
use crate::regex::Regex;
use crate::scanner::ScannerAutomata;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

pub type TokenId = usize;
pub type NonTerminalId = usize;

/// Interned token and non-terminal names. Ids are dense, starting at 0, in
/// insertion order; the reverse lookups exist for diagnostics and for
/// serializing the name tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grammar {
    token_names: Vec<Rc<str>>,
    token_ids: HashMap<Rc<str>, TokenId>,
    nonterminal_names: Vec<Rc<str>>,
    nonterminal_ids: HashMap<Rc<str>, NonTerminalId>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of the token type named `name`, allocating a fresh id if the
    /// name is new. Declaring the same token name twice is allowed; the
    /// scanner ORs the regexes together.
    pub fn token_id_or_create(&mut self, name: &str) -> TokenId {
        if let Some(&id) = self.token_ids.get(name) {
            return id;
        }
        let interned: Rc<str> = Rc::from(name);
        let id = self.token_names.len();
        self.token_names.push(Rc::clone(&interned));
        self.token_ids.insert(interned, id);
        id
    }

    pub fn token_id(&self, name: &str) -> Option<TokenId> {
        self.token_ids.get(name).copied()
    }

    pub fn has_token(&self, name: &str) -> bool {
        self.token_ids.contains_key(name)
    }

    pub fn token_count(&self) -> usize {
        self.token_names.len()
    }

    pub fn token_name(&self, id: TokenId) -> Option<&str> {
        self.token_names.get(id).map(|name| name.as_ref())
    }

    /// All token names, ordered by id.
    pub fn token_names(&self) -> impl Iterator<Item = &str> {
        self.token_names.iter().map(|name| name.as_ref())
    }

    /// Allocates an id for a new non-terminal name.
    pub fn create_nonterminal_id(&mut self, name: &str) -> Result<NonTerminalId, ParserError> {
        if self.nonterminal_ids.contains_key(name) {
            return Err(ParserError::DuplicateNonTerminal(name.to_string()));
        }
        let interned: Rc<str> = Rc::from(name);
        let id = self.nonterminal_names.len();
        self.nonterminal_names.push(Rc::clone(&interned));
        self.nonterminal_ids.insert(interned, id);
        Ok(id)
    }

    /// The id of an already-declared non-terminal. Referencing an
    /// undeclared name is an error.
    pub fn nonterminal_id(&self, name: &str) -> Result<NonTerminalId, ParserError> {
        self.nonterminal_ids
            .get(name)
            .copied()
            .ok_or_else(|| ParserError::UndeclaredNonTerminal(name.to_string()))
    }

    pub fn has_nonterminal(&self, name: &str) -> bool {
        self.nonterminal_ids.contains_key(name)
    }

    pub fn nonterminal_count(&self) -> usize {
        self.nonterminal_names.len()
    }

    pub fn nonterminal_name(&self, id: NonTerminalId) -> Option<&str> {
        self.nonterminal_names.get(id).map(|name| name.as_ref())
    }

    /// All non-terminal names, ordered by id.
    pub fn nonterminal_names(&self) -> impl Iterator<Item = &str> {
        self.nonterminal_names.iter().map(|name| name.as_ref())
    }
}

/// One position of a production right-hand side: a terminal or a
/// non-terminal, by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    NonTerminal(NonTerminalId),
    Token(TokenId),
}

/// What the parser can see next: a real token, or the end of the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lookahead {
    Token(TokenId),
    End,
}

/// A production rule `left ::= right…`. Rules are numbered globally by
/// their position in the [ParserGrammar] and locally by their position
/// among the alternatives of the same left non-terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    left: NonTerminalId,
    right: Vec<Symbol>,
}

impl Rule {
    pub fn new(left: NonTerminalId, right: Vec<Symbol>) -> Self {
        Self { left, right }
    }

    pub fn left(&self) -> NonTerminalId {
        self.left
    }

    pub fn right(&self) -> &[Symbol] {
        &self.right
    }

    /// Renders the rule with names from `grammar`, BNF style. A token id
    /// outside the grammar renders as `$` (the internal end marker).
    pub fn render(&self, grammar: &Grammar) -> String {
        let mut out = format!(
            "<{}> ::=",
            grammar.nonterminal_name(self.left).unwrap_or("?")
        );
        if self.right.is_empty() {
            out.push_str(" /* empty */");
            return out;
        }
        for symbol in &self.right {
            match symbol {
                Symbol::NonTerminal(id) => {
                    out.push_str(&format!(" <{}>", grammar.nonterminal_name(*id).unwrap_or("?")));
                }
                Symbol::Token(id) => {
                    out.push(' ');
                    out.push_str(grammar.token_name(*id).unwrap_or("$"));
                }
            }
        }
        out
    }
}

/// The FIRST set of a non-terminal (or symbol sequence): the terminals that
/// can begin a derivation, plus a flag for whether the empty derivation is
/// possible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirstSet {
    tokens: BTreeSet<TokenId>,
    nullable: bool,
}

impl FirstSet {
    pub fn tokens(&self) -> &BTreeSet<TokenId> {
        &self.tokens
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// The production rules of a context-free grammar, with FIRST/FOLLOW
/// computation. The left non-terminal of the first rule is the start
/// symbol.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParserGrammar {
    rules: Vec<Rule>,
}

impl ParserGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The start symbol: the left non-terminal of the first rule.
    pub fn start_symbol(&self) -> NonTerminalId {
        assert!(!self.rules.is_empty(), "a parser grammar needs at least one rule");
        self.rules[0].left
    }

    /// Per non-terminal, whether it can derive the empty string. Fixpoint
    /// over the rules.
    fn nullable_set(&self, nonterminal_count: usize) -> Vec<bool> {
        let mut nullable = vec![false; nonterminal_count];
        let mut changed = true;
        while changed {
            changed = false;
            for rule in &self.rules {
                if nullable[rule.left] {
                    continue;
                }
                let derives_empty = rule.right.iter().all(|symbol| match symbol {
                    Symbol::Token(_) => false,
                    Symbol::NonTerminal(id) => nullable[*id],
                });
                if derives_empty {
                    nullable[rule.left] = true;
                    changed = true;
                }
            }
        }
        nullable
    }

    /// FIRST sets for all non-terminals of `grammar`, computed by
    /// round-robin fixpoint over the rules.
    pub fn first_sets(&self, grammar: &Grammar) -> Vec<FirstSet> {
        let count = grammar.nonterminal_count();
        let nullable = self.nullable_set(count);
        let mut firsts: Vec<FirstSet> = nullable
            .iter()
            .map(|&nullable| FirstSet {
                tokens: BTreeSet::new(),
                nullable,
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for rule in &self.rules {
                for symbol in &rule.right {
                    match symbol {
                        Symbol::Token(token) => {
                            changed |= firsts[rule.left].tokens.insert(*token);
                            break;
                        }
                        Symbol::NonTerminal(id) => {
                            let inherited: Vec<TokenId> =
                                firsts[*id].tokens.iter().copied().collect();
                            for token in inherited {
                                changed |= firsts[rule.left].tokens.insert(token);
                            }
                            if !nullable[*id] {
                                break;
                            }
                        }
                    }
                }
            }
        }
        firsts
    }

    /// The FIRST set of an arbitrary symbol sequence, given the per-
    /// non-terminal sets.
    pub fn sequence_first(firsts: &[FirstSet], sequence: &[Symbol]) -> FirstSet {
        let mut result = FirstSet::default();
        for symbol in sequence {
            match symbol {
                Symbol::Token(token) => {
                    result.tokens.insert(*token);
                    return result;
                }
                Symbol::NonTerminal(id) => {
                    result.tokens.extend(firsts[*id].tokens.iter().copied());
                    if !firsts[*id].nullable {
                        return result;
                    }
                }
            }
        }
        result.nullable = true;
        result
    }

    /// FOLLOW sets for all non-terminals. The start symbol's FOLLOW
    /// contains [Lookahead::End]; for every occurrence `B ::= α A β`,
    /// FIRST(β) feeds FOLLOW(A), and FOLLOW(B) does too when β is nullable.
    /// FOLLOW sets never contain an epsilon marker.
    pub fn follow_sets(&self, grammar: &Grammar, firsts: &[FirstSet]) -> Vec<BTreeSet<Lookahead>> {
        let count = grammar.nonterminal_count();
        let mut follows: Vec<BTreeSet<Lookahead>> = vec![BTreeSet::new(); count];
        follows[self.start_symbol()].insert(Lookahead::End);

        for rule in &self.rules {
            for (position, symbol) in rule.right.iter().enumerate() {
                if let Symbol::NonTerminal(id) = symbol {
                    let beta = Self::sequence_first(firsts, &rule.right[position + 1..]);
                    follows[*id].extend(beta.tokens.iter().map(|&t| Lookahead::Token(t)));
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for rule in &self.rules {
                for (position, symbol) in rule.right.iter().enumerate() {
                    if let Symbol::NonTerminal(id) = symbol {
                        let beta_nullable =
                            rule.right[position + 1..].iter().all(|s| match s {
                                Symbol::Token(_) => false,
                                Symbol::NonTerminal(b) => firsts[*b].nullable,
                            });
                        if beta_nullable {
                            let inherited: Vec<Lookahead> =
                                follows[rule.left].iter().copied().collect();
                            for lookahead in inherited {
                                changed |= follows[*id].insert(lookahead);
                            }
                        }
                    }
                }
            }
        }
        follows
    }

    /// Builds the LL(1) prediction table. Conflicts are recorded in
    /// `result` (keeping the smaller rule index as the default) and never
    /// abort the compilation.
    pub fn compile_ll1(
        &self,
        grammar: &Grammar,
        result: &mut crate::parser::conflict::CompileResult,
    ) -> crate::parser::ll1::Ll1Table {
        crate::parser::ll1::build(grammar, self, result)
    }

    /// Builds the SLR(1) action/goto tables. Conflicts are recorded in
    /// `result`; an unresolvable conflict (halt/reduce, or shift/shift)
    /// aborts with [ParserError::InvalidGrammar].
    pub fn compile_slr1(
        &self,
        grammar: &Grammar,
        result: &mut crate::parser::conflict::CompileResult,
    ) -> Result<crate::parser::slr1::Slr1Table, ParserError> {
        crate::parser::slr1::build(grammar, self, result)
    }
}

/// One token declaration of a scanner grammar: a name, the compiled regex
/// recognizing it, and whether recognized tokens are discarded.
#[derive(Clone, Debug)]
pub struct TokenType {
    name: String,
    regex: Regex,
    ignored: bool,
}

impl TokenType {
    /// Compiles `pattern` and pairs it with `name`.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, ParserError> {
        Ok(Self {
            name: name.into(),
            regex: Regex::compile(pattern)?,
            ignored: false,
        })
    }

    /// Pairs `name` with an already-compiled regex.
    pub fn with_regex(name: impl Into<String>, regex: Regex) -> Self {
        Self {
            name: name.into(),
            regex,
            ignored: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }
}

/// The lexical half of a grammar: token types in declaration order, earlier
/// entries winning length ties during scanning.
#[derive(Clone, Debug, Default)]
pub struct ScannerGrammar {
    token_types: Vec<TokenType>,
}

impl ScannerGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token_type(&mut self, token_type: TokenType) {
        self.token_types.push(token_type);
    }

    pub fn token_types(&self) -> &[TokenType] {
        &self.token_types
    }

    /// Compiles all token types into a single scanner automaton. Token ids
    /// are allocated in `grammar` in declaration order. Every token regex
    /// becomes a tagged NFA; the NFAs are folded together with ε-unions,
    /// determinized (a merged accept state keeps the smallest token id, the
    /// highest declaration priority) and minimized without merging accept
    /// states, so states recognizing different tokens stay distinct.
    pub fn compile(&self, grammar: &mut Grammar) -> ScannerAutomata {
        assert!(
            !self.token_types.is_empty(),
            "a scanner grammar needs at least one token type"
        );

        let mut merged: Option<(Nfa, HashMap<usize, TokenId>)> = None;
        for token_type in &self.token_types {
            let id = grammar.token_id_or_create(token_type.name());
            let nfa = Nfa::from_dfa(token_type.regex().dfa());
            let tags: HashMap<usize, TokenId> = nfa
                .final_states()
                .into_iter()
                .map(|state| (state, id))
                .collect();
            merged = Some(match merged {
                None => (nfa, tags),
                Some((merged_nfa, merged_tags)) => {
                    let (union, map_merged, map_new) = Nfa::union(&merged_nfa, &nfa);
                    let mut relocated = HashMap::new();
                    for (old, token) in merged_tags {
                        tag_state(&mut relocated, map_merged[old], token);
                    }
                    for (old, token) in tags {
                        tag_state(&mut relocated, map_new[old], token);
                    }
                    (union, relocated)
                }
            });
        }
        let (mut nfa, mut tags) = merged.expect("token type list checked non-empty");

        nfa.remove_epsilon_moves();

        let subsets = nfa.determinize();
        let mut relocated = HashMap::new();
        for (new_state, subset) in subsets.iter().enumerate() {
            if !nfa.is_accepting(new_state) {
                continue;
            }
            for old in subset {
                if let Some(&token) = tags.get(old) {
                    tag_state(&mut relocated, new_state, token);
                }
            }
        }
        tags = relocated;

        let mapping = nfa.minimize(false);
        let mut relocated = HashMap::new();
        for (old, token) in tags {
            if let Some(new_state) = mapping[old] {
                if nfa.is_accepting(new_state) {
                    tag_state(&mut relocated, new_state, token);
                }
            }
        }
        tags = relocated;

        let dfa = nfa.to_dfa();
        let mut state_tokens = vec![None; dfa.num_states()];
        for (state, token) in tags {
            state_tokens[state] = Some(token);
        }
        debug_assert!(
            (0..dfa.num_states()).all(|s| !dfa.is_accepting(s) || state_tokens[s].is_some()),
            "every accepting scanner state carries a token id"
        );

        let ignored = self
            .token_types
            .iter()
            .filter(|token_type| token_type.is_ignored())
            .map(|token_type| grammar.token_id_or_create(token_type.name()))
            .collect();

        ScannerAutomata::from_parts(dfa, state_tokens, ignored)
    }
}

/// Tags `state` with `token`, keeping the lowest id (highest declaration
/// priority) when several token types accept in the same state.
fn tag_state(tags: &mut HashMap<usize, TokenId>, state: usize, token: TokenId) {
    match tags.get_mut(&state) {
        Some(existing) => {
            if token < *existing {
                *existing = token;
            }
        }
        None => {
            tags.insert(state, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grammar from the classic dragon-book exercise:
    /// S ::= A a; A ::= S | B C; B ::= b | ε; C ::= c | ε
    fn sample() -> (Grammar, ParserGrammar, [TokenId; 3], [NonTerminalId; 4]) {
        let mut grammar = Grammar::new();
        let a = grammar.token_id_or_create("a");
        let b = grammar.token_id_or_create("b");
        let c = grammar.token_id_or_create("c");
        let s = grammar.create_nonterminal_id("S").unwrap();
        let nt_a = grammar.create_nonterminal_id("A").unwrap();
        let nt_b = grammar.create_nonterminal_id("B").unwrap();
        let nt_c = grammar.create_nonterminal_id("C").unwrap();

        let mut rules = ParserGrammar::new();
        rules.add_rule(Rule::new(s, vec![Symbol::NonTerminal(nt_a), Symbol::Token(a)]));
        rules.add_rule(Rule::new(nt_a, vec![Symbol::NonTerminal(s)]));
        rules.add_rule(Rule::new(
            nt_a,
            vec![Symbol::NonTerminal(nt_b), Symbol::NonTerminal(nt_c)],
        ));
        rules.add_rule(Rule::new(nt_b, vec![Symbol::Token(b)]));
        rules.add_rule(Rule::new(nt_b, vec![]));
        rules.add_rule(Rule::new(nt_c, vec![Symbol::Token(c)]));
        rules.add_rule(Rule::new(nt_c, vec![]));
        (grammar, rules, [a, b, c], [s, nt_a, nt_b, nt_c])
    }

    #[test]
    fn first_sets_with_nullability() {
        let (grammar, rules, [a, b, c], [s, nt_a, nt_b, nt_c]) = sample();
        let firsts = rules.first_sets(&grammar);

        assert_eq!(
            firsts[s].tokens().iter().copied().collect::<Vec<_>>(),
            vec![a, b, c]
        );
        assert!(!firsts[s].is_nullable());
        assert!(firsts[nt_a].is_nullable());
        assert!(firsts[nt_b].is_nullable());
        assert!(firsts[nt_c].is_nullable());
        assert_eq!(
            firsts[nt_b].tokens().iter().copied().collect::<Vec<_>>(),
            vec![b]
        );
    }

    #[test]
    fn follow_sets_strip_epsilon_and_seed_end() {
        let (grammar, rules, [a, _, c], [s, nt_a, nt_b, _]) = sample();
        let firsts = rules.first_sets(&grammar);
        let follows = rules.follow_sets(&grammar, &firsts);

        assert!(follows[s].contains(&Lookahead::End));
        // FOLLOW(B) = FIRST(C) \ {ε} ∪ FOLLOW(A) = {c} ∪ {a}
        assert_eq!(
            follows[nt_b].iter().copied().collect::<Vec<_>>(),
            vec![Lookahead::Token(a), Lookahead::Token(c)]
        );
        assert!(follows[nt_a].contains(&Lookahead::Token(a)));
    }

    #[test]
    fn duplicate_nonterminal_is_rejected() {
        let mut grammar = Grammar::new();
        grammar.create_nonterminal_id("S").unwrap();
        assert!(matches!(
            grammar.create_nonterminal_id("S"),
            Err(ParserError::DuplicateNonTerminal(_))
        ));
        assert!(matches!(
            grammar.nonterminal_id("T"),
            Err(ParserError::UndeclaredNonTerminal(_))
        ));
    }

    #[test]
    fn duplicate_token_names_share_an_id() {
        let mut grammar = Grammar::new();
        let first = grammar.token_id_or_create("NUM");
        let second = grammar.token_id_or_create("NUM");
        assert_eq!(first, second);
        assert_eq!(grammar.token_count(), 1);
    }
}
