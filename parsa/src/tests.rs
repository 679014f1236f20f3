//! Cross-module tests: end-to-end scenarios for the whole pipeline,
//! serialization round trips, boundary behaviors, and property tests
//! checking the regex compiler against the `regex` crate on a pattern
//! subset both understand.

use crate::dfa::Dfa;
use crate::error::ParserError;
use crate::grammar::{
    Grammar, Lookahead, ParserGrammar, Rule, ScannerGrammar, Symbol, TokenType,
};
use crate::input::{Input, MemoryInput};
use crate::loader;
use crate::nfa::Nfa;
use crate::parser::conflict::CompileResult;
use crate::parser::tree::NonTerminal;
use crate::parser::{ParserAction, ParserTable};
use crate::regex::Regex;
use crate::scanner::{Scanner, ScannerAutomata};
use ::regex::Regex as LibRegex;
use proptest::prelude::*;
use std::rc::Rc;

fn compile_scanner(
    grammar: &mut Grammar,
    rules: &[(&str, &str, bool)],
) -> Rc<ScannerAutomata> {
    let mut tokens = ScannerGrammar::new();
    for &(name, pattern, ignored) in rules {
        let mut token_type = TokenType::new(name, pattern).unwrap();
        token_type.set_ignored(ignored);
        tokens.add_token_type(token_type);
    }
    Rc::new(tokens.compile(grammar))
}

fn scan(automata: &Rc<ScannerAutomata>, input: &str) -> Scanner {
    Scanner::new(
        Rc::clone(automata),
        Box::new(MemoryInput::new(input, "test")),
    )
}

/// Records the names of recognized non-terminals, in callback order.
struct RecordNames<'a> {
    grammar: &'a Grammar,
    names: Vec<String>,
}

impl ParserAction for RecordNames<'_> {
    fn recognized(&mut self, non_terminal: &NonTerminal) {
        self.names
            .push(self.grammar.nonterminal_name(non_terminal.id()).unwrap().to_string());
    }
}

/*****************************************************************************
 * End-to-end scenarios
 *****************************************************************************/

#[test]
fn regex_parity_automaton() {
    // even number of a's, or an odd number of b's: the minimal automaton
    // tracks both parities
    let regex = Regex::compile("(b*ab*ab*)*|(a*ba*ba*)*ba*").unwrap();
    assert_eq!(regex.dfa().num_states(), 4);

    for accepted in ["", "aa", "ba", "abab"] {
        assert!(regex.matches(accepted), "should accept {accepted:?}");
    }
    for rejected in ["a", "abb", "ababa"] {
        assert!(!regex.matches(rejected), "should reject {rejected:?}");
    }
}

#[test]
fn scanner_token_stream() {
    let mut grammar = Grammar::new();
    let automata = compile_scanner(
        &mut grammar,
        &[
            ("A", "a", false),
            ("NUM", "\\d+(\\.\\d+)?", false),
            ("ID", "[a-zA-Z_]\\w*", false),
            ("WS", "\\s+", true),
        ],
    );
    let mut scanner = scan(&automata, "a 32 aa a1 1.1");

    let expected = [("A", "a"), ("NUM", "32"), ("ID", "aa"), ("ID", "a1"), ("NUM", "1.1")];
    for (name, lexeme) in expected {
        let token = scanner.next_token().unwrap().unwrap();
        assert_eq!(token.id(), grammar.token_id(name).unwrap(), "{lexeme:?}");
        assert_eq!(token.lexeme(), lexeme);
    }
    assert!(scanner.next_token().unwrap().is_none());
}

#[test]
fn longest_match_wins_over_priority() {
    let mut grammar = Grammar::new();
    let automata = compile_scanner(
        &mut grammar,
        &[("IF", "if", false), ("ID", "[a-z]+", false)],
    );

    // an exact tie goes to the earlier declaration
    let token = scan(&automata, "if").next_token().unwrap().unwrap();
    assert_eq!(token.id(), grammar.token_id("IF").unwrap());

    // a longer match beats declaration priority
    let token = scan(&automata, "ifx").next_token().unwrap().unwrap();
    assert_eq!(token.id(), grammar.token_id("ID").unwrap());
    assert_eq!(token.lexeme(), "ifx");
}

/// The dragon-book exercise grammar: S ::= A a; A ::= B C | S;
/// B ::= b | ε; C ::= c | ε. Not LL(1) — the conflicts resolve to the
/// lower-numbered alternatives, which keeps the table usable.
fn nullable_sample() -> (Grammar, Rc<ScannerAutomata>, ParserGrammar, CompileResult) {
    let mut grammar = Grammar::new();
    let automata = compile_scanner(
        &mut grammar,
        &[("a", "a", false), ("b", "b", false), ("c", "c", false), ("q", "q", false)],
    );

    let s = grammar.create_nonterminal_id("S").unwrap();
    let a_nt = grammar.create_nonterminal_id("A").unwrap();
    let b_nt = grammar.create_nonterminal_id("B").unwrap();
    let c_nt = grammar.create_nonterminal_id("C").unwrap();
    let a = grammar.token_id("a").unwrap();
    let b = grammar.token_id("b").unwrap();
    let c = grammar.token_id("c").unwrap();

    let mut rules = ParserGrammar::new();
    rules.add_rule(Rule::new(s, vec![Symbol::NonTerminal(a_nt), Symbol::Token(a)]));
    rules.add_rule(Rule::new(
        a_nt,
        vec![Symbol::NonTerminal(b_nt), Symbol::NonTerminal(c_nt)],
    ));
    rules.add_rule(Rule::new(a_nt, vec![Symbol::NonTerminal(s)]));
    rules.add_rule(Rule::new(b_nt, vec![Symbol::Token(b)]));
    rules.add_rule(Rule::new(b_nt, vec![]));
    rules.add_rule(Rule::new(c_nt, vec![Symbol::Token(c)]));
    rules.add_rule(Rule::new(c_nt, vec![]));

    (grammar, automata, rules, CompileResult::new())
}

#[test]
fn ll1_parse_with_nullable_rules() {
    let (grammar, automata, rules, mut result) = nullable_sample();

    let firsts = rules.first_sets(&grammar);
    let follows = rules.follow_sets(&grammar, &firsts);
    let s = grammar.nonterminal_id("S").unwrap();
    let b_nt = grammar.nonterminal_id("B").unwrap();
    let first_s: Vec<usize> = firsts[s].tokens().iter().copied().collect();
    assert_eq!(first_s, vec![
        grammar.token_id("a").unwrap(),
        grammar.token_id("b").unwrap(),
        grammar.token_id("c").unwrap(),
    ]);
    let follow_b: Vec<Lookahead> = follows[b_nt].iter().copied().collect();
    assert_eq!(follow_b, vec![
        Lookahead::Token(grammar.token_id("a").unwrap()),
        Lookahead::Token(grammar.token_id("c").unwrap()),
    ]);

    let table = rules.compile_ll1(&grammar, &mut result);
    assert!(result.has_conflicts());

    let mut scanner = scan(&automata, "bca");
    let mut record = RecordNames { grammar: &grammar, names: Vec::new() };
    let tree = table.parse(&mut scanner, Some(&mut record)).unwrap();

    // S(A(B("b") C("c")) "a")
    let root = tree.as_nonterminal().unwrap();
    assert_eq!(root.id(), s);
    let a_node = root.nonterminal_at(0);
    let b_node = a_node.nonterminal_at(0);
    let c_node = a_node.nonterminal_at(1);
    assert_eq!(b_node.token_at(0).lexeme(), "b");
    assert_eq!(c_node.token_at(0).lexeme(), "c");
    assert_eq!(root.token_at(1).lexeme(), "a");

    // the action callback runs in post-order over the accepted tree
    assert_eq!(record.names, ["B", "C", "A", "S"]);
}

#[test]
fn ll1_recovery_reports_and_withholds() {
    let (grammar, automata, rules, mut result) = nullable_sample();
    let table = rules.compile_ll1(&grammar, &mut result);

    let mut scanner = scan(&automata, "bqca");
    let mut errors = Vec::new();
    let tree = table
        .parse_with_recovery(&mut scanner, None, &mut errors)
        .unwrap();

    // one unexpected token at the q, then the parse resumes at c, but no
    // tree is handed out once anything failed
    assert!(tree.is_none());
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ParserError::UnexpectedToken(_)));
    let location = errors[0].location().unwrap();
    assert_eq!((location.line(), location.column()), (1, 2));
}

/// The arithmetic grammar: E ::= E + T | T; T ::= T * F | F;
/// F ::= ( E ) | id.
fn arithmetic() -> (Grammar, Rc<ScannerAutomata>, ParserGrammar) {
    let mut grammar = Grammar::new();
    let automata = compile_scanner(
        &mut grammar,
        &[
            ("PLUS", "\\+", false),
            ("TIMES", "\\*", false),
            ("OPEN", "\\(", false),
            ("CLOSE", "\\)", false),
            ("id", "[a-z]+", false),
            ("WS", "\\s+", true),
        ],
    );

    let e = grammar.create_nonterminal_id("E").unwrap();
    let t = grammar.create_nonterminal_id("T").unwrap();
    let f = grammar.create_nonterminal_id("F").unwrap();
    let plus = grammar.token_id("PLUS").unwrap();
    let times = grammar.token_id("TIMES").unwrap();
    let open = grammar.token_id("OPEN").unwrap();
    let close = grammar.token_id("CLOSE").unwrap();
    let id = grammar.token_id("id").unwrap();

    let mut rules = ParserGrammar::new();
    rules.add_rule(Rule::new(
        e,
        vec![Symbol::NonTerminal(e), Symbol::Token(plus), Symbol::NonTerminal(t)],
    ));
    rules.add_rule(Rule::new(e, vec![Symbol::NonTerminal(t)]));
    rules.add_rule(Rule::new(
        t,
        vec![Symbol::NonTerminal(t), Symbol::Token(times), Symbol::NonTerminal(f)],
    ));
    rules.add_rule(Rule::new(t, vec![Symbol::NonTerminal(f)]));
    rules.add_rule(Rule::new(
        f,
        vec![Symbol::Token(open), Symbol::NonTerminal(e), Symbol::Token(close)],
    ));
    rules.add_rule(Rule::new(f, vec![Symbol::Token(id)]));
    (grammar, automata, rules)
}

#[test]
fn slr1_parse_builds_left_skewed_sum() {
    let (grammar, automata, rules) = arithmetic();
    let mut result = CompileResult::new();
    let table = rules.compile_slr1(&grammar, &mut result).unwrap();
    assert!(!result.has_conflicts());

    let mut scanner = scan(&automata, "id + id * id");
    let mut record = RecordNames { grammar: &grammar, names: Vec::new() };
    let tree = table.parse(&mut scanner, Some(&mut record)).unwrap();

    // reductions fire bottom-up, which is exactly the post-order of the
    // resulting tree
    assert_eq!(record.names, ["F", "T", "E", "F", "T", "F", "T", "E"]);

    // the + sits at the root, with the * nested in its right operand
    let e = tree.as_nonterminal().unwrap();
    assert_eq!(grammar.nonterminal_name(e.id()).unwrap(), "E");
    assert_eq!(e.local_rule(), 0); // E ::= E + T
    assert_eq!(e.token_at(1).lexeme(), "+");
    let right = e.nonterminal_at(2);
    assert_eq!(right.local_rule(), 0); // T ::= T * F
    assert_eq!(right.token_at(1).lexeme(), "*");

    let lexemes: Vec<&str> = tree.tokens().iter().map(|t| t.lexeme()).collect();
    assert_eq!(lexemes, ["id", "+", "id", "*", "id"]);
}

#[test]
fn slr1_recovery_resumes_and_withholds() {
    let (grammar, automata, rules) = arithmetic();
    let mut result = CompileResult::new();
    let table = rules.compile_slr1(&grammar, &mut result).unwrap();

    let mut scanner = scan(&automata, "id + + id");
    let mut errors = Vec::new();
    let tree = table
        .parse_with_recovery(&mut scanner, None, &mut errors)
        .unwrap();
    assert!(tree.is_none());
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ParserError::UnexpectedToken(_)));

    // strict mode raises instead
    let mut scanner = scan(&automata, "id + + id");
    assert!(matches!(
        table.parse(&mut scanner, None),
        Err(ParserError::UnexpectedToken(_))
    ));
}

/*****************************************************************************
 * Round trips
 *****************************************************************************/

#[test]
fn scanner_blob_round_trip() {
    let mut grammar = Grammar::new();
    let automata = compile_scanner(
        &mut grammar,
        &[
            ("NUM", "\\d+(\\.\\d+)?", false),
            ("ID", "[a-zA-Z_]\\w*", false),
            ("WS", "\\s+", true),
        ],
    );
    let bytes = loader::scanner_to_bytes(&automata);
    let reloaded = loader::scanner_from_bytes(&bytes).unwrap();
    assert_eq!(*automata, reloaded);
    assert_eq!(loader::scanner_to_bytes(&reloaded), bytes);
}

#[test]
fn ll1_blob_round_trip() {
    let (grammar, _, rules, mut result) = nullable_sample();
    let table = ParserTable::from(rules.compile_ll1(&grammar, &mut result));
    let bytes = loader::table_to_bytes(&table);
    let reloaded = loader::table_from_bytes(&bytes).unwrap();
    assert_eq!(loader::table_to_bytes(&reloaded), bytes);
}

#[test]
fn slr1_blob_round_trip() {
    let (grammar, _, rules) = arithmetic();
    let mut result = CompileResult::new();
    let table = ParserTable::from(rules.compile_slr1(&grammar, &mut result).unwrap());
    let bytes = loader::table_to_bytes(&table);
    let reloaded = loader::table_from_bytes(&bytes).unwrap();
    assert_eq!(loader::table_to_bytes(&reloaded), bytes);
}

#[test]
fn combined_blob_round_trip_and_reuse() {
    let (grammar, automata, rules) = arithmetic();
    let mut result = CompileResult::new();
    let table = ParserTable::from(rules.compile_slr1(&grammar, &mut result).unwrap());

    let bytes = loader::save_buffer(Some(&grammar), Some(&automata), Some(&table));
    let loaded = loader::load_buffer(&bytes).unwrap();

    let names: Vec<&str> = loaded.grammar.token_names().collect();
    assert_eq!(names, ["PLUS", "TIMES", "OPEN", "CLOSE", "id", "WS"]);
    assert_eq!(loaded.grammar.nonterminal_count(), 3);

    // the reloaded artifacts drive a parse just like the originals
    let scanner_automata = Rc::new(loaded.scanner.unwrap());
    let reloaded_table = loaded.table.unwrap();
    let mut scanner = scan(&scanner_automata, "id * (id + id)");
    let tree = reloaded_table.parse(&mut scanner, None).unwrap();
    let lexemes: Vec<&str> = tree.tokens().iter().map(|t| t.lexeme()).collect();
    assert_eq!(lexemes, ["id", "*", "(", "id", "+", "id", ")"]);

    let again = loader::save_buffer(
        Some(&loaded.grammar),
        Some(&scanner_automata),
        Some(&reloaded_table),
    );
    assert_eq!(again, bytes);
}

#[test]
fn empty_sections_are_omitted() {
    let bytes = loader::save_buffer(None, None, None);
    let loaded = loader::load_buffer(&bytes).unwrap();
    assert_eq!(loaded.grammar.token_count(), 0);
    assert!(loaded.scanner.is_none());
    assert!(loaded.table.is_none());
}

/*****************************************************************************
 * Boundary behaviors
 *****************************************************************************/

#[test]
fn empty_language_minimizes_to_one_rejecting_state() {
    // a negated set covering the whole alphabet matches nothing
    let regex = Regex::compile("[^.]").unwrap();
    assert_eq!(regex.dfa().num_states(), 1);
    assert!(!regex.matches(""));
    assert!(!regex.matches("a"));
}

#[test]
fn parse_of_empty_input_requires_nullable_start() {
    let mut grammar = Grammar::new();
    let automata = compile_scanner(&mut grammar, &[("a", "a", false)]);
    let a = grammar.token_id("a").unwrap();
    let s = grammar.create_nonterminal_id("S").unwrap();

    // S ::= a S | ε  — nullable, so the empty input is a valid sentence
    let mut nullable = ParserGrammar::new();
    nullable.add_rule(Rule::new(s, vec![Symbol::Token(a), Symbol::NonTerminal(s)]));
    nullable.add_rule(Rule::new(s, vec![]));

    let mut result = CompileResult::new();
    let slr = nullable.compile_slr1(&grammar, &mut result).unwrap();
    let tree = slr.parse(&mut scan(&automata, ""), None).unwrap();
    assert_eq!(tree.as_nonterminal().unwrap().id(), s);
    assert!(tree.as_nonterminal().unwrap().children().is_empty());

    let ll1 = nullable.compile_ll1(&grammar, &mut result);
    let tree = ll1.parse(&mut scan(&automata, ""), None).unwrap();
    assert!(tree.as_nonterminal().unwrap().children().is_empty());

    // S ::= a  — not nullable, so the empty input is an error
    let mut strict = ParserGrammar::new();
    strict.add_rule(Rule::new(s, vec![Symbol::Token(a)]));
    let slr = strict.compile_slr1(&grammar, &mut result).unwrap();
    assert!(matches!(
        slr.parse(&mut scan(&automata, ""), None),
        Err(ParserError::UnexpectedEndOfInput(_))
    ));
}

#[test]
fn rewind_honors_the_mark_contract() {
    let mut input = MemoryInput::new("abcdef", "t");
    input.read_byte().unwrap();
    input.mark();
    for _ in 0..4 {
        input.read_byte().unwrap();
    }
    // anything up to the bytes consumed since the mark may be replayed
    input.rewind(4).unwrap();
    assert_eq!(input.position(), 5);
    input.rewind(0).unwrap();
    assert_eq!(input.position(), 1);
    assert_eq!(input.read_byte().unwrap(), b'b');
}

#[test]
fn nfa_determinization_matches_nfa_language() {
    // (ab|a)* has genuinely nondeterministic prefixes
    let regex = Regex::compile("(ab|a)*").unwrap();
    for (text, expected) in [
        ("", true),
        ("a", true),
        ("ab", true),
        ("aab", true),
        ("abab", true),
        ("b", false),
        ("ba", false),
        ("abb", false),
    ] {
        assert_eq!(regex.matches(text), expected, "{text:?}");
    }
}

/*****************************************************************************
 * Properties
 *****************************************************************************/

/// Patterns in the syntax subset shared with the `regex` crate: literals
/// and classes over a–e, grouping, alternation and the three factors.
#[derive(Clone, Debug)]
enum Pat {
    Lit(char),
    Class(Vec<char>),
    Seq(Vec<Pat>),
    Alt(Box<Pat>, Box<Pat>),
    Star(Box<Pat>),
    Plus(Box<Pat>),
    Opt(Box<Pat>),
}

impl Pat {
    fn atom(&self) -> String {
        match self {
            Pat::Lit(_) | Pat::Class(_) => self.render(),
            _ => format!("({})", self.render()),
        }
    }

    fn render(&self) -> String {
        match self {
            Pat::Lit(c) => c.to_string(),
            Pat::Class(chars) => {
                let mut out = String::from("[");
                out.extend(chars.iter());
                out.push(']');
                out
            }
            Pat::Seq(items) => items.iter().map(Pat::atom).collect(),
            Pat::Alt(a, b) => format!("{}|{}", a.atom(), b.atom()),
            Pat::Star(p) => format!("{}*", p.atom()),
            Pat::Plus(p) => format!("{}+", p.atom()),
            Pat::Opt(p) => format!("{}?", p.atom()),
        }
    }
}

fn pat_strategy() -> impl Strategy<Value = Pat> {
    let leaf = prop_oneof![
        prop::char::range('a', 'e').prop_map(Pat::Lit),
        prop::collection::vec(prop::char::range('a', 'e'), 1..4).prop_map(Pat::Class),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Pat::Seq),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Pat::Alt(Box::new(a), Box::new(b))),
            inner.clone().prop_map(|p| Pat::Star(Box::new(p))),
            inner.clone().prop_map(|p| Pat::Plus(Box::new(p))),
            inner.prop_map(|p| Pat::Opt(Box::new(p))),
        ]
    })
}

/// A random DFA over the symbols a, b, c with `1..=6` states.
fn dfa_strategy() -> impl Strategy<Value = Dfa> {
    (1usize..6).prop_flat_map(|states| {
        (
            prop::collection::vec(
                prop::collection::vec(-1i32..states as i32, 3),
                states,
            ),
            prop::collection::vec(any::<bool>(), states),
        )
            .prop_map(move |(rows, accepting)| {
                let mut dfa = Dfa::new(states);
                for (state, row) in rows.iter().enumerate() {
                    for (offset, &target) in row.iter().enumerate() {
                        dfa.set_transition(state, b'a' + offset as u8, target);
                    }
                    if accepting[state] {
                        dfa.set_accepting(state);
                    }
                }
                dfa
            })
    })
}

proptest! {
    /// The compiled pattern agrees with the `regex` crate on every input
    /// over the shared alphabet.
    #[test]
    fn regex_agrees_with_oracle(
        pat in pat_strategy(),
        inputs in prop::collection::vec("[a-e]{0,8}", 16),
    ) {
        let pattern = pat.render();
        let compiled = Regex::compile(&pattern).unwrap();
        let oracle = LibRegex::new(&format!("^(?:{pattern})$")).unwrap();
        for input in &inputs {
            prop_assert_eq!(
                compiled.matches(input),
                oracle.is_match(input),
                "pattern {:?} on {:?}", pattern, input
            );
        }
    }

    /// Minimization preserves the language and never grows the automaton;
    /// minimizing a minimal automaton changes nothing.
    #[test]
    fn minimize_preserves_language(dfa in dfa_strategy()) {
        let mut nfa = Nfa::from_dfa(&dfa);
        nfa.determinize(); // drops unreachable states
        let reachable = nfa.to_dfa();

        let mut minimized = nfa.clone();
        minimized.minimize(true);
        let minimized_dfa = minimized.to_dfa();

        prop_assert!(minimized_dfa.equivalent_to(&reachable));
        prop_assert!(minimized_dfa.num_states() <= reachable.num_states());

        let mut again = minimized.clone();
        again.minimize(true);
        prop_assert_eq!(again.num_states(), minimized.num_states());
    }

    /// A successful parse yields its input: the tree's tokens read back in
    /// scan order.
    #[test]
    fn parse_tree_yield_is_the_token_sequence(depth in 1usize..30) {
        let (grammar, automata, rules) = arithmetic();
        let mut result = CompileResult::new();
        let table = rules.compile_slr1(&grammar, &mut result).unwrap();

        let input = vec!["id"; depth].join(" + ");
        let mut scanner = scan(&automata, &input);
        let tree = table.parse(&mut scanner, None).unwrap();
        let lexemes: Vec<&str> = tree.tokens().iter().map(|t| t.lexeme()).collect();
        let expected: Vec<&str> = input.split_whitespace().collect();
        prop_assert_eq!(lexemes, expected);
        prop_assert_eq!(
            tree.as_nonterminal().unwrap().id(),
            grammar.nonterminal_id("E").unwrap()
        );
    }
}
