//! The bootstrapped pattern grammar. The regex compiler's scanner automata
//! and LL(1) prediction table are produced by the toolchain itself from a
//! small fixed grammar:
//!
//! ```text
//! <Regex>      ::= <Expression> <RegexOr> | ;
//! <RegexOr>    ::= OR <Regex> | <Regex> ;
//! <Expression> ::= SYMBOL <Factor>
//!                | GROUP_START <Regex> GROUP_END <Factor>
//!                | SET_START <SymbolSet> SET_END <Factor> ;
//! <Factor>     ::= CLOSURE | ONE_CLOSURE | OPTIONAL | ;
//! <SymbolSet>  ::= <SymbolList> | NOT <SymbolList> ;
//! <SymbolList> ::= SYMBOL <SymbolList> | ;
//! ```
//!
//! The single-byte tokens are declared first so they win ties against
//! SYMBOL, which accepts any non-backslash byte or a backslash followed by
//! any byte. The grammar is LL(1); building its table must never report a
//! conflict.

use crate::dfa::Dfa;
use crate::grammar::{Grammar, NonTerminalId, ParserGrammar, Rule, ScannerGrammar, Symbol, TokenType};
use crate::parser::conflict::CompileResult;
use crate::parser::ll1::Ll1Table;
use crate::regex::Regex;
use crate::scanner::ScannerAutomata;
use crate::ALPHABET_SIZE;
use std::rc::Rc;

pub(crate) struct RegexGrammar {
    pub(crate) scanner: Rc<ScannerAutomata>,
    pub(crate) table: Rc<Ll1Table>,
    pub(crate) regex_id: NonTerminalId,
    pub(crate) regex_or_id: NonTerminalId,
    pub(crate) expression_id: NonTerminalId,
    pub(crate) factor_id: NonTerminalId,
    pub(crate) symbol_set_id: NonTerminalId,
    pub(crate) symbol_list_id: NonTerminalId,
}

/// The SYMBOL token automaton: any byte except a backslash, or a backslash
/// followed by any byte. Overlap with the operator tokens is fine since
/// SYMBOL is declared last.
fn symbol_token_dfa() -> Dfa {
    let mut dfa = Dfa::new(3);
    for byte in 1..ALPHABET_SIZE as u8 {
        dfa.set_transition(0, byte, 2);
        dfa.set_transition(1, byte, 2);
    }
    dfa.set_transition(0, b'\\', 1);
    dfa.set_accepting(2);
    dfa
}

impl RegexGrammar {
    pub(crate) fn new() -> Self {
        let mut grammar = Grammar::new();

        let mut tokens = ScannerGrammar::new();
        let operators = [
            ("CLOSURE", b'*'),
            ("ONE_CLOSURE", b'+'),
            ("OPTIONAL", b'?'),
            ("OR", b'|'),
            ("NOT", b'^'),
            ("GROUP_START", b'('),
            ("GROUP_END", b')'),
            ("SET_START", b'['),
            ("SET_END", b']'),
        ];
        for (name, symbol) in operators {
            tokens.add_token_type(TokenType::with_regex(name, Regex::from_symbol(symbol)));
        }
        tokens.add_token_type(TokenType::with_regex(
            "SYMBOL",
            Regex::from_dfa(symbol_token_dfa()),
        ));
        let scanner = Rc::new(tokens.compile(&mut grammar));

        let closure = grammar.token_id("CLOSURE").expect("declared above");
        let one_closure = grammar.token_id("ONE_CLOSURE").expect("declared above");
        let optional = grammar.token_id("OPTIONAL").expect("declared above");
        let or = grammar.token_id("OR").expect("declared above");
        let not = grammar.token_id("NOT").expect("declared above");
        let group_start = grammar.token_id("GROUP_START").expect("declared above");
        let group_end = grammar.token_id("GROUP_END").expect("declared above");
        let set_start = grammar.token_id("SET_START").expect("declared above");
        let set_end = grammar.token_id("SET_END").expect("declared above");
        let symbol = grammar.token_id("SYMBOL").expect("declared above");

        let regex_id = grammar.create_nonterminal_id("Regex").expect("fresh grammar");
        let regex_or_id = grammar
            .create_nonterminal_id("RegexOr")
            .expect("fresh grammar");
        let expression_id = grammar
            .create_nonterminal_id("Expression")
            .expect("fresh grammar");
        let factor_id = grammar
            .create_nonterminal_id("Factor")
            .expect("fresh grammar");
        let symbol_set_id = grammar
            .create_nonterminal_id("SymbolSet")
            .expect("fresh grammar");
        let symbol_list_id = grammar
            .create_nonterminal_id("SymbolList")
            .expect("fresh grammar");

        let mut rules = ParserGrammar::new();
        // <Regex> ::= <Expression> <RegexOr> | ε
        rules.add_rule(Rule::new(
            regex_id,
            vec![
                Symbol::NonTerminal(expression_id),
                Symbol::NonTerminal(regex_or_id),
            ],
        ));
        rules.add_rule(Rule::new(regex_id, vec![]));
        // <RegexOr> ::= OR <Regex> | <Regex>
        rules.add_rule(Rule::new(
            regex_or_id,
            vec![Symbol::Token(or), Symbol::NonTerminal(regex_id)],
        ));
        rules.add_rule(Rule::new(regex_or_id, vec![Symbol::NonTerminal(regex_id)]));
        // <Expression> ::= SYMBOL <Factor>
        //                | GROUP_START <Regex> GROUP_END <Factor>
        //                | SET_START <SymbolSet> SET_END <Factor>
        rules.add_rule(Rule::new(
            expression_id,
            vec![Symbol::Token(symbol), Symbol::NonTerminal(factor_id)],
        ));
        rules.add_rule(Rule::new(
            expression_id,
            vec![
                Symbol::Token(group_start),
                Symbol::NonTerminal(regex_id),
                Symbol::Token(group_end),
                Symbol::NonTerminal(factor_id),
            ],
        ));
        rules.add_rule(Rule::new(
            expression_id,
            vec![
                Symbol::Token(set_start),
                Symbol::NonTerminal(symbol_set_id),
                Symbol::Token(set_end),
                Symbol::NonTerminal(factor_id),
            ],
        ));
        // <Factor> ::= CLOSURE | ONE_CLOSURE | OPTIONAL | ε
        rules.add_rule(Rule::new(factor_id, vec![Symbol::Token(closure)]));
        rules.add_rule(Rule::new(factor_id, vec![Symbol::Token(one_closure)]));
        rules.add_rule(Rule::new(factor_id, vec![Symbol::Token(optional)]));
        rules.add_rule(Rule::new(factor_id, vec![]));
        // <SymbolSet> ::= <SymbolList> | NOT <SymbolList>
        rules.add_rule(Rule::new(
            symbol_set_id,
            vec![Symbol::NonTerminal(symbol_list_id)],
        ));
        rules.add_rule(Rule::new(
            symbol_set_id,
            vec![Symbol::Token(not), Symbol::NonTerminal(symbol_list_id)],
        ));
        // <SymbolList> ::= SYMBOL <SymbolList> | ε
        rules.add_rule(Rule::new(
            symbol_list_id,
            vec![Symbol::Token(symbol), Symbol::NonTerminal(symbol_list_id)],
        ));
        rules.add_rule(Rule::new(symbol_list_id, vec![]));

        let mut result = CompileResult::new();
        let table = Rc::new(rules.compile_ll1(&grammar, &mut result));
        debug_assert!(!result.has_conflicts(), "the pattern grammar is LL(1)");

        Self {
            scanner,
            table,
            regex_id,
            regex_or_id,
            expression_id,
            factor_id,
            symbol_set_id,
            symbol_list_id,
        }
    }
}
