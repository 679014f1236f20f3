use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parsa::grammar::{Grammar, ParserGrammar, Rule, ScannerGrammar, Symbol, TokenType};
use parsa::input::MemoryInput;
use parsa::parser::conflict::CompileResult;
use parsa::regex::RegexCompiler;
use parsa::scanner::Scanner;
use std::rc::Rc;

const NUMBER_PATTERN: &str = "-?\\d+(\\.\\d+)?([eE][+\\-]?\\d+)?";

fn token_grammar() -> (Grammar, ScannerGrammar) {
    let mut grammar = Grammar::new();
    let mut tokens = ScannerGrammar::new();
    tokens.add_token_type(TokenType::new("NUM", NUMBER_PATTERN).unwrap());
    tokens.add_token_type(TokenType::new("ID", "[a-zA-Z_]\\w*").unwrap());
    tokens.add_token_type(TokenType::new("PLUS", "\\+").unwrap());
    tokens.add_token_type(TokenType::new("TIMES", "\\*").unwrap());
    let mut ws = TokenType::new("WS", "\\s+").unwrap();
    ws.set_ignored(true);
    tokens.add_token_type(ws);
    (grammar, tokens)
}

pub fn regex_compile(c: &mut Criterion) {
    let compiler = RegexCompiler::new();
    c.bench_function("regex compile", |b| {
        b.iter(|| compiler.compile(black_box(NUMBER_PATTERN)).unwrap())
    });
}

pub fn scanner_throughput(c: &mut Criterion) {
    let (mut grammar, tokens) = token_grammar();
    let automata = Rc::new(tokens.compile(&mut grammar));
    let input: String = "x1 + 42.5 * offset + 1e9 * rate "
        .repeat(256);

    c.bench_function("scanner throughput", |b| {
        b.iter(|| {
            let mut scanner = Scanner::new(
                Rc::clone(&automata),
                Box::new(MemoryInput::new(black_box(input.as_str()), "bench")),
            );
            let mut count = 0usize;
            while scanner.next_token().unwrap().is_some() {
                count += 1;
            }
            count
        })
    });
}

pub fn table_build(c: &mut Criterion) {
    let (mut grammar, tokens) = token_grammar();
    let _ = tokens.compile(&mut grammar);

    let e = grammar.create_nonterminal_id("E").unwrap();
    let t = grammar.create_nonterminal_id("T").unwrap();
    let f = grammar.create_nonterminal_id("F").unwrap();
    let plus = grammar.token_id("PLUS").unwrap();
    let times = grammar.token_id("TIMES").unwrap();
    let num = grammar.token_id("NUM").unwrap();
    let id = grammar.token_id("ID").unwrap();

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
    rules.add_rule(Rule::new(f, vec![Symbol::Token(num)]));
    rules.add_rule(Rule::new(f, vec![Symbol::Token(id)]));

    c.bench_function("slr1 table build", |b| {
        b.iter(|| {
            let mut result = CompileResult::new();
            rules
                .compile_slr1(black_box(&grammar), &mut result)
                .unwrap()
        })
    });
}

criterion_group!(benches, regex_compile, scanner_throughput, table_build);
criterion_main!(benches);
