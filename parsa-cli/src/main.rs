//! Command-line front end: compile grammar files to scanner and parse
//! tables, save/load them as combined binary blobs, and run the compiled
//! artifacts over an input file.

use clap::{Parser as ClapParser, ValueEnum};
use parsa::grammar::Grammar;
use parsa::input::FileInput;
use parsa::loader::{self, grammar_file};
use parsa::parser::conflict::CompileResult;
use parsa::parser::tree::Node;
use parsa::parser::ParserTable;
use parsa::scanner::Scanner;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

/// Compile scanner/parser grammars into binary tables and drive them.
#[derive(ClapParser)]
#[command(name = "parsa", version, about)]
struct Cli {
    /// Scanner grammar file (token declarations)
    #[arg(short, long)]
    scanner: Option<PathBuf>,

    /// Parser grammar file (productions)
    #[arg(short, long)]
    parser: Option<PathBuf>,

    /// Parse-table construction to use
    #[arg(short, long, value_enum, default_value_t = TableKind::Slr1)]
    table: TableKind,

    /// Write the compiled grammar, scanner and table as one binary blob
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load a previously written blob instead of compiling grammars
    #[arg(short, long, conflicts_with_all = ["scanner", "parser"])]
    load: Option<PathBuf>,

    /// Tokenize (and parse, when a table is present) this input file
    #[arg(short, long)]
    run: Option<PathBuf>,

    /// Collect parse errors with recovery instead of stopping at the first
    #[arg(long)]
    recover: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableKind {
    Ll1,
    Slr1,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn fail(error: impl Display) -> String {
    error.to_string()
}

fn run(cli: Cli) -> Result<(), String> {
    let (grammar, automata, table) = if let Some(path) = &cli.load {
        let bytes = fs::read(path).map_err(fail)?;
        let loaded = loader::load_buffer(&bytes).map_err(fail)?;
        (loaded.grammar, loaded.scanner, loaded.table)
    } else {
        compile(&cli)?
    };

    if let Some(path) = &cli.output {
        let bytes = loader::save_buffer(Some(&grammar), automata.as_ref(), table.as_ref());
        fs::write(path, bytes).map_err(fail)?;
    }

    if let Some(path) = &cli.run {
        let automata = automata
            .as_ref()
            .ok_or("running an input requires a scanner grammar")?;
        let input = FileInput::open(path).map_err(fail)?;
        let mut scanner = Scanner::new(Rc::new(automata.clone()), Box::new(input));

        match &table {
            Some(table) => parse_input(&grammar, table, &mut scanner, cli.recover)?,
            None => tokenize_input(&grammar, &mut scanner)?,
        }
    }
    Ok(())
}

fn compile(
    cli: &Cli,
) -> Result<
    (
        Grammar,
        Option<parsa::scanner::ScannerAutomata>,
        Option<ParserTable>,
    ),
    String,
> {
    if cli.scanner.is_none() && cli.parser.is_none() {
        return Err("specify at least a scanner or a parser grammar (or --load)".into());
    }

    let mut grammar = Grammar::new();
    let mut automata = None;
    let mut table = None;

    if let Some(path) = &cli.scanner {
        let source = fs::read_to_string(path).map_err(fail)?;
        let name = path.display().to_string();
        let scanner_grammar =
            grammar_file::load_scanner_grammar(&mut grammar, &source, &name).map_err(fail)?;
        automata = Some(scanner_grammar.compile(&mut grammar));
    }

    if let Some(path) = &cli.parser {
        let source = fs::read_to_string(path).map_err(fail)?;
        let name = path.display().to_string();
        let rules =
            grammar_file::load_parser_grammar(&mut grammar, &source, &name).map_err(fail)?;

        let mut result = CompileResult::new();
        let compiled = match cli.table {
            TableKind::Ll1 => ParserTable::from(rules.compile_ll1(&grammar, &mut result)),
            TableKind::Slr1 => match rules.compile_slr1(&grammar, &mut result) {
                Ok(compiled) => ParserTable::from(compiled),
                Err(error) => {
                    eprintln!("{}", result.render(&grammar, &rules));
                    return Err(fail(error));
                }
            },
        };
        if result.has_conflicts() {
            eprintln!("warning: {}", result.render(&grammar, &rules));
        }
        table = Some(compiled);
    }

    Ok((grammar, automata, table))
}

fn tokenize_input(grammar: &Grammar, scanner: &mut Scanner) -> Result<(), String> {
    loop {
        match scanner.next_token().map_err(fail)? {
            Some(token) => println!(
                "{} {} {:?}",
                token.location(),
                grammar.token_name(token.id()).unwrap_or("?"),
                token.lexeme()
            ),
            None => return Ok(()),
        }
    }
}

fn parse_input(
    grammar: &Grammar,
    table: &ParserTable,
    scanner: &mut Scanner,
    recover: bool,
) -> Result<(), String> {
    if recover {
        let mut errors = Vec::new();
        let tree = table
            .parse_with_recovery(scanner, None, &mut errors)
            .map_err(fail)?;
        for error in &errors {
            eprintln!("{error}");
        }
        match tree {
            Some(tree) => print_tree(grammar, &tree),
            None => return Err(format!("parse failed with {} error(s)", errors.len())),
        }
    } else {
        let tree = table.parse(scanner, None).map_err(fail)?;
        print_tree(grammar, &tree);
    }
    Ok(())
}

/// Prints the parse tree indented, one node per line. Iterative so deep
/// trees don't exhaust the stack.
fn print_tree(grammar: &Grammar, root: &Node) {
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        match node {
            Node::Token(token) => println!(
                "{indent}{} {:?}",
                grammar.token_name(token.id()).unwrap_or("?"),
                token.lexeme()
            ),
            Node::NonTerminal(nt) => {
                println!(
                    "{indent}<{}> rule {}",
                    grammar.nonterminal_name(nt.id()).unwrap_or("?"),
                    nt.local_rule()
                );
                for child in nt.children().iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
    }
}
