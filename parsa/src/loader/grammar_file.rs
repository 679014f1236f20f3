//! # Grammar file readers
//! Text formats for declaring grammars, in the shape classic generator
//! tools use. A scanner grammar file lists token declarations:
//!
//! ```text
//! /* numbers and identifiers */
//! <NUM>    ::= "\d+(\.\d+)?";
//! <ID>     ::= "[a-zA-Z_]\w*";
//! ignore <WS> ::= "\s+";  // discarded after recognition
//! ```
//!
//! A parser grammar file lists productions; non-terminals are written in
//! angle brackets and tokens bare, alternatives are separated by `|`, and
//! an empty alternative derives ε:
//!
//! ```text
//! <Sum>  ::= <Sum> PLUS NUM | NUM ;
//! ```
//!
//! Both formats allow `/* … */` and `// …` comments anywhere whitespace is
//! allowed. Declaring the same token name twice ORs the regexes together.
//! Non-terminals must appear on the left of at least one rule; referencing
//! an undeclared non-terminal or token is an error, reported with the
//! offending file location.

use crate::error::{Diagnostic, ParserError};
use crate::grammar::{Grammar, ParserGrammar, Rule, ScannerGrammar, Symbol, TokenType};
use crate::input::InputLocation;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while};
use nom::character::complete::{char as byte, multispace1, satisfy};
use nom::combinator::{opt, recognize, value};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

/// Whitespace and comments, any amount including none.
fn space(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0_count(alt((
            value((), multispace1),
            value((), delimited(tag("/*"), take_until("*/"), tag("*/"))),
            value((), preceded(tag("//"), take_while(|c: char| c != '\n'))),
        ))),
    )(input)
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// A `<Name>` reference.
fn angle_name(input: &str) -> IResult<&str, &str> {
    delimited(byte('<'), ident, byte('>'))(input)
}

/// A quoted regex pattern. The content is kept raw (escapes included);
/// the regex compiler interprets them.
fn quoted_pattern(input: &str) -> IResult<&str, &str> {
    let (rest, _) = byte('"')(input)?;
    let bytes = rest.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'"' => return Ok((&rest[index + 1..], &rest[..index])),
            b'\\' => index += 2,
            _ => index += 1,
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::TakeUntil,
    )))
}

/// The location (and line text) of the byte at `offset` in `source`.
fn location_at(source: &str, offset: usize, input_name: &str) -> (InputLocation, String) {
    let offset = offset.min(source.len());
    let prefix = &source[..offset];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
    let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = offset - line_start + 1;
    let line_text = source[line_start..].lines().next().unwrap_or("").to_string();
    (
        InputLocation::new(input_name, line as u32, column as u32),
        line_text,
    )
}

fn syntax_error(source: &str, rest: &str, input_name: &str, message: &str) -> ParserError {
    let offset = source.len() - rest.len();
    let (location, line) = location_at(source, offset, input_name);
    ParserError::MalformedGrammar(
        Diagnostic::new(location, message.to_string()).with_source_line(line),
    )
}

fn undeclared_error(source: &str, offset: usize, input_name: &str, message: String) -> ParserError {
    let (location, line) = location_at(source, offset, input_name);
    ParserError::UndeclaredName(Diagnostic::new(location, message).with_source_line(line))
}

struct TokenRule<'a> {
    ignored: bool,
    name: &'a str,
    pattern: &'a str,
    pattern_offset: usize,
}

fn parse_scanner_file<'a>(
    source: &'a str,
    input_name: &str,
) -> Result<Vec<TokenRule<'a>>, ParserError> {
    let mut rest = source;
    let mut rules = Vec::new();
    loop {
        rest = space(rest).map(|(r, _)| r).unwrap_or(rest);
        if rest.is_empty() {
            break;
        }
        let (after_ignore, ignored) =
            opt(tag::<_, _, nom::error::Error<&str>>("ignore"))(rest).unwrap_or((rest, None));
        let after_ignore = space(after_ignore).map(|(r, _)| r).unwrap_or(after_ignore);
        let (after_name, name) = angle_name(after_ignore)
            .map_err(|_| syntax_error(source, after_ignore, input_name, "token name expected"))?;
        let after_name = space(after_name).map(|(r, _)| r).unwrap_or(after_name);
        let (after_reduce, _) = tag::<_, _, nom::error::Error<&str>>("::=")(after_name)
            .map_err(|_| syntax_error(source, after_name, input_name, "\"::=\" expected"))?;
        let after_reduce = space(after_reduce).map(|(r, _)| r).unwrap_or(after_reduce);
        let pattern_offset = source.len() - after_reduce.len() + 1;
        let (after_pattern, pattern) = quoted_pattern(after_reduce).map_err(|_| {
            syntax_error(source, after_reduce, input_name, "quoted regex expected")
        })?;
        let after_pattern = space(after_pattern).map(|(r, _)| r).unwrap_or(after_pattern);
        let (after_end, _) = byte::<_, nom::error::Error<&str>>(';')(after_pattern)
            .map_err(|_| syntax_error(source, after_pattern, input_name, "\";\" expected"))?;
        rules.push(TokenRule {
            ignored: ignored.is_some(),
            name,
            pattern,
            pattern_offset,
        });
        rest = after_end;
    }
    Ok(rules)
}

/// Reads a scanner grammar file, declaring its token ids in `grammar`.
/// Regex compile errors are re-anchored to the pattern's position in the
/// file.
pub fn load_scanner_grammar(
    grammar: &mut Grammar,
    source: &str,
    input_name: &str,
) -> Result<ScannerGrammar, ParserError> {
    let mut scanner_grammar = ScannerGrammar::new();
    for rule in parse_scanner_file(source, input_name)? {
        grammar.token_id_or_create(rule.name);
        let mut token_type = match TokenType::new(rule.name, rule.pattern) {
            Ok(token_type) => token_type,
            Err(inner) => {
                // the inner error is located within the pattern; shift it
                // to the pattern's place in this file
                let column = inner
                    .location()
                    .map(|location| location.column().saturating_sub(1) as usize)
                    .unwrap_or(0);
                let (location, line) =
                    location_at(source, rule.pattern_offset + column, input_name);
                return Err(ParserError::MalformedGrammar(
                    Diagnostic::new(location, format!("in regex: {}", inner.raw_message()))
                        .with_source_line(line),
                ));
            }
        };
        token_type.set_ignored(rule.ignored);
        scanner_grammar.add_token_type(token_type);
    }
    Ok(scanner_grammar)
}

enum SymbolRef<'a> {
    NonTerminal(&'a str, usize),
    Token(&'a str, usize),
}

struct ParserRule<'a> {
    left: &'a str,
    alternatives: Vec<Vec<SymbolRef<'a>>>,
}

fn parse_parser_file<'a>(
    source: &'a str,
    input_name: &str,
) -> Result<Vec<ParserRule<'a>>, ParserError> {
    let mut rest = source;
    let mut rules = Vec::new();
    loop {
        rest = space(rest).map(|(r, _)| r).unwrap_or(rest);
        if rest.is_empty() {
            break;
        }
        let (after_name, left) = angle_name(rest)
            .map_err(|_| syntax_error(source, rest, input_name, "non-terminal expected"))?;
        let after_name = space(after_name).map(|(r, _)| r).unwrap_or(after_name);
        let (mut cursor, _) = tag::<_, _, nom::error::Error<&str>>("::=")(after_name)
            .map_err(|_| syntax_error(source, after_name, input_name, "\"::=\" expected"))?;

        let mut alternatives = Vec::new();
        let mut current = Vec::new();
        loop {
            cursor = space(cursor).map(|(r, _)| r).unwrap_or(cursor);
            let offset = source.len() - cursor.len();
            if let Ok((next, _)) = byte::<_, nom::error::Error<&str>>(';')(cursor) {
                alternatives.push(std::mem::take(&mut current));
                cursor = next;
                break;
            }
            if let Ok((next, _)) = byte::<_, nom::error::Error<&str>>('|')(cursor) {
                alternatives.push(std::mem::take(&mut current));
                cursor = next;
                continue;
            }
            if let Ok((next, name)) = angle_name(cursor) {
                current.push(SymbolRef::NonTerminal(name, offset));
                cursor = next;
                continue;
            }
            if let Ok((next, name)) = ident(cursor) {
                current.push(SymbolRef::Token(name, offset));
                cursor = next;
                continue;
            }
            return Err(syntax_error(
                source,
                cursor,
                input_name,
                "token, non-terminal, \"|\" or \";\" expected",
            ));
        }
        rules.push(ParserRule { left, alternatives });
        rest = cursor;
    }
    Ok(rules)
}

/// Reads a parser grammar file. All left-side non-terminals are declared
/// first, so rules may refer to non-terminals defined further down; token
/// references must already exist in `grammar` (load the scanner grammar
/// first).
pub fn load_parser_grammar(
    grammar: &mut Grammar,
    source: &str,
    input_name: &str,
) -> Result<ParserGrammar, ParserError> {
    let rules = parse_parser_file(source, input_name)?;

    for rule in &rules {
        if !grammar.has_nonterminal(rule.left) {
            grammar
                .create_nonterminal_id(rule.left)
                .expect("only fresh names are declared");
        }
    }

    let mut parser_grammar = ParserGrammar::new();
    for rule in &rules {
        let left = grammar
            .nonterminal_id(rule.left)
            .expect("declared in the first pass");
        for alternative in &rule.alternatives {
            let mut symbols = Vec::with_capacity(alternative.len());
            for symbol in alternative {
                match symbol {
                    SymbolRef::NonTerminal(name, offset) => match grammar.nonterminal_id(name) {
                        Ok(id) => symbols.push(Symbol::NonTerminal(id)),
                        Err(_) => {
                            return Err(undeclared_error(
                                source,
                                *offset,
                                input_name,
                                format!("<{name}> is not defined"),
                            ))
                        }
                    },
                    SymbolRef::Token(name, offset) => match grammar.token_id(name) {
                        Some(id) => symbols.push(Symbol::Token(id)),
                        None => {
                            return Err(undeclared_error(
                                source,
                                *offset,
                                input_name,
                                format!("use of undeclared token \"{name}\""),
                            ))
                        }
                    },
                }
            }
            parser_grammar.add_rule(Rule::new(left, symbols));
        }
    }
    Ok(parser_grammar)
}

/// Reads a scanner and a parser grammar file into one [Grammar].
pub fn load_grammar(
    scanner_source: &str,
    scanner_name: &str,
    parser_source: &str,
    parser_name: &str,
) -> Result<(Grammar, ScannerGrammar, ParserGrammar), ParserError> {
    let mut grammar = Grammar::new();
    let scanner_grammar = load_scanner_grammar(&mut grammar, scanner_source, scanner_name)?;
    let parser_grammar = load_parser_grammar(&mut grammar, parser_source, parser_name)?;
    Ok((grammar, scanner_grammar, parser_grammar))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_file_with_comments_and_ignores() {
        let source = r#"
            /* lexical grammar */
            <NUM> ::= "\d+";
            <ID>  ::= "[a-z]\w*"; // identifiers
            ignore <WS> ::= "\s+";
        "#;
        let mut grammar = Grammar::new();
        let scanner_grammar = load_scanner_grammar(&mut grammar, source, "tokens").unwrap();
        assert_eq!(grammar.token_count(), 3);
        assert_eq!(scanner_grammar.token_types().len(), 3);
        assert!(scanner_grammar.token_types()[2].is_ignored());
        assert!(scanner_grammar.token_types()[0].regex().matches("42"));
    }

    #[test]
    fn parser_file_resolves_forward_references() {
        let scanner = r#"<a> ::= "a"; <b> ::= "b";"#;
        let parser = r#"
            <S> ::= <T> a ;
            <T> ::= b | ;
        "#;
        let (grammar, _, rules) = load_grammar(scanner, "s", parser, "p").unwrap();
        assert_eq!(grammar.nonterminal_count(), 2);
        assert_eq!(rules.rules().len(), 3);
        assert!(rules.rules()[2].right().is_empty());
    }

    #[test]
    fn undeclared_references_are_located() {
        let scanner = r#"<a> ::= "a";"#;
        let parser = "<S> ::= <Missing> ;";
        let error = load_grammar(scanner, "s", parser, "p").unwrap_err();
        assert!(matches!(error, ParserError::UndeclaredName(_)));
        assert_eq!(error.location().unwrap().column(), 9);

        let parser = "<S> ::= nope ;";
        let error = load_grammar(scanner, "s", parser, "p").unwrap_err();
        assert!(matches!(error, ParserError::UndeclaredName(_)));
    }

    #[test]
    fn regex_errors_point_into_the_file() {
        let source = "<BAD> ::= \"(a\";";
        let mut grammar = Grammar::new();
        let error = load_scanner_grammar(&mut grammar, source, "tokens").unwrap_err();
        assert!(matches!(error, ParserError::MalformedGrammar(_)));
        assert_eq!(error.location().unwrap().line(), 1);
    }

    #[test]
    fn duplicate_token_declarations_or_together() {
        let source = r#"
            <N> ::= "a";
            <N> ::= "b";
        "#;
        let mut grammar = Grammar::new();
        let scanner_grammar = load_scanner_grammar(&mut grammar, source, "tokens").unwrap();
        assert_eq!(grammar.token_count(), 1);
        // both declarations feed the same token id; the compiled scanner
        // accepts either spelling
        let automata = scanner_grammar.compile(&mut grammar);
        assert_eq!(grammar.token_count(), 1);
        let mut input = crate::input::MemoryInput::new("ab", "t");
        let first = automata.next_token(&mut input).unwrap().unwrap();
        let second = automata.next_token(&mut input).unwrap().unwrap();
        assert_eq!(first.id(), second.id());
    }
}
