//! A very simple csv grammar that acts only on numbers, run through the
//! compiled parser.

use grammar::Grammar;
use parsegen::{LexConfig, NodeKind, ParseNode, Parser};

const CSV: &str = r"
    // A csv may have 0 or more records.
    csv[noskipws]: record*;
    // A record contains fields, and is terminated by a newline.
    record: fields '\n';
    // Fields contains 1 or more 'field's separated by a comma.
    fields: field+[','];
    // A field contains 1 or more digits.
    field: /[0-9]+/;
";

fn csv_parser() -> Parser {
    let grammar: Grammar = CSV.parse().unwrap();
    Parser::compile(&grammar, LexConfig::default()).unwrap()
}

fn rules_named<'t, 'a>(parser: &Parser, tree: &'t ParseNode<'a>, name: &str) -> Vec<&'t ParseNode<'a>> {
    let id = parser.rule_id(name).unwrap();
    tree.iter().filter(|n| n.rule() == Some(id)).collect()
}

#[test]
fn parse_records() {
    let parser = csv_parser();
    let input = "1,2,3\n4,5,6\n";
    let tree = parser.parse(input).unwrap();

    let records = rules_named(&parser, &tree, "record");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].as_str(), "1,2,3\n");

    let fields: Vec<&str> = rules_named(&parser, &tree, "field")
        .iter()
        .map(|n| n.as_str())
        .collect();
    assert_eq!(fields, vec!["1", "2", "3", "4", "5", "6"]);

    let separators = tree.iter().filter(|n| n.is_separator()).count();
    assert_eq!(separators, 4);
}

#[test]
fn spans_are_offsets() {
    let parser = csv_parser();
    let tree = parser.parse("10,20\n").unwrap();
    let fields = rules_named(&parser, &tree, "field");
    assert_eq!(fields[1].span().start, 3);
    assert_eq!(fields[1].span().end, 5);
}

#[test]
fn empty_input_has_no_records() {
    let parser = csv_parser();
    let tree = parser.parse("").unwrap();
    assert_eq!(tree.children().len(), 0);
    assert_eq!(tree.kind(), Some(NodeKind::Rule(parser.rule_id("csv").unwrap())));
}

#[test]
fn noskipws_is_inherited() {
    let parser = csv_parser();
    let err = parser.parse("1, 2\n").unwrap_err();
    assert_eq!(err.offset, 2);
    assert!(err.expected.contains(&"field".to_owned()), "{:?}", err);
}

#[test]
fn missing_newline_is_reported() {
    let parser = csv_parser();
    let err = parser.parse("1,2").unwrap_err();
    assert_eq!(err.offset, 3);
    assert!(err.expected.contains(&"'\n'".to_owned()), "{:?}", err);
    assert_eq!(err.found, "EOF");
}
