use grammar::Grammar;
use parsegen::{LexConfig, NodeKind, ParseNode, Parser};

fn compile_with(src: &str, config: LexConfig) -> Parser {
    let grammar: Grammar = src.parse().unwrap();
    Parser::compile(&grammar, config).unwrap()
}

fn compile(src: &str) -> Parser {
    compile_with(src, LexConfig::default())
}

#[test]
fn autokwd_requires_word_boundary() {
    let src = "Model: 'first' rest=/\\w*/; ";

    let plain = compile(src);
    assert!(plain.parse("firstsecond").is_ok());

    let kwd = compile_with(src, LexConfig::default().autokwd(true));
    assert!(kwd.parse("firstsecond").is_err());
    assert!(kwd.parse("first second").is_ok());

    let local = compile("Model[autokwd]: 'first' rest=/\\w*/;");
    assert!(local.parse("firstsecond").is_err());
}

#[test]
fn ignore_case_literals_and_regexes() {
    let src = "Model: 'begin' /[a-z]+/ 'end';";
    assert!(compile(src).parse("BEGIN abc END").is_err());
    assert!(compile_with(src, LexConfig::default().ignore_case(true))
        .parse("BEGIN ABC End")
        .is_ok());

    let local = compile("Model: 'a' Inner; Inner[ignore_case]: 'b';");
    assert!(local.parse("a B").is_ok());
    assert!(local.parse("A b").is_err());
}

#[test]
fn custom_whitespace() {
    let parser = compile("Model[ws='-']: 'a' 'b';");
    assert!(parser.parse("a--b").is_ok());
    assert!(parser.parse("a b").is_err());

    let global = compile_with("Model: 'a' 'b';", LexConfig::default().skipws(false));
    assert!(global.parse("ab").is_ok());
    assert!(global.parse("a b").is_err());
}

#[test]
fn caller_config_skips_before_call() {
    // The space before Word is skipped by Model, the space inside is not.
    let parser = compile("Model: 'x' Word; Word[noskipws]: 'a' 'b';");
    assert!(parser.parse("x ab").is_ok());
    assert!(parser.parse("x a b").is_err());
}

#[test]
fn comments_are_skipped() {
    let parser = compile(
        "
        Model: items+=Item;
        Item: 'item' /\\d+/;
        Comment: /#[^\\n]*/;
        ",
    );
    let tree = parser.parse("item 1 # first\n# nothing\nitem 2 # last").unwrap();
    let comment = parser.rule_id("Comment").unwrap();
    assert!(tree.iter().all(|n| n.rule() != Some(comment)));
    let items = parser.rule_id("Item").unwrap();
    assert_eq!(tree.iter().filter(|n| n.rule() == Some(items)).count(), 2);
}

#[test]
fn left_recursion_fails_instead_of_overflowing() {
    let parser = compile("Expr: Expr '+' Term | Term; Term: /\\d+/;");
    let tree = parser.parse("1").unwrap();
    assert_eq!(tree.text(), "1");
    assert!(parser.parse("1 + 2").is_err());
}

#[test]
fn lookahead_predicates() {
    let parser = compile("Model: words*=Word; Word: !'end' /\\w+/ | &'end' 'end' 'x';");
    let tree = parser.parse("a b end x").unwrap();
    let word = parser.rule_id("Word").unwrap();
    let texts: Vec<String> = tree
        .iter()
        .filter(|n| n.rule() == Some(word))
        .map(|n| n.text())
        .collect();
    assert_eq!(texts, vec!["a", "b", "endx"]);
}

#[test]
fn assignment_nodes() {
    let parser = compile(
        "
        Model: 'm' values*=Value[','] flag?='!' name=Name?;
        Value: /\\d+/;
        Name: /[a-z]+/;
        ",
    );

    let tree = parser.parse("m").unwrap();
    assert!(tree.children().iter().all(|n| match n.kind() {
        Some(NodeKind::Assignment(_)) => false,
        _ => true,
    }));

    let tree = parser.parse("m 1, 2 ! abc").unwrap();
    let assignments: Vec<(&str, &ParseNode)> = tree
        .children()
        .iter()
        .filter_map(|n| match n.kind() {
            Some(NodeKind::Assignment(id)) => Some((parser.assignment(id).attribute.as_str(), n)),
            _ => None,
        })
        .collect();
    assert_eq!(assignments.len(), 3);
    assert_eq!(assignments[0].0, "values");
    assert_eq!(assignments[0].1.children().len(), 3);
    assert_eq!(assignments[0].1.as_str(), "1, 2");
    assert_eq!(assignments[1].0, "flag");
    assert_eq!(assignments[2].1.text(), "abc");
}
