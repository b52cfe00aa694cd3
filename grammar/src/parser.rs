use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{alpha1, alphanumeric1, char, multispace1},
    combinator::{cut, map, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, many1, separated_list1},
    sequence::{pair, preceded, terminated, tuple},
    Err, IResult,
};

use crate::{
    AssignOp, Assignment, Expression, Grammar, Identifier, Modifier, Predicate, RepeatKind, Rule,
    Terminal,
};

/// Skips whitespace, `// line` and `/* block */` comments.
pub fn sp(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, line_comment, block_comment))))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), take_while(|c| c != '\n')))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

pub fn identifier(input: &str) -> IResult<&str, Identifier> {
    let (rem, matched) = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)?;
    Ok((rem, Identifier(matched.to_owned())))
}

pub fn terminal(input: &str) -> IResult<&str, Terminal> {
    let (rem, matched) = alt((quoted('\''), quoted('"')))(input)?;
    Ok((rem, Terminal(matched)))
}

fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (body, _) = char(quote)(input)?;
        let mut out = String::new();
        let mut chars = body.char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, e)) if e == '\\' || e == '\'' || e == '"' => out.push(e),
                    Some((_, e)) => {
                        out.push('\\');
                        out.push(e);
                    }
                    None => break,
                },
                c if c == quote => return Ok((&body[idx + c.len_utf8()..], out)),
                c => out.push(c),
            }
        }
        // Unterminated string.
        Err(Err::Failure(Error::new(input, ErrorKind::Char)))
    }
}

/// A `/regex/`. `\/` stands for a literal slash, other escapes are kept for
/// the regex engine.
pub fn regex(input: &str) -> IResult<&str, String> {
    let (body, _) = char('/')(input)?;
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '/')) => out.push('/'),
                Some((_, e)) => {
                    out.push('\\');
                    out.push(e);
                }
                None => break,
            },
            '/' if !out.is_empty() => return Ok((&body[idx + 1..], out)),
            '\n' | '/' => break,
            c => out.push(c),
        }
    }
    Err(Err::Failure(Error::new(input, ErrorKind::Char)))
}

fn modifier(input: &str) -> IResult<&str, Modifier> {
    let (start, _) = sp(input)?;
    let (rem, name) = identifier(start)?;
    let modifier = match name.as_str() {
        "skipws" => Modifier::SkipWs,
        "noskipws" => Modifier::NoSkipWs,
        "ignore_case" => Modifier::IgnoreCase,
        "match_case" => Modifier::MatchCase,
        "autokwd" => Modifier::AutoKwd,
        "noautokwd" => Modifier::NoAutoKwd,
        "ws" => {
            let (rem, ws) = cut(preceded(
                preceded(sp, char('=')),
                preceded(sp, terminal),
            ))(rem)?;
            return Ok((rem, Modifier::Ws(ws.0)));
        }
        _ => return Err(Err::Failure(Error::new(start, ErrorKind::Tag))),
    };
    Ok((rem, modifier))
}

fn modifiers(input: &str) -> IResult<&str, Vec<Modifier>> {
    let (rem, _) = preceded(sp, char('['))(input)?;
    cut(terminated(
        separated_list1(preceded(sp, char(',')), modifier),
        preceded(sp, char(']')),
    ))(rem)
}

pub fn rule(input: &str) -> IResult<&str, Rule> {
    let (rem, name) = preceded(sp, identifier)(input)?;
    let (rem, modifiers) = opt(modifiers)(rem)?;
    let (rem, _) = preceded(sp, char(':'))(rem)?;
    let (rem, body) = cut(terminated(choice, preceded(sp, char(';'))))(rem)?;
    Ok((
        rem,
        Rule {
            name,
            modifiers: modifiers.unwrap_or_default(),
            body,
        },
    ))
}

pub fn grammar(input: &str) -> IResult<&str, Grammar> {
    let (rem, rules) = many0(rule)(input)?;
    let (rem, _) = sp(rem)?;
    Ok((rem, Grammar { rules }))
}

/// A standalone expression surrounded by optional whitespace.
pub fn expression(input: &str) -> IResult<&str, Expression> {
    terminated(preceded(sp, choice), sp)(input)
}

fn choice(input: &str) -> IResult<&str, Expression> {
    let (rem, mut alts) = separated_list1(preceded(sp, char('|')), sequence)(input)?;
    if alts.len() == 1 {
        return Ok((rem, alts.remove(0)));
    }
    Ok((rem, Expression::Choice(alts)))
}

fn sequence(input: &str) -> IResult<&str, Expression> {
    let (rem, mut items) = many1(preceded(sp, item))(input)?;
    if items.len() == 1 {
        return Ok((rem, items.remove(0)));
    }
    Ok((rem, Expression::Sequence(items)))
}

fn item(input: &str) -> IResult<&str, Expression> {
    alt((predicate, assignment, repeatable))(input)
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    let (rem, kind) = alt((
        value(Predicate::Not, char('!')),
        value(Predicate::And, char('&')),
    ))(input)?;
    let (rem, inner) = cut(preceded(sp, repeatable))(rem)?;
    Ok((rem, Expression::Predicate(kind, Box::new(inner))))
}

fn assign_op(input: &str) -> IResult<&str, AssignOp> {
    alt((
        value(AssignOp::OneOrMore, tag("+=")),
        value(AssignOp::ZeroOrMore, tag("*=")),
        value(AssignOp::Flag, tag("?=")),
        value(AssignOp::Plain, tag("=")),
    ))(input)
}

fn assignment(input: &str) -> IResult<&str, Expression> {
    let (rem, attribute) = identifier(input)?;
    let (rem, op) = preceded(sp, assign_op)(rem)?;
    let (rem, value) = cut(preceded(sp, primary))(rem)?;
    let (rem, repeat) = opt(preceded(sp, repeat_kind))(rem)?;
    let (rem, separator) = opt(preceded(sp, separator))(rem)?;

    // A repetition operator binds to the value, so a separator written after
    // it belongs to the repetition rather than the assignment.
    let (value, separator) = match repeat {
        Some(kind) => (
            Expression::Repeat {
                kind,
                expr: Box::new(value),
                separator: separator.map(Box::new),
            },
            None,
        ),
        None => (value, separator),
    };

    Ok((
        rem,
        Expression::Assignment(Assignment {
            attribute,
            op,
            value: Box::new(value),
            separator: separator.map(Box::new),
        }),
    ))
}

fn repeat_kind(input: &str) -> IResult<&str, RepeatKind> {
    alt((
        value(RepeatKind::Optional, char('?')),
        value(RepeatKind::ZeroOrMore, char('*')),
        value(RepeatKind::OneOrMore, char('+')),
    ))(input)
}

/// `[ 'sep' ]` or `[ /sep/ ]`. Anything else in brackets is a link.
fn separator(input: &str) -> IResult<&str, Expression> {
    let (rem, _) = char('[')(input)?;
    let (rem, sep) = preceded(
        sp,
        alt((map(terminal, Expression::Str), map(regex, Expression::Regex))),
    )(rem)?;
    let (rem, _) = cut(preceded(sp, char(']')))(rem)?;
    Ok((rem, sep))
}

fn repeatable(input: &str) -> IResult<&str, Expression> {
    let (rem, expr) = primary(input)?;
    let (rem, kind) = opt(preceded(sp, repeat_kind))(rem)?;
    match kind {
        Some(kind) => {
            let (rem, separator) = opt(preceded(sp, separator))(rem)?;
            Ok((
                rem,
                Expression::Repeat {
                    kind,
                    expr: Box::new(expr),
                    separator: separator.map(Box::new),
                },
            ))
        }
        None => Ok((rem, expr)),
    }
}

fn primary(input: &str) -> IResult<&str, Expression> {
    alt((
        map(terminal, Expression::Str),
        map(regex, Expression::Regex),
        link,
        group,
        map(identifier, Expression::RuleRef),
    ))(input)
}

fn group(input: &str) -> IResult<&str, Expression> {
    let (rem, _) = char('(')(input)?;
    let (rem, inner) = cut(terminated(choice, preceded(sp, char(')'))))(rem)?;
    Ok((rem, Expression::Group(Box::new(inner))))
}

fn link(input: &str) -> IResult<&str, Expression> {
    let (rem, _) = char('[')(input)?;
    let (rem, target) = preceded(sp, identifier)(rem)?;
    let (rem, name_rule) = opt(preceded(preceded(sp, char('|')), preceded(sp, identifier)))(rem)?;
    let (rem, _) = cut(preceded(sp, char(']')))(rem)?;
    Ok((rem, Expression::Link { target, name_rule }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    struct TestCase<T> {
        input: &'static str,
        // Some indicates success, None indicates error.
        out: Option<IResult<&'static str, T>>,
    }

    fn assert_test_cases<T, F>(f: F, tests: Vec<TestCase<T>>)
    where
        T: Debug + Eq,
        F: Fn(&'static str) -> IResult<&'static str, T>,
    {
        for t in tests {
            let res = f(t.input);
            match t.out {
                Some(out) => assert_eq!(res, out, "input: {}", t.input),
                None => assert!(res.is_err(), "expected error: {:?}", res),
            }
        }
    }

    fn rule_ref(s: &str) -> Expression {
        Expression::RuleRef(s.into())
    }

    fn assign(attr: &str, op: AssignOp, value: Expression) -> Expression {
        Expression::Assignment(Assignment {
            attribute: attr.into(),
            op,
            value: Box::new(value),
            separator: None,
        })
    }

    #[test]
    fn parse_terminal() {
        let tests = vec![
            TestCase {
                input: "\"hello\"",
                out: Some(Ok(("", Terminal("hello".to_owned())))),
            },
            TestCase {
                input: "'hello' world",
                out: Some(Ok((" world", Terminal("hello".to_owned())))),
            },
            TestCase {
                input: r"'it\'s\n'",
                out: Some(Ok(("", Terminal("it's\n".to_owned())))),
            },
            TestCase {
                input: r"'\d'",
                out: Some(Ok(("", Terminal("\\d".to_owned())))),
            },
            TestCase {
                input: "'hello\" world",
                out: None,
            },
        ];

        assert_test_cases(terminal, tests);
    }

    #[test]
    fn parse_identifier() {
        let tests = vec![
            TestCase {
                input: "hello world",
                out: Some(Ok((" world", Identifier("hello".to_owned())))),
            },
            TestCase {
                input: "_attr_id=ID",
                out: Some(Ok(("=ID", Identifier("_attr_id".to_owned())))),
            },
            TestCase {
                input: "1abc",
                out: None,
            },
        ];

        assert_test_cases(identifier, tests);
    }

    #[test]
    fn parse_regex() {
        let tests = vec![
            TestCase {
                input: r"/\d+/ rest",
                out: Some(Ok((" rest", r"\d+".to_owned()))),
            },
            TestCase {
                input: r"/a\/b/",
                out: Some(Ok(("", "a/b".to_owned()))),
            },
            TestCase {
                input: "/abc",
                out: None,
            },
        ];

        assert_test_cases(regex, tests);
    }

    #[test]
    fn parse_expression() {
        let tests = vec![
            TestCase {
                input: "name=ID",
                out: Some(Ok(("", assign("name", AssignOp::Plain, rule_ref("ID"))))),
            },
            TestCase {
                input: "'a' | b",
                out: Some(Ok((
                    "",
                    Expression::Choice(vec![Expression::Str("a".into()), rule_ref("b")]),
                ))),
            },
            TestCase {
                input: "values+=INT[',']",
                out: Some(Ok((
                    "",
                    Expression::Assignment(Assignment {
                        attribute: "values".into(),
                        op: AssignOp::OneOrMore,
                        value: Box::new(rule_ref("INT")),
                        separator: Some(Box::new(Expression::Str(",".into()))),
                    }),
                ))),
            },
            TestCase {
                input: "values=INT+[',']",
                out: Some(Ok((
                    "",
                    assign(
                        "values",
                        AssignOp::Plain,
                        Expression::Repeat {
                            kind: RepeatKind::OneOrMore,
                            expr: Box::new(rule_ref("INT")),
                            separator: Some(Box::new(Expression::Str(",".into()))),
                        },
                    ),
                ))),
            },
            TestCase {
                input: "ref=[Attribute|attr_id]",
                out: Some(Ok((
                    "",
                    assign(
                        "ref",
                        AssignOp::Plain,
                        Expression::Link {
                            target: "Attribute".into(),
                            name_rule: Some("attr_id".into()),
                        },
                    ),
                ))),
            },
            TestCase {
                input: "abstract?='abstract' a? ",
                out: Some(Ok((
                    "",
                    Expression::Sequence(vec![
                        assign("abstract", AssignOp::Flag, Expression::Str("abstract".into())),
                        Expression::Repeat {
                            kind: RepeatKind::Optional,
                            expr: Box::new(rule_ref("a")),
                            separator: None,
                        },
                    ]),
                ))),
            },
            TestCase {
                input: "!'end' &x // trailing comment",
                out: Some(Ok((
                    "",
                    Expression::Sequence(vec![
                        Expression::Predicate(
                            Predicate::Not,
                            Box::new(Expression::Str("end".into())),
                        ),
                        Expression::Predicate(Predicate::And, Box::new(rule_ref("x"))),
                    ]),
                ))),
            },
            TestCase {
                input: "( a | b",
                out: None,
            },
        ];

        assert_test_cases(expression, tests);
    }

    #[test]
    fn parse_rule() {
        let tests = vec![
            TestCase {
                input: "Model: 'model' name=ID;",
                out: Some(Ok((
                    "",
                    Rule {
                        name: "Model".into(),
                        modifiers: vec![],
                        body: Expression::Sequence(vec![
                            Expression::Str("model".into()),
                            assign("name", AssignOp::Plain, rule_ref("ID")),
                        ]),
                    },
                ))),
            },
            TestCase {
                input: "Word[noskipws, ws=' \\t']:\n  /\\w+/\n;",
                out: Some(Ok((
                    "",
                    Rule {
                        name: "Word".into(),
                        modifiers: vec![Modifier::NoSkipWs, Modifier::Ws(" \t".to_owned())],
                        body: Expression::Regex(r"\w+".to_owned()),
                    },
                ))),
            },
            TestCase {
                input: "Bad[nosuchthing]: 'x';",
                out: None,
            },
            TestCase {
                input: "Missing: 'x'",
                out: None,
            },
        ];

        assert_test_cases(rule, tests);
    }

    #[test]
    fn parse_grammar() {
        let input = "
            /* entities */
            Model: entities*=Entity;
            Entity: 'entity' name=ID; // one per line
        ";
        let (rem, g) = grammar(input).unwrap();
        assert_eq!(rem, "");
        assert_eq!(g.rules.len(), 2);
        assert_eq!(g.rules[1].name, Identifier::from("Entity"));
    }
}
