//! Grammar language AST.
//!
//! A grammar is a list of PEG rules extended with named assignments
//! (`name=ID`, `items+=Item[',']`, `flag?='kw'`), non-owning links
//! (`[Target]`, `[Target|Rule]`) and per-rule lexical modifiers. The text form
//! is read with a hand-written bootstrap parser, and every AST node displays
//! back into text that parses to an equal node.

use std::fmt::{self, Display};
use std::str::FromStr;

mod error;
pub use error::Error;
mod parser;

/// A constant identifying rules and attributes.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A literal string.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Terminal(pub String);

impl Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'")?;
        for c in self.0.chars() {
            match c {
                '\\' => write!(f, "\\\\")?,
                '\'' => write!(f, "\\'")?,
                '\n' => write!(f, "\\n")?,
                '\t' => write!(f, "\\t")?,
                '\r' => write!(f, "\\r")?,
                '\0' => write!(f, "\\0")?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "'")
    }
}

impl From<&str> for Terminal {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Lexical modifiers written after a rule name, e.g. `Rule[noskipws, ws=' ']`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Modifier {
    SkipWs,
    NoSkipWs,
    /// Replace the set of whitespace characters.
    Ws(String),
    IgnoreCase,
    MatchCase,
    AutoKwd,
    NoAutoKwd,
}

impl Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Modifier::SkipWs => write!(f, "skipws"),
            Modifier::NoSkipWs => write!(f, "noskipws"),
            Modifier::Ws(ws) => write!(f, "ws={}", Terminal(ws.clone())),
            Modifier::IgnoreCase => write!(f, "ignore_case"),
            Modifier::MatchCase => write!(f, "match_case"),
            Modifier::AutoKwd => write!(f, "autokwd"),
            Modifier::NoAutoKwd => write!(f, "noautokwd"),
        }
    }
}

/// Assignment operators.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AssignOp {
    /// `=`
    Plain,
    /// `+=`
    OneOrMore,
    /// `*=`
    ZeroOrMore,
    /// `?=`
    Flag,
}

impl Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssignOp::Plain => write!(f, "="),
            AssignOp::OneOrMore => write!(f, "+="),
            AssignOp::ZeroOrMore => write!(f, "*="),
            AssignOp::Flag => write!(f, "?="),
        }
    }
}

/// Repetition operators.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RepeatKind {
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RepeatKind::Optional => write!(f, "?"),
            RepeatKind::ZeroOrMore => write!(f, "*"),
            RepeatKind::OneOrMore => write!(f, "+"),
        }
    }
}

/// Syntactic predicates. Neither consumes input.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Predicate {
    /// `!expr`, succeeds iff `expr` fails.
    Not,
    /// `&expr`, succeeds iff `expr` matches.
    And,
}

impl Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Predicate::Not => write!(f, "!"),
            Predicate::And => write!(f, "&"),
        }
    }
}

/// A named assignment, `attribute op value`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Assignment {
    pub attribute: Identifier,
    pub op: AssignOp,
    pub value: Box<Expression>,
    /// Separator matched between repeated values of `+=` and `*=`.
    pub separator: Option<Box<Expression>>,
}

impl Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.attribute, self.op, self.value)?;
        if let Some(sep) = &self.separator {
            write!(f, "[{}]", sep)?;
        }
        Ok(())
    }
}

/// The body of a rule.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Expression {
    Str(Terminal),
    Regex(String),
    RuleRef(Identifier),
    /// A reference to an object defined elsewhere, matched by name.
    /// `name_rule` defaults to `ID`.
    Link {
        target: Identifier,
        name_rule: Option<Identifier>,
    },
    Group(Box<Expression>),
    Sequence(Vec<Expression>),
    /// Ordered choice, first match wins.
    Choice(Vec<Expression>),
    Repeat {
        kind: RepeatKind,
        expr: Box<Expression>,
        separator: Option<Box<Expression>>,
    },
    Predicate(Predicate, Box<Expression>),
    Assignment(Assignment),
}

impl Expression {
    /// Pre-order walk over this expression and every nested expression,
    /// including assignment values and separators.
    pub fn visit<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Expression),
    {
        f(self);
        match self {
            Expression::Str(_)
            | Expression::Regex(_)
            | Expression::RuleRef(_)
            | Expression::Link { .. } => {}
            Expression::Group(inner) | Expression::Predicate(_, inner) => inner.visit(f),
            Expression::Sequence(items) | Expression::Choice(items) => {
                for item in items {
                    item.visit(f);
                }
            }
            Expression::Repeat {
                expr, separator, ..
            } => {
                expr.visit(f);
                if let Some(sep) = separator {
                    sep.visit(f);
                }
            }
            Expression::Assignment(a) => {
                a.value.visit(f);
                if let Some(sep) = &a.separator {
                    sep.visit(f);
                }
            }
        }
    }

    /// Whether any named assignment appears in this expression.
    pub fn has_assignment(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expression::Assignment(_) = e {
                found = true;
            }
        });
        found
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Str(term) => write!(f, "{}", term),
            Expression::Regex(re) => write!(f, "/{}/", re.replace('/', "\\/")),
            Expression::RuleRef(iden) => write!(f, "{}", iden),
            Expression::Link {
                target,
                name_rule: Some(rule),
            } => write!(f, "[{}|{}]", target, rule),
            Expression::Link {
                target,
                name_rule: None,
            } => write!(f, "[{}]", target),
            Expression::Group(inner) => write!(f, "( {} )", inner),
            Expression::Sequence(items) => write_joined(f, items, " "),
            Expression::Choice(alts) => write_joined(f, alts, " | "),
            Expression::Repeat {
                kind,
                expr,
                separator,
            } => {
                write!(f, "{}{}", expr, kind)?;
                if let Some(sep) = separator {
                    write!(f, "[{}]", sep)?;
                }
                Ok(())
            }
            Expression::Predicate(pred, inner) => write!(f, "{}{}", pred, inner),
            Expression::Assignment(a) => write!(f, "{}", a),
        }
    }
}

fn write_joined<T: Display>(f: &mut fmt::Formatter, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rem, expr) = parser::expression(s).map_err(|e| Error::from_nom(s, e))?;
        if !rem.is_empty() {
            return Err(Error::parse(s, rem, "expected end of expression"));
        }
        Ok(expr)
    }
}

/// A grammar rule.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Rule {
    pub name: Identifier,
    pub modifiers: Vec<Modifier>,
    pub body: Expression,
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.modifiers.is_empty() {
            write!(f, "[")?;
            write_joined(f, &self.modifiers, ", ")?;
            write!(f, "]")?;
        }
        write!(f, ": {} ;", self.body)
    }
}

impl FromStr for Rule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rem, rule) = parser::rule(s).map_err(|e| Error::from_nom(s, e))?;
        if !rem.trim().is_empty() {
            return Err(Error::parse(s, rem, "expected end of rule"));
        }
        Ok(rule)
    }
}

/// A set of rules. The first rule is the start rule.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Grammar {
    pub rules: Vec<Rule>,
}

impl Grammar {
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name.as_str() == name)
    }

    /// The start rule.
    pub fn start(&self) -> Option<&Rule> {
        self.rules.first()
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}

impl FromStr for Grammar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rem, grammar) = parser::grammar(s).map_err(|e| Error::from_nom(s, e))?;
        if !rem.is_empty() {
            return Err(Error::parse(s, rem, "expected a rule definition"));
        }
        Ok(grammar)
    }
}

/// Converts a byte offset into a 1-based line and column (in characters).
pub fn line_col(input: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (idx, c) in input.char_indices() {
        if idx >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;
    use std::string::ToString;

    fn assert_lossless_conversion<T, E>(t: T)
    where
        T: ToString + FromStr<Err = E> + Eq + Debug,
        E: std::error::Error,
    {
        let s = t.to_string();
        let t_parse = T::from_str(&s).unwrap();
        assert_eq!(t, t_parse, "To string:\n{}\n", s);
    }

    fn rule_ref(s: &str) -> Expression {
        Expression::RuleRef(s.into())
    }

    #[test]
    fn lossless_expression() {
        let tests = vec![
            Expression::Choice(vec![
                rule_ref("a"),
                Expression::Sequence(vec![
                    Expression::Str("c".into()),
                    Expression::Regex(r"\d+/x".to_owned()),
                ]),
            ]),
            Expression::Assignment(Assignment {
                attribute: "items".into(),
                op: AssignOp::OneOrMore,
                value: Box::new(rule_ref("INT")),
                separator: Some(Box::new(Expression::Str(",".into()))),
            }),
            Expression::Sequence(vec![
                Expression::Predicate(Predicate::Not, Box::new(Expression::Str("end".into()))),
                Expression::Assignment(Assignment {
                    attribute: "target".into(),
                    op: AssignOp::Plain,
                    value: Box::new(Expression::Link {
                        target: "Attribute".into(),
                        name_rule: Some("attr_id".into()),
                    }),
                    separator: None,
                }),
                Expression::Repeat {
                    kind: RepeatKind::ZeroOrMore,
                    expr: Box::new(Expression::Group(Box::new(Expression::Choice(vec![
                        rule_ref("x"),
                        rule_ref("y"),
                    ])))),
                    separator: Some(Box::new(Expression::Str(";".into()))),
                },
            ]),
            Expression::Str("it's \\ a\ttab".into()),
        ];

        for test in tests {
            assert_lossless_conversion(test);
        }
    }

    #[test]
    fn lossless_rule() {
        let rule = Rule {
            name: "a".into(),
            modifiers: vec![Modifier::NoSkipWs, Modifier::Ws(" \t\n".to_owned())],
            body: rule_ref("b"),
        };

        assert_lossless_conversion(rule)
    }

    #[test]
    fn lossless_grammar() {
        let g = Grammar {
            rules: vec![
                Rule {
                    name: "a".into(),
                    modifiers: Vec::new(),
                    body: Expression::Assignment(Assignment {
                        attribute: "flag".into(),
                        op: AssignOp::Flag,
                        value: Box::new(Expression::Str("on".into())),
                        separator: None,
                    }),
                },
                Rule {
                    name: "c".into(),
                    modifiers: vec![Modifier::IgnoreCase],
                    body: rule_ref("d"),
                },
            ],
        };

        assert_lossless_conversion(g);
    }

    #[test]
    fn assignments_found_in_nested_groups() {
        let expr: Expression = "B [C|D] ( E | a='x' )*".parse().unwrap();
        assert!(expr.has_assignment());
        let expr: Expression = "B [C|D] ( E | 'x' )*".parse().unwrap();
        assert!(!expr.has_assignment());
    }

    #[test]
    fn line_col_offsets() {
        let input = "ab\ncd\n";
        assert_eq!(line_col(input, 0), (1, 1));
        assert_eq!(line_col(input, 1), (1, 2));
        assert_eq!(line_col(input, 3), (2, 1));
        assert_eq!(line_col(input, 4), (2, 2));
        assert_eq!(line_col(input, 100), (3, 1));
    }
}
