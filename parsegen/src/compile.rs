use grammar::{AssignOp, Expression, Grammar, Modifier, Predicate, RepeatKind};
use log::debug;
use regex::Regex;
use std::collections::HashMap;

use crate::config::LexConfig;
use crate::error::{CompileError, SyntaxError};
use crate::state::State;
use crate::tree::ParseNode;
use crate::{AssignmentId, RuleId};

/// Name of the rule whose matches are skipped along with whitespace.
pub const COMMENT_RULE: &str = "Comment";

/// An anchored regular expression, compiled for both case modes.
#[derive(Debug)]
pub struct Pattern {
    pub(crate) sensitive: Regex,
    pub(crate) insensitive: Regex,
    /// Shown in syntax errors when the pattern fails to match.
    pub(crate) label: String,
}

impl Pattern {
    fn new(pattern: &str, label: String) -> Result<Self, regex::Error> {
        Ok(Pattern {
            sensitive: Regex::new(&format!("^(?:{})", pattern))?,
            insensitive: Regex::new(&format!("(?i)^(?:{})", pattern))?,
            label,
        })
    }

    pub(crate) fn regex(&self, ignore_case: bool) -> &Regex {
        if ignore_case {
            &self.insensitive
        } else {
            &self.sensitive
        }
    }
}

/// Executable form of a rule expression.
#[derive(Debug)]
pub enum Matcher {
    Literal(String),
    Regex(Pattern),
    Sequence(Vec<Matcher>),
    Choice(Vec<Matcher>),
    Optional(Box<Matcher>),
    Repeat {
        inner: Box<Matcher>,
        separator: Option<Box<Matcher>>,
        at_least_one: bool,
    },
    Not(Box<Matcher>),
    And(Box<Matcher>),
    Rule(RuleId),
    Assignment(AssignmentId, Box<Matcher>),
}

#[derive(Debug)]
pub struct CompiledRule {
    pub name: String,
    pub modifiers: Vec<Modifier>,
    pub body: Matcher,
    /// Made of terminals only. A failure at the rule's start is
    /// reported under the rule's name.
    pub lexical: bool,
}

/// An assignment site in the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentInfo {
    pub rule: RuleId,
    pub attribute: String,
    pub op: AssignOp,
    /// Target rule when the assigned value is a single link.
    pub link: Option<String>,
}

/// A grammar compiled into matchers, ready to parse input.
///
/// The parser is immutable once compiled. Every parse allocates its own
/// state, so one parser can serve several threads at once.
#[derive(Debug)]
pub struct Parser {
    rules: Vec<CompiledRule>,
    assignments: Vec<AssignmentInfo>,
    index: HashMap<String, RuleId>,
    comment: Option<RuleId>,
    config: LexConfig,
}

impl Parser {
    /// Compiles every rule of `grammar`. The first rule is the start rule.
    pub fn compile(grammar: &Grammar, config: LexConfig) -> Result<Self, CompileError> {
        if grammar.rules.is_empty() {
            return Err(CompileError::EmptyGrammar);
        }

        let mut index = HashMap::new();
        for (i, rule) in grammar.rules.iter().enumerate() {
            if index.insert(rule.name.0.clone(), RuleId(i)).is_some() {
                return Err(CompileError::DuplicateRule(rule.name.0.clone()));
            }
        }

        let mut compiler = Compiler {
            index: &index,
            assignments: Vec::new(),
            rule: RuleId(0),
        };
        let mut rules = Vec::with_capacity(grammar.rules.len());
        for (i, rule) in grammar.rules.iter().enumerate() {
            compiler.rule = RuleId(i);
            let body = match &rule.body {
                // A rule that is just a regex reports itself by name.
                Expression::Regex(pattern) => {
                    compiler.pattern(&rule.name.0, pattern, rule.name.0.clone())?
                }
                body => compiler.expression(&rule.name.0, body)?,
            };
            rules.push(CompiledRule {
                name: rule.name.0.clone(),
                modifiers: rule.modifiers.clone(),
                lexical: is_lexical(&body),
                body,
            });
        }
        let assignments = compiler.assignments;

        let comment = index.get(COMMENT_RULE).copied();
        debug!(rules = rules.len(), assignments = assignments.len(); "Compiled grammar");

        Ok(Parser {
            rules,
            assignments,
            index,
            comment,
            config,
        })
    }

    /// Parses `input` with the start rule. The whole input must match.
    pub fn parse<'a>(&self, input: &'a str) -> Result<ParseNode<'a>, SyntaxError> {
        self.parse_rule(RuleId(0), input)
    }

    /// Parses `input` with the given rule. The whole input must match.
    pub fn parse_rule<'a>(&self, rule: RuleId, input: &'a str) -> Result<ParseNode<'a>, SyntaxError> {
        State::new(self, input).run(rule)
    }

    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.index.get(name).copied()
    }

    pub fn rule(&self, id: RuleId) -> &CompiledRule {
        &self.rules[id.0]
    }

    pub fn rule_name(&self, id: RuleId) -> &str {
        &self.rules[id.0].name
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &CompiledRule)> {
        self.rules.iter().enumerate().map(|(i, r)| (RuleId(i), r))
    }

    pub fn assignment(&self, id: AssignmentId) -> &AssignmentInfo {
        &self.assignments[id.0]
    }

    pub fn assignments(&self) -> impl Iterator<Item = (AssignmentId, &AssignmentInfo)> {
        self.assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (AssignmentId(i), a))
    }

    pub fn comment_rule(&self) -> Option<RuleId> {
        self.comment
    }

    pub fn config(&self) -> &LexConfig {
        &self.config
    }
}

struct Compiler<'g> {
    index: &'g HashMap<String, RuleId>,
    assignments: Vec<AssignmentInfo>,
    rule: RuleId,
}

impl<'g> Compiler<'g> {
    fn lookup(&self, rule_name: &str, name: &str) -> Result<RuleId, CompileError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownRule {
                rule: rule_name.to_owned(),
                name: name.to_owned(),
            })
    }

    fn pattern(&self, rule_name: &str, pattern: &str, label: String) -> Result<Matcher, CompileError> {
        Pattern::new(pattern, label)
            .map(Matcher::Regex)
            .map_err(|source| CompileError::Regex {
                rule: rule_name.to_owned(),
                pattern: pattern.to_owned(),
                source,
            })
    }

    fn boxed(&mut self, rule_name: &str, expr: &Expression) -> Result<Box<Matcher>, CompileError> {
        self.expression(rule_name, expr).map(Box::new)
    }

    fn expression(&mut self, rule_name: &str, expr: &Expression) -> Result<Matcher, CompileError> {
        let matcher = match expr {
            Expression::Str(term) => Matcher::Literal(term.0.clone()),
            Expression::Regex(pattern) => self.pattern(rule_name, pattern, format!("/{}/", pattern))?,
            Expression::RuleRef(name) => Matcher::Rule(self.lookup(rule_name, &name.0)?),
            Expression::Link { target, name_rule } => {
                self.lookup(rule_name, &target.0)?;
                let name_rule = name_rule.as_ref().map(|id| id.as_str()).unwrap_or("ID");
                Matcher::Rule(self.lookup(rule_name, name_rule)?)
            }
            Expression::Group(inner) => self.expression(rule_name, inner)?,
            Expression::Sequence(items) => Matcher::Sequence(
                items
                    .iter()
                    .map(|item| self.expression(rule_name, item))
                    .collect::<Result<_, _>>()?,
            ),
            Expression::Choice(alts) => Matcher::Choice(
                alts.iter()
                    .map(|alt| self.expression(rule_name, alt))
                    .collect::<Result<_, _>>()?,
            ),
            Expression::Repeat {
                kind,
                expr,
                separator,
            } => {
                let inner = self.boxed(rule_name, expr)?;
                let separator = match separator {
                    Some(sep) => Some(self.boxed(rule_name, sep)?),
                    None => None,
                };
                match kind {
                    RepeatKind::Optional => Matcher::Optional(inner),
                    RepeatKind::ZeroOrMore => Matcher::Repeat {
                        inner,
                        separator,
                        at_least_one: false,
                    },
                    RepeatKind::OneOrMore => Matcher::Repeat {
                        inner,
                        separator,
                        at_least_one: true,
                    },
                }
            }
            Expression::Predicate(Predicate::Not, inner) => Matcher::Not(self.boxed(rule_name, inner)?),
            Expression::Predicate(Predicate::And, inner) => Matcher::And(self.boxed(rule_name, inner)?),
            Expression::Assignment(assignment) => {
                let id = AssignmentId(self.assignments.len());
                self.assignments.push(AssignmentInfo {
                    rule: self.rule,
                    attribute: assignment.attribute.0.clone(),
                    op: assignment.op,
                    link: link_target(&assignment.value),
                });
                let value = self.boxed(rule_name, &assignment.value)?;
                let separator = match &assignment.separator {
                    Some(sep) => Some(self.boxed(rule_name, sep)?),
                    None => None,
                };
                let inner = match assignment.op {
                    AssignOp::Plain => value,
                    AssignOp::Flag => Box::new(Matcher::Optional(value)),
                    AssignOp::OneOrMore => Box::new(Matcher::Repeat {
                        inner: value,
                        separator,
                        at_least_one: true,
                    }),
                    AssignOp::ZeroOrMore => Box::new(Matcher::Repeat {
                        inner: value,
                        separator,
                        at_least_one: false,
                    }),
                };
                Matcher::Assignment(id, inner)
            }
        };
        Ok(matcher)
    }
}

fn link_target(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Link { target, .. } => Some(target.0.clone()),
        Expression::Group(inner) => link_target(inner),
        _ => None,
    }
}

fn is_lexical(matcher: &Matcher) -> bool {
    match matcher {
        Matcher::Literal(_) | Matcher::Regex(_) => true,
        Matcher::Sequence(items) | Matcher::Choice(items) => items.iter().all(is_lexical),
        Matcher::Optional(inner) | Matcher::Not(inner) | Matcher::And(inner) => is_lexical(inner),
        Matcher::Repeat { inner, separator, .. } => {
            is_lexical(inner) && separator.as_deref().map_or(true, is_lexical)
        }
        Matcher::Rule(_) | Matcher::Assignment(..) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str) -> Result<Parser, CompileError> {
        let grammar: Grammar = src.parse().unwrap();
        Parser::compile(&grammar, LexConfig::default())
    }

    #[test]
    fn assignments_numbered_in_grammar_order() {
        let parser = compile(
            "
            Model: 'model' name=ID items*=Item;
            Item: value=ID flag?='!';
            ID: /[a-z]+/;
            ",
        )
        .unwrap();

        let attrs: Vec<(&str, AssignOp)> = (0..4)
            .map(|i| {
                let info = parser.assignment(AssignmentId(i));
                (info.attribute.as_str(), info.op)
            })
            .collect();
        assert_eq!(
            attrs,
            vec![
                ("name", AssignOp::Plain),
                ("items", AssignOp::ZeroOrMore),
                ("value", AssignOp::Plain),
                ("flag", AssignOp::Flag),
            ]
        );
        assert_eq!(parser.assignment(AssignmentId(2)).rule, RuleId(1));
        assert_eq!(parser.rule_id("ID"), Some(RuleId(2)));
        assert_eq!(parser.rule_name(RuleId(1)), "Item");
        assert!(parser.comment_rule().is_none());
    }

    #[test]
    fn compile_errors() {
        assert!(matches!(compile(""), Err(CompileError::EmptyGrammar)));
        assert!(matches!(
            compile("A: 'a'; A: 'b';"),
            Err(CompileError::DuplicateRule(name)) if name == "A"
        ));
        assert!(matches!(
            compile("A: b=B;"),
            Err(CompileError::UnknownRule { rule, name }) if rule == "A" && name == "B"
        ));
        assert!(matches!(
            compile("A: x=[B];"),
            Err(CompileError::UnknownRule { name, .. }) if name == "B"
        ));
        assert!(matches!(
            compile("A: /(unclosed/;"),
            Err(CompileError::Regex { rule, .. }) if rule == "A"
        ));
    }

    #[test]
    fn regex_rule_labelled_by_name() {
        let parser = compile("Word: /\\w+/; Other: 'x' /\\d/;").unwrap();
        match &parser.rule(RuleId(0)).body {
            Matcher::Regex(p) => assert_eq!(p.label, "Word"),
            other => panic!("unexpected matcher: {:?}", other),
        }
        match &parser.rule(RuleId(1)).body {
            Matcher::Sequence(items) => match &items[1] {
                Matcher::Regex(p) => assert_eq!(p.label, "/\\d/"),
                other => panic!("unexpected matcher: {:?}", other),
            },
            other => panic!("unexpected matcher: {:?}", other),
        }
    }

    #[test]
    fn lexical_rules_and_link_sites() {
        let parser = compile(
            "
            Ref: '->' ('a' t=[A] | 'b' t=[B]) many*=([A] | [B]);
            A: 'a' name=ID;
            B: 'b' name=ID;
            Float: /\\d+\\.\\d*/ !/[\\w.]/;
            Number: Float | ID;
            ID: /[a-z]+/;
            ",
        )
        .unwrap();

        let links: Vec<Option<&str>> = (0..3)
            .map(|i| parser.assignment(AssignmentId(i)).link.as_deref())
            .collect();
        assert_eq!(links, vec![Some("A"), Some("B"), None]);

        let lexical: Vec<(&str, bool)> = parser.rules().map(|(_, r)| (r.name.as_str(), r.lexical)).collect();
        assert_eq!(
            lexical,
            vec![
                ("Ref", false),
                ("A", false),
                ("B", false),
                ("Float", true),
                ("Number", false),
                ("ID", true),
            ]
        );
    }
}
