use indexmap::IndexSet;
use log::trace;
use std::collections::HashSet;

use crate::compile::{Matcher, Parser, Pattern};
use crate::config::ActiveConfig;
use crate::error::SyntaxError;
use crate::position::Position;
use crate::span::Span;
use crate::tree::{NodeKind, ParseNode};
use crate::{AssignmentId, RuleId};

/// Ok carries the advanced state, Err carries the state restored to where the
/// failed operation started.
pub type StateResult<T> = Result<T, T>;

/// Where to rewind to when an operation fails.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint<'a> {
    cursor: Position<'a>,
    nodes: usize,
}

/// Parser state for a single parse.
#[derive(Debug)]
pub struct State<'a, 'p> {
    parser: &'p Parser,
    cursor: Position<'a>,
    /// Completed nodes not yet attached to a parent.
    nodes: Vec<ParseNode<'a>>,
    config: ActiveConfig<'p>,
    current: RuleId,
    /// Rule invocations in progress, keyed by start offset.
    active: HashSet<(RuleId, usize)>,
    furthest: usize,
    expected: IndexSet<String>,
    /// Non-zero inside lookahead predicates and comments, where failures are
    /// not reported.
    quiet: usize,
    in_comment: bool,
}

impl<'a, 'p> State<'a, 'p> {
    pub fn new(parser: &'p Parser, input: &'a str) -> Self {
        State {
            parser,
            cursor: Position::start(input),
            nodes: Vec::new(),
            config: ActiveConfig::new(parser.config()),
            current: RuleId(0),
            active: HashSet::new(),
            furthest: 0,
            expected: IndexSet::new(),
            quiet: 0,
            in_comment: false,
        }
    }

    /// Matches `rule` followed by the end of input and returns the rule's
    /// node.
    pub fn run(self, rule: RuleId) -> Result<ParseNode<'a>, SyntaxError> {
        let mut state = match self.call(rule).and_then(|s| s.end_of_input()) {
            Ok(state) => state,
            Err(state) => return Err(state.syntax_error()),
        };
        match state.nodes.pop() {
            Some(node) => {
                trace!(nodes = node.iter().count(); "Parsed input");
                Ok(node)
            }
            None => Err(state.syntax_error()),
        }
    }

    pub fn position(&self) -> Position<'a> {
        self.cursor
    }

    pub fn checkpoint(&self) -> Checkpoint<'a> {
        Checkpoint {
            cursor: self.cursor,
            nodes: self.nodes.len(),
        }
    }

    /// Rewind to a checkpoint, dropping nodes produced since.
    pub fn restore(mut self, checkpoint: Checkpoint<'a>) -> Self {
        self.cursor = checkpoint.cursor;
        self.nodes.truncate(checkpoint.nodes);
        self
    }

    /// Runs `f` and collects every node it produces under a single
    /// non-terminal of the given kind.
    pub fn tokenize<F>(self, kind: NodeKind, f: F) -> StateResult<Self>
    where
        F: FnOnce(Self) -> StateResult<Self>,
    {
        let start = self.cursor;
        let mark = self.nodes.len();

        match f(self) {
            Ok(mut state) => {
                let children = state.nodes.split_off(mark);
                let span = match children.first() {
                    Some(first) => Span {
                        start: first.span().start,
                        ..Span::from_positions(&start, &state.cursor)
                    },
                    None => Span::from_positions(&start, &state.cursor),
                };
                state.nodes.push(ParseNode::NonTerminal {
                    kind,
                    span,
                    children,
                });
                Ok(state)
            }
            Err(mut state) => {
                state.nodes.truncate(mark);
                Err(state)
            }
        }
    }

    /// Repeatedly applies some func to state until the first error or until
    /// an application stops consuming input.
    pub fn repeat<F>(self, f: F) -> StateResult<Self>
    where
        F: Fn(Self) -> StateResult<Self>,
    {
        let mut state = self;
        loop {
            let before = state.checkpoint();
            match f(state) {
                Ok(next) if next.cursor.idx > before.cursor.idx => state = next,
                Ok(next) | Err(next) => return Ok(next.restore(before)),
            }
        }
    }

    /// Attempt to apply some func to state, returning Ok regardless of what the
    /// function returns.
    pub fn optional<F>(self, f: F) -> StateResult<Self>
    where
        F: FnOnce(Self) -> StateResult<Self>,
    {
        match f(self) {
            Ok(state) => Ok(state),
            Err(state) => Ok(state),
        }
    }

    /// Succeeds without consuming input iff `f` matches, or iff it fails when
    /// `negate` is set.
    pub fn lookahead<F>(self, negate: bool, f: F) -> StateResult<Self>
    where
        F: FnOnce(Self) -> StateResult<Self>,
    {
        let checkpoint = self.checkpoint();
        let mut state = self;
        state.quiet += 1;
        let (matched, mut state) = match f(state) {
            Ok(state) => (true, state),
            Err(state) => (false, state),
        };
        state.quiet -= 1;
        let state = state.restore(checkpoint);
        if matched != negate {
            Ok(state)
        } else {
            Err(state)
        }
    }

    /// Skips whitespace and `Comment` matches according to the active
    /// configuration.
    pub fn skip_ws(mut self) -> Self {
        if !self.config.skipws {
            return self;
        }
        loop {
            let config = self.config;
            self.cursor.skip_while(|c| config.is_ws(c));

            let comment = match (self.parser.comment_rule(), self.in_comment) {
                (Some(comment), false) => comment,
                _ => return self,
            };
            let checkpoint = self.checkpoint();
            self.in_comment = true;
            self.quiet += 1;
            let (matched, mut state) = match self.call(comment) {
                Ok(state) => (true, state),
                Err(state) => (false, state),
            };
            state.in_comment = false;
            state.quiet -= 1;
            let advanced = matched && state.cursor.idx > checkpoint.cursor.idx;
            state.nodes.truncate(checkpoint.nodes);
            if !advanced {
                return state.restore(checkpoint);
            }
            self = state;
        }
    }

    /// Attempt to match the given string on input. State is updated only if the
    /// string successfully matches.
    pub fn match_str(self, s: &str) -> StateResult<Self> {
        let checkpoint = self.checkpoint();
        let mut state = self.skip_ws();
        let start = state.cursor;
        let config = state.config;

        let matched = state.cursor.match_str(s, config.ignore_case)
            && !(config.autokwd && is_keyword(s) && state.cursor.peek().map_or(false, is_word_char));
        if matched {
            state.push_terminal(start);
            Ok(state)
        } else {
            state.expected(start.idx, || format!("'{}'", s));
            Err(state.restore(checkpoint))
        }
    }

    fn match_pattern(self, pattern: &Pattern) -> StateResult<Self> {
        let checkpoint = self.checkpoint();
        let mut state = self.skip_ws();
        let start = state.cursor;

        match pattern.regex(state.config.ignore_case).find(start.rest()) {
            Some(m) => {
                state.cursor.idx += m.end();
                state.push_terminal(start);
                Ok(state)
            }
            None => {
                state.expected(start.idx, || pattern.label.clone());
                Err(state.restore(checkpoint))
            }
        }
    }

    /// Invokes a rule. Whitespace before the rule is skipped with the caller's
    /// configuration, then the rule's modifiers apply to its body.
    pub fn call(self, rule: RuleId) -> StateResult<Self> {
        let checkpoint = self.checkpoint();
        let mut state = self.skip_ws();
        let key = (rule, state.cursor.idx);
        if !state.active.insert(key) {
            trace!(rule = state.parser.rule_name(rule), offset = key.1; "Left recursion, failing alternative");
            return Err(state.restore(checkpoint));
        }

        let parser = state.parser;
        let compiled = parser.rule(rule);
        if state.quiet == 0 {
            trace!(rule = compiled.name.as_str(), offset = key.1; "Entering rule");
        }
        let mark = (state.furthest, state.expected.len());
        let caller_config = state.config;
        let caller_rule = state.current;
        state.config = caller_config.apply(&compiled.modifiers);
        state.current = rule;

        let finish = |mut s: Self| {
            s.config = caller_config;
            s.current = caller_rule;
            s.active.remove(&key);
            s
        };
        match state.tokenize(NodeKind::Rule(rule), |s| s.eval(&compiled.body)) {
            Ok(s) => Ok(finish(s)),
            Err(s) => {
                let mut s = finish(s);
                if compiled.lexical {
                    s.expected_rule(key.1, &compiled.name, mark);
                }
                Err(s.restore(checkpoint))
            }
        }
    }

    /// Runs a compiled matcher.
    pub fn eval(self, matcher: &'p Matcher) -> StateResult<Self> {
        match matcher {
            Matcher::Literal(s) => self.match_str(s),
            Matcher::Regex(pattern) => self.match_pattern(pattern),
            Matcher::Sequence(items) => {
                let checkpoint = self.checkpoint();
                let mut state = self;
                for item in items {
                    state = match state.eval(item) {
                        Ok(state) => state,
                        Err(state) => return Err(state.restore(checkpoint)),
                    };
                }
                Ok(state)
            }
            Matcher::Choice(alts) => {
                let mut state = self;
                for alt in alts {
                    match state.eval(alt) {
                        Ok(state) => return Ok(state),
                        Err(failed) => state = failed,
                    }
                }
                Err(state)
            }
            Matcher::Optional(inner) => self.optional(|s| s.eval(inner)),
            Matcher::Repeat {
                inner,
                separator,
                at_least_one,
            } => self.repetition(inner, separator.as_deref(), *at_least_one),
            Matcher::Not(inner) => self.lookahead(true, |s| s.eval(inner)),
            Matcher::And(inner) => self.lookahead(false, |s| s.eval(inner)),
            Matcher::Rule(rule) => self.call(*rule),
            Matcher::Assignment(id, inner) => self.assign(*id, inner),
        }
    }

    fn repetition(
        self,
        inner: &'p Matcher,
        separator: Option<&'p Matcher>,
        at_least_one: bool,
    ) -> StateResult<Self> {
        let state = match self.eval(inner) {
            Ok(state) => state,
            Err(state) if at_least_one => return Err(state),
            Err(state) => return Ok(state),
        };
        state.repeat(|s| match separator {
            Some(sep) => s
                .tokenize(NodeKind::Separator, |s| s.eval(sep))
                .and_then(|s| s.eval(inner)),
            None => s.eval(inner),
        })
    }

    /// Matches an assignment value. Nothing is recorded when the value
    /// matched without producing nodes, e.g. an empty `*=` repetition.
    fn assign(self, id: AssignmentId, inner: &'p Matcher) -> StateResult<Self> {
        self.tokenize(NodeKind::Assignment(id), |s| s.eval(inner))
            .map(|mut state| {
                let empty = matches!(
                    state.nodes.last(),
                    Some(ParseNode::NonTerminal { children, .. }) if children.is_empty()
                );
                if empty {
                    state.nodes.pop();
                }
                state
            })
    }

    fn end_of_input(self) -> StateResult<Self> {
        let checkpoint = self.checkpoint();
        let mut state = self.skip_ws();
        if state.cursor.at_end() {
            Ok(state)
        } else {
            let idx = state.cursor.idx;
            state.expected(idx, || "EOF".to_owned());
            Err(state.restore(checkpoint))
        }
    }

    fn push_terminal(&mut self, start: Position<'a>) {
        self.nodes.push(ParseNode::Terminal {
            rule: self.current,
            span: Span::from_positions(&start, &self.cursor),
        });
    }

    /// Records what could have matched at `idx`, keeping only the furthest
    /// position.
    fn expected<F>(&mut self, idx: usize, what: F)
    where
        F: FnOnce() -> String,
    {
        if self.quiet > 0 || idx < self.furthest {
            return;
        }
        if idx > self.furthest {
            self.furthest = idx;
            self.expected.clear();
        }
        self.expected.insert(what());
    }

    /// Replaces what a lexical rule recorded at its own start with the
    /// rule's name. `mark` is the furthest offset and expected count from
    /// before the rule ran.
    fn expected_rule(&mut self, start: usize, name: &str, mark: (usize, usize)) {
        if self.quiet > 0 || self.furthest != start {
            return;
        }
        if mark.0 == start {
            self.expected.truncate(mark.1);
        } else {
            self.expected.clear();
        }
        self.expected.insert(name.to_owned());
    }

    fn syntax_error(self) -> SyntaxError {
        SyntaxError::new(
            self.cursor.input,
            self.furthest,
            self.expected.into_iter().collect(),
        )
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Literals that look like identifiers are subject to auto-keyword checks.
fn is_keyword(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => chars.all(is_word_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LexConfig;
    use grammar::Grammar;

    fn parser(src: &str) -> Parser {
        let grammar: Grammar = src.parse().unwrap();
        Parser::compile(&grammar, LexConfig::default()).unwrap()
    }

    #[test]
    fn combinators_restore_on_failure() {
        let p = parser("A: 'a';");
        let state = State::new(&p, "ab");
        let state = state.match_str("a").unwrap();
        assert_eq!(state.position().idx, 1);
        let state = state.match_str("x").unwrap_err();
        assert_eq!(state.position().idx, 1);
        let state = state.optional(|s| s.match_str("x")).unwrap();
        let state = state.repeat(|s| s.match_str("b")).unwrap();
        assert_eq!(state.position().idx, 2);
        assert_eq!(state.nodes.len(), 2);
    }

    #[test]
    fn lookahead_consumes_nothing() {
        let p = parser("A: 'a';");
        let state = State::new(&p, "ab");
        let state = state.lookahead(false, |s| s.match_str("a")).unwrap();
        assert_eq!(state.position().idx, 0);
        let state = state.lookahead(true, |s| s.match_str("a")).unwrap_err();
        assert_eq!(state.position().idx, 0);
        assert!(state.nodes.is_empty());
        // Failures inside predicates are not reported.
        assert!(state.expected.is_empty());
    }

    #[test]
    fn furthest_failure_wins() {
        let p = parser("A: 'a' 'b' | 'a' 'c' | 'x';");
        let err = p.parse("a d").unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.expected, vec!["'b'".to_owned(), "'c'".to_owned()]);
        assert_eq!(err.found, "'d'");
        assert_eq!((err.line, err.column), (1, 3));
    }

    #[test]
    fn lexical_rules_reported_by_name() {
        let p = parser(
            "
            Model: 'p' (Float | Int);
            Float[noskipws]: /\\d+\\.\\d*/ !/[\\w.]/;
            Int: /\\d+/;
            ",
        );
        let err = p.parse("p z").unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.expected, vec!["Float".to_owned(), "Int".to_owned()]);

        // Past its start a lexical rule still reports the terminal that failed.
        let p = parser("Model: 'p' Pair; Pair: 'x' ':' 'y';");
        let err = p.parse("p x z").unwrap_err();
        assert_eq!(err.expected, vec!["':'".to_owned()]);
    }

    #[test]
    fn keyword_detection() {
        assert!(is_keyword("first"));
        assert!(is_keyword("_x1"));
        assert!(!is_keyword("+="));
        assert!(!is_keyword("1st"));
        assert!(!is_keyword(""));
    }
}
