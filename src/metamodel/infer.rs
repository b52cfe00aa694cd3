//! Rule kind inference and the inheritance graph.
//!
//! Rules with assignments are concrete and alternations of two or more bare
//! literals are enumerations. Everything else depends on the rules it
//! references: alternatives that each produce one object make an abstract
//! rule, alternatives that produce none make a match rule. References to
//! rules whose kind is still open are treated optimistically and every
//! decision is checked again once all kinds are known.

use grammar::{Expression, Grammar, RepeatKind};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};

use super::{builtins, Class, ClassId, RuleKind, ValueType};
use crate::error::GrammarError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Count {
    Zero,
    One,
    Many,
}

impl Count {
    fn plus(self, other: Count) -> Count {
        match (self, other) {
            (Count::Zero, c) | (c, Count::Zero) => c,
            _ => Count::Many,
        }
    }
}

/// What an expression produces when it matches.
#[derive(Debug, Clone, Copy)]
struct Shape {
    objects: Count,
    /// Produces primitive values: regex matches or match rule results.
    values: bool,
    /// References a rule whose kind is not known yet.
    pending: bool,
    /// Produces an object on some paths and none on others.
    mixed: bool,
}

impl Shape {
    const EMPTY: Shape = Shape {
        objects: Count::Zero,
        values: false,
        pending: false,
        mixed: false,
    };

    fn then(self, other: Shape) -> Shape {
        Shape {
            objects: self.objects.plus(other.objects),
            values: self.values || other.values,
            pending: self.pending || other.pending,
            mixed: self.mixed || other.mixed,
        }
    }

    fn or(self, other: Shape) -> Shape {
        let optimistic = (self.objects == Count::Zero && self.pending)
            || (other.objects == Count::Zero && other.pending);
        Shape {
            objects: self.objects.max(other.objects),
            values: self.values || other.values,
            pending: self.pending || other.pending,
            mixed: self.mixed || other.mixed || (self.objects != other.objects && !optimistic),
        }
    }
}

enum Alternative {
    Object,
    Value,
    Pending,
    Ambiguous(&'static str),
}

struct Inference<'g> {
    grammar: &'g Grammar,
    index: HashMap<&'g str, usize>,
    kinds: Vec<Option<RuleKind>>,
}

impl<'g> Inference<'g> {
    fn kind_of(&self, name: &str) -> Option<RuleKind> {
        self.index.get(name).and_then(|i| self.kinds[*i])
    }

    fn shape(&self, expr: &Expression) -> Shape {
        match expr {
            Expression::Str(_) | Expression::Predicate(..) | Expression::Assignment(_) => Shape::EMPTY,
            Expression::Regex(_) | Expression::Link { .. } => Shape {
                values: true,
                ..Shape::EMPTY
            },
            Expression::RuleRef(name) => match self.kind_of(name.as_str()) {
                Some(kind) if kind.is_class() => Shape {
                    objects: Count::One,
                    ..Shape::EMPTY
                },
                Some(_) => Shape {
                    values: true,
                    ..Shape::EMPTY
                },
                None => Shape {
                    pending: true,
                    ..Shape::EMPTY
                },
            },
            Expression::Group(inner) => self.shape(inner),
            Expression::Sequence(items) => items
                .iter()
                .fold(Shape::EMPTY, |acc, item| acc.then(self.shape(item))),
            Expression::Choice(alts) => alts
                .iter()
                .map(|alt| self.shape(alt))
                .reduce(Shape::or)
                .unwrap_or(Shape::EMPTY),
            Expression::Repeat { kind, expr, .. } => {
                let inner = self.shape(expr);
                match (kind, inner.objects) {
                    (_, Count::Zero) => inner,
                    (RepeatKind::Optional, _) => Shape { mixed: true, ..inner },
                    _ => Shape {
                        objects: Count::Many,
                        ..inner
                    },
                }
            }
        }
    }

    fn classify(&self, alt: &Expression) -> Alternative {
        let shape = self.shape(alt);
        if shape.mixed {
            return Alternative::Ambiguous("an alternative produces an object only on some paths");
        }
        match shape.objects {
            Count::Many => Alternative::Ambiguous("an alternative produces more than one object"),
            Count::One if shape.values => {
                Alternative::Ambiguous("an alternative produces both an object and values")
            }
            Count::One => Alternative::Object,
            Count::Zero if shape.pending => Alternative::Pending,
            Count::Zero => Alternative::Value,
        }
    }

    /// Kind of a rule without assignments, or `None` while it depends on
    /// rules still undecided.
    fn decide(&self, body: &Expression) -> Result<Option<RuleKind>, &'static str> {
        let (mut objects, mut values, mut pending) = (false, false, false);
        for alt in alternatives(body) {
            match self.classify(alt) {
                Alternative::Ambiguous(reason) => return Err(reason),
                Alternative::Object => objects = true,
                Alternative::Value => values = true,
                Alternative::Pending => pending = true,
            }
        }
        match (objects, values, pending) {
            (true, true, _) => Err("alternatives mix objects and values"),
            (true, false, _) => Ok(Some(RuleKind::Abstract)),
            (false, _, true) => Ok(None),
            (false, _, false) => Ok(Some(RuleKind::Match)),
        }
    }

    /// Class-producing rules referenced outside predicates, in order.
    fn class_refs(&self, expr: &'g Expression, out: &mut Vec<usize>) {
        match expr {
            Expression::RuleRef(name) => {
                if let Some(i) = self.index.get(name.as_str()) {
                    if self.kinds[*i].map_or(false, RuleKind::is_class) && !out.contains(i) {
                        out.push(*i);
                    }
                }
            }
            Expression::Group(inner) => self.class_refs(inner, out),
            Expression::Repeat { expr, .. } => self.class_refs(expr, out),
            Expression::Sequence(items) | Expression::Choice(items) => {
                for item in items {
                    self.class_refs(item, out);
                }
            }
            _ => {}
        }
    }
}

/// Top-level alternatives of a rule body.
pub(super) fn alternatives(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Choice(alts) => alts.iter().collect(),
        Expression::Group(inner) => alternatives(inner),
        other => vec![other],
    }
}

/// Literals of an enumeration rule: two or more alternatives, each a bare
/// string.
fn enumeration_literals(rule: &grammar::Rule) -> Result<Option<Vec<String>>, GrammarError> {
    let alts = alternatives(&rule.body);
    if alts.len() < 2 {
        return Ok(None);
    }
    let mut literals = Vec::with_capacity(alts.len());
    for alt in alts {
        match alt {
            Expression::Str(term) => {
                if literals.contains(&term.0) {
                    return Err(GrammarError::DuplicateLiteral {
                        rule: rule.name.0.clone(),
                        literal: term.0.clone(),
                    });
                }
                literals.push(term.0.clone());
            }
            _ => return Ok(None),
        }
    }
    Ok(Some(literals))
}

pub(super) fn infer(grammar: &Grammar) -> Result<Vec<Class>, GrammarError> {
    let n = grammar.rules.len();
    let mut inference = Inference {
        grammar,
        index: grammar
            .rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect(),
        kinds: vec![None; n],
    };
    let mut literals = vec![Vec::new(); n];

    for (i, rule) in grammar.rules.iter().enumerate() {
        if builtins::is_base_type(rule.name.as_str()) {
            inference.kinds[i] = Some(RuleKind::Match);
        } else if rule.body.has_assignment() {
            inference.kinds[i] = Some(RuleKind::Concrete);
        } else if let Some(lits) = enumeration_literals(rule)? {
            inference.kinds[i] = Some(RuleKind::Enumeration);
            literals[i] = lits;
        }
    }

    let ambiguous = |i: usize, reason: &str| GrammarError::AmbiguousShape {
        rule: grammar.rules[i].name.0.clone(),
        reason: reason.to_owned(),
    };

    // Every productive pass settles at least one rule.
    let max_passes = n + 1;
    let mut passes = 0;
    loop {
        passes += 1;
        if passes > max_passes {
            return Err(GrammarError::NoConvergence { passes: max_passes });
        }
        let mut changed = false;
        for i in 0..n {
            if inference.kinds[i].is_some() {
                continue;
            }
            match inference.decide(&grammar.rules[i].body) {
                Ok(Some(kind)) => {
                    inference.kinds[i] = Some(kind);
                    changed = true;
                }
                Ok(None) => {}
                Err(reason) => return Err(ambiguous(i, reason)),
            }
        }
        if !changed {
            break;
        }
    }

    // Rules only reachable through each other never produce an object.
    for kind in inference.kinds.iter_mut().filter(|k| k.is_none()) {
        *kind = Some(RuleKind::Match);
    }

    let kinds: Vec<RuleKind> = inference.kinds.iter().map(|k| k.unwrap_or(RuleKind::Match)).collect();
    for (i, kind) in kinds.iter().enumerate() {
        if !matches!(kind, RuleKind::Abstract | RuleKind::Match) {
            continue;
        }
        match inference.decide(&grammar.rules[i].body) {
            Ok(Some(decided)) if decided == *kind => {}
            Ok(_) => return Err(ambiguous(i, "alternatives mix objects and values")),
            Err(reason) => return Err(ambiguous(i, reason)),
        }
        debug!(rule = grammar.rules[i].name.as_str(); "Inferred {} rule", kind);
    }

    let mut classes: Vec<Class> = grammar
        .rules
        .iter()
        .enumerate()
        .map(|(i, rule)| Class {
            id: ClassId(i),
            name: rule.name.0.clone(),
            kind: kinds[i],
            attributes: IndexMap::new(),
            inherited_by: Vec::new(),
            inherits: Vec::new(),
            literals: std::mem::take(&mut literals[i]),
            value_type: ValueType::Object,
            builtin: builtins::is_base_type(rule.name.as_str()),
        })
        .collect();

    for (i, rule) in grammar.rules.iter().enumerate() {
        if kinds[i] != RuleKind::Abstract {
            continue;
        }
        let mut children = Vec::new();
        inference.class_refs(&rule.body, &mut children);
        for child in &children {
            classes[*child].inherits.push(ClassId(i));
        }
        classes[i].inherited_by = children.into_iter().map(ClassId).collect();
    }

    let mut types = TypeInference {
        inference: &inference,
        memo: vec![None; n],
        visiting: HashSet::new(),
    };
    for i in 0..n {
        classes[i].value_type = types.value_type(i);
    }

    Ok(classes)
}

/// Value types of match rules, following single references.
struct TypeInference<'i, 'g> {
    inference: &'i Inference<'g>,
    memo: Vec<Option<ValueType>>,
    visiting: HashSet<usize>,
}

impl<'i, 'g> TypeInference<'i, 'g> {
    fn value_type(&mut self, i: usize) -> ValueType {
        if let Some(ty) = self.memo[i] {
            return ty;
        }
        let grammar = self.inference.grammar;
        let rule = &grammar.rules[i];
        let ty = match self.inference.kinds[i] {
            Some(RuleKind::Concrete) | Some(RuleKind::Abstract) => ValueType::Object,
            Some(RuleKind::Enumeration) => ValueType::Str,
            _ => match builtins::value_type(rule.name.as_str()) {
                Some(ty) => ty,
                None if !self.visiting.insert(i) => ValueType::Str,
                None => {
                    let ty = alternatives(&rule.body)
                        .into_iter()
                        .map(|alt| self.alternative_type(alt))
                        .reduce(ValueType::widen)
                        .unwrap_or(ValueType::Str);
                    self.visiting.remove(&i);
                    ty
                }
            },
        };
        self.memo[i] = Some(ty);
        ty
    }

    /// A lone rule reference passes its value through, anything else
    /// yields the matched text.
    fn alternative_type(&mut self, alt: &Expression) -> ValueType {
        match alt {
            Expression::Group(inner) => self.alternative_type(inner),
            Expression::RuleRef(name) => match self.inference.index.get(name.as_str()) {
                Some(j) => {
                    let j = *j;
                    self.value_type(j)
                }
                None => ValueType::Str,
            },
            _ => ValueType::Str,
        }
    }
}
