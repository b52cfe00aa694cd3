//! Attribute descriptors of concrete classes.

use grammar::{AssignOp, Assignment, Expression, Grammar, RepeatKind};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};

use super::{is_subclass, Attribute, Class, ClassId, Multiplicity, RuleKind, ValueType};
use crate::error::GrammarError;

/// Where an assignment sits within its rule body.
#[derive(Debug, Clone, Copy, Default)]
struct Context {
    optional: bool,
    many: bool,
}

/// What one assignment contributes to its attribute.
#[derive(Debug, Clone, Copy)]
struct Occurrence {
    multiplicity: Multiplicity,
    containment: bool,
    flag: bool,
    target: Option<ClassId>,
    value_type: ValueType,
}

struct Deriver<'c> {
    classes: &'c [Class],
    index: HashMap<&'c str, ClassId>,
    rule: &'c str,
}

impl<'c> Deriver<'c> {
    fn walk(&self, expr: &Expression, ctx: Context, out: &mut Vec<(String, Occurrence)>) -> Result<(), GrammarError> {
        match expr {
            Expression::Assignment(assignment) => {
                out.push((assignment.attribute.0.clone(), self.occurrence(assignment, ctx)?));
            }
            Expression::Group(inner) => self.walk(inner, ctx, out)?,
            Expression::Sequence(items) => {
                for item in items {
                    self.walk(item, ctx, out)?;
                }
            }
            Expression::Choice(alts) => {
                let ctx = Context {
                    optional: ctx.optional || alts.len() > 1,
                    ..ctx
                };
                for alt in alts {
                    self.walk(alt, ctx, out)?;
                }
            }
            Expression::Repeat { kind, expr, .. } => {
                let ctx = match kind {
                    RepeatKind::Optional => Context { optional: true, ..ctx },
                    RepeatKind::ZeroOrMore => Context {
                        optional: true,
                        many: true,
                    },
                    RepeatKind::OneOrMore => Context { many: true, ..ctx },
                };
                self.walk(expr, ctx, out)?;
            }
            // Lookahead never assigns anything.
            Expression::Predicate(..) => {}
            Expression::Str(_) | Expression::Regex(_) | Expression::RuleRef(_) | Expression::Link { .. } => {}
        }
        Ok(())
    }

    fn occurrence(&self, assignment: &Assignment, ctx: Context) -> Result<Occurrence, GrammarError> {
        let (repeat, value) = match assignment.value.as_ref() {
            Expression::Repeat { kind, expr, .. } => (Some(*kind), expr.as_ref()),
            value => (None, value),
        };

        if assignment.op == AssignOp::Flag {
            return Ok(Occurrence {
                multiplicity: Multiplicity::Optional,
                containment: true,
                flag: true,
                target: None,
                value_type: ValueType::Bool,
            });
        }

        let (target, value_type, containment) = self.value_source(value)?;
        let multiplicity = match assignment.op {
            AssignOp::OneOrMore if !ctx.optional => Multiplicity::OneOrMore,
            AssignOp::OneOrMore | AssignOp::ZeroOrMore => Multiplicity::ZeroOrMore,
            _ => match repeat {
                _ if ctx.many => Multiplicity::ZeroOrMore,
                Some(RepeatKind::OneOrMore) if !ctx.optional => Multiplicity::OneOrMore,
                Some(RepeatKind::OneOrMore) | Some(RepeatKind::ZeroOrMore) => Multiplicity::ZeroOrMore,
                Some(RepeatKind::Optional) => Multiplicity::Optional,
                None if ctx.optional => Multiplicity::Optional,
                None => Multiplicity::One,
            },
        };
        Ok(Occurrence {
            multiplicity,
            containment,
            flag: false,
            target,
            value_type,
        })
    }

    /// Target class, value type and containment of an assigned expression.
    fn value_source(&self, value: &Expression) -> Result<(Option<ClassId>, ValueType, bool), GrammarError> {
        match value {
            Expression::Group(inner) => self.value_source(inner),
            Expression::RuleRef(name) => {
                let id = self.class_id(name.as_str())?;
                Ok((Some(id), self.classes[id.0].value_type, true))
            }
            Expression::Link { target, .. } => {
                let id = self.class_id(target.as_str())?;
                if !self.classes[id.0].kind.is_class() {
                    return Err(GrammarError::InvalidLinkTarget {
                        rule: self.rule.to_owned(),
                        target: target.0.clone(),
                    });
                }
                Ok((Some(id), ValueType::Object, false))
            }
            Expression::Choice(alts) => {
                let mut sources = alts.iter().map(|alt| self.value_source(alt));
                let mut acc = match sources.next() {
                    Some(first) => first?,
                    None => return Ok((None, ValueType::Str, true)),
                };
                for source in sources {
                    let (target, value_type, containment) = source?;
                    if containment != acc.2 {
                        return Err(self.inconsistent(
                            "<choice>",
                            "alternatives mix links and contained values",
                        ));
                    }
                    acc = (
                        self.merge_targets(acc.0, target),
                        acc.1.widen(value_type),
                        containment,
                    );
                }
                Ok(acc)
            }
            _ => Ok((None, ValueType::Str, true)),
        }
    }

    fn class_id(&self, name: &str) -> Result<ClassId, GrammarError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GrammarError::UnknownRule(name.to_owned()))
    }

    /// Classes widen to their nearest common superclass.
    fn merge_targets(&self, a: Option<ClassId>, b: Option<ClassId>) -> Option<ClassId> {
        let (a, b) = (a?, b?);
        if a == b {
            return Some(a);
        }
        if !self.classes[a.0].kind.is_class() || !self.classes[b.0].kind.is_class() {
            return None;
        }
        let mut queue = VecDeque::from([a]);
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if is_subclass(self.classes, b, id) {
                return Some(id);
            }
            queue.extend(self.classes[id.0].inherits.iter().copied());
        }
        None
    }

    fn inconsistent(&self, attribute: &str, reason: &str) -> GrammarError {
        GrammarError::InconsistentAttribute {
            rule: self.rule.to_owned(),
            attribute: attribute.to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn merge(&self, name: &str, occurrences: &[Occurrence]) -> Result<Attribute, GrammarError> {
        let mut acc = occurrences[0];
        let mut many = acc.multiplicity.is_many();
        for next in &occurrences[1..] {
            if next.flag != acc.flag {
                return Err(self.inconsistent(name, "assigned both as a flag and as a value"));
            }
            if next.containment != acc.containment {
                return Err(self.inconsistent(name, "assigned both as a link and as a contained value"));
            }
            many |= next.multiplicity.is_many();
            acc = Occurrence {
                target: self.merge_targets(acc.target, next.target),
                value_type: acc.value_type.widen(next.value_type),
                ..*next
            };
        }
        if many && !acc.multiplicity.is_many() {
            acc.multiplicity = Multiplicity::ZeroOrMore;
        }
        Ok(Attribute {
            name: name.to_owned(),
            multiplicity: acc.multiplicity,
            containment: acc.containment,
            target: acc.target,
            flag: acc.flag,
            value_type: acc.value_type,
        })
    }
}

/// Fills in the attributes of every concrete class.
pub(super) fn derive(grammar: &Grammar, classes: &mut [Class]) -> Result<(), GrammarError> {
    let mut derived = Vec::new();
    {
        let snapshot: &[Class] = classes;
        let index = snapshot.iter().map(|c| (c.name.as_str(), c.id)).collect::<HashMap<_, _>>();
        for (i, rule) in grammar.rules.iter().enumerate() {
            if snapshot[i].kind != RuleKind::Concrete {
                continue;
            }
            let deriver = Deriver {
                classes: snapshot,
                index: index.clone(),
                rule: rule.name.as_str(),
            };
            let mut occurrences = Vec::new();
            deriver.walk(&rule.body, Context::default(), &mut occurrences)?;

            let mut grouped: IndexMap<String, Vec<Occurrence>> = IndexMap::new();
            for (name, occurrence) in occurrences {
                grouped.entry(name).or_default().push(occurrence);
            }
            let mut attributes = IndexMap::new();
            for (name, occurrences) in &grouped {
                attributes.insert(name.clone(), deriver.merge(name, occurrences)?);
            }
            debug!(rule = rule.name.as_str(), attributes = attributes.len(); "Derived attributes");
            derived.push((i, attributes));
        }
    }
    for (i, attributes) in derived {
        classes[i].attributes = attributes;
    }
    Ok(())
}
