//! Object graph construction from a parse tree.
//!
//! A single depth-first walk. Objects are allocated on the way down and
//! pushed on a stack, so a nested object finds its container at the top of
//! the stack when it completes. Links are only recorded here; they resolve
//! once every object exists.

use log::{debug, warn};
use parsegen::{AssignmentId, NodeKind, ParseNode};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use super::{ModelBackend, ObjectId, Value};
use crate::error::SemanticError;
use crate::metamodel::{builtins, Attribute, Class, ClassId, Metamodel, NamePolicy, RuleKind};

/// Named objects of one concrete class.
pub(crate) type Namespaces = HashMap<ClassId, HashMap<String, ObjectId>>;

/// A link waiting for resolution.
#[derive(Debug, Clone)]
pub(crate) struct CrossReference {
    pub holder: ObjectId,
    pub attribute: String,
    /// Declared class of the link target.
    pub class: ClassId,
    pub name: String,
    pub span: Range<usize>,
    pub many: bool,
}

#[derive(Debug)]
pub(crate) struct Constructed {
    pub root: Value,
    pub crossrefs: Vec<CrossReference>,
    pub namespaces: Namespaces,
}

struct Frame {
    object: ObjectId,
    /// Single-valued attributes assigned so far.
    assigned: HashSet<String>,
}

struct Constructor<'m, 'b> {
    metamodel: &'m Metamodel,
    backend: &'b mut dyn ModelBackend,
    stack: Vec<Frame>,
    namespaces: Namespaces,
    crossrefs: Vec<CrossReference>,
    objects: usize,
}

pub(crate) fn construct(
    metamodel: &Metamodel,
    tree: &ParseNode,
    backend: &mut dyn ModelBackend,
) -> Result<Constructed, SemanticError> {
    let mut constructor = Constructor {
        metamodel,
        backend,
        stack: Vec::new(),
        namespaces: HashMap::new(),
        crossrefs: Vec::new(),
        objects: 0,
    };
    let root = constructor.node(tree)?;
    debug!(objects = constructor.objects, crossrefs = constructor.crossrefs.len(); "Constructed object graph");
    Ok(Constructed {
        root,
        crossrefs: constructor.crossrefs,
        namespaces: constructor.namespaces,
    })
}

impl<'m, 'b> Constructor<'m, 'b> {
    fn node(&mut self, node: &ParseNode) -> Result<Value, SemanticError> {
        let rule = match node.rule() {
            Some(rule) => rule,
            None => return Ok(Value::Str(node.text())),
        };
        let metamodel = self.metamodel;
        let class = metamodel.get(ClassId::from(rule));
        match class.kind {
            RuleKind::Concrete => self.object(node, class),
            // Transparent: the value of whichever alternative matched.
            RuleKind::Abstract => match node.children().iter().find(|c| c.rule().is_some()) {
                Some(child) => self.node(child),
                None => Ok(Value::None),
            },
            RuleKind::Match | RuleKind::Enumeration => self.match_value(node, class),
        }
    }

    fn object(&mut self, node: &ParseNode, class: &'m Class) -> Result<Value, SemanticError> {
        let id = self.backend.allocate(class);
        let span = node.span();
        self.backend.set_span(id, span.start..span.end);
        for attribute in class.attributes.values() {
            let default = attribute.default_value(self.metamodel.auto_init);
            self.backend.set_attribute(id, &attribute.name, default);
        }
        self.objects += 1;
        debug!(class = class.name.as_str(), offset = span.start; "Creating object");

        self.stack.push(Frame {
            object: id,
            assigned: HashSet::new(),
        });
        let populated = self.populate(node, class);
        self.stack.pop();
        populated?;

        if let Some(container) = self.stack.last() {
            self.backend.set_parent(id, container.object);
        }
        self.backend
            .initialize(id, class)
            .map_err(|source| SemanticError::Initialize {
                class: class.name.clone(),
                source,
            })?;
        self.register(id, class, node)?;
        Ok(Value::Object(id))
    }

    fn populate(&mut self, node: &ParseNode, class: &'m Class) -> Result<(), SemanticError> {
        for child in node.children() {
            match child.kind() {
                Some(NodeKind::Assignment(id)) => self.assign(child, id, class)?,
                // Objects matched without assignment belong to no attribute,
                // but they are still built and named.
                Some(NodeKind::Rule(rule)) if self.metamodel.get(rule.into()).kind.is_class() => {
                    self.node(child)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn assign(&mut self, node: &ParseNode, id: AssignmentId, class: &'m Class) -> Result<(), SemanticError> {
        let metamodel = self.metamodel;
        let info = metamodel.parser().assignment(id);
        let attribute = match class.attribute(&info.attribute) {
            Some(attribute) => attribute,
            None => return Ok(()),
        };
        let holder = match self.stack.last() {
            Some(frame) => frame.object,
            None => return Ok(()),
        };

        if attribute.flag {
            self.backend.set_attribute(holder, &attribute.name, Value::Bool(true));
            return Ok(());
        }

        let values: Vec<&ParseNode> = node.children().iter().filter(|c| !c.is_separator()).collect();
        let many = attribute.multiplicity.is_many();
        if !many {
            self.claim(node, class, attribute)?;
        }

        if !attribute.containment {
            let target = metamodel.link_target(id);
            for child in values {
                let name = self.node(child)?.name_text().unwrap_or_else(|| child.text());
                let span = child.span();
                let target = match target {
                    Some(target) => target,
                    None => {
                        let (line, column) = span.line_col();
                        return Err(SemanticError::UnresolvedReference {
                            name,
                            class: format!("{}.{}", class.name, attribute.name),
                            line,
                            column,
                        });
                    }
                };
                self.crossrefs.push(CrossReference {
                    holder,
                    attribute: attribute.name.clone(),
                    class: target,
                    name,
                    span: span.start..span.end,
                    many,
                });
            }
            return Ok(());
        }

        if many {
            for child in values {
                let value = self.node(child)?;
                self.backend.append_attribute(holder, &attribute.name, value);
            }
            return Ok(());
        }

        let value = match values.as_slice() {
            [single] => self.node(single)?,
            _ => Value::Str(node.text()),
        };
        self.backend.set_attribute(holder, &attribute.name, value);
        Ok(())
    }

    /// Marks a single-valued attribute as assigned. Assigning it again
    /// within the current object fails unless the earlier value is empty.
    fn claim(&mut self, node: &ParseNode, class: &Class, attribute: &Attribute) -> Result<(), SemanticError> {
        let frame = match self.stack.last_mut() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        if frame.assigned.insert(attribute.name.clone()) {
            return Ok(());
        }
        let holder = frame.object;
        if self
            .backend
            .attribute(holder, &attribute.name)
            .map_or(true, |value| value.is_empty())
        {
            return Ok(());
        }
        let (line, column) = node.span().line_col();
        Err(SemanticError::MultipleAssignment {
            class: class.name.clone(),
            attribute: attribute.name.clone(),
            line,
            column,
        })
    }

    fn match_value(&mut self, node: &ParseNode, class: &'m Class) -> Result<Value, SemanticError> {
        let text = node.text();
        let conversion_error = |source: anyhow::Error| {
            let (line, column) = node.span().line_col();
            SemanticError::Conversion {
                rule: class.name.clone(),
                text: text.clone(),
                line,
                column,
                source,
            }
        };

        if let Some(converter) = self.metamodel.converters.get(&class.id) {
            return converter(&text).map_err(conversion_error);
        }
        if class.builtin {
            if let Some(converted) = builtins::convert(&class.name, &text) {
                return converted.map_err(conversion_error);
            }
        }
        if class.kind == RuleKind::Enumeration {
            // Canonical spelling, for case-insensitive matches.
            let literal = class
                .literals
                .iter()
                .find(|l| **l == text)
                .or_else(|| class.literals.iter().find(|l| l.to_lowercase() == text.to_lowercase()));
            return Ok(Value::Str(literal.cloned().unwrap_or(text)));
        }

        let children: Vec<&ParseNode> = node.children().iter().filter(|c| !c.is_separator()).collect();
        match children.as_slice() {
            [only] if only.rule().is_some() => self.node(only),
            _ => Ok(Value::Str(text)),
        }
    }

    fn register(&mut self, id: ObjectId, class: &Class, node: &ParseNode) -> Result<(), SemanticError> {
        let name = match self.backend.attribute(id, "name").and_then(|v| v.name_text()) {
            Some(name) => name,
            None => return Ok(()),
        };
        let namespace = self.namespaces.entry(class.id).or_default();
        if namespace.contains_key(&name) {
            match self.metamodel.name_policy {
                NamePolicy::LastWins => {
                    warn!(class = class.name.as_str(), name = name.as_str(); "Duplicate name, later object wins");
                }
                NamePolicy::Reject => {
                    let (line, column) = node.span().line_col();
                    return Err(SemanticError::DuplicateName {
                        name,
                        class: class.name.clone(),
                        line,
                        column,
                    });
                }
            }
        }
        namespace.insert(name, id);
        Ok(())
    }
}
