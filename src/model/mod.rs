//! Object graphs built from model text.

use log::info;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::metamodel::{Class, Metamodel};

mod backend;
mod construct;
mod process;
mod resolve;

pub use backend::{ModelBackend, ModelObject, ObjectStore};

/// Handle of an object within a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ObjectId),
    List(Vec<Value>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// `None`, an empty string or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::None => true,
            Value::Str(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and ints widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Objects held directly or as list items.
    pub fn objects(&self) -> Vec<ObjectId> {
        match self {
            Value::Object(id) => vec![*id],
            Value::List(items) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        }
    }

    /// Text used to register and look up objects by name.
    pub(crate) fn name_text(&self) -> Option<String> {
        match self {
            Value::Str(s) if !s.is_empty() => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A cross-reference after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReference {
    pub holder: ObjectId,
    pub attribute: String,
    pub name: String,
    /// Byte range of the name in the model text.
    pub span: Range<usize>,
    pub target: ObjectId,
}

/// Result of parsing into a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// The start rule's result. An object unless the start rule is a match
    /// rule.
    pub root: Value,
    pub references: Vec<ResolvedReference>,
}

/// A parsed model held in the default object store.
#[derive(Debug)]
pub struct Model<'m> {
    metamodel: &'m Metamodel,
    store: ObjectStore,
    root: Value,
    references: Vec<ResolvedReference>,
    source: String,
    file: Option<PathBuf>,
}

impl<'m> Model<'m> {
    pub(crate) fn new(
        metamodel: &'m Metamodel,
        store: ObjectStore,
        outcome: ParseOutcome,
        source: String,
        file: Option<PathBuf>,
    ) -> Self {
        Model {
            metamodel,
            store,
            root: outcome.root,
            references: outcome.references,
            source,
            file,
        }
    }

    pub fn metamodel(&self) -> &'m Metamodel {
        self.metamodel
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_object(&self) -> Option<ObjectId> {
        self.root.as_object()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn into_store(self) -> ObjectStore {
        self.store
    }

    pub fn object(&self, id: ObjectId) -> Option<&ModelObject> {
        self.store.get(id)
    }

    /// Value of an attribute, `None` when the object or attribute does not
    /// exist.
    pub fn get(&self, id: ObjectId, attribute: &str) -> Option<&Value> {
        self.store.get(id)?.attributes.get(attribute)
    }

    pub fn class_of(&self, id: ObjectId) -> Option<&'m Class> {
        let class = self.store.get(id)?.class;
        Some(self.metamodel.get(class))
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.store.get(id)?.parent
    }

    /// The outermost container of `id`.
    pub fn model_root(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Nearest container of `id` whose class is `class` or inherits from it.
    pub fn parent_of_type(&self, id: ObjectId, class: &str) -> Option<ObjectId> {
        let class = self.metamodel.class(class)?.id;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            let object = self.store.get(parent)?;
            if self.metamodel.is_subclass(object.class, class) {
                return Some(parent);
            }
            current = object.parent;
        }
        None
    }

    /// Objects of `class` (or its subclasses) contained in `id`, depth
    /// first, `id` included. Links are not followed.
    pub fn children_of_type(&self, id: ObjectId, class: &str) -> Vec<ObjectId> {
        let class = match self.metamodel.class(class) {
            Some(class) => class.id,
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let object = match self.store.get(current) {
                Some(object) => object,
                None => continue,
            };
            if self.metamodel.is_subclass(object.class, class) {
                out.push(current);
            }
            let children = contained(self.metamodel, &self.store, current);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Every object of `class` or its subclasses in creation order,
    /// builtins included.
    pub fn objects_of_class(&self, class: &str) -> Vec<ObjectId> {
        let class = match self.metamodel.class(class) {
            Some(class) => class.id,
            None => return Vec::new(),
        };
        self.store
            .iter()
            .filter(|(_, object)| self.metamodel.is_subclass(object.class, class))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn references(&self) -> &[ResolvedReference] {
        &self.references
    }

    /// Line and column, both 1-based, of a byte offset in the model text.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        grammar::line_col(&self.source, offset)
    }

    /// Line and column where an object starts.
    pub fn position(&self, id: ObjectId) -> Option<(usize, usize)> {
        let span = self.store.get(id)?.span.as_ref()?;
        Some(self.line_col(span.start))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Path of the model file, for models read with
    /// [`Metamodel::model_from_file`].
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

/// Objects held by the containment attributes of `id`, in attribute order.
pub(crate) fn contained(metamodel: &Metamodel, backend: &dyn ModelBackend, id: ObjectId) -> Vec<ObjectId> {
    let class = metamodel.get(backend.class_of(id));
    let mut out = Vec::new();
    for attribute in class.attributes.values().filter(|a| a.containment && !a.flag) {
        if let Some(value) = backend.attribute(id, &attribute.name) {
            if backend.is_collection(&value) || value.as_object().is_some() {
                out.extend(value.objects());
            }
        }
    }
    out
}

/// Parses `input` into `backend`: builds the object graph, resolves
/// cross-references and runs object processors.
pub(crate) fn parse(metamodel: &Metamodel, input: &str, backend: &mut dyn ModelBackend) -> Result<ParseOutcome, Error> {
    info!(bytes = input.len(); "Parsing model");
    let tree = metamodel.parser().parse(input)?;
    let constructed = construct::construct(metamodel, &tree, backend)?;
    let references = resolve::resolve(
        metamodel,
        input,
        constructed.crossrefs,
        &constructed.namespaces,
        backend,
    )?;
    process::process(metamodel, &constructed.root, backend)?;
    info!(references = references.len(); "Parsed model");
    Ok(ParseOutcome {
        root: constructed.root,
        references,
    })
}
