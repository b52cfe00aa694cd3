//! Grammar compiled into classes.
//!
//! Every grammar rule becomes a [`Class`] with an inferred [`RuleKind`].
//! Concrete classes carry attribute descriptors, abstract classes list the
//! classes they generalize, enumerations list their literals. The metamodel
//! is immutable once built and can be shared between threads parsing
//! different models.

use grammar::Grammar;
use indexmap::IndexMap;
use log::info;
use parsegen::{AssignmentId, Parser, RuleId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, GrammarError};
use crate::model::{Model, ModelBackend, ObjectStore, ParseOutcome, Value};

mod attrs;
mod builder;
pub(crate) mod builtins;
mod infer;

pub use builder::{BuiltinObject, Converter, MetamodelBuilder, NamePolicy, ObjectProcessor};

/// Index of a class within its metamodel. Matches the rule index in the
/// compiled parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

impl From<RuleId> for ClassId {
    fn from(id: RuleId) -> Self {
        ClassId(id.0)
    }
}

/// What a rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Objects with named attributes.
    Concrete,
    /// Nothing of its own; one of the classes it alternates over.
    Abstract,
    /// A primitive value.
    Match,
    /// One of a fixed set of string literals.
    Enumeration,
}

impl RuleKind {
    /// Whether the rule produces objects rather than values.
    pub fn is_class(self) -> bool {
        matches!(self, RuleKind::Concrete | RuleKind::Abstract)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RuleKind::Concrete => "concrete",
            RuleKind::Abstract => "abstract",
            RuleKind::Match => "match",
            RuleKind::Enumeration => "enumeration",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    Optional,
    OneOrMore,
    ZeroOrMore,
}

impl Multiplicity {
    pub fn is_many(self) -> bool {
        matches!(self, Multiplicity::OneOrMore | Multiplicity::ZeroOrMore)
    }
}

/// Static type of the values an attribute or match rule holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Object,
    Any,
}

impl ValueType {
    /// The narrowest type holding values of both `self` and `other`.
    pub fn widen(self, other: ValueType) -> ValueType {
        use ValueType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int, Float) | (Float, Int) => Float,
            _ => Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub multiplicity: Multiplicity,
    /// False for links, which refer to objects defined elsewhere by name.
    pub containment: bool,
    /// Class of the assigned values. `None` for string literals, regexes
    /// and alternatives without a common class.
    pub target: Option<ClassId>,
    /// Assigned with `?=`.
    pub flag: bool,
    pub value_type: ValueType,
}

impl Attribute {
    /// Value an attribute holds before anything is assigned to it.
    pub fn default_value(&self, auto_init: bool) -> Value {
        if self.multiplicity.is_many() {
            return Value::List(Vec::new());
        }
        if self.flag {
            return Value::Bool(false);
        }
        if !auto_init {
            return Value::None;
        }
        match self.value_type {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Str => Value::Str(String::new()),
            ValueType::Object | ValueType::Any => Value::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub kind: RuleKind,
    /// Attribute descriptors in grammar order. Only concrete classes have
    /// attributes.
    pub attributes: IndexMap<String, Attribute>,
    /// Direct subclasses, in the order the abstract rule lists them.
    pub inherited_by: Vec<ClassId>,
    /// Direct superclasses.
    pub inherits: Vec<ClassId>,
    /// Enumeration literals in declaration order.
    pub literals: Vec<String>,
    /// Value type produced by match and enumeration rules.
    pub value_type: ValueType,
    /// One of the base types available to every grammar.
    pub builtin: bool,
}

impl Class {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// A compiled grammar: classes for every rule plus the parser that reads
/// models conforming to it.
pub struct Metamodel {
    grammar: Grammar,
    parser: Parser,
    classes: Vec<Class>,
    index: HashMap<String, ClassId>,
    /// Class each link assignment refers to. A site assigning a single
    /// link uses the class it names, other sites the attribute's target.
    link_targets: HashMap<AssignmentId, ClassId>,
    pub(crate) converters: HashMap<ClassId, Converter>,
    pub(crate) processors: HashMap<ClassId, ObjectProcessor>,
    pub(crate) builtins: IndexMap<String, BuiltinObject>,
    pub(crate) name_policy: NamePolicy,
    pub(crate) auto_init: bool,
}

impl fmt::Debug for Metamodel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Metamodel")
            .field("classes", &self.classes)
            .field("converters", &self.converters.len())
            .field("processors", &self.processors.len())
            .field("builtins", &self.builtins.keys().collect::<Vec<_>>())
            .field("name_policy", &self.name_policy)
            .finish()
    }
}

impl Metamodel {
    /// Builds a metamodel with default settings from a grammar file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        MetamodelBuilder::new().build_file(path)
    }

    /// The grammar the metamodel was built from, base types included.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// The class of the start rule.
    pub fn start(&self) -> &Class {
        &self.classes[0]
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        self.index.get(name).map(|id| &self.classes[id.0])
    }

    pub fn get(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// Classes defined by the user grammar, leaving out base types.
    pub fn user_classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter().filter(|c| !c.builtin)
    }

    /// Class the link assigned at `site` refers to. `None` for sites that
    /// do not assign links.
    pub fn link_target(&self, site: AssignmentId) -> Option<ClassId> {
        self.link_targets.get(&site).copied()
    }

    /// Whether `class` is `ancestor` or inherits from it.
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        is_subclass(&self.classes, class, ancestor)
    }

    /// Concrete classes reachable from `class` through the inheritance
    /// graph, depth-first in alternative order. A concrete class yields
    /// itself.
    pub fn concrete_descendants(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_concrete(class, &mut seen, &mut out);
        out
    }

    fn collect_concrete(&self, class: ClassId, seen: &mut HashSet<ClassId>, out: &mut Vec<ClassId>) {
        if !seen.insert(class) {
            return;
        }
        let c = &self.classes[class.0];
        if c.kind == RuleKind::Concrete {
            out.push(class);
        }
        for child in &c.inherited_by {
            self.collect_concrete(*child, seen, out);
        }
    }

    /// Parses a model into the default object store.
    pub fn model_from_str(&self, input: &str) -> Result<Model<'_>, Error> {
        let mut store = ObjectStore::default();
        let outcome = self.parse_into(input, &mut store)?;
        Ok(Model::new(self, store, outcome, input.to_owned(), None))
    }

    pub fn model_from_file(&self, path: impl AsRef<Path>) -> Result<Model<'_>, Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path:?; "Read model file");
        let mut store = ObjectStore::default();
        let outcome = self.parse_into(&input, &mut store)?;
        Ok(Model::new(self, store, outcome, input, Some(path.to_path_buf())))
    }

    /// Parses a model into any backend: builds the object graph, resolves
    /// cross-references and runs object processors.
    pub fn parse_into(&self, input: &str, backend: &mut dyn ModelBackend) -> Result<ParseOutcome, Error> {
        crate::model::parse(self, input, backend)
    }

    pub(crate) fn new(
        grammar: Grammar,
        parser: Parser,
        classes: Vec<Class>,
        builder: MetamodelBuilder,
    ) -> Result<Self, GrammarError> {
        let index = classes
            .iter()
            .map(|c| (c.name.clone(), c.id))
            .collect::<HashMap<_, _>>();
        let lookup = |name: &str| index.get(name).copied().ok_or_else(|| GrammarError::UnknownRule(name.to_owned()));

        let mut link_targets = HashMap::new();
        for (site, info) in parser.assignments() {
            let class = &classes[info.rule.0];
            let attribute = match class.attribute(&info.attribute) {
                Some(attribute) if !attribute.containment && !attribute.flag => attribute,
                _ => continue,
            };
            let target = match &info.link {
                Some(name) => Some(lookup(name)?),
                None => attribute.target,
            };
            match target {
                Some(target) => {
                    link_targets.insert(site, target);
                }
                None => {
                    return Err(GrammarError::InconsistentAttribute {
                        rule: class.name.clone(),
                        attribute: attribute.name.clone(),
                        reason: "links to classes without a common superclass".to_owned(),
                    })
                }
            }
        }

        let mut converters = HashMap::new();
        for (name, converter) in builder.converters {
            let id = lookup(&name)?;
            if classes[id.0].kind.is_class() {
                return Err(GrammarError::NotAMatchRule(name));
            }
            converters.insert(id, converter);
        }

        let mut processors = HashMap::new();
        for (name, processor) in builder.processors {
            processors.insert(lookup(&name)?, processor);
        }

        for (name, builtin) in &builder.builtins {
            let class = lookup(&builtin.class)?;
            let class = &classes[class.0];
            if class.kind != RuleKind::Concrete {
                return Err(GrammarError::InvalidBuiltin {
                    name: name.clone(),
                    reason: format!("class '{}' is {}", class.name, class.kind),
                });
            }
            if let Some(attr) = builtin.attributes.keys().find(|a| !class.attributes.contains_key(*a)) {
                return Err(GrammarError::InvalidBuiltin {
                    name: name.clone(),
                    reason: format!("class '{}' has no attribute '{}'", class.name, attr),
                });
            }
        }

        Ok(Metamodel {
            grammar,
            parser,
            classes,
            index,
            link_targets,
            converters,
            processors,
            builtins: builder.builtins,
            name_policy: builder.name_policy,
            auto_init: builder.auto_init,
        })
    }
}

fn is_subclass(classes: &[Class], class: ClassId, ancestor: ClassId) -> bool {
    let mut queue = VecDeque::from([class]);
    let mut seen = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if id == ancestor {
            return true;
        }
        if seen.insert(id) {
            queue.extend(classes[id.0].inherits.iter().copied());
        }
    }
    false
}

/// Builds a metamodel with default settings.
impl FromStr for Metamodel {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetamodelBuilder::new().build(s)
    }
}
