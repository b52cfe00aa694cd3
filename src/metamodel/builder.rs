use grammar::Grammar;
use indexmap::IndexMap;
use log::info;
use parsegen::{CompileError, LexConfig, Parser};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::{attrs, builtins, infer, Metamodel, ValueType};
use crate::error::{Error, GrammarError};
use crate::model::{ModelBackend, ObjectId, Value};

/// Turns the text matched by a match rule into a value.
pub type Converter = Box<dyn Fn(&str) -> anyhow::Result<Value> + Send + Sync>;

/// Called once for every object of a class after the model is resolved.
pub type ObjectProcessor =
    Box<dyn Fn(&mut dyn ModelBackend, ObjectId) -> anyhow::Result<()> + Send + Sync>;

/// What happens when two objects of one class share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePolicy {
    /// The later object replaces the earlier one for reference lookups.
    #[default]
    LastWins,
    /// Report a duplicate name error.
    Reject,
}

/// An object supplied by the caller, used when a reference names nothing
/// defined in the model.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinObject {
    pub class: String,
    pub attributes: IndexMap<String, Value>,
}

/// Options for building a [`Metamodel`].
pub struct MetamodelBuilder {
    config: LexConfig,
    pub(super) converters: HashMap<String, Converter>,
    pub(super) processors: HashMap<String, ObjectProcessor>,
    pub(super) builtins: IndexMap<String, BuiltinObject>,
    pub(super) name_policy: NamePolicy,
    pub(super) auto_init: bool,
}

impl Default for MetamodelBuilder {
    fn default() -> Self {
        MetamodelBuilder {
            config: LexConfig::default(),
            converters: HashMap::new(),
            processors: HashMap::new(),
            builtins: IndexMap::new(),
            name_policy: NamePolicy::default(),
            auto_init: true,
        }
    }
}

impl fmt::Debug for MetamodelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MetamodelBuilder")
            .field("config", &self.config)
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .field("builtins", &self.builtins)
            .field("name_policy", &self.name_policy)
            .field("auto_init", &self.auto_init)
            .finish()
    }
}

impl MetamodelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the global lexical configuration.
    pub fn lex_config(mut self, config: LexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.config.ignore_case = ignore_case;
        self
    }

    pub fn skipws(mut self, skipws: bool) -> Self {
        self.config.skipws = skipws;
        self
    }

    pub fn ws(mut self, ws: impl Into<String>) -> Self {
        self.config.ws = ws.into();
        self
    }

    pub fn autokwd(mut self, autokwd: bool) -> Self {
        self.config.autokwd = autokwd;
        self
    }

    /// Initialize unassigned single-valued attributes to `0`, `0.0`, `""`
    /// or `false` by type. When disabled they stay `None`. On by default.
    pub fn auto_init(mut self, auto_init: bool) -> Self {
        self.auto_init = auto_init;
        self
    }

    pub fn name_policy(mut self, policy: NamePolicy) -> Self {
        self.name_policy = policy;
        self
    }

    /// Registers a converter for a match rule, base types included.
    pub fn converter<F>(mut self, rule: &str, f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.converters.insert(rule.to_owned(), Box::new(f));
        self
    }

    /// Registers a processor for every object whose class is `class` or
    /// inherits from it. A processor registered for an abstract rule thus
    /// fires for objects of all its subclasses, after the processor of the
    /// object's own class.
    pub fn processor<F>(mut self, class: &str, f: F) -> Self
    where
        F: Fn(&mut dyn ModelBackend, ObjectId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.processors.insert(class.to_owned(), Box::new(f));
        self
    }

    /// Adds an object that references named `name` fall back to.
    pub fn builtin<I, K>(mut self, name: &str, class: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let attributes = attributes.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.builtins.insert(
            name.to_owned(),
            BuiltinObject {
                class: class.to_owned(),
                attributes,
            },
        );
        self
    }

    pub fn build(self, grammar: &str) -> Result<Metamodel, GrammarError> {
        let mut grammar: Grammar = grammar.parse()?;
        if grammar.rules.is_empty() {
            return Err(CompileError::EmptyGrammar.into());
        }
        info!(rules = grammar.rules.len(); "Building metamodel");

        builtins::check_reserved(&grammar)?;
        grammar.rules.extend(builtins::grammar()?.rules);

        let parser = Parser::compile(&grammar, self.config.clone())?;
        let mut classes = infer::infer(&grammar)?;
        for class in classes.iter_mut() {
            if self.converters.contains_key(&class.name) {
                class.value_type = ValueType::Any;
            }
        }
        attrs::derive(&grammar, &mut classes)?;

        let metamodel = Metamodel::new(grammar, parser, classes, self)?;
        info!(classes = metamodel.user_classes().count(); "Built metamodel");
        Ok(metamodel)
    }

    pub fn build_file(self, path: impl AsRef<Path>) -> Result<Metamodel, Error> {
        let path = path.as_ref();
        let grammar = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path:?; "Read grammar file");
        Ok(self.build(&grammar)?)
    }
}
