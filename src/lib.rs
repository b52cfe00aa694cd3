//! Grammar-driven models.
//!
//! A grammar written in a PEG dialect with named assignments compiles into a
//! [`Metamodel`]. The metamodel parses text conforming to the grammar into a
//! [`Model`]: an object graph with resolved cross-references.
//!
//! ```ignore
//! let mm: Metamodel = "Model: points+=Point; Point: name=ID x=INT y=INT;".parse()?;
//! let model = mm.model_from_str("a 1 2 b 3 4")?;
//! ```

mod error;
pub mod metamodel;
pub mod model;

pub use error::{Error, GrammarError, SemanticError};
pub use metamodel::{
    Attribute, BuiltinObject, Class, ClassId, Metamodel, MetamodelBuilder, Multiplicity, NamePolicy,
    RuleKind, ValueType,
};
pub use model::{Model, ModelBackend, ModelObject, ObjectId, ObjectStore, ParseOutcome, ResolvedReference, Value};
pub use parsegen::{LexConfig, SyntaxError};
