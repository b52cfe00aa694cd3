use std::path::PathBuf;
use thiserror::Error;

/// Problems with a grammar, found while building a metamodel.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error(transparent)]
    Parse(#[from] grammar::Error),

    #[error(transparent)]
    Compile(#[from] parsegen::CompileError),

    #[error("rule name '{0}' is reserved for a base type")]
    ReservedName(String),

    #[error("rule '{rule}' has an ambiguous shape: {reason}")]
    AmbiguousShape { rule: String, reason: String },

    #[error("enumeration rule '{rule}' repeats literal '{literal}'")]
    DuplicateLiteral { rule: String, literal: String },

    #[error("attribute '{attribute}' of rule '{rule}' is inconsistent: {reason}")]
    InconsistentAttribute {
        rule: String,
        attribute: String,
        reason: String,
    },

    #[error("link target '{target}' in rule '{rule}' is not a class")]
    InvalidLinkTarget { rule: String, target: String },

    #[error("rule kinds did not settle after {passes} passes")]
    NoConvergence { passes: usize },

    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    #[error("converter registered for '{0}' which does not produce a value")]
    NotAMatchRule(String),

    #[error("builtin object '{name}': {reason}")]
    InvalidBuiltin { name: String, reason: String },
}

/// Problems with a model that parsed but could not be turned into a valid
/// object graph.
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("multiple assignments to attribute '{attribute}' of '{class}' at {line}:{column}")]
    MultipleAssignment {
        class: String,
        attribute: String,
        line: usize,
        column: usize,
    },

    #[error("unknown object '{name}' of class '{class}' at {line}:{column}")]
    UnresolvedReference {
        name: String,
        class: String,
        line: usize,
        column: usize,
    },

    #[error("name '{name}' of class '{class}' at {line}:{column} is already defined")]
    DuplicateName {
        name: String,
        class: String,
        line: usize,
        column: usize,
    },

    #[error("failed to convert '{text}' as '{rule}' at {line}:{column}")]
    Conversion {
        rule: String,
        text: String,
        line: usize,
        column: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to initialize object of class '{class}'")]
    Initialize {
        class: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("object processor for class '{class}' failed")]
    Processor {
        class: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    GrammarDefinition(#[from] GrammarError),

    #[error(transparent)]
    Syntax(#[from] parsegen::SyntaxError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error("failed to read '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Line and column the error points at, when it has one.
    pub fn line_col(&self) -> Option<(usize, usize)> {
        match self {
            Error::GrammarDefinition(GrammarError::Parse(grammar::Error::Parse {
                line, column, ..
            })) => Some((*line, *column)),
            Error::Syntax(e) => Some((e.line, e.column)),
            Error::Semantic(SemanticError::MultipleAssignment { line, column, .. })
            | Error::Semantic(SemanticError::UnresolvedReference { line, column, .. })
            | Error::Semantic(SemanticError::DuplicateName { line, column, .. })
            | Error::Semantic(SemanticError::Conversion { line, column, .. }) => {
                Some((*line, *column))
            }
            _ => None,
        }
    }
}
