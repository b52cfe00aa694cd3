//! PEG parsing engine driven by a compiled grammar.
//!
//! [`Parser::compile`] turns every rule of a [`grammar::Grammar`] into a
//! tree of [`Matcher`]s. Parsing runs those matchers over a [`State`] and
//! produces a [`ParseNode`] tree with source spans: one non-terminal per
//! rule invocation, one per assignment, one per separator match, and
//! terminals for every string or regex match.

mod compile;
mod config;
mod error;
mod position;
mod span;
mod state;
mod tree;

pub use compile::{AssignmentInfo, CompiledRule, Matcher, Parser, Pattern, COMMENT_RULE};
pub use config::LexConfig;
pub use error::{CompileError, SyntaxError};
pub use position::Position;
pub use span::Span;
pub use state::{Checkpoint, State, StateResult};
pub use tree::{DfsParseTreeIterator, NodeKind, ParseNode};

/// Index of a rule within its parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

/// Index of an assignment site within its parser, numbered in grammar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssignmentId(pub usize);
