use thiserror::Error;

/// Errors raised while compiling a grammar into a parser.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("grammar has no rules")]
    EmptyGrammar,

    #[error("rule '{0}' is defined more than once")]
    DuplicateRule(String),

    #[error("rule '{rule}' references unknown rule '{name}'")]
    UnknownRule { rule: String, name: String },

    #[error("rule '{rule}' has an invalid regular expression /{pattern}/")]
    Regex {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A failure to match input text against the start rule. Reported at the
/// furthest position any terminal was attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("syntax error at {line}:{column}: expected {} but found {found}", .expected.join(" or "))]
pub struct SyntaxError {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    /// Literals (quoted) and rule names that could have matched.
    pub expected: Vec<String>,
    pub found: String,
}

impl SyntaxError {
    pub(crate) fn new(input: &str, offset: usize, expected: Vec<String>) -> Self {
        let (line, column) = grammar::line_col(input, offset);
        let rest = input.get(offset..).unwrap_or_default();
        let found = if rest.is_empty() {
            "EOF".to_owned()
        } else {
            let snippet: String = rest.chars().take_while(|c| *c != '\n').take(12).collect();
            format!("'{}'", snippet)
        };
        SyntaxError {
            offset,
            line,
            column,
            expected,
            found,
        }
    }
}
