use thiserror::Error;

use crate::line_col;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("grammar error at {line}:{column}: {message}")]
    Parse {
        message: String,
        offset: usize,
        line: usize,
        column: usize,
    },
}

impl Error {
    /// Builds an error located at the start of `rest`, which must be a suffix
    /// of `input`.
    pub(crate) fn parse(input: &str, rest: &str, message: impl Into<String>) -> Self {
        let offset = input.len().saturating_sub(rest.len());
        let (line, column) = line_col(input, offset);
        Error::Parse {
            message: message.into(),
            offset,
            line,
            column,
        }
    }

    pub(crate) fn from_nom(input: &str, err: nom::Err<nom::error::Error<&str>>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Self::parse(input, e.input, format!("unexpected {}", describe(e.input)))
            }
            nom::Err::Incomplete(_) => Self::parse(input, "", "incomplete input"),
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Error::Parse { offset, .. } => *offset,
        }
    }
}

fn describe(rest: &str) -> String {
    let token: String = rest
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(16)
        .collect();
    if token.is_empty() {
        "end of input".to_owned()
    } else {
        format!("'{}'", token)
    }
}
