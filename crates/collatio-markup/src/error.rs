use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// Malformed markup in strict mode. Positions are 1-based and refer to
    /// the caller's input, not to the wrapped fragment.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

impl MarkupError {
    pub(crate) fn at(source: &str, offset: usize, skip: usize, message: impl Into<String>) -> Self {
        let end = offset.min(source.len());
        let start = skip.min(end);
        let consumed = source.get(start..end).unwrap_or("");
        let line = consumed.matches('\n').count() + 1;
        let column = match consumed.rfind('\n') {
            Some(pos) => consumed[pos + 1..].chars().count() + 1,
            None => consumed.chars().count() + 1,
        };
        MarkupError::Parse {
            line,
            column,
            message: message.into(),
        }
    }
}
