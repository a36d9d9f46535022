//! Error types for meshspec

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// meshspec errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Spec parse error: {0}")]
    SpecParse(String),

    #[error("Formula parse error: {0}")]
    Formula(#[from] ParseError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

/// A malformed formula. `position` is the byte offset where parsing stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("Unexpected end of input", 3);
        assert_eq!(err.to_string(), "Unexpected end of input at position 3");

        let wrapped: Error = err.into();
        assert!(wrapped.to_string().starts_with("Formula parse error"));
    }
}
