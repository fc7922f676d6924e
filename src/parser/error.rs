use std::string::FromUtf8Error;

use thiserror::Error;

#[derive(Error, Debug)]
#[error("failed to parse {path}: {cause}")]
pub struct ParseError {
    pub path: String,
    #[source]
    pub cause: ParseErrorCause,
}

#[derive(Error, Debug)]
pub enum ParseErrorCause {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

impl ParseError {
    pub fn new(path: impl Into<String>, cause: impl Into<ParseErrorCause>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}
